use netops_core::{CapabilityRegistry, ExecutionIntent};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardrailDecision {
    Allow,
    /// The intent cannot run as given.
    Deny { reason_code: &'static str, user_message: String },
    /// The intent may run later, once the operator confirms.
    Degrade { reason_code: &'static str, user_message: String },
}

impl GuardrailDecision {
    pub fn user_message(&self) -> Option<&str> {
        match self {
            Self::Allow => None,
            Self::Deny { user_message, .. } | Self::Degrade { user_message, .. } => {
                Some(user_message)
            }
        }
    }

    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::Allow => "allowed",
            Self::Deny { reason_code, .. } | Self::Degrade { reason_code, .. } => reason_code,
        }
    }
}

/// Last check between a collaborator-produced intent and any side effect.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExecutionGate;

impl ExecutionGate {
    pub fn evaluate(&self, registry: &CapabilityRegistry, intent: &ExecutionIntent) -> GuardrailDecision {
        let Ok(definition) = registry.get(&intent.capability_id) else {
            return GuardrailDecision::Deny {
                reason_code: "unknown_capability",
                user_message: format!(
                    "`{}` is not an available capability, so nothing was run. Ask me to list the available capabilities.",
                    intent.capability_id
                ),
            };
        };

        if !intent.confirmed {
            return GuardrailDecision::Degrade {
                reason_code: "confirmation_required",
                user_message: "Nothing runs until you explicitly confirm.".to_string(),
            };
        }

        let missing = definition.missing_required(&intent.parameters);
        if !missing.is_empty() {
            return GuardrailDecision::Deny {
                reason_code: "missing_required_parameters",
                user_message: format!(
                    "Nothing was run: {} still needs {}.",
                    definition.display_name,
                    missing.join(", ")
                ),
            };
        }

        GuardrailDecision::Allow
    }
}
