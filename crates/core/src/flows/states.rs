use std::fmt;

use serde::{Deserialize, Serialize};

/// Where a session sits between operator turns.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlowState {
    #[default]
    Idle,
    AwaitingParameters,
    AwaitingConfirmation,
    Dispatched,
}

impl FlowState {
    /// True while the session holds a capability the operator has not finished with.
    pub fn has_pending_intent(self) -> bool {
        matches!(self, Self::AwaitingParameters | Self::AwaitingConfirmation)
    }
}

impl fmt::Display for FlowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::AwaitingParameters => "awaiting_parameters",
            Self::AwaitingConfirmation => "awaiting_confirmation",
            Self::Dispatched => "dispatched",
        };
        f.write_str(label)
    }
}

/// What the latest collaborator reply (or the dispatcher) said about the turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowEvent {
    /// The collaborator reply named no capability, or could not be parsed.
    IntentCleared,
    ParametersIncomplete,
    ParametersComplete,
    ConfirmationReceived,
    ExecutionFinished,
}

impl fmt::Display for FlowEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::IntentCleared => "intent_cleared",
            Self::ParametersIncomplete => "parameters_incomplete",
            Self::ParametersComplete => "parameters_complete",
            Self::ConfirmationReceived => "confirmation_received",
            Self::ExecutionFinished => "execution_finished",
        };
        f.write_str(label)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowAction {
    PromptForMissingFields,
    RequestConfirmation,
    DispatchExecution,
    FoldResultIntoReply,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub from: FlowState,
    pub to: FlowState,
    pub event: FlowEvent,
    pub action: Option<FlowAction>,
}
