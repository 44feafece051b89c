use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::capability::CapabilityDefinition;
use crate::domain::execution::ExecutionResult;
use crate::domain::intent::Parameters;
use crate::errors::DomainError;

/// One runnable automation action.
///
/// Implementations either launch the capability out of process or run it in
/// process; both must reject a missing required parameter with
/// [`DomainError::MissingParameter`] before doing any work, which
/// [`CapabilityDefinition::build_arguments`] enforces.
#[async_trait]
pub trait Capability: Send + Sync {
    fn definition(&self) -> &CapabilityDefinition;

    async fn run(&self, parameters: &Parameters) -> Result<ExecutionResult, DomainError>;
}

/// Runnable capabilities keyed by id.
#[derive(Clone, Default)]
pub struct CapabilitySet {
    capabilities: HashMap<String, Arc<dyn Capability>>,
}

impl CapabilitySet {
    pub fn register(&mut self, capability: Arc<dyn Capability>) {
        self.capabilities.insert(capability.definition().id.clone(), capability);
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn Capability>> {
        self.capabilities.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::{Capability, CapabilitySet};
    use crate::domain::capability::CapabilityDefinition;
    use crate::domain::execution::ExecutionResult;
    use crate::domain::intent::Parameters;
    use crate::errors::DomainError;
    use crate::registry::{builtin_catalog, SHOW_COMMANDS_ID};

    struct EchoCapability {
        definition: CapabilityDefinition,
    }

    #[async_trait]
    impl Capability for EchoCapability {
        fn definition(&self) -> &CapabilityDefinition {
            &self.definition
        }

        async fn run(&self, parameters: &Parameters) -> Result<ExecutionResult, DomainError> {
            let arguments = self.definition.build_arguments(parameters)?;
            Ok(ExecutionResult::Completed {
                exit_code: 0,
                stdout: arguments.join(" "),
                stderr: String::new(),
            })
        }
    }

    #[tokio::test]
    async fn set_resolves_registered_capabilities_by_id() {
        let definition = builtin_catalog("netops").remove(0);
        let mut set = CapabilitySet::default();
        set.register(Arc::new(EchoCapability { definition }));

        assert_eq!(set.len(), 1);
        assert!(set.get("aclRemoval-main").is_none());

        let capability = set.get(SHOW_COMMANDS_ID).expect("registered");
        let error = capability.run(&Parameters::new()).await.expect_err("missing parameters");
        assert_eq!(error, DomainError::MissingParameter("devices".to_owned()));
    }
}
