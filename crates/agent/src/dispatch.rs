use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use netops_core::{
    ApplicationError, Capability, CapabilityDefinition, CapabilityRegistry, CapabilitySet,
    DomainError, ExecutionIntent, ExecutionResult, Parameters,
};
use tokio::process::Command;
use tracing::{info, warn};

/// Runs a capability as a child process scoped to `<base_dir>/<folder>`.
pub struct ProcessCapability {
    definition: CapabilityDefinition,
    base_dir: PathBuf,
}

impl ProcessCapability {
    pub fn new(definition: CapabilityDefinition, base_dir: impl Into<PathBuf>) -> Self {
        Self { definition, base_dir: base_dir.into() }
    }

    pub fn working_dir(&self) -> PathBuf {
        self.base_dir.join(&self.definition.folder)
    }
}

#[async_trait]
impl Capability for ProcessCapability {
    fn definition(&self) -> &CapabilityDefinition {
        &self.definition
    }

    async fn run(&self, parameters: &Parameters) -> Result<ExecutionResult, DomainError> {
        let arguments = self.definition.build_arguments(parameters)?;
        let working_dir = self.working_dir();
        if let Err(error) = tokio::fs::create_dir_all(&working_dir).await {
            return Ok(ExecutionResult::failed(format!(
                "could not prepare working directory `{}`: {error}",
                working_dir.display()
            )));
        }

        let program = program_path(&working_dir, &self.definition.entrypoint);
        info!(
            event_name = "agent.dispatch.process_spawning",
            capability_id = %self.definition.id,
            program = %program.display(),
            working_dir = %working_dir.display()
        );
        let output = Command::new(&program)
            .args(&self.definition.entrypoint_args)
            .args(&arguments)
            .current_dir(&working_dir)
            .stdin(Stdio::null())
            .output()
            .await;

        Ok(match output {
            Ok(output) => ExecutionResult::Completed {
                exit_code: output.status.code().unwrap_or(-1),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            },
            Err(error) => {
                warn!(
                    event_name = "agent.dispatch.spawn_failed",
                    capability_id = %self.definition.id,
                    program = %program.display(),
                    error = %error
                );
                ExecutionResult::failed(error.to_string())
            }
        })
    }
}

/// A file named by the entrypoint inside the capability folder wins over a `PATH` lookup.
pub fn program_path(working_dir: &Path, entrypoint: &str) -> PathBuf {
    let local = working_dir.join(entrypoint);
    if local.is_file() {
        local
    } else {
        PathBuf::from(entrypoint)
    }
}

/// Whether the entrypoint can be launched from `<base_dir>/<folder>` right now.
pub fn entrypoint_resolvable(definition: &CapabilityDefinition, base_dir: &Path) -> bool {
    let program = program_path(&base_dir.join(&definition.folder), &definition.entrypoint);
    program.is_file() || which::which(&definition.entrypoint).is_ok()
}

pub fn process_capabilities(registry: &CapabilityRegistry, base_dir: &Path) -> CapabilitySet {
    let mut set = CapabilitySet::default();
    for definition in registry.describe() {
        set.register(Arc::new(ProcessCapability::new(definition.clone(), base_dir)));
    }
    set
}

/// Validates a confirmed intent against the registry and runs its capability.
pub struct ExecutionDispatcher {
    registry: Arc<CapabilityRegistry>,
    capabilities: CapabilitySet,
}

impl ExecutionDispatcher {
    pub fn new(registry: Arc<CapabilityRegistry>, capabilities: CapabilitySet) -> Self {
        Self { registry, capabilities }
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    pub async fn dispatch(&self, intent: &ExecutionIntent) -> Result<ExecutionResult, ApplicationError> {
        if !intent.confirmed {
            return Err(DomainError::MalformedIntent(format!(
                "intent for `{}` is not confirmed",
                intent.capability_id
            ))
            .into());
        }
        let definition = self.registry.get(&intent.capability_id)?;
        definition.build_arguments(&intent.parameters)?;

        let capability = self.capabilities.get(&definition.id).ok_or_else(|| {
            ApplicationError::Dispatch(format!("no runner registered for `{}`", definition.id))
        })?;
        let result = capability.run(&intent.parameters).await?;
        info!(
            event_name = "agent.dispatch.finished",
            capability_id = %definition.id,
            success = result.is_success()
        );
        Ok(result)
    }
}
