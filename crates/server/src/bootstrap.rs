use std::sync::Arc;

use netops_agent::dispatch::process_capabilities;
use netops_agent::{ConversationManager, ExecutionDispatcher, LlmClient, OpenAiCompatibleClient};
use netops_core::config::{AppConfig, ConfigError, ExecutionMode, LoadOptions};
use netops_core::{ApplicationError, CapabilityRegistry, CapabilitySet, RegistryError};
use netops_devices::{in_process_capabilities, DeviceAutomation};
use thiserror::Error;
use tracing::info;

use crate::AppState;

pub struct Application {
    pub config: AppConfig,
    pub state: AppState,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("capability registry failed to load: {0}")]
    Registry(#[from] RegistryError),
    #[error("intent collaborator could not be configured: {0}")]
    Collaborator(String),
    #[error(transparent)]
    Conversation(#[from] ApplicationError),
}

pub fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config)
}

pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );
    let llm = OpenAiCompatibleClient::from_config(&config.llm)
        .map_err(|error| BootstrapError::Collaborator(format!("{error:#}")))?;
    bootstrap_with_client(config, Arc::new(llm))
}

/// Wires everything except the collaborator client, which the caller supplies.
pub fn bootstrap_with_client(
    config: AppConfig,
    llm: Arc<dyn LlmClient>,
) -> Result<Application, BootstrapError> {
    let registry = Arc::new(CapabilityRegistry::load(&config.capabilities)?);
    info!(
        event_name = "system.bootstrap.registry_loaded",
        correlation_id = "bootstrap",
        capabilities = registry.len(),
        source = config
            .capabilities
            .registry_path
            .as_deref()
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "builtin".to_string()),
        "capability registry loaded"
    );

    let capabilities = build_capabilities(&config, &registry);
    let dispatcher = ExecutionDispatcher::new(Arc::clone(&registry), capabilities);
    let conversation = ConversationManager::new(llm, dispatcher, &config.conversation)?;
    info!(
        event_name = "system.bootstrap.ready",
        correlation_id = "bootstrap",
        mode = ?config.capabilities.mode,
        "conversation manager initialized"
    );

    let state = AppState {
        conversation: Arc::new(conversation),
        registry,
        config: Arc::new(config.clone()),
    };
    Ok(Application { config, state })
}

pub fn build_capabilities(config: &AppConfig, registry: &CapabilityRegistry) -> CapabilitySet {
    match config.capabilities.mode {
        ExecutionMode::Process => process_capabilities(registry, &config.capabilities.base_dir),
        ExecutionMode::InProcess => {
            let automation = Arc::new(DeviceAutomation::with_ssh(config.devices.clone()));
            in_process_capabilities(registry, automation, &config.capabilities.base_dir)
        }
    }
}
