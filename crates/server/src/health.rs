use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use netops_agent::dispatch::entrypoint_resolvable;
use netops_core::config::{CapabilitiesConfig, ExecutionMode, LlmConfig, LlmProvider};
use netops_core::CapabilityRegistry;
use serde::Serialize;

use crate::AppState;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Readiness {
    Ready,
    Degraded,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Probe {
    pub status: Readiness,
    pub detail: String,
}

impl Probe {
    fn ready(detail: impl Into<String>) -> Self {
        Self { status: Readiness::Ready, detail: detail.into() }
    }

    fn degraded(detail: impl Into<String>) -> Self {
        Self { status: Readiness::Degraded, detail: detail.into() }
    }
}

/// Body of `GET /health`. The overall status is degraded as soon as one probe is.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub status: Readiness,
    pub service: Probe,
    pub registry: Probe,
    pub collaborator: Probe,
    pub checked_at: DateTime<Utc>,
}

pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthReport>) {
    let registry = registry_check(&state.registry, &state.config.capabilities);
    let collaborator = collaborator_check(&state.config.llm);
    let status = if [&registry, &collaborator].iter().all(|probe| probe.status == Readiness::Ready) {
        Readiness::Ready
    } else {
        Readiness::Degraded
    };

    let report = HealthReport {
        status,
        service: Probe::ready(format!("{} active session(s)", state.conversation.sessions().len())),
        registry,
        collaborator,
        checked_at: Utc::now(),
    };
    let code = match status {
        Readiness::Ready => StatusCode::OK,
        Readiness::Degraded => StatusCode::SERVICE_UNAVAILABLE,
    };
    (code, Json(report))
}

pub fn registry_check(registry: &CapabilityRegistry, config: &CapabilitiesConfig) -> Probe {
    if registry.is_empty() {
        return Probe::degraded("capability registry is empty");
    }
    if config.mode == ExecutionMode::InProcess {
        return Probe::ready(format!("{} capabilities, in-process execution", registry.len()));
    }

    let unresolved: Vec<&str> = registry
        .describe()
        .iter()
        .filter(|definition| !entrypoint_resolvable(definition, &config.base_dir))
        .map(|definition| definition.id.as_str())
        .collect();
    match unresolved.as_slice() {
        [] => Probe::ready(format!("{} capabilities resolvable", registry.len())),
        missing => Probe::degraded(format!("entrypoints not found for: {}", missing.join(", "))),
    }
}

pub fn collaborator_check(config: &LlmConfig) -> Probe {
    let configured = match config.provider {
        LlmProvider::OpenAi => config.api_key.is_some(),
        LlmProvider::Ollama => config.base_url.is_some(),
    };
    if configured {
        Probe::ready(format!("{:?} model `{}` configured", config.provider, config.model))
    } else {
        Probe::degraded("collaborator credentials missing")
    }
}
