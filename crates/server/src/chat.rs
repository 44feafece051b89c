use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use netops_core::{
    ApplicationError, CapabilitySummary, DomainError, ExecutionResult, InterfaceError,
    InterfaceErrorKind, SessionId,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub assistant_message: String,
    pub script_executed: Option<String>,
    pub script_result: Option<ExecutionResult>,
    pub session_id: SessionId,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error: String,
    pub correlation_id: String,
}

pub async fn chat(
    State(state): State<AppState>,
    Json(body): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, (StatusCode, Json<ErrorResponse>)> {
    if body.message.trim().is_empty() {
        let error = ApplicationError::from(DomainError::MalformedIntent(
            "message must not be empty".to_string(),
        ))
        .into_interface(Uuid::new_v4().to_string());
        warn!(
            event_name = "system.chat.rejected",
            correlation_id = %error.correlation_id(),
            error = %error,
            "chat request rejected"
        );
        return Err(error_response(&error));
    }

    let reply = state
        .conversation
        .handle_turn(SessionId::parse(body.session_id.as_deref()), &body.message)
        .await;
    info!(
        event_name = "system.chat.replied",
        session_id = %reply.session_id,
        executed = reply.script_executed.as_deref().unwrap_or("-")
    );
    Ok(Json(ChatResponse {
        assistant_message: reply.assistant_message,
        script_executed: reply.script_executed,
        script_result: reply.script_result,
        session_id: reply.session_id,
    }))
}

pub async fn capabilities(State(state): State<AppState>) -> Json<Vec<CapabilitySummary>> {
    Json(state.registry.summaries())
}

pub fn status_for(kind: InterfaceErrorKind) -> StatusCode {
    match kind {
        InterfaceErrorKind::BadRequest => StatusCode::BAD_REQUEST,
        InterfaceErrorKind::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        InterfaceErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(error: &InterfaceError) -> (StatusCode, Json<ErrorResponse>) {
    (
        status_for(error.kind),
        Json(ErrorResponse {
            error: error.user_message().to_string(),
            correlation_id: error.correlation_id().to_string(),
        }),
    )
}
