//! HTTP surface of the automation engine.
//!
//! Endpoints:
//! - `POST /chat`          - one operator turn (`{message, sessionId?}`)
//! - `GET  /capabilities`  - the registry as shown to operators
//! - `GET  /health`        - registry and collaborator readiness

pub mod bootstrap;
pub mod chat;
pub mod health;

use std::sync::Arc;

use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use netops_agent::ConversationManager;
use netops_core::config::{AppConfig, ServerConfig};
use netops_core::CapabilityRegistry;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

#[derive(Clone)]
pub struct AppState {
    pub conversation: Arc<ConversationManager>,
    pub registry: Arc<CapabilityRegistry>,
    pub config: Arc<AppConfig>,
}

pub fn router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.server);
    Router::new()
        .route("/chat", post(chat::chat))
        .route("/capabilities", get(chat::capabilities))
        .route("/health", get(health::health))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

fn cors_layer(server: &ServerConfig) -> CorsLayer {
    let base = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if server.allowed_origins.iter().any(|origin| origin.trim() == "*") {
        return base.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = server
        .allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin.trim()) {
            Ok(value) => Some(value),
            Err(error) => {
                warn!(
                    event_name = "system.server.invalid_origin",
                    origin = %origin,
                    error = %error,
                    "ignoring allowed origin that is not a valid header value"
                );
                None
            }
        })
        .collect();
    base.allow_origin(AllowOrigin::list(origins))
}
