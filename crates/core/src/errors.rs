use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::flows::FlowTransitionError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("unknown capability `{0}`")]
    UnknownCapability(String),
    #[error("malformed intent: {0}")]
    MalformedIntent(String),
    #[error("missing required parameter `{0}`")]
    MissingParameter(String),
    #[error(transparent)]
    FlowTransition(#[from] FlowTransitionError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionFailureKind {
    Connect,
    Authentication,
    Timeout,
    Protocol,
    Verification,
}

impl SessionFailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Authentication => "authentication",
            Self::Timeout => "timeout",
            Self::Protocol => "protocol",
            Self::Verification => "verification",
        }
    }
}

impl fmt::Display for SessionFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DeviceError {
    #[error("device `{token}` is unreachable (tried: {})", tried.join(", "))]
    Unreachable { token: String, tried: Vec<String> },
    #[error("{kind} failure on `{device}`: {message}")]
    Session { device: String, kind: SessionFailureKind, message: String },
}

impl DeviceError {
    pub fn session(
        device: impl Into<String>,
        kind: SessionFailureKind,
        message: impl Into<String>,
    ) -> Self {
        Self::Session { device: device.into(), kind, message: message.into() }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error("dispatch failure: {0}")]
    Dispatch(String),
    #[error("collaborator reply could not be parsed: {0}")]
    IntentParse(String),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

/// How an [`InterfaceError`] is surfaced to the operator and which HTTP status it maps to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterfaceErrorKind {
    BadRequest,
    ServiceUnavailable,
    Internal,
}

impl InterfaceErrorKind {
    pub fn user_message(self) -> &'static str {
        match self {
            Self::BadRequest => "The request could not be processed. Check the message and try again.",
            Self::ServiceUnavailable => {
                "The assistant is unavailable right now and no command was run. Please retry shortly."
            }
            Self::Internal => "An unexpected internal error occurred.",
        }
    }
}

/// An [`ApplicationError`] bound to the correlation id of the request that hit it.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{kind:?}: {message}")]
pub struct InterfaceError {
    pub kind: InterfaceErrorKind,
    pub message: String,
    pub correlation_id: String,
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        self.kind.user_message()
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }
}

impl ApplicationError {
    pub fn kind(&self) -> InterfaceErrorKind {
        match self {
            Self::Domain(_) | Self::IntentParse(_) => InterfaceErrorKind::BadRequest,
            Self::Device(_) | Self::Dispatch(_) | Self::Integration(_) => {
                InterfaceErrorKind::ServiceUnavailable
            }
            Self::Configuration(_) => InterfaceErrorKind::Internal,
        }
    }

    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let kind = self.kind();
        let message = match self {
            Self::IntentParse(message)
            | Self::Dispatch(message)
            | Self::Integration(message)
            | Self::Configuration(message) => message,
            other => other.to_string(),
        };
        InterfaceError { kind, message, correlation_id: correlation_id.into() }
    }
}
