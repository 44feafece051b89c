pub mod capability;
pub mod catalog;
pub mod config;
pub mod doctor;

use serde::Serialize;
use serde_json::json;

/// Exit status plus whatever the command prints to stdout and stderr.
#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
    pub error_output: String,
}

/// Coarse cause of a command failure, reported in the JSON error line on stderr.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    ConfigValidation,
    Registry,
    Runtime,
    Serialization,
}

impl CommandResult {
    pub fn output(exit_code: u8, output: impl Into<String>) -> Self {
        Self { exit_code, output: output.into(), error_output: String::new() }
    }

    /// Nothing on stdout; a single JSON object on stderr so wrappers can branch on `error_class`.
    pub fn failure(command: &str, class: ErrorClass, message: impl Into<String>, exit_code: u8) -> Self {
        let payload = json!({
            "command": command,
            "status": "error",
            "error_class": class,
            "message": message.into(),
        });
        Self { exit_code, output: String::new(), error_output: payload.to_string() }
    }
}
