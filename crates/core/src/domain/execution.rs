use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::domain::capability::CapabilityDefinition;
use crate::domain::intent::{present_value, Parameters};

pub const DEVICES_PARAM: &str = "devices";
pub const USERNAME_PARAM: &str = "username";
pub const PASSWORD_PARAM: &str = "password";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExecutionResult {
    Completed {
        #[serde(rename = "exitCode")]
        exit_code: i32,
        stdout: String,
        stderr: String,
    },
    Failed {
        error: String,
    },
}

impl ExecutionResult {
    pub fn failed(error: impl Into<String>) -> Self {
        Self::Failed { error: error.into() }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed { exit_code: 0, .. })
    }

    /// Text appended to the collaborator's answer once a run finishes.
    pub fn render(&self) -> String {
        match self {
            Self::Completed { exit_code, stdout, stderr } => {
                let mut rendered = format!("Execution finished with return code {exit_code}.");
                if !stdout.trim().is_empty() {
                    rendered.push_str("\n\nOutput:\n");
                    rendered.push_str(stdout.trim_end());
                }
                if !stderr.trim().is_empty() {
                    rendered.push_str("\n\nErrors:\n");
                    rendered.push_str(stderr.trim_end());
                }
                rendered
            }
            Self::Failed { error } => format!("Execution failed: {error}"),
        }
    }
}

/// Values of the last successful run, offered to the next turn.
#[derive(Clone, Debug)]
pub struct ExecutionContext {
    pub capability_id: String,
    pub devices: String,
    pub username: String,
    pub password: SecretString,
}

impl ExecutionContext {
    /// Builds a context only when all three reusable values are present.
    pub fn from_parameters(capability_id: &str, parameters: &Parameters) -> Option<Self> {
        let devices = present_value(parameters, DEVICES_PARAM)?;
        let username = present_value(parameters, USERNAME_PARAM)?;
        let password = present_value(parameters, PASSWORD_PARAM)?;
        Some(Self {
            capability_id: capability_id.to_owned(),
            devices: devices.to_owned(),
            username: username.to_owned(),
            password: SecretString::from(password.to_owned()),
        })
    }

    /// Fills omitted reusable values for parameters the capability declares.
    /// Returns the names that were filled.
    pub fn fill_missing(
        &self,
        definition: &CapabilityDefinition,
        parameters: &mut Parameters,
    ) -> Vec<String> {
        let candidates = [
            (DEVICES_PARAM, self.devices.as_str()),
            (USERNAME_PARAM, self.username.as_str()),
            (PASSWORD_PARAM, self.password.expose_secret()),
        ];

        let mut filled = Vec::new();
        for (name, value) in candidates {
            if definition.declares(name) && present_value(parameters, name).is_none() {
                parameters.insert(name.to_owned(), value.to_owned());
                filled.push(name.to_owned());
            }
        }
        filled
    }

    /// Context message for the collaborator. Never includes the password.
    pub fn describe(&self) -> String {
        format!(
            "Context from the last successful run: capability `{}` ran against devices `{}` as user `{}`. \
             Stored credentials for that user are available; if the operator refers to the same devices \
             or credentials, you may leave `devices`, `username` and `password` empty and they will be \
             filled from this context.",
            self.capability_id, self.devices, self.username
        )
    }
}
