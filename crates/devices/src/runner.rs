use std::sync::Arc;

use netops_core::domain::device::strip_domain_suffix;
use netops_core::{Credentials, DeviceError, DeviceTarget};
use tracing::{info, warn};

use crate::batch::DeviceWorker;
use crate::operations::{DeviceContext, DeviceOperation};
use crate::output::{OutputStore, GENERAL_OUTPUTS_FILE};
use crate::session::{DeviceSession, SessionConnector};

/// Runs one operation against one device inside its own session.
///
/// Every failure stays at this boundary: it is logged, appended to the
/// failed-devices record and returned as a value for the batch report.
/// Whatever the operation sent is kept as the device transcript and also
/// appended to the capability-wide aggregate.
pub struct SessionRunner {
    connector: Arc<dyn SessionConnector>,
    operation: Arc<dyn DeviceOperation>,
    credentials: Credentials,
    output: Arc<OutputStore>,
    suffixes: Vec<String>,
}

impl SessionRunner {
    pub fn new(
        connector: Arc<dyn SessionConnector>,
        operation: Arc<dyn DeviceOperation>,
        credentials: Credentials,
        output: Arc<OutputStore>,
        suffixes: Vec<String>,
    ) -> Self {
        Self { connector, operation, credentials, output, suffixes }
    }

    fn run_session(&self, target: &DeviceTarget) -> Result<String, DeviceError> {
        let mut session = self.connector.open(target, &self.credentials)?;
        info!(
            event_name = "devices.session.connected",
            device = %target.address,
            operation = %self.operation.kind(),
            "user {} connected to device",
            self.credentials.username
        );
        let host = strip_domain_suffix(&target.address, &self.suffixes);
        let mut recorder = RecordingSession::new(session.as_mut(), host.clone());
        let context = DeviceContext { target, host, output: &self.output };

        let result = self.operation.execute(&mut recorder, &context);
        self.persist_transcript(target, &recorder.entries);
        result
    }

    fn persist_transcript(&self, target: &DeviceTarget, entries: &[String]) {
        let body = entries.join("\n");
        let per_device = format!(
            "User {} connected to device IP {}\n\n{body}\n",
            self.credentials.username, target.address
        );
        let mut writes = vec![(self.operation.transcript_file(&target.address), per_device)];
        if !body.trim().is_empty() {
            writes.push((GENERAL_OUTPUTS_FILE.to_owned(), format!("{body}\n")));
        }

        for (file_name, text) in writes {
            if let Err(error) = self.output.append_text(&file_name, &text) {
                warn!(
                    event_name = "devices.output.write_failed",
                    device = %target.address,
                    file = %file_name,
                    error = %error
                );
            }
        }
    }
}

impl DeviceWorker for SessionRunner {
    fn process(&self, target: &DeviceTarget) -> Result<String, DeviceError> {
        let result = self.run_session(target);
        if let Err(error) = &result {
            warn!(
                event_name = "devices.session.failed",
                device = %target.address,
                operation = %self.operation.kind(),
                error = %error,
                "device failed; continuing with the rest of the batch"
            );
            self.output.record_failed(&target.address, &self.credentials.username, &error.to_string());
        }
        result
    }
}

/// Passes every call through to the device and keeps a prompt-prefixed copy of it.
struct RecordingSession<'a> {
    inner: &'a mut dyn DeviceSession,
    host: String,
    entries: Vec<String>,
}

impl<'a> RecordingSession<'a> {
    fn new(inner: &'a mut dyn DeviceSession, host: String) -> Self {
        Self { inner, host, entries: Vec::new() }
    }

    fn note(&mut self, sent: String, result: &Result<String, DeviceError>) {
        let reply = match result {
            Ok(output) => output.trim_end().to_owned(),
            Err(error) => format!("% {error}"),
        };
        self.entries.push(format!("{sent}\n{reply}"));
    }
}

impl DeviceSession for RecordingSession<'_> {
    fn enable(&mut self) -> Result<(), DeviceError> {
        self.inner.enable()
    }

    fn send_command(&mut self, command: &str) -> Result<String, DeviceError> {
        let result = self.inner.send_command(command);
        self.note(format!("{}#{command}", self.host), &result);
        result
    }

    fn send_config_set(&mut self, commands: &[String]) -> Result<String, DeviceError> {
        let result = self.inner.send_config_set(commands);
        let mut sent = format!("{}#configure terminal", self.host);
        for command in commands {
            sent.push_str(&format!("\n{}(config)#{command}", self.host));
        }
        self.note(sent, &result);
        result
    }

    fn save_config(&mut self) -> Result<String, DeviceError> {
        let result = self.inner.save_config();
        self.note(format!("{}#copy run start", self.host), &result);
        result
    }
}
