use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use netops_core::config::DevicesConfig;
use netops_core::domain::device::split_device_list;
use netops_core::{Credentials, DeviceError, ExecutionResult};
use tracing::{info, warn};

use crate::batch::{BatchExecutor, BatchReport, DeviceOutcome};
use crate::operations::DeviceOperation;
use crate::output::OutputStore;
use crate::resolver::{DeviceResolver, NetworkProbe, TcpProbe};
use crate::runner::SessionRunner;
use crate::session::{SessionConnector, SshConnector};

pub const EXIT_OK: i32 = 0;
pub const EXIT_NO_REACHABLE_DEVICES: i32 = 1;
pub const EXIT_USAGE: i32 = 2;
pub const EXIT_ALL_DEVICES_FAILED: i32 = 3;

pub const NO_VALID_DEVICES_MESSAGE: &str = "No valid IP addresses found after validation.";

pub struct RunRequest {
    pub operation: Arc<dyn DeviceOperation>,
    /// Comma-separated device tokens as typed by the operator.
    pub devices: String,
    pub credentials: Credentials,
    pub output_dir: PathBuf,
}

#[derive(Debug)]
pub struct RunSummary {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub unreachable: Vec<DeviceError>,
    pub report: BatchReport,
}

impl RunSummary {
    pub fn into_result(self) -> ExecutionResult {
        ExecutionResult::Completed { exit_code: self.exit_code, stdout: self.stdout, stderr: self.stderr }
    }
}

/// Resolve, then batch: the whole life of one capability run over a device list.
pub struct DeviceAutomation {
    config: DevicesConfig,
    probe: Arc<dyn NetworkProbe>,
    connector: Arc<dyn SessionConnector>,
}

impl DeviceAutomation {
    pub fn new(
        config: DevicesConfig,
        probe: Arc<dyn NetworkProbe>,
        connector: Arc<dyn SessionConnector>,
    ) -> Self {
        Self { config, probe, connector }
    }

    pub fn with_ssh(config: DevicesConfig) -> Self {
        let connector = Arc::new(SshConnector::new(&config));
        Self::new(config, Arc::new(TcpProbe), connector)
    }

    pub fn config(&self) -> &DevicesConfig {
        &self.config
    }

    pub async fn run(&self, request: RunRequest) -> RunSummary {
        let output = Arc::new(OutputStore::new(request.output_dir));
        let tokens = split_device_list(&request.devices);
        let resolver = DeviceResolver::new(Arc::clone(&self.probe), &self.config)
            .with_output(Arc::clone(&output));
        let resolution = resolver.resolve_all(&tokens).await;

        let mut stdout = String::new();
        for error in &resolution.unreachable {
            if let DeviceError::Unreachable { tried, .. } = error {
                let _ = writeln!(stdout, "ERROR: Invalid IP address or hostname: {}", tried.join(", "));
            }
        }

        if resolution.targets.is_empty() {
            warn!(
                event_name = "devices.run.no_reachable_devices",
                operation = %request.operation.kind(),
                tokens = tokens.len()
            );
            return RunSummary {
                exit_code: EXIT_NO_REACHABLE_DEVICES,
                stdout,
                stderr: format!("{NO_VALID_DEVICES_MESSAGE}\n"),
                unreachable: resolution.unreachable,
                report: BatchReport::default(),
            };
        }

        let resolved: Vec<&str> =
            resolution.targets.iter().map(|target| target.address.as_str()).collect();
        let _ = writeln!(stdout, "Resolved devices: {}", resolved.join(", "));
        info!(
            event_name = "devices.run.started",
            operation = %request.operation.kind(),
            devices = resolution.targets.len(),
            unreachable = resolution.unreachable.len()
        );

        let runner = Arc::new(SessionRunner::new(
            Arc::clone(&self.connector),
            Arc::clone(&request.operation),
            request.credentials,
            output,
            self.config.domain_suffixes.clone(),
        ));
        let report = BatchExecutor::new(self.config.max_concurrency)
            .run(resolution.targets, runner)
            .await;

        render_report(&mut stdout, &report, resolution.unreachable.len());
        let exit_code = if report.all_failed() { EXIT_ALL_DEVICES_FAILED } else { EXIT_OK };
        let stderr = if exit_code == EXIT_ALL_DEVICES_FAILED {
            "Every reachable device failed; see Failed Devices.csv.\n".to_owned()
        } else {
            String::new()
        };

        RunSummary { exit_code, stdout, stderr, unreachable: resolution.unreachable, report }
    }
}

fn render_report(stdout: &mut String, report: &BatchReport, unreachable: usize) {
    for outcome in &report.outcomes {
        let _ = writeln!(stdout);
        match outcome {
            DeviceOutcome::Succeeded { device, output } => {
                let _ = writeln!(stdout, "== {device} ==\n{output}");
            }
            DeviceOutcome::Failed { device, error } => {
                let _ = writeln!(stdout, "== {device} (failed) ==\nError on {device}, error: {error}");
            }
            DeviceOutcome::Aborted { device, reason } => {
                let _ = writeln!(stdout, "== {device} (aborted) ==\n{reason}");
            }
        }
    }
    let _ = writeln!(
        stdout,
        "\nSummary: {} succeeded, {} failed, {unreachable} unreachable.",
        report.succeeded(),
        report.failed()
    );
}
