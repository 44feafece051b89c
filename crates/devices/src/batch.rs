use std::sync::Arc;

use netops_core::{DeviceError, DeviceTarget};
use tokio::sync::Semaphore;
use tokio::task;
use tracing::{error, info};

/// Blocking per-device unit of work run on the batch's worker threads.
pub trait DeviceWorker: Send + Sync + 'static {
    fn process(&self, target: &DeviceTarget) -> Result<String, DeviceError>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeviceOutcome {
    Succeeded { device: String, output: String },
    Failed { device: String, error: DeviceError },
    /// The worker itself died (panic or cancelled task) before reporting.
    Aborted { device: String, reason: String },
}

impl DeviceOutcome {
    pub fn device(&self) -> &str {
        match self {
            Self::Succeeded { device, .. }
            | Self::Failed { device, .. }
            | Self::Aborted { device, .. } => device,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }
}

/// Per-device outcomes of one batch, in target order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub outcomes: Vec<DeviceOutcome>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|outcome| outcome.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    pub fn all_failed(&self) -> bool {
        !self.outcomes.is_empty() && self.succeeded() == 0
    }
}

/// Fans a worker out over targets with at most `max_concurrency` sessions alive.
/// Waits for every worker; there is no early exit once started.
#[derive(Clone, Copy, Debug)]
pub struct BatchExecutor {
    max_concurrency: usize,
}

impl BatchExecutor {
    pub fn new(max_concurrency: usize) -> Self {
        Self { max_concurrency: max_concurrency.max(1) }
    }

    pub async fn run(&self, targets: Vec<DeviceTarget>, worker: Arc<dyn DeviceWorker>) -> BatchReport {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let total = targets.len();
        let mut handles = Vec::with_capacity(total);

        for target in targets {
            let device = target.address.clone();
            let permit = match Arc::clone(&semaphore).acquire_owned().await {
                Ok(permit) => permit,
                Err(closed) => {
                    handles.push((device, Err(closed.to_string())));
                    continue;
                }
            };
            let worker = Arc::clone(&worker);
            handles.push((
                device,
                Ok(task::spawn_blocking(move || {
                    let _permit = permit;
                    worker.process(&target)
                })),
            ));
        }

        let mut outcomes = Vec::with_capacity(total);
        for (device, handle) in handles {
            let outcome = match handle {
                Ok(handle) => match handle.await {
                    Ok(Ok(output)) => DeviceOutcome::Succeeded { device, output },
                    Ok(Err(error)) => DeviceOutcome::Failed { device, error },
                    Err(join_error) => {
                        error!(
                            event_name = "devices.batch.worker_aborted",
                            device = %device,
                            error = %join_error,
                            "device worker aborted"
                        );
                        DeviceOutcome::Aborted { device, reason: join_error.to_string() }
                    }
                },
                Err(reason) => DeviceOutcome::Aborted { device, reason },
            };
            outcomes.push(outcome);
        }

        let report = BatchReport { outcomes };
        info!(
            event_name = "devices.batch.completed",
            devices = total,
            succeeded = report.succeeded(),
            failed = report.failed(),
            max_concurrency = self.max_concurrency
        );
        report
    }
}
