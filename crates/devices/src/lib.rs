pub mod automation;
pub mod batch;
pub mod capability;
pub mod operations;
pub mod output;
pub mod resolver;
pub mod runner;
pub mod session;

pub use automation::{DeviceAutomation, RunRequest, RunSummary};
pub use batch::{BatchExecutor, BatchReport, DeviceOutcome, DeviceWorker};
pub use capability::{in_process_capabilities, InProcessCapability};
pub use operations::{DeviceOperation, OperationKind};
pub use output::OutputStore;
pub use resolver::{DeviceResolver, NetworkProbe, TcpProbe};
pub use runner::SessionRunner;
pub use session::{DeviceSession, SessionConnector, SshConnector};
