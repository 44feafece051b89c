pub mod audit;
pub mod capability;
pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod registry;

pub use capability::{Capability, CapabilitySet};
pub use domain::capability::{CapabilityDefinition, CapabilitySummary, ParameterDoc, ParameterSpec};
pub use domain::conversation::{ConversationTurn, Role, SessionId, Transcript};
pub use domain::device::{Credentials, DeviceTarget};
pub use domain::execution::{ExecutionContext, ExecutionResult};
pub use domain::intent::{ExecutionIntent, Parameters};
pub use errors::{
    ApplicationError, DeviceError, DomainError, InterfaceError, InterfaceErrorKind,
    SessionFailureKind,
};
pub use registry::{CapabilityRegistry, RegistryError};
