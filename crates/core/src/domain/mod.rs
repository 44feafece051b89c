pub mod capability;
pub mod conversation;
pub mod device;
pub mod execution;
pub mod intent;
