use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use netops_core::domain::execution::{DEVICES_PARAM, PASSWORD_PARAM, USERNAME_PARAM};
use netops_core::domain::intent::present_value;
use netops_core::registry::{ACL_REMOVAL_ID, ERR_DISABLED_ID, HALF_DUPLEX_ID, SHOW_COMMANDS_ID};
use netops_core::{
    Capability, CapabilityDefinition, CapabilityRegistry, CapabilitySet, Credentials, DomainError,
    ExecutionResult, Parameters,
};
use tracing::{info, warn};

use crate::automation::{DeviceAutomation, RunRequest};
use crate::operations::{build_operation, parse_recover_flag, OperationKind};

pub const COMMAND_PARAM: &str = "command";
pub const RECOVER_PARAM: &str = "recover";

/// Runs a device operation inside the calling process, honouring the same
/// flag contract as the out-of-process executable.
pub struct InProcessCapability {
    definition: CapabilityDefinition,
    kind: OperationKind,
    automation: Arc<DeviceAutomation>,
    output_dir: PathBuf,
}

impl InProcessCapability {
    pub fn new(
        definition: CapabilityDefinition,
        kind: OperationKind,
        automation: Arc<DeviceAutomation>,
        output_dir: PathBuf,
    ) -> Self {
        Self { definition, kind, automation, output_dir }
    }
}

#[async_trait]
impl Capability for InProcessCapability {
    fn definition(&self) -> &CapabilityDefinition {
        &self.definition
    }

    async fn run(&self, parameters: &Parameters) -> Result<ExecutionResult, DomainError> {
        self.definition.build_arguments(parameters)?;

        let required = |name: &str| {
            present_value(parameters, name)
                .map(str::to_owned)
                .ok_or_else(|| DomainError::MissingParameter(name.to_owned()))
        };
        let devices = required(DEVICES_PARAM)?;
        let username = required(USERNAME_PARAM)?;
        let password = required(PASSWORD_PARAM)?;
        let operation = build_operation(
            self.kind,
            present_value(parameters, COMMAND_PARAM),
            parse_recover_flag(present_value(parameters, RECOVER_PARAM)),
        )
        .map_err(DomainError::MalformedIntent)?;

        info!(
            event_name = "devices.capability.in_process_started",
            capability_id = %self.definition.id,
            operation = %self.kind
        );
        let summary = self
            .automation
            .run(RunRequest {
                operation,
                devices,
                credentials: Credentials::new(username, password),
                output_dir: self.output_dir.clone(),
            })
            .await;
        Ok(summary.into_result())
    }
}

/// Operation behind a catalog entry: the trailing entrypoint argument, else the built-in id.
pub fn operation_kind_for(definition: &CapabilityDefinition) -> Option<OperationKind> {
    if let Some(kind) =
        definition.entrypoint_args.last().and_then(|arg| arg.parse::<OperationKind>().ok())
    {
        return Some(kind);
    }
    match definition.id.as_str() {
        SHOW_COMMANDS_ID => Some(OperationKind::ShowCommands),
        ACL_REMOVAL_ID => Some(OperationKind::SnmpAclRemoval),
        HALF_DUPLEX_ID => Some(OperationKind::HalfDuplexCheck),
        ERR_DISABLED_ID => Some(OperationKind::ErrDisabled),
        _ => None,
    }
}

/// In-process adapters for every catalog entry backed by a device operation.
/// Outputs land in `<base_dir>/<folder>/<output_dir>`, as they would for the executable.
pub fn in_process_capabilities(
    registry: &CapabilityRegistry,
    automation: Arc<DeviceAutomation>,
    base_dir: &Path,
) -> CapabilitySet {
    let mut set = CapabilitySet::default();
    for definition in registry.describe() {
        let Some(kind) = operation_kind_for(definition) else {
            warn!(
                event_name = "devices.capability.no_in_process_operation",
                capability_id = %definition.id,
                "capability has no in-process device operation and will not be runnable"
            );
            continue;
        };
        let output_dir =
            base_dir.join(&definition.folder).join(&automation.config().output_dir);
        set.register(Arc::new(InProcessCapability::new(
            definition.clone(),
            kind,
            Arc::clone(&automation),
            output_dir,
        )));
    }
    set
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use netops_core::config::DevicesConfig;
    use netops_core::registry::{builtin_catalog, ACL_REMOVAL_ID, SHOW_COMMANDS_ID};
    use netops_core::{
        CapabilityRegistry, Credentials, DeviceError, DeviceTarget, DomainError, ExecutionResult,
        Parameters,
    };
    use tempfile::TempDir;

    use super::{in_process_capabilities, operation_kind_for};
    use crate::automation::DeviceAutomation;
    use crate::operations::OperationKind;
    use crate::resolver::NetworkProbe;
    use crate::session::{DeviceSession, SessionConnector};

    struct AllOpen;

    #[async_trait]
    impl NetworkProbe for AllOpen {
        async fn lookup(&self, _host: &str, _port: u16) -> Option<SocketAddr> {
            None
        }

        async fn reachable(&self, _address: SocketAddr, _timeout: Duration) -> bool {
            true
        }
    }

    struct Canned;

    impl DeviceSession for Canned {
        fn enable(&mut self) -> Result<(), DeviceError> {
            Ok(())
        }

        fn send_command(&mut self, _command: &str) -> Result<String, DeviceError> {
            Ok("Cisco IOS XE Software, Version 17.9.4".to_owned())
        }

        fn send_config_set(&mut self, _commands: &[String]) -> Result<String, DeviceError> {
            Ok(String::new())
        }

        fn save_config(&mut self) -> Result<String, DeviceError> {
            Ok(String::new())
        }
    }

    struct CannedConnector;

    impl SessionConnector for CannedConnector {
        fn open(
            &self,
            _target: &DeviceTarget,
            _credentials: &Credentials,
        ) -> Result<Box<dyn DeviceSession>, DeviceError> {
            Ok(Box::new(Canned))
        }
    }

    fn params(pairs: &[(&str, &str)]) -> Parameters {
        pairs.iter().map(|(key, value)| ((*key).to_owned(), (*value).to_owned())).collect()
    }

    #[tokio::test]
    async fn in_process_run_produces_completed_result_in_capability_folder() {
        let dir = TempDir::new().expect("tempdir");
        let registry = CapabilityRegistry::new(builtin_catalog("netops")).expect("catalog");
        let automation = Arc::new(DeviceAutomation::new(
            DevicesConfig::default(),
            Arc::new(AllOpen),
            Arc::new(CannedConnector),
        ));
        let set = in_process_capabilities(&registry, automation, dir.path());
        assert_eq!(set.len(), 4);

        let capability = set.get(SHOW_COMMANDS_ID).expect("registered");
        let result = capability
            .run(&params(&[
                ("devices", "10.1.1.1"),
                ("username", "netadmin"),
                ("password", "s3cret"),
                ("command", "show version"),
            ]))
            .await
            .expect("run");

        match result {
            ExecutionResult::Completed { exit_code, stdout, .. } => {
                assert_eq!(exit_code, 0);
                assert!(stdout.contains("10.1.1.1#show version\nCisco IOS XE Software"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(dir
            .path()
            .join(SHOW_COMMANDS_ID)
            .join("Outputs")
            .join("show version for device 10.1.1.1.txt")
            .exists());
    }

    #[tokio::test]
    async fn missing_required_parameter_is_rejected_before_any_work() {
        let dir = TempDir::new().expect("tempdir");
        let registry = CapabilityRegistry::new(builtin_catalog("netops")).expect("catalog");
        let automation = Arc::new(DeviceAutomation::new(
            DevicesConfig::default(),
            Arc::new(AllOpen),
            Arc::new(CannedConnector),
        ));
        let set = in_process_capabilities(&registry, automation, dir.path());

        let error = set
            .get(ACL_REMOVAL_ID)
            .expect("registered")
            .run(&params(&[("devices", "10.1.1.1"), ("username", "netadmin")]))
            .await
            .expect_err("no password");
        assert_eq!(error, DomainError::MissingParameter("password".to_owned()));
        assert!(!dir.path().join(ACL_REMOVAL_ID).exists());
    }

    #[test]
    fn operation_kind_comes_from_entrypoint_args_then_id() {
        let mut catalog = builtin_catalog("netops");
        assert_eq!(operation_kind_for(&catalog[2]), Some(OperationKind::HalfDuplexCheck));

        catalog[3].entrypoint_args.clear();
        assert_eq!(operation_kind_for(&catalog[3]), Some(OperationKind::ErrDisabled));

        catalog[0].id = "custom".to_owned();
        catalog[0].entrypoint_args = vec!["--verbose".to_owned()];
        assert_eq!(operation_kind_for(&catalog[0]), None);
    }
}
