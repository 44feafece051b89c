use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use netops_core::{DeviceError, DeviceTarget, SessionFailureKind};
use regex::Regex;
use tracing::{info, warn};

use crate::output::{
    command_slug, OutputStore, CONFIGURED_DEVICES_FILE, ERR_DISABLED_FILE, FULL_DUPLEX_FILE,
    HALF_DUPLEX_FILE,
};
use crate::session::DeviceSession;

pub const SNMP_GROUP_COMMAND: &str =
    "snmp-server group grpallRO v3 priv read fullview write noview notify fullview";
pub const SNMP_VERIFY_COMMAND: &str = "show run | inc grpallRO";
pub const SNMP_ACL_MARKER: &str = "access 61";
pub const INVENTORY_COMMAND: &str = "show inventory";
pub const VEDGE_DUPLEX_COMMAND: &str = "show interface | tab | inc half|inc Half";
pub const CEDGE_DUPLEX_COMMAND: &str = "show interface | inc Giga|TenGig|Duplex";
pub const ERR_DISABLED_COMMAND: &str = "show interfaces status err-disabled";
pub const ERR_DISABLED_INTERFACE_PATTERN: &str = r"[a-zA-Z]+\d+/(?:\d+/)*\d+";

/// Per-device inputs shared by every operation.
pub struct DeviceContext<'a> {
    pub target: &'a DeviceTarget,
    /// Host name used as the prompt prefix, e.g. `rtr01` in `rtr01#show clock`.
    pub host: String,
    pub output: &'a OutputStore,
}

impl DeviceContext<'_> {
    fn echo(&self, command: &str, output: &str) -> String {
        format!("{}#{command}\n{output}", self.host)
    }

    fn persist_csv(&self, file_name: &str, fields: &[&str]) {
        if let Err(error) = self.output.append_csv(file_name, fields) {
            warn!(
                event_name = "devices.output.write_failed",
                device = %self.target.address,
                file = file_name,
                error = %error
            );
        }
    }
}

/// The work done inside one authenticated session. Returns the text reported for the device.
pub trait DeviceOperation: Send + Sync {
    fn kind(&self) -> OperationKind;

    /// Name of the per-device transcript inside the output directory.
    fn transcript_file(&self, address: &str) -> String {
        format!("{address} {}.txt", self.kind())
    }

    fn execute(
        &self,
        session: &mut dyn DeviceSession,
        device: &DeviceContext<'_>,
    ) -> Result<String, DeviceError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperationKind {
    ShowCommands,
    SnmpAclRemoval,
    HalfDuplexCheck,
    ErrDisabled,
}

impl OperationKind {
    pub const ALL: [OperationKind; 4] =
        [Self::ShowCommands, Self::SnmpAclRemoval, Self::HalfDuplexCheck, Self::ErrDisabled];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ShowCommands => "show-commands",
            Self::SnmpAclRemoval => "snmp-acl-removal",
            Self::HalfDuplexCheck => "half-duplex-check",
            Self::ErrDisabled => "err-disabled",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == value.trim())
            .ok_or_else(|| format!("unknown device operation `{value}`"))
    }
}

/// Builds the operation for `kind`. `command` is used by show-commands, `recover` by err-disabled.
pub fn build_operation(
    kind: OperationKind,
    command: Option<&str>,
    recover: bool,
) -> Result<Arc<dyn DeviceOperation>, String> {
    Ok(match kind {
        OperationKind::ShowCommands => {
            let command = command
                .map(str::trim)
                .filter(|command| !command.is_empty())
                .ok_or_else(|| "show-commands requires a command".to_owned())?;
            Arc::new(ShowCommands { command: command.to_owned() })
        }
        OperationKind::SnmpAclRemoval => Arc::new(SnmpAclRemoval),
        OperationKind::HalfDuplexCheck => Arc::new(HalfDuplexCheck),
        OperationKind::ErrDisabled => Arc::new(ErrDisabled::new(recover)?),
    })
}

/// Interprets the `--recover` value: `true`, `yes`, `y` and `1` enable recovery.
pub fn parse_recover_flag(value: Option<&str>) -> bool {
    matches!(
        value.map(|value| value.trim().to_ascii_lowercase()).as_deref(),
        Some("true" | "yes" | "y" | "1")
    )
}

pub struct ShowCommands {
    pub command: String,
}

impl DeviceOperation for ShowCommands {
    fn kind(&self) -> OperationKind {
        OperationKind::ShowCommands
    }

    fn transcript_file(&self, address: &str) -> String {
        format!("{} for device {address}.txt", command_slug(&self.command))
    }

    fn execute(
        &self,
        session: &mut dyn DeviceSession,
        device: &DeviceContext<'_>,
    ) -> Result<String, DeviceError> {
        session.enable()?;
        let output = session.send_command(&self.command)?;
        info!(
            event_name = "devices.operation.command_ran",
            device = %device.target.address,
            command = %self.command
        );
        Ok(device.echo(&self.command, &output))
    }
}

pub struct SnmpAclRemoval;

impl DeviceOperation for SnmpAclRemoval {
    fn kind(&self) -> OperationKind {
        OperationKind::SnmpAclRemoval
    }

    fn execute(
        &self,
        session: &mut dyn DeviceSession,
        device: &DeviceContext<'_>,
    ) -> Result<String, DeviceError> {
        session.enable()?;
        session.send_config_set(&[SNMP_GROUP_COMMAND.to_owned()])?;
        let verification = session.send_command(SNMP_VERIFY_COMMAND)?;
        session.save_config()?;

        let echoed = device.echo(SNMP_VERIFY_COMMAND, &verification);
        if verification.contains(SNMP_ACL_MARKER) {
            return Err(DeviceError::session(
                &device.target.address,
                SessionFailureKind::Verification,
                format!("SNMP group still bound to an ACL:\n{echoed}"),
            ));
        }

        device.persist_csv(CONFIGURED_DEVICES_FILE, &[&device.target.address, verification.trim()]);
        Ok(format!(
            "ACL from SNMP Group on device {} removed successfully\n{echoed}",
            device.target.address
        ))
    }
}

pub struct HalfDuplexCheck;

impl DeviceOperation for HalfDuplexCheck {
    fn kind(&self) -> OperationKind {
        OperationKind::HalfDuplexCheck
    }

    fn execute(
        &self,
        session: &mut dyn DeviceSession,
        device: &DeviceContext<'_>,
    ) -> Result<String, DeviceError> {
        session.enable()?;
        let inventory = session.send_command(INVENTORY_COMMAND)?;
        let command = if inventory.contains("syntax error") {
            VEDGE_DUPLEX_COMMAND
        } else {
            CEDGE_DUPLEX_COMMAND
        };
        let output = session.send_command(command)?;

        let half = output.contains("Half");
        let file_name = if half { HALF_DUPLEX_FILE } else { FULL_DUPLEX_FILE };
        device.persist_csv(file_name, &[&device.host, command, output.trim()]);
        info!(
            event_name = "devices.operation.duplex_checked",
            device = %device.target.address,
            half_duplex = half
        );

        let verdict = if half {
            "half-duplex interfaces found"
        } else {
            "all interfaces running full duplex"
        };
        Ok(format!("{}\n{verdict}", device.echo(command, &output)))
    }
}

pub struct ErrDisabled {
    recover: bool,
    pattern: Regex,
}

impl ErrDisabled {
    pub fn new(recover: bool) -> Result<Self, String> {
        let pattern = Regex::new(ERR_DISABLED_INTERFACE_PATTERN)
            .map_err(|error| format!("interface pattern: {error}"))?;
        Ok(Self { recover, pattern })
    }

    pub fn interfaces(&self, output: &str) -> Vec<String> {
        self.pattern.find_iter(output).map(|found| found.as_str().to_owned()).collect()
    }
}

impl DeviceOperation for ErrDisabled {
    fn kind(&self) -> OperationKind {
        OperationKind::ErrDisabled
    }

    fn execute(
        &self,
        session: &mut dyn DeviceSession,
        device: &DeviceContext<'_>,
    ) -> Result<String, DeviceError> {
        session.enable()?;
        let output = session.send_command(ERR_DISABLED_COMMAND)?;
        let interfaces = self.interfaces(&output);
        let mut report = device.echo(ERR_DISABLED_COMMAND, &output);

        if interfaces.is_empty() {
            report.push_str("\nNo interfaces in err-disabled state.");
            return Ok(report);
        }

        device.persist_csv(ERR_DISABLED_FILE, &[&device.host, &interfaces.join(", ")]);
        if !self.recover {
            report.push_str(&format!("\nErr-disabled interfaces: {}", interfaces.join(", ")));
            return Ok(report);
        }

        for interface in &interfaces {
            session.send_config_set(&[
                format!("interface {interface}"),
                "shutdown".to_owned(),
                "no shutdown".to_owned(),
            ])?;
            info!(
                event_name = "devices.operation.interface_recovered",
                device = %device.target.address,
                interface = %interface
            );
        }
        session.save_config()?;
        report.push_str(&format!("\nRecovered interfaces: {}", interfaces.join(", ")));
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use netops_core::{DeviceError, DeviceTarget, SessionFailureKind};
    use tempfile::TempDir;

    use super::{
        build_operation, parse_recover_flag, DeviceContext, ErrDisabled, OperationKind,
        CEDGE_DUPLEX_COMMAND, ERR_DISABLED_COMMAND, INVENTORY_COMMAND, SNMP_VERIFY_COMMAND,
        VEDGE_DUPLEX_COMMAND,
    };
    use crate::output::{
        OutputStore, CONFIGURED_DEVICES_FILE, ERR_DISABLED_FILE, HALF_DUPLEX_FILE,
    };
    use crate::session::DeviceSession;

    /// Scripted session: answers commands from a table and records everything sent.
    #[derive(Default)]
    struct ScriptedSession {
        replies: Vec<(&'static str, &'static str)>,
        sent: Vec<String>,
        saved: bool,
    }

    impl DeviceSession for ScriptedSession {
        fn enable(&mut self) -> Result<(), DeviceError> {
            self.sent.push("enable".to_owned());
            Ok(())
        }

        fn send_command(&mut self, command: &str) -> Result<String, DeviceError> {
            self.sent.push(command.to_owned());
            Ok(self
                .replies
                .iter()
                .find(|(expected, _)| *expected == command)
                .map(|(_, reply)| (*reply).to_owned())
                .unwrap_or_default())
        }

        fn send_config_set(&mut self, commands: &[String]) -> Result<String, DeviceError> {
            self.sent.extend(commands.iter().cloned());
            Ok(String::new())
        }

        fn save_config(&mut self) -> Result<String, DeviceError> {
            self.saved = true;
            self.sent.push("copy run start".to_owned());
            Ok(String::new())
        }
    }

    fn target() -> DeviceTarget {
        DeviceTarget {
            token: "rtr01".to_owned(),
            address: "rtr01.mgmt.internal.das".to_owned(),
            socket: "10.0.0.1:22".parse().expect("socket"),
            reachable: true,
        }
    }

    #[test]
    fn show_commands_reports_the_prompted_output() {
        let dir = TempDir::new().expect("tempdir");
        let output = OutputStore::new(dir.path());
        let target = target();
        let context =
            DeviceContext { target: &target, host: "rtr01".to_owned(), output: &output };
        let mut session = ScriptedSession {
            replies: vec![("show clock", "*10:01:02 UTC Mon Jan 5 2026")],
            ..ScriptedSession::default()
        };

        let operation =
            build_operation(OperationKind::ShowCommands, Some("show clock"), false).expect("operation");
        let report = operation.execute(&mut session, &context).expect("success");

        assert_eq!(report, "rtr01#show clock\n*10:01:02 UTC Mon Jan 5 2026");
        assert_eq!(
            operation.transcript_file("rtr01.mgmt.internal.das"),
            "show clock for device rtr01.mgmt.internal.das.txt"
        );
        assert!(fs::read_dir(dir.path()).map_or(true, |mut entries| entries.next().is_none()));
    }

    #[test]
    fn acl_removal_fails_verification_when_acl_is_still_bound() {
        let dir = TempDir::new().expect("tempdir");
        let output = OutputStore::new(dir.path());
        let target = target();
        let context =
            DeviceContext { target: &target, host: "rtr01".to_owned(), output: &output };
        let mut session = ScriptedSession {
            replies: vec![(
                SNMP_VERIFY_COMMAND,
                "snmp-server group grpallRO v3 priv read fullview access 61",
            )],
            ..ScriptedSession::default()
        };

        let operation =
            build_operation(OperationKind::SnmpAclRemoval, None, false).expect("operation");
        let error = operation.execute(&mut session, &context).expect_err("acl still bound");

        assert!(matches!(
            error,
            DeviceError::Session { kind: SessionFailureKind::Verification, .. }
        ));
        assert!(session.saved, "configuration is saved even when verification fails");
        assert!(!output.path(CONFIGURED_DEVICES_FILE).exists());
    }

    #[test]
    fn acl_removal_records_configured_device() {
        let dir = TempDir::new().expect("tempdir");
        let output = OutputStore::new(dir.path());
        let target = target();
        let context =
            DeviceContext { target: &target, host: "rtr01".to_owned(), output: &output };
        let mut session = ScriptedSession {
            replies: vec![(
                SNMP_VERIFY_COMMAND,
                "snmp-server group grpallRO v3 priv read fullview write noview notify fullview",
            )],
            ..ScriptedSession::default()
        };

        let operation =
            build_operation(OperationKind::SnmpAclRemoval, None, false).expect("operation");
        let report = operation.execute(&mut session, &context).expect("configured");

        assert!(report.contains("removed successfully"));
        assert_eq!(
            session.sent,
            vec![
                "enable",
                "snmp-server group grpallRO v3 priv read fullview write noview notify fullview",
                SNMP_VERIFY_COMMAND,
                "copy run start",
            ]
        );
        let configured = fs::read_to_string(output.path(CONFIGURED_DEVICES_FILE)).expect("csv");
        assert!(configured.starts_with("rtr01.mgmt.internal.das,"));
    }

    #[test]
    fn half_duplex_check_switches_command_for_vedge() {
        let dir = TempDir::new().expect("tempdir");
        let output = OutputStore::new(dir.path());
        let target = target();
        let context =
            DeviceContext { target: &target, host: "rtr01".to_owned(), output: &output };
        let mut session = ScriptedSession {
            replies: vec![
                (INVENTORY_COMMAND, "syntax error: unknown command"),
                (VEDGE_DUPLEX_COMMAND, "ge0/1  Up  Half  100"),
            ],
            ..ScriptedSession::default()
        };

        let operation =
            build_operation(OperationKind::HalfDuplexCheck, None, false).expect("operation");
        let report = operation.execute(&mut session, &context).expect("checked");

        assert!(session.sent.iter().any(|sent| sent == VEDGE_DUPLEX_COMMAND));
        assert!(!session.sent.iter().any(|sent| sent == CEDGE_DUPLEX_COMMAND));
        assert!(report.ends_with("half-duplex interfaces found"));
        let half = fs::read_to_string(output.path(HALF_DUPLEX_FILE)).expect("csv");
        assert!(half.starts_with("rtr01,"));
    }

    #[test]
    fn err_disabled_extracts_interfaces_and_bounces_them_on_recover() {
        let dir = TempDir::new().expect("tempdir");
        let output = OutputStore::new(dir.path());
        let target = target();
        let context =
            DeviceContext { target: &target, host: "rtr01".to_owned(), output: &output };
        let mut session = ScriptedSession {
            replies: vec![(
                ERR_DISABLED_COMMAND,
                "Port      Name  Status       Reason\nGi1/0/3         err-disabled bpduguard\nTe2/1/1/4       err-disabled link-flap",
            )],
            ..ScriptedSession::default()
        };

        let operation =
            build_operation(OperationKind::ErrDisabled, None, true).expect("operation");
        let report = operation.execute(&mut session, &context).expect("recovered");

        assert!(report.ends_with("Recovered interfaces: Gi1/0/3, Te2/1/1/4"));
        assert!(session.saved);
        assert!(session.sent.iter().any(|sent| sent == "interface Te2/1/1/4"));
        assert_eq!(session.sent.iter().filter(|sent| *sent == "no shutdown").count(), 2);
        let recorded = fs::read_to_string(output.path(ERR_DISABLED_FILE)).expect("csv");
        assert_eq!(recorded, "rtr01,\"Gi1/0/3, Te2/1/1/4\"\n");
    }

    #[test]
    fn err_disabled_without_recover_only_reports() {
        let operation = ErrDisabled::new(false).expect("pattern");
        assert_eq!(operation.interfaces("Gi0/1 err-disabled\nFa0/24 err-disabled"), vec!["Gi0/1", "Fa0/24"]);
        assert!(operation.interfaces("no ports").is_empty());
    }

    #[test]
    fn operation_names_and_flags_parse() {
        assert_eq!("snmp-acl-removal".parse::<OperationKind>(), Ok(OperationKind::SnmpAclRemoval));
        assert!("reload".parse::<OperationKind>().is_err());
        assert!(parse_recover_flag(Some(" Yes ")));
        assert!(!parse_recover_flag(Some("false")));
        assert!(!parse_recover_flag(None));
        assert!(build_operation(OperationKind::ShowCommands, Some("  "), false).is_err());
    }
}
