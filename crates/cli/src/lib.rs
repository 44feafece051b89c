pub mod commands;

use clap::{Parser, Subcommand};
use netops_devices::OperationKind;
use std::process::ExitCode;

use commands::capability::CapabilityArgs;

#[derive(Debug, Parser)]
#[command(
    name = "netops",
    about = "NetOps operator CLI",
    long_about = "Run device automation capabilities and inspect the catalog, config and readiness.",
    after_help = "Examples:\n  netops capability show-commands --devices 10.1.1.1 --username admin --password '***' --command 'show version'\n  netops catalog --json\n  netops doctor"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(subcommand, about = "Run a device automation capability over a device list")]
    Capability(CapabilityCommand),
    #[command(about = "List the capability registry")]
    Catalog {
        #[arg(long, help = "Emit the full definitions as JSON")]
        json: bool,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, registry, entrypoints and capability folders")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

#[derive(Debug, Subcommand)]
enum CapabilityCommand {
    #[command(about = "Run one show command on every device")]
    ShowCommands(CapabilityArgs),
    #[command(about = "Remove the ACL bound to the SNMP read-only group")]
    SnmpAclRemoval(CapabilityArgs),
    #[command(about = "Report interfaces negotiated at half duplex (vEdge and cEdge)")]
    HalfDuplexCheck(CapabilityArgs),
    #[command(about = "Find err-disabled interfaces, optionally bouncing them")]
    ErrDisabled(CapabilityArgs),
}

impl CapabilityCommand {
    fn into_parts(self) -> (OperationKind, CapabilityArgs) {
        match self {
            Self::ShowCommands(args) => (OperationKind::ShowCommands, args),
            Self::SnmpAclRemoval(args) => (OperationKind::SnmpAclRemoval, args),
            Self::HalfDuplexCheck(args) => (OperationKind::HalfDuplexCheck, args),
            Self::ErrDisabled(args) => (OperationKind::ErrDisabled, args),
        }
    }
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Capability(capability) => {
            let (kind, args) = capability.into_parts();
            commands::capability::run(kind, args)
        }
        Command::Catalog { json } => commands::catalog::run(json),
        Command::Config => commands::CommandResult::output(0, commands::config::run()),
        Command::Doctor { json } => {
            let (passed, output) = commands::doctor::run(json);
            commands::CommandResult::output(if passed { 0 } else { 1 }, output)
        }
    };

    emit(&result);
    ExitCode::from(result.exit_code)
}

fn emit(result: &commands::CommandResult) {
    if !result.output.is_empty() {
        print!("{}", with_newline(&result.output));
    }
    if !result.error_output.is_empty() {
        eprint!("{}", with_newline(&result.error_output));
    }
}

fn with_newline(text: &str) -> String {
    if text.ends_with('\n') {
        text.to_string()
    } else {
        format!("{text}\n")
    }
}
