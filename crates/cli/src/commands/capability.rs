use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use clap::Args;
use netops_core::config::{AppConfig, LoadOptions, LogFormat, LoggingConfig};
use netops_core::Credentials;
use netops_devices::automation::EXIT_USAGE;
use netops_devices::operations::{build_operation, parse_recover_flag};
use netops_devices::{DeviceAutomation, OperationKind, RunRequest};
use tracing::{info, warn, Level};

use super::{CommandResult, ErrorClass};

/// Relative to the working directory, which is the capability folder when dispatched.
pub const LOG_FILE: &str = "logs/netops.log";

#[derive(Debug, Clone, Default, Args)]
pub struct CapabilityArgs {
    #[arg(long, help = "Comma-separated device IPs or hostnames")]
    pub devices: Option<String>,
    #[arg(long, help = "Username for device login")]
    pub username: Option<String>,
    #[arg(long, help = "Password, also used as the enable secret")]
    pub password: Option<String>,
    #[arg(long, help = "Complete show command to run (show-commands)")]
    pub command: Option<String>,
    #[arg(long, help = "true/yes/1 bounces every err-disabled interface found (err-disabled)")]
    pub recover: Option<String>,
}

pub fn run(kind: OperationKind, args: CapabilityArgs) -> CommandResult {
    let config = match AppConfig::load_for_devices(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                kind.as_str(),
                ErrorClass::ConfigValidation,
                error.to_string(),
                usage_exit_code(),
            );
        }
    };

    if let Err(error) = init_file_logging(Path::new(LOG_FILE), &config.logging) {
        eprintln!("warning: file logging disabled: {error}");
    }

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                kind.as_str(),
                ErrorClass::Runtime,
                format!("failed to initialize async runtime: {error}"),
                1,
            );
        }
    };

    let output_dir = config.devices.output_dir.clone();
    let automation = DeviceAutomation::with_ssh(config.devices);
    runtime.block_on(execute(&automation, kind, &args, output_dir))
}

/// Validates the flags, then runs the operation over every device. Argument errors exit
/// with the usage code before any resolution happens.
pub async fn execute(
    automation: &DeviceAutomation,
    kind: OperationKind,
    args: &CapabilityArgs,
    output_dir: PathBuf,
) -> CommandResult {
    let request = match build_request(kind, args, output_dir) {
        Ok(request) => request,
        Err(message) => {
            warn!(event_name = "cli.capability.usage_error", operation = %kind, error = %message);
            return CommandResult {
                exit_code: usage_exit_code(),
                output: String::new(),
                error_output: format!("argument error: {message}"),
            };
        }
    };

    let summary = automation.run(request).await;
    info!(
        event_name = "cli.capability.finished",
        operation = %kind,
        exit_code = summary.exit_code,
        succeeded = summary.report.succeeded(),
        failed = summary.report.failed(),
        unreachable = summary.unreachable.len()
    );

    CommandResult {
        exit_code: u8::try_from(summary.exit_code).unwrap_or(1),
        output: summary.stdout,
        error_output: summary.stderr,
    }
}

pub fn build_request(
    kind: OperationKind,
    args: &CapabilityArgs,
    output_dir: PathBuf,
) -> Result<RunRequest, String> {
    let devices = required(&args.devices, "devices")?;
    let username = required(&args.username, "username")?;
    let password = required(&args.password, "password")?;
    let command = match kind {
        OperationKind::ShowCommands => Some(required(&args.command, "command")?),
        _ => None,
    };
    let operation =
        build_operation(kind, command.as_deref(), parse_recover_flag(args.recover.as_deref()))?;

    Ok(RunRequest {
        operation,
        devices,
        credentials: Credentials::new(username.trim(), password),
        output_dir,
    })
}

fn required(value: &Option<String>, name: &str) -> Result<String, String> {
    value
        .as_ref()
        .filter(|value| !value.trim().is_empty())
        .cloned()
        .ok_or_else(|| format!("--{name} is required and must not be blank"))
}

fn usage_exit_code() -> u8 {
    u8::try_from(EXIT_USAGE).unwrap_or(2)
}

fn init_file_logging(path: &Path, logging: &LoggingConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let level = logging.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_ansi(false)
        .with_max_level(level)
        .with_writer(Mutex::new(file));

    let result = match logging.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Compact => builder.compact().try_init(),
    };
    result.map_err(|error| anyhow!("{error}"))
}
