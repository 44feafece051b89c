use std::fs;
use std::io;
use std::path::Path;

use netops_agent::dispatch::entrypoint_resolvable;
use netops_core::config::{AppConfig, ExecutionMode, LoadOptions};
use netops_core::CapabilityRegistry;
use serde::Serialize;
use serde_json::json;

const WRITE_PROBE: &str = ".netops-doctor";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

impl CheckStatus {
    fn marker(self) -> &'static str {
        match self {
            Self::Pass => "ok",
            Self::Fail => "fail",
            Self::Skipped => "skip",
        }
    }
}

/// Checks run in this order; a failure upstream skips the ones after it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckName {
    ConfigValidation,
    RegistryValidity,
    EntrypointResolution,
    OutputDirectory,
}

impl CheckName {
    fn as_str(self) -> &'static str {
        match self {
            Self::ConfigValidation => "config_validation",
            Self::RegistryValidity => "registry_validity",
            Self::EntrypointResolution => "entrypoint_resolution",
            Self::OutputDirectory => "output_directory",
        }
    }
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: CheckName,
    status: CheckStatus,
    details: String,
}

impl DoctorCheck {
    fn pass(name: CheckName, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Pass, details: details.into() }
    }

    fn fail(name: CheckName, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Fail, details: details.into() }
    }

    fn skipped(name: CheckName, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Skipped, details: details.into() }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: &'static str,
    checks: Vec<DoctorCheck>,
}

impl DoctorReport {
    fn from_checks(checks: Vec<DoctorCheck>) -> Self {
        let failed = checks.iter().any(|check| check.status == CheckStatus::Fail);
        let (overall_status, summary) = if failed {
            (CheckStatus::Fail, "doctor: one or more readiness checks failed")
        } else {
            (CheckStatus::Pass, "doctor: all readiness checks passed")
        };
        Self { overall_status, summary, checks }
    }

    fn render_human(&self) -> String {
        std::iter::once(self.summary.to_owned())
            .chain(self.checks.iter().map(|check| {
                format!("- [{}] {}: {}", check.status.marker(), check.name.as_str(), check.details)
            }))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Returns whether every check passed (skips count as passing) and the rendered report.
pub fn run(json_output: bool) -> (bool, String) {
    let report = DoctorReport::from_checks(collect_checks());
    let passed = report.overall_status == CheckStatus::Pass;

    let rendered = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            json!({ "overall_status": "fail", "summary": "doctor serialization failed", "error": error.to_string() })
                .to_string()
        })
    } else {
        report.render_human()
    };
    (passed, rendered)
}

fn collect_checks() -> Vec<DoctorCheck> {
    let (config_check, config) = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            (DoctorCheck::pass(CheckName::ConfigValidation, "configuration loaded and validated"), Some(config))
        }
        // Device-side checks still run when only the collaborator section is incomplete.
        Err(error) => (
            DoctorCheck::fail(CheckName::ConfigValidation, error.to_string()),
            AppConfig::load_for_devices(LoadOptions::default()).ok(),
        ),
    };

    let mut checks = vec![config_check];
    match config {
        Some(config) => checks.extend(capability_checks(&config)),
        None => checks.extend(skip_downstream(CheckName::RegistryValidity, "configuration did not load")),
    }
    checks
}

fn skip_downstream(from: CheckName, reason: &str) -> Vec<DoctorCheck> {
    [CheckName::RegistryValidity, CheckName::EntrypointResolution, CheckName::OutputDirectory]
        .into_iter()
        .skip_while(|name| *name != from)
        .map(|name| DoctorCheck::skipped(name, format!("skipped because {reason}")))
        .collect()
}

fn capability_checks(config: &AppConfig) -> Vec<DoctorCheck> {
    let registry = match CapabilityRegistry::load(&config.capabilities) {
        Ok(registry) => registry,
        Err(error) => {
            let mut checks = vec![DoctorCheck::fail(CheckName::RegistryValidity, error.to_string())];
            checks.extend(skip_downstream(CheckName::EntrypointResolution, "the registry did not load"));
            return checks;
        }
    };

    vec![
        DoctorCheck::pass(CheckName::RegistryValidity, format!("{} capabilities loaded", registry.len())),
        check_entrypoints(&registry, config),
        check_output_directories(&registry, &config.capabilities.base_dir),
    ]
}

fn check_entrypoints(registry: &CapabilityRegistry, config: &AppConfig) -> DoctorCheck {
    if config.capabilities.mode == ExecutionMode::InProcess {
        return DoctorCheck::skipped(CheckName::EntrypointResolution, "capabilities run in-process");
    }

    let unresolved: Vec<String> = registry
        .describe()
        .iter()
        .filter(|definition| !entrypoint_resolvable(definition, &config.capabilities.base_dir))
        .map(|definition| format!("{} (`{}`)", definition.id, definition.entrypoint))
        .collect();

    if unresolved.is_empty() {
        DoctorCheck::pass(CheckName::EntrypointResolution, "every entrypoint resolves")
    } else {
        DoctorCheck::fail(CheckName::EntrypointResolution, format!("not found: {}", unresolved.join(", ")))
    }
}

fn check_output_directories(registry: &CapabilityRegistry, base_dir: &Path) -> DoctorCheck {
    let failures: Vec<String> = registry
        .describe()
        .iter()
        .map(|definition| base_dir.join(&definition.folder))
        .filter_map(|folder| probe_writable(&folder).err().map(|error| format!("{}: {error}", folder.display())))
        .collect();

    if failures.is_empty() {
        DoctorCheck::pass(
            CheckName::OutputDirectory,
            format!("capability folders writable under `{}`", base_dir.display()),
        )
    } else {
        DoctorCheck::fail(CheckName::OutputDirectory, failures.join("; "))
    }
}

/// Creates `folder` if needed and proves a file can be written and removed there.
fn probe_writable(folder: &Path) -> io::Result<()> {
    fs::create_dir_all(folder)?;
    let probe = folder.join(WRITE_PROBE);
    fs::write(&probe, b"ok")?;
    fs::remove_file(probe)
}
