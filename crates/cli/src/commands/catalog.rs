use netops_core::config::{AppConfig, LoadOptions};
use netops_core::{CapabilityDefinition, CapabilityRegistry};

use super::{CommandResult, ErrorClass};

pub fn run(json_output: bool) -> CommandResult {
    let config = match AppConfig::load_for_devices(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure("catalog", ErrorClass::ConfigValidation, error.to_string(), 2);
        }
    };
    let registry = match CapabilityRegistry::load(&config.capabilities) {
        Ok(registry) => registry,
        Err(error) => return CommandResult::failure("catalog", ErrorClass::Registry, error.to_string(), 2),
    };

    if json_output {
        return match serde_json::to_string_pretty(registry.describe()) {
            Ok(rendered) => CommandResult::output(0, rendered),
            Err(error) => CommandResult::failure("catalog", ErrorClass::Serialization, error.to_string(), 1),
        };
    }
    CommandResult::output(0, render_human(&registry))
}

pub fn render_human(registry: &CapabilityRegistry) -> String {
    let mut lines = vec![format!("{} capabilities:", registry.len())];
    for definition in registry.describe() {
        lines.push(String::new());
        lines.push(format!("- ID: {}", definition.id));
        lines.push(format!("  Name: {}", definition.display_name));
        lines.push(format!("  Description: {}", definition.description));
        lines.push(format!("  Parameters: {}", render_parameters(definition)));
        lines.push(format!("  Runs: {}", render_invocation(definition)));
    }
    lines.join("\n")
}

fn render_parameters(definition: &CapabilityDefinition) -> String {
    definition
        .cli_params
        .iter()
        .map(|spec| {
            let requirement = if spec.required { "required" } else { "optional" };
            format!("{} ({}, {requirement})", spec.name, spec.flag)
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn render_invocation(definition: &CapabilityDefinition) -> String {
    let mut parts = vec![definition.entrypoint.clone()];
    parts.extend(definition.entrypoint_args.iter().cloned());
    format!("{} (in {}/)", parts.join(" "), definition.folder)
}
