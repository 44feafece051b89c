use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::config::CapabilitiesConfig;
use crate::domain::capability::{
    CapabilityDefinition, CapabilitySummary, ParameterDoc, ParameterSpec,
};
use crate::errors::DomainError;

pub const SHOW_COMMANDS_ID: &str = "runShowCommands-main";
pub const ACL_REMOVAL_ID: &str = "aclRemoval-main";
pub const HALF_DUPLEX_ID: &str = "shIntStatHalf_SD-WAN-main";
pub const ERR_DISABLED_ID: &str = "showErrDisableInt-main";

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("could not read capability catalog `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse capability catalog `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("invalid capability catalog: {0}")]
    Invalid(String),
}

/// Immutable catalog of capabilities, in declaration order.
#[derive(Clone, Debug)]
pub struct CapabilityRegistry {
    definitions: Vec<CapabilityDefinition>,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    capability: Vec<CapabilityDefinition>,
}

impl CapabilityRegistry {
    pub fn new(definitions: Vec<CapabilityDefinition>) -> Result<Self, RegistryError> {
        validate_definitions(&definitions)?;
        Ok(Self { definitions })
    }

    /// Loads the configured catalog file, or the built-in catalog when none is set.
    pub fn load(config: &CapabilitiesConfig) -> Result<Self, RegistryError> {
        match &config.registry_path {
            Some(path) => Self::from_toml_file(path),
            None => Self::new(builtin_catalog(&config.executable)),
        }
    }

    pub fn from_toml_file(path: &Path) -> Result<Self, RegistryError> {
        let raw = fs::read_to_string(path)
            .map_err(|source| RegistryError::ReadFile { path: path.to_path_buf(), source })?;
        let catalog: CatalogFile = toml::from_str(&raw)
            .map_err(|source| RegistryError::ParseFile { path: path.to_path_buf(), source })?;
        Self::new(catalog.capability)
    }

    pub fn describe(&self) -> &[CapabilityDefinition] {
        &self.definitions
    }

    pub fn summaries(&self) -> Vec<CapabilitySummary> {
        self.definitions.iter().map(CapabilityDefinition::summary).collect()
    }

    pub fn get(&self, id: &str) -> Result<&CapabilityDefinition, DomainError> {
        self.definitions
            .iter()
            .find(|definition| definition.id == id)
            .ok_or_else(|| DomainError::UnknownCapability(id.to_owned()))
    }

    pub fn required_parameters(&self, id: &str) -> Result<BTreeSet<String>, DomainError> {
        self.get(id).map(CapabilityDefinition::required_parameters)
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.definitions.iter().map(|definition| definition.id.as_str())
    }
}

fn validate_definitions(definitions: &[CapabilityDefinition]) -> Result<(), RegistryError> {
    if definitions.is_empty() {
        return Err(RegistryError::Invalid("catalog defines no capabilities".to_owned()));
    }

    let mut seen = HashSet::new();
    for definition in definitions {
        if definition.id.trim().is_empty() {
            return Err(RegistryError::Invalid("capability id must not be empty".to_owned()));
        }
        if !seen.insert(definition.id.as_str()) {
            return Err(RegistryError::Invalid(format!(
                "duplicate capability id `{}`",
                definition.id
            )));
        }
        if definition.entrypoint.trim().is_empty() {
            return Err(RegistryError::Invalid(format!(
                "capability `{}` has an empty entrypoint",
                definition.id
            )));
        }

        let mut names = HashSet::new();
        for spec in &definition.cli_params {
            if spec.name.trim().is_empty() {
                return Err(RegistryError::Invalid(format!(
                    "capability `{}` declares a parameter without a name",
                    definition.id
                )));
            }
            if !spec.flag.starts_with("--") || spec.flag.len() < 3 {
                return Err(RegistryError::Invalid(format!(
                    "capability `{}` parameter `{}` has invalid flag `{}` (expected `--name`)",
                    definition.id, spec.name, spec.flag
                )));
            }
            if !names.insert(spec.name.as_str()) {
                return Err(RegistryError::Invalid(format!(
                    "capability `{}` declares parameter `{}` twice",
                    definition.id, spec.name
                )));
            }
        }
    }

    Ok(())
}

/// The four device-automation capabilities, run through `<executable> capability <operation>`.
pub fn builtin_catalog(executable: &str) -> Vec<CapabilityDefinition> {
    let credentials = || {
        vec![
            required("devices"),
            required("username"),
            required("password"),
        ]
    };
    let credential_docs = |devices: &str| {
        vec![
            doc("devices", devices),
            doc("username", "Username for device login"),
            doc("password", "Password (also used as enable secret)"),
        ]
    };

    let mut show_params = credentials();
    show_params.push(required("command"));
    let mut show_docs = credential_docs("Comma-separated list of device IPs/hostnames");
    show_docs.push(doc("command", "Complete show command to run"));

    let mut err_params = credentials();
    err_params.push(ParameterSpec {
        name: "recover".to_owned(),
        flag: "--recover".to_owned(),
        required: false,
    });
    let mut err_docs = credential_docs("Devices to analyze");
    err_docs.push(doc("recover", "Set to true to bounce (shutdown/no shutdown) every err-disabled interface found"));

    vec![
        builtin(
            executable,
            SHOW_COMMANDS_ID,
            "Run Show Commands",
            "Execute any show command on one or multiple network devices using SSH. Validates \
             reachability, runs the command and stores outputs in text files under Outputs.",
            "show-commands",
            show_params,
            show_docs,
        ),
        builtin(
            executable,
            ACL_REMOVAL_ID,
            "ACL Removal in SNMP Group",
            "Remove the SNMP Group ACL on multiple devices and record configured and failed devices.",
            "snmp-acl-removal",
            credentials(),
            credential_docs("Devices where the SNMP Group ACL will be removed"),
        ),
        builtin(
            executable,
            HALF_DUPLEX_ID,
            "Half Duplex Check (SD-WAN)",
            "Check interfaces in half-duplex mode on SD-WAN routers (vEdge and cEdge).",
            "half-duplex-check",
            credentials(),
            credential_docs("Routers to check"),
        ),
        builtin(
            executable,
            ERR_DISABLED_ID,
            "Err-Disabled Interfaces",
            "Find interfaces in err-disabled state and optionally recover them.",
            "err-disabled",
            err_params,
            err_docs,
        ),
    ]
}

fn builtin(
    executable: &str,
    id: &str,
    display_name: &str,
    description: &str,
    operation: &str,
    cli_params: Vec<ParameterSpec>,
    parameters: Vec<ParameterDoc>,
) -> CapabilityDefinition {
    CapabilityDefinition {
        id: id.to_owned(),
        display_name: display_name.to_owned(),
        description: description.to_owned(),
        folder: id.to_owned(),
        entrypoint: executable.to_owned(),
        entrypoint_args: vec!["capability".to_owned(), operation.to_owned()],
        cli_params,
        parameters,
    }
}

fn required(name: &str) -> ParameterSpec {
    ParameterSpec { name: name.to_owned(), flag: format!("--{name}"), required: true }
}

fn doc(name: &str, description: &str) -> ParameterDoc {
    ParameterDoc { name: name.to_owned(), description: description.to_owned() }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use tempfile::TempDir;

    use super::{
        builtin_catalog, CapabilityRegistry, RegistryError, ACL_REMOVAL_ID, ERR_DISABLED_ID,
        HALF_DUPLEX_ID, SHOW_COMMANDS_ID,
    };
    use crate::config::{CapabilitiesConfig, ExecutionMode};
    use crate::errors::DomainError;

    fn builtin_registry() -> CapabilityRegistry {
        CapabilityRegistry::new(builtin_catalog("netops")).expect("built-in catalog is valid")
    }

    #[test]
    fn builtin_catalog_keeps_declaration_order() {
        let registry = builtin_registry();
        let ids: Vec<&str> = registry.ids().collect();
        assert_eq!(ids, vec![SHOW_COMMANDS_ID, ACL_REMOVAL_ID, HALF_DUPLEX_ID, ERR_DISABLED_ID]);
    }

    #[test]
    fn required_parameters_come_from_cli_params() {
        let registry = builtin_registry();
        let required = registry.required_parameters(SHOW_COMMANDS_ID).expect("known id");
        assert_eq!(
            required.into_iter().collect::<Vec<_>>(),
            vec!["command", "devices", "password", "username"]
        );

        let err_disabled = registry.required_parameters(ERR_DISABLED_ID).expect("known id");
        assert!(!err_disabled.contains("recover"));
    }

    #[test]
    fn unknown_capability_is_not_found() {
        let registry = builtin_registry();
        assert_eq!(
            registry.get("rebootEverything").expect_err("unknown"),
            DomainError::UnknownCapability("rebootEverything".to_owned())
        );
    }

    #[test]
    fn builtin_entrypoints_route_through_the_executable() {
        let registry = builtin_registry();
        let definition = registry.get(ACL_REMOVAL_ID).expect("known id");
        assert_eq!(definition.entrypoint, "netops");
        assert_eq!(definition.entrypoint_args, vec!["capability", "snmp-acl-removal"]);
        assert_eq!(definition.folder, ACL_REMOVAL_ID);
    }

    #[test]
    fn toml_catalog_replaces_builtin_catalog() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("capabilities.toml");
        fs::write(
            &path,
            r#"
[[capability]]
id = "pingSweep"
displayName = "Ping Sweep"
description = "Ping every address in a range"
folder = "pingSweep"
entrypoint = "sweep.sh"

[[capability.cliParams]]
name = "range"
flag = "--range"
required = true
"#,
        )
        .expect("write catalog");

        let registry = CapabilityRegistry::load(&CapabilitiesConfig {
            registry_path: Some(path),
            base_dir: PathBuf::from("capabilities"),
            mode: ExecutionMode::Process,
            executable: "netops".to_owned(),
        })
        .expect("catalog loads");

        assert_eq!(registry.len(), 1);
        let definition = registry.get("pingSweep").expect("known id");
        assert_eq!(definition.cli_params[0].flag, "--range");
        assert!(definition.parameters.is_empty());
    }

    #[test]
    fn duplicate_ids_and_bad_flags_are_rejected() {
        let mut definitions = builtin_catalog("netops");
        definitions.push(definitions[0].clone());
        assert!(matches!(
            CapabilityRegistry::new(definitions),
            Err(RegistryError::Invalid(ref message)) if message.contains("duplicate")
        ));

        let mut definitions = builtin_catalog("netops");
        definitions[1].cli_params[0].flag = "devices".to_owned();
        assert!(matches!(
            CapabilityRegistry::new(definitions),
            Err(RegistryError::Invalid(ref message)) if message.contains("invalid flag")
        ));
    }
}
