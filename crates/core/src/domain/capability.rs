use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::domain::intent::{present_value, Parameters};
use crate::errors::DomainError;

/// One entry of a capability's ordered flag contract.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    pub flag: String,
    #[serde(default)]
    pub required: bool,
}

/// Operator-facing description of a parameter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterDoc {
    pub name: String,
    pub description: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityDefinition {
    pub id: String,
    pub display_name: String,
    pub description: String,
    pub folder: String,
    pub entrypoint: String,
    #[serde(default)]
    pub entrypoint_args: Vec<String>,
    pub cli_params: Vec<ParameterSpec>,
    #[serde(default)]
    pub parameters: Vec<ParameterDoc>,
}

/// The registry view handed to operators and the collaborator; no executable details.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilitySummary {
    pub id: String,
    pub display_name: String,
    pub description: String,
    pub required_parameters: Vec<String>,
    pub optional_parameters: Vec<String>,
    pub parameters: Vec<ParameterDoc>,
}

impl CapabilityDefinition {
    pub fn required_parameters(&self) -> BTreeSet<String> {
        self.cli_params.iter().filter(|spec| spec.required).map(|spec| spec.name.clone()).collect()
    }

    pub fn declares(&self, name: &str) -> bool {
        self.cli_params.iter().any(|spec| spec.name == name)
    }

    /// Required parameter names that are absent or blank, in declaration order.
    pub fn missing_required(&self, parameters: &Parameters) -> Vec<String> {
        self.cli_params
            .iter()
            .filter(|spec| spec.required && present_value(parameters, &spec.name).is_none())
            .map(|spec| spec.name.clone())
            .collect()
    }

    /// Maps parameters onto `[flag, value]` pairs in declaration order.
    pub fn build_arguments(&self, parameters: &Parameters) -> Result<Vec<String>, DomainError> {
        let mut arguments = Vec::with_capacity(self.cli_params.len() * 2);
        for spec in &self.cli_params {
            match present_value(parameters, &spec.name) {
                Some(value) => {
                    arguments.push(spec.flag.clone());
                    arguments.push(value.to_owned());
                }
                None if spec.required => {
                    return Err(DomainError::MissingParameter(spec.name.clone()));
                }
                None => {}
            }
        }
        Ok(arguments)
    }

    pub fn summary(&self) -> CapabilitySummary {
        let (required, optional): (Vec<&ParameterSpec>, Vec<&ParameterSpec>) =
            self.cli_params.iter().partition(|spec| spec.required);
        CapabilitySummary {
            id: self.id.clone(),
            display_name: self.display_name.clone(),
            description: self.description.clone(),
            required_parameters: required.into_iter().map(|spec| spec.name.clone()).collect(),
            optional_parameters: optional.into_iter().map(|spec| spec.name.clone()).collect(),
            parameters: self.parameters.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::capability::{CapabilityDefinition, ParameterSpec};
    use crate::domain::intent::Parameters;
    use crate::errors::DomainError;

    fn err_disabled() -> CapabilityDefinition {
        CapabilityDefinition {
            id: "showErrDisableInt-main".to_owned(),
            display_name: "Err-Disabled Interfaces".to_owned(),
            description: "Find err-disabled ports".to_owned(),
            folder: "showErrDisableInt-main".to_owned(),
            entrypoint: "netops".to_owned(),
            entrypoint_args: vec!["capability".to_owned(), "err-disabled".to_owned()],
            cli_params: vec![
                spec("devices", true),
                spec("username", true),
                spec("password", true),
                spec("recover", false),
            ],
            parameters: Vec::new(),
        }
    }

    fn spec(name: &str, required: bool) -> ParameterSpec {
        ParameterSpec { name: name.to_owned(), flag: format!("--{name}"), required }
    }

    fn params(pairs: &[(&str, &str)]) -> Parameters {
        pairs.iter().map(|(key, value)| ((*key).to_owned(), (*value).to_owned())).collect()
    }

    #[test]
    fn arguments_follow_declaration_order_and_skip_absent_optionals() {
        let definition = err_disabled();
        let arguments = definition
            .build_arguments(&params(&[
                ("password", "s3cret"),
                ("devices", "10.0.0.1,10.0.0.2"),
                ("username", "netadmin"),
            ]))
            .expect("complete parameters");

        assert_eq!(
            arguments,
            vec![
                "--devices",
                "10.0.0.1,10.0.0.2",
                "--username",
                "netadmin",
                "--password",
                "s3cret"
            ]
        );
    }

    #[test]
    fn blank_required_value_is_reported_missing() {
        let definition = err_disabled();
        let parameters =
            params(&[("devices", "10.0.0.1"), ("username", "  "), ("password", "s3cret")]);

        let error = definition.build_arguments(&parameters).expect_err("blank username");
        assert_eq!(error, DomainError::MissingParameter("username".to_owned()));
        assert_eq!(definition.missing_required(&parameters), vec!["username".to_owned()]);
    }

    #[test]
    fn summary_separates_required_from_optional() {
        let summary = err_disabled().summary();
        assert_eq!(summary.required_parameters, vec!["devices", "username", "password"]);
        assert_eq!(summary.optional_parameters, vec!["recover"]);
    }

    #[test]
    fn descriptor_uses_camel_case_field_names() {
        let raw = r#"{
            "id": "runShowCommands-main",
            "displayName": "Run Show Commands",
            "description": "Run one show command",
            "folder": "runShowCommands-main",
            "entrypoint": "run.sh",
            "cliParams": [{"name": "devices", "flag": "--devices", "required": true}],
            "parameters": [{"name": "devices", "description": "Comma-separated devices"}]
        }"#;

        let definition: CapabilityDefinition = serde_json::from_str(raw).expect("descriptor");
        assert_eq!(definition.display_name, "Run Show Commands");
        assert!(definition.entrypoint_args.is_empty());
        assert!(definition.declares("devices"));
        assert!(!definition.declares("command"));
    }
}
