use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub type Parameters = BTreeMap<String, String>;

/// Returns the value for `name` unless it is absent or blank.
pub fn present_value<'a>(parameters: &'a Parameters, name: &str) -> Option<&'a str> {
    parameters.get(name).map(String::as_str).filter(|value| !value.trim().is_empty())
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionIntent {
    pub capability_id: String,
    pub parameters: Parameters,
    pub confirmed: bool,
}

impl ExecutionIntent {
    pub fn new(capability_id: impl Into<String>, parameters: Parameters, confirmed: bool) -> Self {
        Self { capability_id: capability_id.into(), parameters, confirmed }
    }
}
