use netops_core::{ApplicationError, Parameters};
use serde_json::{Map, Value};

/// A collaborator reply after schema validation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CollaboratorReply {
    Intent(ParsedReply),
    /// Not a well-formed reply; shown verbatim and never executed.
    RawText(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedReply {
    pub answer: String,
    pub capability_id: Option<String>,
    pub parameters: Parameters,
    pub confirmed: bool,
}

pub fn parse_reply(raw: &str) -> CollaboratorReply {
    match try_parse_reply(raw) {
        Ok(parsed) => CollaboratorReply::Intent(parsed),
        Err(_) => CollaboratorReply::RawText(raw.trim().to_string()),
    }
}

pub fn try_parse_reply(raw: &str) -> Result<ParsedReply, ApplicationError> {
    let body = extract_object(raw).ok_or_else(|| parse_error("no JSON object found"))?;
    let value: Value =
        serde_json::from_str(body).map_err(|error| parse_error(&error.to_string()))?;
    let Value::Object(object) = value else {
        return Err(parse_error("reply is not a JSON object"));
    };

    let answer = match object.get("answer") {
        Some(Value::String(answer)) => answer.clone(),
        Some(_) => return Err(parse_error("`answer` must be a string")),
        None => return Err(parse_error("`answer` is required")),
    };

    let capability_id = match field(&object, &["capabilityId", "capability_id", "script_to_run"]) {
        None | Some(Value::Null) => None,
        Some(Value::String(id)) => {
            let id = id.trim();
            (!id.is_empty() && !id.eq_ignore_ascii_case("null")).then(|| id.to_string())
        }
        Some(_) => return Err(parse_error("`capabilityId` must be a string or null")),
    };

    let parameters = match object.get("parameters") {
        None | Some(Value::Null) => Parameters::new(),
        Some(Value::Object(values)) => parameter_map(values)?,
        Some(_) => return Err(parse_error("`parameters` must be an object")),
    };

    let confirmed = match field(&object, &["confirmed", "run_script"]) {
        None | Some(Value::Null) => false,
        Some(Value::Bool(confirmed)) => *confirmed,
        Some(_) => return Err(parse_error("`confirmed` must be a boolean")),
    };

    Ok(ParsedReply { answer, capability_id, parameters, confirmed })
}

fn field<'a>(object: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    names.iter().find_map(|name| object.get(*name))
}

fn parameter_map(values: &Map<String, Value>) -> Result<Parameters, ApplicationError> {
    let mut parameters = Parameters::new();
    for (name, value) in values {
        let text = match value {
            Value::Null => continue,
            Value::String(text) => text.clone(),
            Value::Number(number) => number.to_string(),
            Value::Bool(flag) => flag.to_string(),
            Value::Array(items) => {
                let mut joined = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        Value::String(text) => joined.push(text.trim().to_string()),
                        _ => {
                            return Err(parse_error(&format!(
                                "parameter `{name}` must be a list of strings"
                            )))
                        }
                    }
                }
                joined.join(",")
            }
            Value::Object(_) => {
                return Err(parse_error(&format!("parameter `{name}` must be a scalar value")))
            }
        };
        parameters.insert(name.clone(), text);
    }
    Ok(parameters)
}

/// The outermost `{...}` span, ignoring code fences or chatter around it.
fn extract_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}

fn parse_error(message: &str) -> ApplicationError {
    ApplicationError::IntentParse(message.to_string())
}
