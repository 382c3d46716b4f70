use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Evaluations always target the invoking account as a whole.
pub const EVALUATION_RESOURCE_TYPE: &str = "AWS::::Account";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComplianceType {
    #[serde(rename = "COMPLIANT")]
    Compliant,
    #[serde(rename = "NON_COMPLIANT")]
    NonCompliant,
    #[serde(rename = "ERROR")]
    Error,
}

impl ComplianceType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Compliant => "COMPLIANT",
            Self::NonCompliant => "NON_COMPLIANT",
            Self::Error => "ERROR",
        }
    }
}

impl std::fmt::Display for ComplianceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type RuleParameters = BTreeMap<String, String>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ContractError {
    #[error("event field '{0}' is missing or not a string")]
    MissingField(&'static str),
    #[error("invokingEvent is not valid JSON: {0}")]
    MalformedInvokingEvent(String),
    #[error("ruleParameters is not a valid JSON object of strings: {0}")]
    MalformedRuleParameters(String),
}

/// One scheduled invocation of a custom Config rule, with the embedded
/// JSON documents already unpacked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleInvocation {
    pub account_id: String,
    pub result_token: String,
    pub notification_creation_time: String,
    pub rule_parameters: RuleParameters,
}

/// A single compliance evaluation submitted back to Config.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Evaluation {
    pub compliance: ComplianceType,
    pub annotation: String,
    pub resource_id: String,
    pub ordering_timestamp: String,
}

pub fn parse_rule_invocation(event: &Value) -> Result<RuleInvocation, ContractError> {
    let account_id = string_field(event, "accountId")?;
    let result_token = string_field(event, "resultToken")?;

    let invoking_event_raw = string_field(event, "invokingEvent")?;
    let invoking_event: Value = serde_json::from_str(&invoking_event_raw)
        .map_err(|error| ContractError::MalformedInvokingEvent(error.to_string()))?;
    let notification_creation_time = invoking_event
        .get("notificationCreationTime")
        .and_then(Value::as_str)
        .ok_or(ContractError::MissingField("notificationCreationTime"))?
        .to_string();

    let rule_parameters = match event.get("ruleParameters") {
        None | Some(Value::Null) => RuleParameters::new(),
        Some(raw) => parse_rule_parameters(raw)?,
    };

    Ok(RuleInvocation {
        account_id,
        result_token,
        notification_creation_time,
        rule_parameters,
    })
}

/// A boolean rule parameter counts as enabled only when its value equals
/// `true` case-insensitively; absent parameters follow the default.
pub fn flag_enabled(parameters: &RuleParameters, name: &str, default: bool) -> bool {
    match parameters.get(name) {
        Some(value) => value.eq_ignore_ascii_case("true"),
        None => default,
    }
}

fn parse_rule_parameters(raw: &Value) -> Result<RuleParameters, ContractError> {
    let document = match raw {
        Value::String(text) => serde_json::from_str::<Value>(text)
            .map_err(|error| ContractError::MalformedRuleParameters(error.to_string()))?,
        other => other.clone(),
    };

    let Some(object) = document.as_object() else {
        return Err(ContractError::MalformedRuleParameters(
            "expected a JSON object".to_string(),
        ));
    };

    let mut parameters = RuleParameters::new();
    for (name, value) in object {
        let Some(text) = value.as_str() else {
            return Err(ContractError::MalformedRuleParameters(format!(
                "parameter '{name}' must be a string"
            )));
        };
        parameters.insert(name.clone(), text.to_string());
    }
    Ok(parameters)
}

fn string_field(event: &Value, name: &'static str) -> Result<String, ContractError> {
    event
        .get(name)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or(ContractError::MissingField(name))
}
