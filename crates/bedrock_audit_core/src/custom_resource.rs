use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EventError {
    #[error("the event did not include Records or RequestType")]
    UnrecognizedShape,
    #[error("unsupported RequestType '{0}'")]
    UnsupportedRequestType(String),
    #[error("custom-resource field '{0}' is missing or not a string")]
    MissingField(&'static str),
    #[error("SNS record is missing a Message string")]
    MissingSnsMessage,
    #[error("invalid fan-out message: {0}")]
    MalformedFanoutMessage(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestType {
    Create,
    Update,
    Delete,
}

impl RequestType {
    fn parse(raw: &str) -> Result<Self, EventError> {
        match raw {
            "Create" => Ok(Self::Create),
            "Update" => Ok(Self::Update),
            "Delete" => Ok(Self::Delete),
            other => Err(EventError::UnsupportedRequestType(other.to_string())),
        }
    }
}

/// A CloudFormation custom-resource lifecycle request.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomResourceRequest {
    pub request_type: RequestType,
    pub response_url: String,
    pub stack_id: String,
    pub request_id: String,
    pub logical_resource_id: String,
    pub resource_properties: Map<String, Value>,
}

impl CustomResourceRequest {
    pub fn property(&self, name: &str) -> Option<&str> {
        self.resource_properties.get(name).and_then(Value::as_str)
    }
}

/// One SNS fan-out message asking for a Config rule registration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FanoutMessage {
    #[serde(rename = "AccountId")]
    pub account_id: String,
    #[serde(rename = "ConfigRuleName")]
    pub rule_name: String,
    #[serde(rename = "Regions")]
    pub regions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OrchestratorEvent {
    CustomResource(CustomResourceRequest),
    Fanout(Vec<FanoutMessage>),
}

/// Sorts an incoming orchestrator event into the custom-resource lifecycle
/// or the SNS fan-out path. Anything else is invalid input.
pub fn classify_orchestrator_event(event: &Value) -> Result<OrchestratorEvent, EventError> {
    if is_sns_event(event) {
        let records = event
            .get("Records")
            .and_then(Value::as_array)
            .ok_or(EventError::UnrecognizedShape)?;
        let mut messages = Vec::with_capacity(records.len());
        for record in records {
            messages.push(parse_fanout_record(record)?);
        }
        return Ok(OrchestratorEvent::Fanout(messages));
    }

    if event.get("RequestType").is_some() {
        return Ok(OrchestratorEvent::CustomResource(parse_custom_resource(
            event,
        )?));
    }

    Err(EventError::UnrecognizedShape)
}

fn is_sns_event(event: &Value) -> bool {
    event
        .get("Records")
        .and_then(Value::as_array)
        .map(|records| {
            !records.is_empty()
                && records.iter().all(|record| {
                    record
                        .get("EventSource")
                        .and_then(Value::as_str)
                        .map(|source| source == "aws:sns")
                        .unwrap_or(false)
                })
        })
        .unwrap_or(false)
}

fn parse_fanout_record(record: &Value) -> Result<FanoutMessage, EventError> {
    let message = record
        .get("Sns")
        .and_then(|sns| sns.get("Message"))
        .and_then(Value::as_str)
        .ok_or(EventError::MissingSnsMessage)?;
    serde_json::from_str(message)
        .map_err(|error| EventError::MalformedFanoutMessage(error.to_string()))
}

fn parse_custom_resource(event: &Value) -> Result<CustomResourceRequest, EventError> {
    let request_type = RequestType::parse(
        event
            .get("RequestType")
            .and_then(Value::as_str)
            .ok_or(EventError::MissingField("RequestType"))?,
    )?;

    let resource_properties = event
        .get("ResourceProperties")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    Ok(CustomResourceRequest {
        request_type,
        response_url: string_field(event, "ResponseURL")?,
        stack_id: string_field(event, "StackId")?,
        request_id: string_field(event, "RequestId")?,
        logical_resource_id: string_field(event, "LogicalResourceId")?,
        resource_properties,
    })
}

fn string_field(event: &Value, name: &'static str) -> Result<String, EventError> {
    event
        .get(name)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or(EventError::MissingField(name))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CfnStatus {
    #[serde(rename = "SUCCESS")]
    Success,
    #[serde(rename = "FAILED")]
    Failed,
}

/// The body CloudFormation expects at the pre-signed response URL.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct CfnResponseBody {
    pub status: CfnStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub physical_resource_id: String,
    pub stack_id: String,
    pub request_id: String,
    pub logical_resource_id: String,
    pub data: Value,
}

impl CfnResponseBody {
    pub fn success(request: &CustomResourceRequest, physical_id: &str, data: Value) -> Self {
        Self {
            status: CfnStatus::Success,
            reason: None,
            physical_resource_id: physical_id.to_string(),
            stack_id: request.stack_id.clone(),
            request_id: request.request_id.clone(),
            logical_resource_id: request.logical_resource_id.clone(),
            data,
        }
    }

    pub fn failed(request: &CustomResourceRequest, physical_id: &str, reason: String) -> Self {
        Self {
            status: CfnStatus::Failed,
            reason: Some(reason),
            physical_resource_id: physical_id.to_string(),
            stack_id: request.stack_id.clone(),
            request_id: request.request_id.clone(),
            logical_resource_id: request.logical_resource_id.clone(),
            data: Value::Object(Map::new()),
        }
    }
}
