use crate::adapters::cfn::CfnResponder;
use crate::runtime::custom_resource::CfnResponseBody;

use super::block_on;

/// Delivers custom-resource responses to CloudFormation's pre-signed URL.
/// The PUT must carry an empty content type to match the URL signature.
pub struct HttpCfnResponder {
    http: reqwest::Client,
}

impl HttpCfnResponder {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }
}

impl Default for HttpCfnResponder {
    fn default() -> Self {
        Self::new()
    }
}

impl CfnResponder for HttpCfnResponder {
    fn send(&self, response_url: &str, body: &CfnResponseBody) -> Result<(), String> {
        let payload = serde_json::to_string(body)
            .map_err(|error| format!("failed to serialize CloudFormation response: {error}"))?;

        block_on(async {
            let response = self
                .http
                .put(response_url)
                .header(reqwest::header::CONTENT_TYPE, "")
                .body(payload)
                .send()
                .await
                .map_err(|error| format!("failed to send CloudFormation response: {error}"))?;

            response
                .error_for_status()
                .map(|_| ())
                .map_err(|error| format!("CloudFormation response was rejected: {error}"))
        })
    }
}
