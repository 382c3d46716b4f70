use crate::runtime::custom_resource::CfnResponseBody;

pub trait CfnResponder {
    fn send(&self, response_url: &str, body: &CfnResponseBody) -> Result<(), String>;
}
