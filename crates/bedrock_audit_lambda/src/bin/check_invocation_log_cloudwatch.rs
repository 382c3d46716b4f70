use bedrock_audit_lambda::aws::evaluations::AwsEvaluationSink;
use bedrock_audit_lambda::aws::inspection::{AwsInvocationLoggingProbe, AwsLogGroupInspector};
use bedrock_audit_lambda::handlers::cloudwatch_rule::handle_cloudwatch_rule_event;
use lambda_runtime::{service_fn, Error, LambdaEvent};
use serde_json::Value;

async fn handle_request(event: LambdaEvent<Value>) -> Result<Value, Error> {
    let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let probe = AwsInvocationLoggingProbe::new(&config);
    let log_groups = AwsLogGroupInspector::new(&config);
    let evaluations = AwsEvaluationSink::new(&config);

    let response = handle_cloudwatch_rule_event(&event.payload, &probe, &log_groups, &evaluations)
        .map_err(|error| Error::from(error.message))?;
    serde_json::to_value(response)
        .map_err(|error| Error::from(format!("failed to serialize rule response: {error}")))
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("LOG_LEVEL")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    init_tracing();
    lambda_runtime::run(service_fn(handle_request)).await
}
