use std::sync::Arc;

use bedrock_audit_lambda::aws::cfn::HttpCfnResponder;
use bedrock_audit_lambda::aws::clients::CrossAccountClients;
use bedrock_audit_lambda::aws::code_staging::HttpCodeStager;
use bedrock_audit_lambda::aws::parameters::{AwsAccountDirectory, AwsParameterDirectory};
use bedrock_audit_lambda::aws::provisioning::{
    ConfigRuleProvisioner, IamRoleProvisioner, LambdaFunctionProvisioner, SnsTopicProvisioner,
};
use bedrock_audit_lambda::aws::state_table::DynamoStateStore;
use bedrock_audit_lambda::handlers::orchestrator::{
    handle_orchestrator_event, OrchestratorContext, OrchestratorDeps,
};
use bedrock_audit_lambda::runtime::planning;
use lambda_runtime::{service_fn, Error, LambdaEvent};
use serde_json::Value;

async fn handle_request(event: LambdaEvent<Value>) -> Result<Value, Error> {
    let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let clients = Arc::new(
        CrossAccountClients::new(&config, planning::CONFIGURATION_ROLE)
            .await
            .map_err(Error::from)?,
    );

    let context = OrchestratorContext {
        account_id: clients.account_id().to_string(),
        region: std::env::var("AWS_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
        partition: clients.partition().to_string(),
        function_name: event.context.env_config.function_name.clone(),
        function_arn: event.context.invoked_function_arn.clone(),
        log_group_name: event.context.env_config.log_group.clone(),
    };

    let parameters = AwsParameterDirectory::new(&config);
    let accounts = AwsAccountDirectory::new(&config);
    let stager = HttpCodeStager::new(&config);
    let topics = SnsTopicProvisioner::new(&config);
    let roles = IamRoleProvisioner::new(Arc::clone(&clients));
    let functions = LambdaFunctionProvisioner::new(Arc::clone(&clients));
    let rules = ConfigRuleProvisioner::new(Arc::clone(&clients));
    let state = DynamoStateStore::new(&config);
    let cfn = HttpCfnResponder::new();

    let deps = OrchestratorDeps {
        parameters: &parameters,
        accounts: &accounts,
        stager: &stager,
        topics: &topics,
        roles: &roles,
        functions: &functions,
        rules: &rules,
        state: &state,
        cfn: &cfn,
    };

    let response = handle_orchestrator_event(&event.payload, &context, &deps);
    serde_json::to_value(response).map_err(|error| {
        Error::from(format!("failed to serialize orchestrator response: {error}"))
    })
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
