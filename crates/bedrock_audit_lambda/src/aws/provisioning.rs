use std::sync::Arc;

use aws_config::SdkConfig;
use serde_json::Value;

use crate::adapters::provisioning::{
    CreateFunctionRequest, CreateRuleRequest, FunctionProvisioner, RoleProvisioner,
    RuleProvisioner, TopicProvisioner,
};

use super::clients::CrossAccountClients;
use super::{absent_on, block_on};

const SOLUTION_TAG_KEY: &str = "solution";

/// Home-account SNS topic plumbing for the configuration fan-out.
pub struct SnsTopicProvisioner {
    sns: aws_sdk_sns::Client,
    lambda: aws_sdk_lambda::Client,
}

impl SnsTopicProvisioner {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            sns: aws_sdk_sns::Client::new(config),
            lambda: aws_sdk_lambda::Client::new(config),
        }
    }
}

impl TopicProvisioner for SnsTopicProvisioner {
    fn find_topic(&self, name: &str) -> Result<Option<String>, String> {
        let suffix = format!(":{name}");
        block_on(async {
            let mut next_token: Option<String> = None;
            loop {
                let output = self
                    .sns
                    .list_topics()
                    .set_next_token(next_token.clone())
                    .send()
                    .await
                    .map_err(|error| format!("failed to list SNS topics: {error}"))?;

                for topic in output.topics() {
                    if let Some(arn) = topic.topic_arn() {
                        if arn.ends_with(&suffix) {
                            return Ok(Some(arn.to_string()));
                        }
                    }
                }

                next_token = output.next_token().map(str::to_string);
                if next_token.is_none() {
                    return Ok(None);
                }
            }
        })
    }

    fn create_topic(&self, name: &str, solution_name: &str) -> Result<String, String> {
        block_on(async {
            let tag = aws_sdk_sns::types::Tag::builder()
                .key(SOLUTION_TAG_KEY)
                .value(solution_name)
                .build()
                .map_err(|error| format!("failed to build topic tag: {error}"))?;
            let output = self
                .sns
                .create_topic()
                .name(name)
                .tags(tag)
                .send()
                .await
                .map_err(|error| format!("failed to create SNS topic '{name}': {error}"))?;
            output
                .topic_arn()
                .map(str::to_string)
                .ok_or_else(|| format!("created topic '{name}' has no ARN"))
        })
    }

    fn allow_topic_invoke(
        &self,
        function_name: &str,
        statement_id: &str,
        topic_arn: &str,
    ) -> Result<(), String> {
        block_on(async {
            self.lambda
                .add_permission()
                .function_name(function_name)
                .statement_id(statement_id)
                .principal("sns.amazonaws.com")
                .action("lambda:InvokeFunction")
                .source_arn(topic_arn)
                .send()
                .await
                .map(|_| ())
                .map_err(|error| {
                    format!("failed to allow {topic_arn} to invoke {function_name}: {error}")
                })
        })
    }

    fn subscribe_function(&self, topic_arn: &str, function_arn: &str) -> Result<(), String> {
        block_on(async {
            self.sns
                .subscribe()
                .topic_arn(topic_arn)
                .protocol("lambda")
                .endpoint(function_arn)
                .send()
                .await
                .map(|_| ())
                .map_err(|error| {
                    format!("failed to subscribe {function_arn} to {topic_arn}: {error}")
                })
        })
    }
}

/// Cross-account IAM provisioning through the configuration role.
pub struct IamRoleProvisioner {
    clients: Arc<CrossAccountClients>,
}

impl IamRoleProvisioner {
    pub fn new(clients: Arc<CrossAccountClients>) -> Self {
        Self { clients }
    }
}

impl RoleProvisioner for IamRoleProvisioner {
    fn find_role(&self, account_id: &str, role_name: &str) -> Result<Option<String>, String> {
        let iam = self.clients.iam(account_id)?;
        let result = block_on(async {
            iam.get_role()
                .role_name(role_name)
                .send()
                .await
                .map_err(|error| format!("failed to get role '{role_name}': {error}"))
        });
        Ok(absent_on(result, "NoSuchEntity")?
            .and_then(|output| output.role().map(|role| role.arn().to_string())))
    }

    fn create_role(
        &self,
        account_id: &str,
        role_name: &str,
        trust_document: &Value,
        solution_name: &str,
    ) -> Result<String, String> {
        let iam = self.clients.iam(account_id)?;
        block_on(async {
            let tag = aws_sdk_iam::types::Tag::builder()
                .key(SOLUTION_TAG_KEY)
                .value(solution_name)
                .build()
                .map_err(|error| format!("failed to build role tag: {error}"))?;
            let output = iam
                .create_role()
                .role_name(role_name)
                .assume_role_policy_document(trust_document.to_string())
                .tags(tag)
                .send()
                .await
                .map_err(|error| format!("failed to create role '{role_name}': {error}"))?;
            output
                .role()
                .map(|role| role.arn().to_string())
                .ok_or_else(|| format!("created role '{role_name}' has no ARN"))
        })
    }

    fn policy_exists(&self, account_id: &str, policy_arn: &str) -> Result<bool, String> {
        let iam = self.clients.iam(account_id)?;
        let result = block_on(async {
            iam.get_policy()
                .policy_arn(policy_arn)
                .send()
                .await
                .map_err(|error| format!("failed to get policy '{policy_arn}': {error}"))
        });
        Ok(absent_on(result, "NoSuchEntity")?.is_some())
    }

    fn create_policy(
        &self,
        account_id: &str,
        policy_name: &str,
        document: &Value,
        solution_name: &str,
    ) -> Result<String, String> {
        let iam = self.clients.iam(account_id)?;
        block_on(async {
            let tag = aws_sdk_iam::types::Tag::builder()
                .key(SOLUTION_TAG_KEY)
                .value(solution_name)
                .build()
                .map_err(|error| format!("failed to build policy tag: {error}"))?;
            let output = iam
                .create_policy()
                .policy_name(policy_name)
                .policy_document(document.to_string())
                .tags(tag)
                .send()
                .await
                .map_err(|error| format!("failed to create policy '{policy_name}': {error}"))?;
            output
                .policy()
                .and_then(|policy| policy.arn().map(str::to_string))
                .ok_or_else(|| format!("created policy '{policy_name}' has no ARN"))
        })
    }

    fn policy_attached(
        &self,
        account_id: &str,
        role_name: &str,
        policy_arn: &str,
    ) -> Result<bool, String> {
        let iam = self.clients.iam(account_id)?;
        block_on(async {
            let output = iam
                .list_attached_role_policies()
                .role_name(role_name)
                .send()
                .await
                .map_err(|error| {
                    format!("failed to list policies attached to '{role_name}': {error}")
                })?;
            Ok(output
                .attached_policies()
                .iter()
                .any(|attached| attached.policy_arn() == Some(policy_arn)))
        })
    }

    fn attach_policy(
        &self,
        account_id: &str,
        role_name: &str,
        policy_arn: &str,
    ) -> Result<(), String> {
        let iam = self.clients.iam(account_id)?;
        block_on(async {
            iam.attach_role_policy()
                .role_name(role_name)
                .policy_arn(policy_arn)
                .send()
                .await
                .map(|_| ())
                .map_err(|error| {
                    format!("failed to attach '{policy_arn}' to '{role_name}': {error}")
                })
        })
    }
}

/// Cross-account, cross-region Lambda provisioning for rule functions.
pub struct LambdaFunctionProvisioner {
    clients: Arc<CrossAccountClients>,
}

impl LambdaFunctionProvisioner {
    pub fn new(clients: Arc<CrossAccountClients>) -> Self {
        Self { clients }
    }
}

impl FunctionProvisioner for LambdaFunctionProvisioner {
    fn find_function(
        &self,
        account_id: &str,
        region: &str,
        function_name: &str,
    ) -> Result<Option<String>, String> {
        let lambda = self.clients.lambda(account_id, region)?;
        let result = block_on(async {
            lambda
                .get_function()
                .function_name(function_name)
                .send()
                .await
                .map_err(|error| format!("failed to get function '{function_name}': {error}"))
        });
        Ok(absent_on(result, "ResourceNotFoundException")?.and_then(|output| {
            output
                .configuration()
                .and_then(|configuration| configuration.function_arn().map(str::to_string))
        }))
    }

    fn create_function(
        &self,
        account_id: &str,
        region: &str,
        request: &CreateFunctionRequest,
    ) -> Result<String, String> {
        let lambda = self.clients.lambda(account_id, region)?;
        block_on(async {
            let code = aws_sdk_lambda::types::FunctionCode::builder()
                .s3_bucket(&request.code_bucket)
                .s3_key(&request.code_key)
                .build();
            let output = lambda
                .create_function()
                .function_name(&request.function_name)
                .role(&request.role_arn)
                .handler(&request.handler)
                .runtime(aws_sdk_lambda::types::Runtime::from(
                    request.runtime.as_str(),
                ))
                .timeout(request.timeout_secs)
                .memory_size(request.memory_mb)
                .code(code)
                .tags(SOLUTION_TAG_KEY, &request.solution_name)
                .send()
                .await
                .map_err(|error| {
                    format!("failed to create function '{}': {error}", request.function_name)
                })?;
            output
                .function_arn()
                .map(str::to_string)
                .ok_or_else(|| format!("created function '{}' has no ARN", request.function_name))
        })
    }

    fn allow_config_invoke(
        &self,
        account_id: &str,
        region: &str,
        function_name: &str,
        statement_id: &str,
    ) -> Result<(), String> {
        let lambda = self.clients.lambda(account_id, region)?;
        block_on(async {
            lambda
                .add_permission()
                .function_name(function_name)
                .statement_id(statement_id)
                .principal("config.amazonaws.com")
                .action("lambda:InvokeFunction")
                .source_account(account_id)
                .send()
                .await
                .map(|_| ())
                .map_err(|error| {
                    format!("failed to allow Config to invoke '{function_name}': {error}")
                })
        })
    }
}

/// Cross-account, cross-region Config rule registration.
pub struct ConfigRuleProvisioner {
    clients: Arc<CrossAccountClients>,
}

impl ConfigRuleProvisioner {
    pub fn new(clients: Arc<CrossAccountClients>) -> Self {
        Self { clients }
    }
}

impl RuleProvisioner for ConfigRuleProvisioner {
    fn find_rule(
        &self,
        account_id: &str,
        region: &str,
        rule_name: &str,
    ) -> Result<Option<String>, String> {
        let config = self.clients.config_service(account_id, region)?;
        let result = block_on(async {
            config
                .describe_config_rules()
                .config_rule_names(rule_name)
                .send()
                .await
                .map_err(|error| format!("failed to describe rule '{rule_name}': {error}"))
        });
        Ok(absent_on(result, "NoSuchConfigRule")?.and_then(|output| {
            output
                .config_rules()
                .first()
                .and_then(|rule| rule.config_rule_arn().map(str::to_string))
        }))
    }

    fn create_rule(
        &self,
        account_id: &str,
        region: &str,
        request: &CreateRuleRequest,
    ) -> Result<(), String> {
        let config = self.clients.config_service(account_id, region)?;
        block_on(async {
            let source_detail = aws_sdk_config::types::SourceDetail::builder()
                .event_source(aws_sdk_config::types::EventSource::AwsConfig)
                .message_type(aws_sdk_config::types::MessageType::ScheduledNotification)
                .maximum_execution_frequency(
                    aws_sdk_config::types::MaximumExecutionFrequency::from(
                        request.schedule.as_str(),
                    ),
                )
                .build();
            let source = aws_sdk_config::types::Source::builder()
                .owner(aws_sdk_config::types::Owner::CustomLambda)
                .source_identifier(&request.lambda_arn)
                .source_details(source_detail)
                .build()
                .map_err(|error| format!("failed to build rule source: {error}"))?;
            let evaluation_mode = aws_sdk_config::types::EvaluationModeConfiguration::builder()
                .mode(aws_sdk_config::types::EvaluationMode::Detective)
                .build();
            let rule = aws_sdk_config::types::ConfigRule::builder()
                .config_rule_name(&request.rule_name)
                .source(source)
                .input_parameters(request.input_parameters.to_string())
                .evaluation_modes(evaluation_mode)
                .build();
            let tag = aws_sdk_config::types::Tag::builder()
                .key(SOLUTION_TAG_KEY)
                .value(&request.solution_name)
                .build();

            config
                .put_config_rule()
                .config_rule(rule)
                .tags(tag)
                .send()
                .await
                .map(|_| ())
                .map_err(|error| {
                    format!(
                        "failed to create rule '{}' in {account_id} {region}: {error}",
                        request.rule_name
                    )
                })
        })
    }
}
