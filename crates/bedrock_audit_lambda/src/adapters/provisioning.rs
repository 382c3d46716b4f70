use serde_json::Value;

/// Home-account SNS plumbing for the configuration fan-out topic.
pub trait TopicProvisioner {
    /// ARN of an existing topic with this name, if any.
    fn find_topic(&self, name: &str) -> Result<Option<String>, String>;
    fn create_topic(&self, name: &str, solution_name: &str) -> Result<String, String>;
    /// Allows the topic to invoke the orchestrator function.
    fn allow_topic_invoke(
        &self,
        function_name: &str,
        statement_id: &str,
        topic_arn: &str,
    ) -> Result<(), String>;
    fn subscribe_function(&self, topic_arn: &str, function_arn: &str) -> Result<(), String>;
}

/// Cross-account IAM provisioning for rule execution roles.
pub trait RoleProvisioner {
    fn find_role(&self, account_id: &str, role_name: &str) -> Result<Option<String>, String>;
    fn create_role(
        &self,
        account_id: &str,
        role_name: &str,
        trust_document: &Value,
        solution_name: &str,
    ) -> Result<String, String>;
    fn policy_exists(&self, account_id: &str, policy_arn: &str) -> Result<bool, String>;
    fn create_policy(
        &self,
        account_id: &str,
        policy_name: &str,
        document: &Value,
        solution_name: &str,
    ) -> Result<String, String>;
    fn policy_attached(
        &self,
        account_id: &str,
        role_name: &str,
        policy_arn: &str,
    ) -> Result<bool, String>;
    fn attach_policy(
        &self,
        account_id: &str,
        role_name: &str,
        policy_arn: &str,
    ) -> Result<(), String>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateFunctionRequest {
    pub function_name: String,
    pub role_arn: String,
    pub handler: String,
    pub runtime: String,
    pub timeout_secs: i32,
    pub memory_mb: i32,
    pub code_bucket: String,
    pub code_key: String,
    pub solution_name: String,
}

/// Cross-account, cross-region Lambda provisioning for rule functions.
pub trait FunctionProvisioner {
    fn find_function(
        &self,
        account_id: &str,
        region: &str,
        function_name: &str,
    ) -> Result<Option<String>, String>;
    fn create_function(
        &self,
        account_id: &str,
        region: &str,
        request: &CreateFunctionRequest,
    ) -> Result<String, String>;
    /// Allows the Config service in the account to invoke the function.
    fn allow_config_invoke(
        &self,
        account_id: &str,
        region: &str,
        function_name: &str,
        statement_id: &str,
    ) -> Result<(), String>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateRuleRequest {
    pub rule_name: String,
    pub lambda_arn: String,
    pub schedule: String,
    pub input_parameters: Value,
    pub solution_name: String,
}

/// Cross-account, cross-region Config rule registration.
pub trait RuleProvisioner {
    fn find_rule(
        &self,
        account_id: &str,
        region: &str,
        rule_name: &str,
    ) -> Result<Option<String>, String>;
    fn create_rule(
        &self,
        account_id: &str,
        region: &str,
        request: &CreateRuleRequest,
    ) -> Result<(), String>;
}
