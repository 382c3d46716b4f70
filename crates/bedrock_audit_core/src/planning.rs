use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

pub const SOLUTION_NAME: &str = "bedrock-logging-audit";
pub const STATE_TABLE: &str = "bedrock-audit-state";
pub const CONFIGURATION_ROLE: &str = "bedrock-audit-execution";
pub const ORCHESTRATOR_RESOURCE_ID: &str = "bedrock-audit-orchestrator";
pub const CONFIGURATION_TOPIC_SUFFIX: &str = "configuration";

pub const CLOUDWATCH_RULE: &str = "bedrock-check-invocation-log-cloudwatch";
pub const S3_RULE: &str = "bedrock-check-invocation-log-s3";
pub const CONFIG_RULE_NAMES: [&str; 2] = [CLOUDWATCH_RULE, S3_RULE];

pub const GOVERNED_REGIONS_PARAMETER: &str = "/bedrock-audit/governed-regions";
pub const STAGING_BUCKET_PARAMETER: &str = "/bedrock-audit/staging-bucket-name";

/// Detective custom rules re-evaluate on this schedule.
pub const RULE_SCHEDULE: &str = "One_Hour";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlanningError {
    #[error("RULE_REGIONS_ACCOUNTS is not a valid JSON object: {0}")]
    MalformedTargetMap(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    DryRun,
    Live,
}

impl ExecutionMode {
    /// The orchestrator refuses to mutate anything unless the stack
    /// explicitly opts out of the dry run.
    pub fn from_property(value: Option<&str>) -> Self {
        match value {
            Some(raw) if raw != "true" => Self::Live,
            _ => Self::DryRun,
        }
    }

    pub fn is_dry_run(self) -> bool {
        matches!(self, Self::DryRun)
    }
}

/// Per-rule deployment targets from the `RULE_REGIONS_ACCOUNTS` resource
/// property.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleTargetMap {
    rules: BTreeMap<String, RuleTargets>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuleTargets {
    #[serde(default)]
    pub accounts: Vec<String>,
    #[serde(default)]
    pub regions: Vec<String>,
}

impl RuleTargetMap {
    /// The property value frequently arrives single-quoted when it was
    /// edited as a CloudFormation parameter, so normalize quotes first.
    pub fn parse(raw: &str) -> Result<Self, PlanningError> {
        let normalized = raw.replace('\'', "\"");
        let rules: BTreeMap<String, RuleTargets> = serde_json::from_str(&normalized)
            .map_err(|error| PlanningError::MalformedTargetMap(error.to_string()))?;
        Ok(Self { rules })
    }

    /// Resolves deployment targets for one rule; a missing entry or empty
    /// list falls back to every organization account and governed region.
    pub fn targets_for(
        &self,
        rule_name: &str,
        organization_accounts: &[String],
        governed_regions: &[String],
    ) -> RuleTargets {
        let listed = self.rules.get(rule_name);
        let accounts = listed
            .map(|targets| targets.accounts.clone())
            .filter(|accounts| !accounts.is_empty())
            .unwrap_or_else(|| organization_accounts.to_vec());
        let regions = listed
            .map(|targets| targets.regions.clone())
            .filter(|regions| !regions.is_empty())
            .unwrap_or_else(|| governed_regions.to_vec());
        RuleTargets { accounts, regions }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    StagedCode,
    SnsTopic,
    TopicPermission,
    TopicSubscription,
    IamRole,
    IamPolicy,
    PolicyAttachment,
    LambdaFunction,
    LambdaPermission,
    ConfigRule,
    StateTable,
    StateRecord,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    Created,
    AlreadyPresent,
    SkippedDryRun,
}

/// One observed-then-decided provisioning step. Dry runs record the same
/// steps with `SkippedDryRun` outcomes instead of mutating anything.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProvisionStep {
    pub kind: ResourceKind,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    pub outcome: StepOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
}

impl ProvisionStep {
    pub fn new(kind: ResourceKind, name: impl Into<String>, outcome: StepOutcome) -> Self {
        Self {
            kind,
            name: name.into(),
            account_id: None,
            region: None,
            outcome,
            identifier: None,
        }
    }

    pub fn in_account(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = Some(account_id.into());
        self
    }

    pub fn in_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProvisionReport {
    pub steps: Vec<ProvisionStep>,
}

impl ProvisionReport {
    pub fn record(&mut self, step: ProvisionStep) {
        self.steps.push(step);
    }

    pub fn created_count(&self) -> usize {
        self.steps
            .iter()
            .filter(|step| step.outcome == StepOutcome::Created)
            .count()
    }

    pub fn summary(&self) -> Value {
        let mut by_outcome: BTreeMap<&str, usize> = BTreeMap::new();
        for step in &self.steps {
            let key = match step.outcome {
                StepOutcome::Created => "created",
                StepOutcome::AlreadyPresent => "already_present",
                StepOutcome::SkippedDryRun => "skipped_dry_run",
            };
            *by_outcome.entry(key).or_default() += 1;
        }
        json!({
            "steps": self.steps.len(),
            "outcomes": by_outcome,
        })
    }
}

// ── names, ARNs, and staged-object keys ────────────────────────────

pub fn configuration_topic_name() -> String {
    format!("{SOLUTION_NAME}-{CONFIGURATION_TOPIC_SUFFIX}")
}

pub fn execution_policy_name(rule_name: &str) -> String {
    format!("{rule_name}-lambda-basic-execution")
}

pub fn audit_policy_name(rule_name: &str) -> String {
    format!("{rule_name}-logging-audit")
}

pub fn policy_arn(partition: &str, account_id: &str, policy_name: &str) -> String {
    format!("arn:{partition}:iam::{account_id}:policy/{policy_name}")
}

pub fn role_arn(partition: &str, account_id: &str, role_name: &str) -> String {
    format!("arn:{partition}:iam::{account_id}:role/{role_name}")
}

pub fn managed_config_rules_policy_arn(partition: &str) -> String {
    format!("arn:{partition}:iam::aws:policy/service-role/AWSConfigRulesExecutionRole")
}

/// Where a rule's deployable artifact lives inside the staging bucket.
pub fn staged_rule_key(rule_name: &str) -> String {
    format!("{SOLUTION_NAME}/rules/{rule_name}/{rule_name}.zip")
}

// ── IAM documents ──────────────────────────────────────────────────

pub fn lambda_trust_document() -> Value {
    json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Effect": "Allow",
            "Principal": {"Service": "lambda.amazonaws.com"},
            "Action": "sts:AssumeRole"
        }]
    })
}

/// Execution policy for one rule lambda, with the account and rule name
/// substituted into the log resources.
pub fn execution_policy_document(partition: &str, account_id: &str, rule_name: &str) -> Value {
    json!({
        "Version": "2012-10-17",
        "Statement": [
            {
                "Effect": "Allow",
                "Action": "logs:CreateLogGroup",
                "Resource": format!("arn:{partition}:logs:*:{account_id}:*")
            },
            {
                "Effect": "Allow",
                "Action": ["logs:CreateLogStream", "logs:PutLogEvents"],
                "Resource": format!(
                    "arn:{partition}:logs:*:{account_id}:log-group:/aws/lambda/{rule_name}:*"
                )
            }
        ]
    })
}

/// Read-only permissions the rule lambdas need to observe the logging
/// configuration and its destinations.
pub fn audit_policy_document() -> Value {
    json!({
        "Version": "2012-10-17",
        "Statement": [
            {
                "Effect": "Allow",
                "Action": [
                    "bedrock:GetModelInvocationLoggingConfiguration",
                    "logs:DescribeLogGroups",
                    "s3:GetLifecycleConfiguration",
                    "s3:GetEncryptionConfiguration",
                    "s3:GetBucketLogging",
                    "s3:GetBucketObjectLockConfiguration",
                    "s3:GetBucketVersioning",
                    "config:PutEvaluations"
                ],
                "Resource": "*"
            }
        ]
    })
}

/// Input parameters registered with each rule: the check flags the rule
/// lambda actually reads, all enabled.
pub fn rule_input_parameters(rule_name: &str) -> Value {
    if rule_name == S3_RULE {
        json!({
            "check_retention": "true",
            "check_encryption": "true",
            "check_access_logging": "true",
            "check_object_locking": "true",
            "check_versioning": "true"
        })
    } else {
        json!({
            "check_retention": "true",
            "check_encryption": "true"
        })
    }
}
