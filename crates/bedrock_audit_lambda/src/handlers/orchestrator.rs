use std::collections::BTreeMap;

use chrono::Utc;
use rand::Rng;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::adapters::cfn::CfnResponder;
use crate::adapters::code_staging::CodeStager;
use crate::adapters::parameters::{AccountDirectory, ParameterDirectory};
use crate::adapters::provisioning::{
    CreateFunctionRequest, CreateRuleRequest, FunctionProvisioner, RoleProvisioner,
    RuleProvisioner, TopicProvisioner,
};
use crate::adapters::state_store::{StateStore, TableOutcome};
use crate::runtime::custom_resource::{
    classify_orchestrator_event, CfnResponseBody, CustomResourceRequest, EventError,
    FanoutMessage, OrchestratorEvent, RequestType,
};
use crate::runtime::planning::{
    self, ExecutionMode, ProvisionReport, ProvisionStep, ResourceKind, RuleTargetMap,
    RuleTargets, StepOutcome,
};
use crate::runtime::state::{timestamp_string, StateRecord, RECORD_ID_ALPHABET, RECORD_ID_LEN};

/// Staged rule artifacts are Rust `bootstrap` zips.
const RULE_RUNTIME: &str = "provided.al2023";
const RULE_HANDLER: &str = "bootstrap";
const RULE_TIMEOUT_SECS: i32 = 900;
const RULE_MEMORY_MB: i32 = 512;

const SNS_INVOKE_STATEMENT: &str = "sns-invoke";
const CONFIG_INVOKE_STATEMENT: &str = "config-invoke";

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("{0}")]
    InvalidEvent(#[from] EventError),
    #[error("resource property '{0}' is required")]
    MissingProperty(&'static str),
    #[error(
        "error retrieving the staging bucket parameter. Is the staging prerequisite stack deployed?"
    )]
    StagingBucketUnavailable,
    #[error("{0}")]
    Provision(String),
}

/// Identity of the orchestrator function itself, resolved once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorContext {
    pub account_id: String,
    pub region: String,
    pub partition: String,
    pub function_name: String,
    pub function_arn: String,
    pub log_group_name: String,
}

pub struct OrchestratorDeps<'a> {
    pub parameters: &'a dyn ParameterDirectory,
    pub accounts: &'a dyn AccountDirectory,
    pub stager: &'a dyn CodeStager,
    pub topics: &'a dyn TopicProvisioner,
    pub roles: &'a dyn RoleProvisioner,
    pub functions: &'a dyn FunctionProvisioner,
    pub rules: &'a dyn RuleProvisioner,
    pub state: &'a dyn StateStore,
    pub cfn: &'a dyn CfnResponder,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OrchestratorResponse {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub lambda_start: String,
    pub lambda_finish: String,
    pub body: String,
    pub dry_run: bool,
    pub report: ProvisionReport,
}

/// Entry point for every orchestrator invocation. Errors are folded into a
/// 500-shaped response; CloudFormation lifecycle events always get exactly
/// one SUCCESS or FAILED response.
pub fn handle_orchestrator_event(
    event: &Value,
    context: &OrchestratorContext,
    deps: &OrchestratorDeps<'_>,
) -> OrchestratorResponse {
    let lambda_start = timestamp_string(&Utc::now());

    match classify_orchestrator_event(event) {
        Ok(OrchestratorEvent::CustomResource(request)) => {
            handle_custom_resource(&request, context, deps, lambda_start)
        }
        Ok(OrchestratorEvent::Fanout(messages)) => {
            handle_fanout(&messages, deps, lambda_start)
        }
        Err(error) => {
            tracing::error!(
                error = %error,
                log_group = %context.log_group_name,
                "unrecognized orchestrator event"
            );
            response(500, "ERROR", lambda_start, true, ProvisionReport::default())
        }
    }
}

fn handle_custom_resource(
    request: &CustomResourceRequest,
    context: &OrchestratorContext,
    deps: &OrchestratorDeps<'_>,
    lambda_start: String,
) -> OrchestratorResponse {
    let mode = ExecutionMode::from_property(request.property("DRY_RUN"));
    let mut report = ProvisionReport::default();

    let outcome = match request.request_type {
        RequestType::Create => run_create(request, context, deps, mode, &mut report),
        RequestType::Update => {
            tracing::info!("update event: acknowledging without reprovisioning");
            Ok(json!({"update_operation": "no changes applied"}))
        }
        RequestType::Delete => {
            tracing::info!("delete event: acknowledging without teardown");
            Ok(json!({"delete_operation": "acknowledged"}))
        }
    };

    match outcome {
        Ok(data) => {
            let body =
                CfnResponseBody::success(request, planning::ORCHESTRATOR_RESOURCE_ID, data);
            if let Err(error) = deps.cfn.send(&request.response_url, &body) {
                tracing::error!(error = %error, "failed to deliver CloudFormation response");
                return response(500, "ERROR", lambda_start, mode.is_dry_run(), report);
            }
            response(200, "SUCCESS", lambda_start, mode.is_dry_run(), report)
        }
        Err(error) => {
            tracing::error!(error = %error, "orchestration failed");
            let reason = format!(
                "See the details in CloudWatch Log Stream: '{}'",
                context.log_group_name
            );
            let body = CfnResponseBody::failed(request, planning::ORCHESTRATOR_RESOURCE_ID, reason);
            if let Err(send_error) = deps.cfn.send(&request.response_url, &body) {
                tracing::error!(
                    error = %send_error,
                    "failed to deliver CloudFormation failure response"
                );
            }
            response(500, "ERROR", lambda_start, mode.is_dry_run(), report)
        }
    }
}

fn handle_fanout(
    messages: &[FanoutMessage],
    deps: &OrchestratorDeps<'_>,
    lambda_start: String,
) -> OrchestratorResponse {
    let mut report = ProvisionReport::default();
    for message in messages {
        tracing::info!(
            account_id = %message.account_id,
            rule = %message.rule_name,
            regions = ?message.regions,
            "processing configuration fan-out message"
        );
        if let Err(error) = apply_fanout_message(message, deps, &mut report) {
            tracing::error!(error = %error, "fan-out processing failed");
            return response(500, "ERROR", lambda_start, false, report);
        }
    }
    response(200, "SUCCESS", lambda_start, false, report)
}

fn apply_fanout_message(
    message: &FanoutMessage,
    deps: &OrchestratorDeps<'_>,
    report: &mut ProvisionReport,
) -> Result<(), OrchestratorError> {
    for region in &message.regions {
        let lambda_arn = deps
            .functions
            .find_function(&message.account_id, region, &message.rule_name)
            .map_err(OrchestratorError::Provision)?
            .ok_or_else(|| {
                OrchestratorError::Provision(format!(
                    "rule lambda '{}' is not deployed in {} {region}",
                    message.rule_name, message.account_id
                ))
            })?;
        ensure_config_rule(
            ExecutionMode::Live,
            deps,
            report,
            &message.account_id,
            region,
            &message.rule_name,
            &lambda_arn,
        )?;
    }
    Ok(())
}

// ── Create lifecycle ───────────────────────────────────────────────

struct CreateSettings {
    archive_url: String,
    staging_bucket: String,
    governed_regions: Vec<String>,
    targets: RuleTargetMap,
}

fn run_create(
    request: &CustomResourceRequest,
    context: &OrchestratorContext,
    deps: &OrchestratorDeps<'_>,
    mode: ExecutionMode,
    report: &mut ProvisionReport,
) -> Result<Value, OrchestratorError> {
    let settings = resolve_settings(request, deps)?;

    stage_code(mode, &settings, deps, report)?;
    let topic_arn = ensure_topic(mode, context, deps, report)?;
    ensure_state_table(mode, deps, report)?;

    let mut org_accounts: Option<Vec<String>> = None;
    let mut deployed_rules = 0usize;
    for rule_name in planning::CONFIG_RULE_NAMES {
        let targets = resolve_targets(rule_name, &settings, &mut org_accounts, deps)?;
        tracing::info!(
            rule = rule_name,
            accounts = ?targets.accounts,
            regions = ?targets.regions,
            "deploying config rule"
        );
        for account_id in &targets.accounts {
            let role_arn = ensure_rule_role(mode, context, deps, report, account_id, rule_name)?;
            for region in &targets.regions {
                let lambda_arn = ensure_rule_function(
                    mode, context, deps, report, account_id, region, rule_name, &role_arn,
                    &settings,
                )?;
                ensure_config_rule(mode, deps, report, account_id, region, rule_name, &lambda_arn)?;
                deployed_rules += 1;
            }
        }
    }

    record_run(mode, context, deps, report)?;

    Ok(json!({
        "topic_arn": topic_arn,
        "deployed_rules": deployed_rules,
        "summary": report.summary(),
    }))
}

fn resolve_settings(
    request: &CustomResourceRequest,
    deps: &OrchestratorDeps<'_>,
) -> Result<CreateSettings, OrchestratorError> {
    let archive_url = request
        .property("CODE_ARCHIVE_URL")
        .ok_or(OrchestratorError::MissingProperty("CODE_ARCHIVE_URL"))?
        .to_string();

    let staging_bucket = deps
        .parameters
        .string_parameter(planning::STAGING_BUCKET_PARAMETER)
        .map_err(OrchestratorError::Provision)?
        .ok_or(OrchestratorError::StagingBucketUnavailable)?;

    let governed_regions = deps
        .parameters
        .string_list_parameter(planning::GOVERNED_REGIONS_PARAMETER)
        .map_err(OrchestratorError::Provision)?
        .unwrap_or_default();

    let targets = match request.property("RULE_REGIONS_ACCOUNTS") {
        Some(raw) => RuleTargetMap::parse(raw)
            .map_err(|error| OrchestratorError::Provision(error.to_string()))?,
        None => RuleTargetMap::default(),
    };

    Ok(CreateSettings {
        archive_url,
        staging_bucket,
        governed_regions,
        targets,
    })
}

fn resolve_targets(
    rule_name: &str,
    settings: &CreateSettings,
    org_accounts: &mut Option<Vec<String>>,
    deps: &OrchestratorDeps<'_>,
) -> Result<RuleTargets, OrchestratorError> {
    let mut targets =
        settings
            .targets
            .targets_for(rule_name, &[], &settings.governed_regions);
    if targets.accounts.is_empty() {
        if org_accounts.is_none() {
            *org_accounts = Some(
                deps.accounts
                    .organization_accounts()
                    .map_err(OrchestratorError::Provision)?,
            );
        }
        targets.accounts = org_accounts.clone().unwrap_or_default();
    }
    Ok(targets)
}

fn stage_code(
    mode: ExecutionMode,
    settings: &CreateSettings,
    deps: &OrchestratorDeps<'_>,
    report: &mut ProvisionReport,
) -> Result<(), OrchestratorError> {
    if mode.is_dry_run() {
        tracing::info!(archive_url = %settings.archive_url, "dry run: skipping code staging");
        for rule_name in planning::CONFIG_RULE_NAMES {
            report.record(ProvisionStep::new(
                ResourceKind::StagedCode,
                planning::staged_rule_key(rule_name),
                StepOutcome::SkippedDryRun,
            ));
        }
        return Ok(());
    }

    let keys = deps
        .stager
        .stage_rule_code(
            &settings.archive_url,
            &settings.staging_bucket,
            &planning::CONFIG_RULE_NAMES,
        )
        .map_err(OrchestratorError::Provision)?;
    for key in keys {
        let identifier = format!("s3://{}/{key}", settings.staging_bucket);
        report.record(
            ProvisionStep::new(ResourceKind::StagedCode, key, StepOutcome::Created)
                .with_identifier(identifier),
        );
    }
    Ok(())
}

fn ensure_topic(
    mode: ExecutionMode,
    context: &OrchestratorContext,
    deps: &OrchestratorDeps<'_>,
    report: &mut ProvisionReport,
) -> Result<Option<String>, OrchestratorError> {
    let name = planning::configuration_topic_name();
    match deps
        .topics
        .find_topic(&name)
        .map_err(OrchestratorError::Provision)?
    {
        Some(arn) => {
            report.record(
                ProvisionStep::new(ResourceKind::SnsTopic, &name, StepOutcome::AlreadyPresent)
                    .with_identifier(arn.clone()),
            );
            Ok(Some(arn))
        }
        None if mode.is_dry_run() => {
            report.record(ProvisionStep::new(
                ResourceKind::SnsTopic,
                &name,
                StepOutcome::SkippedDryRun,
            ));
            report.record(ProvisionStep::new(
                ResourceKind::TopicPermission,
                SNS_INVOKE_STATEMENT,
                StepOutcome::SkippedDryRun,
            ));
            report.record(ProvisionStep::new(
                ResourceKind::TopicSubscription,
                &context.function_arn,
                StepOutcome::SkippedDryRun,
            ));
            Ok(None)
        }
        None => {
            let arn = deps
                .topics
                .create_topic(&name, planning::SOLUTION_NAME)
                .map_err(OrchestratorError::Provision)?;
            report.record(
                ProvisionStep::new(ResourceKind::SnsTopic, &name, StepOutcome::Created)
                    .with_identifier(arn.clone()),
            );

            deps.topics
                .allow_topic_invoke(&context.function_name, SNS_INVOKE_STATEMENT, &arn)
                .map_err(OrchestratorError::Provision)?;
            report.record(ProvisionStep::new(
                ResourceKind::TopicPermission,
                SNS_INVOKE_STATEMENT,
                StepOutcome::Created,
            ));

            deps.topics
                .subscribe_function(&arn, &context.function_arn)
                .map_err(OrchestratorError::Provision)?;
            report.record(ProvisionStep::new(
                ResourceKind::TopicSubscription,
                &context.function_arn,
                StepOutcome::Created,
            ));
            Ok(Some(arn))
        }
    }
}

fn ensure_state_table(
    mode: ExecutionMode,
    deps: &OrchestratorDeps<'_>,
    report: &mut ProvisionReport,
) -> Result<(), OrchestratorError> {
    if mode.is_dry_run() {
        report.record(ProvisionStep::new(
            ResourceKind::StateTable,
            planning::STATE_TABLE,
            StepOutcome::SkippedDryRun,
        ));
        return Ok(());
    }

    let outcome = deps
        .state
        .ensure_table(planning::STATE_TABLE)
        .map_err(OrchestratorError::Provision)?;
    report.record(ProvisionStep::new(
        ResourceKind::StateTable,
        planning::STATE_TABLE,
        match outcome {
            TableOutcome::Created => StepOutcome::Created,
            TableOutcome::AlreadyPresent => StepOutcome::AlreadyPresent,
        },
    ));
    Ok(())
}

fn ensure_rule_role(
    mode: ExecutionMode,
    context: &OrchestratorContext,
    deps: &OrchestratorDeps<'_>,
    report: &mut ProvisionReport,
    account_id: &str,
    rule_name: &str,
) -> Result<String, OrchestratorError> {
    let role_arn = match deps
        .roles
        .find_role(account_id, rule_name)
        .map_err(OrchestratorError::Provision)?
    {
        Some(arn) => {
            report.record(
                ProvisionStep::new(ResourceKind::IamRole, rule_name, StepOutcome::AlreadyPresent)
                    .in_account(account_id)
                    .with_identifier(arn.clone()),
            );
            arn
        }
        None if mode.is_dry_run() => {
            report.record(
                ProvisionStep::new(ResourceKind::IamRole, rule_name, StepOutcome::SkippedDryRun)
                    .in_account(account_id),
            );
            planning::role_arn(&context.partition, account_id, rule_name)
        }
        None => {
            let arn = deps
                .roles
                .create_role(
                    account_id,
                    rule_name,
                    &planning::lambda_trust_document(),
                    planning::SOLUTION_NAME,
                )
                .map_err(OrchestratorError::Provision)?;
            report.record(
                ProvisionStep::new(ResourceKind::IamRole, rule_name, StepOutcome::Created)
                    .in_account(account_id)
                    .with_identifier(arn.clone()),
            );
            arn
        }
    };

    let execution_policy_arn = ensure_policy(
        mode,
        deps,
        report,
        account_id,
        &context.partition,
        &planning::execution_policy_name(rule_name),
        planning::execution_policy_document(&context.partition, account_id, rule_name),
    )?;
    let audit_policy_arn = ensure_policy(
        mode,
        deps,
        report,
        account_id,
        &context.partition,
        &planning::audit_policy_name(rule_name),
        planning::audit_policy_document(),
    )?;

    let managed_arn = planning::managed_config_rules_policy_arn(&context.partition);
    for policy_arn in [execution_policy_arn, audit_policy_arn, managed_arn] {
        ensure_attachment(mode, deps, report, account_id, rule_name, &policy_arn)?;
    }

    Ok(role_arn)
}

fn ensure_policy(
    mode: ExecutionMode,
    deps: &OrchestratorDeps<'_>,
    report: &mut ProvisionReport,
    account_id: &str,
    partition: &str,
    policy_name: &str,
    document: Value,
) -> Result<String, OrchestratorError> {
    let policy_arn = planning::policy_arn(partition, account_id, policy_name);
    if deps
        .roles
        .policy_exists(account_id, &policy_arn)
        .map_err(OrchestratorError::Provision)?
    {
        report.record(
            ProvisionStep::new(ResourceKind::IamPolicy, policy_name, StepOutcome::AlreadyPresent)
                .in_account(account_id)
                .with_identifier(policy_arn.clone()),
        );
    } else if mode.is_dry_run() {
        report.record(
            ProvisionStep::new(ResourceKind::IamPolicy, policy_name, StepOutcome::SkippedDryRun)
                .in_account(account_id),
        );
    } else {
        let created_arn = deps
            .roles
            .create_policy(account_id, policy_name, &document, planning::SOLUTION_NAME)
            .map_err(OrchestratorError::Provision)?;
        report.record(
            ProvisionStep::new(ResourceKind::IamPolicy, policy_name, StepOutcome::Created)
                .in_account(account_id)
                .with_identifier(created_arn),
        );
    }
    Ok(policy_arn)
}

fn ensure_attachment(
    mode: ExecutionMode,
    deps: &OrchestratorDeps<'_>,
    report: &mut ProvisionReport,
    account_id: &str,
    role_name: &str,
    policy_arn: &str,
) -> Result<(), OrchestratorError> {
    if deps
        .roles
        .policy_attached(account_id, role_name, policy_arn)
        .map_err(OrchestratorError::Provision)?
    {
        report.record(
            ProvisionStep::new(
                ResourceKind::PolicyAttachment,
                policy_arn,
                StepOutcome::AlreadyPresent,
            )
            .in_account(account_id),
        );
        return Ok(());
    }

    if mode.is_dry_run() {
        report.record(
            ProvisionStep::new(
                ResourceKind::PolicyAttachment,
                policy_arn,
                StepOutcome::SkippedDryRun,
            )
            .in_account(account_id),
        );
        return Ok(());
    }

    deps.roles
        .attach_policy(account_id, role_name, policy_arn)
        .map_err(OrchestratorError::Provision)?;
    report.record(
        ProvisionStep::new(
            ResourceKind::PolicyAttachment,
            policy_arn,
            StepOutcome::Created,
        )
        .in_account(account_id),
    );
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn ensure_rule_function(
    mode: ExecutionMode,
    context: &OrchestratorContext,
    deps: &OrchestratorDeps<'_>,
    report: &mut ProvisionReport,
    account_id: &str,
    region: &str,
    rule_name: &str,
    role_arn: &str,
    settings: &CreateSettings,
) -> Result<String, OrchestratorError> {
    match deps
        .functions
        .find_function(account_id, region, rule_name)
        .map_err(OrchestratorError::Provision)?
    {
        Some(arn) => {
            report.record(
                ProvisionStep::new(
                    ResourceKind::LambdaFunction,
                    rule_name,
                    StepOutcome::AlreadyPresent,
                )
                .in_account(account_id)
                .in_region(region)
                .with_identifier(arn.clone()),
            );
            Ok(arn)
        }
        None if mode.is_dry_run() => {
            report.record(
                ProvisionStep::new(
                    ResourceKind::LambdaFunction,
                    rule_name,
                    StepOutcome::SkippedDryRun,
                )
                .in_account(account_id)
                .in_region(region),
            );
            Ok(format!(
                "arn:{}:lambda:{region}:{account_id}:function:{rule_name}",
                context.partition
            ))
        }
        None => {
            let request = CreateFunctionRequest {
                function_name: rule_name.to_string(),
                role_arn: role_arn.to_string(),
                handler: RULE_HANDLER.to_string(),
                runtime: RULE_RUNTIME.to_string(),
                timeout_secs: RULE_TIMEOUT_SECS,
                memory_mb: RULE_MEMORY_MB,
                code_bucket: settings.staging_bucket.clone(),
                code_key: planning::staged_rule_key(rule_name),
                solution_name: planning::SOLUTION_NAME.to_string(),
            };
            let arn = deps
                .functions
                .create_function(account_id, region, &request)
                .map_err(OrchestratorError::Provision)?;
            report.record(
                ProvisionStep::new(ResourceKind::LambdaFunction, rule_name, StepOutcome::Created)
                    .in_account(account_id)
                    .in_region(region)
                    .with_identifier(arn.clone()),
            );
            Ok(arn)
        }
    }
}

fn ensure_config_rule(
    mode: ExecutionMode,
    deps: &OrchestratorDeps<'_>,
    report: &mut ProvisionReport,
    account_id: &str,
    region: &str,
    rule_name: &str,
    lambda_arn: &str,
) -> Result<(), OrchestratorError> {
    if let Some(arn) = deps
        .rules
        .find_rule(account_id, region, rule_name)
        .map_err(OrchestratorError::Provision)?
    {
        report.record(
            ProvisionStep::new(ResourceKind::ConfigRule, rule_name, StepOutcome::AlreadyPresent)
                .in_account(account_id)
                .in_region(region)
                .with_identifier(arn),
        );
        return Ok(());
    }

    if mode.is_dry_run() {
        report.record(
            ProvisionStep::new(
                ResourceKind::LambdaPermission,
                CONFIG_INVOKE_STATEMENT,
                StepOutcome::SkippedDryRun,
            )
            .in_account(account_id)
            .in_region(region),
        );
        report.record(
            ProvisionStep::new(ResourceKind::ConfigRule, rule_name, StepOutcome::SkippedDryRun)
                .in_account(account_id)
                .in_region(region),
        );
        return Ok(());
    }

    deps.functions
        .allow_config_invoke(account_id, region, rule_name, CONFIG_INVOKE_STATEMENT)
        .map_err(OrchestratorError::Provision)?;
    report.record(
        ProvisionStep::new(
            ResourceKind::LambdaPermission,
            CONFIG_INVOKE_STATEMENT,
            StepOutcome::Created,
        )
        .in_account(account_id)
        .in_region(region),
    );

    let request = CreateRuleRequest {
        rule_name: rule_name.to_string(),
        lambda_arn: lambda_arn.to_string(),
        schedule: planning::RULE_SCHEDULE.to_string(),
        input_parameters: planning::rule_input_parameters(rule_name),
        solution_name: planning::SOLUTION_NAME.to_string(),
    };
    deps.rules
        .create_rule(account_id, region, &request)
        .map_err(OrchestratorError::Provision)?;
    report.record(
        ProvisionStep::new(ResourceKind::ConfigRule, rule_name, StepOutcome::Created)
            .in_account(account_id)
            .in_region(region),
    );
    Ok(())
}

fn record_run(
    mode: ExecutionMode,
    context: &OrchestratorContext,
    deps: &OrchestratorDeps<'_>,
    report: &mut ProvisionReport,
) -> Result<(), OrchestratorError> {
    if mode.is_dry_run() {
        report.record(ProvisionStep::new(
            ResourceKind::StateRecord,
            planning::SOLUTION_NAME,
            StepOutcome::SkippedDryRun,
        ));
        return Ok(());
    }

    let record = new_state_record(BTreeMap::from([
        ("account".to_string(), context.account_id.clone()),
        ("region".to_string(), context.region.clone()),
        ("description".to_string(), "deployment run".to_string()),
        (
            "created_resources".to_string(),
            report.created_count().to_string(),
        ),
    ]));
    deps.state
        .insert_record(planning::STATE_TABLE, &record)
        .map_err(OrchestratorError::Provision)?;
    report.record(
        ProvisionStep::new(ResourceKind::StateRecord, planning::SOLUTION_NAME, StepOutcome::Created)
            .with_identifier(record.record_id),
    );
    Ok(())
}

fn new_state_record(attributes: BTreeMap<String, String>) -> StateRecord {
    StateRecord {
        solution_name: planning::SOLUTION_NAME.to_string(),
        record_id: generate_record_id(),
        date_time: timestamp_string(&Utc::now()),
        attributes,
    }
}

pub fn generate_record_id() -> String {
    let mut rng = rand::thread_rng();
    (0..RECORD_ID_LEN)
        .map(|_| {
            let index = rng.gen_range(0..RECORD_ID_ALPHABET.len());
            RECORD_ID_ALPHABET[index] as char
        })
        .collect()
}

fn response(
    status_code: u16,
    body: &str,
    lambda_start: String,
    dry_run: bool,
    report: ProvisionReport,
) -> OrchestratorResponse {
    OrchestratorResponse {
        status_code,
        lambda_start,
        lambda_finish: timestamp_string(&Utc::now()),
        body: body.to_string(),
        dry_run,
        report,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, BTreeSet};
    use std::sync::Mutex;

    use serde_json::json;

    use crate::runtime::contract::RuleParameters;
    use crate::runtime::custom_resource::CfnStatus;

    use super::*;

    fn context() -> OrchestratorContext {
        OrchestratorContext {
            account_id: "999988887777".to_string(),
            region: "us-east-1".to_string(),
            partition: "aws".to_string(),
            function_name: "bedrock-audit-orchestrator".to_string(),
            function_arn:
                "arn:aws:lambda:us-east-1:999988887777:function:bedrock-audit-orchestrator"
                    .to_string(),
            log_group_name: "/aws/lambda/bedrock-audit-orchestrator".to_string(),
        }
    }

    fn create_event(dry_run: &str) -> Value {
        json!({
            "RequestType": "Create",
            "ResponseURL": "https://cloudformation.example/respond",
            "StackId": "arn:aws:cloudformation:us-east-1:999988887777:stack/audit/abc",
            "RequestId": "req-1",
            "LogicalResourceId": "AuditOrchestrator",
            "ResourceProperties": {
                "DRY_RUN": dry_run,
                "CODE_ARCHIVE_URL": "https://example.com/bundle.zip",
                "RULE_REGIONS_ACCOUNTS": "{'bedrock-check-invocation-log-cloudwatch': {'accounts': ['111122223333'], 'regions': ['us-east-1']}, 'bedrock-check-invocation-log-s3': {'accounts': ['111122223333'], 'regions': ['us-east-1']}}"
            }
        })
    }

    #[derive(Default)]
    struct MockParameters {
        values: BTreeMap<String, String>,
    }

    impl MockParameters {
        fn with_defaults() -> Self {
            Self {
                values: BTreeMap::from([
                    (
                        planning::STAGING_BUCKET_PARAMETER.to_string(),
                        "audit-staging".to_string(),
                    ),
                    (
                        planning::GOVERNED_REGIONS_PARAMETER.to_string(),
                        "us-east-1,eu-west-1".to_string(),
                    ),
                ]),
            }
        }
    }

    impl ParameterDirectory for MockParameters {
        fn string_parameter(&self, name: &str) -> Result<Option<String>, String> {
            Ok(self.values.get(name).cloned())
        }

        fn string_list_parameter(&self, name: &str) -> Result<Option<Vec<String>>, String> {
            Ok(self
                .values
                .get(name)
                .map(|value| value.split(',').map(str::to_string).collect()))
        }
    }

    #[derive(Default)]
    struct MockAccounts {
        accounts: Vec<String>,
        queried: Mutex<usize>,
    }

    impl AccountDirectory for MockAccounts {
        fn organization_accounts(&self) -> Result<Vec<String>, String> {
            *self.queried.lock().expect("poisoned mutex") += 1;
            Ok(self.accounts.clone())
        }
    }

    #[derive(Default)]
    struct MockStager {
        staged: Mutex<Vec<String>>,
    }

    impl CodeStager for MockStager {
        fn stage_rule_code(
            &self,
            _archive_url: &str,
            _staging_bucket: &str,
            rule_names: &[&str],
        ) -> Result<Vec<String>, String> {
            let keys: Vec<String> = rule_names
                .iter()
                .map(|rule| planning::staged_rule_key(rule))
                .collect();
            self.staged
                .lock()
                .expect("poisoned mutex")
                .extend(keys.clone());
            Ok(keys)
        }
    }

    #[derive(Default)]
    struct MockTopics {
        existing_arn: Option<String>,
        created: Mutex<Vec<String>>,
        permissions: Mutex<Vec<String>>,
        subscriptions: Mutex<Vec<String>>,
    }

    impl TopicProvisioner for MockTopics {
        fn find_topic(&self, _name: &str) -> Result<Option<String>, String> {
            Ok(self.existing_arn.clone())
        }

        fn create_topic(&self, name: &str, _solution_name: &str) -> Result<String, String> {
            self.created
                .lock()
                .expect("poisoned mutex")
                .push(name.to_string());
            Ok(format!("arn:aws:sns:us-east-1:999988887777:{name}"))
        }

        fn allow_topic_invoke(
            &self,
            _function_name: &str,
            statement_id: &str,
            _topic_arn: &str,
        ) -> Result<(), String> {
            self.permissions
                .lock()
                .expect("poisoned mutex")
                .push(statement_id.to_string());
            Ok(())
        }

        fn subscribe_function(&self, _topic_arn: &str, function_arn: &str) -> Result<(), String> {
            self.subscriptions
                .lock()
                .expect("poisoned mutex")
                .push(function_arn.to_string());
            Ok(())
        }
    }

    #[derive(Default)]
    struct MockRoles {
        existing_roles: BTreeSet<(String, String)>,
        existing_policies: BTreeSet<(String, String)>,
        attached: BTreeSet<(String, String, String)>,
        created_roles: Mutex<Vec<(String, String)>>,
        created_policies: Mutex<Vec<(String, String)>>,
        attachments: Mutex<Vec<(String, String, String)>>,
    }

    impl RoleProvisioner for MockRoles {
        fn find_role(&self, account_id: &str, role_name: &str) -> Result<Option<String>, String> {
            if self
                .existing_roles
                .contains(&(account_id.to_string(), role_name.to_string()))
            {
                Ok(Some(planning::role_arn("aws", account_id, role_name)))
            } else {
                Ok(None)
            }
        }

        fn create_role(
            &self,
            account_id: &str,
            role_name: &str,
            _trust_document: &Value,
            _solution_name: &str,
        ) -> Result<String, String> {
            self.created_roles
                .lock()
                .expect("poisoned mutex")
                .push((account_id.to_string(), role_name.to_string()));
            Ok(planning::role_arn("aws", account_id, role_name))
        }

        fn policy_exists(&self, account_id: &str, policy_arn: &str) -> Result<bool, String> {
            Ok(self
                .existing_policies
                .contains(&(account_id.to_string(), policy_arn.to_string())))
        }

        fn create_policy(
            &self,
            account_id: &str,
            policy_name: &str,
            _document: &Value,
            _solution_name: &str,
        ) -> Result<String, String> {
            self.created_policies
                .lock()
                .expect("poisoned mutex")
                .push((account_id.to_string(), policy_name.to_string()));
            Ok(planning::policy_arn("aws", account_id, policy_name))
        }

        fn policy_attached(
            &self,
            account_id: &str,
            role_name: &str,
            policy_arn: &str,
        ) -> Result<bool, String> {
            Ok(self.attached.contains(&(
                account_id.to_string(),
                role_name.to_string(),
                policy_arn.to_string(),
            )))
        }

        fn attach_policy(
            &self,
            account_id: &str,
            role_name: &str,
            policy_arn: &str,
        ) -> Result<(), String> {
            self.attachments.lock().expect("poisoned mutex").push((
                account_id.to_string(),
                role_name.to_string(),
                policy_arn.to_string(),
            ));
            Ok(())
        }
    }

    #[derive(Default)]
    struct MockFunctions {
        existing: BTreeSet<(String, String, String)>,
        created: Mutex<Vec<CreateFunctionRequest>>,
        permissions: Mutex<Vec<(String, String, String)>>,
    }

    impl FunctionProvisioner for MockFunctions {
        fn find_function(
            &self,
            account_id: &str,
            region: &str,
            function_name: &str,
        ) -> Result<Option<String>, String> {
            if self.existing.contains(&(
                account_id.to_string(),
                region.to_string(),
                function_name.to_string(),
            )) {
                Ok(Some(format!(
                    "arn:aws:lambda:{region}:{account_id}:function:{function_name}"
                )))
            } else {
                Ok(None)
            }
        }

        fn create_function(
            &self,
            account_id: &str,
            region: &str,
            request: &CreateFunctionRequest,
        ) -> Result<String, String> {
            self.created
                .lock()
                .expect("poisoned mutex")
                .push(request.clone());
            Ok(format!(
                "arn:aws:lambda:{region}:{account_id}:function:{}",
                request.function_name
            ))
        }

        fn allow_config_invoke(
            &self,
            account_id: &str,
            region: &str,
            function_name: &str,
            _statement_id: &str,
        ) -> Result<(), String> {
            self.permissions.lock().expect("poisoned mutex").push((
                account_id.to_string(),
                region.to_string(),
                function_name.to_string(),
            ));
            Ok(())
        }
    }

    #[derive(Default)]
    struct MockRules {
        existing: BTreeSet<(String, String, String)>,
        created: Mutex<Vec<(String, String, CreateRuleRequest)>>,
    }

    impl RuleProvisioner for MockRules {
        fn find_rule(
            &self,
            account_id: &str,
            region: &str,
            rule_name: &str,
        ) -> Result<Option<String>, String> {
            if self.existing.contains(&(
                account_id.to_string(),
                region.to_string(),
                rule_name.to_string(),
            )) {
                Ok(Some(format!(
                    "arn:aws:config:{region}:{account_id}:config-rule/{rule_name}"
                )))
            } else {
                Ok(None)
            }
        }

        fn create_rule(
            &self,
            account_id: &str,
            region: &str,
            request: &CreateRuleRequest,
        ) -> Result<(), String> {
            self.created.lock().expect("poisoned mutex").push((
                account_id.to_string(),
                region.to_string(),
                request.clone(),
            ));
            Ok(())
        }
    }

    #[derive(Default)]
    struct MockState {
        table_exists: bool,
        created_tables: Mutex<Vec<String>>,
        records: Mutex<Vec<StateRecord>>,
    }

    impl StateStore for MockState {
        fn ensure_table(&self, table_name: &str) -> Result<TableOutcome, String> {
            if self.table_exists {
                return Ok(TableOutcome::AlreadyPresent);
            }
            self.created_tables
                .lock()
                .expect("poisoned mutex")
                .push(table_name.to_string());
            Ok(TableOutcome::Created)
        }

        fn insert_record(&self, _table_name: &str, record: &StateRecord) -> Result<(), String> {
            self.records
                .lock()
                .expect("poisoned mutex")
                .push(record.clone());
            Ok(())
        }

        fn update_record(
            &self,
            _table_name: &str,
            _solution_name: &str,
            _record_id: &str,
            _attributes: &BTreeMap<String, String>,
        ) -> Result<(), String> {
            Ok(())
        }

        fn find_record(
            &self,
            _table_name: &str,
            _solution_name: &str,
            _filters: &BTreeMap<String, String>,
        ) -> Result<Option<StateRecord>, String> {
            Ok(None)
        }

        fn distinct_solutions_and_accounts(
            &self,
            _table_name: &str,
        ) -> Result<(Vec<String>, Vec<String>), String> {
            Ok((Vec::new(), Vec::new()))
        }
    }

    #[derive(Default)]
    struct MockCfn {
        sent: Mutex<Vec<(String, CfnResponseBody)>>,
    }

    impl MockCfn {
        fn sent(&self) -> Vec<(String, CfnResponseBody)> {
            self.sent.lock().expect("poisoned mutex").clone()
        }
    }

    impl CfnResponder for MockCfn {
        fn send(&self, response_url: &str, body: &CfnResponseBody) -> Result<(), String> {
            self.sent
                .lock()
                .expect("poisoned mutex")
                .push((response_url.to_string(), body.clone()));
            Ok(())
        }
    }

    struct Mocks {
        parameters: MockParameters,
        accounts: MockAccounts,
        stager: MockStager,
        topics: MockTopics,
        roles: MockRoles,
        functions: MockFunctions,
        rules: MockRules,
        state: MockState,
        cfn: MockCfn,
    }

    impl Mocks {
        fn new() -> Self {
            Self {
                parameters: MockParameters::with_defaults(),
                accounts: MockAccounts::default(),
                stager: MockStager::default(),
                topics: MockTopics::default(),
                roles: MockRoles::default(),
                functions: MockFunctions::default(),
                rules: MockRules::default(),
                state: MockState::default(),
                cfn: MockCfn::default(),
            }
        }

        fn deps(&self) -> OrchestratorDeps<'_> {
            OrchestratorDeps {
                parameters: &self.parameters,
                accounts: &self.accounts,
                stager: &self.stager,
                topics: &self.topics,
                roles: &self.roles,
                functions: &self.functions,
                rules: &self.rules,
                state: &self.state,
                cfn: &self.cfn,
            }
        }
    }

    #[test]
    fn dry_run_create_records_steps_without_mutating() {
        let mocks = Mocks::new();
        let response =
            handle_orchestrator_event(&create_event("true"), &context(), &mocks.deps());

        assert_eq!(response.status_code, 200);
        assert!(response.dry_run);
        assert!(mocks.stager.staged.lock().unwrap().is_empty());
        assert!(mocks.topics.created.lock().unwrap().is_empty());
        assert!(mocks.roles.created_roles.lock().unwrap().is_empty());
        assert!(mocks.functions.created.lock().unwrap().is_empty());
        assert!(mocks.rules.created.lock().unwrap().is_empty());
        assert!(mocks.state.created_tables.lock().unwrap().is_empty());
        assert!(response
            .report
            .steps
            .iter()
            .all(|step| step.outcome != StepOutcome::Created));

        let sent = mocks.cfn.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1.status, CfnStatus::Success);
    }

    #[test]
    fn live_create_provisions_missing_resources() {
        let mocks = Mocks::new();
        let response =
            handle_orchestrator_event(&create_event("false"), &context(), &mocks.deps());

        assert_eq!(response.status_code, 200);
        assert!(!response.dry_run);
        assert_eq!(response.body, "SUCCESS");

        assert_eq!(mocks.stager.staged.lock().unwrap().len(), 2);
        assert_eq!(
            *mocks.topics.created.lock().unwrap(),
            vec![planning::configuration_topic_name()]
        );
        assert_eq!(mocks.topics.permissions.lock().unwrap().len(), 1);
        assert_eq!(mocks.topics.subscriptions.lock().unwrap().len(), 1);
        assert_eq!(
            *mocks.state.created_tables.lock().unwrap(),
            vec![planning::STATE_TABLE.to_string()]
        );

        // One role, three policies attached, one function, one rule per
        // config rule in the single targeted account/region.
        assert_eq!(mocks.roles.created_roles.lock().unwrap().len(), 2);
        assert_eq!(mocks.roles.created_policies.lock().unwrap().len(), 4);
        assert_eq!(mocks.roles.attachments.lock().unwrap().len(), 6);
        let created_functions = mocks.functions.created.lock().unwrap().clone();
        assert_eq!(created_functions.len(), 2);
        assert!(created_functions
            .iter()
            .all(|request| request.runtime == "provided.al2023"
                && request.handler == "bootstrap"
                && request.code_bucket == "audit-staging"));
        let created_rules = mocks.rules.created.lock().unwrap().clone();
        assert_eq!(created_rules.len(), 2);
        assert!(created_rules
            .iter()
            .all(|(account, region, request)| account == "111122223333"
                && region == "us-east-1"
                && request.schedule == planning::RULE_SCHEDULE));

        // One state record for the run.
        assert_eq!(mocks.state.records.lock().unwrap().len(), 1);

        let sent = mocks.cfn.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1.status, CfnStatus::Success);
        assert_eq!(sent[0].1.data["deployed_rules"], 2);
    }

    #[test]
    fn live_create_is_idempotent_when_everything_exists() {
        let mut mocks = Mocks::new();
        mocks.topics.existing_arn =
            Some("arn:aws:sns:us-east-1:999988887777:bedrock-logging-audit-configuration".into());
        mocks.state.table_exists = true;
        for rule_name in planning::CONFIG_RULE_NAMES {
            mocks
                .roles
                .existing_roles
                .insert(("111122223333".to_string(), rule_name.to_string()));
            for policy_name in [
                planning::execution_policy_name(rule_name),
                planning::audit_policy_name(rule_name),
            ] {
                mocks.roles.existing_policies.insert((
                    "111122223333".to_string(),
                    planning::policy_arn("aws", "111122223333", &policy_name),
                ));
            }
            for policy_arn in [
                planning::policy_arn(
                    "aws",
                    "111122223333",
                    &planning::execution_policy_name(rule_name),
                ),
                planning::policy_arn(
                    "aws",
                    "111122223333",
                    &planning::audit_policy_name(rule_name),
                ),
                planning::managed_config_rules_policy_arn("aws"),
            ] {
                mocks.roles.attached.insert((
                    "111122223333".to_string(),
                    rule_name.to_string(),
                    policy_arn,
                ));
            }
            mocks.functions.existing.insert((
                "111122223333".to_string(),
                "us-east-1".to_string(),
                rule_name.to_string(),
            ));
            mocks.rules.existing.insert((
                "111122223333".to_string(),
                "us-east-1".to_string(),
                rule_name.to_string(),
            ));
        }

        let response =
            handle_orchestrator_event(&create_event("false"), &context(), &mocks.deps());

        assert_eq!(response.status_code, 200);
        assert!(mocks.topics.created.lock().unwrap().is_empty());
        assert!(mocks.roles.created_roles.lock().unwrap().is_empty());
        assert!(mocks.roles.created_policies.lock().unwrap().is_empty());
        assert!(mocks.roles.attachments.lock().unwrap().is_empty());
        assert!(mocks.functions.created.lock().unwrap().is_empty());
        assert!(mocks.rules.created.lock().unwrap().is_empty());
        // Code staging and the run record still happen on a live create.
        assert_eq!(mocks.stager.staged.lock().unwrap().len(), 2);
        assert_eq!(mocks.state.records.lock().unwrap().len(), 1);
    }

    #[test]
    fn missing_staging_bucket_sends_cfn_failed() {
        let mut mocks = Mocks::new();
        mocks
            .parameters
            .values
            .remove(planning::STAGING_BUCKET_PARAMETER);

        let response =
            handle_orchestrator_event(&create_event("false"), &context(), &mocks.deps());

        assert_eq!(response.status_code, 500);
        assert_eq!(response.body, "ERROR");
        let sent = mocks.cfn.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1.status, CfnStatus::Failed);
        assert!(sent[0]
            .1
            .reason
            .as_deref()
            .expect("failure should carry a reason")
            .contains("/aws/lambda/bedrock-audit-orchestrator"));
    }

    #[test]
    fn rule_without_listed_accounts_targets_the_organization() {
        let mut mocks = Mocks::new();
        mocks.accounts.accounts =
            vec!["111122223333".to_string(), "444455556666".to_string()];

        let mut event = create_event("true");
        event["ResourceProperties"]
            .as_object_mut()
            .unwrap()
            .remove("RULE_REGIONS_ACCOUNTS");

        let response = handle_orchestrator_event(&event, &context(), &mocks.deps());

        assert_eq!(response.status_code, 200);
        assert_eq!(*mocks.accounts.queried.lock().unwrap(), 1);
        let governed_role_steps: Vec<&ProvisionStep> = response
            .report
            .steps
            .iter()
            .filter(|step| step.kind == ResourceKind::IamRole)
            .collect();
        // Two rules across two organization accounts.
        assert_eq!(governed_role_steps.len(), 4);
        assert!(governed_role_steps
            .iter()
            .any(|step| step.account_id.as_deref() == Some("444455556666")));
        // Governed regions come from the SSM parameter.
        assert!(response
            .report
            .steps
            .iter()
            .filter(|step| step.kind == ResourceKind::ConfigRule)
            .any(|step| step.region.as_deref() == Some("eu-west-1")));
    }

    #[test]
    fn update_and_delete_acknowledge_without_provisioning() {
        for request_type in ["Update", "Delete"] {
            let mocks = Mocks::new();
            let mut event = create_event("false");
            event["RequestType"] = Value::from(request_type);

            let response = handle_orchestrator_event(&event, &context(), &mocks.deps());

            assert_eq!(response.status_code, 200);
            assert!(mocks.stager.staged.lock().unwrap().is_empty());
            assert!(mocks.rules.created.lock().unwrap().is_empty());
            let sent = mocks.cfn.sent();
            assert_eq!(sent.len(), 1);
            assert_eq!(sent[0].1.status, CfnStatus::Success);
        }
    }

    #[test]
    fn fanout_reensures_rules_for_deployed_lambdas() {
        let mut mocks = Mocks::new();
        for region in ["us-east-1", "eu-west-1"] {
            mocks.functions.existing.insert((
                "444455556666".to_string(),
                region.to_string(),
                planning::S3_RULE.to_string(),
            ));
        }

        let event = json!({
            "Records": [{
                "EventSource": "aws:sns",
                "Sns": {
                    "Message": "{\"AccountId\":\"444455556666\",\"ConfigRuleName\":\"bedrock-check-invocation-log-s3\",\"Regions\":[\"us-east-1\",\"eu-west-1\"]}"
                }
            }]
        });

        let response = handle_orchestrator_event(&event, &context(), &mocks.deps());

        assert_eq!(response.status_code, 200);
        let created_rules = mocks.rules.created.lock().unwrap().clone();
        assert_eq!(created_rules.len(), 2);
        assert!(mocks.cfn.sent().is_empty());
    }

    #[test]
    fn fanout_fails_when_rule_lambda_is_missing() {
        let mocks = Mocks::new();
        let event = json!({
            "Records": [{
                "EventSource": "aws:sns",
                "Sns": {
                    "Message": "{\"AccountId\":\"444455556666\",\"ConfigRuleName\":\"bedrock-check-invocation-log-s3\",\"Regions\":[\"us-east-1\"]}"
                }
            }]
        });

        let response = handle_orchestrator_event(&event, &context(), &mocks.deps());
        assert_eq!(response.status_code, 500);
    }

    #[test]
    fn invalid_event_is_a_500_without_cfn_response() {
        let mocks = Mocks::new();
        let response =
            handle_orchestrator_event(&json!({"foo": "bar"}), &context(), &mocks.deps());

        assert_eq!(response.status_code, 500);
        assert!(mocks.cfn.sent().is_empty());
    }

    #[test]
    fn generated_record_ids_use_the_documented_alphabet() {
        let id = generate_record_id();
        assert_eq!(id.len(), RECORD_ID_LEN);
        assert!(id.bytes().all(|b| RECORD_ID_ALPHABET.contains(&b)));
    }

    #[test]
    fn default_checks_parse_back_from_registration_parameters() {
        // The parameters registered with a rule must round-trip through the
        // rule lambda's own parameter parsing.
        let registered = planning::rule_input_parameters(planning::S3_RULE);
        let parameters: RuleParameters = registered
            .as_object()
            .expect("parameters should be an object")
            .iter()
            .map(|(name, value)| (name.clone(), value.as_str().unwrap_or_default().to_string()))
            .collect();
        let checks = crate::runtime::compliance::S3Checks::from_parameters(&parameters);
        assert!(checks.check_retention && checks.check_object_locking);
    }
}
