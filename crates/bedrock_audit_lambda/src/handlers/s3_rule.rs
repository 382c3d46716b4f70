use serde_json::Value;

use crate::adapters::buckets::BucketInspector;
use crate::adapters::evaluations::EvaluationSink;
use crate::adapters::logging_probe::InvocationLoggingProbe;
use crate::runtime::compliance::{error_verdict, evaluate_s3, BucketFacts, S3Checks, Verdict};
use crate::runtime::contract::parse_rule_invocation;

use super::{evaluation_for, RuleHandlerError, RuleResponse};

/// Evaluates whether model-invocation logging to S3 is properly configured
/// and submits exactly one account-level evaluation.
pub fn handle_s3_rule_event(
    event: &Value,
    probe: &dyn InvocationLoggingProbe,
    buckets: &dyn BucketInspector,
    evaluations: &dyn EvaluationSink,
) -> Result<RuleResponse, RuleHandlerError> {
    let invocation = parse_rule_invocation(event).map_err(|error| RuleHandlerError {
        message: error.to_string(),
    })?;
    let checks = S3Checks::from_parameters(&invocation.rule_parameters);

    let verdict = observe_and_evaluate(checks, probe, buckets);
    tracing::info!(
        compliance = verdict.compliance.as_str(),
        annotation = %verdict.annotation,
        "compliance evaluation result"
    );

    let evaluation = evaluation_for(&invocation, &verdict);
    evaluations
        .put_evaluation(&invocation.result_token, &evaluation)
        .map_err(|error| RuleHandlerError {
            message: format!("failed to submit evaluation: {error}"),
        })?;

    Ok(RuleResponse {
        compliance: verdict.compliance,
        annotation: verdict.annotation,
    })
}

fn observe_and_evaluate(
    checks: S3Checks,
    probe: &dyn InvocationLoggingProbe,
    buckets: &dyn BucketInspector,
) -> Verdict {
    let config = match probe.fetch_logging_config() {
        Ok(config) => config,
        Err(error) => return error_verdict(&error),
    };

    let destination = config.s3;
    let Some(bucket) = destination.bucket_name.clone().filter(|_| destination.enabled) else {
        return evaluate_s3(checks, &destination, &BucketFacts::default());
    };

    let facts = match observe_bucket(checks, buckets, &bucket) {
        Ok(facts) => facts,
        Err(error) => return error_verdict(&error),
    };

    evaluate_s3(checks, &destination, &facts)
}

/// Probes only what the enabled checks need; unprobed facts stay `false`
/// and are never consulted by the decision.
fn observe_bucket(
    checks: S3Checks,
    buckets: &dyn BucketInspector,
    bucket: &str,
) -> Result<BucketFacts, String> {
    let mut facts = BucketFacts::default();
    if checks.check_retention {
        facts.has_expiration_rule = buckets.has_expiration_rule(bucket)?;
    }
    if checks.check_encryption {
        facts.has_server_side_encryption = buckets.has_server_side_encryption(bucket)?;
    }
    if checks.check_access_logging {
        facts.access_logging_enabled = buckets.has_access_logging(bucket)?;
    }
    if checks.check_object_locking {
        facts.object_lock_enabled = buckets.has_object_lock(bucket)?;
    }
    if checks.check_versioning {
        facts.versioning_enabled = buckets.has_versioning_enabled(bucket)?;
    }
    Ok(facts)
}
