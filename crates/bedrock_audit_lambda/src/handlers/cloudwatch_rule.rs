use serde_json::Value;

use crate::adapters::evaluations::EvaluationSink;
use crate::adapters::log_groups::LogGroupInspector;
use crate::adapters::logging_probe::InvocationLoggingProbe;
use crate::runtime::compliance::{
    error_verdict, evaluate_cloudwatch, CloudWatchChecks, Verdict,
};
use crate::runtime::contract::parse_rule_invocation;

use super::{evaluation_for, RuleHandlerError, RuleResponse};

/// Evaluates whether model-invocation logging to CloudWatch is properly
/// configured and submits exactly one account-level evaluation.
pub fn handle_cloudwatch_rule_event(
    event: &Value,
    probe: &dyn InvocationLoggingProbe,
    log_groups: &dyn LogGroupInspector,
    evaluations: &dyn EvaluationSink,
) -> Result<RuleResponse, RuleHandlerError> {
    let invocation = parse_rule_invocation(event).map_err(|error| RuleHandlerError {
        message: error.to_string(),
    })?;
    let checks = CloudWatchChecks::from_parameters(&invocation.rule_parameters);

    let verdict = observe_and_evaluate(checks, probe, log_groups);
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
    checks: CloudWatchChecks,
    probe: &dyn InvocationLoggingProbe,
    log_groups: &dyn LogGroupInspector,
) -> Verdict {
    let config = match probe.fetch_logging_config() {
        Ok(config) => config,
        Err(error) => return error_verdict(&error),
    };

    let destination = config.cloudwatch;
    let Some(log_group_name) = destination.log_group_name.clone().filter(|_| destination.enabled)
    else {
        return evaluate_cloudwatch(checks, &destination, None);
    };

    let facts = if checks.needs_log_group_facts() {
        match log_groups.log_group_facts(&log_group_name) {
            Ok(Some(facts)) => Some(facts),
            Ok(None) => return error_verdict(&format!("log group '{log_group_name}' not found")),
            Err(error) => return error_verdict(&error),
        }
    } else {
        None
    };

    evaluate_cloudwatch(checks, &destination, facts.as_ref())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;

    use crate::runtime::compliance::{
        CloudWatchDestination, InvocationLoggingConfig, LogGroupFacts,
    };
    use crate::runtime::contract::{ComplianceType, Evaluation};

    use super::*;

    struct FixedProbe {
        config: Result<InvocationLoggingConfig, String>,
    }

    impl InvocationLoggingProbe for FixedProbe {
        fn fetch_logging_config(&self) -> Result<InvocationLoggingConfig, String> {
            self.config.clone()
        }
    }

    struct FixedInspector {
        facts: Result<Option<LogGroupFacts>, String>,
    }

    impl LogGroupInspector for FixedInspector {
        fn log_group_facts(&self, _name_prefix: &str) -> Result<Option<LogGroupFacts>, String> {
            self.facts.clone()
        }
    }

    struct CapturingSink {
        submissions: Mutex<Vec<(String, Evaluation)>>,
    }

    impl CapturingSink {
        fn new() -> Self {
            Self {
                submissions: Mutex::new(Vec::new()),
            }
        }

        fn submissions(&self) -> Vec<(String, Evaluation)> {
            self.submissions.lock().expect("poisoned mutex").clone()
        }
    }

    impl EvaluationSink for CapturingSink {
        fn put_evaluation(&self, result_token: &str, evaluation: &Evaluation) -> Result<(), String> {
            self.submissions
                .lock()
                .expect("poisoned mutex")
                .push((result_token.to_string(), evaluation.clone()));
            Ok(())
        }
    }

    struct FailingSink;

    impl EvaluationSink for FailingSink {
        fn put_evaluation(
            &self,
            _result_token: &str,
            _evaluation: &Evaluation,
        ) -> Result<(), String> {
            Err("simulated put_evaluations outage".to_string())
        }
    }

    fn rule_event(parameters: &str) -> Value {
        json!({
            "accountId": "111122223333",
            "resultToken": "token-42",
            "invokingEvent": "{\"notificationCreationTime\":\"2026-03-01T12:00:00.000Z\"}",
            "ruleParameters": parameters,
        })
    }

    fn configured_probe() -> FixedProbe {
        FixedProbe {
            config: Ok(InvocationLoggingConfig {
                cloudwatch: CloudWatchDestination {
                    enabled: true,
                    log_group_name: Some("bedrock-invocations".to_string()),
                },
                ..InvocationLoggingConfig::default()
            }),
        }
    }

    #[test]
    fn compliant_group_submits_compliant_evaluation() {
        let inspector = FixedInspector {
            facts: Ok(Some(LogGroupFacts {
                retention_days: Some(90),
                kms_key_id: Some("key-arn".to_string()),
            })),
        };
        let sink = CapturingSink::new();

        let response = handle_cloudwatch_rule_event(
            &rule_event("{}"),
            &configured_probe(),
            &inspector,
            &sink,
        )
        .expect("handler should succeed");

        assert_eq!(response.compliance, ComplianceType::Compliant);
        let submissions = sink.submissions();
        assert_eq!(submissions.len(), 1);
        let (token, evaluation) = &submissions[0];
        assert_eq!(token, "token-42");
        assert_eq!(evaluation.resource_id, "111122223333");
        assert_eq!(evaluation.ordering_timestamp, "2026-03-01T12:00:00.000Z");
    }

    #[test]
    fn missing_retention_is_non_compliant() {
        let inspector = FixedInspector {
            facts: Ok(Some(LogGroupFacts {
                retention_days: None,
                kms_key_id: Some("key-arn".to_string()),
            })),
        };
        let sink = CapturingSink::new();

        let response = handle_cloudwatch_rule_event(
            &rule_event("{}"),
            &configured_probe(),
            &inspector,
            &sink,
        )
        .expect("handler should succeed");

        assert_eq!(response.compliance, ComplianceType::NonCompliant);
        assert_eq!(
            response.annotation,
            "CloudWatch logging enabled but retention not set"
        );
    }

    #[test]
    fn disabled_checks_skip_the_log_group_probe() {
        let inspector = FixedInspector {
            facts: Err("probe should not run".to_string()),
        };
        let sink = CapturingSink::new();

        let response = handle_cloudwatch_rule_event(
            &rule_event("{\"check_retention\":\"false\",\"check_encryption\":\"false\"}"),
            &configured_probe(),
            &inspector,
            &sink,
        )
        .expect("handler should succeed");

        assert_eq!(response.compliance, ComplianceType::Compliant);
    }

    #[test]
    fn probe_failure_submits_error_evaluation() {
        let probe = FixedProbe {
            config: Err("AccessDeniedException".to_string()),
        };
        let inspector = FixedInspector { facts: Ok(None) };
        let sink = CapturingSink::new();

        let response = handle_cloudwatch_rule_event(&rule_event("{}"), &probe, &inspector, &sink)
            .expect("handler should succeed");

        assert_eq!(response.compliance, ComplianceType::Error);
        assert_eq!(
            response.annotation,
            "Error evaluating compliance: AccessDeniedException"
        );
        assert_eq!(sink.submissions().len(), 1);
    }

    #[test]
    fn missing_log_group_is_an_error_verdict() {
        let inspector = FixedInspector { facts: Ok(None) };
        let sink = CapturingSink::new();

        let response = handle_cloudwatch_rule_event(
            &rule_event("{}"),
            &configured_probe(),
            &inspector,
            &sink,
        )
        .expect("handler should succeed");

        assert_eq!(response.compliance, ComplianceType::Error);
        assert_eq!(
            response.annotation,
            "Error evaluating compliance: log group 'bedrock-invocations' not found"
        );
    }

    #[test]
    fn sink_failure_is_a_handler_error() {
        let inspector = FixedInspector {
            facts: Ok(Some(LogGroupFacts::default())),
        };

        let error = handle_cloudwatch_rule_event(
            &rule_event("{}"),
            &configured_probe(),
            &inspector,
            &FailingSink,
        )
        .expect_err("handler should fail");

        assert!(error.message.contains("failed to submit evaluation"));
    }

    #[test]
    fn malformed_event_never_reaches_the_sink() {
        let sink = CapturingSink::new();
        let inspector = FixedInspector { facts: Ok(None) };

        let error = handle_cloudwatch_rule_event(
            &json!({"accountId": "111122223333"}),
            &configured_probe(),
            &inspector,
            &sink,
        )
        .expect_err("handler should fail");

        assert!(error.message.contains("resultToken"));
        assert!(sink.submissions().is_empty());
    }
}
