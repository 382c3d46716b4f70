use crate::contract::{flag_enabled, ComplianceType, RuleParameters};

/// Outcome of a compliance decision, ready to become an evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub compliance: ComplianceType,
    pub annotation: String,
}

pub fn error_verdict(error: &str) -> Verdict {
    Verdict {
        compliance: ComplianceType::Error,
        annotation: format!("Error evaluating compliance: {error}"),
    }
}

/// The account's Bedrock model-invocation logging configuration, reduced to
/// the two destinations the rules care about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvocationLoggingConfig {
    pub cloudwatch: CloudWatchDestination,
    pub s3: S3Destination,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CloudWatchDestination {
    pub enabled: bool,
    pub log_group_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct S3Destination {
    pub enabled: bool,
    pub bucket_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CloudWatchChecks {
    pub check_retention: bool,
    pub check_encryption: bool,
}

impl CloudWatchChecks {
    pub fn from_parameters(parameters: &RuleParameters) -> Self {
        Self {
            check_retention: flag_enabled(parameters, "check_retention", true),
            check_encryption: flag_enabled(parameters, "check_encryption", true),
        }
    }

    pub fn needs_log_group_facts(self) -> bool {
        self.check_retention || self.check_encryption
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct S3Checks {
    pub check_retention: bool,
    pub check_encryption: bool,
    pub check_access_logging: bool,
    pub check_object_locking: bool,
    pub check_versioning: bool,
}

impl S3Checks {
    pub fn from_parameters(parameters: &RuleParameters) -> Self {
        Self {
            check_retention: flag_enabled(parameters, "check_retention", true),
            check_encryption: flag_enabled(parameters, "check_encryption", true),
            check_access_logging: flag_enabled(parameters, "check_access_logging", true),
            check_object_locking: flag_enabled(parameters, "check_object_locking", true),
            check_versioning: flag_enabled(parameters, "check_versioning", true),
        }
    }
}

/// Observed facts about the configured CloudWatch log group.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogGroupFacts {
    pub retention_days: Option<i32>,
    pub kms_key_id: Option<String>,
}

/// Observed facts about the configured S3 bucket. Fields for disabled
/// checks are never consulted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BucketFacts {
    pub has_expiration_rule: bool,
    pub has_server_side_encryption: bool,
    pub access_logging_enabled: bool,
    pub object_lock_enabled: bool,
    pub versioning_enabled: bool,
}

pub fn evaluate_cloudwatch(
    checks: CloudWatchChecks,
    destination: &CloudWatchDestination,
    facts: Option<&LogGroupFacts>,
) -> Verdict {
    let Some(log_group_name) = enabled_target(destination.enabled, &destination.log_group_name)
    else {
        return Verdict {
            compliance: ComplianceType::NonCompliant,
            annotation: "CloudWatch logging is not enabled for Bedrock Model Invocation Logging"
                .to_string(),
        };
    };

    let mut issues = Vec::new();
    if checks.check_retention && facts.map_or(true, |f| f.retention_days.is_none()) {
        issues.push("retention not set");
    }
    if checks.check_encryption && facts.map_or(true, |f| f.kms_key_id.is_none()) {
        issues.push("encryption not set");
    }

    if !issues.is_empty() {
        return Verdict {
            compliance: ComplianceType::NonCompliant,
            annotation: format!("CloudWatch logging enabled but {}", issues.join(", ")),
        };
    }

    Verdict {
        compliance: ComplianceType::Compliant,
        annotation: format!(
            "CloudWatch logging properly configured for Bedrock Model Invocation Logging. Log Group: {log_group_name}"
        ),
    }
}

pub fn evaluate_s3(checks: S3Checks, destination: &S3Destination, facts: &BucketFacts) -> Verdict {
    let Some(bucket_name) = enabled_target(destination.enabled, &destination.bucket_name) else {
        return Verdict {
            compliance: ComplianceType::NonCompliant,
            annotation: "S3 logging is not enabled for Bedrock Model Invocation Logging"
                .to_string(),
        };
    };

    let mut issues = Vec::new();
    if checks.check_retention && !facts.has_expiration_rule {
        issues.push("retention not set");
    }
    if checks.check_encryption && !facts.has_server_side_encryption {
        issues.push("encryption not set");
    }
    if checks.check_access_logging && !facts.access_logging_enabled {
        issues.push("server access logging not enabled");
    }
    if checks.check_object_locking && !facts.object_lock_enabled {
        issues.push("object locking not enabled");
    }
    if checks.check_versioning && !facts.versioning_enabled {
        issues.push("versioning not enabled");
    }

    if !issues.is_empty() {
        return Verdict {
            compliance: ComplianceType::NonCompliant,
            annotation: format!("S3 logging enabled but {}", issues.join(", ")),
        };
    }

    Verdict {
        compliance: ComplianceType::Compliant,
        annotation: format!(
            "S3 logging properly configured for Bedrock Model Invocation Logging. Bucket: {bucket_name}"
        ),
    }
}

fn enabled_target<'a>(enabled: bool, target: &'a Option<String>) -> Option<&'a str> {
    if !enabled {
        return None;
    }
    target.as_deref().filter(|name| !name.is_empty())
}
