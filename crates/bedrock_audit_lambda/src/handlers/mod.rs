pub mod cloudwatch_rule;
pub mod orchestrator;
pub mod s3_rule;

use serde::{Deserialize, Serialize};

use crate::runtime::compliance::Verdict;
use crate::runtime::contract::{ComplianceType, Evaluation, RuleInvocation};

/// What a rule lambda returns to the runtime after submitting its
/// evaluation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuleResponse {
    pub compliance: ComplianceType,
    pub annotation: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleHandlerError {
    pub message: String,
}

pub(crate) fn evaluation_for(invocation: &RuleInvocation, verdict: &Verdict) -> Evaluation {
    Evaluation {
        compliance: verdict.compliance,
        annotation: verdict.annotation.clone(),
        resource_id: invocation.account_id.clone(),
        ordering_timestamp: invocation.notification_creation_time.clone(),
    }
}
