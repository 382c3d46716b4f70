use aws_config::SdkConfig;
use aws_smithy_types::date_time::Format;
use aws_smithy_types::DateTime;

use crate::adapters::evaluations::EvaluationSink;
use crate::runtime::contract::{Evaluation, EVALUATION_RESOURCE_TYPE};

use super::block_on;

pub struct AwsEvaluationSink {
    config: aws_sdk_config::Client,
}

impl AwsEvaluationSink {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            config: aws_sdk_config::Client::new(config),
        }
    }
}

impl EvaluationSink for AwsEvaluationSink {
    fn put_evaluation(&self, result_token: &str, evaluation: &Evaluation) -> Result<(), String> {
        block_on(async {
            let ordering_timestamp =
                DateTime::from_str(&evaluation.ordering_timestamp, Format::DateTimeWithOffset)
                    .map_err(|error| {
                        format!(
                            "invalid ordering timestamp '{}': {error}",
                            evaluation.ordering_timestamp
                        )
                    })?;

            let entry = aws_sdk_config::types::Evaluation::builder()
                .compliance_resource_type(EVALUATION_RESOURCE_TYPE)
                .compliance_resource_id(&evaluation.resource_id)
                .compliance_type(aws_sdk_config::types::ComplianceType::from(
                    evaluation.compliance.as_str(),
                ))
                .annotation(&evaluation.annotation)
                .ordering_timestamp(ordering_timestamp)
                .build()
                .map_err(|error| format!("failed to build evaluation: {error}"))?;

            self.config
                .put_evaluations()
                .evaluations(entry)
                .result_token(result_token)
                .send()
                .await
                .map(|_| ())
                .map_err(|error| format!("failed to put evaluations: {error}"))
        })
    }
}
