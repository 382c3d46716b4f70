use aws_config::SdkConfig;

use crate::adapters::buckets::BucketInspector;
use crate::adapters::log_groups::LogGroupInspector;
use crate::adapters::logging_probe::InvocationLoggingProbe;
use crate::runtime::compliance::{
    CloudWatchDestination, InvocationLoggingConfig, LogGroupFacts, S3Destination,
};

use super::block_on;

pub struct AwsInvocationLoggingProbe {
    bedrock: aws_sdk_bedrock::Client,
}

impl AwsInvocationLoggingProbe {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            bedrock: aws_sdk_bedrock::Client::new(config),
        }
    }
}

impl InvocationLoggingProbe for AwsInvocationLoggingProbe {
    fn fetch_logging_config(&self) -> Result<InvocationLoggingConfig, String> {
        block_on(async {
            let output = self
                .bedrock
                .get_model_invocation_logging_configuration()
                .send()
                .await
                .map_err(|error| {
                    format!("failed to read model invocation logging configuration: {error}")
                })?;

            // A destination counts as enabled when its config block is
            // present at all.
            let logging = output.logging_config();
            let cloudwatch = logging.and_then(|config| config.cloud_watch_config());
            let s3 = logging.and_then(|config| config.s3_config());

            Ok(InvocationLoggingConfig {
                cloudwatch: CloudWatchDestination {
                    enabled: cloudwatch.is_some(),
                    log_group_name: cloudwatch
                        .map(|config| config.log_group_name().to_string())
                        .filter(|name| !name.is_empty()),
                },
                s3: S3Destination {
                    enabled: s3.is_some(),
                    bucket_name: s3
                        .map(|config| config.bucket_name().to_string())
                        .filter(|name| !name.is_empty()),
                },
            })
        })
    }
}

pub struct AwsLogGroupInspector {
    logs: aws_sdk_cloudwatchlogs::Client,
}

impl AwsLogGroupInspector {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            logs: aws_sdk_cloudwatchlogs::Client::new(config),
        }
    }
}

impl LogGroupInspector for AwsLogGroupInspector {
    fn log_group_facts(&self, name_prefix: &str) -> Result<Option<LogGroupFacts>, String> {
        block_on(async {
            let output = self
                .logs
                .describe_log_groups()
                .log_group_name_prefix(name_prefix)
                .send()
                .await
                .map_err(|error| format!("failed to describe log groups: {error}"))?;

            Ok(output.log_groups().first().map(|group| LogGroupFacts {
                retention_days: group.retention_in_days(),
                kms_key_id: group.kms_key_id().map(str::to_string),
            }))
        })
    }
}

pub struct AwsBucketInspector {
    s3: aws_sdk_s3::Client,
}

impl AwsBucketInspector {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            s3: aws_sdk_s3::Client::new(config),
        }
    }

    /// Buckets with no configuration of the requested kind surface as
    /// not-found service errors; those read as `false`, not failures.
    fn unconfigured_as_false(
        result: Result<bool, String>,
        not_found_marker: &str,
    ) -> Result<bool, String> {
        match result {
            Err(error) if error.contains(not_found_marker) => Ok(false),
            other => other,
        }
    }
}

impl BucketInspector for AwsBucketInspector {
    fn has_expiration_rule(&self, bucket: &str) -> Result<bool, String> {
        let result = block_on(async {
            self.s3
                .get_bucket_lifecycle_configuration()
                .bucket(bucket)
                .send()
                .await
                .map(|output| {
                    output
                        .rules()
                        .iter()
                        .any(|rule| rule.expiration().is_some())
                })
                .map_err(|error| format!("failed to read bucket lifecycle: {error}"))
        });
        Self::unconfigured_as_false(result, "NoSuchLifecycleConfiguration")
    }

    fn has_server_side_encryption(&self, bucket: &str) -> Result<bool, String> {
        let result = block_on(async {
            self.s3
                .get_bucket_encryption()
                .bucket(bucket)
                .send()
                .await
                .map(|output| output.server_side_encryption_configuration().is_some())
                .map_err(|error| format!("failed to read bucket encryption: {error}"))
        });
        Self::unconfigured_as_false(result, "ServerSideEncryptionConfigurationNotFound")
    }

    fn has_access_logging(&self, bucket: &str) -> Result<bool, String> {
        block_on(async {
            self.s3
                .get_bucket_logging()
                .bucket(bucket)
                .send()
                .await
                .map(|output| output.logging_enabled().is_some())
                .map_err(|error| format!("failed to read bucket access logging: {error}"))
        })
    }

    fn has_object_lock(&self, bucket: &str) -> Result<bool, String> {
        let result = block_on(async {
            self.s3
                .get_object_lock_configuration()
                .bucket(bucket)
                .send()
                .await
                .map(|output| output.object_lock_configuration().is_some())
                .map_err(|error| format!("failed to read object lock configuration: {error}"))
        });
        Self::unconfigured_as_false(result, "ObjectLockConfigurationNotFound")
    }

    fn has_versioning_enabled(&self, bucket: &str) -> Result<bool, String> {
        block_on(async {
            self.s3
                .get_bucket_versioning()
                .bucket(bucket)
                .send()
                .await
                .map(|output| {
                    matches!(
                        output.status(),
                        Some(aws_sdk_s3::types::BucketVersioningStatus::Enabled)
                    )
                })
                .map_err(|error| format!("failed to read bucket versioning: {error}"))
        })
    }
}
