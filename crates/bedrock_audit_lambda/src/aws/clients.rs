use std::collections::HashMap;
use std::sync::Mutex;
use std::time::SystemTime;

use aws_config::SdkConfig;
use aws_credential_types::Credentials;

use super::block_on;

const SESSION_NAME: &str = "bedrock-audit-orchestrator";
const CREDENTIALS_PROVIDER_NAME: &str = "bedrock-audit-assume-role";

/// Builds per-account/per-region service clients by assuming the
/// configuration role in the target account. Assumed credentials are
/// cached per account for the lifetime of one invocation.
pub struct CrossAccountClients {
    base_config: SdkConfig,
    sts: aws_sdk_sts::Client,
    configuration_role: String,
    partition: String,
    account_id: String,
    credentials: Mutex<HashMap<String, Credentials>>,
}

impl CrossAccountClients {
    pub async fn new(config: &SdkConfig, configuration_role: &str) -> Result<Self, String> {
        let sts = aws_sdk_sts::Client::new(config);
        let identity = sts
            .get_caller_identity()
            .send()
            .await
            .map_err(|error| format!("failed to resolve caller identity: {error}"))?;

        let arn = identity
            .arn()
            .ok_or("caller identity did not include an ARN")?;
        let partition = arn
            .split(':')
            .nth(1)
            .ok_or("caller identity ARN has no partition segment")?
            .to_string();
        let account_id = identity
            .account()
            .ok_or("caller identity did not include an account id")?
            .to_string();

        Ok(Self {
            base_config: config.clone(),
            sts,
            configuration_role: configuration_role.to_string(),
            partition,
            account_id,
            credentials: Mutex::new(HashMap::new()),
        })
    }

    pub fn partition(&self) -> &str {
        &self.partition
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub fn iam(&self, account_id: &str) -> Result<aws_sdk_iam::Client, String> {
        let credentials = self.credentials_for(account_id)?;
        let config = aws_sdk_iam::config::Builder::from(&self.base_config)
            .credentials_provider(credentials)
            .build();
        Ok(aws_sdk_iam::Client::from_conf(config))
    }

    pub fn lambda(&self, account_id: &str, region: &str) -> Result<aws_sdk_lambda::Client, String> {
        let credentials = self.credentials_for(account_id)?;
        let config = aws_sdk_lambda::config::Builder::from(&self.base_config)
            .credentials_provider(credentials)
            .region(aws_sdk_lambda::config::Region::new(region.to_string()))
            .build();
        Ok(aws_sdk_lambda::Client::from_conf(config))
    }

    pub fn config_service(
        &self,
        account_id: &str,
        region: &str,
    ) -> Result<aws_sdk_config::Client, String> {
        let credentials = self.credentials_for(account_id)?;
        let config = aws_sdk_config::config::Builder::from(&self.base_config)
            .credentials_provider(credentials)
            .region(aws_sdk_config::config::Region::new(region.to_string()))
            .build();
        Ok(aws_sdk_config::Client::from_conf(config))
    }

    fn credentials_for(&self, account_id: &str) -> Result<Credentials, String> {
        if let Some(cached) = self
            .credentials
            .lock()
            .map_err(|_| "credentials cache mutex poisoned")?
            .get(account_id)
        {
            return Ok(cached.clone());
        }

        let role_arn = format!(
            "arn:{}:iam::{account_id}:role/{}",
            self.partition, self.configuration_role
        );
        let assumed = block_on(async {
            self.sts
                .assume_role()
                .role_arn(&role_arn)
                .role_session_name(SESSION_NAME)
                .send()
                .await
                .map_err(|error| format!("failed to assume {role_arn}: {error}"))
        })?;

        let session = assumed
            .credentials()
            .ok_or_else(|| format!("assume-role response for {role_arn} had no credentials"))?;
        let credentials = Credentials::new(
            session.access_key_id(),
            session.secret_access_key(),
            Some(session.session_token().to_string()),
            SystemTime::try_from(*session.expiration()).ok(),
            CREDENTIALS_PROVIDER_NAME,
        );

        self.credentials
            .lock()
            .map_err(|_| "credentials cache mutex poisoned")?
            .insert(account_id.to_string(), credentials.clone());
        Ok(credentials)
    }
}
