use aws_config::SdkConfig;

use crate::adapters::parameters::{AccountDirectory, ParameterDirectory};

use super::{absent_on, block_on};

pub struct AwsParameterDirectory {
    ssm: aws_sdk_ssm::Client,
}

impl AwsParameterDirectory {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            ssm: aws_sdk_ssm::Client::new(config),
        }
    }

    fn raw_parameter(&self, name: &str) -> Result<Option<String>, String> {
        let result = block_on(async {
            self.ssm
                .get_parameter()
                .name(name)
                .send()
                .await
                .map_err(|error| format!("failed to read SSM parameter '{name}': {error}"))
        });
        let output = match absent_on(result, "ParameterNotFound")? {
            Some(output) => output,
            None => return Ok(None),
        };
        Ok(output
            .parameter()
            .and_then(|parameter| parameter.value())
            .map(str::to_string))
    }
}

impl ParameterDirectory for AwsParameterDirectory {
    fn string_parameter(&self, name: &str) -> Result<Option<String>, String> {
        self.raw_parameter(name)
    }

    fn string_list_parameter(&self, name: &str) -> Result<Option<Vec<String>>, String> {
        Ok(self.raw_parameter(name)?.map(|value| {
            value
                .split(',')
                .map(str::trim)
                .filter(|entry| !entry.is_empty())
                .map(str::to_string)
                .collect()
        }))
    }
}

pub struct AwsAccountDirectory {
    organizations: aws_sdk_organizations::Client,
}

impl AwsAccountDirectory {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            organizations: aws_sdk_organizations::Client::new(config),
        }
    }
}

impl AccountDirectory for AwsAccountDirectory {
    fn organization_accounts(&self) -> Result<Vec<String>, String> {
        block_on(async {
            let mut accounts = Vec::new();
            let mut next_token: Option<String> = None;
            loop {
                let output = self
                    .organizations
                    .list_accounts()
                    .set_next_token(next_token.clone())
                    .send()
                    .await
                    .map_err(|error| format!("failed to list organization accounts: {error}"))?;

                for account in output.accounts() {
                    let active = matches!(
                        account.status(),
                        Some(aws_sdk_organizations::types::AccountStatus::Active)
                    );
                    if let (true, Some(id)) = (active, account.id()) {
                        accounts.push(id.to_string());
                    }
                }

                next_token = output.next_token().map(str::to_string);
                if next_token.is_none() {
                    break;
                }
            }
            Ok(accounts)
        })
    }
}
