use aws_config::retry::RetryConfig;
use aws_config::{BehaviorVersion, ConfigLoader, Region};
use aws_sdk_secretsmanager::Client;
use aws_sdk_secretsmanager::error::ProvideErrorMetadata;
use secrecy::{SecretString, SecretVec};
use tracing::info;

use crate::secrets::base::{SecretStore, SecretStoreError, SecretValue};

/// [`SecretStore`] backed by AWS Secrets Manager.
#[derive(Debug, Clone)]
pub struct AwsSecretStore {
    client: Client,
}

impl AwsSecretStore {
    /// Creates a store for `region`.
    ///
    /// Credentials come from the default AWS provider chain. `endpoint_url` points the client at
    /// a different endpoint, such as a local emulator.
    pub async fn new(region: &str, endpoint_url: Option<&str>) -> AwsSecretStore {
        let sdk_config = config_loader(region, endpoint_url).load().await;

        AwsSecretStore {
            client: Client::new(&sdk_config),
        }
    }
}

/// SDK retries are disabled, throttling is retried by the provider's own policy.
fn config_loader(region: &str, endpoint_url: Option<&str>) -> ConfigLoader {
    let mut loader = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(region.to_owned()))
        .retry_config(RetryConfig::disabled());
    if let Some(endpoint_url) = endpoint_url {
        info!(endpoint_url, "using secret store endpoint override");
        loader = loader.endpoint_url(endpoint_url);
    }

    loader
}

impl SecretStore for AwsSecretStore {
    async fn get_secret_value(&self, secret_name: &str) -> Result<SecretValue, SecretStoreError> {
        let output = self
            .client
            .get_secret_value()
            .secret_id(secret_name)
            .send()
            .await
            .map_err(|err| {
                let code = err.code().map(str::to_owned);
                let message = err
                    .message()
                    .map(str::to_owned)
                    .unwrap_or_else(|| err.to_string());
                SecretStoreError::new(code, message)
            })?;

        if let Some(text) = output.secret_string() {
            return Ok(SecretValue::Text(SecretString::new(text.to_owned())));
        }

        if let Some(binary) = output.secret_binary() {
            return Ok(SecretValue::Binary(SecretVec::new(binary.as_ref().to_vec())));
        }

        Ok(SecretValue::Empty)
    }
}
