use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use secrecy::ExposeSecret;
use tracing::{debug, warn};

use crate::error::{ErrorKind, GatewayResult};
use crate::retry::{RetryDecision, RetryError, RetryPolicy, retry_with_backoff};
use crate::secrets::base::{CredentialProvider, SecretStore, SecretStoreError, SecretValue};
use crate::types::Credentials;
use crate::{bail, gateway_error};

/// Error codes of the secret store that mean the call was throttled.
const THROTTLING_ERROR_CODES: &[&str] = &["ThrottlingException", "TooManyRequestsException"];

/// Retry schedule for secret retrieval: three attempts, sleeping 0.5s and then 1s.
pub const SECRET_RETRY_POLICY: RetryPolicy = RetryPolicy {
    max_attempts: 3,
    initial_backoff: Duration::from_millis(500),
    multiplier: 2,
};

/// Loads service-account credentials from a [`SecretStore`].
///
/// Throttled calls are retried with [`SECRET_RETRY_POLICY`]; every other store failure is
/// returned right away.
#[derive(Debug, Clone)]
pub struct SecretsManagerProvider<S> {
    store: S,
    secret_name: String,
    retry_policy: RetryPolicy,
}

impl<S> SecretsManagerProvider<S>
where
    S: SecretStore,
{
    /// Creates a provider that serves the secret named `secret_name` as credentials.
    pub fn new(store: S, secret_name: impl Into<String>) -> Self {
        Self {
            store,
            secret_name: secret_name.into(),
            retry_policy: SECRET_RETRY_POLICY,
        }
    }

    /// Replaces the retry schedule.
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// Returns the name of the secret served by [`CredentialProvider::fetch_credentials`].
    pub fn secret_name(&self) -> &str {
        &self.secret_name
    }

    /// Fetches and parses the credentials stored under `secret_name`.
    pub async fn fetch_secret(&self, secret_name: &str) -> GatewayResult<Credentials> {
        debug!(secret_name, "fetching credentials from secret store");

        let value = retry_with_backoff(&self.retry_policy, classify, |_| {
            self.store.get_secret_value(secret_name)
        })
        .await
        .map_err(|err| retrieval_error(secret_name, err))?;

        let payload = match value {
            SecretValue::Text(text) => text.expose_secret().clone(),
            SecretValue::Binary(bytes) => decode_binary(bytes.expose_secret())?,
            SecretValue::Empty => bail!(
                ErrorKind::CredentialRetrieval,
                "Secret did not contain a value",
                detail = secret_name.to_owned()
            ),
        };

        Credentials::from_json(&payload)
    }
}

impl<S> CredentialProvider for SecretsManagerProvider<S>
where
    S: SecretStore,
{
    async fn fetch_credentials(&self) -> GatewayResult<Credentials> {
        self.fetch_secret(&self.secret_name).await
    }
}

fn classify(error: &SecretStoreError) -> RetryDecision {
    match error.code() {
        Some(code) if THROTTLING_ERROR_CODES.contains(&code) => RetryDecision::Retry,
        _ => RetryDecision::Fail,
    }
}

fn retrieval_error(
    secret_name: &str,
    error: RetryError<SecretStoreError>,
) -> crate::error::GatewayError {
    match error {
        RetryError::Fatal { attempt, error } => {
            let code = error.code().unwrap_or("unknown error").to_owned();
            warn!(secret_name, attempt, code = %code, "secret retrieval failed");

            gateway_error!(
                ErrorKind::CredentialRetrieval,
                "Unable to retrieve secret",
                detail = format!("'{secret_name}': {code}"),
                source: error
            )
        }
        RetryError::Exhausted { attempts, error } => {
            warn!(secret_name, attempts, "secret retrieval still throttled after retries");

            gateway_error!(
                ErrorKind::CredentialRetrieval,
                "Failed to retrieve secret after retries",
                detail = format!("'{secret_name}'"),
                source: error
            )
        }
    }
}

/// Decodes a binary secret, which holds base64 encoded UTF-8 text.
fn decode_binary(bytes: &[u8]) -> GatewayResult<String> {
    let decoded = STANDARD.decode(bytes).map_err(|_| {
        gateway_error!(
            ErrorKind::CredentialRetrieval,
            "Secret binary is not valid base64"
        )
    })?;

    String::from_utf8(decoded).map_err(|_| {
        gateway_error!(
            ErrorKind::CredentialRetrieval,
            "Secret binary is not valid UTF-8"
        )
    })
}
