use std::future::Future;

use secrecy::{SecretString, SecretVec};
use thiserror::Error;

use crate::error::GatewayResult;
use crate::types::Credentials;

/// Value stored under a secret name.
pub enum SecretValue {
    /// The secret was stored as a string.
    Text(SecretString),
    /// The secret was stored as binary data, holding base64 encoded JSON.
    Binary(SecretVec<u8>),
    /// The secret exists but carries neither a string nor a binary value.
    Empty,
}

/// Failure reported by a [`SecretStore`].
///
/// Carries the remote error code, when there is one, and a message that never contains the
/// secret value.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct SecretStoreError {
    code: Option<String>,
    message: String,
}

impl SecretStoreError {
    pub fn new(code: Option<String>, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Returns the error code reported by the store, e.g. `ThrottlingException`.
    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }
}

/// Remote key/value store holding secrets by name.
pub trait SecretStore: Send + Sync {
    /// Returns the current value of the secret named `secret_name`.
    fn get_secret_value(
        &self,
        secret_name: &str,
    ) -> impl Future<Output = Result<SecretValue, SecretStoreError>> + Send;
}

/// Source of fresh warehouse credentials.
///
/// The query service calls this on start and whenever it rebuilds its client, without knowing
/// where the credentials live.
pub trait CredentialProvider: Send + Sync {
    fn fetch_credentials(&self) -> impl Future<Output = GatewayResult<Credentials>> + Send;
}
