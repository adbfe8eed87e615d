//! Credential retrieval from the secret store.

mod aws;
mod base;
mod provider;

pub use aws::AwsSecretStore;
pub use base::{CredentialProvider, SecretStore, SecretStoreError, SecretValue};
pub use provider::{SECRET_RETRY_POLICY, SecretsManagerProvider};
