use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use telemetry::init_test_tracing;
use tokio::time::Instant;
use warehouse::error::ErrorKind;
use warehouse::secrets::{CredentialProvider, SecretsManagerProvider};
use warehouse::test_utils::secrets::{FakeSecretStore, service_account_json};

const SECRET_NAME: &str = "bigquery/service-account";

#[tokio::test(start_paused = true)]
async fn throttled_twice_then_succeeds_after_backing_off() {
    init_test_tracing();

    let store = FakeSecretStore::new();
    store
        .push_error("ThrottlingException", "Rate exceeded")
        .push_error("TooManyRequestsException", "Rate exceeded")
        .push_text(service_account_json(Some("analytics")));
    let provider = SecretsManagerProvider::new(store.clone(), SECRET_NAME);

    let started = Instant::now();
    let credentials = provider.fetch_credentials().await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(credentials.project_id(), Some("analytics"));
    assert_eq!(store.calls(), 3);
    assert_eq!(store.requested(), vec![SECRET_NAME; 3]);
    assert!(
        elapsed >= Duration::from_millis(1500) && elapsed < Duration::from_millis(1600),
        "unexpected backoff of {elapsed:?}"
    );
}

#[tokio::test(start_paused = true)]
async fn gives_up_after_three_throttled_attempts() {
    init_test_tracing();

    let store = FakeSecretStore::new();
    for _ in 0..3 {
        store.push_error("ThrottlingException", "Rate exceeded");
    }
    store.push_text(service_account_json(Some("analytics")));
    let provider = SecretsManagerProvider::new(store.clone(), SECRET_NAME);

    let err = provider.fetch_credentials().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::CredentialRetrieval);
    assert_eq!(err.description(), "Failed to retrieve secret after retries");
    assert_eq!(store.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn other_store_errors_fail_without_retrying() {
    init_test_tracing();

    let store = FakeSecretStore::new();
    store
        .push_error("AccessDeniedException", "User is not authorized")
        .push_text(service_account_json(Some("analytics")));
    let provider = SecretsManagerProvider::new(store.clone(), SECRET_NAME);

    let started = Instant::now();
    let err = provider.fetch_credentials().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::CredentialRetrieval);
    assert_eq!(
        err.to_string(),
        format!("Unable to retrieve secret: '{SECRET_NAME}': AccessDeniedException")
    );
    assert_eq!(store.calls(), 1);
    assert_eq!(started.elapsed(), Duration::ZERO);
}

#[tokio::test]
async fn decodes_binary_secrets() {
    let store = FakeSecretStore::new();
    store.push_binary(STANDARD.encode(service_account_json(Some("binary-project"))));
    let provider = SecretsManagerProvider::new(store, SECRET_NAME);

    let credentials = provider.fetch_credentials().await.unwrap();

    assert_eq!(credentials.project_id(), Some("binary-project"));
}

#[tokio::test]
async fn rejects_binary_secrets_that_are_not_base64() {
    let store = FakeSecretStore::new();
    store.push_binary(b"{not base64}".to_vec());
    let provider = SecretsManagerProvider::new(store, SECRET_NAME);

    let err = provider.fetch_credentials().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::CredentialRetrieval);
    assert_eq!(err.to_string(), "Secret binary is not valid base64");
}

#[tokio::test]
async fn rejects_empty_secrets() {
    let store = FakeSecretStore::new();
    store.push_empty();
    let provider = SecretsManagerProvider::new(store, SECRET_NAME);

    let err = provider.fetch_credentials().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::CredentialRetrieval);
    assert_eq!(err.description(), "Secret did not contain a value");
}

#[tokio::test]
async fn rejects_payloads_that_are_not_json_objects_without_leaking_them() {
    let store = FakeSecretStore::new();
    store.push_text(r#"["super-secret-key"]"#);
    let provider = SecretsManagerProvider::new(store, SECRET_NAME);

    let err = provider.fetch_credentials().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::CredentialRetrieval);
    assert_eq!(
        err.to_string(),
        "Expected JSON object for service-account secret"
    );
    assert!(!format!("{err:?}").contains("super-secret-key"));
}
