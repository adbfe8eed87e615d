use std::sync::Arc;

use actix_web::web::Data;
use anyhow::Context;
use api::startup::Application;
use api::state::AppState;
use config::load_config;
use config::shared::GatewayConfig;
use telemetry::init_tracing;
use tracing::{error, info};
use warehouse::clients::bigquery::BigQueryConnector;
use warehouse::operations::AppContext;
use warehouse::secrets::{AwsSecretStore, SecretsManagerProvider};
use warehouse::service::{QueryService, ServiceConfig};

type GatewayState = AppState<SecretsManagerProvider<AwsSecretStore>, BigQueryConnector>;

/// Installs aws-lc-rs as the process-wide rustls provider.
///
/// Both the AWS SDK and the BigQuery client use rustls, and feature unification can enable more
/// than one provider, in which case rustls cannot pick one on its own.
fn install_crypto_provider() {
    // An error means a provider is already installed.
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
}

fn main() -> anyhow::Result<()> {
    install_crypto_provider();

    let config = load_config::<GatewayConfig>().context("loading gateway configuration")?;

    let _log_flusher = init_tracing(env!("CARGO_BIN_NAME"), config.log_level)?;

    actix_web::rt::System::new().block_on(async_main(config))
}

async fn async_main(config: GatewayConfig) -> anyhow::Result<()> {
    log_gateway_config(&config);

    let state: Data<GatewayState> = Data::new(AppState::new(config.bigquery_project.clone()));
    let application = Application::build(&config, state.clone())?;
    let server_handle = application.handle();
    info!(port = application.port(), "server listening");

    let initialization = async {
        let result = initialize(&config, &state).await;
        if let Err(err) = &result {
            error!(error = format!("{err:#}"), "gateway initialization failed, stopping server");
            server_handle.stop(true).await;
        }

        result
    };

    let (server_result, init_result) =
        tokio::join!(application.run_until_stopped(), initialization);

    if let Some(context) = state.context() {
        context.service().close().await;
    }
    info!("server stopped");

    init_result?;
    server_result?;

    Ok(())
}

/// Loads the credentials, builds the BigQuery client and installs the context into `state`.
async fn initialize(config: &GatewayConfig, state: &GatewayState) -> anyhow::Result<()> {
    let store =
        AwsSecretStore::new(&config.aws_region, config.aws_secrets_endpoint.as_deref()).await;
    let provider = SecretsManagerProvider::new(store, config.secret_name.clone());

    let service_config = ServiceConfig {
        default_project: config.bigquery_project.clone(),
        query_timeout: config.query_timeout(),
        row_chunk_size: usize::try_from(config.row_chunk_size)
            .context("ROW_CHUNK_SIZE does not fit in memory")?,
    };

    let service = QueryService::connect(provider, BigQueryConnector, service_config)
        .await
        .context("initializing the BigQuery client")?;
    let project_id = service.project_id().await;

    state.install(AppContext::new(Arc::new(service), config.default_max_rows));
    info!(project_id, "gateway ready");

    Ok(())
}

fn log_gateway_config(config: &GatewayConfig) {
    info!(
        aws_region = config.aws_region,
        secret_name = config.secret_name,
        bigquery_project = config.bigquery_project,
        log_level = %config.log_level,
        secrets_endpoint = config.aws_secrets_endpoint,
        query_timeout_seconds = config.query_timeout_seconds,
        default_max_rows = config.default_max_rows,
        row_chunk_size = config.row_chunk_size,
        "gateway configuration"
    );
}
