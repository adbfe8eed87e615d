use actix_web::HttpResponse;
use actix_web::web::Data;
use serde::{Deserialize, Serialize};
use warehouse::clients::WarehouseConnector;
use warehouse::secrets::CredentialProvider;

use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_seconds: f64,
    pub bigquery_ready: bool,
    pub project: Option<String>,
}

/// Readiness probe: `200` once the BigQuery client is initialized, `503` before that.
pub async fn health_check<P, C>(state: Data<AppState<P, C>>) -> HttpResponse
where
    P: CredentialProvider + 'static,
    C: WarehouseConnector,
{
    let (ready, client_project) = match state.context() {
        Some(context) => (
            context.service().is_initialized().await,
            context.service().project_id().await,
        ),
        None => (false, None),
    };

    let body = HealthResponse {
        status: if ready { "ok" } else { "starting" }.to_owned(),
        uptime_seconds: (state.uptime().as_secs_f64() * 100.0).round() / 100.0,
        bigquery_ready: ready,
        project: client_project.or_else(|| state.configured_project().map(str::to_owned)),
    };

    if ready {
        HttpResponse::Ok().json(body)
    } else {
        HttpResponse::ServiceUnavailable().json(body)
    }
}
