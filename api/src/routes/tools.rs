use actix_web::HttpResponse;
use actix_web::web::{Data, Json};
use serde::{Deserialize, Serialize};
use warehouse::clients::WarehouseConnector;
use warehouse::envelope::{Envelope, ErrorCode, generate_request_id};
use warehouse::operations::{self, NOT_INITIALIZED};
use warehouse::secrets::CredentialProvider;

use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct GetTableSchemaRequest {
    pub dataset_id: String,
    pub table_name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ExecuteQueryRequest {
    pub sql_query: String,
    #[serde(default)]
    pub max_rows: Option<i64>,
}

/// Answers with the envelope of the tool call. Failures are reported inside the envelope, so
/// the status is always `200`.
pub async fn get_table_schema<P, C>(
    state: Data<AppState<P, C>>,
    request: Json<GetTableSchemaRequest>,
) -> HttpResponse
where
    P: CredentialProvider + 'static,
    C: WarehouseConnector,
{
    match state.context() {
        Some(context) => HttpResponse::Ok().json(
            operations::get_table_schema(context, &request.dataset_id, &request.table_name).await,
        ),
        None => HttpResponse::Ok().json(schema_not_initialized()),
    }
}

pub async fn execute_query<P, C>(
    state: Data<AppState<P, C>>,
    request: Json<ExecuteQueryRequest>,
) -> HttpResponse
where
    P: CredentialProvider + 'static,
    C: WarehouseConnector,
{
    HttpResponse::Ok().json(
        operations::execute_query(state.context(), &request.sql_query, request.max_rows).await,
    )
}

fn schema_not_initialized() -> Envelope<()> {
    Envelope::error(
        generate_request_id(),
        ErrorCode::SchemaError,
        "Unable to load schema",
        Some(NOT_INITIALIZED.to_owned()),
    )
}
