//! The tool operations: SQL validation, service calls and envelope construction.

use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::clients::WarehouseConnector;
use crate::envelope::{Envelope, ErrorCode, generate_request_id};
use crate::error::ErrorKind;
use crate::secrets::CredentialProvider;
use crate::service::QueryService;
use crate::types::{QueryResult, SchemaField};
use crate::validation::validate_sql;

/// Everything an operation needs, constructed once at startup and passed to each call.
pub struct AppContext<P, C>
where
    C: WarehouseConnector,
{
    service: Arc<QueryService<P, C>>,
    default_max_rows: u64,
}

impl<P, C> AppContext<P, C>
where
    P: CredentialProvider,
    C: WarehouseConnector,
{
    pub fn new(service: Arc<QueryService<P, C>>, default_max_rows: u64) -> Self {
        Self {
            service,
            default_max_rows,
        }
    }

    pub fn service(&self) -> &Arc<QueryService<P, C>> {
        &self.service
    }

    pub fn default_max_rows(&self) -> u64 {
        self.default_max_rows
    }
}

/// Data of a successful schema lookup.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableSchemaResponse {
    pub schema: Vec<SchemaField>,
    pub dataset_id: String,
    pub table_name: String,
}

/// Data of a successful query, the query result followed by the executed SQL and row limit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecuteQueryResponse {
    #[serde(flatten)]
    pub result: QueryResult,
    pub sql: String,
    pub max_rows: u64,
}

/// Looks up the schema of `dataset_id.table_name`.
pub async fn get_table_schema<P, C>(
    ctx: &AppContext<P, C>,
    dataset_id: &str,
    table_name: &str,
) -> Envelope<TableSchemaResponse>
where
    P: CredentialProvider,
    C: WarehouseConnector,
{
    let request_id = generate_request_id();
    info!(%request_id, dataset_id, table_name, "get_table_schema invoked");

    match ctx.service.get_table_schema(dataset_id, table_name).await {
        Ok(schema) => Envelope::success(
            request_id,
            TableSchemaResponse {
                schema,
                dataset_id: dataset_id.to_owned(),
                table_name: table_name.to_owned(),
            },
        ),
        Err(err) if err.kind() == ErrorKind::TableNotFound => {
            warn!(%request_id, error = %err, "table not found");
            Envelope::error(request_id, ErrorCode::TableNotFound, err.to_string(), None)
        }
        Err(err) => {
            error!(%request_id, error = %err, "failed to fetch table schema");
            Envelope::error(
                request_id,
                ErrorCode::SchemaError,
                "Unable to load schema",
                Some(err.to_string()),
            )
        }
    }
}

/// Detail reported by tool calls received before the service was initialized.
pub const NOT_INITIALIZED: &str = "service has not been initialized";

/// Validates and runs `sql_query`, returning at most `max_rows` rows.
///
/// The SQL and `max_rows` are checked before `ctx` is consulted, so an invalid request is
/// reported as `INVALID_SQL` even while the service is still starting and `ctx` is [`None`].
/// `max_rows` defaults to the context's limit and is clamped to it.
pub async fn execute_query<P, C>(
    ctx: Option<&AppContext<P, C>>,
    sql_query: &str,
    max_rows: Option<i64>,
) -> Envelope<ExecuteQueryResponse>
where
    P: CredentialProvider,
    C: WarehouseConnector,
{
    let request_id = generate_request_id();
    info!(%request_id, max_rows, "execute_query invoked");

    let sql = match validate_sql(sql_query) {
        Ok(sql) => sql,
        Err(err) => {
            warn!(%request_id, error = %err, "rejected sql");
            return Envelope::error(request_id, ErrorCode::InvalidSql, err.to_string(), None);
        }
    };

    let Some(requested) = positive_max_rows(max_rows) else {
        return Envelope::error(
            request_id,
            ErrorCode::InvalidSql,
            "max_rows must be greater than zero",
            None,
        );
    };

    let Some(ctx) = ctx else {
        warn!(%request_id, "query received before initialization");
        return Envelope::error(
            request_id,
            ErrorCode::QueryFailure,
            "BigQuery query failed",
            Some(NOT_INITIALIZED.to_owned()),
        );
    };

    let limit = clamp_max_rows(requested, ctx.default_max_rows);
    if requested.is_some_and(|requested| requested > limit) {
        warn!(
            %request_id,
            requested = max_rows,
            max_allowed = limit,
            "requested max_rows exceeds server limit, clamping"
        );
    }

    let row_limit = usize::try_from(limit).unwrap_or(usize::MAX);
    match ctx.service.execute_query(&sql, row_limit).await {
        Ok(result) => {
            info!(
                %request_id,
                row_count = result.row_count,
                duration_ms = result.duration_ms,
                chunks = result.chunks.len(),
                "query completed"
            );

            Envelope::success(
                request_id,
                ExecuteQueryResponse {
                    result,
                    sql,
                    max_rows: limit,
                },
            )
        }
        Err(err) => {
            error!(%request_id, error = %err, "query execution failed");
            Envelope::error(
                request_id,
                ErrorCode::QueryFailure,
                "BigQuery query failed",
                Some(err.to_string()),
            )
        }
    }
}

/// Returns the requested row limit, `Some(None)` when absent, or [`None`] when not positive.
fn positive_max_rows(requested: Option<i64>) -> Option<Option<u64>> {
    match requested {
        None => Some(None),
        Some(requested) => u64::try_from(requested)
            .ok()
            .filter(|requested| *requested > 0)
            .map(Some),
    }
}

fn clamp_max_rows(requested: Option<u64>, default_max_rows: u64) -> u64 {
    requested.map_or(default_max_rows, |requested| requested.min(default_max_rows))
}
