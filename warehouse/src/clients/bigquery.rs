use std::collections::VecDeque;
use std::time::Duration;

use gcp_bigquery_client::Client;
use gcp_bigquery_client::client_builder::ClientBuilder;
use gcp_bigquery_client::error::BQError;
use gcp_bigquery_client::model::get_query_results_parameters::GetQueryResultsParameters;
use gcp_bigquery_client::model::query_request::QueryRequest;
use gcp_bigquery_client::yup_oauth2::parse_service_account_key;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::clients::base::{
    QueryOptions, QueryRows, WarehouseConnector, WarehouseError, WarehouseHandle,
};
use crate::clients::encoding::decode_row;
use crate::types::{Credentials, QueryJob, Row, SchemaField, TableReference};

/// Status used for failures to obtain an access token.
const STATUS_UNAUTHORIZED: u16 = 401;

/// Converts a [`BQError`] into a [`WarehouseError`], keeping the HTTP status when there is one.
///
/// Token failures never reach the API, so they are reported as `401` to let callers treat them
/// like rejected credentials.
impl From<BQError> for WarehouseError {
    fn from(err: BQError) -> WarehouseError {
        match &err {
            BQError::ResponseError { error } => match u16::try_from(error.error.code) {
                Ok(status) => WarehouseError::with_status(status, error.error.message.clone()),
                Err(_) => WarehouseError::new(error.error.message.clone()),
            },
            BQError::AuthError(_) | BQError::YupAuthError(_) | BQError::NoToken => {
                WarehouseError::with_status(STATUS_UNAUTHORIZED, err.to_string())
            }
            _ => WarehouseError::new(err.to_string()),
        }
    }
}

/// Builds [`BigQueryHandle`]s from service-account credentials.
#[derive(Debug, Clone, Copy, Default)]
pub struct BigQueryConnector;

impl WarehouseConnector for BigQueryConnector {
    type Handle = BigQueryHandle;

    async fn connect(
        &self,
        credentials: &Credentials,
        project_id: &str,
    ) -> Result<BigQueryHandle, WarehouseError> {
        // The parser error can quote the offending input, so it is not forwarded.
        let sa_key = parse_service_account_key(credentials.expose_json()).map_err(|_| {
            WarehouseError::new("credentials are not a valid service-account key")
        })?;

        let client = ClientBuilder::new()
            .build_from_service_account_key(sa_key, false)
            .await?;

        info!(project_id, "bigquery client created");

        Ok(BigQueryHandle {
            client,
            project_id: project_id.to_owned(),
        })
    }
}

/// Authenticated BigQuery session billing queries to one project.
#[derive(Clone)]
pub struct BigQueryHandle {
    client: Client,
    project_id: String,
}

impl BigQueryHandle {
    /// Submits the query and polls until the job completes.
    ///
    /// The caller bounds the total time spent here.
    async fn run_query(
        &self,
        sql: &str,
        options: &QueryOptions,
        deadline: Instant,
    ) -> Result<BigQueryRows, WarehouseError> {
        let page_size = i32::try_from(options.page_size).unwrap_or(i32::MAX);

        let mut request = QueryRequest::new(sql.to_owned());
        request.timeout_ms = Some(millis(options.timeout));
        request.max_results = Some(page_size);

        let response = self.client.job().query(&self.project_id, request).await?;
        let mut page: QueryPage = from_model(&response)?;

        let job_reference = page
            .job_reference
            .take()
            .ok_or_else(|| WarehouseError::new("query response is missing its job reference"))?;

        while !page.job_complete.unwrap_or(false) {
            let remaining = deadline.saturating_duration_since(Instant::now());
            debug!(job_id = %job_reference.job_id, remaining_ms = remaining.as_millis() as u64, "waiting for query job");

            let parameters = GetQueryResultsParameters {
                location: job_reference.location.clone(),
                max_results: Some(page_size),
                timeout_ms: Some(millis(remaining)),
                ..Default::default()
            };
            let response = self
                .client
                .job()
                .get_query_results(&self.project_id, &job_reference.job_id, parameters)
                .await?;
            page = from_model(&response)?;
        }

        let job = self
            .client
            .job()
            .get_job(
                &self.project_id,
                &job_reference.job_id,
                job_reference.location.as_deref(),
            )
            .await?;
        let statistics = from_model::<_, JobResource>(&job)?
            .statistics
            .unwrap_or_default();
        let query_statistics = statistics.query.unwrap_or_default();

        let job = QueryJob {
            job_id: job_reference.job_id,
            statement_type: query_statistics.statement_type,
            cache_hit: page.cache_hit.or(query_statistics.cache_hit),
            bytes_processed: page
                .total_bytes_processed
                .or(query_statistics.total_bytes_processed),
            slot_millis: statistics.total_slot_ms,
            total_rows: page.total_rows,
        };

        debug!(
            job_id = %job.job_id,
            total_rows = job.total_rows,
            first_page_rows = page.rows.as_ref().map_or(0, Vec::len),
            "query job completed"
        );

        Ok(BigQueryRows {
            client: self.client.clone(),
            project_id: self.project_id.clone(),
            location: job_reference.location,
            page_size,
            fields: page.schema.map(|schema| schema.fields).unwrap_or_default(),
            buffer: page.rows.unwrap_or_default().into(),
            page_token: page.page_token,
            job,
        })
    }
}

impl WarehouseHandle for BigQueryHandle {
    type Rows = BigQueryRows;

    fn project_id(&self) -> &str {
        &self.project_id
    }

    async fn get_table_schema(
        &self,
        table: &TableReference,
    ) -> Result<Vec<SchemaField>, WarehouseError> {
        let resource = self
            .client
            .table()
            .get(&table.project_id, &table.dataset_id, &table.table_id, None)
            .await?;

        let resource: TableResource = from_model(&resource)?;

        Ok(resource
            .schema
            .map(|schema| schema.fields)
            .unwrap_or_default())
    }

    async fn submit_query(
        &self,
        sql: &str,
        options: &QueryOptions,
    ) -> Result<BigQueryRows, WarehouseError> {
        let deadline = Instant::now() + options.timeout;

        match tokio::time::timeout(options.timeout, self.run_query(sql, options, deadline)).await
        {
            Ok(result) => result,
            Err(_) => Err(WarehouseError::new(format!(
                "query did not complete within {} seconds",
                options.timeout.as_secs()
            ))),
        }
    }

    async fn close(&self) {
        // Connections are pooled by the HTTP client and released with the last clone.
        debug!(project_id = %self.project_id, "bigquery client closed");
    }
}

/// Rows of a completed BigQuery job, fetched one page at a time.
pub struct BigQueryRows {
    client: Client,
    project_id: String,
    location: Option<String>,
    page_size: i32,
    fields: Vec<SchemaField>,
    buffer: VecDeque<Value>,
    page_token: Option<String>,
    job: QueryJob,
}

impl QueryRows for BigQueryRows {
    fn job(&self) -> &QueryJob {
        &self.job
    }

    async fn next_row(&mut self) -> Result<Option<Row>, WarehouseError> {
        loop {
            if let Some(row) = self.buffer.pop_front() {
                return decode_row(&self.fields, &row).map(Some);
            }

            let Some(page_token) = self.page_token.take() else {
                return Ok(None);
            };

            let parameters = GetQueryResultsParameters {
                location: self.location.clone(),
                max_results: Some(self.page_size),
                page_token: Some(page_token),
                ..Default::default()
            };
            let response = self
                .client
                .job()
                .get_query_results(&self.project_id, &self.job.job_id, parameters)
                .await?;

            let page: QueryPage = from_model(&response)?;
            self.page_token = page.page_token;
            self.buffer.extend(page.rows.unwrap_or_default());
        }
    }
}

/// Reads a client library model through its REST representation.
///
/// The models serialize back to the JSON the API returned, which lets the fields below be read
/// with the leniency the API needs (int64 values arrive as strings, most fields are optional).
fn from_model<M, T>(model: &M) -> Result<T, WarehouseError>
where
    M: Serialize,
    T: DeserializeOwned,
{
    serde_json::to_value(model)
        .and_then(serde_json::from_value)
        .map_err(|err| WarehouseError::new(format!("unexpected BigQuery response: {err}")))
}

fn millis(duration: Duration) -> i32 {
    i32::try_from(duration.as_millis()).unwrap_or(i32::MAX)
}

/// Accepts int64 values encoded either as JSON strings or numbers.
fn int64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(value)) => value.parse().ok(),
        Some(Value::Number(value)) => value.as_u64(),
        _ => None,
    })
}

/// Fields shared by `jobs.query` and `jobs.getQueryResults` responses.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryPage {
    #[serde(default)]
    job_reference: Option<JobReference>,
    #[serde(default)]
    job_complete: Option<bool>,
    #[serde(default)]
    schema: Option<TableSchema>,
    #[serde(default)]
    rows: Option<Vec<Value>>,
    #[serde(default)]
    page_token: Option<String>,
    #[serde(default, deserialize_with = "int64")]
    total_rows: Option<u64>,
    #[serde(default)]
    cache_hit: Option<bool>,
    #[serde(default, deserialize_with = "int64")]
    total_bytes_processed: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    job_id: String,
    #[serde(default)]
    location: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TableSchema {
    #[serde(default, deserialize_with = "fields_or_empty")]
    fields: Vec<SchemaField>,
}

fn fields_or_empty<'de, D>(deserializer: D) -> Result<Vec<SchemaField>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<SchemaField>>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Default, Deserialize)]
struct TableResource {
    #[serde(default)]
    schema: Option<TableSchema>,
}

#[derive(Debug, Default, Deserialize)]
struct JobResource {
    #[serde(default)]
    statistics: Option<JobStatistics>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobStatistics {
    #[serde(default, deserialize_with = "int64")]
    total_slot_ms: Option<u64>,
    #[serde(default)]
    query: Option<QueryStatistics>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryStatistics {
    #[serde(default)]
    statement_type: Option<String>,
    #[serde(default)]
    cache_hit: Option<bool>,
    #[serde(default, deserialize_with = "int64")]
    total_bytes_processed: Option<u64>,
}
