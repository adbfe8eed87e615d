//! Query and schema service owning the warehouse client lifecycle.

use std::mem;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::bail;
use crate::clients::{QueryOptions, QueryRows, WarehouseConnector, WarehouseError, WarehouseHandle};
use crate::error::{ErrorKind, GatewayResult};
use crate::gateway_error;
use crate::secrets::CredentialProvider;
use crate::types::{Credentials, QueryResult, RowChunk, SchemaField, TableReference};

/// Settings of a [`QueryService`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Project used when the credentials do not name one, and for unqualified datasets.
    pub default_project: Option<String>,
    /// Upper bound on the time a query may take to complete.
    pub query_timeout: Duration,
    /// Number of rows per result chunk, also used as the page size of result fetches.
    pub row_chunk_size: usize,
}

struct ServiceState<H> {
    handle: Option<Arc<H>>,
    credentials: Option<Credentials>,
}

/// Runs schema lookups and queries through a single shared warehouse handle.
///
/// The handle is guarded by a lock held only to read, swap or close it. Calls through the handle
/// run outside the lock, so queries proceed concurrently and a refresh only waits for the swap.
/// A query that started before a refresh finishes on the handle it started with.
pub struct QueryService<P, C>
where
    C: WarehouseConnector,
{
    provider: P,
    connector: C,
    config: ServiceConfig,
    state: Mutex<ServiceState<C::Handle>>,
}

impl<P, C> QueryService<P, C>
where
    P: CredentialProvider,
    C: WarehouseConnector,
{
    /// Creates a service without a client. Use [`QueryService::refresh`] to initialize it.
    pub fn new(provider: P, connector: C, config: ServiceConfig) -> Self {
        Self {
            provider,
            connector,
            config,
            state: Mutex::new(ServiceState {
                handle: None,
                credentials: None,
            }),
        }
    }

    /// Creates a service and initializes its client.
    pub async fn connect(provider: P, connector: C, config: ServiceConfig) -> GatewayResult<Self> {
        let service = Self::new(provider, connector, config);
        service.refresh().await?;

        Ok(service)
    }

    /// Loads fresh credentials and replaces the client with one built from them.
    ///
    /// The previous client, if any, is closed once the new one is installed.
    pub async fn refresh(&self) -> GatewayResult<()> {
        let credentials = self.provider.fetch_credentials().await.map_err(|err| {
            gateway_error!(
                ErrorKind::CredentialRefresh,
                "Unable to load credentials from secret",
                err.to_string(),
                source: err
            )
        })?;

        let Some(project_id) = self
            .config
            .default_project
            .clone()
            .or_else(|| credentials.project_id().map(str::to_owned))
        else {
            bail!(
                ErrorKind::Configuration,
                "BIGQUERY_PROJECT is required when the secret is missing project_id"
            );
        };

        let handle = self
            .connector
            .connect(&credentials, &project_id)
            .await
            .map_err(|err| {
                gateway_error!(
                    ErrorKind::CredentialRefresh,
                    "Unable to create BigQuery client",
                    err.message().to_owned(),
                    source: err
                )
            })?;

        let mut state = self.state.lock().await;
        if let Some(previous) = state.handle.take() {
            previous.close().await;
        }
        state.handle = Some(Arc::new(handle));
        state.credentials = Some(credentials);

        info!(project_id, "bigquery client initialized");

        Ok(())
    }

    /// Closes and drops the client. Calling it again has no effect.
    pub async fn close(&self) {
        let mut state = self.state.lock().await;
        if let Some(handle) = state.handle.take() {
            handle.close().await;
            info!("bigquery client closed");
        }
        state.credentials = None;
    }

    /// Returns `true` while a client is installed.
    pub async fn is_initialized(&self) -> bool {
        self.state.lock().await.handle.is_some()
    }

    /// Returns the project of the installed client.
    pub async fn project_id(&self) -> Option<String> {
        self.state
            .lock()
            .await
            .handle
            .as_ref()
            .map(|handle| handle.project_id().to_owned())
    }

    async fn require_handle(&self) -> GatewayResult<Arc<C::Handle>> {
        match self.state.lock().await.handle.as_ref() {
            Some(handle) => Ok(Arc::clone(handle)),
            None => bail!(
                ErrorKind::QueryExecution,
                "BigQuery client is not initialized"
            ),
        }
    }

    /// Returns the columns of `dataset_id.table_name`.
    ///
    /// `dataset_id` may be qualified with a project; otherwise the client's project is used.
    pub async fn get_table_schema(
        &self,
        dataset_id: &str,
        table_name: &str,
    ) -> GatewayResult<Vec<SchemaField>> {
        let handle = self.require_handle().await?;
        let table = TableReference::build(dataset_id, table_name, handle.project_id())?;

        debug!(%table, "fetching table schema");

        match handle.get_table_schema(&table).await {
            Ok(schema) => Ok(schema),
            Err(err) if err.is_not_found() => bail!(
                ErrorKind::TableNotFound,
                "Table was not found",
                table.to_string(),
                source: err
            ),
            Err(err) => bail!(
                ErrorKind::QueryExecution,
                "Failed to retrieve table schema",
                err.message().to_owned(),
                source: err
            ),
        }
    }

    /// Runs `sql` and returns at most `max_rows` rows, grouped in chunks.
    ///
    /// When submission is rejected for authentication reasons the client is refreshed before the
    /// error is returned, so the next call uses new credentials. The query itself is not retried.
    pub async fn execute_query(&self, sql: &str, max_rows: usize) -> GatewayResult<QueryResult> {
        let handle = self.require_handle().await?;
        let started = Instant::now();

        let options = QueryOptions {
            timeout: self.config.query_timeout,
            page_size: self.config.row_chunk_size,
        };

        let mut rows = match handle.submit_query(sql, &options).await {
            Ok(rows) => rows,
            Err(err) => {
                if err.is_auth_failure() {
                    self.refresh_after_auth_failure(&err).await?;
                }

                bail!(
                    ErrorKind::QueryExecution,
                    "Failed to execute query",
                    err.message().to_owned(),
                    source: err
                );
            }
        };

        let chunk_size = self.config.row_chunk_size.max(1);
        let mut chunks = Vec::new();
        let mut current_chunk = Vec::new();
        let mut row_count = 0;

        while row_count < max_rows {
            let row = match rows.next_row().await {
                Ok(Some(row)) => row,
                Ok(None) => break,
                Err(err) => bail!(
                    ErrorKind::QueryExecution,
                    "Error streaming query results",
                    err.message().to_owned(),
                    source: err
                ),
            };

            current_chunk.push(row);
            row_count += 1;

            if current_chunk.len() >= chunk_size {
                chunks.push(RowChunk {
                    chunk_index: chunks.len(),
                    rows: mem::take(&mut current_chunk),
                });
            }
        }

        if !current_chunk.is_empty() {
            chunks.push(RowChunk {
                chunk_index: chunks.len(),
                rows: current_chunk,
            });
        }

        let job = rows.job();
        let truncated = job
            .total_rows
            .is_some_and(|total_rows| (row_count as u64) < total_rows);

        Ok(QueryResult {
            job_id: job.job_id.clone(),
            statement_type: job.statement_type.clone(),
            row_count,
            chunks,
            cache_hit: job.cache_hit,
            bytes_processed: job.bytes_processed,
            slot_millis: job.slot_millis,
            duration_ms: started.elapsed().as_secs_f64() * 1000.0,
            truncated,
        })
    }

    /// Refreshes the client after the warehouse rejected its credentials.
    ///
    /// Failing to load credentials is logged and ignored; any other refresh failure is returned.
    async fn refresh_after_auth_failure(&self, cause: &WarehouseError) -> GatewayResult<()> {
        warn!(
            status = cause.status(),
            "warehouse rejected the credentials, refreshing client"
        );

        match self.refresh().await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::CredentialRefresh => {
                warn!(error = %err, "client refresh after authentication failure failed");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }
}
