use std::future::Future;
use std::time::Duration;

use thiserror::Error;

use crate::types::{Credentials, QueryJob, Row, SchemaField, TableReference};

/// Status reported when the table or job does not exist.
const STATUS_NOT_FOUND: u16 = 404;

/// Statuses reported when the credentials are rejected.
const AUTH_FAILURE_STATUSES: &[u16] = &[401, 403];

/// Failure of a warehouse call.
///
/// `status` is the HTTP status of the failed call when the warehouse answered with one.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct WarehouseError {
    status: Option<u16>,
    message: String,
}

impl WarehouseError {
    /// Creates an error that did not come with a status, e.g. a transport failure.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }

    /// Creates an error for a call that was answered with `status`.
    pub fn with_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
        }
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns `true` when the requested resource does not exist.
    pub fn is_not_found(&self) -> bool {
        self.status == Some(STATUS_NOT_FOUND)
    }

    /// Returns `true` when the warehouse rejected the credentials.
    pub fn is_auth_failure(&self) -> bool {
        self.status
            .is_some_and(|status| AUTH_FAILURE_STATUSES.contains(&status))
    }
}

/// Limits applied to a submitted query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryOptions {
    /// Upper bound on the time spent waiting for the query to complete.
    pub timeout: Duration,
    /// Number of rows fetched per page.
    pub page_size: usize,
}

/// Builds authenticated [`WarehouseHandle`]s.
pub trait WarehouseConnector: Send + Sync + 'static {
    type Handle: WarehouseHandle;

    /// Creates a handle that authenticates with `credentials` and bills `project_id`.
    fn connect(
        &self,
        credentials: &Credentials,
        project_id: &str,
    ) -> impl Future<Output = Result<Self::Handle, WarehouseError>> + Send;
}

/// Authenticated session with the warehouse.
///
/// A handle is shared by all requests running at the same time, so every method takes `&self`.
pub trait WarehouseHandle: Send + Sync + 'static {
    type Rows: QueryRows;

    /// Project used for unqualified table references and for running jobs.
    fn project_id(&self) -> &str;

    /// Returns the columns of `table`, in table order.
    fn get_table_schema(
        &self,
        table: &TableReference,
    ) -> impl Future<Output = Result<Vec<SchemaField>, WarehouseError>> + Send;

    /// Submits `sql` and waits for the job to complete.
    ///
    /// Rows are not buffered beyond the first page; [`QueryRows::next_row`] fetches the rest as
    /// they are consumed.
    fn submit_query(
        &self,
        sql: &str,
        options: &QueryOptions,
    ) -> impl Future<Output = Result<Self::Rows, WarehouseError>> + Send;

    /// Releases the session. Queries already running on it are allowed to finish.
    fn close(&self) -> impl Future<Output = ()> + Send;
}

/// Rows of a completed query job.
pub trait QueryRows: Send {
    /// Metadata of the job producing these rows.
    fn job(&self) -> &QueryJob;

    /// Returns the next row, or [`None`] once all rows were read.
    fn next_row(&mut self) -> impl Future<Output = Result<Option<Row>, WarehouseError>> + Send;
}
