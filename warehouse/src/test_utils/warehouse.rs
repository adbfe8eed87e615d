use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;

use crate::clients::{QueryOptions, QueryRows, WarehouseConnector, WarehouseError, WarehouseHandle};
use crate::types::{Credentials, QueryJob, Row, SchemaField, TableReference};

/// Returns `count` rows shaped `{"id": n, "name": "row-n"}`.
pub fn numbered_rows(count: usize) -> Vec<Row> {
    (0..count)
        .map(|id| {
            let mut row = Row::new();
            row.insert("id".to_owned(), Value::from(id as u64));
            row.insert("name".to_owned(), Value::from(format!("row-{id}")));
            row
        })
        .collect()
}

/// Returns a scalar column of type `field_type`.
pub fn column(name: &str, field_type: &str) -> SchemaField {
    SchemaField {
        name: name.to_owned(),
        field_type: field_type.to_owned(),
        mode: "NULLABLE".to_owned(),
        description: None,
        fields: Vec::new(),
    }
}

#[derive(Debug, Default)]
struct FakeWarehouseState {
    tables: HashMap<String, Vec<SchemaField>>,
    schema_errors: VecDeque<WarehouseError>,
    connect_errors: VecDeque<WarehouseError>,
    submit_errors: VecDeque<WarehouseError>,
    rows: Vec<Row>,
    total_rows: Option<Option<u64>>,
    stream_error_after: Option<usize>,
    query_delay: Option<Duration>,
    connected_projects: Vec<String>,
    submitted: Vec<String>,
    page_sizes: Vec<usize>,
}

#[derive(Debug, Default)]
struct FakeWarehouseInner {
    state: Mutex<FakeWarehouseState>,
    connects: AtomicUsize,
    closes: AtomicUsize,
    jobs: AtomicUsize,
}

/// In-memory [`WarehouseConnector`].
///
/// Clones share their state, so a test keeps one clone to script responses and inspect calls
/// while the service owns another.
#[derive(Debug, Clone, Default)]
pub struct FakeWarehouse {
    inner: Arc<FakeWarehouseInner>,
}

impl FakeWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `table` (formatted as `project.dataset.table`) with its columns.
    pub fn with_table(self, table: &str, schema: Vec<SchemaField>) -> Self {
        self.state().tables.insert(table.to_owned(), schema);
        self
    }

    /// Sets the rows returned by every query.
    pub fn with_rows(self, rows: Vec<Row>) -> Self {
        self.state().rows = rows;
        self
    }

    /// Overrides the total row count reported by jobs, which defaults to the number of rows.
    pub fn with_total_rows(self, total_rows: Option<u64>) -> Self {
        self.state().total_rows = Some(total_rows);
        self
    }

    /// Makes row iteration fail once `rows` rows were read.
    pub fn with_stream_error_after(self, rows: usize) -> Self {
        self.state().stream_error_after = Some(rows);
        self
    }

    /// Delays the completion of every query submission.
    pub fn with_query_delay(self, delay: Duration) -> Self {
        self.state().query_delay = Some(delay);
        self
    }

    /// Fails the next schema lookup with `error`.
    pub fn fail_next_schema(&self, error: WarehouseError) {
        self.state().schema_errors.push_back(error);
    }

    /// Fails the next connect with `error`.
    pub fn fail_next_connect(&self, error: WarehouseError) {
        self.state().connect_errors.push_back(error);
    }

    /// Fails the next query submission with `error`.
    pub fn fail_next_submit(&self, error: WarehouseError) {
        self.state().submit_errors.push_back(error);
    }

    pub fn connects(&self) -> usize {
        self.inner.connects.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.inner.closes.load(Ordering::SeqCst)
    }

    /// Returns the project of every successful connect, in order.
    pub fn connected_projects(&self) -> Vec<String> {
        self.state().connected_projects.clone()
    }

    /// Returns the SQL of every submission that reached the warehouse, in order.
    pub fn submitted_queries(&self) -> Vec<String> {
        self.state().submitted.clone()
    }

    /// Returns the page size of every submission, in order.
    pub fn page_sizes(&self) -> Vec<usize> {
        self.state().page_sizes.clone()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, FakeWarehouseState> {
        self.inner.state.lock().unwrap()
    }
}

impl WarehouseConnector for FakeWarehouse {
    type Handle = FakeHandle;

    async fn connect(
        &self,
        _credentials: &Credentials,
        project_id: &str,
    ) -> Result<FakeHandle, WarehouseError> {
        let mut state = self.state();
        if let Some(error) = state.connect_errors.pop_front() {
            return Err(error);
        }

        state.connected_projects.push(project_id.to_owned());
        let id = self.inner.connects.fetch_add(1, Ordering::SeqCst);

        Ok(FakeHandle {
            id,
            project_id: project_id.to_owned(),
            warehouse: self.clone(),
            closed: AtomicBool::new(false),
        })
    }
}

/// Handle produced by [`FakeWarehouse`].
#[derive(Debug)]
pub struct FakeHandle {
    id: usize,
    project_id: String,
    warehouse: FakeWarehouse,
    closed: AtomicBool,
}

impl FakeHandle {
    /// Position of this handle among all handles of its warehouse, starting at zero.
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl WarehouseHandle for FakeHandle {
    type Rows = FakeRows;

    fn project_id(&self) -> &str {
        &self.project_id
    }

    async fn get_table_schema(
        &self,
        table: &TableReference,
    ) -> Result<Vec<SchemaField>, WarehouseError> {
        let mut state = self.warehouse.state();
        if let Some(error) = state.schema_errors.pop_front() {
            return Err(error);
        }

        state.tables.get(&table.to_string()).cloned().ok_or_else(|| {
            WarehouseError::with_status(404, format!("Not found: Table {table}"))
        })
    }

    async fn submit_query(
        &self,
        sql: &str,
        options: &QueryOptions,
    ) -> Result<FakeRows, WarehouseError> {
        let (rows, total_rows, stream_error_after, query_delay) = {
            let mut state = self.warehouse.state();
            if let Some(error) = state.submit_errors.pop_front() {
                return Err(error);
            }

            state.submitted.push(sql.to_owned());
            state.page_sizes.push(options.page_size);

            let total_rows = state
                .total_rows
                .unwrap_or(Some(state.rows.len() as u64));

            (
                state.rows.clone(),
                total_rows,
                state.stream_error_after,
                state.query_delay,
            )
        };

        if let Some(delay) = query_delay {
            tokio::time::sleep(delay).await;
        }

        let job_number = self.warehouse.inner.jobs.fetch_add(1, Ordering::SeqCst);

        Ok(FakeRows {
            job: QueryJob {
                job_id: format!("job_{job_number}"),
                statement_type: Some("SELECT".to_owned()),
                cache_hit: Some(false),
                bytes_processed: Some(1024),
                slot_millis: Some(42),
                total_rows,
            },
            rows: rows.into(),
            read: 0,
            stream_error_after,
        })
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.warehouse.inner.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Rows of a [`FakeHandle`] query.
#[derive(Debug)]
pub struct FakeRows {
    job: QueryJob,
    rows: VecDeque<Row>,
    read: usize,
    stream_error_after: Option<usize>,
}

impl QueryRows for FakeRows {
    fn job(&self) -> &QueryJob {
        &self.job
    }

    async fn next_row(&mut self) -> Result<Option<Row>, WarehouseError> {
        if self.stream_error_after == Some(self.read) {
            return Err(WarehouseError::with_status(500, "connection reset while reading rows"));
        }

        let row = self.rows.pop_front();
        if row.is_some() {
            self.read += 1;
        }

        Ok(row)
    }
}
