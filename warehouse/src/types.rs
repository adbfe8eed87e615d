use std::fmt;

use secrecy::{ExposeSecret, SecretString};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};

use crate::bail;
use crate::error::{ErrorKind, GatewayResult};

/// A single result row keyed by column name.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Service-account credentials loaded from the secret store.
///
/// The JSON payload is only reachable through [`Credentials::expose_json`]; the `Debug` output is
/// redacted so the type can sit inside logged structures.
#[derive(Clone)]
pub struct Credentials {
    payload: SecretString,
    project_id: Option<String>,
}

impl Credentials {
    /// Parses a credential payload, which must be a JSON object.
    ///
    /// Errors never include any part of the payload.
    pub fn from_json(payload: &str) -> GatewayResult<Credentials> {
        let value = match serde_json::from_str::<serde_json::Value>(payload) {
            Ok(value) => value,
            Err(_) => bail!(
                ErrorKind::CredentialRetrieval,
                "Secret payload is not valid JSON"
            ),
        };

        let serde_json::Value::Object(object) = value else {
            bail!(
                ErrorKind::CredentialRetrieval,
                "Expected JSON object for service-account secret"
            );
        };

        let project_id = object
            .get("project_id")
            .and_then(serde_json::Value::as_str)
            .map(str::trim)
            .filter(|project_id| !project_id.is_empty())
            .map(str::to_owned);

        Ok(Credentials {
            payload: SecretString::new(payload.to_owned()),
            project_id,
        })
    }

    /// Returns the `project_id` declared by the credentials, if any.
    pub fn project_id(&self) -> Option<&str> {
        self.project_id.as_deref()
    }

    /// Returns the raw JSON payload.
    pub fn expose_json(&self) -> &str {
        self.payload.expose_secret()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("payload", &"[REDACTED]")
            .field("project_id", &self.project_id)
            .finish()
    }
}

/// Fully qualified `{project}.{dataset}.{table}` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableReference {
    pub project_id: String,
    pub dataset_id: String,
    pub table_id: String,
}

impl TableReference {
    /// Builds a reference from caller input.
    ///
    /// Backticks are stripped from `dataset_id`. When it already contains a `.` it is taken as
    /// `project.dataset`; otherwise `default_project` is used.
    pub fn build(
        dataset_id: &str,
        table_name: &str,
        default_project: &str,
    ) -> GatewayResult<TableReference> {
        let dataset = dataset_id.replace('`', "");
        let dataset = dataset.trim();
        let table_id = table_name.trim();

        if dataset.is_empty() {
            bail!(ErrorKind::QueryValidation, "Dataset id cannot be empty");
        }
        if table_id.is_empty() {
            bail!(ErrorKind::QueryValidation, "Table name cannot be empty");
        }
        if table_id.contains('`') {
            bail!(
                ErrorKind::QueryValidation,
                "Table name cannot contain backticks",
                detail = table_id.to_owned()
            );
        }

        let (project_id, dataset_id) = match dataset.split_once('.') {
            Some((project_id, dataset_id)) => (project_id.trim(), dataset_id.trim()),
            None => (default_project, dataset),
        };

        if project_id.is_empty() || dataset_id.is_empty() {
            bail!(
                ErrorKind::QueryValidation,
                "Dataset id must be `dataset` or `project.dataset`",
                detail = dataset.to_owned()
            );
        }

        Ok(TableReference {
            project_id: project_id.to_owned(),
            dataset_id: dataset_id.to_owned(),
            table_id: table_id.to_owned(),
        })
    }
}

impl fmt::Display for TableReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.project_id, self.dataset_id, self.table_id)
    }
}

/// Column description as reported by the warehouse, nested for `RECORD` columns.
///
/// Deserializes from the warehouse's own field representation, so the same type is used for
/// schema lookups and for decoding query rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub fields: Vec<SchemaField>,
}

impl SchemaField {
    /// Returns `true` for columns holding an array of values.
    pub fn is_repeated(&self) -> bool {
        self.mode.eq_ignore_ascii_case("REPEATED")
    }

    /// Returns `true` for columns holding nested records.
    pub fn is_record(&self) -> bool {
        matches!(
            self.field_type.to_ascii_uppercase().as_str(),
            "RECORD" | "STRUCT"
        )
    }
}

fn default_mode() -> String {
    "NULLABLE".to_owned()
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<SchemaField>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Vec<SchemaField>>::deserialize(deserializer)?.unwrap_or_default())
}

/// A bounded slice of query rows.
#[derive(Debug, Clone, PartialEq)]
pub struct RowChunk {
    pub chunk_index: usize,
    pub rows: Vec<Row>,
}

impl Serialize for RowChunk {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut chunk = serializer.serialize_struct("RowChunk", 3)?;
        chunk.serialize_field("chunk_index", &self.chunk_index)?;
        chunk.serialize_field("row_count", &self.rows.len())?;
        chunk.serialize_field("rows", &self.rows)?;
        chunk.end()
    }
}

/// Metadata of a submitted query job.
///
/// Every field except the job id may be missing from the warehouse's response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryJob {
    pub job_id: String,
    pub statement_type: Option<String>,
    pub cache_hit: Option<bool>,
    pub bytes_processed: Option<u64>,
    pub slot_millis: Option<u64>,
    /// Total rows the query produced, independent of how many are read.
    pub total_rows: Option<u64>,
}

/// Outcome of a query execution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    pub job_id: String,
    pub statement_type: Option<String>,
    pub row_count: usize,
    pub chunks: Vec<RowChunk>,
    pub cache_hit: Option<bool>,
    pub bytes_processed: Option<u64>,
    pub slot_millis: Option<u64>,
    pub duration_ms: f64,
    pub truncated: bool,
}
