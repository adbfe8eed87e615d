use std::time::Duration;

use serde::Deserialize;

use crate::Config;
use crate::serde_utils::{trim_option_string, trim_string};
use crate::shared::{LogLevel, ValidationError};

/// Complete configuration of the gateway process.
///
/// Every field maps to the upper-cased environment variable of the same name, e.g.
/// `query_timeout_seconds` is set through `QUERY_TIMEOUT_SECONDS`.
///
/// This intentionally does not implement `Serialize`; it is logged field by field instead.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Region of the secret store holding the warehouse credentials.
    #[serde(deserialize_with = "trim_string")]
    pub aws_region: String,
    /// Name of the secret holding the service-account JSON.
    #[serde(deserialize_with = "trim_string")]
    pub secret_name: String,
    /// Project used for table references and query jobs.
    ///
    /// Falls back to the `project_id` of the credentials when absent.
    #[serde(default, deserialize_with = "trim_option_string")]
    pub bigquery_project: Option<String>,
    #[serde(default)]
    pub log_level: LogLevel,
    /// Secret store endpoint override, used against local emulators.
    #[serde(default, deserialize_with = "trim_option_string")]
    pub aws_secrets_endpoint: Option<String>,
    #[serde(default = "default_query_timeout_seconds")]
    pub query_timeout_seconds: u64,
    /// Upper bound on rows returned by a single query, also used when the caller gives none.
    #[serde(default = "default_max_rows")]
    pub default_max_rows: u64,
    #[serde(default = "default_row_chunk_size")]
    pub row_chunk_size: u64,
    /// Address the HTTP server binds to.
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl GatewayConfig {
    /// Default query timeout in seconds.
    pub const DEFAULT_QUERY_TIMEOUT_SECONDS: u64 = 300;

    /// Default maximum number of rows returned by a query.
    pub const DEFAULT_MAX_ROWS: u64 = 10_000;

    /// Default number of rows per result chunk.
    pub const DEFAULT_ROW_CHUNK_SIZE: u64 = 500;

    /// Returns the query timeout as a [`Duration`].
    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_seconds)
    }
}

impl Config for GatewayConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.aws_region.is_empty() {
            return Err(ValidationError::MissingField("AWS_REGION"));
        }
        if self.secret_name.is_empty() {
            return Err(ValidationError::MissingField("SECRET_NAME"));
        }

        for (field, value) in [
            ("QUERY_TIMEOUT_SECONDS", self.query_timeout_seconds),
            ("DEFAULT_MAX_ROWS", self.default_max_rows),
            ("ROW_CHUNK_SIZE", self.row_chunk_size),
        ] {
            if value == 0 {
                return Err(ValidationError::InvalidFieldValue {
                    field,
                    constraint: "must be greater than zero".to_string(),
                });
            }
        }

        Ok(())
    }
}

fn default_query_timeout_seconds() -> u64 {
    GatewayConfig::DEFAULT_QUERY_TIMEOUT_SECONDS
}

fn default_max_rows() -> u64 {
    GatewayConfig::DEFAULT_MAX_ROWS
}

fn default_row_chunk_size() -> u64 {
    GatewayConfig::DEFAULT_ROW_CHUNK_SIZE
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}
