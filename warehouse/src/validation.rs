//! Read-only guard for caller supplied SQL.
//!
//! The check only looks at the leading keyword and at statement separators. It is not a SQL
//! parser: statements hidden inside comments or string literals are not detected.

use crate::bail;
use crate::error::{ErrorKind, GatewayResult};

/// Leading keywords of statements that are accepted.
const READ_ONLY_PREFIXES: &[&str] = &["select", "with", "explain"];

/// Leading keywords of statements that modify data, schema or permissions.
const PROHIBITED_PREFIXES: &[&str] = &[
    "insert", "update", "delete", "drop", "alter", "create", "merge", "truncate", "grant", "revoke",
];

/// Validates that `sql` is a single read-only statement and returns it normalized.
///
/// Normalization trims surrounding whitespace and drops one trailing `;`. The statement itself is
/// returned unchanged, including its casing.
pub fn validate_sql(sql: &str) -> GatewayResult<String> {
    let normalized = sql.trim();
    if normalized.is_empty() {
        bail!(ErrorKind::QueryValidation, "SQL query cannot be empty");
    }

    let first_token = normalized
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_lowercase();

    if PROHIBITED_PREFIXES.contains(&first_token.as_str()) {
        bail!(
            ErrorKind::QueryValidation,
            "Only read-only queries are allowed (SELECT/WITH/EXPLAIN)."
        );
    }

    if !READ_ONLY_PREFIXES.contains(&first_token.as_str()) {
        bail!(
            ErrorKind::QueryValidation,
            "SQL must start with SELECT, WITH, or EXPLAIN for safety."
        );
    }

    let statement = normalized.strip_suffix(';').unwrap_or(normalized);
    if statement.contains(';') {
        bail!(
            ErrorKind::QueryValidation,
            "Multiple SQL statements are not supported"
        );
    }

    Ok(statement.trim().to_owned())
}
