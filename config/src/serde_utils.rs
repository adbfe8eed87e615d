use serde::{Deserialize, Deserializer};

/// Deserializes a string and trims leading and trailing whitespace.
pub fn trim_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    Ok(s.trim().to_string())
}

/// Deserializes an optional string, trimming it and treating a blank value as absent.
///
/// An exported but empty variable (`BIGQUERY_PROJECT=`) therefore behaves like an unset one.
pub fn trim_option_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty()))
}
