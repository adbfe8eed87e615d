//! Decoding of BigQuery's tabledata row encoding.
//!
//! Rows arrive as `{"f": [{"v": ...}, ...]}` with one cell per schema field. Scalar values are
//! strings, repeated values are arrays of `{"v": ...}` and records nest the same row encoding.
//! `TIMESTAMP` values arrive as epoch seconds and are rendered as RFC 3339 in UTC. Other
//! temporal types already arrive in ISO 8601 and `NUMERIC` stays a string to keep its precision.

use chrono::{DateTime, SecondsFormat};
use serde_json::{Number, Value};

use crate::clients::base::WarehouseError;
use crate::types::{Row, SchemaField};

/// Decodes one encoded row into a map keyed by column name, in schema order.
pub fn decode_row(fields: &[SchemaField], row: &Value) -> Result<Row, WarehouseError> {
    let cells = row
        .get("f")
        .and_then(Value::as_array)
        .ok_or_else(|| WarehouseError::new("row is missing its cell list"))?;

    if cells.len() != fields.len() {
        return Err(WarehouseError::new(format!(
            "row has {} cells but the schema has {} fields",
            cells.len(),
            fields.len()
        )));
    }

    let mut decoded = Row::new();
    for (field, cell) in fields.iter().zip(cells) {
        let value = cell.get("v").unwrap_or(&Value::Null);
        decoded.insert(field.name.clone(), decode_cell(field, value)?);
    }

    Ok(decoded)
}

fn decode_cell(field: &SchemaField, value: &Value) -> Result<Value, WarehouseError> {
    if value.is_null() {
        return Ok(Value::Null);
    }

    if field.is_repeated() {
        let items = value.as_array().ok_or_else(|| {
            WarehouseError::new(format!("repeated column `{}` is not an array", field.name))
        })?;

        return items
            .iter()
            .map(|item| decode_value(field, item.get("v").unwrap_or(&Value::Null)))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array);
    }

    decode_value(field, value)
}

fn decode_value(field: &SchemaField, value: &Value) -> Result<Value, WarehouseError> {
    if value.is_null() {
        return Ok(Value::Null);
    }

    if field.is_record() {
        return decode_row(&field.fields, value).map(Value::Object);
    }

    let Some(text) = value.as_str() else {
        // Already typed, e.g. JSON columns.
        return Ok(value.clone());
    };

    let decoded = match field.field_type.to_ascii_uppercase().as_str() {
        "INTEGER" | "INT64" => text.parse::<i64>().ok().map(Value::from),
        "FLOAT" | "FLOAT64" => text
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number),
        "BOOLEAN" | "BOOL" => match text {
            "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            _ => None,
        },
        "TIMESTAMP" => format_timestamp(text).map(Value::String),
        _ => Some(Value::String(text.to_owned())),
    };

    // Values without a JSON equivalent, such as `NaN`, stay strings.
    Ok(decoded.unwrap_or_else(|| Value::String(text.to_owned())))
}

/// Renders epoch seconds such as `1.7E9` or `1700000000.123456` as RFC 3339.
fn format_timestamp(epoch_seconds: &str) -> Option<String> {
    let seconds = epoch_seconds.parse::<f64>().ok().filter(|s| s.is_finite())?;
    let micros = (seconds * 1_000_000.0).round();
    if micros.abs() >= i64::MAX as f64 {
        return None;
    }

    DateTime::from_timestamp_micros(micros as i64)
        .map(|timestamp| timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true))
}
