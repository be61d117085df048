//! Result row decoding.

use serde_json::{Map, Number, Value};
use sqlx::any::AnyRow;
use sqlx::{Column, Row as _};

use crate::error::StrataError;

/// One result row: lower-cased column name to value.
pub type Row = Map<String, Value>;

/// Decode every column of `row`. The driver reports the storage type of each
/// value, so text, integer, floating point and boolean decodes are tried in turn.
pub fn decode_row(row: &AnyRow) -> Result<Row, StrataError> {
    let mut decoded = Map::with_capacity(row.columns().len());
    for column in row.columns() {
        let value = decode_column(row, column.ordinal())
            .map_err(|e| StrataError::Decode(format!("column '{}': {}", column.name(), e)))?;
        decoded.insert(column.name().to_lowercase(), value);
    }
    Ok(decoded)
}

fn decode_column(row: &AnyRow, index: usize) -> Result<Value, String> {
    if let Ok(v) = row.try_get::<Option<String>, _>(index) {
        return Ok(v.map(Value::String).unwrap_or(Value::Null));
    }
    if let Ok(v) = row.try_get::<Option<i64>, _>(index) {
        return Ok(v.map(Value::from).unwrap_or(Value::Null));
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(index) {
        return Ok(v
            .and_then(Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::Null));
    }
    match row.try_get::<Option<bool>, _>(index) {
        Ok(v) => Ok(v.map(Value::Bool).unwrap_or(Value::Null)),
        Err(e) => Err(e.to_string()),
    }
}
