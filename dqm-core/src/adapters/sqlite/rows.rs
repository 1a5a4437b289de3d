//! Parameter binding and row conversion for SQLite.

use crate::query::{BoundValue, Statement};
use crate::{DqmError, Result};
use serde_json::Value as JsonValue;
use sqlx::{Row, SqlitePool};

/// Binds every statement parameter in order.
macro_rules! bind_params {
    ($query:expr, $params:expr) => {{
        let mut query = $query;
        for param in $params {
            query = match param {
                BoundValue::Null => query.bind(None::<String>),
                BoundValue::Bool(b) => query.bind(*b),
                BoundValue::Int(i) => query.bind(*i),
                BoundValue::Float(f) => query.bind(*f),
                BoundValue::Text(s) => query.bind(s.as_str()),
            };
        }
        query
    }};
}

pub(super) async fn fetch_rows(pool: &SqlitePool, statement: &Statement) -> Result<Vec<JsonValue>> {
    tracing::trace!(sql = %statement.sql, params = statement.params.len(), "SQLite fetch");

    let query = bind_params!(sqlx::query(&statement.sql), &statement.params);
    let rows = query
        .fetch_all(pool)
        .await
        .map_err(|e| DqmError::execution_failed("SQLite statement failed", e))?;

    Ok(rows.iter().map(row_to_json).collect())
}

pub(super) async fn fetch_count(pool: &SqlitePool, statement: &Statement) -> Result<i64> {
    tracing::trace!(sql = %statement.sql, params = statement.params.len(), "SQLite count");

    let query = bind_params!(sqlx::query_scalar::<_, i64>(&statement.sql), &statement.params);
    query
        .fetch_one(pool)
        .await
        .map_err(|e| DqmError::execution_failed("SQLite count failed", e))
}

/// Converts a row into a JSON object keyed by column name.
fn row_to_json(row: &sqlx::sqlite::SqliteRow) -> JsonValue {
    use sqlx::Column;

    let mut map = serde_json::Map::new();
    for column in row.columns() {
        let column_name = column.name();
        map.insert(column_name.to_string(), extract_column_value(row, column_name));
    }
    JsonValue::Object(map)
}

/// Extracts a column value as JSON.
///
/// SQLite is dynamically typed, so each storage class is tried in turn.
fn extract_column_value(row: &sqlx::sqlite::SqliteRow, column_name: &str) -> JsonValue {
    if let Ok(v) = row.try_get::<Option<String>, _>(column_name) {
        return v.map_or(JsonValue::Null, JsonValue::String);
    }
    if let Ok(v) = row.try_get::<Option<i64>, _>(column_name) {
        return v.map_or(JsonValue::Null, |n| JsonValue::Number(n.into()));
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(column_name) {
        return v
            .and_then(serde_json::Number::from_f64)
            .map_or(JsonValue::Null, JsonValue::Number);
    }
    if let Ok(v) = row.try_get::<Option<bool>, _>(column_name) {
        return v.map_or(JsonValue::Null, JsonValue::Bool);
    }
    if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(column_name) {
        return v.map_or(JsonValue::Null, |bytes| {
            use base64::Engine;
            let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
            JsonValue::String(format!("base64:{}", encoded))
        });
    }

    JsonValue::Null
}
