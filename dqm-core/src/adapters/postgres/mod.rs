//! PostgreSQL database adapter.
//!
//! # Module Structure
//! - `connection`: pool creation and connection string validation
//!
//! Rows are returned through `row_to_json`, so any statement shape can be
//! decoded without per-type extraction code.

pub mod connection;

use super::{ConnectionConfig, DatabaseAdapter, EngineKind};
use crate::query::{BoundValue, ColumnInfo, SchemaDescriptor, Statement};
use crate::{DqmError, Result};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::PgPool;

/// PostgreSQL database adapter with connection pooling.
pub struct PostgresAdapter {
    /// Connection pool
    pub pool: PgPool,
    /// Connection configuration
    pub config: ConnectionConfig,
    display_url: String,
}

impl std::fmt::Debug for PostgresAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresAdapter")
            .field("url", &self.display_url)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

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

/// Lists base tables and columns of the current schema.
const COLUMNS_QUERY: &str = r#"
    SELECT
        c.table_name::text AS table_name,
        c.column_name::text AS column_name,
        c.data_type::text AS data_type
    FROM information_schema.columns c
    JOIN information_schema.tables t
        ON t.table_schema = c.table_schema
        AND t.table_name = c.table_name
    WHERE c.table_schema = current_schema()
    AND t.table_type = 'BASE TABLE'
    ORDER BY c.table_name, c.ordinal_position
"#;

#[async_trait]
impl DatabaseAdapter for PostgresAdapter {
    async fn test_connection(&self) -> Result<()> {
        let result: i32 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| DqmError::connection_failed("PostgreSQL round trip failed", e))?;

        if result != 1 {
            return Err(DqmError::Connectivity {
                context: "Basic connectivity test returned an unexpected result".to_string(),
                source: None,
            });
        }

        Ok(())
    }

    async fn server_version(&self) -> Result<String> {
        sqlx::query_scalar("SELECT version()")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| DqmError::execution_failed("Failed to read PostgreSQL version", e))
    }

    async fn collect_schema(&self) -> Result<SchemaDescriptor> {
        tracing::debug!("Collecting PostgreSQL schema");

        let rows: Vec<(String, String, String)> = sqlx::query_as(COLUMNS_QUERY)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DqmError::execution_failed("Failed to enumerate PostgreSQL columns", e))?;

        let mut tables: std::collections::BTreeMap<String, Vec<ColumnInfo>> =
            std::collections::BTreeMap::new();
        for (table, column, data_type) in rows {
            tables
                .entry(table)
                .or_default()
                .push(ColumnInfo::new(column, data_type));
        }

        let mut schema = SchemaDescriptor::new();
        for (table, columns) in tables {
            schema.insert_table(table, columns);
        }

        tracing::debug!("Collected {} PostgreSQL tables", schema.table_count());
        Ok(schema)
    }

    async fn fetch_rows(&self, statement: &Statement) -> Result<Vec<JsonValue>> {
        tracing::trace!(sql = %statement.sql, params = statement.params.len(), "PostgreSQL fetch");

        let wrapped = format!("SELECT row_to_json(q.*) AS row_data FROM ({}) q", statement.sql);
        let query = bind_params!(sqlx::query_scalar::<_, JsonValue>(&wrapped), &statement.params);
        query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DqmError::execution_failed("PostgreSQL statement failed", e))
    }

    async fn fetch_count(&self, statement: &Statement) -> Result<i64> {
        tracing::trace!(sql = %statement.sql, params = statement.params.len(), "PostgreSQL count");

        let query = bind_params!(sqlx::query_scalar::<_, i64>(&statement.sql), &statement.params);
        query
            .fetch_one(&self.pool)
            .await
            .map_err(|e| DqmError::execution_failed("PostgreSQL count failed", e))
    }

    fn engine(&self) -> EngineKind {
        EngineKind::Postgresql
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
