//! SQLite database adapter.
//!
//! # Module Structure
//! - `connection`: connection string handling and pool creation
//! - `rows`: binding parameters and converting rows to JSON
//!
//! # SQLite-Specific Behavior
//! - Schema comes from `sqlite_master` and `pragma_table_info`
//! - A single pooled connection is used, so in-memory databases stay
//!   visible to every statement
//! - There is no regex operator; pattern checks run client side

pub mod connection;
mod rows;

use super::{ConnectionConfig, DatabaseAdapter, EngineKind};
use crate::query::{ColumnInfo, SchemaDescriptor, Statement};
use crate::{DqmError, Result};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::SqlitePool;

/// SQLite database adapter.
pub struct SqliteAdapter {
    /// Connection pool (single connection)
    pub pool: SqlitePool,
    /// Connection configuration
    pub config: ConnectionConfig,
    /// Original connection string
    pub connection_string: String,
}

impl std::fmt::Debug for SqliteAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteAdapter")
            .field("config", &self.config)
            .field("is_in_memory", &self.is_in_memory())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl DatabaseAdapter for SqliteAdapter {
    async fn test_connection(&self) -> Result<()> {
        let result: i32 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| DqmError::connection_failed("SQLite round trip failed", e))?;

        if result != 1 {
            return Err(DqmError::Connectivity {
                context: "Basic connectivity test returned an unexpected result".to_string(),
                source: None,
            });
        }

        Ok(())
    }

    async fn server_version(&self) -> Result<String> {
        let version: String = sqlx::query_scalar("SELECT sqlite_version()")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| DqmError::execution_failed("Failed to read SQLite version", e))?;
        Ok(format!("SQLite {}", version))
    }

    async fn collect_schema(&self) -> Result<SchemaDescriptor> {
        tracing::debug!("Collecting SQLite schema");

        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DqmError::execution_failed("Failed to enumerate SQLite tables", e))?;

        let mut schema = SchemaDescriptor::new();
        for table in tables {
            let columns: Vec<(String, String)> =
                sqlx::query_as("SELECT name, type FROM pragma_table_info(?) ORDER BY cid")
                    .bind(&table)
                    .fetch_all(&self.pool)
                    .await
                    .map_err(|e| {
                        DqmError::execution_failed(
                            format!("Failed to read columns of table '{}'", table),
                            e,
                        )
                    })?;

            let columns = columns
                .into_iter()
                .map(|(name, data_type)| ColumnInfo::new(name, data_type))
                .collect();
            schema.insert_table(table, columns);
        }

        tracing::debug!("Collected {} SQLite tables", schema.table_count());
        Ok(schema)
    }

    async fn fetch_rows(&self, statement: &Statement) -> Result<Vec<JsonValue>> {
        rows::fetch_rows(&self.pool, statement).await
    }

    async fn fetch_count(&self, statement: &Statement) -> Result<i64> {
        rows::fetch_count(&self.pool, statement).await
    }

    fn engine(&self) -> EngineKind {
        EngineKind::Sqlite
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{BoundValue, SqlDialect};

    async fn adapter() -> SqliteAdapter {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory pool");
        sqlx::query(
            "CREATE TABLE customers (id INTEGER PRIMARY KEY, email TEXT, score REAL, avatar BLOB)",
        )
        .execute(&pool)
        .await
        .expect("create table");
        sqlx::query(
            "INSERT INTO customers (email, score, avatar) VALUES ('a@x.io', 1.5, x'0102'), (NULL, 2.0, NULL)",
        )
        .execute(&pool)
        .await
        .expect("insert rows");
        SqliteAdapter::from_pool(pool)
    }

    #[tokio::test]
    async fn test_sqlite_collect_schema() {
        let adapter = adapter().await;
        let schema = adapter.collect_schema().await.expect("schema");
        let columns: Vec<_> = schema
            .columns("customers")
            .expect("customers table")
            .iter()
            .map(|c| (c.name.as_str(), c.data_type.as_str()))
            .collect();
        assert_eq!(
            columns,
            vec![
                ("id", "INTEGER"),
                ("email", "TEXT"),
                ("score", "REAL"),
                ("avatar", "BLOB")
            ]
        );
    }

    #[tokio::test]
    async fn test_sqlite_fetch_rows_and_count() {
        let adapter = adapter().await;
        assert_eq!(adapter.dialect(), SqlDialect::Sqlite);

        let count = adapter
            .fetch_count(&Statement {
                sql: "SELECT COUNT(*) FROM customers WHERE email IS NULL".into(),
                params: vec![],
            })
            .await
            .expect("count");
        assert_eq!(count, 1);

        let rows = adapter
            .fetch_rows(&Statement {
                sql: "SELECT id, email, score, avatar FROM customers WHERE email = ?".into(),
                params: vec![BoundValue::Text("a@x.io".into())],
            })
            .await
            .expect("rows");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["email"], "a@x.io");
        assert_eq!(rows[0]["score"], 1.5);
        assert_eq!(rows[0]["avatar"], "base64:AQI=");
    }

    #[tokio::test]
    async fn test_sqlite_rejected_statement_is_execution_error() {
        let adapter = adapter().await;
        let result = adapter
            .fetch_count(&Statement {
                sql: "SELECT COUNT(*) FROM missing_table".into(),
                params: vec![],
            })
            .await;
        assert!(matches!(result, Err(DqmError::Execution { .. })));
    }

    #[tokio::test]
    async fn test_sqlite_version_and_probe() {
        let adapter = adapter().await;
        adapter.test_connection().await.expect("probe");
        let version = adapter.server_version().await.expect("version");
        assert!(version.starts_with("SQLite 3."));
    }
}
