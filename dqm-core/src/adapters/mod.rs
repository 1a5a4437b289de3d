//! Database adapter trait and factory.
//!
//! Every engine implements [`DatabaseAdapter`], which exposes exactly what the
//! quality pipeline needs: a connectivity check, schema introspection and
//! execution of validated [`Statement`]s.
//!
//! # Module Structure
//! - `config`: pool and session configuration
//! - `postgres`: PostgreSQL adapter (feature `postgresql`)
//! - `sqlite`: SQLite adapter (feature `sqlite`)

use crate::query::{SchemaDescriptor, SqlDialect, Statement};
use crate::{DqmError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

pub mod config;

pub use config::ConnectionConfig;

#[cfg(feature = "postgresql")]
pub mod postgres;

#[cfg(feature = "sqlite")]
pub mod sqlite;

/// Database engines the adapters understand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// PostgreSQL
    #[default]
    #[serde(alias = "postgres")]
    Postgresql,
    /// SQLite
    Sqlite,
}

impl EngineKind {
    /// Statement conventions for this engine.
    pub fn dialect(self) -> SqlDialect {
        match self {
            Self::Postgresql => SqlDialect::Postgres,
            Self::Sqlite => SqlDialect::Sqlite,
        }
    }
}

impl std::fmt::Display for EngineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Postgresql => write!(f, "postgresql"),
            Self::Sqlite => write!(f, "sqlite"),
        }
    }
}

impl std::str::FromStr for EngineKind {
    type Err = DqmError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "postgresql" | "postgres" => Ok(Self::Postgresql),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(DqmError::configuration(format!(
                "unsupported engine kind '{}'",
                other
            ))),
        }
    }
}

/// Object-safe database access used by the registry and engines.
///
/// # Security Guarantees
/// - Only statements built from validated identifiers are executed
/// - Credentials are never stored on the adapter or logged
#[async_trait]
pub trait DatabaseAdapter: Send + Sync {
    /// Runs a trivial round trip.
    ///
    /// # Errors
    /// `DqmError::Connectivity` if the database cannot be reached.
    async fn test_connection(&self) -> Result<()>;

    /// Server version string as reported by the engine.
    async fn server_version(&self) -> Result<String>;

    /// Reads table and column names from the catalog.
    ///
    /// # Errors
    /// Returns error if the catalog cannot be read.
    async fn collect_schema(&self) -> Result<SchemaDescriptor>;

    /// Executes a statement and returns each row as a JSON object keyed by
    /// column name.
    ///
    /// # Errors
    /// `DqmError::Execution` if the database rejects the statement.
    async fn fetch_rows(&self, statement: &Statement) -> Result<Vec<JsonValue>>;

    /// Executes a statement whose first column of the first row is an integer
    /// count.
    ///
    /// # Errors
    /// `DqmError::Execution` if the database rejects the statement.
    async fn fetch_count(&self, statement: &Statement) -> Result<i64>;

    /// The engine behind this adapter.
    fn engine(&self) -> EngineKind;

    /// Statement conventions for this adapter.
    fn dialect(&self) -> SqlDialect {
        self.engine().dialect()
    }

    /// Closes the underlying pool.
    async fn close(&self);
}

/// Creates an adapter for a connection URL.
///
/// # Errors
/// Returns error if:
/// - The URL format is not recognized
/// - The engine support was not compiled in
/// - The pool cannot be created
pub async fn create_adapter(
    connection_string: &str,
    config: &ConnectionConfig,
) -> Result<Box<dyn DatabaseAdapter>> {
    config.validate()?;

    match detect_engine(connection_string)? {
        #[cfg(feature = "postgresql")]
        EngineKind::Postgresql => {
            let adapter = postgres::PostgresAdapter::with_config(connection_string, config)?;
            Ok(Box::new(adapter))
        }
        #[cfg(not(feature = "postgresql"))]
        EngineKind::Postgresql => Err(DqmError::configuration(
            "PostgreSQL support not compiled in. Use --features postgresql",
        )),
        #[cfg(feature = "sqlite")]
        EngineKind::Sqlite => {
            let adapter = sqlite::SqliteAdapter::with_config(connection_string, config).await?;
            Ok(Box::new(adapter))
        }
        #[cfg(not(feature = "sqlite"))]
        EngineKind::Sqlite => Err(DqmError::configuration(
            "SQLite support not compiled in. Use --features sqlite",
        )),
    }
}

/// Detects the engine from a connection URL.
///
/// # Errors
/// Returns error if the format is unrecognized
pub fn detect_engine(connection_string: &str) -> Result<EngineKind> {
    if connection_string.starts_with("postgres://")
        || connection_string.starts_with("postgresql://")
    {
        Ok(EngineKind::Postgresql)
    } else if connection_string.starts_with("sqlite:")
        || connection_string == ":memory:"
        || connection_string.ends_with(".db")
        || connection_string.ends_with(".sqlite")
        || connection_string.ends_with(".sqlite3")
    {
        Ok(EngineKind::Sqlite)
    } else {
        Err(DqmError::configuration(
            "Unrecognized database connection string format",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_engine() {
        assert_eq!(
            detect_engine("postgres://localhost/db").ok(),
            Some(EngineKind::Postgresql)
        );
        assert_eq!(
            detect_engine("postgresql://u:p@h:5432/db").ok(),
            Some(EngineKind::Postgresql)
        );
        assert_eq!(detect_engine("sqlite::memory:").ok(), Some(EngineKind::Sqlite));
        assert_eq!(detect_engine("/data/app.db").ok(), Some(EngineKind::Sqlite));
        assert!(detect_engine("mysql://localhost/db").is_err());
    }

    #[test]
    fn test_engine_kind_parsing() {
        assert_eq!("PostgreSQL".parse::<EngineKind>().ok(), Some(EngineKind::Postgresql));
        assert_eq!("postgres".parse::<EngineKind>().ok(), Some(EngineKind::Postgresql));
        assert_eq!("sqlite".parse::<EngineKind>().ok(), Some(EngineKind::Sqlite));
        assert!("oracle".parse::<EngineKind>().is_err());
        assert_eq!(EngineKind::default(), EngineKind::Postgresql);
    }

    #[test]
    fn test_engine_kind_serde() {
        let kind: EngineKind = serde_json::from_str("\"postgres\"").unwrap();
        assert_eq!(kind, EngineKind::Postgresql);
        assert_eq!(
            serde_json::to_string(&EngineKind::Sqlite).unwrap(),
            "\"sqlite\""
        );
    }
}
