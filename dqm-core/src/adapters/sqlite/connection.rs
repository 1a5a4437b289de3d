//! SQLite connection handling.
//!
//! # Connection Modes
//! - File-based: `sqlite:///path/to/database.db` or `sqlite://./relative.db`
//! - In-memory: `sqlite::memory:` or `:memory:`

use super::{ConnectionConfig, SqliteAdapter};
use crate::{DqmError, Result};
use sqlx::SqlitePool;
use url::Url;

impl SqliteAdapter {
    /// Creates a new SQLite adapter with default configuration.
    ///
    /// # Errors
    /// Returns error if the connection string is invalid or the database
    /// cannot be opened.
    pub async fn new(connection_string: &str) -> Result<Self> {
        Self::with_config(connection_string, &ConnectionConfig::default()).await
    }

    /// Creates a new SQLite adapter with custom configuration.
    ///
    /// # Errors
    /// Returns error if the connection string is invalid or the database
    /// cannot be opened.
    pub async fn with_config(connection_string: &str, config: &ConnectionConfig) -> Result<Self> {
        config.validate()?;
        validate_sqlite_connection_string(connection_string)?;
        let pool = create_sqlite_connection(connection_string, config).await?;

        Ok(Self {
            pool,
            config: config.clone(),
            connection_string: connection_string.to_string(),
        })
    }

    /// Wraps an existing pool.
    ///
    /// The pool should be limited to one connection when it points at an
    /// in-memory database, since every connection would otherwise see its
    /// own empty database.
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self {
            pool,
            config: ConnectionConfig::default().with_max_connections(1),
            connection_string: "sqlite::memory:".to_string(),
        }
    }

    /// Checks if the connection is to an in-memory database.
    pub fn is_in_memory(&self) -> bool {
        is_in_memory(&self.connection_string)
    }
}

fn is_in_memory(connection_string: &str) -> bool {
    connection_string.contains(":memory:") || connection_string.contains("mode=memory")
}

/// Validates SQLite connection string format.
///
/// # Errors
/// Returns error if connection string is invalid
pub fn validate_sqlite_connection_string(connection_string: &str) -> Result<()> {
    if connection_string == ":memory:" {
        return Ok(());
    }

    if connection_string.ends_with(".db")
        || connection_string.ends_with(".sqlite")
        || connection_string.ends_with(".sqlite3")
    {
        return Ok(());
    }

    if connection_string.starts_with("sqlite:") {
        if is_in_memory(connection_string) {
            return Ok(());
        }

        if let Ok(url) = Url::parse(connection_string) {
            if url.scheme() != "sqlite" {
                return Err(DqmError::configuration(
                    "Connection string must use sqlite:// scheme",
                ));
            }
            return Ok(());
        }

        if connection_string.starts_with("sqlite://") {
            return Ok(());
        }
    }

    Err(DqmError::configuration(
        "Invalid SQLite connection string format: expected sqlite:// URL, file path, or :memory:",
    ))
}

/// Opens the pool. In-memory databases never recycle their only connection.
async fn create_sqlite_connection(
    connection_string: &str,
    config: &ConnectionConfig,
) -> Result<SqlitePool> {
    use sqlx::sqlite::SqliteConnectOptions;
    use std::str::FromStr;

    let normalized = normalize_connection_string(connection_string);

    let mut options = SqliteConnectOptions::from_str(&normalized).map_err(|e| {
        DqmError::configuration(format!("Invalid SQLite connection string: {}", e))
    })?;

    let in_memory = is_in_memory(connection_string);
    if config.read_only && !in_memory {
        options = options.read_only(true);
    }

    let mut pool_options = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .acquire_timeout(config.connect_timeout);
    if in_memory {
        pool_options = pool_options.idle_timeout(None).max_lifetime(None);
    }

    pool_options
        .connect_with(options)
        .await
        .map_err(|e| DqmError::connection_failed("Failed to open SQLite database", e))
}

/// Normalizes connection string to SQLite URL format.
fn normalize_connection_string(connection_string: &str) -> String {
    if connection_string == ":memory:" {
        return "sqlite::memory:".to_string();
    }

    if connection_string.starts_with("sqlite:") {
        return connection_string.to_string();
    }

    format!("sqlite://{}", connection_string)
}
