//! Per-connection state shared by every operation that resolved it.

use super::ConnectionProfile;
use crate::adapters::{ConnectionConfig, DatabaseAdapter, create_adapter};
use crate::error::redact_database_url;
use crate::query::{QueryValidator, SchemaDescriptor, Statement};
use crate::{DqmError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::{OnceCell, Semaphore, SemaphorePermit};

/// Outcome of a diagnostic probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeStatus {
    /// Round trip succeeded
    Connected,
    /// Round trip failed; see `error`
    Failed,
}

/// Structured result of [`ConnectionRegistry::test`](super::ConnectionRegistry::test).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResult {
    /// Connection that was probed
    pub connection: String,
    /// Connected or failed
    pub status: ProbeStatus,
    /// Server version, when connected
    pub database_version: Option<String>,
    /// Number of tables visible, when connected
    pub table_count: Option<usize>,
    /// Failure description, when failed
    pub error: Option<String>,
    /// When the probe ran
    pub checked_at: DateTime<Utc>,
}

impl ProbeResult {
    /// Whether the probe reached the database.
    pub fn is_connected(&self) -> bool {
        self.status == ProbeStatus::Connected
    }
}

/// A registered connection.
///
/// Operations capture an `Arc<ConnectionHandle>` once and use it for their
/// whole duration, so a concurrent `switch` or `remove` never splits one
/// operation across two databases. The adapter is created on first use and
/// shared by every holder of the handle.
pub struct ConnectionHandle {
    profile: ConnectionProfile,
    pool_config: ConnectionConfig,
    adapter: OnceCell<Arc<dyn DatabaseAdapter>>,
    schema: RwLock<Option<Arc<SchemaDescriptor>>>,
    permits: Semaphore,
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("profile", &self.profile)
            .field("adapter_ready", &self.adapter.initialized())
            .field("available_permits", &self.permits.available_permits())
            .finish_non_exhaustive()
    }
}

impl ConnectionHandle {
    pub(crate) fn new(
        profile: ConnectionProfile,
        pool_config: ConnectionConfig,
        max_in_flight: usize,
    ) -> Self {
        Self {
            profile,
            pool_config,
            adapter: OnceCell::new(),
            schema: RwLock::new(None),
            permits: Semaphore::new(max_in_flight),
        }
    }

    pub(crate) fn with_adapter(
        profile: ConnectionProfile,
        adapter: Arc<dyn DatabaseAdapter>,
        max_in_flight: usize,
    ) -> Self {
        Self {
            profile,
            pool_config: ConnectionConfig::default(),
            adapter: OnceCell::new_with(Some(adapter)),
            schema: RwLock::new(None),
            permits: Semaphore::new(max_in_flight),
        }
    }

    /// Registry key of this connection.
    pub fn name(&self) -> &str {
        &self.profile.name
    }

    /// The connection profile.
    pub fn profile(&self) -> &ConnectionProfile {
        &self.profile
    }

    /// Statements that can start right now without waiting.
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    /// Returns the adapter, creating the pool on first use.
    ///
    /// # Errors
    /// `DqmError::Connectivity` if the pool cannot be created.
    pub async fn adapter(&self) -> Result<Arc<dyn DatabaseAdapter>> {
        let adapter = self
            .adapter
            .get_or_try_init(|| async {
                let url = self.profile.connection_url()?;
                tracing::debug!(
                    connection = %self.profile.name,
                    target = %redact_database_url(&url),
                    "Creating database adapter"
                );
                let adapter = create_adapter(&url, &self.pool_config)
                    .await
                    .map_err(|e| match e {
                        DqmError::Connectivity { .. } | DqmError::Configuration { .. } => e,
                        other => DqmError::Connectivity {
                            context: format!("Failed to open connection '{}'", self.profile.name),
                            source: Some(Box::new(other)),
                        },
                    })?;
                Ok::<_, DqmError>(Arc::from(adapter))
            })
            .await?;
        Ok(Arc::clone(adapter))
    }

    async fn permit(&self) -> Result<SemaphorePermit<'_>> {
        self.permits
            .acquire()
            .await
            .map_err(|_| DqmError::query_failed(format!("connection '{}' is closed", self.name())))
    }

    /// Runs a row-returning statement, waiting for an in-flight slot first.
    ///
    /// # Errors
    /// `DqmError::Execution` if the database rejects the statement.
    pub async fn fetch_rows(&self, statement: &Statement) -> Result<Vec<JsonValue>> {
        let adapter = self.adapter().await?;
        let _permit = self.permit().await?;
        adapter.fetch_rows(statement).await
    }

    /// Runs a count statement, waiting for an in-flight slot first.
    ///
    /// # Errors
    /// `DqmError::Execution` if the database rejects the statement.
    pub async fn fetch_count(&self, statement: &Statement) -> Result<i64> {
        let adapter = self.adapter().await?;
        let _permit = self.permit().await?;
        adapter.fetch_count(statement).await
    }

    /// Selects `columns` of `table` (every column when empty) where each
    /// filter column equals its value, returning at most `limit` rows.
    ///
    /// Names are checked against the schema snapshot and filter values are
    /// bound, exactly as for rule statements.
    ///
    /// # Errors
    /// - `DqmError::Security` for identifiers outside the schema
    /// - `DqmError::Configuration` for non-scalar filter values
    /// - `DqmError::Execution` if the database rejects the statement
    pub async fn query<S: AsRef<str>>(
        &self,
        table: &str,
        columns: &[S],
        filters: &BTreeMap<String, JsonValue>,
        limit: Option<u32>,
    ) -> Result<Vec<JsonValue>> {
        let statement = self
            .validator()
            .await?
            .build_query_statement(table, columns, filters, limit)?;
        let rows = self.fetch_rows(&statement).await?;
        tracing::debug!(
            connection = %self.name(),
            table = %table,
            rows = rows.len(),
            "Query executed"
        );
        Ok(rows)
    }

    /// Cached schema snapshot, loaded from the catalog when absent.
    ///
    /// # Errors
    /// Returns error if the catalog cannot be read.
    pub async fn schema(&self) -> Result<Arc<SchemaDescriptor>> {
        let cached = self
            .schema
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match cached {
            Some(schema) => Ok(schema),
            None => self.refresh_schema().await,
        }
    }

    /// Reloads the schema snapshot from the catalog and replaces the cache.
    ///
    /// # Errors
    /// Returns error if the catalog cannot be read.
    pub async fn refresh_schema(&self) -> Result<Arc<SchemaDescriptor>> {
        let adapter = self.adapter().await?;
        let schema = {
            let _permit = self.permit().await?;
            Arc::new(adapter.collect_schema().await?)
        };
        *self.schema.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&schema));
        tracing::debug!(
            connection = %self.name(),
            tables = schema.table_count(),
            "Schema snapshot refreshed"
        );
        Ok(schema)
    }

    /// Drops the cached snapshot; the next [`schema`](Self::schema) call
    /// reloads it.
    pub fn invalidate_schema(&self) {
        *self.schema.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Validator over the current schema snapshot.
    ///
    /// # Errors
    /// Returns error if the schema cannot be loaded.
    pub async fn validator(&self) -> Result<QueryValidator> {
        let schema = self.schema().await?;
        let adapter = self.adapter().await?;
        Ok(QueryValidator::new(schema, adapter.dialect()))
    }

    /// Diagnostic round trip. Failures are returned as data.
    pub async fn probe(&self) -> ProbeResult {
        let outcome = async {
            let adapter = self.adapter().await?;
            let _permit = self.permit().await?;
            adapter.test_connection().await?;
            let version = adapter.server_version().await?;
            let schema = Arc::new(adapter.collect_schema().await?);
            let table_count = schema.table_count();
            *self.schema.write().unwrap_or_else(PoisonError::into_inner) = Some(schema);
            Ok::<_, DqmError>((version, table_count))
        }
        .await;

        let checked_at = Utc::now();
        match outcome {
            Ok((version, table_count)) => {
                tracing::info!(
                    connection = %self.name(),
                    tables = table_count,
                    "Connection probe succeeded"
                );
                ProbeResult {
                    connection: self.name().to_string(),
                    status: ProbeStatus::Connected,
                    database_version: Some(version),
                    table_count: Some(table_count),
                    error: None,
                    checked_at,
                }
            }
            Err(e) => {
                tracing::warn!(connection = %self.name(), "Connection probe failed: {}", e);
                ProbeResult {
                    connection: self.name().to_string(),
                    status: ProbeStatus::Failed,
                    database_version: None,
                    table_count: None,
                    error: Some(e.detailed_message()),
                    checked_at,
                }
            }
        }
    }

    /// Closes the adapter's pool if one was created.
    pub async fn close(&self) {
        if let Some(adapter) = self.adapter.get() {
            adapter.close().await;
        }
    }
}
