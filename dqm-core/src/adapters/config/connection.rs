//! Database pool configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Pool and session settings applied when an adapter is created.
///
/// # Security
/// This struct never holds credentials; those live on the connection profile
/// and are zeroized on drop.
///
/// # Example
/// ```rust
/// use dqm_core::adapters::ConnectionConfig;
/// use std::time::Duration;
///
/// let config = ConnectionConfig::new()
///     .with_max_connections(4)
///     .with_query_timeout(Duration::from_secs(10));
///
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Time allowed to acquire a pooled connection
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,
    /// Server-side statement timeout
    #[serde(with = "duration_secs")]
    pub query_timeout: Duration,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Whether sessions are opened read-only
    pub read_only: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            query_timeout: Duration::from_secs(30),
            max_connections: 10,
            read_only: true,
        }
    }
}

impl ConnectionConfig {
    /// Creates a config with safe defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates configuration parameters.
    ///
    /// # Errors
    /// Returns error if configuration values are invalid or unsafe
    pub fn validate(&self) -> crate::Result<()> {
        if self.max_connections == 0 {
            return Err(crate::error::DqmError::configuration(
                "max_connections must be greater than 0",
            ));
        }

        if self.max_connections > 100 {
            return Err(crate::error::DqmError::configuration(
                "max_connections should not exceed 100",
            ));
        }

        if self.connect_timeout.is_zero() {
            return Err(crate::error::DqmError::configuration(
                "connect_timeout must be greater than 0",
            ));
        }

        if self.query_timeout.is_zero() {
            return Err(crate::error::DqmError::configuration(
                "query_timeout must be greater than 0",
            ));
        }

        Ok(())
    }

    /// Builder method to set the pool size.
    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }

    /// Builder method to set the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Builder method to set the statement timeout.
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    /// Builder method to toggle read-only sessions.
    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }
}

/// Serializes durations as whole seconds.
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub(super) fn serialize<S: Serializer>(
        value: &Duration,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
