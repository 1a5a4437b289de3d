//! Registry configuration.

use crate::adapters::ConnectionConfig;
use serde::{Deserialize, Serialize};

/// Upper bound for statements in flight per connection.
const MAX_IN_FLIGHT_LIMIT: usize = 64;

/// Settings applied to every connection the registry manages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Statements allowed in flight per connection; further callers wait
    pub max_in_flight: usize,
    /// Pool settings for adapters created by the registry
    pub pool: ConnectionConfig,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 4,
            pool: ConnectionConfig::default(),
        }
    }
}

impl RegistryConfig {
    /// Creates a registry config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to set the per-connection in-flight limit.
    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        if !(1..=MAX_IN_FLIGHT_LIMIT).contains(&max_in_flight) {
            tracing::warn!(
                "max_in_flight {} clamped to valid range [1, {}]",
                max_in_flight,
                MAX_IN_FLIGHT_LIMIT
            );
        }
        self.max_in_flight = max_in_flight.clamp(1, MAX_IN_FLIGHT_LIMIT);
        self
    }

    /// Builder method to set pool settings.
    pub fn with_pool(mut self, pool: ConnectionConfig) -> Self {
        self.pool = pool;
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns error if the in-flight limit is out of range or the pool
    /// settings are invalid.
    pub fn validate(&self) -> crate::Result<()> {
        if !(1..=MAX_IN_FLIGHT_LIMIT).contains(&self.max_in_flight) {
            return Err(crate::error::DqmError::configuration(format!(
                "max_in_flight must be between 1 and {}, got {}",
                MAX_IN_FLIGHT_LIMIT, self.max_in_flight
            )));
        }
        self.pool.validate()
    }
}
