//! Aggregate configuration file.
//!
//! A single JSON document carries engine settings and the connection list:
//!
//! ```json
//! {
//!   "default_connection": "warehouse",
//!   "alert_threshold": 70.0,
//!   "rules": { "max_concurrency": 8 },
//!   "connections": [
//!     { "name": "warehouse", "host": "db.internal", "database": "quality",
//!       "username": "dq", "password": "secret" },
//!     { "name": "local", "engine": "sqlite", "database": "/tmp/quality.db" }
//!   ]
//! }
//! ```

use crate::connections::{
    ConnectionDefinition, ConnectionProfile, ConnectionRegistry, RegistryConfig,
};
use crate::dama::DEFAULT_ALERT_THRESHOLD;
use crate::profiling::ProfilingConfig;
use crate::rules::RulesConfig;
use crate::{DqmError, Result};
use serde::Deserialize;
use std::path::Path;

/// Everything needed to wire the engines together.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DqmConfig {
    /// Registry and pool settings
    pub registry: RegistryConfig,
    /// Profiling settings
    pub profiling: ProfilingConfig,
    /// Rule execution settings
    pub rules: RulesConfig,
    /// Score below which a dimension alerts
    pub alert_threshold: f64,
    /// Name of the protected default connection; the first connection when
    /// absent
    pub default_connection: Option<String>,
    /// Known connections
    pub connections: Vec<ConnectionDefinition>,
}

impl Default for DqmConfig {
    fn default() -> Self {
        Self {
            registry: RegistryConfig::default(),
            profiling: ProfilingConfig::default(),
            rules: RulesConfig::default(),
            alert_threshold: DEFAULT_ALERT_THRESHOLD,
            default_connection: None,
            connections: Vec::new(),
        }
    }
}

impl DqmConfig {
    /// Parses a configuration document.
    ///
    /// # Errors
    /// `DqmError::Serialization` if the text is not a valid document.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| DqmError::serialization("Invalid configuration document", e))
    }

    /// Reads and parses a configuration file.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| DqmError::io(format!("Failed to read {}", path.display()), e))?;
        let config = Self::from_json(&text)?;
        tracing::debug!(
            path = %path.display(),
            connections = config.connections.len(),
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Reads a connections file: either a bare array of connection
    /// definitions or an object with a `connections` array.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed.
    pub async fn load_connections(path: impl AsRef<Path>) -> Result<Vec<ConnectionDefinition>> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum ConnectionsFile {
            List(Vec<ConnectionDefinition>),
            Wrapped { connections: Vec<ConnectionDefinition> },
        }

        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| DqmError::io(format!("Failed to read {}", path.display()), e))?;
        let parsed: ConnectionsFile = serde_json::from_str(&text).map_err(|e| {
            DqmError::serialization(format!("Invalid connections file {}", path.display()), e)
        })?;
        Ok(match parsed {
            ConnectionsFile::List(list) | ConnectionsFile::Wrapped { connections: list } => list,
        })
    }

    /// Validates every section.
    ///
    /// # Errors
    /// `DqmError::Configuration` describing the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        self.registry.validate()?;
        self.profiling.validate()?;
        self.rules.validate()?;
        if !(0.0..=100.0).contains(&self.alert_threshold) {
            return Err(DqmError::configuration(format!(
                "alert_threshold must be between 0 and 100, got {}",
                self.alert_threshold
            )));
        }
        let mut names = std::collections::HashSet::new();
        for definition in &self.connections {
            if !names.insert(definition.name.as_str()) {
                return Err(DqmError::duplicate_name(&definition.name));
            }
        }
        if let Some(default) = &self.default_connection
            && !names.contains(default.as_str())
        {
            return Err(DqmError::not_found("Connection", default));
        }
        Ok(())
    }

    /// Builds a registry from the connection list.
    ///
    /// # Errors
    /// Returns error if the configuration is invalid or has no connections.
    pub fn build_registry(&self) -> Result<ConnectionRegistry> {
        self.validate()?;
        let default_name = match &self.default_connection {
            Some(name) => name.clone(),
            None => self
                .connections
                .first()
                .map(|c| c.name.clone())
                .ok_or_else(|| DqmError::configuration("no connections configured"))?,
        };

        let mut profiles: Vec<ConnectionProfile> = self
            .connections
            .iter()
            .cloned()
            .map(ConnectionProfile::from)
            .collect();
        let default_index = profiles
            .iter()
            .position(|p| p.name == default_name)
            .ok_or_else(|| DqmError::not_found("Connection", &default_name))?;
        let default = profiles.remove(default_index);

        let registry = ConnectionRegistry::new(default, self.registry.clone())?;
        for profile in profiles {
            registry.add(profile)?;
        }
        Ok(registry)
    }
}
