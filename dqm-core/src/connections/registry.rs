//! The set of named connections and the active pointer.

use super::{ConnectionHandle, ConnectionProfile, ConnectionSummary, ProbeResult, RegistryConfig};
use crate::adapters::DatabaseAdapter;
use crate::{DqmError, Result};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

#[derive(Debug)]
struct RegistryState {
    connections: HashMap<String, Arc<ConnectionHandle>>,
    active: String,
}

/// Named database targets plus the currently active one.
///
/// The registry is an explicit object handed to the engines that need it;
/// there is no process-wide instance. The lock guarding the active pointer
/// is only held for map lookups and never across a database round trip.
#[derive(Debug)]
pub struct ConnectionRegistry {
    state: RwLock<RegistryState>,
    default_name: String,
    default_handle: Arc<ConnectionHandle>,
    config: RegistryConfig,
}

impl ConnectionRegistry {
    /// Creates a registry whose default (and initially active) connection is
    /// `default`.
    ///
    /// # Errors
    /// Returns error if the profile or configuration is invalid.
    pub fn new(default: ConnectionProfile, config: RegistryConfig) -> Result<Self> {
        default.validate()?;
        config.validate()?;
        let handle = ConnectionHandle::new(default, config.pool.clone(), config.max_in_flight);
        Ok(Self::from_default_handle(handle, config))
    }

    /// Creates a registry whose default connection uses a pre-built adapter.
    ///
    /// # Errors
    /// Returns error if the profile or configuration is invalid.
    pub fn with_adapter(
        default: ConnectionProfile,
        adapter: Arc<dyn DatabaseAdapter>,
        config: RegistryConfig,
    ) -> Result<Self> {
        default.validate()?;
        config.validate()?;
        let handle = ConnectionHandle::with_adapter(default, adapter, config.max_in_flight);
        Ok(Self::from_default_handle(handle, config))
    }

    fn from_default_handle(handle: ConnectionHandle, config: RegistryConfig) -> Self {
        let default_name = handle.name().to_string();
        let default_handle = Arc::new(handle);
        let mut connections = HashMap::new();
        connections.insert(default_name.clone(), Arc::clone(&default_handle));
        Self {
            state: RwLock::new(RegistryState {
                connections,
                active: default_name.clone(),
            }),
            default_name,
            default_handle,
            config,
        }
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, RegistryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> std::sync::RwLockWriteGuard<'_, RegistryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn insert(&self, handle: ConnectionHandle) -> Result<()> {
        let mut state = self.write_state();
        if state.connections.contains_key(handle.name()) {
            return Err(DqmError::duplicate_name(handle.name()));
        }
        tracing::info!(connection = %handle.profile(), "Registered connection");
        state
            .connections
            .insert(handle.name().to_string(), Arc::new(handle));
        Ok(())
    }

    /// Registers a connection. The active connection does not change.
    ///
    /// # Errors
    /// - `DqmError::DuplicateName` if the name is taken
    /// - `DqmError::Configuration` if the profile is invalid
    pub fn add(&self, profile: ConnectionProfile) -> Result<()> {
        profile.validate()?;
        self.insert(ConnectionHandle::new(
            profile,
            self.config.pool.clone(),
            self.config.max_in_flight,
        ))
    }

    /// Registers a connection backed by a pre-built adapter.
    ///
    /// # Errors
    /// Same as [`add`](Self::add).
    pub fn register_adapter(
        &self,
        profile: ConnectionProfile,
        adapter: Arc<dyn DatabaseAdapter>,
    ) -> Result<()> {
        profile.validate()?;
        self.insert(ConnectionHandle::with_adapter(
            profile,
            adapter,
            self.config.max_in_flight,
        ))
    }

    /// Makes `name` the active connection and invalidates its cached schema.
    ///
    /// Operations that already captured a handle keep using it.
    ///
    /// # Errors
    /// `DqmError::NotFound` if `name` is not registered.
    pub fn switch(&self, name: &str) -> Result<()> {
        let handle = {
            let mut state = self.write_state();
            let handle = state
                .connections
                .get(name)
                .cloned()
                .ok_or_else(|| DqmError::not_found("Connection", name))?;
            state.active = name.to_string();
            handle
        };
        handle.invalidate_schema();
        tracing::info!(connection = %name, "Switched active connection");
        Ok(())
    }

    /// Removes a connection. If it was active, the default becomes active.
    ///
    /// Returns whether a removal occurred.
    ///
    /// # Errors
    /// - `DqmError::ProtectedConnection` for the default connection
    /// - `DqmError::NotFound` if `name` is not registered
    pub fn remove(&self, name: &str) -> Result<bool> {
        if name == self.default_name {
            return Err(DqmError::protected_connection(name));
        }

        let mut state = self.write_state();
        if state.connections.remove(name).is_none() {
            return Err(DqmError::not_found("Connection", name));
        }
        if state.active == name {
            state.active = self.default_name.clone();
            tracing::info!(
                connection = %name,
                active = %self.default_name,
                "Removed active connection; reverted to default"
            );
        } else {
            tracing::info!(connection = %name, "Removed connection");
        }
        Ok(true)
    }

    /// Handle of the active connection, captured for the caller's operation.
    pub fn active(&self) -> Arc<ConnectionHandle> {
        let state = self.read_state();
        state
            .connections
            .get(&state.active)
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.default_handle))
    }

    /// Handle of a named connection.
    ///
    /// # Errors
    /// `DqmError::NotFound` if `name` is not registered.
    pub fn resolve(&self, name: &str) -> Result<Arc<ConnectionHandle>> {
        self.read_state()
            .connections
            .get(name)
            .cloned()
            .ok_or_else(|| DqmError::not_found("Connection", name))
    }

    /// Resolves `name`, or the active connection when `None`.
    ///
    /// # Errors
    /// `DqmError::NotFound` if a named connection is not registered.
    pub fn resolve_or_active(&self, name: Option<&str>) -> Result<Arc<ConnectionHandle>> {
        match name {
            Some(name) => self.resolve(name),
            None => Ok(self.active()),
        }
    }

    /// Name of the active connection.
    pub fn active_name(&self) -> String {
        self.read_state().active.clone()
    }

    /// Name of the protected default connection.
    pub fn default_name(&self) -> &str {
        &self.default_name
    }

    /// Whether `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.read_state().connections.contains_key(name)
    }

    /// All connections sorted by name, without credentials.
    pub fn list(&self) -> Vec<ConnectionSummary> {
        let state = self.read_state();
        let mut summaries: Vec<_> = state
            .connections
            .values()
            .map(|handle| {
                handle.profile().summary(
                    handle.name() == state.active,
                    handle.name() == self.default_name,
                )
            })
            .collect();
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        summaries
    }

    /// Diagnostic probe of `name` (or the active connection).
    ///
    /// Connectivity failures are reported in the result with
    /// `status = failed`; they are never returned as errors.
    ///
    /// # Errors
    /// `DqmError::NotFound` if a named connection is not registered.
    pub async fn test(&self, name: Option<&str>) -> Result<ProbeResult> {
        let handle = self.resolve_or_active(name)?;
        Ok(handle.probe().await)
    }

    /// Closes every pool that was opened.
    pub async fn close(&self) {
        let handles: Vec<_> = self.read_state().connections.values().cloned().collect();
        for handle in handles {
            handle.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ConnectionRegistry {
        ConnectionRegistry::new(
            ConnectionProfile::new("default", "localhost", "quality"),
            RegistryConfig::default(),
        )
        .expect("registry")
    }

    #[test]
    fn test_default_is_active() {
        let registry = registry();
        assert_eq!(registry.active_name(), "default");
        assert_eq!(registry.default_name(), "default");
        let list = registry.list();
        assert_eq!(list.len(), 1);
        assert!(list[0].is_active && list[0].is_default);
    }

    #[test]
    fn test_add_does_not_change_active() {
        let registry = registry();
        registry
            .add(ConnectionProfile::new("analytics", "db2", "analytics"))
            .expect("add");
        assert_eq!(registry.active_name(), "default");
        assert!(registry.contains("analytics"));
    }

    #[test]
    fn test_add_duplicate_name() {
        let registry = registry();
        let err = registry.add(ConnectionProfile::new("default", "other", "db"));
        assert!(matches!(err, Err(DqmError::DuplicateName { .. })));
    }

    #[test]
    fn test_switch_unknown() {
        let registry = registry();
        assert!(matches!(
            registry.switch("nope"),
            Err(DqmError::NotFound { .. })
        ));
        assert_eq!(registry.active_name(), "default");
    }

    #[test]
    fn test_captured_handle_survives_switch() {
        let registry = registry();
        registry
            .add(ConnectionProfile::new("analytics", "db2", "analytics"))
            .expect("add");

        let captured = registry.active();
        registry.switch("analytics").expect("switch");

        assert_eq!(captured.name(), "default");
        assert_eq!(registry.active().name(), "analytics");
    }

    #[test]
    fn test_remove_default_is_protected() {
        let registry = registry();
        assert!(matches!(
            registry.remove("default"),
            Err(DqmError::ProtectedConnection { .. })
        ));
    }

    #[test]
    fn test_remove_active_reverts_to_default() {
        let registry = registry();
        registry
            .add(ConnectionProfile::new("analytics", "db2", "analytics"))
            .expect("add");
        registry.switch("analytics").expect("switch");

        assert!(registry.remove("analytics").expect("remove"));
        assert_eq!(registry.active_name(), "default");
        assert!(matches!(
            registry.remove("analytics"),
            Err(DqmError::NotFound { .. })
        ));
    }

    #[test]
    fn test_removed_handle_still_usable_by_holder() {
        let registry = registry();
        registry
            .add(ConnectionProfile::new("analytics", "db2", "analytics"))
            .expect("add");
        let handle = registry.resolve("analytics").expect("resolve");
        registry.remove("analytics").expect("remove");
        assert_eq!(handle.profile().database, "analytics");
        assert!(registry.resolve("analytics").is_err());
    }

    #[test]
    fn test_list_is_sorted_and_flags_active() {
        let registry = registry();
        registry
            .add(ConnectionProfile::new("zeta", "h", "d"))
            .expect("add");
        registry
            .add(ConnectionProfile::new("alpha", "h", "d"))
            .expect("add");
        registry.switch("zeta").expect("switch");

        let list = registry.list();
        let names: Vec<_> = list.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "default", "zeta"]);
        assert!(list[2].is_active);
        assert!(!list[1].is_active);
    }

    #[tokio::test]
    async fn test_probe_unknown_name() {
        let registry = registry();
        assert!(matches!(
            registry.test(Some("ghost")).await,
            Err(DqmError::NotFound { .. })
        ));
    }
}
