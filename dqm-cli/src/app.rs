//! Wiring of configuration, registry, stores and engines for one invocation.

use crate::SourceArgs;
use anyhow::Context;
use dqm_core::{
    ConnectionRegistry, DimensionAggregator, DqmConfig, ExecutionHistory, JsonFileStore,
    MemoryStore, ProfileStore, ProfilingEngine, RuleEngine, RuleStore,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Everything a command needs.
pub struct App {
    /// Loaded configuration
    pub config: DqmConfig,
    /// Connection registry
    pub registry: Arc<ConnectionRegistry>,
    /// Rule lifecycle and execution
    pub rules: RuleEngine,
    /// Column profiling
    pub profiler: ProfilingEngine,
    /// DAMA scoring over the execution history
    pub aggregator: DimensionAggregator,
}

struct Stores {
    rules: Arc<dyn RuleStore>,
    history: Arc<dyn ExecutionHistory>,
    profiles: Arc<dyn ProfileStore>,
}

impl App {
    /// Loads configuration and connections and builds the engines.
    ///
    /// # Errors
    /// Returns error if a file cannot be read, the configuration is invalid,
    /// no connection is configured, or `--connection` names an unknown
    /// connection.
    pub async fn from_sources(sources: &SourceArgs) -> anyhow::Result<Self> {
        let mut config = match &sources.config {
            Some(path) => DqmConfig::load(path)
                .await
                .with_context(|| format!("loading configuration from {}", path.display()))?,
            None => DqmConfig::default(),
        };
        if let Some(path) = &sources.connections {
            let connections = DqmConfig::load_connections(path)
                .await
                .with_context(|| format!("loading connections from {}", path.display()))?;
            config.connections.extend(connections);
        }
        if config.connections.is_empty() {
            anyhow::bail!(
                "no connections configured; pass --connections or a --config file with connections"
            );
        }

        let registry = Arc::new(config.build_registry()?);
        if let Some(name) = &sources.connection {
            registry
                .switch(name)
                .with_context(|| format!("selecting connection '{}'", name))?;
        }
        info!(active = %registry.active_name(), "Connection registry ready");

        let stores = match &sources.store {
            Some(dir) => {
                let store = Arc::new(JsonFileStore::open(dir).await?);
                debug!(dir = %dir.display(), "Using file store");
                Stores {
                    rules: store.clone(),
                    history: store.clone(),
                    profiles: store,
                }
            }
            None => {
                warn!("No --store given; rules and history last only for this command");
                let store = Arc::new(MemoryStore::new());
                Stores {
                    rules: store.clone(),
                    history: store.clone(),
                    profiles: store,
                }
            }
        };

        let rules = RuleEngine::new(
            Arc::clone(&registry),
            stores.rules,
            Arc::clone(&stores.history),
            config.rules.clone(),
        )?;
        let profiler =
            ProfilingEngine::new(Arc::clone(&registry), stores.profiles, config.profiling.clone())?;
        let aggregator = DimensionAggregator::new(stores.history);

        Ok(Self {
            config,
            registry,
            rules,
            profiler,
            aggregator,
        })
    }

    /// Closes every connection pool.
    pub async fn shutdown(&self) {
        self.registry.close().await;
    }
}
