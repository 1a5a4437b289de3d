//! Core of the data quality monitor.
//!
//! This crate evaluates data quality rules against relational tables and
//! turns the outcomes into DAMA dimension scores, trends and alerts. The
//! `dqm` binary is a thin shell around it.
//!
//! # Security Guarantees
//! - Table and column names reach SQL text only after an allow-list check
//!   against the target connection's catalog
//! - Every caller-supplied value is a bound parameter
//! - Credentials are zeroized on drop and never logged
//! - Profiling and rule execution are read-only
//!
//! # Architecture
//! - [`connections`]: named targets with an active pointer; operations
//!   capture one handle for their whole duration
//! - [`query`]: the validator and statement builders
//! - [`profiling`]: per-column statistics and rule suggestions
//! - [`rules`]: rule lifecycle and execution
//! - [`dama`]: dimension scoring over execution history
//! - [`storage`]: rule, history and profile stores
//! - [`adapters`]: one `DatabaseAdapter` per engine, feature-gated

pub mod adapters;
pub mod config;
pub mod connections;
pub mod dama;
pub mod error;
pub mod logging;
pub mod profiling;
pub mod query;
pub mod rules;
pub mod security;
pub mod storage;

// Re-export commonly used types
pub use adapters::{ConnectionConfig, DatabaseAdapter, EngineKind, create_adapter};
pub use config::DqmConfig;
pub use connections::{
    ConnectionDefinition, ConnectionHandle, ConnectionProfile, ConnectionRegistry,
    ConnectionSummary, ProbeResult, ProbeStatus, RegistryConfig,
};
pub use dama::{Alert, AlertSeverity, Dimension, DimensionAggregator, DimensionScore, TrendPoint};
pub use error::{DqmError, Result};
pub use profiling::{ProfileRecord, ProfileRequest, ProfilingConfig, ProfilingEngine, SuggestedRule};
pub use query::{BoundValue, QueryValidator, SchemaDescriptor, SqlDialect, Statement};
pub use rules::{
    ExecutionResult, NewRule, Rule, RuleEngine, RuleKind, RuleStatus, RuleUpdate, RulesConfig,
    Severity,
};
pub use security::Credentials;
pub use storage::{
    ExecutionHistory, HistoryFilter, JsonFileStore, MemoryStore, ProfileStore, RuleStore,
};
