//! Runtime connection registry.
//!
//! # Module Structure
//! - `profile`: connection profiles, summaries and the serialized definition
//! - `config`: registry-wide settings
//! - `handle`: per-connection adapter, schema cache and in-flight limit
//! - `registry`: the named set with its active pointer

mod config;
mod handle;
mod profile;
mod registry;

pub use config::RegistryConfig;
pub use handle::{ConnectionHandle, ProbeResult, ProbeStatus};
pub use profile::{ConnectionDefinition, ConnectionProfile, ConnectionSummary, DEFAULT_PORT};
pub use registry::ConnectionRegistry;
