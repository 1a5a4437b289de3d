//! Column profiling and rule suggestion.
//!
//! Profiling is read-only: every statement goes through the query validator
//! and runs on a connection handle captured at the start of the run.
//!
//! # Module Structure
//! - `config`: concurrency, histogram cap and suggestion threshold
//! - `models`: profile records and suggested rules
//! - `engine`: the per-column checks

mod config;
mod engine;
mod models;

pub use config::ProfilingConfig;
pub use engine::{ProfileRequest, ProfilingEngine};
pub use models::{
    ColumnStatistics, Distribution, NotApplicable, NumericStatistics, ProfileRecord,
    SuggestedRule, ValueFrequency,
};
