//! DAMA dimension scoring, trends and alerts.
//!
//! Execution results are grouped by the dimension their rule kind maps to
//! and averaged by pass rate. Results with an execution error are left out:
//! they describe a rule that could not run, not data that failed.
//!
//! # Module Structure
//! - `dimension`: the nine dimensions and the rule-kind keyword table
//! - `scoring`: pure projections over a history snapshot
//! - `aggregator`: async facade reading from [`ExecutionHistory`](crate::storage::ExecutionHistory)

mod aggregator;
mod dimension;
mod scoring;

pub use aggregator::{DEFAULT_ALERT_THRESHOLD, DimensionAggregator};
pub use dimension::{Dimension, map_rule_kind_to_dimension};
pub use scoring::{
    Alert, AlertSeverity, DimensionScore, DimensionScores, TrendPoint, alerts, overview,
    table_scores, trends,
};
