//! Read-side facade over execution history.

use super::scoring::{self, Alert, DimensionScores, TrendPoint};
use crate::rules::ExecutionResult;
use crate::storage::{ExecutionHistory, HistoryFilter};
use crate::{DqmError, Result};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Default score below which a dimension alerts.
pub const DEFAULT_ALERT_THRESHOLD: f64 = 70.0;

/// Converts rule outcomes into DAMA dimension scores.
///
/// Every call takes a fresh snapshot of the history; results appended while
/// a call is running may or may not be included. Nothing is cached.
pub struct DimensionAggregator {
    history: Arc<dyn ExecutionHistory>,
}

impl std::fmt::Debug for DimensionAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DimensionAggregator").finish_non_exhaustive()
    }
}

impl DimensionAggregator {
    /// Creates an aggregator over `history`.
    pub fn new(history: Arc<dyn ExecutionHistory>) -> Self {
        Self { history }
    }

    async fn snapshot(&self) -> Result<Vec<ExecutionResult>> {
        let snapshot = self.history.scan(&HistoryFilter::all()).await?;
        tracing::debug!(results = snapshot.len(), "Loaded history snapshot");
        Ok(snapshot)
    }

    /// Score per dimension across all tables.
    ///
    /// # Errors
    /// Returns error if the history cannot be read.
    pub async fn overview_scores(&self) -> Result<DimensionScores> {
        Ok(scoring::overview(&self.snapshot().await?))
    }

    /// Score per dimension for each table with history.
    ///
    /// # Errors
    /// Returns error if the history cannot be read.
    pub async fn table_scores(&self) -> Result<BTreeMap<String, DimensionScores>> {
        Ok(scoring::table_scores(&self.snapshot().await?))
    }

    /// Score per dimension for one table.
    ///
    /// # Errors
    /// `DqmError::NotFound` if the table has no completed executions;
    /// otherwise returns error if the history cannot be read.
    pub async fn table_score(&self, table: &str) -> Result<DimensionScores> {
        self.table_scores()
            .await?
            .remove(table)
            .ok_or_else(|| DqmError::not_found("Table", table))
    }

    /// Daily scores for the most recent `days` dates with history.
    ///
    /// # Errors
    /// Returns error if the history cannot be read.
    pub async fn trends(&self, days: usize) -> Result<Vec<TrendPoint>> {
        Ok(scoring::trends(&self.snapshot().await?, days))
    }

    /// Alerts for table scores strictly between 0 and `threshold`.
    ///
    /// # Errors
    /// `DqmError::Configuration` if `threshold` is outside 0 to 100; otherwise
    /// returns error if the history cannot be read.
    pub async fn alerts(&self, threshold: f64) -> Result<Vec<Alert>> {
        if !(0.0..=100.0).contains(&threshold) {
            return Err(DqmError::configuration(format!(
                "alert threshold must be between 0 and 100, got {}",
                threshold
            )));
        }
        let scores = scoring::table_scores(&self.snapshot().await?);
        let alerts = scoring::alerts(&scores, threshold);
        if !alerts.is_empty() {
            tracing::info!(count = alerts.len(), threshold, "Dimension alerts raised");
        }
        Ok(alerts)
    }
}
