//! Profiling configuration.

use crate::{DqmError, Result};
use serde::{Deserialize, Serialize};

const MAX_CONCURRENCY_LIMIT: usize = 64;
const MAX_SCAN_PAGE_SIZE: u32 = 100_000;
const MAX_DISTINCT_CAP: u32 = 10_000;

/// Settings for column profiling and rule suggestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfilingConfig {
    /// Columns profiled concurrently
    pub max_concurrency: usize,
    /// Maximum buckets in a value distribution
    pub distinct_cap: u32,
    /// Null percentage above which a `null_check` is suggested (0-100)
    pub null_threshold_pct: f64,
    /// Rows fetched per page when a pattern is counted client-side
    pub scan_page_size: u32,
}

impl Default for ProfilingConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            distinct_cap: 50,
            null_threshold_pct: 10.0,
            scan_page_size: 1_000,
        }
    }
}

impl ProfilingConfig {
    /// Creates a new profiling config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to set column concurrency.
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        if !(1..=MAX_CONCURRENCY_LIMIT).contains(&max_concurrency) {
            tracing::warn!(
                "max_concurrency {} clamped to valid range [1, {}]",
                max_concurrency,
                MAX_CONCURRENCY_LIMIT
            );
        }
        self.max_concurrency = max_concurrency.clamp(1, MAX_CONCURRENCY_LIMIT);
        self
    }

    /// Builder method to set the distribution cap.
    pub fn with_distinct_cap(mut self, distinct_cap: u32) -> Self {
        if !(1..=MAX_DISTINCT_CAP).contains(&distinct_cap) {
            tracing::warn!(
                "distinct_cap {} clamped to valid range [1, {}]",
                distinct_cap,
                MAX_DISTINCT_CAP
            );
        }
        self.distinct_cap = distinct_cap.clamp(1, MAX_DISTINCT_CAP);
        self
    }

    /// Builder method to set the null suggestion threshold.
    pub fn with_null_threshold_pct(mut self, threshold: f64) -> Self {
        if !(0.0..=100.0).contains(&threshold) {
            tracing::warn!(
                "null_threshold_pct {} clamped to valid range [0.0, 100.0]",
                threshold
            );
        }
        self.null_threshold_pct = threshold.clamp(0.0, 100.0);
        self
    }

    /// Builder method to set the client-side scan page size.
    pub fn with_scan_page_size(mut self, scan_page_size: u32) -> Self {
        if !(1..=MAX_SCAN_PAGE_SIZE).contains(&scan_page_size) {
            tracing::warn!(
                "scan_page_size {} clamped to valid range [1, {}]",
                scan_page_size,
                MAX_SCAN_PAGE_SIZE
            );
        }
        self.scan_page_size = scan_page_size.clamp(1, MAX_SCAN_PAGE_SIZE);
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns error if any setting is out of range.
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_CONCURRENCY_LIMIT).contains(&self.max_concurrency) {
            return Err(DqmError::configuration(format!(
                "max_concurrency must be between 1 and {}, got {}",
                MAX_CONCURRENCY_LIMIT, self.max_concurrency
            )));
        }
        if !(1..=MAX_DISTINCT_CAP).contains(&self.distinct_cap) {
            return Err(DqmError::configuration(format!(
                "distinct_cap must be between 1 and {}, got {}",
                MAX_DISTINCT_CAP, self.distinct_cap
            )));
        }
        if !(0.0..=100.0).contains(&self.null_threshold_pct) {
            return Err(DqmError::configuration(format!(
                "null_threshold_pct must be between 0.0 and 100.0, got {}",
                self.null_threshold_pct
            )));
        }
        if !(1..=MAX_SCAN_PAGE_SIZE).contains(&self.scan_page_size) {
            return Err(DqmError::configuration(format!(
                "scan_page_size must be between 1 and {}, got {}",
                MAX_SCAN_PAGE_SIZE, self.scan_page_size
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ProfilingConfig::default();
        assert_eq!(config.max_concurrency, 4);
        assert_eq!(config.distinct_cap, 50);
        assert!((config.null_threshold_pct - 10.0).abs() < f64::EPSILON);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builders_clamp() {
        let config = ProfilingConfig::new()
            .with_max_concurrency(0)
            .with_distinct_cap(0)
            .with_null_threshold_pct(150.0);
        assert_eq!(config.max_concurrency, 1);
        assert_eq!(config.distinct_cap, 1);
        assert!((config.null_threshold_pct - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let config = ProfilingConfig {
            null_threshold_pct: -1.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_deserialize_partial() {
        let config: ProfilingConfig = serde_json::from_str(r#"{"distinct_cap": 20}"#).unwrap();
        assert_eq!(config.distinct_cap, 20);
        assert_eq!(config.max_concurrency, 4);
    }
}
