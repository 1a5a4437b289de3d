//! Rule engine configuration.

use crate::{DqmError, Result};
use serde::{Deserialize, Serialize};

const MAX_CONCURRENCY_LIMIT: usize = 64;
const MAX_SCAN_PAGE_SIZE: u32 = 100_000;
const MAX_SAMPLE_LIMIT: u32 = 1_000;

/// Settings for rule execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// Rules executed concurrently by batch runs
    pub max_concurrency: usize,
    /// Failing rows kept on each execution result
    pub sample_limit: u32,
    /// Rows fetched per page when a pattern is evaluated client-side
    pub scan_page_size: u32,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            sample_limit: 10,
            scan_page_size: 1_000,
        }
    }
}

impl RulesConfig {
    /// Creates a new rules config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to set batch concurrency.
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

    /// Builder method to set the failing-row sample size.
    pub fn with_sample_limit(mut self, sample_limit: u32) -> Self {
        if sample_limit > MAX_SAMPLE_LIMIT {
            tracing::warn!(
                "sample_limit {} clamped to valid range [0, {}]",
                sample_limit,
                MAX_SAMPLE_LIMIT
            );
        }
        self.sample_limit = sample_limit.min(MAX_SAMPLE_LIMIT);
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
        if self.sample_limit > MAX_SAMPLE_LIMIT {
            return Err(DqmError::configuration(format!(
                "sample_limit must be at most {}, got {}",
                MAX_SAMPLE_LIMIT, self.sample_limit
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
