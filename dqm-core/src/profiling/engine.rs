//! Column profiling against a live connection.

use super::config::ProfilingConfig;
use super::models::{
    ColumnStatistics, Distribution, NumericStatistics, ProfileRecord, SuggestedRule,
    ValueFrequency, null_percentage,
};
use crate::connections::{ConnectionHandle, ConnectionRegistry};
use crate::query::statement::{
    count_duplicate_groups, count_rows, non_null_text_values, numeric_summary, value_distribution,
};
use crate::query::{ColumnInfo, Ident, Predicate, QueryValidator, quote_identifier};
use crate::rules::{RuleKind, Severity};
use crate::storage::ProfileStore;
use crate::{DqmError, Result};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use regex::Regex;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// What to profile.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileRequest {
    /// Target connection; the active connection when `None`
    pub connection: Option<String>,
    /// Target table
    pub table: String,
    /// Columns to profile; every column when empty
    pub columns: Vec<String>,
    /// Regex counted against every column's text form
    pub pattern: Option<String>,
}

impl ProfileRequest {
    /// Profiles every column of `table` on the active connection.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Self::default()
        }
    }

    /// Builder method to pin the target connection.
    pub fn on_connection(mut self, connection: impl Into<String>) -> Self {
        self.connection = Some(connection.into());
        self
    }

    /// Builder method to restrict the profiled columns.
    pub fn with_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Builder method to set the match pattern.
    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }
}

/// Runs read-only statistical checks per column and stores the results.
pub struct ProfilingEngine {
    registry: Arc<ConnectionRegistry>,
    store: Arc<dyn ProfileStore>,
    config: ProfilingConfig,
}

impl std::fmt::Debug for ProfilingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfilingEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Inputs shared by every column check of one run.
struct TableContext<'a> {
    handle: &'a ConnectionHandle,
    validator: &'a QueryValidator,
    table: &'a Ident,
    row_count: i64,
    pattern: Option<&'a Regex>,
    scan_page_size: u32,
}

impl ProfilingEngine {
    /// Creates a profiling engine.
    ///
    /// # Errors
    /// Returns error if the configuration is invalid.
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        store: Arc<dyn ProfileStore>,
        config: ProfilingConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            registry,
            store,
            config,
        })
    }

    /// Returns the profiling configuration.
    pub fn config(&self) -> &ProfilingConfig {
        &self.config
    }

    /// Tables of `connection` (or the active connection), sorted.
    ///
    /// # Errors
    /// Returns error if the connection is unknown or its catalog unreadable.
    pub async fn list_tables(&self, connection: Option<&str>) -> Result<Vec<String>> {
        let handle = self.registry.resolve_or_active(connection)?;
        let schema = handle.schema().await?;
        Ok(schema.table_names().map(str::to_string).collect())
    }

    /// Profiles the requested columns and appends the records to the store.
    ///
    /// Records come back in schema column order. A failed check is recorded
    /// in that column's `errors`; the other checks and columns still run.
    ///
    /// # Errors
    /// - `DqmError::NotFound` for an unknown connection
    /// - `DqmError::Security` for a table or column outside the schema
    /// - `DqmError::Configuration` for an invalid pattern
    /// - `DqmError::Execution` if the table cannot be counted
    pub async fn profile_table(&self, request: &ProfileRequest) -> Result<Vec<ProfileRecord>> {
        let pattern = request
            .pattern
            .as_deref()
            .map(|p| {
                Regex::new(p)
                    .map_err(|e| DqmError::configuration(format!("invalid pattern '{}': {}", p, e)))
            })
            .transpose()?;

        let handle = self.registry.resolve_or_active(request.connection.as_deref())?;
        let validator = handle.validator().await?;
        let table = validator.validate_table(&request.table)?;

        let columns: Vec<ColumnInfo> = if request.columns.is_empty() {
            validator
                .schema()
                .columns(table.as_str())
                .map(<[ColumnInfo]>::to_vec)
                .unwrap_or_default()
        } else {
            validator
                .validate_columns(table.as_str(), &request.columns)?
                .iter()
                .filter_map(|ident| validator.schema().column(table.as_str(), ident.as_str()))
                .cloned()
                .collect()
        };

        let started = Instant::now();
        let row_count = handle
            .fetch_count(&count_rows(validator.dialect(), &table, None))
            .await?;

        tracing::info!(
            connection = %handle.name(),
            table = %table,
            columns = columns.len(),
            rows = row_count,
            "Profiling table"
        );

        let context = TableContext {
            handle: &handle,
            validator: &validator,
            table: &table,
            row_count,
            pattern: pattern.as_ref(),
            scan_page_size: self.config.scan_page_size,
        };
        let context = &context;
        let mut records: Vec<ProfileRecord> = stream::iter(columns.iter())
            .map(|column| self.profile_column(context, column))
            .buffer_unordered(self.config.max_concurrency)
            .collect()
            .await;

        records.sort_by_key(|record| {
            columns
                .iter()
                .position(|c| c.name == record.column)
                .unwrap_or(usize::MAX)
        });

        self.store.append(&records).await?;

        let failed = records.iter().filter(|r| !r.is_complete()).count();
        tracing::info!(
            table = %table,
            columns = records.len(),
            failed_columns = failed,
            duration_ms = started.elapsed().as_millis(),
            "Profiling complete"
        );
        Ok(records)
    }

    /// Stored profiles, oldest first.
    ///
    /// # Errors
    /// Returns error if the store cannot be read.
    pub async fn history(&self, table: Option<&str>) -> Result<Vec<ProfileRecord>> {
        self.store.list(table).await
    }

    async fn profile_column(&self, ctx: &TableContext<'_>, info: &ColumnInfo) -> ProfileRecord {
        let mut errors = Vec::new();
        let mut record = ProfileRecord {
            id: Uuid::new_v4(),
            connection: ctx.handle.name().to_string(),
            table: ctx.table.to_string(),
            column: info.name.clone(),
            data_type: info.data_type.clone(),
            row_count: ctx.row_count,
            null_count: 0,
            null_percentage: 0.0,
            duplicate_groups: 0,
            distribution: Distribution::default(),
            pattern: ctx.pattern.map(|p| p.as_str().to_string()),
            pattern_matches: None,
            statistics: ColumnStatistics::not_applicable(),
            errors: Vec::new(),
            profiled_at: Utc::now(),
        };

        let column = match ctx.validator.validate_column(ctx.table, &info.name) {
            Ok(column) => column,
            Err(e) => {
                record.errors.push(e.to_string());
                return record;
            }
        };
        let dialect = ctx.validator.dialect();

        match ctx
            .handle
            .fetch_count(&count_rows(dialect, ctx.table, Some(&Predicate::IsNull(column.clone()))))
            .await
        {
            Ok(nulls) => {
                record.null_count = nulls;
                record.null_percentage = null_percentage(nulls, ctx.row_count);
            }
            Err(e) => errors.push(check_error("null count", &e)),
        }

        match ctx
            .handle
            .fetch_count(&count_duplicate_groups(dialect, ctx.table, &column))
            .await
        {
            Ok(groups) => record.duplicate_groups = groups,
            Err(e) => errors.push(check_error("duplicate groups", &e)),
        }

        match self.distribution(ctx, &column).await {
            Ok(distribution) => record.distribution = distribution,
            Err(e) => errors.push(check_error("distribution", &e)),
        }

        if let Some(pattern) = ctx.pattern {
            match pattern_matches(ctx, &column, pattern).await {
                Ok(matches) => record.pattern_matches = Some(matches),
                Err(e) => errors.push(check_error("pattern", &e)),
            }
        }

        if info.is_numeric() {
            match numeric_statistics(ctx, &column).await {
                Ok(stats) => record.statistics = ColumnStatistics::Numeric(stats),
                Err(e) => errors.push(check_error("statistics", &e)),
            }
        }

        if !errors.is_empty() {
            tracing::warn!(
                table = %ctx.table,
                column = %column,
                failed_checks = errors.len(),
                "Column profiled with errors"
            );
        }
        record.errors = errors;
        record
    }

    async fn distribution(&self, ctx: &TableContext<'_>, column: &Ident) -> Result<Distribution> {
        let cap = self.config.distinct_cap;
        let statement =
            value_distribution(ctx.validator.dialect(), ctx.table, column, cap.saturating_add(1));
        let rows = ctx.handle.fetch_rows(&statement).await?;

        let truncated = rows.len() > cap as usize;
        let values = rows
            .into_iter()
            .take(cap as usize)
            .map(|mut row| ValueFrequency {
                value: row.get_mut("value").map(JsonValue::take).unwrap_or_default(),
                frequency: row.get("frequency").and_then(json_i64).unwrap_or(0),
            })
            .collect();
        Ok(Distribution { values, truncated })
    }

    /// Proposes a `null_check` for every column whose null percentage exceeds
    /// the configured threshold.
    pub fn suggest_rules(&self, records: &[ProfileRecord]) -> Vec<SuggestedRule> {
        records
            .iter()
            .filter(|record| record.null_percentage > self.config.null_threshold_pct)
            .map(|record| {
                let null_fraction = record.null_percentage / 100.0;
                SuggestedRule {
                    name: format!("{}_{}_null_check", record.table, record.column),
                    connection: record.connection.clone(),
                    table: record.table.clone(),
                    column: record.column.clone(),
                    kind: RuleKind::NullCheck,
                    definition: format!("{} IS NULL", quote_identifier(&record.column)),
                    severity: Severity::Medium,
                    confidence: (0.5 + null_fraction / 2.0).min(1.0),
                    reason: format!(
                        "{:.1}% of rows are NULL (threshold {:.1}%)",
                        record.null_percentage, self.config.null_threshold_pct
                    ),
                }
            })
            .collect()
    }
}

fn check_error(check: &str, error: &DqmError) -> String {
    format!("{}: {}", check, error.detailed_message())
}

async fn pattern_matches(ctx: &TableContext<'_>, column: &Ident, pattern: &Regex) -> Result<i64> {
    let dialect = ctx.validator.dialect();
    if dialect.supports_regex() {
        let predicate = Predicate::Matching {
            column: column.clone(),
            pattern: pattern.as_str().to_string(),
        };
        return ctx
            .handle
            .fetch_count(&count_rows(dialect, ctx.table, Some(&predicate)))
            .await;
    }

    let page_size = ctx.scan_page_size;
    let mut matches = 0_usize;
    let mut offset = 0_u64;
    loop {
        let rows = ctx
            .handle
            .fetch_rows(&non_null_text_values(dialect, ctx.table, column, page_size, offset))
            .await?;
        matches += rows
            .iter()
            .filter_map(|row| row.get("value"))
            .filter(|value| pattern.is_match(&json_text(value)))
            .count();
        if rows.len() < page_size as usize {
            break;
        }
        offset = offset.saturating_add(u64::from(page_size));
    }
    Ok(i64::try_from(matches).unwrap_or(i64::MAX))
}

async fn numeric_statistics(ctx: &TableContext<'_>, column: &Ident) -> Result<NumericStatistics> {
    let rows = ctx
        .handle
        .fetch_rows(&numeric_summary(ctx.validator.dialect(), ctx.table, column))
        .await?;
    let row = rows
        .first()
        .ok_or_else(|| DqmError::query_failed("numeric summary returned no rows"))?;
    let field = |name: &str| row.get(name).and_then(json_f64);

    let count = field("value_count").unwrap_or(0.0);
    let stddev = match (field("sum_value"), field("sum_squares")) {
        (Some(sum), Some(sum_squares)) => sample_stddev(count, sum, sum_squares),
        _ => None,
    };
    Ok(NumericStatistics {
        min: field("min_value"),
        max: field("max_value"),
        mean: field("mean_value"),
        stddev,
    })
}

/// Sample standard deviation from count, sum and sum of squares.
fn sample_stddev(count: f64, sum: f64, sum_squares: f64) -> Option<f64> {
    if count < 2.0 {
        return None;
    }
    let variance = (sum_squares - sum * sum / count) / (count - 1.0);
    Some(variance.max(0.0).sqrt())
}

fn json_f64(value: &JsonValue) -> Option<f64> {
    match value {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn json_i64(value: &JsonValue) -> Option<i64> {
    match value {
        JsonValue::Number(n) => n.as_i64(),
        JsonValue::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn json_text(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_stddev() {
        // values 2, 4, 4, 4, 5, 5, 7, 9
        let stddev = sample_stddev(8.0, 40.0, 232.0).unwrap();
        assert!((stddev - 2.138_089_935).abs() < 1e-6);
        assert!(sample_stddev(1.0, 5.0, 25.0).is_none());
        assert_eq!(sample_stddev(3.0, 3.0, 3.0), Some(0.0));
    }

    #[test]
    fn test_json_number_helpers() {
        assert_eq!(json_f64(&serde_json::json!(2.5)), Some(2.5));
        assert_eq!(json_f64(&serde_json::json!("3.25")), Some(3.25));
        assert_eq!(json_f64(&JsonValue::Null), None);
        assert_eq!(json_i64(&serde_json::json!(7)), Some(7));
        assert_eq!(json_text(&serde_json::json!(42)), "42");
        assert_eq!(json_text(&serde_json::json!("a@b.c")), "a@b.c");
    }

    #[test]
    fn test_request_builder() {
        let request = ProfileRequest::new("customers")
            .on_connection("analytics")
            .with_columns(["email", "age"])
            .with_pattern("^.+@.+$");
        assert_eq!(request.connection.as_deref(), Some("analytics"));
        assert_eq!(request.columns, vec!["email", "age"]);
        assert_eq!(request.pattern.as_deref(), Some("^.+@.+$"));
    }
}
