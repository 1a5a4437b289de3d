//! Score projections over an execution-history snapshot.
//!
//! Everything here is a pure function of the slice it is given, so the same
//! history always yields the same scores.

use super::dimension::{Dimension, map_rule_kind_to_dimension};
use crate::rules::ExecutionResult;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Average pass rate of one dimension over some scope.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DimensionScore {
    /// 0 to 100, two decimals; 0.0 when there were no samples
    pub score: f64,
    /// Execution results averaged
    pub sample_count: usize,
}

impl DimensionScore {
    /// Score of a dimension with no samples.
    pub const EMPTY: Self = Self {
        score: 0.0,
        sample_count: 0,
    };

    /// Whether any execution contributed.
    pub const fn has_data(&self) -> bool {
        self.sample_count > 0
    }
}

/// Scores keyed by dimension, always holding all nine dimensions.
pub type DimensionScores = BTreeMap<Dimension, DimensionScore>;

/// Scores for one UTC calendar day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
    /// Execution date (UTC)
    pub date: NaiveDate,
    /// Scores of that day's executions
    pub scores: DimensionScores,
}

/// Alert tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    /// Score below 50
    High,
    /// Score from 50 up to the threshold
    Medium,
    /// Score at or above the threshold
    Low,
}

impl AlertSeverity {
    /// Tier for `score` against `threshold`.
    pub fn classify(score: f64, threshold: f64) -> Self {
        if score < 50.0 {
            Self::High
        } else if score < threshold {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

impl std::fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        };
        f.write_str(label)
    }
}

/// A (table, dimension) pair scoring below the threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// Table the score belongs to
    pub table: String,
    /// Degraded dimension
    pub dimension: Dimension,
    /// Current score
    pub score: f64,
    /// Threshold it was compared with
    pub threshold: f64,
    /// Tier
    pub severity: AlertSeverity,
}

#[derive(Debug, Default, Clone, Copy)]
struct Accumulator {
    sum: f64,
    count: usize,
}

impl Accumulator {
    fn add(&mut self, pass_rate: f64) {
        self.sum += pass_rate;
        self.count += 1;
    }

    fn finish(self) -> DimensionScore {
        if self.count == 0 {
            return DimensionScore::EMPTY;
        }
        #[allow(clippy::cast_precision_loss)]
        let mean = self.sum / self.count as f64;
        DimensionScore {
            score: round2(mean),
            sample_count: self.count,
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Results that count toward scores: completed runs of a mapped kind.
fn scored(results: &[ExecutionResult]) -> impl Iterator<Item = (Dimension, &ExecutionResult)> {
    results
        .iter()
        .filter(|result| !result.is_error())
        .filter_map(|result| {
            map_rule_kind_to_dimension(result.rule_kind.as_str()).map(|d| (d, result))
        })
}

fn finish(accumulators: BTreeMap<Dimension, Accumulator>) -> DimensionScores {
    Dimension::ALL
        .into_iter()
        .map(|dimension| {
            let score = accumulators
                .get(&dimension)
                .copied()
                .unwrap_or_default()
                .finish();
            (dimension, score)
        })
        .collect()
}

/// Average pass rate per dimension across every result.
pub fn overview(results: &[ExecutionResult]) -> DimensionScores {
    let mut accumulators: BTreeMap<Dimension, Accumulator> = BTreeMap::new();
    for (dimension, result) in scored(results) {
        accumulators
            .entry(dimension)
            .or_default()
            .add(result.pass_rate);
    }
    finish(accumulators)
}

/// Average pass rate per dimension for every table with history.
pub fn table_scores(results: &[ExecutionResult]) -> BTreeMap<String, DimensionScores> {
    let mut per_table: BTreeMap<String, BTreeMap<Dimension, Accumulator>> = BTreeMap::new();
    for result in results.iter().filter(|r| !r.is_error()) {
        let accumulators = per_table.entry(result.table.clone()).or_default();
        if let Some(dimension) = map_rule_kind_to_dimension(result.rule_kind.as_str()) {
            accumulators
                .entry(dimension)
                .or_default()
                .add(result.pass_rate);
        }
    }
    per_table
        .into_iter()
        .map(|(table, accumulators)| (table, finish(accumulators)))
        .collect()
}

/// Per-day scores, ascending by date, limited to the most recent `days`
/// dates that have history.
pub fn trends(results: &[ExecutionResult], days: usize) -> Vec<TrendPoint> {
    let mut per_day: BTreeMap<NaiveDate, BTreeMap<Dimension, Accumulator>> = BTreeMap::new();
    for (dimension, result) in scored(results) {
        per_day
            .entry(result.executed_at.date_naive())
            .or_default()
            .entry(dimension)
            .or_default()
            .add(result.pass_rate);
    }
    let skip = per_day.len().saturating_sub(days);
    per_day
        .into_iter()
        .skip(skip)
        .map(|(date, accumulators)| TrendPoint {
            date,
            scores: finish(accumulators),
        })
        .collect()
}

/// Alerts for every table score with `0 < score < threshold`, worst first.
///
/// A score of exactly 0 means the dimension has no data for that table and
/// never alerts.
pub fn alerts(scores: &BTreeMap<String, DimensionScores>, threshold: f64) -> Vec<Alert> {
    let mut alerts: Vec<Alert> = scores
        .iter()
        .flat_map(|(table, dimensions)| {
            dimensions
                .iter()
                .filter(|(_, s)| s.score > 0.0 && s.score < threshold)
                .map(move |(dimension, s)| Alert {
                    table: table.clone(),
                    dimension: *dimension,
                    score: s.score,
                    threshold,
                    severity: AlertSeverity::classify(s.score, threshold),
                })
        })
        .collect();
    alerts.sort_by(|a, b| {
        a.score
            .total_cmp(&b.score)
            .then_with(|| a.table.cmp(&b.table))
            .then_with(|| a.dimension.cmp(&b.dimension))
    });
    alerts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::test_support::result;
    use chrono::{TimeZone, Utc};

    fn at(day: u32) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, day, 10, 0, 0).unwrap()
    }

    #[test]
    fn test_overview_averages_pass_rates() {
        let history = vec![
            result("null_check", "customers", 2, 10, at(1)),
            result("null_check", "orders", 4, 10, at(1)),
        ];
        let scores = overview(&history);
        assert_eq!(scores.len(), 9);
        assert!((scores[&Dimension::Completeness].score - 70.0).abs() < f64::EPSILON);
        assert_eq!(scores[&Dimension::Completeness].sample_count, 2);
        assert_eq!(scores[&Dimension::Validity], DimensionScore::EMPTY);
    }

    #[test]
    fn test_errored_and_unmapped_results_are_excluded() {
        let mut errored = result("null_check", "customers", 0, 0, at(1));
        errored.error = Some("connection refused".into());
        errored.pass_rate = 0.0;
        let history = vec![
            errored,
            result("null_check", "customers", 0, 10, at(1)),
            result("volume_check", "customers", 5, 10, at(1)),
        ];
        let scores = overview(&history);
        assert!((scores[&Dimension::Completeness].score - 100.0).abs() < f64::EPSILON);
        assert_eq!(scores[&Dimension::Completeness].sample_count, 1);
        assert_eq!(
            scores.values().map(|s| s.sample_count).sum::<usize>(),
            1
        );
    }

    #[test]
    fn test_scores_round_to_two_decimals() {
        let history = vec![
            result("null_check", "t", 1, 3, at(1)),
            result("null_check", "t", 0, 3, at(1)),
            result("null_check", "t", 0, 3, at(1)),
        ];
        // (66.666.. + 100 + 100) / 3 = 88.888..
        assert!((overview(&history)[&Dimension::Completeness].score - 88.89).abs() < 1e-9);
    }

    #[test]
    fn test_table_scores_include_all_dimensions() {
        let history = vec![
            result("range_check", "orders", 35, 100, at(1)),
            result("volume_check", "audit", 0, 10, at(1)),
        ];
        let scores = table_scores(&history);
        assert_eq!(scores.len(), 2);
        assert!((scores["orders"][&Dimension::Validity].score - 65.0).abs() < f64::EPSILON);
        assert!(scores["audit"].values().all(|s| !s.has_data()));
    }

    #[test]
    fn test_trends_keep_most_recent_days_ascending() {
        let history = vec![
            result("null_check", "customers", 0, 10, at(3)),
            result("null_check", "customers", 5, 10, at(1)),
            result("null_check", "customers", 1, 10, at(2)),
        ];
        let points = trends(&history, 2);
        let dates: Vec<_> = points.iter().map(|p| p.date.to_string()).collect();
        assert_eq!(dates, vec!["2024-05-02", "2024-05-03"]);
        assert!((points[0].scores[&Dimension::Completeness].score - 90.0).abs() < f64::EPSILON);
        assert!(trends(&history, 0).is_empty());
        assert_eq!(trends(&history, 10).len(), 3);
    }

    #[test]
    fn test_alerts_skip_zero_and_sort_worst_first() {
        let mut orders = finish(BTreeMap::new());
        orders.insert(
            Dimension::Validity,
            DimensionScore {
                score: 65.0,
                sample_count: 1,
            },
        );
        let mut customers = finish(BTreeMap::new());
        customers.insert(
            Dimension::Uniqueness,
            DimensionScore {
                score: 40.0,
                sample_count: 2,
            },
        );
        customers.insert(
            Dimension::Completeness,
            DimensionScore {
                score: 95.0,
                sample_count: 2,
            },
        );
        let scores = BTreeMap::from([
            ("orders".to_string(), orders),
            ("customers".to_string(), customers),
        ]);

        let found = alerts(&scores, 70.0);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].table, "customers");
        assert_eq!(found[0].severity, AlertSeverity::High);
        assert_eq!(found[1].dimension, Dimension::Validity);
        assert_eq!(found[1].severity, AlertSeverity::Medium);
    }

    #[test]
    fn test_alert_severity_tiers() {
        assert_eq!(AlertSeverity::classify(49.99, 70.0), AlertSeverity::High);
        assert_eq!(AlertSeverity::classify(50.0, 70.0), AlertSeverity::Medium);
        assert_eq!(AlertSeverity::classify(70.0, 70.0), AlertSeverity::Low);
    }
}
