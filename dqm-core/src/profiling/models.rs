//! Profiling output records.

use crate::rules::{NewRule, RuleKind, Severity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// One bucket of a value distribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueFrequency {
    /// The value as returned by the database
    pub value: JsonValue,
    /// Number of rows carrying it
    pub frequency: i64,
}

/// Most frequent values of a column, bounded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Distribution {
    /// Buckets ordered by descending frequency
    pub values: Vec<ValueFrequency>,
    /// Whether more distinct values exist than were returned
    pub truncated: bool,
}

/// Summary statistics for a numeric column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericStatistics {
    /// Smallest non-null value
    pub min: Option<f64>,
    /// Largest non-null value
    pub max: Option<f64>,
    /// Arithmetic mean
    pub mean: Option<f64>,
    /// Sample standard deviation; absent with fewer than two values
    pub stddev: Option<f64>,
}

/// Structural statistics. Non-numeric columns serialize as `"N/A"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnStatistics {
    /// Computed for numeric columns
    Numeric(NumericStatistics),
    /// Marker for columns where statistics do not apply
    NotApplicable(NotApplicable),
}

/// Serializes as the string `"N/A"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NotApplicable;

impl Serialize for NotApplicable {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("N/A")
    }
}

impl<'de> Deserialize<'de> for NotApplicable {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let marker = String::deserialize(deserializer)?;
        if marker == "N/A" {
            Ok(Self)
        } else {
            Err(serde::de::Error::custom(format!(
                "expected \"N/A\", got \"{}\"",
                marker
            )))
        }
    }
}

impl ColumnStatistics {
    /// The `N/A` marker.
    pub const fn not_applicable() -> Self {
        Self::NotApplicable(NotApplicable)
    }

    /// Numeric statistics, if computed.
    pub fn numeric(&self) -> Option<&NumericStatistics> {
        match self {
            Self::Numeric(stats) => Some(stats),
            Self::NotApplicable(_) => None,
        }
    }
}

/// Profile of one column from one profiling run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileRecord {
    /// Record identifier
    pub id: Uuid,
    /// Connection that was profiled
    pub connection: String,
    /// Table name
    pub table: String,
    /// Column name
    pub column: String,
    /// Declared type from the catalog
    pub data_type: String,
    /// Rows in the table
    pub row_count: i64,
    /// Rows where the column is NULL
    pub null_count: i64,
    /// `null_count / row_count` in percent; 0 for empty tables
    pub null_percentage: f64,
    /// Distinct non-null values that occur more than once
    pub duplicate_groups: i64,
    /// Bounded histogram of the most frequent values
    pub distribution: Distribution,
    /// Regex the column was matched against, if any
    pub pattern: Option<String>,
    /// Non-null values matching `pattern`
    pub pattern_matches: Option<i64>,
    /// Structural statistics
    pub statistics: ColumnStatistics,
    /// Checks that failed for this column; the others still ran
    #[serde(default)]
    pub errors: Vec<String>,
    /// When the column was profiled
    pub profiled_at: DateTime<Utc>,
}

impl ProfileRecord {
    /// Whether every check on this column succeeded.
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Candidate rule proposed from a profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestedRule {
    /// Proposed rule name
    pub name: String,
    /// Connection the profile came from
    pub connection: String,
    /// Target table
    pub table: String,
    /// Target column
    pub column: String,
    /// Proposed rule kind
    pub kind: RuleKind,
    /// Human readable failing-row predicate
    pub definition: String,
    /// Proposed severity
    pub severity: Severity,
    /// 0.0 to 1.0
    pub confidence: f64,
    /// Why the rule was proposed
    pub reason: String,
}

impl SuggestedRule {
    /// Rule definition that accepts this suggestion as-is.
    pub fn to_new_rule(&self) -> NewRule {
        NewRule::new(
            self.name.clone(),
            self.table.clone(),
            Some(&self.column),
            self.kind.clone(),
        )
        .on_connection(self.connection.clone())
        .with_severity(self.severity)
    }
}

/// Null percentage, 0 for empty tables.
pub(crate) fn null_percentage(null_count: i64, row_count: i64) -> f64 {
    if row_count <= 0 {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let pct = null_count as f64 / row_count as f64 * 100.0;
    pct
}
