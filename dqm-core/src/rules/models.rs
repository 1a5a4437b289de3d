//! Rule and execution result data structures.

use crate::{DqmError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use uuid::Uuid;

/// What a rule checks.
///
/// Kinds serialize as snake_case strings; any unrecognized string becomes a
/// custom kind whose violations are described by equality filters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RuleKind {
    /// Column must not be NULL
    NullCheck,
    /// Non-null column values must be unique
    UniquenessCheck,
    /// Column values must fall within `min`/`max`
    RangeCheck,
    /// Column values must match `pattern`
    PatternCheck,
    /// Column values must exist in `reference_table.reference_column`
    ForeignKeyCheck,
    /// Open-ended kind; rows matching `filters` are violations
    Custom(String),
}

impl RuleKind {
    /// Canonical string form.
    pub fn as_str(&self) -> &str {
        match self {
            Self::NullCheck => "null_check",
            Self::UniquenessCheck => "uniqueness_check",
            Self::RangeCheck => "range_check",
            Self::PatternCheck => "pattern_check",
            Self::ForeignKeyCheck => "foreign_key_check",
            Self::Custom(kind) => kind,
        }
    }
}

impl From<String> for RuleKind {
    fn from(value: String) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "null_check" => Self::NullCheck,
            "uniqueness_check" | "unique_check" => Self::UniquenessCheck,
            "range_check" => Self::RangeCheck,
            "pattern_check" => Self::PatternCheck,
            "foreign_key_check" => Self::ForeignKeyCheck,
            _ => Self::Custom(value),
        }
    }
}

impl From<&str> for RuleKind {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<RuleKind> for String {
    fn from(kind: RuleKind) -> Self {
        match kind {
            RuleKind::Custom(kind) => kind,
            other => other.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for RuleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How serious a violation is.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Must be fixed immediately
    Critical,
    /// Significant impact
    High,
    /// Moderate impact
    #[default]
    Medium,
    /// Minor impact
    Low,
    /// Informational only
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::Info => "info",
        };
        f.write_str(label)
    }
}

impl std::str::FromStr for Severity {
    type Err = DqmError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "critical" => Ok(Self::Critical),
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            "info" => Ok(Self::Info),
            other => Err(DqmError::configuration(format!("unknown severity '{}'", other))),
        }
    }
}

/// Lifecycle state of a rule.
///
/// `active ⇄ inactive`, `active → deleted`. Deleted is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleStatus {
    /// Executed by batch runs
    Active,
    /// Kept but skipped by batch runs
    Inactive,
    /// Soft-deleted; history stays queryable
    Deleted,
}

impl RuleStatus {
    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Active, Self::Inactive)
                | (Self::Inactive, Self::Active)
                | (Self::Active, Self::Deleted)
        )
    }
}

impl std::fmt::Display for RuleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Deleted => "deleted",
        };
        f.write_str(label)
    }
}

/// A stored data quality rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    /// Assigned on creation, never changes
    pub id: Uuid,
    /// Human readable name
    pub name: String,
    /// Connection the rule runs against
    pub connection: String,
    /// Target table
    pub table: String,
    /// Target column
    pub column: Option<String>,
    /// What the rule checks
    pub kind: RuleKind,
    /// Kind-specific parameters
    #[serde(default)]
    pub parameters: BTreeMap<String, JsonValue>,
    /// Severity of violations
    pub severity: Severity,
    /// Parameterized failing-row count statement, as validated at the last
    /// create or update
    pub definition: String,
    /// Lifecycle state
    pub status: RuleStatus,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

impl Rule {
    /// Whether batch runs pick this rule up.
    pub fn is_active(&self) -> bool {
        self.status == RuleStatus::Active
    }
}

/// Input for creating a rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRule {
    /// Human readable name
    pub name: String,
    /// Target connection; the active connection when omitted
    #[serde(default)]
    pub connection: Option<String>,
    /// Target table
    pub table: String,
    /// Target column
    #[serde(default)]
    pub column: Option<String>,
    /// What the rule checks
    pub kind: RuleKind,
    /// Kind-specific parameters
    #[serde(default)]
    pub parameters: BTreeMap<String, JsonValue>,
    /// Severity of violations
    #[serde(default)]
    pub severity: Severity,
}

impl NewRule {
    /// Creates a rule definition with no parameters and medium severity.
    pub fn new(
        name: impl Into<String>,
        table: impl Into<String>,
        column: Option<&str>,
        kind: RuleKind,
    ) -> Self {
        Self {
            name: name.into(),
            connection: None,
            table: table.into(),
            column: column.map(str::to_string),
            kind,
            parameters: BTreeMap::new(),
            severity: Severity::default(),
        }
    }

    /// Builder method to pin the target connection.
    pub fn on_connection(mut self, connection: impl Into<String>) -> Self {
        self.connection = Some(connection.into());
        self
    }

    /// Builder method to add a parameter.
    pub fn with_parameter(mut self, key: impl Into<String>, value: JsonValue) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }

    /// Builder method to set severity.
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }
}

/// Partial update of a rule. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleUpdate {
    /// New name
    pub name: Option<String>,
    /// New target table
    pub table: Option<String>,
    /// New target column (`Some(None)` clears it)
    pub column: Option<Option<String>>,
    /// New kind
    pub kind: Option<RuleKind>,
    /// Replacement parameters
    pub parameters: Option<BTreeMap<String, JsonValue>>,
    /// New severity
    pub severity: Option<Severity>,
}

/// One recorded execution of a rule.
///
/// Results are append-only. A result with `error` set means the rule could
/// not run; it says nothing about the data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Result identifier
    pub id: Uuid,
    /// Rule that was executed
    pub rule_id: Uuid,
    /// Rule name at execution time
    pub rule_name: String,
    /// Rule kind at execution time
    pub rule_kind: RuleKind,
    /// Severity at execution time
    pub severity: Severity,
    /// Connection the statements ran on
    pub connection: String,
    /// Target table
    pub table: String,
    /// Target column
    pub column: Option<String>,
    /// Execution time
    pub executed_at: DateTime<Utc>,
    /// `failing_row_count == 0`; false when the rule could not run
    pub passed: bool,
    /// Rows violating the rule
    pub failing_row_count: i64,
    /// Rows in the target table
    pub total_row_count: i64,
    /// Share of passing rows, 0 to 100
    pub pass_rate: f64,
    /// First failing rows, bounded
    #[serde(default)]
    pub failing_sample: Vec<JsonValue>,
    /// Why the rule could not run
    #[serde(default)]
    pub error: Option<String>,
    /// Wall clock time spent
    #[serde(default)]
    pub duration_ms: u64,
}

impl ExecutionResult {
    /// Whether the rule ran to completion.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Pass rate in percent. An empty table passes.
pub fn pass_rate(failing: i64, total: i64) -> f64 {
    if total <= 0 {
        return 100.0;
    }
    let passing = total.saturating_sub(failing).max(0);
    #[allow(clippy::cast_precision_loss)]
    let rate = passing as f64 / total as f64 * 100.0;
    rate
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_kind_round_trip_strings() {
        assert_eq!(RuleKind::from("null_check"), RuleKind::NullCheck);
        assert_eq!(RuleKind::from("unique_check"), RuleKind::UniquenessCheck);
        assert_eq!(RuleKind::from("Range_Check"), RuleKind::RangeCheck);
        assert_eq!(
            RuleKind::from("business_rule"),
            RuleKind::Custom("business_rule".into())
        );
        assert_eq!(
            serde_json::to_string(&RuleKind::ForeignKeyCheck).unwrap(),
            "\"foreign_key_check\""
        );
        let kind: RuleKind = serde_json::from_str("\"freshness_check\"").unwrap();
        assert_eq!(kind.as_str(), "freshness_check");
    }

    #[test]
    fn test_status_transitions() {
        use RuleStatus::*;
        assert!(Active.can_transition_to(Inactive));
        assert!(Inactive.can_transition_to(Active));
        assert!(Active.can_transition_to(Deleted));
        assert!(!Inactive.can_transition_to(Deleted));
        assert!(!Deleted.can_transition_to(Active));
        assert!(!Deleted.can_transition_to(Inactive));
        assert!(!Active.can_transition_to(Active));
    }

    #[test]
    fn test_pass_rate() {
        assert!((pass_rate(2, 10) - 80.0).abs() < f64::EPSILON);
        assert!((pass_rate(0, 0) - 100.0).abs() < f64::EPSILON);
        assert!((pass_rate(5, 5)).abs() < f64::EPSILON);
    }

    #[test]
    fn test_severity_parse_and_order() {
        assert_eq!("HIGH".parse::<Severity>().ok(), Some(Severity::High));
        assert!("urgent".parse::<Severity>().is_err());
        assert!(Severity::Critical < Severity::Info);
        assert_eq!(Severity::default(), Severity::Medium);
    }
}
