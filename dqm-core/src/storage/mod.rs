//! Persistence interfaces for rules, execution history and profiles.
//!
//! The engines only see the traits defined here. Two implementations ship
//! with the crate:
//! - [`MemoryStore`]: process-local, for tests and embedding
//! - [`JsonFileStore`]: durable, one directory per installation

mod file;
mod memory;

pub use file::JsonFileStore;
pub use memory::MemoryStore;

use crate::Result;
use crate::profiling::ProfileRecord;
use crate::rules::{ExecutionResult, Rule, RuleKind};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Storage for rule definitions.
#[async_trait]
pub trait RuleStore: Send + Sync {
    /// Stores a new rule.
    ///
    /// # Errors
    /// `DqmError::Storage` if a rule with the same id exists.
    async fn insert(&self, rule: Rule) -> Result<()>;

    /// Replaces an existing rule.
    ///
    /// # Errors
    /// `DqmError::NotFound` if no rule has this id.
    async fn update(&self, rule: Rule) -> Result<()>;

    /// Looks up a rule, including deleted ones.
    async fn get(&self, id: Uuid) -> Result<Option<Rule>>;

    /// All rules in creation order, including deleted ones.
    async fn list(&self) -> Result<Vec<Rule>>;
}

/// Append-only log of rule executions.
#[async_trait]
pub trait ExecutionHistory: Send + Sync {
    /// Appends a result.
    async fn append(&self, result: ExecutionResult) -> Result<()>;

    /// Results matching `filter`, oldest first. The returned vector is a
    /// snapshot; later appends do not affect it.
    async fn scan(&self, filter: &HistoryFilter) -> Result<Vec<ExecutionResult>>;

    /// Looks up one result.
    async fn get(&self, id: Uuid) -> Result<Option<ExecutionResult>>;
}

/// Append-only log of column profiles.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Appends the records of one profiling run.
    async fn append(&self, records: &[ProfileRecord]) -> Result<()>;

    /// Stored profiles, oldest first, optionally for one table only.
    async fn list(&self, table: Option<&str>) -> Result<Vec<ProfileRecord>>;
}

/// Criteria for [`ExecutionHistory::scan`]. Empty criteria match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryFilter {
    /// Only results of this rule
    pub rule_id: Option<Uuid>,
    /// Only results of this rule kind
    pub rule_kind: Option<RuleKind>,
    /// Only results for this table
    pub table: Option<String>,
    /// Only results executed at or after this instant
    pub since: Option<DateTime<Utc>>,
    /// Only results executed before this instant
    pub until: Option<DateTime<Utc>>,
}

impl HistoryFilter {
    /// Filter that matches every result.
    pub fn all() -> Self {
        Self::default()
    }

    /// Builder method to restrict to one rule.
    pub fn with_rule(mut self, rule_id: Uuid) -> Self {
        self.rule_id = Some(rule_id);
        self
    }

    /// Builder method to restrict to one rule kind.
    pub fn with_kind(mut self, kind: RuleKind) -> Self {
        self.rule_kind = Some(kind);
        self
    }

    /// Builder method to restrict to one table.
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Builder method to restrict to `[since, until)`.
    pub fn between(mut self, since: Option<DateTime<Utc>>, until: Option<DateTime<Utc>>) -> Self {
        self.since = since;
        self.until = until;
        self
    }

    /// Whether `result` satisfies every criterion.
    pub fn matches(&self, result: &ExecutionResult) -> bool {
        self.rule_id.is_none_or(|id| result.rule_id == id)
            && self
                .rule_kind
                .as_ref()
                .is_none_or(|kind| &result.rule_kind == kind)
            && self
                .table
                .as_deref()
                .is_none_or(|table| result.table == table)
            && self.since.is_none_or(|since| result.executed_at >= since)
            && self.until.is_none_or(|until| result.executed_at < until)
    }
}
