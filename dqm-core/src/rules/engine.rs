//! Rule lifecycle and execution.

use super::compile::{Check, CompiledRule, compile};
use super::config::RulesConfig;
use super::models::{
    ExecutionResult, NewRule, Rule, RuleKind, RuleStatus, RuleUpdate, pass_rate,
};
use crate::connections::{ConnectionHandle, ConnectionRegistry};
use crate::query::Ident;
use crate::storage::{ExecutionHistory, HistoryFilter, RuleStore};
use crate::{DqmError, Result};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Stores rule definitions and runs them against their connections.
///
/// Mutations (create, update, transitions) are serialized; executions are
/// not, and only read the rule they were given.
pub struct RuleEngine {
    registry: Arc<ConnectionRegistry>,
    rules: Arc<dyn RuleStore>,
    history: Arc<dyn ExecutionHistory>,
    config: RulesConfig,
    mutations: Mutex<()>,
}

impl std::fmt::Debug for RuleEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

const UPDATE_ATTEMPTS: usize = 3;

fn apply_update(rule: &mut Rule, changes: &RuleUpdate) {
    if let Some(name) = &changes.name {
        rule.name = name.clone();
    }
    if let Some(table) = &changes.table {
        rule.table = table.clone();
    }
    if let Some(column) = &changes.column {
        rule.column = column.clone();
    }
    if let Some(kind) = &changes.kind {
        rule.kind = kind.clone();
    }
    if let Some(parameters) = &changes.parameters {
        rule.parameters = parameters.clone();
    }
    if let Some(severity) = changes.severity {
        rule.severity = severity;
    }
}

fn row_text(row: &JsonValue, column: &Ident) -> String {
    match row.get(column.as_str()) {
        Some(JsonValue::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

/// Counts and sample gathered by one execution.
struct Outcome {
    failing: i64,
    total: i64,
    sample: Vec<JsonValue>,
}

impl RuleEngine {
    /// Creates a rule engine.
    ///
    /// # Errors
    /// Returns error if the configuration is invalid.
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        rules: Arc<dyn RuleStore>,
        history: Arc<dyn ExecutionHistory>,
        config: RulesConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            registry,
            rules,
            history,
            config,
            mutations: Mutex::new(()),
        })
    }

    /// Returns the rules configuration.
    pub fn config(&self) -> &RulesConfig {
        &self.config
    }

    /// The execution history this engine appends to.
    pub fn history(&self) -> Arc<dyn ExecutionHistory> {
        Arc::clone(&self.history)
    }

    async fn compile_on(
        handle: &ConnectionHandle,
        table: &str,
        column: Option<&str>,
        kind: &RuleKind,
        parameters: &BTreeMap<String, JsonValue>,
    ) -> Result<CompiledRule> {
        let validator = handle.validator().await?;
        compile(&validator, table, column, kind, parameters)
    }

    /// Validates and stores a new active rule.
    ///
    /// The target connection is `new_rule.connection`, or the connection
    /// active at the time of the call.
    ///
    /// # Errors
    /// - `DqmError::NotFound` for an unknown connection
    /// - `DqmError::Security` for identifiers outside the schema
    /// - `DqmError::Configuration` for invalid parameters
    pub async fn create(&self, new_rule: NewRule) -> Result<Rule> {
        let handle = self
            .registry
            .resolve_or_active(new_rule.connection.as_deref())?;
        let compiled = Self::compile_on(
            &handle,
            &new_rule.table,
            new_rule.column.as_deref(),
            &new_rule.kind,
            &new_rule.parameters,
        )
        .await?;

        let now = Utc::now();
        let rule = Rule {
            id: Uuid::new_v4(),
            name: new_rule.name,
            connection: handle.name().to_string(),
            table: new_rule.table,
            column: new_rule.column,
            kind: new_rule.kind,
            parameters: new_rule.parameters,
            severity: new_rule.severity,
            definition: compiled.definition(),
            status: RuleStatus::Active,
            created_at: now,
            updated_at: now,
        };

        let _guard = self.mutations.lock().await;
        self.rules.insert(rule.clone()).await?;
        tracing::info!(
            rule_id = %rule.id,
            name = %rule.name,
            kind = %rule.kind,
            table = %rule.table,
            connection = %rule.connection,
            "Created rule"
        );
        Ok(rule)
    }

    /// Applies `changes` after re-validating the resulting rule.
    ///
    /// Validation runs outside the mutation lock. If the rule changed in the
    /// meantime the update is recompiled against the newer copy.
    ///
    /// # Errors
    /// - `DqmError::NotFound` for unknown or deleted rules
    /// - same validation errors as [`create`](Self::create)
    /// - `DqmError::Storage` if the rule keeps changing underneath the update
    pub async fn update(&self, id: Uuid, changes: RuleUpdate) -> Result<Rule> {
        for _ in 0..UPDATE_ATTEMPTS {
            let current = self.get(id).await?;
            let mut rule = current.clone();
            apply_update(&mut rule, &changes);

            let handle = self.registry.resolve(&rule.connection)?;
            let compiled = Self::compile_on(
                &handle,
                &rule.table,
                rule.column.as_deref(),
                &rule.kind,
                &rule.parameters,
            )
            .await?;

            let _guard = self.mutations.lock().await;
            if self.get(id).await? != current {
                tracing::debug!(rule_id = %id, "Rule changed during update, recompiling");
                continue;
            }
            rule.definition = compiled.definition();
            rule.updated_at = Utc::now();
            self.rules.update(rule.clone()).await?;
            tracing::info!(rule_id = %rule.id, "Updated rule");
            return Ok(rule);
        }
        Err(DqmError::storage(format!(
            "rule {} changed concurrently during {} update attempts",
            id, UPDATE_ATTEMPTS
        )))
    }

    async fn transition(&self, id: Uuid, next: RuleStatus) -> Result<Rule> {
        let _guard = self.mutations.lock().await;
        let mut rule = self
            .rules
            .get(id)
            .await?
            .ok_or_else(|| DqmError::not_found("Rule", id.to_string()))?;

        if !rule.status.can_transition_to(next) {
            return Err(DqmError::invalid_transition(rule.status, next));
        }
        let previous = rule.status;
        rule.status = next;
        rule.updated_at = Utc::now();
        self.rules.update(rule.clone()).await?;
        tracing::info!(rule_id = %id, from = %previous, to = %next, "Rule transitioned");
        Ok(rule)
    }

    /// `inactive → active`.
    ///
    /// # Errors
    /// `DqmError::NotFound` for unknown rules, `DqmError::InvalidTransition`
    /// otherwise when the rule is not inactive.
    pub async fn activate(&self, id: Uuid) -> Result<Rule> {
        self.transition(id, RuleStatus::Active).await
    }

    /// `active → inactive`.
    ///
    /// # Errors
    /// `DqmError::NotFound` for unknown rules, `DqmError::InvalidTransition`
    /// otherwise when the rule is not active.
    pub async fn deactivate(&self, id: Uuid) -> Result<Rule> {
        self.transition(id, RuleStatus::Inactive).await
    }

    /// `active → deleted`. The rule's execution history stays queryable.
    ///
    /// # Errors
    /// `DqmError::NotFound` for unknown rules, `DqmError::InvalidTransition`
    /// otherwise when the rule is not active.
    pub async fn delete(&self, id: Uuid) -> Result<Rule> {
        self.transition(id, RuleStatus::Deleted).await
    }

    /// Looks up a rule that has not been deleted.
    ///
    /// # Errors
    /// `DqmError::NotFound` for unknown or deleted rules.
    pub async fn get(&self, id: Uuid) -> Result<Rule> {
        self.rules
            .get(id)
            .await?
            .filter(|rule| rule.status != RuleStatus::Deleted)
            .ok_or_else(|| DqmError::not_found("Rule", id.to_string()))
    }

    /// Active rules, plus inactive ones when `include_inactive`. Deleted
    /// rules are never listed.
    ///
    /// # Errors
    /// Returns error if the store cannot be read.
    pub async fn list(&self, include_inactive: bool) -> Result<Vec<Rule>> {
        Ok(self
            .rules
            .list()
            .await?
            .into_iter()
            .filter(|rule| match rule.status {
                RuleStatus::Active => true,
                RuleStatus::Inactive => include_inactive,
                RuleStatus::Deleted => false,
            })
            .collect())
    }

    /// Runs one rule and records the result.
    ///
    /// A rule that cannot run (connection removed, schema drift, database
    /// error) still produces a stored result, with `error` set.
    ///
    /// # Errors
    /// - `DqmError::NotFound` for unknown or deleted rules
    /// - storage errors while recording the result
    pub async fn execute(&self, id: Uuid) -> Result<ExecutionResult> {
        let rule = self.get(id).await?;
        self.execute_rule(&rule).await
    }

    async fn execute_rule(&self, rule: &Rule) -> Result<ExecutionResult> {
        let started = Instant::now();
        let outcome = self.run(rule).await;
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let mut result = ExecutionResult {
            id: Uuid::new_v4(),
            rule_id: rule.id,
            rule_name: rule.name.clone(),
            rule_kind: rule.kind.clone(),
            severity: rule.severity,
            connection: rule.connection.clone(),
            table: rule.table.clone(),
            column: rule.column.clone(),
            executed_at: Utc::now(),
            passed: false,
            failing_row_count: 0,
            total_row_count: 0,
            pass_rate: 0.0,
            failing_sample: Vec::new(),
            error: None,
            duration_ms,
        };

        match outcome {
            Ok(outcome) => {
                result.passed = outcome.failing == 0;
                result.failing_row_count = outcome.failing;
                result.total_row_count = outcome.total;
                result.pass_rate = pass_rate(outcome.failing, outcome.total);
                result.failing_sample = outcome.sample;
                tracing::info!(
                    rule_id = %rule.id,
                    passed = result.passed,
                    failing = result.failing_row_count,
                    total = result.total_row_count,
                    duration_ms,
                    "Rule executed"
                );
            }
            Err(e) => {
                tracing::warn!(rule_id = %rule.id, "Rule could not run: {}", e);
                result.error = Some(e.detailed_message());
            }
        }

        self.history.append(result.clone()).await?;
        Ok(result)
    }

    async fn run(&self, rule: &Rule) -> Result<Outcome> {
        let handle = self.registry.resolve(&rule.connection)?;
        let compiled = Self::compile_on(
            &handle,
            &rule.table,
            rule.column.as_deref(),
            &rule.kind,
            &rule.parameters,
        )
        .await?;

        let total = handle.fetch_count(&compiled.total_statement()).await?;
        let limit = self.config.sample_limit;

        match &compiled.check {
            Check::ClientPattern { column, regex } => {
                let page_size = self.config.scan_page_size;
                let mut failing = 0_i64;
                let mut sample = Vec::new();
                let mut offset = 0_u64;
                loop {
                    let rows = handle
                        .fetch_rows(&compiled.candidate_page(column, page_size, offset))
                        .await?;
                    let fetched = rows.len();
                    for row in rows {
                        if regex.is_match(&row_text(&row, column)) {
                            continue;
                        }
                        failing = failing.saturating_add(1);
                        if sample.len() < limit as usize {
                            sample.push(row);
                        }
                    }
                    if fetched < page_size as usize {
                        break;
                    }
                    offset = offset.saturating_add(u64::from(page_size));
                }
                Ok(Outcome {
                    failing,
                    total,
                    sample,
                })
            }
            Check::Sql(predicate) => {
                let failing = handle.fetch_count(&compiled.count_statement(predicate)).await?;
                let sample = if failing > 0 && limit > 0 {
                    handle
                        .fetch_rows(&compiled.rows_statement(Some(limit)))
                        .await?
                } else {
                    Vec::new()
                };
                Ok(Outcome {
                    failing,
                    total,
                    sample,
                })
            }
        }
    }

    /// Runs the given rules concurrently, one stored result per rule.
    ///
    /// Every id is resolved before anything runs. A result that cannot be
    /// recorded is logged and left out of the returned list.
    ///
    /// # Errors
    /// `DqmError::NotFound` if any id is unknown or deleted.
    pub async fn execute_batch(&self, ids: &[Uuid]) -> Result<Vec<ExecutionResult>> {
        let mut rules = Vec::with_capacity(ids.len());
        for id in ids {
            rules.push(self.get(*id).await?);
        }
        self.execute_all(rules).await
    }

    /// Runs every active rule concurrently. Results that cannot be recorded
    /// are logged and left out, as in [`execute_batch`](Self::execute_batch).
    ///
    /// # Errors
    /// Storage errors while reading rules.
    pub async fn execute_active(&self) -> Result<Vec<ExecutionResult>> {
        let rules = self.list(false).await?;
        self.execute_all(rules).await
    }

    async fn execute_all(&self, rules: Vec<Rule>) -> Result<Vec<ExecutionResult>> {
        let started = Instant::now();
        let count = rules.len();
        let outcomes: Vec<(Uuid, Result<ExecutionResult>)> = stream::iter(rules.iter())
            .map(|rule| async move { (rule.id, self.execute_rule(rule).await) })
            .buffer_unordered(self.config.max_concurrency)
            .collect()
            .await;

        let mut results = Vec::with_capacity(outcomes.len());
        let mut unsaved = 0_usize;
        for (rule_id, outcome) in outcomes {
            match outcome {
                Ok(result) => results.push(result),
                Err(e) => {
                    unsaved += 1;
                    tracing::warn!(rule_id = %rule_id, "Execution result was not recorded: {}", e);
                }
            }
        }

        let passed = results.iter().filter(|r| r.passed).count();
        let errored = results.iter().filter(|r| r.is_error()).count();
        tracing::info!(
            rules = count,
            passed,
            errored,
            unsaved,
            duration_ms = started.elapsed().as_millis(),
            "Batch execution complete"
        );
        Ok(results)
    }

    /// Failing-row sample stored on a result; empty for unknown ids.
    ///
    /// # Errors
    /// Returns error if the history cannot be read.
    pub async fn list_failures(&self, result_id: Uuid) -> Result<Vec<JsonValue>> {
        Ok(self
            .history
            .get(result_id)
            .await?
            .map(|result| result.failing_sample)
            .unwrap_or_default())
    }

    /// Execution history matching `filter`, oldest first.
    ///
    /// # Errors
    /// Returns error if the history cannot be read.
    pub async fn results(&self, filter: &HistoryFilter) -> Result<Vec<ExecutionResult>> {
        self.history.scan(filter).await
    }
}
