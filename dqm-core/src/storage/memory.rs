//! Process-local store.

use super::{ExecutionHistory, HistoryFilter, ProfileStore, RuleStore};
use crate::profiling::ProfileRecord;
use crate::rules::{ExecutionResult, Rule};
use crate::{DqmError, Result};
use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

/// In-memory implementation of every storage trait.
///
/// Contents are lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryStore {
    rules: RwLock<Vec<Rule>>,
    executions: RwLock<Vec<ExecutionResult>>,
    profiles: RwLock<Vec<ProfileRecord>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-loaded with execution history.
    pub fn with_history(executions: Vec<ExecutionResult>) -> Self {
        Self {
            executions: RwLock::new(executions),
            ..Self::default()
        }
    }
}

#[async_trait]
impl RuleStore for MemoryStore {
    async fn insert(&self, rule: Rule) -> Result<()> {
        let mut rules = self.rules.write().await;
        if rules.iter().any(|existing| existing.id == rule.id) {
            return Err(DqmError::storage(format!("rule {} already stored", rule.id)));
        }
        rules.push(rule);
        Ok(())
    }

    async fn update(&self, rule: Rule) -> Result<()> {
        let mut rules = self.rules.write().await;
        let slot = rules
            .iter_mut()
            .find(|existing| existing.id == rule.id)
            .ok_or_else(|| DqmError::not_found("Rule", rule.id.to_string()))?;
        *slot = rule;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Rule>> {
        Ok(self.rules.read().await.iter().find(|r| r.id == id).cloned())
    }

    async fn list(&self) -> Result<Vec<Rule>> {
        Ok(self.rules.read().await.clone())
    }
}

#[async_trait]
impl ExecutionHistory for MemoryStore {
    async fn append(&self, result: ExecutionResult) -> Result<()> {
        self.executions.write().await.push(result);
        Ok(())
    }

    async fn scan(&self, filter: &HistoryFilter) -> Result<Vec<ExecutionResult>> {
        Ok(self
            .executions
            .read()
            .await
            .iter()
            .filter(|result| filter.matches(result))
            .cloned()
            .collect())
    }

    async fn get(&self, id: Uuid) -> Result<Option<ExecutionResult>> {
        Ok(self
            .executions
            .read()
            .await
            .iter()
            .find(|result| result.id == id)
            .cloned())
    }
}

#[async_trait]
impl ProfileStore for MemoryStore {
    async fn append(&self, records: &[ProfileRecord]) -> Result<()> {
        self.profiles.write().await.extend_from_slice(records);
        Ok(())
    }

    async fn list(&self, table: Option<&str>) -> Result<Vec<ProfileRecord>> {
        Ok(self
            .profiles
            .read()
            .await
            .iter()
            .filter(|record| table.is_none_or(|t| record.table == t))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::test_support::result;
    use chrono::Utc;

    #[tokio::test]
    async fn test_history_scan_is_a_snapshot() {
        let store = MemoryStore::new();
        ExecutionHistory::append(&store, result("null_check", "customers", 0, 5, Utc::now()))
            .await
            .unwrap();

        let snapshot = store.scan(&HistoryFilter::all()).await.unwrap();
        ExecutionHistory::append(&store, result("range_check", "orders", 1, 5, Utc::now()))
            .await
            .unwrap();

        assert_eq!(snapshot.len(), 1);
        assert_eq!(store.scan(&HistoryFilter::all()).await.unwrap().len(), 2);
        assert_eq!(
            store
                .scan(&HistoryFilter::all().with_table("orders"))
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_history_get() {
        let record = result("null_check", "customers", 0, 5, Utc::now());
        let id = record.id;
        let store = MemoryStore::with_history(vec![record]);

        assert!(ExecutionHistory::get(&store, id).await.unwrap().is_some());
        assert!(
            ExecutionHistory::get(&store, Uuid::new_v4())
                .await
                .unwrap()
                .is_none()
        );
    }
}
