//! Durable JSON-file store.
//!
//! Layout of the store directory:
//! - `rules.json`: every rule, rewritten through a temporary file on change
//! - `executions.jsonl`: one execution result per line, append-only
//! - `profiles.jsonl`: one profile record per line, append-only

use super::{ExecutionHistory, HistoryFilter, MemoryStore, ProfileStore, RuleStore};
use crate::profiling::ProfileRecord;
use crate::rules::{ExecutionResult, Rule};
use crate::{DqmError, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use uuid::Uuid;

const RULES_FILE: &str = "rules.json";
const EXECUTIONS_FILE: &str = "executions.jsonl";
const PROFILES_FILE: &str = "profiles.jsonl";

/// File-backed store that survives process restarts.
///
/// Reads are served from an in-memory copy loaded at [`open`](Self::open);
/// every write goes to disk before the in-memory copy changes.
#[derive(Debug)]
pub struct JsonFileStore {
    dir: PathBuf,
    cache: MemoryStore,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    /// Opens (creating if needed) a store rooted at `dir`.
    ///
    /// # Errors
    /// Returns error if the directory cannot be created or an existing file
    /// is not valid JSON.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            DqmError::io(format!("Failed to create store directory {}", dir.display()), e)
        })?;

        let rules: Vec<Rule> = match read_optional(&dir.join(RULES_FILE)).await? {
            Some(text) if !text.trim().is_empty() => serde_json::from_str(&text)
                .map_err(|e| DqmError::serialization(format!("Invalid {}", RULES_FILE), e))?,
            _ => Vec::new(),
        };
        let executions: Vec<ExecutionResult> = read_lines(&dir.join(EXECUTIONS_FILE)).await?;
        let profiles: Vec<ProfileRecord> = read_lines(&dir.join(PROFILES_FILE)).await?;

        tracing::info!(
            store = %dir.display(),
            rules = rules.len(),
            executions = executions.len(),
            profiles = profiles.len(),
            "Opened file store"
        );

        let cache = MemoryStore::with_history(executions);
        for rule in rules {
            RuleStore::insert(&cache, rule).await?;
        }
        ProfileStore::append(&cache, &profiles).await?;

        Ok(Self {
            dir,
            cache,
            write_lock: Mutex::new(()),
        })
    }

    /// Directory the store lives in.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn persist_rules(&self, rules: &[Rule]) -> Result<()> {
        let json = serde_json::to_string_pretty(rules)
            .map_err(|e| DqmError::serialization("Failed to serialize rules", e))?;
        let path = self.dir.join(RULES_FILE);
        let tmp = self.dir.join(format!("{}.tmp", RULES_FILE));
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| DqmError::io(format!("Failed to write to {}", tmp.display()), e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| DqmError::io(format!("Failed to replace {}", path.display()), e))
    }

    async fn append_lines<T: Serialize + Sync>(&self, file: &str, items: &[T]) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }
        let mut buffer = String::new();
        for item in items {
            let line = serde_json::to_string(item).map_err(|e| {
                DqmError::serialization(format!("Failed to encode {} entry", file), e)
            })?;
            buffer.push_str(&line);
            buffer.push('\n');
        }

        let path = self.dir.join(file);
        let mut handle = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| DqmError::io(format!("Failed to open {}", path.display()), e))?;
        handle
            .write_all(buffer.as_bytes())
            .await
            .map_err(|e| DqmError::io(format!("Failed to write to {}", path.display()), e))?;
        handle
            .flush()
            .await
            .map_err(|e| DqmError::io(format!("Failed to flush {}", path.display()), e))
    }
}

async fn read_optional(path: &Path) -> Result<Option<String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(DqmError::io(format!("Failed to read {}", path.display()), e)),
    }
}

async fn read_lines<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let Some(text) = read_optional(path).await? else {
        return Ok(Vec::new());
    };
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            serde_json::from_str(line).map_err(|e| {
                DqmError::serialization(
                    format!("Invalid entry at {}:{}", path.display(), index + 1),
                    e,
                )
            })
        })
        .collect()
}

#[async_trait]
impl RuleStore for JsonFileStore {
    async fn insert(&self, rule: Rule) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        if RuleStore::get(&self.cache, rule.id).await?.is_some() {
            return Err(DqmError::storage(format!("rule {} already stored", rule.id)));
        }
        let mut rules = RuleStore::list(&self.cache).await?;
        rules.push(rule.clone());
        self.persist_rules(&rules).await?;
        RuleStore::insert(&self.cache, rule).await
    }

    async fn update(&self, rule: Rule) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut rules = RuleStore::list(&self.cache).await?;
        let slot = rules
            .iter_mut()
            .find(|existing| existing.id == rule.id)
            .ok_or_else(|| DqmError::not_found("Rule", rule.id.to_string()))?;
        *slot = rule.clone();
        self.persist_rules(&rules).await?;
        RuleStore::update(&self.cache, rule).await
    }

    async fn get(&self, id: Uuid) -> Result<Option<Rule>> {
        RuleStore::get(&self.cache, id).await
    }

    async fn list(&self) -> Result<Vec<Rule>> {
        RuleStore::list(&self.cache).await
    }
}

#[async_trait]
impl ExecutionHistory for JsonFileStore {
    async fn append(&self, result: ExecutionResult) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.append_lines(EXECUTIONS_FILE, std::slice::from_ref(&result))
            .await?;
        ExecutionHistory::append(&self.cache, result).await
    }

    async fn scan(&self, filter: &HistoryFilter) -> Result<Vec<ExecutionResult>> {
        self.cache.scan(filter).await
    }

    async fn get(&self, id: Uuid) -> Result<Option<ExecutionResult>> {
        ExecutionHistory::get(&self.cache, id).await
    }
}

#[async_trait]
impl ProfileStore for JsonFileStore {
    async fn append(&self, records: &[ProfileRecord]) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.append_lines(PROFILES_FILE, records).await?;
        ProfileStore::append(&self.cache, records).await
    }

    async fn list(&self, table: Option<&str>) -> Result<Vec<ProfileRecord>> {
        ProfileStore::list(&self.cache, table).await
    }
}
