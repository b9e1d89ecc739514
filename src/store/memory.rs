//! Process-local store for suggestions and strategies

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::common::errors::{EngineError, Result};
use crate::common::traits::{StrategyStore, SuggestionStore};
use crate::common::types::{AuditNote, NoteKind, Strategy, StrategyStatus, Suggestion, SuggestionStatus};

type Slot<T> = Arc<Mutex<T>>;

/// In-memory implementation of both store traits.
///
/// Each record sits behind its own lock, so writes to different records
/// never wait on each other; the outer map lock is only held to find or
/// insert a slot.
#[derive(Default)]
pub struct InMemoryStore {
    suggestions: RwLock<HashMap<String, Slot<Suggestion>>>,
    strategies: RwLock<HashMap<String, Slot<Strategy>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_suggestions(records: impl IntoIterator<Item = Suggestion>) -> Self {
        let map = records
            .into_iter()
            .map(|s| (s.id.clone(), Arc::new(Mutex::new(s))))
            .collect();
        Self {
            suggestions: RwLock::new(map),
            strategies: RwLock::new(HashMap::new()),
        }
    }

    /// Load a JSON array of suggestions
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            EngineError::Configuration(format!("Cannot read seed file {}: {}", path.display(), e))
        })?;
        let records: Vec<Suggestion> = serde_json::from_str(&raw)?;
        info!(path = %path.display(), records = records.len(), "Seeded suggestion store");
        Ok(Self::from_suggestions(records))
    }

    /// Insert or replace a suggestion, notes included
    pub async fn insert_suggestion(&self, suggestion: Suggestion) {
        self.suggestions
            .write()
            .await
            .insert(suggestion.id.clone(), Arc::new(Mutex::new(suggestion)));
    }

    pub async fn insert_strategy(&self, strategy: Strategy) {
        self.strategies
            .write()
            .await
            .insert(strategy.id.clone(), Arc::new(Mutex::new(strategy)));
    }

    pub async fn suggestion_count(&self) -> usize {
        self.suggestions.read().await.len()
    }

    pub async fn strategy_count(&self) -> usize {
        self.strategies.read().await.len()
    }

    async fn suggestion_slot(&self, id: &str) -> Option<Slot<Suggestion>> {
        self.suggestions.read().await.get(id).cloned()
    }

    async fn all_suggestion_slots(&self) -> Vec<Slot<Suggestion>> {
        self.suggestions.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl SuggestionStore for InMemoryStore {
    async fn find_by_status(&self, status: SuggestionStatus) -> Result<Vec<Suggestion>> {
        let mut found = Vec::new();
        for slot in self.all_suggestion_slots().await {
            let record = slot.lock().await;
            if record.status() == status {
                found.push(record.clone());
            }
        }
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(found)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Suggestion>> {
        match self.suggestion_slot(id).await {
            Some(slot) => Ok(Some(slot.lock().await.clone())),
            None => Ok(None),
        }
    }

    async fn save(&self, suggestion: &Suggestion) -> Result<()> {
        match self.suggestion_slot(&suggestion.id).await {
            Some(slot) => {
                let mut record = slot.lock().await;
                let notes = std::mem::take(&mut record.notes);
                *record = suggestion.clone();
                record.notes = notes;
            }
            None => {
                debug!(suggestion_id = %suggestion.id, "Saving new suggestion");
                self.insert_suggestion(suggestion.clone()).await;
            }
        }
        Ok(())
    }

    async fn append_note(
        &self,
        id: &str,
        message: &str,
        kind: NoteKind,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let slot = self
            .suggestion_slot(id)
            .await
            .ok_or_else(|| EngineError::NotFound(id.to_string()))?;
        slot.lock().await.notes.push(AuditNote {
            at,
            kind,
            message: message.to_string(),
        });
        Ok(())
    }
}

#[async_trait]
impl StrategyStore for InMemoryStore {
    async fn find_strategy(&self, id: &str) -> Result<Option<Strategy>> {
        let slot = self.strategies.read().await.get(id).cloned();
        match slot {
            Some(slot) => Ok(Some(slot.lock().await.clone())),
            None => Ok(None),
        }
    }

    async fn find_open_strategies(&self) -> Result<Vec<Strategy>> {
        let slots: Vec<Slot<Strategy>> = self.strategies.read().await.values().cloned().collect();
        let mut open = Vec::new();
        for slot in slots {
            let strategy = slot.lock().await;
            if strategy.status != StrategyStatus::Completed {
                open.push(strategy.clone());
            }
        }
        open.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(open)
    }

    async fn save_strategy(&self, strategy: &Strategy) -> Result<()> {
        let slot = self.strategies.read().await.get(&strategy.id).cloned();
        match slot {
            Some(slot) => *slot.lock().await = strategy.clone(),
            None => self.insert_strategy(strategy.clone()).await,
        }
        Ok(())
    }
}
