//! Repository traits and the backend-dispatching `Database` enum.
//!
//! Repositories return `anyhow::Result`; typed errors are introduced at the
//! engine layer where storage failures, missing rows, and lost races get
//! distinct meanings.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::database::sqlite::SqliteBackend;
use crate::domain::{
    Holding, IntentExecution, MemoryRecord, OwnershipIntent, ScheduledIntent, TriggerType,
};

/// Listing filter for intents.
#[derive(Debug, Clone)]
pub struct IntentFilter {
    pub user_id: Option<String>,
    pub trigger_type: Option<TriggerType>,
    pub enabled: Option<bool>,
    pub limit: usize,
    pub offset: usize,
}

impl Default for IntentFilter {
    fn default() -> Self {
        Self {
            user_id: None,
            trigger_type: None,
            enabled: None,
            limit: 50,
            offset: 0,
        }
    }
}

/// Repository trait for scheduled intents and their execution history.
#[async_trait]
pub trait IntentRepository: Send + Sync {
    /// Insert a new intent.
    async fn create_intent(&self, intent: &ScheduledIntent) -> anyhow::Result<Uuid>;

    /// Get an intent by id.
    async fn get_intent(&self, id: Uuid) -> anyhow::Result<Option<ScheduledIntent>>;

    /// Replace an intent. Returns false when the id does not exist.
    async fn update_intent(&self, intent: &ScheduledIntent) -> anyhow::Result<bool>;

    /// Delete an intent. The execution log is untouched.
    async fn delete_intent(&self, id: Uuid) -> anyhow::Result<bool>;

    /// List intents matching a filter, newest first.
    async fn list_intents(&self, filter: &IntentFilter) -> anyhow::Result<Vec<ScheduledIntent>>;

    /// Count a user's enabled intents, for the creation cap.
    async fn count_enabled_intents(&self, user_id: &str) -> anyhow::Result<i64>;

    /// Due intents: enabled with `next_check <= now`, soonest first.
    async fn list_pending(
        &self,
        now: DateTime<Utc>,
        user_id: Option<&str>,
    ) -> anyhow::Result<Vec<ScheduledIntent>>;

    /// Persist a fire: conditional intent update plus one execution row, in
    /// one transaction. Returns false when `next_check` no longer holds
    /// `expected_next_check` (a concurrent fire won); nothing is written.
    async fn record_fire(
        &self,
        intent: &ScheduledIntent,
        expected_next_check: Option<DateTime<Utc>>,
        execution: &IntentExecution,
    ) -> anyhow::Result<bool>;

    /// Execution history for an intent, newest first.
    async fn list_executions(
        &self,
        intent_id: Uuid,
        limit: usize,
        offset: usize,
    ) -> anyhow::Result<Vec<IntentExecution>>;
}

/// Repository trait for extracted memory records.
#[async_trait]
pub trait MemoryRepository: Send + Sync {
    /// Store a batch of memory records.
    async fn store_memories(&self, records: &[MemoryRecord]) -> anyhow::Result<usize>;

    /// All memories for a user, newest first.
    async fn memories_for_user(&self, user_id: &str) -> anyhow::Result<Vec<MemoryRecord>>;

    /// Delete all memories for a user.
    async fn delete_memories(&self, user_id: &str) -> anyhow::Result<u64>;
}

/// Repository trait for portfolio holdings.
///
/// Upsert identity and field-merge semantics live in the portfolio service;
/// the repository only finds, writes, and lists rows.
#[async_trait]
pub trait PortfolioRepository: Send + Sync {
    /// Find a holding by its upsert key: `user_id` + ticker, or `user_id` +
    /// asset name for rows without a ticker.
    async fn find_holding(
        &self,
        user_id: &str,
        ticker: Option<&str>,
        asset_name: Option<&str>,
    ) -> anyhow::Result<Option<Holding>>;

    /// Insert or replace a holding by id.
    async fn put_holding(&self, holding: &Holding) -> anyhow::Result<()>;

    /// All holdings for a user, most recently updated first.
    async fn holdings_for_user(
        &self,
        user_id: &str,
        intent: Option<OwnershipIntent>,
    ) -> anyhow::Result<Vec<Holding>>;
}

/// Database abstraction over the available backends.
#[derive(Clone)]
pub enum Database {
    /// SQLite file-backed storage.
    SQLite(SqliteBackend),
    /// In-memory store for testing.
    InMemory(InMemoryStore),
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SQLite(_) => write!(f, "Database::SQLite"),
            Self::InMemory(_) => write!(f, "Database::InMemory"),
        }
    }
}

impl Database {
    /// Create a database from configuration.
    pub async fn from_config(config: &DatabaseConfig) -> anyhow::Result<Self> {
        match &config.path {
            Some(path) => {
                let backend = SqliteBackend::new(std::path::PathBuf::from(path));
                backend.init().await?;
                Ok(Self::SQLite(backend))
            }
            None => {
                crate::log_init_warning!("no database path configured, using in-memory store");
                Ok(Self::InMemory(InMemoryStore::new()))
            }
        }
    }

    /// Create an in-memory database for testing.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::InMemory(InMemoryStore::new())
    }
}

#[async_trait]
impl IntentRepository for Database {
    async fn create_intent(&self, intent: &ScheduledIntent) -> anyhow::Result<Uuid> {
        match self {
            Self::SQLite(client) => client.create_intent(intent).await,
            Self::InMemory(store) => store.create_intent(intent).await,
        }
    }

    async fn get_intent(&self, id: Uuid) -> anyhow::Result<Option<ScheduledIntent>> {
        match self {
            Self::SQLite(client) => client.get_intent(id).await,
            Self::InMemory(store) => store.get_intent(id).await,
        }
    }

    async fn update_intent(&self, intent: &ScheduledIntent) -> anyhow::Result<bool> {
        match self {
            Self::SQLite(client) => client.update_intent(intent).await,
            Self::InMemory(store) => store.update_intent(intent).await,
        }
    }

    async fn delete_intent(&self, id: Uuid) -> anyhow::Result<bool> {
        match self {
            Self::SQLite(client) => client.delete_intent(id).await,
            Self::InMemory(store) => store.delete_intent(id).await,
        }
    }

    async fn list_intents(&self, filter: &IntentFilter) -> anyhow::Result<Vec<ScheduledIntent>> {
        match self {
            Self::SQLite(client) => client.list_intents(filter).await,
            Self::InMemory(store) => store.list_intents(filter).await,
        }
    }

    async fn count_enabled_intents(&self, user_id: &str) -> anyhow::Result<i64> {
        match self {
            Self::SQLite(client) => client.count_enabled_intents(user_id).await,
            Self::InMemory(store) => store.count_enabled_intents(user_id).await,
        }
    }

    async fn list_pending(
        &self,
        now: DateTime<Utc>,
        user_id: Option<&str>,
    ) -> anyhow::Result<Vec<ScheduledIntent>> {
        match self {
            Self::SQLite(client) => client.list_pending(now, user_id).await,
            Self::InMemory(store) => store.list_pending(now, user_id).await,
        }
    }

    async fn record_fire(
        &self,
        intent: &ScheduledIntent,
        expected_next_check: Option<DateTime<Utc>>,
        execution: &IntentExecution,
    ) -> anyhow::Result<bool> {
        match self {
            Self::SQLite(client) => client.record_fire(intent, expected_next_check, execution).await,
            Self::InMemory(store) => store.record_fire(intent, expected_next_check, execution).await,
        }
    }

    async fn list_executions(
        &self,
        intent_id: Uuid,
        limit: usize,
        offset: usize,
    ) -> anyhow::Result<Vec<IntentExecution>> {
        match self {
            Self::SQLite(client) => client.list_executions(intent_id, limit, offset).await,
            Self::InMemory(store) => store.list_executions(intent_id, limit, offset).await,
        }
    }
}

#[async_trait]
impl MemoryRepository for Database {
    async fn store_memories(&self, records: &[MemoryRecord]) -> anyhow::Result<usize> {
        match self {
            Self::SQLite(client) => client.store_memories(records).await,
            Self::InMemory(store) => store.store_memories(records).await,
        }
    }

    async fn memories_for_user(&self, user_id: &str) -> anyhow::Result<Vec<MemoryRecord>> {
        match self {
            Self::SQLite(client) => client.memories_for_user(user_id).await,
            Self::InMemory(store) => store.memories_for_user(user_id).await,
        }
    }

    async fn delete_memories(&self, user_id: &str) -> anyhow::Result<u64> {
        match self {
            Self::SQLite(client) => client.delete_memories(user_id).await,
            Self::InMemory(store) => store.delete_memories(user_id).await,
        }
    }
}

#[async_trait]
impl PortfolioRepository for Database {
    async fn find_holding(
        &self,
        user_id: &str,
        ticker: Option<&str>,
        asset_name: Option<&str>,
    ) -> anyhow::Result<Option<Holding>> {
        match self {
            Self::SQLite(client) => client.find_holding(user_id, ticker, asset_name).await,
            Self::InMemory(store) => store.find_holding(user_id, ticker, asset_name).await,
        }
    }

    async fn put_holding(&self, holding: &Holding) -> anyhow::Result<()> {
        match self {
            Self::SQLite(client) => client.put_holding(holding).await,
            Self::InMemory(store) => store.put_holding(holding).await,
        }
    }

    async fn holdings_for_user(
        &self,
        user_id: &str,
        intent: Option<OwnershipIntent>,
    ) -> anyhow::Result<Vec<Holding>> {
        match self {
            Self::SQLite(client) => client.holdings_for_user(user_id, intent).await,
            Self::InMemory(store) => store.holdings_for_user(user_id, intent).await,
        }
    }
}

// ============================================================================
// In-Memory Store (for testing)
// ============================================================================

/// In-memory store for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    intents: std::sync::Arc<parking_lot::RwLock<std::collections::HashMap<Uuid, ScheduledIntent>>>,
    executions: std::sync::Arc<parking_lot::RwLock<Vec<IntentExecution>>>,
    memories: std::sync::Arc<parking_lot::RwLock<Vec<MemoryRecord>>>,
    holdings: std::sync::Arc<parking_lot::RwLock<Vec<Holding>>>,
}

impl InMemoryStore {
    /// Create a new in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IntentRepository for InMemoryStore {
    async fn create_intent(&self, intent: &ScheduledIntent) -> anyhow::Result<Uuid> {
        let mut intents = self.intents.write();
        intents.insert(intent.id, intent.clone());
        Ok(intent.id)
    }

    async fn get_intent(&self, id: Uuid) -> anyhow::Result<Option<ScheduledIntent>> {
        let intents = self.intents.read();
        Ok(intents.get(&id).cloned())
    }

    async fn update_intent(&self, intent: &ScheduledIntent) -> anyhow::Result<bool> {
        let mut intents = self.intents.write();
        if !intents.contains_key(&intent.id) {
            return Ok(false);
        }
        intents.insert(intent.id, intent.clone());
        Ok(true)
    }

    async fn delete_intent(&self, id: Uuid) -> anyhow::Result<bool> {
        let mut intents = self.intents.write();
        Ok(intents.remove(&id).is_some())
    }

    async fn list_intents(&self, filter: &IntentFilter) -> anyhow::Result<Vec<ScheduledIntent>> {
        let intents = self.intents.read();
        let mut matched: Vec<_> = intents
            .values()
            .filter(|i| {
                filter.user_id.as_ref().is_none_or(|u| &i.user_id == u)
                    && filter
                        .trigger_type
                        .as_ref()
                        .is_none_or(|t| &i.trigger_type == t)
                    && filter.enabled.is_none_or(|e| i.enabled == e)
            })
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matched
            .into_iter()
            .skip(filter.offset)
            .take(filter.limit)
            .collect())
    }

    async fn count_enabled_intents(&self, user_id: &str) -> anyhow::Result<i64> {
        let intents = self.intents.read();
        Ok(intents
            .values()
            .filter(|i| i.user_id == user_id && i.enabled)
            .count() as i64)
    }

    async fn list_pending(
        &self,
        now: DateTime<Utc>,
        user_id: Option<&str>,
    ) -> anyhow::Result<Vec<ScheduledIntent>> {
        let intents = self.intents.read();
        let mut due: Vec<_> = intents
            .values()
            .filter(|i| {
                i.enabled
                    && i.next_check.is_some_and(|nc| nc <= now)
                    && user_id.is_none_or(|u| i.user_id == u)
            })
            .cloned()
            .collect();
        due.sort_by_key(|i| i.next_check);
        Ok(due)
    }

    async fn record_fire(
        &self,
        intent: &ScheduledIntent,
        expected_next_check: Option<DateTime<Utc>>,
        execution: &IntentExecution,
    ) -> anyhow::Result<bool> {
        let mut intents = self.intents.write();
        let Some(current) = intents.get(&intent.id) else {
            return Ok(false);
        };
        if current.next_check != expected_next_check {
            return Ok(false);
        }
        intents.insert(intent.id, intent.clone());
        self.executions.write().push(execution.clone());
        Ok(true)
    }

    async fn list_executions(
        &self,
        intent_id: Uuid,
        limit: usize,
        offset: usize,
    ) -> anyhow::Result<Vec<IntentExecution>> {
        let executions = self.executions.read();
        let mut matched: Vec<_> = executions
            .iter()
            .filter(|e| e.intent_id == intent_id)
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.executed_at.cmp(&a.executed_at));
        Ok(matched.into_iter().skip(offset).take(limit).collect())
    }
}

#[async_trait]
impl MemoryRepository for InMemoryStore {
    async fn store_memories(&self, records: &[MemoryRecord]) -> anyhow::Result<usize> {
        let mut memories = self.memories.write();
        memories.extend_from_slice(records);
        Ok(records.len())
    }

    async fn memories_for_user(&self, user_id: &str) -> anyhow::Result<Vec<MemoryRecord>> {
        let memories = self.memories.read();
        let mut matched: Vec<_> = memories
            .iter()
            .filter(|m| m.user_id == user_id)
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matched)
    }

    async fn delete_memories(&self, user_id: &str) -> anyhow::Result<u64> {
        let mut memories = self.memories.write();
        let before = memories.len();
        memories.retain(|m| m.user_id != user_id);
        Ok((before - memories.len()) as u64)
    }
}

#[async_trait]
impl PortfolioRepository for InMemoryStore {
    async fn find_holding(
        &self,
        user_id: &str,
        ticker: Option<&str>,
        asset_name: Option<&str>,
    ) -> anyhow::Result<Option<Holding>> {
        let holdings = self.holdings.read();
        let found = holdings.iter().find(|h| {
            h.user_id == user_id
                && match ticker {
                    Some(t) => h.ticker.as_deref() == Some(t),
                    None => h.ticker.is_none() && h.asset_name.as_deref() == asset_name,
                }
        });
        Ok(found.cloned())
    }

    async fn put_holding(&self, holding: &Holding) -> anyhow::Result<()> {
        let mut holdings = self.holdings.write();
        match holdings.iter_mut().find(|h| h.id == holding.id) {
            Some(slot) => *slot = holding.clone(),
            None => holdings.push(holding.clone()),
        }
        Ok(())
    }

    async fn holdings_for_user(
        &self,
        user_id: &str,
        intent: Option<OwnershipIntent>,
    ) -> anyhow::Result<Vec<Holding>> {
        let holdings = self.holdings.read();
        let mut matched: Vec<_> = holdings
            .iter()
            .filter(|h| h.user_id == user_id && intent.is_none_or(|i| h.intent == i))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.last_updated.cmp(&a.last_updated));
        Ok(matched)
    }
}
