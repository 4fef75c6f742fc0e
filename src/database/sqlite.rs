//! SQLite backend.
//!
//! Rows are stored as a JSON blob alongside the columns the queries filter
//! and order on. Timestamps are written as fixed-width RFC 3339 strings so
//! lexicographic comparison in SQL matches chronological order, and so the
//! compare-and-swap on `next_check` can match on string equality.

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::database::repository::IntentFilter;
use crate::domain::{Holding, IntentExecution, MemoryRecord, OwnershipIntent, ScheduledIntent};

/// SQLite storage for intents, executions, and memories.
///
/// Coarse-grained locking around a single connection, with all calls routed
/// through `spawn_blocking`.
#[derive(Clone)]
pub struct SqliteBackend {
    db_path: PathBuf,
    pub(crate) sqlite: Arc<Mutex<Option<Connection>>>,
}

impl std::fmt::Debug for SqliteBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ready = self
            .sqlite
            .lock()
            .map(|guard| guard.is_some())
            .unwrap_or(false);
        f.debug_struct("SqliteBackend")
            .field("db_path", &self.db_path)
            .field("ready", &ready)
            .finish()
    }
}

impl SqliteBackend {
    pub fn new(db_path: PathBuf) -> Self {
        Self {
            db_path,
            sqlite: Arc::new(Mutex::new(None)),
        }
    }

    /// Open the database file and create the schema.
    pub async fn init(&self) -> Result<()> {
        let sqlite = self.sqlite.clone();
        let db_path = self.db_path.clone();

        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut guard = sqlite.lock().unwrap();
            if guard.is_none() {
                if let Some(parent) = db_path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                let conn = Connection::open(&db_path)?;
                // WAL for concurrent readers
                conn.pragma_update(None, "journal_mode", "WAL")?;

                conn.execute_batch(
                    "CREATE TABLE IF NOT EXISTS scheduled_intents (
                        id TEXT PRIMARY KEY,
                        user_id TEXT NOT NULL,
                        trigger_type TEXT NOT NULL,
                        enabled BOOLEAN NOT NULL,
                        next_check TEXT,
                        data JSON NOT NULL
                    );
                    CREATE INDEX IF NOT EXISTS idx_intents_user_enabled
                        ON scheduled_intents(user_id, enabled);
                    CREATE INDEX IF NOT EXISTS idx_intents_due
                        ON scheduled_intents(enabled, next_check)
                        WHERE next_check IS NOT NULL;

                    CREATE TABLE IF NOT EXISTS intent_executions (
                        id TEXT PRIMARY KEY,
                        intent_id TEXT NOT NULL,
                        executed_at TEXT NOT NULL,
                        data JSON NOT NULL
                    );
                    CREATE INDEX IF NOT EXISTS idx_executions_intent
                        ON intent_executions(intent_id, executed_at DESC);

                    CREATE TABLE IF NOT EXISTS memories (
                        id TEXT PRIMARY KEY,
                        user_id TEXT NOT NULL,
                        layer TEXT NOT NULL,
                        kind TEXT NOT NULL,
                        created_at TEXT NOT NULL,
                        data JSON NOT NULL
                    );
                    CREATE INDEX IF NOT EXISTS idx_memories_user ON memories(user_id);

                    CREATE TABLE IF NOT EXISTS portfolio_holdings (
                        id TEXT PRIMARY KEY,
                        user_id TEXT NOT NULL,
                        ticker TEXT,
                        asset_name TEXT,
                        intent TEXT NOT NULL,
                        last_updated TEXT NOT NULL,
                        data JSON NOT NULL
                    );
                    CREATE INDEX IF NOT EXISTS idx_holdings_user
                        ON portfolio_holdings(user_id, intent);
                    ",
                )?;
                *guard = Some(conn);
            }
            Ok(())
        })
        .await
        .context("Tokio spawn_blocking failed")??;

        Ok(())
    }

    pub async fn create_intent(&self, intent: &ScheduledIntent) -> Result<Uuid> {
        let intent = intent.clone();
        let json = serde_json::to_string(&intent)?;
        let sqlite = self.sqlite.clone();

        tokio::task::spawn_blocking(move || -> Result<Uuid> {
            let guard = sqlite.lock().unwrap();
            let conn = guard
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("SQLite not initialized"))?;

            conn.execute(
                "INSERT INTO scheduled_intents (id, user_id, trigger_type, enabled, next_check, data)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    intent.id.to_string(),
                    intent.user_id,
                    intent.trigger_type.as_str(),
                    intent.enabled,
                    intent.next_check.map(format_datetime),
                    json
                ],
            )?;
            Ok(intent.id)
        })
        .await?
    }

    pub async fn get_intent(&self, id: Uuid) -> Result<Option<ScheduledIntent>> {
        let id = id.to_string();
        let sqlite = self.sqlite.clone();

        tokio::task::spawn_blocking(move || -> Result<Option<ScheduledIntent>> {
            let guard = sqlite.lock().unwrap();
            let conn = guard
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("SQLite not initialized"))?;

            let mut stmt = conn.prepare("SELECT data FROM scheduled_intents WHERE id = ?1")?;
            let mut rows = stmt.query(params![id])?;

            if let Some(row) = rows.next()? {
                let data: String = row.get(0)?;
                Ok(Some(serde_json::from_str(&data)?))
            } else {
                Ok(None)
            }
        })
        .await?
    }

    pub async fn update_intent(&self, intent: &ScheduledIntent) -> Result<bool> {
        let intent = intent.clone();
        let json = serde_json::to_string(&intent)?;
        let sqlite = self.sqlite.clone();

        tokio::task::spawn_blocking(move || -> Result<bool> {
            let guard = sqlite.lock().unwrap();
            let conn = guard
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("SQLite not initialized"))?;

            let count = conn.execute(
                "UPDATE scheduled_intents
                 SET user_id = ?2, trigger_type = ?3, enabled = ?4, next_check = ?5, data = ?6
                 WHERE id = ?1",
                params![
                    intent.id.to_string(),
                    intent.user_id,
                    intent.trigger_type.as_str(),
                    intent.enabled,
                    intent.next_check.map(format_datetime),
                    json
                ],
            )?;
            Ok(count > 0)
        })
        .await?
    }

    pub async fn delete_intent(&self, id: Uuid) -> Result<bool> {
        let id = id.to_string();
        let sqlite = self.sqlite.clone();

        tokio::task::spawn_blocking(move || -> Result<bool> {
            let guard = sqlite.lock().unwrap();
            let conn = guard
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("SQLite not initialized"))?;

            let count = conn.execute(
                "DELETE FROM scheduled_intents WHERE id = ?1",
                params![id],
            )?;
            // Execution history stays; the log is append-only.
            Ok(count > 0)
        })
        .await?
    }

    pub async fn list_intents(&self, filter: &IntentFilter) -> Result<Vec<ScheduledIntent>> {
        let filter = filter.clone();
        let sqlite = self.sqlite.clone();

        tokio::task::spawn_blocking(move || -> Result<Vec<ScheduledIntent>> {
            let guard = sqlite.lock().unwrap();
            let conn = guard
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("SQLite not initialized"))?;

            let mut sql = "SELECT data FROM scheduled_intents WHERE 1=1".to_string();
            let mut binds: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

            if let Some(ref user_id) = filter.user_id {
                sql.push_str(&format!(" AND user_id = ?{}", binds.len() + 1));
                binds.push(Box::new(user_id.clone()));
            }
            if let Some(ref trigger_type) = filter.trigger_type {
                sql.push_str(&format!(" AND trigger_type = ?{}", binds.len() + 1));
                binds.push(Box::new(trigger_type.as_str().to_string()));
            }
            if let Some(enabled) = filter.enabled {
                sql.push_str(&format!(" AND enabled = ?{}", binds.len() + 1));
                binds.push(Box::new(enabled));
            }
            sql.push_str(&format!(
                " ORDER BY rowid DESC LIMIT ?{} OFFSET ?{}",
                binds.len() + 1,
                binds.len() + 2
            ));
            binds.push(Box::new(filter.limit as i64));
            binds.push(Box::new(filter.offset as i64));

            let mut stmt = conn.prepare(&sql)?;
            let bind_refs: Vec<&dyn rusqlite::ToSql> =
                binds.iter().map(|b| &**b as &dyn rusqlite::ToSql).collect();
            let rows = stmt.query_map(&bind_refs[..], |row| row.get::<_, String>(0))?;

            let mut intents = Vec::new();
            for row in rows {
                intents.push(serde_json::from_str(&row?)?);
            }
            Ok(intents)
        })
        .await?
    }

    pub async fn count_enabled_intents(&self, user_id: &str) -> Result<i64> {
        let user_id = user_id.to_string();
        let sqlite = self.sqlite.clone();

        tokio::task::spawn_blocking(move || -> Result<i64> {
            let guard = sqlite.lock().unwrap();
            let conn = guard
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("SQLite not initialized"))?;

            let mut stmt = conn.prepare(
                "SELECT COUNT(*) FROM scheduled_intents WHERE user_id = ?1 AND enabled = 1",
            )?;
            let count: i64 = stmt.query_row(params![user_id], |row| row.get(0))?;
            Ok(count)
        })
        .await?
    }

    pub async fn list_pending(
        &self,
        now: DateTime<Utc>,
        user_id: Option<&str>,
    ) -> Result<Vec<ScheduledIntent>> {
        let now = format_datetime(now);
        let user_id = user_id.map(String::from);
        let sqlite = self.sqlite.clone();

        tokio::task::spawn_blocking(move || -> Result<Vec<ScheduledIntent>> {
            let guard = sqlite.lock().unwrap();
            let conn = guard
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("SQLite not initialized"))?;

            let mut sql = "SELECT data FROM scheduled_intents
                 WHERE enabled = 1 AND next_check IS NOT NULL AND next_check <= ?1"
                .to_string();
            if user_id.is_some() {
                sql.push_str(" AND user_id = ?2");
            }
            sql.push_str(" ORDER BY next_check ASC");

            let mut stmt = conn.prepare(&sql)?;
            let mut rows = match user_id {
                Some(ref uid) => stmt.query(params![now, uid])?,
                None => stmt.query(params![now])?,
            };

            let mut intents = Vec::new();
            while let Some(row) = rows.next()? {
                let data: String = row.get(0)?;
                intents.push(serde_json::from_str(&data)?);
            }
            Ok(intents)
        })
        .await?
    }

    /// Persist a fire transactionally.
    ///
    /// The intent update is conditional on `next_check` still holding the
    /// value the caller loaded; zero rows updated means a concurrent fire won
    /// and nothing is written, including the execution row. Returns whether
    /// the swap succeeded.
    pub async fn record_fire(
        &self,
        intent: &ScheduledIntent,
        expected_next_check: Option<DateTime<Utc>>,
        execution: &IntentExecution,
    ) -> Result<bool> {
        let intent = intent.clone();
        let intent_json = serde_json::to_string(&intent)?;
        let execution = execution.clone();
        let execution_json = serde_json::to_string(&execution)?;
        let sqlite = self.sqlite.clone();

        tokio::task::spawn_blocking(move || -> Result<bool> {
            let mut guard = sqlite.lock().unwrap();
            let conn = guard
                .as_mut()
                .ok_or_else(|| anyhow::anyhow!("SQLite not initialized"))?;

            let tx = conn.transaction()?;

            let updated = tx.execute(
                "UPDATE scheduled_intents
                 SET enabled = ?2, next_check = ?3, data = ?4
                 WHERE id = ?1 AND next_check IS ?5",
                params![
                    intent.id.to_string(),
                    intent.enabled,
                    intent.next_check.map(format_datetime),
                    intent_json,
                    expected_next_check.map(format_datetime),
                ],
            )?;

            if updated == 0 {
                tx.rollback()?;
                return Ok(false);
            }

            tx.execute(
                "INSERT INTO intent_executions (id, intent_id, executed_at, data)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    execution.id.to_string(),
                    execution.intent_id.to_string(),
                    format_datetime(execution.executed_at),
                    execution_json
                ],
            )?;

            tx.commit()?;
            Ok(true)
        })
        .await?
    }

    pub async fn list_executions(
        &self,
        intent_id: Uuid,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<IntentExecution>> {
        let intent_id = intent_id.to_string();
        let sqlite = self.sqlite.clone();

        tokio::task::spawn_blocking(move || -> Result<Vec<IntentExecution>> {
            let guard = sqlite.lock().unwrap();
            let conn = guard
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("SQLite not initialized"))?;

            let mut stmt = conn.prepare(
                "SELECT data FROM intent_executions WHERE intent_id = ?1
                 ORDER BY executed_at DESC LIMIT ?2 OFFSET ?3",
            )?;
            let rows = stmt.query_map(params![intent_id, limit as i64, offset as i64], |row| {
                row.get::<_, String>(0)
            })?;

            let mut executions = Vec::new();
            for row in rows {
                executions.push(serde_json::from_str(&row?)?);
            }
            Ok(executions)
        })
        .await?
    }

    pub async fn store_memories(&self, records: &[MemoryRecord]) -> Result<usize> {
        let records = records.to_vec();
        let sqlite = self.sqlite.clone();

        tokio::task::spawn_blocking(move || -> Result<usize> {
            let mut guard = sqlite.lock().unwrap();
            let conn = guard
                .as_mut()
                .ok_or_else(|| anyhow::anyhow!("SQLite not initialized"))?;

            let tx = conn.transaction()?;
            for record in &records {
                let json = serde_json::to_string(record)?;
                let layer = serde_json::to_value(record.layer)?
                    .as_str()
                    .unwrap_or_default()
                    .to_string();
                let kind = serde_json::to_value(record.kind)?
                    .as_str()
                    .unwrap_or_default()
                    .to_string();
                tx.execute(
                    "INSERT OR REPLACE INTO memories (id, user_id, layer, kind, created_at, data)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        record.id,
                        record.user_id,
                        layer,
                        kind,
                        format_datetime(record.created_at),
                        json
                    ],
                )?;
            }
            tx.commit()?;
            Ok(records.len())
        })
        .await?
    }

    pub async fn memories_for_user(&self, user_id: &str) -> Result<Vec<MemoryRecord>> {
        let user_id = user_id.to_string();
        let sqlite = self.sqlite.clone();

        tokio::task::spawn_blocking(move || -> Result<Vec<MemoryRecord>> {
            let guard = sqlite.lock().unwrap();
            let conn = guard
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("SQLite not initialized"))?;

            let mut stmt = conn.prepare(
                "SELECT data FROM memories WHERE user_id = ?1 ORDER BY created_at DESC",
            )?;
            let rows = stmt.query_map(params![user_id], |row| row.get::<_, String>(0))?;

            let mut memories = Vec::new();
            for row in rows {
                memories.push(serde_json::from_str(&row?)?);
            }
            Ok(memories)
        })
        .await?
    }

    pub async fn find_holding(
        &self,
        user_id: &str,
        ticker: Option<&str>,
        asset_name: Option<&str>,
    ) -> Result<Option<Holding>> {
        let user_id = user_id.to_string();
        let ticker = ticker.map(String::from);
        let asset_name = asset_name.map(String::from);
        let sqlite = self.sqlite.clone();

        tokio::task::spawn_blocking(move || -> Result<Option<Holding>> {
            let guard = sqlite.lock().unwrap();
            let conn = guard
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("SQLite not initialized"))?;

            // Ticker is the primary key for the merge; unlisted assets fall
            // back to the asset name.
            let (sql, key) = match ticker {
                Some(t) => (
                    "SELECT data FROM portfolio_holdings
                     WHERE user_id = ?1 AND ticker = ?2 LIMIT 1",
                    t,
                ),
                None => (
                    "SELECT data FROM portfolio_holdings
                     WHERE user_id = ?1 AND ticker IS NULL AND asset_name = ?2 LIMIT 1",
                    asset_name.unwrap_or_default(),
                ),
            };

            let mut stmt = conn.prepare(sql)?;
            let mut rows = stmt.query(params![user_id, key])?;

            if let Some(row) = rows.next()? {
                let data: String = row.get(0)?;
                Ok(Some(serde_json::from_str(&data)?))
            } else {
                Ok(None)
            }
        })
        .await?
    }

    pub async fn put_holding(&self, holding: &Holding) -> Result<()> {
        let holding = holding.clone();
        let json = serde_json::to_string(&holding)?;
        let sqlite = self.sqlite.clone();

        tokio::task::spawn_blocking(move || -> Result<()> {
            let guard = sqlite.lock().unwrap();
            let conn = guard
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("SQLite not initialized"))?;

            conn.execute(
                "INSERT OR REPLACE INTO portfolio_holdings
                     (id, user_id, ticker, asset_name, intent, last_updated, data)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    holding.id.to_string(),
                    holding.user_id,
                    holding.ticker,
                    holding.asset_name,
                    holding.intent.as_str(),
                    format_datetime(holding.last_updated),
                    json
                ],
            )?;
            Ok(())
        })
        .await?
    }

    pub async fn holdings_for_user(
        &self,
        user_id: &str,
        intent: Option<OwnershipIntent>,
    ) -> Result<Vec<Holding>> {
        let user_id = user_id.to_string();
        let sqlite = self.sqlite.clone();

        tokio::task::spawn_blocking(move || -> Result<Vec<Holding>> {
            let guard = sqlite.lock().unwrap();
            let conn = guard
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("SQLite not initialized"))?;

            let mut sql = "SELECT data FROM portfolio_holdings WHERE user_id = ?1".to_string();
            if intent.is_some() {
                sql.push_str(" AND intent = ?2");
            }
            sql.push_str(" ORDER BY last_updated DESC");

            let mut stmt = conn.prepare(&sql)?;
            let mut rows = match intent {
                Some(i) => stmt.query(params![user_id, i.as_str()])?,
                None => stmt.query(params![user_id])?,
            };

            let mut holdings = Vec::new();
            while let Some(row) = rows.next()? {
                let data: String = row.get(0)?;
                holdings.push(serde_json::from_str(&data)?);
            }
            Ok(holdings)
        })
        .await?
    }

    pub async fn delete_memories(&self, user_id: &str) -> Result<u64> {
        let user_id = user_id.to_string();
        let sqlite = self.sqlite.clone();

        tokio::task::spawn_blocking(move || -> Result<u64> {
            let guard = sqlite.lock().unwrap();
            let conn = guard
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("SQLite not initialized"))?;

            let count = conn.execute("DELETE FROM memories WHERE user_id = ?1", params![user_id])?;
            Ok(count as u64)
        })
        .await?
    }
}

fn format_datetime(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}
