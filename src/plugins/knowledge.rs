//! Agent memory entries and knowledge sharing between agents.

use crate::core::error::HivekeepError;
use crate::core::time;
use crate::plugins::agents::{AgentStore, OpKind, map_constraint};
use rusqlite::{OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};

pub const DEFAULT_IMPORTANCE: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub id: i64,
    pub agent_id: String,
    pub memory_type: String,
    pub key: String,
    pub value: Vec<u8>,
    pub importance: f64,
    pub access_count: i64,
    pub created_at: i64,
    pub last_accessed: i64,
    pub expires_at: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMemory {
    pub agent_id: String,
    pub memory_type: String,
    pub key: String,
    pub value: Vec<u8>,
    #[serde(default = "default_importance")]
    pub importance: f64,
    #[serde(default)]
    pub expires_at: Option<i64>,
}

fn default_importance() -> f64 {
    DEFAULT_IMPORTANCE
}

impl NewMemory {
    pub fn new(
        agent_id: impl Into<String>,
        memory_type: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            memory_type: memory_type.into(),
            key: key.into(),
            value: value.into(),
            importance: DEFAULT_IMPORTANCE,
            expires_at: None,
        }
    }

    pub fn with_importance(mut self, importance: f64) -> Self {
        self.importance = importance;
        self
    }

    pub fn expires_at(mut self, ts_ms: i64) -> Self {
        self.expires_at = Some(ts_ms);
        self
    }
}

const MEMORY_COLUMNS: &str = "id, agent_id, memory_type, key, value, importance, access_count, created_at, last_accessed, expires_at";

fn memory_from_row(row: &Row<'_>) -> rusqlite::Result<MemoryEntry> {
    Ok(MemoryEntry {
        id: row.get(0)?,
        agent_id: row.get(1)?,
        memory_type: row.get(2)?,
        key: row.get(3)?,
        value: row.get(4)?,
        importance: row.get(5)?,
        access_count: row.get(6)?,
        created_at: row.get(7)?,
        last_accessed: row.get(8)?,
        expires_at: row.get(9)?,
    })
}

fn check_importance(op: &str, importance: f64) -> Result<(), HivekeepError> {
    if !importance.is_finite() || !(0.0..=1.0).contains(&importance) {
        return Err(HivekeepError::rejected(
            op,
            format!("importance {} outside [0, 1]", importance),
        ));
    }
    Ok(())
}

impl AgentStore {
    /// Returns the new entry id. The owning agent must exist.
    pub fn store_memory(&self, memory: NewMemory) -> Result<i64, HivekeepError> {
        const OP: &str = "store_memory";
        check_importance(OP, memory.importance)?;
        let max_blob = self.gate().current_policy().input.max_blob_bytes;
        if memory.value.len() > max_blob {
            return Err(HivekeepError::rejected(
                OP,
                format!("value is {} bytes, ceiling is {}", memory.value.len(), max_blob),
            ));
        }
        self.gate()
            .check_identifier(OP, &memory.agent_id, self.caller())?;
        self.gate().screen_identifier(OP, &memory.memory_type, self.caller())?;
        self.gate().screen_identifier(OP, &memory.key, self.caller())?;

        let now = time::now_ms();
        self.run(OP, OpKind::Write, |conn| {
            conn.execute(
                "INSERT INTO agent_memory(agent_id, memory_type, key, value, importance, access_count, created_at, last_accessed, expires_at)
                 VALUES(?1, ?2, ?3, ?4, ?5, 0, ?6, ?6, ?7)",
                params![
                    memory.agent_id,
                    memory.memory_type,
                    memory.key,
                    memory.value,
                    memory.importance,
                    now,
                    memory.expires_at
                ],
            )
            .map_err(|e| map_constraint(e, &memory.agent_id))?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Newest live entry for `key`. Recall counts as an access.
    pub fn recall_memory(
        &self,
        agent_id: &str,
        key: &str,
    ) -> Result<Option<MemoryEntry>, HivekeepError> {
        const OP: &str = "recall_memory";
        self.gate().check_identifier(OP, agent_id, self.caller())?;
        self.gate().screen_identifier(OP, key, self.caller())?;
        let now = time::now_ms();
        self.run(OP, OpKind::Write, |conn| {
            let tx = conn.transaction()?;
            let sql = format!(
                "SELECT {} FROM agent_memory
                 WHERE agent_id = ?1 AND key = ?2 AND (expires_at IS NULL OR expires_at > ?3)
                 ORDER BY created_at DESC, id DESC LIMIT 1",
                MEMORY_COLUMNS
            );
            let found = tx
                .query_row(&sql, params![agent_id, key, now], memory_from_row)
                .optional()?;
            let Some(mut entry) = found else {
                return Ok(None);
            };
            tx.execute(
                "UPDATE agent_memory SET access_count = access_count + 1, last_accessed = ?2 WHERE id = ?1",
                params![entry.id, now],
            )?;
            tx.commit()?;
            entry.access_count += 1;
            entry.last_accessed = now;
            Ok(Some(entry))
        })
    }

    /// Live entries, most important first, newest first within equal importance.
    pub fn list_memories(
        &self,
        agent_id: &str,
        memory_type: Option<&str>,
    ) -> Result<Vec<MemoryEntry>, HivekeepError> {
        const OP: &str = "list_memories";
        self.gate().check_identifier(OP, agent_id, self.caller())?;
        if let Some(memory_type) = memory_type {
            self.gate().screen_identifier(OP, memory_type, self.caller())?;
        }
        let now = time::now_ms();
        self.run(OP, OpKind::Read, |conn| {
            let mut sql = format!(
                "SELECT {} FROM agent_memory WHERE agent_id = ?1 AND (expires_at IS NULL OR expires_at > ?2)",
                MEMORY_COLUMNS
            );
            if memory_type.is_some() {
                sql.push_str(" AND memory_type = ?3");
            }
            sql.push_str(" ORDER BY importance DESC, created_at DESC, id DESC");
            let mut stmt = conn.prepare(&sql)?;
            let rows = match memory_type {
                Some(t) => stmt.query_map(params![agent_id, now, t], memory_from_row)?,
                None => stmt.query_map(params![agent_id, now], memory_from_row)?,
            }
            .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Copies live entries at or above `min_importance` from one agent to another
    /// in a single transaction. Copies start with a zero access count.
    pub fn share_knowledge(
        &self,
        from_agent: &str,
        to_agent: &str,
        memory_type: Option<&str>,
        min_importance: f64,
    ) -> Result<usize, HivekeepError> {
        const OP: &str = "share_knowledge";
        check_importance(OP, min_importance)?;
        self.gate().check_identifier(OP, from_agent, self.caller())?;
        self.gate().screen_identifier(OP, to_agent, self.caller())?;
        if let Some(memory_type) = memory_type {
            self.gate().screen_identifier(OP, memory_type, self.caller())?;
        }
        let now = time::now_ms();
        let copied = self.run(OP, OpKind::Write, |conn| {
            let tx = conn.transaction()?;
            for id in [from_agent, to_agent] {
                let exists: Option<i64> = tx
                    .query_row("SELECT 1 FROM agents WHERE id = ?1", params![id], |row| row.get(0))
                    .optional()?;
                if exists.is_none() {
                    return Err(HivekeepError::NotFound(format!("agent '{}'", id)));
                }
            }
            let mut sql = String::from(
                "INSERT INTO agent_memory(agent_id, memory_type, key, value, importance, access_count, created_at, last_accessed, expires_at)
                 SELECT ?1, memory_type, key, value, importance, 0, ?3, ?3, expires_at
                 FROM agent_memory
                 WHERE agent_id = ?2 AND importance >= ?4 AND (expires_at IS NULL OR expires_at > ?3)",
            );
            if memory_type.is_some() {
                sql.push_str(" AND memory_type = ?5");
            }
            sql.push_str(" ORDER BY id");
            let copied = match memory_type {
                Some(t) => tx.execute(&sql, params![to_agent, from_agent, now, min_importance, t])?,
                None => tx.execute(&sql, params![to_agent, from_agent, now, min_importance])?,
            };
            tx.commit()?;
            Ok(copied)
        })?;
        tracing::info!(from = from_agent, to = to_agent, copied, "knowledge shared");
        Ok(copied)
    }

    /// Deletes entries whose expiry is at or before `now_ms`.
    pub fn prune_expired_memories(&self, now_ms: i64) -> Result<usize, HivekeepError> {
        const OP: &str = "prune_expired_memories";
        self.ensure_rate()?;
        let pruned = self.run(OP, OpKind::Write, |conn| {
            Ok(conn.execute(
                "DELETE FROM agent_memory WHERE expires_at IS NOT NULL AND expires_at <= ?1",
                params![now_ms],
            )?)
        })?;
        if pruned > 0 {
            tracing::info!(pruned, "expired memories pruned");
        }
        Ok(pruned)
    }
}
