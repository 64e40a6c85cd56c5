//! Swarm session checkpoints.

use crate::core::error::HivekeepError;
use crate::core::time;
use crate::plugins::agents::{AgentStore, OpKind, json_column};
use rusqlite::{OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    /// Generated on save when empty.
    #[serde(default)]
    pub id: String,
    pub topology: String,
    #[serde(default)]
    pub active_agents: Vec<String>,
    #[serde(default)]
    pub coordination: Vec<u8>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub updated_at: i64,
}

fn default_active() -> bool {
    true
}

impl SessionState {
    pub fn new(topology: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            topology: topology.into(),
            active_agents: Vec::new(),
            coordination: Vec::new(),
            is_active: true,
            created_at: 0,
            updated_at: 0,
        }
    }

    pub fn with_agents(mut self, agents: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.active_agents = agents.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_coordination(mut self, blob: impl Into<Vec<u8>>) -> Self {
        self.coordination = blob.into();
        self
    }
}

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<SessionState> {
    Ok(SessionState {
        id: row.get(0)?,
        topology: row.get(1)?,
        active_agents: json_column(row, 2)?,
        coordination: row.get(3)?,
        is_active: row.get::<_, i64>(4)? != 0,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

impl AgentStore {
    /// Insert-or-replace. A re-saved session keeps its original `created_at`.
    pub fn save_session(&self, mut session: SessionState) -> Result<SessionState, HivekeepError> {
        const OP: &str = "save_session";
        if session.id.trim().is_empty() {
            session.id = time::new_event_id();
        }
        self.gate().check_identifier(OP, &session.id, self.caller())?;
        self.gate().screen_identifier(OP, &session.topology, self.caller())?;
        for agent_id in &session.active_agents {
            self.gate().screen_identifier(OP, agent_id, self.caller())?;
        }
        let max_blob = self.gate().current_policy().input.max_blob_bytes;
        if session.coordination.len() > max_blob {
            return Err(HivekeepError::rejected(
                OP,
                format!(
                    "coordination blob is {} bytes, ceiling is {}",
                    session.coordination.len(),
                    max_blob
                ),
            ));
        }

        let now = time::now_ms();
        let agents = serde_json::to_string(&session.active_agents)?;
        self.run(OP, OpKind::Write, |conn| {
            let tx = conn.transaction()?;
            let existing: Option<i64> = tx
                .query_row(
                    "SELECT created_at FROM session_state WHERE id = ?1",
                    params![session.id],
                    |row| row.get(0),
                )
                .optional()?;
            session.created_at = existing.unwrap_or(now);
            session.updated_at = now;
            tx.execute(
                "INSERT OR REPLACE INTO session_state(id, topology, active_agents, coordination, is_active, created_at, updated_at)
                 VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    session.id,
                    session.topology,
                    agents,
                    session.coordination,
                    session.is_active as i64,
                    session.created_at,
                    session.updated_at
                ],
            )?;
            tx.commit()?;
            Ok(())
        })?;
        Ok(session)
    }

    /// Most recently updated active session that has not timed out.
    pub fn get_active_session(&self) -> Result<Option<SessionState>, HivekeepError> {
        self.get_active_session_at(time::now_ms())
    }

    /// Sessions idle for longer than `session.timeout_minutes` are treated as stale
    /// and skipped; their rows stay in place until deactivated or overwritten.
    pub fn get_active_session_at(&self, now_ms: i64) -> Result<Option<SessionState>, HivekeepError> {
        self.ensure_rate()?;
        let timeout = self.gate().current_policy().session.timeout_minutes;
        let cutoff = now_ms - i64::from(timeout) * time::MINUTE_MS;
        self.run("get_active_session", OpKind::Read, |conn| {
            Ok(conn
                .query_row(
                    "SELECT id, topology, active_agents, coordination, is_active, created_at, updated_at
                     FROM session_state WHERE is_active = 1 AND updated_at >= ?1
                     ORDER BY updated_at DESC, rowid DESC LIMIT 1",
                    params![cutoff],
                    session_from_row,
                )
                .optional()?)
        })
    }

    pub fn deactivate_session(&self, id: &str) -> Result<(), HivekeepError> {
        const OP: &str = "deactivate_session";
        self.gate().check_identifier(OP, id, self.caller())?;
        let now = time::now_ms();
        self.run(OP, OpKind::Write, |conn| {
            let changed = conn.execute(
                "UPDATE session_state SET is_active = 0, updated_at = ?2 WHERE id = ?1",
                params![id, now],
            )?;
            if changed == 0 {
                return Err(HivekeepError::NotFound(format!("session '{}'", id)));
            }
            Ok(())
        })
    }
}
