//! Agent Store
//!
//! Durable, transactional storage for agent records, telemetry, neural weights,
//! memory entries and session checkpoints, in a single WAL-mode SQLite file.
//!
//! Every operation:
//! 1. passes its inputs through the validation gate (rate limit, signatures),
//!    short-circuiting before any SQL runs if they are rejected;
//! 2. runs on the single writer connection under the store mutex;
//! 3. appends an audit entry carrying its elapsed time;
//! 4. logs a warning (not an error) when it exceeds the soft latency budget.
//!
//! Writes are followed by a full WAL checkpoint according to the configured
//! `ConsistencyMode`, so that readers on a fresh connection observe them.

use crate::core::audit::{AuditAction, Severity};
use crate::core::db::{self, EngineTuning};
use crate::core::error::HivekeepError;
use crate::core::gatekeeper::{QueryParam, ValidationGate};
use crate::core::time;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef};
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, ToSql, ffi, params};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub const DEFAULT_SLOW_OP_BUDGET: Duration = Duration::from_millis(50);
pub const DEFAULT_CALLER_ID: &str = "agent-store";
pub const DEFAULT_LEARNING_RATE: f64 = 0.01;
pub const DEFAULT_MOMENTUM: f64 = 0.0;
pub const DEFAULT_COGNITIVE_PATTERN: &str = "adaptive";

const AGENT_COLUMNS: &str = "id, agent_type, status, cognitive_pattern, network_layers, learning_rate, momentum, created_at, last_active, memory_usage, performance_score, spawn_latency_ms, config, metadata";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentType {
    Researcher,
    Coder,
    Analyst,
    Optimizer,
    Coordinator,
    Tester,
    Reviewer,
}

impl AgentType {
    pub const ALL: [AgentType; 7] = [
        Self::Researcher,
        Self::Coder,
        Self::Analyst,
        Self::Optimizer,
        Self::Coordinator,
        Self::Tester,
        Self::Reviewer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Researcher => "researcher",
            Self::Coder => "coder",
            Self::Analyst => "analyst",
            Self::Optimizer => "optimizer",
            Self::Coordinator => "coordinator",
            Self::Tester => "tester",
            Self::Reviewer => "reviewer",
        }
    }
}

impl fmt::Display for AgentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentType {
    type Err = HivekeepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| HivekeepError::rejected("agent_type", format!("invalid agent type '{}'", s)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    #[default]
    Spawning,
    Active,
    Idle,
    Busy,
    Terminated,
    Error,
}

impl AgentStatus {
    pub const ALL: [AgentStatus; 6] = [
        Self::Spawning,
        Self::Active,
        Self::Idle,
        Self::Busy,
        Self::Terminated,
        Self::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Spawning => "spawning",
            Self::Active => "active",
            Self::Idle => "idle",
            Self::Busy => "busy",
            Self::Terminated => "terminated",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentStatus {
    type Err = HivekeepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| HivekeepError::rejected("status", format!("invalid agent status '{}'", s)))
    }
}

macro_rules! sql_text_enum {
    ($ty:ty) => {
        impl ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $ty {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e: HivekeepError| FromSqlError::Other(Box::new(e)))
            }
        }
    };
}

sql_text_enum!(AgentType);
sql_text_enum!(AgentStatus);

/// A persisted agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub id: String,
    pub agent_type: AgentType,
    pub status: AgentStatus,
    pub cognitive_pattern: String,
    pub network_layers: Vec<u32>,
    pub learning_rate: f64,
    pub momentum: f64,
    pub created_at: i64,
    pub last_active: i64,
    pub memory_usage: u64,
    pub performance_score: f64,
    pub spawn_latency_ms: Option<f64>,
    pub config: Value,
    pub metadata: Value,
}

/// Input to `save_agent`. Only `id` and `agent_type` are required; every other
/// field falls back to a documented default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAgent {
    pub id: String,
    #[serde(alias = "type")]
    pub agent_type: AgentType,
    #[serde(default)]
    pub status: Option<AgentStatus>,
    #[serde(default)]
    pub cognitive_pattern: Option<String>,
    #[serde(default)]
    pub network_layers: Vec<u32>,
    #[serde(default)]
    pub learning_rate: Option<f64>,
    #[serde(default)]
    pub momentum: Option<f64>,
    #[serde(default)]
    pub memory_usage: Option<u64>,
    #[serde(default)]
    pub performance_score: Option<f64>,
    #[serde(default)]
    pub spawn_latency_ms: Option<f64>,
    #[serde(default)]
    pub config: Option<Value>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

impl NewAgent {
    pub fn new(id: impl Into<String>, agent_type: AgentType) -> Self {
        Self {
            id: id.into(),
            agent_type,
            status: None,
            cognitive_pattern: None,
            network_layers: Vec::new(),
            learning_rate: None,
            momentum: None,
            memory_usage: None,
            performance_score: None,
            spawn_latency_ms: None,
            config: None,
            metadata: None,
        }
    }

    /// Untyped boundary for collaborators that hand over JSON. Null records,
    /// missing ids and missing or unknown types are rejected, never coerced.
    pub fn from_json(value: &Value) -> Result<Self, HivekeepError> {
        const OP: &str = "save_agent";
        let obj = match value {
            Value::Null => return Err(HivekeepError::rejected(OP, "agent record is null")),
            Value::Object(obj) => obj,
            _ => return Err(HivekeepError::rejected(OP, "agent record must be an object")),
        };
        match obj.get("id").and_then(Value::as_str) {
            Some(id) if !id.trim().is_empty() => {}
            _ => return Err(HivekeepError::rejected(OP, "agent id is required")),
        }
        let type_str = obj
            .get("agent_type")
            .or_else(|| obj.get("type"))
            .and_then(Value::as_str)
            .ok_or_else(|| HivekeepError::rejected(OP, "agent type is required"))?;
        AgentType::from_str(type_str)?;
        serde_json::from_value(value.clone())
            .map_err(|e| HivekeepError::rejected(OP, format!("malformed agent record: {}", e)))
    }

    pub fn with_status(mut self, status: AgentStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_network_layers(mut self, layers: Vec<u32>) -> Self {
        self.network_layers = layers;
        self
    }

    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = Some(learning_rate);
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    fn into_record(self, now: i64) -> AgentRecord {
        AgentRecord {
            id: self.id,
            agent_type: self.agent_type,
            status: self.status.unwrap_or_default(),
            cognitive_pattern: self
                .cognitive_pattern
                .unwrap_or_else(|| DEFAULT_COGNITIVE_PATTERN.to_string()),
            network_layers: self.network_layers,
            learning_rate: self.learning_rate.unwrap_or(DEFAULT_LEARNING_RATE),
            momentum: self.momentum.unwrap_or(DEFAULT_MOMENTUM),
            created_at: now,
            last_active: now,
            memory_usage: self.memory_usage.unwrap_or(0),
            performance_score: self.performance_score.unwrap_or(0.0),
            spawn_latency_ms: self.spawn_latency_ms,
            config: self.config.unwrap_or_else(|| json!({})),
            metadata: self.metadata.unwrap_or_else(|| json!({})),
        }
    }
}

/// Append-only telemetry row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMetric {
    pub id: i64,
    pub agent_id: String,
    pub metric_type: String,
    pub value: f64,
    pub unit: String,
    pub recorded_at: i64,
    pub context: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMetric {
    pub agent_id: String,
    pub metric_type: String,
    pub value: f64,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub recorded_at: Option<i64>,
    #[serde(default)]
    pub context: Option<Value>,
}

impl NewMetric {
    pub fn new(agent_id: impl Into<String>, metric_type: impl Into<String>, value: f64) -> Self {
        Self {
            agent_id: agent_id.into(),
            metric_type: metric_type.into(),
            value,
            unit: String::new(),
            recorded_at: None,
            context: None,
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    pub fn recorded_at(mut self, ts_ms: i64) -> Self {
        self.recorded_at = Some(ts_ms);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentFilter {
    pub agent_type: Option<AgentType>,
    pub status: Option<AgentStatus>,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReport {
    pub saved: usize,
    pub elapsed_ms: u128,
}

/// When writes are checkpointed out of the WAL into the main database file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsistencyMode {
    /// Full checkpoint after every committed write (read-after-write for any reader).
    FlushEveryWrite,
    /// Full checkpoint once every `writes` committed writes.
    FlushOnInterval { writes: u32 },
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub db_path: PathBuf,
    pub tuning: EngineTuning,
    pub consistency: ConsistencyMode,
    pub slow_op_budget: Duration,
    /// Caller charged by the rate limiter until [`AgentStore::as_caller`] names another.
    pub caller_id: String,
}

impl StoreConfig {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            tuning: EngineTuning::default(),
            consistency: ConsistencyMode::FlushEveryWrite,
            slow_op_budget: DEFAULT_SLOW_OP_BUDGET,
            caller_id: DEFAULT_CALLER_ID.to_string(),
        }
    }

    /// Config for `<root>/agents.db`.
    pub fn in_dir(root: &Path) -> Self {
        Self::new(db::agent_store_db_path(root))
    }

    pub fn with_consistency(mut self, consistency: ConsistencyMode) -> Self {
        self.consistency = consistency;
        self
    }

    pub fn with_tuning(mut self, tuning: EngineTuning) -> Self {
        self.tuning = tuning;
        self
    }

    pub fn with_slow_op_budget(mut self, budget: Duration) -> Self {
        self.slow_op_budget = budget;
        self
    }

    pub fn with_caller_id(mut self, caller_id: impl Into<String>) -> Self {
        self.caller_id = caller_id.into();
        self
    }
}

struct StoreState {
    conn: Option<Connection>,
    writes_since_flush: u32,
}

/// Schema facts for operational health checks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaReport {
    pub tables: Vec<String>,
    pub indexes: Vec<String>,
    pub journal_mode: String,
}

struct StoreShared {
    state: Mutex<StoreState>,
    config: StoreConfig,
    gate: ValidationGate,
}

/// Handle to one open store. Clones share the connection; each handle
/// carries its own caller identity for rate limiting and audit attribution.
#[derive(Clone)]
pub struct AgentStore {
    shared: Arc<StoreShared>,
    caller: String,
}

impl fmt::Debug for AgentStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentStore")
            .field("db_path", &self.shared.config.db_path)
            .field("consistency", &self.shared.config.consistency)
            .field("caller", &self.caller)
            .finish()
    }
}

pub(crate) enum OpKind {
    Read,
    Write,
}

impl AgentStore {
    /// Opens (creating if absent) the database file, applies engine tuning and the schema.
    pub fn open(config: StoreConfig, gate: ValidationGate) -> Result<Self, HivekeepError> {
        let started = Instant::now();
        if let Some(dir) = config.db_path.parent().filter(|d| !d.as_os_str().is_empty()) {
            db::storage_preflight(dir)?;
        }
        let conn = db::db_connect(&config.db_path, &config.tuning)
            .and_then(|conn| db::apply_schema(&conn).map(|_| conn))
            .map_err(|e| e.with_context("open", started.elapsed().as_millis()))?;
        tracing::info!(
            path = %config.db_path.display(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "agent store opened"
        );
        let caller = config.caller_id.clone();
        Ok(Self {
            shared: Arc::new(StoreShared {
                state: Mutex::new(StoreState {
                    conn: Some(conn),
                    writes_since_flush: 0,
                }),
                config,
                gate,
            }),
            caller,
        })
    }

    /// A handle on the same store whose calls are charged to `caller`.
    ///
    /// Rate limits are kept per caller, so each agent or client should work
    /// through its own handle rather than share the default one.
    pub fn as_caller(&self, caller: impl Into<String>) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            caller: caller.into(),
        }
    }

    pub fn gate(&self) -> &ValidationGate {
        &self.shared.gate
    }

    pub fn config(&self) -> &StoreConfig {
        &self.shared.config
    }

    pub fn db_path(&self) -> &Path {
        &self.shared.config.db_path
    }

    pub fn caller(&self) -> &str {
        &self.caller
    }

    /// Runs `f` on the writer connection with timing, audit, flush policy and
    /// error context applied.
    pub(crate) fn run<R>(
        &self,
        op: &str,
        kind: OpKind,
        f: impl FnOnce(&mut Connection) -> Result<R, HivekeepError>,
    ) -> Result<R, HivekeepError> {
        let started = Instant::now();
        let result = {
            let mut state = self
                .shared
                .state
                .lock()
                .map_err(|_| HivekeepError::LockPoisoned("agent store"))?;
            match state.conn.as_mut() {
                None => Err(HivekeepError::NotInitialized),
                Some(conn) => match f(conn) {
                    Ok(value) => match kind {
                        OpKind::Write => self.after_write(&mut state).map(|_| value),
                        OpKind::Read => Ok(value),
                    },
                    Err(e) => Err(e),
                },
            }
        };
        let elapsed = started.elapsed();
        let elapsed_ms = elapsed.as_millis();

        match result {
            Ok(value) => {
                if elapsed > self.shared.config.slow_op_budget {
                    tracing::warn!(
                        op,
                        elapsed_ms = elapsed_ms as u64,
                        budget_ms = self.shared.config.slow_op_budget.as_millis() as u64,
                        "store operation exceeded latency budget"
                    );
                } else {
                    tracing::debug!(op, elapsed_ms = elapsed_ms as u64, "store operation");
                }
                let action = match kind {
                    OpKind::Read => AuditAction::StoreRead,
                    OpKind::Write => AuditAction::StoreWrite,
                };
                self.gate().audit().record(
                    action,
                    Severity::Low,
                    Some(self.caller()),
                    json!({ "op": op, "elapsed_ms": elapsed_ms as u64 }),
                );
                Ok(value)
            }
            Err(e) => {
                let e = e.with_context(op, elapsed_ms);
                let severity = e.severity();
                if severity >= Severity::High {
                    tracing::error!(op, elapsed_ms = elapsed_ms as u64, error = %e, "store operation failed");
                } else {
                    tracing::debug!(op, error = %e, "store operation refused");
                }
                self.gate().audit().record(
                    AuditAction::StoreError,
                    severity,
                    Some(self.caller()),
                    json!({ "op": op, "elapsed_ms": elapsed_ms as u64, "error": e.to_string() }),
                );
                Err(e)
            }
        }
    }

    fn after_write(&self, state: &mut StoreState) -> Result<(), HivekeepError> {
        state.writes_since_flush = state.writes_since_flush.saturating_add(1);
        let due = match self.shared.config.consistency {
            ConsistencyMode::FlushEveryWrite => true,
            ConsistencyMode::FlushOnInterval { writes } => state.writes_since_flush >= writes.max(1),
        };
        if due {
            if let Some(conn) = state.conn.as_ref() {
                let report = db::checkpoint_full(conn)?;
                if report.busy {
                    tracing::debug!(
                        log_frames = report.log_frames,
                        checkpointed = report.checkpointed_frames,
                        "checkpoint could not complete; readers active"
                    );
                }
            }
            state.writes_since_flush = 0;
        }
        Ok(())
    }

    pub(crate) fn ensure_rate(&self) -> Result<(), HivekeepError> {
        let rate = self.gate().check_rate_limit(self.caller());
        if rate.accepted {
            Ok(())
        } else {
            Err(HivekeepError::RateLimited {
                identifier: self.caller().to_string(),
            })
        }
    }

    /// Inserts one agent and returns it with defaults applied.
    pub fn save_agent(&self, agent: NewAgent) -> Result<AgentRecord, HivekeepError> {
        const OP: &str = "save_agent";
        check_new_agent(OP, &agent)?;
        self.gate().check_identifier(OP, &agent.id, self.caller())?;
        let record = agent.into_record(time::now_ms());
        self.run(OP, OpKind::Write, |conn| {
            insert_agent(conn, &record)?;
            Ok(())
        })?;
        Ok(record)
    }

    pub fn get_agent(&self, id: &str) -> Result<Option<AgentRecord>, HivekeepError> {
        const OP: &str = "get_agent";
        self.gate().check_identifier(OP, id, self.caller())?;
        self.run(OP, OpKind::Read, |conn| {
            let sql = format!("SELECT {} FROM agents WHERE id = ?1", AGENT_COLUMNS);
            Ok(conn.query_row(&sql, params![id], agent_from_row).optional()?)
        })
    }

    /// Sets status and `last_active`. Raises `NotFound` for unknown ids.
    pub fn update_agent_status(&self, id: &str, status: AgentStatus) -> Result<(), HivekeepError> {
        const OP: &str = "update_agent_status";
        self.gate().check_identifier(OP, id, self.caller())?;
        let now = time::now_ms();
        self.run(OP, OpKind::Write, |conn| {
            let tx = conn.transaction()?;
            let exists: Option<i64> = tx
                .query_row("SELECT 1 FROM agents WHERE id = ?1", params![id], |row| row.get(0))
                .optional()?;
            if exists.is_none() {
                return Err(HivekeepError::NotFound(format!("agent '{}'", id)));
            }
            tx.execute(
                "UPDATE agents SET status = ?2, last_active = ?3 WHERE id = ?1",
                params![id, status, now],
            )?;
            tx.commit()?;
            Ok(())
        })
    }

    /// Removes an agent; its weights and memory entries cascade.
    pub fn delete_agent(&self, id: &str) -> Result<(), HivekeepError> {
        const OP: &str = "delete_agent";
        self.gate().check_identifier(OP, id, self.caller())?;
        self.run(OP, OpKind::Write, |conn| {
            let changed = conn.execute("DELETE FROM agents WHERE id = ?1", params![id])?;
            if changed == 0 {
                return Err(HivekeepError::NotFound(format!("agent '{}'", id)));
            }
            Ok(())
        })
    }

    pub fn record_metric(&self, metric: NewMetric) -> Result<i64, HivekeepError> {
        const OP: &str = "record_metric";
        if !metric.value.is_finite() {
            return Err(HivekeepError::rejected(OP, "metric value must be finite"));
        }
        self.gate().check_identifier(OP, &metric.agent_id, self.caller())?;
        let labels = [
            QueryParam::from(metric.metric_type.as_str()),
            QueryParam::from(metric.unit.as_str()),
        ];
        let checked = self.gate().validate_query_parameters(
            "INSERT INTO agent_metrics",
            &labels,
            Some(self.caller()),
        );
        if !checked.accepted {
            return Err(HivekeepError::rejected(OP, checked.reasons()));
        }
        let recorded_at = metric.recorded_at.unwrap_or_else(time::now_ms);
        let context = metric.context.unwrap_or_else(|| json!({}));
        self.run(OP, OpKind::Write, |conn| {
            conn.execute(
                "INSERT INTO agent_metrics(agent_id, metric_type, value, unit, recorded_at, context) VALUES(?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    metric.agent_id,
                    metric.metric_type,
                    metric.value,
                    metric.unit,
                    recorded_at,
                    context.to_string()
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Metrics for an agent, most recent first, optionally filtered by type.
    pub fn get_agent_metrics(
        &self,
        agent_id: &str,
        metric_type: Option<&str>,
    ) -> Result<Vec<AgentMetric>, HivekeepError> {
        const OP: &str = "get_agent_metrics";
        self.gate().check_identifier(OP, agent_id, self.caller())?;
        let mut sql = String::from(
            "SELECT id, agent_id, metric_type, value, unit, recorded_at, context FROM agent_metrics WHERE agent_id = ?1",
        );
        let mut binds = vec![QueryParam::from(agent_id)];
        if let Some(metric_type) = metric_type {
            let checked = self.gate().validate_query_parameters(
                &sql,
                &[QueryParam::from(metric_type)],
                Some(self.caller()),
            );
            if !checked.accepted {
                return Err(HivekeepError::rejected(OP, checked.reasons()));
            }
            sql.push_str(" AND metric_type = ?2");
            // Bound as given: stored labels are not stripped either.
            binds.push(QueryParam::from(metric_type));
        }
        sql.push_str(" ORDER BY recorded_at DESC, id DESC");
        self.run(OP, OpKind::Read, |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(binds.iter()), metric_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Inserts all agents in one transaction: all persist or none do.
    pub fn batch_save_agents(&self, agents: Vec<NewAgent>) -> Result<BatchReport, HivekeepError> {
        const OP: &str = "batch_save_agents";
        let started = Instant::now();
        self.ensure_rate()?;
        for agent in &agents {
            check_new_agent(OP, agent)?;
            self.gate().screen_identifier(OP, &agent.id, self.caller())?;
        }
        let now = time::now_ms();
        let records: Vec<AgentRecord> = agents.into_iter().map(|a| a.into_record(now)).collect();
        let saved = self.run(OP, OpKind::Write, |conn| {
            let tx = conn.transaction()?;
            for record in &records {
                insert_agent(&tx, record)?;
            }
            tx.commit()?;
            Ok(records.len())
        })?;
        let elapsed_ms = started.elapsed().as_millis();
        tracing::info!(saved, elapsed_ms = elapsed_ms as u64, "batch save committed");
        Ok(BatchReport { saved, elapsed_ms })
    }

    /// All agents, newest first, optionally filtered by type and status.
    pub fn get_all_agents(&self, filter: &AgentFilter) -> Result<Vec<AgentRecord>, HivekeepError> {
        const OP: &str = "get_all_agents";
        self.ensure_rate()?;
        let mut sql = format!("SELECT {} FROM agents WHERE 1 = 1", AGENT_COLUMNS);
        let mut binds = Vec::new();
        if let Some(agent_type) = filter.agent_type {
            binds.push(QueryParam::from(agent_type.as_str()));
            sql.push_str(&format!(" AND agent_type = ?{}", binds.len()));
        }
        if let Some(status) = filter.status {
            binds.push(QueryParam::from(status.as_str()));
            sql.push_str(&format!(" AND status = ?{}", binds.len()));
        }
        sql.push_str(" ORDER BY created_at DESC, rowid DESC");
        if let Some(limit) = filter.limit {
            binds.push(QueryParam::Integer(i64::from(limit)));
            sql.push_str(&format!(" LIMIT ?{}", binds.len()));
        }

        let checked = self
            .gate()
            .validate_query_parameters(&sql, &binds, Some(self.caller()));
        if !checked.accepted {
            return Err(HivekeepError::rejected(OP, checked.reasons()));
        }
        self.run(OP, OpKind::Read, |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(
                    rusqlite::params_from_iter(checked.sanitized.iter()),
                    agent_from_row,
                )?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn count_agents(&self) -> Result<u64, HivekeepError> {
        self.run("count_agents", OpKind::Read, |conn| {
            let n: i64 = conn.query_row("SELECT COUNT(*) FROM agents", [], |row| row.get(0))?;
            Ok(n as u64)
        })
    }

    /// Forces a full WAL checkpoint regardless of consistency mode.
    pub fn flush(&self) -> Result<db::CheckpointReport, HivekeepError> {
        self.run("flush", OpKind::Read, |conn| db::checkpoint_full(conn))
    }

    pub fn table_names(&self) -> Result<Vec<String>, HivekeepError> {
        self.run("table_names", OpKind::Read, |conn| db::table_names(conn))
    }

    pub fn index_names(&self) -> Result<Vec<String>, HivekeepError> {
        self.run("index_names", OpKind::Read, |conn| db::index_names(conn))
    }

    pub fn journal_mode(&self) -> Result<String, HivekeepError> {
        self.run("journal_mode", OpKind::Read, |conn| db::journal_mode(conn))
    }

    pub fn schema_report(&self) -> Result<SchemaReport, HivekeepError> {
        self.run("schema_report", OpKind::Read, |conn| {
            Ok(SchemaReport {
                tables: db::table_names(conn)?,
                indexes: db::index_names(conn)?,
                journal_mode: db::journal_mode(conn)?,
            })
        })
    }

    /// Releases the engine handle. Later calls fail with `NotInitialized`.
    pub fn close(&self) -> Result<(), HivekeepError> {
        let mut state = self
            .shared
            .state
            .lock()
            .map_err(|_| HivekeepError::LockPoisoned("agent store"))?;
        let Some(conn) = state.conn.take() else {
            return Err(HivekeepError::NotInitialized);
        };
        if let Err(e) = db::checkpoint_full(&conn) {
            tracing::warn!(error = %e, "final checkpoint failed");
        }
        conn.close()
            .map_err(|(_, e)| HivekeepError::RusqliteError(e).with_context("close", 0))?;
        tracing::info!(path = %self.shared.config.db_path.display(), "agent store closed");
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.shared
            .state
            .lock()
            .map(|state| state.conn.is_some())
            .unwrap_or(false)
    }
}

fn check_new_agent(op: &str, agent: &NewAgent) -> Result<(), HivekeepError> {
    if agent.id.trim().is_empty() {
        return Err(HivekeepError::rejected(op, "agent id is required"));
    }
    for (name, value) in [
        ("learning_rate", agent.learning_rate),
        ("momentum", agent.momentum),
        ("performance_score", agent.performance_score),
        ("spawn_latency_ms", agent.spawn_latency_ms),
    ] {
        if let Some(v) = value {
            if !v.is_finite() {
                return Err(HivekeepError::rejected(op, format!("{} must be finite", name)));
            }
        }
    }
    Ok(())
}

fn insert_agent(conn: &Connection, record: &AgentRecord) -> Result<(), HivekeepError> {
    let layers = serde_json::to_string(&record.network_layers)?;
    conn.execute(
        "INSERT INTO agents(id, agent_type, status, cognitive_pattern, network_layers, learning_rate, momentum, created_at, last_active, memory_usage, performance_score, spawn_latency_ms, config, metadata)
         VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        params![
            record.id,
            record.agent_type,
            record.status,
            record.cognitive_pattern,
            layers,
            record.learning_rate,
            record.momentum,
            record.created_at,
            record.last_active,
            record.memory_usage as i64,
            record.performance_score,
            record.spawn_latency_ms,
            record.config.to_string(),
            record.metadata.to_string(),
        ],
    )
    .map_err(|e| map_constraint(e, &record.id))?;
    Ok(())
}

/// Maps primary-key and foreign-key violations to semantic errors.
pub(crate) fn map_constraint(e: rusqlite::Error, id: &str) -> HivekeepError {
    if let rusqlite::Error::SqliteFailure(err, _) = &e {
        if err.code == ErrorCode::ConstraintViolation {
            match err.extended_code {
                ffi::SQLITE_CONSTRAINT_PRIMARYKEY | ffi::SQLITE_CONSTRAINT_UNIQUE => {
                    return HivekeepError::AlreadyExists(format!("agent '{}'", id));
                }
                ffi::SQLITE_CONSTRAINT_FOREIGNKEY => {
                    return HivekeepError::NotFound(format!("agent '{}'", id));
                }
                _ => {}
            }
        }
    }
    HivekeepError::RusqliteError(e)
}

pub(crate) fn json_column<T: DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn agent_from_row(row: &Row<'_>) -> rusqlite::Result<AgentRecord> {
    Ok(AgentRecord {
        id: row.get(0)?,
        agent_type: row.get(1)?,
        status: row.get(2)?,
        cognitive_pattern: row.get(3)?,
        network_layers: json_column(row, 4)?,
        learning_rate: row.get(5)?,
        momentum: row.get(6)?,
        created_at: row.get(7)?,
        last_active: row.get(8)?,
        memory_usage: row.get::<_, i64>(9)?.max(0) as u64,
        performance_score: row.get(10)?,
        spawn_latency_ms: row.get(11)?,
        config: json_column(row, 12)?,
        metadata: json_column(row, 13)?,
    })
}

fn metric_from_row(row: &Row<'_>) -> rusqlite::Result<AgentMetric> {
    Ok(AgentMetric {
        id: row.get(0)?,
        agent_id: row.get(1)?,
        metric_type: row.get(2)?,
        value: row.get(3)?,
        unit: row.get(4)?,
        recorded_at: row.get(5)?,
        context: json_column(row, 6)?,
    })
}
