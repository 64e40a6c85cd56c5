//! Centralized database schema definitions for the agent store.
//!
//! One SQLite file ("agents.db") holds five tables:
//! 1. agents: agent records (primary key: externally assigned id).
//! 2. neural_weights: per-layer weight/bias blobs with SHA-256 checksums.
//! 3. agent_memory: episodic memory entries (auto-increment id).
//! 4. agent_metrics: append-only telemetry.
//! 5. session_state: swarm coordination checkpoints.
//!
//! Weights and memory rows cascade when their agent is deleted. Metrics are
//! telemetry and are retained.

pub const AGENT_STORE_DB_NAME: &str = "agents.db";

pub const AGENTS_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS agents (
        id TEXT PRIMARY KEY,
        agent_type TEXT NOT NULL CHECK (agent_type IN
            ('researcher','coder','analyst','optimizer','coordinator','tester','reviewer')),
        status TEXT NOT NULL DEFAULT 'spawning',
        cognitive_pattern TEXT NOT NULL DEFAULT 'adaptive',
        network_layers TEXT NOT NULL DEFAULT '[]', -- JSON array of layer sizes
        learning_rate REAL NOT NULL DEFAULT 0.01,
        momentum REAL NOT NULL DEFAULT 0.0,
        created_at INTEGER NOT NULL,
        last_active INTEGER NOT NULL,
        memory_usage INTEGER NOT NULL DEFAULT 0,
        performance_score REAL NOT NULL DEFAULT 0.0,
        spawn_latency_ms REAL,
        config TEXT NOT NULL DEFAULT '{}',
        metadata TEXT NOT NULL DEFAULT '{}'
    )
";

pub const NEURAL_WEIGHTS_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS neural_weights (
        agent_id TEXT NOT NULL,
        layer_index INTEGER NOT NULL,
        weights BLOB NOT NULL,
        biases BLOB NOT NULL,
        checksum TEXT NOT NULL,
        updated_at INTEGER NOT NULL,
        compression TEXT NOT NULL DEFAULT 'none',
        PRIMARY KEY (agent_id, layer_index),
        FOREIGN KEY(agent_id) REFERENCES agents(id) ON DELETE CASCADE
    )
";

pub const AGENT_MEMORY_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS agent_memory (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        agent_id TEXT NOT NULL,
        memory_type TEXT NOT NULL,
        key TEXT NOT NULL,
        value BLOB NOT NULL,
        importance REAL NOT NULL DEFAULT 0.5,
        access_count INTEGER NOT NULL DEFAULT 0,
        created_at INTEGER NOT NULL,
        last_accessed INTEGER NOT NULL,
        expires_at INTEGER,
        FOREIGN KEY(agent_id) REFERENCES agents(id) ON DELETE CASCADE
    )
";

pub const AGENT_METRICS_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS agent_metrics (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        agent_id TEXT NOT NULL,
        metric_type TEXT NOT NULL,
        value REAL NOT NULL,
        unit TEXT NOT NULL DEFAULT '',
        recorded_at INTEGER NOT NULL,
        context TEXT NOT NULL DEFAULT '{}'
    )
";

pub const SESSION_STATE_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS session_state (
        id TEXT PRIMARY KEY,
        topology TEXT NOT NULL,
        active_agents TEXT NOT NULL DEFAULT '[]', -- JSON array of agent ids
        coordination BLOB NOT NULL,
        is_active INTEGER NOT NULL DEFAULT 1,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    )
";

pub const AGENT_STORE_TABLES: [&str; 5] = [
    AGENTS_SCHEMA,
    NEURAL_WEIGHTS_SCHEMA,
    AGENT_MEMORY_SCHEMA,
    AGENT_METRICS_SCHEMA,
    SESSION_STATE_SCHEMA,
];

pub const AGENT_STORE_INDEXES: [&str; 8] = [
    "CREATE INDEX IF NOT EXISTS idx_agents_type ON agents(agent_type)",
    "CREATE INDEX IF NOT EXISTS idx_agents_status ON agents(status)",
    "CREATE INDEX IF NOT EXISTS idx_agents_created ON agents(created_at DESC)",
    "CREATE INDEX IF NOT EXISTS idx_memory_agent_key ON agent_memory(agent_id, key)",
    "CREATE INDEX IF NOT EXISTS idx_memory_expires ON agent_memory(expires_at)",
    "CREATE INDEX IF NOT EXISTS idx_metrics_agent_type ON agent_metrics(agent_id, metric_type, recorded_at DESC)",
    "CREATE INDEX IF NOT EXISTS idx_weights_agent ON neural_weights(agent_id)",
    "CREATE INDEX IF NOT EXISTS idx_session_active ON session_state(is_active, updated_at DESC)",
];

pub const EXPECTED_TABLES: [&str; 5] = [
    "agents",
    "neural_weights",
    "agent_memory",
    "agent_metrics",
    "session_state",
];
