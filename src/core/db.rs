use crate::core::error::HivekeepError;
use crate::core::schemas;
use rusqlite::Connection;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Engine tuning applied to every connection, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineTuning {
    /// Page cache size in KiB (applied as a negative `cache_size`).
    pub cache_size_kb: i64,
    pub mmap_size_bytes: i64,
    pub busy_timeout: Duration,
}

impl Default for EngineTuning {
    fn default() -> Self {
        Self {
            cache_size_kb: 64 * 1024,
            mmap_size_bytes: 256 * 1024 * 1024,
            busy_timeout: Duration::from_secs(5),
        }
    }
}

/// Opens `db_path`, creating the containing directory if absent, and applies the
/// fixed pragma sequence: WAL journal, bounded page cache, in-memory temp store,
/// memory-mapped I/O ceiling, busy timeout, foreign keys, automatic indexes.
pub fn db_connect(db_path: &Path, tuning: &EngineTuning) -> Result<Connection, HivekeepError> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let conn = Connection::open(db_path)?;
    let mode: String = conn.query_row("PRAGMA journal_mode=WAL;", [], |row| row.get(0))?;
    if !mode.eq_ignore_ascii_case("wal") {
        tracing::warn!(path = %db_path.display(), mode = %mode, "engine refused WAL journal mode");
    }
    conn.execute_batch(&format!(
        "PRAGMA cache_size=-{};
         PRAGMA temp_store=MEMORY;",
        tuning.cache_size_kb
    ))?;
    // mmap_size echoes the applied value as a row, or nothing when the VFS lacks mmap.
    {
        let mut stmt = conn.prepare(&format!("PRAGMA mmap_size={};", tuning.mmap_size_bytes))?;
        let mut rows = stmt.query([])?;
        rows.next()?;
    }
    conn.busy_timeout(tuning.busy_timeout)?;
    conn.execute_batch(
        "PRAGMA foreign_keys=ON;
         PRAGMA automatic_index=ON;",
    )?;
    Ok(conn)
}

pub fn agent_store_db_path(root: &Path) -> PathBuf {
    root.join(schemas::AGENT_STORE_DB_NAME)
}

/// Creates all tables and indexes. Idempotent.
pub fn apply_schema(conn: &Connection) -> Result<(), HivekeepError> {
    for ddl in schemas::AGENT_STORE_TABLES {
        conn.execute(ddl, [])?;
    }
    for ddl in schemas::AGENT_STORE_INDEXES {
        conn.execute(ddl, [])?;
    }
    Ok(())
}

/// Result of `PRAGMA wal_checkpoint(FULL)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckpointReport {
    pub busy: bool,
    pub log_frames: i64,
    pub checkpointed_frames: i64,
}

pub fn checkpoint_full(conn: &Connection) -> Result<CheckpointReport, HivekeepError> {
    let report = conn.query_row("PRAGMA wal_checkpoint(FULL);", [], |row| {
        Ok(CheckpointReport {
            busy: row.get::<_, i64>(0)? != 0,
            log_frames: row.get(1)?,
            checkpointed_frames: row.get(2)?,
        })
    })?;
    Ok(report)
}

pub fn journal_mode(conn: &Connection) -> Result<String, HivekeepError> {
    Ok(conn.query_row("PRAGMA journal_mode;", [], |row| row.get(0))?)
}

pub fn table_names(conn: &Connection) -> Result<Vec<String>, HivekeepError> {
    sqlite_master_names(conn, "table")
}

pub fn index_names(conn: &Connection) -> Result<Vec<String>, HivekeepError> {
    sqlite_master_names(conn, "index")
}

fn sqlite_master_names(conn: &Connection, kind: &str) -> Result<Vec<String>, HivekeepError> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type = ?1 AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )?;
    let names = stmt
        .query_map([kind], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(names)
}

/// Confirms `dir` exists (creating it if needed) and accepts writes.
///
/// Any failure is reported as `ConfigurationInvalid`: the store was pointed
/// somewhere it cannot live.
pub fn storage_preflight(dir: &Path) -> Result<(), HivekeepError> {
    let unusable = |e: std::io::Error| {
        HivekeepError::ConfigurationInvalid(format!(
            "STORAGE_PREFLIGHT_FAILED: {} is not writable: {}",
            dir.display(),
            e
        ))
    };
    fs::create_dir_all(dir).map_err(unusable)?;
    let marker = dir.join(".hivekeep-preflight");
    fs::write(&marker, b"ok").map_err(unusable)?;
    fs::remove_file(&marker).map_err(unusable)?;
    Ok(())
}
