//! Audit Trail
//!
//! A bounded, severity-tagged, in-memory record of every validation and storage
//! decision. It is the only data source the security monitor consumes.
//!
//! Entries carry a monotonically increasing sequence number. The ring evicts the
//! oldest entry once `capacity` is reached, and because sequence numbers are dense
//! the position of any retained entry is `seq - front.seq`.

use crate::core::time;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub const DEFAULT_AUDIT_CAPACITY: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    QueryValidated,
    QueryRejected,
    InjectionDetected,
    IdentifierChecked,
    TensorValidated,
    TensorViolation,
    BlobValidated,
    BlobSuspicious,
    DigestMismatch,
    RateLimitOk,
    RateLimitExceeded,
    Encrypted,
    EncryptFailed,
    Decrypted,
    DecryptFailed,
    RandomIssued,
    StoreWrite,
    StoreRead,
    StoreError,
    PolicyUpdated,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::QueryValidated => "query_validated",
            Self::QueryRejected => "query_rejected",
            Self::InjectionDetected => "injection_detected",
            Self::IdentifierChecked => "identifier_checked",
            Self::TensorValidated => "tensor_validated",
            Self::TensorViolation => "tensor_violation",
            Self::BlobValidated => "blob_validated",
            Self::BlobSuspicious => "blob_suspicious",
            Self::DigestMismatch => "digest_mismatch",
            Self::RateLimitOk => "rate_limit_ok",
            Self::RateLimitExceeded => "rate_limit_exceeded",
            Self::Encrypted => "encrypted",
            Self::EncryptFailed => "encrypt_failed",
            Self::Decrypted => "decrypted",
            Self::DecryptFailed => "decrypt_failed",
            Self::RandomIssued => "random_issued",
            Self::StoreWrite => "store_write",
            Self::StoreRead => "store_read",
            Self::StoreError => "store_error",
            Self::PolicyUpdated => "policy_updated",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub seq: u64,
    pub ts_ms: i64,
    pub action: AuditAction,
    pub severity: Severity,
    /// Caller identifier (agent id, client address, subsystem name).
    pub source: Option<String>,
    pub details: serde_json::Value,
}

struct AuditRing {
    entries: VecDeque<AuditEntry>,
    capacity: usize,
    next_seq: u64,
}

impl AuditRing {
    fn push(&mut self, mut entry: AuditEntry) -> u64 {
        entry.seq = self.next_seq;
        self.next_seq += 1;
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        let seq = entry.seq;
        self.entries.push_back(entry);
        seq
    }

    /// Index of the first retained entry whose seq is greater than `seq`.
    fn position_after(&self, seq: u64) -> usize {
        match self.entries.front() {
            Some(front) if seq >= front.seq => ((seq - front.seq) as usize + 1).min(self.entries.len()),
            _ => 0,
        }
    }
}

/// Cloneable handle to a shared audit ring. Clones observe the same entries.
#[derive(Clone)]
pub struct AuditTrail {
    inner: Arc<Mutex<AuditRing>>,
}

impl Default for AuditTrail {
    fn default() -> Self {
        Self::new(DEFAULT_AUDIT_CAPACITY)
    }
}

impl fmt::Debug for AuditTrail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ring = self.ring();
        f.debug_struct("AuditTrail")
            .field("len", &ring.entries.len())
            .field("capacity", &ring.capacity)
            .finish()
    }
}

impl AuditTrail {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Arc::new(Mutex::new(AuditRing {
                entries: VecDeque::with_capacity(capacity.min(DEFAULT_AUDIT_CAPACITY)),
                capacity,
                next_seq: 1,
            })),
        }
    }

    // A panic while holding the ring cannot leave it structurally invalid, so a
    // poisoned lock is recovered rather than propagated.
    fn ring(&self) -> MutexGuard<'_, AuditRing> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record(
        &self,
        action: AuditAction,
        severity: Severity,
        source: Option<&str>,
        details: serde_json::Value,
    ) -> u64 {
        self.record_at(time::now_ms(), action, severity, source, details)
    }

    pub fn record_at(
        &self,
        ts_ms: i64,
        action: AuditAction,
        severity: Severity,
        source: Option<&str>,
        details: serde_json::Value,
    ) -> u64 {
        self.ring().push(AuditEntry {
            seq: 0,
            ts_ms,
            action,
            severity,
            source: source.map(str::to_string),
            details,
        })
    }

    /// Entries recorded after `seq`, oldest first.
    pub fn entries_after(&self, seq: u64) -> Vec<AuditEntry> {
        let ring = self.ring();
        let start = ring.position_after(seq);
        ring.entries.iter().skip(start).cloned().collect()
    }

    /// Entries with `ts_ms >= since_ms`, oldest first.
    pub fn since(&self, since_ms: i64) -> Vec<AuditEntry> {
        self.ring()
            .entries
            .iter()
            .filter(|e| e.ts_ms >= since_ms)
            .cloned()
            .collect()
    }

    /// The `limit` most recent entries, newest first.
    pub fn recent(&self, limit: usize) -> Vec<AuditEntry> {
        self.ring().entries.iter().rev().take(limit).cloned().collect()
    }

    pub fn last_seq(&self) -> u64 {
        self.ring().next_seq - 1
    }

    pub fn len(&self) -> usize {
        self.ring().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.ring().capacity
    }

    pub fn count_by_severity(&self, severity: Severity) -> usize {
        self.ring()
            .entries
            .iter()
            .filter(|e| e.severity == severity)
            .count()
    }
}
