//! Validation Gate
//!
//! Sanitizes and scores every inbound parameter before it reaches storage or
//! computation:
//! - Query parameters scanned against a pluggable injection signature table
//! - Numeric tensors bounded in length and magnitude
//! - Weight blobs verified against their SHA-256 digest plus heuristic scans
//! - Per-identifier fixed-window rate limiting
//! - Secret encryption and CSPRNG values
//!
//! The gate reports; it does not enforce. A failed check comes back as
//! `accepted == false` with diagnostics and the caller decides whether to reject.
//! The one exception is a digest mismatch, which callers must surface as an
//! integrity failure.
//!
//! Every call appends exactly one audit entry, whatever the outcome.

use crate::core::audit::{AuditAction, AuditTrail, Severity};
use crate::core::crypto::{self, SecretBox};
use crate::core::error::HivekeepError;
use crate::core::time;
use crate::plugins::policy::{PolicyManager, SecurityPolicy};
use regex::Regex;
use rusqlite::ToSql;
use rusqlite::types::{Null, ToSqlOutput};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

/// Characters removed by the generic string sanitizer.
pub const STRIPPED_CHARS: &[char] = &['\'', '"', '`', ';', '\\', '-'];

const OVERSIZE_PENALTY: u8 = 20;
const TOO_MANY_ELEMENTS_PENALTY: u8 = 50;
const NON_FINITE_PENALTY: u8 = 25;
const MAGNITUDE_PENALTY: u8 = 15;
const BLOB_HEURISTIC_PENALTY: u8 = 20;
const BLOB_NON_FINITE_PENALTY: u8 = 30;
const RATE_WINDOW_PRUNE_THRESHOLD: usize = 10_000;

/// A bindable SQL parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryParam {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl QueryParam {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for QueryParam {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for QueryParam {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for QueryParam {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<f64> for QueryParam {
    fn from(v: f64) -> Self {
        Self::Real(v)
    }
}

impl ToSql for QueryParam {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Self::Null => ToSqlOutput::from(Null),
            Self::Integer(v) => ToSqlOutput::from(*v),
            Self::Real(v) => ToSqlOutput::from(*v),
            Self::Text(s) => ToSqlOutput::from(s.as_str()),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    InjectionSignature,
    Oversized,
    TooManyElements,
    NonFinite,
    MagnitudeExceeded,
    DigestMismatch,
    ExcessiveZeros,
    UniformValues,
    ExtremeMagnitudes,
    RateLimitExceeded,
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::InjectionSignature => "injection_signature",
            Self::Oversized => "oversized",
            Self::TooManyElements => "too_many_elements",
            Self::NonFinite => "non_finite",
            Self::MagnitudeExceeded => "magnitude_exceeded",
            Self::DigestMismatch => "digest_mismatch",
            Self::ExcessiveZeros => "excessive_zeros",
            Self::UniformValues => "uniform_values",
            Self::ExtremeMagnitudes => "extreme_magnitudes",
            Self::RateLimitExceeded => "rate_limit_exceeded",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub kind: ViolationKind,
    /// Parameter index or signature name, when applicable.
    pub field: Option<String>,
    pub message: String,
    pub penalty: u8,
}

impl Violation {
    fn new(kind: ViolationKind, field: Option<String>, message: String, penalty: u8) -> Self {
        Self {
            kind,
            field,
            message,
            penalty,
        }
    }
}

/// Outcome of a gate check. `sanitized` is the cleaned form of the input.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GateResult<T> {
    pub accepted: bool,
    /// 0 (hostile) to 100 (clean).
    pub score: u8,
    pub violations: Vec<Violation>,
    pub sanitized: T,
}

impl<T> GateResult<T> {
    pub fn has(&self, kind: ViolationKind) -> bool {
        self.violations.iter().any(|v| v.kind == kind)
    }

    pub fn digest_mismatch(&self) -> bool {
        self.has(ViolationKind::DigestMismatch)
    }

    /// Semicolon-joined violation messages, for error reasons.
    pub fn reasons(&self) -> String {
        self.violations
            .iter()
            .map(|v| v.message.as_str())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

fn score_from(violations: &[Violation]) -> u8 {
    violations
        .iter()
        .fold(100u8, |score, v| score.saturating_sub(v.penalty))
}

#[derive(Debug)]
pub struct Signature {
    pub name: String,
    pub pattern: Regex,
    pub penalty: u8,
}

/// Ordered list of pattern -> penalty mappings. Heuristic only: a clean scan is
/// not a proof of safety.
#[derive(Debug, Default)]
pub struct SignatureTable {
    signatures: Vec<Signature>,
}

impl SignatureTable {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Keyword statements, stacked statements, comment markers, tautologies and encoded quotes.
    pub fn sql_defaults() -> Self {
        let mut table = Self::empty();
        let defaults: [(&str, &str, u8); 6] = [
            (
                "stacked_statement",
                r"(?i);\s*(select|insert|update|delete|drop|alter|create|truncate|exec|attach|pragma)\b",
                40,
            ),
            (
                "keyword_terminator",
                r"(?i)\b(select|insert|update|delete|drop|alter|create|truncate|exec|union)\b[^;]*;",
                30,
            ),
            (
                "sql_statement",
                r"(?i)\b(union\s+(all\s+)?select|select\s+.+\s+from|insert\s+into|delete\s+from|drop\s+(table|database|index)|update\s+\w+\s+set|alter\s+table|truncate\s+table|exec(ute)?\s*\()",
                30,
            ),
            ("comment_marker", r"(--|/\*|\*/)", 20),
            (
                "tautology",
                r#"(?i)['"]\s*or\s+['"]?\w+['"]?\s*=\s*['"]?\w+"#,
                30,
            ),
            (
                "encoded_quote",
                r"(?i)(%27|%22|%3b|&#0?39;|&#x27;|&quot;|\\x27|\\u0027)",
                25,
            ),
        ];
        for (name, pattern, penalty) in defaults {
            table.signatures.push(Signature {
                name: name.to_string(),
                pattern: Regex::new(pattern).unwrap(),
                penalty,
            });
        }
        table
    }

    pub fn push(&mut self, name: &str, pattern: &str, penalty: u8) -> Result<(), HivekeepError> {
        let pattern = Regex::new(pattern).map_err(|e| {
            HivekeepError::ConfigurationInvalid(format!("signature '{}': {}", name, e))
        })?;
        self.signatures.push(Signature {
            name: name.to_string(),
            pattern,
            penalty,
        });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.signatures.iter().map(|s| s.name.as_str()).collect()
    }

    /// Every signature matching `text`.
    pub fn scan<'a>(&'a self, text: &'a str) -> impl Iterator<Item = &'a Signature> + 'a {
        self.signatures
            .iter()
            .filter(move |s| s.pattern.is_match(text))
    }
}

/// Strips quote and terminator characters, then truncates to `max_bytes` on a char boundary.
pub fn sanitize_string(input: &str, max_bytes: usize) -> String {
    let mut out: String = input.chars().filter(|c| !STRIPPED_CHARS.contains(c)).collect();
    truncate_to_boundary(&mut out, max_bytes);
    out
}

fn truncate_to_boundary(s: &mut String, max_bytes: usize) {
    if s.len() <= max_bytes {
        return;
    }
    let mut cut = max_bytes;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    s.truncate(cut);
}

#[derive(Debug, Clone, Copy)]
struct RateWindow {
    start_ms: i64,
    count: u32,
}

/// The validation gate. Cheap to clone; clones share rate-limit state and audit trail.
#[derive(Clone)]
pub struct ValidationGate {
    policy: PolicyManager,
    audit: AuditTrail,
    signatures: Arc<SignatureTable>,
    rate_windows: Arc<Mutex<FxHashMap<String, RateWindow>>>,
    secrets: SecretBox,
}

impl fmt::Debug for ValidationGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationGate")
            .field("environment", &self.policy.environment())
            .field("signatures", &self.signatures.len())
            .finish()
    }
}

impl ValidationGate {
    /// Gate with the default SQL signature table and a freshly generated secret key.
    pub fn new(policy: PolicyManager, audit: AuditTrail) -> Result<Self, HivekeepError> {
        Ok(Self::with_parts(
            policy,
            audit,
            SignatureTable::sql_defaults(),
            SecretBox::generate()?,
        ))
    }

    pub fn with_parts(
        policy: PolicyManager,
        audit: AuditTrail,
        signatures: SignatureTable,
        secrets: SecretBox,
    ) -> Self {
        Self {
            policy,
            audit,
            signatures: Arc::new(signatures),
            rate_windows: Arc::new(Mutex::new(FxHashMap::default())),
            secrets,
        }
    }

    pub fn audit(&self) -> &AuditTrail {
        &self.audit
    }

    pub fn policy(&self) -> &PolicyManager {
        &self.policy
    }

    pub fn signatures(&self) -> &SignatureTable {
        &self.signatures
    }

    pub fn validate_query_parameters(
        &self,
        query: &str,
        params: &[QueryParam],
        caller: Option<&str>,
    ) -> GateResult<Vec<QueryParam>> {
        let limits = self.policy.current().input;
        let mut violations = Vec::new();
        let mut sanitized = Vec::with_capacity(params.len());
        let mut matched = Vec::new();

        for (idx, param) in params.iter().enumerate() {
            let QueryParam::Text(text) = param else {
                sanitized.push(param.clone());
                continue;
            };
            for sig in self.signatures.scan(text) {
                matched.push(sig.name.clone());
                violations.push(Violation::new(
                    ViolationKind::InjectionSignature,
                    Some(sig.name.clone()),
                    format!("parameter {} matches signature '{}'", idx, sig.name),
                    sig.penalty,
                ));
            }
            if text.len() > limits.max_param_bytes {
                violations.push(Violation::new(
                    ViolationKind::Oversized,
                    Some(idx.to_string()),
                    format!(
                        "parameter {} is {} bytes, ceiling is {}",
                        idx,
                        text.len(),
                        limits.max_param_bytes
                    ),
                    OVERSIZE_PENALTY,
                ));
            }
            sanitized.push(QueryParam::Text(sanitize_string(
                text,
                limits.max_param_bytes,
            )));
        }

        let score = score_from(&violations);
        let accepted = violations.is_empty();
        let (action, severity) = if !matched.is_empty() {
            (AuditAction::InjectionDetected, Severity::High)
        } else if !accepted {
            (AuditAction::QueryRejected, Severity::Medium)
        } else {
            (AuditAction::QueryValidated, Severity::Low)
        };
        let mut preview = query.to_string();
        truncate_to_boundary(&mut preview, 200);
        self.audit.record(
            action,
            severity,
            caller,
            json!({
                "query": preview,
                "params": params.len(),
                "signatures": matched,
                "score": score,
            }),
        );
        if !matched.is_empty() {
            tracing::warn!(caller = ?caller, score, "injection signature matched");
        }

        GateResult {
            accepted,
            score,
            violations,
            sanitized,
        }
    }

    pub fn validate_numeric_tensor(
        &self,
        values: &[f32],
        caller: Option<&str>,
    ) -> GateResult<Vec<f32>> {
        let limits = self.policy.current().input;
        let bound = limits.max_value_magnitude;
        let mut violations = Vec::new();

        let oversized = values.len() > limits.max_tensor_elements;
        if oversized {
            violations.push(Violation::new(
                ViolationKind::TooManyElements,
                None,
                format!(
                    "tensor has {} elements, ceiling is {}",
                    values.len(),
                    limits.max_tensor_elements
                ),
                TOO_MANY_ELEMENTS_PENALTY,
            ));
        }

        let mut non_finite = 0usize;
        let mut over_bound = 0usize;
        let sanitized: Vec<f32> = values
            .iter()
            .take(limits.max_tensor_elements)
            .map(|&v| {
                if !v.is_finite() {
                    non_finite += 1;
                    0.0
                } else if v.abs() > bound {
                    over_bound += 1;
                    v.clamp(-bound, bound)
                } else {
                    v
                }
            })
            .collect();
        // Elements beyond the ceiling are still inspected for reporting.
        for &v in values.iter().skip(limits.max_tensor_elements) {
            if !v.is_finite() {
                non_finite += 1;
            } else if v.abs() > bound {
                over_bound += 1;
            }
        }

        if non_finite > 0 {
            violations.push(Violation::new(
                ViolationKind::NonFinite,
                None,
                format!("{} non-finite values replaced with zero", non_finite),
                NON_FINITE_PENALTY,
            ));
        }
        if over_bound > 0 {
            violations.push(Violation::new(
                ViolationKind::MagnitudeExceeded,
                None,
                format!("{} values exceed magnitude bound {}", over_bound, bound),
                MAGNITUDE_PENALTY,
            ));
        }

        let score = score_from(&violations);
        let (action, severity) = if violations.is_empty() {
            (AuditAction::TensorValidated, Severity::Low)
        } else {
            (AuditAction::TensorViolation, Severity::Medium)
        };
        self.audit.record(
            action,
            severity,
            caller,
            json!({
                "elements": values.len(),
                "non_finite": non_finite,
                "magnitude_violations": over_bound,
                "oversized": oversized,
                "score": score,
            }),
        );

        GateResult {
            accepted: !oversized,
            score,
            violations,
            sanitized,
        }
    }

    /// Verifies `bytes` against `expected_digest` (hex SHA-256) and scans the
    /// blob, read as little-endian f32 values, for suspicious shapes.
    pub fn validate_weight_blob(
        &self,
        bytes: &[u8],
        expected_digest: &str,
        caller: Option<&str>,
    ) -> GateResult<()> {
        let limits = self.policy.current().input;
        let actual = crypto::sha256_hex(bytes);
        let digest_ok = actual.eq_ignore_ascii_case(expected_digest.trim());
        let mut violations = Vec::new();

        if !digest_ok {
            violations.push(Violation::new(
                ViolationKind::DigestMismatch,
                None,
                format!("digest mismatch: expected {}, computed {}", expected_digest, actual),
                100,
            ));
        }
        if bytes.len() > limits.max_blob_bytes {
            violations.push(Violation::new(
                ViolationKind::Oversized,
                None,
                format!(
                    "blob is {} bytes, ceiling is {}",
                    bytes.len(),
                    limits.max_blob_bytes
                ),
                OVERSIZE_PENALTY,
            ));
        }
        violations.extend(blob_heuristics(bytes, limits.max_value_magnitude));

        let score = if digest_ok {
            score_from(&violations)
        } else {
            0
        };
        let details = json!({
            "bytes": bytes.len(),
            "expected": expected_digest,
            "actual": actual,
            "violations": violations.iter().map(|v| v.kind.to_string()).collect::<Vec<_>>(),
            "score": score,
        });
        if !digest_ok {
            tracing::error!(caller = ?caller, expected = expected_digest, actual = %actual, "weight blob digest mismatch");
            self.audit
                .record(AuditAction::DigestMismatch, Severity::Critical, caller, details);
        } else if !violations.is_empty() {
            self.audit
                .record(AuditAction::BlobSuspicious, Severity::Medium, caller, details);
        } else {
            self.audit
                .record(AuditAction::BlobValidated, Severity::Low, caller, details);
        }

        GateResult {
            accepted: digest_ok,
            score,
            violations,
            sanitized: (),
        }
    }

    pub fn check_rate_limit(&self, identifier: &str) -> GateResult<()> {
        self.check_rate_limit_at(identifier, time::now_ms())
    }

    /// Fixed window per identifier. The score drops linearly from 100 at half the
    /// ceiling to 0 at the ceiling, so callers get an early warning before rejection.
    pub fn check_rate_limit_at(&self, identifier: &str, now_ms: i64) -> GateResult<()> {
        let policy = self.policy.current().rate_limit;
        let max = policy.max_requests.max(1);

        let count = {
            let mut windows = self
                .rate_windows
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if windows.len() > RATE_WINDOW_PRUNE_THRESHOLD {
                windows.retain(|_, w| now_ms - w.start_ms < policy.window_ms);
            }
            let window = windows
                .entry(identifier.to_string())
                .or_insert(RateWindow {
                    start_ms: now_ms,
                    count: 0,
                });
            if now_ms - window.start_ms >= policy.window_ms {
                *window = RateWindow {
                    start_ms: now_ms,
                    count: 0,
                };
            }
            window.count = window.count.saturating_add(1);
            window.count
        };

        let accepted = count <= max;
        let ratio = count as f64 / max as f64;
        let score = if !accepted {
            0
        } else if ratio <= 0.5 {
            100
        } else {
            ((1.0 - ratio) * 200.0).round().clamp(0.0, 100.0) as u8
        };

        let mut violations = Vec::new();
        if accepted {
            self.audit.record_at(
                now_ms,
                AuditAction::RateLimitOk,
                Severity::Low,
                Some(identifier),
                json!({ "count": count, "max": max, "score": score }),
            );
        } else {
            violations.push(Violation::new(
                ViolationKind::RateLimitExceeded,
                Some(identifier.to_string()),
                format!(
                    "{} requests in window of {}ms, ceiling is {}",
                    count, policy.window_ms, max
                ),
                100,
            ));
            tracing::warn!(identifier, count, max, "rate limit exceeded");
            self.audit.record_at(
                now_ms,
                AuditAction::RateLimitExceeded,
                Severity::High,
                Some(identifier),
                json!({ "count": count, "max": max, "window_ms": policy.window_ms }),
            );
        }

        GateResult {
            accepted,
            score,
            violations,
            sanitized: (),
        }
    }

    /// Requests counted in the identifier's current window.
    pub fn rate_limit_usage(&self, identifier: &str) -> u32 {
        self.rate_windows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(identifier)
            .map(|w| w.count)
            .unwrap_or(0)
    }

    pub fn reset_rate_limits(&self) {
        self.rate_windows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Narrow validator for primary-key paths.
    ///
    /// Applies the rate limit and the injection signatures but never strips
    /// characters: the generic sanitizer removes `-`, which would turn the
    /// identifier `a-1` into `a1` and silently address a different row.
    pub fn check_identifier(
        &self,
        op: &str,
        identifier: &str,
        caller: &str,
    ) -> Result<(), HivekeepError> {
        let rate = self.check_rate_limit(caller);
        if !rate.accepted {
            return Err(HivekeepError::RateLimited {
                identifier: caller.to_string(),
            });
        }
        self.screen_identifier(op, identifier, caller)
    }

    /// The signature half of `check_identifier`, without consuming rate-limit budget.
    /// Batch paths charge the rate limit once and screen each identifier.
    pub fn screen_identifier(
        &self,
        op: &str,
        identifier: &str,
        caller: &str,
    ) -> Result<(), HivekeepError> {
        if identifier.trim().is_empty() {
            self.audit.record(
                AuditAction::QueryRejected,
                Severity::Medium,
                Some(caller),
                json!({ "op": op, "reason": "empty identifier" }),
            );
            return Err(HivekeepError::rejected(op, "identifier must not be empty"));
        }
        let limit = self.policy.current().input.max_param_bytes;
        if identifier.len() > limit {
            self.audit.record(
                AuditAction::QueryRejected,
                Severity::Medium,
                Some(caller),
                json!({ "op": op, "reason": "identifier too long", "bytes": identifier.len() }),
            );
            return Err(HivekeepError::rejected(
                op,
                format!("identifier is {} bytes, ceiling is {}", identifier.len(), limit),
            ));
        }
        let matched: Vec<String> = self
            .signatures
            .scan(identifier)
            .map(|s| s.name.clone())
            .collect();
        if !matched.is_empty() {
            tracing::warn!(op, caller, "injection signature in identifier");
            self.audit.record(
                AuditAction::InjectionDetected,
                Severity::High,
                Some(caller),
                json!({ "op": op, "signatures": matched }),
            );
            return Err(HivekeepError::rejected(
                op,
                format!("identifier matches signatures: {}", matched.join(", ")),
            ));
        }
        self.audit.record(
            AuditAction::IdentifierChecked,
            Severity::Low,
            Some(caller),
            json!({ "op": op }),
        );
        Ok(())
    }

    /// Seals `plaintext`. Every outcome is audited; the plaintext never is.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, HivekeepError> {
        let limit = self.policy.current().input.max_param_bytes;
        if plaintext.len() > limit {
            self.audit.record(
                AuditAction::QueryRejected,
                Severity::Medium,
                None,
                json!({ "op": "encrypt", "reason": "plaintext too long", "bytes": plaintext.len() }),
            );
            return Err(HivekeepError::rejected(
                "encrypt",
                format!("plaintext is {} bytes, ceiling is {}", plaintext.len(), limit),
            ));
        }
        match self.secrets.encrypt(plaintext) {
            Ok(ciphertext) => {
                self.audit.record(
                    AuditAction::Encrypted,
                    Severity::Low,
                    None,
                    json!({ "bytes": plaintext.len() }),
                );
                Ok(ciphertext)
            }
            Err(e) => {
                self.audit.record(
                    AuditAction::EncryptFailed,
                    Severity::High,
                    None,
                    json!({ "reason": e.to_string() }),
                );
                Err(e)
            }
        }
    }

    pub fn decrypt(&self, ciphertext: &str) -> Result<String, HivekeepError> {
        match self.secrets.decrypt(ciphertext) {
            Ok(plaintext) => {
                self.audit.record(
                    AuditAction::Decrypted,
                    Severity::Low,
                    None,
                    json!({ "bytes": plaintext.len() }),
                );
                Ok(plaintext)
            }
            Err(e) => {
                self.audit.record(
                    AuditAction::DecryptFailed,
                    Severity::High,
                    None,
                    json!({ "reason": e.to_string() }),
                );
                Err(e)
            }
        }
    }

    pub fn secure_random_vector(&self, count: usize) -> Result<Vec<f32>, HivekeepError> {
        let limit = self.policy.current().input.max_tensor_elements;
        if count > limit {
            self.audit.record(
                AuditAction::QueryRejected,
                Severity::Medium,
                None,
                json!({ "op": "secure_random_vector", "requested": count, "ceiling": limit }),
            );
            return Err(HivekeepError::rejected(
                "secure_random_vector",
                format!("{} values requested, ceiling is {}", count, limit),
            ));
        }
        let values = crypto::secure_random_vector(count);
        let (severity, details) = match &values {
            Ok(_) => (Severity::Low, json!({ "count": count })),
            Err(e) => (Severity::High, json!({ "count": count, "error": e.to_string() })),
        };
        self.audit
            .record(AuditAction::RandomIssued, severity, None, details);
        values
    }

    pub fn current_policy(&self) -> SecurityPolicy {
        self.policy.current()
    }
}

/// Heuristic scans over a blob read as little-endian f32 values. Trailing bytes
/// that do not fill a value are ignored.
fn blob_heuristics(bytes: &[u8], magnitude_bound: f32) -> Vec<Violation> {
    let values: Vec<f32> = bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    let n = values.len();
    if n == 0 {
        return Vec::new();
    }

    let mut violations = Vec::new();
    let zeros = values.iter().filter(|v| **v == 0.0).count();
    if zeros * 10 > n * 9 {
        violations.push(Violation::new(
            ViolationKind::ExcessiveZeros,
            None,
            format!("{} of {} values are zero", zeros, n),
            BLOB_HEURISTIC_PENALTY,
        ));
    }

    let mut freq: FxHashMap<u32, usize> = FxHashMap::default();
    for v in &values {
        *freq.entry(v.to_bits()).or_insert(0) += 1;
    }
    let mode = freq.values().copied().max().unwrap_or(0);
    if mode * 10 > n * 8 {
        violations.push(Violation::new(
            ViolationKind::UniformValues,
            None,
            format!("one value repeats for {} of {} elements", mode, n),
            BLOB_HEURISTIC_PENALTY,
        ));
    }

    let extreme = values
        .iter()
        .filter(|v| v.is_finite() && v.abs() > magnitude_bound)
        .count();
    if extreme * 10 > n {
        violations.push(Violation::new(
            ViolationKind::ExtremeMagnitudes,
            None,
            format!(
                "{} of {} values exceed magnitude {}",
                extreme, n, magnitude_bound
            ),
            BLOB_HEURISTIC_PENALTY,
        ));
    }

    let non_finite = values.iter().filter(|v| !v.is_finite()).count();
    if non_finite > 0 {
        violations.push(Violation::new(
            ViolationKind::NonFinite,
            None,
            format!("{} non-finite values", non_finite),
            BLOB_NON_FINITE_PENALTY,
        ));
    }

    violations
}
