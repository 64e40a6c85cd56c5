//! Security Monitor
//!
//! Consumes the audit trail on a fixed-interval timer and keeps an in-memory
//! picture of threats, alerts and process metrics. Nothing here is persisted.
//!
//! Each poll runs, in order:
//! - **threat analysis** over audit entries recorded since the previous poll,
//!   one threat per matching entry, with auto-mitigation and alerts;
//! - **pattern correlation** over the trailing five-minute threat window;
//! - **metrics collection** (process sample, threat level, health score);
//! - **alert-condition checks** of the fresh snapshot against policy thresholds.
//!
//! The monitor shares no locks with the agent store. It reads the audit trail
//! through its own handle and owns its state behind a single mutex.

use crate::core::audit::{AuditAction, AuditEntry, AuditTrail, Severity};
use crate::core::error::HivekeepError;
use crate::core::time::{self, HOUR_MS, MINUTE_MS};
use crate::plugins::health::{
    self, ResourceSample, ThreatCounts, ThreatLevel, compute_health_score, compute_threat_level,
};
use crate::plugins::policy::{PolicyManager, Sensitivity};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub const THREAT_WINDOW_MS: i64 = 5 * MINUTE_MS;
pub const RECENT_EVENT_LIMIT: usize = 20;
pub const DEFAULT_HISTORY_CAPACITY: usize = 10_000;
pub const COORDINATED_ATTACK_THRESHOLD: usize = 3;
pub const ESCALATION_THRESHOLD: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatKind {
    SqlInjection,
    DosAttack,
    DataCorruption,
    BufferOverflow,
}

impl ThreatKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SqlInjection => "sql_injection",
            Self::DosAttack => "dos_attack",
            Self::DataCorruption => "data_corruption",
            Self::BufferOverflow => "buffer_overflow",
        }
    }

    pub fn default_severity(&self) -> Severity {
        match self {
            Self::SqlInjection => Severity::High,
            Self::DosAttack | Self::BufferOverflow => Severity::Medium,
            Self::DataCorruption => Severity::Critical,
        }
    }

    /// Maps an audit entry to the threat it evidences, if any.
    pub fn from_audit(entry: &AuditEntry) -> Option<Self> {
        match entry.action {
            AuditAction::InjectionDetected => Some(Self::SqlInjection),
            AuditAction::RateLimitExceeded => Some(Self::DosAttack),
            AuditAction::DigestMismatch => Some(Self::DataCorruption),
            AuditAction::TensorViolation => {
                let magnitude = entry
                    .details
                    .get("magnitude_violations")
                    .and_then(Value::as_u64)
                    .unwrap_or(0);
                (magnitude > 0).then_some(Self::BufferOverflow)
            }
            _ => None,
        }
    }
}

impl fmt::Display for ThreatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Threat {
    pub id: String,
    pub kind: ThreatKind,
    pub severity: Severity,
    pub source: Option<String>,
    pub description: String,
    pub evidence: Value,
    pub detected_at: i64,
    pub mitigated: bool,
    pub response: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertCategory {
    Threat,
    CoordinatedAttack,
    ThreatEscalation,
    Memory,
    ResponseTime,
    HealthScore,
    ThreatLevel,
}

impl AlertCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Threat => "threat",
            Self::CoordinatedAttack => "coordinated_attack",
            Self::ThreatEscalation => "threat_escalation",
            Self::Memory => "memory",
            Self::ResponseTime => "response_time",
            Self::HealthScore => "health_score",
            Self::ThreatLevel => "threat_level",
        }
    }
}

impl fmt::Display for AlertCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub severity: Severity,
    pub category: AlertCategory,
    pub message: String,
    pub details: Value,
    pub created_at: i64,
    pub acknowledged: bool,
    pub resolved_at: Option<i64>,
    /// Correlation and condition alerts with the same key are raised once while unresolved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dedupe_key: Option<String>,
}

impl Alert {
    pub fn is_open(&self) -> bool {
        self.resolved_at.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub ts_ms: i64,
    pub memory_bytes: u64,
    pub cpu_percent: f32,
    pub avg_response_ms: Option<f64>,
    pub active_threats: usize,
    pub mitigated_threats: usize,
    pub threat_level: ThreatLevel,
    pub health_score: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MonitorEvent {
    Threat(Threat),
    Alert(Alert),
}

impl MonitorEvent {
    pub fn ts_ms(&self) -> i64 {
        match self {
            Self::Threat(t) => t.detected_at,
            Self::Alert(a) => a.created_at,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ThreatSummary {
    pub total: usize,
    pub active: usize,
    pub mitigated: usize,
    pub by_severity: BTreeMap<String, usize>,
    pub by_kind: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AlertSummary {
    pub total: usize,
    pub unacknowledged: usize,
    pub open: usize,
    pub by_severity: BTreeMap<String, usize>,
    pub by_category: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardSnapshot {
    pub generated_at: i64,
    pub running: bool,
    pub metrics: Option<MetricsSnapshot>,
    pub threats: ThreatSummary,
    pub alerts: AlertSummary,
    pub recent_events: Vec<MonitorEvent>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub threats: usize,
    pub alerts: usize,
    pub metrics: usize,
}

/// Process resource sampling.
pub trait ResourceSampler: Send + Sync {
    /// Returns `(resident_memory_bytes, cpu_percent)` for the current process.
    fn sample(&self) -> (u64, f32);
}

/// Samples the current process through `sysinfo`.
pub struct SysinfoSampler {
    system: Mutex<sysinfo::System>,
    pid: Option<sysinfo::Pid>,
}

impl SysinfoSampler {
    pub fn new() -> Self {
        let pid = sysinfo::get_current_pid().ok();
        if pid.is_none() {
            tracing::warn!("current pid unavailable; memory sampling disabled");
        }
        Self {
            system: Mutex::new(sysinfo::System::new()),
            pid,
        }
    }
}

impl Default for SysinfoSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceSampler for SysinfoSampler {
    fn sample(&self) -> (u64, f32) {
        let Some(pid) = self.pid else {
            return (0, 0.0);
        };
        let mut sys = self.system.lock().unwrap_or_else(PoisonError::into_inner);
        sys.refresh_processes(sysinfo::ProcessesToUpdate::Some(&[pid]));
        sys.process(pid)
            .map(|p| (p.memory(), p.cpu_usage()))
            .unwrap_or((0, 0.0))
    }
}

/// A sampler that always reports the same values.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedSampler {
    pub memory_bytes: u64,
    pub cpu_percent: f32,
}

impl ResourceSampler for FixedSampler {
    fn sample(&self) -> (u64, f32) {
        (self.memory_bytes, self.cpu_percent)
    }
}

struct MonitorState {
    threats: VecDeque<Threat>,
    alerts: VecDeque<Alert>,
    metrics: VecDeque<MetricsSnapshot>,
    last_seq: u64,
    capacity: usize,
}

impl MonitorState {
    fn push_threat(&mut self, threat: Threat) {
        if self.threats.len() >= self.capacity {
            self.threats.pop_front();
        }
        self.threats.push_back(threat);
    }

    fn push_alert(&mut self, alert: Alert) {
        if self.alerts.len() >= self.capacity {
            self.alerts.pop_front();
        }
        self.alerts.push_back(alert);
    }

    fn push_metrics(&mut self, snapshot: MetricsSnapshot) {
        if self.metrics.len() >= self.capacity {
            self.metrics.pop_front();
        }
        self.metrics.push_back(snapshot);
    }

    fn has_open_alert(&self, key: &str) -> bool {
        self.alerts
            .iter()
            .any(|a| a.is_open() && a.dedupe_key.as_deref() == Some(key))
    }

    fn window_threats(&self, now_ms: i64) -> impl Iterator<Item = &Threat> {
        self.threats
            .iter()
            .filter(move |t| t.detected_at >= now_ms - THREAT_WINDOW_MS)
    }
}

struct MonitorCore {
    audit: AuditTrail,
    policy: PolicyManager,
    sampler: Box<dyn ResourceSampler>,
    state: Mutex<MonitorState>,
}

struct Runner {
    stop_tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

pub struct SecurityMonitor {
    core: Arc<MonitorCore>,
    runner: Mutex<Option<Runner>>,
}

impl fmt::Debug for SecurityMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityMonitor")
            .field("running", &self.is_running())
            .finish()
    }
}

fn alert_floor(sensitivity: Sensitivity) -> Severity {
    match sensitivity {
        Sensitivity::High => Severity::Medium,
        Sensitivity::Medium | Sensitivity::Low => Severity::High,
    }
}

/// Auto-mitigation. Corruption needs a human; everything else is contained by
/// the gate that produced the evidence.
fn mitigate(kind: ThreatKind) -> (bool, String) {
    match kind {
        ThreatKind::SqlInjection => (
            true,
            "input rejected by signature scan; parameters sanitized".to_string(),
        ),
        ThreatKind::DosAttack => (
            true,
            "requests throttled by rate limiter".to_string(),
        ),
        ThreatKind::BufferOverflow => (
            true,
            "tensor values clamped to magnitude bound".to_string(),
        ),
        ThreatKind::DataCorruption => (
            false,
            "manual intervention required: weight blob failed digest verification".to_string(),
        ),
    }
}

fn describe(kind: ThreatKind, entry: &AuditEntry) -> String {
    let source = entry.source.as_deref().unwrap_or("unknown");
    match kind {
        ThreatKind::SqlInjection => format!("injection signature matched in input from {}", source),
        ThreatKind::DosAttack => format!("rate limit exceeded by {}", source),
        ThreatKind::DataCorruption => format!("weight digest mismatch observed by {}", source),
        ThreatKind::BufferOverflow => format!("tensor magnitude violations from {}", source),
    }
}

fn average_response_ms(entries: &[AuditEntry]) -> Option<f64> {
    let timings: Vec<f64> = entries
        .iter()
        .filter(|e| {
            matches!(
                e.action,
                AuditAction::StoreRead | AuditAction::StoreWrite | AuditAction::StoreError
            )
        })
        .filter_map(|e| e.details.get("elapsed_ms").and_then(Value::as_f64))
        .collect();
    if timings.is_empty() {
        None
    } else {
        Some(timings.iter().sum::<f64>() / timings.len() as f64)
    }
}

impl MonitorCore {
    fn state(&self) -> MutexGuard<'_, MonitorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[allow(clippy::too_many_arguments)]
    fn record_threat(
        &self,
        state: &mut MonitorState,
        kind: ThreatKind,
        severity: Severity,
        source: Option<String>,
        description: String,
        evidence: Value,
        detected_at: i64,
        floor: Severity,
    ) -> Threat {
        let (mitigated, response) = mitigate(kind);
        let threat = Threat {
            id: time::new_event_id(),
            kind,
            severity,
            source,
            description,
            evidence,
            detected_at,
            mitigated,
            response: Some(response),
        };
        tracing::warn!(
            kind = %threat.kind,
            severity = %threat.severity,
            source = ?threat.source,
            mitigated,
            "threat detected"
        );
        if severity >= floor {
            state.push_alert(Alert {
                id: time::new_event_id(),
                severity,
                category: AlertCategory::Threat,
                message: format!("{} threat: {}", kind, threat.description),
                details: json!({
                    "threat_id": threat.id,
                    "kind": kind.as_str(),
                    "source": threat.source,
                    "mitigated": mitigated,
                }),
                created_at: detected_at,
                acknowledged: false,
                resolved_at: None,
                dedupe_key: None,
            });
        }
        state.push_threat(threat.clone());
        threat
    }

    #[allow(clippy::too_many_arguments)]
    fn raise_once(
        &self,
        state: &mut MonitorState,
        key: String,
        severity: Severity,
        category: AlertCategory,
        message: String,
        details: Value,
        now_ms: i64,
    ) {
        if state.has_open_alert(&key) {
            return;
        }
        tracing::warn!(category = %category, severity = %severity, %message, "alert raised");
        state.push_alert(Alert {
            id: time::new_event_id(),
            severity,
            category,
            message,
            details,
            created_at: now_ms,
            acknowledged: false,
            resolved_at: None,
            dedupe_key: Some(key),
        });
    }

    fn correlate(&self, state: &mut MonitorState, now_ms: i64) {
        let mut by_source: FxHashMap<String, usize> = FxHashMap::default();
        let mut critical = 0usize;
        for threat in state.window_threats(now_ms) {
            if let Some(source) = &threat.source {
                *by_source.entry(source.clone()).or_default() += 1;
            }
            if threat.severity == Severity::Critical {
                critical += 1;
            }
        }

        let mut coordinated: Vec<(String, usize)> = by_source
            .into_iter()
            .filter(|(_, n)| *n >= COORDINATED_ATTACK_THRESHOLD)
            .collect();
        coordinated.sort();
        for (source, count) in coordinated {
            self.raise_once(
                state,
                format!("coordinated_attack:{}", source),
                Severity::High,
                AlertCategory::CoordinatedAttack,
                format!(
                    "coordinated attack suspected from {}: {} threats in 5 minutes",
                    source, count
                ),
                json!({ "source": source, "threats": count }),
                now_ms,
            );
        }
        if critical >= ESCALATION_THRESHOLD {
            self.raise_once(
                state,
                "threat_escalation".to_string(),
                Severity::Critical,
                AlertCategory::ThreatEscalation,
                format!("threat escalation: {} critical threats in 5 minutes", critical),
                json!({ "critical_threats": critical }),
                now_ms,
            );
        }
    }

    fn check_conditions(&self, state: &mut MonitorState, snapshot: &MetricsSnapshot) {
        let policy = self.policy.current();
        let now = snapshot.ts_ms;
        if snapshot.memory_bytes > policy.resources.max_memory_bytes {
            self.raise_once(
                state,
                "memory".to_string(),
                Severity::High,
                AlertCategory::Memory,
                format!(
                    "memory usage {} bytes exceeds ceiling {}",
                    snapshot.memory_bytes, policy.resources.max_memory_bytes
                ),
                json!({
                    "memory_bytes": snapshot.memory_bytes,
                    "ceiling": policy.resources.max_memory_bytes,
                }),
                now,
            );
        }
        if let Some(avg) = snapshot.avg_response_ms {
            if avg > policy.resources.max_response_time_ms as f64 {
                self.raise_once(
                    state,
                    "response_time".to_string(),
                    Severity::Medium,
                    AlertCategory::ResponseTime,
                    format!(
                        "average response time {:.1}ms exceeds ceiling {}ms",
                        avg, policy.resources.max_response_time_ms
                    ),
                    json!({ "avg_response_ms": avg, "ceiling": policy.resources.max_response_time_ms }),
                    now,
                );
            }
        }
        if snapshot.health_score < policy.detection.health_floor {
            self.raise_once(
                state,
                "health_score".to_string(),
                Severity::High,
                AlertCategory::HealthScore,
                format!(
                    "health score {} below floor {}",
                    snapshot.health_score, policy.detection.health_floor
                ),
                json!({ "health_score": snapshot.health_score, "floor": policy.detection.health_floor }),
                now,
            );
        }
        if snapshot.threat_level == ThreatLevel::Critical {
            self.raise_once(
                state,
                "threat_level".to_string(),
                Severity::Critical,
                AlertCategory::ThreatLevel,
                "threat level is critical".to_string(),
                json!({ "threat_level": snapshot.threat_level }),
                now,
            );
        }
    }

    fn snapshot(
        &self,
        state: &MonitorState,
        sample: ResourceSample,
        now_ms: i64,
    ) -> MetricsSnapshot {
        let policy = self.policy.current();
        let (mut active, mut mitigated) = (0usize, 0usize);
        let mut severities = Vec::new();
        for threat in state.window_threats(now_ms) {
            if threat.mitigated {
                mitigated += 1;
            } else {
                active += 1;
            }
            severities.push(threat.severity);
        }
        let unacknowledged_critical_alerts = state
            .alerts
            .iter()
            .filter(|a| a.severity == Severity::Critical && !a.acknowledged && a.is_open())
            .count();
        let counts = ThreatCounts {
            active,
            mitigated,
            unacknowledged_critical_alerts,
        };
        MetricsSnapshot {
            ts_ms: now_ms,
            memory_bytes: sample.memory_bytes,
            cpu_percent: sample.cpu_percent,
            avg_response_ms: sample.avg_response_ms,
            active_threats: active,
            mitigated_threats: mitigated,
            threat_level: compute_threat_level(severities),
            health_score: compute_health_score(&sample, &counts, &policy.resources),
        }
    }

    fn poll_at(&self, now_ms: i64) -> MetricsSnapshot {
        let since = self.state().last_seq;
        let entries = self.audit.entries_after(since);
        let (memory_bytes, cpu_percent) = self.sampler.sample();
        let sample = ResourceSample {
            memory_bytes,
            cpu_percent,
            avg_response_ms: average_response_ms(&entries),
        };
        let floor = alert_floor(self.policy.current().detection.sensitivity);

        let mut state = self.state();
        let mut detected = 0usize;
        for entry in &entries {
            // A concurrent poll may already have consumed part of this batch.
            if entry.seq <= state.last_seq {
                continue;
            }
            state.last_seq = entry.seq;
            let Some(kind) = ThreatKind::from_audit(entry) else {
                continue;
            };
            self.record_threat(
                &mut state,
                kind,
                kind.default_severity(),
                entry.source.clone(),
                describe(kind, entry),
                json!({ "audit_seq": entry.seq, "action": entry.action, "details": entry.details }),
                entry.ts_ms,
                floor,
            );
            detected += 1;
        }
        self.correlate(&mut state, now_ms);
        let snapshot = self.snapshot(&state, sample, now_ms);
        self.check_conditions(&mut state, &snapshot);
        state.push_metrics(snapshot.clone());
        tracing::debug!(
            scanned = entries.len(),
            detected,
            health = snapshot.health_score,
            level = %snapshot.threat_level,
            "monitor poll"
        );
        snapshot
    }
}

impl SecurityMonitor {
    pub fn new(audit: AuditTrail, policy: PolicyManager) -> Self {
        Self::with_sampler(audit, policy, Box::new(SysinfoSampler::new()))
    }

    pub fn with_sampler(
        audit: AuditTrail,
        policy: PolicyManager,
        sampler: Box<dyn ResourceSampler>,
    ) -> Self {
        // Threats already in the trail predate this monitor and are not replayed.
        let last_seq = audit.last_seq();
        Self {
            core: Arc::new(MonitorCore {
                audit,
                policy,
                sampler,
                state: Mutex::new(MonitorState {
                    threats: VecDeque::new(),
                    alerts: VecDeque::new(),
                    metrics: VecDeque::new(),
                    last_seq,
                    capacity: DEFAULT_HISTORY_CAPACITY,
                }),
            }),
            runner: Mutex::new(None),
        }
    }

    fn runner(&self) -> MutexGuard<'_, Option<Runner>> {
        self.runner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// stopped -> running. Starting a running monitor is a no-op.
    pub fn start(&self) -> Result<(), HivekeepError> {
        let mut runner = self.runner();
        if runner.is_some() {
            return Ok(());
        }
        let interval = Duration::from_millis(
            self.core.policy.current().detection.poll_interval_ms.max(1),
        );
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let core = Arc::clone(&self.core);
        let handle = thread::Builder::new()
            .name("hivekeep-monitor".to_string())
            .spawn(move || {
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {
                            core.poll_at(time::now_ms());
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            })?;
        tracing::info!(interval_ms = interval.as_millis() as u64, "security monitor started");
        *runner = Some(Runner { stop_tx, handle });
        Ok(())
    }

    /// running -> stopped. Halts the timer; an in-flight poll finishes first.
    pub fn stop(&self) {
        let Some(runner) = self.runner().take() else {
            return;
        };
        let _ = runner.stop_tx.send(());
        if runner.handle.join().is_err() {
            tracing::error!("monitor thread panicked");
        }
        tracing::info!("security monitor stopped");
    }

    pub fn is_running(&self) -> bool {
        self.runner().is_some()
    }

    pub fn poll_once(&self) -> MetricsSnapshot {
        self.core.poll_at(time::now_ms())
    }

    pub fn poll_at(&self, now_ms: i64) -> MetricsSnapshot {
        self.core.poll_at(now_ms)
    }

    /// Records a threat reported directly by a collaborator.
    pub fn report_threat(
        &self,
        kind: ThreatKind,
        severity: Severity,
        source: Option<&str>,
        description: &str,
        evidence: Value,
    ) -> Threat {
        self.report_threat_at(time::now_ms(), kind, severity, source, description, evidence)
    }

    pub fn report_threat_at(
        &self,
        now_ms: i64,
        kind: ThreatKind,
        severity: Severity,
        source: Option<&str>,
        description: &str,
        evidence: Value,
    ) -> Threat {
        let floor = alert_floor(self.core.policy.current().detection.sensitivity);
        let mut state = self.core.state();
        let threat = self.core.record_threat(
            &mut state,
            kind,
            severity,
            source.map(str::to_string),
            description.to_string(),
            evidence,
            now_ms,
            floor,
        );
        self.core.correlate(&mut state, now_ms);
        threat
    }

    /// Marks an alert acknowledged. Returns false for unknown ids.
    pub fn acknowledge(&self, alert_id: &str) -> bool {
        let mut state = self.core.state();
        match state.alerts.iter_mut().find(|a| a.id == alert_id) {
            Some(alert) => {
                alert.acknowledged = true;
                true
            }
            None => false,
        }
    }

    pub fn resolve(&self, alert_id: &str) -> bool {
        self.resolve_at(alert_id, time::now_ms())
    }

    /// Resolves an alert (implies acknowledged). Resolving twice keeps the first timestamp.
    pub fn resolve_at(&self, alert_id: &str, now_ms: i64) -> bool {
        let mut state = self.core.state();
        match state.alerts.iter_mut().find(|a| a.id == alert_id) {
            Some(alert) => {
                alert.acknowledged = true;
                if alert.resolved_at.is_none() {
                    alert.resolved_at = Some(now_ms);
                }
                true
            }
            None => false,
        }
    }

    pub fn cleanup(&self) -> CleanupReport {
        self.cleanup_at(time::now_ms())
    }

    /// Drops threats, alerts and metrics older than `logging.retention_hours`.
    pub fn cleanup_at(&self, now_ms: i64) -> CleanupReport {
        let retention_hours = self.core.policy.current().logging.retention_hours;
        let cutoff = now_ms - i64::from(retention_hours) * HOUR_MS;
        let mut state = self.core.state();
        let before = (state.threats.len(), state.alerts.len(), state.metrics.len());
        state.threats.retain(|t| t.detected_at >= cutoff);
        state.alerts.retain(|a| a.created_at >= cutoff);
        state.metrics.retain(|m| m.ts_ms >= cutoff);
        let report = CleanupReport {
            threats: before.0 - state.threats.len(),
            alerts: before.1 - state.alerts.len(),
            metrics: before.2 - state.metrics.len(),
        };
        if report != CleanupReport::default() {
            tracing::info!(
                threats = report.threats,
                alerts = report.alerts,
                metrics = report.metrics,
                "monitor history pruned"
            );
        }
        report
    }

    pub fn dashboard(&self) -> DashboardSnapshot {
        self.dashboard_at(time::now_ms())
    }

    pub fn dashboard_at(&self, now_ms: i64) -> DashboardSnapshot {
        let running = self.is_running();
        let state = self.core.state();

        let mut threats = ThreatSummary::default();
        for t in &state.threats {
            threats.total += 1;
            if t.mitigated {
                threats.mitigated += 1;
            } else {
                threats.active += 1;
            }
            *threats.by_severity.entry(t.severity.to_string()).or_default() += 1;
            *threats.by_kind.entry(t.kind.to_string()).or_default() += 1;
        }

        let mut alerts = AlertSummary::default();
        for a in &state.alerts {
            alerts.total += 1;
            if !a.acknowledged {
                alerts.unacknowledged += 1;
            }
            if a.is_open() {
                alerts.open += 1;
            }
            *alerts.by_severity.entry(a.severity.to_string()).or_default() += 1;
            *alerts.by_category.entry(a.category.to_string()).or_default() += 1;
        }

        let mut recent_events: Vec<MonitorEvent> = state
            .threats
            .iter()
            .rev()
            .take(RECENT_EVENT_LIMIT)
            .cloned()
            .map(MonitorEvent::Threat)
            .chain(
                state
                    .alerts
                    .iter()
                    .rev()
                    .take(RECENT_EVENT_LIMIT)
                    .cloned()
                    .map(MonitorEvent::Alert),
            )
            .collect();
        recent_events.sort_by(|a, b| b.ts_ms().cmp(&a.ts_ms()));
        recent_events.truncate(RECENT_EVENT_LIMIT);

        DashboardSnapshot {
            generated_at: now_ms,
            running,
            metrics: state.metrics.back().cloned(),
            threats,
            alerts,
            recent_events,
        }
    }

    pub fn threats(&self) -> Vec<Threat> {
        self.core.state().threats.iter().cloned().collect()
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.core.state().alerts.iter().cloned().collect()
    }

    pub fn metrics_history(&self) -> Vec<MetricsSnapshot> {
        self.core.state().metrics.iter().cloned().collect()
    }

    pub fn latest_metrics(&self) -> Option<MetricsSnapshot> {
        self.core.state().metrics.back().cloned()
    }

    pub fn threat_level_at(&self, now_ms: i64) -> ThreatLevel {
        let state = self.core.state();
        health::compute_threat_level(state.window_threats(now_ms).map(|t| t.severity))
    }
}

impl Drop for SecurityMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}
