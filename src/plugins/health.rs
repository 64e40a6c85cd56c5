//! Health scoring for the security monitor.
//!
//! Pure functions over a resource sample and threat/alert counts. The monitor
//! gathers the inputs; nothing here reads clocks or process state.

use crate::core::audit::Severity;
use crate::plugins::policy::ResourcePolicy;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const MEMORY_PENALTY: u8 = 20;
pub const RESPONSE_TIME_PENALTY: u8 = 15;
pub const ACTIVE_THREAT_PENALTY: u8 = 10;
pub const CRITICAL_ALERT_PENALTY: u8 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreatLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for ThreatLevel {
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

/// One process sample. `avg_response_ms` is `None` when no timed store
/// operation happened in the window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceSample {
    pub memory_bytes: u64,
    pub cpu_percent: f32,
    pub avg_response_ms: Option<f64>,
}

/// Inputs to the health score beyond the resource sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreatCounts {
    pub active: usize,
    pub mitigated: usize,
    pub unacknowledged_critical_alerts: usize,
}

pub fn compute_threat_level<I>(severities: I) -> ThreatLevel
where
    I: IntoIterator<Item = Severity>,
{
    let (mut medium, mut high, mut critical) = (0usize, 0usize, 0usize);
    for s in severities {
        match s {
            Severity::Critical => critical += 1,
            Severity::High => high += 1,
            Severity::Medium => medium += 1,
            Severity::Low => {}
        }
    }
    if critical > 0 || high >= 2 {
        ThreatLevel::Critical
    } else if high >= 1 || medium >= 3 {
        ThreatLevel::High
    } else if medium >= 1 {
        ThreatLevel::Medium
    } else {
        ThreatLevel::Low
    }
}

/// 0..=100. Starts at 100 and deducts per breach; never goes below 0.
pub fn compute_health_score(
    sample: &ResourceSample,
    counts: &ThreatCounts,
    limits: &ResourcePolicy,
) -> u8 {
    let mut deductions: u32 = 0;
    if sample.memory_bytes > limits.max_memory_bytes {
        deductions += u32::from(MEMORY_PENALTY);
    }
    if let Some(avg) = sample.avg_response_ms {
        if avg > limits.max_response_time_ms as f64 {
            deductions += u32::from(RESPONSE_TIME_PENALTY);
        }
    }
    deductions = deductions
        .saturating_add((counts.active as u32).saturating_mul(u32::from(ACTIVE_THREAT_PENALTY)));
    deductions = deductions.saturating_add(
        (counts.unacknowledged_critical_alerts as u32)
            .saturating_mul(u32::from(CRITICAL_ALERT_PENALTY)),
    );
    100u32.saturating_sub(deductions) as u8
}
