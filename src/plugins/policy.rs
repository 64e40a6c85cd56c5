//! Policy Manager
//!
//! Environment-scoped limits consumed by the validation gate, the agent store and
//! the security monitor. Policies are plain serde structs: presets are built in,
//! files may be TOML or JSON, and the JSON form is the interchange format for
//! `export_policy` / `import_policy`.

use crate::core::error::HivekeepError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock};

pub const MAX_MEMORY_CEILING_BYTES: u64 = 1024 * 1024 * 1024;
pub const MIN_SESSION_TIMEOUT_MINUTES: u32 = 1;
pub const MAX_SESSION_TIMEOUT_MINUTES: u32 = 1440;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Production,
    Testing,
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Testing => "testing",
        };
        f.write_str(s)
    }
}

impl FromStr for Environment {
    type Err = HivekeepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            "testing" | "test" => Ok(Self::Testing),
            other => Err(HivekeepError::ConfigurationInvalid(format!(
                "unknown environment '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Sensitivity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct InputLimits {
    /// Byte ceiling for a single string query parameter.
    pub max_param_bytes: usize,
    pub max_tensor_elements: usize,
    /// Absolute magnitude bound applied to sanitized tensor values.
    pub max_value_magnitude: f32,
    pub max_blob_bytes: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RateLimitPolicy {
    pub window_ms: i64,
    pub max_requests: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SessionPolicy {
    pub timeout_minutes: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ResourcePolicy {
    pub max_memory_bytes: u64,
    /// Average store response time above which the monitor deducts health.
    pub max_response_time_ms: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct LoggingPolicy {
    pub audit_capacity: usize,
    pub retention_hours: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DetectionPolicy {
    pub sensitivity: Sensitivity,
    pub poll_interval_ms: u64,
    /// Health score below which the monitor raises an alert.
    pub health_floor: u8,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SecurityPolicy {
    pub environment: Environment,
    pub input: InputLimits,
    pub rate_limit: RateLimitPolicy,
    pub session: SessionPolicy,
    pub resources: ResourcePolicy,
    pub logging: LoggingPolicy,
    pub detection: DetectionPolicy,
}

impl Default for SecurityPolicy {
    fn default() -> Self {
        preset(Environment::Development)
    }
}

pub fn preset(env: Environment) -> SecurityPolicy {
    match env {
        Environment::Development => SecurityPolicy {
            environment: env,
            input: InputLimits {
                max_param_bytes: 4096,
                max_tensor_elements: 10_000,
                max_value_magnitude: 1000.0,
                max_blob_bytes: 64 * 1024 * 1024,
            },
            rate_limit: RateLimitPolicy {
                window_ms: 60_000,
                max_requests: 1000,
            },
            session: SessionPolicy {
                timeout_minutes: 480,
            },
            resources: ResourcePolicy {
                max_memory_bytes: 512 * 1024 * 1024,
                max_response_time_ms: 100,
            },
            logging: LoggingPolicy {
                audit_capacity: 10_000,
                retention_hours: 24,
            },
            detection: DetectionPolicy {
                sensitivity: Sensitivity::Medium,
                poll_interval_ms: 5_000,
                health_floor: 50,
            },
        },
        Environment::Production => SecurityPolicy {
            environment: env,
            input: InputLimits {
                max_param_bytes: 1024,
                max_tensor_elements: 10_000,
                max_value_magnitude: 1000.0,
                max_blob_bytes: 16 * 1024 * 1024,
            },
            rate_limit: RateLimitPolicy {
                window_ms: 60_000,
                max_requests: 100,
            },
            session: SessionPolicy {
                timeout_minutes: 60,
            },
            resources: ResourcePolicy {
                max_memory_bytes: 256 * 1024 * 1024,
                max_response_time_ms: 50,
            },
            logging: LoggingPolicy {
                audit_capacity: 50_000,
                retention_hours: 168,
            },
            detection: DetectionPolicy {
                sensitivity: Sensitivity::High,
                poll_interval_ms: 5_000,
                health_floor: 70,
            },
        },
        Environment::Testing => SecurityPolicy {
            environment: env,
            input: InputLimits {
                max_param_bytes: 256,
                max_tensor_elements: 1_000,
                max_value_magnitude: 1000.0,
                max_blob_bytes: 1024 * 1024,
            },
            rate_limit: RateLimitPolicy {
                window_ms: 1_000,
                max_requests: 10_000,
            },
            session: SessionPolicy { timeout_minutes: 5 },
            resources: ResourcePolicy {
                max_memory_bytes: 1024 * 1024 * 1024,
                max_response_time_ms: 1_000,
            },
            logging: LoggingPolicy {
                audit_capacity: 1_000,
                retention_hours: 1,
            },
            detection: DetectionPolicy {
                sensitivity: Sensitivity::Low,
                poll_interval_ms: 100,
                health_floor: 0,
            },
        },
    }
}

/// Checks every value against its documented range. Returns all problems at once.
pub fn validate_policy(policy: &SecurityPolicy) -> Result<(), HivekeepError> {
    let mut problems = Vec::new();

    let timeout = policy.session.timeout_minutes;
    if !(MIN_SESSION_TIMEOUT_MINUTES..=MAX_SESSION_TIMEOUT_MINUTES).contains(&timeout) {
        problems.push(format!(
            "session.timeout_minutes {} outside {}-{}",
            timeout, MIN_SESSION_TIMEOUT_MINUTES, MAX_SESSION_TIMEOUT_MINUTES
        ));
    }
    if policy.resources.max_memory_bytes == 0
        || policy.resources.max_memory_bytes > MAX_MEMORY_CEILING_BYTES
    {
        problems.push(format!(
            "resources.max_memory_bytes {} must be in 1..={}",
            policy.resources.max_memory_bytes, MAX_MEMORY_CEILING_BYTES
        ));
    }
    if policy.resources.max_response_time_ms == 0 {
        problems.push("resources.max_response_time_ms must be positive".to_string());
    }
    if policy.input.max_param_bytes == 0 || policy.input.max_param_bytes > 1024 * 1024 {
        problems.push(format!(
            "input.max_param_bytes {} must be in 1..=1048576",
            policy.input.max_param_bytes
        ));
    }
    if policy.input.max_tensor_elements == 0 || policy.input.max_tensor_elements > 10_000_000 {
        problems.push(format!(
            "input.max_tensor_elements {} must be in 1..=10000000",
            policy.input.max_tensor_elements
        ));
    }
    let magnitude = policy.input.max_value_magnitude;
    if !magnitude.is_finite() || magnitude <= 0.0 {
        problems.push(format!(
            "input.max_value_magnitude {} must be finite and positive",
            magnitude
        ));
    }
    if policy.input.max_blob_bytes == 0 || policy.input.max_blob_bytes as u64 > MAX_MEMORY_CEILING_BYTES
    {
        problems.push(format!(
            "input.max_blob_bytes {} must be in 1..={}",
            policy.input.max_blob_bytes, MAX_MEMORY_CEILING_BYTES
        ));
    }
    if policy.rate_limit.window_ms <= 0 {
        problems.push("rate_limit.window_ms must be positive".to_string());
    }
    if policy.rate_limit.max_requests == 0 {
        problems.push("rate_limit.max_requests must be positive".to_string());
    }
    if policy.logging.audit_capacity == 0 || policy.logging.audit_capacity > 1_000_000 {
        problems.push(format!(
            "logging.audit_capacity {} must be in 1..=1000000",
            policy.logging.audit_capacity
        ));
    }
    if policy.logging.retention_hours == 0 || policy.logging.retention_hours > 24 * 365 {
        problems.push(format!(
            "logging.retention_hours {} must be in 1..=8760",
            policy.logging.retention_hours
        ));
    }
    if !(10..=3_600_000).contains(&policy.detection.poll_interval_ms) {
        problems.push(format!(
            "detection.poll_interval_ms {} must be in 10..=3600000",
            policy.detection.poll_interval_ms
        ));
    }
    if policy.detection.health_floor > 100 {
        problems.push(format!(
            "detection.health_floor {} must be at most 100",
            policy.detection.health_floor
        ));
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(HivekeepError::ConfigurationInvalid(problems.join("; ")))
    }
}

/// Shared, validated policy. Clones observe updates made through any handle.
#[derive(Debug, Clone)]
pub struct PolicyManager {
    inner: Arc<RwLock<SecurityPolicy>>,
}

impl Default for PolicyManager {
    fn default() -> Self {
        Self::for_environment(Environment::Development)
    }
}

impl PolicyManager {
    pub fn for_environment(env: Environment) -> Self {
        Self {
            inner: Arc::new(RwLock::new(preset(env))),
        }
    }

    pub fn new(policy: SecurityPolicy) -> Result<Self, HivekeepError> {
        validate_policy(&policy)?;
        Ok(Self {
            inner: Arc::new(RwLock::new(policy)),
        })
    }

    /// Loads a policy from `.toml` or `.json`.
    pub fn load_file(path: &Path) -> Result<Self, HivekeepError> {
        let content = std::fs::read_to_string(path)?;
        let policy: SecurityPolicy = match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => toml::from_str(&content)?,
            Some("json") => serde_json::from_str(&content)?,
            _ => {
                return Err(HivekeepError::ConfigurationInvalid(format!(
                    "unsupported policy file extension: {}",
                    path.display()
                )));
            }
        };
        Self::new(policy)
    }

    /// Snapshot of the current policy.
    pub fn current(&self) -> SecurityPolicy {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn environment(&self) -> Environment {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .environment
    }

    /// Replaces the policy. Invalid policies are rejected and the old one stays in force.
    pub fn update(&self, policy: SecurityPolicy) -> Result<(), HivekeepError> {
        validate_policy(&policy)?;
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = policy;
        tracing::info!("security policy updated");
        Ok(())
    }

    pub fn export_policy(&self) -> Result<String, HivekeepError> {
        Ok(serde_json::to_string_pretty(&self.current())?)
    }

    pub fn import_policy(&self, json: &str) -> Result<(), HivekeepError> {
        let policy: SecurityPolicy = serde_json::from_str(json).map_err(|e| {
            HivekeepError::ConfigurationInvalid(format!("policy JSON does not parse: {}", e))
        })?;
        self.update(policy)
    }
}
