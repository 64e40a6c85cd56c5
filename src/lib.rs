//! Hivekeep: persistence and protection for agent swarms
//!
//! **Hivekeep stores agent state durably and refuses to let hostile input reach it.**
//!
//! Agents, their learned weights, episodic memory, telemetry and swarm session
//! checkpoints live in one WAL-mode SQLite file. Every read and write passes a
//! validation gate first, every decision lands in an audit trail, and a security
//! monitor turns that trail into threats, alerts and a health score.
//!
//! # Architecture
//!
//! ```text
//!   caller ──► ValidationGate ──► AgentStore ──► agents.db (+ -wal, -shm)
//!                   │                  │
//!                   └──► AuditTrail ◄──┘
//!                           │
//!                           ▼
//!                    SecurityMonitor ──► threats / alerts / dashboard
//!
//!   PolicyManager supplies limits to the gate, the store and the monitor.
//! ```
//!
//! Handles are injected at construction; there are no process-wide singletons.
//! `AuditTrail`, `PolicyManager`, `ValidationGate` and `AgentStore` are cheap to
//! clone and clones share state. `AgentStore::as_caller` gives each caller its
//! own rate-limit budget on the same connection.
//!
//! # Crate Structure
//!
//! - [`core`]: shared primitives (error, time, db, schemas, audit, crypto, gatekeeper)
//! - [`plugins`]: subsystems (agent store and its extensions, policy, health, monitor)
//!
//! # Example
//!
//! ```no_run
//! use hivekeep::{Hivekeep, StoreConfig};
//! use hivekeep::plugins::agents::{AgentType, NewAgent};
//! use hivekeep::plugins::policy::{Environment, PolicyManager};
//!
//! # fn main() -> Result<(), hivekeep::HivekeepError> {
//! let hive = Hivekeep::open(
//!     StoreConfig::new("data/agents.db"),
//!     PolicyManager::for_environment(Environment::Production),
//! )?;
//! hive.store.save_agent(NewAgent::new("a-1", AgentType::Coder))?;
//! let snapshot = hive.monitor.poll_once();
//! println!("health {}", snapshot.health_score);
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod plugins;

mod cli;

pub use crate::core::error::HivekeepError;
pub use crate::plugins::agents::{AgentStore, StoreConfig};

use crate::cli::{AgentsCommand, Cli, Command, PolicyCommand};
use crate::core::audit::{AuditAction, AuditTrail, Severity};
use crate::core::gatekeeper::ValidationGate;
use crate::plugins::agents::{AgentFilter, AgentStatus, AgentType};
use crate::plugins::monitor::{DashboardSnapshot, MonitorEvent, SecurityMonitor};
use crate::plugins::policy::{Environment, PolicyManager, SecurityPolicy};
use clap::Parser;
use colored::Colorize;
use serde_json::json;

/// The fully wired stack: one audit trail and policy shared by gate, store and monitor.
#[derive(Debug)]
pub struct Hivekeep {
    pub audit: AuditTrail,
    pub policy: PolicyManager,
    pub gate: ValidationGate,
    pub store: AgentStore,
    pub monitor: SecurityMonitor,
}

impl Hivekeep {
    pub fn open(config: StoreConfig, policy: PolicyManager) -> Result<Self, HivekeepError> {
        let audit = AuditTrail::new(policy.current().logging.audit_capacity);
        let gate = ValidationGate::new(policy.clone(), audit.clone())?;
        let store = AgentStore::open(config, gate.clone())?;
        let monitor = SecurityMonitor::new(audit.clone(), policy.clone());
        Ok(Self {
            audit,
            policy,
            gate,
            store,
            monitor,
        })
    }

    /// Validated policy swap, recorded in the audit trail.
    pub fn update_policy(&self, policy: SecurityPolicy) -> Result<(), HivekeepError> {
        let environment = policy.environment;
        self.policy.update(policy)?;
        self.audit.record(
            AuditAction::PolicyUpdated,
            Severity::Medium,
            None,
            json!({ "environment": environment }),
        );
        Ok(())
    }

    pub fn get_security_dashboard(&self) -> DashboardSnapshot {
        self.monitor.dashboard()
    }

    /// Stops the monitor and closes the store.
    pub fn shutdown(&self) -> Result<(), HivekeepError> {
        self.monitor.stop();
        self.store.close()
    }
}

fn load_policy(cli: &Cli) -> Result<PolicyManager, HivekeepError> {
    match &cli.policy {
        Some(path) => PolicyManager::load_file(path),
        None => Ok(PolicyManager::for_environment(
            cli.environment.parse::<Environment>()?,
        )),
    }
}

pub fn run() -> Result<(), HivekeepError> {
    let cli = Cli::parse();
    let policy = load_policy(&cli)?;

    match cli.command {
        Command::Policy(policy_cli) => match policy_cli.command {
            PolicyCommand::Export => {
                println!("{}", policy.export_policy()?);
            }
            PolicyCommand::Validate { file } => {
                let loaded = PolicyManager::load_file(&file)?;
                println!(
                    "{} {} ({})",
                    "✓".green().bold(),
                    file.display(),
                    loaded.environment()
                );
            }
        },
        Command::Schema => {
            let hive = Hivekeep::open(StoreConfig::new(&cli.db), policy)?;
            let report = hive.store.schema_report()?;
            println!("{} {}", "journal_mode:".bold(), report.journal_mode);
            println!("{}", "tables:".bold());
            for t in &report.tables {
                println!("  {}", t);
            }
            println!("{}", "indexes:".bold());
            for i in &report.indexes {
                println!("  {}", i);
            }
            hive.shutdown()?;
        }
        Command::Agents(agents_cli) => {
            let hive = Hivekeep::open(StoreConfig::new(&cli.db), policy)?;
            run_agents(&hive, agents_cli.command)?;
            hive.shutdown()?;
        }
        Command::Dashboard { format } => {
            let hive = Hivekeep::open(StoreConfig::new(&cli.db), policy)?;
            // Touch the store so the poll has something to time.
            hive.store.count_agents()?;
            hive.monitor.poll_once();
            let snapshot = hive.get_security_dashboard();
            if format == "json" {
                println!("{}", serde_json::to_string_pretty(&snapshot)?);
            } else {
                print_dashboard(&snapshot);
            }
            hive.shutdown()?;
        }
    }
    Ok(())
}

fn run_agents(hive: &Hivekeep, command: AgentsCommand) -> Result<(), HivekeepError> {
    match command {
        AgentsCommand::List {
            agent_type,
            status,
            limit,
            format,
        } => {
            let filter = AgentFilter {
                agent_type: agent_type.as_deref().map(str::parse::<AgentType>).transpose()?,
                status: status.as_deref().map(str::parse::<AgentStatus>).transpose()?,
                limit,
            };
            let agents = hive.store.get_all_agents(&filter)?;
            if format == "json" {
                println!("{}", serde_json::to_string_pretty(&agents)?);
            } else if agents.is_empty() {
                println!("{}", "no agents".dimmed());
            } else {
                for a in &agents {
                    println!(
                        "{:<24} {:<12} {:<11} perf={:.2}",
                        a.id.bold(),
                        a.agent_type,
                        a.status,
                        a.performance_score
                    );
                }
            }
        }
        AgentsCommand::Get { id } => match hive.store.get_agent(&id)? {
            Some(agent) => println!("{}", serde_json::to_string_pretty(&agent)?),
            None => return Err(HivekeepError::NotFound(format!("agent '{}'", id))),
        },
        AgentsCommand::Metrics { id, metric_type } => {
            let metrics = hive.store.get_agent_metrics(&id, metric_type.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&metrics)?);
        }
    }
    Ok(())
}

fn severity_label(severity: Severity) -> colored::ColoredString {
    let s = severity.to_string();
    match severity {
        Severity::Critical => s.red().bold(),
        Severity::High => s.red(),
        Severity::Medium => s.yellow(),
        Severity::Low => s.green(),
    }
}

fn print_dashboard(snapshot: &DashboardSnapshot) {
    println!("{}", "hivekeep security dashboard".bold().underline());
    match &snapshot.metrics {
        Some(m) => {
            let health = format!("{}", m.health_score);
            let health = if m.health_score >= 80 {
                health.green()
            } else if m.health_score >= 50 {
                health.yellow()
            } else {
                health.red()
            };
            println!("  health score   {}", health.bold());
            println!("  threat level   {}", m.threat_level);
            println!("  memory         {} KiB", m.memory_bytes / 1024);
            println!("  cpu            {:.1}%", m.cpu_percent);
            if let Some(avg) = m.avg_response_ms {
                println!("  avg response   {:.1} ms", avg);
            }
            println!(
                "  threats (5m)   {} active, {} mitigated",
                m.active_threats, m.mitigated_threats
            );
        }
        None => println!("  {}", "no metrics collected".dimmed()),
    }
    println!(
        "  alerts         {} total, {} unacknowledged, {} open",
        snapshot.alerts.total, snapshot.alerts.unacknowledged, snapshot.alerts.open
    );
    if snapshot.recent_events.is_empty() {
        return;
    }
    println!("{}", "recent events".bold());
    for event in &snapshot.recent_events {
        match event {
            MonitorEvent::Threat(t) => println!(
                "  [{}] threat {} {}",
                severity_label(t.severity),
                t.kind,
                t.description
            ),
            MonitorEvent::Alert(a) => println!(
                "  [{}] alert  {} {}",
                severity_label(a.severity),
                a.category,
                a.message
            ),
        }
    }
}
