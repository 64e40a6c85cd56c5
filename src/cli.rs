//! CLI struct definitions for the hivekeep command-line interface.
//!
//! All clap-derived types live here. Dispatch lives in `lib.rs`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(
    name = "hivekeep",
    version = env!("CARGO_PKG_VERSION"),
    about = "Persistence and protection layer for agent swarms: a WAL-backed agent store behind a validation gate and threat monitor."
)]
pub(crate) struct Cli {
    /// Agent store database file.
    #[clap(long, env = "HIVEKEEP_DB", default_value = ".hivekeep/agents.db", global = true)]
    pub db: PathBuf,
    /// Security policy file (.toml or .json). Overrides the environment preset.
    #[clap(long, env = "HIVEKEEP_POLICY", global = true)]
    pub policy: Option<PathBuf>,
    /// Policy preset: development, production or testing.
    #[clap(long = "env", env = "HIVEKEEP_ENV", default_value = "development", global = true)]
    pub environment: String,
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// Print table names, index names and journal mode.
    Schema,
    /// Inspect stored agents.
    Agents(AgentsCli),
    /// Export or validate security policies.
    Policy(PolicyCli),
    /// Run one monitor poll and print the dashboard snapshot.
    Dashboard {
        /// Output format: 'text' or 'json'.
        #[clap(long, default_value = "text")]
        format: String,
    },
}

#[derive(clap::Args, Debug)]
pub(crate) struct AgentsCli {
    #[clap(subcommand)]
    pub command: AgentsCommand,
}

#[derive(Subcommand, Debug)]
pub(crate) enum AgentsCommand {
    /// List agents, newest first.
    List {
        #[clap(long = "type")]
        agent_type: Option<String>,
        #[clap(long)]
        status: Option<String>,
        #[clap(long)]
        limit: Option<u32>,
        /// Output format: 'text' or 'json'.
        #[clap(long, default_value = "text")]
        format: String,
    },
    /// Show one agent as JSON.
    Get { id: String },
    /// Show an agent's metrics, most recent first.
    Metrics {
        id: String,
        #[clap(long)]
        metric_type: Option<String>,
    },
}

#[derive(clap::Args, Debug)]
pub(crate) struct PolicyCli {
    #[clap(subcommand)]
    pub command: PolicyCommand,
}

#[derive(Subcommand, Debug)]
pub(crate) enum PolicyCommand {
    /// Print the active policy as JSON: the `--policy` file if given, else the `--env` preset.
    Export,
    /// Load and validate a policy file.
    Validate { file: PathBuf },
}
