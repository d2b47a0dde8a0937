//! # gr-cli
//!
//! Operator CLI for Guardrail Ops.
//!
//! - `guardrail policy apply/create/update/delete` — reconcile content-safety
//!   policies against the remote control plane
//! - `guardrail policy refresh/show/list` — inspect stored handles
//! - `guardrail route` — stream invocation events through the escalation router
//! - `guardrail evaluate` — check a single invocation record
//! - `guardrail lifecycle` — answer one orchestrator envelope request

mod commands;
mod config;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use config::GuardrailConfig;

/// Guardrail Ops CLI — manage guardrail policies and route low-confidence responses.
#[derive(Parser)]
#[command(name = "guardrail", version, about)]
struct Cli {
    /// Project root directory (defaults to current directory).
    #[arg(long, default_value = ".")]
    project_root: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage guardrail policies.
    Policy {
        #[command(subcommand)]
        command: commands::policy::PolicyCommands,
    },
    /// Route a JSONL stream of invocation events.
    Route {
        /// Event file (defaults to stdin).
        #[arg(long)]
        input: Option<PathBuf>,
        /// Don't record malformed lines in the dead-letter log.
        #[arg(long)]
        no_dead_letter: bool,
    },
    /// Evaluate a single invocation record.
    Evaluate {
        /// The record, as JSON.
        #[arg(long)]
        json: String,
    },
    /// Handle one lifecycle envelope request.
    Lifecycle {
        /// Request file (defaults to stdin).
        #[arg(long)]
        input: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("gr_reconciler=info".parse()?)
                .add_directive("gr_router=info".parse()?)
                .add_directive("guardrail=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let cli = Cli::parse();
    let project_root = cli.project_root.canonicalize().unwrap_or(cli.project_root);
    let config = GuardrailConfig::load(&project_root)?;

    match &cli.command {
        Commands::Policy { command } => commands::policy::execute(command, &config),
        Commands::Route {
            input,
            no_dead_letter,
        } => commands::route::execute(&config, input.as_deref(), !no_dead_letter),
        Commands::Evaluate { json } => commands::evaluate::execute(&config, json),
        Commands::Lifecycle { input } => commands::lifecycle::execute(&config, input.as_deref()),
    }
}
