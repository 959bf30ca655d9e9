//! Esper Control - operator CLI for enrollment session diagnostics.
//!
//! Runs the rule engine over a session's event history, inspects rule
//! definitions, and shows stored diagnoses.

mod commands;
mod render;

use anyhow::Result;
use clap::{Parser, Subcommand};
use esper_shared::DEFAULT_TENANT;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "esperctl")]
#[command(about = "Esper - automated diagnosis of device enrollment sessions", long_about = None)]
#[command(version)]
struct Cli {
    /// Enable engine debug logging
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a session's event history against the active rule set
    Analyze {
        /// Session to analyze
        #[arg(long)]
        session: String,

        #[arg(long, default_value = DEFAULT_TENANT)]
        tenant: String,

        /// JSONL event file, or a directory of <session>.jsonl files
        #[arg(long)]
        events: PathBuf,

        /// Rule directory (tenant overrides under tenants/<tenant>/);
        /// built-in catalog when omitted
        #[arg(long)]
        rules: Option<PathBuf>,

        /// Result database (defaults to the state directory)
        #[arg(long)]
        db: Option<PathBuf>,

        /// Evaluate without persisting results
        #[arg(long)]
        dry_run: bool,

        /// Machine-readable output
        #[arg(long)]
        json: bool,
    },

    /// Inspect rule definitions
    Rules {
        #[command(subcommand)]
        action: RulesAction,
    },

    /// Show stored diagnoses for a session
    Results {
        #[arg(long)]
        session: String,

        #[arg(long, default_value = DEFAULT_TENANT)]
        tenant: String,

        #[arg(long)]
        db: Option<PathBuf>,

        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum RulesAction {
    /// List the effective rule set for a tenant
    List {
        #[arg(long, default_value = DEFAULT_TENANT)]
        tenant: String,

        #[arg(long)]
        rules: Option<PathBuf>,

        #[arg(long)]
        json: bool,
    },

    /// Check rule documents for structural problems
    Lint {
        #[arg(long, default_value = DEFAULT_TENANT)]
        tenant: String,

        #[arg(long)]
        rules: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    match cli.command {
        Commands::Analyze {
            session,
            tenant,
            events,
            rules,
            db,
            dry_run,
            json,
        } => commands::analyze(&session, &tenant, events, rules, db, dry_run, json),
        Commands::Rules { action } => match action {
            RulesAction::List {
                tenant,
                rules,
                json,
            } => commands::rules_list(&tenant, rules, json),
            RulesAction::Lint { tenant, rules } => commands::rules_lint(&tenant, rules),
        },
        Commands::Results {
            session,
            tenant,
            db,
            json,
        } => commands::results(&session, &tenant, db, json),
    }
}
