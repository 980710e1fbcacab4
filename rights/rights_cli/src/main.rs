use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use rights_core::utils::LogLevel;
use rights_policy::{DynRightsAdmin, EngineConfig, StorageConfig};
use std::path::{Path, PathBuf};
use tracing::warn;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::audit::{DecisionsArgs, SummaryArgs};
use commands::evaluate::EvaluateArgs;
use commands::policy::PolicyCommand;

/// Rights policy engine
///
/// Manage access-control policies and evaluate access requests. Every
/// command prints JSON on stdout; logs go to stderr.
#[derive(Parser)]
#[clap(author, version, about)]
struct Cli {
    /// Configuration file (TOML)
    #[clap(long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database to use, overriding the configured storage
    #[clap(long, global = true)]
    db: Option<PathBuf>,

    /// Increase log verbosity (repeatable)
    #[clap(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create, inspect, update or delete policies
    #[clap(subcommand)]
    Policy(PolicyCommand),

    /// Evaluate an access request and log the decision
    Evaluate(EvaluateArgs),

    /// Query the decision log
    Decisions(DecisionsArgs),

    /// Summarize the rights attached to a target
    Summary(SummaryArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref())?;
    if let Some(db) = &cli.db {
        config = config.with_sqlite_path(db);
    }
    init_tracing(config.log_level, cli.verbose);

    if config.storage == StorageConfig::Memory {
        warn!("Using in-memory storage; nothing will persist after this command");
    }
    let admin = DynRightsAdmin::open(&config).context("Failed to open rights store")?;

    match cli.command {
        Commands::Policy(command) => commands::policy::execute(&admin, command),
        Commands::Evaluate(args) => commands::evaluate::execute(&admin, &args),
        Commands::Decisions(args) => commands::audit::execute_decisions(&admin, &args),
        Commands::Summary(args) => commands::audit::execute_summary(&admin, &args),
    }
}

/// Load the configuration under a temporary warn-level subscriber, since the
/// configured level is not known yet.
fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter(LogLevel::Warning))
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::with_default(subscriber, || EngineConfig::load(path))
        .context("Failed to load configuration")
}

/// Install a stderr subscriber. `RUST_LOG` overrides the configured level.
fn init_tracing(configured: LogLevel, verbose: u8) {
    let level = (0..verbose).fold(configured, |level, _| level.more_verbose());

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter(level))
        .with_writer(std::io::stderr)
        .try_init();
}

fn env_filter(level: LogLevel) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_filter_directive()))
}
