pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use costgate_core::config::LoadOptions;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "costgate",
    about = "Costgate operator CLI",
    long_about = "Apply migrations, inspect configuration, check readiness, and reconcile approved cost requests into the ledger.",
    after_help = "Examples:\n  costgate doctor --json\n  costgate config\n  costgate sync-ledger --actor u-finance"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Path to a costgate.toml file")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "Validate config, DB connectivity, and schema currency")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Mirror check-numbered, fully approved cost requests into the ledger")]
    SyncLedger {
        #[arg(long, help = "User id recorded as the ledger entry author")]
        actor: String,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    init_logging();

    let options = LoadOptions {
        require_file: cli.config.is_some(),
        config_path: cli.config,
        ..LoadOptions::default()
    };

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(options),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run(options) }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(options, json) }
        }
        Command::SyncLedger { actor } => commands::sync_ledger::run(options, &actor),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

/// Diagnostics go to stderr so stdout stays a single JSON document.
fn init_logging() {
    let filter = EnvFilter::try_from_env("COSTGATE_LOG_LEVEL")
        .or_else(|_| EnvFilter::try_from_env("COSTGATE_LOGGING_LEVEL"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_env_filter(filter)
        .compact()
        .try_init();
}
