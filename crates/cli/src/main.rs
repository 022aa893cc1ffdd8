mod commands;
mod logging;
mod output;

use clap::{Parser, Subcommand};
use console::style;
use std::process::ExitCode;

use commands::migrate::{self, ConnectionArgs};
use logging::LoggingConfig;

#[derive(Parser)]
#[command(name = "elif-migrate")]
#[command(about = "Apply, roll back and inspect elif.rs database migrations")]
struct Cli {
    #[command(flatten)]
    connection: ConnectionArgs,

    /// Enable debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: MigrateCommands,
}

#[derive(Subcommand)]
enum MigrateCommands {
    /// Create a new migration
    Create {
        /// Migration name
        name: String,
    },

    /// Run pending migrations
    Run {
        /// Stop after this version
        #[arg(long)]
        target: Option<i64>,

        /// Show the plan without touching the database or ledger
        #[arg(long)]
        dry_run: bool,

        /// Print the run summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Rollback applied migrations (the last one by default)
    Rollback {
        /// Revert every migration above this version
        #[arg(long, conflicts_with = "steps")]
        target: Option<i64>,

        /// Revert this many of the newest migrations
        #[arg(long)]
        steps: Option<usize>,

        #[arg(long)]
        dry_run: bool,

        #[arg(long)]
        json: bool,
    },

    /// Rollback every applied migration
    Reset {
        #[arg(long)]
        dry_run: bool,

        #[arg(long)]
        json: bool,
    },

    /// Show migration status
    Status {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}

async fn dispatch(cli: Cli) -> anyhow::Result<ExitCode> {
    let args = &cli.connection;
    match cli.command {
        MigrateCommands::Create { name } => migrate::create(args, &name),
        MigrateCommands::Run { target, dry_run, json } => migrate::run(args, target, dry_run, json).await,
        MigrateCommands::Rollback {
            target,
            steps,
            dry_run,
            json,
        } => migrate::rollback(args, target, steps, dry_run, json).await,
        MigrateCommands::Reset { dry_run, json } => migrate::reset(args, dry_run, json).await,
        MigrateCommands::Status { json } => migrate::status(args, json).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let logging = match LoggingConfig::from_env() {
        Ok(config) if cli.verbose => config.verbose(),
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {}", style("error:").red().bold(), e);
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = logging::init_logging(&logging) {
        eprintln!("{} failed to initialize logging: {}", style("warning:").yellow(), e);
    }

    match dispatch(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", style("error:").red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_with_target() {
        let cli = Cli::try_parse_from(["elif-migrate", "run", "--target", "2", "--dry-run"]).unwrap();
        match cli.command {
            MigrateCommands::Run { target, dry_run, json } => {
                assert_eq!(target, Some(2));
                assert!(dry_run);
                assert!(!json);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_rollback_target_conflicts_with_steps() {
        assert!(Cli::try_parse_from(["elif-migrate", "rollback", "--target", "1", "--steps", "2"]).is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "elif-migrate",
            "status",
            "--ledger",
            "ledger.json",
            "--dir",
            "db/migrations",
        ])
        .unwrap();
        assert_eq!(cli.connection.ledger, Some("ledger.json".into()));
        assert_eq!(cli.connection.dir, Some("db/migrations".into()));
    }
}
