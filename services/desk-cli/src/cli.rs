use crate::demo::{run_demo, DemoArgs};
use crate::recap::{run_daily, run_export, run_weekly, DailyArgs, ExportArgs, WeeklyArgs};
use clap::{Parser, Subcommand};
use review_desk::config::AppConfig;
use review_desk::error::AppError;
use review_desk::telemetry;
use std::path::PathBuf;
use tracing::debug;

#[derive(Parser, Debug)]
#[command(
    name = "review-desk",
    about = "Inspect the applicant review ledger and run scripted review sessions",
    version
)]
struct Cli {
    /// Override the configured ledger file
    #[arg(long, global = true)]
    ledger: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Staff recaps computed from the ledger (default: today's daily recap)
    Recap {
        #[command(subcommand)]
        command: RecapCommand,
    },
    /// Ledger maintenance
    Ledger {
        #[command(subcommand)]
        command: LedgerCommand,
    },
    /// Run a scripted end-to-end review against a scratch ledger
    Demo(DemoArgs),
}

#[derive(Subcommand, Debug)]
enum RecapCommand {
    /// Submissions received on one UTC day, by faction
    Daily(DailyArgs),
    /// Decisions per reviewer since Monday 00:00 UTC
    Weekly(WeeklyArgs),
}

#[derive(Subcommand, Debug)]
enum LedgerCommand {
    /// Export every record as CSV
    Export(ExportArgs),
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let mut config = AppConfig::load()?;
    if let Some(path) = cli.ledger {
        config.ledger.path = path;
    }

    telemetry::init(&config.telemetry)?;
    debug!(
        environment = ?config.environment,
        ledger = %config.ledger.path.display(),
        "configuration loaded"
    );

    let command = cli.command.unwrap_or(Command::Recap {
        command: RecapCommand::Daily(DailyArgs::default()),
    });

    match command {
        Command::Recap {
            command: RecapCommand::Daily(args),
        } => run_daily(&config, args),
        Command::Recap {
            command: RecapCommand::Weekly(args),
        } => run_weekly(&config, args),
        Command::Ledger {
            command: LedgerCommand::Export(args),
        } => run_export(&config, args),
        Command::Demo(args) => run_demo(&config, args).await,
    }
}
