pub mod commands;

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use haulquote_core::config::{AppConfig, LoadOptions};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "haulquote",
    about = "Haulquote operator CLI",
    long_about = "Prepare the estimation database and rule index, inspect configuration, and price bookings from the command line.",
    after_help = "Examples:\n  haulquote migrate\n  haulquote seed\n  haulquote index --status\n  haulquote quote bk-demo-garden"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the demo bookings and pricing rules, then verify them")]
    Seed,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, database connectivity and rule index readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Build the rule index if it is missing, or report on it")]
    Index {
        #[arg(long, help = "Only report whether the index exists, never build it")]
        status: bool,
    },
    #[command(about = "Run one estimation for a booking and store the resulting quote")]
    Quote {
        #[arg(help = "Booking identifier")]
        booking_id: String,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    init_logging();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Index { status } => commands::index::run(status),
        Command::Quote { booking_id } => commands::quote::run(&booking_id),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

/// Logs go to stderr so stdout stays a single JSON payload.
fn init_logging() {
    let level = AppConfig::load(LoadOptions::default())
        .map(|config| config.logging.level)
        .unwrap_or_else(|_| "warn".to_string());
    let filter = EnvFilter::try_new(&level).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}
