use std::path::PathBuf;

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tvtime_common::ApprovalStatus;
use tvtime_engine::EngineConfig;

mod commands;

use commands::rows::RowsAction;

#[derive(Parser)]
#[command(name = "tvtime-ctl")]
#[command(about = "TV Time parent control tool", long_about = None)]
struct Cli {
    /// Engine configuration file (defaults to the per-user location)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect and decide approval requests
    Rows {
        #[command(subcommand)]
        action: RowsAction,
    },

    /// Show notices sent to the approver
    Notices {
        #[arg(short, long, help = "Only notices for this row")]
        row: Option<i64>,

        #[arg(short, long, default_value_t = 20)]
        limit: i64,
    },

    /// Show the child's ledger
    Ledger {
        #[arg(short, long, help = "Day to show (YYYY-MM-DD), defaults to the latest")]
        date: Option<NaiveDate>,
    },

    /// Print the effective configuration
    Config,

    /// Serve the approval rows over HTTP for the engine's web app backend
    Serve {
        #[arg(short, long, default_value = "127.0.0.1:8787")]
        bind: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let config = match &cli.config {
        Some(path) => EngineConfig::load_from_path(path)?,
        None => EngineConfig::load()?,
    };

    match cli.command {
        Commands::Rows { action } => match action {
            RowsAction::List { status, limit } => {
                let status = status.map(|s| s.to_ascii_uppercase().parse::<ApprovalStatus>()).transpose();
                commands::rows::list(&config, status.map_err(anyhow::Error::msg)?, limit).await?
            }
            RowsAction::Show { row_id } => commands::rows::show(&config, row_id).await?,
            RowsAction::Approve { row_id } => {
                commands::rows::decide(&config, row_id, tvtime_common::Decision::Approve).await?
            }
            RowsAction::Reject { row_id } => {
                commands::rows::decide(&config, row_id, tvtime_common::Decision::Reject).await?
            }
        },
        Commands::Notices { row, limit } => commands::notices::list(&config, row, limit).await?,
        Commands::Ledger { date } => commands::ledger::show(&config, date).await?,
        Commands::Config => commands::print_config(&config)?,
        Commands::Serve { bind } => commands::serve::run(&config, &bind).await?,
    }

    Ok(())
}
