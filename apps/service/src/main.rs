use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;

mod config;
mod database;
mod error;
mod http;
mod monitoring;
mod notify;
mod orchestrator;
mod pool;

use config::Config;
use error::AppError;
use monitoring::{Registry, SweepOutcome, SweepTrigger};
use orchestrator::Orchestrator;

/// Health checks for the APIs and services this deployment depends on
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Configuration file, created with defaults when missing
    #[arg(short, long, env = "VIGIL_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Clone, Copy, Subcommand)]
enum Command {
    /// Monitor continuously and serve the status API (default)
    Run,
    /// Probe every endpoint once and print the result
    Sweep,
    /// Check the configuration and endpoint catalogue, then exit
    Validate,
}

#[actix_web::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = Config::from_config(cli.config.as_ref())?;
    logger::init_tracing(config.log_options()?).map_err(|e| anyhow::anyhow!(e))?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => {
            info!("Effective configuration:\n{}", config);
            Orchestrator::start(config).await?;
        }
        Command::Sweep => {
            let mut config = config;
            config.scheduler.run_on_start = false;
            config.http.enabled = false;

            let orchestrator = Orchestrator::new(config).await?;
            let scheduler = orchestrator.scheduler();
            if let SweepOutcome::Completed(report) = scheduler.sweep(SweepTrigger::Manual).await {
                let statuses = scheduler.current_statuses();
                let mut endpoints: Vec<_> = statuses.values().collect();
                endpoints.sort_by(|a, b| a.endpoint_id.cmp(&b.endpoint_id));

                let output = serde_json::json!({ "report": report, "statuses": endpoints });
                println!("{}", serde_json::to_string_pretty(&output).map_err(anyhow::Error::from)?);
            }
        }
        Command::Validate => {
            let registry = Registry::load(&config.endpoints)?;
            println!("{config}");
            println!("Configuration OK: {} endpoints", registry.len());
        }
    }

    Ok(())
}
