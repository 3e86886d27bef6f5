use crate::{error::CliError, shutdown::ExitCode};
use clap::Parser;
use commands::Commands;
use engine_config::settings::MigrationConfig;
use engine_runtime::engine::Engine;
use model::media::MediaId;
use std::{collections::BTreeSet, path::PathBuf};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod commands;
mod error;
mod output;
mod shutdown;

#[derive(Parser)]
#[command(name = "offload", version = "0.1.0", about = "Media library offload tool")]
struct Cli {
    #[arg(long, global = true, help = "Env file overriding process variables")]
    env_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let code = match run(cli).await {
        Ok(()) => ExitCode::Success,
        Err(CliError::ShutdownRequested) => {
            warn!("Stopped before all chunks ran; progress keeps what finished");
            ExitCode::ShutdownRequested
        }
        Err(err) => {
            error!("{err}");
            ExitCode::GeneralError
        }
    };
    std::process::exit(code.as_i32());
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let config = MigrationConfig::load(cli.env_file.as_deref())?;
    let engine = Engine::connect(&config).await?;

    match cli.command {
        Commands::Scan { patterns, json } => {
            let result = engine.scan(patterns).await?;
            output::print_scan(&result, json)?;
        }
        Commands::Migrate {
            tables,
            use_scan,
            strategy,
            no_wait,
        } => {
            let mut selected: BTreeSet<String> = tables
                .into_iter()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect();
            if use_scan {
                let scan = engine.last_scan().await?.ok_or(CliError::NoScanResult)?;
                selected.extend(scan.table_names());
            }

            let jobs = engine.start_migration(selected, strategy).await?;
            if no_wait || jobs == 0 {
                return Ok(());
            }

            let cancel = shutdown::register_handlers();
            tokio::select! {
                res = engine.wait_idle() => res?,
                _ = cancel.cancelled() => return Err(CliError::ShutdownRequested),
            }

            let metrics = engine.metrics().snapshot();
            info!(
                uploaded = metrics.items_uploaded,
                bytes = metrics.bytes_uploaded,
                rows = metrics.rows_rewritten,
                retries = metrics.retry_count,
                failures = metrics.failure_count,
                "Migration finished"
            );
            output::print_progress(&engine.progress().await?, false)?;
        }
        Commands::Progress { json } => {
            output::print_progress(&engine.progress().await?, json)?;
        }
        Commands::ResolveUrl { id } => {
            println!("{}", engine.resolve_url(MediaId(id)).await?);
        }
        Commands::TestConn => {
            engine.ping().await?;
            println!("Connection OK");
        }
    }

    Ok(())
}
