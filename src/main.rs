//! NDPI Tiler - resumable tile extraction for whole slide images.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ndpi_tiler::{
    config::{BatchArgs, Cli, Command, InspectConfig, LogArgs, StatusConfig, TileConfig},
    job::{
        cancel_on_shutdown, inspect_slide, run_batch, scan_job_statuses, Extractor,
        STATUS_CSV_HEADER,
    },
    slide::TiffSlideOpener,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Tile(config) => run_tile(config).await,
        Command::Batch(config) => run_batch_command(config).await,
        Command::Status(config) => run_status(config).await,
        Command::Inspect(config) => run_inspect(config).await,
    }
}

/// Initialize the tracing/logging subsystem. `RUST_LOG` takes precedence.
fn init_logging(log: &LogArgs) {
    let env_filter = format!("ndpi_tiler={}", log.level().as_str());

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

// =============================================================================
// Tile Command
// =============================================================================

async fn run_tile(config: TileConfig) -> ExitCode {
    init_logging(&config.log);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }
    let job = match config.job_config() {
        Ok(job) => job,
        Err(e) => {
            error!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let cancel = CancellationToken::new();
    let signals = cancel_on_shutdown(cancel.clone());

    let extractor = Extractor::new(Arc::new(TiffSlideOpener::new()), job, cancel.clone());
    let result = extractor.run().await;

    cancel.cancel();
    let _ = signals.await;

    match result {
        Ok(summary) => {
            if !summary.failed.is_empty() {
                warn!(
                    failed = summary.failed.len(),
                    "Some tiles failed; rerun to retry them"
                );
            }
            info!(
                slide = %summary.slide,
                state = %summary.state,
                processed = summary.processed,
                total = summary.total_tile_count,
                percent = summary.percent_complete,
                "Done"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

// =============================================================================
// Batch Command
// =============================================================================

async fn run_batch_command(config: BatchArgs) -> ExitCode {
    init_logging(&config.log);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }
    let batch = match config.batch_config() {
        Ok(batch) => batch,
        Err(e) => {
            error!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let cancel = CancellationToken::new();
    let signals = cancel_on_shutdown(cancel.clone());

    let result = run_batch(Arc::new(TiffSlideOpener::new()), &batch, cancel.clone()).await;

    cancel.cancel();
    let _ = signals.await;

    match result {
        Ok(report) => {
            for failure in &report.failed {
                error!(input = %failure.input.display(), "{}", failure.error);
            }
            if report.is_success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

// =============================================================================
// Status Command
// =============================================================================

async fn run_status(config: StatusConfig) -> ExitCode {
    init_logging(&config.log);

    match scan_job_statuses(&config.dir).await {
        Ok(statuses) => {
            println!("{}", STATUS_CSV_HEADER);
            for status in &statuses {
                println!("{}", status.csv_row());
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Cannot read {}: {}", config.dir.display(), e);
            ExitCode::FAILURE
        }
    }
}

// =============================================================================
// Inspect Command
// =============================================================================

async fn run_inspect(config: InspectConfig) -> ExitCode {
    init_logging(&config.log);

    let spec = match config.validate().and_then(|()| config.tiling.tile_spec()) {
        Ok(spec) => spec,
        Err(e) => {
            error!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let opener = TiffSlideOpener::new();
    let inspection = match inspect_slide(&opener, &config.input_file, &spec).await {
        Ok(inspection) => inspection,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    match serde_json::to_string_pretty(&inspection) {
        Ok(json) => {
            println!("{}", json);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Failed to serialize slide description: {}", e);
            ExitCode::FAILURE
        }
    }
}
