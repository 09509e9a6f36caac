//! CLI entry point for the fare estimator.
//!
//! Provides subcommands for running the full pipeline over a GPS point file,
//! inspecting the trips and fares of a file without persisting anything, and
//! printing the effective configuration.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fare_estimator::config::AppConfig;
use fare_estimator::fare::FareCalculator;
use fare_estimator::input::PointReader;
use fare_estimator::output::{CsvFareWriter, print_json, print_pretty};
use fare_estimator::pipeline;
use std::ffi::OsStr;
use std::path::Path;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

const DEFAULT_INPUT: &str = "delivery_data.csv";
const DEFAULT_OUTPUT: &str = "fares.csv";

#[derive(Parser)]
#[command(name = "fare_estimator")]
#[command(about = "Estimates delivery fares from raw GPS traces", long_about = None)]
struct Cli {
    /// JSON config file (falls back to $FARE_CONFIG, then built-in defaults)
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Aggregate a point file into trips, price them and append fares to a CSV file
    Run {
        /// CSV file of `trip_id,lat,lng,timestamp` rows
        #[arg(value_name = "INPUT")]
        input: Option<String>,

        /// CSV file to append `id,fare` rows to
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Print the trips and fares of a point file without writing anything
    Inspect {
        /// CSV file of `trip_id,lat,lng,timestamp` rows
        #[arg(value_name = "INPUT")]
        input: Option<String>,

        /// Log full trips as JSON instead of one summary line per trip
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Print the effective configuration
    ShowConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    let _file_guard = init_logging()?;

    let cli = Cli::parse();
    let config_path = cli.config.or_else(|| std::env::var("FARE_CONFIG").ok());
    let config = AppConfig::load_or_default(config_path.as_deref())?;

    match cli.command {
        Commands::Run { input, output } => {
            let input = input
                .or_else(|| config.input_path.clone())
                .unwrap_or_else(|| DEFAULT_INPUT.to_string());
            let output = output
                .or_else(|| config.output_path.clone())
                .unwrap_or_else(|| DEFAULT_OUTPUT.to_string());
            run(&config, &input, &output).await?;
        }
        Commands::Inspect { input, json } => {
            let input = input
                .or_else(|| config.input_path.clone())
                .unwrap_or_else(|| DEFAULT_INPUT.to_string());
            inspect(&config, &input, json)?;
        }
        Commands::ShowConfig => {
            if let Some(path) = &config_path {
                info!(path = %path, "Config file loaded");
            } else {
                info!("No config file given, using defaults");
            }
            print_json(&config)?;
        }
    }

    Ok(())
}

/// Logging setup: colored stderr + JSON rolling log file.
fn init_logging() -> Result<WorkerGuard> {
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/fare_estimator.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("fare_estimator.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    Ok(file_guard)
}

/// Runs the full pipeline until the input is exhausted or Ctrl+C is pressed.
#[tracing::instrument(skip(config))]
async fn run(config: &AppConfig, input: &str, output: &str) -> Result<()> {
    let reader = PointReader::open(input)?;
    let sink = CsvFareWriter::open(output)
        .with_context(|| format!("failed to open fare output '{output}'"))?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("Ctrl+C received, finishing in-flight work");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => error!(error = %e, "Failed to listen for Ctrl+C"),
        }
    });

    let report = pipeline::run(config, reader, sink, shutdown_rx).await?;

    if report.fares_dropped() > 0 {
        warn!(
            dropped = report.fares_dropped(),
            "Some fares could not be persisted"
        );
    }
    info!(output, written = report.fares_written(), "Done");
    Ok(())
}

/// Prices a point file in memory and logs every trip with its fare.
#[tracing::instrument(skip(config))]
fn inspect(config: &AppConfig, input: &str, json: bool) -> Result<()> {
    let reader = PointReader::open(input)?;
    let calculator = FareCalculator::new(config.tariff.clone());

    let priced = pipeline::price_points(reader, &calculator);
    for (trip, fare) in &priced {
        if json {
            print_json(trip)?;
        } else {
            print_pretty(trip);
        }
        info!(
            trip_id = trip.id,
            segments = trip.segments.len(),
            distance_km = trip.total_distance_km(),
            fare = %fare.fare,
            "Trip priced"
        );
    }

    info!(trips = priced.len(), "Inspection complete");
    Ok(())
}
