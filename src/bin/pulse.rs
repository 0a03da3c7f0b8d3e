//! Pulse CLI - Headless driver for Synheart Pulse
//!
//! Commands:
//! - run: Run the monitor and stream alerts (and optionally readings) as NDJSON
//! - config: Print the default configuration

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

use synheart_pulse::{Alert, Monitor, MonitorConfig, PulseError, SensorReading};
use synheart_pulse::{PRODUCER_NAME, PULSE_VERSION};

/// Pulse - Simulated physiological signals with debounced wellness alerts
#[derive(Parser)]
#[command(name = "pulse")]
#[command(author = "Synheart AI Inc")]
#[command(version = PULSE_VERSION)]
#[command(about = "Simulate wearable signals and surface wellness alerts", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the monitor, writing records to stdout
    Run {
        /// Stop after this many seconds (runs until Ctrl-C when omitted)
        #[arg(long)]
        duration_secs: Option<u64>,

        /// Seed the simulator for a reproducible stream
        #[arg(long)]
        seed: Option<u64>,

        /// Load configuration from a JSON file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Also emit every sensor reading
        #[arg(long)]
        readings: bool,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,
    },

    /// Print the default configuration as JSON
    Config,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// One JSON record per line
    Ndjson,
    /// Pretty-printed JSON records
    JsonPretty,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Record<'a> {
    Reading(&'a SensorReading),
    Alert(&'a Alert),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    init_tracing();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

/// Default log filter when `RUST_LOG` is unset or unparsable
const DEFAULT_LOG_FILTER: &str = "synheart_pulse=info";

fn log_filter(env: Option<&str>) -> EnvFilter {
    env.and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER))
}

fn init_tracing() {
    let env = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(log_filter(env.as_deref()))
        .init();
}

async fn run(cli: Cli) -> Result<(), PulseCliError> {
    match cli.command {
        Commands::Run {
            duration_secs,
            seed,
            config,
            readings,
            output_format,
        } => {
            cmd_run(
                duration_secs,
                seed,
                config.as_deref(),
                readings,
                output_format,
            )
            .await
        }
        Commands::Config => cmd_config(),
    }
}

async fn cmd_run(
    duration_secs: Option<u64>,
    seed: Option<u64>,
    config_path: Option<&std::path::Path>,
    emit_readings: bool,
    output_format: OutputFormat,
) -> Result<(), PulseCliError> {
    let mut config = match config_path {
        Some(path) => MonitorConfig::from_json(&fs::read_to_string(path)?)?,
        None => MonitorConfig::default(),
    };
    if seed.is_some() {
        config.simulator.seed = seed;
    }

    let monitor = Monitor::new(config)?;
    let mut current = monitor.subscribe_current();
    let mut alerts = monitor.subscribe_alerts();
    let mut printed: HashSet<Uuid> = HashSet::new();
    let mut stdout = io::stdout();

    info!(producer = PRODUCER_NAME, version = PULSE_VERSION, ?duration_secs, "Starting monitor");
    monitor.start_monitoring();

    let deadline = async {
        match duration_secs {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending::<()>().await,
        }
    };
    let interrupt = tokio::signal::ctrl_c();
    tokio::pin!(deadline, interrupt);

    let outcome = loop {
        tokio::select! {
            _ = &mut deadline => break Ok(()),
            _ = &mut interrupt => {
                info!("Interrupted");
                break Ok(());
            }
            changed = current.changed(), if emit_readings => {
                if changed.is_err() {
                    break Ok(());
                }
                let reading = current.borrow_and_update().clone();
                if let Some(reading) = reading {
                    if let Err(e) = write_record(&mut stdout, &Record::Reading(&reading), &output_format) {
                        break Err(e);
                    }
                }
            }
            changed = alerts.changed() => {
                if changed.is_err() {
                    break Ok(());
                }
                let log = alerts.borrow_and_update().clone();
                let fresh = log.iter().filter(|alert| printed.insert(alert.id));
                if let Err(e) = fresh
                    .map(|alert| write_record(&mut stdout, &Record::Alert(alert), &output_format))
                    .collect::<Result<(), _>>()
                {
                    break Err(e);
                }
            }
        }
    };

    monitor.stop_monitoring().await;
    info!(
        readings = monitor.history().len(),
        alerts = monitor.alert_log().len(),
        "Monitor finished"
    );
    outcome
}

fn cmd_config() -> Result<(), PulseCliError> {
    println!("{}", MonitorConfig::default().to_json()?);
    Ok(())
}

fn write_record(
    out: &mut impl Write,
    record: &Record<'_>,
    format: &OutputFormat,
) -> Result<(), PulseCliError> {
    let line = match format {
        OutputFormat::Ndjson => serde_json::to_string(record)?,
        OutputFormat::JsonPretty => serde_json::to_string_pretty(record)?,
    };
    writeln!(out, "{}", line)?;
    out.flush()?;
    Ok(())
}

// Error types

#[derive(Debug)]
enum PulseCliError {
    Io(io::Error),
    Pulse(PulseError),
    Json(serde_json::Error),
}

impl From<io::Error> for PulseCliError {
    fn from(e: io::Error) -> Self {
        PulseCliError::Io(e)
    }
}

impl From<PulseError> for PulseCliError {
    fn from(e: PulseError) -> Self {
        PulseCliError::Pulse(e)
    }
}

impl From<serde_json::Error> for PulseCliError {
    fn from(e: serde_json::Error) -> Self {
        PulseCliError::Json(e)
    }
}

#[derive(Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<PulseCliError> for CliError {
    fn from(e: PulseCliError) -> Self {
        match e {
            PulseCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            PulseCliError::Pulse(PulseError::InvalidConfig(msg)) => CliError {
                code: "INVALID_CONFIG".to_string(),
                message: msg,
                hint: Some("Run 'pulse config' to see a valid configuration".to_string()),
            },
            PulseCliError::Pulse(e) => CliError {
                code: "PULSE_ERROR".to_string(),
                message: e.to_string(),
                hint: None,
            },
            PulseCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
        }
    }
}
