//! Agent CLI: runs one measurement cycle against an SPS30 over SHDLC and
//! hands the sample to a [`sps30_agent::SampleSink`]. See spec.md §6.

use std::path::PathBuf;
use std::thread::sleep;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use sps30_agent::config::Config;
use sps30_agent::sink::{LoggingSink, Sample, SampleSink};
use sps30_agent::sps30::{Sps30, WARM_UP};
use sps30_agent::transport::{SerialTransport, TransportError};

const DEFAULT_SERIAL_PORT: &str = "/dev/serial0";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file path.
    #[arg(short, long, default_value = "airmonitor_config.yml")]
    config: PathBuf,
}

/// Rotating log file directory, matching the original agent's
/// `RotatingFileHandler`; see `examples/original_source/pmmonitor.py`.
const LOG_DIR: &str = "logs";

fn setup_logging() -> Result<tracing_appender::non_blocking::WorkerGuard> {
    let console_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let file_appender = tracing_appender::rolling::daily(LOG_DIR, "airmonitor.log");
    let (non_blocking_writer, guard) = tracing_appender::non_blocking(file_appender);
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking_writer)
        .with_ansi(false);

    let filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(guard)
}

/// Loads the config and opens the serial port. Failure here is fatal to
/// the process: the caller exits non-zero.
fn startup(cli: &Cli) -> Result<(Config, SerialTransport)> {
    let config = Config::load(&cli.config)
        .with_context(|| format!("loading config from {:?}", cli.config))?;

    let transport = SerialTransport::open(DEFAULT_SERIAL_PORT).map_err(|err| match err {
        TransportError::OpenFailed { .. } => {
            anyhow::Error::new(err).context("opening serial port is a fatal start-up failure")
        }
        other => anyhow::Error::new(other),
    })?;

    Ok((config, transport))
}

/// Runs one measurement cycle. Failure here is per-cycle, not fatal: the
/// caller logs it and still exits 0 (no sample is emitted this cycle).
fn run_cycle(config: &Config, transport: SerialTransport) -> Result<()> {
    let mut sensor = Sps30::new(transport);
    sensor.reset().context("resetting sensor")?;
    sensor
        .start_measurement()
        .context("starting measurement mode")?;
    sleep(WARM_UP);

    let measurement = sensor
        .read_measured_values()
        .context("reading measured values")?;

    let sample = Sample::new(
        config.sensirion_sps30.measurement.clone(),
        Utc::now(),
        measurement.to_fields(),
    );

    let mut sink = LoggingSink;
    sink.write(&sample).context("writing sample to sink")?;

    sensor
        .stop_measurement()
        .context("stopping measurement mode")?;

    info!("measurement cycle complete");
    Ok(())
}

fn main() {
    let _log_guard = match setup_logging() {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("failed to initialise logging: {err:?}");
            std::process::exit(1);
        }
    };
    let cli = Cli::parse();

    let (config, transport) = match startup(&cli) {
        Ok(pair) => pair,
        Err(err) => {
            error!(error = ?err, "start-up failed");
            std::process::exit(1);
        }
    };

    if let Err(err) = run_cycle(&config, transport) {
        error!(error = ?err, "measurement cycle failed");
    }

    std::process::exit(0);
}
