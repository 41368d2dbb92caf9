//! CLI Entry Point for daq-readers
//!
//! Provides command-line interface for:
//! - Listing serial ports and which of them look like the expected vendor
//! - Running an acquisition session from a TOML run configuration
//!
//! # Usage
//!
//! List ports:
//! ```bash
//! daq-readers ports --vendor Arduino
//! ```
//!
//! Acquire ten reads and print them as JSON:
//! ```bash
//! daq-readers acquire --config bench.toml --reads 10 --format json
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use daq_readers::acquisition::run_acquisition;
use daq_readers::config::AppConfig;
use daq_readers::factory::build_device;
use daq_readers::logging::{self, OutputFormat, TracingConfig};
use daq_readers::SampleMatrix;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "daq-readers")]
#[command(about = "Blocking DAQ readers for serial, Blackrock and socket devices")]
#[command(long_about = None)]
struct Cli {
    /// Log level override (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value = "compact")]
    log_format: OutputFormat,

    /// Disable ANSI colors in log output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List serial ports, marking those whose description matches the vendor
    Ports {
        /// Description prefix to match
        #[arg(long, default_value = "Arduino")]
        vendor: String,
    },

    /// Start the configured device, read from it, and stop it
    Acquire {
        /// Path to the run configuration (TOML)
        #[arg(long)]
        config: PathBuf,

        /// Number of reads; runs until Ctrl-C when omitted
        #[arg(long)]
        reads: Option<u64>,

        /// How each matrix is printed
        #[arg(long, value_enum, default_value = "table")]
        format: PrintFormat,
    },
}

#[derive(Serialize)]
struct ReadRecord<'a> {
    read: u64,
    data: &'a SampleMatrix,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PrintFormat {
    /// One line per channel
    Table,
    /// One JSON object per read
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Ports { vendor } => {
            let tracing = TracingConfig::default()
                .with_level_override(cli.log_level.as_deref())
                .map_err(anyhow::Error::msg)?;
            init_logging(tracing, &cli)?;
            list_ports(vendor)
        }
        Commands::Acquire {
            config,
            reads,
            format,
        } => {
            let app = AppConfig::load_from(config)
                .with_context(|| format!("Failed to load {}", config.display()))?;
            app.validate().map_err(anyhow::Error::msg)?;
            let tracing = TracingConfig::from_app_config(&app)
                .and_then(|t| t.with_level_override(cli.log_level.as_deref()))
                .map_err(anyhow::Error::msg)?;
            init_logging(tracing, &cli)?;
            acquire(app, *reads, *format).await
        }
    }
}

fn init_logging(tracing: TracingConfig, cli: &Cli) -> Result<()> {
    let tracing = tracing.with_format(cli.log_format).with_ansi(!cli.no_color);
    logging::init(tracing).map_err(anyhow::Error::msg)
}

#[cfg(feature = "instrument_serial")]
fn list_ports(vendor: &str) -> Result<()> {
    use daq_readers::serial::{PortDiscovery, SystemPorts};

    let ports = SystemPorts
        .list_ports()
        .context("Could not enumerate serial ports")?;
    if ports.is_empty() {
        println!("No serial ports detected on this system");
        return Ok(());
    }
    for port in ports {
        let marker = if port.description.starts_with(vendor) {
            "*"
        } else {
            " "
        };
        println!("{marker} {:<24} {}", port.port_name, port.description);
    }
    Ok(())
}

#[cfg(not(feature = "instrument_serial"))]
fn list_ports(_vendor: &str) -> Result<()> {
    anyhow::bail!("Serial support not enabled. Rebuild with --features instrument_serial")
}

async fn acquire(app: AppConfig, reads: Option<u64>, format: PrintFormat) -> Result<()> {
    info!(name = %app.application.name, kind = app.device.kind(), "Loaded configuration");
    let mut device = build_device(&app.device).context("Failed to build device")?;
    let cancel = device.cancel_handle();
    let stop = Arc::new(AtomicBool::new(false));

    let worker_stop = Arc::clone(&stop);
    let mut worker = tokio::task::spawn_blocking(move || {
        run_acquisition(&mut device, reads, &worker_stop, |index, matrix| {
            print_matrix(index, matrix, format);
            Ok(())
        })
    });

    let delivered = tokio::select! {
        joined = &mut worker => joined.context("Acquisition task panicked")??,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, finishing current read");
            stop.store(true, Ordering::SeqCst);
            if let Some(cancel) = cancel {
                cancel.cancel();
            }
            tokio::select! {
                joined = &mut worker => joined.context("Acquisition task panicked")??,
                _ = tokio::signal::ctrl_c() => {
                    warn!("Interrupted again, exiting without stopping the device");
                    std::process::exit(130);
                }
            }
        }
    };

    info!(reads = delivered, "Done");
    Ok(())
}

fn print_matrix(index: u64, matrix: &SampleMatrix, format: PrintFormat) {
    match format {
        PrintFormat::Json => match serde_json::to_string(&ReadRecord {
            read: index,
            data: matrix,
        }) {
            Ok(line) => println!("{line}"),
            Err(e) => eprintln!("Failed to serialize read {index}: {e}"),
        },
        PrintFormat::Table => {
            println!("# read {index}");
            for (channel, row) in matrix.rows().enumerate() {
                let values: Vec<String> = row.iter().map(|v| format!("{v:.3}")).collect();
                println!("ch{channel:<3} {}", values.join(" "));
            }
        }
    }
}
