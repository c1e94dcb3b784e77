//! Acquire binary - runs the acquisition pipeline against the simulated TDC
//!
//! Usage:
//!   cargo run --bin acquire -- --config config.toml
//!   cargo run --bin acquire -- --raw --duration-ms 50
//!   cargo run --bin acquire -- --max-cycles 10
//!
//! Stops cleanly on Ctrl+C: the current measurement cycle is fully drained
//! before the device is released.

use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use tdc_daq_rs::acquisition::MeasurementLoop;
use tdc_daq_rs::common::cli::AcquireArgs;
use tdc_daq_rs::common::{PipelineCounters, StopHandle};
use tdc_daq_rs::config::Config;
use tdc_daq_rs::demux::{memory_sinks, Demultiplexer};
use tdc_daq_rs::driver::sim::SimTdc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing (logging)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("tdc_daq_rs=info".parse()?))
        .init();

    let args = AcquireArgs::parse();

    let mut config = if Path::new(&args.config_file).exists() {
        let config = Config::load(&args.config_file)?;
        info!(config_file = %args.config_file, "Loaded configuration from file");
        config
    } else {
        info!(config_file = %args.config_file, "Config file not found, using defaults");
        Config::default()
    };
    args.apply(&mut config);

    let mode = config.acquisition.mode();
    info!(
        mode = %mode,
        duration_ms = config.acquisition.duration_ms,
        queue_capacity = ?config.acquisition.queue_capacity,
        max_cycles = ?config.acquisition.max_cycles,
        "Acquisition configuration"
    );

    // Per-field sinks for the mode's field set
    let counters = Arc::new(PipelineCounters::new());
    let (sinks, sink_handles) = memory_sinks(mode);
    let demux = Demultiplexer::new(mode, sinks, counters.clone())
        .map_err(|e| anyhow::anyhow!("demultiplexer setup failed: {}", e))?;

    let device = SimTdc::new(config.sim.clone(), mode);
    let stop = StopHandle::new();
    let pipeline = MeasurementLoop::new(device, config.acquisition.clone(), demux, stop.clone(), counters)
        .map_err(|e| anyhow::anyhow!("pipeline setup failed: {}", e))?;

    println!("Acquisition running ({} mode). Press Ctrl+C to stop.", mode);

    // Ctrl+C requests a cooperative stop; it takes effect once the current
    // cycle drains.
    let stop_for_signal = stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!("\nReceived Ctrl+C, stopping after the current cycle...");
            stop_for_signal.request_stop();
        }
    });

    // The pipeline is blocking; keep it off the async runtime.
    let result = tokio::task::spawn_blocking(move || pipeline.run()).await?;

    match result {
        Ok(summary) => {
            info!(
                cycles = summary.cycles,
                batches = summary.batches,
                events = summary.events,
                "Acquisition finished"
            );
            for (field, sink) in &sink_handles {
                info!(field = %field, values = sink.len(), "Sink totals");
            }
            println!(
                "Acquisition stopped: {} cycles, {} batches, {} events.",
                summary.cycles, summary.batches, summary.events
            );
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Acquisition failed");
            eprintln!("Acquisition failed: {}", e);
            std::process::exit(1);
        }
    }
}
