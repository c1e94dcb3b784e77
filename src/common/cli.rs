//! CLI argument parsing for acquisition binaries
//!
//! # Design Principles (KISS)
//! - Use clap's derive macro for declarative argument definition
//! - CLI values override the config file, which overrides built-in defaults

use clap::Parser;

/// Arguments for the acquire binary
#[derive(Parser, Debug, Clone)]
#[command(name = "acquire", about = "Run the TDC acquisition pipeline")]
pub struct AcquireArgs {
    /// Path to configuration file (missing file = built-in defaults)
    #[arg(short = 'f', long = "config", default_value = "config.toml")]
    pub config_file: String,

    /// Request raw TDC fields instead of reconstructed DLD events
    #[arg(long)]
    pub raw: bool,

    /// Override measurement cycle duration in milliseconds
    #[arg(long = "duration-ms")]
    pub duration_ms: Option<u32>,

    /// Override event queue bound (0 = unbounded)
    #[arg(long = "queue-capacity")]
    pub queue_capacity: Option<usize>,

    /// Stop after this many cycles instead of waiting for Ctrl+C
    #[arg(long = "max-cycles")]
    pub max_cycles: Option<u64>,
}

impl AcquireArgs {
    /// Apply CLI overrides on top of a loaded configuration
    pub fn apply(&self, config: &mut crate::config::Config) {
        if self.raw {
            config.acquisition.raw_mode = true;
        }
        if let Some(d) = self.duration_ms {
            config.acquisition.duration_ms = d;
        }
        if let Some(c) = self.queue_capacity {
            config.acquisition.queue_capacity = if c == 0 { None } else { Some(c) };
        }
        if let Some(m) = self.max_cycles {
            config.acquisition.max_cycles = Some(m);
        }
    }
}
