//! Configuration and CLI argument handling

use std::{path::PathBuf, time::Duration};

use clap::Parser;

use crate::state::TICK_INTERVAL_MS;

/// CLI argument parsing structure
#[derive(Parser, Debug, Clone)]
#[command(name = "countdown")]
#[command(about = "A countdown timer daemon that keeps counting after its observer leaves")]
#[command(version)]
pub struct Config {
    /// Port to bind the server to
    #[arg(short, long, default_value = "20554")]
    pub port: u16,

    /// Host address to bind to
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Directory for background job records and alert markers
    #[arg(long)]
    pub state_dir: Option<PathBuf>,

    /// Tick interval in milliseconds
    #[arg(long, default_value_t = TICK_INTERVAL_MS, value_parser = clap::value_parser!(u64).range(1..))]
    pub tick_ms: u64,

    /// Disable desktop notifications for background countdowns
    #[arg(long)]
    pub no_notify: bool,

    /// Command played as the completion alert (terminal bell if unset)
    #[arg(long)]
    pub alert_command: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Config {
    /// Parse configuration from command line arguments
    pub fn parse() -> Self {
        Parser::parse()
    }

    /// Get the server address as a formatted string
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Get the appropriate log level based on verbose flag
    pub fn log_level(&self) -> &'static str {
        if self.verbose { "debug" } else { "info" }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    /// Resolve the state directory, preferring the platform state dir
    pub fn state_dir(&self) -> PathBuf {
        self.state_dir.clone().unwrap_or_else(|| {
            dirs::state_dir()
                .or_else(dirs::data_local_dir)
                .unwrap_or_else(std::env::temp_dir)
                .join("countdown")
        })
    }

    pub fn jobs_dir(&self) -> PathBuf {
        self.state_dir().join("jobs")
    }

    pub fn alerts_dir(&self) -> PathBuf {
        self.state_dir().join("alerts")
    }
}
