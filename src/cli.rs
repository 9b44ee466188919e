//! CLI arguments and subcommands for metriscope.
//!
//! This module defines the command-line interface structure using the clap library,
//! including all flags, options, and subcommands.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Log level options for CLI parsing
#[derive(Debug, Clone, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Configuration format options for output
#[derive(Debug, Clone, ValueEnum)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

/// Main CLI arguments structure
#[derive(Parser, Debug)]
#[command(
    name = "metriscope",
    about = "Terminal dashboard and JSON inspector for Prometheus metrics endpoints",
    long_about = "Terminal dashboard and JSON inspector for Prometheus metrics endpoints.\n\n\
                  Polls an application's metrics endpoint, derives storage, heap, database \
                  and connection-pool gauges from the raw samples, and renders them as a \
                  refreshing terminal dashboard or as JSON for scripting.",
    author = "Michael Moll <exporter@herakles.now> - Herakles",
    version = "0.1.0",
    propagate_version = true,
    after_help = "Project: https://github.com/cansp-dev/metriscope - Support: exporter@herakles.now"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Log level (overrides config file)
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Write log output to a file instead of stderr
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Config file (YAML/JSON/TOML)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Disable all config file loading
    #[arg(long)]
    pub no_config: bool,

    /// Print effective merged config and exit
    #[arg(long)]
    pub show_config: bool,

    /// Output format for --show-config
    #[arg(long, value_enum, default_value = "yaml")]
    pub config_format: ConfigFormat,

    /// Validate config and exit (return code 1 on error)
    #[arg(long)]
    pub check_config: bool,

    /// Id of the configured server to target
    #[arg(long)]
    pub server_id: Option<String>,
}

/// Subcommands for additional functionality
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Render a refreshing terminal dashboard of derived metrics
    Graph {
        /// Seconds between endpoint polls
        #[arg(short = 'i', long)]
        interval: Option<u64>,
    },

    /// Print the current metrics snapshot as JSON
    Metrics {
        /// Print the exposition body exactly as served
        #[arg(long, conflicts_with = "min")]
        raw: bool,

        /// Print compact single-line JSON instead of pretty-printed
        #[arg(long)]
        min: bool,

        /// Optional mode ("list" prints metric names only)
        arg: Option<String>,
    },
}
