//! metriscope - version 0.1.0
//!
//! Terminal dashboard and JSON inspector for Prometheus metrics endpoints.
//! This is the main entry point that resolves configuration and dispatches subcommands.

use clap::Parser;
use std::sync::Arc;
use tracing::{info, Level};

use metriscope::cli::{Args, Commands};
use metriscope::commands::{command_graph, command_metrics};
use metriscope::config::{resolve_config, show_config, validate_effective_config, Config};

/// Initializes tracing logging subsystem with configured log level.
fn setup_logging(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let log_level = match config.log_level.as_deref() {
        Some("off") => Level::ERROR,
        Some("error") => Level::ERROR,
        Some("warn") => Level::WARN,
        Some("debug") => Level::DEBUG,
        Some("trace") => Level::TRACE,
        _ => Level::INFO,
    };

    match &config.log_file {
        Some(path) => {
            let file = std::fs::File::create(path)?;
            let subscriber = tracing_subscriber::fmt()
                .with_max_level(log_level)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(true)
                .with_line_number(true)
                .with_ansi(false)
                .with_writer(Arc::new(file))
                .finish();
            tracing::subscriber::set_global_default(subscriber)
                .expect("Failed to set tracing subscriber");
        }
        None => {
            // stdout carries command output, logs go to stderr
            let subscriber = tracing_subscriber::fmt()
                .with_max_level(log_level)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(true)
                .with_line_number(true)
                .with_writer(std::io::stderr)
                .finish();
            tracing::subscriber::set_global_default(subscriber)
                .expect("Failed to set tracing subscriber");
        }
    }

    info!("Logging initialized with level: {:?}", config.log_level);
    Ok(())
}

/// Main application entry point.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Early config resolution for show/check modes
    if args.show_config || args.check_config {
        let config = resolve_config(&args)?;

        if args.check_config {
            if let Err(e) = validate_effective_config(&config) {
                eprintln!("❌ Configuration invalid: {}", e);
                std::process::exit(1);
            }
            println!("✅ Configuration is valid");
            return Ok(());
        }

        return show_config(&config, args.config_format);
    }

    let config = resolve_config(&args)?;

    if let Err(e) = validate_effective_config(&config) {
        eprintln!("❌ Configuration invalid: {}", e);
        std::process::exit(1);
    }

    setup_logging(&config)?;

    info!("Starting metriscope");

    match &args.command {
        Some(Commands::Graph { interval }) => {
            command_graph(*interval, args.server_id.as_deref(), &config).await
        }
        Some(Commands::Metrics { raw, min, arg }) => {
            command_metrics(
                *raw,
                *min,
                arg.as_deref(),
                args.server_id.as_deref(),
                &config,
            )
            .await
        }
        // The dashboard is the primary mode, so a bare invocation starts it.
        None => command_graph(None, args.server_id.as_deref(), &config).await,
    }
}
