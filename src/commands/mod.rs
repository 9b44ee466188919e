//! CLI command implementations for metriscope.
//!
//! This module provides implementations for all CLI subcommands:
//! - `graph`: Live terminal dashboard of derived metrics
//! - `metrics`: JSON and raw views of the current snapshot
//!
//! It also carries the shared wiring that turns the effective configuration
//! into a snapshot builder for the selected server.

use crate::config::{
    select_server, Config, DEFAULT_POLL_INTERVAL_SECONDS, DEFAULT_REQUEST_TIMEOUT_SECONDS,
    DEFAULT_RETRY_BACKOFF_SECONDS,
};
use crate::error::Error;
use crate::fetch::{Credentials, FetchClient};
use crate::snapshot::MetricsSnapshotBuilder;
use std::time::Duration;

pub mod graph;
pub mod metrics;

// Re-export command functions
pub use graph::command_graph;
pub use metrics::command_metrics;

/// Wires a snapshot builder for the selected server target.
pub(crate) fn snapshot_builder(
    config: &Config,
    server_id: Option<&str>,
    poll_interval: u64,
) -> Result<MetricsSnapshotBuilder, Error> {
    let server = select_server(config, server_id)?;

    let credentials = match (&server.username, &server.credential) {
        (Some(username), Some(secret)) => Some(Credentials {
            username: username.clone(),
            secret: secret.clone(),
        }),
        _ => None,
    };

    let timeout = Duration::from_secs(
        config
            .request_timeout_seconds
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECONDS),
    );
    let backoff = Duration::from_secs(
        config
            .retry_backoff_seconds
            .unwrap_or(DEFAULT_RETRY_BACKOFF_SECONDS),
    );

    let client = FetchClient::new(credentials, timeout)?.with_backoff(backoff);
    Ok(MetricsSnapshotBuilder::new(client, &server.url, poll_interval))
}

/// Poll interval from flag, then config, then default, floored at one second.
pub(crate) fn effective_poll_interval(config: &Config, flag: Option<u64>) -> u64 {
    flag.or(config.poll_interval_seconds)
        .unwrap_or(DEFAULT_POLL_INTERVAL_SECONDS)
        .max(1)
}
