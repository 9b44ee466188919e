//! Graph command implementation.
//!
//! Runs the live terminal dashboard: health probe, terminal setup, refresh
//! loop, teardown. The terminal is only entered after the health probe
//! passes so startup failures print normally.

use crate::config::Config;
use crate::scheduler::RefreshScheduler;
use crate::ui::{spawn_quit_listener, Dashboard};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{error, info};

/// Runs the live dashboard until the user quits or a poll fails.
pub async fn command_graph(
    interval: Option<u64>,
    server_id: Option<&str>,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    let poll_interval = super::effective_poll_interval(config, interval);
    let builder = super::snapshot_builder(config, server_id, poll_interval)?;

    builder.ping().await?;
    info!("health check passed, starting dashboard");

    let dashboard = Dashboard::new()?;
    let (tx, rx) = oneshot::channel();
    let listener = spawn_quit_listener(tx);

    let mut scheduler =
        RefreshScheduler::new(builder, dashboard, Duration::from_secs(poll_interval), rx);
    let result = scheduler.run().await;

    // Restore the terminal before surfacing any loop error.
    let mut dashboard = scheduler.into_surface();
    if let Err(e) = dashboard.teardown() {
        error!("terminal restore failed: {e}");
    }

    // The cancellation receiver went away with the scheduler, so the key
    // listener thread winds down on its own.
    let _ = listener.await;

    result?;
    Ok(())
}
