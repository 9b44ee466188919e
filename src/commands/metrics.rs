//! Metrics command implementation.
//!
//! One-shot views of the current snapshot: raw exposition text, compact or
//! pretty JSON, or a plain listing of family names.

use crate::config::Config;
use crate::snapshot::MetricFamily;

/// Prints the current metrics snapshot in the requested format.
pub async fn command_metrics(
    raw: bool,
    min: bool,
    arg: Option<&str>,
    server_id: Option<&str>,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    let poll_interval = super::effective_poll_interval(config, None);
    let builder = super::snapshot_builder(config, server_id, poll_interval)?;

    builder.ping().await?;

    match arg {
        Some("list") => {
            let encoded = builder.families_json(false).await?;
            let families: Vec<MetricFamily> = serde_json::from_str(&encoded)?;

            println!("Found {} metrics", families.len());
            for family in &families {
                println!("{}", family.name);
            }
            return Ok(());
        }
        Some(other) => {
            return Err(format!("unrecognized metrics argument '{other}'").into());
        }
        None => {}
    }

    if raw {
        let bytes = builder.raw_bytes().await?;
        println!("{}", String::from_utf8_lossy(&bytes));
    } else if min {
        println!("{}", builder.families_json(false).await?);
    } else {
        println!("{}", builder.families_json(true).await?);
    }

    Ok(())
}
