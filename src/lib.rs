//! Metriscope Platform Metrics Library
//!
//! This library polls an application platform's observability endpoint,
//! parses the Prometheus exposition text into structured metric families,
//! derives dashboard gauges from them and renders the result either as JSON
//! on stdout or as a live terminal dashboard.
//!
//! # Features
//!
//! - **Resilient Fetching**: Authenticated HTTP client with bounded retries
//! - **Tolerant Parsing**: Malformed exposition lines are dropped, never fatal
//! - **Derived Gauges**: Storage, heap and connection pool utilization
//! - **Live Dashboard**: Terminal UI refreshed on a fixed poll interval
//!
//! # Usage
//!
//! ```rust,no_run
//! use metriscope::{Credentials, FetchClient, MetricsSnapshotBuilder};
//! use std::time::Duration;
//!
//! # async fn demo() -> Result<(), metriscope::Error> {
//! let credentials = Credentials {
//!     username: "admin".to_string(),
//!     secret: "password".to_string(),
//! };
//! let client = FetchClient::new(Some(credentials), Duration::from_secs(30))?;
//! let mut builder = MetricsSnapshotBuilder::new(client, "http://localhost:8082", 1);
//!
//! builder.ping().await?;
//! let snapshot = builder.build_snapshot().await?;
//! println!("{} metric families", snapshot.families.len());
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod exposition;
pub mod fetch;
pub mod gauges;
pub mod scheduler;
pub mod series;
pub mod snapshot;
pub mod surface;
pub mod ui;

// Re-export main types for convenience
pub use error::Error;
pub use fetch::{Credentials, FetchClient, FetchOutcome};
pub use gauges::{DerivedGauges, PoolRow, PoolTotals};
pub use scheduler::{RefreshScheduler, SchedulerState};
pub use series::PoolSeriesBank;
pub use snapshot::{MetricFamily, MetricKind, MetricsSnapshotBuilder, SampleRecord, Snapshot};
pub use surface::{DisplaySurface, TickUpdate};
pub use ui::Dashboard;
