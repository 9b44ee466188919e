//! Refresh scheduler for the live dashboard.
//!
//! A two-state loop: Running multiplexes a poll timer against a cancellation
//! signal, Stopped is terminal. Each timer fire runs one full tick (fetch,
//! derive, hand to the surface) to completion before the next input is
//! considered, so cancellation is only observed between ticks and polls never
//! overlap. Errors from a tick stop the loop; retrying is the fetch layer's
//! job, not ours.

use crate::error::Error;
use crate::gauges;
use crate::series::{PoolSeriesBank, SERIES_SLOTS};
use crate::snapshot::MetricsSnapshotBuilder;
use crate::surface::{DisplaySurface, TickUpdate};
use chrono::{Local, Timelike};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::{interval_at, Instant};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Running,
    Stopped,
}

/// Drives a display surface from periodic snapshots until cancelled.
pub struct RefreshScheduler<S: DisplaySurface> {
    builder: MetricsSnapshotBuilder,
    surface: S,
    interval: Duration,
    cancel: oneshot::Receiver<()>,
    bank: PoolSeriesBank,
    state: SchedulerState,
}

impl<S: DisplaySurface> RefreshScheduler<S> {
    pub fn new(
        builder: MetricsSnapshotBuilder,
        surface: S,
        interval: Duration,
        cancel: oneshot::Receiver<()>,
    ) -> Self {
        Self {
            builder,
            surface,
            interval,
            cancel,
            bank: PoolSeriesBank::new(),
            state: SchedulerState::Stopped,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Hands the surface back for teardown once the loop has finished.
    pub fn into_surface(self) -> S {
        self.surface
    }

    /// Runs the refresh loop until cancellation or a tick error.
    ///
    /// An initial placeholder frame is rendered immediately; the first real
    /// poll happens one interval later. On any error the cancellation
    /// receiver is closed so a still-listening sender can observe that the
    /// loop is gone.
    pub async fn run(&mut self) -> Result<(), Error> {
        self.state = SchedulerState::Running;

        let result = self.drive().await;
        if result.is_err() {
            self.cancel.close();
        }
        self.state = SchedulerState::Stopped;
        result
    }

    async fn drive(&mut self) -> Result<(), Error> {
        self.surface.update(TickUpdate::placeholder());
        self.surface.render()?;

        let mut timer = interval_at(Instant::now() + self.interval, self.interval);
        info!("refresh loop started, polling every {:?}", self.interval);

        loop {
            tokio::select! {
                _ = &mut self.cancel => {
                    debug!("cancellation received, stopping refresh loop");
                    return Ok(());
                }
                _ = timer.tick() => {
                    let update = self.tick().await?;
                    self.surface.update(update);
                    self.surface.render()?;
                }
            }
        }
    }

    async fn tick(&mut self) -> Result<TickUpdate, Error> {
        let snapshot = self.builder.build_snapshot().await?;
        let second = Local::now().second() as usize % SERIES_SLOTS;
        let update = gauges::compute(&snapshot, &mut self.bank, second);

        Ok(TickUpdate {
            captured_at: snapshot.captured_at_display(),
            poll_offset_seconds: snapshot.poll_offset_seconds,
            gauges: update,
            pool_charts: self.bank.charts(),
            waiting: false,
        })
    }
}
