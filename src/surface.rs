//! Display surface seam between the refresh loop and its renderer.

use crate::error::Error;
use crate::gauges::DerivedGauges;

/// Everything a surface needs to redraw for one tick.
#[derive(Debug, Clone, Default)]
pub struct TickUpdate {
    /// Header timestamp, already formatted (may be backdated when stale).
    pub captured_at: String,
    pub poll_offset_seconds: u64,
    pub gauges: DerivedGauges,
    /// Per-pool leased-connection series, sorted by pool name.
    pub pool_charts: Vec<(String, Vec<(f64, f64)>)>,
    /// Set on the initial frame, before the first poll has completed.
    pub waiting: bool,
}

impl TickUpdate {
    /// Initial frame shown while the first poll is still in flight.
    pub fn placeholder() -> Self {
        Self {
            waiting: true,
            ..Self::default()
        }
    }
}

/// Render target driven by the refresh scheduler.
///
/// The scheduler pushes a full update, then asks for one render. Layout is
/// entirely the surface's business. Implemented by the terminal dashboard
/// and by recording surfaces in tests.
pub trait DisplaySurface {
    fn update(&mut self, update: TickUpdate);
    fn render(&mut self) -> Result<(), Error>;
}
