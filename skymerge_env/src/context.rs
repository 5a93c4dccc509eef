//! Core environment context trait for the fusion pipeline.

use std::time::{SystemTime, UNIX_EPOCH};

/// The wall clock seen by the fusion core.
///
/// Provider ages and military cache TTLs are both measured against this
/// clock, so swapping the implementation is enough to make a whole cycle
/// reproducible.
///
/// # Implementations
///
/// - **Production**: `SystemContext` - wraps `SystemTime::now()`
/// - **Simulation**: `SimContext` - virtual clock advanced by the harness
pub trait FusionContext: Send + Sync + 'static {
    /// Returns the wall-clock time.
    fn system_time(&self) -> SystemTime;

    /// Returns the wall-clock time as fractional unix seconds.
    ///
    /// Times before the epoch collapse to `0.0`.
    fn unix_now(&self) -> f64 {
        self.system_time()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0)
    }
}
