//! Military data feed abstraction.

use async_trait::async_trait;
use crate::error::EnvError;
use crate::types::{HexLookup, MilitaryListing};

/// Abstraction for the external military-aircraft data source.
///
/// # Implementations
///
/// - **Production**: `HttpMilitaryFeed` - ADSB.lol v2 REST API via reqwest
/// - **Simulation**: `ScriptedMilitaryFeed` - in-memory answers with fault injection
///
/// # Failure semantics
///
/// Implementations report failures as `Err`; they never guess. The caller
/// decides how a failure degrades (unknown verdict, stale list, ...).
#[async_trait]
pub trait MilitaryFeed: Send + Sync + 'static {
    /// Looks up a single ICAO hex.
    ///
    /// # Returns
    /// * `Ok(HexLookup)` - The source answered (its verdict may still be `None`)
    /// * `Err(EnvError)` - Transport, status, decode or timeout failure
    async fn lookup_hex(&self, hex: &str) -> Result<HexLookup, EnvError>;

    /// Fetches the global list of known-military hexes.
    async fn fetch_list(&self) -> Result<MilitaryListing, EnvError>;

    /// Short name for logging.
    fn name(&self) -> &str;
}
