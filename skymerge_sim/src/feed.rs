//! Scripted military feed with fault injection.

use async_trait::async_trait;
use skymerge_env::{EnvError, HexLookup, MilitaryFeed, MilitaryListing};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Faults currently injected into a [`ScriptedMilitaryFeed`].
#[derive(Debug, Clone, Default)]
pub struct FeedFaults {
    /// Every call fails
    pub outage: bool,

    /// Only `fetch_list` fails
    pub list_outage: bool,

    /// Per-hex lookups for these hexes fail
    pub failing_hexes: BTreeSet<String>,

    /// Per-hex lookups for these hexes answer without a verdict
    pub unknown_hexes: BTreeSet<String>,

    /// Every call waits this long before answering
    pub delay: Option<Duration>,
}

/// In-memory military source answering from a fixed set of hexes.
///
/// Every hex outside `military` is reported as civil unless a fault says
/// otherwise. Calls are counted so scenarios can assert on traffic.
pub struct ScriptedMilitaryFeed {
    military: BTreeSet<String>,
    faults: Mutex<FeedFaults>,
    hex_calls: AtomicUsize,
    list_calls: AtomicUsize,
}

impl ScriptedMilitaryFeed {
    /// Creates a feed that knows the given military hexes (any case).
    pub fn new<I, S>(military: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            military: military
                .into_iter()
                .map(|h| h.as_ref().to_ascii_uppercase())
                .collect(),
            faults: Mutex::new(FeedFaults::default()),
            hex_calls: AtomicUsize::new(0),
            list_calls: AtomicUsize::new(0),
        }
    }

    fn faults(&self) -> FeedFaults {
        self.faults.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn update(&self, f: impl FnOnce(&mut FeedFaults)) {
        f(&mut self.faults.lock().unwrap_or_else(PoisonError::into_inner));
    }

    /// Takes the whole feed down, or brings it back.
    pub fn set_outage(&self, down: bool) {
        self.update(|faults| faults.outage = down);
    }

    pub fn set_list_outage(&self, down: bool) {
        self.update(|faults| faults.list_outage = down);
    }

    /// Makes lookups of `hex` fail.
    pub fn fail_hex(&self, hex: &str) {
        let hex = hex.to_ascii_uppercase();
        self.update(|faults| {
            faults.failing_hexes.insert(hex);
        });
    }

    /// Makes lookups of `hex` answer with no verdict.
    pub fn forget_hex(&self, hex: &str) {
        let hex = hex.to_ascii_uppercase();
        self.update(|faults| {
            faults.unknown_hexes.insert(hex);
        });
    }

    pub fn set_delay(&self, delay: Option<Duration>) {
        self.update(|faults| faults.delay = delay);
    }

    /// Clears every injected fault.
    pub fn heal_all(&self) {
        self.update(|faults| *faults = FeedFaults::default());
    }

    /// Per-hex lookups received so far, failed ones included.
    pub fn hex_calls(&self) -> usize {
        self.hex_calls.load(Ordering::SeqCst)
    }

    /// List fetches received so far, failed ones included.
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn reset_counters(&self) {
        self.hex_calls.store(0, Ordering::SeqCst);
        self.list_calls.store(0, Ordering::SeqCst);
    }

    pub fn military_hexes(&self) -> &BTreeSet<String> {
        &self.military
    }
}

#[async_trait]
impl MilitaryFeed for ScriptedMilitaryFeed {
    async fn lookup_hex(&self, hex: &str) -> Result<HexLookup, EnvError> {
        self.hex_calls.fetch_add(1, Ordering::SeqCst);
        let faults = self.faults();
        if let Some(delay) = faults.delay {
            tokio::time::sleep(delay).await;
        }

        let hex = hex.to_ascii_uppercase();
        if faults.outage {
            return Err(EnvError::unavailable("scripted feed outage"));
        }
        if faults.failing_hexes.contains(&hex) {
            return Err(EnvError::network(format!("scripted failure for {}", hex)));
        }
        let military = if faults.unknown_hexes.contains(&hex) {
            None
        } else {
            Some(self.military.contains(&hex))
        };
        Ok(HexLookup { hex, military })
    }

    async fn fetch_list(&self) -> Result<MilitaryListing, EnvError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let faults = self.faults();
        if let Some(delay) = faults.delay {
            tokio::time::sleep(delay).await;
        }

        if faults.outage || faults.list_outage {
            return Err(EnvError::unavailable("scripted list outage"));
        }
        Ok(MilitaryListing::from_hexes(&self.military))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_answers_from_military_set() {
        let feed = ScriptedMilitaryFeed::new(["ae1234"]);

        let mil = feed.lookup_hex("AE1234").await.unwrap();
        assert_eq!(mil.military, Some(true));

        let civil = feed.lookup_hex("a27a94").await.unwrap();
        assert_eq!(civil.hex, "A27A94");
        assert_eq!(civil.military, Some(false));

        let listing = feed.fetch_list().await.unwrap();
        assert!(listing.hexes.contains("AE1234"));
        assert_eq!(feed.hex_calls(), 2);
        assert_eq!(feed.list_calls(), 1);
    }

    #[tokio::test]
    async fn test_fault_injection() {
        let feed = ScriptedMilitaryFeed::new(["AE1234"]);

        feed.fail_hex("ae1234");
        assert!(feed.lookup_hex("AE1234").await.is_err());
        assert!(feed.lookup_hex("A27A94").await.is_ok());

        feed.forget_hex("A27A94");
        assert_eq!(feed.lookup_hex("A27A94").await.unwrap().military, None);

        feed.set_list_outage(true);
        assert!(feed.fetch_list().await.is_err());
        assert!(feed.lookup_hex("ABC123").await.is_ok());

        feed.set_outage(true);
        assert!(matches!(
            feed.lookup_hex("ABC123").await,
            Err(EnvError::Unavailable(_))
        ));

        feed.heal_all();
        assert_eq!(feed.lookup_hex("AE1234").await.unwrap().military, Some(true));
        assert!(feed.fetch_list().await.is_ok());
    }

    #[tokio::test]
    async fn test_counters_include_failures() {
        let feed = ScriptedMilitaryFeed::new(Vec::<String>::new());
        feed.set_outage(true);
        let _ = feed.lookup_hex("A27A94").await;
        let _ = feed.fetch_list().await;
        assert_eq!(feed.hex_calls(), 1);
        assert_eq!(feed.list_calls(), 1);

        feed.reset_counters();
        assert_eq!(feed.hex_calls(), 0);
        assert_eq!(feed.list_calls(), 0);
    }
}
