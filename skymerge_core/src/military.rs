//! The Military Classifier
//!
//! Decides, per hex, whether an airframe is military using an external source
//! behind a TTL cache. Three modes:
//! - `perhex`: one lookup per uncached hex (ADSB.lol `/v2/hex/{HEX}`)
//! - `list`: one global list fetched at most once per TTL (ADSB.lol `/v2/mil`)
//! - `off`: no network, everything `Unknown`
//!
//! Every external call is bounded by a timeout. Failures degrade to `Unknown`
//! (or to the stale list) and never stop the cycle.

use crate::cache::{is_expired, HexCacheEntry, ListCacheEntry, MilitaryCacheStore};
use crate::canonical::is_non_icao;
use crate::config::MilitaryConfig;
use crate::error::CacheError;
use serde::{Deserialize, Serialize, Serializer};
use skymerge_env::{EnvError, MilitaryFeed};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

// ============================================================================
// TRI-STATE
// ============================================================================

/// Military verdict. Serializes as JSON `true`, `false` or `null`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MilitaryStatus {
    True,
    False,
    #[default]
    Unknown,
}

impl MilitaryStatus {
    pub fn from_flag(flag: Option<bool>) -> Self {
        match flag {
            Some(true) => MilitaryStatus::True,
            Some(false) => MilitaryStatus::False,
            None => MilitaryStatus::Unknown,
        }
    }

    pub fn as_flag(&self) -> Option<bool> {
        match self {
            MilitaryStatus::True => Some(true),
            MilitaryStatus::False => Some(false),
            MilitaryStatus::Unknown => None,
        }
    }

    pub fn is_military(&self) -> bool {
        *self == MilitaryStatus::True
    }

    /// `True` if any verdict is true, `False` if at least one is false and
    /// none true, otherwise `Unknown`.
    pub fn aggregate(verdicts: impl IntoIterator<Item = MilitaryStatus>) -> Self {
        verdicts
            .into_iter()
            .fold(MilitaryStatus::Unknown, |acc, v| match (acc, v) {
                (MilitaryStatus::True, _) | (_, MilitaryStatus::True) => MilitaryStatus::True,
                (MilitaryStatus::False, _) | (_, MilitaryStatus::False) => MilitaryStatus::False,
                _ => MilitaryStatus::Unknown,
            })
    }
}

impl Serialize for MilitaryStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.as_flag().serialize(serializer)
    }
}

// ============================================================================
// MODE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MilitaryMode {
    #[default]
    PerHex,
    List,
    Off,
}

impl fmt::Display for MilitaryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MilitaryMode::PerHex => "perhex",
            MilitaryMode::List => "list",
            MilitaryMode::Off => "off",
        })
    }
}

impl FromStr for MilitaryMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "perhex" | "per-hex" | "per_hex" => Ok(MilitaryMode::PerHex),
            "list" => Ok(MilitaryMode::List),
            "off" | "none" => Ok(MilitaryMode::Off),
            other => Err(format!("Unknown military mode: {} (expected perhex, list or off)", other)),
        }
    }
}

// ============================================================================
// CLASSIFIER
// ============================================================================

/// Counters for one classifier's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClassifierStats {
    pub cache_hits: usize,
    pub lookups: usize,
    pub failures: usize,
    pub list_fetches: usize,
    /// Lookups skipped because the feed was considered down
    pub skipped: usize,
}

/// TTL-cached tri-state classifier over a [`MilitaryFeed`].
pub struct MilitaryClassifier<F: MilitaryFeed> {
    feed: Arc<F>,
    store: Box<dyn MilitaryCacheStore>,
    mode: MilitaryMode,
    ttl_secs: f64,
    timeout: Duration,
    max_consecutive_failures: u32,
    consecutive_failures: u32,
    stats: ClassifierStats,
}

impl<F: MilitaryFeed> MilitaryClassifier<F> {
    pub fn new(feed: Arc<F>, store: Box<dyn MilitaryCacheStore>, config: &MilitaryConfig) -> Self {
        Self {
            feed,
            store,
            mode: config.mode,
            ttl_secs: config.ttl.as_secs_f64(),
            timeout: config.request_timeout,
            max_consecutive_failures: config.max_consecutive_failures,
            consecutive_failures: 0,
            stats: ClassifierStats::default(),
        }
    }

    pub fn stats(&self) -> ClassifierStats {
        self.stats
    }

    pub fn store(&self) -> &dyn MilitaryCacheStore {
        self.store.as_ref()
    }

    /// Persists cache changes made since load.
    pub fn flush(&mut self) -> Result<(), CacheError> {
        self.store.flush()
    }

    /// Classifies every hex (upper-cased canonical form) at time `now`.
    pub async fn classify(&mut self, hexes: &[String], now: f64) -> BTreeMap<String, MilitaryStatus> {
        if hexes.is_empty() {
            return BTreeMap::new();
        }
        // The breaker only spans one cycle
        self.consecutive_failures = 0;
        match self.mode {
            MilitaryMode::Off => hexes
                .iter()
                .map(|h| (h.clone(), MilitaryStatus::Unknown))
                .collect(),
            MilitaryMode::PerHex => {
                let mut out = BTreeMap::new();
                for hex in hexes {
                    let status = self.classify_hex(hex, now).await;
                    out.insert(hex.clone(), status);
                }
                out
            }
            MilitaryMode::List => self.classify_by_list(hexes, now).await,
        }
    }

    fn feed_is_down(&self) -> bool {
        self.max_consecutive_failures > 0 && self.consecutive_failures >= self.max_consecutive_failures
    }

    fn record_failure(&mut self, what: &str, err: &EnvError) {
        self.stats.failures += 1;
        if matches!(
            err,
            EnvError::Timeout(_) | EnvError::NetworkError(_) | EnvError::Unavailable(_)
        ) {
            self.consecutive_failures += 1;
            if self.feed_is_down() {
                warn!(
                    feed = self.feed.name(),
                    failures = self.consecutive_failures,
                    "military feed unreachable, skipping remaining lookups this cycle"
                );
            }
        }
        warn!(feed = self.feed.name(), what, error = %err, "military feed request failed");
    }

    async fn classify_hex(&mut self, hex: &str, now: f64) -> MilitaryStatus {
        if is_non_icao(hex) {
            return MilitaryStatus::Unknown;
        }

        if let Some(entry) = self.store.get(hex) {
            if !is_expired(entry.fetched_at, now, self.ttl_secs) {
                self.stats.cache_hits += 1;
                return MilitaryStatus::from_flag(entry.is_military);
            }
        }

        if self.feed_is_down() {
            self.stats.skipped += 1;
            return MilitaryStatus::Unknown;
        }

        self.stats.lookups += 1;
        let result = match tokio::time::timeout(self.timeout, self.feed.lookup_hex(hex)).await {
            Ok(r) => r,
            Err(_) => Err(EnvError::Timeout(self.timeout.as_millis() as u64)),
        };

        match result {
            Ok(lookup) => {
                self.consecutive_failures = 0;
                debug!(hex, military = ?lookup.military, "military lookup");
                self.store.put(
                    hex,
                    HexCacheEntry {
                        is_military: lookup.military,
                        fetched_at: now,
                    },
                );
                MilitaryStatus::from_flag(lookup.military)
            }
            Err(e) => {
                self.record_failure(hex, &e);
                MilitaryStatus::Unknown
            }
        }
    }

    async fn classify_by_list(&mut self, hexes: &[String], now: f64) -> BTreeMap<String, MilitaryStatus> {
        let fresh = self
            .store
            .list()
            .is_some_and(|l| !is_expired(l.fetched_at, now, self.ttl_secs));

        if !fresh {
            self.stats.list_fetches += 1;
            let result = match tokio::time::timeout(self.timeout, self.feed.fetch_list()).await {
                Ok(r) => r,
                Err(_) => Err(EnvError::Timeout(self.timeout.as_millis() as u64)),
            };
            match result {
                Ok(listing) => {
                    info!(members = listing.len(), "military list refreshed");
                    self.consecutive_failures = 0;
                    self.store.put_list(ListCacheEntry {
                        member_hexes: listing.hexes,
                        fetched_at: now,
                    });
                }
                Err(e) => {
                    self.record_failure("list", &e);
                    if self.store.list().is_some() {
                        warn!("using stale military list");
                    }
                }
            }
        } else {
            self.stats.cache_hits += 1;
        }

        let list = self.store.list();
        hexes
            .iter()
            .map(|h| {
                let status = match list {
                    Some(l) if l.member_hexes.contains(h) => MilitaryStatus::True,
                    Some(_) => MilitaryStatus::False,
                    None => MilitaryStatus::Unknown,
                };
                (h.clone(), status)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCacheStore;
    use async_trait::async_trait;
    use skymerge_env::{HexLookup, MilitaryListing};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Feed with a fixed military set; optionally failing or hanging.
    #[derive(Default)]
    struct FixedFeed {
        military: Vec<&'static str>,
        fail: bool,
        hang: bool,
        hex_calls: AtomicUsize,
        list_calls: AtomicUsize,
    }

    #[async_trait]
    impl MilitaryFeed for FixedFeed {
        async fn lookup_hex(&self, hex: &str) -> Result<HexLookup, EnvError> {
            self.hex_calls.fetch_add(1, Ordering::SeqCst);
            if self.hang {
                tokio::time::sleep(Duration::from_secs(30)).await;
            }
            if self.fail {
                return Err(EnvError::network("connection refused"));
            }
            Ok(HexLookup {
                hex: hex.to_string(),
                military: Some(self.military.iter().any(|m| *m == hex)),
            })
        }

        async fn fetch_list(&self) -> Result<MilitaryListing, EnvError> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(EnvError::unavailable("list endpoint down"));
            }
            Ok(MilitaryListing::from_hexes(self.military.iter().copied()))
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    fn config(mode: MilitaryMode) -> MilitaryConfig {
        MilitaryConfig {
            mode,
            request_timeout: Duration::from_millis(50),
            ..MilitaryConfig::default()
        }
    }

    fn hexes(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_aggregation_table() {
        use MilitaryStatus::*;
        assert_eq!(MilitaryStatus::aggregate([True, False]), True);
        assert_eq!(MilitaryStatus::aggregate([Unknown, True]), True);
        assert_eq!(MilitaryStatus::aggregate([False, Unknown]), False);
        assert_eq!(MilitaryStatus::aggregate([Unknown, Unknown]), Unknown);
        assert_eq!(MilitaryStatus::aggregate([]), Unknown);
    }

    #[test]
    fn test_status_serializes_as_nullable_bool() {
        assert_eq!(serde_json::to_string(&MilitaryStatus::True).unwrap(), "true");
        assert_eq!(serde_json::to_string(&MilitaryStatus::Unknown).unwrap(), "null");
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("perhex".parse::<MilitaryMode>().unwrap(), MilitaryMode::PerHex);
        assert_eq!("LIST".parse::<MilitaryMode>().unwrap(), MilitaryMode::List);
        assert!("sometimes".parse::<MilitaryMode>().is_err());
    }

    #[tokio::test]
    async fn test_perhex_caches_answers() {
        let feed = Arc::new(FixedFeed { military: vec!["AE1234"], ..Default::default() });
        let mut c = MilitaryClassifier::new(
            feed.clone(),
            Box::new(InMemoryCacheStore::new()),
            &config(MilitaryMode::PerHex),
        );

        let out = c.classify(&hexes(&["AE1234", "A27A94"]), 1000.0).await;
        assert_eq!(out["AE1234"], MilitaryStatus::True);
        assert_eq!(out["A27A94"], MilitaryStatus::False);
        assert_eq!(feed.hex_calls.load(Ordering::SeqCst), 2);

        // Within TTL: served from cache
        c.classify(&hexes(&["AE1234", "A27A94"]), 2000.0).await;
        assert_eq!(feed.hex_calls.load(Ordering::SeqCst), 2);
        assert_eq!(c.stats().cache_hits, 2);

        // After TTL: looked up again
        c.classify(&hexes(&["AE1234"]), 1000.0 + 21601.0).await;
        assert_eq!(feed.hex_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_perhex_failure_is_unknown_and_not_cached() {
        let feed = Arc::new(FixedFeed { fail: true, ..Default::default() });
        let mut c = MilitaryClassifier::new(
            feed.clone(),
            Box::new(InMemoryCacheStore::new()),
            &config(MilitaryMode::PerHex),
        );
        let out = c.classify(&hexes(&["A27A94"]), 1000.0).await;
        assert_eq!(out["A27A94"], MilitaryStatus::Unknown);
        assert!(c.store().is_empty());
    }

    #[tokio::test]
    async fn test_perhex_timeout_degrades_and_trips_breaker() {
        let feed = Arc::new(FixedFeed { hang: true, ..Default::default() });
        let mut c = MilitaryClassifier::new(
            feed.clone(),
            Box::new(InMemoryCacheStore::new()),
            &config(MilitaryMode::PerHex),
        );
        let out = c
            .classify(&hexes(&["000001", "000002", "000003", "000004", "000005"]), 0.0)
            .await;
        assert!(out.values().all(|s| *s == MilitaryStatus::Unknown));
        // Default breaker opens after three consecutive timeouts
        assert_eq!(feed.hex_calls.load(Ordering::SeqCst), 3);
        assert_eq!(c.stats().skipped, 2);

        // Next cycle tries again
        c.classify(&hexes(&["000006", "000007", "000008", "000009"]), 10.0).await;
        assert_eq!(feed.hex_calls.load(Ordering::SeqCst), 6);
        assert_eq!(c.stats().skipped, 3);
    }

    #[tokio::test]
    async fn test_non_icao_hex_never_looked_up() {
        let feed = Arc::new(FixedFeed::default());
        let mut c = MilitaryClassifier::new(
            feed.clone(),
            Box::new(InMemoryCacheStore::new()),
            &config(MilitaryMode::PerHex),
        );
        let out = c.classify(&hexes(&["~ABCDEF"]), 0.0).await;
        assert_eq!(out["~ABCDEF"], MilitaryStatus::Unknown);
        assert_eq!(feed.hex_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_list_mode_membership_and_ttl() {
        let feed = Arc::new(FixedFeed { military: vec!["AE1234"], ..Default::default() });
        let mut c = MilitaryClassifier::new(
            feed.clone(),
            Box::new(InMemoryCacheStore::new()),
            &config(MilitaryMode::List),
        );
        let out = c.classify(&hexes(&["AE1234", "A27A94"]), 100.0).await;
        assert_eq!(out["AE1234"], MilitaryStatus::True);
        assert_eq!(out["A27A94"], MilitaryStatus::False);

        c.classify(&hexes(&["A27A94"]), 200.0).await;
        assert_eq!(feed.list_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_list_mode_grace_on_stale_list() {
        let mut store = InMemoryCacheStore::new();
        store.put_list(ListCacheEntry {
            member_hexes: ["AE1234".to_string()].into_iter().collect(),
            fetched_at: 0.0,
        });
        let feed = Arc::new(FixedFeed { fail: true, ..Default::default() });
        let mut c = MilitaryClassifier::new(feed.clone(), Box::new(store), &config(MilitaryMode::List));

        let out = c.classify(&hexes(&["AE1234", "A27A94"]), 1_000_000.0).await;
        assert_eq!(feed.list_calls.load(Ordering::SeqCst), 1);
        assert_eq!(out["AE1234"], MilitaryStatus::True);
        assert_eq!(out["A27A94"], MilitaryStatus::False);
    }

    #[tokio::test]
    async fn test_list_mode_without_any_list_is_unknown() {
        let feed = Arc::new(FixedFeed { fail: true, ..Default::default() });
        let mut c = MilitaryClassifier::new(
            feed,
            Box::new(InMemoryCacheStore::new()),
            &config(MilitaryMode::List),
        );
        let out = c.classify(&hexes(&["AE1234"]), 0.0).await;
        assert_eq!(out["AE1234"], MilitaryStatus::Unknown);
    }

    #[tokio::test]
    async fn test_off_mode_makes_no_calls() {
        let feed = Arc::new(FixedFeed { military: vec!["AE1234"], ..Default::default() });
        let mut c = MilitaryClassifier::new(
            feed.clone(),
            Box::new(InMemoryCacheStore::new()),
            &config(MilitaryMode::Off),
        );
        let out = c.classify(&hexes(&["AE1234"]), 0.0).await;
        assert_eq!(out["AE1234"], MilitaryStatus::Unknown);
        assert_eq!(feed.hex_calls.load(Ordering::SeqCst), 0);
        assert_eq!(feed.list_calls.load(Ordering::SeqCst), 0);
    }
}
