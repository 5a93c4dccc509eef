//! Pipeline configuration. Defaults live here; the CLI overrides them.

use crate::enrichment::EnrichmentScope;
use crate::military::MilitaryMode;
use crate::provider::ProviderPriority;
use std::path::PathBuf;
use std::time::Duration;

/// Seats at or below which a non-military aircraft counts as Private.
pub const DEFAULT_PRIVATE_SEATS: u32 = 8;

/// Configuration for the Military Classifier
#[derive(Debug, Clone)]
pub struct MilitaryConfig {
    /// Classification mode (default: perhex)
    pub mode: MilitaryMode,

    /// Cache entry lifetime (default: 6 h)
    pub ttl: Duration,

    /// Per-hex cache file (default: mil_cache.json)
    pub per_hex_cache_path: PathBuf,

    /// Global list cache file (default: mil_list_cache.json)
    pub list_cache_path: PathBuf,

    /// Bound on each external call (default: 5 s)
    pub request_timeout: Duration,

    /// Consecutive transport failures after which the remaining lookups of a
    /// cycle are skipped; 0 disables (default: 3)
    pub max_consecutive_failures: u32,

    /// Military feed API root
    pub feed_base_url: String,
}

impl Default for MilitaryConfig {
    fn default() -> Self {
        Self {
            mode: MilitaryMode::PerHex,
            ttl: Duration::from_secs(21_600),
            per_hex_cache_path: PathBuf::from("mil_cache.json"),
            list_cache_path: PathBuf::from("mil_list_cache.json"),
            request_timeout: Duration::from_secs(5),
            max_consecutive_failures: 3,
            feed_base_url: "https://api.adsb.lol".to_string(),
        }
    }
}

/// Configuration for the Enrichment Joiner
#[derive(Debug, Clone)]
pub struct EnrichmentConfig {
    /// Directory holding the JSONL catalogs (default: datasets)
    pub datasets_dir: PathBuf,

    pub scope: EnrichmentScope,

    pub private_seat_threshold: u32,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            datasets_dir: PathBuf::from("datasets"),
            scope: EnrichmentScope::All,
            private_seat_threshold: DEFAULT_PRIVATE_SEATS,
        }
    }
}

/// Top-level configuration for one fusion cycle.
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    /// Tie-break order for equally fresh providers
    pub priority: ProviderPriority,

    pub military: MilitaryConfig,

    pub enrichment: EnrichmentConfig,

    /// Emit the `by_hex` index in the snapshot
    pub include_by_hex: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.military.mode, MilitaryMode::PerHex);
        assert_eq!(config.military.ttl.as_secs(), 21_600);
        assert_eq!(config.military.request_timeout.as_secs(), 5);
        assert_eq!(config.enrichment.private_seat_threshold, 8);
        assert_eq!(config.priority.to_string(), "adsb_lol,fr24,opensky");
        assert!(!config.include_by_hex);
    }
}
