//! SkyMerge Core - Multi-Provider Aircraft Telemetry Fusion
//!
//! Three uncoordinated providers (OpenSky, ADSB.lol, FR24) report the same
//! airframes with different units, latencies and gaps. This library turns one
//! batch of their observations into one trustworthy record per aircraft:
//! 1. **Canonicalizer**: provider schema to common units, plus an age
//! 2. **Fusion Engine**: freshest provider wins each telemetry field
//! 3. **Identity Resolver**: per-field precedence chains for discrete identity
//! 4. **Geospatial Calculator**: distance, bearing, radius membership
//! 5. **Military Classifier**: TTL-cached tri-state verdict from an external feed
//! 6. **Enrichment Joiner**: catalogs, souls on board, final classification
//! 7. **Snapshot Assembler**: ordered list, stats, nearest aircraft

pub mod cache;
pub mod canonical;
pub mod catalog;
pub mod config;
pub mod enrichment;
pub mod error;
pub mod fusion;
pub mod geospatial;
pub mod identity;
pub mod military;
pub mod observation;
pub mod pipeline;
pub mod provider;
pub mod record;
pub mod snapshot;

// Re-export key types for convenience
pub use cache::{is_expired, InMemoryCacheStore, JsonFileCacheStore, MilitaryCacheStore};
pub use canonical::{CanonicalRecord, Canonicalizer};
pub use catalog::Catalogs;
pub use config::{EnrichmentConfig, MilitaryConfig, PipelineConfig};
pub use enrichment::{Classification, EnrichmentScope};
pub use error::{CacheError, CatalogError};
pub use fusion::{FusionEngine, TelemetryField};
pub use geospatial::QueryPoint;
pub use military::{MilitaryMode, MilitaryStatus};
pub use observation::{PayloadPoint, ProviderPayload, RawObservation};
pub use pipeline::FusionPipeline;
pub use provider::{Provider, ProviderPriority};
pub use record::MergedAircraft;
pub use snapshot::{Snapshot, SnapshotStats};
