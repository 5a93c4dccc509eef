//! Fusion Pipeline - runs one cycle through every component.
//!
//! ```text
//! RawObservation ─▶ Canonicalizer ─▶ FusionEngine ─┬─▶ IdentityResolver
//!                                                  ├─▶ GeoCalculator
//!                                                  ├─▶ MilitaryClassifier ◀─▶ cache / feed
//!                                                  └─▶ EnrichmentJoiner
//!                                                          │
//!                                                          ▼
//!                                                  SnapshotAssembler ─▶ Snapshot
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use skymerge_core::{FusionPipeline, PipelineConfig, ProviderPayload};
//! use skymerge_env::{HttpMilitaryFeed, SystemContext};
//!
//! let config = PipelineConfig::default();
//! let feed = HttpMilitaryFeed::new(&config.military.feed_base_url, config.military.request_timeout)?;
//! let mut pipeline = FusionPipeline::from_config(SystemContext::shared(), Arc::new(feed), config);
//!
//! let snapshot = pipeline.run(&payload.observations(), point, payload.timestamp).await;
//! ```
//!
//! The pipeline is generic over the clock and the military feed, so the same
//! code runs against the system clock and HTTP, or a virtual clock and a
//! scripted feed.

use crate::cache::{JsonFileCacheStore, MilitaryCacheStore};
use crate::canonical::Canonicalizer;
use crate::catalog::Catalogs;
use crate::config::PipelineConfig;
use crate::enrichment::EnrichmentJoiner;
use crate::fusion::FusionEngine;
use crate::geospatial::{GeoCalculator, QueryPoint};
use crate::identity::IdentityResolver;
use crate::military::{MilitaryClassifier, MilitaryStatus};
use crate::observation::RawObservation;
use crate::record::MergedAircraft;
use crate::snapshot::{IngestCounts, Snapshot, SnapshotAssembler};
use skymerge_env::{FusionContext, MilitaryFeed};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One-shot orchestrator; reusable across cycles.
pub struct FusionPipeline<Ctx, Feed>
where
    Ctx: FusionContext,
    Feed: MilitaryFeed,
{
    context: Arc<Ctx>,
    config: PipelineConfig,
    canonicalizer: Canonicalizer,
    fusion: FusionEngine,
    identity: IdentityResolver,
    classifier: MilitaryClassifier<Feed>,
    joiner: EnrichmentJoiner,
    assembler: SnapshotAssembler,
    cycles: u64,
}

impl<Ctx, Feed> FusionPipeline<Ctx, Feed>
where
    Ctx: FusionContext,
    Feed: MilitaryFeed,
{
    /// Creates a pipeline from explicit parts.
    pub fn new(
        context: Arc<Ctx>,
        feed: Arc<Feed>,
        store: Box<dyn MilitaryCacheStore>,
        catalogs: Catalogs,
        config: PipelineConfig,
    ) -> Self {
        let classifier = MilitaryClassifier::new(feed, store, &config.military);
        let joiner = EnrichmentJoiner::new(
            catalogs,
            config.enrichment.scope,
            config.enrichment.private_seat_threshold,
        );
        Self {
            context,
            canonicalizer: Canonicalizer,
            fusion: FusionEngine::new(config.priority.clone()),
            identity: IdentityResolver,
            classifier,
            joiner,
            assembler: SnapshotAssembler::new(config.include_by_hex),
            config,
            cycles: 0,
        }
    }

    /// Creates a pipeline backed by the configured cache files and catalogs.
    pub fn from_config(context: Arc<Ctx>, feed: Arc<Feed>, config: PipelineConfig) -> Self {
        let store = JsonFileCacheStore::open(
            &config.military.per_hex_cache_path,
            &config.military.list_cache_path,
        );
        let catalogs = Catalogs::load(&config.enrichment.datasets_dir);
        Self::new(context, feed, Box::new(store), catalogs, config)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn classifier(&self) -> &MilitaryClassifier<Feed> {
        &self.classifier
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Runs one cycle.
    ///
    /// `now` pins the cycle time (unix seconds); `None` reads the context
    /// clock. Never fails: every problem degrades the output instead.
    pub async fn run(&mut self, observations: &[RawObservation], point: QueryPoint, now: Option<f64>) -> Snapshot {
        let now = now.unwrap_or_else(|| self.context.unix_now());
        self.cycles += 1;

        // 1. Canonicalize
        let mut counts = IngestCounts::default();
        let mut accepted = Vec::with_capacity(observations.len());
        for raw in observations {
            match self.canonicalizer.canonicalize(raw, now) {
                Ok(record) => {
                    *counts.provider_rows.entry(record.provider).or_insert(0) += 1;
                    accepted.push(record);
                }
                Err(rejection) => {
                    debug!(%rejection, "observation dropped");
                    counts.dropped += 1;
                }
            }
        }

        // 2. Group by hex
        let (groups, duplicates) = self.fusion.group(accepted);
        counts.duplicates = duplicates;

        // 3. Military verdicts for every hex, in hex order
        let hexes: Vec<String> = groups.keys().cloned().collect();
        let verdicts = self.classifier.classify(&hexes, now).await;

        // 4. Fuse, resolve, relate, enrich
        let geo = GeoCalculator::new(point);
        let merged: Vec<MergedAircraft> = groups
            .values()
            .map(|group| {
                let fused = self.fusion.fuse(group);
                let identity = self.identity.resolve(group);
                let relation = geo.relate(fused.telemetry.latitude, fused.telemetry.longitude);

                let provider_flags = group
                    .records
                    .values()
                    .map(|r| MilitaryStatus::from_flag(r.military_flag));
                let external = verdicts.get(&group.hex).copied().unwrap_or_default();
                let status = MilitaryStatus::aggregate(provider_flags.chain(std::iter::once(external)));

                let enrichment = self.joiner.enrich(
                    &identity,
                    &fused.telemetry,
                    relation.map(|r| r.within_radius),
                    status,
                );
                MergedAircraft::build(fused, identity, relation, status, enrichment, now)
            })
            .collect();

        // 5. Persist cache changes
        if let Err(e) = self.classifier.flush() {
            warn!(error = %e, "military cache flush failed");
        }

        // 6. Assemble
        let snapshot = self.assembler.assemble(now, point, merged, counts);
        info!(
            cycle = self.cycles,
            hexes = snapshot.stats.hex_count,
            within_radius = snapshot.stats.within_radius_count,
            dropped = snapshot.stats.dropped_observations,
            nearest = snapshot.nearest.as_ref().map(|n| n.hex.as_str()).unwrap_or("-"),
            "fusion cycle complete"
        );
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCacheStore;
    use crate::catalog::{AircraftTypeEntry, AirlineEntry};
    use crate::enrichment::Classification;
    use crate::fusion::TelemetryField;
    use crate::observation::ProviderPayload;
    use crate::provider::Provider;
    use async_trait::async_trait;
    use serde_json::json;
    use skymerge_env::{EnvError, HexLookup, MilitaryListing};
    use std::time::SystemTime;

    struct FixedClock(f64);

    impl FusionContext for FixedClock {
        fn system_time(&self) -> SystemTime {
            SystemTime::UNIX_EPOCH + std::time::Duration::from_secs_f64(self.0)
        }
    }

    /// Knows exactly one military airframe.
    struct OneMilitary;

    #[async_trait]
    impl MilitaryFeed for OneMilitary {
        async fn lookup_hex(&self, hex: &str) -> Result<HexLookup, EnvError> {
            Ok(HexLookup {
                hex: hex.to_string(),
                military: Some(hex == "AE1234"),
            })
        }

        async fn fetch_list(&self) -> Result<MilitaryListing, EnvError> {
            Ok(MilitaryListing::from_hexes(["AE1234"]))
        }

        fn name(&self) -> &str {
            "one-military"
        }
    }

    fn pipeline(config: PipelineConfig) -> FusionPipeline<FixedClock, OneMilitary> {
        let catalogs = Catalogs::empty()
            .with_aircraft(AircraftTypeEntry {
                icao: Some("E75L".into()),
                name: Some("Embraer 175".into()),
                seats: Some(76),
                ..Default::default()
            })
            .with_airline(AirlineEntry {
                icao: Some("QXE".into()),
                iata: Some("QX".into()),
                name: Some("Horizon Air".into()),
                ..Default::default()
            });
        FusionPipeline::new(
            Arc::new(FixedClock(1_700_000_150.0)),
            Arc::new(OneMilitary),
            Box::new(InMemoryCacheStore::new()),
            catalogs,
            config,
        )
    }

    fn payload() -> ProviderPayload {
        serde_json::from_value(json!({
            "timestamp": 1_700_000_150,
            "point": {"lat": 46.0, "lon": -122.6, "radius_nm": 50.0},
            "providers": {
                "opensky": [
                    ["a27a94", "QXE2290 ", "United States", 1_700_000_090, 1_700_000_100,
                     -122.71, 46.20, 3000.0, false, 128.0, 270.0, -3.0, null, 3048.0, "4521", false, 0]
                ],
                "adsb_lol": [
                    {"hex": "a27a94", "flight": "QXE2290", "r": "N259SY", "t": "E75L",
                     "lat": 46.21, "lon": -122.72, "alt_baro": 9950, "gs": 249, "track": 271.0,
                     "baro_rate": -640, "seen": 1.0, "dbFlags": 0},
                    {"hex": "ae1234", "lat": 46.05, "lon": -122.55, "alt_baro": 15000, "seen": 3.0, "t": "C30J"},
                    {"hex": "zz", "lat": 0.0, "lon": 0.0}
                ],
                "fr24": [
                    {"hex": "A27A94", "lat": 46.205, "lon": -122.715, "alt_ft": 9975, "gs_kt": 250,
                     "trk": 270.5, "reg": "N259SY", "type": "E75L", "timestamp": 1_700_000_140,
                     "from_iata": "SEA", "to_iata": "PDX", "flight": "QX2290", "callsign": "QXE2290",
                     "airline_icao": "QXE", "on_ground": 0, "vs_fpm": -600},
                    {"hex": "abc123", "lat": 47.5, "lon": -120.0, "timestamp": 1_700_000_100,
                     "type": "C172"}
                ]
            }
        }))
        .unwrap()
    }

    async fn run(config: PipelineConfig) -> Snapshot {
        let payload = payload();
        let point = payload.point.and_then(|p| p.resolve(50.0)).unwrap();
        let mut p = pipeline(config);
        p.run(&payload.observations(), point, payload.timestamp).await
    }

    #[tokio::test]
    async fn test_end_to_end_a27a94() {
        let snap = run(PipelineConfig::default()).await;
        let a = snap.get("A27A94").expect("A27A94 merged");

        assert_eq!(a.latitude, Some(46.21));
        assert_eq!(a.longitude, Some(-122.72));
        assert_eq!(a.field_sources[&TelemetryField::Latitude], Provider::AdsbLol);
        assert_eq!(a.is_military, MilitaryStatus::False);
        assert_eq!(a.registration.as_deref(), Some("N259SY"));
        assert_eq!(a.flight_no.as_deref(), Some("QX2290"));
        assert_eq!(a.origin_country.as_deref(), Some("United States"));
        assert_eq!(a.sources, vec![Provider::AdsbLol, Provider::Fr24, Provider::OpenSky]);
        assert_eq!(a.age_opensky_sec, Some(50.0));
        assert_eq!(a.age_fr24_sec, Some(10.0));
        assert_eq!(a.souls_on_board_max, Some(76));
        assert_eq!(a.classification, Classification::Commercial);
        assert_eq!(a.lookups.airline.as_ref().unwrap().name.as_deref(), Some("Horizon Air"));
        assert_eq!(a.within_radius, Some(true));

        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["merged"][0]["field_sources"]["latitude"], "adsb_lol");
        assert_eq!(snap.merged[0].hex, "A27A94");
    }

    #[tokio::test]
    async fn test_military_private_and_stats() {
        let snap = run(PipelineConfig::default()).await;

        let mil = snap.get("AE1234").unwrap();
        assert_eq!(mil.is_military, MilitaryStatus::True);
        assert_eq!(mil.classification, Classification::Military);

        let cessna = snap.get("ABC123").unwrap();
        assert_eq!(cessna.classification, Classification::Private);
        assert_eq!(cessna.within_radius, Some(false));

        assert_eq!(snap.stats.hex_count, 3);
        assert_eq!(snap.stats.dropped_observations, 1);
        assert_eq!(snap.stats.provider_rows[&Provider::AdsbLol], 2);
        assert_eq!(
            snap.stats.providers_present,
            vec![Provider::AdsbLol, Provider::Fr24, Provider::OpenSky]
        );
        // AE1234 sits closer to the query point than A27A94
        assert_eq!(snap.nearest.as_ref().unwrap().hex, "AE1234");
        assert_eq!(snap.nearest_of_interest.as_ref().unwrap().hex, "AE1234");
    }

    #[tokio::test]
    async fn test_idempotent_output() {
        let a = serde_json::to_string(&run(PipelineConfig::default()).await).unwrap();
        let b = serde_json::to_string(&run(PipelineConfig::default()).await).unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_hexes_unique() {
        let snap = run(PipelineConfig::default()).await;
        let mut hexes: Vec<&str> = snap.merged.iter().map(|m| m.hex.as_str()).collect();
        let total = hexes.len();
        hexes.sort();
        hexes.dedup();
        assert_eq!(hexes.len(), total);
    }

    #[tokio::test]
    async fn test_by_hex_and_clock_fallback() {
        let config = PipelineConfig {
            include_by_hex: true,
            ..PipelineConfig::default()
        };
        let payload = payload();
        let mut p = pipeline(config);
        let snap = p.run(&payload.observations(), payload.point.and_then(|p| p.resolve(50.0)).unwrap(), None).await;
        assert_eq!(snap.timestamp, 1_700_000_150);
        assert_eq!(snap.by_hex.as_ref().unwrap().len(), 3);
        assert_eq!(p.cycles(), 1);
    }

    #[tokio::test]
    async fn test_empty_input() {
        let mut p = pipeline(PipelineConfig::default());
        let snap = p.run(&[], QueryPoint::new(0.0, 0.0, 10.0), Some(0.0)).await;
        assert!(snap.merged.is_empty());
        assert!(snap.nearest.is_none());
        assert!(snap.stats.providers_present.is_empty());
    }
}
