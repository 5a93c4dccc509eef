//! Scenario runner - executes fault scenarios against the real pipeline.

use crate::checks::{check_idempotent, check_snapshot, CheckFailure};
use crate::context::SimContext;
use crate::feed::ScriptedMilitaryFeed;
use crate::oracle::{fleet_catalogs, Oracle};
use crate::scenarios::ScenarioId;

use serde::Serialize;
use serde_json::json;
use skymerge_core::{
    FusionPipeline, InMemoryCacheStore, MilitaryMode, MilitaryStatus, PipelineConfig, Provider,
    QueryPoint, RawObservation, Snapshot, TelemetryField,
};
use skymerge_env::FusionContext;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Virtual time between two retrieval cycles.
pub const CYCLE_INTERVAL: Duration = Duration::from_secs(15);

/// Aircraft spawned by the crowded-sky scenario.
pub const CROWDED_SKY_AIRCRAFT: usize = 300;

/// Query point every scenario looks from.
pub fn sim_center() -> QueryPoint {
    QueryPoint::new(46.0, -122.6, 40.0)
}

/// Results from running a scenario.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Fusion cycles executed
    pub cycles: u32,

    /// Ground truth aircraft in the sky
    pub aircraft: usize,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Metrics collected during run
    pub metrics: ScenarioMetrics,
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScenarioMetrics {
    /// Observations fed to the pipeline, all cycles
    pub observations: usize,

    /// Observations rejected by the canonicalizer, all cycles
    pub dropped: usize,

    /// Same (provider, hex) reported twice, all cycles
    pub duplicates: usize,

    /// Merged aircraft in the last snapshot
    pub merged: usize,

    /// In-radius aircraft in the last snapshot
    pub within_radius: usize,

    /// Aircraft classified military in the last snapshot
    pub military: usize,

    pub feed_hex_calls: usize,
    pub feed_list_calls: usize,
    pub cache_hits: usize,
    pub feed_failures: usize,
}

type SimPipeline = FusionPipeline<SimContext, ScriptedMilitaryFeed>;

/// One simulated world wired to one pipeline.
struct Harness {
    context: Arc<SimContext>,
    oracle: Oracle,
    feed: Arc<ScriptedMilitaryFeed>,
    pipeline: SimPipeline,
    metrics: ScenarioMetrics,
    cycles: u32,
}

impl Harness {
    fn new(seed: u64, aircraft: usize, config: PipelineConfig) -> Self {
        // Physics seed kept apart from the context seed
        let physics_seed = seed.wrapping_mul(0x9e3779b97f4a7c15);

        let context = SimContext::shared(seed);
        let mut oracle = Oracle::new(physics_seed, sim_center());
        oracle.spawn_random(aircraft);

        let feed = Arc::new(ScriptedMilitaryFeed::new(oracle.military_hexes()));
        let pipeline = FusionPipeline::new(
            context.clone(),
            feed.clone(),
            Box::new(InMemoryCacheStore::new()),
            fleet_catalogs(),
            config,
        );

        Self {
            context,
            oracle,
            feed,
            pipeline,
            metrics: ScenarioMetrics::default(),
            cycles: 0,
        }
    }

    fn now(&self) -> f64 {
        self.context.unix_now()
    }

    /// Advances virtual time and the sky by one cycle interval.
    fn tick(&mut self) {
        self.context.advance_time(CYCLE_INTERVAL);
        self.oracle.step(CYCLE_INTERVAL.as_secs_f64());
    }

    /// Runs `observations` at the current virtual time and checks the
    /// structural invariants of the result.
    async fn run_cycle(&mut self, observations: &[RawObservation]) -> Result<Snapshot, CheckFailure> {
        let now = self.now();
        let snapshot = self.pipeline.run(observations, self.oracle.center(), None).await;
        self.cycles += 1;

        let stats = &snapshot.stats;
        self.metrics.observations += observations.len();
        self.metrics.dropped += stats.dropped_observations;
        self.metrics.duplicates += stats.duplicate_observations;
        self.metrics.merged = stats.hex_count;
        self.metrics.within_radius = stats.within_radius_count;
        self.metrics.military = snapshot
            .merged
            .iter()
            .filter(|m| m.is_military == MilitaryStatus::True)
            .count();
        debug!(
            "  cycle {} | observations={} | merged={} | dropped={}",
            self.cycles,
            observations.len(),
            stats.hex_count,
            stats.dropped_observations
        );

        check_snapshot(&snapshot, observations, now, &self.pipeline.config().priority)?;
        Ok(snapshot)
    }

    /// Ticks, lets the oracle report, and runs the cycle.
    async fn generated_cycle(&mut self) -> Result<(Snapshot, Vec<RawObservation>), CheckFailure> {
        self.tick();
        let observations = self.oracle.generate_observations(self.now());
        let snapshot = self.run_cycle(&observations).await?;
        Ok((snapshot, observations))
    }

    /// Every merged verdict matches ground truth.
    fn verdicts_match_truth(&self, snapshot: &Snapshot) -> Result<(), CheckFailure> {
        for m in &snapshot.merged {
            let truth = self
                .oracle
                .aircraft(&m.hex)
                .ok_or_else(|| CheckFailure::UnknownHex(m.hex.clone()))?;
            let expected = MilitaryStatus::from_flag(Some(truth.military));
            ensure(
                m.is_military == expected,
                format!("{}: is_military {:?}, truth {:?}", m.hex, m.is_military, expected),
            )?;
        }
        Ok(())
    }

    fn finish(self, scenario: ScenarioId, outcome: Result<(), CheckFailure>) -> ScenarioResult {
        let mut metrics = self.metrics;
        let stats = self.pipeline.classifier().stats();
        metrics.feed_hex_calls = self.feed.hex_calls();
        metrics.feed_list_calls = self.feed.list_calls();
        metrics.cache_hits = stats.cache_hits;
        metrics.feed_failures = stats.failures;

        ScenarioResult {
            scenario,
            seed: self.context.seed(),
            passed: outcome.is_ok(),
            cycles: self.cycles,
            aircraft: self.oracle.len(),
            failure_reason: outcome.err().map(|e| e.to_string()),
            metrics,
        }
    }
}

fn ensure(condition: bool, msg: impl Into<String>) -> Result<(), CheckFailure> {
    if condition {
        Ok(())
    } else {
        Err(CheckFailure::assertion(msg))
    }
}

/// Distinct upper-cased hexes among rows the canonicalizer will accept.
fn reported_hexes(observations: &[RawObservation]) -> BTreeSet<String> {
    observations
        .iter()
        .filter_map(|o| o.raw_hex())
        .filter_map(skymerge_core::canonical::normalize_hex)
        .collect()
}

/// Runs fault scenarios.
pub struct ScenarioRunner {
    /// Configuration seed
    seed: u64,

    /// Aircraft in the sky for the regular scenarios
    aircraft: usize,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(seed: u64, aircraft: usize) -> Self {
        Self { seed, aircraft }
    }

    fn config_for(&self, scenario: ScenarioId) -> PipelineConfig {
        let mut config = PipelineConfig::default();
        if scenario == ScenarioId::CrowdedSky {
            config.military.mode = MilitaryMode::List;
        }
        config
    }

    fn aircraft_for(&self, scenario: ScenarioId) -> usize {
        match scenario {
            ScenarioId::CrowdedSky => CROWDED_SKY_AIRCRAFT,
            _ => self.aircraft,
        }
    }

    /// Runs a scenario and returns the result.
    pub async fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);

        let mut harness = Harness::new(self.seed, self.aircraft_for(scenario), self.config_for(scenario));
        let outcome = match scenario {
            ScenarioId::Nominal => Self::run_nominal(&mut harness).await,
            ScenarioId::ProviderOutage => Self::run_provider_outage(&mut harness).await,
            ScenarioId::StaleConflict => Self::run_stale_conflict(&mut harness).await,
            ScenarioId::MilitaryOutage => Self::run_military_outage(&mut harness).await,
            ScenarioId::MalformedFeed => Self::run_malformed_feed(&mut harness).await,
            ScenarioId::CrowdedSky => Self::run_crowded_sky(&mut harness).await,
        };
        harness.finish(scenario, outcome)
    }

    /// SIM-001: Nominal - three providers, noise, dropouts, healthy feed.
    ///
    /// **Assertion**: verdicts equal ground truth, positions within noise,
    /// and replaying the same cycle yields byte-identical output.
    async fn run_nominal(h: &mut Harness) -> Result<(), CheckFailure> {
        info!("SIM-001: Nominal");
        let (snapshot, observations) = h.generated_cycle().await?;

        ensure(
            snapshot.stats.hex_count == reported_hexes(&observations).len(),
            "every reported hex should be merged exactly once",
        )?;
        h.verdicts_match_truth(&snapshot)?;

        for m in &snapshot.merged {
            let truth = h
                .oracle
                .aircraft(&m.hex)
                .ok_or_else(|| CheckFailure::UnknownHex(m.hex.clone()))?;
            if let (Some(lat), Some(lon)) = (m.latitude, m.longitude) {
                ensure(
                    (lat - truth.latitude).abs() < 0.01 && (lon - truth.longitude).abs() < 0.01,
                    format!("{}: fused position far from truth", m.hex),
                )?;
            }
            if let Some(reg) = &m.registration {
                ensure(*reg == truth.registration, format!("{}: registration {}", m.hex, reg))?;
            }
            if truth.military {
                ensure(
                    m.classification == skymerge_core::Classification::Military,
                    format!("{}: military aircraft classified {}", m.hex, m.classification),
                )?;
            }
        }

        // Replay at the same instant: warm cache, same answer
        let replay = h.run_cycle(&observations).await?;
        check_idempotent(&snapshot, &replay)?;

        info!(
            "✓ Nominal complete: {} aircraft merged, {} military",
            snapshot.stats.hex_count, h.metrics.military
        );
        Ok(())
    }

    /// SIM-002: ProviderOutage - OpenSky and FR24 return nothing.
    async fn run_provider_outage(h: &mut Harness) -> Result<(), CheckFailure> {
        info!("SIM-002: ProviderOutage");
        h.oracle.set_offline(Provider::OpenSky, true);
        h.oracle.set_offline(Provider::Fr24, true);

        let (snapshot, _) = h.generated_cycle().await?;
        ensure(!snapshot.merged.is_empty(), "no aircraft merged")?;
        ensure(
            snapshot.stats.providers_present == vec![Provider::AdsbLol],
            format!("providers_present {:?}", snapshot.stats.providers_present),
        )?;
        for m in &snapshot.merged {
            ensure(m.sources == vec![Provider::AdsbLol], format!("{}: sources {:?}", m.hex, m.sources))?;
            ensure(
                m.field_sources.values().all(|p| *p == Provider::AdsbLol),
                format!("{}: field from an offline provider", m.hex),
            )?;
            ensure(m.age_opensky_sec.is_none() && m.age_fr24_sec.is_none(), format!("{}: stale ages", m.hex))?;
        }

        // OpenSky recovers
        h.oracle.set_offline(Provider::OpenSky, false);
        let (snapshot, _) = h.generated_cycle().await?;
        ensure(
            snapshot.stats.providers_present.contains(&Provider::OpenSky),
            "OpenSky should be back",
        )?;

        info!("✓ ProviderOutage complete");
        Ok(())
    }

    /// SIM-003: StaleConflict - ADSB.lol is 30 s old, FR24 and OpenSky 5 s.
    ///
    /// **Assertion**: freshness beats the static priority, and the exact
    /// FR24/OpenSky age tie falls back to the priority order.
    async fn run_stale_conflict(h: &mut Harness) -> Result<(), CheckFailure> {
        info!("SIM-003: StaleConflict");
        h.tick();
        let now = h.now();

        let reports = [
            (Provider::AdsbLol, 30.0, 0.001),
            (Provider::Fr24, 5.0, 0.0),
            (Provider::OpenSky, 5.0, -0.001),
        ];
        let mut observations = Vec::new();
        for a in h.oracle.all_aircraft() {
            for (provider, age, offset) in reports {
                let row = h.oracle.provider_row(a, provider, now, age, (a.latitude + offset, a.longitude));
                observations.push(RawObservation::from_value(provider, &row));
            }
        }

        let snapshot = h.run_cycle(&observations).await?;
        ensure(snapshot.merged.len() == h.oracle.len(), "every aircraft should be merged")?;
        for m in &snapshot.merged {
            let truth = h
                .oracle
                .aircraft(&m.hex)
                .ok_or_else(|| CheckFailure::UnknownHex(m.hex.clone()))?;
            for field in [TelemetryField::Latitude, TelemetryField::AltitudeFt, TelemetryField::VerticalRateFpm] {
                ensure(
                    m.field_sources.get(&field) == Some(&Provider::Fr24),
                    format!("{}: {:?} from {:?}", m.hex, field, m.field_sources.get(&field)),
                )?;
            }
            ensure(m.latitude == Some(truth.latitude), format!("{}: latitude not FR24's", m.hex))?;
            ensure(m.position_age_sec == Some(5.0), format!("{}: position age {:?}", m.hex, m.position_age_sec))?;
            ensure(m.age_adsb_lol_sec == Some(30.0), format!("{}: adsb age {:?}", m.hex, m.age_adsb_lol_sec))?;
        }

        info!("✓ StaleConflict complete: {} aircraft", snapshot.merged.len());
        Ok(())
    }

    /// SIM-004: MilitaryOutage - feed down for one cycle, no provider flags.
    ///
    /// **Assertion**: verdicts degrade to Unknown, nothing is cached, the
    /// breaker caps the wasted calls, and the next cycle recovers.
    async fn run_military_outage(h: &mut Harness) -> Result<(), CheckFailure> {
        info!("SIM-004: MilitaryOutage");
        h.oracle.set_report_db_flags(false);
        h.feed.set_outage(true);

        let (snapshot, _) = h.generated_cycle().await?;
        ensure(
            snapshot.merged.iter().all(|m| m.is_military == MilitaryStatus::Unknown),
            "verdicts should be Unknown during the outage",
        )?;
        ensure(h.pipeline.classifier().store().is_empty(), "failed lookups must not be cached")?;

        let breaker = h.pipeline.config().military.max_consecutive_failures as usize;
        let expected_calls = if breaker == 0 {
            snapshot.merged.len()
        } else {
            breaker.min(snapshot.merged.len())
        };
        ensure(
            h.feed.hex_calls() == expected_calls,
            format!("{} lookups during outage, expected {}", h.feed.hex_calls(), expected_calls),
        )?;

        h.feed.heal_all();
        let (snapshot, _) = h.generated_cycle().await?;
        h.verdicts_match_truth(&snapshot)?;

        info!("✓ MilitaryOutage complete: {} lookups", h.feed.hex_calls());
        Ok(())
    }

    /// SIM-005: MalformedFeed - garbage rows and a duplicate in the mix.
    async fn run_malformed_feed(h: &mut Harness) -> Result<(), CheckFailure> {
        info!("SIM-005: MalformedFeed");
        h.tick();
        let mut observations = h.oracle.generate_observations(h.now());
        let expected_hexes = reported_hexes(&observations).len();

        let garbage = [
            (Provider::AdsbLol, json!({"lat": 46.0, "lon": -122.0})),
            (Provider::AdsbLol, json!({"hex": "zz", "lat": 46.0})),
            (Provider::Fr24, json!("not a row")),
            (Provider::Fr24, json!({"hex": "1234567"})),
            (Provider::OpenSky, json!([null, "CALL1   "])),
            (Provider::OpenSky, json!(["gggggg", "CALL2   "])),
        ];
        observations.extend(garbage.iter().map(|(p, row)| RawObservation::from_value(*p, row)));

        let duplicate = observations
            .iter()
            .find(|o| o.provider() == Provider::AdsbLol && o.raw_hex().is_some())
            .cloned();
        let duplicates = usize::from(duplicate.is_some());
        observations.extend(duplicate);

        let snapshot = h.run_cycle(&observations).await?;
        ensure(
            snapshot.stats.dropped_observations == garbage.len(),
            format!("dropped {}, expected {}", snapshot.stats.dropped_observations, garbage.len()),
        )?;
        ensure(
            snapshot.stats.duplicate_observations == duplicates,
            format!("duplicates {}", snapshot.stats.duplicate_observations),
        )?;
        ensure(
            snapshot.stats.hex_count == expected_hexes,
            format!("hex_count {}, expected {}", snapshot.stats.hex_count, expected_hexes),
        )?;

        info!("✓ MalformedFeed complete: {} dropped", garbage.len());
        Ok(())
    }

    /// SIM-006: CrowdedSky - 300 aircraft, list mode, three moving cycles.
    async fn run_crowded_sky(h: &mut Harness) -> Result<(), CheckFailure> {
        info!("SIM-006: CrowdedSky");
        for _ in 0..3 {
            let (snapshot, _) = h.generated_cycle().await?;
            h.verdicts_match_truth(&snapshot)?;
        }
        ensure(
            h.feed.list_calls() == 1,
            format!("{} list fetches, expected 1 within TTL", h.feed.list_calls()),
        )?;
        ensure(h.feed.hex_calls() == 0, "list mode must not look up single hexes")?;

        info!(
            "✓ CrowdedSky complete: {} merged, {} in radius",
            h.metrics.merged, h.metrics.within_radius
        );
        Ok(())
    }
}
