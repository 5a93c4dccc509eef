//! SkyMerge CLI
//!
//! Fuse one provider payload into a snapshot, manage the military cache,
//! and run the deterministic simulation scenarios.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use skymerge_core::{
    is_expired, EnrichmentScope, FusionPipeline, JsonFileCacheStore, MilitaryCacheStore, MilitaryMode,
    PayloadPoint, PipelineConfig, ProviderPayload, ProviderPriority, QueryPoint,
};
use skymerge_env::{FusionContext, HttpMilitaryFeed, SystemContext};
use skymerge_sim::oracle::payload_to_json;
use skymerge_sim::scenarios::ScenarioId;
use skymerge_sim::{sim_center, Oracle, ScenarioResult, ScenarioRunner};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Radius used when neither the flags nor the payload name one.
const DEFAULT_RADIUS_NM: f64 = 50.0;

/// SkyMerge - multi-provider aircraft telemetry fusion
#[derive(Parser, Debug)]
#[command(name = "skymerge", version)]
#[command(about = "Fuse OpenSky, ADSB.lol and FR24 reports into one record per aircraft", long_about = None)]
struct Cli {
    /// Verbose output (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fuse one provider payload into a snapshot
    Merge(MergeArgs),

    /// Print or purge the per-hex military cache
    Cache(CacheArgs),

    /// Write a simulated provider payload
    Generate(GenerateArgs),

    /// Run deterministic simulation scenarios
    Simulate(SimulateArgs),
}

#[derive(Args, Debug)]
struct MergeArgs {
    /// Provider payload JSON file (default: stdin)
    input: Option<PathBuf>,

    /// Query latitude (overrides the payload's point)
    #[arg(long, allow_negative_numbers = true)]
    lat: Option<f64>,

    /// Query longitude (overrides the payload's point)
    #[arg(long, allow_negative_numbers = true)]
    lon: Option<f64>,

    /// Query radius in nautical miles (overrides the payload's point)
    #[arg(long)]
    radius_nm: Option<f64>,

    /// Provider priority for exact freshness ties
    #[arg(long, default_value = "adsb_lol,fr24,opensky")]
    prefer: ProviderPriority,

    /// Also emit a `by_hex` index
    #[arg(long)]
    by_hex: bool,

    /// Military classification mode (perhex, list, off)
    #[arg(long, env = "SKYMERGE_MIL_MODE", default_value = "perhex")]
    mil_mode: MilitaryMode,

    /// Military cache TTL in seconds
    #[arg(long, default_value = "21600")]
    mil_ttl: u64,

    /// Per-hex military cache file
    #[arg(long, default_value = "mil_cache.json")]
    mil_cache: PathBuf,

    /// Global military list cache file
    #[arg(long, default_value = "mil_list_cache.json")]
    mil_list_cache: PathBuf,

    /// Timeout for each military feed request, in seconds
    #[arg(long, default_value = "5")]
    mil_timeout: f64,

    /// Consecutive feed failures before the remaining lookups are skipped (0 = never)
    #[arg(long, default_value = "3")]
    mil_max_failures: u32,

    /// Military feed API root
    #[arg(long, env = "SKYMERGE_FEED_URL", default_value = "https://api.adsb.lol")]
    feed_url: String,

    /// Directory holding the JSONL catalogs
    #[arg(long, default_value = "datasets")]
    datasets: PathBuf,

    /// Only enrich aircraft within the radius
    #[arg(long)]
    enrich_in_radius: bool,

    /// Seats at or below which a non-military aircraft is Private
    #[arg(long, env = "PRIVATE_DESIGNATION_SEATS", default_value = "8")]
    private_seats: u32,

    /// Compact JSON output
    #[arg(long)]
    minify: bool,

    /// Write the snapshot to this file instead of stdout
    #[arg(long)]
    json_out: Option<PathBuf>,
}

impl MergeArgs {
    fn pipeline_config(&self) -> Result<PipelineConfig> {
        if !self.mil_timeout.is_finite() || self.mil_timeout <= 0.0 {
            bail!("--mil-timeout must be a positive number of seconds");
        }
        let mut config = PipelineConfig {
            priority: self.prefer.clone(),
            include_by_hex: self.by_hex,
            ..PipelineConfig::default()
        };
        config.military.mode = self.mil_mode;
        config.military.ttl = Duration::from_secs(self.mil_ttl);
        config.military.per_hex_cache_path = self.mil_cache.clone();
        config.military.list_cache_path = self.mil_list_cache.clone();
        config.military.request_timeout = Duration::from_secs_f64(self.mil_timeout);
        config.military.max_consecutive_failures = self.mil_max_failures;
        config.military.feed_base_url = self.feed_url.clone();
        config.enrichment.datasets_dir = self.datasets.clone();
        config.enrichment.private_seat_threshold = self.private_seats;
        if self.enrich_in_radius {
            config.enrichment.scope = EnrichmentScope::WithinRadius;
        }
        Ok(config)
    }

    /// Flags win over the payload's recorded point.
    fn query_point(&self, recorded: Option<PayloadPoint>) -> Result<QueryPoint> {
        let recorded = recorded.unwrap_or_default();
        let point = PayloadPoint {
            lat: self.lat.or(recorded.lat),
            lon: self.lon.or(recorded.lon),
            radius_nm: self.radius_nm.or(recorded.radius_nm),
        };
        match point.resolve(DEFAULT_RADIUS_NM) {
            Some(point) => Ok(point),
            None => bail!("no query point: pass --lat and --lon, or include \"point\" in the payload"),
        }
    }
}

#[derive(Args, Debug)]
struct CacheArgs {
    /// Per-hex military cache file
    #[arg(long, default_value = "mil_cache.json")]
    mil_cache: PathBuf,

    /// Global military list cache file
    #[arg(long, default_value = "mil_list_cache.json")]
    mil_list_cache: PathBuf,

    /// TTL in seconds used to flag expired entries
    #[arg(long, default_value = "21600")]
    mil_ttl: u64,

    /// Remove every per-hex entry
    #[arg(long)]
    purge: bool,
}

#[derive(Args, Debug)]
struct GenerateArgs {
    /// Seed for the simulated sky
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Number of aircraft
    #[arg(short, long, default_value = "40")]
    aircraft: usize,

    /// Write the payload to this file instead of stdout
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct SimulateArgs {
    /// Master seed for determinism (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Number of aircraft in the regular scenarios
    #[arg(short, long, default_value = "40")]
    aircraft: usize,

    /// Scenario to run (nominal, provider_outage, stale_conflict, military_outage, malformed_feed, crowded_sky, all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// Number of consecutive seeds to test (for CI mode)
    #[arg(long, default_value = "1")]
    seeds: usize,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,
}

fn init_logging(verbose: bool) -> Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    // stdout carries JSON only
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("failed to set tracing subscriber")
}

fn read_payload(input: Option<&Path>) -> Result<ProviderPayload> {
    let text = match input {
        Some(path) if path != Path::new("-") => {
            fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?
        }
        _ => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf).context("failed to read stdin")?;
            buf
        }
    };
    serde_json::from_str(&text).context("input is not a provider payload")
}

fn write_json<T: Serialize>(value: &T, minify: bool, out: Option<&Path>) -> Result<()> {
    let mut body = if minify {
        serde_json::to_string(value)?
    } else {
        serde_json::to_string_pretty(value)?
    };
    body.push('\n');

    match out {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent).with_context(|| format!("failed to create {}", parent.display()))?;
            }
            fs::write(path, body).with_context(|| format!("failed to write {}", path.display()))?;
            info!("wrote {}", path.display());
        }
        None => io::stdout().write_all(body.as_bytes()).context("failed to write stdout")?,
    }
    Ok(())
}

async fn merge(args: MergeArgs) -> Result<()> {
    let payload = read_payload(args.input.as_deref())?;
    let point = args.query_point(payload.point)?;
    let config = args.pipeline_config()?;

    let feed = HttpMilitaryFeed::new(config.military.feed_base_url.clone(), config.military.request_timeout)
        .context("failed to build military feed client")?;
    let mut pipeline = FusionPipeline::from_config(SystemContext::shared(), Arc::new(feed), config);

    let snapshot = pipeline.run(&payload.observations(), point, payload.timestamp).await;
    write_json(&snapshot, args.minify, args.json_out.as_deref())
}

fn cache(args: CacheArgs) -> Result<()> {
    let mut store = JsonFileCacheStore::open(&args.mil_cache, &args.mil_list_cache);

    if args.purge {
        let purged = store.len();
        store.clear();
        store.flush().context("failed to purge military cache")?;
        info!("purged {} entries from {}", purged, store.hex_path().display());
        return Ok(());
    }

    let now = SystemContext::new().unix_now();
    let ttl = args.mil_ttl as f64;
    let entries: serde_json::Map<String, serde_json::Value> = store
        .entries()
        .map(|(hex, entry)| {
            let value = json!({
                "is_military": entry.is_military,
                "fetched_at": entry.fetched_at,
                "expired": is_expired(entry.fetched_at, now, ttl),
            });
            (hex.clone(), value)
        })
        .collect();
    let list = store.list().map(|l| {
        json!({
            "members": l.member_hexes.len(),
            "fetched_at": l.fetched_at,
            "expired": is_expired(l.fetched_at, now, ttl),
        })
    });
    write_json(&json!({ "entries": entries, "list": list }), false, None)
}

fn generate(args: GenerateArgs) -> Result<()> {
    let mut oracle = Oracle::new(args.seed, sim_center());
    oracle.spawn_random(args.aircraft);
    let now = SystemContext::new().unix_now().floor();
    let payload = oracle.generate_payload(now);
    write_json(&payload_to_json(&payload), false, args.out.as_deref())
}

async fn simulate(args: SimulateArgs) -> Result<()> {
    if !args.json {
        info!("SkyMerge simulator v{}", env!("CARGO_PKG_VERSION"));
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    let scenarios: Vec<ScenarioId> = if args.scenario == "all" {
        ScenarioId::all()
    } else {
        match args.scenario.parse() {
            Ok(s) => vec![s],
            Err(e) => bail!(
                "{}. Available scenarios: {}, all",
                e,
                ScenarioId::all().iter().map(|s| s.name()).collect::<Vec<_>>().join(", ")
            ),
        }
    };

    let base_seed = if args.seed == 0 {
        SystemContext::new().unix_now().to_bits()
    } else {
        args.seed
    };

    let mut all_results: Vec<ScenarioResult> = Vec::new();
    for seed_offset in 0..args.seeds {
        let seed = base_seed.wrapping_add(seed_offset as u64);
        let runner = ScenarioRunner::new(seed, args.aircraft);

        for scenario in &scenarios {
            let result = runner.run(*scenario).await;
            if !args.json {
                if result.passed {
                    info!("✓ {} (seed={}) PASSED", scenario.name(), seed);
                } else {
                    error!(
                        "✗ {} (seed={}) FAILED: {}",
                        scenario.name(),
                        seed,
                        result.failure_reason.as_deref().unwrap_or("unknown")
                    );
                }
            }
            all_results.push(result);
        }
    }

    let total = all_results.len();
    let failed_count = all_results.iter().filter(|r| !r.passed).count();

    if args.json {
        let summary = json!({
            "total": total,
            "passed": total - failed_count,
            "failed": failed_count,
            "results": all_results,
        });
        write_json(&summary, false, None)?;
    } else if failed_count == 0 {
        info!("✅ All {} scenario runs passed!", total);
    } else {
        error!("❌ {}/{} scenario runs failed!", failed_count, total);
    }

    // Exit with proper code for CI
    if failed_count > 0 {
        std::process::exit(1);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    match cli.command {
        Command::Merge(args) => merge(args).await,
        Command::Cache(args) => cache(args),
        Command::Generate(args) => generate(args),
        Command::Simulate(args) => simulate(args).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn merge_args(flags: &[&str]) -> MergeArgs {
        let argv = ["skymerge", "merge"].iter().chain(flags);
        match Cli::parse_from(argv).command {
            Command::Merge(args) => args,
            other => panic!("parsed {:?}", other),
        }
    }

    #[test]
    fn test_payload_point_without_radius_gets_default() {
        let payload: ProviderPayload =
            serde_json::from_value(json!({"point": {"lat": 46.0, "lon": -122.0}, "providers": {}})).unwrap();
        let point = merge_args(&[]).query_point(payload.point).unwrap();
        assert_eq!(point, QueryPoint::new(46.0, -122.0, DEFAULT_RADIUS_NM));

        let payload: ProviderPayload = serde_json::from_value(
            json!({"point": {"lat": 46.0, "lon": -122.0, "radius_nm": null}, "providers": {}}),
        )
        .unwrap();
        let point = merge_args(&[]).query_point(payload.point).unwrap();
        assert_eq!(point.radius_nm, DEFAULT_RADIUS_NM);
    }

    #[test]
    fn test_flags_override_payload_point() {
        let recorded = PayloadPoint {
            lat: Some(46.0),
            lon: Some(-122.0),
            radius_nm: Some(25.0),
        };
        let args = merge_args(&["--lon", "-121.5", "--radius-nm", "10"]);
        assert_eq!(args.query_point(Some(recorded)).unwrap(), QueryPoint::new(46.0, -121.5, 10.0));
    }

    #[test]
    fn test_missing_coordinates_is_an_error() {
        assert!(merge_args(&[]).query_point(None).is_err());
        assert!(merge_args(&["--lat", "46.0"]).query_point(None).is_err());
    }
}
