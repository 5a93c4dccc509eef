//! Invariant checks applied to every simulated snapshot.
//!
//! Each check recomputes what it needs from the raw observations rather than
//! trusting pipeline internals, so a failure points at the output itself.

use skymerge_core::canonical::CanonicalRecord;
use skymerge_core::{Canonicalizer, FusionEngine, Provider, ProviderPriority, RawObservation, Snapshot, TelemetryField};
use std::collections::BTreeSet;
use thiserror::Error;

/// A violated snapshot invariant.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CheckFailure {
    #[error("hex {0} appears more than once")]
    DuplicateHex(String),

    #[error("hex {0} was not reported by any provider")]
    UnknownHex(String),

    #[error("{hex}: {field:?} is present without a source")]
    MissingSource { hex: String, field: TelemetryField },

    #[error("{hex}: {field:?} credited to {provider}, which did not report that value")]
    Untraceable {
        hex: String,
        field: TelemetryField,
        provider: Provider,
    },

    #[error("{hex}: {field:?} taken from {chosen} although {fresher} was fresher")]
    NotFreshest {
        hex: String,
        field: TelemetryField,
        chosen: Provider,
        fresher: Provider,
    },

    #[error("nearest is {actual:?}, expected {expected:?}")]
    WrongNearest {
        expected: Option<String>,
        actual: Option<String>,
    },

    #[error("stats disagree with merged list: {0}")]
    Stats(String),

    #[error("output differs between identical runs")]
    NotIdempotent,

    #[error("{0}")]
    Assertion(String),
}

impl CheckFailure {
    pub fn assertion(msg: impl Into<String>) -> Self {
        Self::Assertion(msg.into())
    }
}

/// Every hex appears at most once.
pub fn check_unique_hexes(snapshot: &Snapshot) -> Result<(), CheckFailure> {
    let mut seen = BTreeSet::new();
    for m in &snapshot.merged {
        if !seen.insert(m.hex.as_str()) {
            return Err(CheckFailure::DuplicateHex(m.hex.clone()));
        }
    }
    Ok(())
}

fn age_key(record: &CanonicalRecord) -> f64 {
    record.age_seconds.unwrap_or(f64::INFINITY)
}

/// Every fused telemetry value comes from the named provider's record, and
/// no other provider held a fresher value for that field.
pub fn check_traceability(
    snapshot: &Snapshot,
    observations: &[RawObservation],
    now: f64,
    priority: &ProviderPriority,
) -> Result<(), CheckFailure> {
    let canonical = observations
        .iter()
        .filter_map(|raw| Canonicalizer.canonicalize(raw, now).ok());
    let (groups, _) = FusionEngine::new(priority.clone()).group(canonical);

    for merged in &snapshot.merged {
        let hex = &merged.hex;
        let group = groups
            .get(hex)
            .ok_or_else(|| CheckFailure::UnknownHex(hex.clone()))?;
        let fused = merged.telemetry();

        for field in TelemetryField::ALL {
            let Some(&provider) = merged.field_sources.get(&field) else {
                if field.is_present(&fused) {
                    return Err(CheckFailure::MissingSource { hex: hex.clone(), field });
                }
                continue;
            };

            let untraceable = || CheckFailure::Untraceable {
                hex: hex.clone(),
                field,
                provider,
            };
            let chosen = group.get(provider).ok_or_else(untraceable)?;
            if !field.is_present(&chosen.telemetry) || !field.same_value(&chosen.telemetry, &fused) {
                return Err(untraceable());
            }

            let fresher = group
                .records
                .values()
                .find(|r| field.is_present(&r.telemetry) && age_key(r) < age_key(chosen));
            if let Some(fresher) = fresher {
                return Err(CheckFailure::NotFreshest {
                    hex: hex.clone(),
                    field,
                    chosen: provider,
                    fresher: fresher.provider,
                });
            }
        }
    }
    Ok(())
}

/// `nearest` is the closest in-radius aircraft (ties by hex), or absent.
pub fn check_nearest(snapshot: &Snapshot) -> Result<(), CheckFailure> {
    let expected = snapshot
        .merged
        .iter()
        .filter(|m| m.is_within_radius())
        .filter_map(|m| m.exact_distance_nm.map(|d| (d, m.hex.as_str())))
        .min_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(b.1)))
        .map(|(_, hex)| hex.to_string());
    let actual = snapshot.nearest.as_ref().map(|n| n.hex.clone());
    if expected != actual {
        return Err(CheckFailure::WrongNearest { expected, actual });
    }
    Ok(())
}

/// Counters in `stats` match the merged list.
pub fn check_stats(snapshot: &Snapshot) -> Result<(), CheckFailure> {
    let stats = &snapshot.stats;
    if stats.hex_count != snapshot.merged.len() {
        return Err(CheckFailure::Stats(format!(
            "hex_count {} != {} merged",
            stats.hex_count,
            snapshot.merged.len()
        )));
    }
    let within = snapshot.merged.iter().filter(|m| m.is_within_radius()).count();
    if stats.within_radius_count != within {
        return Err(CheckFailure::Stats(format!(
            "within_radius_count {} != {}",
            stats.within_radius_count, within
        )));
    }
    let sources: BTreeSet<Provider> = snapshot
        .merged
        .iter()
        .flat_map(|m| m.sources.iter().copied())
        .collect();
    if sources.into_iter().collect::<Vec<_>>() != stats.providers_present {
        return Err(CheckFailure::Stats("providers_present disagrees with sources".into()));
    }
    Ok(())
}

/// Runs every structural check on one cycle's output.
pub fn check_snapshot(
    snapshot: &Snapshot,
    observations: &[RawObservation],
    now: f64,
    priority: &ProviderPriority,
) -> Result<(), CheckFailure> {
    check_unique_hexes(snapshot)?;
    check_stats(snapshot)?;
    check_nearest(snapshot)?;
    check_traceability(snapshot, observations, now, priority)
}

/// Two snapshots serialize to identical JSON.
pub fn check_idempotent(a: &Snapshot, b: &Snapshot) -> Result<(), CheckFailure> {
    let a = serde_json::to_string(a).map_err(|e| CheckFailure::assertion(e.to_string()))?;
    let b = serde_json::to_string(b).map_err(|e| CheckFailure::assertion(e.to_string()))?;
    if a != b {
        return Err(CheckFailure::NotIdempotent);
    }
    Ok(())
}
