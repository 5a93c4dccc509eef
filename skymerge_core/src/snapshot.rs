//! The Snapshot Assembler.

use crate::geospatial::QueryPoint;
use crate::provider::Provider;
use crate::record::MergedAircraft;
use serde::Serialize;
use std::collections::BTreeMap;

/// Counters describing one cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SnapshotStats {
    pub hex_count: usize,
    /// Providers with at least one accepted observation, sorted
    pub providers_present: Vec<Provider>,
    /// Accepted observations per provider
    pub provider_rows: BTreeMap<Provider, usize>,
    /// Observations rejected by the canonicalizer
    pub dropped_observations: usize,
    /// Same (provider, hex) reported again in one cycle; freshest kept
    pub duplicate_observations: usize,
    pub within_radius_count: usize,
}

/// One cycle's output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    /// Unix seconds of the cycle
    pub timestamp: i64,
    pub stats: SnapshotStats,
    pub point: QueryPoint,
    pub merged: Vec<MergedAircraft>,
    pub nearest: Option<MergedAircraft>,
    /// Nearest in-radius aircraft that is not Private
    pub nearest_of_interest: Option<MergedAircraft>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub by_hex: Option<BTreeMap<String, MergedAircraft>>,
}

#[cfg(test)]
impl Snapshot {
    pub fn get(&self, hex: &str) -> Option<&MergedAircraft> {
        self.merged.iter().find(|m| m.hex == hex)
    }
}

/// Ingestion counters handed over by the pipeline.
#[derive(Debug, Clone, Default)]
pub struct IngestCounts {
    pub provider_rows: BTreeMap<Provider, usize>,
    pub dropped: usize,
    pub duplicates: usize,
}

fn distance_key(m: &MergedAircraft) -> f64 {
    m.exact_distance_nm.unwrap_or(f64::INFINITY)
}

/// Closest in-radius record, ties broken by hex.
fn nearest_by<'a>(
    merged: &'a [MergedAircraft],
    keep: impl Fn(&MergedAircraft) -> bool,
) -> Option<&'a MergedAircraft> {
    merged
        .iter()
        .filter(|m| m.is_within_radius() && m.exact_distance_nm.is_some() && keep(*m))
        .min_by(|a, b| {
            distance_key(a)
                .total_cmp(&distance_key(b))
                .then_with(|| a.hex.cmp(&b.hex))
        })
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SnapshotAssembler {
    include_by_hex: bool,
}

impl SnapshotAssembler {
    pub fn new(include_by_hex: bool) -> Self {
        Self { include_by_hex }
    }

    /// Orders `merged` by (freshest provider age, distance, hex) and derives
    /// stats and the nearest summaries.
    pub fn assemble(
        &self,
        timestamp: f64,
        point: QueryPoint,
        mut merged: Vec<MergedAircraft>,
        counts: IngestCounts,
    ) -> Snapshot {
        merged.sort_by(|a, b| {
            a.freshest_age()
                .total_cmp(&b.freshest_age())
                .then_with(|| distance_key(a).total_cmp(&distance_key(b)))
                .then_with(|| a.hex.cmp(&b.hex))
        });

        let providers_present = counts
            .provider_rows
            .iter()
            .filter(|(_, n)| **n > 0)
            .map(|(p, _)| *p)
            .collect();

        let stats = SnapshotStats {
            hex_count: merged.len(),
            providers_present,
            provider_rows: counts.provider_rows,
            dropped_observations: counts.dropped,
            duplicate_observations: counts.duplicates,
            within_radius_count: merged.iter().filter(|m| m.is_within_radius()).count(),
        };

        let nearest = nearest_by(&merged, |_| true).cloned();
        let nearest_of_interest = nearest_by(&merged, |m| m.classification.is_of_interest()).cloned();
        let by_hex = self
            .include_by_hex
            .then(|| merged.iter().map(|m| (m.hex.clone(), m.clone())).collect());

        Snapshot {
            timestamp: timestamp.floor() as i64,
            stats,
            point,
            merged,
            nearest,
            nearest_of_interest,
            by_hex,
        }
    }
}
