//! The Fusion Engine - per-field freshest-wins telemetry reconciliation
//!
//! Three uncoordinated providers report the same airframe with different
//! latencies. Rather than trusting one provider wholesale, every telemetry
//! field is decided on its own:
//! 1. Consider only providers that reported a value for the field
//! 2. Lowest age wins (unknown age counts as infinitely stale)
//! 3. Exact age tie falls back to the static provider priority
//!
//! The winner of each field is recorded in `field_sources`, so every fused
//! value can be traced back to the canonical record it came from.

use crate::canonical::{CanonicalRecord, Telemetry};
use crate::provider::{Provider, ProviderPriority};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tracing::debug;

// ============================================================================
// FIELD IDENTITY
// ============================================================================

/// Telemetry fields fused independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TelemetryField {
    Latitude,
    Longitude,
    AltitudeFt,
    VerticalRateFpm,
    GroundSpeedKt,
    TrackDeg,
    Squawk,
    OnGround,
}

impl TelemetryField {
    pub const ALL: [TelemetryField; 8] = [
        TelemetryField::Latitude,
        TelemetryField::Longitude,
        TelemetryField::AltitudeFt,
        TelemetryField::VerticalRateFpm,
        TelemetryField::GroundSpeedKt,
        TelemetryField::TrackDeg,
        TelemetryField::Squawk,
        TelemetryField::OnGround,
    ];

    /// Whether `telemetry` carries a value for this field.
    pub fn is_present(&self, telemetry: &Telemetry) -> bool {
        match self {
            TelemetryField::Latitude => telemetry.latitude.is_some(),
            TelemetryField::Longitude => telemetry.longitude.is_some(),
            TelemetryField::AltitudeFt => telemetry.altitude_ft.is_some(),
            TelemetryField::VerticalRateFpm => telemetry.vertical_rate_fpm.is_some(),
            TelemetryField::GroundSpeedKt => telemetry.ground_speed_kt.is_some(),
            TelemetryField::TrackDeg => telemetry.track_deg.is_some(),
            TelemetryField::Squawk => telemetry.squawk.is_some(),
            TelemetryField::OnGround => telemetry.on_ground.is_some(),
        }
    }

    /// True when both telemetries carry the same value for this field.
    pub fn same_value(&self, a: &Telemetry, b: &Telemetry) -> bool {
        match self {
            TelemetryField::Latitude => a.latitude == b.latitude,
            TelemetryField::Longitude => a.longitude == b.longitude,
            TelemetryField::AltitudeFt => a.altitude_ft == b.altitude_ft,
            TelemetryField::VerticalRateFpm => a.vertical_rate_fpm == b.vertical_rate_fpm,
            TelemetryField::GroundSpeedKt => a.ground_speed_kt == b.ground_speed_kt,
            TelemetryField::TrackDeg => a.track_deg == b.track_deg,
            TelemetryField::Squawk => a.squawk == b.squawk,
            TelemetryField::OnGround => a.on_ground == b.on_ground,
        }
    }
}

// ============================================================================
// GROUPING
// ============================================================================

/// All canonical records for one hex, at most one per provider.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AircraftGroup {
    pub hex: String,
    pub records: BTreeMap<Provider, CanonicalRecord>,
}

impl AircraftGroup {
    pub fn new(hex: impl Into<String>) -> Self {
        Self {
            hex: hex.into(),
            records: BTreeMap::new(),
        }
    }

    /// Adds a record. A second report from the same provider replaces the
    /// first only if it is strictly fresher. Returns `false` when the record
    /// was discarded as a duplicate.
    pub fn insert(&mut self, record: CanonicalRecord) -> bool {
        match self.records.get(&record.provider) {
            Some(existing) if age_key(existing) <= age_key(&record) => {
                debug!(hex = %self.hex, provider = %record.provider, "duplicate observation discarded");
                false
            }
            Some(_) => {
                self.records.insert(record.provider, record);
                false
            }
            None => {
                self.records.insert(record.provider, record);
                true
            }
        }
    }

    pub fn get(&self, provider: Provider) -> Option<&CanonicalRecord> {
        self.records.get(&provider)
    }

    /// Providers that contributed, alphabetical.
    pub fn sources(&self) -> Vec<Provider> {
        self.records.keys().copied().collect()
    }

    /// Lowest known age among contributors.
    pub fn freshest_age(&self) -> Option<f64> {
        self.records
            .values()
            .filter_map(|r| r.age_seconds)
            .min_by(|a, b| a.total_cmp(b))
    }
}

fn age_key(record: &CanonicalRecord) -> f64 {
    record.age_seconds.unwrap_or(f64::INFINITY)
}

// ============================================================================
// FUSED OUTPUT
// ============================================================================

/// Result of fusing one aircraft group.
#[derive(Debug, Clone, PartialEq)]
pub struct FusedTelemetry {
    pub hex: String,
    pub telemetry: Telemetry,
    pub field_sources: BTreeMap<TelemetryField, Provider>,
    /// Source timestamp of the provider that won the position
    pub position_timestamp: Option<f64>,
    pub position_age_sec: Option<f64>,
    /// Known ages per contributing provider
    pub provider_ages: BTreeMap<Provider, f64>,
    pub sources: Vec<Provider>,
    pub freshest_age: Option<f64>,
}

// ============================================================================
// FUSION ENGINE
// ============================================================================

/// Groups canonical records by hex and fuses each group.
#[derive(Debug, Clone, Default)]
pub struct FusionEngine {
    priority: ProviderPriority,
}

impl FusionEngine {
    pub fn new(priority: ProviderPriority) -> Self {
        Self { priority }
    }

    /// Groups records by hex. Returns the groups (ordered by hex) and the
    /// number of duplicate (provider, hex) records that were discarded.
    pub fn group(&self, records: impl IntoIterator<Item = CanonicalRecord>) -> (BTreeMap<String, AircraftGroup>, usize) {
        let mut groups: BTreeMap<String, AircraftGroup> = BTreeMap::new();
        let mut duplicates = 0;
        for record in records {
            let group = groups
                .entry(record.hex.clone())
                .or_insert_with(|| AircraftGroup::new(record.hex.clone()));
            if !group.insert(record) {
                duplicates += 1;
            }
        }
        (groups, duplicates)
    }

    /// Freshness order, then priority rank.
    fn compare(&self, a: &CanonicalRecord, b: &CanonicalRecord) -> Ordering {
        age_key(a)
            .total_cmp(&age_key(b))
            .then_with(|| self.priority.rank(a.provider).cmp(&self.priority.rank(b.provider)))
    }

    fn pick<'a, T>(
        &self,
        group: &'a AircraftGroup,
        get: impl Fn(&'a CanonicalRecord) -> Option<T>,
    ) -> Option<(T, &'a CanonicalRecord)> {
        group
            .records
            .values()
            .filter_map(|r| get(r).map(|v| (v, r)))
            .min_by(|(_, a), (_, b)| self.compare(a, b))
    }

    /// Fuses one group field by field.
    pub fn fuse(&self, group: &AircraftGroup) -> FusedTelemetry {
        let mut field_sources = BTreeMap::new();
        let mut winner_of = |field: TelemetryField, rec: &CanonicalRecord| {
            field_sources.insert(field, rec.provider);
        };

        let mut telemetry = Telemetry::default();
        let mut position_from: Option<&CanonicalRecord> = None;

        if let Some((v, r)) = self.pick(group, |r| r.telemetry.latitude) {
            telemetry.latitude = Some(v);
            winner_of(TelemetryField::Latitude, r);
            position_from = Some(r);
        }
        if let Some((v, r)) = self.pick(group, |r| r.telemetry.longitude) {
            telemetry.longitude = Some(v);
            winner_of(TelemetryField::Longitude, r);
            position_from = position_from.or(Some(r));
        }
        if let Some((v, r)) = self.pick(group, |r| r.telemetry.altitude_ft) {
            telemetry.altitude_ft = Some(v);
            winner_of(TelemetryField::AltitudeFt, r);
        }
        if let Some((v, r)) = self.pick(group, |r| r.telemetry.vertical_rate_fpm) {
            telemetry.vertical_rate_fpm = Some(v);
            winner_of(TelemetryField::VerticalRateFpm, r);
        }
        if let Some((v, r)) = self.pick(group, |r| r.telemetry.ground_speed_kt) {
            telemetry.ground_speed_kt = Some(v);
            winner_of(TelemetryField::GroundSpeedKt, r);
        }
        if let Some((v, r)) = self.pick(group, |r| r.telemetry.track_deg) {
            telemetry.track_deg = Some(v);
            winner_of(TelemetryField::TrackDeg, r);
        }
        if let Some((v, r)) = self.pick(group, |r| r.telemetry.squawk.as_ref()) {
            telemetry.squawk = Some(v.clone());
            winner_of(TelemetryField::Squawk, r);
        }
        if let Some((v, r)) = self.pick(group, |r| r.telemetry.on_ground) {
            telemetry.on_ground = Some(v);
            winner_of(TelemetryField::OnGround, r);
        }

        let provider_ages = group
            .records
            .iter()
            .filter_map(|(p, r)| r.age_seconds.map(|a| (*p, a)))
            .collect();

        FusedTelemetry {
            hex: group.hex.clone(),
            telemetry,
            field_sources,
            position_timestamp: position_from.and_then(|r| r.source_timestamp),
            position_age_sec: position_from.and_then(|r| r.age_seconds),
            provider_ages,
            sources: group.sources(),
            freshest_age: group.freshest_age(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical::Identity;

    fn record(provider: Provider, age: Option<f64>, lat: Option<f64>, alt: Option<i32>) -> CanonicalRecord {
        CanonicalRecord {
            provider,
            hex: "A27A94".into(),
            age_seconds: age,
            source_timestamp: age.map(|a| 1000.0 - a),
            telemetry: Telemetry {
                latitude: lat,
                longitude: lat.map(|l| -l),
                altitude_ft: alt,
                ..Telemetry::default()
            },
            identity: Identity::default(),
            military_flag: None,
        }
    }

    fn fuse(engine: &FusionEngine, records: Vec<CanonicalRecord>) -> FusedTelemetry {
        let (groups, _) = engine.group(records);
        engine.fuse(&groups["A27A94"])
    }

    #[test]
    fn test_freshest_provider_wins_per_field() {
        let engine = FusionEngine::default();
        let fused = fuse(
            &engine,
            vec![
                record(Provider::OpenSky, Some(50.0), Some(46.0), Some(10000)),
                record(Provider::AdsbLol, Some(1.0), Some(46.1), None),
            ],
        );
        assert_eq!(fused.telemetry.latitude, Some(46.1));
        assert_eq!(fused.field_sources[&TelemetryField::Latitude], Provider::AdsbLol);
        // Only OpenSky reported altitude, so the stale value still wins it
        assert_eq!(fused.telemetry.altitude_ft, Some(10000));
        assert_eq!(fused.field_sources[&TelemetryField::AltitudeFt], Provider::OpenSky);
        assert_eq!(fused.position_age_sec, Some(1.0));
        assert_eq!(fused.position_timestamp, Some(999.0));
    }

    #[test]
    fn test_age_tie_goes_to_priority() {
        let engine = FusionEngine::default();
        let fused = fuse(
            &engine,
            vec![
                record(Provider::Fr24, Some(5.0), Some(46.2), None),
                record(Provider::AdsbLol, Some(5.0), Some(46.1), None),
            ],
        );
        assert_eq!(fused.field_sources[&TelemetryField::Latitude], Provider::AdsbLol);

        let engine = FusionEngine::new("fr24".parse().unwrap());
        let fused = fuse(
            &engine,
            vec![
                record(Provider::Fr24, Some(5.0), Some(46.2), None),
                record(Provider::AdsbLol, Some(5.0), Some(46.1), None),
            ],
        );
        assert_eq!(fused.field_sources[&TelemetryField::Latitude], Provider::Fr24);
    }

    #[test]
    fn test_unknown_age_loses_to_any_known_age() {
        let engine = FusionEngine::default();
        let fused = fuse(
            &engine,
            vec![
                record(Provider::AdsbLol, None, Some(46.1), None),
                record(Provider::OpenSky, Some(3000.0), Some(46.0), None),
            ],
        );
        assert_eq!(fused.field_sources[&TelemetryField::Latitude], Provider::OpenSky);

        // Among age-less providers, priority decides
        let fused = fuse(
            &engine,
            vec![
                record(Provider::OpenSky, None, Some(46.0), None),
                record(Provider::Fr24, None, Some(46.2), None),
            ],
        );
        assert_eq!(fused.field_sources[&TelemetryField::Latitude], Provider::Fr24);
        assert_eq!(fused.freshest_age, None);
    }

    #[test]
    fn test_fused_values_trace_to_winning_record() {
        let engine = FusionEngine::default();
        let records = vec![
            record(Provider::OpenSky, Some(7.0), Some(46.0), Some(9000)),
            record(Provider::AdsbLol, Some(2.0), None, Some(9100)),
            record(Provider::Fr24, Some(4.0), Some(46.2), None),
        ];
        let (groups, _) = engine.group(records);
        let group = &groups["A27A94"];
        let fused = engine.fuse(group);

        for field in TelemetryField::ALL {
            match fused.field_sources.get(&field) {
                Some(p) => {
                    let src = &group.records[p].telemetry;
                    assert!(field.is_present(src));
                    assert!(field.same_value(src, &fused.telemetry));
                }
                None => assert!(!field.is_present(&fused.telemetry)),
            }
        }
        assert_eq!(fused.sources, vec![Provider::AdsbLol, Provider::Fr24, Provider::OpenSky]);
    }

    #[test]
    fn test_duplicate_provider_keeps_freshest() {
        let engine = FusionEngine::default();
        let (groups, dups) = engine.group(vec![
            record(Provider::AdsbLol, Some(9.0), Some(1.0), None),
            record(Provider::AdsbLol, Some(3.0), Some(2.0), None),
            record(Provider::AdsbLol, Some(3.0), Some(3.0), None),
        ]);
        assert_eq!(dups, 2);
        let kept = &groups["A27A94"].records[&Provider::AdsbLol];
        assert_eq!(kept.telemetry.latitude, Some(2.0));
    }

    #[test]
    fn test_field_names_serialize_snake_case() {
        let json = serde_json::to_string(&TelemetryField::VerticalRateFpm).unwrap();
        assert_eq!(json, "\"vertical_rate_fpm\"");
    }
}
