//! The merged per-aircraft output record.

use crate::canonical::Telemetry;
use crate::enrichment::{Classification, Enrichment, Lookups};
use crate::fusion::{FusedTelemetry, TelemetryField};
use crate::geospatial::Relation;
use crate::identity::ResolvedIdentity;
use crate::military::MilitaryStatus;
use crate::provider::Provider;
use serde::Serialize;
use std::collections::BTreeMap;

/// One fused, classified and enriched aircraft. `hex` is unique per snapshot.
///
/// Absent optional values are omitted from JSON, except `is_military` and
/// `souls_on_board_max`, which are always present (possibly `null`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergedAircraft {
    pub hex: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub altitude_ft: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vertical_rate_fpm: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ground_speed_kt: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track_deg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub squawk: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on_ground: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub registration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aircraft_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub airline_icao: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callsign: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flight_no: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin_iata: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_iata: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin_country: Option<String>,

    pub is_military: MilitaryStatus,
    pub classification: Classification,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_nm: Option<f64>,
    /// Unrounded distance; nearest and ordering are decided on this
    #[serde(skip)]
    pub exact_distance_nm: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bearing_deg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub within_radius: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub position_timestamp: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position_age_sec: Option<f64>,
    pub merged_timestamp: f64,

    pub sources: Vec<Provider>,
    pub field_sources: BTreeMap<TelemetryField, Provider>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age_adsb_lol_sec: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age_fr24_sec: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age_opensky_sec: Option<f64>,

    #[serde(skip_serializing_if = "Lookups::is_empty")]
    pub lookups: Lookups,
    pub souls_on_board_max: Option<u32>,
    pub souls_on_board_max_is_estimate: bool,
    pub souls_on_board_max_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_nm: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta_min: Option<f64>,
}

impl MergedAircraft {
    pub fn build(
        fused: FusedTelemetry,
        identity: ResolvedIdentity,
        relation: Option<Relation>,
        is_military: MilitaryStatus,
        enrichment: Enrichment,
        merged_timestamp: f64,
    ) -> Self {
        let t = fused.telemetry;
        let age = |p: Provider| fused.provider_ages.get(&p).copied();
        Self {
            age_adsb_lol_sec: age(Provider::AdsbLol),
            age_fr24_sec: age(Provider::Fr24),
            age_opensky_sec: age(Provider::OpenSky),
            hex: fused.hex,
            latitude: t.latitude,
            longitude: t.longitude,
            altitude_ft: t.altitude_ft,
            vertical_rate_fpm: t.vertical_rate_fpm,
            ground_speed_kt: t.ground_speed_kt,
            track_deg: t.track_deg,
            squawk: t.squawk,
            on_ground: t.on_ground,
            registration: identity.registration,
            aircraft_type: identity.aircraft_type,
            airline_icao: identity.airline_icao,
            callsign: identity.callsign,
            flight_no: identity.flight_no,
            origin_iata: identity.origin_iata,
            destination_iata: identity.destination_iata,
            origin_country: identity.origin_country,
            is_military,
            classification: enrichment.classification,
            distance_nm: relation.map(|r| r.distance_nm),
            exact_distance_nm: relation.map(|r| r.exact_distance_nm),
            bearing_deg: relation.map(|r| r.bearing_deg),
            within_radius: relation.map(|r| r.within_radius),
            position_timestamp: fused.position_timestamp,
            position_age_sec: fused.position_age_sec,
            merged_timestamp,
            sources: fused.sources,
            field_sources: fused.field_sources,
            lookups: enrichment.lookups,
            souls_on_board_max: enrichment.capacity.max,
            souls_on_board_max_is_estimate: enrichment.capacity.is_estimate,
            souls_on_board_max_text: enrichment.capacity.text(),
            remaining_nm: enrichment.eta.map(|e| e.remaining_nm),
            eta_min: enrichment.eta.map(|e| e.eta_min),
        }
    }

    /// Lowest known provider age; infinite when none is known.
    pub fn freshest_age(&self) -> f64 {
        [self.age_adsb_lol_sec, self.age_fr24_sec, self.age_opensky_sec]
            .into_iter()
            .flatten()
            .fold(f64::INFINITY, f64::min)
    }

    pub fn is_within_radius(&self) -> bool {
        self.within_radius == Some(true)
    }

    /// The fused telemetry fields as a [`Telemetry`] value.
    pub fn telemetry(&self) -> Telemetry {
        Telemetry {
            latitude: self.latitude,
            longitude: self.longitude,
            altitude_ft: self.altitude_ft,
            vertical_rate_fpm: self.vertical_rate_fpm,
            ground_speed_kt: self.ground_speed_kt,
            track_deg: self.track_deg,
            squawk: self.squawk.clone(),
            on_ground: self.on_ground,
        }
    }
}
