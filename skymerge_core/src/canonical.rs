//! The Canonicalizer: provider-native observations to one common schema.
//!
//! After this stage every record speaks feet, knots and ft/min, carries an
//! upper-cased hex, and knows how old it is.

use crate::observation::{AdsbLolAircraft, BaroAltitude, Fr24Flight, OpenSkyState, RawObservation};
use crate::provider::Provider;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// UNIT CONVERSION
// ============================================================================

/// Metres to feet
pub const M_TO_FT: f64 = 3.280839895;
/// Metres per second to feet per minute
pub const MPS_TO_FPM: f64 = 196.850394;
/// Metres per second to knots
pub const MPS_TO_KT: f64 = 1.943844;

fn to_int(value: f64) -> Option<i32> {
    let r = value.round();
    (r.is_finite() && r >= i32::MIN as f64 && r <= i32::MAX as f64).then_some(r as i32)
}

// ============================================================================
// CANONICAL RECORD
// ============================================================================

/// Continuous telemetry in common units.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Telemetry {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub altitude_ft: Option<i32>,
    pub vertical_rate_fpm: Option<i32>,
    pub ground_speed_kt: Option<i32>,
    pub track_deg: Option<f64>,
    pub squawk: Option<String>,
    pub on_ground: Option<bool>,
}

/// Discrete identity attributes as the provider reported them.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Identity {
    pub registration: Option<String>,
    pub aircraft_type: Option<String>,
    pub callsign: Option<String>,
    /// Raw flight designator (ADSB.lol `flight`, FR24 `flight`)
    pub flight: Option<String>,
    pub airline_icao: Option<String>,
    pub origin_iata: Option<String>,
    pub destination_iata: Option<String>,
    pub origin_country: Option<String>,
}

/// One provider's normalized report of one aircraft.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalRecord {
    pub provider: Provider,
    /// Upper-cased ICAO 24-bit address, optionally `~`-prefixed
    pub hex: String,
    /// `None` when the provider gave nothing to compute an age from
    pub age_seconds: Option<f64>,
    /// Unix seconds of the provider's own last update
    pub source_timestamp: Option<f64>,
    pub telemetry: Telemetry,
    pub identity: Identity,
    pub military_flag: Option<bool>,
}

/// Why an observation was dropped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("{0} observation without hex")]
    MissingHex(Provider),

    #[error("{provider} observation with malformed hex {raw:?}")]
    MalformedHex { provider: Provider, raw: String },
}

/// Normalizes a hex. Valid: six hex digits, optionally prefixed with `~`.
pub fn normalize_hex(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let digits = trimmed.strip_prefix('~').unwrap_or(trimmed);
    if digits.len() != 6 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    Some(trimmed.to_ascii_uppercase())
}

/// Non-ICAO addresses (TIS-B and similar) carry a `~` prefix.
pub fn is_non_icao(hex: &str) -> bool {
    hex.starts_with('~')
}

// ============================================================================
// CANONICALIZER
// ============================================================================

/// Stateless per-provider converter.
#[derive(Debug, Clone, Copy, Default)]
pub struct Canonicalizer;

impl Canonicalizer {
    /// Converts one observation at cycle time `now` (unix seconds).
    pub fn canonicalize(&self, raw: &RawObservation, now: f64) -> Result<CanonicalRecord, Rejection> {
        let provider = raw.provider();
        let hex = match raw.raw_hex() {
            None => return Err(Rejection::MissingHex(provider)),
            Some(h) => normalize_hex(h).ok_or_else(|| Rejection::MalformedHex {
                provider,
                raw: h.to_string(),
            })?,
        };

        let record = match raw {
            RawObservation::OpenSky(s) => Self::from_opensky(hex, s, now),
            RawObservation::AdsbLol(a) => Self::from_adsb_lol(hex, a, now),
            RawObservation::Fr24(f) => Self::from_fr24(hex, f, now),
        };
        Ok(record)
    }

    fn from_opensky(hex: String, s: &OpenSkyState, now: f64) -> CanonicalRecord {
        let source_timestamp = s.last_contact.or(s.time_position);
        CanonicalRecord {
            provider: Provider::OpenSky,
            hex,
            age_seconds: source_timestamp.map(|t| now - t),
            source_timestamp,
            telemetry: Telemetry {
                latitude: s.latitude,
                longitude: s.longitude,
                altitude_ft: s.geo_altitude.or(s.baro_altitude).and_then(|m| to_int(m * M_TO_FT)),
                vertical_rate_fpm: s.vertical_rate.and_then(|v| to_int(v * MPS_TO_FPM)),
                ground_speed_kt: s.velocity.and_then(|v| to_int(v * MPS_TO_KT)),
                track_deg: s.true_track,
                squawk: s.squawk.clone(),
                on_ground: s.on_ground,
            },
            identity: Identity {
                aircraft_type: s.aircraft_type.clone(),
                callsign: s.callsign.clone(),
                origin_country: s.origin_country.clone(),
                ..Identity::default()
            },
            military_flag: s.mil,
        }
    }

    fn from_adsb_lol(hex: String, a: &AdsbLolAircraft, now: f64) -> CanonicalRecord {
        let baro_ft = match a.alt_baro {
            Some(BaroAltitude::Feet(ft)) => Some(ft),
            _ => None,
        };
        let on_ground = match (a.on_ground, a.alt_baro) {
            (Some(g), _) => Some(g),
            (None, Some(BaroAltitude::Ground)) => Some(true),
            _ => None,
        };
        let db_mil = a.db_flags.map(|flags| flags & 1 == 1);
        let military_flag = match (db_mil, a.mil) {
            (Some(true), _) | (_, Some(true)) => Some(true),
            (Some(false), _) | (_, Some(false)) => Some(false),
            _ => None,
        };

        CanonicalRecord {
            provider: Provider::AdsbLol,
            hex,
            age_seconds: a.seen,
            source_timestamp: a.seen.map(|s| now - s),
            telemetry: Telemetry {
                latitude: a.lat,
                longitude: a.lon,
                altitude_ft: a.alt_geom.or(baro_ft).and_then(to_int),
                vertical_rate_fpm: a.baro_rate.or(a.geom_rate).and_then(to_int),
                ground_speed_kt: a.gs.and_then(to_int),
                track_deg: a.track.or(a.true_heading),
                squawk: a.squawk.clone(),
                on_ground,
            },
            identity: Identity {
                registration: a.r.clone(),
                aircraft_type: a.t.clone(),
                callsign: a.flight.clone().or_else(|| a.callsign.clone()),
                flight: a.flight.clone(),
                ..Identity::default()
            },
            military_flag,
        }
    }

    fn from_fr24(hex: String, f: &Fr24Flight, now: f64) -> CanonicalRecord {
        CanonicalRecord {
            provider: Provider::Fr24,
            hex,
            age_seconds: f.timestamp.map(|t| now - t),
            source_timestamp: f.timestamp,
            telemetry: Telemetry {
                latitude: f.lat,
                longitude: f.lon,
                altitude_ft: f.alt_ft.and_then(to_int),
                vertical_rate_fpm: f.vs_fpm.and_then(to_int),
                ground_speed_kt: f.gs_kt.and_then(to_int),
                track_deg: f.trk,
                squawk: f.squawk.clone(),
                on_ground: f.on_ground,
            },
            identity: Identity {
                registration: f.reg.clone(),
                aircraft_type: f.aircraft_type.clone(),
                callsign: f.callsign.clone(),
                flight: f.flight.clone(),
                airline_icao: f.airline_icao.clone(),
                origin_iata: f.from_iata.clone(),
                destination_iata: f.to_iata.clone(),
                ..Identity::default()
            },
            military_flag: f.mil,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_opensky_age_from_last_contact() {
        let raw = RawObservation::OpenSky(OpenSkyState {
            icao24: Some("a27a94".into()),
            last_contact: Some(100.0),
            time_position: Some(90.0),
            ..Default::default()
        });
        let rec = Canonicalizer.canonicalize(&raw, 150.0).unwrap();
        assert_eq!(rec.hex, "A27A94");
        assert_eq!(rec.age_seconds, Some(50.0));
        assert_eq!(rec.source_timestamp, Some(100.0));
    }

    #[test]
    fn test_opensky_unit_conversion_prefers_geo_altitude() {
        let raw = RawObservation::OpenSky(OpenSkyState {
            icao24: Some("abc123".into()),
            baro_altitude: Some(1000.0),
            geo_altitude: Some(3048.0),
            vertical_rate: Some(-2.54),
            velocity: Some(100.0),
            true_track: Some(271.5),
            ..Default::default()
        });
        let rec = Canonicalizer.canonicalize(&raw, 0.0).unwrap();
        assert_eq!(rec.telemetry.altitude_ft, Some(10000));
        assert_eq!(rec.telemetry.vertical_rate_fpm, Some(-500));
        assert_eq!(rec.telemetry.ground_speed_kt, Some(194));
        assert_relative_eq!(rec.telemetry.track_deg.unwrap(), 271.5);
        assert_eq!(rec.age_seconds, None);
    }

    #[test]
    fn test_adsb_ground_and_fallbacks() {
        let raw = RawObservation::AdsbLol(AdsbLolAircraft {
            hex: Some("~1a2b3c".into()),
            alt_baro: Some(BaroAltitude::Ground),
            geom_rate: Some(64.0),
            true_heading: Some(90.0),
            seen: Some(2.5),
            db_flags: Some(0),
            flight: Some("SWA123".into()),
            ..Default::default()
        });
        let rec = Canonicalizer.canonicalize(&raw, 1000.0).unwrap();
        assert_eq!(rec.hex, "~1A2B3C");
        assert_eq!(rec.telemetry.on_ground, Some(true));
        assert_eq!(rec.telemetry.altitude_ft, None);
        assert_eq!(rec.telemetry.vertical_rate_fpm, Some(64));
        assert_eq!(rec.telemetry.track_deg, Some(90.0));
        assert_eq!(rec.age_seconds, Some(2.5));
        assert_eq!(rec.source_timestamp, Some(997.5));
        assert_eq!(rec.identity.callsign.as_deref(), Some("SWA123"));
        assert_eq!(rec.military_flag, Some(false));
    }

    #[test]
    fn test_adsb_military_bit() {
        let raw = RawObservation::AdsbLol(AdsbLolAircraft {
            hex: Some("ae1234".into()),
            db_flags: Some(3),
            ..Default::default()
        });
        let rec = Canonicalizer.canonicalize(&raw, 0.0).unwrap();
        assert_eq!(rec.military_flag, Some(true));
    }

    #[test]
    fn test_fr24_age_and_identity() {
        let raw = RawObservation::Fr24(Fr24Flight {
            hex: Some("A27A94".into()),
            timestamp: Some(140.0),
            reg: Some("N259SY".into()),
            from_iata: Some("SEA".into()),
            on_ground: Some(false),
            ..Default::default()
        });
        let rec = Canonicalizer.canonicalize(&raw, 150.0).unwrap();
        assert_eq!(rec.age_seconds, Some(10.0));
        assert_eq!(rec.identity.registration.as_deref(), Some("N259SY"));
        assert_eq!(rec.identity.origin_iata.as_deref(), Some("SEA"));
    }

    #[test]
    fn test_rejections() {
        let missing = RawObservation::Fr24(Fr24Flight::default());
        assert_eq!(
            Canonicalizer.canonicalize(&missing, 0.0),
            Err(Rejection::MissingHex(Provider::Fr24))
        );

        let bad = RawObservation::AdsbLol(AdsbLolAircraft {
            hex: Some("xyz".into()),
            ..Default::default()
        });
        assert!(matches!(
            Canonicalizer.canonicalize(&bad, 0.0),
            Err(Rejection::MalformedHex { .. })
        ));
    }

    #[test]
    fn test_normalize_hex() {
        assert_eq!(normalize_hex(" a27a94 ").as_deref(), Some("A27A94"));
        assert_eq!(normalize_hex("~abcdef").as_deref(), Some("~ABCDEF"));
        assert_eq!(normalize_hex("a27a9"), None);
        assert_eq!(normalize_hex("g27a94"), None);
        assert!(is_non_icao("~ABCDEF"));
    }
}
