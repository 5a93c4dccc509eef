//! Raw provider observations.
//!
//! Each provider's native schema is an explicit struct with a fixed field
//! table. Every field is optional and decoded leniently (numbers may arrive as
//! strings, booleans as 0/1), so a single odd value degrades to "absent"
//! instead of failing the whole row. Whether the row is usable at all is
//! decided later by the canonicalizer.

use crate::geospatial::QueryPoint;
use crate::provider::Provider;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

// ============================================================================
// LENIENT FIELD DECODING
// ============================================================================

pub(crate) fn value_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|x| x.is_finite())
}

pub(crate) fn value_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub(crate) fn value_bool(v: &Value) -> Option<bool> {
    match v {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|x| x != 0.0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

pub(crate) mod lenient {
    use super::*;

    pub fn opt_f64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
        Ok(Option::<Value>::deserialize(d)?.as_ref().and_then(value_f64))
    }

    pub fn opt_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        Ok(Option::<Value>::deserialize(d)?.as_ref().and_then(value_string))
    }

    pub fn opt_bool<'de, D: Deserializer<'de>>(d: D) -> Result<Option<bool>, D::Error> {
        Ok(Option::<Value>::deserialize(d)?.as_ref().and_then(value_bool))
    }

    pub fn opt_u32<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u32>, D::Error> {
        Ok(Option::<Value>::deserialize(d)?
            .as_ref()
            .and_then(value_f64)
            .filter(|x| *x >= 0.0 && *x <= u32::MAX as f64)
            .map(|x| x as u32))
    }

    pub fn opt_baro<'de, D: Deserializer<'de>>(d: D) -> Result<Option<BaroAltitude>, D::Error> {
        let v = Option::<Value>::deserialize(d)?;
        Ok(match v.as_ref() {
            Some(Value::String(s)) if s.trim().eq_ignore_ascii_case("ground") => {
                Some(BaroAltitude::Ground)
            }
            Some(other) => value_f64(other).map(BaroAltitude::Feet),
            None => None,
        })
    }

    pub fn rows<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<Value>, D::Error> {
        Ok(Option::<Vec<Value>>::deserialize(d)?.unwrap_or_default())
    }
}

// ============================================================================
// OPENSKY
// ============================================================================

/// One OpenSky `/states/all` state vector (metres, m/s).
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct OpenSkyState {
    #[serde(default, alias = "hex", deserialize_with = "lenient::opt_string")]
    pub icao24: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub callsign: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub origin_country: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub time_position: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub last_contact: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub longitude: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub latitude: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub baro_altitude: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub geo_altitude: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_bool")]
    pub on_ground: Option<bool>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub velocity: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub true_track: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub vertical_rate: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub squawk: Option<String>,
    /// Rarely present; some retrieval shims attach a type code
    #[serde(default, rename = "type", deserialize_with = "lenient::opt_string")]
    pub aircraft_type: Option<String>,
    /// Military flag attached upstream, if any
    #[serde(default, deserialize_with = "lenient::opt_bool")]
    pub mil: Option<bool>,
}

impl OpenSkyState {
    /// Decodes the positional array form returned by `/states/all`.
    ///
    /// Index map: 0 icao24, 1 callsign, 2 origin_country, 3 time_position,
    /// 4 last_contact, 5 longitude, 6 latitude, 7 baro_altitude, 8 on_ground,
    /// 9 velocity, 10 true_track, 11 vertical_rate, 13 geo_altitude, 14 squawk.
    pub fn from_state_vector(v: &[Value]) -> Self {
        let at = |i: usize| v.get(i).unwrap_or(&Value::Null);
        Self {
            icao24: value_string(at(0)),
            callsign: value_string(at(1)),
            origin_country: value_string(at(2)),
            time_position: value_f64(at(3)),
            last_contact: value_f64(at(4)),
            longitude: value_f64(at(5)),
            latitude: value_f64(at(6)),
            baro_altitude: value_f64(at(7)),
            on_ground: value_bool(at(8)),
            velocity: value_f64(at(9)),
            true_track: value_f64(at(10)),
            vertical_rate: value_f64(at(11)),
            geo_altitude: value_f64(at(13)),
            squawk: value_string(at(14)),
            aircraft_type: None,
            mil: None,
        }
    }
}

// ============================================================================
// ADSB.LOL
// ============================================================================

/// ADSB.lol barometric altitude: feet, or the literal `"ground"`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BaroAltitude {
    Feet(f64),
    Ground,
}

/// One aircraft from ADSB.lol `/v2/point` (feet, knots, ft/min).
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AdsbLolAircraft {
    #[serde(default, alias = "icao", deserialize_with = "lenient::opt_string")]
    pub hex: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub flight: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub callsign: Option<String>,
    /// Registration
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub r: Option<String>,
    /// ICAO type designator
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub t: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub lat: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub lon: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_baro")]
    pub alt_baro: Option<BaroAltitude>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub alt_geom: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub baro_rate: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub geom_rate: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub gs: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub track: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub true_heading: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub squawk: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_bool")]
    pub on_ground: Option<bool>,
    /// Seconds since the last message from this aircraft
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub seen: Option<f64>,
    /// Database flags bitfield; bit 0 marks military airframes
    #[serde(default, rename = "dbFlags", alias = "dbflags", deserialize_with = "lenient::opt_u32")]
    pub db_flags: Option<u32>,
    #[serde(default, deserialize_with = "lenient::opt_bool")]
    pub mil: Option<bool>,
}

// ============================================================================
// FR24
// ============================================================================

/// One FR24 `feed.js` flight, after the positional array was named.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Fr24Flight {
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub hex: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub lat: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub lon: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub trk: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub alt_ft: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub gs_kt: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub squawk: Option<String>,
    #[serde(default, rename = "type", deserialize_with = "lenient::opt_string")]
    pub aircraft_type: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub reg: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub timestamp: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub from_iata: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub to_iata: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub flight: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_bool")]
    pub on_ground: Option<bool>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub vs_fpm: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub callsign: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub airline_icao: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_bool")]
    pub mil: Option<bool>,
}

impl Fr24Flight {
    /// Decodes one `feed.js` positional row.
    ///
    /// Index map: 0 hex, 1 lat, 2 lon, 3 trk, 4 alt_ft, 5 gs_kt, 6 squawk,
    /// 8 type, 9 reg, 10 timestamp, 11 from_iata, 12 to_iata, 13 flight,
    /// 14 on_ground, 15 vs_fpm, 16 callsign, 18 airline_icao.
    pub fn from_feed_row(v: &[Value]) -> Self {
        let at = |i: usize| v.get(i).unwrap_or(&Value::Null);
        Self {
            hex: value_string(at(0)),
            lat: value_f64(at(1)),
            lon: value_f64(at(2)),
            trk: value_f64(at(3)),
            alt_ft: value_f64(at(4)),
            gs_kt: value_f64(at(5)),
            squawk: value_string(at(6)),
            aircraft_type: value_string(at(8)),
            reg: value_string(at(9)),
            timestamp: value_f64(at(10)),
            from_iata: value_string(at(11)),
            to_iata: value_string(at(12)),
            flight: value_string(at(13)),
            on_ground: value_bool(at(14)),
            vs_fpm: value_f64(at(15)),
            callsign: value_string(at(16)),
            airline_icao: value_string(at(18)),
            mil: None,
        }
    }
}

// ============================================================================
// TAGGED OBSERVATION
// ============================================================================

/// One provider's report of one aircraft.
#[derive(Debug, Clone, PartialEq)]
pub enum RawObservation {
    OpenSky(OpenSkyState),
    AdsbLol(AdsbLolAircraft),
    Fr24(Fr24Flight),
}

impl RawObservation {
    /// The provider that produced this observation.
    pub fn provider(&self) -> Provider {
        match self {
            RawObservation::OpenSky(_) => Provider::OpenSky,
            RawObservation::AdsbLol(_) => Provider::AdsbLol,
            RawObservation::Fr24(_) => Provider::Fr24,
        }
    }

    /// The hex exactly as the provider sent it.
    pub fn raw_hex(&self) -> Option<&str> {
        match self {
            RawObservation::OpenSky(s) => s.icao24.as_deref(),
            RawObservation::AdsbLol(a) => a.hex.as_deref(),
            RawObservation::Fr24(f) => f.hex.as_deref(),
        }
    }

    /// Decodes one provider row, accepting either the named-object form or
    /// the provider's positional array form.
    ///
    /// Rows that are neither decode to an empty observation, which the
    /// canonicalizer then rejects for lacking a hex.
    pub fn from_value(provider: Provider, row: &Value) -> Self {
        match (provider, row) {
            (Provider::OpenSky, Value::Array(items)) => {
                RawObservation::OpenSky(OpenSkyState::from_state_vector(items))
            }
            (Provider::Fr24, Value::Array(items)) => {
                RawObservation::Fr24(Fr24Flight::from_feed_row(items))
            }
            (Provider::OpenSky, _) => {
                RawObservation::OpenSky(serde_json::from_value(row.clone()).unwrap_or_default())
            }
            (Provider::AdsbLol, _) => {
                RawObservation::AdsbLol(serde_json::from_value(row.clone()).unwrap_or_default())
            }
            (Provider::Fr24, _) => {
                RawObservation::Fr24(serde_json::from_value(row.clone()).unwrap_or_default())
            }
        }
    }
}

// ============================================================================
// PAYLOAD (Input contract from the retrieval collaborator)
// ============================================================================

/// Rows per provider, provider-native shapes.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderRows {
    #[serde(default, deserialize_with = "lenient::rows")]
    pub opensky: Vec<Value>,
    #[serde(default, alias = "adsb", deserialize_with = "lenient::rows")]
    pub adsb_lol: Vec<Value>,
    #[serde(default, deserialize_with = "lenient::rows")]
    pub fr24: Vec<Value>,
}

/// Query point as recorded in a payload. Any part may be missing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PayloadPoint {
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub lat: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub lon: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub radius_nm: Option<f64>,
}

impl PayloadPoint {
    /// Resolves to a query point, using `default_radius_nm` when the radius
    /// was not recorded. `None` without both coordinates.
    pub fn resolve(&self, default_radius_nm: f64) -> Option<QueryPoint> {
        Some(QueryPoint::new(
            self.lat?,
            self.lon?,
            self.radius_nm.unwrap_or(default_radius_nm),
        ))
    }
}

impl From<QueryPoint> for PayloadPoint {
    fn from(p: QueryPoint) -> Self {
        Self {
            lat: Some(p.lat),
            lon: Some(p.lon),
            radius_nm: Some(p.radius_nm),
        }
    }
}

/// One retrieval cycle's worth of provider output.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderPayload {
    /// Unix seconds at which the providers were polled
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub timestamp: Option<f64>,

    /// Query point used for the retrieval, if recorded
    #[serde(default)]
    pub point: Option<PayloadPoint>,

    #[serde(default)]
    pub providers: ProviderRows,
}

impl ProviderPayload {
    /// Decodes every row into a tagged observation, in provider order
    /// OpenSky, ADSB.lol, FR24.
    pub fn observations(&self) -> Vec<RawObservation> {
        let rows = &self.providers;
        rows.opensky
            .iter()
            .map(|r| RawObservation::from_value(Provider::OpenSky, r))
            .chain(rows.adsb_lol.iter().map(|r| RawObservation::from_value(Provider::AdsbLol, r)))
            .chain(rows.fr24.iter().map(|r| RawObservation::from_value(Provider::Fr24, r)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_opensky_state_vector() {
        let row = json!([
            "a27a94", "ASA123  ", "United States", 90, 100, -122.70, 46.10,
            3048.0, false, 120.0, 271.5, -2.54, null, 3100.0, "4521", false, 0
        ]);
        let obs = RawObservation::from_value(Provider::OpenSky, &row);
        let RawObservation::OpenSky(s) = obs else { panic!("wrong variant") };
        assert_eq!(s.icao24.as_deref(), Some("a27a94"));
        assert_eq!(s.callsign.as_deref(), Some("ASA123"));
        assert_eq!(s.last_contact, Some(100.0));
        assert_eq!(s.latitude, Some(46.10));
        assert_eq!(s.geo_altitude, Some(3100.0));
        assert_eq!(s.squawk.as_deref(), Some("4521"));
    }

    #[test]
    fn test_fr24_feed_row() {
        let row = json!([
            "A27A94", 46.2, -122.71, 270, 10000, 250, "4521", "F-KPDX1", "E75L", "N259SY",
            1700000000, "SEA", "PDX", "AS2290", 0, -640, "QXE2290", 0, "QXE"
        ]);
        let RawObservation::Fr24(f) = RawObservation::from_value(Provider::Fr24, &row) else {
            panic!("wrong variant")
        };
        assert_eq!(f.reg.as_deref(), Some("N259SY"));
        assert_eq!(f.aircraft_type.as_deref(), Some("E75L"));
        assert_eq!(f.on_ground, Some(false));
        assert_eq!(f.vs_fpm, Some(-640.0));
        assert_eq!(f.airline_icao.as_deref(), Some("QXE"));
        assert_eq!(f.from_iata.as_deref(), Some("SEA"));
    }

    #[test]
    fn test_adsb_ground_altitude_and_strings() {
        let row = json!({"hex": "a27a94", "alt_baro": "ground", "gs": "12.5", "dbFlags": 1, "flight": "  "});
        let RawObservation::AdsbLol(a) = RawObservation::from_value(Provider::AdsbLol, &row) else {
            panic!("wrong variant")
        };
        assert_eq!(a.alt_baro, Some(BaroAltitude::Ground));
        assert_eq!(a.gs, Some(12.5));
        assert_eq!(a.db_flags, Some(1));
        assert_eq!(a.flight, None);
    }

    #[test]
    fn test_garbage_row_decodes_to_empty() {
        let obs = RawObservation::from_value(Provider::AdsbLol, &json!(42));
        assert_eq!(obs.raw_hex(), None);

        let obs = RawObservation::from_value(Provider::Fr24, &json!({"hex": {"nested": true}}));
        assert_eq!(obs.raw_hex(), None);
    }

    #[test]
    fn test_payload_accepts_adsb_alias_and_null_lists() {
        let payload: ProviderPayload = serde_json::from_value(json!({
            "timestamp": 150,
            "point": {"lat": 46.0, "lon": -122.0, "radius_nm": 25.0},
            "providers": {"adsb": [{"hex": "abc123"}], "opensky": null}
        }))
        .unwrap();
        let obs = payload.observations();
        assert_eq!(payload.timestamp, Some(150.0));
        assert_eq!(obs.len(), 1);
        assert_eq!(obs[0].provider(), Provider::AdsbLol);
        assert_eq!(
            payload.point.and_then(|p| p.resolve(50.0)),
            Some(QueryPoint::new(46.0, -122.0, 25.0))
        );
    }

    #[test]
    fn test_payload_point_without_radius_uses_default() {
        let payload: ProviderPayload =
            serde_json::from_value(json!({"point": {"lat": 46.0, "lon": -122.0}, "providers": {}})).unwrap();
        let point = payload.point.unwrap();
        assert_eq!(point.radius_nm, None);
        assert_eq!(point.resolve(50.0), Some(QueryPoint::new(46.0, -122.0, 50.0)));

        let payload: ProviderPayload = serde_json::from_value(json!({
            "point": {"lat": "46.0", "lon": -122.0, "radius_nm": null},
            "providers": {}
        }))
        .unwrap();
        assert_eq!(payload.point.unwrap().resolve(50.0), Some(QueryPoint::new(46.0, -122.0, 50.0)));
    }

    #[test]
    fn test_payload_point_without_coordinates_does_not_resolve() {
        let payload: ProviderPayload =
            serde_json::from_value(json!({"point": {"radius_nm": 10}, "providers": {}})).unwrap();
        assert_eq!(payload.point.unwrap().resolve(50.0), None);
    }
}
