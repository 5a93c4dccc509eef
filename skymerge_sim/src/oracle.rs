//! Ground truth oracle for simulation.
//!
//! The Oracle maintains the "God's eye view" of the simulated sky:
//! - True state of every aircraft (position, kinematics, identity, military)
//! - Simple great-circle dead reckoning between cycles
//! - Provider report generation, each in its own native units and shape,
//!   with position noise, random report ages and dropouts

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use serde::Serialize;
use serde_json::{json, Value};
use skymerge_core::canonical::{M_TO_FT, MPS_TO_FPM, MPS_TO_KT};
use skymerge_core::catalog::{AircraftTypeEntry, AirlineEntry};
use skymerge_core::observation::ProviderRows;
use skymerge_core::{Catalogs, Provider, ProviderPayload, QueryPoint, RawObservation};
use std::collections::{BTreeMap, BTreeSet};

/// Type, operator ICAO, operator IATA, military.
pub const FLEET: &[(&str, Option<&str>, Option<&str>, bool)] = &[
    ("E75L", Some("QXE"), Some("QX"), false),
    ("B738", Some("ASA"), Some("AS"), false),
    ("A320", Some("UAL"), Some("UA"), false),
    ("B38M", Some("SWA"), Some("WN"), false),
    ("A21N", Some("AAL"), Some("AA"), false),
    ("C172", None, None, false),
    ("PC12", None, None, false),
    ("BE58", None, None, false),
    ("C30J", None, None, true),
    ("K35R", None, None, true),
];

/// Type, name, seats.
const FLEET_TYPES: &[(&str, &str, u32)] = &[
    ("E75L", "Embraer 175", 76),
    ("B738", "Boeing 737-800", 175),
    ("A320", "Airbus A320", 150),
    ("B38M", "Boeing 737 MAX 8", 172),
    ("A21N", "Airbus A321neo", 196),
    ("C172", "Cessna 172", 4),
    ("PC12", "Pilatus PC-12", 9),
    ("BE58", "Beechcraft Baron", 6),
    ("C30J", "Lockheed C-130J", 92),
    ("K35R", "Boeing KC-135R", 37),
];

const AIRLINES: &[(&str, &str, &str)] = &[
    ("QXE", "QX", "Horizon Air"),
    ("ASA", "AS", "Alaska Airlines"),
    ("UAL", "UA", "United Airlines"),
    ("SWA", "WN", "Southwest Airlines"),
    ("AAL", "AA", "American Airlines"),
];

const AIRPORTS: &[&str] = &["SEA", "PDX", "GEG", "BOI", "SFO", "LAX", "SLC", "DEN"];

const MILITARY_CALLSIGNS: &[&str] = &["RCH", "REACH", "PAT", "TOPCAT", "SHELL"];

/// A ground truth aircraft in the simulation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroundTruthAircraft {
    /// Upper-cased ICAO 24-bit address
    pub hex: String,

    pub latitude: f64,
    pub longitude: f64,
    pub altitude_ft: f64,
    pub ground_speed_kt: f64,
    pub track_deg: f64,
    pub vertical_rate_fpm: f64,
    pub squawk: String,

    pub registration: String,
    pub aircraft_type: String,
    pub callsign: String,
    pub flight_no: Option<String>,
    pub airline_icao: Option<String>,
    pub origin_iata: Option<String>,
    pub destination_iata: Option<String>,
    pub origin_country: String,

    pub military: bool,
}

impl GroundTruthAircraft {
    /// Moves the aircraft along its track for `dt` seconds.
    pub fn advance(&mut self, dt: f64) {
        let distance_deg = self.ground_speed_kt * dt / 3600.0 / 60.0;
        let track = self.track_deg.to_radians();
        self.latitude = (self.latitude + distance_deg * track.cos()).clamp(-89.9, 89.9);
        let lon_scale = self.latitude.to_radians().cos().max(0.01);
        self.longitude += distance_deg * track.sin() / lon_scale;
        if self.longitude > 180.0 {
            self.longitude -= 360.0;
        } else if self.longitude < -180.0 {
            self.longitude += 360.0;
        }
        self.altitude_ft = (self.altitude_ft + self.vertical_rate_fpm * dt / 60.0).max(0.0);
    }
}

/// The Oracle - maintains ground truth and generates provider reports.
pub struct Oracle {
    /// Master seed (separate from the context seed)
    physics_seed: u64,

    /// RNG for noise, ages, dropouts and spawning
    physics_rng: ChaCha8Rng,

    /// All ground truth aircraft, ordered by hex
    aircraft: BTreeMap<String, GroundTruthAircraft>,

    /// Centre of the simulated sky
    center: QueryPoint,

    /// Position noise standard deviation (degrees)
    position_noise_deg: f64,

    /// Probability that a provider misses an aircraft in a cycle
    dropout_rate: f64,

    /// Providers currently returning nothing
    offline: BTreeSet<Provider>,

    /// Whether ADSB.lol reports carry `dbFlags`
    report_db_flags: bool,
}

impl Oracle {
    /// Creates a new Oracle with the given physics seed around `center`.
    pub fn new(physics_seed: u64, center: QueryPoint) -> Self {
        Self {
            physics_seed,
            physics_rng: ChaCha8Rng::seed_from_u64(physics_seed),
            aircraft: BTreeMap::new(),
            center,
            position_noise_deg: 0.0005, // ~50 m
            dropout_rate: 0.1,
            offline: BTreeSet::new(),
            report_db_flags: true,
        }
    }

    pub fn physics_seed(&self) -> u64 {
        self.physics_seed
    }

    pub fn center(&self) -> QueryPoint {
        self.center
    }

    /// Sets the position noise standard deviation in degrees.
    pub fn set_position_noise(&mut self, std_dev_deg: f64) {
        self.position_noise_deg = std_dev_deg.max(0.0);
    }

    pub fn set_dropout_rate(&mut self, rate: f64) {
        self.dropout_rate = rate.clamp(0.0, 1.0);
    }

    /// Takes a provider offline (no reports at all) or back online.
    pub fn set_offline(&mut self, provider: Provider, offline: bool) {
        if offline {
            self.offline.insert(provider);
        } else {
            self.offline.remove(&provider);
        }
    }

    pub fn set_report_db_flags(&mut self, report: bool) {
        self.report_db_flags = report;
    }

    /// Adds an aircraft, replacing any with the same hex.
    pub fn spawn(&mut self, aircraft: GroundTruthAircraft) {
        self.aircraft.insert(aircraft.hex.clone(), aircraft);
    }

    /// Spawns `count` random aircraft within about 60 nm of the centre and
    /// returns their hexes.
    pub fn spawn_random(&mut self, count: usize) -> Vec<String> {
        (0..count).map(|_| self.spawn_one()).collect()
    }

    fn unique_hex(&mut self, military: bool) -> String {
        loop {
            let hex = if military {
                format!("AE{:04X}", self.physics_rng.gen_range(0..0x8000u32))
            } else {
                format!("{:06X}", self.physics_rng.gen_range(0xA0_0000u32..0xAD_FFFF))
            };
            if !self.aircraft.contains_key(&hex) {
                return hex;
            }
        }
    }

    fn spawn_one(&mut self) -> String {
        let rng = &mut self.physics_rng;
        let &(aircraft_type, airline_icao, airline_iata, military) =
            FLEET.choose(rng).unwrap_or(&FLEET[0]);
        let is_airliner = airline_icao.is_some();

        let latitude = self.center.lat + rng.gen_range(-1.0..1.0);
        let longitude = self.center.lon + rng.gen_range(-1.4..1.4);
        let altitude_ft = if is_airliner {
            rng.gen_range(8_000.0..38_000.0_f64).round()
        } else {
            rng.gen_range(2_000.0..14_000.0_f64).round()
        };
        let ground_speed_kt = if is_airliner {
            rng.gen_range(250.0..480.0_f64).round()
        } else {
            rng.gen_range(90.0..300.0_f64).round()
        };
        let track_deg = rng.gen_range(0.0..360.0_f64).round();
        let vertical_rate_fpm = (rng.gen_range(-1_500.0..1_500.0_f64) / 64.0).round() * 64.0;
        let squawk = format!("{:04o}", rng.gen_range(0o1000..0o7000u32));
        let number: u32 = rng.gen_range(100..9_999);

        let (registration, callsign, flight_no) = match (airline_icao, airline_iata) {
            (Some(icao), Some(iata)) => (
                format!("N{}{}", rng.gen_range(100..999), ["SY", "AS", "UA", "WN"].choose(rng).unwrap_or(&"SY")),
                format!("{}{}", icao, number),
                Some(format!("{}{}", iata, number)),
            ),
            _ if military => (
                format!("{:02}-{:04}", rng.gen_range(0..25), rng.gen_range(0..9_999)),
                format!("{}{}", MILITARY_CALLSIGNS.choose(rng).unwrap_or(&"RCH"), rng.gen_range(1..99)),
                None,
            ),
            _ => {
                let reg = format!("N{}", rng.gen_range(100..99_999));
                (reg.clone(), reg, None)
            }
        };

        let (origin_iata, destination_iata) = if is_airliner {
            let mut pair: Vec<&str> = AIRPORTS.choose_multiple(rng, 2).copied().collect();
            let destination = pair.pop().map(str::to_string);
            (pair.pop().map(str::to_string), destination)
        } else {
            (None, None)
        };

        let hex = self.unique_hex(military);
        self.spawn(GroundTruthAircraft {
            hex: hex.clone(),
            latitude,
            longitude,
            altitude_ft,
            ground_speed_kt,
            track_deg,
            vertical_rate_fpm,
            squawk,
            registration,
            aircraft_type: aircraft_type.to_string(),
            callsign,
            flight_no,
            airline_icao: airline_icao.map(str::to_string),
            origin_iata,
            destination_iata,
            origin_country: "United States".to_string(),
            military,
        });
        hex
    }

    /// Advances every aircraft by `dt` seconds.
    pub fn step(&mut self, dt: f64) {
        for aircraft in self.aircraft.values_mut() {
            aircraft.advance(dt);
        }
    }

    pub fn aircraft(&self, hex: &str) -> Option<&GroundTruthAircraft> {
        self.aircraft.get(hex)
    }

    /// All aircraft, ordered by hex.
    pub fn all_aircraft(&self) -> impl Iterator<Item = &GroundTruthAircraft> {
        self.aircraft.values()
    }

    pub fn len(&self) -> usize {
        self.aircraft.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aircraft.is_empty()
    }

    pub fn military_hexes(&self) -> BTreeSet<String> {
        self.aircraft
            .values()
            .filter(|a| a.military)
            .map(|a| a.hex.clone())
            .collect()
    }

    // ========================================================================
    // REPORT GENERATION
    // ========================================================================

    /// Report age in seconds a provider would typically show.
    fn sample_age(&mut self, provider: Provider) -> f64 {
        match provider {
            // seen, tenths of a second
            Provider::AdsbLol => (self.physics_rng.gen_range(0.0..10.0_f64) * 10.0).round() / 10.0,
            Provider::Fr24 => self.physics_rng.gen_range(2..30) as f64,
            Provider::OpenSky => self.physics_rng.gen_range(5..60) as f64,
        }
    }

    fn noisy_position(&mut self, a: &GroundTruthAircraft) -> (f64, f64) {
        let round5 = |v: f64| (v * 100_000.0).round() / 100_000.0;
        match Normal::new(0.0, self.position_noise_deg) {
            Ok(noise) => (
                round5(a.latitude + noise.sample(&mut self.physics_rng)),
                round5(a.longitude + noise.sample(&mut self.physics_rng)),
            ),
            Err(_) => (round5(a.latitude), round5(a.longitude)),
        }
    }

    /// One provider-native report of `a`, `age` seconds old at `now`.
    pub fn provider_row(&self, a: &GroundTruthAircraft, provider: Provider, now: f64, age: f64, position: (f64, f64)) -> Value {
        let (lat, lon) = position;
        match provider {
            // /states/all state vector: metres, m/s
            Provider::OpenSky => {
                let altitude_m = a.altitude_ft / M_TO_FT;
                json!([
                    a.hex.to_ascii_lowercase(),
                    format!("{:<8}", a.callsign),
                    a.origin_country,
                    now - age,
                    now - age,
                    lon,
                    lat,
                    altitude_m,
                    false,
                    a.ground_speed_kt / MPS_TO_KT,
                    a.track_deg,
                    a.vertical_rate_fpm / MPS_TO_FPM,
                    null,
                    altitude_m,
                    a.squawk,
                    false,
                    0
                ])
            }
            // /v2/point aircraft: feet, knots, ft/min
            Provider::AdsbLol => {
                let mut row = json!({
                    "hex": a.hex.to_ascii_lowercase(),
                    "flight": format!("{:<8}", a.callsign),
                    "r": a.registration,
                    "t": a.aircraft_type,
                    "lat": lat,
                    "lon": lon,
                    "alt_baro": a.altitude_ft.round() as i64,
                    "gs": a.ground_speed_kt,
                    "track": a.track_deg,
                    "baro_rate": a.vertical_rate_fpm,
                    "squawk": a.squawk,
                    "seen": age,
                });
                if self.report_db_flags {
                    row["dbFlags"] = json!(if a.military { 1 } else { 0 });
                }
                row
            }
            // feed.js flight, already named
            Provider::Fr24 => json!({
                "hex": a.hex,
                "lat": lat,
                "lon": lon,
                "trk": a.track_deg,
                "alt_ft": a.altitude_ft.round() as i64,
                "gs_kt": a.ground_speed_kt,
                "squawk": a.squawk,
                "type": a.aircraft_type,
                "reg": a.registration,
                "timestamp": now - age,
                "from_iata": a.origin_iata,
                "to_iata": a.destination_iata,
                "flight": a.flight_no,
                "on_ground": 0,
                "vs_fpm": a.vertical_rate_fpm,
                "callsign": a.callsign,
                "airline_icao": a.airline_icao,
            }),
        }
    }

    /// Generates one cycle of provider rows at `now`.
    ///
    /// Offline providers return nothing; online ones miss each aircraft
    /// with the configured dropout rate.
    pub fn generate_rows(&mut self, now: f64) -> ProviderRows {
        let mut rows = ProviderRows::default();
        let snapshot: Vec<GroundTruthAircraft> = self.aircraft.values().cloned().collect();
        for a in &snapshot {
            for provider in [Provider::OpenSky, Provider::AdsbLol, Provider::Fr24] {
                if self.offline.contains(&provider) {
                    continue;
                }
                if self.physics_rng.gen_bool(self.dropout_rate) {
                    continue;
                }
                let age = self.sample_age(provider);
                let position = self.noisy_position(a);
                let row = self.provider_row(a, provider, now, age, position);
                match provider {
                    Provider::OpenSky => rows.opensky.push(row),
                    Provider::AdsbLol => rows.adsb_lol.push(row),
                    Provider::Fr24 => rows.fr24.push(row),
                }
            }
        }
        rows
    }

    /// Generates one cycle as a payload, the shape the CLI reads.
    pub fn generate_payload(&mut self, now: f64) -> ProviderPayload {
        ProviderPayload {
            timestamp: Some(now),
            point: Some(self.center.into()),
            providers: self.generate_rows(now),
        }
    }

    /// Generates one cycle of decoded observations.
    pub fn generate_observations(&mut self, now: f64) -> Vec<RawObservation> {
        self.generate_payload(now).observations()
    }
}

/// Catalogs covering every type and operator the oracle spawns.
pub fn fleet_catalogs() -> Catalogs {
    let catalogs = FLEET_TYPES.iter().fold(Catalogs::empty(), |c, &(icao, name, seats)| {
        c.with_aircraft(AircraftTypeEntry {
            icao: Some(icao.to_string()),
            name: Some(name.to_string()),
            seats: Some(seats),
            ..Default::default()
        })
    });
    AIRLINES.iter().fold(catalogs, |c, &(icao, iata, name)| {
        c.with_airline(AirlineEntry {
            icao: Some(icao.to_string()),
            iata: Some(iata.to_string()),
            name: Some(name.to_string()),
            ..Default::default()
        })
    })
}

/// Serializes a payload in the JSON shape `ProviderPayload` reads.
pub fn payload_to_json(payload: &ProviderPayload) -> Value {
    json!({
        "timestamp": payload.timestamp,
        "point": payload.point,
        "providers": {
            "opensky": payload.providers.opensky,
            "adsb_lol": payload.providers.adsb_lol,
            "fr24": payload.providers.fr24,
        }
    })
}
