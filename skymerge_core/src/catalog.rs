//! Static reference catalogs (JSON Lines).
//!
//! | file                        | key    |
//! |-----------------------------|--------|
//! | `aircraft_types_full.jsonl` | `icao` |
//! | `airlines.jsonl`            | `icao` (plus an `iata` index) |
//! | `airports.jsonl`            | `iata` |
//! | `countries.jsonl`           | `code` |
//!
//! A missing file is an empty catalog. Malformed lines are skipped.

use crate::error::CatalogError;
use crate::observation::{lenient, value_string};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

pub const AIRCRAFT_TYPES_FILE: &str = "aircraft_types_full.jsonl";
pub const AIRLINES_FILE: &str = "airlines.jsonl";
pub const AIRPORTS_FILE: &str = "airports.jsonl";
pub const COUNTRIES_FILE: &str = "countries.jsonl";

fn string_list<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::Array(items)) => items.iter().filter_map(value_string).collect(),
        Some(other) => value_string(&other).into_iter().collect(),
        None => Vec::new(),
    })
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AircraftTypeEntry {
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub icao: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub manufacturer: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub model: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_u32")]
    pub seats: Option<u32>,
    /// IATA type codes mapping to this ICAO designator
    #[serde(default, deserialize_with = "string_list")]
    pub iata: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AirlineEntry {
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub icao: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub iata: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub callsign: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub country_code: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub country_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AirportEntry {
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub iata: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub city: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub region: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub country_code: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub country_name: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub lat: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub lon: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub elevation_ft: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CountryEntry {
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub code: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub name: Option<String>,
}

/// Reads a JSONL file into a map keyed by `key`.
///
/// Returns `Ok(empty)` for a missing file. Lines that fail to parse, or whose
/// key is absent, are skipped and counted in the returned tuple.
pub fn load_jsonl<T, K>(path: &Path, key: K) -> Result<(HashMap<String, T>, usize), CatalogError>
where
    T: DeserializeOwned,
    K: Fn(&T) -> Option<&String>,
{
    let text = match fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "catalog file not present");
            return Ok((HashMap::new(), 0));
        }
        Err(source) => {
            return Err(CatalogError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let mut map = HashMap::new();
    let mut skipped = 0;
    for (idx, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<T>(line) {
            Ok(entry) => match key(&entry).cloned() {
                Some(k) => {
                    map.insert(k, entry);
                }
                None => skipped += 1,
            },
            Err(e) => {
                let err = CatalogError::MalformedLine {
                    path: path.to_path_buf(),
                    line: idx + 1,
                    reason: e.to_string(),
                };
                debug!(error = %err, "skipping catalog line");
                skipped += 1;
            }
        }
    }
    Ok((map, skipped))
}

/// All reference catalogs, loaded once per invocation.
#[derive(Debug, Clone, Default)]
pub struct Catalogs {
    aircraft: HashMap<String, AircraftTypeEntry>,
    airlines_by_icao: HashMap<String, AirlineEntry>,
    /// IATA airline code to ICAO airline code
    airlines_by_iata: HashMap<String, String>,
    airports: HashMap<String, AirportEntry>,
    countries: HashMap<String, CountryEntry>,
}

impl Catalogs {
    /// Empty catalogs: every lookup misses.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Loads all four catalogs from `dir`. Never fails; problems are logged
    /// and the affected catalog stays empty.
    pub fn load(dir: &Path) -> Self {
        fn absorb<T>(file: &str, result: Result<(HashMap<String, T>, usize), CatalogError>) -> HashMap<String, T> {
            match result {
                Ok((map, skipped)) => {
                    if skipped > 0 {
                        warn!(file, skipped, "catalog lines skipped");
                    }
                    map
                }
                Err(e) => {
                    warn!(error = %e, "catalog unavailable");
                    HashMap::new()
                }
            }
        }

        let mut catalogs = Self {
            aircraft: absorb(
                AIRCRAFT_TYPES_FILE,
                load_jsonl(&dir.join(AIRCRAFT_TYPES_FILE), |e: &AircraftTypeEntry| e.icao.as_ref()),
            ),
            airlines_by_icao: absorb(
                AIRLINES_FILE,
                load_jsonl(&dir.join(AIRLINES_FILE), |e: &AirlineEntry| e.icao.as_ref()),
            ),
            airlines_by_iata: HashMap::new(),
            airports: absorb(
                AIRPORTS_FILE,
                load_jsonl(&dir.join(AIRPORTS_FILE), |e: &AirportEntry| e.iata.as_ref()),
            ),
            countries: absorb(
                COUNTRIES_FILE,
                load_jsonl(&dir.join(COUNTRIES_FILE), |e: &CountryEntry| e.code.as_ref()),
            ),
        };
        catalogs.rebuild_iata_index();

        info!(
            aircraft = catalogs.aircraft.len(),
            airlines = catalogs.airlines_by_icao.len(),
            airports = catalogs.airports.len(),
            countries = catalogs.countries.len(),
            dir = %dir.display(),
            "catalogs loaded"
        );
        catalogs
    }

    fn rebuild_iata_index(&mut self) {
        // Sorted so a shared IATA code always resolves to the same airline
        let mut pairs: Vec<(&String, &AirlineEntry)> = self.airlines_by_icao.iter().collect();
        pairs.sort_by(|a, b| a.0.cmp(b.0));
        let mut index = HashMap::new();
        for (icao, airline) in pairs {
            if let Some(iata) = &airline.iata {
                index.entry(iata.clone()).or_insert_with(|| icao.clone());
            }
        }
        self.airlines_by_iata = index;
    }

    pub fn with_aircraft(mut self, entry: AircraftTypeEntry) -> Self {
        if let Some(k) = entry.icao.clone() {
            self.aircraft.insert(k, entry);
        }
        self
    }

    pub fn with_airline(mut self, entry: AirlineEntry) -> Self {
        if let Some(k) = entry.icao.clone() {
            self.airlines_by_icao.insert(k, entry);
            self.rebuild_iata_index();
        }
        self
    }

    pub fn with_airport(mut self, entry: AirportEntry) -> Self {
        if let Some(k) = entry.iata.clone() {
            self.airports.insert(k, entry);
        }
        self
    }

    pub fn with_country(mut self, entry: CountryEntry) -> Self {
        if let Some(k) = entry.code.clone() {
            self.countries.insert(k, entry);
        }
        self
    }

    pub fn aircraft(&self, icao: &str) -> Option<&AircraftTypeEntry> {
        self.aircraft.get(icao)
    }

    pub fn airline_by_icao(&self, icao: &str) -> Option<&AirlineEntry> {
        self.airlines_by_icao.get(icao)
    }

    pub fn airline_by_iata(&self, iata: &str) -> Option<&AirlineEntry> {
        self.airlines_by_iata
            .get(iata)
            .and_then(|icao| self.airlines_by_icao.get(icao))
    }

    pub fn airport(&self, iata: &str) -> Option<&AirportEntry> {
        self.airports.get(iata)
    }

    pub fn country_name(&self, code: &str) -> Option<&str> {
        self.countries.get(code).and_then(|c| c.name.as_deref())
    }

    pub fn is_empty(&self) -> bool {
        self.aircraft.is_empty()
            && self.airlines_by_icao.is_empty()
            && self.airports.is_empty()
            && self.countries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn temp_dir() -> PathBuf {
        static COUNTER: AtomicUsize = AtomicUsize::new(0);
        let n = COUNTER.fetch_add(1, Ordering::SeqCst);
        let dir = std::env::temp_dir().join(format!("skymerge-catalog-{}-{}", std::process::id(), n));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let catalogs = Catalogs::load(Path::new("/nonexistent/skymerge/datasets"));
        assert!(catalogs.is_empty());
    }

    #[test]
    fn test_load_skips_malformed_lines() {
        let dir = temp_dir();
        fs::write(
            dir.join(AIRCRAFT_TYPES_FILE),
            "{\"icao\":\"E75L\",\"name\":\"Embraer 175\",\"seats\":88}\n\
             not json at all\n\
             \n\
             {\"name\":\"no key\"}\n\
             {\"icao\":\"C172\",\"seats\":\"4\",\"iata\":\"CN1\"}\n",
        )
        .unwrap();

        let (map, skipped) =
            load_jsonl(&dir.join(AIRCRAFT_TYPES_FILE), |e: &AircraftTypeEntry| e.icao.as_ref()).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(skipped, 2);
        assert_eq!(map["E75L"].seats, Some(88));
        assert_eq!(map["C172"].seats, Some(4));
        assert_eq!(map["C172"].iata, vec!["CN1".to_string()]);

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_airline_iata_index() {
        let dir = temp_dir();
        fs::write(
            dir.join(AIRLINES_FILE),
            "{\"icao\":\"ASA\",\"iata\":\"AS\",\"name\":\"Alaska Airlines\"}\n\
             {\"icao\":\"QXE\",\"iata\":\"QX\",\"name\":\"Horizon Air\"}\n",
        )
        .unwrap();
        fs::write(dir.join(COUNTRIES_FILE), "{\"code\":\"US\",\"name\":\"United States\"}\n").unwrap();

        let catalogs = Catalogs::load(&dir);
        assert_eq!(catalogs.airline_by_iata("AS").unwrap().name.as_deref(), Some("Alaska Airlines"));
        assert_eq!(catalogs.airline_by_icao("QXE").unwrap().iata.as_deref(), Some("QX"));
        assert!(catalogs.airline_by_iata("ZZ").is_none());
        assert_eq!(catalogs.country_name("US"), Some("United States"));

        let _ = fs::remove_dir_all(dir);
    }
}
