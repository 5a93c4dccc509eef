//! The Enrichment Joiner: catalog lookups, capacity and final classification.

use crate::canonical::Telemetry;
use crate::catalog::{AirportEntry, Catalogs};
use crate::geospatial::{distance_nm, round_to};
use crate::identity::{is_flight_number, ResolvedIdentity};
use crate::military::MilitaryStatus;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// LOOKUP RESULTS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupStatus {
    Found,
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AircraftLookup {
    pub icao: String,
    /// Catalog name, else model, else the raw code
    pub name: String,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub seats_max: Option<u32>,
    pub iata_aliases: Vec<String>,
    pub lookup_status: LookupStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AirlineLookup {
    pub icao: Option<String>,
    pub iata: Option<String>,
    pub name: Option<String>,
    pub callsign: Option<String>,
    pub country_code: Option<String>,
    pub country_name: Option<String>,
    pub lookup_status: LookupStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AirportLookup {
    pub iata: String,
    pub name: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub country_code: Option<String>,
    pub country_name: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub elevation_ft: Option<f64>,
    pub lookup_status: LookupStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Lookups {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aircraft: Option<AircraftLookup>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub airline: Option<AirlineLookup>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin_airport: Option<AirportLookup>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_airport: Option<AirportLookup>,
}

impl Lookups {
    pub fn is_empty(&self) -> bool {
        self.aircraft.is_none()
            && self.airline.is_none()
            && self.origin_airport.is_none()
            && self.destination_airport.is_none()
    }
}

// ============================================================================
// CAPACITY & CLASSIFICATION
// ============================================================================

/// Maximum souls on board.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capacity {
    pub max: Option<u32>,
    pub is_estimate: bool,
}

impl Capacity {
    /// The number, or `"N/A"` when unknown.
    pub fn text(&self) -> String {
        self.max.map_or_else(|| "N/A".to_string(), |n| n.to_string())
    }
}

/// Seat ceiling by ICAO type family when the catalog has no seat count.
pub fn estimate_seat_max(icao_type: &str) -> Option<u32> {
    let t = icao_type.trim().to_ascii_uppercase();
    let starts = |prefixes: &[&str]| prefixes.iter().any(|p| t.starts_with(p));

    // Exact designators first so they are not shadowed by family prefixes
    let exact = match t.as_str() {
        "B350" => Some(11),
        "PRM1" => Some(6),
        "GALX" => Some(10),
        "MU30" => Some(8),
        "H25A" | "H25B" | "H25C" => Some(8),
        "FA10" => Some(8),
        "FA20" => Some(12),
        "FA8X" => Some(19),
        "C120" | "C140" => Some(2),
        "C180" => Some(4),
        "C185" => Some(6),
        "C188" => Some(1),
        "C195" => Some(5),
        "C210" => Some(6),
        "C310" => Some(6),
        _ => None,
    };
    if exact.is_some() {
        return exact;
    }

    if starts(&["A31", "A32"]) {
        Some(244)
    } else if starts(&["B70", "B72"]) {
        Some(189)
    } else if starts(&["B73"]) {
        Some(230)
    } else if starts(&["B78"]) {
        Some(330)
    } else if starts(&["E17", "E19", "E29", "E75"]) {
        Some(146)
    } else if starts(&["CRJ"]) {
        Some(104)
    } else if starts(&["AT4", "AT7"]) {
        Some(78)
    } else if starts(&["DH8"]) {
        Some(90)
    } else if starts(&["DH2"]) {
        Some(7)
    } else if starts(&["TISB"]) {
        Some(6)
    } else if starts(&["BE33", "BE35", "BE36"]) {
        Some(4)
    } else if starts(&["BE55", "BE56", "BE58"]) {
        Some(6)
    } else if starts(&["BE76", "BE77", "BE80", "BE95"]) {
        Some(4)
    } else if starts(&["BE9", "BE10"]) {
        Some(9)
    } else if starts(&["LJ"]) {
        Some(9)
    } else if starts(&["C17", "C15", "C19"]) {
        Some(4)
    } else {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Classification {
    Military,
    Private,
    Commercial,
}

impl Classification {
    /// Military overrides everything; small capacity is Private; anything
    /// else, including unknown capacity, is Commercial.
    pub fn decide(status: MilitaryStatus, capacity: Capacity, private_seat_threshold: u32) -> Self {
        if status.is_military() {
            Classification::Military
        } else if capacity.max.is_some_and(|seats| seats <= private_seat_threshold) {
            Classification::Private
        } else {
            Classification::Commercial
        }
    }

    /// Military and Commercial traffic is worth surfacing; private GA is not.
    pub fn is_of_interest(&self) -> bool {
        !matches!(self, Classification::Private)
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Classification::Military => "Military",
            Classification::Private => "Private",
            Classification::Commercial => "Commercial",
        })
    }
}

// ============================================================================
// SCOPE
// ============================================================================

/// Which aircraft receive catalog lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrichmentScope {
    #[default]
    All,
    WithinRadius,
}

impl FromStr for EnrichmentScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "all" => Ok(EnrichmentScope::All),
            "within_radius" | "in_radius" => Ok(EnrichmentScope::WithinRadius),
            other => Err(format!("Unknown enrichment scope: {}", other)),
        }
    }
}

// ============================================================================
// JOINER
// ============================================================================

/// Remaining distance and time to the destination airport.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Eta {
    /// Rounded to 3 decimals
    pub remaining_nm: f64,
    /// Rounded to 1 decimal
    pub eta_min: f64,
}

/// Everything the joiner adds to one aircraft.
#[derive(Debug, Clone, PartialEq)]
pub struct Enrichment {
    pub lookups: Lookups,
    pub capacity: Capacity,
    pub classification: Classification,
    pub eta: Option<Eta>,
}

pub struct EnrichmentJoiner {
    catalogs: Catalogs,
    scope: EnrichmentScope,
    private_seat_threshold: u32,
}

impl EnrichmentJoiner {
    pub fn new(catalogs: Catalogs, scope: EnrichmentScope, private_seat_threshold: u32) -> Self {
        Self {
            catalogs,
            scope,
            private_seat_threshold,
        }
    }

    pub fn enrich(
        &self,
        identity: &ResolvedIdentity,
        telemetry: &Telemetry,
        within_radius: Option<bool>,
        status: MilitaryStatus,
    ) -> Enrichment {
        let in_scope = match self.scope {
            EnrichmentScope::All => true,
            EnrichmentScope::WithinRadius => within_radius == Some(true),
        };

        let mut lookups = Lookups::default();
        if in_scope {
            lookups.aircraft = identity.aircraft_type.as_deref().map(|t| self.aircraft(t));
            lookups.airline = self.airline(identity);
            lookups.origin_airport = identity.origin_iata.as_deref().map(|i| self.airport(i));
            lookups.destination_airport = identity.destination_iata.as_deref().map(|i| self.airport(i));
        }

        // Capacity reads the catalog even when lookups are out of scope, so
        // classification does not depend on the scope setting
        let catalog_seats = identity
            .aircraft_type
            .as_deref()
            .and_then(|t| self.catalogs.aircraft(t))
            .and_then(|entry| entry.seats)
            .filter(|s| *s > 0);
        let capacity = match catalog_seats {
            Some(seats) => Capacity {
                max: Some(seats),
                is_estimate: false,
            },
            None => Capacity {
                max: identity.aircraft_type.as_deref().and_then(estimate_seat_max),
                is_estimate: true,
            },
        };
        let capacity = Capacity {
            is_estimate: capacity.is_estimate && capacity.max.is_some(),
            ..capacity
        };

        let classification = Classification::decide(status, capacity, self.private_seat_threshold);
        let eta = self.eta(identity, telemetry);

        Enrichment {
            lookups,
            capacity,
            classification,
            eta,
        }
    }

    fn aircraft(&self, icao_type: &str) -> AircraftLookup {
        match self.catalogs.aircraft(icao_type) {
            Some(entry) => AircraftLookup {
                icao: icao_type.to_string(),
                name: entry
                    .name
                    .clone()
                    .or_else(|| entry.model.clone())
                    .unwrap_or_else(|| icao_type.to_string()),
                manufacturer: entry.manufacturer.clone(),
                model: entry.model.clone(),
                seats_max: entry.seats,
                iata_aliases: entry.iata.clone(),
                lookup_status: LookupStatus::Found,
            },
            None => AircraftLookup {
                icao: icao_type.to_string(),
                name: icao_type.to_string(),
                manufacturer: None,
                model: None,
                seats_max: None,
                iata_aliases: Vec::new(),
                lookup_status: LookupStatus::NotFound,
            },
        }
    }

    fn airline(&self, identity: &ResolvedIdentity) -> Option<AirlineLookup> {
        let explicit = identity.airline_icao.as_deref();
        let entry = explicit
            .and_then(|icao| self.catalogs.airline_by_icao(icao))
            .or_else(|| {
                identity
                    .flight_no
                    .as_deref()
                    .and_then(|f| self.airline_from_flight_no(f))
            });

        match (entry, explicit) {
            (Some(a), _) => Some(AirlineLookup {
                icao: a.icao.clone(),
                iata: a.iata.clone(),
                name: a.name.clone(),
                callsign: a.callsign.clone(),
                country_code: a.country_code.clone(),
                country_name: a
                    .country_name
                    .clone()
                    .or_else(|| self.country_for(a.country_code.as_deref())),
                lookup_status: LookupStatus::Found,
            }),
            (None, Some(code)) => Some(AirlineLookup {
                icao: Some(code.to_string()),
                iata: None,
                name: Some(code.to_string()),
                callsign: None,
                country_code: None,
                country_name: None,
                lookup_status: LookupStatus::NotFound,
            }),
            (None, None) => None,
        }
    }

    /// Airline from a flight number's designator: 2-char IATA prefix first,
    /// then a 3-char prefix as IATA or ICAO.
    fn airline_from_flight_no(&self, flight_no: &str) -> Option<&crate::catalog::AirlineEntry> {
        let f = flight_no.trim();
        if !is_flight_number(f) {
            return None;
        }
        let prefix2 = f.get(..2)?;
        self.catalogs.airline_by_iata(prefix2).or_else(|| {
            let prefix3 = f.get(..3)?;
            self.catalogs
                .airline_by_iata(prefix3)
                .or_else(|| self.catalogs.airline_by_icao(prefix3))
        })
    }

    fn country_for(&self, code: Option<&str>) -> Option<String> {
        code.and_then(|c| self.catalogs.country_name(c)).map(str::to_string)
    }

    fn airport(&self, iata: &str) -> AirportLookup {
        match self.catalogs.airport(iata) {
            Some(a) => self.airport_found(iata, a),
            None => AirportLookup {
                iata: iata.to_string(),
                name: Some(iata.to_string()),
                city: None,
                region: None,
                country_code: None,
                country_name: None,
                lat: None,
                lon: None,
                elevation_ft: None,
                lookup_status: LookupStatus::NotFound,
            },
        }
    }

    fn airport_found(&self, iata: &str, a: &AirportEntry) -> AirportLookup {
        AirportLookup {
            iata: a.iata.clone().unwrap_or_else(|| iata.to_string()),
            name: a.name.clone(),
            city: a.city.clone(),
            region: a.region.clone(),
            country_code: a.country_code.clone(),
            country_name: a
                .country_name
                .clone()
                .or_else(|| self.country_for(a.country_code.as_deref())),
            lat: a.lat,
            lon: a.lon,
            elevation_ft: a.elevation_ft,
            lookup_status: LookupStatus::Found,
        }
    }

    fn eta(&self, identity: &ResolvedIdentity, telemetry: &Telemetry) -> Option<Eta> {
        let (lat, lon) = (telemetry.latitude?, telemetry.longitude?);
        let gs = telemetry.ground_speed_kt.filter(|g| *g > 0)?;
        let dest = self.catalogs.airport(identity.destination_iata.as_deref()?)?;
        let remaining = distance_nm(lat, lon, dest.lat?, dest.lon?);
        Some(Eta {
            remaining_nm: round_to(remaining, 3),
            eta_min: round_to(remaining / gs as f64 * 60.0, 1),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{AircraftTypeEntry, AirlineEntry, CountryEntry};
    use approx::assert_relative_eq;

    fn catalogs() -> Catalogs {
        Catalogs::empty()
            .with_aircraft(AircraftTypeEntry {
                icao: Some("E75L".into()),
                name: Some("Embraer 175".into()),
                manufacturer: Some("Embraer".into()),
                seats: Some(88),
                ..Default::default()
            })
            .with_aircraft(AircraftTypeEntry {
                icao: Some("B738".into()),
                model: Some("737-800".into()),
                ..Default::default()
            })
            .with_airline(AirlineEntry {
                icao: Some("ASA".into()),
                iata: Some("AS".into()),
                name: Some("Alaska Airlines".into()),
                country_code: Some("US".into()),
                ..Default::default()
            })
            .with_airport(AirportEntry {
                iata: Some("PDX".into()),
                name: Some("Portland International".into()),
                country_code: Some("US".into()),
                lat: Some(45.5887),
                lon: Some(-122.5975),
                ..Default::default()
            })
            .with_country(CountryEntry {
                code: Some("US".into()),
                name: Some("United States".into()),
            })
    }

    fn joiner() -> EnrichmentJoiner {
        EnrichmentJoiner::new(catalogs(), EnrichmentScope::All, 8)
    }

    fn identity(aircraft_type: &str) -> ResolvedIdentity {
        ResolvedIdentity {
            aircraft_type: Some(aircraft_type.into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_seat_heuristics() {
        assert_eq!(estimate_seat_max("A320"), Some(244));
        assert_eq!(estimate_seat_max("B738"), Some(230));
        assert_eq!(estimate_seat_max("C172"), Some(4));
        assert_eq!(estimate_seat_max("C195"), Some(5));
        assert_eq!(estimate_seat_max("B350"), Some(11));
        assert_eq!(estimate_seat_max("be58"), Some(6));
        assert_eq!(estimate_seat_max("ZZZZ"), None);
    }

    #[test]
    fn test_classification_rule() {
        let four = Capacity { max: Some(4), is_estimate: true };
        let big = Capacity { max: Some(180), is_estimate: false };
        assert_eq!(Classification::decide(MilitaryStatus::False, four, 8), Classification::Private);
        assert_eq!(Classification::decide(MilitaryStatus::Unknown, big, 8), Classification::Commercial);
        assert_eq!(Classification::decide(MilitaryStatus::True, four, 8), Classification::Military);
        assert_eq!(
            Classification::decide(MilitaryStatus::False, Capacity::default(), 8),
            Classification::Commercial
        );
    }

    #[test]
    fn test_catalog_seats_beat_heuristic() {
        let e = joiner().enrich(&identity("E75L"), &Telemetry::default(), None, MilitaryStatus::False);
        assert_eq!(e.capacity, Capacity { max: Some(88), is_estimate: false });
        assert_eq!(e.capacity.text(), "88");
        let aircraft = e.lookups.aircraft.unwrap();
        assert_eq!(aircraft.lookup_status, LookupStatus::Found);
        assert_eq!(aircraft.name, "Embraer 175");
        assert_eq!(e.classification, Classification::Commercial);
    }

    #[test]
    fn test_found_without_seats_uses_heuristic() {
        let e = joiner().enrich(&identity("B738"), &Telemetry::default(), None, MilitaryStatus::Unknown);
        assert_eq!(e.lookups.aircraft.as_ref().unwrap().name, "737-800");
        assert_eq!(e.capacity, Capacity { max: Some(230), is_estimate: true });
    }

    #[test]
    fn test_unknown_type_is_not_found_with_code() {
        let e = joiner().enrich(&identity("C172"), &Telemetry::default(), None, MilitaryStatus::False);
        let aircraft = e.lookups.aircraft.unwrap();
        assert_eq!(aircraft.lookup_status, LookupStatus::NotFound);
        assert_eq!(aircraft.name, "C172");
        assert_eq!(e.capacity.max, Some(4));
        assert_eq!(e.classification, Classification::Private);

        let e = joiner().enrich(&identity("ZZZZ"), &Telemetry::default(), None, MilitaryStatus::False);
        assert_eq!(e.capacity.text(), "N/A");
        assert!(!e.capacity.is_estimate);
    }

    #[test]
    fn test_airline_from_flight_number_and_explicit_miss() {
        let id = ResolvedIdentity {
            flight_no: Some("AS2290".into()),
            ..Default::default()
        };
        let e = joiner().enrich(&id, &Telemetry::default(), None, MilitaryStatus::Unknown);
        let airline = e.lookups.airline.unwrap();
        assert_eq!(airline.icao.as_deref(), Some("ASA"));
        assert_eq!(airline.country_name.as_deref(), Some("United States"));

        let id = ResolvedIdentity {
            airline_icao: Some("QXE".into()),
            ..Default::default()
        };
        let e = joiner().enrich(&id, &Telemetry::default(), None, MilitaryStatus::Unknown);
        let airline = e.lookups.airline.unwrap();
        assert_eq!(airline.lookup_status, LookupStatus::NotFound);
        assert_eq!(airline.name.as_deref(), Some("QXE"));
    }

    #[test]
    fn test_airports_and_eta() {
        let id = ResolvedIdentity {
            origin_iata: Some("SEA".into()),
            destination_iata: Some("PDX".into()),
            ..Default::default()
        };
        let telemetry = Telemetry {
            latitude: Some(46.5887),
            longitude: Some(-122.5975),
            ground_speed_kt: Some(300),
            ..Default::default()
        };
        let e = joiner().enrich(&id, &telemetry, Some(true), MilitaryStatus::False);

        let origin = e.lookups.origin_airport.unwrap();
        assert_eq!(origin.lookup_status, LookupStatus::NotFound);
        assert_eq!(origin.name.as_deref(), Some("SEA"));

        let dest = e.lookups.destination_airport.unwrap();
        assert_eq!(dest.country_name.as_deref(), Some("United States"));

        let eta = e.eta.unwrap();
        assert_relative_eq!(eta.remaining_nm, 60.04, epsilon = 0.01);
        assert_relative_eq!(eta.eta_min, 12.0, epsilon = 0.05);
    }

    #[test]
    fn test_within_radius_scope_skips_lookups_outside() {
        let j = EnrichmentJoiner::new(catalogs(), EnrichmentScope::WithinRadius, 8);
        let e = j.enrich(&identity("E75L"), &Telemetry::default(), Some(false), MilitaryStatus::False);
        assert!(e.lookups.is_empty());
        let outside = (e.capacity, e.classification);

        let e = j.enrich(&identity("E75L"), &Telemetry::default(), Some(true), MilitaryStatus::False);
        assert!(e.lookups.aircraft.is_some());
        assert_eq!((e.capacity, e.classification), outside);
    }

    #[test]
    fn test_out_of_scope_capacity_comes_from_catalog() {
        let j = EnrichmentJoiner::new(catalogs(), EnrichmentScope::WithinRadius, 8);
        let e = j.enrich(&identity("E75L"), &Telemetry::default(), Some(false), MilitaryStatus::False);
        assert_eq!(e.capacity, Capacity { max: Some(88), is_estimate: false });
        assert_eq!(e.classification, Classification::Commercial);

        // Types missing from the catalog still fall back to the heuristic
        let e = j.enrich(&identity("C172"), &Telemetry::default(), Some(false), MilitaryStatus::False);
        assert!(e.capacity.is_estimate);
    }

    #[test]
    fn test_scope_parsing() {
        assert_eq!("within-radius".parse::<EnrichmentScope>().unwrap(), EnrichmentScope::WithinRadius);
        assert_eq!("ALL".parse::<EnrichmentScope>().unwrap(), EnrichmentScope::All);
    }
}
