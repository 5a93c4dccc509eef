//! The Identity Resolver.
//!
//! Identity is discrete and rarely changes mid-flight, so it does not follow
//! freshness. Each field has its own provider precedence chain, chosen by which
//! provider is most reliable for that attribute.

use crate::fusion::AircraftGroup;
use crate::provider::Provider;
use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

/// Flight-number shape: 2-3 char airline designator, 1-4 digits, optional suffix.
pub const FLIGHT_NO_PATTERN: &str = r"^[A-Z0-9]{2,3}\d{1,4}[A-Z]?$";

pub(crate) fn flight_no_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(FLIGHT_NO_PATTERN).expect("flight number pattern is valid"))
}

/// Whether `s` looks like a scheduled flight number (e.g. `AS2290`).
pub fn is_flight_number(s: &str) -> bool {
    flight_no_regex().is_match(s)
}

/// Resolved identity of one aircraft.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResolvedIdentity {
    pub registration: Option<String>,
    pub aircraft_type: Option<String>,
    pub airline_icao: Option<String>,
    pub callsign: Option<String>,
    pub flight_no: Option<String>,
    pub origin_iata: Option<String>,
    pub destination_iata: Option<String>,
    pub origin_country: Option<String>,
}

/// Stateless precedence-chain resolver.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityResolver;

impl IdentityResolver {
    pub fn resolve(&self, group: &AircraftGroup) -> ResolvedIdentity {
        let field = |provider: Provider, get: fn(&crate::canonical::Identity) -> &Option<String>| {
            group.get(provider).and_then(|r| get(&r.identity).clone())
        };
        let first = |chain: &[Provider], get: fn(&crate::canonical::Identity) -> &Option<String>| {
            chain.iter().find_map(|p| field(*p, get))
        };

        let fr24_flight = field(Provider::Fr24, |i| &i.flight);
        let flight_no = fr24_flight
            .clone()
            .filter(|f| is_flight_number(f))
            .or_else(|| field(Provider::AdsbLol, |i| &i.flight))
            .or(fr24_flight);

        ResolvedIdentity {
            registration: first(&[Provider::Fr24, Provider::AdsbLol], |i| &i.registration),
            aircraft_type: first(
                &[Provider::AdsbLol, Provider::Fr24, Provider::OpenSky],
                |i| &i.aircraft_type,
            ),
            airline_icao: field(Provider::Fr24, |i| &i.airline_icao),
            callsign: first(
                &[Provider::AdsbLol, Provider::Fr24, Provider::OpenSky],
                |i| &i.callsign,
            ),
            flight_no,
            origin_iata: field(Provider::Fr24, |i| &i.origin_iata),
            destination_iata: field(Provider::Fr24, |i| &i.destination_iata),
            origin_country: field(Provider::OpenSky, |i| &i.origin_country),
        }
    }
}
