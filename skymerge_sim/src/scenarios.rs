//! Fault scenarios for the deterministic simulation.

use serde::Serialize;

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioId {
    /// SIM-001: all providers up, feed healthy
    Nominal,

    /// SIM-002: two of three providers return nothing
    ProviderOutage,

    /// SIM-003: the least preferred providers hold the freshest reports
    StaleConflict,

    /// SIM-004: military feed down, then back
    MilitaryOutage,

    /// SIM-005: garbage rows mixed into every provider
    MalformedFeed,

    /// SIM-006: hundreds of aircraft, list mode, several cycles
    CrowdedSky,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::Nominal,
            ScenarioId::ProviderOutage,
            ScenarioId::StaleConflict,
            ScenarioId::MilitaryOutage,
            ScenarioId::MalformedFeed,
            ScenarioId::CrowdedSky,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::Nominal => "nominal",
            ScenarioId::ProviderOutage => "provider_outage",
            ScenarioId::StaleConflict => "stale_conflict",
            ScenarioId::MilitaryOutage => "military_outage",
            ScenarioId::MalformedFeed => "malformed_feed",
            ScenarioId::CrowdedSky => "crowded_sky",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::Nominal => "Three providers with noise and dropouts, verdicts match ground truth",
            ScenarioId::ProviderOutage => "Only ADSB.lol answers, every record sourced from it",
            ScenarioId::StaleConflict => "Stale ADSB.lol vs fresh FR24/OpenSky, freshness beats priority",
            ScenarioId::MilitaryOutage => "Feed down: Unknown verdicts, breaker trips, recovery next cycle",
            ScenarioId::MalformedFeed => "Rows without or with bad hexes are dropped and counted",
            ScenarioId::CrowdedSky => "300 aircraft over three cycles, one list fetch, correct nearest",
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "nominal" | "sim-001" => Ok(ScenarioId::Nominal),
            "provider_outage" | "provideroutage" | "sim-002" => Ok(ScenarioId::ProviderOutage),
            "stale_conflict" | "staleconflict" | "sim-003" => Ok(ScenarioId::StaleConflict),
            "military_outage" | "militaryoutage" | "sim-004" => Ok(ScenarioId::MilitaryOutage),
            "malformed_feed" | "malformedfeed" | "sim-005" => Ok(ScenarioId::MalformedFeed),
            "crowded_sky" | "crowdedsky" | "sim-006" => Ok(ScenarioId::CrowdedSky),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip_through_from_str() {
        for scenario in ScenarioId::all() {
            assert_eq!(scenario.name().parse::<ScenarioId>(), Ok(scenario));
            assert!(!scenario.description().is_empty());
        }
    }

    #[test]
    fn test_aliases() {
        assert_eq!("SIM-004".parse::<ScenarioId>(), Ok(ScenarioId::MilitaryOutage));
        assert_eq!("CrowdedSky".parse::<ScenarioId>(), Ok(ScenarioId::CrowdedSky));
        assert!("time_warp".parse::<ScenarioId>().is_err());
    }
}
