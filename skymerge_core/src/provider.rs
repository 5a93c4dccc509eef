//! Provider identity and the static tie-break priority.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The three uncoordinated telemetry providers.
///
/// Declaration order doubles as the alphabetical order used for `sources`
/// lists in the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Provider {
    #[serde(rename = "adsb_lol")]
    AdsbLol,
    #[serde(rename = "fr24")]
    Fr24,
    #[serde(rename = "opensky")]
    OpenSky,
}

impl Provider {
    /// Wire name of the provider.
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::AdsbLol => "adsb_lol",
            Provider::Fr24 => "fr24",
            Provider::OpenSky => "opensky",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "adsb_lol" | "adsb" | "adsb.lol" => Ok(Provider::AdsbLol),
            "fr24" | "flightradar24" => Ok(Provider::Fr24),
            "opensky" => Ok(Provider::OpenSky),
            other => Err(format!("Unknown provider: {}", other)),
        }
    }
}

/// Static provider ordering used only when two ages tie exactly.
///
/// Providers missing from a configured list rank after the listed ones, in
/// default order, so every provider always has a distinct rank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderPriority {
    order: Vec<Provider>,
}

impl ProviderPriority {
    /// Default order: `adsb_lol > fr24 > opensky`.
    pub const DEFAULT_ORDER: [Provider; 3] = [Provider::AdsbLol, Provider::Fr24, Provider::OpenSky];

    /// Creates a priority from an explicit order. Duplicates are ignored.
    pub fn new(preferred: impl IntoIterator<Item = Provider>) -> Self {
        let mut order: Vec<Provider> = Vec::with_capacity(3);
        for p in preferred.into_iter().chain(Self::DEFAULT_ORDER) {
            if !order.contains(&p) {
                order.push(p);
            }
        }
        Self { order }
    }

    /// Rank of a provider; lower wins.
    pub fn rank(&self, provider: Provider) -> usize {
        self.order
            .iter()
            .position(|p| *p == provider)
            .unwrap_or(self.order.len())
    }

    /// The full order, highest priority first.
    pub fn order(&self) -> &[Provider] {
        &self.order
    }
}

impl Default for ProviderPriority {
    fn default() -> Self {
        Self::new(Self::DEFAULT_ORDER)
    }
}

impl FromStr for ProviderPriority {
    type Err = String;

    /// Parses a comma-separated list such as `"fr24,adsb_lol"`.
    /// An empty list yields the default order.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parsed = s
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(Provider::from_str)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(parsed))
    }
}

impl fmt::Display for ProviderPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.order.iter().map(Provider::as_str).collect();
        f.write_str(&names.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_priority() {
        let p = ProviderPriority::default();
        assert!(p.rank(Provider::AdsbLol) < p.rank(Provider::Fr24));
        assert!(p.rank(Provider::Fr24) < p.rank(Provider::OpenSky));
        assert_eq!(p.to_string(), "adsb_lol,fr24,opensky");
    }

    #[test]
    fn test_partial_priority_fills_in_defaults() {
        let p: ProviderPriority = "opensky".parse().unwrap();
        assert_eq!(p.order(), &[Provider::OpenSky, Provider::AdsbLol, Provider::Fr24]);
    }

    #[test]
    fn test_priority_rejects_unknown_provider() {
        assert!("adsb_lol,planefinder".parse::<ProviderPriority>().is_err());
    }

    #[test]
    fn test_provider_aliases() {
        assert_eq!("adsb".parse::<Provider>().unwrap(), Provider::AdsbLol);
        assert_eq!(" FR24 ".parse::<Provider>().unwrap(), Provider::Fr24);
    }

    #[test]
    fn test_provider_serializes_to_wire_name() {
        assert_eq!(serde_json::to_string(&Provider::AdsbLol).unwrap(), "\"adsb_lol\"");
    }
}
