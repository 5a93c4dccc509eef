//! Wire types for the external military-aircraft data source.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Result of a single per-hex military lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HexLookup {
    /// Upper-cased ICAO hex that was queried
    pub hex: String,

    /// `Some(flag)` when the source knows the airframe, `None` when it
    /// answered but had no record for it
    pub military: Option<bool>,
}

/// The global list of known-military hexes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MilitaryListing {
    /// Upper-cased member hexes
    pub hexes: BTreeSet<String>,
}

impl MilitaryListing {
    /// Builds a listing from arbitrary-case hex strings, skipping blanks.
    pub fn from_hexes<I, S>(hexes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let hexes = hexes
            .into_iter()
            .map(|h| h.as_ref().trim().to_ascii_uppercase())
            .filter(|h| !h.is_empty())
            .collect();
        Self { hexes }
    }

    /// Number of member hexes.
    pub fn len(&self) -> usize {
        self.hexes.len()
    }

    /// True when the listing has no members.
    pub fn is_empty(&self) -> bool {
        self.hexes.is_empty()
    }
}

/// One aircraft entry as returned by the ADSB.lol v2 API.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedAircraft {
    #[serde(default)]
    pub hex: Option<String>,

    /// Database flags bitfield; bit 0 marks military airframes
    #[serde(default, rename = "dbFlags", alias = "dbflags")]
    pub db_flags: Option<u32>,

    #[serde(default)]
    pub mil: Option<bool>,
}

/// Response body of `/v2/hex/{HEX}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HexResponse {
    #[serde(default, alias = "aircraft")]
    pub ac: Vec<FeedAircraft>,

    #[serde(default)]
    pub mil: Option<bool>,
}

impl HexResponse {
    /// Extracts the military flag: first aircraft's `dbFlags & 1`, then its
    /// explicit `mil`, then a top-level `mil`.
    pub fn military_flag(&self) -> Option<bool> {
        match self.ac.first() {
            Some(first) => match first.db_flags {
                Some(flags) => Some(flags & 1 == 1),
                None => first.mil,
            },
            None => self.mil,
        }
    }
}

/// Response body of `/v2/mil`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListResponse {
    #[serde(default, alias = "aircraft")]
    pub ac: Vec<FeedAircraft>,
}

impl ListResponse {
    /// Converts the response into a listing of upper-cased hexes.
    pub fn into_listing(self) -> MilitaryListing {
        MilitaryListing::from_hexes(self.ac.into_iter().filter_map(|a| a.hex))
    }
}
