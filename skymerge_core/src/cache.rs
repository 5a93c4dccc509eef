//! Military classification cache.
//!
//! The only state that outlives an invocation. Two records are kept: per-hex
//! verdicts and the global military hex list, each stamped with the unix time
//! it was fetched. Expiry is decided by the reader via [`is_expired`], so the
//! stores never need a clock.

use crate::error::CacheError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

// ============================================================================
// ENTRIES
// ============================================================================

/// Cached per-hex verdict.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HexCacheEntry {
    /// `None` means the source answered but had no verdict
    #[serde(alias = "mil")]
    pub is_military: Option<bool>,
    #[serde(alias = "ts")]
    pub fetched_at: f64,
}

/// Cached global military list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListCacheEntry {
    #[serde(alias = "hexes")]
    pub member_hexes: BTreeSet<String>,
    #[serde(alias = "ts")]
    pub fetched_at: f64,
}

/// True when an entry fetched at `fetched_at` is no longer usable at `now`.
///
/// Timestamps that are not finite are always expired.
pub fn is_expired(fetched_at: f64, now: f64, ttl_secs: f64) -> bool {
    !fetched_at.is_finite() || now - fetched_at > ttl_secs
}

// ============================================================================
// STORE CONTRACT
// ============================================================================

/// Storage for military verdicts.
///
/// Reads never check expiry. `flush` persists everything written since load.
pub trait MilitaryCacheStore: Send {
    fn get(&self, hex: &str) -> Option<HexCacheEntry>;

    fn put(&mut self, hex: &str, entry: HexCacheEntry);

    fn list(&self) -> Option<&ListCacheEntry>;

    fn put_list(&mut self, entry: ListCacheEntry);

    fn flush(&mut self) -> Result<(), CacheError>;

    /// Number of per-hex entries
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Process-local store. Flush is a no-op.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCacheStore {
    entries: BTreeMap<String, HexCacheEntry>,
    list: Option<ListCacheEntry>,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MilitaryCacheStore for InMemoryCacheStore {
    fn get(&self, hex: &str) -> Option<HexCacheEntry> {
        self.entries.get(hex).copied()
    }

    fn put(&mut self, hex: &str, entry: HexCacheEntry) {
        self.entries.insert(hex.to_string(), entry);
    }

    fn list(&self) -> Option<&ListCacheEntry> {
        self.list.as_ref()
    }

    fn put_list(&mut self, entry: ListCacheEntry) {
        self.list = Some(entry);
    }

    fn flush(&mut self) -> Result<(), CacheError> {
        Ok(())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

// ============================================================================
// JSON FILE STORE
// ============================================================================

/// File-backed store: one JSON object for per-hex entries, one for the list.
///
/// Missing or corrupt files load as empty and are rewritten at the next flush.
/// Writes go to a sibling temp file first and are renamed into place.
#[derive(Debug)]
pub struct JsonFileCacheStore {
    hex_path: PathBuf,
    list_path: PathBuf,
    entries: BTreeMap<String, HexCacheEntry>,
    list: Option<ListCacheEntry>,
    hex_dirty: bool,
    list_dirty: bool,
}

impl JsonFileCacheStore {
    /// Loads both cache files. Never fails; problems are logged.
    pub fn open(hex_path: impl Into<PathBuf>, list_path: impl Into<PathBuf>) -> Self {
        let hex_path = hex_path.into();
        let list_path = list_path.into();

        let raw_entries: BTreeMap<String, HexCacheEntry> = load_json(&hex_path).unwrap_or_default();
        // Keys are normalized so lookups by upper-cased hex always hit
        let entries = raw_entries
            .into_iter()
            .map(|(k, v)| (k.trim().to_ascii_uppercase(), v))
            .collect::<BTreeMap<_, _>>();
        let list = load_json::<ListCacheEntry>(&list_path);

        debug!(
            hex_entries = entries.len(),
            list_loaded = list.is_some(),
            "military cache loaded"
        );

        Self {
            hex_path,
            list_path,
            entries,
            list,
            hex_dirty: false,
            list_dirty: false,
        }
    }

    pub fn hex_path(&self) -> &Path {
        &self.hex_path
    }

    pub fn list_path(&self) -> &Path {
        &self.list_path
    }

    /// Iterates the per-hex entries in hex order.
    pub fn entries(&self) -> impl Iterator<Item = (&String, &HexCacheEntry)> {
        self.entries.iter()
    }

    /// Drops all per-hex entries; the file is rewritten at the next flush.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.hex_dirty = true;
    }
}

fn load_json<T: serde::de::DeserializeOwned>(path: &Path) -> Option<T> {
    let text = match fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "military cache unreadable, starting empty");
            return None;
        }
    };
    match serde_json::from_str(&text) {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "military cache corrupt, starting empty");
            None
        }
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), CacheError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| CacheError::io(parent, e))?;
    }
    let body = serde_json::to_vec_pretty(value)?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, body).map_err(|e| CacheError::io(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| CacheError::io(path, e))
}

impl MilitaryCacheStore for JsonFileCacheStore {
    fn get(&self, hex: &str) -> Option<HexCacheEntry> {
        self.entries.get(hex).copied()
    }

    fn put(&mut self, hex: &str, entry: HexCacheEntry) {
        self.entries.insert(hex.to_string(), entry);
        self.hex_dirty = true;
    }

    fn list(&self) -> Option<&ListCacheEntry> {
        self.list.as_ref()
    }

    fn put_list(&mut self, entry: ListCacheEntry) {
        self.list = Some(entry);
        self.list_dirty = true;
    }

    fn flush(&mut self) -> Result<(), CacheError> {
        if self.hex_dirty {
            write_json(&self.hex_path, &self.entries)?;
            self.hex_dirty = false;
        }
        if self.list_dirty {
            if let Some(list) = &self.list {
                write_json(&self.list_path, list)?;
            }
            self.list_dirty = false;
        }
        Ok(())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}
