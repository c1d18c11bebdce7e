use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Temperature value a record carries until a forecast is obtained.
pub const UNRESOLVED_TEMPERATURE: f64 = 0.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationRecord {
    pub lat: String,
    pub lon: String,
    pub temperature: f64,
}

impl LocationRecord {
    pub fn unresolved(lat: impl Into<String>, lon: impl Into<String>) -> Self {
        Self {
            lat: lat.into(),
            lon: lon.into(),
            temperature: UNRESOLVED_TEMPERATURE,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.temperature != UNRESOLVED_TEMPERATURE
    }
}

/// IP dotted-quad -> location record. `BTreeMap` keeps key order stable
/// so the persisted file diffs cleanly between runs.
pub type LocationMap = BTreeMap<String, LocationRecord>;

/// Missing or corrupt cache files yield an empty map; the run proceeds
/// and re-resolves from the network.
pub fn read_locations(path: &Path) -> LocationMap {
    let payload = match fs::read_to_string(path) {
        Ok(payload) => payload,
        Err(_) => {
            log::info!(
                "no cached locations at {}; starting with an empty cache",
                path.display()
            );
            return LocationMap::new();
        }
    };

    match serde_json::from_str(&payload) {
        Ok(map) => map,
        Err(error) => {
            log::warn!(
                "cached locations at {} are unreadable ({error}); starting fresh",
                path.display()
            );
            LocationMap::new()
        }
    }
}

pub fn write_locations(path: &Path, locations: &LocationMap) -> io::Result<()> {
    let payload = serde_json::to_vec_pretty(locations)
        .map_err(|error| io::Error::new(io::ErrorKind::InvalidData, error.to_string()))?;
    write_atomic(path, &payload)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let tmp_path = path.with_extension(format!("{}.tmp", std::process::id()));
    fs::write(&tmp_path, bytes)?;
    fs::rename(&tmp_path, path)
}
