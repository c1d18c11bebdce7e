use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::AppError;

pub const STATE_DIR_ENV: &str = "HISTOGRAM_STATE_DIR";
pub const VC_CALL_BUDGET_ENV: &str = "HISTOGRAM_VC_CALL_BUDGET";

pub const API_KEYS_FILE: &str = "api_keys.json";
pub const LOCATION_CACHE_FILE: &str = "ip_locations.txt";
pub const QUOTA_MARKER_FILE: &str = "VC_limit_date.txt";
pub const LOG_FILE: &str = "output.log";

/// Visual Crossing free tier allows 1000 calls/day; stay under it.
pub const VC_CALL_BUDGET: usize = 950;

pub const GEO_COOLDOWN_SECS: u64 = 61;
pub const GEO_MAX_ATTEMPTS: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub state_dir: PathBuf,
    pub vc_call_budget: usize,
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        Self::from_pairs(std::env::vars())
    }

    pub(crate) fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let map: HashMap<String, String> = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            state_dir: resolve_state_dir(&map),
            vc_call_budget: resolve_vc_call_budget(&map),
        }
    }

    pub fn api_keys_path(&self) -> PathBuf {
        self.state_dir.join(API_KEYS_FILE)
    }

    pub fn location_cache_path(&self) -> PathBuf {
        self.state_dir.join(LOCATION_CACHE_FILE)
    }

    pub fn quota_marker_path(&self) -> PathBuf {
        self.state_dir.join(QUOTA_MARKER_FILE)
    }

    pub fn log_path(&self) -> PathBuf {
        self.state_dir.join(LOG_FILE)
    }
}

fn resolve_state_dir(env_map: &HashMap<String, String>) -> PathBuf {
    env_map
        .get(STATE_DIR_ENV)
        .map(String::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn resolve_vc_call_budget(env_map: &HashMap<String, String>) -> usize {
    env_map
        .get(VC_CALL_BUDGET_ENV)
        .map(String::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .and_then(|value| value.parse::<usize>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(VC_CALL_BUDGET)
}

/// Fixed-delay retry bounds for the geolocation rate-limit loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CooldownPolicy {
    pub cooldown: Duration,
    pub max_attempts: usize,
}

impl Default for CooldownPolicy {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_secs(GEO_COOLDOWN_SECS),
            max_attempts: GEO_MAX_ATTEMPTS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ApiKeys {
    pub weather: String,
    pub darksky: String,
    pub visualcrossing: String,
}

impl ApiKeys {
    pub fn load(path: &Path) -> Result<Self, AppError> {
        let payload = fs::read_to_string(path).map_err(|error| {
            AppError::user(format!(
                "credentials file {} could not be read: {error}",
                path.display()
            ))
        })?;
        serde_json::from_str(&payload).map_err(|error| {
            AppError::user(format!(
                "credentials file {} is malformed: {error}",
                path.display()
            ))
        })
    }
}
