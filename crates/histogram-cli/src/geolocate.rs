use std::net::Ipv4Addr;
use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::CooldownPolicy;

const LOOKUP_ENDPOINT: &str = "http://api.weatherapi.com/v1/ip.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Coordinates {
    pub lat: String,
    pub lon: String,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GeoError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("rate limited through every retry attempt")]
    RateLimited,
    #[error("lookup rejected with status {status}")]
    InvalidIp { status: u16 },
    #[error("invalid lookup response: {0}")]
    InvalidResponse(String),
}

/// Seam for the IP-geolocation service so the orchestration layer can
/// run against fakes in tests.
pub trait GeoApi {
    fn locate(&self, ip: Ipv4Addr) -> Result<Coordinates, GeoError>;
}

#[derive(Debug, Serialize)]
struct LookupQuery<'a> {
    key: &'a str,
    q: String,
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    lat: f64,
    lon: f64,
}

#[derive(Debug, Clone)]
pub struct WeatherApiClient {
    client: Client,
    key: String,
    policy: CooldownPolicy,
}

impl WeatherApiClient {
    pub fn new(key: impl Into<String>, policy: CooldownPolicy) -> Self {
        Self {
            client: Client::new(),
            key: key.into(),
            policy,
        }
    }

    fn locate_once(&self, ip: Ipv4Addr) -> Result<Coordinates, GeoError> {
        let query = LookupQuery {
            key: &self.key,
            q: ip.to_string(),
        };

        let response = self
            .client
            .get(LOOKUP_ENDPOINT)
            .query(&query)
            .send()
            .map_err(|error| GeoError::Transport(error.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .map_err(|error| GeoError::Transport(error.to_string()))?;

        if status.is_success() {
            return parse_lookup_response(&body);
        }
        if status.as_u16() == 429 {
            return Err(GeoError::RateLimited);
        }
        Err(GeoError::InvalidIp {
            status: status.as_u16(),
        })
    }
}

impl GeoApi for WeatherApiClient {
    fn locate(&self, ip: Ipv4Addr) -> Result<Coordinates, GeoError> {
        locate_with_cooldown(self.policy, || self.locate_once(ip), std::thread::sleep)
    }
}

/// Runs `operation`, sleeping the fixed cooldown and retrying whenever
/// the service reports a rate limit. Bounded by
/// `policy.max_attempts` so a sustained throttle cannot stall the run
/// forever.
pub fn locate_with_cooldown<T, F, S>(
    policy: CooldownPolicy,
    mut operation: F,
    mut sleep_fn: S,
) -> Result<T, GeoError>
where
    F: FnMut() -> Result<T, GeoError>,
    S: FnMut(Duration),
{
    let max_attempts = policy.max_attempts.max(1);

    for attempt in 1..=max_attempts {
        match operation() {
            Ok(value) => return Ok(value),
            Err(GeoError::RateLimited) if attempt < max_attempts => {
                log::warn!(
                    "geolocation rate limit hit (attempt {attempt}/{max_attempts}); \
                     cooling down for {}s",
                    policy.cooldown.as_secs()
                );
                sleep_fn(policy.cooldown);
            }
            Err(error) => return Err(error),
        }
    }

    Err(GeoError::RateLimited)
}

fn parse_lookup_response(body: &str) -> Result<Coordinates, GeoError> {
    let payload: LookupResponse = serde_json::from_str(body)
        .map_err(|error| GeoError::InvalidResponse(format!("lookup payload: {error}")))?;

    Ok(Coordinates {
        lat: payload.lat.to_string(),
        lon: payload.lon.to_string(),
    })
}
