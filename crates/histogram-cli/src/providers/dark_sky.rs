use chrono::{DateTime, Days, Local, NaiveTime};
use reqwest::blocking::Client;
use serde::Deserialize;

use super::{ForecastProvider, ProviderFailure};

pub const PROVIDER_NAME: &str = "dark_sky";
const FORECAST_ENDPOINT: &str = "https://api.darksky.net/forecast";
const EXCLUDE_BLOCKS: &str = "currently,minutely,hourly,alerts,flags";

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    daily: Option<ForecastDaily>,
}

#[derive(Debug, Deserialize)]
struct ForecastDaily {
    #[serde(default)]
    data: Vec<ForecastPoint>,
}

#[derive(Debug, Deserialize)]
struct ForecastPoint {
    #[serde(rename = "temperatureHigh")]
    temperature_high: Option<f64>,
}

/// Dark Sky time-machine forecast. A 403 is this API's quota signal.
pub struct DarkSky {
    client: Client,
    key: String,
    request_date: i64,
}

impl DarkSky {
    pub fn new(key: impl Into<String>, request_date: i64) -> Self {
        Self {
            client: Client::new(),
            key: key.into(),
            request_date,
        }
    }
}

impl ForecastProvider for DarkSky {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    fn attempt(&mut self, lat: &str, lon: &str) -> Result<f64, ProviderFailure> {
        let url = format!(
            "{FORECAST_ENDPOINT}/{}/{lat},{lon},{}?exclude={EXCLUDE_BLOCKS}",
            self.key, self.request_date
        );

        let response = self
            .client
            .get(url)
            .send()
            .map_err(|error| ProviderFailure::Transient(error.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .map_err(|error| ProviderFailure::Transient(error.to_string()))?;

        match status {
            200 => parse_forecast_response(&body),
            403 => Err(ProviderFailure::QuotaExhausted),
            other => Err(ProviderFailure::Transient(format!(
                "unexpected status {other}"
            ))),
        }
    }
}

/// Midnight at the start of tomorrow as a Unix timestamp; the forecast
/// request targets the next calendar day.
pub fn tomorrow_request_date(now: DateTime<Local>) -> i64 {
    let midnight = (now.date_naive() + Days::new(1)).and_time(NaiveTime::MIN);
    midnight
        .and_local_timezone(now.timezone())
        .earliest()
        .map(|moment| moment.timestamp())
        .unwrap_or_else(|| midnight.and_utc().timestamp())
}

fn parse_forecast_response(body: &str) -> Result<f64, ProviderFailure> {
    let payload: ForecastResponse = serde_json::from_str(body)
        .map_err(|error| ProviderFailure::Transient(format!("forecast payload: {error}")))?;

    payload
        .daily
        .and_then(|daily| daily.data.into_iter().next())
        .and_then(|point| point.temperature_high)
        .ok_or_else(|| {
            ProviderFailure::Transient("forecast payload: missing daily temperatureHigh".to_string())
        })
}
