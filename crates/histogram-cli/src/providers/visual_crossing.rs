use std::path::PathBuf;

use chrono::Local;
use reqwest::blocking::Client;
use serde::Deserialize;

use super::{ForecastProvider, ProviderFailure};
use crate::quota;

pub const PROVIDER_NAME: &str = "visual_crossing";
const TIMELINE_ENDPOINT: &str =
    "https://weather.visualcrossing.com/VisualCrossingWebServices/rest/services/timeline";

#[derive(Debug, Deserialize)]
struct TimelineResponse {
    #[serde(default)]
    days: Vec<TimelineDay>,
}

#[derive(Debug, Deserialize)]
struct TimelineDay {
    tempmax: Option<f64>,
}

/// Visual Crossing timeline forecast. The free tier signals a spent
/// daily quota with a 400; that event is also persisted as a dated
/// marker so later runs skip this provider until the next day.
pub struct VisualCrossing {
    client: Client,
    key: String,
    call_budget: usize,
    calls_made: usize,
    marker_path: PathBuf,
}

impl VisualCrossing {
    pub fn new(key: impl Into<String>, call_budget: usize, marker_path: PathBuf) -> Self {
        Self {
            client: Client::new(),
            key: key.into(),
            call_budget,
            calls_made: 0,
            marker_path,
        }
    }

    fn record_limit_marker(&self) {
        let today = Local::now().date_naive();
        if let Err(error) = quota::record_limit_date(&self.marker_path, today) {
            log::warn!(
                "could not persist quota marker at {}: {error}",
                self.marker_path.display()
            );
        }
    }
}

impl ForecastProvider for VisualCrossing {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    fn attempt(&mut self, lat: &str, lon: &str) -> Result<f64, ProviderFailure> {
        if self.calls_made >= self.call_budget {
            log::warn!("{PROVIDER_NAME} call budget ({}) spent", self.call_budget);
            return Err(ProviderFailure::QuotaExhausted);
        }
        self.calls_made += 1;

        let url = format!(
            "{TIMELINE_ENDPOINT}/{lat},{lon}/today?unitGroup=us&key={}",
            self.key
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
            200 => parse_timeline_response(&body),
            400 => {
                self.record_limit_marker();
                Err(ProviderFailure::QuotaExhausted)
            }
            other => Err(ProviderFailure::Transient(format!(
                "unexpected status {other}"
            ))),
        }
    }
}

fn parse_timeline_response(body: &str) -> Result<f64, ProviderFailure> {
    let payload: TimelineResponse = serde_json::from_str(body)
        .map_err(|error| ProviderFailure::Transient(format!("timeline payload: {error}")))?;

    payload
        .days
        .into_iter()
        .next()
        .and_then(|day| day.tempmax)
        .ok_or_else(|| {
            ProviderFailure::Transient("timeline payload: missing days[0].tempmax".to_string())
        })
}
