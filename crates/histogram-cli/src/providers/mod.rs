use thiserror::Error;

pub mod dark_sky;
pub mod visual_crossing;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderFailure {
    /// The provider's rate/quota limit is spent; do not call it again
    /// this run.
    #[error("quota exhausted")]
    QuotaExhausted,
    /// A failure that says nothing about quota; the next provider in
    /// the chain gets a turn and this one stays eligible.
    #[error("transient failure: {0}")]
    Transient(String),
}

pub trait ForecastProvider {
    fn name(&self) -> &'static str;

    /// One forecast attempt: the daily high temperature for the
    /// coordinates, or a failure classified for the chain.
    fn attempt(&mut self, lat: &str, lon: &str) -> Result<f64, ProviderFailure>;
}

struct ProviderSlot {
    provider: Box<dyn ForecastProvider>,
    exhausted: bool,
}

/// Ordered fallback chain over forecast providers, carrying the
/// run-scoped exhaustion state. Once every provider is exhausted the
/// chain short-circuits and no further network calls are made.
pub struct ForecastChain {
    slots: Vec<ProviderSlot>,
    available: bool,
}

impl ForecastChain {
    pub fn new(providers: Vec<Box<dyn ForecastProvider>>) -> Self {
        let mut chain = Self {
            slots: providers
                .into_iter()
                .map(|provider| ProviderSlot {
                    provider,
                    exhausted: false,
                })
                .collect(),
            available: true,
        };
        chain.refresh_available();
        chain
    }

    /// Marks a provider exhausted before any call is made, e.g. when a
    /// persisted daily-limit marker gates it for the whole run.
    pub fn mark_exhausted(&mut self, name: &str) {
        for slot in &mut self.slots {
            if slot.provider.name() == name {
                slot.exhausted = true;
            }
        }
        self.refresh_available();
    }

    pub fn calls_available(&self) -> bool {
        self.available
    }

    pub fn get_temperature(&mut self, lat: &str, lon: &str) -> Option<f64> {
        if !self.available {
            return None;
        }

        for slot in &mut self.slots {
            if slot.exhausted {
                continue;
            }

            match slot.provider.attempt(lat, lon) {
                Ok(temperature) => return Some(temperature),
                Err(ProviderFailure::QuotaExhausted) => {
                    log::error!("{} limit reached; falling back", slot.provider.name());
                    slot.exhausted = true;
                }
                Err(ProviderFailure::Transient(message)) => {
                    log::warn!("{} failed ({message}); falling back", slot.provider.name());
                }
            }
        }

        self.refresh_available();
        if !self.available {
            log::error!("all forecast providers exhausted; using cached values only");
        }
        None
    }

    fn refresh_available(&mut self) {
        self.available = self.slots.iter().any(|slot| !slot.exhausted);
    }
}
