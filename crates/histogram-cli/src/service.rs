use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;

use crate::cache::{self, LocationRecord};
use crate::config::RuntimeConfig;
use crate::error::AppError;
use crate::extract;
use crate::geolocate::GeoApi;
use crate::histogram;
use crate::providers::ForecastChain;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub input: PathBuf,
    pub output: PathBuf,
    pub bucket_count: usize,
}

/// End-of-run summary surfaced to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub lookup_failures: usize,
    pub invalid_ips: BTreeSet<String>,
    pub sample_count: usize,
    pub resolved_this_run: usize,
}

/// One batch run: extract addresses, fill the location cache, fill in
/// temperatures through the provider chain, and write the histogram.
pub fn run<G: GeoApi>(
    config: &RuntimeConfig,
    geo: &G,
    chain: &mut ForecastChain,
    request: &RunRequest,
) -> Result<RunReport, AppError> {
    let text = fs::read_to_string(&request.input).map_err(|error| {
        AppError::user(format!(
            "input file {} could not be read: {error}",
            request.input.display()
        ))
    })?;

    let ips = extract::extract_ips(&text);
    log::info!(
        "found {} public addresses in {}",
        ips.len(),
        request.input.display()
    );

    let cache_path = config.location_cache_path();
    let mut locations = cache::read_locations(&cache_path);

    let mut lookup_failures = 0;
    let mut invalid_ips = BTreeSet::new();
    log::info!("searching for locations...");
    for ip in &ips {
        let key = ip.to_string();
        if locations.contains_key(&key) {
            continue;
        }

        match geo.locate(*ip) {
            Ok(coords) => {
                locations.insert(key, LocationRecord::unresolved(coords.lat, coords.lon));
            }
            Err(error) => {
                lookup_failures += 1;
                log::error!("location lookup for {key} failed: {error}");
                invalid_ips.insert(key);
            }
        }
    }
    persist(&cache_path, &locations)?;

    log::info!("searching for the forecast...");
    let mut resolved_this_run = 0;
    for record in locations.values_mut() {
        if record.is_resolved() {
            continue;
        }
        if !chain.calls_available() {
            break;
        }
        if let Some(temperature) = chain.get_temperature(&record.lat, &record.lon) {
            // The sentinel stands for "unresolved"; a provider echoing
            // it back would otherwise poison the record.
            if temperature != cache::UNRESOLVED_TEMPERATURE {
                record.temperature = temperature;
                resolved_this_run += 1;
            }
        }
    }
    persist(&cache_path, &locations)?;

    // The whole cache feeds the histogram, not just this run's
    // addresses; the cache is the source of truth across runs.
    let samples: Vec<f64> = locations
        .values()
        .filter(|record| record.is_resolved())
        .map(|record| record.temperature)
        .collect();

    let buckets = histogram::build_histogram(&samples, request.bucket_count)
        .map_err(|error| AppError::runtime(error.to_string()))?;

    fs::write(&request.output, histogram::render_tsv(&buckets)).map_err(|error| {
        AppError::runtime(format!(
            "could not write {}: {error}",
            request.output.display()
        ))
    })?;
    log::info!("histogram file complete");

    Ok(RunReport {
        lookup_failures,
        invalid_ips,
        sample_count: samples.len(),
        resolved_this_run,
    })
}

fn persist(path: &std::path::Path, locations: &cache::LocationMap) -> Result<(), AppError> {
    cache::write_locations(path, locations).map_err(|error| {
        AppError::runtime(format!("could not persist {}: {error}", path.display()))
    })
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::net::Ipv4Addr;
    use std::path::Path;

    use super::*;
    use crate::geolocate::{Coordinates, GeoError};
    use crate::providers::{ForecastProvider, ProviderFailure};

    struct FakeGeo {
        calls: Cell<usize>,
        reject: Vec<Ipv4Addr>,
    }

    impl FakeGeo {
        fn new() -> Self {
            Self {
                calls: Cell::new(0),
                reject: Vec::new(),
            }
        }

        fn rejecting(reject: Vec<Ipv4Addr>) -> Self {
            Self {
                calls: Cell::new(0),
                reject,
            }
        }
    }

    impl GeoApi for FakeGeo {
        fn locate(&self, ip: Ipv4Addr) -> Result<Coordinates, GeoError> {
            self.calls.set(self.calls.get() + 1);
            if self.reject.contains(&ip) {
                return Err(GeoError::InvalidIp { status: 400 });
            }
            let octets = ip.octets();
            Ok(Coordinates {
                lat: format!("{}.0", octets[0]),
                lon: format!("{}.0", octets[1]),
            })
        }
    }

    /// Hands out 50, 60, 70, ... then keeps counting up.
    struct StepProvider {
        next: u64,
    }

    impl StepProvider {
        fn new() -> Self {
            Self { next: 0 }
        }
    }

    impl ForecastProvider for StepProvider {
        fn name(&self) -> &'static str {
            "step"
        }

        fn attempt(&mut self, _lat: &str, _lon: &str) -> Result<f64, ProviderFailure> {
            let index = self.next;
            self.next += 1;
            Ok(50.0 + 10.0 * index as f64)
        }
    }

    struct ExhaustedProvider;

    impl ForecastProvider for ExhaustedProvider {
        fn name(&self) -> &'static str {
            "exhausted"
        }

        fn attempt(&mut self, _lat: &str, _lon: &str) -> Result<f64, ProviderFailure> {
            Err(ProviderFailure::QuotaExhausted)
        }
    }

    fn setup(dir: &Path, input_text: &str) -> (RuntimeConfig, RunRequest) {
        let config = RuntimeConfig {
            state_dir: dir.to_path_buf(),
            vc_call_budget: 950,
        };
        let input = dir.join("histogram_input");
        fs::write(&input, input_text).expect("write input");
        (
            config,
            RunRequest {
                input,
                output: dir.join("histogram.tsv"),
                bucket_count: 2,
            },
        )
    }

    #[test]
    fn run_resolves_locations_and_writes_histogram() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (config, request) = setup(dir.path(), "8.8.8.8 then 1.1.1.1 and private 10.0.0.5");
        let geo = FakeGeo::new();
        let mut chain = ForecastChain::new(vec![Box::new(StepProvider::new())]);

        let report = run(&config, &geo, &mut chain, &request).expect("run");

        assert_eq!(report.lookup_failures, 0);
        assert_eq!(report.sample_count, 2);
        assert_eq!(report.resolved_this_run, 2);
        assert_eq!(geo.calls.get(), 2);

        let tsv = fs::read_to_string(&request.output).expect("tsv");
        assert!(tsv.starts_with("bucketMin\tbucketMax\tCount\n"));

        let cached = cache::read_locations(&config.location_cache_path());
        assert_eq!(cached.len(), 2);
        assert!(cached.values().all(LocationRecord::is_resolved));
    }

    #[test]
    fn run_skips_and_counts_invalid_ips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (config, request) = setup(dir.path(), "9.9.9.9 and 8.8.8.8 and 1.1.1.1");
        let geo = FakeGeo::rejecting(vec![Ipv4Addr::new(9, 9, 9, 9)]);
        let mut chain = ForecastChain::new(vec![Box::new(StepProvider::new())]);

        let report = run(&config, &geo, &mut chain, &request).expect("run");

        assert_eq!(report.lookup_failures, 1);
        assert_eq!(
            report.invalid_ips,
            BTreeSet::from(["9.9.9.9".to_string()])
        );
        // The rejected address never enters the cache.
        assert!(
            !cache::read_locations(&config.location_cache_path()).contains_key("9.9.9.9")
        );
    }

    #[test]
    fn run_does_not_relocate_cached_addresses() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (config, request) = setup(dir.path(), "8.8.8.8");

        let mut seeded = cache::LocationMap::new();
        seeded.insert(
            "8.8.8.8".to_string(),
            LocationRecord {
                lat: "37.4".to_string(),
                lon: "-122.1".to_string(),
                temperature: 71.0,
            },
        );
        // A second resolved record keeps the histogram off the
        // zero-variance abort path.
        seeded.insert(
            "1.1.1.1".to_string(),
            LocationRecord {
                lat: "-27.5".to_string(),
                lon: "153.0".to_string(),
                temperature: 80.0,
            },
        );
        cache::write_locations(&config.location_cache_path(), &seeded).expect("seed");

        let geo = FakeGeo::new();
        let mut chain = ForecastChain::new(vec![Box::new(StepProvider::new())]);
        let report = run(&config, &geo, &mut chain, &request).expect("run");

        assert_eq!(geo.calls.get(), 0);
        assert_eq!(report.resolved_this_run, 0);
        assert_eq!(report.sample_count, 2);
    }

    #[test]
    fn run_with_exhausted_chain_keeps_sentinels_and_aborts_on_variance() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (config, request) = setup(dir.path(), "8.8.8.8 and 1.1.1.1");
        let geo = FakeGeo::new();
        let mut chain = ForecastChain::new(vec![Box::new(ExhaustedProvider)]);

        let error = run(&config, &geo, &mut chain, &request).expect_err("must abort");
        assert_eq!(error.exit_code(), 1);

        // No output file, but locations are cached for the next run.
        assert!(!request.output.exists());
        let cached = cache::read_locations(&config.location_cache_path());
        assert_eq!(cached.len(), 2);
        assert!(cached.values().all(|record| !record.is_resolved()));
    }

    #[test]
    fn run_fails_on_missing_input_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = RuntimeConfig {
            state_dir: dir.path().to_path_buf(),
            vc_call_budget: 950,
        };
        let request = RunRequest {
            input: dir.path().join("does-not-exist"),
            output: dir.path().join("histogram.tsv"),
            bucket_count: 5,
        };

        let geo = FakeGeo::new();
        let mut chain = ForecastChain::new(vec![Box::new(StepProvider::new())]);
        let error = run(&config, &geo, &mut chain, &request).expect_err("must fail");
        assert_eq!(error.exit_code(), 2);
    }
}
