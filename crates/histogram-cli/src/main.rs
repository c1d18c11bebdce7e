use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Local;
use clap::Parser;

use histogram_cli::{
    config::{ApiKeys, CooldownPolicy, RuntimeConfig},
    error::AppError,
    geolocate::WeatherApiClient,
    providers::{ForecastChain, dark_sky, visual_crossing},
    quota,
    service::{self, RunReport, RunRequest},
};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Temperature histogram for the public IPv4 addresses in a text file"
)]
struct Cli {
    /// Text file scanned for public IPv4 addresses.
    #[arg(long, default_value = "./histogram_input")]
    input: PathBuf,
    /// Destination for the tab-separated frequency table.
    #[arg(long, default_value = "./histogram.tsv")]
    output: PathBuf,
    /// Number of equal-width histogram buckets.
    #[arg(long, default_value_t = 5)]
    bucket_count: usize,
}

fn main() {
    let cli = Cli::parse();
    let config = RuntimeConfig::from_env();
    init_logger(&config.log_path());

    match run(cli, &config) {
        Ok(report) => print_summary(&report),
        Err(error) => {
            log::error!("{error}");
            eprintln!("error: {error}");
            std::process::exit(error.exit_code());
        }
    }
}

fn run(cli: Cli, config: &RuntimeConfig) -> Result<RunReport, AppError> {
    if cli.bucket_count == 0 {
        return Err(AppError::user("--bucket-count must be at least 1"));
    }

    let keys = ApiKeys::load(&config.api_keys_path())?;

    let mut chain = build_chain(config, &keys);
    let geo = WeatherApiClient::new(keys.weather, CooldownPolicy::default());

    let request = RunRequest {
        input: cli.input,
        output: cli.output,
        bucket_count: cli.bucket_count,
    };
    service::run(config, &geo, &mut chain, &request)
}

fn build_chain(config: &RuntimeConfig, keys: &ApiKeys) -> ForecastChain {
    let request_date = dark_sky::tomorrow_request_date(Local::now());
    let marker_path = config.quota_marker_path();

    let mut chain = ForecastChain::new(vec![
        Box::new(dark_sky::DarkSky::new(keys.darksky.clone(), request_date)),
        Box::new(visual_crossing::VisualCrossing::new(
            keys.visualcrossing.clone(),
            config.vc_call_budget,
            marker_path.clone(),
        )),
    ]);

    if quota::daily_limit_active(&marker_path, Local::now().date_naive()) {
        log::error!(
            "{} daily limit was already hit today; provider disabled for this run",
            visual_crossing::PROVIDER_NAME
        );
        chain.mark_exhausted(visual_crossing::PROVIDER_NAME);
    }

    chain
}

fn print_summary(report: &RunReport) {
    println!("Total API Lookup Failures: {}", report.lookup_failures);
    println!(
        "Invalid IP Addresses: {}",
        report
            .invalid_ips
            .iter()
            .cloned()
            .collect::<Vec<_>>()
            .join(", ")
    );
}

fn init_logger(path: &Path) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    builder.format(|buf, record| {
        writeln!(
            buf,
            "{}: {} - {}",
            Local::now().format("%d-%b-%y %H:%M:%S"),
            record.level(),
            record.args()
        )
    });

    match OpenOptions::new().create(true).append(true).open(path) {
        Ok(file) => {
            builder.target(env_logger::Target::Pipe(Box::new(file)));
        }
        Err(error) => eprintln!(
            "could not open log file {}; logging to stderr ({error})",
            path.display()
        ),
    }

    // Tests may initialize the logger more than once.
    let _ = builder.try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults_match_legacy_tool() {
        let cli = Cli::try_parse_from(["weather-histogram-cli"]).expect("parse");
        assert_eq!(cli.input, PathBuf::from("./histogram_input"));
        assert_eq!(cli.output, PathBuf::from("./histogram.tsv"));
        assert_eq!(cli.bucket_count, 5);
    }

    #[test]
    fn cli_accepts_explicit_flags() {
        let cli = Cli::try_parse_from([
            "weather-histogram-cli",
            "--input",
            "/tmp/in.txt",
            "--output",
            "/tmp/out.tsv",
            "--bucket-count",
            "9",
        ])
        .expect("parse");
        assert_eq!(cli.input, PathBuf::from("/tmp/in.txt"));
        assert_eq!(cli.bucket_count, 9);
    }

    #[test]
    fn zero_bucket_count_is_a_user_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cli = Cli {
            input: dir.path().join("in"),
            output: dir.path().join("out"),
            bucket_count: 0,
        };
        let config = RuntimeConfig {
            state_dir: dir.path().to_path_buf(),
            vc_call_budget: 950,
        };

        let error = run(cli, &config).expect_err("must fail");
        assert_eq!(error.exit_code(), 2);
    }
}
