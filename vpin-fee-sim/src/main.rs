use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::{
    fs::File,
    io::{BufRead, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{error, info, warn};
use vpin_fee::{
    FeeModelError, FeeSummary, ImpactObservation, SimConfig, ToxicitySummary, Trade,
    align_impacts, run_with_covering_position,
};

/// Number of highest-fee days reported in the log.
const TOP_DAYS: usize = 5;

#[derive(Debug, Error)]
enum SimError {
    #[error("environment variable {0} must be set")]
    MissingEnv(&'static str),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {path} line {line}: {source}")]
    Parse {
        path: PathBuf,
        line: usize,
        source: serde_json::Error,
    },

    #[error("failed to encode output: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Model(#[from] FeeModelError),
}

impl SimError {
    fn io(path: &Path) -> impl FnOnce(std::io::Error) -> SimError + '_ {
        move |source| SimError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Impact series line as written by the feed, before sentinel readings are discarded.
#[derive(Debug, Deserialize)]
struct RawImpactObservation {
    timestamp: DateTime<Utc>,
    #[serde(default)]
    impact: Option<f64>,
}

impl RawImpactObservation {
    /// Reading present in the feed but discarded as a zero or non-finite sentinel.
    fn is_sentinel(&self) -> bool {
        self.impact.is_some() && ImpactObservation::sanitize(self.impact).is_none()
    }
}

#[derive(Debug, Serialize)]
struct RunSummary<'a> {
    instrument: &'a str,
    bucket_size: f64,
    toxicity: &'a ToxicitySummary,
    fees: &'a FeeSummary,
}

fn main() {
    init_logging();

    if let Err(error) = run() {
        error!(%error, "simulation failed");
        std::process::exit(1);
    }
}

fn run() -> Result<(), SimError> {
    let tape_path = std::env::var("TRADE_TAPE_PATH")
        .map(PathBuf::from)
        .map_err(|_| SimError::MissingEnv("TRADE_TAPE_PATH"))?;
    let impact_path = std::env::var("IMPACT_SERIES_PATH").ok().map(PathBuf::from);
    let output_dir = std::env::var("OUTPUT_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."));

    let config = SimConfig::from_env();

    let mut trades = read_jsonl::<Trade>(&tape_path)?;
    info!(path = %tape_path.display(), trades = trades.len(), "loaded trade tape");

    if let Some(impact_path) = impact_path {
        let raw = read_jsonl::<RawImpactObservation>(&impact_path)?;
        let missing = raw.iter().filter(|line| line.impact.is_none()).count();
        let discarded = raw.iter().filter(|line| line.is_sentinel()).count();
        let observations = raw
            .into_iter()
            .map(|line| ImpactObservation::new(line.timestamp, line.impact))
            .collect::<Vec<_>>();
        let attached = align_impacts(&mut trades, &observations)?;
        info!(
            path = %impact_path.display(),
            observations = observations.len(),
            missing,
            discarded,
            attached,
            "aligned impact series"
        );
    }

    let (_, output) = run_with_covering_position(&trades, &config)?;

    std::fs::create_dir_all(&output_dir).map_err(SimError::io(&output_dir))?;
    write_jsonl(&output_dir.join("buckets.jsonl"), &output.toxicity)?;
    write_jsonl(&output_dir.join("fees.jsonl"), &output.fees)?;

    let summary = RunSummary {
        instrument: config.instrument.as_str(),
        bucket_size: output.bucket_size,
        toxicity: &output.toxicity_summary,
        fees: &output.fee_summary,
    };
    let summary_path = output_dir.join("summary.json");
    let file = File::create(&summary_path).map_err(SimError::io(&summary_path))?;
    serde_json::to_writer_pretty(BufWriter::new(file), &summary)?;

    log_fee_summary(&output.fee_summary);
    info!(output_dir = %output_dir.display(), "simulation complete");

    Ok(())
}

fn log_fee_summary(summary: &FeeSummary) {
    info!(
        trades = summary.trades,
        total_volume = summary.total_volume,
        avg_total_fee_per_trade = summary.avg_total_fee_per_trade,
        total_fee_fraction = summary.total_fee_fraction,
        base_contribution = summary.base_contribution,
        toxicity_contribution = summary.toxicity_contribution,
        "fee summary"
    );

    for day in summary.top_days(TOP_DAYS) {
        info!(
            date = %day.date,
            trades = day.trades,
            volume = day.volume,
            total_fees = day.total_fees,
            toxicity_fees = day.toxicity_fees,
            "top fee day"
        );
    }
}

/// Read one JSON record per non-blank line.
fn read_jsonl<T>(path: &Path) -> Result<Vec<T>, SimError>
where
    T: DeserializeOwned,
{
    let file = File::open(path).map_err(SimError::io(path))?;

    let mut records = Vec::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(SimError::io(path))?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line).map_err(|source| SimError::Parse {
            path: path.to_path_buf(),
            line: index + 1,
            source,
        })?;
        records.push(record);
    }

    if records.is_empty() {
        warn!(path = %path.display(), "input file contains no records");
    }

    Ok(records)
}

fn write_jsonl<T>(path: &Path, records: &[T]) -> Result<(), SimError>
where
    T: Serialize,
{
    let file = File::create(path).map_err(SimError::io(path))?;
    let mut writer = BufWriter::new(file);

    for record in records {
        serde_json::to_writer(&mut writer, record)?;
        writer.write_all(b"\n").map_err(SimError::io(path))?;
    }
    writer.flush().map_err(SimError::io(path))?;

    info!(path = %path.display(), rows = records.len(), "wrote output series");
    Ok(())
}

fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    match std::env::var("LOG_FORMAT").as_deref() {
        Ok("json") => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init(),
        _ => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_impact_observation_is_sentinel() {
        struct TestCase {
            input: &'static str,
            expected: bool,
        }

        let tests = vec![
            TestCase {
                // TC0: explicit null is missing, not discarded
                input: r#"{"timestamp": "2024-01-01T00:00:00Z", "impact": null}"#,
                expected: false,
            },
            TestCase {
                // TC1: absent field is missing, not discarded
                input: r#"{"timestamp": "2024-01-01T00:00:00Z"}"#,
                expected: false,
            },
            TestCase {
                // TC2: zero reading is the feed's sentinel
                input: r#"{"timestamp": "2024-01-01T00:00:00Z", "impact": 0.0}"#,
                expected: true,
            },
            TestCase {
                // TC3: valid reading
                input: r#"{"timestamp": "2024-01-01T00:00:00Z", "impact": 1250.5}"#,
                expected: false,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = serde_json::from_str::<RawImpactObservation>(test.input)
                .unwrap()
                .is_sentinel();
            assert_eq!(actual, test.expected, "TC{} failed", index);
        }
    }
}
