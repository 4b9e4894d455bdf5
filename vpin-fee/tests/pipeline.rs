use chrono::{DateTime, Duration, TimeZone, Utc};
use vpin_fee::{
    FeeModelError, ImpactObservation, SimConfig, ToxicityWindow, Trade, aggregate, align_impacts,
    run, run_with_covering_position,
};

const TOLERANCE: f64 = 1e-9;

/// Route pipeline logs through the test harness; `RUST_LOG=vpin_fee=debug` to see them.
fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
}

/// Deterministic three-day tape with a trade every five minutes, mixed direction,
/// occasional zero-volume rows and a sparse impact reading.
fn tape() -> Vec<Trade> {
    (0..864)
        .map(|i: i64| {
            let seed = (i * 7919 + 104_729) % 1000;
            let direction = if seed % 3 == 0 { -1.0 } else { 1.0 };
            let volume = if i % 97 == 0 { 0.0 } else { direction * (1.0 + seed as f64 / 50.0) };
            let price = 2000.0 + 150.0 * ((i as f64) / 60.0).sin();

            let trade = Trade::new(start() + Duration::minutes(5 * i), volume, price);
            if i % 7 == 0 {
                trade.with_impact(50.0 + seed as f64)
            } else {
                trade
            }
        })
        .collect()
}

#[test]
fn test_volume_clock_split_scenario() {
    let trades = [30.0, -20.0, 60.0]
        .into_iter()
        .enumerate()
        .map(|(i, volume)| Trade::new(start() + Duration::seconds(i as i64), volume, 100.0))
        .collect::<Vec<_>>();

    let buckets = aggregate(&trades, 50.0).unwrap();

    assert_eq!(buckets.len(), 3);

    assert_eq!(buckets[0].abs_volume, 50.0);
    assert!((buckets[0].net_volume - 10.0).abs() < TOLERANCE);
    assert!((buckets[0].order_imbalance - 0.2).abs() < TOLERANCE);
    assert_eq!(buckets[0].closing_timestamp, trades[1].timestamp);
    assert!(!buckets[0].is_partial);

    assert!((buckets[1].net_volume - 50.0).abs() < TOLERANCE);
    assert!((buckets[1].order_imbalance - 1.0).abs() < TOLERANCE);
    assert_eq!(buckets[1].closing_timestamp, trades[2].timestamp);
    assert!(!buckets[1].is_partial);

    assert!((buckets[2].abs_volume - 10.0).abs() < TOLERANCE);
    assert!((buckets[2].order_imbalance - 0.2).abs() < TOLERANCE);
    assert!(buckets[2].is_partial);
}

#[test]
fn test_full_run_invariants() {
    init_logging();

    let trades = tape();
    let (position, output) = run_with_covering_position(&trades, &SimConfig::default()).unwrap();

    assert!(output.bucket_size > 0.0);
    assert_eq!(output.fees.len(), trades.len());

    // Every bucket but the last is exactly full
    let (last, full) = output.toxicity.split_last().unwrap();
    for record in full {
        assert!((record.abs_volume - output.bucket_size).abs() < output.bucket_size * 1e-9);
        assert!((0.0..=1.0 + TOLERANCE).contains(&record.order_imbalance));
        assert!(!record.is_partial);
    }
    assert!(last.abs_volume <= output.bucket_size + TOLERANCE);

    // Bucketed volume equals tape volume
    let tape_volume = trades.iter().map(Trade::abs_volume).sum::<f64>();
    let bucket_volume = output.toxicity.iter().map(|record| record.abs_volume).sum::<f64>();
    assert!((tape_volume - bucket_volume).abs() < 1e-6);

    // Window sample counts never exceed their length
    for record in &output.toxicity {
        for window in ToxicityWindow::ALL {
            assert!(record.samples.get(window) <= window.buckets());
        }
    }

    for (trade, fee) in trades.iter().zip(&output.fees) {
        assert!(fee.inventory_exposure >= 0.0 && fee.inventory_exposure <= 1.0);
        assert!(fee.total_fee >= fee.base_fee);
        assert!(trade.price > position.lower_price() && trade.price < position.upper_price());
        if !trade.has_volume() {
            assert_eq!(fee.total_fee, 0.0);
            assert_eq!(fee.fee_fraction, None);
        }
    }

    assert!(output.fee_summary.total_toxicity_fees > 0.0);
    assert_eq!(output.fee_summary.daily.len(), 3);
}

#[test]
fn test_rerun_is_bit_identical() {
    init_logging();

    let trades = tape();
    let config = SimConfig::default();

    let (_, first) = run_with_covering_position(&trades, &config).unwrap();
    let (_, second) = run_with_covering_position(&trades, &config).unwrap();

    assert_eq!(first.bucket_size.to_bits(), second.bucket_size.to_bits());
    assert_eq!(first.toxicity, second.toxicity);
    for (a, b) in first.fees.iter().zip(&second.fees) {
        assert_eq!(a.total_fee.to_bits(), b.total_fee.to_bits());
    }
    assert_eq!(first, second);
}

#[test]
fn test_toxicity_used_comes_from_closed_buckets_only() {
    init_logging();

    let trades = tape();
    let (_, output) = run_with_covering_position(&trades, &SimConfig::default()).unwrap();

    for fee in &output.fees {
        let Some(bucket_index) = fee.toxicity_bucket else {
            // Nothing can have closed yet
            assert!(output.toxicity[0].closing_timestamp > fee.timestamp);
            continue;
        };

        let bucket = &output.toxicity[bucket_index as usize];
        assert!(bucket.closing_timestamp <= fee.timestamp);
        assert!(!bucket.is_partial);
        assert_eq!(fee.toxicity_used, Some(bucket.value(ToxicityWindow::Short)));

        // No later full bucket had closed by this trade
        if let Some(next) = output.toxicity.get(bucket_index as usize + 1) {
            assert!(next.is_partial || next.closing_timestamp > fee.timestamp);
        }
    }
}

#[test]
fn test_own_impact_reading_never_prices_own_trade() {
    init_logging();

    let trades = tape();
    let config = SimConfig::default();
    let (position, baseline) = run_with_covering_position(&trades, &config).unwrap();

    // Change one trade's own reading: its fee and every earlier fee must not move
    let changed = 140;
    assert!(trades[changed].has_volume());
    let mut altered = trades.clone();
    altered[changed] = altered[changed].with_impact(9_999_999.0);

    let output = run(&altered, &config, &position).unwrap();

    for (actual, expected) in output.fees[..=changed].iter().zip(&baseline.fees[..=changed]) {
        assert_eq!(actual.impact_used, expected.impact_used);
        assert_eq!(actual.total_fee.to_bits(), expected.total_fee.to_bits());
    }
    assert_eq!(output.fees[changed].impact_observed, Some(9_999_999.0));
    assert_eq!(output.fees[changed + 1].impact_used, Some(9_999_999.0));
    assert_ne!(
        output.fees[changed + 1].total_fee,
        baseline.fees[changed + 1].total_fee
    );
}

#[test]
fn test_aligned_impact_series() {
    let mut trades = (0..4)
        .map(|i| Trade::new(start() + Duration::minutes(i), 10.0, 100.0))
        .collect::<Vec<_>>();

    let observations = vec![
        // Zero reading is treated as missing
        ImpactObservation::new(start(), Some(0.0)),
        ImpactObservation::new(start() + Duration::seconds(30), Some(2_000.0)),
        ImpactObservation::new(start() + Duration::minutes(10), Some(5_000.0)),
    ];

    let attached = align_impacts(&mut trades, &observations).unwrap();

    assert_eq!(attached, 1);
    assert_eq!(trades[0].impact, None);
    assert_eq!(trades[1].impact, Some(2_000.0));
    assert_eq!(trades[3].impact, None);
}

#[test]
fn test_invalid_tapes_abort_run() {
    init_logging();

    struct TestCase {
        input: Vec<Trade>,
        expected: fn(&FeeModelError) -> bool,
    }

    let tests = vec![
        TestCase {
            // TC0: empty tape
            input: vec![],
            expected: |error| matches!(error, FeeModelError::MissingInput(_)),
        },
        TestCase {
            // TC1: timestamps decrease
            input: vec![
                Trade::new(start() + Duration::seconds(5), 1.0, 100.0),
                Trade::new(start(), 1.0, 100.0),
            ],
            expected: |error| matches!(error, FeeModelError::OutOfOrder { index: 1, .. }),
        },
        TestCase {
            // TC2: non-finite price
            input: vec![Trade::new(start(), 1.0, f64::NAN)],
            expected: |error| matches!(error, FeeModelError::InvalidTrade { index: 0, .. }),
        },
        TestCase {
            // TC3: no volume anywhere
            input: vec![
                Trade::new(start(), 0.0, 100.0),
                Trade::new(start() + Duration::seconds(1), 0.0, 110.0),
            ],
            expected: |error| matches!(error, FeeModelError::MissingInput(_)),
        },
    ];

    for (index, test) in tests.into_iter().enumerate() {
        let actual = run_with_covering_position(&test.input, &SimConfig::default());
        match actual {
            Err(error) => {
                assert!((test.expected)(&error), "TC{} failed: {error}", index);
                assert!(error.is_input_error(), "TC{} failed", index);
            }
            Ok(_) => panic!("TC{} failed: expected error", index),
        }
    }
}
