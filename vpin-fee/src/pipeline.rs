//! Batch pipeline: one ordered pass per stage over a fully loaded trade tape.

use crate::{
    config::SimConfig,
    error::FeeModelError,
    fee::{FeeRecord, estimate_fees},
    inventory::{ConcentratedPosition, InventoryModel, PriceRange},
    summary::{FeeSummary, ToxicitySummary},
    toxicity::{ToxicityRecord, rolling_toxicity},
    trade::{Trade, validate_tape},
    volume_clock::{aggregate, bucket_size},
};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Everything produced by one run.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SimulationOutput {
    pub bucket_size: f64,
    /// One row per bucket, in bucket order
    pub toxicity: Vec<ToxicityRecord>,
    /// One row per trade, in tape order
    pub fees: Vec<FeeRecord>,
    pub toxicity_summary: ToxicitySummary,
    pub fee_summary: FeeSummary,
}

/// Run every stage over `trades` with the given inventory model.
///
/// Any failure aborts the whole run; no partial output is returned.
pub fn run<M>(
    trades: &[Trade],
    config: &SimConfig,
    model: &M,
) -> Result<SimulationOutput, FeeModelError>
where
    M: InventoryModel + ?Sized,
{
    config.validate()?;
    validate_tape(trades)?;

    simulate(trades, config, model)
}

/// Size a [`ConcentratedPosition`] covering the tape's price range and run every stage
/// against it.
pub fn run_with_covering_position(
    trades: &[Trade],
    config: &SimConfig,
) -> Result<(ConcentratedPosition, SimulationOutput), FeeModelError> {
    config.validate()?;
    config.position.validate()?;
    validate_tape(trades)?;

    let range = PriceRange::from_trades(trades)?;
    let position = ConcentratedPosition::covering(
        &range,
        config.position.token0_amount,
        config.position.buffer_factor,
    )?;

    info!(
        initial_price = range.initial,
        min_price = range.min,
        max_price = range.max,
        lower_price = position.lower_price(),
        upper_price = position.upper_price(),
        liquidity = position.liquidity(),
        "sized covering position"
    );

    let output = simulate(trades, config, &position)?;
    Ok((position, output))
}

/// Stages after validation; `config` and `trades` must already have been checked.
fn simulate<M>(
    trades: &[Trade],
    config: &SimConfig,
    model: &M,
) -> Result<SimulationOutput, FeeModelError>
where
    M: InventoryModel + ?Sized,
{
    info!(
        instrument = %config.instrument,
        trades = trades.len(),
        window = %config.window,
        base_fee_rate = config.base_fee_rate,
        "starting simulation"
    );

    let bucket_size = bucket_size(trades, config.buckets_per_day)?;
    let buckets = aggregate(trades, bucket_size)?;
    let toxicity = rolling_toxicity(&buckets);
    let toxicity_summary = ToxicitySummary::from_records(&toxicity);

    info!(
        buckets = toxicity_summary.buckets,
        partial = toxicity_summary.has_partial_bucket,
        "computed rolling toxicity"
    );
    for window in &toxicity_summary.windows {
        info!(
            window = window.window.label(),
            last = window.last,
            min = window.min,
            max = window.max,
            "toxicity window"
        );
    }

    let fees = estimate_fees(trades, &toxicity, config.fee_params(), model)?;
    let fee_summary = FeeSummary::from_records(&fees);

    info!(
        trades = fee_summary.trades,
        total_volume = fee_summary.total_volume,
        base_fees = fee_summary.total_base_fees,
        toxicity_fees = fee_summary.total_toxicity_fees,
        total_fees = fee_summary.total_fees,
        "estimated dynamic fees"
    );

    Ok(SimulationOutput {
        bucket_size,
        toxicity,
        fees,
        toxicity_summary,
        fee_summary,
    })
}
