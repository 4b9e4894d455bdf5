//! Run-level summaries of the toxicity and fee series.

use crate::{
    fee::FeeRecord,
    toxicity::{ToxicityRecord, ToxicityWindow},
};
use chrono::NaiveDate;
use itertools::{Itertools, MinMaxResult};
use serde::{Deserialize, Serialize};

/// Final value and observed range of one toxicity window.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct WindowSummary {
    pub window: ToxicityWindow,
    pub last: f64,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ToxicitySummary {
    pub buckets: usize,
    pub has_partial_bucket: bool,
    pub mean_order_imbalance: Option<f64>,
    /// One entry per window, empty when no bucket closed
    pub windows: Vec<WindowSummary>,
}

impl ToxicitySummary {
    pub fn from_records(records: &[ToxicityRecord]) -> Self {
        let mean_order_imbalance = (!records.is_empty()).then(|| {
            records.iter().map(|record| record.order_imbalance).sum::<f64>() / records.len() as f64
        });

        let windows = ToxicityWindow::ALL
            .into_iter()
            .filter_map(|window| {
                let values = records.iter().map(|record| record.value(window));
                let (min, max) = match values.minmax_by(f64::total_cmp) {
                    MinMaxResult::NoElements => return None,
                    MinMaxResult::OneElement(value) => (value, value),
                    MinMaxResult::MinMax(min, max) => (min, max),
                };
                let last = records.last()?.value(window);
                Some(WindowSummary {
                    window,
                    last,
                    min,
                    max,
                })
            })
            .collect();

        Self {
            buckets: records.len(),
            has_partial_bucket: records.last().is_some_and(|record| record.is_partial),
            mean_order_imbalance,
            windows,
        }
    }
}

/// Fees collected on one UTC day.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct DailyFees {
    pub date: NaiveDate,
    pub trades: usize,
    pub volume: f64,
    pub base_fees: f64,
    pub toxicity_fees: f64,
    pub total_fees: f64,
}

/// Aggregate fee statistics over trades that carried volume.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FeeSummary {
    pub trades: usize,
    pub total_volume: f64,
    pub total_base_fees: f64,
    pub total_toxicity_fees: f64,
    pub total_fees: f64,
    pub avg_base_fee_per_trade: f64,
    pub avg_toxicity_fee_per_trade: f64,
    pub avg_total_fee_per_trade: f64,
    /// Fees as a fraction of total volume
    pub base_fee_fraction: f64,
    pub toxicity_fee_fraction: f64,
    pub total_fee_fraction: f64,
    /// Share of total fees contributed by the base rate and the toxicity premium
    pub base_contribution: f64,
    pub toxicity_contribution: f64,
    pub daily: Vec<DailyFees>,
}

impl FeeSummary {
    pub fn from_records(records: &[FeeRecord]) -> Self {
        let traded = records
            .iter()
            .filter(|record| record.abs_volume > 0.0)
            .collect::<Vec<_>>();

        let daily = traded
            .iter()
            .chunk_by(|record| record.timestamp.date_naive())
            .into_iter()
            .map(|(date, day)| {
                day.fold(
                    DailyFees {
                        date,
                        trades: 0,
                        volume: 0.0,
                        base_fees: 0.0,
                        toxicity_fees: 0.0,
                        total_fees: 0.0,
                    },
                    |mut acc, record| {
                        acc.trades += 1;
                        acc.volume += record.abs_volume;
                        acc.base_fees += record.base_fee;
                        acc.toxicity_fees += record.toxicity_fee;
                        acc.total_fees += record.total_fee;
                        acc
                    },
                )
            })
            .collect::<Vec<_>>();

        let trades = traded.len();
        let total_volume = daily.iter().map(|day| day.volume).sum::<f64>();
        let total_base_fees = daily.iter().map(|day| day.base_fees).sum::<f64>();
        let total_toxicity_fees = daily.iter().map(|day| day.toxicity_fees).sum::<f64>();
        let total_fees = daily.iter().map(|day| day.total_fees).sum::<f64>();

        let per_trade = |total: f64| ratio(total, trades as f64);
        let per_volume = |total: f64| ratio(total, total_volume);
        let per_fee = |total: f64| ratio(total, total_fees);

        Self {
            trades,
            total_volume,
            total_base_fees,
            total_toxicity_fees,
            total_fees,
            avg_base_fee_per_trade: per_trade(total_base_fees),
            avg_toxicity_fee_per_trade: per_trade(total_toxicity_fees),
            avg_total_fee_per_trade: per_trade(total_fees),
            base_fee_fraction: per_volume(total_base_fees),
            toxicity_fee_fraction: per_volume(total_toxicity_fees),
            total_fee_fraction: per_volume(total_fees),
            base_contribution: per_fee(total_base_fees),
            toxicity_contribution: per_fee(total_toxicity_fees),
            daily,
        }
    }

    /// The `n` days with the highest total fees, highest first.
    pub fn top_days(&self, n: usize) -> Vec<DailyFees> {
        self.daily
            .iter()
            .copied()
            .sorted_by(|a, b| b.total_fees.total_cmp(&a.total_fees))
            .take(n)
            .collect()
    }
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}
