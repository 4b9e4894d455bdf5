//! Volume-clock bucketing of the trade tape.
//!
//! Trades are accumulated into buckets of a fixed absolute volume `B`. A bucket closes
//! precisely at `B`: the trade that crosses the threshold is split, with its signed
//! volume divided pro-rata to the absolute volume taken, and the remainder carried into
//! the next bucket. One large trade may close several buckets.
//!
//! `B` is a whole-tape statistic (mean daily absolute volume / buckets per day) and is
//! computed once by [`bucket_size`] before streaming begins. Suitable for offline
//! backtests only: a live deployment would need an online estimate instead.

use crate::{error::FeeModelError, trade::Trade};
use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Residual volume below `B * RESIDUAL_TOLERANCE` is floating-point dust, not a trade.
const RESIDUAL_TOLERANCE: f64 = 1e-12;

/// A closed (or final partial) volume bucket.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct Bucket {
    /// Sequence position, gap-free from 0
    pub bucket_index: u64,
    /// Accumulated absolute volume, exactly `B` unless `is_partial`
    pub abs_volume: f64,
    /// Accumulated signed volume
    pub net_volume: f64,
    /// `|net_volume| / B`
    pub order_imbalance: f64,
    /// Timestamp of the trade that completed the bucket
    pub closing_timestamp: DateTime<Utc>,
    /// Position of the completing trade within the non-zero-volume tape
    pub closing_trade_index: usize,
    /// Final bucket that never reached `B`; not a full-strength sample
    pub is_partial: bool,
}

/// Compute the run-wide bucket size from the full tape.
///
/// Zero-volume trades are ignored. Days are UTC calendar days that carry at least one
/// trade; the tape must already be in timestamp order so each day forms one run.
pub fn bucket_size(trades: &[Trade], buckets_per_day: usize) -> Result<f64, FeeModelError> {
    if buckets_per_day == 0 {
        return Err(FeeModelError::InvalidConfig(
            "buckets_per_day must be greater than 0".to_string(),
        ));
    }

    let daily_volumes = trades
        .iter()
        .filter(|trade| trade.has_volume())
        .chunk_by(|trade| trade.timestamp.date_naive())
        .into_iter()
        .map(|(_, day)| day.map(Trade::abs_volume).sum::<f64>())
        .collect::<Vec<_>>();

    if daily_volumes.is_empty() {
        return Err(FeeModelError::MissingInput(
            "no trades with positive volume".to_string(),
        ));
    }

    let mean_daily_volume = daily_volumes.iter().sum::<f64>() / daily_volumes.len() as f64;
    let bucket_size = mean_daily_volume / buckets_per_day as f64;

    if !bucket_size.is_finite() || bucket_size <= 0.0 {
        return Err(FeeModelError::DegenerateBucket { bucket_size });
    }

    info!(
        days = daily_volumes.len(),
        mean_daily_volume, bucket_size, "computed volume-clock bucket size"
    );

    Ok(bucket_size)
}

/// Streaming volume-clock aggregator.
///
/// Feed trades in timestamp order with [`update`](Self::update), then call
/// [`finish`](Self::finish) to flush the trailing partial bucket.
#[derive(Debug, Clone)]
pub struct VolumeClockAggregator {
    bucket_size: f64,
    abs_volume: f64,
    net_volume: f64,
    next_index: u64,
    last_trade: Option<(DateTime<Utc>, usize)>,
    trade_count: usize,
}

impl VolumeClockAggregator {
    pub fn new(bucket_size: f64) -> Result<Self, FeeModelError> {
        if !bucket_size.is_finite() || bucket_size <= 0.0 {
            return Err(FeeModelError::DegenerateBucket { bucket_size });
        }

        Ok(Self {
            bucket_size,
            abs_volume: 0.0,
            net_volume: 0.0,
            next_index: 0,
            last_trade: None,
            trade_count: 0,
        })
    }

    pub fn bucket_size(&self) -> f64 {
        self.bucket_size
    }

    /// Distribute one trade across the open bucket and as many fresh buckets as it fills.
    ///
    /// Returns the buckets this trade closed, oldest first. Zero-volume trades carry no
    /// information for the volume clock and are skipped without consuming a trade index.
    pub fn update(&mut self, trade: &Trade) -> Vec<Bucket> {
        if !trade.has_volume() {
            return Vec::new();
        }

        let trade_index = self.trade_count;
        self.trade_count += 1;
        self.last_trade = Some((trade.timestamp, trade_index));

        let abs_trade_volume = trade.abs_volume();
        let dust = self.bucket_size * RESIDUAL_TOLERANCE;

        let mut remaining_abs = abs_trade_volume;
        let mut remaining_net = trade.signed_volume;
        let mut closed = Vec::new();

        while remaining_abs > 0.0 {
            let room = self.bucket_size - self.abs_volume;

            if remaining_abs >= room {
                remaining_abs -= room;
                // The last fragment takes whatever signed volume is left so the pieces
                // sum to the trade's signed volume exactly. A leftover below the dust
                // threshold is split residue and folds into this bucket.
                let net_take = if remaining_abs > dust {
                    trade.signed_volume * (room / abs_trade_volume)
                } else {
                    remaining_abs = 0.0;
                    remaining_net
                };
                remaining_net -= net_take;

                self.abs_volume = self.bucket_size;
                self.net_volume += net_take;
                closed.push(self.close_bucket(trade.timestamp, trade_index, false));
            } else {
                self.abs_volume += remaining_abs;
                self.net_volume += remaining_net;
                remaining_abs = 0.0;
                remaining_net = 0.0;
            }
        }

        closed
    }

    /// Flush the trailing bucket if it holds any volume, marked partial.
    ///
    /// Its imbalance is still normalised by `B`, so it understates the imbalance of the
    /// volume it did see.
    pub fn finish(mut self) -> Option<Bucket> {
        match self.last_trade {
            Some((timestamp, trade_index)) if self.abs_volume > 0.0 => {
                Some(self.close_bucket(timestamp, trade_index, true))
            }
            _ => None,
        }
    }

    fn close_bucket(
        &mut self,
        closing_timestamp: DateTime<Utc>,
        closing_trade_index: usize,
        is_partial: bool,
    ) -> Bucket {
        let bucket = Bucket {
            bucket_index: self.next_index,
            abs_volume: self.abs_volume,
            net_volume: self.net_volume,
            order_imbalance: self.net_volume.abs() / self.bucket_size,
            closing_timestamp,
            closing_trade_index,
            is_partial,
        };

        self.next_index += 1;
        self.abs_volume = 0.0;
        self.net_volume = 0.0;

        bucket
    }
}

/// Bucket an entire tape with a precomputed bucket size.
pub fn aggregate(trades: &[Trade], bucket_size: f64) -> Result<Vec<Bucket>, FeeModelError> {
    let mut aggregator = VolumeClockAggregator::new(bucket_size)?;

    let mut buckets = trades
        .iter()
        .flat_map(|trade| aggregator.update(trade))
        .collect::<Vec<_>>();
    buckets.extend(aggregator.finish());

    Ok(buckets)
}
