//! Trade tape and price-impact observation types.
//!
//! These are the records consumed by every stage of the pipeline. The upstream feed
//! overloads an impact reading of exactly zero as "no reading", so impact values are
//! sanitized into `Option<f64>` here, at the ingestion boundary, and never travel as a
//! zero sentinel.

use crate::error::FeeModelError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One observation from the trade tape.
///
/// Immutable once read. The sign of `signed_volume` encodes the trade direction.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct Trade {
    /// Time of the trade (monotonic across the tape, not necessarily unique)
    pub timestamp: DateTime<Utc>,
    /// Traded volume, positive for buys and negative for sells
    pub signed_volume: f64,
    /// Execution price (> 0)
    pub price: f64,
    /// Realized price-impact reading aligned with this trade, if any
    #[serde(default, deserialize_with = "de_impact")]
    pub impact: Option<f64>,
}

impl Trade {
    pub fn new(timestamp: DateTime<Utc>, signed_volume: f64, price: f64) -> Self {
        Self {
            timestamp,
            signed_volume,
            price,
            impact: None,
        }
    }

    /// Attach an impact reading, discarding it if it is a missing-value sentinel.
    pub fn with_impact(mut self, impact: f64) -> Self {
        self.impact = ImpactObservation::sanitize(Some(impact));
        self
    }

    pub fn abs_volume(&self) -> f64 {
        self.signed_volume.abs()
    }

    pub fn has_volume(&self) -> bool {
        self.signed_volume != 0.0
    }
}

/// A reading from the independent price-impact (ILLIQ) series.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct ImpactObservation {
    pub timestamp: DateTime<Utc>,
    #[serde(default, deserialize_with = "de_impact")]
    pub impact: Option<f64>,
}

impl ImpactObservation {
    pub fn new(timestamp: DateTime<Utc>, impact: Option<f64>) -> Self {
        Self {
            timestamp,
            impact: Self::sanitize(impact),
        }
    }

    /// Map a raw feed value onto an explicit optional reading.
    ///
    /// Exactly zero and non-finite values mean "no reading".
    pub fn sanitize(raw: Option<f64>) -> Option<f64> {
        raw.filter(|value| value.is_finite() && *value != 0.0)
    }
}

fn de_impact<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<f64>::deserialize(deserializer).map(ImpactObservation::sanitize)
}

/// Attach an independent impact series to the trade tape.
///
/// Each observation lands on the first trade whose timestamp is at or after its own. If
/// several observations land on the same trade the latest valid one wins, and a reading
/// already carried on the tape is replaced. Observations later than the final trade have
/// nothing to attach to and are dropped.
///
/// The trades must already be in ascending timestamp order; observations out of order
/// are rejected. Returns the number of observations that were attached.
pub fn align_impacts(
    trades: &mut [Trade],
    observations: &[ImpactObservation],
) -> Result<usize, FeeModelError> {
    if let Some(index) = observations
        .windows(2)
        .position(|pair| pair[1].timestamp < pair[0].timestamp)
    {
        return Err(FeeModelError::OutOfOrder {
            index: index + 1,
            previous: observations[index].timestamp,
            current: observations[index + 1].timestamp,
        });
    }

    let mut attached = 0;
    let mut replaced = 0;
    let mut cursor = 0;

    for observation in observations {
        let Some(impact) = observation.impact else {
            continue;
        };

        while cursor < trades.len() && trades[cursor].timestamp < observation.timestamp {
            cursor += 1;
        }

        match trades.get_mut(cursor) {
            Some(trade) => {
                if trade.impact.is_some_and(|existing| existing != impact) {
                    replaced += 1;
                }
                trade.impact = Some(impact);
                attached += 1;
            }
            None => break,
        }
    }

    if replaced > 0 {
        debug!(replaced, "impact readings already on the tape were replaced");
    }

    let dropped = observations.iter().filter(|obs| obs.impact.is_some()).count() - attached;
    if dropped > 0 {
        debug!(dropped, "impact observations after the final trade were dropped");
    }

    Ok(attached)
}

/// Check the tape is non-empty, finite, positively priced and in timestamp order.
pub fn validate_tape(trades: &[Trade]) -> Result<(), FeeModelError> {
    if trades.is_empty() {
        return Err(FeeModelError::MissingInput("empty trade tape".to_string()));
    }

    let mut previous: Option<DateTime<Utc>> = None;
    for (index, trade) in trades.iter().enumerate() {
        if !trade.signed_volume.is_finite() {
            return Err(FeeModelError::InvalidTrade {
                index,
                reason: format!("signed volume is not finite: {}", trade.signed_volume),
            });
        }
        if !trade.price.is_finite() || trade.price <= 0.0 {
            return Err(FeeModelError::InvalidTrade {
                index,
                reason: format!("price must be finite and positive: {}", trade.price),
            });
        }
        match previous {
            Some(previous) if trade.timestamp < previous => {
                return Err(FeeModelError::OutOfOrder {
                    index,
                    previous,
                    current: trade.timestamp,
                });
            }
            _ => {}
        }
        previous = Some(trade.timestamp);
    }

    Ok(())
}
