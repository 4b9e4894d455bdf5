//! Run configuration.
//!
//! Defaults match the reference backtest: 0.05% base fee, the 50-bucket window, 50
//! buckets per average day and a 10 token0 position with a 15% price buffer. Every field
//! can be overridden from the environment via [`SimConfig::from_env`].

use crate::{error::FeeModelError, fee::FeeParams, toxicity::ToxicityWindow};
use derive_more::Constructor;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::str::FromStr;
use tracing::warn;

/// Sizing of the simulated liquidity position.
#[derive(Debug, Clone, Copy, PartialEq, Constructor, Deserialize, Serialize)]
pub struct PositionConfig {
    /// Token0 deposited at the first trade's price
    pub token0_amount: f64,
    /// Fractional padding applied below the lowest and above the highest observed price
    pub buffer_factor: f64,
}

impl PositionConfig {
    pub fn validate(&self) -> Result<(), FeeModelError> {
        if !self.token0_amount.is_finite() || self.token0_amount <= 0.0 {
            return Err(FeeModelError::InvalidConfig(format!(
                "token0_amount must be positive, got {}",
                self.token0_amount
            )));
        }
        if !(0.0..1.0).contains(&self.buffer_factor) {
            return Err(FeeModelError::InvalidConfig(format!(
                "buffer_factor must be in [0, 1), got {}",
                self.buffer_factor
            )));
        }
        Ok(())
    }
}

impl Default for PositionConfig {
    fn default() -> Self {
        Self {
            token0_amount: 10.0,
            buffer_factor: 0.15,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SimConfig {
    /// Instrument (pool) identifier, used for logging only
    pub instrument: SmolStr,
    /// Flat fee as a fraction of volume
    pub base_fee_rate: f64,
    pub window: ToxicityWindow,
    /// Divisor of mean daily volume giving the bucket size
    pub buckets_per_day: usize,
    pub position: PositionConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            instrument: SmolStr::new_static("unknown"),
            base_fee_rate: 0.0005,
            window: ToxicityWindow::Short,
            buckets_per_day: 50,
            position: PositionConfig::default(),
        }
    }
}

impl SimConfig {
    /// Defaults overlaid with any `VPIN_*` environment variables that are set.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unparseable values keep their default.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        Self {
            instrument: lookup("VPIN_INSTRUMENT")
                .map(SmolStr::from)
                .unwrap_or(defaults.instrument),
            base_fee_rate: parse_or(&lookup, "VPIN_BASE_FEE_RATE", defaults.base_fee_rate),
            window: parse_or(&lookup, "VPIN_WINDOW", defaults.window),
            buckets_per_day: parse_or(&lookup, "VPIN_BUCKETS_PER_DAY", defaults.buckets_per_day),
            position: PositionConfig::new(
                parse_or(&lookup, "VPIN_TOKEN0_AMOUNT", defaults.position.token0_amount),
                parse_or(&lookup, "VPIN_BUFFER_FACTOR", defaults.position.buffer_factor),
            ),
        }
    }

    /// Validate the parameters every run uses. The position sizing is only checked
    /// when a position is built from it, see [`PositionConfig::validate`].
    pub fn validate(&self) -> Result<(), FeeModelError> {
        self.fee_params().validate()?;

        if self.buckets_per_day == 0 {
            return Err(FeeModelError::InvalidConfig(
                "buckets_per_day must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn fee_params(&self) -> FeeParams {
        FeeParams {
            base_fee_rate: self.base_fee_rate,
            window: self.window,
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + Copy,
{
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, "unparseable config value, using default");
            default
        }),
    }
}
