//! Concentrated-liquidity inventory model.
//!
//! Maps a price to the position's token composition and its inventory exposure, the
//! share of position value held in token0 (the risk asset). Outside the configured
//! range the position is single-sided and exposure saturates at 1 (below) or 0 (above).

use crate::{error::FeeModelError, trade::Trade};
use serde::{Deserialize, Serialize};

/// Pure price -> inventory mapping consumed by the fee estimator.
pub trait InventoryModel {
    /// Token composition of the position at `price`.
    fn token_amounts(&self, price: f64) -> TokenAmounts;

    /// Fraction of position value held in token0, in `[0, 1]`.
    fn inventory_exposure(&self, price: f64) -> f64 {
        self.token_amounts(price).exposure(price)
    }
}

impl<M: InventoryModel + ?Sized> InventoryModel for &M {
    fn token_amounts(&self, price: f64) -> TokenAmounts {
        (**self).token_amounts(price)
    }

    fn inventory_exposure(&self, price: f64) -> f64 {
        (**self).inventory_exposure(price)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize, Serialize)]
pub struct TokenAmounts {
    pub token0: f64,
    pub token1: f64,
}

impl TokenAmounts {
    /// Position value denominated in token1.
    pub fn value(&self, price: f64) -> f64 {
        self.token0 * price + self.token1
    }

    pub fn exposure(&self, price: f64) -> f64 {
        let value = self.value(price);
        if value > 0.0 {
            (self.token0 * price / value).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

/// Descriptive statistics of the tape's prices, used to size a covering position.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct PriceRange {
    pub initial: f64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    /// Sample standard deviation, `None` with fewer than two trades
    pub std_dev: Option<f64>,
}

impl PriceRange {
    pub fn from_trades(trades: &[Trade]) -> Result<Self, FeeModelError> {
        let first = trades
            .first()
            .ok_or_else(|| FeeModelError::MissingInput("empty trade tape".to_string()))?;

        let (min, max, sum) = trades.iter().fold(
            (f64::INFINITY, f64::NEG_INFINITY, 0.0),
            |(min, max, sum), trade| (min.min(trade.price), max.max(trade.price), sum + trade.price),
        );
        let count = trades.len() as f64;
        let mean = sum / count;

        let std_dev = (trades.len() >= 2).then(|| {
            let variance = trades
                .iter()
                .map(|trade| (trade.price - mean).powi(2))
                .sum::<f64>()
                / (count - 1.0);
            variance.sqrt()
        });

        Ok(Self {
            initial: first.price,
            min,
            max,
            mean,
            std_dev,
        })
    }
}

/// A Uniswap-v3 style position with fixed bounds and liquidity.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct ConcentratedPosition {
    lower_price: f64,
    upper_price: f64,
    liquidity: f64,
    sqrt_lower: f64,
    sqrt_upper: f64,
}

impl ConcentratedPosition {
    pub fn new(lower_price: f64, upper_price: f64, liquidity: f64) -> Result<Self, FeeModelError> {
        if !(lower_price.is_finite() && upper_price.is_finite())
            || lower_price <= 0.0
            || lower_price >= upper_price
        {
            return Err(FeeModelError::InvalidPosition(format!(
                "bounds must satisfy 0 < lower < upper, got lower={lower_price} upper={upper_price}"
            )));
        }
        if !liquidity.is_finite() || liquidity <= 0.0 {
            return Err(FeeModelError::InvalidPosition(format!(
                "liquidity must be positive, got {liquidity}"
            )));
        }

        Ok(Self {
            lower_price,
            upper_price,
            liquidity,
            sqrt_lower: lower_price.sqrt(),
            sqrt_upper: upper_price.sqrt(),
        })
    }

    /// Size a position from the token0 deposit at `initial_price`.
    pub fn from_token0(
        initial_price: f64,
        lower_price: f64,
        upper_price: f64,
        token0_amount: f64,
    ) -> Result<Self, FeeModelError> {
        if !(initial_price > lower_price && initial_price < upper_price) {
            return Err(FeeModelError::InvalidPosition(format!(
                "initial price {initial_price} must lie strictly inside [{lower_price}, {upper_price}]"
            )));
        }
        if !token0_amount.is_finite() || token0_amount <= 0.0 {
            return Err(FeeModelError::InvalidPosition(format!(
                "token0 amount must be positive, got {token0_amount}"
            )));
        }

        let sqrt_current = initial_price.sqrt();
        let sqrt_upper = upper_price.sqrt();
        let liquidity = token0_amount * (sqrt_upper * sqrt_current) / (sqrt_upper - sqrt_current);

        Self::new(lower_price, upper_price, liquidity)
    }

    /// Size a position whose range covers every observed price with a buffer on each side.
    pub fn covering(
        range: &PriceRange,
        token0_amount: f64,
        buffer_factor: f64,
    ) -> Result<Self, FeeModelError> {
        if !(0.0..1.0).contains(&buffer_factor) {
            return Err(FeeModelError::InvalidPosition(format!(
                "buffer factor must be in [0, 1), got {buffer_factor}"
            )));
        }

        let lower_price = range.min * (1.0 - buffer_factor);
        let upper_price = range.max * (1.0 + buffer_factor);

        Self::from_token0(range.initial, lower_price, upper_price, token0_amount)
    }

    pub fn lower_price(&self) -> f64 {
        self.lower_price
    }

    pub fn upper_price(&self) -> f64 {
        self.upper_price
    }

    pub fn liquidity(&self) -> f64 {
        self.liquidity
    }
}

impl InventoryModel for ConcentratedPosition {
    fn token_amounts(&self, price: f64) -> TokenAmounts {
        let span = self.sqrt_upper - self.sqrt_lower;

        if price <= self.lower_price {
            TokenAmounts {
                token0: self.liquidity * span / (self.sqrt_lower * self.sqrt_upper),
                token1: 0.0,
            }
        } else if price >= self.upper_price {
            TokenAmounts {
                token0: 0.0,
                token1: self.liquidity * span,
            }
        } else {
            let sqrt_price = price.sqrt();
            TokenAmounts {
                token0: self.liquidity * (self.sqrt_upper - sqrt_price)
                    / (sqrt_price * self.sqrt_upper),
                token1: self.liquidity * (sqrt_price - self.sqrt_lower),
            }
        }
    }
}
