//! Causal per-trade dynamic fee estimation.
//!
//! Each trade is priced from state that was known strictly before it: the most recently
//! closed bucket's toxicity and the last valid impact reading seen on an earlier trade.
//! The carry-forward state is an explicit [`FeeState`] value; pricing reads it first and
//! only then folds in the current trade's own impact reading, so a trade never pays for
//! its own concurrent observation.

use crate::{
    error::FeeModelError,
    inventory::InventoryModel,
    toxicity::{ToxicityRecord, ToxicityWindow},
    trade::Trade,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// The impact series is per unit volume in illiquidity-scaled units; dividing by this
/// brings estimated impact into fee units.
pub const IMPACT_SCALE: f64 = 1_000_000.0;

/// Number of leading trades logged at debug level.
const DEBUG_LEADING_TRADES: usize = 5;

/// Carry-forward state threaded through the trade scan.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize, Serialize)]
pub struct FeeState {
    /// Last valid impact reading seen on a trade before the current one
    pub latest_valid_impact: Option<f64>,
    /// Number of closed buckets consumed so far (index of the next bucket to consider)
    pub toxicity_cursor: usize,
    /// Bucket index and chosen-window toxicity of the most recently closed bucket
    pub latest_toxicity: Option<(u64, f64)>,
}

impl FeeState {
    /// Advance over every full bucket that closed at or before `timestamp`.
    ///
    /// Partial buckets never closed and are not consumed.
    pub fn advance_toxicity(
        self,
        records: &[ToxicityRecord],
        window: ToxicityWindow,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let mut next = self;
        while let Some(record) = records.get(next.toxicity_cursor) {
            if record.is_partial || record.closing_timestamp > timestamp {
                break;
            }
            next.latest_toxicity = Some((record.bucket_index, record.value(window)));
            next.toxicity_cursor += 1;
        }
        next
    }

    /// Fold a priced trade's own impact reading into the state for later trades.
    ///
    /// Zero-volume trades never move the impact cache.
    pub fn observe_impact(self, trade: &Trade) -> Self {
        match trade.impact {
            Some(impact) if trade.has_volume() => Self {
                latest_valid_impact: Some(impact),
                ..self
            },
            _ => self,
        }
    }
}

/// Fee parameters.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct FeeParams {
    /// Flat fee as a fraction of volume (0.0005 = 0.05%)
    pub base_fee_rate: f64,
    /// Which toxicity window prices the risk premium
    pub window: ToxicityWindow,
}

impl FeeParams {
    pub fn validate(&self) -> Result<(), FeeModelError> {
        if !self.base_fee_rate.is_finite() || self.base_fee_rate < 0.0 {
            return Err(FeeModelError::InvalidConfig(format!(
                "base_fee_rate must be a finite non-negative fraction, got {}",
                self.base_fee_rate
            )));
        }
        Ok(())
    }
}

impl Default for FeeParams {
    fn default() -> Self {
        Self {
            base_fee_rate: 0.0005,
            window: ToxicityWindow::default(),
        }
    }
}

/// One row of the per-trade fee series, with every input used for auditability.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct FeeRecord {
    pub timestamp: DateTime<Utc>,
    pub price: f64,
    pub signed_volume: f64,
    pub abs_volume: f64,
    /// This trade's own impact reading; only affects later trades
    pub impact_observed: Option<f64>,
    /// Prior impact reading actually used for this trade
    pub impact_used: Option<f64>,
    /// Toxicity of the most recently closed bucket
    pub toxicity_used: Option<f64>,
    /// Index of that bucket
    pub toxicity_bucket: Option<u64>,
    pub inventory_exposure: f64,
    pub estimated_price_impact: f64,
    pub expected_impermanent_loss: f64,
    pub base_fee: f64,
    /// Risk premium as a fraction of trade volume
    pub toxicity_fee_fraction: f64,
    pub toxicity_fee: f64,
    pub total_fee: f64,
    /// `total_fee / abs_volume`, `None` for zero-volume trades
    pub fee_fraction: Option<f64>,
}

/// Price one trade against the state known before it.
pub fn price_trade<M>(trade: &Trade, state: &FeeState, params: &FeeParams, model: &M) -> FeeRecord
where
    M: InventoryModel + ?Sized,
{
    let abs_volume = trade.abs_volume();
    let inventory_exposure = model.inventory_exposure(trade.price);
    let toxicity_used = state.latest_toxicity.map(|(_, toxicity)| toxicity);

    let (estimated_price_impact, expected_impermanent_loss) =
        match (abs_volume > 0.0, state.latest_valid_impact) {
            (true, Some(impact)) => {
                let estimated = impact * abs_volume / IMPACT_SCALE;
                (estimated, estimated * inventory_exposure)
            }
            _ => (0.0, 0.0),
        };

    let toxicity_fee_fraction = expected_impermanent_loss * toxicity_used.unwrap_or(0.0);
    let base_fee = params.base_fee_rate * abs_volume;
    let toxicity_fee = toxicity_fee_fraction * abs_volume;
    let total_fee = base_fee + toxicity_fee;

    FeeRecord {
        timestamp: trade.timestamp,
        price: trade.price,
        signed_volume: trade.signed_volume,
        abs_volume,
        impact_observed: trade.impact,
        impact_used: state.latest_valid_impact,
        toxicity_used,
        toxicity_bucket: state.latest_toxicity.map(|(bucket_index, _)| bucket_index),
        inventory_exposure,
        estimated_price_impact,
        expected_impermanent_loss,
        base_fee,
        toxicity_fee_fraction,
        toxicity_fee,
        total_fee,
        fee_fraction: (abs_volume > 0.0).then(|| total_fee / abs_volume),
    }
}

/// Sequential fee estimator over the trade tape.
#[derive(Debug)]
pub struct CausalFeeEstimator<'a, M> {
    params: FeeParams,
    model: M,
    toxicity: &'a [ToxicityRecord],
    state: FeeState,
    priced: usize,
}

impl<'a, M> CausalFeeEstimator<'a, M>
where
    M: InventoryModel,
{
    pub fn new(
        params: FeeParams,
        model: M,
        toxicity: &'a [ToxicityRecord],
    ) -> Result<Self, FeeModelError> {
        params.validate()?;
        Ok(Self {
            params,
            model,
            toxicity,
            state: FeeState::default(),
            priced: 0,
        })
    }

    pub fn state(&self) -> &FeeState {
        &self.state
    }

    /// Price the next trade. Trades must arrive in ascending timestamp order.
    pub fn on_trade(&mut self, trade: &Trade) -> FeeRecord {
        // 1. toxicity known as of this trade
        let state = self
            .state
            .advance_toxicity(self.toxicity, self.params.window, trade.timestamp);

        // 2. price with prior state only
        let record = price_trade(trade, &state, &self.params, &self.model);

        // 3. this trade's impact reading becomes usable from the next trade
        self.state = state.observe_impact(trade);

        if self.priced < DEBUG_LEADING_TRADES && record.abs_volume > 0.0 {
            debug!(
                trade = self.priced,
                abs_volume = record.abs_volume,
                base_fee = record.base_fee,
                toxicity_fee = record.toxicity_fee,
                total_fee = record.total_fee,
                "priced trade"
            );
        } else {
            trace!(trade = self.priced, total_fee = record.total_fee, "priced trade");
        }
        self.priced += 1;

        record
    }
}

/// Price every trade of the tape.
pub fn estimate_fees<M>(
    trades: &[Trade],
    toxicity: &[ToxicityRecord],
    params: FeeParams,
    model: M,
) -> Result<Vec<FeeRecord>, FeeModelError>
where
    M: InventoryModel,
{
    let mut estimator = CausalFeeEstimator::new(params, model, toxicity)?;
    Ok(trades.iter().map(|trade| estimator.on_trade(trade)).collect())
}
