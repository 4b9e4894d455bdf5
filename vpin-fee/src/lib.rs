//! VPIN Fee - volume-clock toxicity and causal dynamic-fee simulation.
//!
//! The library turns an ordered trade tape into:
//! - a volume-clock bucket series annotated with order imbalance
//! - three rolling VPIN toxicity series (50 / 250 / 350 buckets)
//! - a per-trade fee series blending a flat base rate with a toxicity and
//!   impact-adjusted premium, priced only from information known before each trade
//!
//! Inventory exposure comes from a pluggable [`InventoryModel`]; the bundled
//! [`ConcentratedPosition`] implements a Uniswap-v3 style position.
//!
//! See [`pipeline::run`] for the end-to-end batch entry point.

pub mod config;
pub mod error;
pub mod fee;
pub mod inventory;
pub mod pipeline;
pub mod summary;
pub mod toxicity;
pub mod trade;
pub mod volume_clock;

// Re-export commonly used types for convenience
pub use config::{PositionConfig, SimConfig};
pub use error::FeeModelError;
pub use fee::{CausalFeeEstimator, FeeParams, FeeRecord, FeeState, estimate_fees};
pub use inventory::{ConcentratedPosition, InventoryModel, PriceRange, TokenAmounts};
pub use pipeline::{SimulationOutput, run, run_with_covering_position};
pub use summary::{DailyFees, FeeSummary, ToxicitySummary};
pub use toxicity::{RollingToxicityEstimator, ToxicityRecord, ToxicityWindow, rolling_toxicity};
pub use trade::{ImpactObservation, Trade, align_impacts, validate_tape};
pub use volume_clock::{Bucket, VolumeClockAggregator, aggregate, bucket_size};
