//! Rolling VPIN toxicity over the bucket sequence.
//!
//! Three independent trailing windows (50 / 250 / 350 buckets) each hold the most recent
//! order imbalances and report their arithmetic mean. Windows report a value from the
//! first bucket on, so early values are means over fewer samples than the window length;
//! [`ToxicityRecord::samples`] carries the sample count for consumers that need to
//! discount them.

use crate::{error::FeeModelError, volume_clock::Bucket};
use chrono::{DateTime, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::{collections::VecDeque, str::FromStr};

/// Trailing window length selector.
#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default, Display, Deserialize, Serialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ToxicityWindow {
    /// 50 buckets, roughly one day of volume
    #[default]
    #[display("short")]
    Short,
    /// 250 buckets, roughly five days
    #[display("medium")]
    Medium,
    /// 350 buckets, roughly seven days
    #[display("long")]
    Long,
}

impl ToxicityWindow {
    pub const ALL: [ToxicityWindow; 3] = [
        ToxicityWindow::Short,
        ToxicityWindow::Medium,
        ToxicityWindow::Long,
    ];

    /// Window length in buckets.
    pub fn buckets(&self) -> usize {
        match self {
            ToxicityWindow::Short => 50,
            ToxicityWindow::Medium => 250,
            ToxicityWindow::Long => 350,
        }
    }

    /// Column label used in reports.
    pub fn label(&self) -> &'static str {
        match self {
            ToxicityWindow::Short => "vpin_daily",
            ToxicityWindow::Medium => "vpin_5day",
            ToxicityWindow::Long => "vpin_7day",
        }
    }
}

impl FromStr for ToxicityWindow {
    type Err = FeeModelError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_ascii_lowercase().as_str() {
            "short" | "vpin_daily" | "daily" => Ok(ToxicityWindow::Short),
            "medium" | "vpin_5day" | "5day" => Ok(ToxicityWindow::Medium),
            "long" | "vpin_7day" | "7day" => Ok(ToxicityWindow::Long),
            other => Err(FeeModelError::InvalidConfig(format!(
                "unknown toxicity window: {other}"
            ))),
        }
    }
}

/// Bounded FIFO of imbalances with an incrementally maintained sum.
#[derive(Debug, Clone)]
pub struct RollingWindow {
    max_size: usize,
    values: VecDeque<f64>,
    sum: f64,
    /// Pushes since the running sum was last rebuilt from the contents
    pushes_since_resync: usize,
}

impl RollingWindow {
    pub fn new(max_size: usize) -> Result<Self, FeeModelError> {
        if max_size == 0 {
            return Err(FeeModelError::InvalidConfig(
                "rolling window size must be greater than 0".to_string(),
            ));
        }
        Ok(Self::with_len(max_size))
    }

    /// Window sized for one of the fixed toxicity windows.
    pub fn for_window(window: ToxicityWindow) -> Self {
        Self::with_len(window.buckets())
    }

    fn with_len(max_size: usize) -> Self {
        Self {
            max_size,
            values: VecDeque::with_capacity(max_size + 1),
            sum: 0.0,
            pushes_since_resync: 0,
        }
    }

    /// Push a value, evicting the oldest while over capacity, and return the new mean.
    pub fn push(&mut self, value: f64) -> f64 {
        self.values.push_back(value);
        self.sum += value;

        while self.values.len() > self.max_size {
            if let Some(evicted) = self.values.pop_front() {
                self.sum -= evicted;
            }
        }

        // Bound drift of the running sum over long tapes.
        self.pushes_since_resync += 1;
        if self.pushes_since_resync >= self.max_size {
            self.sum = self.values.iter().sum();
            self.pushes_since_resync = 0;
        }

        self.sum / self.values.len() as f64
    }

    /// Mean of the current contents, `None` before the first push.
    pub fn mean(&self) -> Option<f64> {
        if self.values.is_empty() {
            None
        } else {
            Some(self.sum / self.values.len() as f64)
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }
}

/// Per-window values carried on every [`ToxicityRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize, Serialize)]
pub struct WindowValues<T> {
    pub short: T,
    pub medium: T,
    pub long: T,
}

impl<T: Copy> WindowValues<T> {
    pub fn get(&self, window: ToxicityWindow) -> T {
        match window {
            ToxicityWindow::Short => self.short,
            ToxicityWindow::Medium => self.medium,
            ToxicityWindow::Long => self.long,
        }
    }
}

/// One row of the bucket / toxicity output series.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct ToxicityRecord {
    pub bucket_index: u64,
    pub closing_timestamp: DateTime<Utc>,
    pub abs_volume: f64,
    pub net_volume: f64,
    pub order_imbalance: f64,
    pub is_partial: bool,
    /// Mean imbalance per trailing window
    pub toxicity: WindowValues<f64>,
    /// Number of buckets each window mean was taken over
    pub samples: WindowValues<usize>,
}

impl ToxicityRecord {
    pub fn value(&self, window: ToxicityWindow) -> f64 {
        self.toxicity.get(window)
    }

    /// Whether the chosen window had its full complement of buckets.
    pub fn is_saturated(&self, window: ToxicityWindow) -> bool {
        self.samples.get(window) >= window.buckets()
    }
}

/// Maintains the three trailing windows over the bucket stream.
#[derive(Debug, Clone)]
pub struct RollingToxicityEstimator {
    short: RollingWindow,
    medium: RollingWindow,
    long: RollingWindow,
}

impl RollingToxicityEstimator {
    pub fn new() -> Self {
        Self {
            short: RollingWindow::for_window(ToxicityWindow::Short),
            medium: RollingWindow::for_window(ToxicityWindow::Medium),
            long: RollingWindow::for_window(ToxicityWindow::Long),
        }
    }

    /// Feed the next bucket and return its toxicity row.
    pub fn update(&mut self, bucket: &Bucket) -> ToxicityRecord {
        let imbalance = bucket.order_imbalance;

        let toxicity = WindowValues {
            short: self.short.push(imbalance),
            medium: self.medium.push(imbalance),
            long: self.long.push(imbalance),
        };

        ToxicityRecord {
            bucket_index: bucket.bucket_index,
            closing_timestamp: bucket.closing_timestamp,
            abs_volume: bucket.abs_volume,
            net_volume: bucket.net_volume,
            order_imbalance: imbalance,
            is_partial: bucket.is_partial,
            toxicity,
            samples: self.samples(),
        }
    }

    /// Current value of one window, `None` before any bucket has closed.
    pub fn value(&self, window: ToxicityWindow) -> Option<f64> {
        self.window(window).mean()
    }

    pub fn samples(&self) -> WindowValues<usize> {
        WindowValues {
            short: self.short.len(),
            medium: self.medium.len(),
            long: self.long.len(),
        }
    }

    fn window(&self, window: ToxicityWindow) -> &RollingWindow {
        match window {
            ToxicityWindow::Short => &self.short,
            ToxicityWindow::Medium => &self.medium,
            ToxicityWindow::Long => &self.long,
        }
    }
}

impl Default for RollingToxicityEstimator {
    fn default() -> Self {
        Self::new()
    }
}

/// Run the estimator over a full bucket sequence.
pub fn rolling_toxicity(buckets: &[Bucket]) -> Vec<ToxicityRecord> {
    let mut estimator = RollingToxicityEstimator::new();
    buckets.iter().map(|bucket| estimator.update(bucket)).collect()
}
