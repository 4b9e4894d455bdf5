use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// All errors generated in `vpin-fee`.
#[derive(Debug, Clone, PartialEq, PartialOrd, Deserialize, Serialize, Error)]
pub enum FeeModelError {
    #[error("missing input: {0}")]
    MissingInput(String),

    #[error("degenerate bucket size: {bucket_size} (no usable daily volume)")]
    DegenerateBucket { bucket_size: f64 },

    #[error("invalid trade at index {index}: {reason}")]
    InvalidTrade { index: usize, reason: String },

    #[error(
        "\
        OutOfOrder: record {index} timestamp {current} precedes the previous \
        record timestamp {previous} \
    "
    )]
    OutOfOrder {
        index: usize,
        previous: DateTime<Utc>,
        current: DateTime<Utc>,
    },

    #[error("invalid liquidity position: {0}")]
    InvalidPosition(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl FeeModelError {
    /// Errors raised while validating the trade tape or deriving the bucket size, before
    /// any streaming begins.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            FeeModelError::MissingInput(_)
                | FeeModelError::DegenerateBucket { .. }
                | FeeModelError::InvalidTrade { .. }
                | FeeModelError::OutOfOrder { .. }
        )
    }

    /// Errors caused by run parameters rather than by the data.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            FeeModelError::InvalidPosition(_) | FeeModelError::InvalidConfig(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_fee_model_error_classification() {
        struct TestCase {
            input: FeeModelError,
            expected_input: bool,
            expected_config: bool,
        }

        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        let tests = vec![
            TestCase {
                // TC0: empty tape is an input error
                input: FeeModelError::MissingInput("empty trade tape".to_string()),
                expected_input: true,
                expected_config: false,
            },
            TestCase {
                // TC1: degenerate bucket size is an input error
                input: FeeModelError::DegenerateBucket { bucket_size: 0.0 },
                expected_input: true,
                expected_config: false,
            },
            TestCase {
                // TC2: out of order tape
                input: FeeModelError::OutOfOrder {
                    index: 3,
                    previous: ts,
                    current: ts - chrono::Duration::seconds(1),
                },
                expected_input: true,
                expected_config: false,
            },
            TestCase {
                // TC3: invalid configuration
                input: FeeModelError::InvalidConfig("base_fee_rate must be >= 0".to_string()),
                expected_input: false,
                expected_config: true,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            assert_eq!(test.input.is_input_error(), test.expected_input, "TC{} failed", index);
            assert_eq!(
                test.input.is_config_error(),
                test.expected_config,
                "TC{} failed",
                index
            );
        }
    }

    #[test]
    fn test_fee_model_error_display() {
        let error = FeeModelError::InvalidTrade {
            index: 7,
            reason: "price must be positive".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "invalid trade at index 7: price must be positive"
        );
    }
}
