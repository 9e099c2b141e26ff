//! Error types for rate resolution

use crate::RateDate;
use common::{Currency, ValueError};
use std::time::Duration;
use thiserror::Error;

/// Rate resolution errors
#[derive(Debug, Error)]
pub enum FxError {
    /// Transport-level failure talking to the feed
    #[error("Rate feed request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Feed did not answer in time
    #[error("Rate feed timed out after {0:?}")]
    Timeout(Duration),

    /// Feed answered with a non-success status
    #[error("Rate feed returned HTTP {status}")]
    Upstream {
        /// HTTP status code
        status: u16,
    },

    /// Feed body could not be understood
    #[error("Malformed rate feed response: {0}")]
    Decode(String),

    /// Feed quotes against a different currency than configured
    #[error("Rate feed quotes against {actual}, expected {expected}")]
    PivotMismatch {
        /// Configured pivot
        expected: Currency,
        /// Pivot reported by the feed
        actual: Currency,
    },

    /// Currency absent from the publication
    #[error("No {currency} rate published for {date}")]
    UnknownCurrency {
        /// Missing currency
        currency: Currency,
        /// Publication that was consulted
        date: RateDate,
    },

    /// Arithmetic or value construction failure
    #[error(transparent)]
    Value(#[from] ValueError),

    /// Resolver cannot be built from the given settings
    #[error("Invalid rate configuration: {0}")]
    Configuration(String),
}

/// Result alias for rate operations
pub type FxResult<T> = Result<T, FxError>;
