//! Errors raised by the foundation types themselves

use thiserror::Error;

/// Validation and arithmetic errors from foundation types
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypeError {
    #[error("amount overflow during arithmetic operation")]
    AmountOverflow,

    #[error("amount underflow during arithmetic operation")]
    AmountUnderflow,

    #[error("basis points {bps} exceed the 10000 denominator")]
    InvalidBasisPoints { bps: u16 },

    #[error("geohash {value:?} is malformed: {reason}")]
    InvalidGeoHash { value: String, reason: &'static str },
}
