//! Amount - fixed-point money with checked arithmetic
//!
//! All monetary values (escrow, fees, stakes, token balances) use one
//! 18-decimal fixed-point representation over u128. Arithmetic never
//! silently wraps; fallible operations return [`TypeError`].

use crate::error::TypeError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of decimal places in the fixed-point representation
pub const AMOUNT_DECIMALS: u32 = 18;

/// Multiplier between whole units and raw units
pub const AMOUNT_UNIT: u128 = 1_000_000_000_000_000_000;

/// Basis-point denominator used by settlement and reward schedules
pub const BPS_DENOMINATOR: u128 = 10_000;

/// A non-negative monetary value in raw (10^-18) units
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Amount(pub u128);

impl Amount {
    /// Zero
    pub const fn zero() -> Self {
        Self(0)
    }

    /// Construct from raw 10^-18 units
    pub const fn from_raw(raw: u128) -> Self {
        Self(raw)
    }

    /// Construct from whole units
    pub const fn from_whole(whole: u64) -> Self {
        Self(whole as u128 * AMOUNT_UNIT)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Self) -> Result<Self, TypeError> {
        self.0
            .checked_add(other.0)
            .map(Self)
            .ok_or(TypeError::AmountOverflow)
    }

    pub fn checked_sub(self, other: Self) -> Result<Self, TypeError> {
        self.0
            .checked_sub(other.0)
            .map(Self)
            .ok_or(TypeError::AmountUnderflow)
    }

    /// Saturating addition, capped at the representable maximum
    pub fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    /// Saturating subtraction, floored at zero
    pub fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    /// The smaller of two amounts
    pub fn min(self, other: Self) -> Self {
        Self(self.0.min(other.0))
    }

    /// Proportional share in basis points, rounded down.
    ///
    /// `bps` above 10_000 is rejected rather than producing more than the
    /// whole.
    pub fn mul_bps(self, bps: u16) -> Result<Self, TypeError> {
        if u128::from(bps) > BPS_DENOMINATOR {
            return Err(TypeError::InvalidBasisPoints { bps });
        }
        self.0
            .checked_mul(u128::from(bps))
            .map(|scaled| Self(scaled / BPS_DENOMINATOR))
            .ok_or(TypeError::AmountOverflow)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / AMOUNT_UNIT;
        let frac = self.0 % AMOUNT_UNIT;
        if frac == 0 {
            write!(f, "{whole}")
        } else {
            let frac = format!("{frac:018}");
            write!(f, "{}.{}", whole, frac.trim_end_matches('0'))
        }
    }
}
