//! Service-request status pipeline
//!
//! The pipeline is forward-only and advances exactly one step at a time:
//!
//! Draft -> ReadyForAuction -> DriverAssigned -> ReadyForPickup ->
//! ParcelPickedUp -> InTransit -> Delivered ->
//! {ConditionallyAccepted | UnconditionallyAccepted}
//!
//! with Cancelled reachable only from Draft, and Disputed ->
//! DisputeResolved reachable from Delivered in place of acceptance.

use serde::{Deserialize, Serialize};

/// Status of a service request.
///
/// Discriminants are fixed; external callers address transitions by them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum Status {
    Draft = 0,
    ReadyForAuction = 1,
    DriverAssigned = 2,
    ReadyForPickup = 3,
    ParcelPickedUp = 4,
    InTransit = 5,
    Delivered = 6,
    ConditionallyAccepted = 7,
    UnconditionallyAccepted = 8,
    Cancelled = 9,
    Disputed = 10,
    DisputeResolved = 11,
}

impl Status {
    /// Whether this status admits no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::ConditionallyAccepted
                | Self::UnconditionallyAccepted
                | Self::Cancelled
                | Self::DisputeResolved
        )
    }

    /// Whether the status marks an accepted delivery
    pub fn is_acceptance(&self) -> bool {
        matches!(
            self,
            Self::ConditionallyAccepted | Self::UnconditionallyAccepted
        )
    }

    /// The single permitted forward steps out of this status.
    ///
    /// Cancellation is not listed: Draft -> Cancelled goes through the
    /// dedicated cancel operation, never through a status update.
    pub fn forward_steps(&self) -> &'static [Status] {
        match self {
            Self::Draft => &[Self::ReadyForAuction],
            Self::ReadyForAuction => &[Self::DriverAssigned],
            Self::DriverAssigned => &[Self::ReadyForPickup],
            Self::ReadyForPickup => &[Self::ParcelPickedUp],
            Self::ParcelPickedUp => &[Self::InTransit],
            Self::InTransit => &[Self::Delivered],
            Self::Delivered => &[
                Self::ConditionallyAccepted,
                Self::UnconditionallyAccepted,
                Self::Disputed,
            ],
            Self::Disputed => &[Self::DisputeResolved],
            Self::ConditionallyAccepted
            | Self::UnconditionallyAccepted
            | Self::Cancelled
            | Self::DisputeResolved => &[],
        }
    }

    /// Whether `to` is a single permitted forward step from `self`
    pub fn may_step_to(&self, to: Status) -> bool {
        self.forward_steps().contains(&to)
    }
}

/// Acceptance flavour of a completed delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Acceptance {
    Conditional,
    Unconditional,
}
