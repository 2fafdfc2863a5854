//! Error types for engine operations
//!
//! Every rejection names its specific kind and the offending values; a
//! failed operation leaves no partial state behind.

use openfreight_dispute::DisputeError;
use openfreight_registry::RegistryError;
use openfreight_token::TokenError;
use openfreight_types::{Amount, Role, SrId, Status, TypeError, Uid};
use thiserror::Error;

/// Errors that can occur during engine operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("caller {uid} lacks the {role} role")]
    MissingRole { uid: Uid, role: Role },

    #[error("caller {uid} holds no valid driving license")]
    UnlicensedDriver { uid: Uid },

    #[error("caller {uid} is not the {party} of request {id}")]
    NotParty {
        uid: Uid,
        party: &'static str,
        id: SrId,
    },

    #[error("caller {uid} does not cover the region of request {id}")]
    RegionMismatch { uid: Uid, id: SrId },

    #[error("request {id} is {current:?}, operation requires {expected}")]
    WrongState {
        id: SrId,
        current: Status,
        expected: &'static str,
    },

    #[error("request {id} cannot step from {from:?} to {to:?}")]
    InvalidTransition { id: SrId, from: Status, to: Status },

    #[error("a new request must start as Draft or ReadyForAuction, not {status:?}")]
    InvalidInitialStatus { status: Status },

    #[error("the auction for request {id} has closed")]
    AuctionClosed { id: SrId },

    #[error("the auction for request {id} is still open")]
    AuctionStillOpen { id: SrId },

    #[error("bid {bid} exceeds the posted service fee {ceiling}")]
    BidTooHigh { bid: Amount, ceiling: Amount },

    #[error("bid {bid} does not undercut the standing bid {best}")]
    BidNotLower { bid: Amount, best: Amount },

    #[error("attached value {attached} is less than the required {required}")]
    InsufficientPayment { required: Amount, attached: Amount },

    #[error("attached value {attached} exceeds the required {required}")]
    ExcessPayment { required: Amount, attached: Amount },

    #[error("no bids were received for request {id}")]
    NoBids { id: SrId },

    #[error("request {id} not found")]
    SrNotFound { id: SrId },

    #[error(transparent)]
    Arithmetic(#[from] TypeError),

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("dispute error: {0}")]
    Dispute(#[from] DisputeError),

    #[error("token error: {0}")]
    Token(#[from] TokenError),
}

pub type Result<T> = std::result::Result<T, EngineError>;
