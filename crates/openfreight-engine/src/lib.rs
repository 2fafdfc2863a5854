//! OpenFreight Engine - the Service Request Engine
//!
//! Owns the delivery-job lifecycle end to end:
//! - Creation and draft editing by shippers, with escrow of the cargo's
//!   insurable value plus the posted service fee
//! - The descending-price auction: eligible drivers undercut one another
//!   below the posted fee, staking the cargo value as collateral
//! - The forward-only status pipeline through delivery and acceptance
//! - Settlement and refunds, conserving every escrowed unit
//! - Escalation of rejected deliveries to the dispute court and
//!   application of the voted outcome
//!
//! # Key Principle
//!
//! Funds only ever move through the per-request escrow account, and every
//! movement is recorded, so that at any terminal state payouts plus
//! refunds equal exactly what was paid in.

pub mod engine;
pub mod error;
pub mod escrow;

pub use engine::*;
pub use error::*;
pub use escrow::*;
