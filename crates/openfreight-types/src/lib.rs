//! OpenFreight Types - Foundation types for the delivery marketplace core
//!
//! This crate implements the vocabulary shared by every OpenFreight
//! component:
//! - Strongly-typed identifiers (caller identities, request/token ids)
//! - Amount: fixed-point money with checked arithmetic
//! - GeoHash: opaque location strings with prefix region matching
//! - Role, Status, DisputeWinner: the lifecycle enums
//! - ServiceRequest: the job/order record exchanged between components
//!
//! # Architectural Invariants
//!
//! 1. Identifiers of different kinds never mix
//! 2. Money arithmetic never silently wraps
//! 3. Status only advances along the defined transition graph
//! 4. Geohashes are validated once, at the boundary

pub mod amount;
pub mod dispute;
pub mod error;
pub mod geohash;
pub mod identity;
pub mod role;
pub mod service_request;
pub mod status;

pub use amount::*;
pub use dispute::*;
pub use error::*;
pub use geohash::*;
pub use identity::*;
pub use role::*;
pub use service_request::*;
pub use status::*;
