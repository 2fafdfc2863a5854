//! Marketplace roles

use serde::{Deserialize, Serialize};
use std::fmt;

/// A role a user can act under.
///
/// `Admin` is root-granted at deployment and cannot be requested;
/// `Shipper`, `Driver` and `Receiver` are granted through the role-request
/// workflow. A user may hold several roles at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum Role {
    None = 0,
    Admin = 1,
    Shipper = 2,
    Driver = 3,
    Receiver = 4,
}

impl Role {
    /// Whether this role can be applied for through a role request
    pub fn is_requestable(&self) -> bool {
        matches!(self, Self::Shipper | Self::Driver | Self::Receiver)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::Admin => "admin",
            Self::Shipper => "shipper",
            Self::Driver => "driver",
            Self::Receiver => "receiver",
        };
        f.write_str(name)
    }
}

/// Lifecycle of a role request: resolved exactly once
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoleRequestStatus {
    Pending,
    Approved,
    Rejected,
}
