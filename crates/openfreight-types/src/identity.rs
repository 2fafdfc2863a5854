//! Identity types for OpenFreight
//!
//! Caller identities are UUID-backed; the nil UUID is the sentinel
//! zero-identity (an unassigned driver slot). Record identifiers issued by
//! the components themselves are sequential u64 newtypes so they never mix
//! with one another or with caller identities.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Authenticated caller identity.
///
/// Supplied by the execution environment with every operation; the core
/// never authenticates it. `Uid::nil()` is the zero-identity sentinel used
/// for an unassigned driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Uid(pub Uuid);

impl Uid {
    /// Create a new random identity
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The zero-identity sentinel
    pub fn nil() -> Self {
        Self(Uuid::nil())
    }

    /// Whether this is the zero-identity sentinel
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }

    /// Parse from a string
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for Uid {
    fn default() -> Self {
        Self::nil()
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "uid_{}", self.0)
    }
}

/// Macro to generate sequential record-id types with common implementations
macro_rules! define_seq_id_type {
    ($name:ident, $prefix:literal, $doc:literal) => {
        #[doc = $doc]
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        pub struct $name(pub u64);

        impl $name {
            /// The first id a component hands out
            pub fn first() -> Self {
                Self(0)
            }

            /// The id following this one
            pub fn next(self) -> Self {
                Self(self.0 + 1)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}_{}", $prefix, self.0)
            }
        }

        impl From<u64> for $name {
            fn from(v: u64) -> Self {
                Self(v)
            }
        }
    };
}

define_seq_id_type!(SrId, "sr", "Unique identifier for a service request");
define_seq_id_type!(RoleRequestId, "rolereq", "Unique identifier for a role request");
define_seq_id_type!(LicenseTokenId, "license", "Unique identifier for a driving-license token");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nil_uid_is_sentinel() {
        assert!(Uid::nil().is_nil());
        assert!(!Uid::new().is_nil());
        assert_eq!(Uid::default(), Uid::nil());
    }

    #[test]
    fn seq_ids_are_monotone() {
        let first = SrId::first();
        assert_eq!(first, SrId(0));
        assert_eq!(first.next(), SrId(1));
        assert_eq!(first.next().next(), SrId(2));
    }

    #[test]
    fn id_display_is_prefixed() {
        assert_eq!(SrId(7).to_string(), "sr_7");
        assert_eq!(RoleRequestId(0).to_string(), "rolereq_0");
        let uid = Uid::new();
        assert!(uid.to_string().starts_with("uid_"));
    }
}
