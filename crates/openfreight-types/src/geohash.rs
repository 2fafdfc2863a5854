//! GeoHash - opaque location strings with prefix region matching
//!
//! The core never decodes a geohash. It only validates the base32 alphabet
//! at the boundary and compares prefixes: two regions match when one hash
//! is a prefix of the other up to the shorter string's length, so a coarser
//! hash intentionally widens the match.

use crate::error::TypeError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The geohash base32 alphabet (no a, i, l, o)
const GEOHASH_ALPHABET: &[u8] = b"0123456789bcdefghjkmnpqrstuvwxyz";

/// Maximum geohash precision accepted
const MAX_LEN: usize = 12;

/// A validated geohash string
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GeoHash(String);

impl GeoHash {
    /// Validate and wrap a geohash string.
    ///
    /// Accepts 1 to 12 characters of the geohash base32 alphabet,
    /// lowercase only.
    pub fn new(value: impl Into<String>) -> Result<Self, TypeError> {
        let value = value.into();
        if value.is_empty() {
            return Err(TypeError::InvalidGeoHash {
                value,
                reason: "empty",
            });
        }
        if value.len() > MAX_LEN {
            return Err(TypeError::InvalidGeoHash {
                value,
                reason: "longer than 12 characters",
            });
        }
        if value.bytes().any(|b| !GEOHASH_ALPHABET.contains(&b)) {
            return Err(TypeError::InvalidGeoHash {
                value,
                reason: "character outside the geohash base32 alphabet",
            });
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Prefix region match: true when one hash is a prefix of the other up
    /// to the shorter string's length.
    pub fn region_matches(&self, other: &GeoHash) -> bool {
        let n = self.0.len().min(other.0.len());
        self.0.as_bytes()[..n] == other.0.as_bytes()[..n]
    }
}

impl fmt::Display for GeoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for GeoHash {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<GeoHash> for String {
    fn from(value: GeoHash) -> Self {
        value.0
    }
}
