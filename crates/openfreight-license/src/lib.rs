//! OpenFreight License - the Credential Gate
//!
//! Issues driving-license tokens through a paid, admin-windowed public
//! mint and answers the one question the engine asks: does this caller
//! hold at least one non-burned license?
//!
//! A holder may own several tokens; burning is owner-only and
//! irreversible, and eligibility is recomputed over the remaining tokens.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use openfreight_types::{Amount, LicenseTokenId, Uid};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fixed public mint price: 0.01 in 18-decimal money
pub const MINT_PRICE: Amount = Amount::from_raw(10_000_000_000_000_000);

/// Errors that can occur in credential-gate operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LicenseError {
    #[error("public minting is closed")]
    MintClosed,

    #[error("attached value {attached} is below the mint price {required}")]
    InsufficientPayment { required: Amount, attached: Amount },

    #[error("license token {id} not found")]
    TokenNotFound { id: LicenseTokenId },

    #[error("caller {uid} does not own license token {id}")]
    NotTokenOwner { uid: Uid, id: LicenseTokenId },

    #[error("license token {id} is already burned")]
    AlreadyBurned { id: LicenseTokenId },

    #[error("caller {uid} is not the admin")]
    NotAdmin { uid: Uid },
}

pub type Result<T> = std::result::Result<T, LicenseError>;

/// A driving-license token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrivingLicense {
    pub token_id: LicenseTokenId,
    pub owner: Uid,
    pub holder_name: String,
    pub license_number: String,
    /// Opaque content hash; the core never resolves it
    pub ipfs_image_hash: String,
    pub minted_at: DateTime<Utc>,
    pub burned: bool,
}

struct Inner {
    admin: Uid,
    mint_open: bool,
    tokens: BTreeMap<LicenseTokenId, DrivingLicense>,
    next_id: LicenseTokenId,
    /// Mint proceeds held by the gate
    proceeds: Amount,
}

/// The Credential Gate
#[derive(Clone)]
pub struct LicenseRegistry {
    inner: Arc<RwLock<Inner>>,
}

impl LicenseRegistry {
    /// Create a gate with its admin identity; minting starts open
    pub fn new(admin: Uid) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner {
                admin,
                mint_open: true,
                tokens: BTreeMap::new(),
                next_id: LicenseTokenId::first(),
                proceeds: Amount::zero(),
            })),
        }
    }

    /// The admin identity
    pub fn admin(&self) -> Uid {
        self.inner.read().admin
    }

    /// Toggle the global minting window; admin only
    pub fn edit_mint_window(&self, caller: Uid, open: bool) -> Result<()> {
        let mut inner = self.inner.write();
        if caller != inner.admin {
            return Err(LicenseError::NotAdmin { uid: caller });
        }
        inner.mint_open = open;
        Ok(())
    }

    /// Whether the public mint window is open
    pub fn mint_open(&self) -> bool {
        self.inner.read().mint_open
    }

    /// Mint a license token to the caller.
    ///
    /// Requires the window to be open and `value >= MINT_PRICE`; the
    /// attached value is kept as proceeds.
    pub fn public_mint(
        &self,
        caller: Uid,
        value: Amount,
        holder_name: impl Into<String>,
        license_number: impl Into<String>,
        ipfs_image_hash: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<LicenseTokenId> {
        let mut inner = self.inner.write();
        if !inner.mint_open {
            return Err(LicenseError::MintClosed);
        }
        if value < MINT_PRICE {
            return Err(LicenseError::InsufficientPayment {
                required: MINT_PRICE,
                attached: value,
            });
        }
        let id = inner.next_id;
        inner.next_id = id.next();
        inner.tokens.insert(
            id,
            DrivingLicense {
                token_id: id,
                owner: caller,
                holder_name: holder_name.into(),
                license_number: license_number.into(),
                ipfs_image_hash: ipfs_image_hash.into(),
                minted_at: now,
                burned: false,
            },
        );
        inner.proceeds = inner.proceeds.saturating_add(value);
        Ok(id)
    }

    /// Eligibility predicate: at least one non-burned token
    pub fn validate(&self, uid: Uid) -> bool {
        self.inner
            .read()
            .tokens
            .values()
            .any(|t| t.owner == uid && !t.burned)
    }

    /// Burn a token; owner only, irreversible
    pub fn burn(&self, caller: Uid, id: LicenseTokenId) -> Result<()> {
        let mut inner = self.inner.write();
        let token = inner
            .tokens
            .get_mut(&id)
            .ok_or(LicenseError::TokenNotFound { id })?;
        if token.owner != caller {
            return Err(LicenseError::NotTokenOwner { uid: caller, id });
        }
        if token.burned {
            return Err(LicenseError::AlreadyBurned { id });
        }
        token.burned = true;
        Ok(())
    }

    /// All tokens owned by a uid, burned ones included
    pub fn licenses_of(&self, uid: Uid) -> Vec<DrivingLicense> {
        self.inner
            .read()
            .tokens
            .values()
            .filter(|t| t.owner == uid)
            .cloned()
            .collect()
    }

    /// Accumulated mint proceeds
    pub fn proceeds(&self) -> Amount {
        self.inner.read().proceeds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn mint(gate: &LicenseRegistry, uid: Uid) -> LicenseTokenId {
        gate.public_mint(uid, MINT_PRICE, "John Doe", "DL123456", "QmHash", now())
            .unwrap()
    }

    #[test]
    fn mint_requires_open_window() {
        let gate = LicenseRegistry::new(Uid::new());
        let admin = gate.admin();
        let user = Uid::new();

        gate.edit_mint_window(admin, false).unwrap();
        assert_eq!(
            gate.public_mint(user, MINT_PRICE, "John", "DL1", "Qm", now())
                .unwrap_err(),
            LicenseError::MintClosed
        );

        gate.edit_mint_window(admin, true).unwrap();
        mint(&gate, user);
        assert!(gate.validate(user));
    }

    #[test]
    fn window_toggle_is_admin_only() {
        let gate = LicenseRegistry::new(Uid::new());
        let stranger = Uid::new();
        assert_eq!(
            gate.edit_mint_window(stranger, false).unwrap_err(),
            LicenseError::NotAdmin { uid: stranger }
        );
    }

    #[test]
    fn mint_rejects_underpayment() {
        let gate = LicenseRegistry::new(Uid::new());
        let user = Uid::new();
        let short = Amount::from_raw(MINT_PRICE.0 / 2);
        assert_eq!(
            gate.public_mint(user, short, "John", "DL1", "Qm", now())
                .unwrap_err(),
            LicenseError::InsufficientPayment {
                required: MINT_PRICE,
                attached: short,
            }
        );
        assert!(!gate.validate(user));
    }

    #[test]
    fn eligibility_survives_while_one_token_remains() {
        let gate = LicenseRegistry::new(Uid::new());
        let user = Uid::new();
        let first = mint(&gate, user);
        let second = mint(&gate, user);
        assert_eq!(gate.licenses_of(user).len(), 2);

        gate.burn(user, first).unwrap();
        assert!(gate.validate(user));

        gate.burn(user, second).unwrap();
        assert!(!gate.validate(user));
    }

    #[test]
    fn burn_is_owner_only_and_once_only() {
        let gate = LicenseRegistry::new(Uid::new());
        let owner = Uid::new();
        let stranger = Uid::new();
        let id = mint(&gate, owner);

        assert_eq!(
            gate.burn(stranger, id).unwrap_err(),
            LicenseError::NotTokenOwner { uid: stranger, id }
        );
        gate.burn(owner, id).unwrap();
        assert_eq!(
            gate.burn(owner, id).unwrap_err(),
            LicenseError::AlreadyBurned { id }
        );
    }

    #[test]
    fn proceeds_accumulate_attached_value() {
        let gate = LicenseRegistry::new(Uid::new());
        let user = Uid::new();
        mint(&gate, user);
        mint(&gate, user);
        assert_eq!(gate.proceeds(), Amount::from_raw(MINT_PRICE.0 * 2));
    }
}
