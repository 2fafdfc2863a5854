//! OpenFreight Token - capped reward token
//!
//! A fungible balance book with a hard supply cap. The marketplace engine
//! is the only identity allowed to pay out acceptance rewards, drawn from
//! the treasury seeded at construction:
//!
//! 1. Total supply never exceeds the cap
//! 2. Reward payouts are engine-gated and saturate at the treasury balance
//! 3. The owner can pause all movement
//! 4. Balances never go negative

use std::collections::BTreeMap;
use std::sync::Arc;

use openfreight_types::{Acceptance, Amount, Uid};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Hard cap on total supply: ten million whole tokens
pub const SUPPLY_CAP: Amount = Amount::from_whole(10_000_000);

/// Treasury seeded at construction: one million whole tokens
pub const INITIAL_SUPPLY: Amount = Amount::from_whole(1_000_000);

/// Errors that can occur in token operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("minting {requested} would exceed the supply cap, only {remaining} remain")]
    SupplyCapExceeded { requested: Amount, remaining: Amount },

    #[error("insufficient balance: have {available}, need {required}")]
    InsufficientBalance { available: Amount, required: Amount },

    #[error("token movement is paused")]
    TokenPaused,

    #[error("caller {uid} is not the owner")]
    NotOwner { uid: Uid },

    #[error("caller {uid} is not the configured engine peer")]
    NotEnginePeer { uid: Uid },
}

pub type Result<T> = std::result::Result<T, TokenError>;

/// The reward schedule applied on delivery acceptance, in basis points of
/// the cargo's insurable value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardSchedule {
    pub conditional_bps: u16,
    pub unconditional_bps: u16,
}

impl Default for RewardSchedule {
    fn default() -> Self {
        Self {
            conditional_bps: 200,
            unconditional_bps: 500,
        }
    }
}

impl RewardSchedule {
    /// Reward for an accepted delivery of the given cargo value
    pub fn reward_for(&self, cargo_value: Amount, acceptance: Acceptance) -> Amount {
        let bps = match acceptance {
            Acceptance::Conditional => self.conditional_bps,
            Acceptance::Unconditional => self.unconditional_bps,
        };
        // Schedule bps are well below the denominator; treat overflow as zero reward
        cargo_value.mul_bps(bps).unwrap_or(Amount::zero())
    }
}

struct Inner {
    owner: Uid,
    engine_peer: Option<Uid>,
    paused: bool,
    schedule: RewardSchedule,
    total_supply: Amount,
    /// The un-allocated treasury the engine pays rewards from
    treasury: Amount,
    balances: BTreeMap<Uid, Amount>,
}

/// The capped reward token
#[derive(Clone)]
pub struct RewardToken {
    inner: Arc<RwLock<Inner>>,
}

impl RewardToken {
    /// Create the token with its owner; the treasury is seeded with
    /// [`INITIAL_SUPPLY`]
    pub fn new(owner: Uid) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner {
                owner,
                engine_peer: None,
                paused: false,
                schedule: RewardSchedule::default(),
                total_supply: INITIAL_SUPPLY,
                treasury: INITIAL_SUPPLY,
                balances: BTreeMap::new(),
            })),
        }
    }

    pub fn owner(&self) -> Uid {
        self.inner.read().owner
    }

    pub fn total_supply(&self) -> Amount {
        self.inner.read().total_supply
    }

    pub fn treasury(&self) -> Amount {
        self.inner.read().treasury
    }

    pub fn balance_of(&self, uid: Uid) -> Amount {
        self.inner
            .read()
            .balances
            .get(&uid)
            .copied()
            .unwrap_or(Amount::zero())
    }

    /// Mint new supply into the treasury; owner only, capped
    pub fn mint(&self, caller: Uid, amount: Amount) -> Result<()> {
        let mut inner = self.inner.write();
        if caller != inner.owner {
            return Err(TokenError::NotOwner { uid: caller });
        }
        let remaining = SUPPLY_CAP.saturating_sub(inner.total_supply);
        if amount > remaining {
            return Err(TokenError::SupplyCapExceeded {
                requested: amount,
                remaining,
            });
        }
        inner.total_supply = inner.total_supply.saturating_add(amount);
        inner.treasury = inner.treasury.saturating_add(amount);
        Ok(())
    }

    /// Move balance between holders
    pub fn transfer(&self, caller: Uid, to: Uid, amount: Amount) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.paused {
            return Err(TokenError::TokenPaused);
        }
        let available = inner
            .balances
            .get(&caller)
            .copied()
            .unwrap_or(Amount::zero());
        if available < amount {
            return Err(TokenError::InsufficientBalance {
                available,
                required: amount,
            });
        }
        inner
            .balances
            .insert(caller, available.saturating_sub(amount));
        let credited = inner
            .balances
            .get(&to)
            .copied()
            .unwrap_or(Amount::zero())
            .saturating_add(amount);
        inner.balances.insert(to, credited);
        Ok(())
    }

    /// Pay the acceptance reward to a driver from the treasury.
    ///
    /// Engine-peer only. Saturates at the treasury balance so settlement
    /// never fails on an empty treasury; returns the amount actually paid.
    pub fn transfer_reward(
        &self,
        caller: Uid,
        driver: Uid,
        cargo_value: Amount,
        acceptance: Acceptance,
    ) -> Result<Amount> {
        let mut inner = self.inner.write();
        if inner.engine_peer != Some(caller) {
            return Err(TokenError::NotEnginePeer { uid: caller });
        }
        if inner.paused {
            return Err(TokenError::TokenPaused);
        }
        let reward = inner
            .schedule
            .reward_for(cargo_value, acceptance)
            .min(inner.treasury);
        if reward.is_zero() {
            return Ok(Amount::zero());
        }
        inner.treasury = inner.treasury.saturating_sub(reward);
        let credited = inner
            .balances
            .get(&driver)
            .copied()
            .unwrap_or(Amount::zero())
            .saturating_add(reward);
        inner.balances.insert(driver, credited);
        Ok(reward)
    }

    /// Halt all token movement; owner only
    pub fn pause(&self, caller: Uid) -> Result<()> {
        self.set_paused(caller, true)
    }

    /// Resume token movement; owner only
    pub fn unpause(&self, caller: Uid) -> Result<()> {
        self.set_paused(caller, false)
    }

    fn set_paused(&self, caller: Uid, paused: bool) -> Result<()> {
        let mut inner = self.inner.write();
        if caller != inner.owner {
            return Err(TokenError::NotOwner { uid: caller });
        }
        inner.paused = paused;
        Ok(())
    }

    /// Bind the engine identity allowed to pay rewards; owner only
    pub fn set_engine_peer(&self, caller: Uid, peer: Uid) -> Result<()> {
        let mut inner = self.inner.write();
        if caller != inner.owner {
            return Err(TokenError::NotOwner { uid: caller });
        }
        inner.engine_peer = Some(peer);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_with_engine() -> (RewardToken, Uid, Uid) {
        let owner = Uid::new();
        let engine = Uid::new();
        let token = RewardToken::new(owner);
        token.set_engine_peer(owner, engine).unwrap();
        (token, owner, engine)
    }

    #[test]
    fn mint_respects_the_cap() {
        let (token, owner, _) = token_with_engine();
        let headroom = SUPPLY_CAP.saturating_sub(INITIAL_SUPPLY);
        token.mint(owner, headroom).unwrap();
        assert_eq!(token.total_supply(), SUPPLY_CAP);

        let err = token.mint(owner, Amount::from_raw(1)).unwrap_err();
        assert_eq!(
            err,
            TokenError::SupplyCapExceeded {
                requested: Amount::from_raw(1),
                remaining: Amount::zero(),
            }
        );
    }

    #[test]
    fn mint_is_owner_only() {
        let (token, _, engine) = token_with_engine();
        assert_eq!(
            token.mint(engine, Amount::from_whole(1)).unwrap_err(),
            TokenError::NotOwner { uid: engine }
        );
    }

    #[test]
    fn reward_is_engine_gated() {
        let (token, owner, engine) = token_with_engine();
        let driver = Uid::new();
        let cargo = Amount::from_whole(100);

        assert_eq!(
            token
                .transfer_reward(owner, driver, cargo, Acceptance::Unconditional)
                .unwrap_err(),
            TokenError::NotEnginePeer { uid: owner }
        );

        let paid = token
            .transfer_reward(engine, driver, cargo, Acceptance::Unconditional)
            .unwrap();
        assert_eq!(paid, Amount::from_whole(5));
        assert_eq!(token.balance_of(driver), Amount::from_whole(5));

        let paid = token
            .transfer_reward(engine, driver, cargo, Acceptance::Conditional)
            .unwrap();
        assert_eq!(paid, Amount::from_whole(2));
    }

    #[test]
    fn reward_saturates_at_treasury() {
        let (token, _, engine) = token_with_engine();
        let driver = Uid::new();
        // A cargo so large the 5% reward dwarfs the treasury
        let cargo = Amount::from_whole(1_000_000_000);
        let paid = token
            .transfer_reward(engine, driver, cargo, Acceptance::Unconditional)
            .unwrap();
        assert_eq!(paid, INITIAL_SUPPLY);
        assert_eq!(token.treasury(), Amount::zero());

        let paid = token
            .transfer_reward(engine, driver, cargo, Acceptance::Unconditional)
            .unwrap();
        assert_eq!(paid, Amount::zero());
    }

    #[test]
    fn pause_blocks_movement() {
        let (token, owner, engine) = token_with_engine();
        let driver = Uid::new();
        token.pause(owner).unwrap();
        assert_eq!(
            token
                .transfer_reward(engine, driver, Amount::from_whole(10), Acceptance::Conditional)
                .unwrap_err(),
            TokenError::TokenPaused
        );
        token.unpause(owner).unwrap();
        token
            .transfer_reward(engine, driver, Amount::from_whole(10), Acceptance::Conditional)
            .unwrap();
    }

    #[test]
    fn transfer_moves_balance_exactly() {
        let (token, _, engine) = token_with_engine();
        let a = Uid::new();
        let b = Uid::new();
        token
            .transfer_reward(engine, a, Amount::from_whole(100), Acceptance::Unconditional)
            .unwrap();
        token.transfer(a, b, Amount::from_whole(2)).unwrap();
        assert_eq!(token.balance_of(a), Amount::from_whole(3));
        assert_eq!(token.balance_of(b), Amount::from_whole(2));

        assert_eq!(
            token.transfer(b, a, Amount::from_whole(50)).unwrap_err(),
            TokenError::InsufficientBalance {
                available: Amount::from_whole(2),
                required: Amount::from_whole(50),
            }
        );
    }
}
