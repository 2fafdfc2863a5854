//! The Service Request Engine
//!
//! Every public operation receives the authenticated caller identity (and
//! an attached value where money changes hands), validates against a
//! consistent snapshot of state, and either commits completely or returns
//! a specific error with nothing changed. Time-dependent operations take
//! `now` explicitly; the engine never reads a wall clock.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use openfreight_dispute::DisputeCourt;
use openfreight_license::LicenseRegistry;
use openfreight_registry::Registry;
use openfreight_token::RewardToken;
use openfreight_types::{
    Acceptance, Amount, BidInfo, DisputeWinner, Role, ServiceRequest, SrDraft, SrId, Status, Uid,
    WinningDriverInfo,
};
use parking_lot::RwLock;
use tracing::info;

use crate::error::{EngineError, Result};
use crate::escrow::{EscrowAccount, EscrowReason, Payout, SettlementPolicy};

/// A service request together with its escrow ledger
#[derive(Debug, Clone)]
pub struct SrRecord {
    pub sr: ServiceRequest,
    pub escrow: EscrowAccount,
}

struct Inner {
    uid: Uid,
    registry: Registry,
    licenses: LicenseRegistry,
    court: DisputeCourt,
    rewards: RewardToken,
    policy: SettlementPolicy,
    records: BTreeMap<SrId, SrRecord>,
    next_id: SrId,
}

/// The Service Request Engine.
///
/// A cheap-to-clone handle; peers are injected at construction and the
/// engine's own component identity is what its peers gate on.
#[derive(Clone)]
pub struct ServiceRequestEngine {
    inner: Arc<RwLock<Inner>>,
}

impl ServiceRequestEngine {
    pub fn new(
        registry: Registry,
        licenses: LicenseRegistry,
        court: DisputeCourt,
        rewards: RewardToken,
        policy: SettlementPolicy,
    ) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner {
                uid: Uid::new(),
                registry,
                licenses,
                court,
                rewards,
                policy,
                records: BTreeMap::new(),
                next_id: SrId::first(),
            })),
        }
    }

    /// The engine's component identity (its peers' gate)
    pub fn component_uid(&self) -> Uid {
        self.inner.read().uid
    }

    // ========================================================================
    // Creation and drafting
    // ========================================================================

    /// Create a new service request, escrowing `cargo_value + service_fee`.
    ///
    /// Shipper only. An unregistered receiver is auto-registered with the
    /// destination geohash as their service region. The attached value
    /// must match the escrow exactly.
    pub fn create_sr(
        &self,
        caller: Uid,
        value: Amount,
        draft: SrDraft,
        receiver_phone: &str,
        now: DateTime<Utc>,
    ) -> Result<SrId> {
        let mut inner = self.inner.write();
        let inner = &mut *inner;
        if !inner.registry.has_role(caller, Role::Shipper) {
            return Err(EngineError::MissingRole {
                uid: caller,
                role: Role::Shipper,
            });
        }
        if !matches!(draft.initial_status, Status::Draft | Status::ReadyForAuction) {
            return Err(EngineError::InvalidInitialStatus {
                status: draft.initial_status,
            });
        }
        let required = draft.cargo_value.checked_add(draft.service_fee)?;
        if value < required {
            return Err(EngineError::InsufficientPayment {
                required,
                attached: value,
            });
        }
        if value > required {
            return Err(EngineError::ExcessPayment {
                required,
                attached: value,
            });
        }

        // Explicit auto-registration, idempotent by existence check
        if !inner.registry.is_registered(draft.receiver) {
            inner.registry.create_user(
                draft.receiver,
                String::new(),
                draft.dest.clone(),
                receiver_phone,
                now,
            )?;
        }

        let id = inner.next_id;
        inner.next_id = id.next();
        let mut escrow = EscrowAccount::new();
        escrow.deposit(caller, required, EscrowReason::ShipperEscrow);
        let sr = ServiceRequest {
            id,
            description: draft.description,
            shipper: caller,
            receiver: draft.receiver,
            driver: Uid::nil(),
            origin: draft.origin,
            dest: draft.dest,
            origin_approx: draft.origin_approx,
            dest_approx: draft.dest_approx,
            cargo_value: draft.cargo_value,
            service_fee: draft.service_fee,
            requested_pickup: draft.requested_pickup,
            requested_delivery: draft.requested_delivery,
            auction_end_minutes: draft.auction_end_minutes,
            created_at: now,
            status: draft.initial_status,
            dispute_winner: DisputeWinner::None,
            bid: None,
            winner: None,
        };
        info!(request = %id, shipper = %caller, escrowed = %required, "service request created");
        inner.records.insert(id, SrRecord { sr, escrow });
        Ok(id)
    }

    /// Edit a Draft request; shipper only. May advance it to
    /// ReadyForAuction as part of the edit.
    pub fn edit_draft_sr(
        &self,
        caller: Uid,
        id: SrId,
        status: Status,
        requested_pickup: DateTime<Utc>,
        requested_delivery: DateTime<Utc>,
        auction_end_minutes: u32,
    ) -> Result<()> {
        let mut inner = self.inner.write();
        let record = inner
            .records
            .get_mut(&id)
            .ok_or(EngineError::SrNotFound { id })?;
        if record.sr.shipper != caller {
            return Err(EngineError::NotParty {
                uid: caller,
                party: "shipper",
                id,
            });
        }
        if record.sr.status != Status::Draft {
            return Err(EngineError::WrongState {
                id,
                current: record.sr.status,
                expected: "Draft",
            });
        }
        if !matches!(status, Status::Draft | Status::ReadyForAuction) {
            return Err(EngineError::InvalidInitialStatus { status });
        }
        record.sr.requested_pickup = requested_pickup;
        record.sr.requested_delivery = requested_delivery;
        record.sr.auction_end_minutes = auction_end_minutes;
        record.sr.status = status;
        Ok(())
    }

    /// Cancel a Draft request; shipper only. Refunds the full escrow.
    pub fn cancel_sr(&self, caller: Uid, id: SrId) -> Result<()> {
        let mut inner = self.inner.write();
        let record = inner
            .records
            .get_mut(&id)
            .ok_or(EngineError::SrNotFound { id })?;
        if record.sr.shipper != caller {
            return Err(EngineError::NotParty {
                uid: caller,
                party: "shipper",
                id,
            });
        }
        if record.sr.status != Status::Draft {
            return Err(EngineError::WrongState {
                id,
                current: record.sr.status,
                expected: "Draft",
            });
        }
        let held = record.escrow.balance();
        record
            .escrow
            .payout(caller, held, EscrowReason::CancelRefund)?;
        record.sr.status = Status::Cancelled;
        info!(request = %id, refunded = %held, "service request cancelled");
        Ok(())
    }

    // ========================================================================
    // Auction
    // ========================================================================

    /// Place a Dutch bid, staking the full cargo value as collateral.
    ///
    /// The bid must be at or below the posted fee, and strictly below the
    /// standing bid to displace it; a displaced bidder's stake is refunded
    /// exactly once.
    pub fn dutch_bid(
        &self,
        caller: Uid,
        value: Amount,
        id: SrId,
        bid_fee: Amount,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut inner = self.inner.write();
        let inner = &mut *inner;
        if !inner.registry.has_role(caller, Role::Driver) {
            return Err(EngineError::MissingRole {
                uid: caller,
                role: Role::Driver,
            });
        }
        if !inner.licenses.validate(caller) {
            return Err(EngineError::UnlicensedDriver { uid: caller });
        }
        let region = inner.registry.user_geohash(caller)?;
        let record = inner
            .records
            .get_mut(&id)
            .ok_or(EngineError::SrNotFound { id })?;
        let sr = &record.sr;
        if !sr.covered_by(&region) {
            return Err(EngineError::RegionMismatch { uid: caller, id });
        }
        if sr.status != Status::ReadyForAuction {
            return Err(EngineError::WrongState {
                id,
                current: sr.status,
                expected: "ReadyForAuction",
            });
        }
        if !sr.auction_open(now) {
            return Err(EngineError::AuctionClosed { id });
        }
        if bid_fee > sr.service_fee {
            return Err(EngineError::BidTooHigh {
                bid: bid_fee,
                ceiling: sr.service_fee,
            });
        }
        if let Some(standing) = sr.bid {
            if bid_fee >= standing.fee {
                return Err(EngineError::BidNotLower {
                    bid: bid_fee,
                    best: standing.fee,
                });
            }
        }
        let stake = sr.cargo_value;
        if value < stake {
            return Err(EngineError::InsufficientPayment {
                required: stake,
                attached: value,
            });
        }
        if value > stake {
            return Err(EngineError::ExcessPayment {
                required: stake,
                attached: value,
            });
        }

        let displaced = record.sr.bid.replace(BidInfo {
            bidder: caller,
            fee: bid_fee,
        });
        record.escrow.deposit(caller, stake, EscrowReason::BidStake);
        if let Some(previous) = displaced {
            record
                .escrow
                .payout(previous.bidder, stake, EscrowReason::DisplacedStakeRefund)?;
            info!(request = %id, displaced = %previous.bidder, "standing bid displaced, stake refunded");
        }
        info!(request = %id, bidder = %caller, fee = %bid_fee, "bid accepted");
        Ok(())
    }

    /// Commit the auction outcome once the window has elapsed.
    ///
    /// Open to any caller: external callers invoke it after the deadline
    /// and the engine only validates that the deadline passed. With no
    /// bids the request stays in ReadyForAuction for retry, or for a
    /// cancellation policy decided upstream.
    pub fn declare_winner(&self, caller: Uid, id: SrId, now: DateTime<Utc>) -> Result<Uid> {
        let mut inner = self.inner.write();
        let record = inner
            .records
            .get_mut(&id)
            .ok_or(EngineError::SrNotFound { id })?;
        let sr = &mut record.sr;
        if sr.status != Status::ReadyForAuction {
            return Err(EngineError::WrongState {
                id,
                current: sr.status,
                expected: "ReadyForAuction",
            });
        }
        if sr.auction_open(now) {
            return Err(EngineError::AuctionStillOpen { id });
        }
        let bid = sr.bid.ok_or(EngineError::NoBids { id })?;
        sr.driver = bid.bidder;
        sr.winner = Some(WinningDriverInfo {
            driver: bid.bidder,
            service_fee: bid.fee,
            cargo_stake: sr.cargo_value,
            stake_refunded: false,
            fee_paid: false,
        });
        sr.status = Status::DriverAssigned;
        info!(request = %id, caller = %caller, driver = %bid.bidder, fee = %bid.fee, "auction winner declared");
        Ok(bid.bidder)
    }

    // ========================================================================
    // Status pipeline
    // ========================================================================

    /// Advance a request exactly one step along the pipeline.
    ///
    /// Each edge is owned by one party: the shipper opens the auction and
    /// readies the pickup, the driver moves the parcel, the receiver
    /// accepts or disputes the delivery. Acceptance triggers settlement;
    /// a dispute escalates a snapshot to the court.
    pub fn update_status(&self, caller: Uid, id: SrId, new_status: Status) -> Result<()> {
        let mut inner = self.inner.write();
        let inner = &mut *inner;
        let record = inner
            .records
            .get(&id)
            .ok_or(EngineError::SrNotFound { id })?;
        let current = record.sr.status;
        if !current.may_step_to(new_status) {
            return Err(EngineError::InvalidTransition {
                id,
                from: current,
                to: new_status,
            });
        }
        // Engine-owned edges never go through a plain status update
        if matches!(new_status, Status::DriverAssigned | Status::DisputeResolved) {
            return Err(EngineError::WrongState {
                id,
                current,
                expected: "declare_winner / resolve_dispute",
            });
        }
        let sr = &record.sr;
        let (authorized, party) = match new_status {
            Status::ReadyForAuction | Status::ReadyForPickup => (caller == sr.shipper, "shipper"),
            Status::ParcelPickedUp | Status::InTransit | Status::Delivered => {
                (caller == sr.driver, "driver")
            }
            Status::ConditionallyAccepted | Status::UnconditionallyAccepted | Status::Disputed => {
                (caller == sr.receiver, "receiver")
            }
            _ => (false, "engine"),
        };
        if !authorized {
            return Err(EngineError::NotParty {
                uid: caller,
                party,
                id,
            });
        }

        match new_status {
            Status::ConditionallyAccepted => {
                Self::settle_acceptance(inner, id, Acceptance::Conditional)?;
            }
            Status::UnconditionallyAccepted => {
                Self::settle_acceptance(inner, id, Acceptance::Unconditional)?;
            }
            Status::Disputed => {
                let record = inner
                    .records
                    .get(&id)
                    .ok_or(EngineError::SrNotFound { id })?;
                let mut snapshot = record.sr.clone();
                snapshot.status = Status::Disputed;
                let receiver = snapshot.receiver;
                inner.court.add_disputed_sr(inner.uid, receiver, snapshot)?;
                let record = inner
                    .records
                    .get_mut(&id)
                    .ok_or(EngineError::SrNotFound { id })?;
                record.sr.status = Status::Disputed;
                info!(request = %id, "delivery disputed, escalated for regional vote");
            }
            _ => {
                let record = inner
                    .records
                    .get_mut(&id)
                    .ok_or(EngineError::SrNotFound { id })?;
                record.sr.status = new_status;
            }
        }
        Ok(())
    }

    /// Pull the dispute outcome once quorum is met and settle accordingly.
    ///
    /// Open to any caller, like `declare_winner`; the court enforces
    /// quorum and resolves exactly once.
    pub fn resolve_dispute(&self, caller: Uid, id: SrId) -> Result<DisputeWinner> {
        let mut inner = self.inner.write();
        let inner = &mut *inner;
        let record = inner
            .records
            .get(&id)
            .ok_or(EngineError::SrNotFound { id })?;
        if record.sr.status != Status::Disputed {
            return Err(EngineError::WrongState {
                id,
                current: record.sr.status,
                expected: "Disputed",
            });
        }
        let winner_info = record.sr.winner.ok_or(EngineError::WrongState {
            id,
            current: record.sr.status,
            expected: "a committed auction winner",
        })?;

        let resolution = inner.court.try_resolve(inner.uid, id)?;

        let record = inner
            .records
            .get_mut(&id)
            .ok_or(EngineError::SrNotFound { id })?;
        let plan = inner
            .policy
            .dispute_plan(&record.sr, &winner_info, resolution.winner)?;
        Self::apply_plan(record, &plan)?;
        record.sr.dispute_winner = resolution.winner;
        record.sr.status = Status::DisputeResolved;
        info!(request = %id, caller = %caller, outcome = ?resolution.winner, "dispute settled");
        Ok(resolution.winner)
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Auctions open at `now` whose region the calling driver covers
    pub fn auction_list_in_driver_region(
        &self,
        caller: Uid,
        now: DateTime<Utc>,
    ) -> Result<Vec<ServiceRequest>> {
        let inner = self.inner.read();
        if !inner.registry.has_role(caller, Role::Driver) {
            return Err(EngineError::MissingRole {
                uid: caller,
                role: Role::Driver,
            });
        }
        let region = inner.registry.user_geohash(caller)?;
        Ok(inner
            .records
            .values()
            .filter(|r| {
                r.sr.status == Status::ReadyForAuction
                    && r.sr.auction_open(now)
                    && r.sr.covered_by(&region)
            })
            .map(|r| r.sr.clone())
            .collect())
    }

    /// All requests; admin only
    pub fn all_srs(&self, caller: Uid) -> Result<Vec<ServiceRequest>> {
        let inner = self.inner.read();
        if !inner.registry.has_role(caller, Role::Admin) {
            return Err(EngineError::MissingRole {
                uid: caller,
                role: Role::Admin,
            });
        }
        Ok(inner.records.values().map(|r| r.sr.clone()).collect())
    }

    /// Requests the caller participates in, as any party
    pub fn my_srs(&self, caller: Uid) -> Vec<ServiceRequest> {
        self.inner
            .read()
            .records
            .values()
            .filter(|r| r.sr.shipper == caller || r.sr.receiver == caller || r.sr.driver == caller)
            .map(|r| r.sr.clone())
            .collect()
    }

    /// One request by id
    pub fn sr(&self, id: SrId) -> Result<ServiceRequest> {
        self.inner
            .read()
            .records
            .get(&id)
            .map(|r| r.sr.clone())
            .ok_or(EngineError::SrNotFound { id })
    }

    /// The escrow ledger of one request
    pub fn escrow_account(&self, id: SrId) -> Result<EscrowAccount> {
        self.inner
            .read()
            .records
            .get(&id)
            .map(|r| r.escrow.clone())
            .ok_or(EngineError::SrNotFound { id })
    }

    // ========================================================================
    // Settlement internals
    // ========================================================================

    /// Final settlement on acceptance: the reward transfer commits first
    /// (its peer gate can reject), then the escrow plan, which conserves
    /// the account by construction.
    fn settle_acceptance(inner: &mut Inner, id: SrId, acceptance: Acceptance) -> Result<()> {
        let record = inner
            .records
            .get_mut(&id)
            .ok_or(EngineError::SrNotFound { id })?;
        let winner_info = record.sr.winner.ok_or(EngineError::WrongState {
            id,
            current: record.sr.status,
            expected: "a committed auction winner",
        })?;
        let plan = inner
            .policy
            .acceptance_plan(&record.sr, &winner_info, acceptance)?;

        let cargo = record.sr.cargo_value;
        let reward = inner
            .rewards
            .transfer_reward(inner.uid, winner_info.driver, cargo, acceptance)?;

        Self::apply_plan(record, &plan)?;
        record.sr.status = match acceptance {
            Acceptance::Conditional => Status::ConditionallyAccepted,
            Acceptance::Unconditional => Status::UnconditionallyAccepted,
        };
        info!(request = %id, ?acceptance, %reward, "delivery accepted and settled");
        Ok(())
    }

    /// Apply a settlement plan to the record and flip the idempotency
    /// flags; a plan is only ever applied once per request.
    fn apply_plan(record: &mut SrRecord, plan: &[Payout]) -> Result<()> {
        for payout in plan {
            record
                .escrow
                .payout(payout.to, payout.amount, payout.reason)?;
        }
        if let Some(winner) = record.sr.winner.as_mut() {
            winner.stake_refunded = true;
            winner.fee_paid = true;
        }
        Ok(())
    }
}
