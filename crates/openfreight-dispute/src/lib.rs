//! OpenFreight Dispute - regional dispute resolution
//!
//! Holds dispute records escalated by the engine and tallies votes from
//! region-eligible drivers. Resolution is pulled by the engine once the
//! quorum is met: a strict majority picks the winner, an exact tie is a
//! draw, and a receiver win costs the driver a rating star.
//!
//! # Invariants
//!
//! 1. Only the bound engine peer files disputes or pulls resolutions
//! 2. Each eligible voter votes at most once per dispute
//! 3. A dispute resolves exactly once, and only at or past quorum
//! 4. The winner is a pure function of the final tallies

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use openfreight_registry::{Registry, RegistryError};
use openfreight_types::{
    DisputeWinner, Role, ServiceRequest, SrId, Uid, VoteChoice, VoteCount,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur in dispute operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DisputeError {
    #[error("caller {uid} is not the configured engine peer")]
    NotEnginePeer { uid: Uid },

    #[error("a dispute for request {id} already exists")]
    DuplicateDispute { id: SrId },

    #[error("no dispute found for request {id}")]
    DisputeNotFound { id: SrId },

    #[error("caller {uid} lacks the {role} role")]
    MissingRole { uid: Uid, role: Role },

    #[error("caller {uid} is outside the disputed request's region")]
    RegionMismatch { uid: Uid },

    #[error("caller {uid} is an interested party in request {id}")]
    SelfInterestDenied { uid: Uid, id: SrId },

    #[error("caller {uid} already voted on request {id}")]
    DuplicateVote { uid: Uid, id: SrId },

    #[error("dispute {id} has {have} of {need} quorum votes")]
    QuorumNotMet { id: SrId, have: u32, need: u32 },

    #[error("dispute {id} is already resolved")]
    AlreadyResolved { id: SrId },

    #[error("caller {uid} is not the admin")]
    NotAdmin { uid: Uid },

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),
}

pub type Result<T> = std::result::Result<T, DisputeError>;

/// Configuration for the dispute court
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisputeConfig {
    /// Minimum total votes before a resolution can be pulled
    pub quorum: u32,
}

impl Default for DisputeConfig {
    fn default() -> Self {
        Self { quorum: 2 }
    }
}

/// A dispute under regional vote
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisputeRecord {
    pub request_id: SrId,
    pub receiver: Uid,
    /// The service request as it stood when the dispute was filed
    pub snapshot: ServiceRequest,
    pub votes: VoteCount,
    pub voters: BTreeSet<Uid>,
    pub resolved: bool,
}

/// Outcome handed back to the engine on resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisputeResolution {
    pub request_id: SrId,
    pub winner: DisputeWinner,
    pub votes: VoteCount,
}

struct Inner {
    uid: Uid,
    admin: Uid,
    registry: Registry,
    config: DisputeConfig,
    engine_peer: Option<Uid>,
    disputes: BTreeMap<SrId, DisputeRecord>,
}

/// The dispute court
#[derive(Clone)]
pub struct DisputeCourt {
    inner: Arc<RwLock<Inner>>,
}

impl DisputeCourt {
    /// Create a court bound to the registry, with its admin identity
    pub fn new(admin: Uid, registry: Registry, config: DisputeConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner {
                uid: Uid::new(),
                admin,
                registry,
                config,
                engine_peer: None,
                disputes: BTreeMap::new(),
            })),
        }
    }

    /// The court's own component identity (the registry's dispute peer)
    pub fn component_uid(&self) -> Uid {
        self.inner.read().uid
    }

    /// Bind the engine identity allowed to file and resolve; admin only
    pub fn set_engine_peer(&self, caller: Uid, peer: Uid) -> Result<()> {
        let mut inner = self.inner.write();
        if caller != inner.admin {
            return Err(DisputeError::NotAdmin { uid: caller });
        }
        inner.engine_peer = Some(peer);
        Ok(())
    }

    /// File a dispute for a delivered request; engine peer only
    pub fn add_disputed_sr(
        &self,
        caller: Uid,
        receiver: Uid,
        snapshot: ServiceRequest,
    ) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.engine_peer != Some(caller) {
            return Err(DisputeError::NotEnginePeer { uid: caller });
        }
        let id = snapshot.id;
        if inner.disputes.contains_key(&id) {
            return Err(DisputeError::DuplicateDispute { id });
        }
        inner.disputes.insert(
            id,
            DisputeRecord {
                request_id: id,
                receiver,
                snapshot,
                votes: VoteCount::default(),
                voters: BTreeSet::new(),
                resolved: false,
            },
        );
        tracing::info!(request = %id, "dispute filed for regional vote");
        Ok(())
    }

    /// Cast a vote on an open dispute.
    ///
    /// The caller must hold the Driver role, cover the disputed request's
    /// region, and must not be one of its interested parties.
    pub fn vote(&self, caller: Uid, id: SrId, choice: VoteChoice) -> Result<()> {
        let mut inner = self.inner.write();
        if !inner.registry.has_role(caller, Role::Driver) {
            return Err(DisputeError::MissingRole {
                uid: caller,
                role: Role::Driver,
            });
        }
        let region = inner.registry.user_geohash(caller)?;
        let record = inner
            .disputes
            .get(&id)
            .ok_or(DisputeError::DisputeNotFound { id })?;
        if record.resolved {
            return Err(DisputeError::AlreadyResolved { id });
        }
        if !record.snapshot.covered_by(&region) {
            return Err(DisputeError::RegionMismatch { uid: caller });
        }
        let snapshot = &record.snapshot;
        if caller == snapshot.driver || caller == snapshot.shipper || caller == record.receiver {
            return Err(DisputeError::SelfInterestDenied { uid: caller, id });
        }
        if record.voters.contains(&caller) {
            return Err(DisputeError::DuplicateVote { uid: caller, id });
        }

        let record = inner
            .disputes
            .get_mut(&id)
            .ok_or(DisputeError::DisputeNotFound { id })?;
        record.voters.insert(caller);
        match choice {
            VoteChoice::Driver => record.votes.driver += 1,
            VoteChoice::Receiver => record.votes.receiver += 1,
        }
        Ok(())
    }

    /// Finalize a dispute once quorum is met; engine peer only.
    ///
    /// Marks the record resolved exactly once and deducts a rating star
    /// from the driver when the receiver wins.
    pub fn try_resolve(&self, caller: Uid, id: SrId) -> Result<DisputeResolution> {
        let mut inner = self.inner.write();
        if inner.engine_peer != Some(caller) {
            return Err(DisputeError::NotEnginePeer { uid: caller });
        }
        let quorum = inner.config.quorum;
        let record = inner
            .disputes
            .get(&id)
            .ok_or(DisputeError::DisputeNotFound { id })?;
        if record.resolved {
            return Err(DisputeError::AlreadyResolved { id });
        }
        let have = record.votes.total();
        if have < quorum {
            return Err(DisputeError::QuorumNotMet {
                id,
                have,
                need: quorum,
            });
        }
        let winner = record.votes.winner();
        let votes = record.votes;
        let driver = record.snapshot.driver;

        let court_uid = inner.uid;
        if winner == DisputeWinner::Receiver {
            inner.registry.deduct_star(court_uid, driver)?;
        }
        let record = inner
            .disputes
            .get_mut(&id)
            .ok_or(DisputeError::DisputeNotFound { id })?;
        record.resolved = true;
        tracing::info!(request = %id, ?winner, "dispute resolved");
        Ok(DisputeResolution {
            request_id: id,
            winner,
            votes,
        })
    }

    /// Open disputes whose region the calling driver covers
    pub fn disputes_in_driver_area(&self, caller: Uid) -> Result<Vec<DisputeRecord>> {
        let inner = self.inner.read();
        if !inner.registry.has_role(caller, Role::Driver) {
            return Err(DisputeError::MissingRole {
                uid: caller,
                role: Role::Driver,
            });
        }
        let region = inner.registry.user_geohash(caller)?;
        Ok(inner
            .disputes
            .values()
            .filter(|d| !d.resolved && d.snapshot.covered_by(&region))
            .cloned()
            .collect())
    }

    /// A dispute record by request id
    pub fn dispute(&self, id: SrId) -> Result<DisputeRecord> {
        self.inner
            .read()
            .disputes
            .get(&id)
            .cloned()
            .ok_or(DisputeError::DisputeNotFound { id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use openfreight_types::{Amount, DisputeWinner, GeoHash, Status};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn gh(s: &str) -> GeoHash {
        GeoHash::new(s).unwrap()
    }

    struct Fixture {
        registry: Registry,
        court: DisputeCourt,
        engine: Uid,
        shipper: Uid,
        receiver: Uid,
        driver: Uid,
    }

    impl Fixture {
        fn new(quorum: u32) -> Self {
            let registry = Registry::new(Uid::new());
            let court = DisputeCourt::new(
                registry.admin(),
                registry.clone(),
                DisputeConfig { quorum },
            );
            registry
                .set_dispute_peer(registry.admin(), court.component_uid())
                .unwrap();
            let engine = Uid::new();
            court.set_engine_peer(registry.admin(), engine).unwrap();

            let fixture = Self {
                shipper: Uid::new(),
                receiver: Uid::new(),
                driver: Uid::new(),
                registry,
                court,
                engine,
            };
            fixture.register(fixture.shipper, "tdr1");
            fixture.register(fixture.receiver, "tdr4");
            fixture.register_driver(fixture.driver, "tdr");
            fixture
        }

        fn register(&self, uid: Uid, region: &str) {
            self.registry
                .create_user(uid, "User", gh(region), "+919876543210", now())
                .unwrap();
        }

        fn register_driver(&self, uid: Uid, region: &str) {
            self.register(uid, region);
            let id = self
                .registry
                .create_role_request(uid, Role::Driver, now())
                .unwrap();
            self.registry
                .approve_or_reject(self.registry.admin(), id, true)
                .unwrap();
        }

        fn new_voter(&self, region: &str) -> Uid {
            let uid = Uid::new();
            self.register_driver(uid, region);
            uid
        }

        fn file_dispute(&self) -> SrId {
            let snapshot = ServiceRequest {
                id: SrId(0),
                description: "disputed delivery".into(),
                shipper: self.shipper,
                receiver: self.receiver,
                driver: self.driver,
                origin: gh("tdr1yt"),
                dest: gh("tdr4km"),
                origin_approx: gh("tdr1"),
                dest_approx: gh("tdr4"),
                cargo_value: Amount::from_whole(100),
                service_fee: Amount::from_whole(10),
                requested_pickup: now() + Duration::days(2),
                requested_delivery: now() + Duration::days(3),
                auction_end_minutes: 240,
                created_at: now(),
                status: Status::Disputed,
                dispute_winner: DisputeWinner::None,
                bid: None,
                winner: None,
            };
            self.court
                .add_disputed_sr(self.engine, self.receiver, snapshot)
                .unwrap();
            SrId(0)
        }
    }

    #[test]
    fn filing_is_engine_gated_and_unique() {
        let f = Fixture::new(2);
        let stranger = Uid::new();
        let id = f.file_dispute();
        let record = f.court.dispute(id).unwrap();
        assert_eq!(
            f.court
                .add_disputed_sr(stranger, f.receiver, record.snapshot.clone())
                .unwrap_err(),
            DisputeError::NotEnginePeer { uid: stranger }
        );
        assert_eq!(
            f.court
                .add_disputed_sr(f.engine, f.receiver, record.snapshot)
                .unwrap_err(),
            DisputeError::DuplicateDispute { id }
        );
    }

    #[test]
    fn voting_requires_driver_role_and_region() {
        let f = Fixture::new(2);
        let id = f.file_dispute();

        // Non-drivers may not vote at all
        assert_eq!(
            f.court
                .vote(f.shipper, id, VoteChoice::Driver)
                .unwrap_err(),
            DisputeError::MissingRole {
                uid: f.shipper,
                role: Role::Driver,
            }
        );

        // Out-of-region driver
        let outsider = f.new_voter("w0nd");
        assert_eq!(
            f.court.vote(outsider, id, VoteChoice::Driver).unwrap_err(),
            DisputeError::RegionMismatch { uid: outsider }
        );

        // In-region driver
        let voter = f.new_voter("tdr");
        f.court.vote(voter, id, VoteChoice::Driver).unwrap();
        assert_eq!(f.court.dispute(id).unwrap().votes.driver, 1);
    }

    #[test]
    fn interested_parties_and_repeats_are_denied() {
        let f = Fixture::new(2);
        let id = f.file_dispute();

        assert_eq!(
            f.court.vote(f.driver, id, VoteChoice::Driver).unwrap_err(),
            DisputeError::SelfInterestDenied { uid: f.driver, id }
        );

        let voter = f.new_voter("tdr");
        f.court.vote(voter, id, VoteChoice::Receiver).unwrap();
        assert_eq!(
            f.court.vote(voter, id, VoteChoice::Receiver).unwrap_err(),
            DisputeError::DuplicateVote { uid: voter, id }
        );
    }

    #[test]
    fn resolution_waits_for_quorum() {
        let f = Fixture::new(2);
        let id = f.file_dispute();
        let voter = f.new_voter("tdr");
        f.court.vote(voter, id, VoteChoice::Driver).unwrap();

        assert_eq!(
            f.court.try_resolve(f.engine, id).unwrap_err(),
            DisputeError::QuorumNotMet {
                id,
                have: 1,
                need: 2,
            }
        );
    }

    #[test]
    fn majority_picks_winner_and_resolves_once() {
        let f = Fixture::new(2);
        let id = f.file_dispute();
        for choice in [VoteChoice::Driver, VoteChoice::Driver, VoteChoice::Receiver] {
            let voter = f.new_voter("tdr");
            f.court.vote(voter, id, choice).unwrap();
        }

        let resolution = f.court.try_resolve(f.engine, id).unwrap();
        assert_eq!(resolution.winner, DisputeWinner::Driver);
        assert_eq!(resolution.votes.total(), 3);

        assert_eq!(
            f.court.try_resolve(f.engine, id).unwrap_err(),
            DisputeError::AlreadyResolved { id }
        );
        // Driver win leaves the rating untouched
        assert_eq!(
            f.registry.user_info(f.driver).unwrap().rating_stars,
            openfreight_registry::INITIAL_RATING_STARS
        );
    }

    #[test]
    fn exact_tie_is_a_draw() {
        let f = Fixture::new(2);
        let id = f.file_dispute();
        for choice in [VoteChoice::Driver, VoteChoice::Receiver] {
            let voter = f.new_voter("tdr");
            f.court.vote(voter, id, choice).unwrap();
        }
        let resolution = f.court.try_resolve(f.engine, id).unwrap();
        assert_eq!(resolution.winner, DisputeWinner::Draw);
    }

    #[test]
    fn receiver_win_costs_the_driver_a_star() {
        let f = Fixture::new(2);
        let id = f.file_dispute();
        for _ in 0..2 {
            let voter = f.new_voter("tdr");
            f.court.vote(voter, id, VoteChoice::Receiver).unwrap();
        }
        let resolution = f.court.try_resolve(f.engine, id).unwrap();
        assert_eq!(resolution.winner, DisputeWinner::Receiver);
        assert_eq!(
            f.registry.user_info(f.driver).unwrap().rating_stars,
            openfreight_registry::INITIAL_RATING_STARS - 1
        );
    }

    #[test]
    fn voting_after_resolution_is_rejected() {
        let f = Fixture::new(1);
        let id = f.file_dispute();
        let voter = f.new_voter("tdr");
        f.court.vote(voter, id, VoteChoice::Driver).unwrap();
        f.court.try_resolve(f.engine, id).unwrap();

        let late = f.new_voter("tdr");
        assert_eq!(
            f.court.vote(late, id, VoteChoice::Driver).unwrap_err(),
            DisputeError::AlreadyResolved { id }
        );
    }

    #[test]
    fn area_listing_filters_open_disputes_by_region() {
        let f = Fixture::new(2);
        let id = f.file_dispute();

        let near = f.new_voter("tdr");
        let far = f.new_voter("w0nd");
        assert_eq!(f.court.disputes_in_driver_area(near).unwrap().len(), 1);
        assert!(f.court.disputes_in_driver_area(far).unwrap().is_empty());

        // Resolved disputes drop out of the listing
        let a = f.new_voter("tdr");
        let b = f.new_voter("tdr");
        f.court.vote(a, id, VoteChoice::Driver).unwrap();
        f.court.vote(b, id, VoteChoice::Driver).unwrap();
        f.court.try_resolve(f.engine, id).unwrap();
        assert!(f.court.disputes_in_driver_area(near).unwrap().is_empty());
    }
}
