//! OpenFreight Registry - Identity & Role Registry
//!
//! Owns user records and the role-request approval workflow:
//! - Self-registration and profile updates
//! - Role requests resolved exactly once by an admin or a community peer
//! - Pure region/role reads consumed by the engine and the dispute court
//! - Star-rating deduction, gated to the configured dispute peer
//!
//! # Invariants
//!
//! 1. A uid registers at most once and is never deleted
//! 2. A pending (uid, role) pair is unique
//! 3. A request resolves to exactly one of Approved / Rejected
//! 4. Admin is root-granted at construction, never requestable

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use openfreight_types::{GeoHash, Role, RoleRequestId, RoleRequestStatus, TypeError, Uid};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A new user starts with the full five-star rating
pub const INITIAL_RATING_STARS: u8 = 5;

/// Errors that can occur in registry operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("user {uid} is already registered")]
    DuplicateUser { uid: Uid },

    #[error("user {uid} is not registered")]
    UnknownUser { uid: Uid },

    #[error("role {role} cannot be requested")]
    InvalidRole { role: Role },

    #[error("user {uid} already has an unresolved request for role {role}")]
    DuplicateRequest { uid: Uid, role: Role },

    #[error("role request {id} not found")]
    RequestNotFound { id: RoleRequestId },

    #[error("role request {id} is already resolved")]
    AlreadyResolved { id: RoleRequestId },

    #[error("applicants cannot resolve their own request {id}")]
    SelfApprovalDenied { id: RoleRequestId },

    #[error("caller {uid} may not resolve requests for role {role}")]
    NotEligibleApprover { uid: Uid, role: Role },

    #[error("caller {uid} is not the admin")]
    NotAdmin { uid: Uid },

    #[error("caller {uid} is not the configured dispute peer")]
    NotDisputePeer { uid: Uid },

    #[error(transparent)]
    InvalidInput(#[from] TypeError),
}

pub type Result<T> = std::result::Result<T, RegistryError>;

/// A registered marketplace participant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub uid: Uid,
    pub name: String,
    pub phone: String,
    pub service_geohash: GeoHash,
    pub roles: BTreeSet<Role>,
    pub rating_stars: u8,
    pub registered_at: DateTime<Utc>,
}

/// A pending or resolved application for a role
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleRequest {
    pub id: RoleRequestId,
    pub applicant: Uid,
    pub requested_role: Role,
    pub status: RoleRequestStatus,
    /// Zero-identity until the request is resolved
    pub approver: Uid,
    pub created_at: DateTime<Utc>,
}

impl RoleRequest {
    fn is_pending(&self) -> bool {
        self.status == RoleRequestStatus::Pending
    }
}

struct Inner {
    admin: Uid,
    dispute_peer: Option<Uid>,
    users: BTreeMap<Uid, User>,
    requests: Vec<RoleRequest>,
}

/// The Identity & Role Registry.
///
/// A cheap-to-clone handle; all operations take a consistent snapshot of
/// state under one lock and either complete or leave nothing changed.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<RwLock<Inner>>,
}

impl Registry {
    /// Create a registry with its root-granted admin identity
    pub fn new(admin: Uid) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner {
                admin,
                dispute_peer: None,
                users: BTreeMap::new(),
                requests: Vec::new(),
            })),
        }
    }

    /// The root admin identity
    pub fn admin(&self) -> Uid {
        self.inner.read().admin
    }

    // ========================================================================
    // Users
    // ========================================================================

    /// Register the caller as a new user with an empty role set
    pub fn create_user(
        &self,
        caller: Uid,
        name: impl Into<String>,
        geohash: GeoHash,
        phone: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.users.contains_key(&caller) {
            return Err(RegistryError::DuplicateUser { uid: caller });
        }
        inner.users.insert(
            caller,
            User {
                uid: caller,
                name: name.into(),
                phone: phone.into(),
                service_geohash: geohash,
                roles: BTreeSet::new(),
                rating_stars: INITIAL_RATING_STARS,
                registered_at: now,
            },
        );
        Ok(())
    }

    /// Update the caller's own profile fields
    pub fn update_user(
        &self,
        caller: Uid,
        name: impl Into<String>,
        geohash: GeoHash,
        phone: impl Into<String>,
    ) -> Result<()> {
        let mut inner = self.inner.write();
        let user = inner
            .users
            .get_mut(&caller)
            .ok_or(RegistryError::UnknownUser { uid: caller })?;
        user.name = name.into();
        user.service_geohash = geohash;
        user.phone = phone.into();
        Ok(())
    }

    /// Whether a uid is registered
    pub fn is_registered(&self, uid: Uid) -> bool {
        self.inner.read().users.contains_key(&uid)
    }

    /// Full user record
    pub fn user_info(&self, uid: Uid) -> Result<User> {
        self.inner
            .read()
            .users
            .get(&uid)
            .cloned()
            .ok_or(RegistryError::UnknownUser { uid })
    }

    /// The user's service region
    pub fn user_geohash(&self, uid: Uid) -> Result<GeoHash> {
        Ok(self.user_info(uid)?.service_geohash)
    }

    /// Role check. Admin is the root identity, not a granted role.
    pub fn has_role(&self, uid: Uid, role: Role) -> bool {
        let inner = self.inner.read();
        if role == Role::Admin {
            return uid == inner.admin;
        }
        inner
            .users
            .get(&uid)
            .map(|u| u.roles.contains(&role))
            .unwrap_or(false)
    }

    // ========================================================================
    // Role requests
    // ========================================================================

    /// File a role request for the caller
    pub fn create_role_request(
        &self,
        caller: Uid,
        role: Role,
        now: DateTime<Utc>,
    ) -> Result<RoleRequestId> {
        let mut inner = self.inner.write();
        if !inner.users.contains_key(&caller) {
            return Err(RegistryError::UnknownUser { uid: caller });
        }
        if !role.is_requestable() {
            return Err(RegistryError::InvalidRole { role });
        }
        let unresolved = inner
            .requests
            .iter()
            .any(|r| r.applicant == caller && r.requested_role == role && r.is_pending());
        if unresolved {
            return Err(RegistryError::DuplicateRequest { uid: caller, role });
        }
        let id = RoleRequestId(inner.requests.len() as u64);
        inner.requests.push(RoleRequest {
            id,
            applicant: caller,
            requested_role: role,
            status: RoleRequestStatus::Pending,
            approver: Uid::nil(),
            created_at: now,
        });
        Ok(id)
    }

    /// Resolve a pending request, exactly once.
    ///
    /// The admin may resolve anything; otherwise any non-applicant holder
    /// of the requested role acts as community approver. On approval the
    /// role is added to the applicant's role set idempotently.
    pub fn approve_or_reject(&self, caller: Uid, id: RoleRequestId, approve: bool) -> Result<()> {
        let mut inner = self.inner.write();
        let admin = inner.admin;
        let request = inner
            .requests
            .get(id.0 as usize)
            .ok_or(RegistryError::RequestNotFound { id })?;
        if !request.is_pending() {
            return Err(RegistryError::AlreadyResolved { id });
        }
        if caller == request.applicant {
            return Err(RegistryError::SelfApprovalDenied { id });
        }
        let role = request.requested_role;
        let applicant = request.applicant;
        let is_peer = inner
            .users
            .get(&caller)
            .map(|u| u.roles.contains(&role))
            .unwrap_or(false);
        if caller != admin && !is_peer {
            return Err(RegistryError::NotEligibleApprover { uid: caller, role });
        }

        let request = &mut inner.requests[id.0 as usize];
        request.status = if approve {
            RoleRequestStatus::Approved
        } else {
            RoleRequestStatus::Rejected
        };
        request.approver = caller;
        if approve {
            if let Some(user) = inner.users.get_mut(&applicant) {
                user.roles.insert(role);
            }
        }
        Ok(())
    }

    /// All role requests; admin only
    pub fn all_requests(&self, caller: Uid) -> Result<Vec<RoleRequest>> {
        let inner = self.inner.read();
        if caller != inner.admin {
            return Err(RegistryError::NotAdmin { uid: caller });
        }
        Ok(inner.requests.clone())
    }

    /// The caller's own requests
    pub fn my_requests(&self, caller: Uid) -> Vec<RoleRequest> {
        self.inner
            .read()
            .requests
            .iter()
            .filter(|r| r.applicant == caller)
            .cloned()
            .collect()
    }

    /// Pending requests from applicants in the caller's region, for
    /// community approval
    pub fn region_requests(&self, caller: Uid) -> Result<Vec<RoleRequest>> {
        let inner = self.inner.read();
        let region = inner
            .users
            .get(&caller)
            .map(|u| u.service_geohash.clone())
            .ok_or(RegistryError::UnknownUser { uid: caller })?;
        Ok(inner
            .requests
            .iter()
            .filter(|r| {
                r.is_pending()
                    && r.applicant != caller
                    && inner
                        .users
                        .get(&r.applicant)
                        .map(|u| u.service_geohash.region_matches(&region))
                        .unwrap_or(false)
            })
            .cloned()
            .collect())
    }

    // ========================================================================
    // Dispute peer wiring
    // ========================================================================

    /// Bind the dispute court identity allowed to deduct stars; admin only
    pub fn set_dispute_peer(&self, caller: Uid, peer: Uid) -> Result<()> {
        let mut inner = self.inner.write();
        if caller != inner.admin {
            return Err(RegistryError::NotAdmin { uid: caller });
        }
        inner.dispute_peer = Some(peer);
        Ok(())
    }

    /// Deduct one rating star from a user, floored at zero.
    ///
    /// Callable only by the configured dispute peer.
    pub fn deduct_star(&self, caller: Uid, uid: Uid) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.dispute_peer != Some(caller) {
            return Err(RegistryError::NotDisputePeer { uid: caller });
        }
        let user = inner
            .users
            .get_mut(&uid)
            .ok_or(RegistryError::UnknownUser { uid })?;
        user.rating_stars = user.rating_stars.saturating_sub(1);
        Ok(())
    }
}
