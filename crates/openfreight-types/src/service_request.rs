//! The service request record and its auction bookkeeping
//!
//! The record itself lives in the engine; the dispute court receives a
//! snapshot of it when a delivery is disputed, so the type sits in the
//! foundation crate where both can see it.

use crate::{Amount, DisputeWinner, GeoHash, SrId, Status, Uid};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// The lowest eligible bid seen so far in an auction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BidInfo {
    pub bidder: Uid,
    pub fee: Amount,
}

/// The committed auction winner, with escrow idempotency flags.
///
/// `stake_refunded` and `fee_paid` guard the two settlement-time
/// movements so a retried settlement can never move value twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WinningDriverInfo {
    pub driver: Uid,
    pub service_fee: Amount,
    pub cargo_stake: Amount,
    pub stake_refunded: bool,
    pub fee_paid: bool,
}

/// A delivery job posted by a shipper
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRequest {
    pub id: SrId,
    pub description: String,
    pub shipper: Uid,
    pub receiver: Uid,
    /// Zero-identity sentinel until a winning bid is committed
    pub driver: Uid,
    pub origin: GeoHash,
    pub dest: GeoHash,
    /// Coarsened origin published to drivers before assignment
    pub origin_approx: GeoHash,
    /// Coarsened destination published to drivers before assignment
    pub dest_approx: GeoHash,
    pub cargo_value: Amount,
    pub service_fee: Amount,
    pub requested_pickup: DateTime<Utc>,
    pub requested_delivery: DateTime<Utc>,
    /// Auction window length in minutes from creation
    pub auction_end_minutes: u32,
    pub created_at: DateTime<Utc>,
    pub status: Status,
    pub dispute_winner: DisputeWinner,
    pub bid: Option<BidInfo>,
    pub winner: Option<WinningDriverInfo>,
}

impl ServiceRequest {
    /// When the auction window closes
    pub fn auction_deadline(&self) -> DateTime<Utc> {
        self.created_at + Duration::minutes(i64::from(self.auction_end_minutes))
    }

    /// Whether the auction window is open at `now`
    pub fn auction_open(&self, now: DateTime<Utc>) -> bool {
        now < self.auction_deadline()
    }

    /// Whether a driver region covers both approximate endpoints
    pub fn covered_by(&self, region: &GeoHash) -> bool {
        region.region_matches(&self.origin_approx) && region.region_matches(&self.dest_approx)
    }
}

/// Shipper-supplied fields for a new service request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SrDraft {
    pub description: String,
    pub receiver: Uid,
    pub origin: GeoHash,
    pub dest: GeoHash,
    pub origin_approx: GeoHash,
    pub dest_approx: GeoHash,
    pub cargo_value: Amount,
    pub service_fee: Amount,
    pub requested_pickup: DateTime<Utc>,
    pub requested_delivery: DateTime<Utc>,
    pub auction_end_minutes: u32,
    /// Draft, or ReadyForAuction to open the auction immediately
    pub initial_status: Status,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn gh(s: &str) -> GeoHash {
        GeoHash::new(s).unwrap()
    }

    fn sample() -> ServiceRequest {
        let created = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        ServiceRequest {
            id: SrId(0),
            description: "deliver a laptop".into(),
            shipper: Uid::new(),
            receiver: Uid::new(),
            driver: Uid::nil(),
            origin: gh("tdr1yt"),
            dest: gh("tdr4km"),
            origin_approx: gh("tdr1"),
            dest_approx: gh("tdr4"),
            cargo_value: Amount::from_whole(100),
            service_fee: Amount::from_whole(10),
            requested_pickup: created + Duration::days(2),
            requested_delivery: created + Duration::days(3),
            auction_end_minutes: 240,
            created_at: created,
            status: Status::ReadyForAuction,
            dispute_winner: DisputeWinner::None,
            bid: None,
            winner: None,
        }
    }

    #[test]
    fn auction_window_is_minutes_from_creation() {
        let sr = sample();
        assert!(sr.auction_open(sr.created_at + Duration::minutes(239)));
        assert!(!sr.auction_open(sr.created_at + Duration::minutes(240)));
        assert!(!sr.auction_open(sr.created_at + Duration::hours(5)));
    }

    #[test]
    fn coverage_requires_both_endpoints() {
        let sr = sample();
        assert!(sr.covered_by(&gh("tdr")));
        assert!(!sr.covered_by(&gh("tdr1"))); // origin only
        assert!(!sr.covered_by(&gh("w0")));
    }
}
