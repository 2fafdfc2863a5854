//! Per-request escrow accounting and the settlement policy
//!
//! Each service request owns one [`EscrowAccount`]: an append-only record
//! of deposits (shipper escrow, driver stakes) and payouts (refunds, fee
//! payments, compensation). The account can always answer "does value in
//! equal value out", which is how the conservation property is enforced
//! and tested.
//!
//! The economic split on acceptance and dispute outcomes is a
//! [`SettlementPolicy`]: a pure computation from a request's committed
//! numbers to a list of payouts, kept pluggable because the split is a
//! business decision, not a lifecycle rule.

use openfreight_types::{
    Acceptance, Amount, DisputeWinner, ServiceRequest, TypeError, Uid, WinningDriverInfo,
};
use serde::{Deserialize, Serialize};

/// Why value entered or left an escrow account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EscrowReason {
    /// Shipper's cargo value + posted fee paid in at creation
    ShipperEscrow,
    /// Driver collateral paid in with a bid
    BidStake,
    /// Stake returned to a bidder displaced by a lower bid
    DisplacedStakeRefund,
    /// Full escrow returned on a Draft cancellation
    CancelRefund,
    /// Winning bid fee paid to the driver
    ServiceFeePayout,
    /// Posted fee minus winning bid, returned to the shipper
    FeeDifferenceRefund,
    /// Posted fee returned to the shipper when no fee is owed
    ServiceFeeRefund,
    /// Cargo insurable value returned to the shipper
    CargoValueRefund,
    /// Winner's stake returned to the driver
    StakeRefund,
    /// Portion of the stake withheld on conditional acceptance
    DamageCompensation,
    /// Stake share awarded to the receiver by a dispute outcome
    DisputeCompensation,
}

/// One recorded escrow movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowEntry {
    pub party: Uid,
    pub amount: Amount,
    pub reason: EscrowReason,
}

/// Append-only escrow ledger for a single service request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EscrowAccount {
    pub deposits: Vec<EscrowEntry>,
    pub payouts: Vec<EscrowEntry>,
}

impl EscrowAccount {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record value paid into the account
    pub fn deposit(&mut self, party: Uid, amount: Amount, reason: EscrowReason) {
        self.deposits.push(EscrowEntry {
            party,
            amount,
            reason,
        });
    }

    /// Record value paid out of the account.
    ///
    /// Zero-amount payouts are dropped; paying out more than the held
    /// balance is an arithmetic error, never a silent debt.
    pub fn payout(
        &mut self,
        party: Uid,
        amount: Amount,
        reason: EscrowReason,
    ) -> Result<(), TypeError> {
        if amount.is_zero() {
            return Ok(());
        }
        self.balance().checked_sub(amount)?;
        self.payouts.push(EscrowEntry {
            party,
            amount,
            reason,
        });
        Ok(())
    }

    pub fn total_deposited(&self) -> Amount {
        self.deposits
            .iter()
            .fold(Amount::zero(), |acc, e| acc.saturating_add(e.amount))
    }

    pub fn total_paid_out(&self) -> Amount {
        self.payouts
            .iter()
            .fold(Amount::zero(), |acc, e| acc.saturating_add(e.amount))
    }

    /// Value currently held
    pub fn balance(&self) -> Amount {
        self.total_deposited().saturating_sub(self.total_paid_out())
    }

    /// Whether everything paid in has been paid back out
    pub fn is_settled(&self) -> bool {
        self.balance().is_zero()
    }

    /// Total paid out to one party
    pub fn paid_to(&self, party: Uid) -> Amount {
        self.payouts
            .iter()
            .filter(|e| e.party == party)
            .fold(Amount::zero(), |acc, e| acc.saturating_add(e.amount))
    }
}

/// A planned escrow payout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payout {
    pub to: Uid,
    pub amount: Amount,
    pub reason: EscrowReason,
}

/// The pluggable economic split applied at settlement, in basis points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementPolicy {
    /// Share of the winner's stake withheld as damage compensation on
    /// conditional acceptance
    pub conditional_withhold_bps: u16,
    /// Share of the winner's stake awarded to the receiver on a drawn
    /// dispute
    pub draw_split_bps: u16,
}

impl Default for SettlementPolicy {
    fn default() -> Self {
        Self {
            conditional_withhold_bps: 2_000,
            draw_split_bps: 5_000,
        }
    }
}

impl SettlementPolicy {
    /// Payouts for an accepted delivery.
    ///
    /// Unconditional: the driver collects the bid fee and the full stake;
    /// the shipper gets the cargo value and the unbid fee remainder back.
    /// Conditional: a policy share of the stake is withheld from the
    /// driver and paid to the shipper as damage compensation.
    pub fn acceptance_plan(
        &self,
        sr: &ServiceRequest,
        winner: &WinningDriverInfo,
        acceptance: Acceptance,
    ) -> Result<Vec<Payout>, TypeError> {
        let fee_difference = sr.service_fee.checked_sub(winner.service_fee)?;
        let withheld = match acceptance {
            Acceptance::Unconditional => Amount::zero(),
            Acceptance::Conditional => winner.cargo_stake.mul_bps(self.conditional_withhold_bps)?,
        };
        let stake_back = winner.cargo_stake.checked_sub(withheld)?;

        Ok(vec![
            Payout {
                to: winner.driver,
                amount: winner.service_fee,
                reason: EscrowReason::ServiceFeePayout,
            },
            Payout {
                to: winner.driver,
                amount: stake_back,
                reason: EscrowReason::StakeRefund,
            },
            Payout {
                to: sr.shipper,
                amount: sr.cargo_value,
                reason: EscrowReason::CargoValueRefund,
            },
            Payout {
                to: sr.shipper,
                amount: fee_difference,
                reason: EscrowReason::FeeDifferenceRefund,
            },
            Payout {
                to: sr.shipper,
                amount: withheld,
                reason: EscrowReason::DamageCompensation,
            },
        ])
    }

    /// Payouts for a resolved dispute.
    ///
    /// Driver win settles like an unconditional acceptance. Receiver win
    /// moves the whole stake to the receiver as compensation and returns
    /// the full escrow, fee included, to the shipper. A draw splits the
    /// stake between receiver and driver; the driver still collects the
    /// bid fee.
    pub fn dispute_plan(
        &self,
        sr: &ServiceRequest,
        winner: &WinningDriverInfo,
        outcome: DisputeWinner,
    ) -> Result<Vec<Payout>, TypeError> {
        match outcome {
            DisputeWinner::None => Ok(Vec::new()),
            DisputeWinner::Driver => self.acceptance_plan(sr, winner, Acceptance::Unconditional),
            DisputeWinner::Receiver => Ok(vec![
                Payout {
                    to: sr.receiver,
                    amount: winner.cargo_stake,
                    reason: EscrowReason::DisputeCompensation,
                },
                Payout {
                    to: sr.shipper,
                    amount: sr.cargo_value,
                    reason: EscrowReason::CargoValueRefund,
                },
                Payout {
                    to: sr.shipper,
                    amount: sr.service_fee,
                    reason: EscrowReason::ServiceFeeRefund,
                },
            ]),
            DisputeWinner::Draw => {
                let receiver_share = winner.cargo_stake.mul_bps(self.draw_split_bps)?;
                let driver_share = winner.cargo_stake.checked_sub(receiver_share)?;
                let fee_difference = sr.service_fee.checked_sub(winner.service_fee)?;
                Ok(vec![
                    Payout {
                        to: sr.receiver,
                        amount: receiver_share,
                        reason: EscrowReason::DisputeCompensation,
                    },
                    Payout {
                        to: winner.driver,
                        amount: driver_share,
                        reason: EscrowReason::StakeRefund,
                    },
                    Payout {
                        to: winner.driver,
                        amount: winner.service_fee,
                        reason: EscrowReason::ServiceFeePayout,
                    },
                    Payout {
                        to: sr.shipper,
                        amount: sr.cargo_value,
                        reason: EscrowReason::CargoValueRefund,
                    },
                    Payout {
                        to: sr.shipper,
                        amount: fee_difference,
                        reason: EscrowReason::FeeDifferenceRefund,
                    },
                ])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use openfreight_types::{GeoHash, SrId, Status};

    fn gh(s: &str) -> GeoHash {
        GeoHash::new(s).unwrap()
    }

    fn fixture() -> (ServiceRequest, WinningDriverInfo) {
        let created = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let driver = Uid::new();
        let sr = ServiceRequest {
            id: SrId(0),
            description: "deliver a laptop".into(),
            shipper: Uid::new(),
            receiver: Uid::new(),
            driver,
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
            status: Status::Delivered,
            dispute_winner: DisputeWinner::None,
            bid: None,
            winner: None,
        };
        let winner = WinningDriverInfo {
            driver,
            service_fee: Amount::from_whole(8),
            cargo_stake: Amount::from_whole(100),
            stake_refunded: false,
            fee_paid: false,
        };
        (sr, winner)
    }

    fn plan_total(plan: &[Payout]) -> Amount {
        plan.iter()
            .fold(Amount::zero(), |acc, p| acc.saturating_add(p.amount))
    }

    /// Everything escrowed: cargo + posted fee from the shipper, the
    /// stake from the driver.
    fn escrowed_total(sr: &ServiceRequest, winner: &WinningDriverInfo) -> Amount {
        sr.cargo_value
            .saturating_add(sr.service_fee)
            .saturating_add(winner.cargo_stake)
    }

    #[test]
    fn unconditional_acceptance_conserves_value() {
        let (sr, winner) = fixture();
        let plan = SettlementPolicy::default()
            .acceptance_plan(&sr, &winner, Acceptance::Unconditional)
            .unwrap();
        assert_eq!(plan_total(&plan), escrowed_total(&sr, &winner));

        let to_driver: Amount = plan
            .iter()
            .filter(|p| p.to == winner.driver)
            .fold(Amount::zero(), |acc, p| acc.saturating_add(p.amount));
        // bid fee 8 + stake 100
        assert_eq!(to_driver, Amount::from_whole(108));
    }

    #[test]
    fn conditional_acceptance_withholds_the_policy_share() {
        let (sr, winner) = fixture();
        let plan = SettlementPolicy::default()
            .acceptance_plan(&sr, &winner, Acceptance::Conditional)
            .unwrap();
        assert_eq!(plan_total(&plan), escrowed_total(&sr, &winner));

        let withheld: Vec<_> = plan
            .iter()
            .filter(|p| p.reason == EscrowReason::DamageCompensation)
            .collect();
        assert_eq!(withheld.len(), 1);
        // 20% of the 100 stake
        assert_eq!(withheld[0].amount, Amount::from_whole(20));
        assert_eq!(withheld[0].to, sr.shipper);
    }

    #[test]
    fn receiver_win_moves_the_stake_and_returns_the_fee() {
        let (sr, winner) = fixture();
        let plan = SettlementPolicy::default()
            .dispute_plan(&sr, &winner, DisputeWinner::Receiver)
            .unwrap();
        assert_eq!(plan_total(&plan), escrowed_total(&sr, &winner));

        assert!(plan
            .iter()
            .any(|p| p.to == sr.receiver && p.amount == winner.cargo_stake));
        assert!(plan.iter().all(|p| p.to != winner.driver));
    }

    #[test]
    fn draw_splits_the_stake() {
        let (sr, winner) = fixture();
        let plan = SettlementPolicy::default()
            .dispute_plan(&sr, &winner, DisputeWinner::Draw)
            .unwrap();
        assert_eq!(plan_total(&plan), escrowed_total(&sr, &winner));

        let to_receiver = plan
            .iter()
            .filter(|p| p.to == sr.receiver)
            .fold(Amount::zero(), |acc, p| acc.saturating_add(p.amount));
        assert_eq!(to_receiver, Amount::from_whole(50));
    }

    #[test]
    fn account_tracks_balance_and_rejects_overdraw() {
        let shipper = Uid::new();
        let driver = Uid::new();
        let mut account = EscrowAccount::new();
        account.deposit(shipper, Amount::from_whole(110), EscrowReason::ShipperEscrow);
        account.deposit(driver, Amount::from_whole(100), EscrowReason::BidStake);
        assert_eq!(account.balance(), Amount::from_whole(210));

        account
            .payout(driver, Amount::from_whole(100), EscrowReason::DisplacedStakeRefund)
            .unwrap();
        assert_eq!(account.balance(), Amount::from_whole(110));
        assert_eq!(account.paid_to(driver), Amount::from_whole(100));

        assert!(account
            .payout(shipper, Amount::from_whole(111), EscrowReason::CancelRefund)
            .is_err());
        // Nothing was recorded by the failed payout
        assert_eq!(account.balance(), Amount::from_whole(110));
        assert!(!account.is_settled());
    }

    #[test]
    fn zero_payouts_are_dropped() {
        let mut account = EscrowAccount::new();
        account.deposit(Uid::new(), Amount::from_whole(1), EscrowReason::ShipperEscrow);
        account
            .payout(Uid::new(), Amount::zero(), EscrowReason::FeeDifferenceRefund)
            .unwrap();
        assert!(account.payouts.is_empty());
    }
}
