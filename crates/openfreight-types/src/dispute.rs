//! Dispute voting vocabulary

use serde::{Deserialize, Serialize};

/// Which party a dispute vote supports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoteChoice {
    Driver,
    Receiver,
}

/// Outcome of a resolved dispute
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisputeWinner {
    /// No dispute, or not yet resolved
    #[default]
    None,
    Draw,
    Driver,
    Receiver,
}

/// Running tally of a dispute's votes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteCount {
    pub driver: u32,
    pub receiver: u32,
}

impl VoteCount {
    pub fn total(&self) -> u32 {
        self.driver + self.receiver
    }

    /// Majority winner, or Draw on an exact tie.
    ///
    /// Pure function of the tallies; quorum gating happens before this is
    /// consulted.
    pub fn winner(&self) -> DisputeWinner {
        use std::cmp::Ordering;
        match self.driver.cmp(&self.receiver) {
            Ordering::Greater => DisputeWinner::Driver,
            Ordering::Less => DisputeWinner::Receiver,
            Ordering::Equal => DisputeWinner::Draw,
        }
    }
}
