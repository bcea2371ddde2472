// Vote records and tally arithmetic

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::storage::StoreError;

/// Error type for vote operations
#[derive(Error, Debug)]
pub enum VoteError {
    #[error("{voter} already voted on {subject}")]
    AlreadyVoted { subject: String, voter: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A cast vote. Immutable once accepted; only derived tallies change as
/// new votes arrive.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Vote {
    subject: String,
    voter: String,
    /// true = support, false = oppose
    support: bool,
    /// Voting power, supplied by the caller's external source
    weight: u64,
    rationale: Option<String>,
    /// Unix timestamp (seconds) of acceptance
    cast_at: i64,
    /// Confirming transaction id, when the vote is also recorded on-chain
    tx_ref: Option<String>,
}

impl Vote {
    pub fn new(
        subject: impl Into<String>,
        voter: impl Into<String>,
        support: bool,
        weight: u64,
    ) -> Self {
        Self {
            subject: subject.into(),
            voter: voter.into(),
            support,
            weight,
            rationale: None,
            cast_at: chrono::Utc::now().timestamp(),
            tx_ref: None,
        }
    }

    /// Attach a free-text rationale
    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = Some(rationale.into());
        self
    }

    /// Attach the confirming transaction reference
    pub fn with_tx_ref(mut self, tx_ref: impl Into<String>) -> Self {
        self.tx_ref = Some(tx_ref.into());
        self
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn voter(&self) -> &str {
        &self.voter
    }

    pub fn support(&self) -> bool {
        self.support
    }

    pub fn weight(&self) -> u64 {
        self.weight
    }

    pub fn rationale(&self) -> Option<&str> {
        self.rationale.as_deref()
    }

    pub fn cast_at(&self) -> i64 {
        self.cast_at
    }

    pub fn tx_ref(&self) -> Option<&str> {
        self.tx_ref.as_deref()
    }
}

/// Derived per-subject tally; recomputed from accepted votes, never stored
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VoteTally {
    pub support_count: u64,
    pub oppose_count: u64,
    pub support_weight: u64,
    pub oppose_weight: u64,
}

impl VoteTally {
    /// Fold one vote into the tally
    pub fn add(&mut self, vote: &Vote) {
        if vote.support() {
            self.support_count += 1;
            self.support_weight = self.support_weight.saturating_add(vote.weight());
        } else {
            self.oppose_count += 1;
            self.oppose_weight = self.oppose_weight.saturating_add(vote.weight());
        }
    }

    pub fn total_count(&self) -> u64 {
        self.support_count + self.oppose_count
    }

    pub fn total_weight(&self) -> u64 {
        self.support_weight.saturating_add(self.oppose_weight)
    }

    /// Support weight as a percentage of total weight; 0 when nothing is
    /// staked either way.
    pub fn approval_percent(&self) -> f64 {
        let total = self.total_weight();
        if total == 0 {
            return 0.0;
        }
        (self.support_weight as f64) * 100.0 / (total as f64)
    }

    /// Approved iff approval percentage >= threshold. Exact integer
    /// comparison; no float truncation at the boundary.
    pub fn is_approved(&self, threshold_percent: u64) -> bool {
        let total = self.total_weight();
        if total == 0 {
            return false;
        }
        (self.support_weight as u128) * 100 >= (threshold_percent as u128) * (total as u128)
    }
}
