// Vote ledger - one vote per (subject, voter), enforced at acceptance
//
// The uniqueness check and the insert are a single compare-and-swap on
// the (subject, voter) slot, so two concurrent casts for the same pair
// cannot both succeed. Weight arrives from the caller's voting-power
// source and is treated as opaque; re-validating it is not this
// component's job.

use crate::storage::CoordStore;
use crate::votes::{Vote, VoteError, VoteTally};
use std::sync::Arc;
use tracing::debug;

/// Default approval threshold, in percent of total weight
pub const DEFAULT_APPROVAL_THRESHOLD: u64 = 50;

/// Off-chain system of record for cast votes
///
/// Consulted before any on-chain vote-count action is attempted.
pub struct VoteLedger {
    store: Arc<CoordStore>,
    threshold_percent: u64,
}

impl VoteLedger {
    pub fn new(store: Arc<CoordStore>) -> Self {
        Self {
            store,
            threshold_percent: DEFAULT_APPROVAL_THRESHOLD,
        }
    }

    /// Override the approval threshold
    pub fn with_approval_threshold(mut self, percent: u64) -> Self {
        self.threshold_percent = percent;
        self
    }

    pub fn approval_threshold(&self) -> u64 {
        self.threshold_percent
    }

    /// Accept a vote, rejecting a second vote from the same voter on the
    /// same subject. Accepted votes are immutable and durable.
    pub fn cast_vote(&self, vote: Vote) -> Result<Vote, VoteError> {
        let inserted = self.store.put_vote_if_absent(&vote)?;
        if !inserted {
            debug!(
                subject = vote.subject(),
                voter = vote.voter(),
                "vote rejected, slot already taken"
            );
            return Err(VoteError::AlreadyVoted {
                subject: vote.subject().to_string(),
                voter: vote.voter().to_string(),
            });
        }
        self.store.flush()?;
        debug!(
            subject = vote.subject(),
            voter = vote.voter(),
            support = vote.support(),
            weight = vote.weight(),
            "vote accepted"
        );
        Ok(vote)
    }

    /// Whether a voter has already cast on a subject
    pub fn has_voted(&self, subject: &str, voter: &str) -> Result<bool, VoteError> {
        Ok(self.store.load_vote(subject, voter)?.is_some())
    }

    /// The vote a voter cast on a subject, if any
    pub fn vote_of(&self, subject: &str, voter: &str) -> Result<Option<Vote>, VoteError> {
        Ok(self.store.load_vote(subject, voter)?)
    }

    /// Every vote cast on a subject
    pub fn votes_for(&self, subject: &str) -> Result<Vec<Vote>, VoteError> {
        Ok(self.store.votes_for_subject(subject)?)
    }

    /// Recompute the tally for a subject from its accepted votes
    pub fn tally(&self, subject: &str) -> Result<VoteTally, VoteError> {
        let mut tally = VoteTally::default();
        for vote in self.store.votes_for_subject(subject)? {
            tally.add(&vote);
        }
        Ok(tally)
    }

    /// Approval at the configured threshold; false for a subject with no
    /// votes.
    pub fn is_approved(&self, subject: &str) -> Result<bool, VoteError> {
        self.is_approved_at(subject, self.threshold_percent)
    }

    /// Approval at an explicit threshold
    pub fn is_approved_at(&self, subject: &str, threshold_percent: u64) -> Result<bool, VoteError> {
        Ok(self.tally(subject)?.is_approved(threshold_percent))
    }
}
