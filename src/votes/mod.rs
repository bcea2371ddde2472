// Votes module - Off-chain system of record for voting intent
// One vote per (subject, voter), weighted tallies recomputed on demand

mod ledger;
mod model;

pub use ledger::{VoteLedger, DEFAULT_APPROVAL_THRESHOLD};
pub use model::{Vote, VoteError, VoteTally};
