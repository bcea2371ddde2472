// mintflow - Transaction & governance coordination layer
//
// Coordinates state-changing operations against an external ledger:
// - ledger: the async boundary to the ledger (submit, query, retry)
// - policy: nonce allocation and fee planning (fresh + replacement)
// - lifecycle: in-flight transaction tracking, confirmation, replacement
// - deploy: dependency-ordered deployment pipelines with idempotent resume
// - votes: off-chain vote ledger with one-vote-per-identity tallies
// - storage: durable sled-backed records for everything above

pub mod deploy;
pub mod ledger;
pub mod lifecycle;
pub mod policy;
pub mod storage;
pub mod votes;
