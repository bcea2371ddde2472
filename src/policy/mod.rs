// Policy module - Nonce allocation and fee planning
// Decides which nonce and fee parameters a new or replacement transaction uses

mod engine;

pub use engine::{PolicyConfig, PolicyEngine, PolicyError, TxPlan};
