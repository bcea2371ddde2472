// Lifecycle module - OWNS EVERY IN-FLIGHT TRANSACTION
// Serializes submission per account, tracks confirmation, and replaces
// stuck transactions at the same nonce with a bumped fee

mod inflight;
mod manager;

pub use inflight::{InFlightTx, TxState};
pub use manager::{
    LifecycleConfig, LifecycleError, LifecycleManager, LifecycleStats, SubmitOutcome,
};
