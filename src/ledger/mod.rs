// Ledger module - THE EXTERNAL BOUNDARY
// Async client contract for the ledger, error taxonomy, and retry policy

mod client;
mod mock;
mod retry;

pub use client::{Address, FeeEstimate, FeeParams, LedgerClient, LedgerError, TxId, TxStatus};
pub use mock::{MockLedger, Submission};
pub use retry::{with_retry, RetryPolicy};
