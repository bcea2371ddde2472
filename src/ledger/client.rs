// Ledger client contract
//
// The coordination layer treats the ledger as an opaque asynchronous
// service with a nonce-based transaction model and a fee market. Signing
// happens upstream; payloads arrive here as opaque signed bytes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors surfaced by a ledger client.
///
/// Transient errors are retryable with backoff; the permanent rejections
/// each map to a distinct typed failure upstream and must never be retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Insufficient funds")]
    InsufficientFunds,

    #[error("Fee below protocol minimum")]
    FeeTooLow,

    #[error("Nonce too low (next valid: {0})")]
    NonceTooLow(u64),

    #[error("Transient ledger error: {0}")]
    Transient(String),
}

impl LedgerError {
    /// Whether a retry with backoff can possibly succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, LedgerError::Transient(_))
    }
}

/// An account address on the ledger
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct Address(String);

impl Address {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Address {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Identifier of a submitted transaction
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxId(String);

impl TxId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Status of a transaction as reported by the ledger
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxStatus {
    Pending,
    Confirmed,
    Failed,
}

/// Current fee-market reading from the ledger
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeEstimate {
    /// Base fee per unit currently charged by the network
    pub base_fee: u64,
    /// Suggested priority fee on top of the base fee
    pub priority_fee: u64,
}

impl FeeEstimate {
    /// The total fee a fresh transaction would bid at this estimate
    pub fn suggested_max_fee(&self) -> u64 {
        self.base_fee.saturating_add(self.priority_fee)
    }
}

/// Fee parameters attached to a submitted transaction
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeParams {
    /// Maximum total fee per unit this transaction will pay
    pub max_fee: u64,
    /// Priority fee per unit offered to the block producer
    pub priority_fee: u64,
}

/// Asynchronous ledger boundary
///
/// All calls may fail with `Transient` network errors; callers retry those
/// with backoff (see `with_retry`). Permanent rejections come back as the
/// other `LedgerError` variants and must be surfaced, not retried.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Highest nonce included in a finalized transaction, plus one
    async fn confirmed_nonce(&self, account: &Address) -> Result<u64, LedgerError>;

    /// Highest nonce used by any submitted transaction, plus one
    async fn pending_nonce(&self, account: &Address) -> Result<u64, LedgerError>;

    /// Current fee-market estimate
    async fn fee_estimate(&self) -> Result<FeeEstimate, LedgerError>;

    /// Submit a signed payload for an account at the given nonce and fee
    async fn submit(
        &self,
        account: &Address,
        payload: &[u8],
        nonce: u64,
        fee: FeeParams,
    ) -> Result<TxId, LedgerError>;

    /// Status of a previously submitted transaction
    async fn status(&self, tx_id: &TxId) -> Result<TxStatus, LedgerError>;

    /// Spendable balance of an account
    async fn balance(&self, account: &Address) -> Result<u64, LedgerError>;
}
