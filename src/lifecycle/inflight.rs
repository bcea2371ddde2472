// In-flight transaction records
//
// One record per submission attempt. At most one record per
// (account, nonce) is ever in state Submitted; a replacement marks the
// prior record Replaced in the same durable write that creates the new
// Submitted record.

use crate::ledger::{Address, FeeParams, TxId};
use crate::policy::TxPlan;
use serde::{Deserialize, Serialize};

/// Lifecycle state of an in-flight transaction
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxState {
    /// Submitted to the ledger, awaiting confirmation
    Submitted,
    /// Superseded by a higher-fee transaction at the same nonce
    Replaced,
    /// Included in a finalized block
    Confirmed,
    /// Rejected or reverted by the ledger
    Failed,
}

impl TxState {
    /// Terminal states are eligible for garbage collection once observed
    pub fn is_terminal(&self) -> bool {
        matches!(self, TxState::Replaced | TxState::Confirmed | TxState::Failed)
    }
}

/// A single outstanding (or historical) transaction for an account
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InFlightTx {
    account: Address,
    nonce: u64,
    fee: FeeParams,
    payload: Vec<u8>,
    tx_id: TxId,
    /// Transaction this one replaced, if any
    replaces: Option<TxId>,
    /// Unix timestamp (seconds) of submission
    submitted_at: i64,
    state: TxState,
}

impl InFlightTx {
    /// Create a freshly submitted record
    pub fn new(account: Address, plan: &TxPlan, payload: Vec<u8>, tx_id: TxId) -> Self {
        Self {
            account,
            nonce: plan.nonce,
            fee: plan.fee,
            payload,
            tx_id,
            replaces: None,
            submitted_at: chrono::Utc::now().timestamp(),
            state: TxState::Submitted,
        }
    }

    /// Record which transaction this submission supersedes
    pub fn with_replaces(mut self, prior: TxId) -> Self {
        self.replaces = Some(prior);
        self
    }

    pub fn account(&self) -> &Address {
        &self.account
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn fee(&self) -> FeeParams {
        self.fee
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn tx_id(&self) -> &TxId {
        &self.tx_id
    }

    pub fn replaces(&self) -> Option<&TxId> {
        self.replaces.as_ref()
    }

    pub fn submitted_at(&self) -> i64 {
        self.submitted_at
    }

    pub fn state(&self) -> TxState {
        self.state
    }

    pub fn set_state(&mut self, state: TxState) {
        self.state = state;
    }

    /// The nonce and fee of this record, as a plan usable for replacement
    pub fn plan(&self) -> TxPlan {
        TxPlan {
            nonce: self.nonce,
            fee: self.fee,
        }
    }
}
