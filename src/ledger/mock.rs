// Mock ledger for tests and local development
//
// Scriptable stand-in for a real ledger node: per-account nonce views,
// a settable fee estimate, queued submit failures, and confirmation on
// demand, after a fixed number of status polls, or once a transaction's
// bid clears a configurable market rate.

use super::{Address, FeeEstimate, FeeParams, LedgerClient, LedgerError, TxId, TxStatus};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// A recorded submission, for test assertions
#[derive(Clone, Debug)]
pub struct Submission {
    pub account: Address,
    pub tx_id: TxId,
    pub nonce: u64,
    pub fee: FeeParams,
    pub payload: Vec<u8>,
}

struct MockTx {
    account: Address,
    nonce: u64,
    fee: FeeParams,
    status: TxStatus,
    polls: u32,
}

struct MockState {
    confirmed: HashMap<Address, u64>,
    pending: HashMap<Address, u64>,
    balances: HashMap<Address, u64>,
    fee: FeeEstimate,
    /// Scripted failures keyed by 1-based submit call sequence
    submit_failures: HashMap<u64, LedgerError>,
    txs: HashMap<TxId, MockTx>,
    submissions: Vec<Submission>,
    submit_calls: u64,
    next_id: u64,
}

/// Mock implementation of `LedgerClient`
pub struct MockLedger {
    state: Mutex<MockState>,
    confirm_after_polls: Option<u32>,
    confirm_at_fee: Option<u64>,
    delay_ms: u64,
}

impl MockLedger {
    /// Create a mock with zero nonces and a modest fee estimate
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                confirmed: HashMap::new(),
                pending: HashMap::new(),
                balances: HashMap::new(),
                fee: FeeEstimate {
                    base_fee: 20_000_000_000,
                    priority_fee: 1_000_000_000,
                },
                submit_failures: HashMap::new(),
                txs: HashMap::new(),
                submissions: Vec::new(),
                submit_calls: 0,
                next_id: 0,
            }),
            confirm_after_polls: None,
            confirm_at_fee: None,
            delay_ms: 0,
        }
    }

    /// Confirm every transaction after it has been polled N times
    pub fn with_confirm_after_polls(mut self, polls: u32) -> Self {
        self.confirm_after_polls = Some(polls);
        self
    }

    /// Confirm a transaction only once its max fee reaches this rate;
    /// lower bids stay pending forever (a congested fee market)
    pub fn with_confirm_at_fee(mut self, max_fee: u64) -> Self {
        self.confirm_at_fee = Some(max_fee);
        self
    }

    /// Add a delay before every response
    pub fn with_delay_ms(mut self, ms: u64) -> Self {
        self.delay_ms = ms;
        self
    }

    /// Seed an account's confirmed and pending nonce views
    pub fn with_account(self, account: &Address, confirmed: u64, pending: u64) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.confirmed.insert(account.clone(), confirmed);
            state.pending.insert(account.clone(), pending);
        }
        self
    }

    /// Seed an account balance
    pub fn with_balance(self, account: &Address, balance: u64) -> Self {
        self.state
            .lock()
            .unwrap()
            .balances
            .insert(account.clone(), balance);
        self
    }

    /// Set the fee estimate returned from now on
    pub fn with_fee_estimate(self, fee: FeeEstimate) -> Self {
        self.state.lock().unwrap().fee = fee;
        self
    }

    /// Fail the very next submit call
    pub fn with_submit_failure(self, err: LedgerError) -> Self {
        self.with_submit_failure_at(1, err)
    }

    /// Fail the nth submit call (1-based)
    pub fn with_submit_failure_at(self, seq: u64, err: LedgerError) -> Self {
        self.state.lock().unwrap().submit_failures.insert(seq, err);
        self
    }

    /// Change the fee estimate mid-test
    pub fn set_fee_estimate(&self, fee: FeeEstimate) {
        self.state.lock().unwrap().fee = fee;
    }

    /// Mark a transaction confirmed and advance the confirmed nonce view
    pub fn confirm(&self, tx_id: &TxId) {
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        if let Some(tx) = state.txs.get_mut(tx_id) {
            tx.status = TxStatus::Confirmed;
            let entry = state.confirmed.entry(tx.account.clone()).or_insert(0);
            *entry = (*entry).max(tx.nonce + 1);
        }
    }

    /// Mark a transaction failed
    pub fn fail(&self, tx_id: &TxId) {
        let mut state = self.state.lock().unwrap();
        if let Some(tx) = state.txs.get_mut(tx_id) {
            tx.status = TxStatus::Failed;
        }
    }

    /// Snapshot of every submission seen so far, in order
    pub fn submissions(&self) -> Vec<Submission> {
        self.state.lock().unwrap().submissions.clone()
    }

    async fn pause(&self) {
        if self.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        }
    }
}

impl Default for MockLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    async fn confirmed_nonce(&self, account: &Address) -> Result<u64, LedgerError> {
        self.pause().await;
        Ok(*self
            .state
            .lock()
            .unwrap()
            .confirmed
            .get(account)
            .unwrap_or(&0))
    }

    async fn pending_nonce(&self, account: &Address) -> Result<u64, LedgerError> {
        self.pause().await;
        Ok(*self
            .state
            .lock()
            .unwrap()
            .pending
            .get(account)
            .unwrap_or(&0))
    }

    async fn fee_estimate(&self) -> Result<FeeEstimate, LedgerError> {
        self.pause().await;
        Ok(self.state.lock().unwrap().fee)
    }

    async fn submit(
        &self,
        account: &Address,
        payload: &[u8],
        nonce: u64,
        fee: FeeParams,
    ) -> Result<TxId, LedgerError> {
        self.pause().await;
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;

        state.submit_calls += 1;
        if let Some(err) = state.submit_failures.remove(&state.submit_calls) {
            return Err(err);
        }

        let confirmed = *state.confirmed.get(account).unwrap_or(&0);
        if nonce < confirmed {
            return Err(LedgerError::NonceTooLow(confirmed));
        }

        state.next_id += 1;
        let seed: [u8; 12] = rand::random();
        let tx_id = TxId::new(format!("0x{:04x}{}", state.next_id, hex::encode(seed)));

        let entry = state.pending.entry(account.clone()).or_insert(0);
        *entry = (*entry).max(nonce + 1);

        state.txs.insert(
            tx_id.clone(),
            MockTx {
                account: account.clone(),
                nonce,
                fee,
                status: TxStatus::Pending,
                polls: 0,
            },
        );
        state.submissions.push(Submission {
            account: account.clone(),
            tx_id: tx_id.clone(),
            nonce,
            fee,
            payload: payload.to_vec(),
        });

        Ok(tx_id)
    }

    async fn status(&self, tx_id: &TxId) -> Result<TxStatus, LedgerError> {
        self.pause().await;
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;

        let tx = state
            .txs
            .get_mut(tx_id)
            .ok_or_else(|| LedgerError::Transient(format!("unknown transaction {tx_id}")))?;

        tx.polls += 1;
        if tx.status == TxStatus::Pending {
            let by_polls = self.confirm_after_polls.is_some_and(|n| tx.polls >= n);
            let by_fee = self.confirm_at_fee.is_some_and(|rate| tx.fee.max_fee >= rate);
            if by_polls || by_fee {
                tx.status = TxStatus::Confirmed;
            }
        }

        let status = tx.status;
        if status == TxStatus::Confirmed {
            let next = tx.nonce + 1;
            let account = tx.account.clone();
            let entry = state.confirmed.entry(account).or_insert(0);
            *entry = (*entry).max(next);
        }

        Ok(status)
    }

    async fn balance(&self, account: &Address) -> Result<u64, LedgerError> {
        self.pause().await;
        Ok(*self
            .state
            .lock()
            .unwrap()
            .balances
            .get(account)
            .unwrap_or(&0))
    }
}
