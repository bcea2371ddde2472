// Transaction lifecycle manager
//
// The single entry point for getting a state change onto the ledger.
// Nonce allocation and submission happen inside a per-account critical
// section; a concurrent fresh-nonce read outside it is exactly how
// duplicate-nonce bugs happen, so exclusivity is structural here.
//
// Stuck is a result, not an error: a transaction that outlived its
// replacement budget is still pending on the ledger and its nonce cannot
// be abandoned, so the outcome carries everything needed to resume.

use crate::ledger::{
    with_retry, Address, FeeParams, LedgerClient, LedgerError, RetryPolicy, TxId, TxStatus,
};
use crate::lifecycle::{InFlightTx, TxState};
use crate::policy::{PolicyEngine, PolicyError, TxPlan};
use crate::storage::{CoordStore, StoreError};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Errors from the lifecycle manager
#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("Insufficient funds for {account}")]
    InsufficientFunds { account: Address },

    #[error("Transaction {tx_id} failed on the ledger")]
    TxFailed { tx_id: TxId },

    #[error("No pending transaction at nonce {nonce} for {account}")]
    NothingToReplace { account: Address, nonce: u64 },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Policy(#[from] PolicyError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Terminal outcome of a submit-and-confirm flow
///
/// Stuck is expected and actionable: the caller can retry later through
/// `replace_by_nonce`, raise the fee ceiling, or investigate.
#[derive(Clone, Debug)]
pub enum SubmitOutcome {
    /// Confirmed on the ledger
    Confirmed { tx_id: TxId, nonce: u64 },
    /// Unconfirmed after the full replacement budget; still pending
    Stuck {
        nonce: u64,
        fee: FeeParams,
        last_tx_id: TxId,
    },
}

impl SubmitOutcome {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, SubmitOutcome::Confirmed { .. })
    }
}

/// Configuration for the lifecycle manager
#[derive(Clone, Debug)]
pub struct LifecycleConfig {
    /// How long to wait for confirmation before each replacement
    pub confirm_timeout: Duration,
    /// Interval between status polls
    pub poll_interval: Duration,
    /// Replacement attempts after the initial submission
    pub max_replacements: u32,
    /// Backoff policy for transient ledger errors
    pub retry: RetryPolicy,
}

impl LifecycleConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-attempt confirmation timeout
    pub fn with_confirm_timeout(mut self, timeout: Duration) -> Self {
        self.confirm_timeout = timeout;
        self
    }

    /// Set the status poll interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the replacement budget
    pub fn with_max_replacements(mut self, max: u32) -> Self {
        self.max_replacements = max;
        self
    }

    /// Set the backoff policy
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), LifecycleError> {
        if self.poll_interval.is_zero() {
            return Err(LifecycleError::InvalidConfig(
                "poll_interval must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            confirm_timeout: Duration::from_secs(90),
            poll_interval: Duration::from_secs(3),
            max_replacements: 3,
            retry: RetryPolicy::default(),
        }
    }
}

/// Statistics about lifecycle operations
#[derive(Clone, Debug, Default)]
pub struct LifecycleStats {
    pub submitted: u64,
    pub confirmed: u64,
    pub replaced: u64,
    pub stuck: u64,
    pub failed: u64,
}

enum WaitResult {
    Confirmed,
    Failed,
    TimedOut,
}

/// Owns the set of in-flight transactions for every account
pub struct LifecycleManager {
    ledger: Arc<dyn LedgerClient>,
    policy: PolicyEngine,
    store: Arc<CoordStore>,
    config: LifecycleConfig,
    /// One lock per account; nonce read + submit share a critical section
    locks: Mutex<HashMap<Address, Arc<Mutex<()>>>>,
    stats: std::sync::Mutex<LifecycleStats>,
}

impl LifecycleManager {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        policy: PolicyEngine,
        store: Arc<CoordStore>,
        config: LifecycleConfig,
    ) -> Result<Self, LifecycleError> {
        config.validate()?;
        Ok(Self {
            ledger,
            policy,
            store,
            config,
            locks: Mutex::new(HashMap::new()),
            stats: std::sync::Mutex::new(LifecycleStats::default()),
        })
    }

    /// Get statistics
    pub fn stats(&self) -> LifecycleStats {
        self.stats.lock().unwrap().clone()
    }

    /// Submit a signed payload and drive it to a terminal outcome.
    ///
    /// Confirmed and Stuck both come back as `Ok`; fatal conditions
    /// (insufficient funds, fee ceiling, ledger rejection) are errors.
    pub async fn submit_and_confirm(
        &self,
        account: &Address,
        payload: Vec<u8>,
    ) -> Result<SubmitOutcome, LifecycleError> {
        let lock = self.account_lock(account).await;
        let _guard = lock.lock().await;

        let plan = self.policy.plan(account, None).await?;
        let tx_id = self.submit_planned(account, &payload, &plan).await?;
        let record = InFlightTx::new(account.clone(), &plan, payload, tx_id.clone());
        self.store.save_inflight(&record)?;
        self.store.flush()?;
        self.stats.lock().unwrap().submitted += 1;
        info!(
            account = %account,
            nonce = plan.nonce,
            max_fee = plan.fee.max_fee,
            tx_id = %tx_id,
            "transaction submitted"
        );

        self.confirm_loop(account, record).await
    }

    /// Replace whatever is pending at a nonce, keyed purely by the nonce.
    ///
    /// Covers orphaned transactions from a prior process: when no local
    /// record exists the prior fee is taken from the current estimate, so
    /// the replacement still out-bids a market-rate original.
    pub async fn replace_by_nonce(
        &self,
        account: &Address,
        nonce: u64,
        payload: Vec<u8>,
    ) -> Result<SubmitOutcome, LifecycleError> {
        let lock = self.account_lock(account).await;
        let _guard = lock.lock().await;

        let confirmed =
            with_retry(&self.config.retry, || self.ledger.confirmed_nonce(account)).await?;
        let pending =
            with_retry(&self.config.retry, || self.ledger.pending_nonce(account)).await?;
        if nonce < confirmed || nonce >= pending {
            return Err(LifecycleError::NothingToReplace {
                account: account.clone(),
                nonce,
            });
        }

        let prior_record = self.store.submitted_at_nonce(account.as_str(), nonce)?;
        let prior_plan = match &prior_record {
            Some(record) => record.plan(),
            None => {
                let estimate =
                    with_retry(&self.config.retry, || self.ledger.fee_estimate()).await?;
                TxPlan {
                    nonce,
                    fee: self.policy.fee_from_estimate(&estimate),
                }
            }
        };

        let plan = self.policy.plan(account, Some(&prior_plan)).await?;
        let tx_id = self.submit_planned(account, &payload, &plan).await?;
        let mut replacement = InFlightTx::new(account.clone(), &plan, payload, tx_id.clone());

        match prior_record {
            Some(mut prior) => {
                replacement = replacement.with_replaces(prior.tx_id().clone());
                prior.set_state(TxState::Replaced);
                self.store.save_replacement(&prior, &replacement)?;
            }
            None => self.store.save_inflight(&replacement)?,
        }
        self.store.flush()?;
        self.stats.lock().unwrap().replaced += 1;
        info!(
            account = %account,
            nonce,
            max_fee = plan.fee.max_fee,
            tx_id = %tx_id,
            "replacement submitted by nonce"
        );

        self.confirm_loop(account, replacement).await
    }

    /// Number of submitted-but-unconfirmed transactions for an account,
    /// from the ledger's own confirmed and pending views.
    ///
    /// A positive count with no local Submitted records means orphans from
    /// a prior run; `orphaned_nonces` lists them.
    pub async fn reconcile_pending_count(
        &self,
        account: &Address,
    ) -> Result<u64, LifecycleError> {
        let confirmed =
            with_retry(&self.config.retry, || self.ledger.confirmed_nonce(account)).await?;
        let pending =
            with_retry(&self.config.retry, || self.ledger.pending_nonce(account)).await?;
        Ok(pending.saturating_sub(confirmed))
    }

    /// Pending nonces with no local Submitted record (post-restart
    /// discovery); each is replaceable through `replace_by_nonce`.
    pub async fn orphaned_nonces(&self, account: &Address) -> Result<Vec<u64>, LifecycleError> {
        let confirmed =
            with_retry(&self.config.retry, || self.ledger.confirmed_nonce(account)).await?;
        let pending =
            with_retry(&self.config.retry, || self.ledger.pending_nonce(account)).await?;

        let mut tracked = std::collections::HashSet::new();
        for record in self.store.inflight_for_account(account.as_str())? {
            if record.state() == TxState::Submitted {
                tracked.insert(record.nonce());
            }
        }

        Ok((confirmed..pending)
            .filter(|nonce| !tracked.contains(nonce))
            .collect())
    }

    /// In-flight records for an account, straight from the store
    pub fn inflight(&self, account: &Address) -> Result<Vec<InFlightTx>, LifecycleError> {
        Ok(self.store.inflight_for_account(account.as_str())?)
    }

    /// Drop terminal records once the caller has observed their outcomes.
    /// Also releases account lock entries nobody currently holds, so the
    /// lock map does not grow without bound across many accounts.
    pub async fn prune_terminal(&self, account: &Address) -> Result<usize, LifecycleError> {
        let pruned = self.store.prune_terminal_inflight(account.as_str())?;
        let mut locks = self.locks.lock().await;
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        Ok(pruned)
    }

    async fn account_lock(&self, account: &Address) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(account.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn submit_planned(
        &self,
        account: &Address,
        payload: &[u8],
        plan: &TxPlan,
    ) -> Result<TxId, LifecycleError> {
        match with_retry(&self.config.retry, || {
            self.ledger.submit(account, payload, plan.nonce, plan.fee)
        })
        .await
        {
            Ok(tx_id) => Ok(tx_id),
            // Retrying cannot help; abort before anything is recorded
            Err(LedgerError::InsufficientFunds) => Err(LifecycleError::InsufficientFunds {
                account: account.clone(),
            }),
            Err(err) => Err(err.into()),
        }
    }

    /// Poll the active transaction to a terminal outcome, replacing it at
    /// the same nonce each time the confirmation window elapses, until the
    /// replacement budget runs out.
    async fn confirm_loop(
        &self,
        account: &Address,
        mut record: InFlightTx,
    ) -> Result<SubmitOutcome, LifecycleError> {
        let mut replacements_left = self.config.max_replacements;

        loop {
            match self.await_confirmation(record.tx_id()).await? {
                WaitResult::Confirmed => {
                    record.set_state(TxState::Confirmed);
                    self.store.save_inflight(&record)?;
                    self.store
                        .save_nonce_hint(account.as_str(), record.nonce() + 1)?;
                    self.store.flush()?;
                    self.stats.lock().unwrap().confirmed += 1;
                    info!(account = %account, nonce = record.nonce(), tx_id = %record.tx_id(), "transaction confirmed");
                    return Ok(SubmitOutcome::Confirmed {
                        tx_id: record.tx_id().clone(),
                        nonce: record.nonce(),
                    });
                }
                WaitResult::Failed => {
                    record.set_state(TxState::Failed);
                    self.store.save_inflight(&record)?;
                    self.store.flush()?;
                    self.stats.lock().unwrap().failed += 1;
                    return Err(LifecycleError::TxFailed {
                        tx_id: record.tx_id().clone(),
                    });
                }
                WaitResult::TimedOut => {
                    if replacements_left == 0 {
                        self.stats.lock().unwrap().stuck += 1;
                        warn!(
                            account = %account,
                            nonce = record.nonce(),
                            max_fee = record.fee().max_fee,
                            tx_id = %record.tx_id(),
                            "transaction stuck after replacement budget"
                        );
                        return Ok(SubmitOutcome::Stuck {
                            nonce: record.nonce(),
                            fee: record.fee(),
                            last_tx_id: record.tx_id().clone(),
                        });
                    }
                    replacements_left -= 1;

                    let prior_plan = record.plan();
                    let plan = self.policy.plan(account, Some(&prior_plan)).await?;
                    let payload = record.payload().to_vec();
                    let tx_id = self.submit_planned(account, &payload, &plan).await?;

                    let replacement =
                        InFlightTx::new(account.clone(), &plan, payload, tx_id.clone())
                            .with_replaces(record.tx_id().clone());
                    record.set_state(TxState::Replaced);
                    self.store.save_replacement(&record, &replacement)?;
                    self.store.flush()?;
                    self.stats.lock().unwrap().replaced += 1;
                    info!(
                        account = %account,
                        nonce = plan.nonce,
                        max_fee = plan.fee.max_fee,
                        tx_id = %tx_id,
                        "replacement submitted"
                    );
                    record = replacement;
                }
            }
        }
    }

    async fn await_confirmation(&self, tx_id: &TxId) -> Result<WaitResult, LifecycleError> {
        let deadline = tokio::time::Instant::now() + self.config.confirm_timeout;
        loop {
            match with_retry(&self.config.retry, || self.ledger.status(tx_id)).await? {
                TxStatus::Confirmed => return Ok(WaitResult::Confirmed),
                TxStatus::Failed => return Ok(WaitResult::Failed),
                TxStatus::Pending => {}
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(WaitResult::TimedOut);
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{FeeEstimate, MockLedger};
    use crate::policy::PolicyConfig;
    use tempfile::TempDir;

    fn build_manager(tmp: &TempDir) -> LifecycleManager {
        let ledger = Arc::new(
            MockLedger::new()
                .with_fee_estimate(FeeEstimate {
                    base_fee: 80,
                    priority_fee: 20,
                })
                .with_confirm_at_fee(0),
        );
        let policy = PolicyConfig::new()
            .with_fee_floor(10)
            .with_fee_ceiling(10_000)
            .with_replacement_multiplier(3, 2);
        let engine = PolicyEngine::new(ledger.clone(), policy).unwrap();
        let store = Arc::new(CoordStore::open(tmp.path()).unwrap());
        let config = LifecycleConfig::new()
            .with_confirm_timeout(Duration::ZERO)
            .with_poll_interval(Duration::from_millis(5));
        LifecycleManager::new(ledger, engine, store, config).unwrap()
    }

    #[tokio::test]
    async fn test_prune_terminal_releases_idle_account_locks() {
        let tmp = TempDir::new().unwrap();
        let manager = build_manager(&tmp);
        let account = Address::new("0xalice");

        let outcome = manager
            .submit_and_confirm(&account, b"payload".to_vec())
            .await
            .unwrap();
        assert!(outcome.is_confirmed());
        assert_eq!(manager.locks.lock().await.len(), 1);

        assert_eq!(manager.prune_terminal(&account).await.unwrap(), 1);
        assert!(manager.locks.lock().await.is_empty());
        assert!(manager.inflight(&account).unwrap().is_empty());
    }
}
