// Nonce & fee policy engine
//
// Fresh transactions take the account's live pending nonce and the current
// fee estimate, floored at the network minimum and clamped to the
// configured ceiling. Replacements reuse the stuck nonce and must out-bid
// the prior fee by the replacement ratio; if that would exceed the
// ceiling the plan fails loudly, because a silently capped fee would not
// satisfy the ledger's replacement rule and the nonce would stay stuck.

use crate::ledger::{
    with_retry, Address, FeeEstimate, FeeParams, LedgerClient, LedgerError, RetryPolicy,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Errors from transaction planning
#[derive(Error, Debug)]
pub enum PolicyError {
    #[error("Replacement fee {required} exceeds configured ceiling {ceiling}")]
    FeeCeilingExceeded { required: u64, ceiling: u64 },

    #[error("Invalid policy configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// The nonce and fee a transaction will be submitted with
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxPlan {
    pub nonce: u64,
    pub fee: FeeParams,
}

/// Fee policy knobs
///
/// The replacement multiplier is an integer ratio so the bump is exact;
/// it is applied with round-up so a bump is never lost to truncation.
#[derive(Clone, Copy, Debug)]
pub struct PolicyConfig {
    /// Hard upper bound on max_fee
    pub fee_ceiling: u64,
    /// Protocol minimum; fees below this are rejected by the ledger
    pub fee_floor: u64,
    /// Replacement multiplier numerator
    pub bump_numerator: u64,
    /// Replacement multiplier denominator
    pub bump_denominator: u64,
}

impl PolicyConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the fee ceiling
    pub fn with_fee_ceiling(mut self, ceiling: u64) -> Self {
        self.fee_ceiling = ceiling;
        self
    }

    /// Set the network minimum fee
    pub fn with_fee_floor(mut self, floor: u64) -> Self {
        self.fee_floor = floor;
        self
    }

    /// Set the replacement multiplier as a ratio, e.g. (3, 2) for 1.5x
    pub fn with_replacement_multiplier(mut self, numerator: u64, denominator: u64) -> Self {
        self.bump_numerator = numerator;
        self.bump_denominator = denominator;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.bump_denominator == 0 {
            return Err(PolicyError::InvalidConfig(
                "bump_denominator must be > 0".to_string(),
            ));
        }
        if self.bump_numerator <= self.bump_denominator {
            return Err(PolicyError::InvalidConfig(
                "replacement multiplier must be > 1".to_string(),
            ));
        }
        if self.fee_ceiling < self.fee_floor {
            return Err(PolicyError::InvalidConfig(
                "fee_ceiling must be >= fee_floor".to_string(),
            ));
        }
        Ok(())
    }

    fn bump(&self, fee: u64) -> u64 {
        // Round-up integer multiply: ceil(fee * num / den)
        let scaled = (fee as u128) * (self.bump_numerator as u128);
        let den = self.bump_denominator as u128;
        let bumped = (scaled + den - 1) / den;
        bumped.min(u64::MAX as u128) as u64
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            fee_ceiling: 500_000_000_000,
            fee_floor: 1_000_000_000,
            bump_numerator: 3,
            bump_denominator: 2,
        }
    }
}

/// Plans nonces and fees against live ledger state
pub struct PolicyEngine {
    ledger: Arc<dyn LedgerClient>,
    config: PolicyConfig,
    retry: RetryPolicy,
}

impl PolicyEngine {
    pub fn new(ledger: Arc<dyn LedgerClient>, config: PolicyConfig) -> Result<Self, PolicyError> {
        config.validate()?;
        Ok(Self {
            ledger,
            config,
            retry: RetryPolicy::default(),
        })
    }

    /// Override the backoff policy for ledger queries
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    /// Plan a fresh or replacement transaction.
    ///
    /// With no prior plan the nonce is read live from the ledger's pending
    /// view at call time; a cached nonce could collide with one another
    /// process already used. With a prior plan the nonce is reused and the
    /// fee must out-bid the prior by the replacement ratio.
    pub async fn plan(
        &self,
        account: &Address,
        prior: Option<&TxPlan>,
    ) -> Result<TxPlan, PolicyError> {
        let estimate = with_retry(&self.retry, || self.ledger.fee_estimate()).await?;

        match prior {
            None => {
                let nonce =
                    with_retry(&self.retry, || self.ledger.pending_nonce(account)).await?;
                Ok(TxPlan {
                    nonce,
                    fee: self.fee_from_estimate(&estimate),
                })
            }
            Some(prior) => {
                let required = self
                    .config
                    .bump(prior.fee.max_fee)
                    .max(estimate.suggested_max_fee())
                    .max(self.config.fee_floor);

                if required > self.config.fee_ceiling {
                    return Err(PolicyError::FeeCeilingExceeded {
                        required,
                        ceiling: self.config.fee_ceiling,
                    });
                }

                let priority = self
                    .config
                    .bump(prior.fee.priority_fee)
                    .max(estimate.priority_fee)
                    .min(required);

                Ok(TxPlan {
                    nonce: prior.nonce,
                    fee: FeeParams {
                        max_fee: required,
                        priority_fee: priority,
                    },
                })
            }
        }
    }

    /// Fee parameters for a fresh transaction at the given estimate:
    /// floored at the network minimum, clamped to the ceiling.
    pub fn fee_from_estimate(&self, estimate: &FeeEstimate) -> FeeParams {
        let max_fee = estimate
            .suggested_max_fee()
            .max(self.config.fee_floor)
            .min(self.config.fee_ceiling);
        FeeParams {
            max_fee,
            priority_fee: estimate.priority_fee.min(max_fee),
        }
    }
}
