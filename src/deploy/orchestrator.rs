// Deployment orchestrator
//
// Executes a pipeline strictly in ordinal order. A step with a persisted
// completion marker is never re-executed; its recorded value is reused,
// so interrupting after step N and rerunning resumes at N+1. A stuck or
// failed step halts the whole pipeline: later steps depend on its output
// and running them speculatively would wire components to nothing.

use crate::deploy::{Pipeline, StepAction, StepDef};
use crate::ledger::Address;
use crate::lifecycle::{LifecycleError, LifecycleManager, SubmitOutcome};
use crate::storage::{CoordStore, StoreError};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Errors from pipeline validation and execution
#[derive(Error, Debug)]
pub enum DeployError {
    #[error("Duplicate step name: {0}")]
    DuplicateStepName(String),

    #[error("Step '{step}' declares input '{input}' that no earlier step produces")]
    UnknownInput { step: String, input: String },

    #[error(
        "Step '{step}' (#{ordinal}) stuck at nonce {nonce}, max fee {max_fee}, last tx {last_tx_id}"
    )]
    StepStuck {
        step: String,
        ordinal: usize,
        nonce: u64,
        max_fee: u64,
        last_tx_id: String,
    },

    #[error("Step '{step}' (#{ordinal}) failed")]
    StepFailed {
        step: String,
        ordinal: usize,
        #[source]
        source: LifecycleError,
    },

    #[error("Payload encoding failed: {0}")]
    EncodeFailed(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Runs deployment pipelines for one account
pub struct Orchestrator {
    lifecycle: Arc<LifecycleManager>,
    store: Arc<CoordStore>,
    account: Address,
}

impl Orchestrator {
    pub fn new(lifecycle: Arc<LifecycleManager>, store: Arc<CoordStore>, account: Address) -> Self {
        Self {
            lifecycle,
            store,
            account,
        }
    }

    /// Execute every step of the pipeline in order, reusing persisted
    /// completion markers, and return the full step-name-to-value mapping.
    pub async fn run(
        &self,
        pipeline: &Pipeline,
    ) -> Result<BTreeMap<String, String>, DeployError> {
        let mut outputs: BTreeMap<String, String> = BTreeMap::new();

        for (ordinal, step) in pipeline.steps().iter().enumerate() {
            if let Some(value) = self.store.load_step_marker(pipeline.name(), step.name())? {
                info!(
                    pipeline = pipeline.name(),
                    step = step.name(),
                    ordinal,
                    value = %value,
                    "step already completed, reusing recorded value"
                );
                outputs.insert(step.name().to_string(), value);
                continue;
            }

            let value = self.execute_step(pipeline, step, ordinal, &outputs).await?;

            self.store
                .save_step_marker(pipeline.name(), step.name(), &value)?;
            self.store.flush()?;
            info!(
                pipeline = pipeline.name(),
                step = step.name(),
                ordinal,
                value = %value,
                "step completed"
            );
            outputs.insert(step.name().to_string(), value);
        }

        Ok(outputs)
    }

    /// Completed (step, value) pairs recorded for a pipeline, for audit
    pub fn completed_steps(&self, pipeline: &str) -> Result<Vec<(String, String)>, DeployError> {
        Ok(self.store.step_markers(pipeline)?)
    }

    /// Remove a step's completion marker so the next run re-executes it.
    /// Operator escape hatch; ordinary resume never needs this.
    pub fn reset_step(&self, pipeline: &str, step: &str) -> Result<(), DeployError> {
        self.store.delete_step_marker(pipeline, step)?;
        self.store.flush()?;
        Ok(())
    }

    async fn execute_step(
        &self,
        pipeline: &Pipeline,
        step: &StepDef,
        ordinal: usize,
        outputs: &BTreeMap<String, String>,
    ) -> Result<String, DeployError> {
        // Validation guarantees every declared input is already produced
        let mut inputs = BTreeMap::new();
        for name in step.inputs() {
            if let Some(value) = outputs.get(name) {
                inputs.insert(name.clone(), value.clone());
            }
        }

        match step.action() {
            StepAction::RecordValue { value } => Ok(value.clone()),
            StepAction::DeployContract { .. } | StepAction::CallMethod { .. } => {
                let payload = pipeline.encode_payload(step, &inputs)?;
                match self
                    .lifecycle
                    .submit_and_confirm(&self.account, payload)
                    .await
                {
                    Ok(SubmitOutcome::Confirmed { tx_id, .. }) => Ok(tx_id.to_string()),
                    Ok(SubmitOutcome::Stuck {
                        nonce,
                        fee,
                        last_tx_id,
                    }) => {
                        warn!(
                            pipeline = pipeline.name(),
                            step = step.name(),
                            ordinal,
                            nonce,
                            "pipeline halted on stuck step"
                        );
                        Err(DeployError::StepStuck {
                            step: step.name().to_string(),
                            ordinal,
                            nonce,
                            max_fee: fee.max_fee,
                            last_tx_id: last_tx_id.to_string(),
                        })
                    }
                    Err(source) => Err(DeployError::StepFailed {
                        step: step.name().to_string(),
                        ordinal,
                        source,
                    }),
                }
            }
        }
    }
}
