// Deployment step definitions and static pipeline validation
//
// Dependencies between steps are explicit named inputs: a step may only
// consume values produced by strictly earlier steps, and the whole graph
// is checked before anything touches the ledger.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use super::DeployError;

/// What a deployment step does
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepAction {
    /// Deploy a contract artifact; produces the confirming transaction id
    DeployContract { artifact: String },
    /// Call a method on a target; the target may name an input, in which
    /// case it resolves to that step's produced value
    CallMethod {
        target: String,
        method: String,
        args: Vec<String>,
    },
    /// Pure recording step with no on-chain effect; produces the value
    RecordValue { value: String },
}

impl StepAction {
    /// Whether executing this action submits a transaction
    pub fn is_on_chain(&self) -> bool {
        !matches!(self, StepAction::RecordValue { .. })
    }
}

/// One named unit of deployment work
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StepDef {
    name: String,
    /// Names of earlier steps whose produced values this step consumes
    inputs: Vec<String>,
    action: StepAction,
}

impl StepDef {
    pub fn new(name: impl Into<String>, action: StepAction) -> Self {
        Self {
            name: name.into(),
            inputs: Vec::new(),
            action,
        }
    }

    /// Declare a named input produced by an earlier step
    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.inputs.push(input.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    pub fn action(&self) -> &StepAction {
        &self.action
    }
}

/// On-chain payload for a deployment step, serialized for submission
#[derive(Serialize)]
struct StepPayload<'a> {
    pipeline: &'a str,
    step: &'a str,
    action: &'a StepAction,
    inputs: &'a BTreeMap<String, String>,
}

/// A validated, ordered sequence of deployment steps
#[derive(Clone, Debug)]
pub struct Pipeline {
    name: String,
    steps: Vec<StepDef>,
}

impl Pipeline {
    /// Build a pipeline, validating the step graph before anything runs:
    /// names must be unique and every input must be produced earlier.
    pub fn new(name: impl Into<String>, steps: Vec<StepDef>) -> Result<Self, DeployError> {
        let mut produced: HashSet<&str> = HashSet::new();
        for step in &steps {
            if produced.contains(step.name()) {
                return Err(DeployError::DuplicateStepName(step.name().to_string()));
            }
            for input in step.inputs() {
                if !produced.contains(input.as_str()) {
                    return Err(DeployError::UnknownInput {
                        step: step.name().to_string(),
                        input: input.clone(),
                    });
                }
            }
            produced.insert(step.name());
        }
        Ok(Self {
            name: name.into(),
            steps,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn steps(&self) -> &[StepDef] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Encode the signed payload for an on-chain step with its inputs
    /// resolved to concrete values.
    pub(crate) fn encode_payload(
        &self,
        step: &StepDef,
        inputs: &BTreeMap<String, String>,
    ) -> Result<Vec<u8>, DeployError> {
        let payload = StepPayload {
            pipeline: &self.name,
            step: step.name(),
            action: step.action(),
            inputs,
        };
        postcard::to_allocvec(&payload).map_err(|e| DeployError::EncodeFailed(e.to_string()))
    }
}
