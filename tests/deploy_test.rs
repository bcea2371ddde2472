// Deployment orchestrator tests: validation, ordering, idempotent
// resume, and halt-on-stuck/failed semantics

use mintflow::deploy::{DeployError, Orchestrator, Pipeline, StepAction, StepDef};
use mintflow::ledger::{Address, FeeEstimate, LedgerError, MockLedger, RetryPolicy};
use mintflow::lifecycle::{LifecycleConfig, LifecycleManager};
use mintflow::policy::{PolicyConfig, PolicyEngine};
use mintflow::storage::CoordStore;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn account() -> Address {
    Address::new("0xdeployer")
}

fn fast_config() -> LifecycleConfig {
    LifecycleConfig::new()
        .with_confirm_timeout(Duration::ZERO)
        .with_poll_interval(Duration::from_millis(5))
        .with_max_replacements(2)
        .with_retry(RetryPolicy::new(2, 1, 5))
}

fn calm_market() -> FeeEstimate {
    FeeEstimate {
        base_fee: 80,
        priority_fee: 20,
    }
}

struct Harness {
    ledger: Arc<MockLedger>,
    orchestrator: Orchestrator,
    _tmp: TempDir,
}

fn harness(ledger: MockLedger, config: LifecycleConfig) -> Harness {
    let tmp = TempDir::new().unwrap();
    let store = Arc::new(CoordStore::open(tmp.path()).unwrap());
    harness_with_store(ledger, config, store, tmp)
}

fn harness_with_store(
    ledger: MockLedger,
    config: LifecycleConfig,
    store: Arc<CoordStore>,
    tmp: TempDir,
) -> Harness {
    let ledger = Arc::new(ledger);
    let policy = PolicyConfig::new()
        .with_fee_floor(10)
        .with_fee_ceiling(10_000)
        .with_replacement_multiplier(3, 2);
    let engine = PolicyEngine::new(ledger.clone(), policy).unwrap();
    let manager = Arc::new(
        LifecycleManager::new(ledger.clone(), engine, store.clone(), config).unwrap(),
    );
    let orchestrator = Orchestrator::new(manager, store, account());
    Harness {
        ledger,
        orchestrator,
        _tmp: tmp,
    }
}

fn studio_pipeline() -> Pipeline {
    Pipeline::new(
        "studio-v1",
        vec![
            StepDef::new(
                "registry",
                StepAction::DeployContract {
                    artifact: "DesignRegistry".to_string(),
                },
            ),
            StepDef::new(
                "minter",
                StepAction::DeployContract {
                    artifact: "ItemMinter".to_string(),
                },
            )
            .with_input("registry"),
            StepDef::new(
                "wire_minter",
                StepAction::CallMethod {
                    target: "registry".to_string(),
                    method: "grant_minter".to_string(),
                    args: vec!["minter".to_string()],
                },
            )
            .with_input("registry")
            .with_input("minter"),
            StepDef::new(
                "approval_threshold",
                StepAction::RecordValue {
                    value: "50".to_string(),
                },
            ),
        ],
    )
    .unwrap()
}

// ============================================================================
// STATIC VALIDATION
// ============================================================================

#[test]
fn test_duplicate_step_names_rejected() {
    let err = Pipeline::new(
        "bad",
        vec![
            StepDef::new(
                "registry",
                StepAction::RecordValue {
                    value: "a".to_string(),
                },
            ),
            StepDef::new(
                "registry",
                StepAction::RecordValue {
                    value: "b".to_string(),
                },
            ),
        ],
    )
    .unwrap_err();
    assert!(matches!(err, DeployError::DuplicateStepName(name) if name == "registry"));
}

#[test]
fn test_forward_input_reference_rejected() {
    let err = Pipeline::new(
        "bad",
        vec![
            StepDef::new(
                "wire",
                StepAction::CallMethod {
                    target: "registry".to_string(),
                    method: "init".to_string(),
                    args: vec![],
                },
            )
            .with_input("registry"),
            StepDef::new(
                "registry",
                StepAction::DeployContract {
                    artifact: "DesignRegistry".to_string(),
                },
            ),
        ],
    )
    .unwrap_err();
    match err {
        DeployError::UnknownInput { step, input } => {
            assert_eq!(step, "wire");
            assert_eq!(input, "registry");
        }
        other => panic!("expected UnknownInput, got {other:?}"),
    }
}

// ============================================================================
// EXECUTION & IDEMPOTENT RESUME
// ============================================================================

#[tokio::test]
async fn test_full_run_produces_complete_mapping() {
    let h = harness(
        MockLedger::new()
            .with_fee_estimate(calm_market())
            .with_confirm_at_fee(0),
        fast_config(),
    );
    let pipeline = studio_pipeline();

    let outputs = h.orchestrator.run(&pipeline).await.unwrap();

    assert_eq!(outputs.len(), 4);
    assert_eq!(outputs["approval_threshold"], "50");
    for step in ["registry", "minter", "wire_minter"] {
        assert!(outputs[step].starts_with("0x"), "{step} should map to a tx id");
    }
    // The recording step never touched the ledger
    assert_eq!(h.ledger.submissions().len(), 3);
}

#[tokio::test]
async fn test_second_run_executes_nothing_on_chain() {
    let h = harness(
        MockLedger::new()
            .with_fee_estimate(calm_market())
            .with_confirm_at_fee(0),
        fast_config(),
    );
    let pipeline = studio_pipeline();

    let first = h.orchestrator.run(&pipeline).await.unwrap();
    let second = h.orchestrator.run(&pipeline).await.unwrap();

    assert_eq!(first, second);
    // Still only the three original submissions
    assert_eq!(h.ledger.submissions().len(), 3);
}

#[tokio::test]
async fn test_interrupted_run_resumes_after_failed_step() {
    let tmp = TempDir::new().unwrap();
    let store = Arc::new(CoordStore::open(tmp.path()).unwrap());
    // First submit (registry) succeeds, second (minter) is rejected
    let h = harness_with_store(
        MockLedger::new()
            .with_fee_estimate(calm_market())
            .with_confirm_at_fee(0)
            .with_submit_failure_at(2, LedgerError::FeeTooLow),
        fast_config(),
        store.clone(),
        tmp,
    );
    let pipeline = studio_pipeline();

    let err = h.orchestrator.run(&pipeline).await.unwrap_err();
    match err {
        DeployError::StepFailed { step, ordinal, .. } => {
            assert_eq!(step, "minter");
            assert_eq!(ordinal, 1);
        }
        other => panic!("expected StepFailed, got {other:?}"),
    }

    let completed = h.orchestrator.completed_steps("studio-v1").unwrap();
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].0, "registry");
    let registry_value = completed[0].1.clone();

    // Resume over the same store with a healthy ledger: steps 1..N are
    // never re-run, only the remaining on-chain work executes
    let tmp2 = TempDir::new().unwrap();
    let resumed = harness_with_store(
        MockLedger::new()
            .with_fee_estimate(calm_market())
            .with_confirm_at_fee(0),
        fast_config(),
        store,
        tmp2,
    );

    let outputs = resumed.orchestrator.run(&pipeline).await.unwrap();
    assert_eq!(outputs.len(), 4);
    assert_eq!(outputs["registry"], registry_value);
    // Only minter and wire_minter went out this run
    assert_eq!(resumed.ledger.submissions().len(), 2);
}

#[tokio::test]
async fn test_stuck_step_halts_pipeline() {
    // Nothing confirms and the budget is zero: the first on-chain step
    // sticks immediately
    let h = harness(
        MockLedger::new().with_fee_estimate(calm_market()),
        fast_config().with_max_replacements(0),
    );
    let pipeline = Pipeline::new(
        "stuck-demo",
        vec![
            StepDef::new(
                "threshold",
                StepAction::RecordValue {
                    value: "50".to_string(),
                },
            ),
            StepDef::new(
                "registry",
                StepAction::DeployContract {
                    artifact: "DesignRegistry".to_string(),
                },
            ),
            StepDef::new(
                "minter",
                StepAction::DeployContract {
                    artifact: "ItemMinter".to_string(),
                },
            )
            .with_input("registry"),
        ],
    )
    .unwrap();

    let err = h.orchestrator.run(&pipeline).await.unwrap_err();
    match err {
        DeployError::StepStuck {
            step,
            ordinal,
            nonce,
            max_fee,
            ..
        } => {
            assert_eq!(step, "registry");
            assert_eq!(ordinal, 1);
            assert_eq!(nonce, 0);
            assert_eq!(max_fee, 100);
        }
        other => panic!("expected StepStuck, got {other:?}"),
    }

    // The pure recording step before it completed; nothing after it ran
    let completed = h.orchestrator.completed_steps("stuck-demo").unwrap();
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].0, "threshold");
    assert_eq!(h.ledger.submissions().len(), 1);
}

#[tokio::test]
async fn test_reset_step_forces_re_execution() {
    let h = harness(
        MockLedger::new()
            .with_fee_estimate(calm_market())
            .with_confirm_at_fee(0),
        fast_config(),
    );
    let pipeline = studio_pipeline();

    let first = h.orchestrator.run(&pipeline).await.unwrap();
    assert_eq!(h.ledger.submissions().len(), 3);

    h.orchestrator.reset_step("studio-v1", "wire_minter").unwrap();
    let second = h.orchestrator.run(&pipeline).await.unwrap();

    // Only the reset step re-executed
    assert_eq!(h.ledger.submissions().len(), 4);
    assert_eq!(first["registry"], second["registry"]);
    assert_eq!(first["minter"], second["minter"]);
    assert_ne!(first["wire_minter"], second["wire_minter"]);
}
