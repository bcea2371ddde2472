// Vote ledger tests: one vote per identity, weighted tallies, approval

use mintflow::storage::CoordStore;
use mintflow::votes::{Vote, VoteError, VoteLedger, VoteTally};
use std::sync::Arc;
use tempfile::TempDir;

struct Harness {
    ledger: Arc<VoteLedger>,
    _tmp: TempDir,
}

fn harness() -> Harness {
    let tmp = TempDir::new().unwrap();
    let store = Arc::new(CoordStore::open(tmp.path()).unwrap());
    Harness {
        ledger: Arc::new(VoteLedger::new(store)),
        _tmp: tmp,
    }
}

// ============================================================================
// UNIQUENESS
// ============================================================================

#[test]
fn test_second_vote_from_same_voter_rejected() {
    let h = harness();

    h.ledger
        .cast_vote(Vote::new("d1", "alice", true, 10))
        .unwrap();

    let err = h
        .ledger
        .cast_vote(Vote::new("d1", "alice", false, 5))
        .unwrap_err();
    match err {
        VoteError::AlreadyVoted { subject, voter } => {
            assert_eq!(subject, "d1");
            assert_eq!(voter, "alice");
        }
        other => panic!("expected AlreadyVoted, got {other:?}"),
    }

    // The original vote is untouched
    let tally = h.ledger.tally("d1").unwrap();
    assert_eq!(tally.support_weight, 10);
    assert_eq!(tally.total_weight(), 10);
    assert!(h.ledger.vote_of("d1", "alice").unwrap().unwrap().support());
}

#[test]
fn test_same_voter_may_vote_on_other_subjects() {
    let h = harness();

    h.ledger
        .cast_vote(Vote::new("d1", "alice", true, 10))
        .unwrap();
    h.ledger
        .cast_vote(Vote::new("d2", "alice", false, 10))
        .unwrap();

    assert!(h.ledger.has_voted("d1", "alice").unwrap());
    assert!(h.ledger.has_voted("d2", "alice").unwrap());
    assert!(!h.ledger.has_voted("d3", "alice").unwrap());
}

#[test]
fn test_concurrent_casts_admit_exactly_one() {
    let h = harness();
    let mut handles = Vec::new();

    for i in 0..8u64 {
        let ledger = h.ledger.clone();
        handles.push(std::thread::spawn(move || {
            ledger.cast_vote(Vote::new("d1", "alice", i % 2 == 0, i + 1))
        }));
    }

    let accepted = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .filter(Result::is_ok)
        .count();

    assert_eq!(accepted, 1);
    assert_eq!(h.ledger.tally("d1").unwrap().total_count(), 1);
}

// ============================================================================
// TALLIES & APPROVAL
// ============================================================================

#[test]
fn test_tally_with_no_votes() {
    let h = harness();

    let tally = h.ledger.tally("empty").unwrap();
    assert_eq!(tally, VoteTally::default());
    assert_eq!(tally.approval_percent(), 0.0);
    assert!(!h.ledger.is_approved("empty").unwrap());
}

#[test]
fn test_weighted_approval() {
    let h = harness();

    h.ledger
        .cast_vote(Vote::new("d1", "alice", true, 30))
        .unwrap();
    h.ledger
        .cast_vote(Vote::new("d1", "bob", false, 20))
        .unwrap();

    let tally = h.ledger.tally("d1").unwrap();
    assert_eq!(tally.support_count, 1);
    assert_eq!(tally.oppose_count, 1);
    assert_eq!(tally.support_weight, 30);
    assert_eq!(tally.oppose_weight, 20);
    // 30 / 50 = 60% >= 50%
    assert_eq!(tally.approval_percent(), 60.0);
    assert!(h.ledger.is_approved("d1").unwrap());
}

#[test]
fn test_approval_threshold_boundary_is_inclusive() {
    let h = harness();

    h.ledger
        .cast_vote(Vote::new("d1", "alice", true, 50))
        .unwrap();
    h.ledger
        .cast_vote(Vote::new("d1", "bob", false, 50))
        .unwrap();

    // Exactly at the default 50% threshold
    assert!(h.ledger.is_approved("d1").unwrap());
    assert!(!h.ledger.is_approved_at("d1", 51).unwrap());
}

#[test]
fn test_custom_threshold() {
    let tmp = TempDir::new().unwrap();
    let store = Arc::new(CoordStore::open(tmp.path()).unwrap());
    let ledger = VoteLedger::new(store).with_approval_threshold(66);

    ledger.cast_vote(Vote::new("d1", "alice", true, 65)).unwrap();
    ledger.cast_vote(Vote::new("d1", "bob", false, 35)).unwrap();

    assert!(!ledger.is_approved("d1").unwrap());
    assert!(ledger.is_approved_at("d1", 50).unwrap());
}

#[test]
fn test_zero_weight_vote_consumes_slot_but_moves_nothing() {
    let h = harness();

    h.ledger
        .cast_vote(Vote::new("d1", "alice", true, 0))
        .unwrap();

    let tally = h.ledger.tally("d1").unwrap();
    assert_eq!(tally.support_count, 1);
    assert_eq!(tally.total_weight(), 0);
    assert!(!h.ledger.is_approved("d1").unwrap());

    // The slot is spent regardless of weight
    assert!(h
        .ledger
        .cast_vote(Vote::new("d1", "alice", true, 100))
        .is_err());
}

// ============================================================================
// RECORD CONTENT & PERSISTENCE
// ============================================================================

#[test]
fn test_vote_carries_rationale_and_tx_ref() {
    let h = harness();

    h.ledger
        .cast_vote(
            Vote::new("d1", "alice", true, 10)
                .with_rationale("clean palette")
                .with_tx_ref("0xabc123"),
        )
        .unwrap();

    let vote = h.ledger.vote_of("d1", "alice").unwrap().unwrap();
    assert_eq!(vote.rationale(), Some("clean palette"));
    assert_eq!(vote.tx_ref(), Some("0xabc123"));
    assert!(vote.cast_at() > 0);
}

#[test]
fn test_votes_survive_reopen() {
    let tmp = TempDir::new().unwrap();

    {
        let store = Arc::new(CoordStore::open(tmp.path()).unwrap());
        let ledger = VoteLedger::new(store);
        ledger.cast_vote(Vote::new("d1", "alice", true, 30)).unwrap();
        ledger.cast_vote(Vote::new("d1", "bob", false, 20)).unwrap();
    }

    {
        let store = Arc::new(CoordStore::open(tmp.path()).unwrap());
        let ledger = VoteLedger::new(store);
        assert_eq!(ledger.votes_for("d1").unwrap().len(), 2);
        assert!(ledger.is_approved("d1").unwrap());
        // Uniqueness holds across restarts too
        assert!(ledger.cast_vote(Vote::new("d1", "alice", true, 1)).is_err());
    }
}
