//! End-to-end race scenarios against the deterministic mock provider.
//!
//! Every test runs on a paused tokio clock, so staggered creates, poll
//! ticks and round deadlines land on exact instants.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use spotrace_core::{
    CandidateStatus, Offer, RaceConfig, RaceFailure, RaceSnapshot, RaceStatus,
    PROGRESS_CONNECTING, PROGRESS_POLL_CAP, PROGRESS_READY,
};
use spotrace_engine::{RaceEngine, RaceError};
use spotrace_provider::{
    CreationError, ForcedWinner, MockConfig, MockProvider, ProvisioningApi,
};

fn offers(n: usize) -> Vec<Offer> {
    (0..n)
        .map(|i| Offer::new(format!("o{i}"), "RTX_4090", 0.30 + i as f64 * 0.01))
        .collect()
}

fn engine(mock: &Arc<MockProvider>, config: RaceConfig) -> RaceEngine {
    RaceEngine::new(mock.clone(), config).unwrap()
}

/// Let spawned tasks (detached destroys, late creates) run to completion.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

// ── Creation ───────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn five_offers_make_five_staggered_creates() {
    let mock = Arc::new(MockProvider::new(MockConfig::default()));
    let engine = engine(&mock, RaceConfig::default());

    engine.start_race(offers(5)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(2100)).await;

    let calls = mock.create_calls().await;
    assert_eq!(calls.len(), 5);
    for pair in calls.windows(2) {
        let gap = pair[1].at - pair[0].at;
        assert!(
            gap >= Duration::from_millis(500) && gap < Duration::from_millis(550),
            "stagger gap {gap:?}"
        );
    }
    for (i, call) in calls.iter().enumerate() {
        assert_eq!(call.offer_id, format!("o{i}"));
        assert!(call.label.starts_with("Race-R1-RTX_4090-"), "{}", call.label);
    }

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.state.status, RaceStatus::Racing);
    assert_eq!(snapshot.state.current_round, 1);
    assert_eq!(snapshot.created_instances.len(), 5);
    assert!(snapshot
        .candidates
        .iter()
        .all(|c| c.status == CandidateStatus::Connecting && c.progress == PROGRESS_CONNECTING));

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(mock.create_count().await, 5);

    engine.cancel_race().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn round_size_bounds_candidates() {
    let mock = Arc::new(MockProvider::new(MockConfig::default()));
    let engine = engine(
        &mock,
        RaceConfig {
            max_candidates_per_round: 3,
            ..Default::default()
        },
    );

    engine.start_race(offers(8)).await.unwrap();
    tokio::time::sleep(Duration::from_secs(5)).await;

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.candidates.len(), 3);
    assert_eq!(mock.create_count().await, 3);
    engine.cancel_race().await.unwrap();
}

// ── Winning ────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn third_offer_wins_and_losers_are_destroyed() {
    // o2 is created at t=1s and turns running at t=3s, the first poll tick.
    let mock = Arc::new(MockProvider::with_winner(2, Duration::from_secs(2)));
    let engine = engine(&mock, RaceConfig::default());

    engine.start_race(offers(5)).await.unwrap();
    let snapshot = engine.wait_for_terminal().await.unwrap();

    assert_eq!(snapshot.state.status, RaceStatus::Completed);
    assert_eq!(snapshot.state.elapsed, Duration::from_secs(3));
    let winner = snapshot.state.winner.clone().unwrap();
    assert_eq!(winner.candidate.index, 2);
    assert_eq!(winner.instance_id(), Some("mock-3"));
    assert_eq!(winner.candidate.status, CandidateStatus::Connected);
    assert_eq!(winner.candidate.progress, PROGRESS_READY);
    assert!(winner.connection.is_some());

    for i in [0, 1, 3, 4] {
        assert_eq!(snapshot.candidates[i].status, CandidateStatus::Cancelled, "candidate {i}");
    }
    assert_eq!(snapshot.winning_count(), 1);
    assert_eq!(snapshot.created_instances.len(), 1);
    assert_eq!(snapshot.created_instances[0].instance_id, "mock-3");

    settle().await;
    assert_eq!(mock.live_instances().await, vec!["mock-3".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn simultaneous_ready_picks_lowest_index() {
    let mock = Arc::new(MockProvider::new(MockConfig {
        winner: Some(ForcedWinner::CallIndices(vec![1, 3])),
        ready_after: Duration::ZERO,
        ..Default::default()
    }));
    let engine = engine(&mock, RaceConfig::default());

    engine.start_race(offers(5)).await.unwrap();
    let winner = engine.wait_for_winner().await.unwrap();

    assert_eq!(winner.candidate.index, 1);
    let snapshot = engine.snapshot();
    assert_eq!(snapshot.candidates[3].status, CandidateStatus::Cancelled);
    assert_eq!(snapshot.winning_count(), 1);

    settle().await;
    assert_eq!(mock.live_instances().await, vec!["mock-2".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn observed_states_keep_race_invariants() {
    let mock = Arc::new(MockProvider::with_winner(4, Duration::from_secs(4)));
    let engine = engine(
        &mock,
        RaceConfig {
            poll_interval: Duration::from_secs(1),
            ..Default::default()
        },
    );

    let mut rx = engine.subscribe();
    let monitor = tokio::spawn(async move {
        let mut seen: Vec<RaceSnapshot> = Vec::new();
        while rx.changed().await.is_ok() {
            let snapshot = rx.borrow_and_update().clone();
            let done = snapshot.state.status.is_terminal();
            seen.push(snapshot);
            if done {
                break;
            }
        }
        seen
    });

    engine.start_race(offers(5)).await.unwrap();
    engine.wait_for_winner().await.unwrap();
    let seen = monitor.await.unwrap();

    let mut completed = false;
    let mut last_round = 0;
    let mut last_progress = vec![0u8; 5];
    for snapshot in &seen {
        assert!(snapshot.winning_count() <= 1);
        if completed {
            assert_ne!(snapshot.state.status, RaceStatus::Racing);
        }
        completed |= snapshot.state.status == RaceStatus::Completed;

        assert!(snapshot.state.current_round >= last_round);
        last_round = snapshot.state.current_round;

        for c in snapshot.candidates.iter().filter(|c| c.status != CandidateStatus::Failed) {
            assert!(c.progress >= last_progress[c.index], "progress regressed for {}", c.index);
            last_progress[c.index] = c.progress;
        }
    }
    assert!(completed);
}

#[tokio::test(start_paused = true)]
async fn polling_advances_progress_up_to_cap() {
    let mock = Arc::new(MockProvider::new(MockConfig::default()));
    let engine = engine(
        &mock,
        RaceConfig {
            max_candidates_per_round: 1,
            poll_interval: Duration::from_secs(1),
            ..Default::default()
        },
    );

    engine.start_race(offers(1)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(engine.snapshot().candidates[0].progress, PROGRESS_CONNECTING + 10);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(engine.snapshot().candidates[0].progress, PROGRESS_POLL_CAP);
    assert!(mock.status_count().await >= 11);

    engine.cancel_race().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn complete_race_hands_over_winner_without_destroying_it() {
    let mock = Arc::new(MockProvider::with_winner(0, Duration::from_secs(1)));
    let engine = engine(
        &mock,
        RaceConfig {
            poll_interval: Duration::from_secs(1),
            ..Default::default()
        },
    );

    engine.start_race(offers(3)).await.unwrap();
    engine.wait_for_terminal().await.unwrap();

    let winner = engine.complete_race().await.unwrap();
    assert_eq!(winner.instance_id(), Some("mock-1"));

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.state.status, RaceStatus::Idle);
    assert!(snapshot.state.winner.is_none());
    assert!(snapshot.candidates.is_empty());
    assert!(snapshot.created_instances.is_empty());

    settle().await;
    assert_eq!(mock.live_instances().await, vec!["mock-1".to_string()]);

    assert!(matches!(
        engine.complete_race().await,
        Err(RaceError::InvalidTransition {
            status: RaceStatus::Idle,
            ..
        })
    ));
}

#[tokio::test(start_paused = true)]
async fn destroying_a_destroyed_loser_changes_nothing() {
    let mock = Arc::new(MockProvider::with_winner(1, Duration::from_secs(1)));
    let engine = engine(&mock, RaceConfig::default());

    engine.start_race(offers(3)).await.unwrap();
    engine.wait_for_terminal().await.unwrap();
    settle().await;

    let before = engine.snapshot();
    assert!(mock.destroy_instance("mock-1").await.unwrap());
    settle().await;
    assert_eq!(engine.snapshot(), before);
}

// ── Failure and retry ──────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn empty_offer_list_fails_immediately() {
    let mock = Arc::new(MockProvider::new(MockConfig::default()));
    let engine = engine(&mock, RaceConfig::default());

    let err = engine.start_race(Vec::new()).await.unwrap_err();
    assert!(matches!(err, RaceError::NoOffersAvailable));

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.state.status, RaceStatus::Failed);
    assert_eq!(snapshot.state.error, Some(RaceFailure::NoOffersAvailable));
    assert_eq!(snapshot.state.current_round, 0);
    assert!(snapshot.candidates.is_empty());
    assert_eq!(mock.create_count().await, 0);
}

#[tokio::test(start_paused = true)]
async fn single_round_of_failed_creates_fails_the_race() {
    let mock = Arc::new(MockProvider::always_failing(CreationError::InsufficientBalance));
    let engine = engine(
        &mock,
        RaceConfig {
            max_rounds: 1,
            timeout: Duration::from_secs(10),
            ..Default::default()
        },
    );

    engine.start_race(offers(3)).await.unwrap();
    let err = engine.wait_for_winner().await.unwrap_err();
    assert!(matches!(err, RaceError::AllAttemptsFailed));

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.state.status, RaceStatus::Failed);
    assert_eq!(snapshot.state.error, Some(RaceFailure::AllAttemptsFailed));
    assert!(snapshot.created_instances.is_empty());
    for c in &snapshot.candidates {
        assert_eq!(c.status, CandidateStatus::Failed);
        assert_eq!(c.error_message.as_deref(), Some("insufficient balance"));
    }

    assert_eq!(mock.create_count().await, 3);
    assert!(mock.live_instances().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn failed_rounds_retry_with_next_offer_slice() {
    let mock = Arc::new(MockProvider::always_failing(CreationError::RateLimited));
    let engine = engine(
        &mock,
        RaceConfig {
            max_candidates_per_round: 2,
            max_rounds: 3,
            ..Default::default()
        },
    );

    engine.start_race(offers(5)).await.unwrap();
    let snapshot = engine.wait_for_terminal().await.unwrap();

    assert_eq!(snapshot.state.status, RaceStatus::Failed);
    assert_eq!(snapshot.state.error, Some(RaceFailure::AllAttemptsFailed));
    assert_eq!(snapshot.state.current_round, 3);
    assert_eq!(snapshot.candidates.len(), 1);
    assert_eq!(snapshot.candidates[0].offer.id, "o4");

    let offered: Vec<_> = mock
        .create_calls()
        .await
        .into_iter()
        .map(|c| c.offer_id)
        .collect();
    assert_eq!(offered, vec!["o0", "o1", "o2", "o3", "o4"]);

    let labels: Vec<_> = mock.create_calls().await.into_iter().map(|c| c.label).collect();
    assert!(labels[2].starts_with("Race-R2-"));
    assert!(labels[4].starts_with("Race-R3-"));
}

#[tokio::test(start_paused = true)]
async fn exhausted_offers_stop_before_max_rounds() {
    let mock = Arc::new(MockProvider::always_failing(CreationError::Unknown));
    let engine = engine(
        &mock,
        RaceConfig {
            max_candidates_per_round: 2,
            max_rounds: 5,
            ..Default::default()
        },
    );

    engine.start_race(offers(3)).await.unwrap();
    let snapshot = engine.wait_for_terminal().await.unwrap();

    assert_eq!(snapshot.state.status, RaceStatus::Failed);
    assert_eq!(snapshot.state.error, Some(RaceFailure::AllAttemptsFailed));
    assert_eq!(snapshot.state.current_round, 2);
    assert_eq!(mock.create_count().await, 3);
}

#[tokio::test(start_paused = true)]
async fn timed_out_round_is_destroyed_before_the_next_begins() {
    let mock = Arc::new(MockProvider::new(MockConfig {
        winner: Some(ForcedWinner::Offer("o3".to_string())),
        ready_after: Duration::from_secs(1),
        ..Default::default()
    }));
    let engine = engine(
        &mock,
        RaceConfig {
            max_candidates_per_round: 2,
            max_rounds: 2,
            poll_interval: Duration::from_secs(1),
            timeout: Duration::from_secs(10),
            ..Default::default()
        },
    );

    engine.start_race(offers(4)).await.unwrap();
    let winner = engine.wait_for_winner().await.unwrap();
    assert_eq!(winner.candidate.offer.id, "o3");
    assert_eq!(winner.candidate.round, 2);
    assert_eq!(engine.snapshot().state.current_round, 2);

    let creates = mock.create_calls().await;
    let destroys = mock.destroy_calls().await;
    assert_eq!(creates.len(), 4);
    assert!(creates[2].at - creates[0].at >= Duration::from_secs(10));

    let round_one: HashSet<&str> = ["mock-1", "mock-2"].into();
    let round_one_destroys: Vec<_> = destroys
        .iter()
        .filter(|d| round_one.contains(d.instance_id.as_str()))
        .collect();
    assert_eq!(round_one_destroys.len(), 2);
    for d in round_one_destroys {
        assert!(d.seq < creates[2].seq, "{} destroyed after round 2 began", d.instance_id);
    }

    settle().await;
    assert_eq!(mock.live_instances().await, vec!["mock-4".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn creates_in_flight_at_deadline_are_destroyed_before_the_next_round() {
    // Creates take longer than the round deadline, so round 1 times out
    // with both of its creates still outstanding.
    let mock = Arc::new(MockProvider::new(MockConfig {
        latency: Duration::from_secs(2),
        ..Default::default()
    }));
    let engine = engine(
        &mock,
        RaceConfig {
            max_candidates_per_round: 2,
            max_rounds: 2,
            timeout: Duration::from_secs(1),
            ..Default::default()
        },
    );

    engine.start_race(offers(4)).await.unwrap();
    let snapshot = engine.wait_for_terminal().await.unwrap();
    assert_eq!(snapshot.state.status, RaceStatus::Failed);
    assert_eq!(snapshot.state.error, Some(RaceFailure::AllAttemptsFailed));
    assert_eq!(snapshot.state.current_round, 2);

    let creates = mock.create_calls().await;
    let destroys = mock.destroy_calls().await;
    assert_eq!(creates.len(), 4);
    assert_eq!(creates[2].offer_id, "o2");

    for id in ["mock-1", "mock-2"] {
        let destroy = destroys
            .iter()
            .find(|d| d.instance_id == id)
            .unwrap_or_else(|| panic!("{id} was never destroyed"));
        assert!(destroy.seq < creates[2].seq, "{id} destroyed after round 2 began");
        assert!(destroy.at <= creates[2].at);
    }

    assert_eq!(destroys.len(), 4);
    assert!(mock.live_instances().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn deadline_fails_pending_candidates() {
    let mock = Arc::new(MockProvider::new(MockConfig::default()));
    let engine = engine(
        &mock,
        RaceConfig {
            max_rounds: 1,
            timeout: Duration::from_secs(10),
            ..Default::default()
        },
    );

    engine.start_race(offers(2)).await.unwrap();
    let snapshot = engine.wait_for_terminal().await.unwrap();

    assert_eq!(snapshot.state.status, RaceStatus::Failed);
    assert_eq!(snapshot.state.error, Some(RaceFailure::AllAttemptsFailed));
    assert_eq!(snapshot.state.elapsed, Duration::from_secs(10));
    for c in &snapshot.candidates {
        assert_eq!(c.status, CandidateStatus::Failed);
        assert_eq!(c.error_message.as_deref(), Some("round timed out"));
    }
    assert!(snapshot.created_instances.is_empty());

    settle().await;
    assert!(mock.live_instances().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn exited_instances_fail_the_round() {
    let mock = Arc::new(MockProvider::new(MockConfig {
        exited: HashSet::from([0, 1]),
        ..Default::default()
    }));
    let engine = engine(
        &mock,
        RaceConfig {
            max_candidates_per_round: 2,
            max_rounds: 1,
            poll_interval: Duration::from_secs(1),
            ..Default::default()
        },
    );

    engine.start_race(offers(2)).await.unwrap();
    let snapshot = engine.wait_for_terminal().await.unwrap();

    assert_eq!(snapshot.state.status, RaceStatus::Failed);
    assert_eq!(snapshot.state.elapsed, Duration::from_secs(1));
    for c in &snapshot.candidates {
        assert_eq!(c.error_message.as_deref(), Some("instance exited"));
    }

    settle().await;
    assert!(mock.live_instances().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn poll_errors_do_not_fail_candidates() {
    let mock = Arc::new(MockProvider::new(MockConfig {
        flaky_status: HashSet::from([0]),
        ..Default::default()
    }));
    let engine = engine(
        &mock,
        RaceConfig {
            max_candidates_per_round: 1,
            max_rounds: 1,
            poll_interval: Duration::from_secs(1),
            timeout: Duration::from_secs(5),
            ..Default::default()
        },
    );

    engine.start_race(offers(1)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(3500)).await;

    let candidate = &engine.snapshot().candidates[0];
    assert_eq!(candidate.status, CandidateStatus::Connecting);
    assert_eq!(candidate.progress, PROGRESS_CONNECTING);

    let snapshot = engine.wait_for_terminal().await.unwrap();
    assert_eq!(snapshot.candidates[0].error_message.as_deref(), Some("round timed out"));
}

// ── Cancel and reset ───────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn cancel_destroys_everything_before_resolving() {
    let mock = Arc::new(MockProvider::new(MockConfig::default()));
    let engine = engine(&mock, RaceConfig::default());

    engine.start_race(offers(5)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(1200)).await;
    assert_eq!(mock.live_instances().await.len(), 3);

    engine.cancel_race().await.unwrap();

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.state.status, RaceStatus::Cancelled);
    assert!(snapshot.created_instances.is_empty());
    assert!(snapshot
        .candidates
        .iter()
        .all(|c| c.status == CandidateStatus::Cancelled));
    assert!(mock.live_instances().await.is_empty());

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(mock.create_count().await, 3);
    assert_eq!(engine.status(), RaceStatus::Cancelled);
}

#[tokio::test(start_paused = true)]
async fn creates_landing_after_cancel_are_destroyed() {
    let mock = Arc::new(MockProvider::new(MockConfig {
        latency: Duration::from_secs(1),
        ..Default::default()
    }));
    let engine = engine(&mock, RaceConfig::default());

    engine.start_race(offers(2)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    engine.cancel_race().await.unwrap();
    assert!(engine.snapshot().created_instances.is_empty());

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(mock.create_count().await, 1);
    assert!(mock.live_instances().await.is_empty());
    assert_eq!(mock.destroy_calls().await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn reset_from_racing_cleans_up_and_idles() {
    let mock = Arc::new(MockProvider::new(MockConfig::default()));
    let engine = engine(&mock, RaceConfig::default());

    engine.start_race(offers(3)).await.unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;
    engine.reset().await.unwrap();

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.state.status, RaceStatus::Idle);
    assert_eq!(snapshot.state.current_round, 0);
    assert!(snapshot.candidates.is_empty());
    assert!(mock.live_instances().await.is_empty());

    engine.start_race(offers(1)).await.unwrap();
    assert_eq!(engine.status(), RaceStatus::Racing);
    engine.reset().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn reset_after_a_win_keeps_the_winner_alive() {
    let mock = Arc::new(MockProvider::with_winner(0, Duration::from_secs(1)));
    let engine = engine(
        &mock,
        RaceConfig {
            poll_interval: Duration::from_secs(1),
            ..Default::default()
        },
    );

    engine.start_race(offers(3)).await.unwrap();
    let winner = engine.wait_for_winner().await.unwrap();
    engine.reset().await.unwrap();

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.state.status, RaceStatus::Idle);
    assert!(snapshot.state.winner.is_none());
    assert!(snapshot.candidates.is_empty());
    assert!(snapshot.created_instances.is_empty());

    settle().await;
    let live = mock.live_instances().await;
    assert_eq!(live, vec![winner.instance_id().unwrap().to_string()]);
    assert!(
        !mock
            .destroy_calls()
            .await
            .iter()
            .any(|d| Some(d.instance_id.as_str()) == winner.instance_id())
    );
}

#[tokio::test(start_paused = true)]
async fn reset_after_failure_returns_to_idle() {
    let mock = Arc::new(MockProvider::always_failing(CreationError::AuthError));
    let engine = engine(
        &mock,
        RaceConfig {
            max_rounds: 1,
            ..Default::default()
        },
    );

    engine.start_race(offers(2)).await.unwrap();
    let failed = engine.wait_for_terminal().await.unwrap();
    assert_eq!(failed.state.status, RaceStatus::Failed);

    engine.reset().await.unwrap();
    let snapshot = engine.snapshot();
    assert_eq!(snapshot.state.status, RaceStatus::Idle);
    assert!(snapshot.state.error.is_none());
    assert_eq!(snapshot.state.current_round, 0);
    assert!(snapshot.candidates.is_empty());

    engine.start_race(offers(1)).await.unwrap();
    assert_eq!(engine.status(), RaceStatus::Racing);
    engine.cancel_race().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn commands_outside_their_states_are_rejected() {
    let mock = Arc::new(MockProvider::new(MockConfig::default()));
    let engine = engine(&mock, RaceConfig::default());

    assert!(matches!(
        engine.cancel_race().await,
        Err(RaceError::InvalidTransition {
            status: RaceStatus::Idle,
            ..
        })
    ));

    engine.start_race(offers(2)).await.unwrap();
    assert!(matches!(
        engine.start_race(offers(2)).await,
        Err(RaceError::InvalidTransition {
            status: RaceStatus::Racing,
            ..
        })
    ));
    assert!(matches!(
        engine.complete_race().await,
        Err(RaceError::InvalidTransition { .. })
    ));

    engine.cancel_race().await.unwrap();
    assert!(matches!(
        engine.cancel_race().await,
        Err(RaceError::InvalidTransition {
            status: RaceStatus::Cancelled,
            ..
        })
    ));
}

#[tokio::test(start_paused = true)]
async fn failed_race_can_be_restarted() {
    let mock = Arc::new(MockProvider::new(MockConfig::default()));
    let engine = engine(&mock, RaceConfig::default());

    assert!(engine.start_race(Vec::new()).await.is_err());
    engine.start_race(offers(1)).await.unwrap();

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.state.status, RaceStatus::Racing);
    assert_eq!(snapshot.state.current_round, 1);
    assert!(snapshot.state.error.is_none());
    engine.cancel_race().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn dropping_the_engine_stops_the_race() {
    let mock = Arc::new(MockProvider::new(MockConfig::default()));
    let engine = engine(&mock, RaceConfig::default());

    engine.start_race(offers(5)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(mock.live_instances().await.len(), 2);
    drop(engine);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(mock.create_count().await, 2);
    assert!(mock.live_instances().await.is_empty());
    assert_eq!(mock.destroy_calls().await.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn dropping_the_engine_destroys_creates_still_in_flight() {
    let mock = Arc::new(MockProvider::new(MockConfig {
        latency: Duration::from_secs(1),
        ..Default::default()
    }));
    let engine = engine(&mock, RaceConfig::default());

    engine.start_race(offers(2)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    drop(engine);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(mock.create_count().await, 1);
    assert!(mock.live_instances().await.is_empty());
    assert_eq!(mock.destroy_calls().await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn dropping_a_completed_engine_keeps_the_winner() {
    let mock = Arc::new(MockProvider::with_winner(0, Duration::from_secs(1)));
    let engine = engine(
        &mock,
        RaceConfig {
            poll_interval: Duration::from_secs(1),
            ..Default::default()
        },
    );

    engine.start_race(offers(1)).await.unwrap();
    let winner = engine.wait_for_winner().await.unwrap();
    drop(engine);

    settle().await;
    assert_eq!(winner.instance_id(), Some("mock-1"));
    assert_eq!(mock.live_instances().await, vec!["mock-1".to_string()]);
    assert!(mock.destroy_calls().await.is_empty());
}

#[tokio::test]
async fn invalid_config_is_rejected() {
    let mock = Arc::new(MockProvider::new(MockConfig::default()));
    let result = RaceEngine::new(
        mock,
        RaceConfig {
            max_rounds: 0,
            ..Default::default()
        },
    );
    assert!(matches!(result, Err(RaceError::Config(_))));
}
