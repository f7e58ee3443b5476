//! The race actor, sole owner and writer of race state.
//!
//! Commands from the facade and events from create tasks, poll passes,
//! timers and cleanup batches all arrive on one channel and are handled
//! one at a time. Handlers never await a provider call; they spawn it
//! and react to the message it posts back. Every event carries the race
//! id and round it belongs to, so results that arrive after the race
//! moved on are recognised and discarded.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, info};

use spotrace_core::{
    Candidate, CandidateStatus, CreatedInstance, InstanceId, Offer, RaceConfig, RaceFailure,
    RaceSnapshot, RaceState, RaceStatus, RaceWinner,
};
use spotrace_provider::{CreationError, ProvisioningApi};

use crate::error::{RaceError, RaceResult};
use crate::poller::Observation;
use crate::round::round_window;
use crate::timers::{TimerKind, TimerSet};

/// Refresh period of `RaceState::elapsed` while a race is active.
const ELAPSED_TICK: Duration = Duration::from_secs(1);

pub(crate) enum Message {
    // ── Commands ──
    Start {
        offers: Vec<Offer>,
        reply: oneshot::Sender<RaceResult<()>>,
    },
    Cancel {
        reply: oneshot::Sender<RaceResult<()>>,
    },
    Complete {
        reply: oneshot::Sender<RaceResult<RaceWinner>>,
    },
    Reset {
        reply: oneshot::Sender<()>,
    },
    /// The facade was dropped.
    Shutdown,

    // ── Events ──
    SpawnCandidate {
        race_id: u64,
        round: u32,
        index: usize,
    },
    Created {
        race_id: u64,
        round: u32,
        index: usize,
        result: Result<InstanceId, CreationError>,
    },
    PollTick {
        race_id: u64,
        round: u32,
    },
    Polled {
        race_id: u64,
        round: u32,
        observations: Vec<Observation>,
    },
    RoundDeadline {
        race_id: u64,
        round: u32,
    },
    /// One destroy batch of a failed round has returned.
    TeardownDone {
        race_id: u64,
        round: u32,
    },
    CancelCleared {
        race_id: u64,
    },
    ElapsedTick {
        race_id: u64,
    },
}

/// A caller blocked on cancel cleanup.
pub(crate) enum CancelWaiter {
    Cancel(oneshot::Sender<RaceResult<()>>),
    Reset(oneshot::Sender<()>),
}

impl CancelWaiter {
    fn resolve(self) {
        match self {
            CancelWaiter::Cancel(reply) => {
                let _ = reply.send(Ok(()));
            }
            CancelWaiter::Reset(reply) => {
                let _ = reply.send(());
            }
        }
    }
}

pub(crate) struct RaceActor {
    pub(crate) provider: Arc<dyn ProvisioningApi>,
    pub(crate) config: RaceConfig,
    pub(crate) tx: mpsc::UnboundedSender<Message>,
    rx: mpsc::UnboundedReceiver<Message>,
    snapshot_tx: watch::Sender<RaceSnapshot>,

    /// Bumped on every start, complete and reset.
    pub(crate) race_id: u64,
    pub(crate) state: RaceState,
    pub(crate) offers: Vec<Offer>,
    /// Candidates of the current round, indexed by creation order.
    pub(crate) candidates: Vec<Candidate>,
    /// Instances created and not yet handed to cleanup.
    pub(crate) created: Vec<CreatedInstance>,
    started_at: Option<Instant>,
    /// The current round still accepts create and poll results.
    pub(crate) round_open: bool,
    pub(crate) poll_in_flight: bool,
    /// Create calls of the current round that have not reported back.
    pub(crate) round_creates: usize,
    /// Create calls of any race that have not reported back.
    creates_in_flight: usize,
    /// Destroy batches still running for a failed round.
    pub(crate) teardown: Option<usize>,
    shutting_down: bool,
    /// Set while a cancel's destroy batch is running.
    pub(crate) cancelling: Option<Vec<CancelWaiter>>,
    pub(crate) timers: TimerSet,
}

impl RaceActor {
    pub(crate) fn new(
        provider: Arc<dyn ProvisioningApi>,
        config: RaceConfig,
        tx: mpsc::UnboundedSender<Message>,
        rx: mpsc::UnboundedReceiver<Message>,
        snapshot_tx: watch::Sender<RaceSnapshot>,
    ) -> Self {
        Self {
            provider,
            config,
            tx,
            rx,
            snapshot_tx,
            race_id: 0,
            state: RaceState::default(),
            offers: Vec::new(),
            candidates: Vec::new(),
            created: Vec::new(),
            started_at: None,
            round_open: false,
            poll_in_flight: false,
            round_creates: 0,
            creates_in_flight: 0,
            teardown: None,
            shutting_down: false,
            cancelling: None,
            timers: TimerSet::default(),
        }
    }

    pub(crate) async fn run(mut self) {
        debug!("race actor started");
        while let Some(message) = self.rx.recv().await {
            if self.shutting_down {
                self.drain(message);
            } else {
                self.handle(message);
            }
            if self.shutting_down && self.creates_in_flight == 0 {
                break;
            }
        }
        debug!("race actor stopped");
    }

    fn handle(&mut self, message: Message) {
        match message {
            Message::Start { offers, reply } => {
                let _ = reply.send(self.on_start(offers));
            }
            Message::Cancel { reply } => self.on_cancel(reply),
            Message::Complete { reply } => {
                let _ = reply.send(self.on_complete());
            }
            Message::Reset { reply } => self.on_reset(reply),
            Message::Shutdown => self.on_shutdown(),
            Message::SpawnCandidate {
                race_id,
                round,
                index,
            } => self.on_spawn_candidate(race_id, round, index),
            Message::Created {
                race_id,
                round,
                index,
                result,
            } => self.on_created(race_id, round, index, result),
            Message::PollTick { race_id, round } => self.on_poll_tick(race_id, round),
            Message::Polled {
                race_id,
                round,
                observations,
            } => self.on_polled(race_id, round, observations),
            Message::RoundDeadline { race_id, round } => self.on_round_deadline(race_id, round),
            Message::TeardownDone { race_id, round } => self.on_teardown_done(race_id, round),
            Message::CancelCleared { race_id } => self.on_cancel_cleared(race_id),
            Message::ElapsedTick { race_id } => {
                if race_id == self.race_id && self.state.status.is_active() {
                    self.publish();
                }
            }
        }
    }

    // ── Commands ────────────────────────────────────────────────────

    fn on_start(&mut self, offers: Vec<Offer>) -> RaceResult<()> {
        match self.state.status {
            RaceStatus::Idle | RaceStatus::Failed | RaceStatus::Cancelled => {}
            status => {
                return Err(RaceError::InvalidTransition {
                    command: "start race",
                    status,
                });
            }
        }

        self.clear_race();
        self.started_at = Some(Instant::now());
        self.state.status = RaceStatus::Searching;
        info!(race_id = self.race_id, offers = offers.len(), "race started");

        if offers.is_empty() {
            self.fail_race(RaceFailure::NoOffersAvailable);
            return Err(RaceError::NoOffersAvailable);
        }

        self.offers = offers;
        let race_id = self.race_id;
        self.timers
            .spawn_ticker(TimerKind::Elapsed, ELAPSED_TICK, self.tx.clone(), move || {
                Message::ElapsedTick { race_id }
            });
        self.publish();

        let window = round_window(self.offers.len(), self.config.max_candidates_per_round, 1);
        self.start_round(1, window);
        Ok(())
    }

    fn on_cancel(&mut self, reply: oneshot::Sender<RaceResult<()>>) {
        if let Some(waiters) = &mut self.cancelling {
            waiters.push(CancelWaiter::Cancel(reply));
            return;
        }
        if !self.state.status.is_active() {
            let _ = reply.send(Err(RaceError::InvalidTransition {
                command: "cancel race",
                status: self.state.status,
            }));
            return;
        }
        self.begin_cancel(CancelWaiter::Cancel(reply));
    }

    fn on_complete(&mut self) -> RaceResult<RaceWinner> {
        let winner = match (&self.state.winner, self.state.status) {
            (Some(winner), RaceStatus::Completed) if self.cancelling.is_none() => winner.clone(),
            _ => {
                return Err(RaceError::InvalidTransition {
                    command: "complete race",
                    status: self.state.status,
                });
            }
        };

        info!(
            race_id = self.race_id,
            instance = winner.instance_id().unwrap_or_default(),
            "race completed, winner handed over"
        );
        self.clear_race();
        self.publish();
        Ok(winner)
    }

    fn on_reset(&mut self, reply: oneshot::Sender<()>) {
        if let Some(waiters) = &mut self.cancelling {
            waiters.push(CancelWaiter::Reset(reply));
            return;
        }
        if self.state.status.is_active() {
            self.begin_cancel(CancelWaiter::Reset(reply));
            return;
        }
        debug!(race_id = self.race_id, status = %self.state.status, "race reset");
        self.clear_race();
        self.publish();
        let _ = reply.send(());
    }

    fn on_cancel_cleared(&mut self, race_id: u64) {
        if race_id != self.race_id {
            return;
        }
        let Some(waiters) = self.cancelling.take() else {
            return;
        };

        self.finish(RaceStatus::Cancelled);
        info!(race_id, elapsed = ?self.state.elapsed, "race cancelled");
        self.publish();

        if waiters.iter().any(|w| matches!(w, CancelWaiter::Reset(_))) {
            self.clear_race();
            self.publish();
        }
        for waiter in waiters {
            waiter.resolve();
        }
    }

    /// Release everything the race still holds and wind down.
    ///
    /// A completed race keeps its winner; every other tracked instance is
    /// destroyed, and creates still in flight are destroyed as they land.
    fn on_shutdown(&mut self) {
        self.timers.stop_all();
        self.round_open = false;
        self.poll_in_flight = false;
        self.teardown = None;
        self.shutting_down = true;

        let doomed = if self.state.status == RaceStatus::Completed {
            Vec::new()
        } else {
            std::mem::take(&mut self.created)
        };
        info!(
            race_id = self.race_id,
            status = %self.state.status,
            instances = doomed.len(),
            creates_in_flight = self.creates_in_flight,
            "engine dropped, releasing instances"
        );
        for instance in doomed {
            self.destroy_detached(instance.instance_id);
        }
    }

    /// Only create results matter once shutdown has begun.
    fn drain(&mut self, message: Message) {
        if let Message::Created {
            race_id,
            round,
            index,
            result,
        } = message
        {
            self.on_created(race_id, round, index, result);
        }
    }

    // ── Shared helpers ──────────────────────────────────────────────

    /// Whether an event for (`race_id`, `round`) may still change state.
    pub(crate) fn is_current(&self, race_id: u64, round: u32) -> bool {
        self.is_this_round(race_id, round) && self.round_open
    }

    /// Same race and round, whether or not the round is still open.
    pub(crate) fn is_this_round(&self, race_id: u64, round: u32) -> bool {
        race_id == self.race_id && round == self.state.current_round
    }

    pub(crate) fn create_started(&mut self) {
        self.round_creates += 1;
        self.creates_in_flight += 1;
    }

    /// Account for a create result; returns whether it belongs to this round.
    pub(crate) fn create_finished(&mut self, race_id: u64, round: u32) -> bool {
        self.creates_in_flight = self.creates_in_flight.saturating_sub(1);
        let this_round = self.is_this_round(race_id, round);
        if this_round {
            self.round_creates = self.round_creates.saturating_sub(1);
        }
        this_round
    }

    pub(crate) fn all_failed(&self) -> bool {
        !self.candidates.is_empty()
            && self
                .candidates
                .iter()
                .all(|c| c.status == CandidateStatus::Failed)
    }

    /// Enter a terminal status with elapsed time frozen.
    pub(crate) fn finish(&mut self, status: RaceStatus) {
        self.refresh_elapsed();
        self.state.status = status;
        self.round_open = false;
        self.poll_in_flight = false;
        self.timers.stop_all();
    }

    pub(crate) fn fail_race(&mut self, failure: RaceFailure) {
        self.finish(RaceStatus::Failed);
        self.state.error = Some(failure);
        self.publish();
    }

    /// Drop all tracking and return to `Idle` under a fresh race id.
    fn clear_race(&mut self) {
        self.timers.stop_all();
        self.race_id += 1;
        self.state = RaceState::default();
        self.offers.clear();
        self.candidates.clear();
        self.created.clear();
        self.started_at = None;
        self.round_open = false;
        self.poll_in_flight = false;
        self.round_creates = 0;
        self.teardown = None;
    }

    fn refresh_elapsed(&mut self) {
        if let Some(started) = self.started_at {
            if self.state.status.is_active() {
                self.state.elapsed = started.elapsed();
            }
        }
    }

    pub(crate) fn publish(&mut self) {
        self.refresh_elapsed();
        self.snapshot_tx.send_replace(RaceSnapshot {
            state: self.state.clone(),
            candidates: self.candidates.clone(),
            created_instances: self.created.clone(),
        });
    }
}
