//! Status poller: one shared ticker for every pending candidate.
//!
//! Each tick queries the round's connecting instances in creation order
//! and stops at the first one reported running. The race actor applies
//! the pass in the same order, so the lowest-index ready candidate wins
//! and no later observation in the pass can claim a second win. Ticks
//! never overlap: a tick that fires while a pass is in flight is skipped.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use spotrace_core::{CandidateStatus, InstanceId};
use spotrace_provider::{InstanceStatus, ProvisioningApi};

use crate::actor::{Message, RaceActor};
use crate::timers::TimerKind;

/// What a provider status means for the race.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObservedPhase {
    Ready,
    Failed,
    Pending,
}

/// Map a raw provider state onto the race's view of it.
pub fn observe(status: &str) -> ObservedPhase {
    match status.trim().to_ascii_lowercase().as_str() {
        "running" => ObservedPhase::Ready,
        "exited" | "error" | "destroyed" | "offline" | "stopped" => ObservedPhase::Failed,
        _ => ObservedPhase::Pending,
    }
}

/// One status query result from a poll pass.
pub(crate) struct Observation {
    pub(crate) index: usize,
    pub(crate) instance_id: InstanceId,
    pub(crate) result: Result<InstanceStatus, String>,
}

async fn poll_pass(
    provider: Arc<dyn ProvisioningApi>,
    targets: Vec<(usize, InstanceId)>,
    tx: mpsc::UnboundedSender<Message>,
    race_id: u64,
    round: u32,
) {
    let mut observations = Vec::with_capacity(targets.len());
    for (index, instance_id) in targets {
        let result = provider.get_instance_status(&instance_id).await;
        let ready = matches!(&result, Ok(s) if observe(&s.status) == ObservedPhase::Ready);
        observations.push(Observation {
            index,
            instance_id,
            result: result.map_err(|e| e.to_string()),
        });
        if ready {
            break;
        }
    }
    let _ = tx.send(Message::Polled {
        race_id,
        round,
        observations,
    });
}

impl RaceActor {
    pub(crate) fn on_poll_tick(&mut self, race_id: u64, round: u32) {
        if !self.is_current(race_id, round) || self.poll_in_flight {
            return;
        }

        let targets: Vec<(usize, InstanceId)> = self
            .candidates
            .iter()
            .filter(|c| c.status == CandidateStatus::Connecting)
            .filter_map(|c| Some((c.index, c.instance_id.clone()?)))
            .collect();
        if targets.is_empty() {
            return;
        }

        debug!(race_id, round, pending = targets.len(), "poll tick");
        self.poll_in_flight = true;
        let handle = tokio::spawn(poll_pass(
            self.provider.clone(),
            targets,
            self.tx.clone(),
            race_id,
            round,
        ));
        self.timers.track(TimerKind::PollPass, handle);
    }

    pub(crate) fn on_polled(&mut self, race_id: u64, round: u32, observations: Vec<Observation>) {
        if race_id == self.race_id && round == self.state.current_round {
            self.poll_in_flight = false;
        }
        if !self.is_current(race_id, round) {
            return;
        }

        for obs in observations {
            let Some(candidate) = self.candidates.get_mut(obs.index) else {
                continue;
            };
            if candidate.status != CandidateStatus::Connecting
                || candidate.instance_id.as_deref() != Some(obs.instance_id.as_str())
            {
                continue;
            }

            match obs.result {
                Err(error) => {
                    warn!(
                        race_id,
                        round,
                        index = obs.index,
                        instance = %obs.instance_id,
                        %error,
                        "status poll failed"
                    );
                }
                Ok(status) => match observe(&status.status) {
                    ObservedPhase::Ready => {
                        candidate.status = CandidateStatus::Ready;
                        self.resolve_winner(obs.index, status.connection);
                        return;
                    }
                    ObservedPhase::Failed => {
                        warn!(
                            race_id,
                            round,
                            index = obs.index,
                            instance = %obs.instance_id,
                            provider_status = %status.status,
                            "instance failed"
                        );
                        candidate.fail(format!("instance {}", status.status.to_ascii_lowercase()));
                    }
                    ObservedPhase::Pending => {
                        candidate.record_poll();
                        debug!(
                            index = obs.index,
                            provider_status = %status.status,
                            progress = candidate.progress,
                            "instance not ready"
                        );
                    }
                },
            }
        }

        if self.all_failed() {
            self.handle_all_failed();
        } else {
            self.publish();
        }
    }
}
