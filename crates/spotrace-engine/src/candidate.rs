//! Candidates: one create call per offer in a round.
//!
//! Candidates are spawned one at a time, `create_delay` apart, to stay
//! under marketplace rate limits. Each create runs in its own task and
//! reports back to the race actor; a successful create that arrives
//! after its round closed is destroyed on receipt. A failed round is not
//! torn down until all of its creates have reported back.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use spotrace_core::{CandidateStatus, CreatedInstance, InstanceId};
use spotrace_provider::CreationError;

use crate::actor::{Message, RaceActor};

/// Unique provider-side label for a candidate instance.
pub(crate) fn instance_label(round: u32, spec: &str, timestamp_ms: u128) -> String {
    format!("Race-R{round}-{spec}-{timestamp_ms}")
}

fn unix_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
}

/// Ask the actor to spawn candidates `0..count`, `delay` apart.
pub(crate) fn spawn_stagger(
    tx: mpsc::UnboundedSender<Message>,
    race_id: u64,
    round: u32,
    count: usize,
    delay: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        for index in 0..count {
            if index > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if tx
                .send(Message::SpawnCandidate {
                    race_id,
                    round,
                    index,
                })
                .is_err()
            {
                break;
            }
        }
    })
}

impl RaceActor {
    pub(crate) fn on_spawn_candidate(&mut self, race_id: u64, round: u32, index: usize) {
        if !self.is_current(race_id, round) {
            return;
        }
        let Some(candidate) = self.candidates.get_mut(index) else {
            return;
        };
        if candidate.status != CandidateStatus::Idle {
            return;
        }

        candidate.mark_creating();
        let offer = candidate.offer.clone();
        self.create_started();
        let label = instance_label(round, &offer.spec, unix_millis());
        debug!(race_id, round, index, offer = %offer.id, %label, "creating instance");

        let provider = self.provider.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = provider
                .create_instance(&offer, &label)
                .await
                .map_err(|e| {
                    let class = e.classify();
                    warn!(
                        race_id,
                        round,
                        index,
                        offer = %offer.id,
                        error = %e,
                        classified = %class,
                        "instance creation failed"
                    );
                    class
                });
            let _ = tx.send(Message::Created {
                race_id,
                round,
                index,
                result,
            });
        });

        self.publish();
    }

    pub(crate) fn on_created(
        &mut self,
        race_id: u64,
        round: u32,
        index: usize,
        result: Result<InstanceId, CreationError>,
    ) {
        let this_round = self.create_finished(race_id, round);
        let accepted = self.is_current(race_id, round)
            && self
                .candidates
                .get(index)
                .is_some_and(|c| c.status == CandidateStatus::Creating);

        if !accepted {
            if let Ok(instance_id) = result {
                if this_round && self.teardown.is_some() {
                    debug!(race_id, round, index, instance = %instance_id, "instance landed in a failed round, destroying");
                    self.destroy_for_teardown(instance_id);
                } else {
                    debug!(race_id, round, index, instance = %instance_id, "late instance, destroying");
                    self.destroy_detached(instance_id);
                }
            }
            if this_round {
                self.try_close_round();
            }
            return;
        }

        let candidate = &mut self.candidates[index];
        match result {
            Ok(instance_id) => {
                debug!(race_id, round, index, instance = %instance_id, "instance accepted");
                self.created.push(CreatedInstance {
                    index,
                    round,
                    instance_id: instance_id.clone(),
                    offer_id: candidate.offer.id.clone(),
                });
                candidate.mark_connecting(instance_id);
            }
            Err(err) => {
                candidate.fail(err.to_string());
                if self.all_failed() {
                    self.handle_all_failed();
                    return;
                }
            }
        }

        self.publish();
    }
}
