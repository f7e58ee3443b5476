//! Best-effort teardown of losing, failed and cancelled instances.
//!
//! Destroys within a batch run concurrently. Failures are logged and
//! dropped: there is no retry, and nothing here ever surfaces in race
//! state. Instances lost to a crash mid-race are left to an external
//! reconciliation job.

use std::sync::Arc;

use futures_util::future::join_all;
use tracing::{debug, info, warn};

use spotrace_core::{CandidateStatus, CreatedInstance, InstanceId};
use spotrace_provider::ProvisioningApi;

use crate::actor::{CancelWaiter, Message, RaceActor};

/// Destroy every instance in `instances`; returns how many are gone.
pub(crate) async fn destroy_batch(
    provider: &dyn ProvisioningApi,
    instances: &[CreatedInstance],
) -> usize {
    let results = join_all(
        instances
            .iter()
            .map(|inst| destroy_one(provider, &inst.instance_id)),
    )
    .await;
    let destroyed = results.iter().filter(|gone| **gone).count();
    debug!(requested = instances.len(), destroyed, "destroy batch finished");
    destroyed
}

async fn destroy_one(provider: &dyn ProvisioningApi, instance_id: &str) -> bool {
    match provider.destroy_instance(instance_id).await {
        Ok(true) => {
            debug!(instance = instance_id, "instance destroyed");
            true
        }
        Ok(false) => {
            warn!(instance = instance_id, "provider did not confirm destroy");
            false
        }
        Err(e) => {
            warn!(instance = instance_id, error = %e, "failed to destroy instance");
            false
        }
    }
}

impl RaceActor {
    /// Destroy every tracked instance except the winner's.
    pub(crate) fn destroy_losers(&mut self, winner_id: &str) {
        let (keep, losers): (Vec<_>, Vec<_>) = std::mem::take(&mut self.created)
            .into_iter()
            .partition(|inst| inst.instance_id == winner_id);
        self.created = keep;
        if losers.is_empty() {
            return;
        }

        info!(winner = winner_id, losers = losers.len(), "destroying losing instances");
        let provider = self.provider.clone();
        tokio::spawn(async move {
            destroy_batch(provider.as_ref(), &losers).await;
        });
    }

    /// Destroy an instance the race no longer tracks.
    pub(crate) fn destroy_detached(&self, instance_id: InstanceId) {
        let provider: Arc<dyn ProvisioningApi> = self.provider.clone();
        tokio::spawn(async move {
            destroy_one(provider.as_ref(), &instance_id).await;
        });
    }

    /// Destroy an instance of the failed round as part of its teardown.
    pub(crate) fn destroy_for_teardown(&mut self, instance_id: InstanceId) {
        let race_id = self.race_id;
        let round = self.state.current_round;
        if let Some(pending) = &mut self.teardown {
            *pending += 1;
        }

        let provider = self.provider.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            destroy_one(provider.as_ref(), &instance_id).await;
            let _ = tx.send(Message::TeardownDone { race_id, round });
        });
    }

    /// Tear down a round that ended without a winner.
    ///
    /// The retry decision waits until this batch and every create still
    /// in flight for the round have been accounted for.
    pub(crate) fn handle_all_failed(&mut self) {
        let race_id = self.race_id;
        let round = self.state.current_round;

        self.timers.stop_round();
        self.round_open = false;
        self.poll_in_flight = false;

        let doomed = std::mem::take(&mut self.created);
        info!(
            race_id,
            round,
            instances = doomed.len(),
            creates_in_flight = self.round_creates,
            "round failed, destroying its instances"
        );
        self.teardown = Some(1);
        self.publish();

        let provider = self.provider.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            destroy_batch(provider.as_ref(), &doomed).await;
            let _ = tx.send(Message::TeardownDone { race_id, round });
        });
    }

    /// Stop the race and destroy everything it tracks.
    ///
    /// `waiter` is resolved once every destroy has returned.
    pub(crate) fn begin_cancel(&mut self, waiter: CancelWaiter) {
        let race_id = self.race_id;

        self.timers.stop_all();
        self.round_open = false;
        self.poll_in_flight = false;
        self.teardown = None;
        for candidate in &mut self.candidates {
            if candidate.status != CandidateStatus::Connected {
                candidate.cancel();
            }
        }

        let doomed = std::mem::take(&mut self.created);
        info!(race_id, instances = doomed.len(), "cancelling race");
        self.cancelling = Some(vec![waiter]);
        self.publish();

        let provider = self.provider.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            destroy_batch(provider.as_ref(), &doomed).await;
            let _ = tx.send(Message::CancelCleared { race_id });
        });
    }
}
