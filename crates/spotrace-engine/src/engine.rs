//! Public handle to a race actor.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};

use spotrace_core::{Offer, RaceConfig, RaceSnapshot, RaceStatus, RaceWinner};
use spotrace_provider::ProvisioningApi;

use crate::actor::{Message, RaceActor};
use crate::error::{RaceError, RaceResult};

/// Runs provisioning races against one provider.
///
/// The engine owns a background actor task; all commands are forwarded
/// to it and answered once applied. Dropping the engine stops every timer
/// and destroys the instances the race still tracks, except the winner of
/// a completed race. Creates still in flight are destroyed as they land,
/// after which the actor exits.
///
/// Must be created inside a tokio runtime.
pub struct RaceEngine {
    tx: mpsc::UnboundedSender<Message>,
    snapshot: watch::Receiver<RaceSnapshot>,
}

impl RaceEngine {
    pub fn new(provider: Arc<dyn ProvisioningApi>, config: RaceConfig) -> RaceResult<Self> {
        config.validate()?;

        let (tx, rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot) = watch::channel(RaceSnapshot::default());
        let actor = RaceActor::new(provider, config, tx.clone(), rx, snapshot_tx);
        tokio::spawn(actor.run());

        Ok(Self { tx, snapshot })
    }

    /// Start racing `offers`, in order.
    ///
    /// Resolves once the first round is launched. An empty list fails the
    /// race immediately with `NoOffersAvailable`.
    pub async fn start_race(&self, offers: Vec<Offer>) -> RaceResult<()> {
        self.request(|reply| Message::Start { offers, reply }).await?
    }

    /// Cancel the active race.
    ///
    /// Resolves after every tracked instance has been sent a destroy.
    pub async fn cancel_race(&self) -> RaceResult<()> {
        self.request(|reply| Message::Cancel { reply }).await?
    }

    /// Collect the winner of a completed race and return to idle.
    ///
    /// The winning instance is not destroyed; it belongs to the caller.
    pub async fn complete_race(&self) -> RaceResult<RaceWinner> {
        self.request(|reply| Message::Complete { reply }).await?
    }

    /// Return to idle from any state.
    ///
    /// An active race is cancelled first, with its instances destroyed.
    pub async fn reset(&self) -> RaceResult<()> {
        self.request(|reply| Message::Reset { reply }).await
    }

    pub fn snapshot(&self) -> RaceSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn status(&self) -> RaceStatus {
        self.snapshot.borrow().state.status
    }

    /// Subscribe to race snapshots. Intermediate states may be coalesced.
    pub fn subscribe(&self) -> watch::Receiver<RaceSnapshot> {
        self.snapshot.clone()
    }

    /// Wait until the race reaches `Completed`, `Failed` or `Cancelled`.
    pub async fn wait_for_terminal(&self) -> RaceResult<RaceSnapshot> {
        let mut rx = self.subscribe();
        let snapshot = rx
            .wait_for(|s| s.state.status.is_terminal())
            .await
            .map_err(|_| RaceError::EngineStopped)?
            .clone();
        Ok(snapshot)
    }

    /// Wait for the race to end and report how.
    pub async fn wait_for_winner(&self) -> RaceResult<RaceWinner> {
        let snapshot = self.wait_for_terminal().await?;
        match (snapshot.state.status, snapshot.state.winner, snapshot.state.error) {
            (RaceStatus::Completed, Some(winner), _) => Ok(winner),
            (RaceStatus::Failed, _, Some(failure)) => Err(failure.into()),
            (RaceStatus::Failed, _, None) => Err(RaceError::AllAttemptsFailed),
            _ => Err(RaceError::Cancelled),
        }
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Message,
    ) -> RaceResult<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .map_err(|_| RaceError::EngineStopped)?;
        rx.await.map_err(|_| RaceError::EngineStopped)
    }
}

impl Drop for RaceEngine {
    fn drop(&mut self) {
        let _ = self.tx.send(Message::Shutdown);
    }
}
