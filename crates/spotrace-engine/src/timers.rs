//! Timer supervisor for the background timers of a race.
//!
//! Timers are plain tokio tasks that post messages back to the actor.
//! `TimerSet` keeps their handles so a winner, a failed round, a cancel
//! or a dropped engine can abort them in one place. Dropping the set
//! aborts everything it still holds.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::actor::Message;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum TimerKind {
    /// Staggered candidate spawner.
    Stagger,
    /// Shared poll ticker.
    Poll,
    /// An in-flight poll pass.
    PollPass,
    RoundDeadline,
    /// Race-wide elapsed-time refresher.
    Elapsed,
}

impl TimerKind {
    fn is_round_scoped(self) -> bool {
        !matches!(self, TimerKind::Elapsed)
    }
}

#[derive(Default)]
pub(crate) struct TimerSet {
    handles: Vec<(TimerKind, JoinHandle<()>)>,
}

impl TimerSet {
    pub(crate) fn track(&mut self, kind: TimerKind, handle: JoinHandle<()>) {
        self.handles.retain(|(_, h)| !h.is_finished());
        self.handles.push((kind, handle));
    }

    /// Post `make()` every `period`, first tick one period from now.
    pub(crate) fn spawn_ticker<F>(
        &mut self,
        kind: TimerKind,
        period: Duration,
        tx: mpsc::UnboundedSender<Message>,
        make: F,
    ) where
        F: Fn() -> Message + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if tx.send(make()).is_err() {
                    break;
                }
            }
        });
        self.track(kind, handle);
    }

    /// Post `message` once after `after`.
    pub(crate) fn spawn_deadline(
        &mut self,
        kind: TimerKind,
        after: Duration,
        tx: mpsc::UnboundedSender<Message>,
        message: Message,
    ) {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let _ = tx.send(message);
        });
        self.track(kind, handle);
    }

    /// Abort every round-scoped timer, keeping the elapsed refresher.
    pub(crate) fn stop_round(&mut self) {
        self.stop_where(TimerKind::is_round_scoped);
    }

    pub(crate) fn stop_all(&mut self) {
        self.stop_where(|_| true);
    }

    fn stop_where(&mut self, pred: impl Fn(TimerKind) -> bool) {
        self.handles.retain(|(kind, handle)| {
            if pred(*kind) {
                handle.abort();
                false
            } else {
                true
            }
        });
    }

    /// Number of timers still running.
    #[cfg(test)]
    pub(crate) fn active(&self) -> usize {
        self.handles.iter().filter(|(_, h)| !h.is_finished()).count()
    }

    #[cfg(test)]
    pub(crate) fn is_running(&self, kind: TimerKind) -> bool {
        self.handles
            .iter()
            .any(|(k, h)| *k == kind && !h.is_finished())
    }
}

impl Drop for TimerSet {
    fn drop(&mut self) {
        for (_, handle) in &self.handles {
            handle.abort();
        }
    }
}
