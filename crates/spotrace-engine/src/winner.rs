//! Winner resolution.

use tracing::info;

use spotrace_core::{ConnectionInfo, RaceStatus, RaceWinner};

use crate::actor::RaceActor;

impl RaceActor {
    /// Freeze the race on the candidate at `index`.
    ///
    /// Only the actor calls this, from inside a poll pass it is applying,
    /// and the round is closed before returning; a second win in the same
    /// race is unreachable.
    pub(crate) fn resolve_winner(&mut self, index: usize, connection: Option<ConnectionInfo>) {
        self.finish(RaceStatus::Completed);

        for candidate in &mut self.candidates {
            if candidate.index == index {
                candidate.mark_connected();
            } else {
                candidate.cancel();
            }
        }

        let Some(candidate) = self.candidates.get(index).cloned() else {
            return;
        };
        info!(
            race_id = self.race_id,
            round = self.state.current_round,
            index,
            offer = %candidate.offer.id,
            instance = candidate.instance_id.as_deref().unwrap_or_default(),
            elapsed = ?self.state.elapsed,
            "winner declared"
        );

        let winner_id = candidate.instance_id.clone();
        self.state.winner = Some(RaceWinner {
            candidate,
            connection,
        });

        if let Some(winner_id) = winner_id {
            self.destroy_losers(&winner_id);
        }
        self.publish();
    }
}
