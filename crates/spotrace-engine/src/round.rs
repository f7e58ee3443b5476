//! Round controller: batches offers into bounded rounds.
//!
//! Round `n` races the `n`-th window of `max_candidates_per_round`
//! offers. A round ends with a winner, or fails when every candidate has
//! failed or its deadline expires. A failed round's instances, including
//! those from creates still in flight at the deadline, are destroyed
//! before the controller decides between the next window and terminal
//! failure.

use std::ops::Range;

use tracing::{info, warn};

use spotrace_core::{Candidate, RaceFailure, RaceStatus};

use crate::actor::{Message, RaceActor};
use crate::candidate::spawn_stagger;
use crate::timers::TimerKind;

/// Offer indices raced in `round` (1-based).
pub(crate) fn round_window(total: usize, per_round: usize, round: u32) -> Range<usize> {
    let start = (round.saturating_sub(1) as usize)
        .saturating_mul(per_round)
        .min(total);
    let end = start.saturating_add(per_round).min(total);
    start..end
}

impl RaceActor {
    /// Launch `round` over the offers in `window`, which must be non-empty.
    pub(crate) fn start_round(&mut self, round: u32, window: Range<usize>) {
        self.state.current_round = round;
        self.state.status = RaceStatus::Racing;
        self.candidates = self.offers[window]
            .iter()
            .cloned()
            .enumerate()
            .map(|(index, offer)| Candidate::new(offer, index, round))
            .collect();
        self.round_open = true;
        self.poll_in_flight = false;
        self.round_creates = 0;
        self.teardown = None;

        let race_id = self.race_id;
        let count = self.candidates.len();
        info!(
            race_id,
            round,
            max_rounds = self.config.max_rounds,
            candidates = count,
            "round started"
        );

        self.timers.track(
            TimerKind::Stagger,
            spawn_stagger(self.tx.clone(), race_id, round, count, self.config.create_delay),
        );
        self.timers.spawn_ticker(
            TimerKind::Poll,
            self.config.poll_interval,
            self.tx.clone(),
            move || Message::PollTick { race_id, round },
        );
        self.timers.spawn_deadline(
            TimerKind::RoundDeadline,
            self.config.timeout,
            self.tx.clone(),
            Message::RoundDeadline { race_id, round },
        );

        self.publish();
    }

    pub(crate) fn on_round_deadline(&mut self, race_id: u64, round: u32) {
        if !self.is_current(race_id, round) {
            return;
        }

        warn!(
            race_id,
            round,
            timeout = ?self.config.timeout,
            creates_in_flight = self.round_creates,
            "round deadline expired without a winner"
        );
        for candidate in &mut self.candidates {
            if candidate.status.is_pending() {
                candidate.fail("round timed out");
            }
        }
        self.handle_all_failed();
    }

    pub(crate) fn on_teardown_done(&mut self, race_id: u64, round: u32) {
        if !self.is_this_round(race_id, round) {
            return;
        }
        if let Some(pending) = &mut self.teardown {
            *pending = pending.saturating_sub(1);
        }
        self.try_close_round();
    }

    /// Retry or give up once nothing of the failed round is left: every
    /// create has reported back and every destroy batch has returned.
    pub(crate) fn try_close_round(&mut self) {
        if self.teardown != Some(0) || self.round_creates > 0 {
            return;
        }
        self.teardown = None;
        if self.cancelling.is_some() || self.state.status != RaceStatus::Racing {
            return;
        }

        let race_id = self.race_id;
        let round = self.state.current_round;
        let next = round + 1;
        let window = round_window(self.offers.len(), self.config.max_candidates_per_round, next);

        if round < self.config.max_rounds && !window.is_empty() {
            info!(race_id, failed_round = round, next_round = next, "retrying with next offer slice");
            self.start_round(next, window);
        } else {
            warn!(
                race_id,
                rounds = round,
                offers = self.offers.len(),
                "all provisioning attempts failed"
            );
            self.fail_race(RaceFailure::AllAttemptsFailed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn windows_slice_offers_in_order() {
        assert_eq!(round_window(12, 5, 1), 0..5);
        assert_eq!(round_window(12, 5, 2), 5..10);
        assert_eq!(round_window(12, 5, 3), 10..12);
        assert!(round_window(12, 5, 4).is_empty());
    }

    #[test]
    fn window_smaller_than_round_size() {
        assert_eq!(round_window(3, 5, 1), 0..3);
        assert!(round_window(3, 5, 2).is_empty());
    }

    #[test]
    fn empty_offer_list_has_no_windows() {
        assert!(round_window(0, 5, 1).is_empty());
    }

    #[test]
    fn round_zero_is_treated_as_first() {
        assert_eq!(round_window(4, 2, 0), 0..2);
    }
}
