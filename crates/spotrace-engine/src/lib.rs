//! spotrace-engine — speculative multi-candidate provisioning races.
//!
//! A race rents the first instance that becomes ready out of several
//! launched at once. Offers are raced in bounded rounds; when a whole
//! round fails its instances are destroyed and the next slice of offers
//! is tried, up to `max_rounds`.
//!
//! # Architecture
//!
//! ```text
//! RaceEngine (facade: start / cancel / complete / reset, watch snapshots)
//!   └── RaceActor (single writer of all race state)
//!       ├── round      — offer windows, deadline, retry vs. terminal failure
//!       ├── candidate  — staggered create calls, one task per candidate
//!       ├── poller     — shared status ticker, first-ready-in-order wins
//!       ├── winner     — freeze race, capture connection info
//!       ├── cleanup    — best-effort destroy of losers / failed rounds
//!       └── timers     — TimerSet owning every background timer
//! ```
//!
//! # Winner uniqueness
//!
//! Race state is only ever written by the actor task, one message at a
//! time. A poll pass is applied in creation order and the round is
//! closed as soon as one candidate is observed ready, so at most one
//! candidate per race ever holds the winning slot. This holds on a
//! multi-threaded runtime; there is no shared check-then-set flag.

mod actor;
mod candidate;
mod cleanup;
pub mod engine;
pub mod error;
pub mod poller;
mod round;
mod timers;
mod winner;

pub use engine::RaceEngine;
pub use error::{RaceError, RaceResult};
pub use poller::{ObservedPhase, observe};
