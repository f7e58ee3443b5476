//! Domain types for a provisioning race.
//!
//! These types describe the offers a race consumes, the per-attempt
//! candidate state, the instances created along the way, and the
//! race-level state exposed to observers. All types are serializable so
//! snapshots can be logged or shipped to a UI as JSON.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Provider-assigned identifier of a created instance.
pub type InstanceId = String;

/// Marketplace identifier of an offer.
pub type OfferId = String;

/// Progress reported once a create call has been issued.
pub const PROGRESS_CREATING: u8 = 10;
/// Progress reported once the provider has accepted the create.
pub const PROGRESS_CONNECTING: u8 = 30;
/// Progress added per poll that does not observe readiness.
pub const PROGRESS_POLL_STEP: u8 = 10;
/// Polling never pushes progress past this value.
pub const PROGRESS_POLL_CAP: u8 = 90;
/// Progress of the winning candidate.
pub const PROGRESS_READY: u8 = 100;

// ── Offers ─────────────────────────────────────────────────────────

/// An externally supplied, purchasable resource descriptor.
///
/// Offers are ranked and priced by the caller; the race consumes them
/// in the order given.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Offer {
    pub id: OfferId,
    /// Machine spec, e.g. `"RTX_4090"`. Used in instance labels.
    pub spec: String,
    /// Hourly price in the marketplace's currency.
    pub price: f64,
}

impl Offer {
    pub fn new(id: impl Into<OfferId>, spec: impl Into<String>, price: f64) -> Self {
        Self {
            id: id.into(),
            spec: spec.into(),
            price,
        }
    }
}

// ── Candidates ─────────────────────────────────────────────────────

/// Lifecycle of a single acquisition attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateStatus {
    Idle,
    Creating,
    Connecting,
    Connected,
    Ready,
    Failed,
    Cancelled,
}

impl CandidateStatus {
    /// Still in flight: not yet won, failed or cancelled.
    pub fn is_pending(self) -> bool {
        matches!(self, Self::Idle | Self::Creating | Self::Connecting)
    }

    /// Holds the race's single winning slot.
    pub fn is_winning(self) -> bool {
        matches!(self, Self::Ready | Self::Connected)
    }
}

impl fmt::Display for CandidateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Creating => "creating",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Ready => "ready",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// One speculative instance-creation attempt tracked during a round.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candidate {
    pub offer: Offer,
    /// Position within the round; also the creation order.
    pub index: usize,
    pub round: u32,
    pub status: CandidateStatus,
    /// UI progress signal, 0-100. Never decreases while not failed.
    pub progress: u8,
    pub instance_id: Option<InstanceId>,
    pub error_message: Option<String>,
}

impl Candidate {
    pub fn new(offer: Offer, index: usize, round: u32) -> Self {
        Self {
            offer,
            index,
            round,
            status: CandidateStatus::Idle,
            progress: 0,
            instance_id: None,
            error_message: None,
        }
    }

    /// Raise progress to `value`; lower values are ignored.
    pub fn advance_progress(&mut self, value: u8) {
        let value = value.min(PROGRESS_READY);
        if value > self.progress {
            self.progress = value;
        }
    }

    pub fn mark_creating(&mut self) {
        self.status = CandidateStatus::Creating;
        self.advance_progress(PROGRESS_CREATING);
    }

    pub fn mark_connecting(&mut self, instance_id: InstanceId) {
        self.status = CandidateStatus::Connecting;
        self.instance_id = Some(instance_id);
        self.advance_progress(PROGRESS_CONNECTING);
    }

    /// Record a poll that saw the instance alive but not yet running.
    pub fn record_poll(&mut self) {
        let next = self
            .progress
            .saturating_add(PROGRESS_POLL_STEP)
            .min(PROGRESS_POLL_CAP);
        self.advance_progress(next);
    }

    pub fn mark_connected(&mut self) {
        self.status = CandidateStatus::Connected;
        self.advance_progress(PROGRESS_READY);
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        self.status = CandidateStatus::Failed;
        self.error_message = Some(message.into());
    }

    pub fn cancel(&mut self) {
        self.status = CandidateStatus::Cancelled;
    }
}

// ── Created instances ──────────────────────────────────────────────

/// An instance the provider has accepted on behalf of a candidate.
///
/// Every record is eventually either the race winner or destroyed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreatedInstance {
    pub index: usize,
    pub round: u32,
    pub instance_id: InstanceId,
    pub offer_id: OfferId,
}

/// How to reach a provisioned instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
}

/// The candidate that won the race, with its connection details.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RaceWinner {
    pub candidate: Candidate,
    pub connection: Option<ConnectionInfo>,
}

impl RaceWinner {
    pub fn instance_id(&self) -> Option<&str> {
        self.candidate.instance_id.as_deref()
    }
}

// ── Race state ─────────────────────────────────────────────────────

/// Race-level state machine.
///
/// `Idle → Searching → Racing → {Completed | Failed | Cancelled}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RaceStatus {
    Idle,
    Searching,
    Racing,
    Completed,
    Failed,
    Cancelled,
}

impl RaceStatus {
    /// A race is running and owns timers and instances.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Searching | Self::Racing)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for RaceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Searching => "searching",
            Self::Racing => "racing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Why a race ended in `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RaceFailure {
    NoOffersAvailable,
    AllAttemptsFailed,
}

impl fmt::Display for RaceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoOffersAvailable => f.write_str("no offers available"),
            Self::AllAttemptsFailed => f.write_str("all provisioning attempts failed"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RaceState {
    pub status: RaceStatus,
    /// 1-based; 0 before the first round starts.
    pub current_round: u32,
    pub winner: Option<RaceWinner>,
    pub error: Option<RaceFailure>,
    pub elapsed: Duration,
}

impl Default for RaceState {
    fn default() -> Self {
        Self {
            status: RaceStatus::Idle,
            current_round: 0,
            winner: None,
            error: None,
            elapsed: Duration::ZERO,
        }
    }
}

/// Read-only view of a race, published on every change.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RaceSnapshot {
    pub state: RaceState,
    pub candidates: Vec<Candidate>,
    pub created_instances: Vec<CreatedInstance>,
}

impl RaceSnapshot {
    /// Number of candidates holding the winning slot. Never above one.
    pub fn winning_count(&self) -> usize {
        self.candidates
            .iter()
            .filter(|c| c.status.is_winning())
            .count()
    }

    pub fn candidates_with(&self, status: CandidateStatus) -> usize {
        self.candidates.iter().filter(|c| c.status == status).count()
    }
}
