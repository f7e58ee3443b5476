//! Deterministic in-process provisioning backend.
//!
//! `MockProvider` stands in for a marketplace in tests and dry runs.
//! Behaviour is fully determined by its [`MockConfig`]: per-call
//! latency, a seeded creation failure rate, explicitly failing offers,
//! and a forced winner that turns `running` a fixed delay after it was
//! created. Every other instance stays `loading` forever.
//!
//! All timing uses `tokio::time`, so tests running with a paused clock
//! see exact, reproducible schedules.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use spotrace_core::{ConnectionInfo, InstanceId, Offer, OfferId};

use crate::api::{InstanceStatus, ProvisioningApi};
use crate::error::{CreationError, ProviderError, ProviderResult};

/// Which winner the mock should produce, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForcedWinner {
    /// The n-th create call (0-based, counted across rounds).
    CallIndex(usize),
    /// Several create calls at once; the race decides between them.
    CallIndices(Vec<usize>),
    /// Any instance created for this offer.
    Offer(OfferId),
}

#[derive(Debug, Clone)]
pub struct MockConfig {
    /// Delay applied to every call before it is answered.
    pub latency: Duration,
    /// Probability in `[0, 1]` that a create call fails.
    pub failure_rate: f64,
    pub seed: u64,
    /// Offers whose create calls always fail.
    pub failing_offers: HashSet<OfferId>,
    /// Classification of injected create failures.
    pub failure: CreationError,
    pub winner: Option<ForcedWinner>,
    /// Time from create to `running` for the forced winner.
    pub ready_after: Duration,
    /// Status queries fail for these instance ordinals.
    pub flaky_status: HashSet<usize>,
    /// Instances with these ordinals report `exited`.
    pub exited: HashSet<usize>,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            latency: Duration::ZERO,
            failure_rate: 0.0,
            seed: 0x5eed,
            failing_offers: HashSet::new(),
            failure: CreationError::Unknown,
            winner: None,
            ready_after: Duration::from_secs(3),
            flaky_status: HashSet::new(),
            exited: HashSet::new(),
        }
    }
}

/// A create call as observed by the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateCall {
    pub offer_id: OfferId,
    pub label: String,
    pub at: Instant,
    /// Position in the mock's global call log.
    pub seq: u64,
}

/// A destroy call as observed by the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestroyCall {
    pub instance_id: InstanceId,
    pub at: Instant,
    pub seq: u64,
}

#[derive(Debug)]
struct MockInstance {
    ordinal: usize,
    ready_at: Option<Instant>,
    destroyed: bool,
}

#[derive(Debug)]
struct MockState {
    rng: StdRng,
    next_id: u64,
    next_seq: u64,
    create_calls: Vec<CreateCall>,
    status_calls: usize,
    destroy_calls: Vec<DestroyCall>,
    instances: HashMap<InstanceId, MockInstance>,
}

pub struct MockProvider {
    config: MockConfig,
    state: Mutex<MockState>,
}

impl MockProvider {
    pub fn new(config: MockConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            config,
            state: Mutex::new(MockState {
                rng,
                next_id: 1,
                next_seq: 0,
                create_calls: Vec::new(),
                status_calls: 0,
                destroy_calls: Vec::new(),
                instances: HashMap::new(),
            }),
        }
    }

    /// Mock whose create calls all fail with `failure`.
    pub fn always_failing(failure: CreationError) -> Self {
        Self::new(MockConfig {
            failure_rate: 1.0,
            failure,
            ..Default::default()
        })
    }

    /// Mock where the `index`-th create call becomes ready after `ready_after`.
    pub fn with_winner(index: usize, ready_after: Duration) -> Self {
        Self::new(MockConfig {
            winner: Some(ForcedWinner::CallIndex(index)),
            ready_after,
            ..Default::default()
        })
    }

    pub fn config(&self) -> &MockConfig {
        &self.config
    }

    pub async fn create_calls(&self) -> Vec<CreateCall> {
        self.state.lock().await.create_calls.clone()
    }

    pub async fn create_count(&self) -> usize {
        self.state.lock().await.create_calls.len()
    }

    pub async fn status_count(&self) -> usize {
        self.state.lock().await.status_calls
    }

    /// Destroy requests in arrival order (repeats included).
    pub async fn destroy_calls(&self) -> Vec<DestroyCall> {
        self.state.lock().await.destroy_calls.clone()
    }

    /// Instances created and not yet destroyed, sorted by id.
    pub async fn live_instances(&self) -> Vec<InstanceId> {
        let state = self.state.lock().await;
        let mut live: Vec<_> = state
            .instances
            .iter()
            .filter(|(_, inst)| !inst.destroyed)
            .map(|(id, _)| id.clone())
            .collect();
        live.sort();
        live
    }

    fn injected_failure(&self) -> ProviderError {
        let (status, body) = match self.config.failure {
            CreationError::AuthError => (401, "invalid api key"),
            CreationError::InsufficientBalance => (402, "insufficient balance"),
            CreationError::RateLimited => (429, "too many requests"),
            CreationError::Unknown => (500, "offer no longer available"),
        };
        ProviderError::Http {
            status,
            body: body.to_string(),
        }
    }

    fn is_winner(&self, ordinal: usize, offer: &Offer) -> bool {
        match &self.config.winner {
            Some(ForcedWinner::CallIndex(i)) => *i == ordinal,
            Some(ForcedWinner::CallIndices(indices)) => indices.contains(&ordinal),
            Some(ForcedWinner::Offer(id)) => *id == offer.id,
            None => false,
        }
    }

    async fn delay(&self) {
        if !self.config.latency.is_zero() {
            tokio::time::sleep(self.config.latency).await;
        }
    }
}

fn connection_for(ordinal: usize) -> ConnectionInfo {
    ConnectionInfo {
        host: format!("10.0.{}.{}", ordinal / 250, ordinal % 250 + 1),
        port: 22_000 + (ordinal % 1000) as u16,
        username: Some("root".to_string()),
    }
}

#[async_trait]
impl ProvisioningApi for MockProvider {
    async fn create_instance(&self, offer: &Offer, label: &str) -> ProviderResult<InstanceId> {
        let ordinal = {
            let mut state = self.state.lock().await;
            let seq = state.next_seq;
            state.next_seq += 1;
            state.create_calls.push(CreateCall {
                offer_id: offer.id.clone(),
                label: label.to_string(),
                at: Instant::now(),
                seq,
            });
            state.create_calls.len() - 1
        };

        self.delay().await;

        let mut state = self.state.lock().await;
        let roll_fails =
            self.config.failure_rate > 0.0 && state.rng.random_bool(self.config.failure_rate.min(1.0));
        if roll_fails || self.config.failing_offers.contains(&offer.id) {
            debug!(offer = %offer.id, ordinal, "mock create failing");
            return Err(self.injected_failure());
        }

        let id = format!("mock-{}", state.next_id);
        state.next_id += 1;
        let ready_at = self
            .is_winner(ordinal, offer)
            .then(|| Instant::now() + self.config.ready_after);
        state.instances.insert(
            id.clone(),
            MockInstance {
                ordinal,
                ready_at,
                destroyed: false,
            },
        );
        debug!(offer = %offer.id, instance = %id, ordinal, "mock instance created");
        Ok(id)
    }

    async fn get_instance_status(&self, instance_id: &str) -> ProviderResult<InstanceStatus> {
        self.delay().await;

        let mut state = self.state.lock().await;
        state.status_calls += 1;
        let inst = state.instances.get(instance_id).ok_or_else(|| ProviderError::Http {
            status: 404,
            body: format!("no such instance {instance_id}"),
        })?;

        if self.config.flaky_status.contains(&inst.ordinal) {
            return Err(ProviderError::Transport("connection reset".to_string()));
        }
        if inst.destroyed {
            return Ok(InstanceStatus::new("destroyed"));
        }
        if self.config.exited.contains(&inst.ordinal) {
            return Ok(InstanceStatus::new("exited"));
        }
        match inst.ready_at {
            Some(at) if Instant::now() >= at => {
                Ok(InstanceStatus::new("running").with_connection(connection_for(inst.ordinal)))
            }
            _ => Ok(InstanceStatus::new("loading")),
        }
    }

    async fn destroy_instance(&self, instance_id: &str) -> ProviderResult<bool> {
        self.delay().await;

        let mut state = self.state.lock().await;
        let seq = state.next_seq;
        state.next_seq += 1;
        state.destroy_calls.push(DestroyCall {
            instance_id: instance_id.to_string(),
            at: Instant::now(),
            seq,
        });
        match state.instances.get_mut(instance_id) {
            Some(inst) => {
                inst.destroyed = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
