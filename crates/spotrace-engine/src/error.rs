//! Race engine error types.

use thiserror::Error;

use spotrace_core::{ConfigError, RaceFailure, RaceStatus};

/// Errors returned by [`RaceEngine`](crate::RaceEngine) commands.
#[derive(Debug, Error)]
pub enum RaceError {
    #[error("no offers available")]
    NoOffersAvailable,

    #[error("all provisioning attempts failed")]
    AllAttemptsFailed,

    #[error("race was cancelled")]
    Cancelled,

    #[error("cannot {command} while race is {status}")]
    InvalidTransition {
        command: &'static str,
        status: RaceStatus,
    },

    #[error("invalid race config: {0}")]
    Config(#[from] ConfigError),

    #[error("race engine stopped")]
    EngineStopped,
}

impl From<RaceFailure> for RaceError {
    fn from(failure: RaceFailure) -> Self {
        match failure {
            RaceFailure::NoOffersAvailable => RaceError::NoOffersAvailable,
            RaceFailure::AllAttemptsFailed => RaceError::AllAttemptsFailed,
        }
    }
}

pub type RaceResult<T> = Result<T, RaceError>;
