//! Provider error types and creation-failure classification.

use thiserror::Error;

/// Raw failures reported by a provisioning backend.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out")]
    Timeout,

    #[error("malformed provider response: {0}")]
    Decode(String),

    #[error("invalid provider URL: {0}")]
    InvalidUrl(String),
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Classified, user-facing reason a create call failed.
///
/// Raw provider bodies stop at classification; only these messages
/// reach race state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum CreationError {
    #[error("authentication failed")]
    AuthError,

    #[error("insufficient balance")]
    InsufficientBalance,

    #[error("rate limited by provider")]
    RateLimited,

    #[error("instance creation failed")]
    Unknown,
}

impl ProviderError {
    /// Map a provider failure onto the creation-error taxonomy.
    ///
    /// Status codes decide first; response text is consulted for
    /// backends that report everything as 400/500.
    pub fn classify(&self) -> CreationError {
        match self {
            ProviderError::Http { status, body } => match status {
                401 | 403 => CreationError::AuthError,
                402 => CreationError::InsufficientBalance,
                429 => CreationError::RateLimited,
                _ => classify_text(body),
            },
            ProviderError::Transport(msg) | ProviderError::Decode(msg) => classify_text(msg),
            ProviderError::Timeout | ProviderError::InvalidUrl(_) => CreationError::Unknown,
        }
    }
}

fn classify_text(text: &str) -> CreationError {
    let text = text.to_ascii_lowercase();
    if text.contains("unauthorized") || text.contains("api key") || text.contains("forbidden") {
        CreationError::AuthError
    } else if text.contains("insufficient") || text.contains("balance") || text.contains("credit") {
        CreationError::InsufficientBalance
    } else if text.contains("rate limit") || text.contains("too many requests") {
        CreationError::RateLimited
    } else {
        CreationError::Unknown
    }
}
