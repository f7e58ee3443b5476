//! Race configuration and `spotrace.toml` parsing.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::Offer;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid offer list: {0}")]
    Offers(#[from] serde_json::Error),

    #[error("invalid duration for {field}: {value:?}")]
    InvalidDuration { field: &'static str, value: String },

    #[error("invalid race config: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Tunables for the race engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaceConfig {
    /// Upper bound on candidates launched per round.
    pub max_candidates_per_round: usize,
    /// Rounds attempted before the race fails.
    pub max_rounds: u32,
    /// Interval of the shared status poller.
    pub poll_interval: Duration,
    /// Deadline for a single round.
    pub timeout: Duration,
    /// Stagger between consecutive create calls within a round.
    pub create_delay: Duration,
}

impl Default for RaceConfig {
    fn default() -> Self {
        Self {
            max_candidates_per_round: 5,
            max_rounds: 3,
            poll_interval: Duration::from_millis(3000),
            timeout: Duration::from_millis(300_000),
            create_delay: Duration::from_millis(500),
        }
    }
}

impl RaceConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_candidates_per_round == 0 {
            return Err(ConfigError::Invalid(
                "max_candidates_per_round must be at least 1".to_string(),
            ));
        }
        if self.max_rounds == 0 {
            return Err(ConfigError::Invalid(
                "max_rounds must be at least 1".to_string(),
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "poll_interval must be non-zero".to_string(),
            ));
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::Invalid("timeout must be non-zero".to_string()));
        }
        Ok(())
    }
}

// ── spotrace.toml ──────────────────────────────────────────────────

/// Top-level layout of `spotrace.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpotraceConfig {
    pub race: Option<RaceSection>,
    pub provider: Option<ProviderSection>,
}

/// `[race]`: every key optional, durations as `"3s"`, `"500ms"`, `"5m"`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RaceSection {
    pub max_candidates_per_round: Option<usize>,
    pub max_rounds: Option<u32>,
    pub poll_interval: Option<String>,
    pub timeout: Option<String>,
    pub create_delay: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    #[default]
    Http,
    Mock,
}

/// `[provider]`: which provisioning backend to race against.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderSection {
    #[serde(default)]
    pub kind: ProviderKind,
    /// Base URL of the provisioning API, e.g. `http://127.0.0.1:8080/v1`.
    pub base_url: Option<String>,
    /// Environment variable holding the bearer token.
    pub api_key_env: Option<String>,
    pub request_timeout: Option<String>,
    pub mock: Option<MockSection>,
}

/// `[provider.mock]`: knobs for the in-process test double.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MockSection {
    pub latency: Option<String>,
    pub failure_rate: Option<f64>,
    pub seed: Option<u64>,
    pub winner_index: Option<usize>,
    pub winner_offer: Option<String>,
    pub ready_after: Option<String>,
}

impl SpotraceConfig {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Resolve the `[race]` section over the defaults and validate it.
    pub fn race_config(&self) -> ConfigResult<RaceConfig> {
        let mut config = RaceConfig::default();
        if let Some(race) = &self.race {
            if let Some(n) = race.max_candidates_per_round {
                config.max_candidates_per_round = n;
            }
            if let Some(n) = race.max_rounds {
                config.max_rounds = n;
            }
            if let Some(d) = duration_field("poll_interval", race.poll_interval.as_deref())? {
                config.poll_interval = d;
            }
            if let Some(d) = duration_field("timeout", race.timeout.as_deref())? {
                config.timeout = d;
            }
            if let Some(d) = duration_field("create_delay", race.create_delay.as_deref())? {
                config.create_delay = d;
            }
        }
        config.validate()?;
        Ok(config)
    }
}

/// Parse an optional duration field, naming the field on failure.
pub fn duration_field(field: &'static str, value: Option<&str>) -> ConfigResult<Option<Duration>> {
    match value {
        None => Ok(None),
        Some(v) => parse_duration(v)
            .map(Some)
            .ok_or_else(|| ConfigError::InvalidDuration {
                field,
                value: v.to_string(),
            }),
    }
}

/// Parse a duration string like "5s", "500ms", "2m". A bare number is seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.trim().parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.trim().parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.trim()
            .parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}

/// Load a JSON array of offers, in race order.
pub fn load_offers(path: &Path) -> ConfigResult<Vec<Offer>> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    Ok(serde_json::from_str(&content)?)
}
