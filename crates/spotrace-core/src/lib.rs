//! spotrace-core — shared types for the provisioning race.
//!
//! - **`types`** — offers, candidates, created instances, race state
//! - **`config`** — `RaceConfig` defaults and `spotrace.toml` parsing

pub mod config;
pub mod types;

pub use config::{
    ConfigError, ConfigResult, MockSection, ProviderKind, ProviderSection, RaceConfig,
    SpotraceConfig, load_offers, parse_duration,
};
pub use types::*;
