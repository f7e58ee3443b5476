//! spotrace-provider — the provisioning capability behind a race.
//!
//! The race engine talks to a marketplace only through
//! [`ProvisioningApi`]: create one instance, query its status, destroy
//! it. Two implementations ship here:
//!
//! - **`HttpProvider`** — JSON over HTTP/1.1 to a real marketplace API
//! - **`MockProvider`** — deterministic double with configurable latency,
//!   failure rate and forced winner, used by tests and `--dry-run`
//!
//! Provider failures are reported as [`ProviderError`] and classified
//! into [`CreationError`] before they reach race state.

pub mod api;
pub mod error;
pub mod http;
pub mod mock;

pub use api::{InstanceStatus, ProvisioningApi};
pub use error::{CreationError, ProviderError, ProviderResult};
pub use http::{HttpProvider, HttpProviderConfig};
pub use mock::{CreateCall, DestroyCall, ForcedWinner, MockConfig, MockProvider};
