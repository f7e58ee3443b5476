//! The provisioning capability consumed by the race engine.

use async_trait::async_trait;

use spotrace_core::{ConnectionInfo, InstanceId, Offer};

use crate::error::ProviderResult;

/// Provider-reported state of one instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceStatus {
    /// Raw provider state, e.g. `"running"`, `"loading"`, `"exited"`.
    pub status: String,
    /// Present once the provider has assigned an address.
    pub connection: Option<ConnectionInfo>,
}

impl InstanceStatus {
    pub fn new(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            connection: None,
        }
    }

    pub fn with_connection(mut self, connection: ConnectionInfo) -> Self {
        self.connection = Some(connection);
        self
    }
}

/// Create, query and destroy single instances on a marketplace.
///
/// Every call may take arbitrarily long and may complete out of order
/// relative to other calls. `destroy_instance` must be idempotent.
#[async_trait]
pub trait ProvisioningApi: Send + Sync {
    /// Rent `offer`, tagging the instance with `label`.
    async fn create_instance(&self, offer: &Offer, label: &str) -> ProviderResult<InstanceId>;

    async fn get_instance_status(&self, instance_id: &str) -> ProviderResult<InstanceStatus>;

    /// Returns `true` when the instance is gone (or was already gone).
    async fn destroy_instance(&self, instance_id: &str) -> ProviderResult<bool>;
}
