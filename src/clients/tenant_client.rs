use crate::clients::api_client::GlobalApiClient;
use crate::clients::ClientError;
use crate::domain::{GetTenant, GetTenantMethod, ListTenants, ListTenantsMethod, Tenant};
use backbone_core::ApiChannel;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Client for the global instance-management function, the source of the
/// tenant list.
#[derive(Clone)]
pub struct InstanceManagementClient {
    inner: Arc<ApiChannel>,
}

impl InstanceManagementClient {
    pub fn new(inner: Arc<ApiChannel>) -> Self {
        Self { inner }
    }

    #[instrument(skip(self))]
    pub async fn get_tenant(&self, token: &str) -> Result<Tenant, ClientError> {
        debug!("Sending request");
        let request = GetTenant {
            token: token.to_string(),
        };
        self.call::<GetTenantMethod>(&request).await
    }

    #[instrument(skip(self))]
    pub async fn list_tenants(&self) -> Result<Vec<Tenant>, ClientError> {
        debug!("Sending request");
        self.call::<ListTenantsMethod>(&ListTenants::default()).await
    }
}

impl GlobalApiClient for InstanceManagementClient {
    fn inner(&self) -> &Arc<ApiChannel> {
        &self.inner
    }
}
