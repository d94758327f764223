use crate::clients::api_client::TenantApiClient;
use crate::clients::ClientError;
use crate::domain::{Asset, GetAsset, GetAssetMethod};
use backbone_core::{CacheProvider, Lifecycle, MultitenantApiChannel, TenantId};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Name of the asset lookup cache in the instance settings.
pub const ASSET_CACHE: &str = "asset-lookup";

/// Client for the asset-management function, with a per-tenant lookup cache
/// in front of it.
#[derive(Clone)]
pub struct AssetClient {
    inner: Arc<MultitenantApiChannel>,
    cache: Arc<CacheProvider<String, Asset>>,
}

impl AssetClient {
    pub fn new(inner: Arc<MultitenantApiChannel>, cache: Arc<CacheProvider<String, Asset>>) -> Self {
        Self { inner, cache }
    }

    pub fn cache(&self) -> &Arc<CacheProvider<String, Asset>> {
        &self.cache
    }

    /// The cache as a lifecycle component; the channel comes from
    /// [`TenantApiClient::lifecycle`].
    pub fn cache_lifecycle(&self) -> Arc<dyn Lifecycle> {
        self.cache.clone()
    }

    /// Cached lookup; a miss goes to asset management and stores the answer.
    #[instrument(skip(self))]
    pub async fn get_asset(&self, tenant: &TenantId, token: &str) -> Result<Asset, ClientError> {
        self.cache
            .get_or_try_insert_with(tenant, token.to_string(), move || async move {
                debug!("Cache miss, sending request");
                let request = GetAsset {
                    token: token.to_string(),
                };
                self.call::<GetAssetMethod>(tenant, &request).await
            })
            .await
    }

    /// Drops the cached copy so the next lookup goes remote.
    pub fn invalidate(&self, tenant: &TenantId, token: &str) {
        self.cache.remove(tenant, &token.to_string());
    }
}

impl TenantApiClient for AssetClient {
    fn inner(&self) -> &Arc<MultitenantApiChannel> {
        &self.inner
    }
}
