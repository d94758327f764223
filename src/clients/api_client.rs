use crate::clients::ClientError;
use backbone_core::transport::CallMetadata;
use backbone_core::{
    ApiChannel, ApiMethod, BackboneError, Lifecycle, LifecycleStatus, MultitenantApiChannel, StreamHandle,
    StreamHandler, TenantId,
};
use async_trait::async_trait;
use std::sync::Arc;

/// Shared surface of clients for multitenant functions.
///
/// Implementors supply the channel; every call goes out tagged with the tenant
/// it is made for.
#[async_trait]
pub trait TenantApiClient: Send + Sync {
    /// Access the shared multitenant channel.
    fn inner(&self) -> &Arc<MultitenantApiChannel>;

    /// Map channel errors to client errors.
    fn map_error(e: BackboneError) -> ClientError {
        ClientError::from(e)
    }

    /// The channel as a lifecycle component, for wiring into a component tree.
    fn lifecycle(&self) -> Arc<dyn Lifecycle> {
        self.inner().clone()
    }

    fn status(&self) -> LifecycleStatus {
        self.inner().status()
    }

    /// Unary call of `M` on behalf of `tenant`.
    #[tracing::instrument(skip_all, fields(tenant = %tenant, method = M::NAME))]
    async fn call<M: ApiMethod>(&self, tenant: &TenantId, request: &M::Request) -> Result<M::Response, ClientError> {
        tracing::debug!("Sending request");
        self.inner()
            .for_tenant(tenant.clone())
            .blocking_call::<M>(request)
            .await
            .map_err(Self::map_error)
    }

    /// Server stream of `M` on behalf of `tenant`, delivered to `handler`.
    #[tracing::instrument(skip_all, fields(tenant = %tenant, method = M::NAME))]
    async fn stream<M, H>(&self, tenant: &TenantId, request: &M::Request, handler: H) -> Result<StreamHandle, ClientError>
    where
        M: ApiMethod,
        H: StreamHandler<M::Response>,
    {
        tracing::debug!("Opening stream");
        self.inner()
            .for_tenant(tenant.clone())
            .streaming_call::<M, H>(request, handler)
            .await
            .map_err(Self::map_error)
    }
}

/// Shared surface of clients for global (tenant-less) functions.
#[async_trait]
pub trait GlobalApiClient: Send + Sync {
    /// Access the underlying channel.
    fn inner(&self) -> &Arc<ApiChannel>;

    /// Map channel errors to client errors.
    fn map_error(e: BackboneError) -> ClientError {
        ClientError::from(e)
    }

    fn lifecycle(&self) -> Arc<dyn Lifecycle> {
        self.inner().clone()
    }

    fn status(&self) -> LifecycleStatus {
        self.inner().status()
    }

    /// Unary call of `M` with no tenant attached.
    #[tracing::instrument(skip_all, fields(method = M::NAME))]
    async fn call<M: ApiMethod>(&self, request: &M::Request) -> Result<M::Response, ClientError> {
        tracing::debug!("Sending request");
        self.inner()
            .blocking_call::<M>(request, CallMetadata::new())
            .await
            .map_err(Self::map_error)
    }
}
