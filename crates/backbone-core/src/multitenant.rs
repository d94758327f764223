//! # Multitenant API Channel
//!
//! One [`ApiChannel`] (one transport, one connect lifecycle) shared by every
//! tenant of a deployment. Tenancy is call-scoped: [`MultitenantApiChannel::for_tenant`]
//! returns a [`TenantChannel`] that stamps the tenant id and an authorization
//! token into each call's metadata. Creating a tenant wrapper clones two `Arc`s
//! and a tenant id; it never touches the network and is not a lifecycle
//! component.

use crate::channel::{ApiChannel, ApiMethod, StreamHandle, StreamHandler};
use crate::context::InstanceContext;
use crate::error::{BoxError, Result};
use crate::identity::{FunctionIdentifier, ServiceIdentifier, TenantId};
use crate::lifecycle::{Lifecycle, LifecycleComponent};
use crate::transport::{CallMetadata, AUTHORIZATION_METADATA_KEY, TENANT_METADATA_KEY};
use async_trait::async_trait;
use std::sync::Arc;

/// Supplies the opaque token attached to tenant-scoped calls.
pub trait TokenProvider: Send + Sync {
    fn token_for(&self, tenant: &TenantId) -> String;
}

/// Returns the same system token for every tenant.
#[derive(Debug, Clone)]
pub struct StaticTokenProvider {
    token: Arc<str>,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<Arc<str>>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl TokenProvider for StaticTokenProvider {
    fn token_for(&self, _tenant: &TenantId) -> String {
        self.token.to_string()
    }
}

/// Shared channel to a multitenant function.
pub struct MultitenantApiChannel {
    inner: Arc<ApiChannel>,
    tokens: Arc<dyn TokenProvider>,
}

impl MultitenantApiChannel {
    pub fn new(function: FunctionIdentifier, service: ServiceIdentifier, context: InstanceContext) -> Self {
        let tokens = Arc::clone(context.tokens());
        Self::from_channel(ApiChannel::new(function, service, context), tokens)
    }

    pub fn from_channel(channel: ApiChannel, tokens: Arc<dyn TokenProvider>) -> Self {
        Self {
            inner: Arc::new(channel),
            tokens,
        }
    }

    pub fn channel(&self) -> &Arc<ApiChannel> {
        &self.inner
    }

    /// Call-scoped view of the channel for `tenant`.
    pub fn for_tenant(&self, tenant: impl Into<TenantId>) -> TenantChannel {
        TenantChannel {
            channel: Arc::clone(&self.inner),
            tokens: Arc::clone(&self.tokens),
            tenant: tenant.into(),
        }
    }
}

#[async_trait]
impl Lifecycle for MultitenantApiChannel {
    fn component(&self) -> &LifecycleComponent {
        self.inner.component()
    }

    async fn on_initialize(&self) -> std::result::Result<(), BoxError> {
        self.inner.on_initialize().await
    }

    async fn on_start(&self) -> std::result::Result<(), BoxError> {
        self.inner.on_start().await
    }

    async fn on_pause(&self) -> std::result::Result<(), BoxError> {
        self.inner.on_pause().await
    }

    async fn on_resume(&self) -> std::result::Result<(), BoxError> {
        self.inner.on_resume().await
    }

    async fn on_stop(&self) -> std::result::Result<(), BoxError> {
        self.inner.on_stop().await
    }

    async fn on_terminate(&self) -> std::result::Result<(), BoxError> {
        self.inner.on_terminate().await
    }
}

/// Tenant-tagged call surface over a shared [`ApiChannel`].
#[derive(Clone)]
pub struct TenantChannel {
    channel: Arc<ApiChannel>,
    tokens: Arc<dyn TokenProvider>,
    tenant: TenantId,
}

impl TenantChannel {
    pub fn tenant(&self) -> &TenantId {
        &self.tenant
    }

    pub fn channel(&self) -> &Arc<ApiChannel> {
        &self.channel
    }

    /// Metadata every call from this wrapper carries.
    pub fn metadata(&self) -> CallMetadata {
        CallMetadata::new()
            .with(TENANT_METADATA_KEY, self.tenant.as_str())
            .with(AUTHORIZATION_METADATA_KEY, self.tokens.token_for(&self.tenant))
    }

    pub async fn blocking_call<M: ApiMethod>(&self, request: &M::Request) -> Result<M::Response> {
        self.channel.blocking_call::<M>(request, self.metadata()).await
    }

    pub async fn streaming_call<M, H>(&self, request: &M::Request, handler: H) -> Result<StreamHandle>
    where
        M: ApiMethod,
        H: StreamHandler<M::Response>,
    {
        self.channel
            .streaming_call::<M, H>(request, self.metadata(), handler)
            .await
    }
}

impl std::fmt::Debug for TenantChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantChannel")
            .field("tenant", &self.tenant)
            .field("channel", &self.channel.component().name())
            .finish()
    }
}
