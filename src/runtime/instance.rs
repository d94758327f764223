use crate::clients::{
    AssetClient, BatchOperationsClient, ClientError, DeviceStateClient, GlobalApiClient, InstanceManagementClient,
    TenantApiClient,
    ASSET_CACHE,
};
use crate::domain::{ApiEndpoint, Tenant};
use crate::runtime::tenant_engine::{TenantEngineBuilder, TenantRuntime};
use backbone_core::transport::TransportConnector;
use backbone_core::{
    ApiChannel, BackboneError, CacheProvider, FunctionIdentifier, InstanceContext, InstanceSettings, InstanceState,
    Lifecycle, Microservice, MultitenantApiChannel, ServiceRegistry, TenantId, TokenProvider,
};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Name of the microservice this process runs as.
pub const HOST_FUNCTION: &str = "event-processing";

/// Errors from bringing the instance or one of its tenants up or down.
#[derive(Debug, Error)]
pub enum InstanceError {
    #[error("Lifecycle error: {0}")]
    Lifecycle(#[from] BackboneError),

    #[error("Client error: {0}")]
    Client(#[from] ClientError),

    #[error("Background task failed: {0}")]
    Task(String),
}

/// Credentials of the tenants the instance currently serves.
///
/// Tenants without a credential get an empty token, which the platform
/// functions refuse.
#[derive(Debug, Default)]
pub struct TenantTokens {
    tokens: DashMap<TenantId, String>,
}

impl TenantTokens {
    pub fn insert(&self, tenant: TenantId, token: impl Into<String>) {
        self.tokens.insert(tenant, token.into());
    }

    pub fn remove(&self, tenant: &TenantId) {
        self.tokens.remove(tenant);
    }
}

impl TokenProvider for TenantTokens {
    fn token_for(&self, tenant: &TenantId) -> String {
        self.tokens
            .get(tenant)
            .map(|token| token.value().clone())
            .unwrap_or_default()
    }
}

/// The runtime orchestrator of one microservice instance.
///
/// `DeviceInstance` is responsible for:
/// - **Wiring**: one channel per platform function, all under the instance
///   microservice so they share its lifecycle
/// - **Tenants**: one tenant engine per tenant known to instance management,
///   added and removed while the instance runs
/// - **Background work**: cache sweeping and registry watching, stopped on
///   shutdown
///
/// # Example
///
/// ```ignore
/// let instance = DeviceInstance::new(settings, connector);
/// instance.start().await?;
/// instance.bootstrap_tenants().await?;
///
/// let state = instance.device_state.get_device_state(&tenant, "d-1").await?;
///
/// instance.shutdown().await?;
/// ```
pub struct DeviceInstance {
    /// Client for the device-state function
    pub device_state: DeviceStateClient,

    /// Client for the batch-operations function
    pub batch_operations: BatchOperationsClient,

    /// Client for asset management, cached
    pub assets: AssetClient,

    /// Client for instance management (tenant registry)
    pub instance_management: InstanceManagementClient,

    context: InstanceContext,
    microservice: Arc<Microservice>,
    tokens: Arc<TenantTokens>,
    engines: TenantEngineBuilder,
    tenants: DashMap<TenantId, TenantRuntime>,
    cancel: CancellationToken,
    background: Mutex<Vec<JoinHandle<()>>>,
}

impl DeviceInstance {
    /// Instance resolving functions through cluster DNS.
    pub fn new(settings: InstanceSettings, connector: Arc<dyn TransportConnector>) -> Self {
        let tokens = Arc::new(TenantTokens::default());
        let context = InstanceContext::new(settings, connector).with_tokens(tokens.clone());
        Self::assemble(context, tokens)
    }

    /// Instance resolving functions through `registry`.
    pub fn with_registry(
        settings: InstanceSettings,
        registry: Arc<dyn ServiceRegistry>,
        connector: Arc<dyn TransportConnector>,
    ) -> Self {
        let tokens = Arc::new(TenantTokens::default());
        let context = InstanceContext::with_registry(settings, registry, connector).with_tokens(tokens.clone());
        Self::assemble(context, tokens)
    }

    fn assemble(context: InstanceContext, tokens: Arc<TenantTokens>) -> Self {
        let microservice = Arc::new(Microservice::new(
            FunctionIdentifier::multitenant(HOST_FUNCTION),
            &context,
        ));

        let multitenant = |endpoint: ApiEndpoint| {
            Arc::new(MultitenantApiChannel::new(
                endpoint.function,
                endpoint.service,
                context.clone(),
            ))
        };
        let device_state = DeviceStateClient::new(multitenant(ApiEndpoint::device_state()));
        let batch_operations = BatchOperationsClient::new(multitenant(ApiEndpoint::batch_operations()));
        let asset_cache = Arc::new(CacheProvider::with_context(ASSET_CACHE, &context));
        let assets = AssetClient::new(multitenant(ApiEndpoint::asset_management()), asset_cache);

        let global = ApiEndpoint::instance_management();
        let instance_management = InstanceManagementClient::new(Arc::new(ApiChannel::new(
            global.function,
            global.service,
            context.clone(),
        )));

        // Declaration order is start order
        microservice.add_component(instance_management.lifecycle());
        microservice.add_component(device_state.lifecycle());
        microservice.add_component(batch_operations.lifecycle());
        microservice.add_component(assets.lifecycle());
        microservice.add_component(assets.cache_lifecycle());

        let engines = TenantEngineBuilder::new(context.clone(), device_state.clone());
        Self {
            device_state,
            batch_operations,
            assets,
            instance_management,
            context,
            microservice,
            tokens,
            engines,
            tenants: DashMap::new(),
            cancel: CancellationToken::new(),
            background: Mutex::new(Vec::new()),
        }
    }

    pub fn context(&self) -> &InstanceContext {
        &self.context
    }

    pub fn microservice(&self) -> &Arc<Microservice> {
        &self.microservice
    }

    /// Initializes and starts every channel and cache, then the background tasks.
    pub async fn start(&self) -> Result<(), InstanceError> {
        info!(instance = %self.context.settings().instance_id, "Starting instance");
        self.microservice.initialize().await?;
        self.microservice.start().await?;

        let mut background = self.background.lock();
        let cache = self.assets.cache();
        let ttl = cache.config().ttl();
        if cache.config().enabled && !ttl.is_zero() {
            background.push(cache.spawn_sweeper(ttl, self.cancel.child_token()));
        }
        if let Some(watch) = self.context.locator().watch(self.cancel.child_token()) {
            background.push(watch);
        }
        info!(status = ?self.microservice.status(), "Instance started");
        Ok(())
    }

    /// Adds an engine for every tenant instance management knows about.
    ///
    /// A tenant whose engine fails to come up is logged and kept, in its
    /// error state, so it shows up in [`DeviceInstance::state`]. Returns how
    /// many tenants came up cleanly.
    pub async fn bootstrap_tenants(&self) -> Result<usize, InstanceError> {
        let tenants = self.instance_management.list_tenants().await?;
        let mut started = 0;
        for tenant in &tenants {
            match self.add_tenant(tenant).await {
                Ok(_) => started += 1,
                Err(e) => warn!(tenant = %tenant.token, error = %e, "Tenant engine failed to start"),
            }
        }
        info!(tenants = tenants.len(), started, "Tenants bootstrapped");
        Ok(started)
    }

    /// Registers the tenant's credential and runs an engine for it.
    ///
    /// The engine is kept even when it fails to come up.
    pub async fn add_tenant(&self, tenant: &Tenant) -> Result<TenantRuntime, InstanceError> {
        let id = tenant.id();
        self.tokens.insert(id.clone(), tenant.authentication_token.as_str());
        let runtime = self.engines.build(tenant);
        self.tenants.insert(id, runtime.clone());
        self.microservice.add_tenant_engine(runtime.engine.clone()).await?;
        Ok(runtime)
    }

    /// Stops and drops the tenant's engine and forgets its credential.
    pub async fn remove_tenant(&self, tenant: &TenantId) -> Option<TenantRuntime> {
        self.microservice.remove_tenant_engine(tenant).await;
        self.tokens.remove(tenant);
        self.assets.cache().clear_tenant(tenant);
        self.tenants.remove(tenant).map(|(_, runtime)| runtime)
    }

    pub fn tenant(&self, tenant: &TenantId) -> Option<TenantRuntime> {
        self.tenants.get(tenant).map(|runtime| runtime.value().clone())
    }

    /// Snapshot of the whole instance.
    pub fn state(&self) -> InstanceState {
        InstanceState::aggregate(
            self.context.settings().instance_id.as_str(),
            vec![self.microservice.state()],
        )
    }

    /// Gracefully shuts the instance down.
    ///
    /// Stops background tasks, then stops and terminates the microservice
    /// (tenant engines first, then shared components in reverse order).
    pub async fn shutdown(self) -> Result<(), InstanceError> {
        info!("Shutting down instance...");
        self.cancel.cancel();

        self.microservice.stop().await?;
        self.microservice.terminate().await?;

        let background = std::mem::take(&mut *self.background.lock());
        for handle in background {
            if let Err(e) = handle.await {
                error!("Background task failed: {:?}", e);
                return Err(InstanceError::Task(e.to_string()));
            }
        }

        info!("Instance shutdown complete.");
        Ok(())
    }
}
