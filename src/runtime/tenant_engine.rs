//! Per-tenant work hosted by the instance.
//!
//! Every tenant gets a [`TenantEngine`] holding a [`PresenceWatcher`]; the
//! engine follows the instance's lifecycle but a tenant whose watcher fails
//! only fails itself.

use crate::clients::DeviceStateClient;
use crate::domain::{DeviceState, Presence, Tenant};
use async_trait::async_trait;
use backbone_core::{
    BackboneError, BoxError, ComponentType, InstanceContext, Lifecycle, LifecycleComponent, StreamHandle,
    StreamHandler, TenantEngine, TenantId,
};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Keeps a tenant's view of device presence, fed by a device-state watch
/// stream opened on start and cancelled on stop.
pub struct PresenceWatcher {
    node: LifecycleComponent,
    tenant: TenantId,
    client: DeviceStateClient,
    states: Arc<DashMap<String, DeviceState>>,
    watch: Mutex<Option<StreamHandle>>,
}

impl PresenceWatcher {
    pub fn new(tenant: TenantId, client: DeviceStateClient, context: &InstanceContext) -> Self {
        let node = LifecycleComponent::new(
            "presence-watcher",
            ComponentType::Custom("presence-watcher".to_string()),
        )
        .with_error_limit(context.settings().error_stack_limit)
        .with_monitor(Arc::clone(context.monitor()));
        Self {
            node,
            tenant,
            client,
            states: Arc::new(DashMap::new()),
            watch: Mutex::new(None),
        }
    }

    pub fn tenant(&self) -> &TenantId {
        &self.tenant
    }

    pub fn state_of(&self, device_token: &str) -> Option<DeviceState> {
        self.states.get(device_token).map(|s| s.value().clone())
    }

    /// Tokens of the devices currently seen as present, sorted.
    pub fn present_devices(&self) -> Vec<String> {
        let mut present: Vec<String> = self
            .states
            .iter()
            .filter(|s| s.value().presence == Presence::Present)
            .map(|s| s.key().clone())
            .collect();
        present.sort();
        present
    }

    async fn release_watch(&self) {
        let watch = self.watch.lock().take();
        if let Some(watch) = watch {
            watch.cancel().await;
            debug!(tenant = %self.tenant, "Presence watch cancelled");
        }
    }
}

struct PresenceSink {
    tenant: TenantId,
    states: Arc<DashMap<String, DeviceState>>,
}

#[async_trait]
impl StreamHandler<DeviceState> for PresenceSink {
    async fn on_next(&mut self, state: DeviceState) {
        self.states.insert(state.device_token.clone(), state);
    }

    async fn on_error(&mut self, error: BackboneError) {
        warn!(tenant = %self.tenant, %error, "Presence watch failed");
    }

    async fn on_complete(&mut self) {
        debug!(tenant = %self.tenant, devices = self.states.len(), "Presence snapshot loaded");
    }
}

#[async_trait]
impl Lifecycle for PresenceWatcher {
    fn component(&self) -> &LifecycleComponent {
        &self.node
    }

    async fn on_initialize(&self) -> Result<(), BoxError> {
        self.states.clear();
        Ok(())
    }

    async fn on_start(&self) -> Result<(), BoxError> {
        let sink = PresenceSink {
            tenant: self.tenant.clone(),
            states: Arc::clone(&self.states),
        };
        let watch = self
            .client
            .watch_device_states(&self.tenant, Vec::new(), sink)
            .await?;
        *self.watch.lock() = Some(watch);
        info!(tenant = %self.tenant, "Presence watch opened");
        Ok(())
    }

    async fn on_stop(&self) -> Result<(), BoxError> {
        self.release_watch().await;
        Ok(())
    }

    async fn on_terminate(&self) -> Result<(), BoxError> {
        self.release_watch().await;
        self.states.clear();
        Ok(())
    }
}

/// The engine built for one tenant, with handles to its workers.
#[derive(Clone)]
pub struct TenantRuntime {
    pub engine: Arc<TenantEngine>,
    pub presence: Arc<PresenceWatcher>,
}

/// Builds tenant engines for the tenants instance management reports.
#[derive(Clone)]
pub struct TenantEngineBuilder {
    context: InstanceContext,
    device_state: DeviceStateClient,
}

impl TenantEngineBuilder {
    pub fn new(context: InstanceContext, device_state: DeviceStateClient) -> Self {
        Self { context, device_state }
    }

    pub fn build(&self, tenant: &Tenant) -> TenantRuntime {
        let engine = Arc::new(TenantEngine::new(tenant.id(), &self.context));
        let presence = Arc::new(PresenceWatcher::new(
            tenant.id(),
            self.device_state.clone(),
            &self.context,
        ));
        engine.add_component(presence.clone());
        TenantRuntime { engine, presence }
    }
}
