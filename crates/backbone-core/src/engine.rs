//! # Microservices & Tenant Engines
//!
//! Roots of the component trees a microservice instance hosts:
//!
//! ```text
//! Microservice (function root)
//! ├── shared components (channels, caches, ...)      children, cascaded
//! └── tenant engines, keyed by tenant                managed, not children
//!     └── TenantEngine (tenant root)
//!         └── per-tenant components                  children, cascaded
//! ```
//!
//! Tenant engines follow the microservice's transitions (after its shared
//! components for `initialize`/`start`/`resume`, before them for
//! `pause`/`stop`/`terminate`) but a failing tenant engine only fails itself:
//! the error lands in that engine's error stack and the microservice keeps
//! going. Engines can be added and removed while the microservice runs; an
//! added engine is brought up to the microservice's current status.

use crate::context::InstanceContext;
use crate::error::{BackboneError, Result};
use crate::identity::{FunctionIdentifier, TenantId};
use crate::lifecycle::engine::drive_with;
use crate::lifecycle::{ComponentType, Lifecycle, LifecycleComponent, LifecycleOperation, LifecycleStatus};
use crate::state::{ComponentStateSnapshot, MicroserviceState, TenantEngineState};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Plain grouping node with no behavior of its own.
#[derive(Debug)]
pub struct CompositeComponent {
    node: LifecycleComponent,
}

impl CompositeComponent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            node: LifecycleComponent::new(name, ComponentType::Composite),
        }
    }

    pub fn with_context(name: impl Into<String>, context: &InstanceContext) -> Self {
        Self {
            node: node_for(name.into(), ComponentType::Composite, context),
        }
    }

    pub fn add(&self, child: Arc<dyn Lifecycle>) {
        self.node.add_child(child);
    }
}

#[async_trait]
impl Lifecycle for CompositeComponent {
    fn component(&self) -> &LifecycleComponent {
        &self.node
    }
}

/// Per-tenant runtime context within one microservice.
#[derive(Debug)]
pub struct TenantEngine {
    node: LifecycleComponent,
    tenant: TenantId,
}

impl TenantEngine {
    pub fn new(tenant: TenantId, context: &InstanceContext) -> Self {
        Self {
            node: node_for(tenant.to_string(), ComponentType::TenantEngine, context),
            tenant,
        }
    }

    pub fn tenant(&self) -> &TenantId {
        &self.tenant
    }

    pub fn add_component(&self, component: Arc<dyn Lifecycle>) {
        self.node.add_child(component);
    }

    pub fn state(&self) -> TenantEngineState {
        TenantEngineState::capture(self.tenant.clone(), self)
    }
}

#[async_trait]
impl Lifecycle for TenantEngine {
    fn component(&self) -> &LifecycleComponent {
        &self.node
    }
}

/// Root of one microservice: shared components plus its tenant engines.
#[derive(Debug)]
pub struct Microservice {
    node: LifecycleComponent,
    function: FunctionIdentifier,
    tenant_engines: RwLock<BTreeMap<TenantId, Arc<TenantEngine>>>,
}

impl Microservice {
    pub fn new(function: FunctionIdentifier, context: &InstanceContext) -> Self {
        Self {
            node: node_for(function.to_string(), ComponentType::Microservice, context),
            function,
            tenant_engines: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn function(&self) -> &FunctionIdentifier {
        &self.function
    }

    /// Adds a shared (tenant-independent) component.
    pub fn add_component(&self, component: Arc<dyn Lifecycle>) {
        self.node.add_child(component);
    }

    pub fn tenant_engine(&self, tenant: &TenantId) -> Option<Arc<TenantEngine>> {
        self.tenant_engines.read().get(tenant).cloned()
    }

    /// Tenant engines ordered by tenant id.
    pub fn tenant_engines(&self) -> Vec<Arc<TenantEngine>> {
        self.tenant_engines.read().values().cloned().collect()
    }

    /// Registers a tenant engine, replacing any previous engine for the same
    /// tenant. When the microservice is initialized, started or paused the
    /// engine is driven to the same status right away; a failure there is
    /// recorded on the engine and returned, and the engine stays registered.
    pub async fn add_tenant_engine(&self, engine: Arc<TenantEngine>) -> Result<()> {
        let tenant = engine.tenant().clone();
        let previous = self
            .tenant_engines
            .write()
            .insert(tenant.clone(), Arc::clone(&engine));
        if let Some(previous) = previous {
            warn!(microservice = %self.function, %tenant, "Replacing tenant engine");
            shut_down(&previous).await;
        }
        info!(microservice = %self.function, %tenant, "Tenant engine added");

        match self.node.status() {
            status @ (LifecycleStatus::Initialized | LifecycleStatus::Started | LifecycleStatus::Paused) => {
                align(&engine, status).await
            }
            _ => Ok(()),
        }
    }

    /// Stops, terminates and unregisters the engine for `tenant`.
    pub async fn remove_tenant_engine(&self, tenant: &TenantId) -> Option<Arc<TenantEngine>> {
        let engine = self.tenant_engines.write().remove(tenant)?;
        shut_down(&engine).await;
        info!(microservice = %self.function, %tenant, "Tenant engine removed");
        Some(engine)
    }

    pub fn state(&self) -> MicroserviceState {
        MicroserviceState {
            function: self.function.clone(),
            root: ComponentStateSnapshot::capture(self),
            tenant_engines: self.tenant_engines().iter().map(|e| e.state()).collect(),
        }
    }

    async fn cascade_to_tenants(&self, operation: LifecycleOperation) {
        let mut engines = self.tenant_engines();
        if !operation.cascades_forward() {
            engines.reverse();
        }
        for engine in engines {
            let result = if operation.cascades_forward() {
                align(&engine, operation.success_status()).await
            } else if operation.is_legal_from(engine.status()) {
                engine.transition(operation).await
            } else {
                debug!(tenant = %engine.tenant(), %operation, status = %engine.status(), "Tenant engine skipped");
                Ok(())
            };
            if let Err(e) = result {
                warn!(
                    microservice = %self.function,
                    tenant = %engine.tenant(),
                    %operation,
                    error = %e,
                    "Tenant engine transition failed"
                );
            }
        }
    }
}

#[async_trait]
impl Lifecycle for Microservice {
    fn component(&self) -> &LifecycleComponent {
        &self.node
    }

    async fn transition(&self, operation: LifecycleOperation) -> Result<()> {
        drive_with(self, operation, || self.cascade_to_tenants(operation)).await
    }
}

/// Runs the operations that take `engine` from where it is to `target`
/// (`Initialized`, `Started` or `Paused`).
async fn align(engine: &TenantEngine, target: LifecycleStatus) -> Result<()> {
    use LifecycleOperation::*;
    use LifecycleStatus::*;

    let current = engine.status();
    let steps: &[LifecycleOperation] = match (current, target) {
        (current, target) if current == target => &[],
        (Terminated, _) => &[],
        (Started | Paused, Initialized) => &[],
        (Initialized, Started) => &[Start],
        (Paused, Started) => &[Resume],
        (Initialized, Paused) => &[Start, Pause],
        (Started, Paused) => &[Pause],
        (_, Initialized) => &[Initialize],
        (_, Started) => &[Initialize, Start],
        (_, Paused) => &[Initialize, Start, Pause],
        _ => &[],
    };
    for &operation in steps {
        if let Err(e) = engine.transition(operation).await {
            // Failed hooks are already on the engine's stack
            if matches!(e, BackboneError::InvalidLifecycleTransition { .. }) {
                engine
                    .component()
                    .record_failure(operation.failure_status(), e.to_string());
            }
            return Err(e);
        }
    }
    Ok(())
}

async fn shut_down(engine: &TenantEngine) {
    for result in [engine.stop().await, engine.terminate().await] {
        if let Err(e) = result {
            warn!(tenant = %engine.tenant(), error = %e, "Tenant engine shutdown failed");
        }
    }
}

fn node_for(name: String, component_type: ComponentType, context: &InstanceContext) -> LifecycleComponent {
    LifecycleComponent::new(name, component_type)
        .with_error_limit(context.settings().error_stack_limit)
        .with_monitor(Arc::clone(context.monitor()))
}
