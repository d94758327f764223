//! # State Aggregation
//!
//! Read-only, point-in-time snapshots of component trees for health checks and
//! operator views. Capturing a snapshot copies each node's status and error
//! stack under that node's own short read lock; it never takes a transition
//! guard, so it neither waits on nor blocks a running transition.
//!
//! Three levels are produced:
//! - [`TenantEngineState`]: one tenant's tree within one microservice
//! - [`MicroserviceState`]: the microservice root plus its tenant engines
//! - [`InstanceState`]: every microservice of an instance, rolled up

use crate::identity::{FunctionIdentifier, TenantId};
use crate::lifecycle::{ComponentId, ComponentType, Lifecycle, LifecycleComponent, LifecycleStatus};
use serde::{Deserialize, Serialize};

/// Immutable copy of one node and its subtree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentStateSnapshot {
    pub id: ComponentId,
    pub name: String,
    pub component_type: ComponentType,
    pub status: LifecycleStatus,
    /// Most recent last.
    pub errors: Vec<String>,
    /// Declaration order.
    pub children: Vec<ComponentStateSnapshot>,
}

/// A node found in an error status, addressed by its name path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentFailure {
    pub path: String,
    pub status: LifecycleStatus,
    pub errors: Vec<String>,
}

impl ComponentStateSnapshot {
    pub fn capture<C: Lifecycle + ?Sized>(component: &C) -> Self {
        Self::capture_node(component.component())
    }

    fn capture_node(node: &LifecycleComponent) -> Self {
        let (status, errors) = node.state();
        Self {
            id: node.id(),
            name: node.name().to_string(),
            component_type: node.component_type().clone(),
            status,
            errors,
            children: node
                .children()
                .iter()
                .map(|child| Self::capture_node(child.component()))
                .collect(),
        }
    }

    /// Worst status anywhere in the subtree.
    pub fn overall_status(&self) -> LifecycleStatus {
        self.children
            .iter()
            .map(Self::overall_status)
            .fold(self.status, worst)
    }

    pub fn is_healthy(&self) -> bool {
        self.overall_status() == LifecycleStatus::Started
    }

    /// Every node in an error status, depth first, with `/`-joined name paths.
    pub fn failures(&self) -> Vec<ComponentFailure> {
        let mut out = Vec::new();
        self.collect_failures(&self.name, &mut out);
        out
    }

    fn collect_failures(&self, path: &str, out: &mut Vec<ComponentFailure>) {
        if self.status.is_error() {
            out.push(ComponentFailure {
                path: path.to_string(),
                status: self.status,
                errors: self.errors.clone(),
            });
        }
        for child in &self.children {
            child.collect_failures(&format!("{path}/{}", child.name), out);
        }
    }

    /// Looks a node up by `/`-joined name path starting at this node's name.
    pub fn find(&self, path: &str) -> Option<&ComponentStateSnapshot> {
        let mut segments = path.split('/');
        if segments.next()? != self.name {
            return None;
        }
        segments.try_fold(self, |node, segment| {
            node.children.iter().find(|c| c.name == segment)
        })
    }
}

fn worst(a: LifecycleStatus, b: LifecycleStatus) -> LifecycleStatus {
    if b.severity() > a.severity() {
        b
    } else {
        a
    }
}

/// One tenant's component tree within a microservice instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantEngineState {
    pub tenant: TenantId,
    pub root: ComponentStateSnapshot,
}

impl TenantEngineState {
    pub fn capture<C: Lifecycle + ?Sized>(tenant: TenantId, root: &C) -> Self {
        Self {
            tenant,
            root: ComponentStateSnapshot::capture(root),
        }
    }
}

/// A microservice's own tree plus the trees of its tenant engines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MicroserviceState {
    pub function: FunctionIdentifier,
    pub root: ComponentStateSnapshot,
    /// Ordered by tenant id.
    pub tenant_engines: Vec<TenantEngineState>,
}

impl MicroserviceState {
    pub fn overall_status(&self) -> LifecycleStatus {
        self.tenant_engines
            .iter()
            .map(|t| t.root.overall_status())
            .fold(self.root.overall_status(), worst)
    }

    pub fn tenant(&self, tenant: &TenantId) -> Option<&TenantEngineState> {
        self.tenant_engines.iter().find(|t| &t.tenant == tenant)
    }
}

/// Instance-wide view merging every hosted microservice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceState {
    pub instance_id: String,
    pub status: LifecycleStatus,
    pub microservices: Vec<MicroserviceState>,
}

impl InstanceState {
    pub fn aggregate(instance_id: impl Into<String>, microservices: Vec<MicroserviceState>) -> Self {
        let status = microservices
            .iter()
            .map(MicroserviceState::overall_status)
            .reduce(worst)
            .unwrap_or(LifecycleStatus::Unknown);
        Self {
            instance_id: instance_id.into(),
            status,
            microservices,
        }
    }

    pub fn microservice(&self, function: &str) -> Option<&MicroserviceState> {
        self.microservices
            .iter()
            .find(|m| m.function.name() == function)
    }
}
