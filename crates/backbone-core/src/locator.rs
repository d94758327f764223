//! # Service Locator
//!
//! Resolves a (function, service) pair to a network target through the
//! orchestration layer's [`ServiceRegistry`], caching the last known good target
//! per key.
//!
//! ## Addressing
//! Multitenant functions resolve to the shared instance of the function in the
//! current deployment; the tenant travels with each call, never in the address.
//! Global functions resolve to their single well-known instance. Either way the
//! cache key is `(function, service)`.
//!
//! ## Invalidation
//! The registry pushes [`TargetChange`] notifications. An `Updated` notification
//! carries the new target and replaces the cached one, so the next `resolve`
//! needs no registry round trip; `Invalidated` evicts the key and the next
//! `resolve` asks the registry again. [`ServiceLocator::watch`] applies the feed
//! in the background.

use crate::error::{BackboneError, Result};
use crate::identity::{FunctionIdentifier, FunctionScope, ServiceIdentifier, TenantId};
use crate::settings::InstanceSettings;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Host/port pair a transport connects to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceTarget {
    pub host: String,
    pub port: u16,
}

impl ServiceTarget {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl Display for ServiceTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Cache key for resolved targets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TargetKey {
    pub function: String,
    pub service: ServiceIdentifier,
}

impl TargetKey {
    pub fn new(function: &FunctionIdentifier, service: &ServiceIdentifier) -> Self {
        Self {
            function: function.name().to_string(),
            service: service.clone(),
        }
    }
}

impl Display for TargetKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.function, self.service)
    }
}

/// What a channel asks the registry for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveRequest {
    pub function: FunctionIdentifier,
    pub service: ServiceIdentifier,
    /// Informational only; multitenant functions are not addressed per tenant.
    pub tenant: Option<TenantId>,
    /// Port the caller expects the service on, if it has one.
    pub port: Option<u16>,
}

impl ResolveRequest {
    pub fn new(function: FunctionIdentifier, service: ServiceIdentifier) -> Self {
        Self {
            function,
            service,
            tenant: None,
            port: None,
        }
    }

    pub fn for_tenant(mut self, tenant: TenantId) -> Self {
        self.tenant = Some(tenant);
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn key(&self) -> TargetKey {
        TargetKey::new(&self.function, &self.service)
    }
}

/// Push notification from the orchestration layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetChange {
    Updated { key: TargetKey, target: ServiceTarget },
    Invalidated { key: TargetKey },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("No endpoints for {0}")]
    NotFound(String),
    #[error("Registry unavailable: {0}")]
    Unavailable(String),
}

/// The orchestration/service-registry collaborator.
#[async_trait]
pub trait ServiceRegistry: Send + Sync {
    async fn resolve(&self, request: &ResolveRequest) -> std::result::Result<ServiceTarget, RegistryError>;

    /// Change feed, if the registry pushes changes.
    fn subscribe(&self) -> Option<broadcast::Receiver<TargetChange>> {
        None
    }
}

/// Resolves targets through cluster DNS naming conventions.
///
/// - global: `{function}.{namespace}.svc.{domain}`
/// - multitenant: `{instance}-{function}.{namespace}.svc.{domain}`
///
/// The port is the one requested, or the instance default.
#[derive(Debug, Clone)]
pub struct DnsRegistry {
    instance_id: String,
    namespace: String,
    cluster_domain: String,
    default_port: u16,
}

impl DnsRegistry {
    pub fn new(settings: &InstanceSettings) -> Self {
        Self {
            instance_id: settings.instance_id.clone(),
            namespace: settings.namespace.clone(),
            cluster_domain: settings.cluster_domain.clone(),
            default_port: settings.grpc_port,
        }
    }

    pub fn host_for(&self, function: &FunctionIdentifier) -> String {
        match function.scope() {
            FunctionScope::Global => format!(
                "{}.{}.svc.{}",
                function.name(),
                self.namespace,
                self.cluster_domain
            ),
            FunctionScope::Multitenant => format!(
                "{}-{}.{}.svc.{}",
                self.instance_id,
                function.name(),
                self.namespace,
                self.cluster_domain
            ),
        }
    }
}

#[async_trait]
impl ServiceRegistry for DnsRegistry {
    async fn resolve(&self, request: &ResolveRequest) -> std::result::Result<ServiceTarget, RegistryError> {
        if request.function.name().is_empty() {
            return Err(RegistryError::NotFound(request.key().to_string()));
        }
        Ok(ServiceTarget::new(
            self.host_for(&request.function),
            request.port.unwrap_or(self.default_port),
        ))
    }
}

/// Caching front for a [`ServiceRegistry`].
pub struct ServiceLocator {
    registry: Arc<dyn ServiceRegistry>,
    targets: DashMap<TargetKey, ServiceTarget>,
    /// Bumped by every notification for a key. A registry answer is only
    /// cached if no notification for its key arrived during the round trip.
    generations: DashMap<TargetKey, u64>,
    registrations: DashMap<TargetKey, FunctionIdentifier>,
    timeout: Duration,
}

impl ServiceLocator {
    pub fn new(registry: Arc<dyn ServiceRegistry>, timeout: Duration) -> Self {
        Self {
            registry,
            targets: DashMap::new(),
            generations: DashMap::new(),
            registrations: DashMap::new(),
            timeout,
        }
    }

    pub fn from_settings(registry: Arc<dyn ServiceRegistry>, settings: &InstanceSettings) -> Self {
        Self::new(registry, settings.discovery_timeout())
    }

    /// Records that a channel depends on `function`/`service`.
    pub fn register(&self, function: &FunctionIdentifier, service: &ServiceIdentifier) {
        let key = TargetKey::new(function, service);
        debug!(%key, "Registered");
        self.registrations.insert(key, function.clone());
    }

    /// Registered keys, sorted.
    pub fn registrations(&self) -> Vec<TargetKey> {
        let mut keys: Vec<_> = self.registrations.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    pub fn cached(&self, key: &TargetKey) -> Option<ServiceTarget> {
        self.targets.get(key).map(|t| t.clone())
    }

    /// Returns the cached target, or asks the registry (bounded by the
    /// discovery timeout) and caches the answer. A notification that lands
    /// while the registry is being asked takes precedence over its answer.
    #[instrument(skip(self, request), fields(key = %request.key()))]
    pub async fn resolve(&self, request: &ResolveRequest) -> Result<ServiceTarget> {
        let key = request.key();
        if let Some(target) = self.cached(&key) {
            debug!(%target, "Resolved from cache");
            return Ok(target);
        }

        let unavailable = |reason: String| BackboneError::TargetUnavailable {
            function: request.function.name().to_string(),
            service: request.service.to_string(),
            reason,
        };
        let observed = *self.generations.entry(key.clone()).or_insert(0);
        let target = tokio::time::timeout(self.timeout, self.registry.resolve(request))
            .await
            .map_err(|_| unavailable(format!("discovery timed out after {:?}", self.timeout)))?
            .map_err(|e| unavailable(e.to_string()))?;

        let stored = {
            let generation = self.generations.entry(key.clone()).or_insert(0);
            let current = *generation == observed;
            if current {
                self.targets.insert(key.clone(), target.clone());
            }
            current
        };
        if stored {
            info!(%target, "Resolved");
            return Ok(target);
        }
        match self.cached(&key) {
            Some(pushed) => {
                debug!(stale = %target, %pushed, "Registry answer superseded by notification");
                Ok(pushed)
            }
            None => {
                debug!(%target, "Resolved, not cached after invalidation");
                Ok(target)
            }
        }
    }

    pub fn invalidate(&self, key: &TargetKey) {
        let mut generation = self.generations.entry(key.clone()).or_insert(0);
        *generation += 1;
        if self.targets.remove(key).is_some() {
            debug!(%key, "Invalidated");
        }
    }

    /// Drops every cached target; the next resolve of each goes to the registry.
    pub fn invalidate_all(&self) {
        for mut generation in self.generations.iter_mut() {
            *generation += 1;
            self.targets.remove(generation.key());
        }
        self.targets.clear();
    }

    pub fn apply_change(&self, change: TargetChange) {
        match change {
            TargetChange::Updated { key, target } => {
                info!(%key, %target, "Target updated");
                let mut generation = self.generations.entry(key.clone()).or_insert(0);
                *generation += 1;
                self.targets.insert(key, target);
            }
            TargetChange::Invalidated { key } => self.invalidate(&key),
        }
    }

    /// Applies the registry's change feed until `cancel` fires or the feed
    /// closes. Returns `None` when the registry does not push changes.
    pub fn watch(self: &Arc<Self>, cancel: CancellationToken) -> Option<JoinHandle<()>> {
        let mut changes = self.registry.subscribe()?;
        let locator = Arc::clone(self);
        Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    change = changes.recv() => match change {
                        Ok(change) => locator.apply_change(change),
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            // Unknown which keys changed; drop everything and re-resolve lazily.
                            warn!(missed, "Change feed lagged");
                            locator.invalidate_all();
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
            debug!("Change feed watcher stopped");
        }))
    }
}
