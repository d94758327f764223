//! # Cache Provider
//!
//! Per-tenant, TTL-bounded key/value cache used in front of API-channel lookups
//! to avoid cross-service round trips.
//!
//! - The effective key is always `(TenantId, K)`: tenants never see each other's
//!   entries even when keys collide.
//! - Expiry is lazy: an entry older than `ttl_seconds` is treated as absent and
//!   evicted by the `get` that finds it. [`CacheProvider::spawn_sweeper`] adds an
//!   optional background purge that does not change what callers observe.
//! - A disabled cache turns every operation into a no-op (`get` is always
//!   `None`), so call sites never branch on configuration.
//! - Each operation is atomic per entry; no external locking is needed.

use crate::context::InstanceContext;
use crate::error::BoxError;
use crate::identity::TenantId;
use crate::lifecycle::{ComponentType, Lifecycle, LifecycleComponent};
use crate::settings::InstanceSettings;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfiguration {
    pub ttl_seconds: u64,
    pub enabled: bool,
}

impl Default for CacheConfiguration {
    fn default() -> Self {
        Self {
            ttl_seconds: 60,
            enabled: true,
        }
    }
}

impl CacheConfiguration {
    pub fn new(ttl_seconds: u64) -> Self {
        Self {
            ttl_seconds,
            enabled: true,
        }
    }

    pub fn disabled() -> Self {
        Self {
            ttl_seconds: 0,
            enabled: false,
        }
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub inserted_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, ttl: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.inserted_at) > ttl
    }
}

/// Tenant-scoped TTL cache.
pub struct CacheProvider<K, V> {
    node: LifecycleComponent,
    config: CacheConfiguration,
    entries: DashMap<(TenantId, K), CacheEntry<V>>,
}

impl<K, V> CacheProvider<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(identifier: impl Into<String>, config: CacheConfiguration) -> Self {
        Self {
            node: LifecycleComponent::new(identifier, ComponentType::Cache),
            config,
            entries: DashMap::new(),
        }
    }

    /// Builds the cache from the instance's named cache configuration.
    pub fn from_settings(identifier: &str, settings: &InstanceSettings) -> Self {
        let mut cache = Self::new(identifier, settings.cache(identifier));
        cache.node = cache.node.with_error_limit(settings.error_stack_limit);
        cache
    }

    /// Like [`CacheProvider::from_settings`], reporting to the instance monitor.
    pub fn with_context(identifier: &str, context: &InstanceContext) -> Self {
        let cache = Self::from_settings(identifier, context.settings());
        cache.node.set_monitor(Arc::clone(context.monitor()));
        cache
    }

    pub fn identifier(&self) -> &str {
        self.node.name()
    }

    pub fn config(&self) -> &CacheConfiguration {
        &self.config
    }

    pub fn get(&self, tenant: &TenantId, key: &K) -> Option<V> {
        if !self.config.enabled {
            return None;
        }
        let ttl = self.config.ttl();
        let now = Instant::now();
        let composite = (tenant.clone(), key.clone());
        {
            let entry = self.entries.get(&composite)?;
            if !entry.is_expired(ttl, now) {
                trace!(cache = self.identifier(), %tenant, "Hit");
                return Some(entry.value.clone());
            }
        }
        // The read guard is gone; a concurrent put may have refreshed the entry.
        self.entries
            .remove_if(&composite, |_, entry| entry.is_expired(ttl, now));
        trace!(cache = self.identifier(), %tenant, "Expired");
        None
    }

    pub fn put(&self, tenant: &TenantId, key: K, value: V) {
        if !self.config.enabled {
            return;
        }
        self.entries.insert(
            (tenant.clone(), key),
            CacheEntry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    pub fn remove(&self, tenant: &TenantId, key: &K) -> Option<V> {
        if !self.config.enabled {
            return None;
        }
        self.entries
            .remove(&(tenant.clone(), key.clone()))
            .map(|(_, entry)| entry.value)
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn clear_tenant(&self, tenant: &TenantId) {
        self.entries.retain(|(owner, _), _| owner != tenant);
    }

    /// Number of stored entries, expired ones included until they are evicted.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every expired entry; returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let ttl = self.config.ttl();
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(ttl, now));
        before.saturating_sub(self.entries.len())
    }

    /// Cache-aside lookup: returns the cached value or runs `fetch` and stores
    /// its result. Errors from `fetch` are returned and nothing is cached.
    pub async fn get_or_try_insert_with<F, Fut, E>(
        &self,
        tenant: &TenantId,
        key: K,
        fetch: F,
    ) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(tenant, &key) {
            return Ok(value);
        }
        let value = fetch().await?;
        self.put(tenant, key, value.clone());
        Ok(value)
    }

    /// Periodically purges expired entries until `cancel` fires.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let purged = cache.purge_expired();
                        if purged > 0 {
                            debug!(cache = cache.identifier(), purged, "Purged expired entries");
                        }
                    }
                }
            }
        })
    }
}

#[async_trait]
impl<K, V> Lifecycle for CacheProvider<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn component(&self) -> &LifecycleComponent {
        &self.node
    }

    async fn on_stop(&self) -> Result<(), BoxError> {
        self.clear();
        Ok(())
    }
}
