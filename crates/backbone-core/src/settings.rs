//! # Instance Settings
//!
//! Process-wide, read-only configuration. Loaded once at startup (TOML file or
//! defaults, then environment overrides), wrapped in an `Arc` and passed to
//! constructors through the [`InstanceContext`](crate::context::InstanceContext).
//!
//! ```toml
//! instance_id = "sitewhere"
//! namespace = "iot"
//! pod_name = "device-state-7f9c"
//! call_timeout_ms = 10000
//!
//! [caches.device-by-token]
//! ttl_seconds = 30
//! enabled = true
//! ```

use crate::cache::CacheConfiguration;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

pub const ENV_INSTANCE_ID: &str = "BACKBONE_INSTANCE_ID";
pub const ENV_NAMESPACE: &str = "BACKBONE_NAMESPACE";
pub const ENV_POD_NAME: &str = "BACKBONE_POD_NAME";

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Failed to read settings from {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse settings: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstanceSettings {
    pub instance_id: String,
    pub namespace: String,
    pub pod_name: String,
    /// Port API channels use when the registry does not say otherwise.
    pub grpc_port: u16,
    pub cluster_domain: String,
    pub error_stack_limit: usize,
    pub call_timeout_ms: u64,
    pub discovery_timeout_ms: u64,
    pub stream_cancel_grace_ms: u64,
    /// Consecutive call failures after which a channel is considered broken.
    pub failure_threshold: u32,
    pub caches: BTreeMap<String, CacheConfiguration>,
}

impl Default for InstanceSettings {
    fn default() -> Self {
        Self {
            instance_id: "default".to_string(),
            namespace: "default".to_string(),
            pod_name: "localhost".to_string(),
            grpc_port: 9000,
            cluster_domain: "cluster.local".to_string(),
            error_stack_limit: crate::lifecycle::DEFAULT_ERROR_STACK_LIMIT,
            call_timeout_ms: 30_000,
            discovery_timeout_ms: 5_000,
            stream_cancel_grace_ms: 1_000,
            failure_threshold: 3,
            caches: BTreeMap::new(),
        }
    }
}

impl InstanceSettings {
    pub fn from_toml_str(raw: &str) -> Result<Self, SettingsError> {
        Ok(toml::from_str(raw)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.display().to_string(),
            source,
        })?;
        debug!(path = %path.display(), "Loaded settings file");
        Self::from_toml_str(&raw)
    }

    /// Applies `BACKBONE_*` environment variables on top of the loaded values.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(v) = lookup(ENV_INSTANCE_ID) {
            self.instance_id = v;
        }
        if let Some(v) = lookup(ENV_NAMESPACE) {
            self.namespace = v;
        }
        if let Some(v) = lookup(ENV_POD_NAME) {
            self.pod_name = v;
        }
        self
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_millis(self.discovery_timeout_ms)
    }

    pub fn stream_cancel_grace(&self) -> Duration {
        Duration::from_millis(self.stream_cancel_grace_ms)
    }

    /// Configuration for a named cache; caches that are not configured are disabled.
    pub fn cache(&self, identifier: &str) -> CacheConfiguration {
        self.caches
            .get(identifier)
            .cloned()
            .unwrap_or_else(CacheConfiguration::disabled)
    }
}
