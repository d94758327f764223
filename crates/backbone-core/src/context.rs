//! # Instance Context
//!
//! Read-mostly, process-wide collaborators handed to every channel and engine
//! constructor. Cloning is cheap: every field is an `Arc`.

use crate::locator::{DnsRegistry, ServiceLocator, ServiceRegistry};
use crate::monitor::{ProgressMonitor, TracingMonitor};
use crate::multitenant::{StaticTokenProvider, TokenProvider};
use crate::settings::InstanceSettings;
use crate::transport::TransportConnector;
use std::sync::Arc;

#[derive(Clone)]
pub struct InstanceContext {
    settings: Arc<InstanceSettings>,
    locator: Arc<ServiceLocator>,
    connector: Arc<dyn TransportConnector>,
    tokens: Arc<dyn TokenProvider>,
    monitor: Arc<dyn ProgressMonitor>,
}

impl InstanceContext {
    /// Context resolving targets through cluster DNS, with an empty system
    /// token and tracing-only monitoring.
    pub fn new(settings: InstanceSettings, connector: Arc<dyn TransportConnector>) -> Self {
        let registry = Arc::new(DnsRegistry::new(&settings));
        Self::with_registry(settings, registry, connector)
    }

    pub fn with_registry(
        settings: InstanceSettings,
        registry: Arc<dyn ServiceRegistry>,
        connector: Arc<dyn TransportConnector>,
    ) -> Self {
        let locator = Arc::new(ServiceLocator::from_settings(registry, &settings));
        Self {
            settings: Arc::new(settings),
            locator,
            connector,
            tokens: Arc::new(StaticTokenProvider::new("")),
            monitor: Arc::new(TracingMonitor),
        }
    }

    pub fn with_tokens(mut self, tokens: Arc<dyn TokenProvider>) -> Self {
        self.tokens = tokens;
        self
    }

    pub fn with_monitor(mut self, monitor: Arc<dyn ProgressMonitor>) -> Self {
        self.monitor = monitor;
        self
    }

    pub fn settings(&self) -> &InstanceSettings {
        &self.settings
    }

    pub fn locator(&self) -> &Arc<ServiceLocator> {
        &self.locator
    }

    pub fn connector(&self) -> &Arc<dyn TransportConnector> {
        &self.connector
    }

    pub fn tokens(&self) -> &Arc<dyn TokenProvider> {
        &self.tokens
    }

    pub fn monitor(&self) -> &Arc<dyn ProgressMonitor> {
        &self.monitor
    }
}

impl std::fmt::Debug for InstanceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceContext")
            .field("instance_id", &self.settings.instance_id)
            .field("namespace", &self.settings.namespace)
            .finish_non_exhaustive()
    }
}
