//! # Backbone Core
//!
//! Building blocks for the communication and lifecycle backbone of a multitenant
//! microservice platform: every microservice discovers and calls the others over
//! typed RPC, scopes each call to a tenant, and exposes one uniform,
//! hierarchical running state.
//!
//! ## Architecture Overview
//!
//! 1. **Lifecycle Layer** ([`Lifecycle`], [`LifecycleComponent`]) - the guarded
//!    initialize/start/pause/resume/stop/terminate state machine, child cascades
//!    and bounded error stacks
//! 2. **Tree Layer** ([`Microservice`], [`TenantEngine`], [`state`]) - owning
//!    component trees and the read-only snapshots built from them
//! 3. **Call Layer** ([`ServiceLocator`], [`ApiChannel`], [`MultitenantApiChannel`]) -
//!    discovery, one shared transport per channel, tenant-tagged calls
//! 4. **Support** ([`CacheProvider`], [`codec`], [`monitor`], [`settings`]) -
//!    per-tenant caching, payload codecs, progress reporting, configuration
//!
//! Collaborators outside the process (service registry, RPC transport,
//! monitoring, token issuer) are traits; [`transport::memory`] and [`mock`]
//! provide in-process implementations.
//!
//! ## Quick Start
//!
//! ```rust
//! use backbone_core::mock::{MockService, StaticRegistry};
//! use backbone_core::transport::memory::MemoryConnector;
//! use backbone_core::{
//!     ApiMethod, FunctionIdentifier, InstanceContext, InstanceSettings, Lifecycle,
//!     LifecycleStatus, MultitenantApiChannel, ServiceIdentifier, ServiceTarget,
//! };
//! use serde::{Deserialize, Serialize};
//! use std::sync::Arc;
//!
//! #[derive(Serialize, Deserialize)]
//! struct GetPresence { device_token: String }
//!
//! #[derive(Serialize, Deserialize)]
//! struct Presence { online: bool }
//!
//! struct GetPresenceMethod;
//!
//! impl ApiMethod for GetPresenceMethod {
//!     const NAME: &'static str = "getPresence";
//!     type Request = GetPresence;
//!     type Response = Presence;
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let function = FunctionIdentifier::multitenant("device-state");
//!     let service = ServiceIdentifier::new("DeviceStateApi");
//!     let target = ServiceTarget::new("device-state", 9000);
//!
//!     // 1. Wire the collaborators
//!     let registry = Arc::new(StaticRegistry::new());
//!     registry.set(&function, &service, target.clone());
//!     let connector = MemoryConnector::new();
//!     let remote = MockService::new();
//!     remote.expect_call("getPresence").return_json(&Presence { online: true });
//!     connector.bind(target, Arc::new(remote.clone()));
//!     let context = InstanceContext::with_registry(
//!         InstanceSettings::default(),
//!         registry,
//!         Arc::new(connector),
//!     );
//!
//!     // 2. Bring the channel up
//!     let channel = MultitenantApiChannel::new(function, service, context);
//!     channel.initialize().await.unwrap();
//!     channel.start().await.unwrap();
//!     assert_eq!(channel.status(), LifecycleStatus::Started);
//!
//!     // 3. Call on behalf of a tenant
//!     let presence = channel
//!         .for_tenant("acme")
//!         .blocking_call::<GetPresenceMethod>(&GetPresence { device_token: "d-1".into() })
//!         .await
//!         .unwrap();
//!     assert!(presence.online);
//!     assert_eq!(remote.requests()[0].metadata.tenant().unwrap().as_str(), "acme");
//! }
//! ```
//!
//! ## Concurrency Model
//!
//! - Transitions on one component are serialized; a second concurrent request
//!   fails fast with `ConcurrentTransition` instead of queueing
//! - Independent components transition and call concurrently
//! - Status reads are copy-on-read and never wait on a running transition
//! - A channel's transport is shared by all callers and tenants; only connect
//!   and release mutate it
//!
//! ## Failure Visibility
//!
//! Lifecycle failures are recorded in the failing component's error stack and
//! surface through the aggregated snapshot ([`state`]); call-path failures are
//! returned to the caller. A failing tenant engine or channel never takes the
//! process down.

pub mod cache;
pub mod channel;
pub mod codec;
pub mod context;
pub mod engine;
pub mod error;
pub mod identity;
pub mod lifecycle;
pub mod locator;
pub mod mock;
pub mod monitor;
pub mod multitenant;
pub mod settings;
pub mod state;
pub mod tracing;
pub mod transport;

// Re-export core types for convenience
pub use cache::{CacheConfiguration, CacheProvider};
pub use channel::{ApiChannel, ApiMethod, StreamHandle, StreamHandler};
pub use codec::{CodecError, JsonCodec, PayloadCodec};
pub use context::InstanceContext;
pub use engine::{CompositeComponent, Microservice, TenantEngine};
pub use error::{BackboneError, BoxError, Result};
pub use identity::{FunctionIdentifier, FunctionScope, ServiceIdentifier, TenantId};
pub use lifecycle::{
    ComponentId, ComponentType, Lifecycle, LifecycleComponent, LifecycleOperation, LifecycleStatus,
};
pub use locator::{ServiceLocator, ServiceRegistry, ServiceTarget, TargetChange, TargetKey};
pub use monitor::{ProgressMonitor, ProgressReport};
pub use multitenant::{MultitenantApiChannel, StaticTokenProvider, TenantChannel, TokenProvider};
pub use settings::InstanceSettings;
pub use state::{ComponentStateSnapshot, InstanceState, MicroserviceState, TenantEngineState};
