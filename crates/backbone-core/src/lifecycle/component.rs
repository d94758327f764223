//! # Lifecycle Components
//!
//! Every unit that takes part in the initialize/start/stop/terminate state
//! machine implements [`Lifecycle`] and owns a [`LifecycleComponent`] node.
//!
//! # Architecture Note
//! The trait follows the same shape as an entity with lifecycle hooks: the
//! implementor only overrides the `on_*` hooks it cares about (all default to
//! `Ok(())`), while the provided `initialize`/`start`/... methods run the guarded
//! transition, the child cascade and the error capture in one place
//! (see [`engine`](super::engine)).
//!
//! # Ownership
//! A node owns its children (`Arc<dyn Lifecycle>`, declaration order preserved)
//! and only remembers its parent by [`ComponentId`]. There is never a strong
//! reference from a child back to its parent.

use crate::error::{BoxError, Result};
use crate::lifecycle::engine;
use crate::lifecycle::{LifecycleOperation, LifecycleStatus};
use crate::monitor::{ProgressMonitor, TracingMonitor};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt::Display;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// Default bound of the per-component error stack.
pub const DEFAULT_ERROR_STACK_LIMIT: usize = 10;

/// Stable identity of a component node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComponentId(pub Uuid);

impl ComponentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ComponentId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for ComponentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Component-type tag carried into snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComponentType {
    Microservice,
    TenantEngine,
    ApiChannel,
    Cache,
    Composite,
    Custom(String),
}

#[derive(Debug, Default)]
struct NodeState {
    status: LifecycleStatus,
    errors: VecDeque<String>,
}

/// The tree node behind every [`Lifecycle`] implementor.
///
/// Status and error stack sit behind a short-lived read/write lock so readers
/// (the state aggregator) always get a point-in-time copy without waiting on a
/// running transition. Transitions themselves are serialized by a separate async
/// guard that is only ever acquired with `try_lock`.
pub struct LifecycleComponent {
    id: ComponentId,
    name: String,
    component_type: ComponentType,
    parent: RwLock<Option<ComponentId>>,
    state: RwLock<NodeState>,
    children: RwLock<Vec<Arc<dyn Lifecycle>>>,
    transition: tokio::sync::Mutex<()>,
    error_limit: usize,
    monitor: RwLock<Arc<dyn ProgressMonitor>>,
}

impl LifecycleComponent {
    pub fn new(name: impl Into<String>, component_type: ComponentType) -> Self {
        Self {
            id: ComponentId::new(),
            name: name.into(),
            component_type,
            parent: RwLock::new(None),
            state: RwLock::new(NodeState::default()),
            children: RwLock::new(Vec::new()),
            transition: tokio::sync::Mutex::new(()),
            error_limit: DEFAULT_ERROR_STACK_LIMIT,
            monitor: RwLock::new(Arc::new(TracingMonitor)),
        }
    }

    /// Overrides the error stack bound. A limit of zero keeps one entry.
    pub fn with_error_limit(mut self, limit: usize) -> Self {
        self.error_limit = limit.max(1);
        self
    }

    pub fn with_monitor(self, monitor: Arc<dyn ProgressMonitor>) -> Self {
        *self.monitor.write() = monitor;
        self
    }

    pub fn id(&self) -> ComponentId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn component_type(&self) -> &ComponentType {
        &self.component_type
    }

    pub fn status(&self) -> LifecycleStatus {
        self.state.read().status
    }

    /// Copy of the error stack, most recent last.
    pub fn errors(&self) -> Vec<String> {
        self.state.read().errors.iter().cloned().collect()
    }

    /// Status and error stack read under one lock.
    pub fn state(&self) -> (LifecycleStatus, Vec<String>) {
        let state = self.state.read();
        (state.status, state.errors.iter().cloned().collect())
    }

    pub fn parent(&self) -> Option<ComponentId> {
        *self.parent.read()
    }

    pub fn error_limit(&self) -> usize {
        self.error_limit
    }

    pub fn monitor(&self) -> Arc<dyn ProgressMonitor> {
        self.monitor.read().clone()
    }

    pub fn set_monitor(&self, monitor: Arc<dyn ProgressMonitor>) {
        *self.monitor.write() = monitor;
    }

    /// Children in declaration order.
    pub fn children(&self) -> Vec<Arc<dyn Lifecycle>> {
        self.children.read().clone()
    }

    /// Appends a child and points its parent reference at this node.
    pub fn add_child(&self, child: Arc<dyn Lifecycle>) {
        *child.component().parent.write() = Some(self.id);
        self.children.write().push(child);
    }

    /// Detaches a child. Its status is left untouched.
    pub fn remove_child(&self, id: ComponentId) -> Option<Arc<dyn Lifecycle>> {
        let mut children = self.children.write();
        let index = children.iter().position(|c| c.component().id() == id)?;
        let child = children.remove(index);
        *child.component().parent.write() = None;
        Some(child)
    }

    pub fn find_child(&self, id: ComponentId) -> Option<Arc<dyn Lifecycle>> {
        self.children
            .read()
            .iter()
            .find(|c| c.component().id() == id)
            .cloned()
    }

    /// Moves a running component to `LifecycleError` outside of a transition.
    ///
    /// Used by failure detectors (e.g. a channel that lost its transport). Only
    /// `Started` and `Paused` components are affected; returns whether the status
    /// changed. The message is always recorded.
    pub fn fail(&self, message: impl Into<String>) -> bool {
        let message = message.into();
        let changed = {
            let mut state = self.state.write();
            let changed = matches!(
                state.status,
                LifecycleStatus::Started | LifecycleStatus::Paused
            );
            if changed {
                state.status = LifecycleStatus::LifecycleError;
            }
            push_bounded(&mut state.errors, message.clone(), self.error_limit);
            changed
        };
        if changed {
            warn!(component = %self.name, error = %message, "Component failed");
            self.monitor().report_error(&message);
        }
        changed
    }

    pub(crate) fn set_status(&self, status: LifecycleStatus) {
        self.state.write().status = status;
    }

    pub(crate) fn record_failure(&self, status: LifecycleStatus, message: String) {
        let mut state = self.state.write();
        state.status = status;
        push_bounded(&mut state.errors, message, self.error_limit);
    }

    pub(crate) fn try_begin(&self) -> Option<tokio::sync::MutexGuard<'_, ()>> {
        self.transition.try_lock().ok()
    }

    /// Waits for any running transition, then holds the guard so none starts.
    pub(crate) async fn begin(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.transition.lock().await
    }
}

impl std::fmt::Debug for LifecycleComponent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (status, errors) = self.state();
        f.debug_struct("LifecycleComponent")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("component_type", &self.component_type)
            .field("status", &status)
            .field("errors", &errors)
            .field("children", &self.children.read().len())
            .finish()
    }
}

fn push_bounded(errors: &mut VecDeque<String>, message: String, limit: usize) {
    errors.push_back(message);
    while errors.len() > limit {
        errors.pop_front();
    }
}

/// Capability shared by everything that has a running state.
///
/// Implementors provide [`Lifecycle::component`] and override the hooks they
/// need. Hooks run while the component is in the matching in-flight status; an
/// error returned from a hook is recorded in the error stack and moves the
/// component to the operation's failure status.
#[async_trait]
pub trait Lifecycle: Send + Sync + 'static {
    fn component(&self) -> &LifecycleComponent;

    // --- Hooks ---

    async fn on_initialize(&self) -> std::result::Result<(), BoxError> {
        Ok(())
    }

    async fn on_start(&self) -> std::result::Result<(), BoxError> {
        Ok(())
    }

    async fn on_pause(&self) -> std::result::Result<(), BoxError> {
        Ok(())
    }

    async fn on_resume(&self) -> std::result::Result<(), BoxError> {
        Ok(())
    }

    async fn on_stop(&self) -> std::result::Result<(), BoxError> {
        Ok(())
    }

    async fn on_terminate(&self) -> std::result::Result<(), BoxError> {
        Ok(())
    }

    // --- Transitions ---

    /// Runs `operation` on this component and cascades it to the children.
    async fn transition(&self, operation: LifecycleOperation) -> Result<()> {
        engine::drive(self, operation).await
    }

    async fn initialize(&self) -> Result<()> {
        self.transition(LifecycleOperation::Initialize).await
    }

    async fn start(&self) -> Result<()> {
        self.transition(LifecycleOperation::Start).await
    }

    async fn pause(&self) -> Result<()> {
        self.transition(LifecycleOperation::Pause).await
    }

    async fn resume(&self) -> Result<()> {
        self.transition(LifecycleOperation::Resume).await
    }

    async fn stop(&self) -> Result<()> {
        self.transition(LifecycleOperation::Stop).await
    }

    async fn terminate(&self) -> Result<()> {
        self.transition(LifecycleOperation::Terminate).await
    }

    fn status(&self) -> LifecycleStatus {
        self.component().status()
    }
}
