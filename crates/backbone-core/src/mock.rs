//! # Test Doubles
//!
//! In-memory stand-ins for the collaborators the backbone talks to, so channels,
//! trees and engines can be exercised deterministically without a cluster.
//!
//! | Double | Replaces | Observability |
//! |--------|----------|---------------|
//! | [`MockService`] | a remote RPC service (bind it on a [`MemoryConnector`](crate::transport::memory::MemoryConnector)) | scripted responses, received requests, [`MockService::verify`] |
//! | [`StaticRegistry`] | the orchestration service registry | resolve counter, push feed |
//! | [`RecordingMonitor`] | the monitoring collaborator | recorded progress and errors |
//! | [`TestComponent`] | any lifecycle component | hook journal, failure injection, slow hooks |
//!
//! ## Scripting a service
//!
//! ```rust
//! use backbone_core::mock::MockService;
//! use backbone_core::transport::TransportError;
//!
//! let service = MockService::new();
//! service.expect_call("getDeviceState").return_json(&serde_json::json!({"presence": "online"}));
//! service.expect_call("getDeviceState").return_err(TransportError::status("NOT_FOUND", "no such device"));
//! ```
//!
//! Queued expectations are consumed in order. Requests with no matching
//! expectation fall back to a standing responder registered with
//! [`MockService::respond_with`], or fail with an `UNEXPECTED` status that
//! [`MockService::verify`] later reports.

use crate::error::BoxError;
use crate::identity::{FunctionIdentifier, ServiceIdentifier};
use crate::lifecycle::{ComponentType, Lifecycle, LifecycleComponent, LifecycleOperation};
use crate::locator::{RegistryError, ResolveRequest, ServiceRegistry, ServiceTarget, TargetChange, TargetKey};
use crate::monitor::{ProgressMonitor, ProgressReport};
use crate::transport::memory::ServiceHandler;
use crate::transport::{RpcRequest, TransportError};
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

// =============================================================================
// SCRIPTED SERVICE
// =============================================================================

type Responder = Arc<dyn Fn(&RpcRequest) -> Result<Bytes, TransportError> + Send + Sync>;

enum Expectation {
    Unary {
        method: String,
        delay: Option<Duration>,
        response: Result<Bytes, TransportError>,
    },
    Stream {
        method: String,
        interval: Option<Duration>,
        frames: Vec<Result<Bytes, TransportError>>,
    },
}

impl Expectation {
    fn method(&self) -> &str {
        match self {
            Expectation::Unary { method, .. } | Expectation::Stream { method, .. } => method,
        }
    }
}

/// Scripted RPC service.
#[derive(Clone, Default)]
pub struct MockService {
    expectations: Arc<Mutex<VecDeque<Expectation>>>,
    responders: Arc<DashMap<String, Responder>>,
    received: Arc<Mutex<Vec<RpcRequest>>>,
    unexpected: Arc<Mutex<Vec<String>>>,
}

impl MockService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the response for the next unary call of `method`.
    pub fn expect_call(&self, method: &str) -> UnaryExpectationBuilder {
        UnaryExpectationBuilder {
            method: method.to_string(),
            delay: None,
            expectations: Arc::clone(&self.expectations),
        }
    }

    /// Queues the frames for the next stream of `method`.
    pub fn expect_stream(&self, method: &str) -> StreamExpectationBuilder {
        StreamExpectationBuilder {
            method: method.to_string(),
            interval: None,
            expectations: Arc::clone(&self.expectations),
        }
    }

    /// Answers every unqueued unary call of `method` with `responder`.
    pub fn respond_with<F>(&self, method: &str, responder: F)
    where
        F: Fn(&RpcRequest) -> Result<Bytes, TransportError> + Send + Sync + 'static,
    {
        self.responders.insert(method.to_string(), Arc::new(responder));
    }

    /// Every request received so far, in arrival order.
    pub fn requests(&self) -> Vec<RpcRequest> {
        self.received.lock().clone()
    }

    /// Panics if an expectation was not consumed or a request was not expected.
    pub fn verify(&self) {
        let remaining = self.expectations.lock().len();
        if remaining > 0 {
            panic!("Not all expectations were met. {remaining} remaining");
        }
        let unexpected = self.unexpected.lock();
        if !unexpected.is_empty() {
            panic!("Unexpected requests: {unexpected:?}");
        }
    }

    fn next_expectation(&self, method: &str) -> Option<Expectation> {
        let mut expectations = self.expectations.lock();
        let index = expectations.iter().position(|e| e.method() == method)?;
        expectations.remove(index)
    }

    fn unexpected(&self, request: &RpcRequest) -> TransportError {
        self.unexpected.lock().push(request.method.clone());
        TransportError::status("UNEXPECTED", format!("no expectation for {}", request.method))
    }
}

#[async_trait]
impl ServiceHandler for MockService {
    async fn handle(&self, request: RpcRequest) -> Result<Bytes, TransportError> {
        self.received.lock().push(request.clone());
        match self.next_expectation(&request.method) {
            Some(Expectation::Unary {
                delay, response, ..
            }) => {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                response
            }
            Some(Expectation::Stream { .. }) => Err(self.unexpected(&request)),
            None => match self.responders.get(&request.method).map(|r| Arc::clone(&r)) {
                Some(responder) => responder(&request),
                None => Err(self.unexpected(&request)),
            },
        }
    }

    async fn handle_stream(
        &self,
        request: RpcRequest,
        frames: mpsc::Sender<Result<Bytes, TransportError>>,
    ) -> Result<(), TransportError> {
        self.received.lock().push(request.clone());
        let Some(Expectation::Stream {
            interval,
            frames: scripted,
            ..
        }) = self.next_expectation(&request.method)
        else {
            return Err(self.unexpected(&request));
        };
        for frame in scripted {
            if let Some(interval) = interval {
                tokio::time::sleep(interval).await;
            }
            if frames.send(frame).await.is_err() {
                break;
            }
        }
        Ok(())
    }
}

/// Builder for unary expectations.
pub struct UnaryExpectationBuilder {
    method: String,
    delay: Option<Duration>,
    expectations: Arc<Mutex<VecDeque<Expectation>>>,
}

impl UnaryExpectationBuilder {
    /// Delays the response.
    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn return_bytes(self, payload: Bytes) {
        self.push(Ok(payload));
    }

    pub fn return_json<T: Serialize>(self, value: &T) {
        let payload = serde_json::to_vec(value).expect("mock response must serialize");
        self.push(Ok(Bytes::from(payload)));
    }

    pub fn return_err(self, error: TransportError) {
        self.push(Err(error));
    }

    fn push(self, response: Result<Bytes, TransportError>) {
        self.expectations.lock().push_back(Expectation::Unary {
            method: self.method,
            delay: self.delay,
            response,
        });
    }
}

/// Builder for stream expectations.
pub struct StreamExpectationBuilder {
    method: String,
    interval: Option<Duration>,
    expectations: Arc<Mutex<VecDeque<Expectation>>>,
}

impl StreamExpectationBuilder {
    /// Waits `interval` before each frame.
    pub fn every(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    pub fn return_frames(self, frames: Vec<Result<Bytes, TransportError>>) {
        self.expectations.lock().push_back(Expectation::Stream {
            method: self.method,
            interval: self.interval,
            frames,
        });
    }

    pub fn return_json<T: Serialize>(self, items: impl IntoIterator<Item = T>) {
        let frames = items
            .into_iter()
            .map(|item| {
                let payload = serde_json::to_vec(&item).expect("mock frame must serialize");
                Ok(Bytes::from(payload))
            })
            .collect();
        self.return_frames(frames);
    }
}

// =============================================================================
// SERVICE REGISTRY
// =============================================================================

/// Registry answering from a fixed table, with a push feed driven by the test.
pub struct StaticRegistry {
    targets: DashMap<TargetKey, ServiceTarget>,
    resolves: AtomicUsize,
    changes: broadcast::Sender<TargetChange>,
    delay: Mutex<Option<Duration>>,
}

impl Default for StaticRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl StaticRegistry {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(64);
        Self {
            targets: DashMap::new(),
            resolves: AtomicUsize::new(0),
            changes,
            delay: Mutex::new(None),
        }
    }

    pub fn set(&self, function: &FunctionIdentifier, service: &ServiceIdentifier, target: ServiceTarget) {
        self.targets.insert(TargetKey::new(function, service), target);
    }

    pub fn remove(&self, function: &FunctionIdentifier, service: &ServiceIdentifier) {
        self.targets.remove(&TargetKey::new(function, service));
    }

    /// Makes every resolve take `delay`, e.g. to trip the discovery timeout.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    /// Round trips made so far.
    pub fn resolve_count(&self) -> usize {
        self.resolves.load(Ordering::SeqCst)
    }

    pub fn publish(&self, change: TargetChange) {
        let _ = self.changes.send(change);
    }
}

#[async_trait]
impl ServiceRegistry for StaticRegistry {
    async fn resolve(&self, request: &ResolveRequest) -> Result<ServiceTarget, RegistryError> {
        self.resolves.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let key = request.key();
        self.targets
            .get(&key)
            .map(|t| t.clone())
            .ok_or_else(|| RegistryError::NotFound(key.to_string()))
    }

    fn subscribe(&self) -> Option<broadcast::Receiver<TargetChange>> {
        Some(self.changes.subscribe())
    }
}

// =============================================================================
// MONITOR
// =============================================================================

/// Monitor that keeps every report for later assertions.
#[derive(Default)]
pub struct RecordingMonitor {
    progress: Mutex<Vec<ProgressReport>>,
    errors: Mutex<Vec<String>>,
}

impl RecordingMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn progress(&self) -> Vec<ProgressReport> {
        self.progress.lock().clone()
    }

    /// Reports for one task, in order.
    pub fn progress_for(&self, task: &str) -> Vec<ProgressReport> {
        self.progress
            .lock()
            .iter()
            .filter(|r| r.task == task)
            .cloned()
            .collect()
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().clone()
    }
}

impl ProgressMonitor for RecordingMonitor {
    fn report_progress(&self, report: ProgressReport) {
        self.progress.lock().push(report);
    }

    fn report_error(&self, error: &str) {
        self.errors.lock().push(error.to_string());
    }
}

// =============================================================================
// LIFECYCLE COMPONENT
// =============================================================================

/// Shared, ordered record of hook invocations (`"name:verb"`).
pub type Journal = Arc<Mutex<Vec<String>>>;

pub fn journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}

/// Component whose hooks log to a journal and fail on demand.
pub struct TestComponent {
    node: LifecycleComponent,
    journal: Journal,
    failing: Mutex<Vec<LifecycleOperation>>,
    delay: Option<Duration>,
}

impl TestComponent {
    pub fn new(name: &str) -> Self {
        Self {
            node: LifecycleComponent::new(name, ComponentType::Custom("test".to_string())),
            journal: journal(),
            failing: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = journal;
        self
    }

    pub fn with_error_limit(mut self, limit: usize) -> Self {
        self.node = self.node.with_error_limit(limit);
        self
    }

    /// Makes every hook sleep for `delay` first.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Makes the hook for `operation` fail until [`TestComponent::heal`] is called.
    pub fn fail_on(&self, operation: LifecycleOperation) {
        self.failing.lock().push(operation);
    }

    pub fn heal(&self) {
        self.failing.lock().clear();
    }

    pub fn journal(&self) -> Vec<String> {
        self.journal.lock().clone()
    }

    async fn hook(&self, operation: LifecycleOperation) -> Result<(), BoxError> {
        self.journal
            .lock()
            .push(format!("{}:{}", self.node.name(), operation.verb()));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.lock().contains(&operation) {
            return Err(format!("injected {} failure", operation.verb()).into());
        }
        Ok(())
    }
}

#[async_trait]
impl Lifecycle for TestComponent {
    fn component(&self) -> &LifecycleComponent {
        &self.node
    }

    async fn on_initialize(&self) -> Result<(), BoxError> {
        self.hook(LifecycleOperation::Initialize).await
    }

    async fn on_start(&self) -> Result<(), BoxError> {
        self.hook(LifecycleOperation::Start).await
    }

    async fn on_pause(&self) -> Result<(), BoxError> {
        self.hook(LifecycleOperation::Pause).await
    }

    async fn on_resume(&self) -> Result<(), BoxError> {
        self.hook(LifecycleOperation::Resume).await
    }

    async fn on_stop(&self) -> Result<(), BoxError> {
        self.hook(LifecycleOperation::Stop).await
    }

    async fn on_terminate(&self) -> Result<(), BoxError> {
        self.hook(LifecycleOperation::Terminate).await
    }
}
