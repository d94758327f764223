//! # API Channel
//!
//! Client-side handle to one RPC service of a remote function. A channel holds a
//! single transport shared by all of its callers and is itself a lifecycle
//! component:
//!
//! | Transition | Channel behavior |
//! |------------|------------------|
//! | `initialize` | validates configuration, registers with the locator, drops any stale transport |
//! | `start` | performs the first [`ApiChannel::connect`]; failure leaves the channel in `StartError` |
//! | `stop` / `terminate` | closes and releases the transport (no-op without one) |
//!
//! ## Call surfaces
//! - [`ApiChannel::blocking_call`]: typed request/response under the instance call timeout.
//! - [`ApiChannel::streaming_call`]: typed server stream; responses go to a
//!   [`StreamHandler`] on a channel-spawned task, FIFO per call.
//! - [`ApiChannel::call_raw`] / [`ApiChannel::stream_raw`]: the same over raw bytes.
//!
//! Calls are only accepted while the channel is `Started`.
//!
//! ## Failure detection
//! A dropped connection, on a unary call or in the middle of a stream, or
//! `failure_threshold` consecutive timeouts, moves a `Started` channel to
//! `LifecycleError`. The channel never reconnects by
//! itself; the owner re-initializes and restarts it.

use crate::codec::{JsonCodec, PayloadCodec};
use crate::context::InstanceContext;
use crate::error::{BackboneError, BoxError, Result};
use crate::identity::{FunctionIdentifier, ServiceIdentifier};
use crate::lifecycle::{ComponentType, Lifecycle, LifecycleComponent, LifecycleStatus};
use crate::locator::ResolveRequest;
use crate::transport::{CallMetadata, FrameStream, RpcRequest, Transport, TransportError};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// One RPC method of a service, with its request and response types.
///
/// Both types are shared by the client and the serving side, so they travel in
/// both directions.
///
/// ```rust
/// use backbone_core::channel::ApiMethod;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct GetDeviceState { device_token: String }
///
/// #[derive(Serialize, Deserialize)]
/// struct DeviceState { presence: String }
///
/// struct GetDeviceStateMethod;
///
/// impl ApiMethod for GetDeviceStateMethod {
///     const NAME: &'static str = "getDeviceState";
///     type Request = GetDeviceState;
///     type Response = DeviceState;
/// }
/// ```
pub trait ApiMethod: Send + Sync + 'static {
    const NAME: &'static str;
    type Request: Serialize + DeserializeOwned + Send + Sync;
    type Response: Serialize + DeserializeOwned + Send + 'static;
}

/// Receives the responses of one streaming call, in order.
///
/// After `on_error` or `on_complete` the handler is dropped and never called
/// again. Neither is called when the stream is cancelled.
#[async_trait]
pub trait StreamHandler<T: Send + 'static>: Send + 'static {
    async fn on_next(&mut self, item: T);

    async fn on_error(&mut self, error: BackboneError) {
        let _ = error;
    }

    async fn on_complete(&mut self) {}
}

/// Handle to a running streaming call.
///
/// Dropping the handle cancels the stream without waiting for the dispatcher.
pub struct StreamHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
    grace: Duration,
}

impl StreamHandle {
    /// Stops delivery and releases the stream.
    ///
    /// Waits up to the grace period for an in-flight handler call to finish,
    /// then aborts the dispatcher. Once this returns the handler is never
    /// invoked again.
    pub async fn cancel(mut self) {
        self.cancel.cancel();
        let Some(mut task) = self.task.take() else {
            return;
        };
        if tokio::time::timeout(self.grace, &mut task).await.is_err() {
            warn!(grace = ?self.grace, "Stream dispatcher did not stop in time, aborting");
            task.abort();
            let _ = task.await;
        }
    }

    /// Waits for the stream to finish on its own.
    pub async fn join(mut self) {
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        if self.task.is_some() {
            self.cancel.cancel();
        }
    }
}

/// Typed client for one (function, service) pair.
pub struct ApiChannel {
    node: Arc<LifecycleComponent>,
    function: FunctionIdentifier,
    service: ServiceIdentifier,
    port: u16,
    context: InstanceContext,
    transport: RwLock<Option<Arc<dyn Transport>>>,
    consecutive_failures: AtomicU32,
}

impl ApiChannel {
    pub fn new(
        function: FunctionIdentifier,
        service: ServiceIdentifier,
        context: InstanceContext,
    ) -> Self {
        let node = LifecycleComponent::new(format!("{function}:{service}"), ComponentType::ApiChannel)
            .with_error_limit(context.settings().error_stack_limit)
            .with_monitor(Arc::clone(context.monitor()));
        Self {
            node: Arc::new(node),
            port: context.settings().grpc_port,
            function,
            service,
            context,
            transport: RwLock::new(None),
            consecutive_failures: AtomicU32::new(0),
        }
    }

    /// Targets a port other than the instance default.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn function(&self) -> &FunctionIdentifier {
        &self.function
    }

    pub fn service(&self) -> &ServiceIdentifier {
        &self.service
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn context(&self) -> &InstanceContext {
        &self.context
    }

    pub fn is_connected(&self) -> bool {
        self.transport.read().is_some()
    }

    /// Resolves the target and establishes the transport of a `Started`
    /// channel. Safe to call when already connected.
    ///
    /// Holds the lifecycle transition lock, so it never interleaves with a
    /// transition releasing the transport; a channel that is not `Started`
    /// once the lock is held is refused.
    #[instrument(skip(self), fields(channel = %self.node.name()))]
    pub async fn connect(&self) -> Result<()> {
        if self.node.status() == LifecycleStatus::Started && self.is_connected() {
            return Ok(());
        }
        let _guard = self.node.begin().await;
        let status = self.node.status();
        if status != LifecycleStatus::Started {
            return Err(BackboneError::ChannelNotStarted {
                channel: self.node.name().to_string(),
                status,
            });
        }
        self.establish().await
    }

    /// Connects unless connected. Callers hold the transition lock.
    async fn establish(&self) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }
        let request = ResolveRequest::new(self.function.clone(), self.service.clone())
            .with_port(self.port);
        let target = self.context.locator().resolve(&request).await?;
        let transport = self
            .context
            .connector()
            .connect(&target)
            .await
            .map_err(|e| BackboneError::TransportFailure(e.to_string()))?;

        *self.transport.write() = Some(transport);
        self.consecutive_failures.store(0, Ordering::SeqCst);
        info!(%target, "Connected");
        Ok(())
    }

    async fn release(&self) {
        let transport = self.transport.write().take();
        if let Some(transport) = transport {
            transport.close().await;
            debug!(channel = self.node.name(), "Transport released");
        }
    }

    fn ready_transport(&self) -> Result<Arc<dyn Transport>> {
        let status = self.node.status();
        if status != LifecycleStatus::Started {
            return Err(BackboneError::ChannelNotStarted {
                channel: self.node.name().to_string(),
                status,
            });
        }
        self.transport
            .read()
            .clone()
            .ok_or_else(|| BackboneError::TransportFailure("not connected".to_string()))
    }

    fn request(&self, method: &str, metadata: CallMetadata, payload: Bytes) -> RpcRequest {
        RpcRequest {
            service: self.service.clone(),
            method: method.to_string(),
            metadata,
            payload,
        }
    }

    /// Unary call over raw bytes.
    pub async fn call_raw(&self, method: &str, metadata: CallMetadata, payload: Bytes) -> Result<Bytes> {
        let transport = self.ready_transport()?;
        let timeout = self.context.settings().call_timeout();
        let call = transport.unary(self.request(method, metadata, payload));

        match tokio::time::timeout(timeout, call).await {
            Ok(Ok(bytes)) => {
                self.consecutive_failures.store(0, Ordering::SeqCst);
                Ok(bytes)
            }
            Ok(Err(e)) => Err(self.transport_error(e)),
            Err(_) => {
                self.note_timeout(method);
                Err(BackboneError::CallTimeout(timeout))
            }
        }
    }

    /// Typed request/response call.
    #[instrument(skip_all, fields(channel = %self.node.name(), method = M::NAME))]
    pub async fn blocking_call<M: ApiMethod>(
        &self,
        request: &M::Request,
        metadata: CallMetadata,
    ) -> Result<M::Response> {
        debug!("Sending request");
        let payload = JsonCodec::<M::Request>::new().encode(request)?;
        let bytes = self.call_raw(M::NAME, metadata, payload).await?;
        Ok(JsonCodec::<M::Response>::new().decode(&bytes)?)
    }

    /// Opens a server stream over raw bytes. Dropping the receiver cancels it.
    pub async fn stream_raw(&self, method: &str, metadata: CallMetadata, payload: Bytes) -> Result<FrameStream> {
        let transport = self.ready_transport()?;
        transport
            .server_stream(self.request(method, metadata, payload))
            .await
            .map_err(|e| self.transport_error(e))
    }

    /// Typed server stream delivered to `handler` on a channel-owned task.
    #[instrument(skip_all, fields(channel = %self.node.name(), method = M::NAME))]
    pub async fn streaming_call<M, H>(
        &self,
        request: &M::Request,
        metadata: CallMetadata,
        handler: H,
    ) -> Result<StreamHandle>
    where
        M: ApiMethod,
        H: StreamHandler<M::Response>,
    {
        let payload = JsonCodec::<M::Request>::new().encode(request)?;
        let frames = self.stream_raw(M::NAME, metadata, payload).await?;
        let cancel = CancellationToken::new();
        let task = tokio::spawn(dispatch::<M, H>(
            frames,
            handler,
            Arc::clone(&self.node),
            cancel.clone(),
        ));
        debug!("Stream opened");
        Ok(StreamHandle {
            cancel,
            task: Some(task),
            grace: self.context.settings().stream_cancel_grace(),
        })
    }

    fn transport_error(&self, error: TransportError) -> BackboneError {
        match error {
            TransportError::Status { code, message } => {
                self.consecutive_failures.store(0, Ordering::SeqCst);
                BackboneError::Remote { code, message }
            }
            other => {
                let message = format!("Transport failure: {other}");
                self.node.fail(message.as_str());
                BackboneError::TransportFailure(other.to_string())
            }
        }
    }

    fn note_timeout(&self, method: &str) {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        let threshold = self.context.settings().failure_threshold;
        warn!(channel = self.node.name(), method, failures, "Call timed out");
        if threshold > 0 && failures >= threshold {
            self.node
                .fail(format!("{failures} consecutive calls failed (last: {method} timed out)"));
        }
    }
}

async fn dispatch<M, H>(
    mut frames: FrameStream,
    mut handler: H,
    node: Arc<LifecycleComponent>,
    cancel: CancellationToken,
) where
    M: ApiMethod,
    H: StreamHandler<M::Response>,
{
    let codec = JsonCodec::<M::Response>::new();
    loop {
        let frame = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            frame = frames.recv() => frame,
        };
        match frame {
            Some(Ok(bytes)) => match codec.decode(&bytes) {
                Ok(item) => {
                    if cancel.is_cancelled() {
                        break;
                    }
                    handler.on_next(item).await;
                }
                Err(e) => {
                    handler.on_error(e.into()).await;
                    break;
                }
            },
            Some(Err(TransportError::Status { code, message })) => {
                handler.on_error(BackboneError::Remote { code, message }).await;
                break;
            }
            Some(Err(e)) => {
                node.fail(format!("Transport failure: {e}"));
                handler.on_error(BackboneError::TransportFailure(e.to_string())).await;
                break;
            }
            None => {
                handler.on_complete().await;
                break;
            }
        }
    }
    debug!(method = M::NAME, "Stream dispatcher exited");
}

#[async_trait]
impl Lifecycle for ApiChannel {
    fn component(&self) -> &LifecycleComponent {
        &self.node
    }

    async fn on_initialize(&self) -> std::result::Result<(), BoxError> {
        if self.function.name().is_empty() {
            return Err(BackboneError::InvalidConfiguration("function name is empty".into()).into());
        }
        if self.service.as_str().is_empty() {
            return Err(BackboneError::InvalidConfiguration("service name is empty".into()).into());
        }
        if self.port == 0 {
            return Err(BackboneError::InvalidConfiguration("port must be non-zero".into()).into());
        }
        self.release().await;
        self.consecutive_failures.store(0, Ordering::SeqCst);
        self.context.locator().register(&self.function, &self.service);
        Ok(())
    }

    async fn on_start(&self) -> std::result::Result<(), BoxError> {
        self.establish().await?;
        Ok(())
    }

    async fn on_stop(&self) -> std::result::Result<(), BoxError> {
        self.release().await;
        Ok(())
    }

    async fn on_terminate(&self) -> std::result::Result<(), BoxError> {
        self.release().await;
        Ok(())
    }
}

impl std::fmt::Debug for ApiChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiChannel")
            .field("function", &self.function)
            .field("service", &self.service)
            .field("port", &self.port)
            .field("status", &self.node.status())
            .field("connected", &self.is_connected())
            .finish()
    }
}
