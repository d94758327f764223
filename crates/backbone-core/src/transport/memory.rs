//! In-memory transport: routes calls to [`ServiceHandler`]s bound in the same
//! process, keyed by target address.
//!
//! Unbinding a target severs every transport already connected to it, which is
//! how tests simulate a peer going away mid-session.

use super::{FrameStream, RpcRequest, Transport, TransportConnector, TransportError};
use crate::locator::ServiceTarget;
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

const STREAM_BUFFER: usize = 32;

/// Server side of an in-memory endpoint.
#[async_trait]
pub trait ServiceHandler: Send + Sync {
    async fn handle(&self, request: RpcRequest) -> Result<Bytes, TransportError>;

    /// Pushes frames into `frames` until done. A send error means the caller
    /// cancelled and the handler should return.
    async fn handle_stream(
        &self,
        request: RpcRequest,
        frames: mpsc::Sender<Result<Bytes, TransportError>>,
    ) -> Result<(), TransportError> {
        let _ = frames;
        Err(TransportError::status(
            "UNIMPLEMENTED",
            format!("{} does not stream", request.method),
        ))
    }
}

#[derive(Clone)]
struct Endpoint {
    handler: Arc<dyn ServiceHandler>,
    alive: Arc<AtomicBool>,
}

/// Connector over a process-local table of endpoints.
#[derive(Clone, Default)]
pub struct MemoryConnector {
    endpoints: Arc<DashMap<ServiceTarget, Endpoint>>,
    connects: Arc<AtomicUsize>,
    connect_delay: Option<Duration>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every `connect` take at least `delay`.
    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = Some(delay);
        self
    }

    pub fn bind(&self, target: ServiceTarget, handler: Arc<dyn ServiceHandler>) {
        info!(%target, "Endpoint bound");
        self.endpoints.insert(
            target,
            Endpoint {
                handler,
                alive: Arc::new(AtomicBool::new(true)),
            },
        );
    }

    /// Removes the endpoint and severs transports already connected to it.
    pub fn unbind(&self, target: &ServiceTarget) {
        if let Some((_, endpoint)) = self.endpoints.remove(target) {
            endpoint.alive.store(false, Ordering::SeqCst);
            info!(%target, "Endpoint unbound");
        }
    }

    /// Total successful and failed connection attempts.
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransportConnector for MemoryConnector {
    async fn connect(&self, target: &ServiceTarget) -> Result<Arc<dyn Transport>, TransportError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.connect_delay {
            tokio::time::sleep(delay).await;
        }
        let endpoint = self
            .endpoints
            .get(target)
            .map(|e| e.clone())
            .ok_or_else(|| TransportError::ConnectFailed {
                target: target.to_string(),
                reason: "no endpoint bound".to_string(),
            })?;

        let transport = MemoryTransport {
            id: Uuid::new_v4(),
            target: target.clone(),
            endpoint,
            closed: AtomicBool::new(false),
        };
        debug!(%target, id = %transport.id, "Connected");
        Ok(Arc::new(transport))
    }
}

struct MemoryTransport {
    id: Uuid,
    target: ServiceTarget,
    endpoint: Endpoint,
    closed: AtomicBool,
}

impl MemoryTransport {
    fn check_usable(&self) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        if !self.endpoint.alive.load(Ordering::SeqCst) {
            return Err(TransportError::Disconnected(format!(
                "{} went away",
                self.target
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn unary(&self, request: RpcRequest) -> Result<Bytes, TransportError> {
        self.check_usable()?;
        self.endpoint.handler.handle(request).await
    }

    async fn server_stream(&self, request: RpcRequest) -> Result<FrameStream, TransportError> {
        self.check_usable()?;
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let handler = Arc::clone(&self.endpoint.handler);
        tokio::spawn(async move {
            if let Err(e) = handler.handle_stream(request, tx.clone()).await {
                let _ = tx.send(Err(e)).await;
            }
        });
        Ok(rx)
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!(target = %self.target, id = %self.id, "Closed");
        }
    }
}
