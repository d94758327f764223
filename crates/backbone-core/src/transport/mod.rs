//! # Transport
//!
//! The RPC seam under API channels. A [`TransportConnector`] turns a resolved
//! [`ServiceTarget`] into a connected [`Transport`]; a transport carries unary
//! calls and server streams of opaque byte payloads plus string metadata.
//!
//! Typed requests and responses never reach this layer: channels encode and
//! decode through a [`PayloadCodec`](crate::codec::PayloadCodec) before and
//! after. The in-memory implementation in [`memory`] backs tests and the demo
//! binary; a network implementation plugs in through the same two traits.

pub mod memory;

use crate::identity::{ServiceIdentifier, TenantId};
use crate::locator::ServiceTarget;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc;

pub const TENANT_METADATA_KEY: &str = "tenant-id";
pub const AUTHORIZATION_METADATA_KEY: &str = "authorization";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("Failed to connect to {target}: {reason}")]
    ConnectFailed { target: String, reason: String },
    #[error("Connection lost: {0}")]
    Disconnected(String),
    #[error("Remote error {code}: {message}")]
    Status { code: String, message: String },
    #[error("Transport closed")]
    Closed,
}

impl TransportError {
    pub fn status(code: impl Into<String>, message: impl Into<String>) -> Self {
        TransportError::Status {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Whether the connection itself is unusable, as opposed to one call failing.
    pub fn is_connection_failure(&self) -> bool {
        !matches!(self, TransportError::Status { .. })
    }
}

/// Per-call string metadata (headers).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallMetadata(BTreeMap<String, String>);

impl CallMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn tenant(&self) -> Option<TenantId> {
        self.get(TENANT_METADATA_KEY).map(TenantId::new)
    }

    pub fn authorization(&self) -> Option<&str> {
        self.get(AUTHORIZATION_METADATA_KEY)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

#[derive(Debug, Clone)]
pub struct RpcRequest {
    pub service: ServiceIdentifier,
    pub method: String,
    pub metadata: CallMetadata,
    pub payload: Bytes,
}

/// Frames of a server stream; the sender side closes the channel when the
/// stream completes.
pub type FrameStream = mpsc::Receiver<Result<Bytes, TransportError>>;

/// A connected client transport.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn unary(&self, request: RpcRequest) -> Result<Bytes, TransportError>;

    /// Opens a server stream. Dropping the returned receiver cancels it.
    async fn server_stream(&self, request: RpcRequest) -> Result<FrameStream, TransportError>;

    /// Releases the connection. Later calls fail with [`TransportError::Closed`].
    async fn close(&self);
}

#[async_trait]
pub trait TransportConnector: Send + Sync {
    async fn connect(&self, target: &ServiceTarget) -> Result<Arc<dyn Transport>, TransportError>;
}
