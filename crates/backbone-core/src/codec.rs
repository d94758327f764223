//! # Payload Codecs
//!
//! Stable `encode(value) -> bytes` / `decode(bytes) -> value` pairs for payloads
//! that leave the process, whether as RPC bodies or as messages handed to the
//! event-stream pipeline. A decode failure is always a typed [`CodecError`];
//! callers never see a partially decoded value and decide themselves whether a
//! bad payload is retried or dead-lettered.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Failed to encode {type_name}: {reason}")]
    Encode {
        type_name: &'static str,
        reason: String,
    },
    #[error("Failed to decode {type_name}: {reason}")]
    Decode {
        type_name: &'static str,
        reason: String,
    },
}

/// Encoder/decoder for one payload type.
pub trait PayloadCodec<T>: Send + Sync {
    fn encode(&self, value: &T) -> Result<Bytes, CodecError>;

    fn decode(&self, bytes: &[u8]) -> Result<T, CodecError>;
}

/// JSON codec for any serde type.
pub struct JsonCodec<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonCodec<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for JsonCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for JsonCodec<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> PayloadCodec<T> for JsonCodec<T>
where
    T: Serialize + DeserializeOwned,
{
    fn encode(&self, value: &T) -> Result<Bytes, CodecError> {
        serde_json::to_vec(value)
            .map(Bytes::from)
            .map_err(|e| CodecError::Encode {
                type_name: short_type_name::<T>(),
                reason: e.to_string(),
            })
    }

    fn decode(&self, bytes: &[u8]) -> Result<T, CodecError> {
        serde_json::from_slice(bytes).map_err(|e| CodecError::Decode {
            type_name: short_type_name::<T>(),
            reason: e.to_string(),
        })
    }
}

/// Extract just the type name (e.g. "DeviceState" instead of "device_backbone::api::DeviceState").
pub(crate) fn short_type_name<T>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}
