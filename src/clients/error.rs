//! Error type shared by the typed platform clients.

use backbone_core::BackboneError;
use thiserror::Error;

/// Errors a platform client call can end in.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ClientError {
    /// The remote function has no such entity for the tenant.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The remote function rejected the request as malformed.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The remote function could not be reached, or the channel to it is down.
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Anything else that went wrong between the client and the remote function.
    #[error("Communication error: {0}")]
    Communication(String),
}

impl ClientError {
    /// Whether the same call may succeed later without the caller changing it.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ClientError::Unavailable(_))
    }
}

impl From<BackboneError> for ClientError {
    fn from(e: BackboneError) -> Self {
        match e {
            BackboneError::Remote { code, message } => match code.as_str() {
                "NOT_FOUND" => ClientError::NotFound(message),
                "INVALID_ARGUMENT" => ClientError::InvalidRequest(message),
                "UNAVAILABLE" => ClientError::Unavailable(message),
                _ => ClientError::Communication(format!("{code}: {message}")),
            },
            e @ (BackboneError::ChannelNotStarted { .. }
            | BackboneError::TargetUnavailable { .. }
            | BackboneError::CallTimeout(_)
            | BackboneError::TransportFailure(_)) => ClientError::Unavailable(e.to_string()),
            other => ClientError::Communication(other.to_string()),
        }
    }
}

impl From<String> for ClientError {
    fn from(msg: String) -> Self {
        ClientError::Communication(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_remote_codes_are_classified() {
        let not_found = ClientError::from(BackboneError::Remote {
            code: "NOT_FOUND".into(),
            message: "asset 'pump-7'".into(),
        });
        assert_eq!(not_found, ClientError::NotFound("asset 'pump-7'".into()));

        let other = ClientError::from(BackboneError::Remote {
            code: "INTERNAL".into(),
            message: "boom".into(),
        });
        assert_eq!(other, ClientError::Communication("INTERNAL: boom".into()));
    }

    #[test]
    fn test_channel_failures_are_retryable() {
        let timeout = ClientError::from(BackboneError::CallTimeout(Duration::from_secs(1)));
        assert!(timeout.is_retryable());
        assert!(!ClientError::InvalidRequest("empty token".into()).is_retryable());
    }
}
