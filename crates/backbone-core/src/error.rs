//! # Backbone Errors
//!
//! This module defines the error taxonomy shared by lifecycle components, the
//! service locator and API channels. Lifecycle failures are also recorded in the
//! failing component's error stack; call-path failures are only returned to the
//! caller of that call.

use crate::codec::CodecError;
use crate::lifecycle::{LifecycleOperation, LifecycleStatus};
use crate::settings::SettingsError;
use std::time::Duration;

/// Boxed error returned by lifecycle hooks and collaborators.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result type alias for backbone operations.
pub type Result<T, E = BackboneError> = std::result::Result<T, E>;

/// Errors that can occur within the backbone itself.
#[derive(Debug, thiserror::Error)]
pub enum BackboneError {
    /// The requested operation is not legal from the component's current status.
    #[error("Invalid lifecycle transition for '{component}': cannot {requested} from {current}")]
    InvalidLifecycleTransition {
        component: String,
        current: LifecycleStatus,
        requested: LifecycleOperation,
    },

    /// Another transition is already running on the same component.
    #[error("Transition already in flight for '{component}' (requested {requested})")]
    ConcurrentTransition {
        component: String,
        requested: LifecycleOperation,
    },

    /// The component's own hook or one of its children failed.
    #[error("Component '{component}' failed to {operation} and is now {status}: {message}")]
    TransitionFailed {
        component: String,
        operation: LifecycleOperation,
        status: LifecycleStatus,
        message: String,
    },

    /// Service discovery could not produce a target.
    #[error("Target unavailable for {function}/{service}: {reason}")]
    TargetUnavailable {
        function: String,
        service: String,
        reason: String,
    },

    /// A blocking call did not complete within its deadline.
    #[error("Call timed out after {0:?}")]
    CallTimeout(Duration),

    /// The channel's transport is broken.
    #[error("Transport failure: {0}")]
    TransportFailure(String),

    /// Calls are only accepted while the channel is started.
    #[error("Channel '{channel}' is not started (status {status})")]
    ChannelNotStarted {
        channel: String,
        status: LifecycleStatus,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    /// The remote service answered with an error.
    #[error("Remote error {code}: {message}")]
    Remote { code: String, message: String },
}

impl BackboneError {
    /// Whether a caller may retry the failed operation as-is (possibly after backoff).
    ///
    /// Transport failures are not retryable on the same channel: the owner has to
    /// re-initialize and restart it first.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BackboneError::ConcurrentTransition { .. }
                | BackboneError::TargetUnavailable { .. }
                | BackboneError::CallTimeout(_)
        )
    }
}
