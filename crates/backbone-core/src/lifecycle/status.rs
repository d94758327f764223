//! # Lifecycle Status & Operations
//!
//! [`LifecycleStatus`] is the state a component is in; [`LifecycleOperation`] is
//! what an owner asks it to do. The transition table lives on the operation:
//!
//! | Operation    | Legal from                                              | In flight    | Success     | Failure           |
//! |--------------|---------------------------------------------------------|--------------|-------------|-------------------|
//! | `initialize` | Unknown, Stopped, any `*Error`                          | Initializing | Initialized | InitializeError   |
//! | `start`      | Initialized                                             | Starting     | Started     | StartError        |
//! | `pause`      | Started                                                 | Pausing      | Paused      | LifecycleError    |
//! | `resume`     | Paused                                                  | Starting     | Started     | StartError        |
//! | `stop`       | Started, Paused, Initialized, any `*Error`              | Stopping     | Stopped     | StopError         |
//! | `terminate`  | Unknown, Initialized, Stopped, any `*Error`             | Terminating  | Terminated  | LifecycleError    |
//!
//! `stop` from Unknown/Stopped/Terminated and `terminate` from Terminated succeed
//! without doing anything, which makes both idempotent.

use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Running state of a lifecycle component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum LifecycleStatus {
    #[default]
    Unknown,
    Initializing,
    Initialized,
    InitializeError,
    Starting,
    Started,
    StartError,
    Pausing,
    Paused,
    Stopping,
    Stopped,
    StopError,
    Terminating,
    Terminated,
    LifecycleError,
}

impl LifecycleStatus {
    pub fn is_error(self) -> bool {
        matches!(
            self,
            LifecycleStatus::InitializeError
                | LifecycleStatus::StartError
                | LifecycleStatus::StopError
                | LifecycleStatus::LifecycleError
        )
    }

    /// True while a transition is running.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            LifecycleStatus::Initializing
                | LifecycleStatus::Starting
                | LifecycleStatus::Pausing
                | LifecycleStatus::Stopping
                | LifecycleStatus::Terminating
        )
    }

    /// Ranking used when rolling a tree up into one status. Higher is worse.
    pub fn severity(self) -> u8 {
        match self {
            LifecycleStatus::Started => 0,
            LifecycleStatus::Initialized | LifecycleStatus::Paused => 1,
            LifecycleStatus::Stopped | LifecycleStatus::Terminated => 2,
            LifecycleStatus::Unknown => 3,
            LifecycleStatus::Initializing
            | LifecycleStatus::Starting
            | LifecycleStatus::Pausing
            | LifecycleStatus::Stopping
            | LifecycleStatus::Terminating => 4,
            LifecycleStatus::InitializeError
            | LifecycleStatus::StartError
            | LifecycleStatus::StopError
            | LifecycleStatus::LifecycleError => 5,
        }
    }
}

impl Display for LifecycleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// A lifecycle call an owner can make on a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleOperation {
    Initialize,
    Start,
    Pause,
    Resume,
    Stop,
    Terminate,
}

impl LifecycleOperation {
    /// Whether the operation may run from `current`.
    pub fn is_legal_from(self, current: LifecycleStatus) -> bool {
        use LifecycleStatus::*;
        match self {
            LifecycleOperation::Initialize => {
                matches!(current, Unknown | Stopped) || current.is_error()
            }
            LifecycleOperation::Start => current == Initialized,
            LifecycleOperation::Pause => current == Started,
            LifecycleOperation::Resume => current == Paused,
            LifecycleOperation::Stop => {
                matches!(current, Started | Paused | Initialized) || current.is_error()
            }
            LifecycleOperation::Terminate => {
                matches!(current, Unknown | Initialized | Stopped) || current.is_error()
            }
        }
    }

    /// Whether the operation has nothing to do from `current` and succeeds as-is.
    pub fn is_noop_from(self, current: LifecycleStatus) -> bool {
        use LifecycleStatus::*;
        match self {
            LifecycleOperation::Stop => matches!(current, Unknown | Stopped | Terminated),
            LifecycleOperation::Terminate => current == Terminated,
            _ => false,
        }
    }

    pub fn in_flight_status(self) -> LifecycleStatus {
        match self {
            LifecycleOperation::Initialize => LifecycleStatus::Initializing,
            LifecycleOperation::Start | LifecycleOperation::Resume => LifecycleStatus::Starting,
            LifecycleOperation::Pause => LifecycleStatus::Pausing,
            LifecycleOperation::Stop => LifecycleStatus::Stopping,
            LifecycleOperation::Terminate => LifecycleStatus::Terminating,
        }
    }

    pub fn success_status(self) -> LifecycleStatus {
        match self {
            LifecycleOperation::Initialize => LifecycleStatus::Initialized,
            LifecycleOperation::Start | LifecycleOperation::Resume => LifecycleStatus::Started,
            LifecycleOperation::Pause => LifecycleStatus::Paused,
            LifecycleOperation::Stop => LifecycleStatus::Stopped,
            LifecycleOperation::Terminate => LifecycleStatus::Terminated,
        }
    }

    pub fn failure_status(self) -> LifecycleStatus {
        match self {
            LifecycleOperation::Initialize => LifecycleStatus::InitializeError,
            LifecycleOperation::Start | LifecycleOperation::Resume => LifecycleStatus::StartError,
            LifecycleOperation::Stop => LifecycleStatus::StopError,
            LifecycleOperation::Pause | LifecycleOperation::Terminate => {
                LifecycleStatus::LifecycleError
            }
        }
    }

    /// Children are visited in declaration order for these operations and in
    /// reverse order (before the parent's own hook) for the others.
    pub fn cascades_forward(self) -> bool {
        matches!(
            self,
            LifecycleOperation::Initialize | LifecycleOperation::Start | LifecycleOperation::Resume
        )
    }

    pub fn verb(self) -> &'static str {
        match self {
            LifecycleOperation::Initialize => "initialize",
            LifecycleOperation::Start => "start",
            LifecycleOperation::Pause => "pause",
            LifecycleOperation::Resume => "resume",
            LifecycleOperation::Stop => "stop",
            LifecycleOperation::Terminate => "terminate",
        }
    }
}

impl Display for LifecycleOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.verb())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [LifecycleStatus; 15] = [
        LifecycleStatus::Unknown,
        LifecycleStatus::Initializing,
        LifecycleStatus::Initialized,
        LifecycleStatus::InitializeError,
        LifecycleStatus::Starting,
        LifecycleStatus::Started,
        LifecycleStatus::StartError,
        LifecycleStatus::Pausing,
        LifecycleStatus::Paused,
        LifecycleStatus::Stopping,
        LifecycleStatus::Stopped,
        LifecycleStatus::StopError,
        LifecycleStatus::Terminating,
        LifecycleStatus::Terminated,
        LifecycleStatus::LifecycleError,
    ];

    #[test]
    fn test_start_only_legal_from_initialized() {
        for status in ALL {
            assert_eq!(
                LifecycleOperation::Start.is_legal_from(status),
                status == LifecycleStatus::Initialized,
                "start from {status}"
            );
        }
    }

    #[test]
    fn test_restart_requires_initialize() {
        assert!(!LifecycleOperation::Start.is_legal_from(LifecycleStatus::Stopped));
        assert!(LifecycleOperation::Initialize.is_legal_from(LifecycleStatus::Stopped));
        assert!(LifecycleOperation::Initialize.is_legal_from(LifecycleStatus::StartError));
        assert!(!LifecycleOperation::Initialize.is_legal_from(LifecycleStatus::Terminated));
    }

    #[test]
    fn test_transient_statuses_accept_nothing() {
        let ops = [
            LifecycleOperation::Initialize,
            LifecycleOperation::Start,
            LifecycleOperation::Pause,
            LifecycleOperation::Resume,
            LifecycleOperation::Stop,
            LifecycleOperation::Terminate,
        ];
        for status in ALL.into_iter().filter(|s| s.is_transient()) {
            for op in ops {
                assert!(!op.is_legal_from(status), "{op} from {status}");
                assert!(!op.is_noop_from(status), "{op} from {status}");
            }
        }
    }

    #[test]
    fn test_error_statuses_rank_worst() {
        let worst = ALL.into_iter().max_by_key(|s| s.severity()).unwrap();
        assert!(worst.is_error());
        assert!(LifecycleStatus::Started.severity() < LifecycleStatus::Stopped.severity());
    }
}
