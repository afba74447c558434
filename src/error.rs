//! # Error Handling
//!
//! One error type covers the whole control core. Variants follow the
//! failure taxonomy of the system:
//!
//! - **Construction**: a pipeline description could not be realized
//! - **Runtime**: the pipeline reported an error while playing
//! - **Protocol**: a control datagram did not match the grammar
//! - **UnconfiguredPin**: a command named a pin outside the configured set
//! - **Transport**: socket bind/send failures
//! - **ResourceUnavailable**: the GPIO facility is missing
//!
//! Errors carry a category, a severity and a recoverability flag so callers
//! can decide whether to keep serving or tear a session down.
//!
//! ```rust
//! use camlink::error::{LinkError, Recoverable};
//!
//! let err = LinkError::UnconfiguredPin(99);
//! assert_eq!(err.category(), "configuration");
//! assert!(err.is_recoverable());
//! ```

use std::io;

use crate::control::protocol::ProtocolError;

/// Severity levels for errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// Affects a single request; service continues
    Warning,
    /// Ends the current session or operation
    Error,
    /// The process cannot continue in its current configuration
    Fatal,
}

/// Base error type for the camlink library
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// The pipeline description could not be turned into a pipeline.
    #[error("pipeline construction failed: {0}")]
    Construction(String),

    /// An error event was reported by a playing pipeline.
    #[error("pipeline runtime error ({kind}): {message}")]
    Runtime { kind: String, message: String },

    /// A control command did not parse.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The pin is not part of the configured actuator set.
    #[error("pin {0} is not configured")]
    UnconfiguredPin(u32),

    /// The actuator controller was already shut down.
    #[error("actuator controller has been shut down")]
    ActuatorReleased,

    /// Socket level failure.
    #[error("{operation} failed for {address}: {source}")]
    Transport {
        operation: &'static str,
        address: String,
        #[source]
        source: io::Error,
    },

    /// A platform facility is not present.
    #[error("{facility} unavailable: {reason}")]
    ResourceUnavailable { facility: String, reason: String },

    /// A lifecycle request that is not valid in the current state.
    #[error("cannot {attempted} while session is {current}")]
    State {
        current: String,
        attempted: &'static str,
    },

    /// A setting failed validation.
    #[error("invalid setting `{field}`: {reason}")]
    InvalidSetting { field: &'static str, reason: String },

    /// Child process management failed.
    #[error("capture process {operation} failed: {source}")]
    Process {
        operation: &'static str,
        #[source]
        source: io::Error,
    },

    /// A frame could not be written to disk.
    #[error("frame snapshot failed: {0}")]
    Snapshot(String),
}

impl LinkError {
    /// Create a transport error
    pub fn transport(operation: &'static str, address: impl ToString, source: io::Error) -> Self {
        Self::Transport {
            operation,
            address: address.to_string(),
            source,
        }
    }

    /// Create a setting validation error
    pub fn invalid_setting(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidSetting {
            field,
            reason: reason.into(),
        }
    }

    /// Create a process error
    pub fn process(operation: &'static str, source: io::Error) -> Self {
        Self::Process { operation, source }
    }

    /// Stable short name of the error family.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Construction(_) => "construction",
            Self::Runtime { .. } => "runtime",
            Self::Protocol(_) => "protocol",
            Self::UnconfiguredPin(_) | Self::ActuatorReleased => "configuration",
            Self::Transport { .. } => "transport",
            Self::ResourceUnavailable { .. } => "resource",
            Self::State { .. } => "state",
            Self::InvalidSetting { .. } => "settings",
            Self::Process { .. } => "process",
            Self::Snapshot(_) => "snapshot",
        }
    }

    /// How far the failure reaches.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Protocol(_)
            | Self::UnconfiguredPin(_)
            | Self::ActuatorReleased
            | Self::ResourceUnavailable { .. }
            | Self::State { .. }
            | Self::Snapshot(_) => ErrorSeverity::Warning,
            Self::Construction(_) | Self::Runtime { .. } | Self::Process { .. } => {
                ErrorSeverity::Error
            }
            Self::Transport { .. } | Self::InvalidSetting { .. } => ErrorSeverity::Fatal,
        }
    }
}

/// Errors that leave the owning component able to keep serving.
pub trait Recoverable {
    /// Whether the component can continue after this error.
    fn is_recoverable(&self) -> bool;
}

impl Recoverable for LinkError {
    fn is_recoverable(&self) -> bool {
        // Command-local failures never escape the server loop; the GPIO
        // facility degrades to mock mode.
        matches!(
            self,
            Self::Protocol(_)
                | Self::UnconfiguredPin(_)
                | Self::ActuatorReleased
                | Self::ResourceUnavailable { .. }
                | Self::State { .. }
                | Self::Snapshot(_)
        )
    }
}

/// Log an error at the level matching its severity.
pub fn log_error(err: &LinkError) {
    match err.severity() {
        ErrorSeverity::Warning => tracing::warn!(category = err.category(), "{err}"),
        ErrorSeverity::Error | ErrorSeverity::Fatal => {
            tracing::error!(category = err.category(), "{err}")
        }
    }
}

/// Result alias used throughout the library.
pub type LinkResult<T> = Result<T, LinkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        assert_eq!(LinkError::Construction("x".into()).category(), "construction");
        assert_eq!(LinkError::UnconfiguredPin(3).category(), "configuration");
        assert_eq!(
            LinkError::Protocol(ProtocolError::Empty).category(),
            "protocol"
        );
    }

    #[test]
    fn test_error_classification() {
        let bind = LinkError::transport(
            "bind",
            "0.0.0.0:6000",
            io::Error::new(io::ErrorKind::AddrInUse, "in use"),
        );
        assert_eq!(bind.severity(), ErrorSeverity::Fatal);
        assert!(!bind.is_recoverable());

        let runtime = LinkError::Runtime {
            kind: "resource".into(),
            message: "device vanished".into(),
        };
        assert_eq!(runtime.severity(), ErrorSeverity::Error);
        assert!(!runtime.is_recoverable());

        assert!(LinkError::UnconfiguredPin(99).is_recoverable());
        assert!(LinkError::Protocol(ProtocolError::Empty).is_recoverable());
    }

    #[test]
    fn test_error_display() {
        let err = LinkError::invalid_setting("pins", "at least one pin is required");
        assert_eq!(
            err.to_string(),
            "invalid setting `pins`: at least one pin is required"
        );
        assert_eq!(LinkError::UnconfiguredPin(99).to_string(), "pin 99 is not configured");
    }
}
