//! # Error Types Module
//!
//! Centralized error handling for the live workout engine.
//! Provides custom error types for each concern with proper context and error chaining.
//!
//! ## Error Types
//! - `SessionError`: Live session lifecycle failures surfaced to callers
//! - `BackendError`: Failures reported by the biometric backend collaborator
//! - `HealthError`: Authorization and historical query failures
//! - `ConversionError`: Unit and backend-variant classification failures
//! - `ConfigError`: Settings file I/O and parsing errors
//!
//! ## Usage Examples
//! ```rust,ignore
//! // Configuration builder rejects bad input before any backend call
//! pub fn build(self) -> Result<SessionConfiguration, SessionError> { ... }
//!
//! // Backend builder operations report BackendError
//! async fn end_collection(&self, at: DateTime<Utc>) -> Result<(), BackendError>;
//!
//! // Settings use ConfigError
//! pub fn load() -> Result<EngineConfig, ConfigError> { ... }
//! ```

use std::fmt;

/// Which half of the two-phase shutdown failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationPhase {
    /// Closing data collection on the builder
    EndCollection,
    /// Finalizing the workout after collection closed
    Finalize,
}

impl fmt::Display for TerminationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationPhase::EndCollection => write!(f, "end collection"),
            TerminationPhase::Finalize => write!(f, "finalize workout"),
        }
    }
}

/// Error reported by the biometric backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendError {
    pub message: String,
}

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for BackendError {}

/// Errors that can occur while running a live workout session
#[derive(Debug, Clone, PartialEq)]
pub enum SessionError {
    /// Configuration rejected before any backend resource was touched
    InvalidConfiguration(String),
    /// Backend could not allocate a session or builder
    SessionUnavailable(BackendError),
    /// One phase of the two-phase shutdown failed
    SessionTerminationFailed {
        phase: TerminationPhase,
        cause: BackendError,
    },
    /// Metadata could not be attached to the running session
    MetadataSubmissionFailed(BackendError),
    /// Capability does not exist on this driver
    Unavailable,
    /// Backend reported the session failed mid-flight
    BackendFailure(BackendError),
    /// `start` was called while a session is still open
    SessionActive,
    /// Operation requires an open session
    NoActiveSession,
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::InvalidConfiguration(reason) => {
                write!(f, "Invalid workout configuration: {}", reason)
            }
            SessionError::SessionUnavailable(cause) => {
                write!(f, "Workout session could not be opened: {}", cause)
            }
            SessionError::SessionTerminationFailed { phase, cause } => {
                write!(f, "Workout session failed to {}: {}", phase, cause)
            }
            SessionError::MetadataSubmissionFailed(cause) => {
                write!(f, "Failed to add workout metadata: {}", cause)
            }
            SessionError::Unavailable => {
                write!(f, "This capability is unavailable for the current driver")
            }
            SessionError::BackendFailure(cause) => {
                write!(f, "Workout session failed: {}", cause)
            }
            SessionError::SessionActive => {
                write!(f, "A workout session is already active")
            }
            SessionError::NoActiveSession => {
                write!(f, "No workout session is active")
            }
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionError::SessionUnavailable(e) => Some(e),
            SessionError::SessionTerminationFailed { cause, .. } => Some(cause),
            SessionError::MetadataSubmissionFailed(e) => Some(e),
            SessionError::BackendFailure(e) => Some(e),
            _ => None,
        }
    }
}

/// Errors from authorization and historical queries
#[derive(Debug, Clone, PartialEq)]
pub enum HealthError {
    /// Access to health data is not allowed
    Denied,
    /// Health data is unavailable on this device
    Unavailable,
    /// The permission request itself failed
    AuthorizationFailed(String),
    /// A query against the health store failed
    Query(String),
    /// The requested attribute has no stored value
    NotFound,
}

impl fmt::Display for HealthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthError::Denied => write!(f, "Access to health data is not allowed"),
            HealthError::Unavailable => write!(f, "Health data is unavailable for this device"),
            HealthError::AuthorizationFailed(msg) => {
                write!(f, "Permission request failed: {}", msg)
            }
            HealthError::Query(msg) => write!(f, "Failed to get the health data: {}", msg),
            HealthError::NotFound => write!(f, "No health data found"),
        }
    }
}

impl std::error::Error for HealthError {}

/// Classification failures for values coming from the backend
#[derive(Debug, Clone, PartialEq)]
pub enum ConversionError {
    /// Quantity unit cannot express the requested dimension
    IncompatibleUnit { from: String, to: String },
    /// Statistic is missing the aggregate the metric reads
    MissingValue(String),
    /// Backend reported a session state this engine does not know
    UnsupportedState(i64),
    /// Value is negative, NaN or infinite
    OutOfRange(f64),
}

impl fmt::Display for ConversionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversionError::IncompatibleUnit { from, to } => {
                write!(f, "Cannot convert {} to {}", from, to)
            }
            ConversionError::MissingValue(kind) => {
                write!(f, "Statistic for {} has no usable value", kind)
            }
            ConversionError::UnsupportedState(raw) => {
                write!(f, "Unsupported backend session state: {}", raw)
            }
            ConversionError::OutOfRange(value) => {
                write!(f, "Value {} is outside the non-negative range", value)
            }
        }
    }
}

impl std::error::Error for ConversionError {}

/// Errors that can occur during configuration operations
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read config file
    ReadFailed(std::io::Error),
    /// Failed to write config file
    WriteFailed(std::io::Error),
    /// Failed to parse config file
    ParseFailed(toml::de::Error),
    /// Failed to serialize config
    SerializeFailed(toml::ser::Error),
    /// Config parsed but holds unusable values
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ReadFailed(e) => {
                write!(f, "Failed to read config file: {}", e)
            }
            ConfigError::WriteFailed(e) => {
                write!(f, "Failed to write config file: {}", e)
            }
            ConfigError::ParseFailed(e) => {
                write!(f, "Failed to parse config file: {}", e)
            }
            ConfigError::SerializeFailed(e) => {
                write!(f, "Failed to serialize config: {}", e)
            }
            ConfigError::Invalid(msg) => {
                write!(f, "Invalid config: {}", msg)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::ReadFailed(e) => Some(e),
            ConfigError::WriteFailed(e) => Some(e),
            ConfigError::ParseFailed(e) => Some(e),
            ConfigError::SerializeFailed(e) => Some(e),
            ConfigError::Invalid(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_termination_error_display() {
        let err = SessionError::SessionTerminationFailed {
            phase: TerminationPhase::Finalize,
            cause: BackendError::new("store offline"),
        };
        let msg = err.to_string();
        assert!(msg.contains("finalize workout"));
        assert!(msg.contains("store offline"));
    }

    #[test]
    fn test_session_error_chain() {
        let err = SessionError::MetadataSubmissionFailed(BackendError::new("rejected"));
        assert!(err.source().is_some());
        assert!(SessionError::Unavailable.source().is_none());
    }

    #[test]
    fn test_config_error_chain() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = ConfigError::ReadFailed(io_err);
        assert!(err.source().is_some());
    }
}
