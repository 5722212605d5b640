//! # Session State Module
//!
//! Lifecycle states of a live workout session and the mapping from the
//! backend's raw state reports.
//!
//! ## Publication Policy
//! The backend distinguishes `Paused` from `Running`. Some consumers treat a
//! pause as purely presentational and want it folded into `Running`;
//! `PublicationPolicy::collapse_paused` selects that behavior. The data model
//! always keeps the distinct state.

use crate::error::ConversionError;
use chrono::{DateTime, Utc};
use std::fmt;

/// State as reported by the backend, including values this crate doesn't know
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendSessionState {
    NotStarted,
    Prepared,
    Running,
    Paused,
    Stopped,
    Ended,
    Unsupported(i64),
}

impl fmt::Display for BackendSessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendSessionState::NotStarted => write!(f, "not_started"),
            BackendSessionState::Prepared => write!(f, "prepared"),
            BackendSessionState::Running => write!(f, "running"),
            BackendSessionState::Paused => write!(f, "paused"),
            BackendSessionState::Stopped => write!(f, "stopped"),
            BackendSessionState::Ended => write!(f, "ended"),
            BackendSessionState::Unsupported(raw) => write!(f, "unsupported({})", raw),
        }
    }
}

/// Published lifecycle state, each with the time of its transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    NotStarted(Option<DateTime<Utc>>),
    Prepared(Option<DateTime<Utc>>),
    Running(Option<DateTime<Utc>>),
    Paused(Option<DateTime<Utc>>),
    Stopped(Option<DateTime<Utc>>),
    Ended(Option<DateTime<Utc>>),
}

impl SessionState {
    pub fn from_backend(
        state: BackendSessionState,
        at: Option<DateTime<Utc>>,
    ) -> Result<Self, ConversionError> {
        match state {
            BackendSessionState::NotStarted => Ok(SessionState::NotStarted(at)),
            BackendSessionState::Prepared => Ok(SessionState::Prepared(at)),
            BackendSessionState::Running => Ok(SessionState::Running(at)),
            BackendSessionState::Paused => Ok(SessionState::Paused(at)),
            BackendSessionState::Stopped => Ok(SessionState::Stopped(at)),
            BackendSessionState::Ended => Ok(SessionState::Ended(at)),
            BackendSessionState::Unsupported(raw) => Err(ConversionError::UnsupportedState(raw)),
        }
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        match *self {
            SessionState::NotStarted(at)
            | SessionState::Prepared(at)
            | SessionState::Running(at)
            | SessionState::Paused(at)
            | SessionState::Stopped(at)
            | SessionState::Ended(at) => at,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Ended(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            SessionState::NotStarted(_) => "not_started",
            SessionState::Prepared(_) => "prepared",
            SessionState::Running(_) => "running",
            SessionState::Paused(_) => "paused",
            SessionState::Stopped(_) => "stopped",
            SessionState::Ended(_) => "ended",
        }
    }
}

impl Default for SessionState {
    fn default() -> Self {
        SessionState::NotStarted(None)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.timestamp() {
            Some(at) => write!(f, "{} at {}", self.name(), at.to_rfc3339()),
            None => f.write_str(self.name()),
        }
    }
}

/// How states are rewritten on their way to the state stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PublicationPolicy {
    pub collapse_paused: bool,
}

impl PublicationPolicy {
    pub fn publish(&self, state: SessionState) -> SessionState {
        match state {
            SessionState::Paused(at) if self.collapse_paused => SessionState::Running(at),
            other => other,
        }
    }
}
