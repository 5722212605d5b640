//! # Live Session Contract Module
//!
//! The public contract shared by the real session controller and the mock
//! driver, so callers can swap one for the other.

use crate::configuration::SessionConfiguration;
use crate::error::SessionError;
use crate::stream::{SnapshotStream, StateStream};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Opaque value attached to the session's event log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Text(String),
    Integer(i64),
    Number(f64),
    Bool(bool),
    Date(DateTime<Utc>),
}

impl MetadataValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetadataValue::Integer(v) => Some(*v as f64),
            MetadataValue::Number(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::Text(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::Text(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        MetadataValue::Integer(value)
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        MetadataValue::Number(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        MetadataValue::Bool(value)
    }
}

pub type Metadata = BTreeMap<String, MetadataValue>;

/// Streams handed back when a session starts
#[derive(Debug)]
pub struct SessionStreams {
    pub snapshots: SnapshotStream,
    pub states: StateStream,
}

impl SessionStreams {
    pub fn into_parts(self) -> (SnapshotStream, StateStream) {
        (self.snapshots, self.states)
    }
}

/// Lifecycle of one tracked workout.
///
/// Commands are fire-and-observe: their effects show up on the streams
/// returned by `start`, not as return values.
#[async_trait]
pub trait LiveWorkoutSession: Send + Sync {
    async fn start(&self, config: SessionConfiguration) -> Result<SessionStreams, SessionError>;

    /// Discard the current session, if any, and start a new one.
    async fn reset(&self, config: SessionConfiguration) -> Result<SessionStreams, SessionError>;

    fn pause(&self);

    fn resume(&self);

    fn stop(&self);

    fn end(&self);

    /// Attach metadata to the open session.
    async fn add(&self, metadata: Metadata) -> Result<bool, SessionError>;
}
