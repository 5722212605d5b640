//! # Biometric Backend Boundary Module
//!
//! The seam between the session engine and the service that actually captures
//! sensor data, keeps session bookkeeping and computes statistics.
//!
//! ## Key Types
//! - `WorkoutBackend`: Opens a session and its builder for a configuration
//! - `SessionHandle`: Fire-and-forget lifecycle commands
//! - `WorkoutBuilder`: Collection, finalization and metadata operations
//! - `Notifier`: Callback sink the backend pushes notifications into
//!
//! ## Why a Channel
//! Backends call back from their own threads. `Notifier` only enqueues, so a
//! callback never blocks on the engine and never touches engine state directly.

use crate::configuration::SessionConfiguration;
use crate::error::BackendError;
use crate::quantity::{Quantity, QuantityKind};
use crate::session::Metadata;
use crate::state::BackendSessionState;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Freshly computed aggregate for one quantity kind
#[derive(Debug, Clone, PartialEq)]
pub struct Statistics {
    pub kind: QuantityKind,
    /// Latest discrete sample, used by heart rate
    pub most_recent: Option<Quantity>,
    /// Cumulative total since collection began, used by energy and distance
    pub sum: Option<Quantity>,
}

impl Statistics {
    pub fn most_recent(kind: QuantityKind, quantity: Quantity) -> Self {
        Self {
            kind,
            most_recent: Some(quantity),
            sum: None,
        }
    }

    pub fn cumulative(kind: QuantityKind, quantity: Quantity) -> Self {
        Self {
            kind,
            most_recent: None,
            sum: Some(quantity),
        }
    }
}

/// Everything the backend can tell the engine
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    StateChanged {
        from: BackendSessionState,
        to: BackendSessionState,
        at: DateTime<Utc>,
    },
    StatisticsCollected(Statistics),
    SessionFailed(BackendError),
}

/// Sender handed to the backend when a session opens
#[derive(Debug, Clone)]
pub struct Notifier {
    sender: mpsc::UnboundedSender<Notification>,
}

impl Notifier {
    pub fn new(sender: mpsc::UnboundedSender<Notification>) -> Self {
        Self { sender }
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self::new(sender), receiver)
    }

    pub fn state_changed(
        &self,
        from: BackendSessionState,
        to: BackendSessionState,
        at: DateTime<Utc>,
    ) {
        self.deliver(Notification::StateChanged { from, to, at });
    }

    pub fn statistics_collected(&self, statistics: Statistics) {
        self.deliver(Notification::StatisticsCollected(statistics));
    }

    pub fn session_failed(&self, error: BackendError) {
        self.deliver(Notification::SessionFailed(error));
    }

    /// True once the engine stopped listening for this session.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    fn deliver(&self, notification: Notification) {
        if let Err(why) = self.sender.send(notification) {
            log::debug!("Could not deliver backend notification: {:?}", why.0);
        }
    }
}

/// Lifecycle commands; outcomes arrive later as state notifications
pub trait SessionHandle: Send + Sync {
    fn prepare(&self);
    fn start_activity(&self, at: DateTime<Utc>);
    fn pause(&self);
    fn resume(&self);
    fn stop_activity(&self, at: DateTime<Utc>);
    fn end(&self);
}

/// Accumulates samples into statistics for one session
#[async_trait]
pub trait WorkoutBuilder: Send + Sync {
    async fn begin_collection(&self, at: DateTime<Utc>) -> Result<(), BackendError>;
    async fn end_collection(&self, at: DateTime<Utc>) -> Result<(), BackendError>;
    /// Only well-defined after `end_collection` succeeded.
    async fn finalize_workout(&self) -> Result<(), BackendError>;
    async fn add_metadata(&self, metadata: &Metadata) -> Result<(), BackendError>;
}

/// Handles allocated by the backend for one session
#[derive(Clone)]
pub struct OpenedSession {
    pub session: Arc<dyn SessionHandle>,
    pub builder: Arc<dyn WorkoutBuilder>,
}

#[async_trait]
pub trait WorkoutBackend: Send + Sync {
    /// Allocate a session and builder. Notifications for this session go to
    /// `notifier` until it is dropped.
    async fn open_session(
        &self,
        config: &SessionConfiguration,
        notifier: Notifier,
    ) -> Result<OpenedSession, BackendError>;
}
