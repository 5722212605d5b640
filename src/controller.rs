//! # Workout Session Controller Module
//!
//! Drives one live workout session against the biometric backend and
//! republishes what the backend reports as snapshot and state streams.
//!
//! ## Key Components
//! - `WorkoutSessionController`: Owns the backend session and builder, and
//!   translates caller commands into backend calls
//! - `NotificationListener`: Per-session task consuming backend notifications
//!   in arrival order
//!
//! ## Termination
//! When the backend reports `Ended`, the listener closes collection on the
//! builder and only then finalizes the workout. A failure in either phase
//! fails the state stream and the second phase is never attempted. On success
//! the snapshot stream completes and `Ended` is the last state published.
//!
//! ## Ownership
//! The controller owns the notification listener of its session; there is no
//! process-wide registry. Dropping the controller stops listening.

use crate::backend::{
    Notification, Notifier, OpenedSession, Statistics, WorkoutBackend, WorkoutBuilder,
};
use crate::configuration::SessionConfiguration;
use crate::error::{SessionError, TerminationPhase};
use crate::metrics::{LiveMetrics, LiveSnapshot, MetricKind};
use crate::session::{LiveWorkoutSession, Metadata, SessionStreams};
use crate::state::{PublicationPolicy, SessionState};
use crate::stream::{self, Publisher};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

type SessionSlot = Mutex<Option<ActiveSession>>;

/// Backend handles and listener of the currently open session
struct ActiveSession {
    id: u64,
    handles: OpenedSession,
    snapshots: Publisher<LiveSnapshot>,
    listener: JoinHandle<()>,
}

/// Live workout session backed by a real biometric backend.
pub struct WorkoutSessionController {
    backend: Arc<dyn WorkoutBackend>,
    policy: PublicationPolicy,
    metrics: Arc<LiveMetrics>,
    active: Arc<SessionSlot>,
    next_id: AtomicU64,
    // Serializes start/reset so two opens can't race for the slot
    lifecycle: tokio::sync::Mutex<()>,
}

impl WorkoutSessionController {
    pub fn new(backend: Arc<dyn WorkoutBackend>) -> Self {
        Self::with_policy(backend, PublicationPolicy::default())
    }

    pub fn with_policy(backend: Arc<dyn WorkoutBackend>, policy: PublicationPolicy) -> Self {
        Self {
            backend,
            policy,
            metrics: Arc::new(LiveMetrics::new()),
            active: Arc::new(Mutex::new(None)),
            next_id: AtomicU64::new(1),
            lifecycle: tokio::sync::Mutex::new(()),
        }
    }

    /// Whether a session is open and its streams have not terminated.
    pub fn is_active(&self) -> bool {
        self.slot().is_some()
    }

    /// Latest merged snapshot.
    pub fn snapshot(&self) -> LiveSnapshot {
        self.metrics.snapshot()
    }

    pub fn publication_policy(&self) -> PublicationPolicy {
        self.policy
    }

    fn slot(&self) -> MutexGuard<'_, Option<ActiveSession>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_session<F>(&self, command: &str, f: F)
    where
        F: FnOnce(&ActiveSession),
    {
        match self.slot().as_ref() {
            Some(active) => {
                log::debug!("Forwarding {} to workout session {}", command, active.id);
                f(active);
            }
            None => log::warn!("Ignoring {} without an active workout session", command),
        }
    }

    async fn open(&self, config: SessionConfiguration) -> Result<SessionStreams, SessionError> {
        let (notifier, notifications) = Notifier::channel();
        let handles = self
            .backend
            .open_session(&config, notifier)
            .await
            .map_err(|e| {
                log::error!("Backend could not open a {} session: {}", config.activity(), e);
                SessionError::SessionUnavailable(e)
            })?;

        let (snapshot_tx, snapshots) = stream::channel("snapshot");
        let (state_tx, states) = stream::channel("state");
        self.metrics.reset_with(|snapshot| {
            snapshot_tx.send(snapshot);
        });

        let now = Utc::now();
        handles.session.prepare();
        handles.session.start_activity(now);
        if let Err(e) = handles.builder.begin_collection(now).await {
            log::error!("Could not begin collecting workout data: {}", e);
            handles.session.end();
            return Err(SessionError::SessionUnavailable(e));
        }
        log::debug!("Start collecting workout data.");

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let listener = NotificationListener {
            session_id: id,
            metrics: self.metrics.clone(),
            policy: self.policy,
            builder: handles.builder.clone(),
            snapshots: snapshot_tx.clone(),
            states: state_tx,
            slot: Arc::downgrade(&self.active),
        };

        // Hold the slot while spawning so the listener can't release it first
        let mut slot = self.slot();
        let task = tokio::spawn(listener.run(notifications));
        *slot = Some(ActiveSession {
            id,
            handles,
            snapshots: snapshot_tx,
            listener: task,
        });
        log::info!("Started {} workout session {}", config.activity(), id);

        Ok(SessionStreams { snapshots, states })
    }

    fn discard(&self) {
        if let Some(previous) = self.slot().take() {
            log::info!("Discarding workout session {}", previous.id);
            previous.listener.abort();
            previous.handles.session.end();
        }
    }
}

#[async_trait]
impl LiveWorkoutSession for WorkoutSessionController {
    async fn start(&self, config: SessionConfiguration) -> Result<SessionStreams, SessionError> {
        let _guard = self.lifecycle.lock().await;
        if self.is_active() {
            return Err(SessionError::SessionActive);
        }
        self.open(config).await
    }

    async fn reset(&self, config: SessionConfiguration) -> Result<SessionStreams, SessionError> {
        let _guard = self.lifecycle.lock().await;
        self.discard();
        self.open(config).await
    }

    fn pause(&self) {
        self.with_session("pause", |active| active.handles.session.pause());
    }

    fn resume(&self) {
        self.with_session("resume", |active| active.handles.session.resume());
    }

    fn stop(&self) {
        self.with_session("stop", |active| {
            active.handles.session.stop_activity(Utc::now());
            self.metrics.reset_with(|snapshot| {
                active.snapshots.send(snapshot);
            });
        });
    }

    fn end(&self) {
        self.with_session("end", |active| {
            self.metrics.reset_with(|snapshot| {
                active.snapshots.send(snapshot);
            });
            active.handles.session.end();
        });
    }

    async fn add(&self, metadata: Metadata) -> Result<bool, SessionError> {
        let builder = self
            .slot()
            .as_ref()
            .map(|active| active.handles.builder.clone())
            .ok_or(SessionError::NoActiveSession)?;

        match builder.add_metadata(&metadata).await {
            Ok(()) => {
                log::info!("Added metadata: {} entries", metadata.len());
                Ok(true)
            }
            Err(e) => {
                log::error!("Failed to add metadata: {}", e);
                Err(SessionError::MetadataSubmissionFailed(e))
            }
        }
    }
}

impl Drop for WorkoutSessionController {
    fn drop(&mut self) {
        if let Some(active) = self.slot().take() {
            log::debug!("Controller dropped, no longer listening to session {}", active.id);
            active.listener.abort();
        }
    }
}

/// Clear the controller slot if it still holds session `id`.
fn release(slot: &Weak<SessionSlot>, id: u64) {
    let Some(slot) = slot.upgrade() else {
        return;
    };
    let mut slot = slot.lock().unwrap_or_else(PoisonError::into_inner);
    if slot.as_ref().map(|active| active.id) == Some(id) {
        *slot = None;
    }
}

/// Consumes backend notifications for one session.
struct NotificationListener {
    session_id: u64,
    metrics: Arc<LiveMetrics>,
    policy: PublicationPolicy,
    builder: Arc<dyn WorkoutBuilder>,
    snapshots: Publisher<LiveSnapshot>,
    states: Publisher<SessionState>,
    slot: Weak<SessionSlot>,
}

impl NotificationListener {
    async fn run(self, mut notifications: mpsc::UnboundedReceiver<Notification>) {
        while let Some(notification) = notifications.recv().await {
            match notification {
                Notification::StateChanged { from, to, at } => {
                    log::debug!("Workout session state changed from {} to {}", from, to);
                    match SessionState::from_backend(to, Some(at)) {
                        Ok(SessionState::Ended(ended_at)) => {
                            // Nothing after Ended is processed for this session
                            self.terminate(ended_at).await;
                            return;
                        }
                        Ok(state) => {
                            self.states.send(self.policy.publish(state));
                        }
                        Err(e) => log::warn!("Ignoring state notification: {}", e),
                    }
                }
                Notification::StatisticsCollected(statistics) => self.collect(&statistics),
                Notification::SessionFailed(cause) => {
                    log::error!("Workout session {} failed: {}", self.session_id, cause);
                    release(&self.slot, self.session_id);
                    self.states.fail(SessionError::BackendFailure(cause));
                    return;
                }
            }
        }

        log::debug!("Backend closed notifications for session {}", self.session_id);
        release(&self.slot, self.session_id);
    }

    fn collect(&self, statistics: &Statistics) {
        let Some(kind) = MetricKind::classify(&statistics.kind) else {
            log::debug!("Dropping statistics for untracked kind {}", statistics.kind);
            return;
        };

        let merged = kind.reading(statistics).and_then(|raw| {
            self.metrics.merge_with(kind, raw, |snapshot| {
                self.snapshots.send(snapshot);
            })
        });
        if let Err(e) = merged {
            log::warn!("Dropping {} statistics: {}", statistics.kind, e);
        }
    }

    /// Close collection, then finalize. Phase two never runs if phase one failed.
    async fn terminate(self, ended_at: Option<DateTime<Utc>>) {
        let NotificationListener {
            session_id,
            builder,
            snapshots,
            states,
            slot,
            ..
        } = self;

        log::debug!("Ending data collection for session {}", session_id);
        if let Err(cause) = builder.end_collection(Utc::now()).await {
            log::error!("Failed to end collection for session {}: {}", session_id, cause);
            release(&slot, session_id);
            states.fail(SessionError::SessionTerminationFailed {
                phase: TerminationPhase::EndCollection,
                cause,
            });
            return;
        }

        log::debug!("Finalizing workout for session {}", session_id);
        if let Err(cause) = builder.finalize_workout().await {
            log::error!("Failed to finalize workout for session {}: {}", session_id, cause);
            release(&slot, session_id);
            states.fail(SessionError::SessionTerminationFailed {
                phase: TerminationPhase::Finalize,
                cause,
            });
            return;
        }

        release(&slot, session_id);
        log::info!("End workout session {}.", session_id);
        snapshots.complete();
        states.send(SessionState::Ended(ended_at));
        states.complete();
    }
}
