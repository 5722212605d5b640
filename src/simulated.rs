//! # Simulated Backend Module
//!
//! An in-memory stand-in for the biometric backend. It answers lifecycle
//! commands with the state notifications a real backend would send and lets
//! tests inject statistics, session failures and builder failures.
//!
//! ## Key Components
//! - `SimulatedBackend`: `WorkoutBackend` implementation with failure switches
//! - `SimulatedDevice`: Handle for pushing notifications into the open session
//! - `BackendCall`: Journal entry for every call the engine made
//!
//! ## Journal
//! Calls are recorded on a crossbeam channel so synchronous test code can drain
//! them without touching the async runtime.

use crate::backend::{
    Notifier, OpenedSession, SessionHandle, Statistics, WorkoutBackend, WorkoutBuilder,
};
use crate::configuration::{ActivityKind, SessionConfiguration};
use crate::error::BackendError;
use crate::session::Metadata;
use crate::state::BackendSessionState;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Operations that can be switched to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    OpenSession,
    BeginCollection,
    EndCollection,
    FinalizeWorkout,
    AddMetadata,
}

/// Every call the engine made against the backend, in order
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    OpenSession(ActivityKind),
    Prepare,
    StartActivity,
    Pause,
    Resume,
    StopActivity,
    End,
    BeginCollection,
    EndCollection,
    FinalizeWorkout,
    AddMetadata(Metadata),
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Shared {
    journal_tx: Sender<BackendCall>,
    journal_rx: Receiver<BackendCall>,
    failures: Mutex<HashMap<Operation, String>>,
    current: Mutex<Option<Arc<SimulatedSession>>>,
}

impl Shared {
    fn record(&self, call: BackendCall) {
        let _ = self.journal_tx.send(call);
    }

    fn check(&self, operation: Operation) -> Result<(), BackendError> {
        match lock(&self.failures).get(&operation) {
            Some(message) => Err(BackendError::new(message.clone())),
            None => Ok(()),
        }
    }
}

/// In-memory biometric backend
#[derive(Clone)]
pub struct SimulatedBackend {
    shared: Arc<Shared>,
}

impl Default for SimulatedBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedBackend {
    pub fn new() -> Self {
        let (journal_tx, journal_rx) = unbounded();
        Self {
            shared: Arc::new(Shared {
                journal_tx,
                journal_rx,
                failures: Mutex::new(HashMap::new()),
                current: Mutex::new(None),
            }),
        }
    }

    /// Make `operation` fail with `message` until cleared.
    pub fn fail(&self, operation: Operation, message: impl Into<String>) {
        lock(&self.shared.failures).insert(operation, message.into());
    }

    pub fn clear_failure(&self, operation: Operation) {
        lock(&self.shared.failures).remove(&operation);
    }

    /// Handle to the most recently opened session.
    pub fn device(&self) -> SimulatedDevice {
        SimulatedDevice {
            shared: self.shared.clone(),
        }
    }

    /// Drain the call journal.
    pub fn calls(&self) -> Vec<BackendCall> {
        self.shared.journal_rx.try_iter().collect()
    }
}

#[async_trait]
impl WorkoutBackend for SimulatedBackend {
    async fn open_session(
        &self,
        config: &SessionConfiguration,
        notifier: Notifier,
    ) -> Result<OpenedSession, BackendError> {
        self.shared.record(BackendCall::OpenSession(config.activity()));
        self.shared.check(Operation::OpenSession)?;

        let session = Arc::new(SimulatedSession {
            shared: self.shared.clone(),
            notifier,
            state: Mutex::new(BackendSessionState::NotStarted),
        });
        *lock(&self.shared.current) = Some(session.clone());

        let builder = Arc::new(SimulatedBuilder {
            shared: self.shared.clone(),
        });
        Ok(OpenedSession { session, builder })
    }
}

/// Session half of the simulated backend, following the backend's own state machine
struct SimulatedSession {
    shared: Arc<Shared>,
    notifier: Notifier,
    state: Mutex<BackendSessionState>,
}

impl SimulatedSession {
    /// Move to `to` if `allowed` accepts the current state, notifying the engine.
    fn transition<F>(&self, to: BackendSessionState, at: DateTime<Utc>, allowed: F)
    where
        F: FnOnce(BackendSessionState) -> bool,
    {
        let mut state = lock(&self.state);
        let from = *state;
        if !allowed(from) {
            log::debug!("Simulated backend rejects {} -> {}", from, to);
            return;
        }
        *state = to;
        self.notifier.state_changed(from, to, at);
    }
}

impl SessionHandle for SimulatedSession {
    fn prepare(&self) {
        self.shared.record(BackendCall::Prepare);
        self.transition(BackendSessionState::Prepared, Utc::now(), |from| {
            from == BackendSessionState::NotStarted
        });
    }

    fn start_activity(&self, at: DateTime<Utc>) {
        self.shared.record(BackendCall::StartActivity);
        self.transition(BackendSessionState::Running, at, |from| {
            matches!(
                from,
                BackendSessionState::NotStarted
                    | BackendSessionState::Prepared
                    | BackendSessionState::Stopped
            )
        });
    }

    fn pause(&self) {
        self.shared.record(BackendCall::Pause);
        self.transition(BackendSessionState::Paused, Utc::now(), |from| {
            from == BackendSessionState::Running
        });
    }

    fn resume(&self) {
        self.shared.record(BackendCall::Resume);
        self.transition(BackendSessionState::Running, Utc::now(), |from| {
            from == BackendSessionState::Paused
        });
    }

    fn stop_activity(&self, at: DateTime<Utc>) {
        self.shared.record(BackendCall::StopActivity);
        self.transition(BackendSessionState::Stopped, at, |from| {
            matches!(
                from,
                BackendSessionState::Running | BackendSessionState::Paused
            )
        });
    }

    fn end(&self) {
        self.shared.record(BackendCall::End);
        self.transition(BackendSessionState::Ended, Utc::now(), |from| {
            from != BackendSessionState::Ended
        });
    }
}

struct SimulatedBuilder {
    shared: Arc<Shared>,
}

#[async_trait]
impl WorkoutBuilder for SimulatedBuilder {
    async fn begin_collection(&self, _at: DateTime<Utc>) -> Result<(), BackendError> {
        self.shared.record(BackendCall::BeginCollection);
        self.shared.check(Operation::BeginCollection)
    }

    async fn end_collection(&self, _at: DateTime<Utc>) -> Result<(), BackendError> {
        self.shared.record(BackendCall::EndCollection);
        self.shared.check(Operation::EndCollection)
    }

    async fn finalize_workout(&self) -> Result<(), BackendError> {
        self.shared.record(BackendCall::FinalizeWorkout);
        self.shared.check(Operation::FinalizeWorkout)
    }

    async fn add_metadata(&self, metadata: &Metadata) -> Result<(), BackendError> {
        self.shared.record(BackendCall::AddMetadata(metadata.clone()));
        self.shared.check(Operation::AddMetadata)
    }
}

/// Pushes backend-originated events into the open session
#[derive(Clone)]
pub struct SimulatedDevice {
    shared: Arc<Shared>,
}

impl SimulatedDevice {
    fn current(&self) -> Option<Arc<SimulatedSession>> {
        let current = lock(&self.shared.current).clone();
        if current.is_none() {
            log::warn!("Simulated device has no open session");
        }
        current
    }

    /// Deliver a statistics-collected notification.
    pub fn collect(&self, statistics: Statistics) {
        if let Some(session) = self.current() {
            session.notifier.statistics_collected(statistics);
        }
    }

    /// Deliver a session failure.
    pub fn fail_session(&self, message: impl Into<String>) {
        if let Some(session) = self.current() {
            session.notifier.session_failed(BackendError::new(message));
        }
    }

    /// Report a raw state change without checking the state machine.
    pub fn report_state(&self, to: BackendSessionState) {
        if let Some(session) = self.current() {
            let mut state = lock(&session.state);
            let from = *state;
            *state = to;
            session.notifier.state_changed(from, to, Utc::now());
        }
    }

    pub fn state(&self) -> Option<BackendSessionState> {
        lock(&self.shared.current)
            .as_ref()
            .map(|session| *lock(&session.state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Notification;
    use crate::configuration::LocationContext;

    fn running_config() -> SessionConfiguration {
        SessionConfiguration::build(ActivityKind::Running, LocationContext::Outdoor, None, None)
            .expect("running config")
    }

    #[tokio::test]
    async fn test_commands_follow_backend_state_machine() {
        let backend = SimulatedBackend::new();
        let (notifier, mut notifications) = Notifier::channel();
        let opened = backend
            .open_session(&running_config(), notifier)
            .await
            .expect("session opens");

        opened.session.resume(); // illegal from NotStarted
        opened.session.prepare();
        opened.session.start_activity(Utc::now());
        opened.session.pause();
        opened.session.end();

        let mut seen = Vec::new();
        while let Ok(Notification::StateChanged { to, .. }) = notifications.try_recv() {
            seen.push(to);
        }
        assert_eq!(
            seen,
            vec![
                BackendSessionState::Prepared,
                BackendSessionState::Running,
                BackendSessionState::Paused,
                BackendSessionState::Ended,
            ]
        );
        assert_eq!(backend.device().state(), Some(BackendSessionState::Ended));
    }

    #[tokio::test]
    async fn test_failure_switches() {
        let backend = SimulatedBackend::new();
        backend.fail(Operation::OpenSession, "no session for you");
        let (notifier, _notifications) = Notifier::channel();
        let result = backend.open_session(&running_config(), notifier).await;
        assert!(result.is_err());

        backend.clear_failure(Operation::OpenSession);
        let (notifier, _notifications) = Notifier::channel();
        assert!(backend.open_session(&running_config(), notifier).await.is_ok());
        assert_eq!(
            backend.calls(),
            vec![
                BackendCall::OpenSession(ActivityKind::Running),
                BackendCall::OpenSession(ActivityKind::Running),
            ]
        );
    }
}
