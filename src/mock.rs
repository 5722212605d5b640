//! # Mock Session Driver Module
//!
//! Drop-in replacement for the session controller when no biometric backend
//! is available. A timer synthesizes samples and publishes them through the
//! same metrics aggregator and streams the real controller uses.
//!
//! ## Samples Per Tick
//! - Active calories and distance grow by a fixed step
//! - Heart rate is drawn uniformly from the configured range
//!
//! The timer runs while the session is running and is cancelled on pause, stop
//! and end.

use crate::config::EngineConfig;
use crate::configuration::SessionConfiguration;
use crate::error::{ConfigError, SessionError};
use crate::metrics::{LiveMetrics, LiveSnapshot, MetricKind};
use crate::quantity::{Quantity, Unit};
use crate::session::{LiveWorkoutSession, Metadata, SessionStreams};
use crate::state::SessionState;
use crate::stream::{self, Publisher};
use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use std::ops::RangeInclusive;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};

#[derive(Debug, Clone, PartialEq)]
pub struct MockSettings {
    pub tick: Duration,
    pub heart_rate: RangeInclusive<f64>,
    pub calories_per_tick: f64,
    pub distance_per_tick: f64,
}

impl MockSettings {
    /// Reject settings the timer can't run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick.is_zero() {
            return Err(ConfigError::Invalid(
                "mock tick must be greater than zero".to_string(),
            ));
        }
        let (min, max) = (*self.heart_rate.start(), *self.heart_rate.end());
        if !(min.is_finite() && max.is_finite()) || min > max {
            return Err(ConfigError::Invalid(format!(
                "mock heart rate range {}..={} is empty",
                min, max
            )));
        }
        for (name, step) in [
            ("calories", self.calories_per_tick),
            ("distance", self.distance_per_tick),
        ] {
            if !step.is_finite() || step < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "mock {} per tick must be a non-negative number, got {}",
                    name, step
                )));
            }
        }
        Ok(())
    }
}

impl Default for MockSettings {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for MockSettings {
    fn from(config: &EngineConfig) -> Self {
        Self {
            tick: config.mock_tick_interval(),
            heart_rate: config.mock_heart_rate_min..=config.mock_heart_rate_max,
            calories_per_tick: config.mock_calories_per_tick,
            distance_per_tick: config.mock_distance_per_tick,
        }
    }
}

struct Publishers {
    snapshots: Publisher<LiveSnapshot>,
    states: Publisher<SessionState>,
}

#[derive(Default)]
struct MockInner {
    runtime: Option<Handle>,
    publishers: Option<Publishers>,
    state: SessionState,
    timer: Option<JoinHandle<()>>,
    // Bumped on every cancel; ticks from an older timer are ignored
    generation: u64,
    calories: f64,
    distance: f64,
}

impl MockInner {
    fn transition(&mut self, state: SessionState) {
        self.state = state;
        if let Some(publishers) = &self.publishers {
            publishers.states.send(state);
        }
    }

    fn cancel_timer(&mut self) {
        self.generation += 1;
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }

    fn zero(&mut self, metrics: &LiveMetrics) {
        self.calories = 0.0;
        self.distance = 0.0;
        let publishers = &self.publishers;
        metrics.reset_with(|snapshot| {
            if let Some(publishers) = publishers {
                publishers.snapshots.send(snapshot);
            }
        });
    }
}

fn lock(inner: &Mutex<MockInner>) -> MutexGuard<'_, MockInner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Backend-free live session for offline development and tests.
pub struct MockSessionDriver {
    settings: MockSettings,
    metrics: Arc<LiveMetrics>,
    inner: Arc<Mutex<MockInner>>,
}

impl Default for MockSessionDriver {
    fn default() -> Self {
        Self::with_settings(MockSettings::default())
    }
}

impl MockSessionDriver {
    pub fn new(settings: MockSettings) -> Result<Self, ConfigError> {
        settings.validate()?;
        Ok(Self::with_settings(settings))
    }

    pub fn from_config(config: &EngineConfig) -> Result<Self, ConfigError> {
        Self::new(MockSettings::from(config))
    }

    fn with_settings(settings: MockSettings) -> Self {
        Self {
            settings,
            metrics: Arc::new(LiveMetrics::new()),
            inner: Arc::new(Mutex::new(MockInner::default())),
        }
    }

    pub fn snapshot(&self) -> LiveSnapshot {
        self.metrics.snapshot()
    }

    pub fn state(&self) -> SessionState {
        lock(&self.inner).state
    }

    fn spawn_timer(&self, inner: &mut MockInner) {
        let Some(runtime) = inner.runtime.clone() else {
            log::warn!("Mock driver has no runtime to run its timer on");
            return;
        };
        inner.cancel_timer();
        let generation = inner.generation;

        let shared = self.inner.clone();
        let metrics = self.metrics.clone();
        let settings = self.settings.clone();
        inner.timer = Some(runtime.spawn(async move {
            let mut ticker = interval_at(Instant::now() + settings.tick, settings.tick);
            loop {
                ticker.tick().await;
                tick(&shared, &metrics, &settings, generation);
            }
        }));
    }

    fn open(&self, inner: &mut MockInner) -> SessionStreams {
        let (snapshot_tx, snapshots) = stream::channel("snapshot");
        let (state_tx, states) = stream::channel("state");
        inner.runtime = Handle::try_current().ok();
        inner.publishers = Some(Publishers {
            snapshots: snapshot_tx,
            states: state_tx,
        });
        inner.zero(&self.metrics);

        let now = Some(Utc::now());
        inner.transition(SessionState::Prepared(now));
        inner.transition(SessionState::Running(now));
        self.spawn_timer(inner);

        SessionStreams { snapshots, states }
    }
}

fn tick(
    shared: &Mutex<MockInner>,
    metrics: &LiveMetrics,
    settings: &MockSettings,
    generation: u64,
) {
    let mut inner = lock(shared);
    // An aborted timer can still be past its await when the lock frees up
    if inner.generation != generation
        || inner.publishers.is_none()
        || !matches!(inner.state, SessionState::Running(_))
    {
        log::debug!("Dropping stale mock tick");
        return;
    }
    inner.calories += settings.calories_per_tick;
    inner.distance += settings.distance_per_tick;
    let heart_rate = rand::thread_rng().gen_range(settings.heart_rate.clone());

    let samples = [
        (MetricKind::ActiveEnergy, Quantity::new(inner.calories, Unit::Kilocalorie)),
        (MetricKind::Distance, Quantity::new(inner.distance, Unit::Meter)),
    ];
    for (kind, quantity) in samples {
        if let Err(e) = metrics.apply(kind, quantity) {
            log::warn!("Mock sample rejected: {}", e);
        }
    }

    let publishers = &inner.publishers;
    let merged = metrics.merge_with(
        MetricKind::HeartRate,
        Quantity::new(heart_rate, Unit::CountPerMinute),
        |snapshot| {
            if let Some(publishers) = publishers {
                publishers.snapshots.send(snapshot);
            }
        },
    );
    if let Err(e) = merged {
        log::warn!("Mock sample rejected: {}", e);
    }
}

#[async_trait]
impl LiveWorkoutSession for MockSessionDriver {
    async fn start(&self, config: SessionConfiguration) -> Result<SessionStreams, SessionError> {
        let mut inner = lock(&self.inner);
        if inner.publishers.is_some() {
            return Err(SessionError::SessionActive);
        }
        log::info!("Starting mock {} session", config.activity());
        Ok(self.open(&mut inner))
    }

    async fn reset(&self, config: SessionConfiguration) -> Result<SessionStreams, SessionError> {
        let mut inner = lock(&self.inner);
        inner.cancel_timer();
        if inner.publishers.take().is_some() {
            log::info!("Discarding mock session");
        }
        log::info!("Restarting mock {} session", config.activity());
        Ok(self.open(&mut inner))
    }

    fn pause(&self) {
        let mut inner = lock(&self.inner);
        if !matches!(inner.state, SessionState::Running(_)) {
            log::debug!("Mock driver ignores pause while {}", inner.state);
            return;
        }
        inner.cancel_timer();
        inner.transition(SessionState::Paused(Some(Utc::now())));
    }

    fn resume(&self) {
        let mut inner = lock(&self.inner);
        if !matches!(inner.state, SessionState::Paused(_)) {
            log::debug!("Mock driver ignores resume while {}", inner.state);
            return;
        }
        inner.transition(SessionState::Running(Some(Utc::now())));
        self.spawn_timer(&mut inner);
    }

    fn stop(&self) {
        let mut inner = lock(&self.inner);
        if !matches!(inner.state, SessionState::Running(_) | SessionState::Paused(_)) {
            log::debug!("Mock driver ignores stop while {}", inner.state);
            return;
        }
        inner.cancel_timer();
        inner.zero(&self.metrics);
        inner.transition(SessionState::Stopped(Some(Utc::now())));
    }

    fn end(&self) {
        let mut inner = lock(&self.inner);
        if inner.publishers.is_none() {
            log::warn!("Ignoring end without an active mock session");
            return;
        }
        inner.cancel_timer();
        inner.zero(&self.metrics);
        inner.transition(SessionState::Ended(Some(Utc::now())));
        if let Some(publishers) = inner.publishers.take() {
            publishers.snapshots.complete();
            publishers.states.complete();
        }
        log::info!("Mock session ended");
    }

    async fn add(&self, _metadata: Metadata) -> Result<bool, SessionError> {
        Err(SessionError::Unavailable)
    }
}

impl Drop for MockSessionDriver {
    fn drop(&mut self) {
        lock(&self.inner).cancel_timer();
    }
}
