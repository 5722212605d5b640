use live_workout::backend::Statistics;
use live_workout::quantity::{Quantity, QuantityKind, Unit};
use live_workout::simulated::SimulatedBackend;
use live_workout::{
    EngineConfig, LiveWorkoutSession, Metadata, MockSessionDriver, SessionConfiguration,
    SessionError, SessionStreams, SwimmingLocationContext, WorkoutSessionController,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

const SAMPLE_PERIOD: Duration = Duration::from_millis(250);

#[tokio::main]
async fn main() -> Result<(), SessionError> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = EngineConfig::load().unwrap_or_else(|e| {
        log::warn!("Using default settings: {}", e);
        EngineConfig::default()
    });

    let mut builder =
        SessionConfiguration::builder(config.default_activity).location(config.default_location);
    if config.default_activity.requires_swimming_parameters() {
        builder = builder
            .swimming_location(SwimmingLocationContext::Pool)
            .lap_length(Quantity::new(25.0, Unit::Meter));
    }
    let session_config = builder.build()?;

    if std::env::args().any(|arg| arg == "--mock") {
        run_mock(&config, session_config).await
    } else {
        run_simulated(&config, session_config).await
    }
}

/// Log every snapshot and state until both streams terminate.
fn spawn_loggers(streams: SessionStreams) -> (JoinHandle<()>, JoinHandle<()>) {
    let (mut snapshots, mut states) = streams.into_parts();

    let snapshot_logger = tokio::spawn(async move {
        while let Some(event) = snapshots.next().await {
            match event {
                Ok(snapshot) => log::info!(
                    "Snapshot: {} kcal, {} m, {} bpm",
                    snapshot.active_calories,
                    snapshot.distance_meters,
                    snapshot.heart_rate_bpm
                ),
                Err(e) => log::error!("Snapshot stream failed: {}", e),
            }
        }
        log::info!("Snapshot stream {:?}", snapshots.termination());
    });

    let state_logger = tokio::spawn(async move {
        while let Some(event) = states.next().await {
            match event {
                Ok(state) => log::info!("State: {}", state),
                Err(e) => log::error!("Session failed: {}", e),
            }
        }
        log::info!("State stream {:?}", states.termination());
    });

    (snapshot_logger, state_logger)
}

async fn join_loggers((snapshots, states): (JoinHandle<()>, JoinHandle<()>)) {
    for logger in [snapshots, states] {
        if let Err(e) = logger.await {
            log::error!("Stream logger panicked: {}", e);
        }
    }
}

async fn run_simulated(
    config: &EngineConfig,
    session_config: SessionConfiguration,
) -> Result<(), SessionError> {
    log::info!("Running scripted session against the simulated backend");

    let backend = SimulatedBackend::new();
    let device = backend.device();
    let controller = WorkoutSessionController::with_policy(
        Arc::new(backend.clone()),
        config.publication_policy(),
    );

    let loggers = spawn_loggers(controller.start(session_config).await?);

    for step in 1..=6u32 {
        let scale = f64::from(step);
        device.collect(Statistics::most_recent(
            QuantityKind::HeartRate,
            Quantity::new(110.0 + scale * 4.3, Unit::CountPerMinute),
        ));
        device.collect(Statistics::cumulative(
            QuantityKind::ActiveEnergyBurned,
            Quantity::new(scale * 5.6, Unit::Kilocalorie),
        ));
        device.collect(Statistics::cumulative(
            QuantityKind::DistanceWalkingRunning,
            Quantity::new(scale * 0.0412, Unit::Kilometer),
        ));
        tokio::time::sleep(SAMPLE_PERIOD).await;

        if step == 3 {
            controller.pause();
            tokio::time::sleep(SAMPLE_PERIOD).await;
            controller.resume();
        }
    }

    let mut metadata = Metadata::new();
    metadata.insert("lap".to_string(), 1i64.into());
    metadata.insert("note".to_string(), "demo".into());
    match controller.add(metadata).await {
        Ok(accepted) => log::info!("Metadata accepted: {}", accepted),
        Err(e) => log::warn!("Metadata rejected: {}", e),
    }

    controller.end();
    join_loggers(loggers).await;

    log::debug!("Backend calls: {:?}", backend.calls());
    Ok(())
}

async fn run_mock(
    config: &EngineConfig,
    session_config: SessionConfiguration,
) -> Result<(), SessionError> {
    log::info!(
        "Running mock session, one sample every {:?}",
        config.mock_tick_interval()
    );

    let driver = MockSessionDriver::from_config(config)
        .map_err(|e| SessionError::InvalidConfiguration(e.to_string()))?;
    let loggers = spawn_loggers(driver.start(session_config).await?);

    let tick = config.mock_tick_interval();
    tokio::time::sleep(tick * 3 + tick / 2).await;
    driver.pause();
    tokio::time::sleep(tick).await;
    driver.resume();
    tokio::time::sleep(tick * 2 + tick / 2).await;

    if let Err(e) = driver.add(Metadata::new()).await {
        log::info!("Mock driver does not take metadata: {}", e);
    }

    driver.end();
    join_loggers(loggers).await;
    Ok(())
}
