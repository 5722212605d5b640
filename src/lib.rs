//! # Live Workout
//!
//! Live workout session engine: drives a biometric backend through a session
//! lifecycle, aggregates the statistics it reports into a rounded live
//! snapshot, and publishes snapshots and session states as streams.
//!
//! ## Key Components
//! - `WorkoutSessionController`: The session engine against a `WorkoutBackend`
//! - `MockSessionDriver`: Timer-driven stand-in with the same contract
//! - `LiveMetrics`: Snapshot aggregation and unit normalization
//! - `history` / `profile`: Read side of the health store

pub mod authorization;
pub mod backend;
pub mod config;
pub mod configuration;
pub mod controller;
pub mod error;
pub mod history;
pub mod metrics;
pub mod mock;
pub mod profile;
pub mod quantity;
pub mod session;
pub mod simulated;
pub mod state;
pub mod store;
pub mod stream;

pub use config::EngineConfig;
pub use configuration::{
    ActivityKind, LocationContext, SessionConfiguration, SwimmingLocationContext,
};
pub use controller::WorkoutSessionController;
pub use error::{BackendError, ConfigError, ConversionError, HealthError, SessionError};
pub use metrics::{LiveMetrics, LiveSnapshot};
pub use mock::MockSessionDriver;
pub use session::{LiveWorkoutSession, Metadata, MetadataValue, SessionStreams};
pub use state::SessionState;
pub use stream::{SnapshotStream, StateStream, Termination};
