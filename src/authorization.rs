//! # Authorization Module
//!
//! Access requests for the health data categories the engine reads and writes.
//!
//! ## Key Components
//! - `DataCategory`: Every category the session and history queries touch
//! - `Authorizer`: Async permission request against the platform
//! - `StaticAuthorizer`: Fixed-answer authorizer for tests and offline runs

use crate::error::HealthError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataCategory {
    Workout,
    HeartRate,
    ActiveEnergyBurned,
    DistanceWalkingRunning,
    DistanceSwimming,
    DistanceCycling,
    BodyMass,
    Height,
    DateOfBirth,
    BiologicalSex,
}

impl DataCategory {
    /// Categories a live session reads while collecting.
    pub const SESSION_READ: &'static [DataCategory] = &[
        DataCategory::Workout,
        DataCategory::HeartRate,
        DataCategory::ActiveEnergyBurned,
        DataCategory::DistanceWalkingRunning,
        DataCategory::DistanceSwimming,
        DataCategory::DistanceCycling,
        DataCategory::BodyMass,
        DataCategory::Height,
        DataCategory::DateOfBirth,
        DataCategory::BiologicalSex,
    ];

    /// Categories a finished session writes back.
    pub const SESSION_WRITE: &'static [DataCategory] = &[
        DataCategory::Workout,
        DataCategory::ActiveEnergyBurned,
        DataCategory::DistanceWalkingRunning,
        DataCategory::DistanceSwimming,
        DataCategory::DistanceCycling,
        DataCategory::BodyMass,
        DataCategory::Height,
    ];

    /// Characteristics are read-only on every platform we target.
    pub fn is_writable(&self) -> bool {
        !matches!(self, DataCategory::DateOfBirth | DataCategory::BiologicalSex)
    }
}

impl fmt::Display for DataCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataCategory::Workout => "workout",
            DataCategory::HeartRate => "heart rate",
            DataCategory::ActiveEnergyBurned => "active energy burned",
            DataCategory::DistanceWalkingRunning => "walking/running distance",
            DataCategory::DistanceSwimming => "swimming distance",
            DataCategory::DistanceCycling => "cycling distance",
            DataCategory::BodyMass => "body mass",
            DataCategory::Height => "height",
            DataCategory::DateOfBirth => "date of birth",
            DataCategory::BiologicalSex => "biological sex",
        };
        write!(f, "{}", name)
    }
}

/// Permission request against the health platform.
///
/// `Ok(false)` means the request completed and the user said no;
/// `Err` means the request itself could not be made.
#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn request_access(
        &self,
        read: &[DataCategory],
        write: &[DataCategory],
    ) -> Result<bool, HealthError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Answer {
    Granted,
    Denied,
    Failing,
}

/// Authorizer with a fixed answer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticAuthorizer {
    answer: Answer,
}

impl StaticAuthorizer {
    pub fn granted() -> Self {
        Self {
            answer: Answer::Granted,
        }
    }

    pub fn denied() -> Self {
        Self {
            answer: Answer::Denied,
        }
    }

    pub fn failing() -> Self {
        Self {
            answer: Answer::Failing,
        }
    }
}

#[async_trait]
impl Authorizer for StaticAuthorizer {
    async fn request_access(
        &self,
        read: &[DataCategory],
        write: &[DataCategory],
    ) -> Result<bool, HealthError> {
        if let Some(category) = write.iter().find(|category| !category.is_writable()) {
            return Err(HealthError::AuthorizationFailed(format!(
                "{} cannot be written",
                category
            )));
        }
        log::debug!(
            "Access request for {} read and {} write categories",
            read.len(),
            write.len()
        );
        match self.answer {
            Answer::Granted => Ok(true),
            Answer::Denied => Ok(false),
            Answer::Failing => Err(HealthError::AuthorizationFailed(
                "authorization request failed".to_string(),
            )),
        }
    }
}
