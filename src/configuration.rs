//! # Session Configuration Module
//!
//! Validates caller input and produces the immutable `SessionConfiguration`
//! a live session is opened with. Nothing here touches the backend, so an
//! invalid combination is rejected before any session resource exists.
//!
//! ## Rules
//! - Swimming requires a swimming location context (pool / open water / unknown)
//! - A lap length, when given, must be a positive finite length
//! - Swimming-only parameters passed for other activities are discarded

use crate::error::SessionError;
use crate::quantity::{Quantity, Unit};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Running,
    Walking,
    Cycling,
    Swimming,
    Hiking,
    Rowing,
    Elliptical,
    Yoga,
    FunctionalStrengthTraining,
    HighIntensityIntervalTraining,
    Other,
}

impl ActivityKind {
    /// Whether this activity needs swimming parameters to open a session
    pub fn requires_swimming_parameters(&self) -> bool {
        matches!(self, ActivityKind::Swimming)
    }
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActivityKind::Running => "running",
            ActivityKind::Walking => "walking",
            ActivityKind::Cycling => "cycling",
            ActivityKind::Swimming => "swimming",
            ActivityKind::Hiking => "hiking",
            ActivityKind::Rowing => "rowing",
            ActivityKind::Elliptical => "elliptical",
            ActivityKind::Yoga => "yoga",
            ActivityKind::FunctionalStrengthTraining => "functional_strength_training",
            ActivityKind::HighIntensityIntervalTraining => "high_intensity_interval_training",
            ActivityKind::Other => "other",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationContext {
    Indoor,
    Outdoor,
    #[default]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwimmingLocationContext {
    Pool,
    OpenWater,
    Unknown,
}

/// Immutable parameters of one session attempt
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfiguration {
    activity: ActivityKind,
    location: LocationContext,
    swimming_location: Option<SwimmingLocationContext>,
    lap_length: Option<Quantity>,
}

impl SessionConfiguration {
    /// Validate and build a configuration in one call.
    pub fn build(
        activity: ActivityKind,
        location: LocationContext,
        swimming_location: Option<SwimmingLocationContext>,
        lap_length: Option<Quantity>,
    ) -> Result<Self, SessionError> {
        let mut builder = Self::builder(activity).location(location);
        builder.swimming_location = swimming_location;
        builder.lap_length = lap_length;
        builder.build()
    }

    pub fn builder(activity: ActivityKind) -> SessionConfigurationBuilder {
        SessionConfigurationBuilder {
            activity,
            location: LocationContext::default(),
            swimming_location: None,
            lap_length: None,
        }
    }

    pub fn activity(&self) -> ActivityKind {
        self.activity
    }

    pub fn location(&self) -> LocationContext {
        self.location
    }

    pub fn swimming_location(&self) -> Option<SwimmingLocationContext> {
        self.swimming_location
    }

    pub fn lap_length(&self) -> Option<Quantity> {
        self.lap_length
    }
}

#[derive(Debug, Clone)]
pub struct SessionConfigurationBuilder {
    activity: ActivityKind,
    location: LocationContext,
    swimming_location: Option<SwimmingLocationContext>,
    lap_length: Option<Quantity>,
}

impl SessionConfigurationBuilder {
    pub fn location(mut self, location: LocationContext) -> Self {
        self.location = location;
        self
    }

    pub fn swimming_location(mut self, swimming_location: SwimmingLocationContext) -> Self {
        self.swimming_location = Some(swimming_location);
        self
    }

    pub fn lap_length(mut self, lap_length: Quantity) -> Self {
        self.lap_length = Some(lap_length);
        self
    }

    pub fn build(self) -> Result<SessionConfiguration, SessionError> {
        if !self.activity.requires_swimming_parameters() {
            if self.swimming_location.is_some() || self.lap_length.is_some() {
                log::debug!(
                    "Discarding swimming parameters for {} configuration",
                    self.activity
                );
            }
            return Ok(SessionConfiguration {
                activity: self.activity,
                location: self.location,
                swimming_location: None,
                lap_length: None,
            });
        }

        let swimming_location = self.swimming_location.ok_or_else(|| {
            SessionError::InvalidConfiguration(
                "swimming requires a swimming location context".to_string(),
            )
        })?;

        if let Some(lap_length) = &self.lap_length {
            let meters = lap_length.value_in(Unit::Meter).map_err(|e| {
                SessionError::InvalidConfiguration(format!("lap length is not a length: {}", e))
            })?;
            if !meters.is_finite() || meters <= 0.0 {
                return Err(SessionError::InvalidConfiguration(format!(
                    "lap length must be positive, got {}",
                    lap_length
                )));
            }
        }

        Ok(SessionConfiguration {
            activity: self.activity,
            location: self.location,
            swimming_location: Some(swimming_location),
            lap_length: self.lap_length,
        })
    }
}
