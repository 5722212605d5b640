//! # Quantity and Unit Module
//!
//! Physical quantities as the backend reports them, and the conversions needed
//! to bring them into the canonical units of the live snapshot.
//!
//! ## Dimensions
//! - Frequency: count/min, count/s
//! - Energy: kcal, cal, J, kJ
//! - Length: m, km, mi, yd, ft, cm
//! - Mass: kg, g, lb

use crate::error::ConversionError;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Dimension {
    Frequency,
    Energy,
    Length,
    Mass,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    CountPerMinute,
    CountPerSecond,
    Kilocalorie,
    SmallCalorie,
    Joule,
    Kilojoule,
    Meter,
    Kilometer,
    Mile,
    Yard,
    Foot,
    Centimeter,
    Kilogram,
    Gram,
    Pound,
}

impl Unit {
    fn dimension(&self) -> Dimension {
        match self {
            Unit::CountPerMinute | Unit::CountPerSecond => Dimension::Frequency,
            Unit::Kilocalorie | Unit::SmallCalorie | Unit::Joule | Unit::Kilojoule => {
                Dimension::Energy
            }
            Unit::Meter
            | Unit::Kilometer
            | Unit::Mile
            | Unit::Yard
            | Unit::Foot
            | Unit::Centimeter => Dimension::Length,
            Unit::Kilogram | Unit::Gram | Unit::Pound => Dimension::Mass,
        }
    }

    /// Factor converting one of this unit into the dimension's base unit
    /// (count/min, joule, meter, kilogram).
    fn to_base(&self) -> f64 {
        match self {
            Unit::CountPerMinute => 1.0,
            Unit::CountPerSecond => 60.0,
            Unit::Joule => 1.0,
            Unit::Kilojoule => 1_000.0,
            Unit::SmallCalorie => 4.184,
            Unit::Kilocalorie => 4_184.0,
            Unit::Meter => 1.0,
            Unit::Kilometer => 1_000.0,
            Unit::Mile => 1_609.344,
            Unit::Yard => 0.9144,
            Unit::Foot => 0.3048,
            Unit::Centimeter => 0.01,
            Unit::Kilogram => 1.0,
            Unit::Gram => 0.001,
            Unit::Pound => 0.453_592_37,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Unit::CountPerMinute => "count/min",
            Unit::CountPerSecond => "count/s",
            Unit::Kilocalorie => "kcal",
            Unit::SmallCalorie => "cal",
            Unit::Joule => "J",
            Unit::Kilojoule => "kJ",
            Unit::Meter => "m",
            Unit::Kilometer => "km",
            Unit::Mile => "mi",
            Unit::Yard => "yd",
            Unit::Foot => "ft",
            Unit::Centimeter => "cm",
            Unit::Kilogram => "kg",
            Unit::Gram => "g",
            Unit::Pound => "lb",
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A value tagged with the unit it was measured in
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quantity {
    pub value: f64,
    pub unit: Unit,
}

impl Quantity {
    pub fn new(value: f64, unit: Unit) -> Self {
        Self { value, unit }
    }

    /// Express this quantity in `target`, failing across dimensions.
    pub fn value_in(&self, target: Unit) -> Result<f64, ConversionError> {
        if self.unit.dimension() != target.dimension() {
            return Err(ConversionError::IncompatibleUnit {
                from: self.unit.to_string(),
                to: target.to_string(),
            });
        }
        if self.unit == target {
            return Ok(self.value);
        }
        Ok(self.value * self.unit.to_base() / target.to_base())
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value, self.unit)
    }
}

/// Category of a measured statistic as the backend names it
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuantityKind {
    HeartRate,
    ActiveEnergyBurned,
    DistanceWalkingRunning,
    DistanceSwimming,
    DistanceCycling,
    BodyMass,
    Height,
    /// Anything newer than this crate understands
    Other(String),
}

impl fmt::Display for QuantityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuantityKind::HeartRate => write!(f, "heart_rate"),
            QuantityKind::ActiveEnergyBurned => write!(f, "active_energy_burned"),
            QuantityKind::DistanceWalkingRunning => write!(f, "distance_walking_running"),
            QuantityKind::DistanceSwimming => write!(f, "distance_swimming"),
            QuantityKind::DistanceCycling => write!(f, "distance_cycling"),
            QuantityKind::BodyMass => write!(f, "body_mass"),
            QuantityKind::Height => write!(f, "height"),
            QuantityKind::Other(name) => write!(f, "{}", name),
        }
    }
}
