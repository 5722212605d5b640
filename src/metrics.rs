//! # Live Metrics Module
//!
//! Converts backend statistics into the rounded, unit-normalized values of the
//! live snapshot and merges them one field at a time.
//!
//! ## Key Types
//! - `LiveSnapshot`: Current calories, distance and heart rate of the session
//! - `MetricKind`: The three snapshot fields a statistic can update
//! - `LiveMetrics`: Owner of the snapshot, serializing every merge and reset
//!
//! ## Canonical Units
//! - Heart rate: count/min, read from the most recent sample
//! - Active energy: kcal, read from the cumulative sum
//! - Distance: meters, read from the cumulative sum
//!
//! Values are rounded to whole units, half away from zero.

use crate::backend::Statistics;
use crate::error::ConversionError;
use crate::quantity::{Quantity, QuantityKind, Unit};
use serde::Serialize;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Current best-known aggregate values for the active session
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct LiveSnapshot {
    pub active_calories: f64,
    pub distance_meters: f64,
    pub heart_rate_bpm: f64,
}

impl LiveSnapshot {
    /// Overwrite only the fields that are given.
    pub fn update(
        &mut self,
        active_calories: Option<f64>,
        distance_meters: Option<f64>,
        heart_rate_bpm: Option<f64>,
    ) {
        self.active_calories = active_calories.unwrap_or(self.active_calories);
        self.distance_meters = distance_meters.unwrap_or(self.distance_meters);
        self.heart_rate_bpm = heart_rate_bpm.unwrap_or(self.heart_rate_bpm);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    HeartRate,
    ActiveEnergy,
    Distance,
}

impl MetricKind {
    /// Map a backend quantity kind onto a snapshot field.
    ///
    /// Every distance flavor feeds the same field. Kinds the snapshot doesn't
    /// track return `None`.
    pub fn classify(kind: &QuantityKind) -> Option<Self> {
        match kind {
            QuantityKind::HeartRate => Some(MetricKind::HeartRate),
            QuantityKind::ActiveEnergyBurned => Some(MetricKind::ActiveEnergy),
            QuantityKind::DistanceWalkingRunning
            | QuantityKind::DistanceSwimming
            | QuantityKind::DistanceCycling => Some(MetricKind::Distance),
            _ => None,
        }
    }

    pub fn canonical_unit(&self) -> Unit {
        match self {
            MetricKind::HeartRate => Unit::CountPerMinute,
            MetricKind::ActiveEnergy => Unit::Kilocalorie,
            MetricKind::Distance => Unit::Meter,
        }
    }

    /// Pick the aggregate this metric reads out of a statistic.
    pub fn reading(&self, statistics: &Statistics) -> Result<Quantity, ConversionError> {
        let quantity = match self {
            MetricKind::HeartRate => statistics.most_recent,
            MetricKind::ActiveEnergy | MetricKind::Distance => statistics.sum,
        };
        quantity.ok_or_else(|| ConversionError::MissingValue(statistics.kind.to_string()))
    }

    /// Convert to the canonical unit and round to a whole unit.
    ///
    /// Snapshot fields are never negative; NaN, infinite and negative
    /// readings are rejected.
    pub fn normalize(&self, raw: Quantity) -> Result<f64, ConversionError> {
        let value = raw.value_in(self.canonical_unit())?;
        if !value.is_finite() || value < 0.0 {
            return Err(ConversionError::OutOfRange(value));
        }
        Ok(value.round())
    }

    fn store(&self, snapshot: &mut LiveSnapshot, value: f64) {
        match self {
            MetricKind::HeartRate => snapshot.update(None, None, Some(value)),
            MetricKind::ActiveEnergy => snapshot.update(Some(value), None, None),
            MetricKind::Distance => snapshot.update(None, Some(value), None),
        }
    }
}

/// Owner of the live snapshot.
///
/// Backend notifications for different metrics may arrive on different
/// threads; every merge and reset happens inside one critical section.
#[derive(Debug, Default)]
pub struct LiveMetrics {
    snapshot: Mutex<LiveSnapshot>,
}

impl LiveMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalize `raw` and store it in the field for `kind`, returning the
    /// rounded value.
    pub fn apply(&self, kind: MetricKind, raw: Quantity) -> Result<f64, ConversionError> {
        self.merge_with(kind, raw, |_| {})
    }

    /// Like `apply`, handing the merged snapshot to `publish` before the
    /// critical section ends, so publications follow merge order.
    pub fn merge_with<F>(
        &self,
        kind: MetricKind,
        raw: Quantity,
        publish: F,
    ) -> Result<f64, ConversionError>
    where
        F: FnOnce(LiveSnapshot),
    {
        let mut snapshot = self.lock();
        let value = kind.normalize(raw)?;
        kind.store(&mut snapshot, value);
        publish(*snapshot);
        Ok(value)
    }

    /// Zero every field, returning the fresh snapshot.
    pub fn reset(&self) -> LiveSnapshot {
        self.reset_with(|_| {})
    }

    pub fn reset_with<F>(&self, publish: F) -> LiveSnapshot
    where
        F: FnOnce(LiveSnapshot),
    {
        let mut snapshot = self.lock();
        *snapshot = LiveSnapshot::default();
        publish(*snapshot);
        *snapshot
    }

    pub fn snapshot(&self) -> LiveSnapshot {
        *self.lock()
    }

    fn lock(&self) -> MutexGuard<'_, LiveSnapshot> {
        // A panic mid-update can't leave a half-written f64, so the data is still usable
        self.snapshot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_apply_rounds_and_touches_one_field() {
        let metrics = LiveMetrics::new();
        let value = metrics
            .apply(MetricKind::HeartRate, Quantity::new(72.4, Unit::CountPerMinute))
            .expect("bpm applies");
        assert_eq!(value, 72.0);
        assert_eq!(
            metrics.snapshot(),
            LiveSnapshot {
                active_calories: 0.0,
                distance_meters: 0.0,
                heart_rate_bpm: 72.0,
            }
        );
    }

    #[test]
    fn test_rounding_half_away_from_zero() {
        let metrics = LiveMetrics::new();
        let value = metrics
            .apply(MetricKind::Distance, Quantity::new(12.5, Unit::Meter))
            .expect("distance applies");
        assert_eq!(value, 13.0);
        let value = metrics
            .apply(MetricKind::ActiveEnergy, Quantity::new(2.49, Unit::Kilocalorie))
            .expect("energy applies");
        assert_eq!(value, 2.0);
    }

    #[test]
    fn test_interleaved_updates_keep_last_value_per_field() {
        let metrics = LiveMetrics::new();
        let updates = [
            (MetricKind::Distance, Quantity::new(100.2, Unit::Meter)),
            (MetricKind::HeartRate, Quantity::new(90.6, Unit::CountPerMinute)),
            (MetricKind::Distance, Quantity::new(0.25, Unit::Kilometer)),
            (MetricKind::HeartRate, Quantity::new(1.5, Unit::CountPerSecond)),
        ];
        for (kind, quantity) in updates {
            metrics.apply(kind, quantity).expect("update applies");
        }
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.distance_meters, 250.0);
        assert_eq!(snapshot.heart_rate_bpm, 90.0);
        assert_eq!(snapshot.active_calories, 0.0);
    }

    #[test]
    fn test_incompatible_unit_leaves_snapshot_untouched() {
        let metrics = LiveMetrics::new();
        metrics
            .apply(MetricKind::Distance, Quantity::new(10.0, Unit::Meter))
            .expect("distance applies");
        let result = metrics.apply(MetricKind::Distance, Quantity::new(3.0, Unit::Kilocalorie));
        assert!(result.is_err());
        assert_eq!(metrics.snapshot().distance_meters, 10.0);
    }

    #[test]
    fn test_negative_and_non_finite_values_rejected() {
        let metrics = LiveMetrics::new();
        metrics
            .apply(MetricKind::ActiveEnergy, Quantity::new(4.0, Unit::Kilocalorie))
            .expect("energy applies");

        let negative = metrics.apply(
            MetricKind::ActiveEnergy,
            Quantity::new(-12.3, Unit::Kilocalorie),
        );
        assert_eq!(negative, Err(ConversionError::OutOfRange(-12.3)));
        assert!(matches!(
            metrics.apply(MetricKind::HeartRate, Quantity::new(f64::NAN, Unit::CountPerMinute)),
            Err(ConversionError::OutOfRange(_))
        ));
        assert!(matches!(
            metrics.apply(MetricKind::Distance, Quantity::new(f64::INFINITY, Unit::Meter)),
            Err(ConversionError::OutOfRange(_))
        ));

        let mut published = false;
        let result = metrics.merge_with(
            MetricKind::Distance,
            Quantity::new(-1.0, Unit::Kilometer),
            |_| published = true,
        );
        assert!(result.is_err());
        assert!(!published);
        assert_eq!(
            metrics.snapshot(),
            LiveSnapshot {
                active_calories: 4.0,
                distance_meters: 0.0,
                heart_rate_bpm: 0.0,
            }
        );
    }

    #[test]
    fn test_reset_is_idempotent() {
        let metrics = LiveMetrics::new();
        metrics
            .apply(MetricKind::ActiveEnergy, Quantity::new(300.0, Unit::Kilocalorie))
            .expect("energy applies");
        for _ in 0..3 {
            assert_eq!(metrics.reset(), LiveSnapshot::default());
        }
        assert_eq!(metrics.snapshot(), LiveSnapshot::default());
    }

    #[test]
    fn test_merge_with_publishes_merged_snapshot() {
        let metrics = LiveMetrics::new();
        metrics
            .apply(MetricKind::HeartRate, Quantity::new(120.0, Unit::CountPerMinute))
            .expect("bpm applies");
        let mut published = None;
        metrics
            .merge_with(
                MetricKind::ActiveEnergy,
                Quantity::new(8_368.0, Unit::Joule),
                |snapshot| published = Some(snapshot),
            )
            .expect("energy applies");
        assert_eq!(
            published,
            Some(LiveSnapshot {
                active_calories: 2.0,
                distance_meters: 0.0,
                heart_rate_bpm: 120.0,
            })
        );
    }

    #[test]
    fn test_classify_distance_flavors() {
        assert_eq!(
            MetricKind::classify(&QuantityKind::DistanceSwimming),
            Some(MetricKind::Distance)
        );
        assert_eq!(
            MetricKind::classify(&QuantityKind::DistanceCycling),
            Some(MetricKind::Distance)
        );
        assert_eq!(MetricKind::classify(&QuantityKind::BodyMass), None);
        assert_eq!(
            MetricKind::classify(&QuantityKind::Other("vo2_max".to_string())),
            None
        );
    }

    #[test]
    fn test_reading_picks_aggregate() {
        let stats = Statistics {
            kind: QuantityKind::HeartRate,
            most_recent: None,
            sum: Some(Quantity::new(1.0, Unit::CountPerMinute)),
        };
        assert!(matches!(
            MetricKind::HeartRate.reading(&stats),
            Err(ConversionError::MissingValue(_))
        ));
    }

    #[test]
    fn test_concurrent_fields_do_not_race() {
        let metrics = Arc::new(LiveMetrics::new());
        let handles: Vec<_> = [
            (MetricKind::HeartRate, Unit::CountPerMinute),
            (MetricKind::ActiveEnergy, Unit::Kilocalorie),
            (MetricKind::Distance, Unit::Meter),
        ]
        .into_iter()
        .map(|(kind, unit)| {
            let metrics = metrics.clone();
            thread::spawn(move || {
                for i in 1..=500 {
                    metrics
                        .apply(kind, Quantity::new(i as f64, unit))
                        .expect("update applies");
                }
            })
        })
        .collect();
        for handle in handles {
            handle.join().expect("worker finished");
        }
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.heart_rate_bpm, 500.0);
        assert_eq!(snapshot.active_calories, 500.0);
        assert_eq!(snapshot.distance_meters, 500.0);
    }
}
