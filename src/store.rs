//! # In-Memory Health Store Module
//!
//! Process-local implementation of the health store used by tests and the
//! demo binary. Every write bumps the store's anchor and notifies subscribers.

use crate::error::HealthError;
use crate::history::{
    within, Anchor, EnergySample, HealthStore, StatisticsOption, WorkoutQuery, WorkoutRecord,
};
use crate::profile::{validate_sample, ProfileStore, Sex};
use crate::quantity::{Quantity, QuantityKind};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

#[derive(Default)]
struct Inner {
    sequence: Anchor,
    workouts: Vec<(Anchor, WorkoutRecord)>,
    heart_rate: Vec<(DateTime<Utc>, f64)>,
    energy: Vec<EnergySample>,
    samples: Vec<(QuantityKind, Quantity, DateTime<Utc>)>,
    birth_date: Option<NaiveDate>,
    sex: Option<Sex>,
    denied: bool,
}

impl Inner {
    fn bump(&mut self) -> Anchor {
        self.sequence += 1;
        self.sequence
    }

    fn check_access(&self) -> Result<(), HealthError> {
        if self.denied {
            Err(HealthError::Denied)
        } else {
            Ok(())
        }
    }
}

pub struct InMemoryHealthStore {
    inner: Mutex<Inner>,
    changes: watch::Sender<Anchor>,
}

impl Default for InMemoryHealthStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryHealthStore {
    pub fn new() -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            inner: Mutex::new(Inner::default()),
            changes,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn write<F>(&self, apply: F)
    where
        F: FnOnce(&mut Inner, Anchor),
    {
        let anchor = {
            let mut inner = self.lock();
            let anchor = inner.bump();
            apply(&mut *inner, anchor);
            anchor
        };
        self.changes.send_replace(anchor);
    }

    pub fn add_workout(&self, workout: WorkoutRecord) {
        log::debug!("Storing {:?} workout {}", workout.activity, workout.id);
        self.write(|inner, anchor| inner.workouts.push((anchor, workout)));
    }

    pub fn add_heart_rate(&self, at: DateTime<Utc>, bpm: f64) {
        self.write(|inner, _| inner.heart_rate.push((at, bpm)));
    }

    pub fn add_energy(&self, sample: EnergySample) {
        self.write(|inner, _| inner.energy.push(sample));
    }

    pub fn set_birth_date(&self, birth_date: NaiveDate) {
        self.write(|inner, _| inner.birth_date = Some(birth_date));
    }

    pub fn set_sex(&self, sex: Sex) {
        self.write(|inner, _| inner.sex = Some(sex));
    }

    /// Make every query fail with `HealthError::Denied`.
    pub fn set_denied(&self, denied: bool) {
        self.lock().denied = denied;
    }
}

#[async_trait]
impl HealthStore for InMemoryHealthStore {
    async fn workouts(&self, query: &WorkoutQuery) -> Result<Vec<WorkoutRecord>, HealthError> {
        let inner = self.lock();
        inner.check_access()?;
        let mut workouts: Vec<WorkoutRecord> = inner
            .workouts
            .iter()
            .map(|(_, workout)| workout)
            .filter(|workout| query.matches(workout))
            .cloned()
            .collect();
        workouts.sort_by(|a, b| b.start.cmp(&a.start));
        Ok(workouts)
    }

    async fn heart_rate_statistics(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        option: StatisticsOption,
    ) -> Result<Option<f64>, HealthError> {
        let inner = self.lock();
        inner.check_access()?;
        let samples: Vec<f64> = inner
            .heart_rate
            .iter()
            .filter(|(at, _)| within(*at, Some(start), Some(end)))
            .map(|(_, bpm)| *bpm)
            .collect();
        Ok(option.reduce(&samples))
    }

    async fn energy_samples(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        own_app_only: bool,
    ) -> Result<Vec<EnergySample>, HealthError> {
        let inner = self.lock();
        inner.check_access()?;
        Ok(inner
            .energy
            .iter()
            .filter(|sample| sample.start >= start && sample.start < end)
            .filter(|sample| !own_app_only || sample.own_app)
            .copied()
            .collect())
    }

    async fn anchored_workouts(
        &self,
        query: &WorkoutQuery,
        anchor: Option<Anchor>,
    ) -> Result<(Vec<WorkoutRecord>, Anchor), HealthError> {
        let inner = self.lock();
        inner.check_access()?;
        let after = anchor.unwrap_or(0);
        let workouts = inner
            .workouts
            .iter()
            .filter(|(added, workout)| *added > after && query.matches(workout))
            .map(|(_, workout)| workout.clone())
            .collect();
        Ok((workouts, inner.sequence))
    }

    fn subscribe(&self) -> watch::Receiver<Anchor> {
        self.changes.subscribe()
    }
}

#[async_trait]
impl ProfileStore for InMemoryHealthStore {
    async fn birth_date(&self) -> Result<Option<NaiveDate>, HealthError> {
        let inner = self.lock();
        inner.check_access()?;
        Ok(inner.birth_date)
    }

    async fn biological_sex(&self) -> Result<Option<Sex>, HealthError> {
        let inner = self.lock();
        inner.check_access()?;
        Ok(inner.sex)
    }

    async fn latest_sample(&self, kind: &QuantityKind) -> Result<Option<Quantity>, HealthError> {
        let inner = self.lock();
        inner.check_access()?;
        Ok(inner
            .samples
            .iter()
            .filter(|(sample_kind, _, _)| sample_kind == kind)
            .max_by_key(|(_, _, at)| *at)
            .map(|(_, quantity, _)| *quantity))
    }

    async fn store_sample(
        &self,
        kind: QuantityKind,
        quantity: Quantity,
        at: DateTime<Utc>,
    ) -> Result<(), HealthError> {
        self.lock().check_access()?;
        validate_sample(&kind, &quantity)?;
        log::debug!("Storing {} sample {}", kind, quantity);
        self.write(|inner, _| inner.samples.push((kind, quantity, at)));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::ActivityKind;
    use crate::session::Metadata;
    use std::time::Duration;

    fn workout(id: u64) -> WorkoutRecord {
        let start = Utc::now();
        WorkoutRecord {
            id,
            activity: ActivityKind::Cycling,
            start,
            end: start,
            duration: Duration::from_secs(600),
            total_energy_kcal: None,
            total_distance_m: Some(5_000.0),
            events: Vec::new(),
            metadata: Metadata::new(),
            own_app: true,
        }
    }

    #[tokio::test]
    async fn test_anchored_query_returns_only_newer_workouts() {
        let store = InMemoryHealthStore::new();
        let query = WorkoutQuery::new(ActivityKind::Cycling);
        store.add_workout(workout(1));

        let (first, anchor) = store
            .anchored_workouts(&query, None)
            .await
            .expect("query succeeds");
        assert_eq!(first.len(), 1);

        store.add_workout(workout(2));
        let (second, next) = store
            .anchored_workouts(&query, Some(anchor))
            .await
            .expect("query succeeds");
        assert_eq!(second.iter().map(|w| w.id).collect::<Vec<_>>(), vec![2]);
        assert!(next > anchor);
    }

    #[tokio::test]
    async fn test_writes_notify_subscribers() {
        let store = InMemoryHealthStore::new();
        let mut changes = store.subscribe();
        store.add_heart_rate(Utc::now(), 80.0);
        changes.changed().await.expect("store alive");
        assert_eq!(*changes.borrow(), 1);
    }
}
