//! # Workout History Module
//!
//! Read side of the health store: finished workouts, heart rate during those
//! workouts, burned calories over fixed intervals, and a long-running observer
//! that reports newly added workouts.
//!
//! ## Key Components
//! - `HealthStore`: Async query surface of the platform store
//! - `WorkoutFetcher`: Workout queries plus per-bucket aggregation helpers
//! - `HeartRateFetcher`: One heart rate statistic per workout
//! - `BurnedCaloriesFetcher`: Active energy summed over fixed intervals
//! - `WorkoutObserver`: Anchored workout query that follows store changes
//!
//! ## Date Predicates
//! Workout and heart rate queries match on the sample start only: a sample
//! qualifies when `start <= sample.start <= end`. Missing bounds are open.
//! Calendar buckets are computed in UTC.

use crate::configuration::ActivityKind;
use crate::error::HealthError;
use crate::session::Metadata;
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration as ChronoDuration, NaiveDate, Utc};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Position in the store's change history
pub type Anchor = u64;

/// Filter for workout queries
#[derive(Debug, Clone, PartialEq)]
pub struct WorkoutQuery {
    pub activity: ActivityKind,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub own_app_only: bool,
}

impl WorkoutQuery {
    pub fn new(activity: ActivityKind) -> Self {
        Self {
            activity,
            start: None,
            end: None,
            own_app_only: false,
        }
    }

    pub fn between(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.start = Some(start);
        self.end = Some(end);
        self
    }

    pub fn own_app_only(mut self) -> Self {
        self.own_app_only = true;
        self
    }

    pub fn matches(&self, workout: &WorkoutRecord) -> bool {
        workout.activity == self.activity
            && within(workout.start, self.start, self.end)
            && (!self.own_app_only || workout.own_app)
    }
}

/// Start-date predicate shared by every history query.
pub fn within(
    at: DateTime<Utc>,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> bool {
    start.map_or(true, |start| at >= start) && end.map_or(true, |end| at <= end)
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkoutEvent {
    pub at: DateTime<Utc>,
    pub metadata: Metadata,
}

/// A finished workout as stored by the platform
#[derive(Debug, Clone, PartialEq)]
pub struct WorkoutRecord {
    pub id: u64,
    pub activity: ActivityKind,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub duration: Duration,
    pub total_energy_kcal: Option<f64>,
    pub total_distance_m: Option<f64>,
    pub events: Vec<WorkoutEvent>,
    pub metadata: Metadata,
    /// Written by this application rather than another source
    pub own_app: bool,
}

/// Which discrete statistic a heart rate query computes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatisticsOption {
    Average,
    Maximum,
    Minimum,
}

impl StatisticsOption {
    /// Reduce bpm samples to the selected statistic; `None` for no samples.
    pub fn reduce(&self, samples: &[f64]) -> Option<f64> {
        if samples.is_empty() {
            return None;
        }
        let value = match self {
            StatisticsOption::Average => samples.iter().sum::<f64>() / samples.len() as f64,
            StatisticsOption::Maximum => samples.iter().copied().fold(f64::MIN, f64::max),
            StatisticsOption::Minimum => samples.iter().copied().fold(f64::MAX, f64::min),
        };
        Some(value)
    }
}

/// Active energy recorded over one time span
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnergySample {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub kcal: f64,
    pub own_app: bool,
}

/// Async query surface of the health store
#[async_trait]
pub trait HealthStore: Send + Sync {
    /// Matching workouts, newest start first.
    async fn workouts(&self, query: &WorkoutQuery) -> Result<Vec<WorkoutRecord>, HealthError>;

    /// Heart rate statistic in count/min over samples starting in `[start, end]`.
    async fn heart_rate_statistics(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        option: StatisticsOption,
    ) -> Result<Option<f64>, HealthError>;

    /// Energy samples starting in `[start, end)`.
    async fn energy_samples(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        own_app_only: bool,
    ) -> Result<Vec<EnergySample>, HealthError>;

    /// Matching workouts added after `anchor`, with the anchor to resume from.
    async fn anchored_workouts(
        &self,
        query: &WorkoutQuery,
        anchor: Option<Anchor>,
    ) -> Result<(Vec<WorkoutRecord>, Anchor), HealthError>;

    /// Change signal carrying the store's latest anchor.
    fn subscribe(&self) -> watch::Receiver<Anchor>;
}

/// Calendar granularity for grouping workouts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupUnit {
    Day,
    Week,
    Month,
    Year,
}

/// Calendar bucket a workout start falls into
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Bucket {
    Day(NaiveDate),
    /// ISO week
    Week { year: i32, week: u32 },
    Month { year: i32, month: u32 },
    Year(i32),
}

impl GroupUnit {
    pub fn bucket(&self, at: DateTime<Utc>) -> Bucket {
        let date = at.date_naive();
        match self {
            GroupUnit::Day => Bucket::Day(date),
            GroupUnit::Week => {
                let week = date.iso_week();
                Bucket::Week {
                    year: week.year(),
                    week: week.week(),
                }
            }
            GroupUnit::Month => Bucket::Month {
                year: date.year(),
                month: date.month(),
            },
            GroupUnit::Year => Bucket::Year(date.year()),
        }
    }
}

pub struct WorkoutFetcher {
    store: Arc<dyn HealthStore>,
}

impl WorkoutFetcher {
    pub fn new(store: Arc<dyn HealthStore>) -> Self {
        Self { store }
    }

    pub async fn workouts(&self, query: &WorkoutQuery) -> Result<Vec<WorkoutRecord>, HealthError> {
        self.store.workouts(query).await
    }

    /// Sum the numeric metadata value under `key` across workout events,
    /// bucketed by workout start.
    ///
    /// A bucket appears once any of its workouts has an event with metadata;
    /// its value stays `None` until an event carries a numeric `key`.
    pub fn metadata_from_events(
        workouts: &[WorkoutRecord],
        group_unit: GroupUnit,
        key: &str,
    ) -> BTreeMap<Bucket, Option<f64>> {
        let mut collections: BTreeMap<Bucket, Option<f64>> = BTreeMap::new();
        for workout in workouts {
            let bucket = group_unit.bucket(workout.start);
            for event in workout.events.iter().filter(|e| !e.metadata.is_empty()) {
                let value = event.metadata.get(key).and_then(|v| v.as_f64());
                let entry = collections.entry(bucket).or_insert(None);
                *entry = match (*entry, value) {
                    (Some(total), Some(value)) => Some(total + value),
                    (total, None) => total,
                    (None, value) => value,
                };
            }
        }
        collections
    }

    /// Total workout duration per bucket.
    pub fn time_interval(
        workouts: &[WorkoutRecord],
        group_unit: GroupUnit,
    ) -> BTreeMap<Bucket, Duration> {
        let mut collections = BTreeMap::new();
        for workout in workouts {
            *collections
                .entry(group_unit.bucket(workout.start))
                .or_insert(Duration::ZERO) += workout.duration;
        }
        collections
    }
}

/// Heart rate statistic for one workout
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeartRateSummary {
    pub value: Option<f64>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

pub struct HeartRateFetcher {
    store: Arc<dyn HealthStore>,
}

impl HeartRateFetcher {
    pub fn new(store: Arc<dyn HealthStore>) -> Self {
        Self { store }
    }

    /// One summary per workout, in the order the workouts were given.
    pub async fn during_workouts(
        &self,
        workouts: &[WorkoutRecord],
        option: StatisticsOption,
    ) -> Result<Vec<HeartRateSummary>, HealthError> {
        let mut summaries = Vec::with_capacity(workouts.len());
        for workout in workouts {
            let value = self
                .store
                .heart_rate_statistics(workout.start, workout.end, option)
                .await?;
            summaries.push(HeartRateSummary {
                value,
                start: workout.start,
                end: workout.end,
            });
        }
        Ok(summaries)
    }
}

/// Active energy summed over one interval
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BurnedCalories {
    pub calories: f64,
    /// Start of the interval
    pub date: DateTime<Utc>,
}

pub struct BurnedCaloriesFetcher {
    store: Arc<dyn HealthStore>,
}

impl BurnedCaloriesFetcher {
    pub fn new(store: Arc<dyn HealthStore>) -> Self {
        Self { store }
    }

    /// Sum active energy into fixed `interval`s aligned on `anchor`.
    ///
    /// Returns every interval overlapping `[start, end]` that holds at least
    /// one sample, oldest first. Samples are assigned by their start.
    pub async fn burned_calories(
        &self,
        anchor: DateTime<Utc>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        interval: ChronoDuration,
        own_app_only: bool,
    ) -> Result<Vec<BurnedCalories>, HealthError> {
        let step = interval.num_milliseconds();
        if step <= 0 {
            return Err(HealthError::Query(format!(
                "interval must be positive, got {}ms",
                step
            )));
        }
        if end < start {
            return Ok(Vec::new());
        }

        let index_of = |at: DateTime<Utc>| (at - anchor).num_milliseconds().div_euclid(step);
        let interval_start = |index: i64| anchor + ChronoDuration::milliseconds(index * step);
        let first = index_of(start);
        let last = index_of(end);

        let samples = self
            .store
            .energy_samples(interval_start(first), interval_start(last + 1), own_app_only)
            .await?;

        let mut totals: BTreeMap<i64, f64> = BTreeMap::new();
        for sample in samples {
            let index = index_of(sample.start);
            if (first..=last).contains(&index) {
                *totals.entry(index).or_insert(0.0) += sample.kcal;
            }
        }
        Ok(totals
            .into_iter()
            .map(|(index, calories)| BurnedCalories {
                calories,
                date: interval_start(index),
            })
            .collect())
    }
}

/// Workouts delivered by the observer
#[derive(Debug, Clone, PartialEq)]
pub struct WorkoutBatch {
    pub workouts: Vec<WorkoutRecord>,
    pub anchor: Anchor,
}

/// Follows the store and reports workouts added after an anchor.
pub struct WorkoutObserver {
    store: Arc<dyn HealthStore>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl WorkoutObserver {
    pub fn new(store: Arc<dyn HealthStore>) -> Self {
        Self {
            store,
            task: Mutex::new(None),
        }
    }

    /// Start observing. Only the first call starts anything; later calls
    /// return `None`. Must be called from within a Tokio runtime.
    ///
    /// The receiver gets the initial batch first, then one batch per store
    /// change that added matching workouts.
    pub fn start(
        &self,
        query: WorkoutQuery,
        anchor: Option<Anchor>,
    ) -> Option<mpsc::UnboundedReceiver<WorkoutBatch>> {
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if task.is_some() {
            log::debug!("Workout observer already started");
            return None;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let store = self.store.clone();
        *task = Some(tokio::spawn(async move {
            let mut changes = store.subscribe();
            let mut anchor = anchor;
            let mut initial = true;
            loop {
                match store.anchored_workouts(&query, anchor).await {
                    Ok((workouts, next)) => {
                        anchor = Some(next);
                        if initial || !workouts.is_empty() {
                            if tx.send(WorkoutBatch { workouts, anchor: next }).is_err() {
                                break;
                            }
                        }
                        initial = false;
                    }
                    Err(e) => log::warn!("Workout observer query failed: {}", e),
                }
                if changes.changed().await.is_err() {
                    log::debug!("Health store closed, stopping workout observer");
                    break;
                }
            }
        }));
        Some(rx)
    }

    pub fn is_started(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl Drop for WorkoutObserver {
    fn drop(&mut self) {
        if let Some(task) = self.task.lock().unwrap_or_else(PoisonError::into_inner).take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MetadataValue;
    use crate::store::InMemoryHealthStore;
    use chrono::TimeZone;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, hour, 0, 0).unwrap()
    }

    fn run(id: u64, start: DateTime<Utc>, minutes: i64) -> WorkoutRecord {
        WorkoutRecord {
            id,
            activity: ActivityKind::Running,
            start,
            end: start + ChronoDuration::minutes(minutes),
            duration: Duration::from_secs(minutes as u64 * 60),
            total_energy_kcal: Some(29.0),
            total_distance_m: None,
            events: Vec::new(),
            metadata: Metadata::new(),
            own_app: true,
        }
    }

    fn event(key: &str, value: MetadataValue) -> WorkoutEvent {
        let mut metadata = Metadata::new();
        metadata.insert(key.to_string(), value);
        WorkoutEvent {
            at: at(1, 0),
            metadata,
        }
    }

    #[tokio::test]
    async fn test_workouts_newest_first_with_strict_start() {
        let store = Arc::new(InMemoryHealthStore::new());
        store.add_workout(run(1, at(1, 8), 30));
        store.add_workout(run(2, at(3, 8), 30));
        store.add_workout(run(3, at(2, 8), 30));
        let mut walk = run(4, at(2, 9), 30);
        walk.activity = ActivityKind::Walking;
        store.add_workout(walk);

        let fetcher = WorkoutFetcher::new(store);
        let query = WorkoutQuery::new(ActivityKind::Running).between(at(2, 8), at(3, 8));
        let ids: Vec<u64> = fetcher
            .workouts(&query)
            .await
            .expect("query succeeds")
            .iter()
            .map(|w| w.id)
            .collect();
        assert_eq!(ids, vec![2, 3]);
    }

    #[tokio::test]
    async fn test_own_app_only_filters_sources() {
        let store = Arc::new(InMemoryHealthStore::new());
        store.add_workout(run(1, at(1, 8), 30));
        let mut foreign = run(2, at(1, 9), 30);
        foreign.own_app = false;
        store.add_workout(foreign);

        let fetcher = WorkoutFetcher::new(store);
        let all = fetcher
            .workouts(&WorkoutQuery::new(ActivityKind::Running))
            .await
            .expect("query succeeds");
        let own = fetcher
            .workouts(&WorkoutQuery::new(ActivityKind::Running).own_app_only())
            .await
            .expect("query succeeds");
        assert_eq!(all.len(), 2);
        assert_eq!(own.len(), 1);
        assert_eq!(own[0].id, 1);
    }

    #[test]
    fn test_metadata_from_events_sums_per_bucket() {
        let mut first = run(1, at(1, 8), 30);
        first.events = vec![
            event("lap_calories", MetadataValue::Integer(130)),
            event("lap_calories", MetadataValue::Number(20.5)),
        ];
        let mut second = run(2, at(1, 18), 30);
        second.events = vec![event("note", "easy".into())];
        let mut third = run(3, at(2, 8), 30);
        third.events = vec![event("lap_calories", MetadataValue::Integer(50))];
        let fourth = run(4, at(4, 8), 30);

        let result = WorkoutFetcher::metadata_from_events(
            &[first, second, third, fourth],
            GroupUnit::Day,
            "lap_calories",
        );
        assert_eq!(result.len(), 2);
        assert_eq!(result[&GroupUnit::Day.bucket(at(1, 0))], Some(150.5));
        assert_eq!(result[&GroupUnit::Day.bucket(at(2, 0))], Some(50.0));

        let monthly = WorkoutFetcher::metadata_from_events(
            &[run(5, at(1, 8), 30)],
            GroupUnit::Month,
            "lap_calories",
        );
        assert!(monthly.is_empty());
    }

    #[test]
    fn test_metadata_bucket_without_numeric_value_is_none() {
        let mut workout = run(1, at(1, 8), 30);
        workout.events = vec![event("note", "tempo".into())];
        let result = WorkoutFetcher::metadata_from_events(&[workout], GroupUnit::Year, "calories");
        assert_eq!(result.get(&Bucket::Year(2024)), Some(&None));
    }

    #[test]
    fn test_time_interval_groups_by_week() {
        // 2024-03-04 is a Monday
        let workouts = [
            run(1, at(4, 8), 30),
            run(2, at(10, 8), 45),
            run(3, at(11, 8), 20),
        ];
        let result = WorkoutFetcher::time_interval(&workouts, GroupUnit::Week);
        assert_eq!(result.len(), 2);
        assert_eq!(
            result[&Bucket::Week { year: 2024, week: 10 }],
            Duration::from_secs(75 * 60)
        );
        assert_eq!(
            result[&Bucket::Week { year: 2024, week: 11 }],
            Duration::from_secs(20 * 60)
        );
    }

    #[tokio::test]
    async fn test_heart_rate_during_workouts_keeps_input_order() {
        let store = Arc::new(InMemoryHealthStore::new());
        for (minute, bpm) in [(0, 120.0), (10, 150.0), (20, 135.0)] {
            store.add_heart_rate(at(1, 8) + ChronoDuration::minutes(minute), bpm);
        }
        store.add_heart_rate(at(2, 8), 90.0);

        let workouts = [run(2, at(2, 8), 30), run(1, at(1, 8), 30), run(3, at(5, 8), 30)];
        let fetcher = HeartRateFetcher::new(store);

        let max = fetcher
            .during_workouts(&workouts, StatisticsOption::Maximum)
            .await
            .expect("query succeeds");
        let values: Vec<Option<f64>> = max.iter().map(|s| s.value).collect();
        assert_eq!(values, vec![Some(90.0), Some(150.0), None]);
        assert_eq!(max[1].start, at(1, 8));

        let avg = fetcher
            .during_workouts(&workouts[1..2], StatisticsOption::Average)
            .await
            .expect("query succeeds");
        assert_eq!(avg[0].value, Some(135.0));
    }

    #[tokio::test]
    async fn test_burned_calories_sums_non_empty_intervals() {
        let store = Arc::new(InMemoryHealthStore::new());
        let sample = |start: DateTime<Utc>, kcal: f64, own_app: bool| EnergySample {
            start,
            end: start + ChronoDuration::minutes(5),
            kcal,
            own_app,
        };
        store.add_energy(sample(at(1, 8), 10.0, true));
        store.add_energy(sample(at(1, 9), 5.0, true));
        store.add_energy(sample(at(1, 20), 7.0, false));
        store.add_energy(sample(at(3, 8), 2.0, true));
        store.add_energy(sample(at(6, 8), 100.0, true));

        let fetcher = BurnedCaloriesFetcher::new(store);
        let days = fetcher
            .burned_calories(at(1, 0), at(1, 12), at(3, 12), ChronoDuration::days(1), false)
            .await
            .expect("query succeeds");
        assert_eq!(
            days,
            vec![
                BurnedCalories {
                    calories: 22.0,
                    date: at(1, 0)
                },
                BurnedCalories {
                    calories: 2.0,
                    date: at(3, 0)
                },
            ]
        );

        let own = fetcher
            .burned_calories(at(1, 0), at(1, 0), at(1, 23), ChronoDuration::days(1), true)
            .await
            .expect("query succeeds");
        assert_eq!(own[0].calories, 15.0);
    }

    #[tokio::test]
    async fn test_burned_calories_rejects_empty_interval() {
        let fetcher = BurnedCaloriesFetcher::new(Arc::new(InMemoryHealthStore::new()));
        let result = fetcher
            .burned_calories(at(1, 0), at(1, 0), at(2, 0), ChronoDuration::zero(), false)
            .await;
        assert!(matches!(result, Err(HealthError::Query(_))));
    }

    #[tokio::test]
    async fn test_denied_store_fails_queries() {
        let store = Arc::new(InMemoryHealthStore::new());
        store.set_denied(true);
        let fetcher = WorkoutFetcher::new(store);
        assert_eq!(
            fetcher.workouts(&WorkoutQuery::new(ActivityKind::Running)).await,
            Err(HealthError::Denied)
        );
    }

    #[tokio::test]
    async fn test_observer_reports_initial_and_new_workouts() {
        let store = Arc::new(InMemoryHealthStore::new());
        store.add_workout(run(1, at(1, 8), 30));

        let observer = WorkoutObserver::new(store.clone());
        let mut batches = observer
            .start(WorkoutQuery::new(ActivityKind::Running), None)
            .expect("first start");
        assert!(observer
            .start(WorkoutQuery::new(ActivityKind::Running), None)
            .is_none());

        let initial = batches.recv().await.expect("initial batch");
        assert_eq!(initial.workouts.len(), 1);

        let mut walk = run(2, at(2, 8), 30);
        walk.activity = ActivityKind::Walking;
        store.add_workout(walk);
        store.add_workout(run(3, at(3, 8), 30));

        let next = batches.recv().await.expect("update batch");
        assert_eq!(
            next.workouts.iter().map(|w| w.id).collect::<Vec<_>>(),
            vec![3]
        );
        assert!(next.anchor > initial.anchor);
    }
}
