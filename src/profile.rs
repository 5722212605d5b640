//! # Profile Module
//!
//! The user's body characteristics as stored by the health platform.
//!
//! Height is reported in centimeters and weight in kilograms, taken from the
//! most recent sample. Birth date and sex are characteristics the user sets
//! once; the engine only reads them.

use crate::error::HealthError;
use crate::quantity::{Quantity, QuantityKind, Unit};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sex {
    NotSet,
    Female,
    Male,
    Other,
}

/// Every profile attribute, absent ones left as `None`
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Profile {
    pub birth_date: Option<NaiveDate>,
    pub height_cm: Option<f64>,
    pub sex: Option<Sex>,
    pub weight_kg: Option<f64>,
}

/// Profile half of the health store
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn birth_date(&self) -> Result<Option<NaiveDate>, HealthError>;

    async fn biological_sex(&self) -> Result<Option<Sex>, HealthError>;

    /// Most recent sample of `kind`, if any.
    async fn latest_sample(&self, kind: &QuantityKind) -> Result<Option<Quantity>, HealthError>;

    /// Save a height or body mass sample taken at `at`.
    async fn store_sample(
        &self,
        kind: QuantityKind,
        quantity: Quantity,
        at: DateTime<Utc>,
    ) -> Result<(), HealthError>;
}

/// Check that `quantity` is a height or body mass sample in a matching unit.
pub fn validate_sample(kind: &QuantityKind, quantity: &Quantity) -> Result<(), HealthError> {
    let unit = match kind {
        QuantityKind::Height => Unit::Centimeter,
        QuantityKind::BodyMass => Unit::Kilogram,
        other => {
            return Err(HealthError::Query(format!(
                "{} is not a profile sample",
                other
            )))
        }
    };
    quantity
        .value_in(unit)
        .map(|_| ())
        .map_err(|e| HealthError::Query(e.to_string()))
}

pub struct ProfileFetcher {
    store: Arc<dyn ProfileStore>,
}

impl ProfileFetcher {
    pub fn new(store: Arc<dyn ProfileStore>) -> Self {
        Self { store }
    }

    pub async fn birth_date(&self) -> Result<NaiveDate, HealthError> {
        self.store.birth_date().await?.ok_or(HealthError::NotFound)
    }

    pub async fn sex(&self) -> Result<Sex, HealthError> {
        self.store.biological_sex().await?.ok_or(HealthError::NotFound)
    }

    /// Latest height in centimeters.
    pub async fn height(&self) -> Result<f64, HealthError> {
        self.latest(QuantityKind::Height, Unit::Centimeter).await
    }

    /// Latest weight in kilograms.
    pub async fn weight(&self) -> Result<f64, HealthError> {
        self.latest(QuantityKind::BodyMass, Unit::Kilogram).await
    }

    /// Gather every attribute; missing ones are left out, other failures propagate.
    pub async fn profile(&self) -> Result<Profile, HealthError> {
        Ok(Profile {
            birth_date: found(self.birth_date().await)?,
            height_cm: found(self.height().await)?,
            sex: found(self.sex().await)?,
            weight_kg: found(self.weight().await)?,
        })
    }

    async fn latest(&self, kind: QuantityKind, unit: Unit) -> Result<f64, HealthError> {
        let sample = self
            .store
            .latest_sample(&kind)
            .await?
            .ok_or(HealthError::NotFound)?;
        sample
            .value_in(unit)
            .map_err(|e| HealthError::Query(e.to_string()))
    }
}

fn found<T>(result: Result<T, HealthError>) -> Result<Option<T>, HealthError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(HealthError::NotFound) => Ok(None),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryHealthStore;
    use chrono::{Duration, TimeZone};

    fn fetcher(store: &Arc<InMemoryHealthStore>) -> ProfileFetcher {
        ProfileFetcher::new(store.clone())
    }

    #[tokio::test]
    async fn test_missing_attributes_are_not_found() {
        let store = Arc::new(InMemoryHealthStore::new());
        let fetcher = fetcher(&store);
        assert_eq!(fetcher.birth_date().await, Err(HealthError::NotFound));
        assert_eq!(fetcher.sex().await, Err(HealthError::NotFound));
        assert_eq!(fetcher.height().await, Err(HealthError::NotFound));
        assert_eq!(fetcher.weight().await, Err(HealthError::NotFound));
        assert_eq!(fetcher.profile().await, Ok(Profile::default()));
    }

    #[tokio::test]
    async fn test_latest_samples_in_profile_units() {
        let store = Arc::new(InMemoryHealthStore::new());
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        store
            .store_sample(QuantityKind::Height, Quantity::new(1.75, Unit::Meter), now)
            .await
            .expect("height stored");
        store
            .store_sample(
                QuantityKind::BodyMass,
                Quantity::new(70.0, Unit::Kilogram),
                now - Duration::days(1),
            )
            .await
            .expect("weight stored");
        store
            .store_sample(
                QuantityKind::BodyMass,
                Quantity::new(150.0, Unit::Pound),
                now - Duration::days(30),
            )
            .await
            .expect("old weight stored");

        let fetcher = fetcher(&store);
        assert!((fetcher.height().await.expect("height") - 175.0).abs() < 1e-9);
        assert_eq!(fetcher.weight().await, Ok(70.0));
    }

    #[tokio::test]
    async fn test_profile_gathers_present_attributes() {
        let store = Arc::new(InMemoryHealthStore::new());
        let birth = NaiveDate::from_ymd_opt(1990, 7, 14).expect("valid date");
        store.set_birth_date(birth);
        store.set_sex(Sex::Female);
        store
            .store_sample(
                QuantityKind::BodyMass,
                Quantity::new(61.0, Unit::Kilogram),
                Utc::now(),
            )
            .await
            .expect("weight stored");

        let profile = fetcher(&store).profile().await.expect("profile");
        assert_eq!(
            profile,
            Profile {
                birth_date: Some(birth),
                height_cm: None,
                sex: Some(Sex::Female),
                weight_kg: Some(61.0),
            }
        );
    }

    #[tokio::test]
    async fn test_profile_propagates_denied() {
        let store = Arc::new(InMemoryHealthStore::new());
        store.set_denied(true);
        assert_eq!(fetcher(&store).profile().await, Err(HealthError::Denied));
    }

    #[tokio::test]
    async fn test_store_rejects_non_profile_samples() {
        let store = InMemoryHealthStore::new();
        let result = store
            .store_sample(
                QuantityKind::HeartRate,
                Quantity::new(60.0, Unit::CountPerMinute),
                Utc::now(),
            )
            .await;
        assert!(matches!(result, Err(HealthError::Query(_))));

        let result = store
            .store_sample(QuantityKind::Height, Quantity::new(70.0, Unit::Kilogram), Utc::now())
            .await;
        assert!(matches!(result, Err(HealthError::Query(_))));
    }
}
