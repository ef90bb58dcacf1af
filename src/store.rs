//! Local health-data store abstraction.
//!
//! The [`HealthStore`] trait is the boundary to the on-device health
//! database. Implementations answer one query per sample type over a
//! [`DateWindow`] with strict-start semantics: a sample is included only
//! when its start instant lies in `[start, end)`. Results of one query are
//! sorted ascending by start time.
//!
//! [`LocalExportStore`] implements the trait over a JSON export file so
//! the pipeline can run off-device:
//!
//! ```json
//! {
//!   "samples": [
//!     { "type": "heartRate", "start": "2024-05-01T08:00:00Z",
//!       "quantity": { "value": 61, "unit": "count/min" },
//!       "source": { "name": "Watch", "version": "10.4", "device": "Watch7,1" } },
//!     { "type": "sleepAnalysis", "start": "2024-05-01T00:10:00Z",
//!       "end": "2024-05-01T06:40:00Z", "value": 1, "source": { "name": "Watch" } }
//!   ],
//!   "workouts": [
//!     { "start": "2024-05-01T17:00:00Z", "end": "2024-05-01T17:40:00Z",
//!       "activity_type": 37, "total_distance": { "value": 6.2, "unit": "km" },
//!       "source": { "name": "Watch" } }
//!   ]
//! }
//! ```

use std::collections::HashMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use crate::error::SyncError;
use crate::metrics::{MetricType, SampleKind, SampleQuery};
use crate::models::{
    CategorySample, Metadata, QuantitySample, RawSample, SampleSource, WorkoutSample,
};
use crate::units::Quantity;

/// Half-open time range `[start, end)` for store queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl DateWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, SyncError> {
        if start > end {
            return Err(SyncError::QueryError(format!(
                "window start {} is after end {}",
                start.to_rfc3339(),
                end.to_rfc3339()
            )));
        }
        Ok(Self { start, end })
    }

    /// The `days` days ending at `end`.
    ///
    /// Fails with [`SyncError::QueryError`] when the start would fall
    /// outside the representable date range.
    pub fn last_days(end: DateTime<Utc>, days: u32) -> Result<Self, SyncError> {
        let start = Duration::try_days(i64::from(days))
            .and_then(|span| end.checked_sub_signed(span))
            .ok_or_else(|| {
                SyncError::QueryError(format!("a {} day window is out of range", days))
            })?;
        Ok(Self { start, end })
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Strict-start inclusion test.
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && instant < self.end
    }
}

/// The on-device health data store.
///
/// Queries may run concurrently; implementations must be safe to share
/// across tasks.
#[async_trait]
pub trait HealthStore: Send + Sync {
    /// Whether health data exists on this device at all.
    fn is_available(&self) -> bool {
        true
    }

    /// Ask for read permission on every queried type.
    ///
    /// `Ok(false)` means the user declined; `Err` means the request failed.
    async fn request_authorization(&self, queries: &[SampleQuery]) -> Result<bool, SyncError>;

    /// Samples of one quantity or category type whose start lies in `window`,
    /// ascending by start time.
    async fn query_samples(
        &self,
        metric: MetricType,
        window: DateWindow,
    ) -> Result<Vec<RawSample>, SyncError>;

    /// Workouts whose start lies in `window`, ascending by start time.
    async fn query_workouts(&self, window: DateWindow) -> Result<Vec<WorkoutSample>, SyncError>;
}

// ============ JSON export store ============

#[derive(Debug, Deserialize)]
struct ExportFile {
    #[serde(default)]
    samples: Vec<ExportSample>,
    #[serde(default)]
    workouts: Vec<ExportWorkout>,
}

#[derive(Debug, Deserialize)]
struct ExportSample {
    #[serde(rename = "type")]
    data_type: String,
    start: DateTime<Utc>,
    #[serde(default)]
    end: Option<DateTime<Utc>>,
    #[serde(default)]
    quantity: Option<Quantity>,
    #[serde(default)]
    value: Option<i64>,
    #[serde(default)]
    source: SampleSource,
    #[serde(default)]
    metadata: Metadata,
}

#[derive(Debug, Deserialize)]
struct ExportWorkout {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    activity_type: u32,
    #[serde(default)]
    total_energy: Option<Quantity>,
    #[serde(default)]
    total_distance: Option<Quantity>,
    #[serde(default)]
    source: SampleSource,
}

/// A [`HealthStore`] backed by a JSON export of device samples.
#[derive(Debug, Default)]
pub struct LocalExportStore {
    samples: HashMap<MetricType, Vec<RawSample>>,
    workouts: Vec<WorkoutSample>,
}

impl LocalExportStore {
    /// Read and validate an export file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read health export: {}", path.display()))?;
        Self::from_json(&content)
            .with_context(|| format!("Failed to parse health export: {}", path.display()))
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let export: ExportFile = serde_json::from_str(content)?;
        let mut store = Self::default();

        for (index, raw) in export.samples.into_iter().enumerate() {
            let Some(metric) = MetricType::from_tag(&raw.data_type) else {
                bail!("samples[{}]: unknown data type '{}'", index, raw.data_type);
            };
            let end = raw.end.unwrap_or(raw.start);
            let sample = match (metric.kind(), raw.quantity, raw.value) {
                (SampleKind::Quantity, Some(quantity), _) => RawSample::Quantity(QuantitySample {
                    start: raw.start,
                    end,
                    quantity,
                    source: raw.source,
                    metadata: raw.metadata,
                }),
                (SampleKind::Category, _, Some(value)) => RawSample::Category(CategorySample {
                    start: raw.start,
                    end,
                    value,
                    source: raw.source,
                    metadata: raw.metadata,
                }),
                (SampleKind::Quantity, None, _) => {
                    bail!("samples[{}]: {} requires a quantity", index, metric)
                }
                (SampleKind::Category, _, None) => {
                    bail!("samples[{}]: {} requires an integer value", index, metric)
                }
            };
            store.samples.entry(metric).or_default().push(sample);
        }

        store.workouts = export
            .workouts
            .into_iter()
            .map(|w| WorkoutSample {
                start: w.start,
                end: w.end,
                activity_type: w.activity_type,
                total_energy: w.total_energy,
                total_distance: w.total_distance,
                source: w.source,
            })
            .collect();

        Ok(store)
    }
}

#[async_trait]
impl HealthStore for LocalExportStore {
    async fn request_authorization(&self, _queries: &[SampleQuery]) -> Result<bool, SyncError> {
        Ok(true)
    }

    async fn query_samples(
        &self,
        metric: MetricType,
        window: DateWindow,
    ) -> Result<Vec<RawSample>, SyncError> {
        let mut found: Vec<RawSample> = self
            .samples
            .get(&metric)
            .map(|all| {
                all.iter()
                    .filter(|s| window.contains(s.start()))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        found.sort_by_key(|s| s.start());
        Ok(found)
    }

    async fn query_workouts(&self, window: DateWindow) -> Result<Vec<WorkoutSample>, SyncError> {
        let mut found: Vec<WorkoutSample> = self
            .workouts
            .iter()
            .filter(|w| window.contains(w.start))
            .cloned()
            .collect();
        found.sort_by_key(|w| w.start);
        Ok(found)
    }
}
