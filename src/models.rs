//! Core data models used throughout the sync pipeline.
//!
//! Raw samples come out of a [`HealthStore`](crate::store::HealthStore) in
//! one of three shapes (quantity, category, workout). The converter turns
//! each into a [`CanonicalDataPoint`], which is what the uploader ships.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize, Serializer};

use crate::units::Quantity;

/// A scalar metadata value attached to a sample or data point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Integer(i64),
    Number(f64),
    Text(String),
}

impl From<f64> for MetadataValue {
    fn from(v: f64) -> Self {
        MetadataValue::Number(v)
    }
}

impl From<i64> for MetadataValue {
    fn from(v: i64) -> Self {
        MetadataValue::Integer(v)
    }
}

impl From<bool> for MetadataValue {
    fn from(v: bool) -> Self {
        MetadataValue::Bool(v)
    }
}

impl From<&str> for MetadataValue {
    fn from(v: &str) -> Self {
        MetadataValue::Text(v.to_string())
    }
}

/// Sample or data-point metadata, keyed by name.
pub type Metadata = BTreeMap<String, MetadataValue>;

/// Where a sample was recorded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleSource {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub device: Option<String>,
}

/// A numeric measurement, e.g. one heart-rate reading.
#[derive(Debug, Clone, PartialEq)]
pub struct QuantitySample {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub quantity: Quantity,
    pub source: SampleSource,
    pub metadata: Metadata,
}

/// An integer-coded observation, e.g. a sleep stage interval.
#[derive(Debug, Clone, PartialEq)]
pub struct CategorySample {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub value: i64,
    pub source: SampleSource,
    pub metadata: Metadata,
}

/// A recorded workout session.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkoutSample {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Numeric activity-type code assigned by the store.
    pub activity_type: u32,
    pub total_energy: Option<Quantity>,
    pub total_distance: Option<Quantity>,
    pub source: SampleSource,
}

/// A raw sample returned by a per-type store query.
#[derive(Debug, Clone, PartialEq)]
pub enum RawSample {
    Quantity(QuantitySample),
    Category(CategorySample),
}

impl RawSample {
    pub fn start(&self) -> DateTime<Utc> {
        match self {
            RawSample::Quantity(s) => s.start,
            RawSample::Category(s) => s.start,
        }
    }
}

/// One normalized observation, as sent to the ingestion endpoint.
///
/// Created once by the converter and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalDataPoint {
    pub data_type: String,
    pub value: f64,
    #[serde(serialize_with = "serialize_instant")]
    pub timestamp: DateTime<Utc>,
    /// Empty for category and workout points.
    pub unit: String,
    pub source_name: String,
    pub source_version: String,
    pub device: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: Metadata,
}

/// ISO-8601 instant with millisecond fractional seconds, e.g.
/// `2024-03-01T08:15:00.250Z`.
fn serialize_instant<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// Aggregate outcome of one upload run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncResult {
    pub total_batches: usize,
    pub successful_batches: usize,
    pub failed_batches: usize,
    /// Every data point attempted, regardless of batch outcome.
    pub total_records: usize,
}
