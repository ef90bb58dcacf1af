//! Catalogue of tracked health metrics.
//!
//! The sync reads twelve quantity types, two category types, and workouts.
//! Each gets its own independent store query, so one sync issues
//! [`SampleQuery::ALL`]`.len()` (15) queries.

use serde::{Deserialize, Serialize};

use crate::units::Unit;

/// Shape of the raw samples a metric produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleKind {
    /// Numeric measurement with a unit.
    Quantity,
    /// Integer-coded category value, no unit.
    Category,
}

/// A tracked sample type, serialized as its data-type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MetricType {
    StepCount,
    DistanceWalkingRunning,
    HeartRate,
    ActiveEnergyBurned,
    BasalEnergyBurned,
    FlightsClimbed,
    BodyMass,
    BloodPressureSystolic,
    BloodPressureDiastolic,
    BloodGlucose,
    OxygenSaturation,
    RespiratoryRate,
    SleepAnalysis,
    MindfulSession,
}

impl MetricType {
    pub const QUANTITY: [MetricType; 12] = [
        MetricType::StepCount,
        MetricType::DistanceWalkingRunning,
        MetricType::HeartRate,
        MetricType::ActiveEnergyBurned,
        MetricType::BasalEnergyBurned,
        MetricType::FlightsClimbed,
        MetricType::BodyMass,
        MetricType::BloodPressureSystolic,
        MetricType::BloodPressureDiastolic,
        MetricType::BloodGlucose,
        MetricType::OxygenSaturation,
        MetricType::RespiratoryRate,
    ];

    pub const CATEGORY: [MetricType; 2] = [MetricType::SleepAnalysis, MetricType::MindfulSession];

    /// The data-type tag written into canonical data points.
    pub fn tag(&self) -> &'static str {
        match self {
            MetricType::StepCount => "stepCount",
            MetricType::DistanceWalkingRunning => "distanceWalkingRunning",
            MetricType::HeartRate => "heartRate",
            MetricType::ActiveEnergyBurned => "activeEnergyBurned",
            MetricType::BasalEnergyBurned => "basalEnergyBurned",
            MetricType::FlightsClimbed => "flightsClimbed",
            MetricType::BodyMass => "bodyMass",
            MetricType::BloodPressureSystolic => "bloodPressureSystolic",
            MetricType::BloodPressureDiastolic => "bloodPressureDiastolic",
            MetricType::BloodGlucose => "bloodGlucose",
            MetricType::OxygenSaturation => "oxygenSaturation",
            MetricType::RespiratoryRate => "respiratoryRate",
            MetricType::SleepAnalysis => "sleepAnalysis",
            MetricType::MindfulSession => "mindfulSession",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::QUANTITY
            .iter()
            .chain(Self::CATEGORY.iter())
            .find(|m| m.tag() == tag)
            .copied()
    }

    pub fn kind(&self) -> SampleKind {
        match self {
            MetricType::SleepAnalysis | MetricType::MindfulSession => SampleKind::Category,
            _ => SampleKind::Quantity,
        }
    }

    /// Canonical unit for quantity metrics; `None` for category metrics.
    pub fn canonical_unit(&self) -> Option<Unit> {
        match self.kind() {
            SampleKind::Quantity => Some(crate::convert::unit_for(self.tag())),
            SampleKind::Category => None,
        }
    }
}

impl std::fmt::Display for MetricType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// One independent query issued during a fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleQuery {
    Samples(MetricType),
    Workouts,
}

impl SampleQuery {
    /// Every query a fetch issues: 12 quantity, 2 category, 1 workout.
    pub const ALL: [SampleQuery; 15] = [
        SampleQuery::Samples(MetricType::StepCount),
        SampleQuery::Samples(MetricType::DistanceWalkingRunning),
        SampleQuery::Samples(MetricType::HeartRate),
        SampleQuery::Samples(MetricType::ActiveEnergyBurned),
        SampleQuery::Samples(MetricType::BasalEnergyBurned),
        SampleQuery::Samples(MetricType::FlightsClimbed),
        SampleQuery::Samples(MetricType::BodyMass),
        SampleQuery::Samples(MetricType::BloodPressureSystolic),
        SampleQuery::Samples(MetricType::BloodPressureDiastolic),
        SampleQuery::Samples(MetricType::BloodGlucose),
        SampleQuery::Samples(MetricType::OxygenSaturation),
        SampleQuery::Samples(MetricType::RespiratoryRate),
        SampleQuery::Samples(MetricType::SleepAnalysis),
        SampleQuery::Samples(MetricType::MindfulSession),
        SampleQuery::Workouts,
    ];

    pub fn tag(&self) -> &'static str {
        match self {
            SampleQuery::Samples(metric) => metric.tag(),
            SampleQuery::Workouts => crate::convert::WORKOUT_DATA_TYPE,
        }
    }
}
