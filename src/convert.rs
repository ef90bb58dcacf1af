//! Sample conversion into the canonical data point schema.
//!
//! Pure functions, no I/O. Every raw sample maps to exactly one
//! [`CanonicalDataPoint`]:
//!
//! | Raw kind | `value` | `unit` | `metadata` |
//! |----------|---------|--------|------------|
//! | quantity | value in [`unit_for`] of the tag | canonical unit string | sample metadata |
//! | category | integer code | `""` | sample metadata |
//! | workout  | activity-type code | `"activityType"` | duration, energy, distance |

use crate::models::{
    CanonicalDataPoint, CategorySample, Metadata, QuantitySample, RawSample, SampleSource,
    WorkoutSample,
};
use crate::units::Unit;

/// Data-type tag for workout points.
pub const WORKOUT_DATA_TYPE: &str = "workoutType";

/// Unit sentinel for workout points.
pub const WORKOUT_UNIT: &str = "activityType";

/// Canonical unit for a data-type tag. Unrecognized tags use [`Unit::Count`].
pub fn unit_for(data_type: &str) -> Unit {
    match data_type {
        "stepCount" | "flightsClimbed" => Unit::Count,
        "distanceWalkingRunning" => Unit::Kilometer,
        "heartRate" | "respiratoryRate" => Unit::CountPerMinute,
        "activeEnergyBurned" | "basalEnergyBurned" => Unit::Kilocalorie,
        "bodyMass" => Unit::Kilogram,
        "bloodPressureSystolic" | "bloodPressureDiastolic" => Unit::MillimeterOfMercury,
        "bloodGlucose" => Unit::MilligramPerDeciliter,
        "oxygenSaturation" => Unit::Percent,
        _ => Unit::Count,
    }
}

fn provenance(source: &SampleSource) -> (String, String, String) {
    (
        source.name.clone(),
        source.version.clone().unwrap_or_default(),
        source.device.clone().unwrap_or_default(),
    )
}

pub fn convert_quantity(sample: &QuantitySample, data_type: &str) -> CanonicalDataPoint {
    let unit = unit_for(data_type);
    let value = match sample.quantity.value_in(unit) {
        Some(v) => v,
        None => {
            tracing::warn!(
                data_type,
                recorded = %sample.quantity.unit,
                canonical = %unit,
                "sample unit incompatible with canonical unit; passing value through"
            );
            sample.quantity.value
        }
    };
    let (source_name, source_version, device) = provenance(&sample.source);

    CanonicalDataPoint {
        data_type: data_type.to_string(),
        value,
        timestamp: sample.start,
        unit: unit.as_str().to_string(),
        source_name,
        source_version,
        device,
        metadata: sample.metadata.clone(),
    }
}

pub fn convert_category(sample: &CategorySample, data_type: &str) -> CanonicalDataPoint {
    let (source_name, source_version, device) = provenance(&sample.source);

    CanonicalDataPoint {
        data_type: data_type.to_string(),
        value: sample.value as f64,
        timestamp: sample.start,
        unit: String::new(),
        source_name,
        source_version,
        device,
        metadata: sample.metadata.clone(),
    }
}

/// One point per workout. Missing energy or distance becomes `0`.
pub fn convert_workout(workout: &WorkoutSample) -> CanonicalDataPoint {
    let duration_seconds = (workout.end - workout.start).num_milliseconds() as f64 / 1000.0;
    let total_energy_kcal = workout
        .total_energy
        .and_then(|q| q.value_in(Unit::Kilocalorie))
        .unwrap_or(0.0);
    let total_distance_km = workout
        .total_distance
        .and_then(|q| q.value_in(Unit::Kilometer))
        .unwrap_or(0.0);

    let mut metadata = Metadata::new();
    metadata.insert("duration_seconds".into(), duration_seconds.into());
    metadata.insert("total_energy_kcal".into(), total_energy_kcal.into());
    metadata.insert("total_distance_km".into(), total_distance_km.into());

    let (source_name, source_version, device) = provenance(&workout.source);

    CanonicalDataPoint {
        data_type: WORKOUT_DATA_TYPE.to_string(),
        value: f64::from(workout.activity_type),
        timestamp: workout.start,
        unit: WORKOUT_UNIT.to_string(),
        source_name,
        source_version,
        device,
        metadata,
    }
}

pub fn convert_sample(sample: &RawSample, data_type: &str) -> CanonicalDataPoint {
    match sample {
        RawSample::Quantity(q) => convert_quantity(q, data_type),
        RawSample::Category(c) => convert_category(c, data_type),
    }
}
