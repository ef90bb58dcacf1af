//! Units of measure for quantity samples.
//!
//! A raw quantity sample carries its value in whatever unit the recording
//! source chose. The converter asks for the value in the canonical unit of
//! the sample's data type; [`Quantity::value_in`] performs the conversion
//! when both units share a [`Dimension`].

use serde::{Deserialize, Serialize};

/// Physical dimension of a unit. Values only convert within a dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    Count,
    Frequency,
    Length,
    Energy,
    Mass,
    Pressure,
    Concentration,
    Fraction,
}

/// A unit of measure, serialized as its conventional unit string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Unit {
    #[serde(rename = "count")]
    Count,
    #[serde(rename = "count/min")]
    CountPerMinute,
    #[serde(rename = "count/s")]
    CountPerSecond,
    #[serde(rename = "m")]
    Meter,
    #[serde(rename = "km")]
    Kilometer,
    #[serde(rename = "mi")]
    Mile,
    #[serde(rename = "kcal")]
    Kilocalorie,
    #[serde(rename = "kJ")]
    Kilojoule,
    #[serde(rename = "g")]
    Gram,
    #[serde(rename = "kg")]
    Kilogram,
    #[serde(rename = "lb")]
    Pound,
    #[serde(rename = "mmHg")]
    MillimeterOfMercury,
    #[serde(rename = "mg/dL")]
    MilligramPerDeciliter,
    #[serde(rename = "%")]
    Percent,
}

impl Unit {
    /// The unit string written into canonical data points.
    pub fn as_str(&self) -> &'static str {
        match self {
            Unit::Count => "count",
            Unit::CountPerMinute => "count/min",
            Unit::CountPerSecond => "count/s",
            Unit::Meter => "m",
            Unit::Kilometer => "km",
            Unit::Mile => "mi",
            Unit::Kilocalorie => "kcal",
            Unit::Kilojoule => "kJ",
            Unit::Gram => "g",
            Unit::Kilogram => "kg",
            Unit::Pound => "lb",
            Unit::MillimeterOfMercury => "mmHg",
            Unit::MilligramPerDeciliter => "mg/dL",
            Unit::Percent => "%",
        }
    }

    pub fn dimension(&self) -> Dimension {
        match self {
            Unit::Count => Dimension::Count,
            Unit::CountPerMinute | Unit::CountPerSecond => Dimension::Frequency,
            Unit::Meter | Unit::Kilometer | Unit::Mile => Dimension::Length,
            Unit::Kilocalorie | Unit::Kilojoule => Dimension::Energy,
            Unit::Gram | Unit::Kilogram | Unit::Pound => Dimension::Mass,
            Unit::MillimeterOfMercury => Dimension::Pressure,
            Unit::MilligramPerDeciliter => Dimension::Concentration,
            Unit::Percent => Dimension::Fraction,
        }
    }

    /// Multiplier taking a value in this unit to the base unit of its
    /// dimension (meters, kilocalories, grams, counts per minute).
    fn to_base(self) -> f64 {
        match self {
            Unit::Count
            | Unit::CountPerMinute
            | Unit::Meter
            | Unit::Kilocalorie
            | Unit::Gram
            | Unit::MillimeterOfMercury
            | Unit::MilligramPerDeciliter
            | Unit::Percent => 1.0,
            Unit::CountPerSecond => 60.0,
            Unit::Kilometer => 1000.0,
            Unit::Mile => 1609.344,
            Unit::Kilojoule => 1.0 / 4.184,
            Unit::Kilogram => 1000.0,
            Unit::Pound => 453.592_37,
        }
    }
}

impl std::fmt::Display for Unit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A measured value together with the unit it was recorded in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quantity {
    pub value: f64,
    pub unit: Unit,
}

impl Quantity {
    pub fn new(value: f64, unit: Unit) -> Self {
        Self { value, unit }
    }

    /// Express this quantity in `target`.
    ///
    /// Returns `None` when the units measure different dimensions.
    pub fn value_in(&self, target: Unit) -> Option<f64> {
        if self.unit == target {
            return Some(self.value);
        }
        if self.unit.dimension() != target.dimension() {
            return None;
        }
        Some(self.value * self.unit.to_base() / target.to_base())
    }
}
