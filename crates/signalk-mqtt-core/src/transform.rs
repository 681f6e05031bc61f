//! Declarative value transforms applied to imported values.
//!
//! A rule may carry one transform. Transforms are plain data so they survive
//! persistence; they only touch numeric values and leave everything else
//! (strings, objects, null) as it arrived.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Units understood by [`ValueTransform::UnitConvert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Unit {
    #[serde(rename = "m/s")]
    MetersPerSecond,
    Knots,
    #[serde(rename = "km/h")]
    KilometersPerHour,
    Mph,
    Kelvin,
    Celsius,
    Fahrenheit,
    Radians,
    Degrees,
    Ratio,
    Percent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dimension {
    Speed,
    Temperature,
    Angle,
    Fraction,
}

impl Unit {
    fn dimension(self) -> Dimension {
        match self {
            Unit::MetersPerSecond | Unit::Knots | Unit::KilometersPerHour | Unit::Mph => {
                Dimension::Speed
            }
            Unit::Kelvin | Unit::Celsius | Unit::Fahrenheit => Dimension::Temperature,
            Unit::Radians | Unit::Degrees => Dimension::Angle,
            Unit::Ratio | Unit::Percent => Dimension::Fraction,
        }
    }

    /// Convert a value in this unit to the SI unit of its dimension.
    fn to_si(self, v: f64) -> f64 {
        match self {
            Unit::MetersPerSecond | Unit::Kelvin | Unit::Radians | Unit::Ratio => v,
            Unit::Knots => v * 1852.0 / 3600.0,
            Unit::KilometersPerHour => v / 3.6,
            Unit::Mph => v * 0.44704,
            Unit::Celsius => v + 273.15,
            Unit::Fahrenheit => (v - 32.0) * 5.0 / 9.0 + 273.15,
            Unit::Degrees => v.to_radians(),
            Unit::Percent => v / 100.0,
        }
    }

    /// Convert an SI value to this unit.
    fn from_si(self, v: f64) -> f64 {
        match self {
            Unit::MetersPerSecond | Unit::Kelvin | Unit::Radians | Unit::Ratio => v,
            Unit::Knots => v * 3600.0 / 1852.0,
            Unit::KilometersPerHour => v * 3.6,
            Unit::Mph => v / 0.44704,
            Unit::Celsius => v - 273.15,
            Unit::Fahrenheit => (v - 273.15) * 9.0 / 5.0 + 32.0,
            Unit::Degrees => v.to_degrees(),
            Unit::Percent => v * 100.0,
        }
    }
}

/// A value transform attached to an import rule.
///
/// Serialized with a `type` tag, e.g. `{"type": "scale", "factor": 0.5144}`
/// or `{"type": "unitConvert", "from": "knots", "to": "m/s"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ValueTransform {
    /// `value * factor`
    Scale { factor: f64 },
    /// `value + amount`
    Offset { amount: f64 },
    /// `value * factor + offset`
    Linear { factor: f64, offset: f64 },
    /// Convert between two units of the same dimension.
    UnitConvert { from: Unit, to: Unit },
}

/// Errors detected when validating a transform.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransformError {
    #[error("cannot convert {from:?} to {to:?}: different dimensions")]
    IncompatibleUnits { from: Unit, to: Unit },
    #[error("transform parameter must be finite")]
    NonFinite,
}

impl ValueTransform {
    /// Check the transform's parameters.
    pub fn validate(&self) -> Result<(), TransformError> {
        match *self {
            ValueTransform::Scale { factor } if !factor.is_finite() => {
                Err(TransformError::NonFinite)
            }
            ValueTransform::Offset { amount } if !amount.is_finite() => {
                Err(TransformError::NonFinite)
            }
            ValueTransform::Linear { factor, offset }
                if !factor.is_finite() || !offset.is_finite() =>
            {
                Err(TransformError::NonFinite)
            }
            ValueTransform::UnitConvert { from, to } if from.dimension() != to.dimension() => {
                Err(TransformError::IncompatibleUnits { from, to })
            }
            _ => Ok(()),
        }
    }

    fn apply_f64(&self, v: f64) -> f64 {
        match *self {
            ValueTransform::Scale { factor } => v * factor,
            ValueTransform::Offset { amount } => v + amount,
            ValueTransform::Linear { factor, offset } => v * factor + offset,
            ValueTransform::UnitConvert { from, to } => to.from_si(from.to_si(v)),
        }
    }

    /// Apply the transform to a value. Non-numeric values, and results that
    /// cannot be represented as JSON numbers, are returned unchanged.
    pub fn apply(&self, value: Value) -> Value {
        let Some(v) = value.as_f64() else {
            return value;
        };
        serde_json::Number::from_f64(self.apply_f64(v))
            .map(Value::Number)
            .unwrap_or(value)
    }
}
