#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SchemaVersion(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MonotonicTimeNs(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ReasonCodeId(pub u32);

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ContractViolation {
    #[error("{field}: {reason}")]
    InvalidValue {
        field: &'static str,
        reason: &'static str,
    },
    #[error("{field}: must be within [{min}, {max}], got {got}")]
    InvalidRange {
        field: &'static str,
        min: f64,
        max: f64,
        got: f64,
    },
    #[error("{field}: must be finite")]
    NotFinite { field: &'static str },
    #[error("{field}: duplicate key {key}")]
    DuplicateValue { field: &'static str, key: String },
}

pub trait Validate {
    fn validate(&self) -> Result<(), ContractViolation>;
}

pub(crate) fn validate_id_str(
    field: &'static str,
    value: &str,
    max_len: usize,
) -> Result<(), ContractViolation> {
    if value.trim().is_empty() {
        return Err(ContractViolation::InvalidValue {
            field,
            reason: "must not be empty",
        });
    }
    if value.len() > max_len {
        return Err(ContractViolation::InvalidValue {
            field,
            reason: "exceeds max length",
        });
    }
    if value.chars().any(|c| c.is_control()) {
        return Err(ContractViolation::InvalidValue {
            field,
            reason: "must not contain control characters",
        });
    }
    Ok(())
}

pub(crate) fn validate_unit_f64(
    field: &'static str,
    value: f64,
) -> Result<(), ContractViolation> {
    if !value.is_finite() {
        return Err(ContractViolation::NotFinite { field });
    }
    if !(0.0..=1.0).contains(&value) {
        return Err(ContractViolation::InvalidRange {
            field,
            min: 0.0,
            max: 1.0,
            got: value,
        });
    }
    Ok(())
}

/// Score constrained to the unit interval. Construction rejects non-finite
/// and out-of-range values.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct UnitScore(f64);

impl UnitScore {
    pub fn new(value: f64) -> Result<Self, ContractViolation> {
        validate_unit_f64("unit_score", value)?;
        Ok(Self(value))
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl Validate for UnitScore {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_unit_f64("unit_score", self.0)
    }
}

impl TryFrom<f64> for UnitScore {
    type Error = ContractViolation;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<UnitScore> for f64 {
    fn from(score: UnitScore) -> f64 {
        score.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn at_common_01_unit_score_accepts_bounds() {
        assert!(UnitScore::new(0.0).is_ok());
        assert!(UnitScore::new(1.0).is_ok());
        assert!(UnitScore::new(0.42).is_ok());
    }

    #[test]
    fn at_common_02_unit_score_rejects_out_of_range_and_non_finite() {
        assert!(matches!(
            UnitScore::new(1.2),
            Err(ContractViolation::InvalidRange { .. })
        ));
        assert!(matches!(
            UnitScore::new(-0.1),
            Err(ContractViolation::InvalidRange { .. })
        ));
        assert!(matches!(
            UnitScore::new(f64::NAN),
            Err(ContractViolation::NotFinite { .. })
        ));
    }

    #[test]
    fn at_common_03_id_validation_rejects_control_and_empty() {
        assert!(validate_id_str("f", "ok_id", 64).is_ok());
        assert!(validate_id_str("f", "", 64).is_err());
        assert!(validate_id_str("f", "   ", 64).is_err());
        assert!(validate_id_str("f", "bad\nid", 64).is_err());
    }
}
