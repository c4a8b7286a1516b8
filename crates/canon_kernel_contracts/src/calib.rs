#![forbid(unsafe_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::common::{
    validate_id_str, validate_unit_f64, ContractViolation, SchemaVersion, UnitScore, Validate,
};

pub const CALIB_CONTRACT_VERSION: SchemaVersion = SchemaVersion(1);

#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct MethodId(String);

impl MethodId {
    pub fn new(id: impl Into<String>) -> Result<Self, ContractViolation> {
        let id = id.into();
        validate_id_str("method_id", &id, 64)?;
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Validate for MethodId {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_id_str("method_id", &self.0, 64)
    }
}

impl fmt::Display for MethodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for MethodId {
    type Error = ContractViolation;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<MethodId> for String {
    fn from(id: MethodId) -> String {
        id.0
    }
}

/// The three intrinsic quality axes of a method.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntrinsicScores {
    pub theory: UnitScore,
    pub implementation: UnitScore,
    pub deployment: UnitScore,
}

impl IntrinsicScores {
    pub fn v1(
        theory: UnitScore,
        implementation: UnitScore,
        deployment: UnitScore,
    ) -> Self {
        Self {
            theory,
            implementation,
            deployment,
        }
    }

    pub fn average(&self) -> f64 {
        (self.theory.value() + self.implementation.value() + self.deployment.value()) / 3.0
    }
}

impl Validate for IntrinsicScores {
    fn validate(&self) -> Result<(), ContractViolation> {
        self.theory.validate()?;
        self.implementation.validate()?;
        self.deployment.validate()
    }
}

/// The seven runtime evidence-quality axes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum LayerKey {
    Provenance,
    Coverage,
    Recency,
    Consistency,
    Corroboration,
    Granularity,
    Reliability,
}

impl LayerKey {
    pub const ALL: [LayerKey; 7] = [
        LayerKey::Provenance,
        LayerKey::Coverage,
        LayerKey::Recency,
        LayerKey::Consistency,
        LayerKey::Corroboration,
        LayerKey::Granularity,
        LayerKey::Reliability,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            LayerKey::Provenance => "provenance",
            LayerKey::Coverage => "coverage",
            LayerKey::Recency => "recency",
            LayerKey::Consistency => "consistency",
            LayerKey::Corroboration => "corroboration",
            LayerKey::Granularity => "granularity",
            LayerKey::Reliability => "reliability",
        }
    }
}

/// Runtime evidence-layer values, all defaulting to zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeLayers {
    pub provenance: f64,
    pub coverage: f64,
    pub recency: f64,
    pub consistency: f64,
    pub corroboration: f64,
    pub granularity: f64,
    pub reliability: f64,
}

impl Default for RuntimeLayers {
    fn default() -> Self {
        Self {
            provenance: 0.0,
            coverage: 0.0,
            recency: 0.0,
            consistency: 0.0,
            corroboration: 0.0,
            granularity: 0.0,
            reliability: 0.0,
        }
    }
}

impl RuntimeLayers {
    pub fn value(&self, key: LayerKey) -> f64 {
        match key {
            LayerKey::Provenance => self.provenance,
            LayerKey::Coverage => self.coverage,
            LayerKey::Recency => self.recency,
            LayerKey::Consistency => self.consistency,
            LayerKey::Corroboration => self.corroboration,
            LayerKey::Granularity => self.granularity,
            LayerKey::Reliability => self.reliability,
        }
    }
}

impl Validate for RuntimeLayers {
    fn validate(&self) -> Result<(), ContractViolation> {
        for key in LayerKey::ALL {
            validate_unit_f64("runtime_layers.value", self.value(key))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationMethod {
    WeightedSum,
    ChoquetIntegral,
}

impl AggregationMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            AggregationMethod::WeightedSum => "weighted_sum",
            AggregationMethod::ChoquetIntegral => "choquet_integral",
        }
    }
}

/// Pairwise synergy (positive) or redundancy (negative) correction between
/// two evidence layers, used only by the Choquet path.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InteractionWeight {
    pub a: LayerKey,
    pub b: LayerKey,
    pub value: f64,
}

impl Validate for InteractionWeight {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.a == self.b {
            return Err(ContractViolation::InvalidValue {
                field: "interaction_weight",
                reason: "layers must be distinct",
            });
        }
        if !self.value.is_finite() {
            return Err(ContractViolation::NotFinite {
                field: "interaction_weight.value",
            });
        }
        if !(-1.0..=1.0).contains(&self.value) {
            return Err(ContractViolation::InvalidRange {
                field: "interaction_weight.value",
                min: -1.0,
                max: 1.0,
                got: self.value,
            });
        }
        Ok(())
    }
}

const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Which layers a method requires, their weights, and how they aggregate.
/// Construction rejects: an empty required list, a required layer without a
/// weight, weights for layers outside the required list, weights that do
/// not sum to one, and Choquet configurations whose interaction terms break
/// monotonicity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerRequirements {
    pub required_layers: Vec<LayerKey>,
    pub weights: BTreeMap<LayerKey, f64>,
    pub aggregation: AggregationMethod,
    #[serde(default)]
    pub interactions: Vec<InteractionWeight>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub max_retries: Option<u8>,
}

impl LayerRequirements {
    pub fn v1(
        required_layers: Vec<LayerKey>,
        weights: BTreeMap<LayerKey, f64>,
        aggregation: AggregationMethod,
        interactions: Vec<InteractionWeight>,
    ) -> Result<Self, ContractViolation> {
        let r = Self {
            required_layers,
            weights,
            aggregation,
            interactions,
            timeout_ms: None,
            max_retries: None,
        };
        r.validate()?;
        Ok(r)
    }

    /// Möbius coefficient of a single layer under the 2-additive model:
    /// its weight minus half the absolute interaction mass it carries.
    pub fn mobius_coefficient(&self, key: LayerKey) -> f64 {
        let weight = self.weights.get(&key).copied().unwrap_or(0.0);
        let interaction_mass: f64 = self
            .interactions
            .iter()
            .filter(|i| i.a == key || i.b == key)
            .map(|i| i.value.abs())
            .sum();
        weight - 0.5 * interaction_mass
    }
}

impl Validate for LayerRequirements {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.required_layers.is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "layer_requirements.required_layers",
                reason: "must not be empty",
            });
        }
        let required: BTreeSet<LayerKey> = self.required_layers.iter().copied().collect();
        if required.len() != self.required_layers.len() {
            return Err(ContractViolation::InvalidValue {
                field: "layer_requirements.required_layers",
                reason: "must not repeat a layer",
            });
        }
        for key in &required {
            if !self.weights.contains_key(key) {
                return Err(ContractViolation::InvalidValue {
                    field: "layer_requirements.weights",
                    reason: "every required layer must have a weight entry",
                });
            }
        }
        for (key, weight) in &self.weights {
            if !required.contains(key) {
                return Err(ContractViolation::InvalidValue {
                    field: "layer_requirements.weights",
                    reason: "weight entries must reference required layers",
                });
            }
            validate_unit_f64("layer_requirements.weight", *weight)?;
        }
        let sum: f64 = self.weights.values().sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(ContractViolation::InvalidValue {
                field: "layer_requirements.weights",
                reason: "weights must sum to 1.0",
            });
        }
        match self.aggregation {
            AggregationMethod::WeightedSum => {
                if !self.interactions.is_empty() {
                    return Err(ContractViolation::InvalidValue {
                        field: "layer_requirements.interactions",
                        reason: "weighted_sum does not take interaction terms",
                    });
                }
            }
            AggregationMethod::ChoquetIntegral => {
                let mut seen_pairs = BTreeSet::new();
                for interaction in &self.interactions {
                    interaction.validate()?;
                    if !required.contains(&interaction.a) || !required.contains(&interaction.b) {
                        return Err(ContractViolation::InvalidValue {
                            field: "layer_requirements.interactions",
                            reason: "interaction layers must be required layers",
                        });
                    }
                    let pair = if interaction.a < interaction.b {
                        (interaction.a, interaction.b)
                    } else {
                        (interaction.b, interaction.a)
                    };
                    if !seen_pairs.insert(pair) {
                        return Err(ContractViolation::InvalidValue {
                            field: "layer_requirements.interactions",
                            reason: "must not repeat a layer pair",
                        });
                    }
                }
                for key in &required {
                    if self.mobius_coefficient(*key) < 0.0 {
                        return Err(ContractViolation::InvalidValue {
                            field: "layer_requirements.interactions",
                            reason: "interaction mass breaks monotonicity for a layer",
                        });
                    }
                }
            }
        }
        if let Some(timeout_ms) = self.timeout_ms {
            if timeout_ms == 0 {
                return Err(ContractViolation::InvalidValue {
                    field: "layer_requirements.timeout_ms",
                    reason: "must be > 0 when provided",
                });
            }
        }
        Ok(())
    }
}

/// Whether a calibrated method runs or is gated out.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum SkipDecision {
    Execute,
    Skip { threshold: f64 },
}

/// Per-method calibration state. `Failed` is recorded, never silently
/// promoted to a passing score; `Excluded` is exempt from coverage checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum MethodCalibration {
    Uncalibrated,
    Calibrated {
        score: UnitScore,
        decision: SkipDecision,
    },
    Excluded {
        reason: String,
    },
    Failed {
        reason: String,
    },
}

impl MethodCalibration {
    pub fn executes(&self) -> bool {
        matches!(
            self,
            MethodCalibration::Calibrated {
                decision: SkipDecision::Execute,
                ..
            }
        )
    }
}

impl Validate for MethodCalibration {
    fn validate(&self) -> Result<(), ContractViolation> {
        match self {
            MethodCalibration::Uncalibrated => Ok(()),
            MethodCalibration::Calibrated { score, decision } => {
                score.validate()?;
                if let SkipDecision::Skip { threshold } = decision {
                    validate_unit_f64("method_calibration.threshold", *threshold)?;
                }
                Ok(())
            }
            MethodCalibration::Excluded { reason } | MethodCalibration::Failed { reason } => {
                if reason.trim().is_empty() {
                    return Err(ContractViolation::InvalidValue {
                        field: "method_calibration.reason",
                        reason: "must not be empty",
                    });
                }
                Ok(())
            }
        }
    }
}

/// Calibration knobs exposed as explicit configuration rather than
/// hardcoded constants.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationConfig {
    pub intrinsic_weight: f64,
    pub skip_threshold: f64,
}

impl CalibrationConfig {
    pub fn mvp_v1() -> Self {
        Self {
            intrinsic_weight: 0.5,
            skip_threshold: 0.3,
        }
    }
}

impl Validate for CalibrationConfig {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_unit_f64("calibration_config.intrinsic_weight", self.intrinsic_weight)?;
        validate_unit_f64("calibration_config.skip_threshold", self.skip_threshold)
    }
}
