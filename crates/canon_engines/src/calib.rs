#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use canon_kernel_contracts::calib::{
    CalibrationConfig, IntrinsicScores, LayerRequirements, MethodCalibration, MethodId,
    RuntimeLayers, SkipDecision,
};
use canon_kernel_contracts::{ContractViolation, UnitScore, Validate};

pub mod reason_codes {
    use canon_kernel_contracts::ReasonCodeId;

    // Calibration reason-code namespace.
    pub const CALIB_OK_EXECUTE: ReasonCodeId = ReasonCodeId(0x4341_0001);
    pub const CALIB_SKIPPED_BELOW_THRESHOLD: ReasonCodeId = ReasonCodeId(0x4341_0002);
    pub const CALIB_EXCLUDED: ReasonCodeId = ReasonCodeId(0x4341_0003);

    pub const CALIB_FAILED_COMPUTATION: ReasonCodeId = ReasonCodeId(0x4341_00F1);
    pub const CALIB_MISSING_RECORD: ReasonCodeId = ReasonCodeId(0x4341_00F2);
}

/// One method's intrinsic-calibration entry after loading. `Partial`
/// exists so the offline coverage check can name the missing axes; at
/// runtime it calibrates as a failure, never as a passing default.
#[derive(Debug, Clone, PartialEq)]
pub enum IntrinsicRecord {
    Calibrated(IntrinsicScores),
    Excluded { reason: String },
    Partial { missing_axes: Vec<String> },
}

/// Parsed primary intrinsic-calibration file.
#[derive(Debug, Clone, PartialEq)]
pub struct IntrinsicCalibrationFile {
    pub schema_version: String,
    pub methods: BTreeMap<MethodId, IntrinsicRecord>,
}

#[derive(Debug, Deserialize)]
struct RawIntrinsicEntry {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    b_theory: Option<f64>,
    #[serde(default)]
    b_impl: Option<f64>,
    #[serde(default)]
    b_deploy: Option<f64>,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawIntrinsicFile {
    schema_version: String,
    methods: BTreeMap<String, RawIntrinsicEntry>,
}

fn axis(value: Option<f64>) -> Result<Option<UnitScore>, ContractViolation> {
    value.map(UnitScore::new).transpose()
}

impl IntrinsicCalibrationFile {
    pub fn from_json_str(raw: &str) -> Result<Self, ContractViolation> {
        let parsed: RawIntrinsicFile =
            serde_json::from_str(raw).map_err(|_| ContractViolation::InvalidValue {
                field: "intrinsic_calibration_file",
                reason: "must be valid JSON with schema_version and methods",
            })?;
        if parsed.schema_version.trim().is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "intrinsic_calibration_file.schema_version",
                reason: "must not be empty",
            });
        }
        let mut methods = BTreeMap::new();
        for (name, entry) in parsed.methods {
            let method_id = MethodId::new(name)?;
            let record = match entry.status.as_deref() {
                Some("excluded") => {
                    let reason = entry.reason.unwrap_or_default();
                    if reason.trim().is_empty() {
                        return Err(ContractViolation::InvalidValue {
                            field: "intrinsic_calibration_file.reason",
                            reason: "excluded methods must carry a reason",
                        });
                    }
                    IntrinsicRecord::Excluded { reason }
                }
                Some("calibrated") | None => {
                    let theory = axis(entry.b_theory)?;
                    let implementation = axis(entry.b_impl)?;
                    let deployment = axis(entry.b_deploy)?;
                    match (theory, implementation, deployment) {
                        (Some(t), Some(i), Some(d)) => {
                            IntrinsicRecord::Calibrated(IntrinsicScores::v1(t, i, d))
                        }
                        (t, i, d) => {
                            let mut missing_axes = Vec::new();
                            if t.is_none() {
                                missing_axes.push("b_theory".to_string());
                            }
                            if i.is_none() {
                                missing_axes.push("b_impl".to_string());
                            }
                            if d.is_none() {
                                missing_axes.push("b_deploy".to_string());
                            }
                            IntrinsicRecord::Partial { missing_axes }
                        }
                    }
                }
                Some(_) => {
                    return Err(ContractViolation::InvalidValue {
                        field: "intrinsic_calibration_file.status",
                        reason: "must be calibrated or excluded",
                    })
                }
            };
            methods.insert(method_id, record);
        }
        Ok(Self {
            schema_version: parsed.schema_version,
            methods,
        })
    }

    pub fn load(path: &Path) -> Result<Self, ContractViolation> {
        let raw = fs::read_to_string(path).map_err(|_| ContractViolation::InvalidValue {
            field: "intrinsic_calibration_file.path",
            reason: "must be a readable file",
        })?;
        Self::from_json_str(&raw)
    }
}

/// Parsed primary method-parameters file.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodParamsFile {
    pub schema_version: String,
    pub calibration: CalibrationConfig,
    pub methods: BTreeMap<MethodId, LayerRequirements>,
}

#[derive(Debug, Deserialize)]
struct RawMethodParamsFile {
    schema_version: String,
    #[serde(default)]
    calibration: Option<CalibrationConfig>,
    methods: BTreeMap<String, LayerRequirements>,
}

impl MethodParamsFile {
    pub fn from_json_str(raw: &str) -> Result<Self, ContractViolation> {
        let parsed: RawMethodParamsFile =
            serde_json::from_str(raw).map_err(|_| ContractViolation::InvalidValue {
                field: "method_params_file",
                reason: "must be valid JSON with schema_version and methods",
            })?;
        if parsed.schema_version.trim().is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "method_params_file.schema_version",
                reason: "must not be empty",
            });
        }
        if parsed.methods.is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "method_params_file.methods",
                reason: "must not be empty",
            });
        }
        let calibration = parsed.calibration.unwrap_or_else(CalibrationConfig::mvp_v1);
        calibration.validate()?;
        let mut methods = BTreeMap::new();
        for (name, requirements) in parsed.methods {
            let method_id = MethodId::new(name)?;
            // Deserialization bypasses v1 construction, so re-validate.
            requirements.validate()?;
            methods.insert(method_id, requirements);
        }
        Ok(Self {
            schema_version: parsed.schema_version,
            calibration,
            methods,
        })
    }

    pub fn load(path: &Path) -> Result<Self, ContractViolation> {
        let raw = fs::read_to_string(path).map_err(|_| ContractViolation::InvalidValue {
            field: "method_params_file.path",
            reason: "must be a readable file",
        })?;
        Self::from_json_str(&raw)
    }
}

fn aggregate(
    requirements: &LayerRequirements,
    layers: &RuntimeLayers,
) -> Result<f64, &'static str> {
    let total = match requirements.aggregation {
        canon_kernel_contracts::calib::AggregationMethod::WeightedSum => requirements
            .required_layers
            .iter()
            .map(|key| {
                requirements.weights.get(key).copied().unwrap_or(0.0) * layers.value(*key)
            })
            .sum(),
        canon_kernel_contracts::calib::AggregationMethod::ChoquetIntegral => {
            let mut sum: f64 = requirements
                .required_layers
                .iter()
                .map(|key| requirements.mobius_coefficient(*key) * layers.value(*key))
                .sum();
            for interaction in &requirements.interactions {
                let xa = layers.value(interaction.a);
                let xb = layers.value(interaction.b);
                if interaction.value >= 0.0 {
                    // Synergy rewards the pair only as far as both layers go.
                    sum += interaction.value * xa.min(xb);
                } else {
                    // Redundancy credits the stronger layer once.
                    sum += (-interaction.value) * xa.max(xb);
                }
            }
            sum
        }
    };
    if !total.is_finite() {
        return Err("aggregated layer score is not finite");
    }
    Ok(total)
}

/// The calibration engine: combines a method's intrinsic average with its
/// aggregated runtime-layer score and decides skip/execute.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationRuntime {
    config: CalibrationConfig,
    intrinsic: IntrinsicCalibrationFile,
    params: MethodParamsFile,
}

impl CalibrationRuntime {
    pub fn new(
        intrinsic: IntrinsicCalibrationFile,
        params: MethodParamsFile,
    ) -> Result<Self, ContractViolation> {
        let config = params.calibration;
        config.validate()?;
        for requirements in params.methods.values() {
            requirements.validate()?;
        }
        Ok(Self {
            config,
            intrinsic,
            params,
        })
    }

    pub fn config(&self) -> CalibrationConfig {
        self.config
    }

    /// Catalog of methods the plan must decide on, in stable order.
    pub fn method_ids(&self) -> impl Iterator<Item = &MethodId> {
        self.params.methods.keys()
    }

    pub fn intrinsic_record(&self, method_id: &MethodId) -> Option<&IntrinsicRecord> {
        self.intrinsic.methods.get(method_id)
    }

    pub fn requirements(&self, method_id: &MethodId) -> Option<&LayerRequirements> {
        self.params.methods.get(method_id)
    }

    /// Calibrates one method against one task's evidence layers. Errors
    /// never escape: every failure is recorded as `Failed`, which the
    /// planner treats as skipped.
    pub fn calibrate(&self, method_id: &MethodId, layers: &RuntimeLayers) -> MethodCalibration {
        if let Err(violation) = layers.validate() {
            return MethodCalibration::Failed {
                reason: violation.to_string(),
            };
        }
        let requirements = match self.params.methods.get(method_id) {
            Some(requirements) => requirements,
            None => {
                return MethodCalibration::Failed {
                    reason: "no method parameters entry".to_string(),
                }
            }
        };
        let intrinsic = match self.intrinsic.methods.get(method_id) {
            Some(IntrinsicRecord::Calibrated(scores)) => *scores,
            Some(IntrinsicRecord::Excluded { reason }) => {
                return MethodCalibration::Excluded {
                    reason: reason.clone(),
                }
            }
            Some(IntrinsicRecord::Partial { missing_axes }) => {
                return MethodCalibration::Failed {
                    reason: format!(
                        "intrinsic axes incomplete: [{}]",
                        missing_axes.join(", ")
                    ),
                }
            }
            None => {
                return MethodCalibration::Failed {
                    reason: "no intrinsic calibration entry".to_string(),
                }
            }
        };
        let aggregated = match aggregate(requirements, layers) {
            Ok(aggregated) => aggregated,
            Err(reason) => {
                return MethodCalibration::Failed {
                    reason: reason.to_string(),
                }
            }
        };
        let weight = self.config.intrinsic_weight;
        let combined = weight * intrinsic.average() + (1.0 - weight) * aggregated;
        let score = match UnitScore::new(combined) {
            Ok(score) => score,
            Err(violation) => {
                return MethodCalibration::Failed {
                    reason: violation.to_string(),
                }
            }
        };
        let decision = if score.value() < self.config.skip_threshold {
            SkipDecision::Skip {
                threshold: self.config.skip_threshold,
            }
        } else {
            SkipDecision::Execute
        };
        MethodCalibration::Calibrated { score, decision }
    }
}
