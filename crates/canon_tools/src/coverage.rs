#![forbid(unsafe_code)]

use canon_engines::calib::{IntrinsicCalibrationFile, IntrinsicRecord};
use canon_kernel_contracts::calib::MethodId;
use canon_kernel_contracts::PlanError;

/// Outcome of the offline coverage check.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CoverageReport {
    pub calibrated: Vec<MethodId>,
    pub excluded: Vec<(MethodId, String)>,
}

const ALL_AXES: [&str; 3] = ["b_theory", "b_impl", "b_deploy"];

/// Every method in the canonical catalog must be fully calibrated (all
/// three intrinsic axes) or explicitly excluded with a reason. Partial
/// coverage is a hard validation failure, not a warning.
pub fn validate_coverage(
    catalog: &[MethodId],
    intrinsic: &IntrinsicCalibrationFile,
) -> Result<CoverageReport, PlanError> {
    let mut report = CoverageReport::default();
    for method_id in catalog {
        match intrinsic.methods.get(method_id) {
            Some(IntrinsicRecord::Calibrated(_)) => {
                report.calibrated.push(method_id.clone());
            }
            Some(IntrinsicRecord::Excluded { reason }) => {
                report.excluded.push((method_id.clone(), reason.clone()));
            }
            Some(IntrinsicRecord::Partial { missing_axes }) => {
                return Err(PlanError::CoverageGap {
                    method_id: method_id.clone(),
                    missing_axes: missing_axes.clone(),
                });
            }
            None => {
                return Err(PlanError::CoverageGap {
                    method_id: method_id.clone(),
                    missing_axes: ALL_AXES.iter().map(|a| a.to_string()).collect(),
                });
            }
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intrinsic() -> IntrinsicCalibrationFile {
        IntrinsicCalibrationFile::from_json_str(
            r#"{
                "schema_version": "1.0.0",
                "methods": {
                    "M_TYPE_A": { "b_theory": 0.9, "b_impl": 0.8, "b_deploy": 0.7 },
                    "M_LEGACY": { "status": "excluded", "reason": "superseded" },
                    "M_PARTIAL": { "b_theory": 0.5, "b_impl": 0.5 }
                }
            }"#,
        )
        .unwrap()
    }

    fn method(id: &str) -> MethodId {
        MethodId::new(id).unwrap()
    }

    #[test]
    fn at_coverage_01_calibrated_and_excluded_both_count() {
        let report = validate_coverage(
            &[method("M_TYPE_A"), method("M_LEGACY")],
            &intrinsic(),
        )
        .unwrap();
        assert_eq!(report.calibrated.len(), 1);
        assert_eq!(report.excluded.len(), 1);
    }

    #[test]
    fn at_coverage_02_partial_record_is_a_hard_gap() {
        let err = validate_coverage(&[method("M_PARTIAL")], &intrinsic()).unwrap_err();
        match err {
            PlanError::CoverageGap { missing_axes, .. } => {
                assert_eq!(missing_axes, vec!["b_deploy".to_string()]);
            }
            other => panic!("expected CoverageGap, got {other:?}"),
        }
    }

    #[test]
    fn at_coverage_03_absent_record_is_a_hard_gap() {
        let err = validate_coverage(&[method("M_NEW")], &intrinsic()).unwrap_err();
        match err {
            PlanError::CoverageGap { missing_axes, .. } => {
                assert_eq!(missing_axes.len(), 3);
            }
            other => panic!("expected CoverageGap, got {other:?}"),
        }
    }
}
