#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use canon_kernel_contracts::phase::{CanonPolicyPackage, PhaseId};
use canon_kernel_contracts::question::Question;
use canon_kernel_contracts::{ContractViolation, PlanError, Validate};

use crate::adapter::MicroResolutionInput;
use crate::phase::{PhaseContract, PhaseFailure};

/// Phase 2 output: the concrete micro-question set, ordered by global
/// ordinal.
#[derive(Debug, Clone, PartialEq)]
pub struct MicroQuestionSet {
    pub package: CanonPolicyPackage,
    pub questions: Vec<Question>,
}

/// Phase 2: resolves the questionnaire into per-coordinate micro
/// questions. Every question must land on a coordinate the manifest
/// declares, and every (area, dimension) cell must end up with exactly
/// `questions_per_cell` questions.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ph2MicroResolve;

impl PhaseContract for Ph2MicroResolve {
    type Input = MicroResolutionInput;
    type Output = MicroQuestionSet;

    fn phase_id(&self) -> PhaseId {
        PhaseId::MicroResolve
    }

    fn phase_name(&self) -> &'static str {
        "phase2_micro_question_resolve"
    }

    fn validate_input(&self, input: &MicroResolutionInput) -> Result<(), ContractViolation> {
        input.package.validate()?;
        input.catalog.validate()
    }

    fn execute(&self, input: MicroResolutionInput) -> Result<MicroQuestionSet, PhaseFailure> {
        let manifest = &input.package.manifest;
        for question in &input.catalog.questions {
            if !manifest.contains_policy_area(&question.policy_area_id)
                || !manifest.contains_dimension(&question.dimension_id)
            {
                return Err(PhaseFailure::Plan(PlanError::MissingCoordinate {
                    policy_area_id: question.policy_area_id.clone(),
                    dimension_id: question.dimension_id.clone(),
                    question_id: Some(question.question_id.clone()),
                }));
            }
        }
        let mut questions = input.catalog.questions;
        questions.sort_by_key(|q| q.question_global);
        Ok(MicroQuestionSet {
            package: input.package,
            questions,
        })
    }

    fn validate_output(&self, output: &MicroQuestionSet) -> Result<(), ContractViolation> {
        output.package.validate()?;
        let manifest = &output.package.manifest;
        if output.questions.len() != manifest.expected_question_count() {
            return Err(ContractViolation::InvalidValue {
                field: "micro_question_set.questions",
                reason: "count must equal cells x questions_per_cell",
            });
        }
        let mut per_cell: BTreeMap<(_, _), usize> = BTreeMap::new();
        for question in &output.questions {
            question.validate()?;
            *per_cell
                .entry((
                    question.policy_area_id.clone(),
                    question.dimension_id.clone(),
                ))
                .or_default() += 1;
        }
        for count in per_cell.values() {
            if *count != usize::from(manifest.questions_per_cell) {
                return Err(ContractViolation::InvalidValue {
                    field: "micro_question_set.questions",
                    reason: "every cell must carry exactly questions_per_cell questions",
                });
            }
        }
        for window in output.questions.windows(2) {
            if window[0].question_global >= window[1].question_global {
                return Err(ContractViolation::InvalidValue {
                    field: "micro_question_set.questions",
                    reason: "must be strictly ordered by question_global",
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ph0gate::ValidatedInput;
    use crate::ph1canon::{Ph1CanonIngest, Ph1Input};
    use canon_kernel_contracts::chunk::{
        ChunkDraft, ChunkId, ChunkResolution, ExpectedElements, TextSpan,
    };
    use canon_kernel_contracts::common::UnitScore;
    use canon_kernel_contracts::phase::{
        CanonInputRecord, DocumentId, IngestDraft, PolicyManifest, QualityMetrics,
    };
    use canon_kernel_contracts::question::{
        DimensionId, PolicyAreaId, QuestionCatalog, QuestionGlobal, QuestionId,
    };
    use std::collections::{BTreeMap, BTreeSet};

    fn package(areas: u8, dimensions: u8, per_cell: u8) -> CanonPolicyPackage {
        let manifest = PolicyManifest::v1(
            (1..=areas)
                .map(|i| PolicyAreaId::new(format!("PA{i:02}")).unwrap())
                .collect(),
            (1..=dimensions)
                .map(|i| DimensionId::new(format!("D{i}")).unwrap())
                .collect(),
            per_cell,
        )
        .unwrap();
        let mut drafts = Vec::new();
        for a in 1..=areas {
            for d in 1..=dimensions {
                drafts.push(ChunkDraft {
                    chunk_id: ChunkId::new(format!("c_{a:02}_{d}")).unwrap(),
                    text: format!("Provisions for area {a}, dimension {d}."),
                    text_span: TextSpan::new(0, 40).unwrap(),
                    resolution: ChunkResolution::Micro,
                    policy_area_id: Some(PolicyAreaId::new(format!("PA{a:02}")).unwrap()),
                    dimension_id: Some(DimensionId::new(format!("D{d}")).unwrap()),
                    expected_elements: ExpectedElements::default(),
                });
            }
        }
        let record = CanonInputRecord::v1(
            DocumentId::new("doc").unwrap(),
            canon_kernel_contracts::chunk::ContentHash::new("ab".repeat(32)).unwrap(),
            10,
            "questionnaire/canonical.json",
            canon_kernel_contracts::chunk::ContentHash::new("cd".repeat(32)).unwrap(),
            true,
            vec![],
            vec![],
        )
        .unwrap();
        Ph1CanonIngest
            .execute(Ph1Input {
                validated: ValidatedInput { record },
                draft: IngestDraft::v1(
                    drafts,
                    manifest,
                    QualityMetrics {
                        provenance_completeness: UnitScore::new(0.9).unwrap(),
                        structural_consistency: UnitScore::new(0.9).unwrap(),
                    },
                    BTreeMap::new(),
                )
                .unwrap(),
            })
            .unwrap()
    }

    fn catalog(areas: u8, dimensions: u8, per_cell: u8) -> QuestionCatalog {
        let mut questions = Vec::new();
        let mut global = 0u16;
        for a in 1..=areas {
            for d in 1..=dimensions {
                for i in 0..per_cell {
                    global += 1;
                    questions.push(
                        Question::v1(
                            QuestionId::new(format!("q_{a:02}_{d}_{i}")).unwrap(),
                            QuestionGlobal::new(global).unwrap(),
                            PolicyAreaId::new(format!("PA{a:02}")).unwrap(),
                            DimensionId::new(format!("D{d}")).unwrap(),
                            BTreeSet::new(),
                            vec![],
                            ExpectedElements::default(),
                        )
                        .unwrap(),
                    );
                }
            }
        }
        QuestionCatalog::v1(questions).unwrap()
    }

    #[test]
    fn at_micro_01_full_catalog_resolves_in_global_order() {
        let phase = Ph2MicroResolve;
        let out = phase
            .execute(MicroResolutionInput {
                package: package(2, 3, 2),
                catalog: catalog(2, 3, 2),
            })
            .unwrap();
        assert_eq!(out.questions.len(), 12);
        assert!(phase.validate_output(&out).is_ok());
        assert_eq!(out.questions[0].question_global.value(), 1);
        assert_eq!(out.questions[11].question_global.value(), 12);
    }

    #[test]
    fn at_micro_02_out_of_universe_question_fails_with_its_id() {
        let phase = Ph2MicroResolve;
        let mut wide = catalog(2, 2, 1);
        wide.questions.push(
            Question::v1(
                QuestionId::new("q_rogue").unwrap(),
                QuestionGlobal::new(99).unwrap(),
                PolicyAreaId::new("PA09").unwrap(),
                DimensionId::new("D1").unwrap(),
                BTreeSet::new(),
                vec![],
                ExpectedElements::default(),
            )
            .unwrap(),
        );
        let err = phase
            .execute(MicroResolutionInput {
                package: package(2, 2, 1),
                catalog: wide,
            })
            .unwrap_err();
        match err {
            PhaseFailure::Plan(PlanError::MissingCoordinate { question_id, .. }) => {
                assert_eq!(question_id.unwrap().as_str(), "q_rogue");
            }
            other => panic!("expected MissingCoordinate, got {other:?}"),
        }
    }

    #[test]
    fn at_micro_03_undersized_catalog_fails_output_validation() {
        let phase = Ph2MicroResolve;
        let mut small = catalog(2, 2, 1);
        small.questions.pop();
        let out = phase
            .execute(MicroResolutionInput {
                package: package(2, 2, 1),
                catalog: small,
            })
            .unwrap();
        assert!(phase.validate_output(&out).is_err());
    }
}
