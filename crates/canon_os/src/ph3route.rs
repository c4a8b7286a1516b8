#![forbid(unsafe_code)]

use canon_engines::route::{match_chunk, ChunkMatrix};
use canon_kernel_contracts::chunk::ChunkId;
use canon_kernel_contracts::phase::{CanonPolicyPackage, PhaseId};
use canon_kernel_contracts::question::Question;
use canon_kernel_contracts::{ContractViolation, Validate};

use crate::ph2micro::MicroQuestionSet;
use crate::phase::{PhaseContract, PhaseFailure};

#[derive(Debug, Clone, PartialEq)]
pub struct RoutedPair {
    pub question: Question,
    pub chunk_id: ChunkId,
}

/// Phase 3 output: every micro question matched to its chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutedSet {
    pub package: CanonPolicyPackage,
    pub pairs: Vec<RoutedPair>,
}

/// Phase 3: builds the coordinate matrix and routes every question. An
/// unroutable question means the catalog/matrix pairing is corrupt, so
/// the phase fails naming that question rather than emitting a partial
/// routing.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ph3ChunkRoute;

impl PhaseContract for Ph3ChunkRoute {
    type Input = MicroQuestionSet;
    type Output = RoutedSet;

    fn phase_id(&self) -> PhaseId {
        PhaseId::ChunkRoute
    }

    fn phase_name(&self) -> &'static str {
        "phase3_chunk_route"
    }

    fn validate_input(&self, input: &MicroQuestionSet) -> Result<(), ContractViolation> {
        input.package.validate()?;
        if input.questions.is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "micro_question_set.questions",
                reason: "must not be empty",
            });
        }
        Ok(())
    }

    fn execute(&self, input: MicroQuestionSet) -> Result<RoutedSet, PhaseFailure> {
        let matrix = ChunkMatrix::from_graph(&input.package.graph)?;
        let mut pairs = Vec::with_capacity(input.questions.len());
        for question in input.questions {
            let chunk_id = match_chunk(&question, &matrix)?;
            pairs.push(RoutedPair { question, chunk_id });
        }
        Ok(RoutedSet {
            package: input.package,
            pairs,
        })
    }

    fn validate_output(&self, output: &RoutedSet) -> Result<(), ContractViolation> {
        output.package.validate()?;
        if output.pairs.is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "routed_set.pairs",
                reason: "must not be empty",
            });
        }
        for pair in &output.pairs {
            pair.question.validate()?;
            if output.package.graph.get(&pair.chunk_id).is_none() {
                return Err(ContractViolation::InvalidValue {
                    field: "routed_set.pairs",
                    reason: "routed chunk must exist in the package graph",
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::MicroResolutionInput;
    use crate::ph0gate::ValidatedInput;
    use crate::ph1canon::{Ph1CanonIngest, Ph1Input};
    use crate::ph2micro::Ph2MicroResolve;
    use canon_kernel_contracts::chunk::{
        ChunkDraft, ChunkResolution, ExpectedElements, TextSpan,
    };
    use canon_kernel_contracts::common::UnitScore;
    use canon_kernel_contracts::phase::{
        CanonInputRecord, DocumentId, IngestDraft, PolicyManifest, QualityMetrics,
    };
    use canon_kernel_contracts::question::{
        DimensionId, PolicyAreaId, QuestionCatalog, QuestionGlobal, QuestionId,
    };
    use canon_kernel_contracts::PlanError;
    use std::collections::{BTreeMap, BTreeSet};

    fn micro_set(areas: u8, dimensions: u8) -> MicroQuestionSet {
        let manifest = PolicyManifest::v1(
            (1..=areas)
                .map(|i| PolicyAreaId::new(format!("PA{i:02}")).unwrap())
                .collect(),
            (1..=dimensions)
                .map(|i| DimensionId::new(format!("D{i}")).unwrap())
                .collect(),
            1,
        )
        .unwrap();
        let mut drafts = Vec::new();
        for a in 1..=areas {
            for d in 1..=dimensions {
                drafts.push(ChunkDraft {
                    chunk_id: canon_kernel_contracts::chunk::ChunkId::new(format!(
                        "c_{a:02}_{d}"
                    ))
                    .unwrap(),
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
        let package = Ph1CanonIngest
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
            .unwrap();

        let mut questions = Vec::new();
        let mut global = 0u16;
        for a in 1..=areas {
            for d in 1..=dimensions {
                global += 1;
                questions.push(
                    Question::v1(
                        QuestionId::new(format!("q_{a:02}_{d}")).unwrap(),
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
        Ph2MicroResolve
            .execute(MicroResolutionInput {
                package,
                catalog: QuestionCatalog::v1(questions).unwrap(),
            })
            .unwrap()
    }

    #[test]
    fn at_route_phase_01_every_question_lands_on_its_cell() {
        let phase = Ph3ChunkRoute;
        let out = phase.execute(micro_set(2, 3)).unwrap();
        assert_eq!(out.pairs.len(), 6);
        assert!(phase.validate_output(&out).is_ok());
        for pair in &out.pairs {
            let chunk = out.package.graph.get(&pair.chunk_id).unwrap();
            assert_eq!(
                chunk.policy_area_id(),
                Some(&pair.question.policy_area_id)
            );
            assert_eq!(chunk.dimension_id(), Some(&pair.question.dimension_id));
        }
    }

    #[test]
    fn at_route_phase_02_unroutable_question_fails_the_phase() {
        let phase = Ph3ChunkRoute;
        let mut set = micro_set(2, 2);
        set.questions.push(
            Question::v1(
                QuestionId::new("q_rogue").unwrap(),
                QuestionGlobal::new(50).unwrap(),
                PolicyAreaId::new("PA07").unwrap(),
                DimensionId::new("D1").unwrap(),
                BTreeSet::new(),
                vec![],
                ExpectedElements::default(),
            )
            .unwrap(),
        );
        let err = phase.execute(set).unwrap_err();
        match err {
            PhaseFailure::Plan(PlanError::MissingCoordinate { question_id, .. }) => {
                assert_eq!(question_id.unwrap().as_str(), "q_rogue");
            }
            other => panic!("expected MissingCoordinate, got {other:?}"),
        }
    }
}
