#![forbid(unsafe_code)]

use canon_kernel_contracts::chunk::Chunk;
use canon_kernel_contracts::phase::{CanonPolicyPackage, PhaseId};
use canon_kernel_contracts::question::Question;
use canon_kernel_contracts::{ContractViolation, PlanError, Validate};

use crate::ph3route::{RoutedPair, RoutedSet};
use crate::phase::{PhaseContract, PhaseFailure};

/// Phase 6 output: the routed set, schema-checked pair by pair.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaCheckedSet {
    pub package: CanonPolicyPackage,
    pub pairs: Vec<RoutedPair>,
}

/// Chunk and question must declare exactly the same element schema. Any
/// divergence fails with both schemas in the message.
pub fn validate_schema(question: &Question, chunk: &Chunk) -> Result<(), PlanError> {
    if question.expected_elements != *chunk.expected_elements() {
        return Err(PlanError::SchemaMismatch {
            question_id: question.question_id.clone(),
            chunk_id: chunk.chunk_id().clone(),
            question_elements: question.expected_elements.clone(),
            chunk_elements: chunk.expected_elements().clone(),
        });
    }
    Ok(())
}

/// Phase 6: element-schema agreement across every routed pair.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ph6SchemaValidate;

impl PhaseContract for Ph6SchemaValidate {
    type Input = RoutedSet;
    type Output = SchemaCheckedSet;

    fn phase_id(&self) -> PhaseId {
        PhaseId::SchemaValidate
    }

    fn phase_name(&self) -> &'static str {
        "phase6_schema_validate"
    }

    fn validate_input(&self, input: &RoutedSet) -> Result<(), ContractViolation> {
        input.package.validate()?;
        if input.pairs.is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "routed_set.pairs",
                reason: "must not be empty",
            });
        }
        Ok(())
    }

    fn execute(&self, input: RoutedSet) -> Result<SchemaCheckedSet, PhaseFailure> {
        for pair in &input.pairs {
            let chunk = input.package.graph.get(&pair.chunk_id).ok_or(
                ContractViolation::InvalidValue {
                    field: "routed_set.pairs",
                    reason: "routed chunk must exist in the package graph",
                },
            )?;
            validate_schema(&pair.question, chunk)?;
        }
        Ok(SchemaCheckedSet {
            package: input.package,
            pairs: input.pairs,
        })
    }

    fn validate_output(&self, output: &SchemaCheckedSet) -> Result<(), ContractViolation> {
        output.package.validate()?;
        if output.pairs.is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "schema_checked_set.pairs",
                reason: "must not be empty",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canon_engines::integrity::seal_chunk;
    use canon_kernel_contracts::chunk::{
        ChunkDraft, ChunkId, ChunkResolution, ExpectedElements, TextSpan,
    };
    use canon_kernel_contracts::question::{
        DimensionId, PolicyAreaId, QuestionGlobal, QuestionId,
    };
    use std::collections::BTreeSet;

    fn elements(names: &[&str]) -> ExpectedElements {
        ExpectedElements::new(names.iter().map(|n| n.to_string())).unwrap()
    }

    fn chunk_with(elements_of: ExpectedElements) -> Chunk {
        seal_chunk(ChunkDraft {
            chunk_id: ChunkId::new("c1").unwrap(),
            text: "Annual disclosure rules.".to_string(),
            text_span: TextSpan::new(0, 24).unwrap(),
            resolution: ChunkResolution::Micro,
            policy_area_id: Some(PolicyAreaId::new("PA01").unwrap()),
            dimension_id: Some(DimensionId::new("D1").unwrap()),
            expected_elements: elements_of,
        })
        .unwrap()
    }

    fn question_with(elements_of: ExpectedElements) -> Question {
        Question::v1(
            QuestionId::new("q1").unwrap(),
            QuestionGlobal::new(1).unwrap(),
            PolicyAreaId::new("PA01").unwrap(),
            DimensionId::new("D1").unwrap(),
            BTreeSet::new(),
            vec![],
            elements_of,
        )
        .unwrap()
    }

    #[test]
    fn at_schema_01_equal_schemas_pass() {
        let shared = elements(&["quote", "score", "rationale"]);
        let question = question_with(shared.clone());
        let chunk = chunk_with(shared);
        assert!(validate_schema(&question, &chunk).is_ok());
    }

    #[test]
    fn at_schema_02_divergence_prints_both_schemas() {
        let question = question_with(elements(&["quote", "score"]));
        let chunk = chunk_with(elements(&["quote", "rationale"]));
        let err = validate_schema(&question, &chunk).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("q1"));
        assert!(message.contains("c1"));
        assert!(message.contains("[quote, score]"));
        assert!(message.contains("[quote, rationale]"));
    }
}
