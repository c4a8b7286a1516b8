#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use canon_kernel_contracts::chunk::{ChunkGraph, ChunkId};
use canon_kernel_contracts::question::{DimensionId, Pattern, PolicyAreaId, Question};
use canon_kernel_contracts::{ContractViolation, PlanError};

/// Coordinate-addressed view over a chunk graph: exactly one chunk per
/// (policy_area, dimension) pair.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChunkMatrix {
    cells: BTreeMap<(PolicyAreaId, DimensionId), ChunkId>,
}

impl ChunkMatrix {
    /// Builds the matrix from every coordinate-carrying chunk in the
    /// graph. Two chunks claiming the same coordinate is a build error,
    /// not a last-writer-wins.
    pub fn from_graph(graph: &ChunkGraph) -> Result<Self, ContractViolation> {
        let mut cells = BTreeMap::new();
        for (chunk_id, chunk) in graph.iter() {
            if let Some((area, dimension)) = chunk.coordinate() {
                let key = (area.clone(), dimension.clone());
                if cells.contains_key(&key) {
                    return Err(ContractViolation::DuplicateValue {
                        field: "chunk_matrix.coordinate",
                        key: format!("({area}, {dimension})"),
                    });
                }
                cells.insert(key, chunk_id.clone());
            }
        }
        Ok(Self { cells })
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// O(1) coordinate lookup. Absence is an error, never a default or
    /// nearest chunk.
    pub fn get_chunk(
        &self,
        policy_area_id: &PolicyAreaId,
        dimension_id: &DimensionId,
    ) -> Result<&ChunkId, PlanError> {
        self.cells
            .get(&(policy_area_id.clone(), dimension_id.clone()))
            .ok_or_else(|| PlanError::MissingCoordinate {
                policy_area_id: policy_area_id.clone(),
                dimension_id: dimension_id.clone(),
                question_id: None,
            })
    }
}

/// Matches a question to its chunk, re-raising coordinate misses with the
/// offending question id attached.
pub fn match_chunk(question: &Question, matrix: &ChunkMatrix) -> Result<ChunkId, PlanError> {
    match matrix.get_chunk(&question.policy_area_id, &question.dimension_id) {
        Ok(chunk_id) => Ok(chunk_id.clone()),
        Err(PlanError::MissingCoordinate {
            policy_area_id,
            dimension_id,
            ..
        }) => Err(PlanError::MissingCoordinate {
            policy_area_id,
            dimension_id,
            question_id: Some(question.question_id.clone()),
        }),
        Err(other) => Err(other),
    }
}

/// Filters a question's patterns down to one policy area. Every pattern
/// must carry `policy_area_id`; one absent field fails the whole call —
/// partial filtering is disallowed. Relative order is preserved. Zero
/// matches is a legitimate outcome the caller may warn about.
pub fn filter_patterns(
    question: &Question,
    target_policy_area_id: &PolicyAreaId,
) -> Result<Vec<Pattern>, ContractViolation> {
    for pattern in &question.patterns {
        if pattern.policy_area_id.is_none() {
            return Err(ContractViolation::InvalidValue {
                field: "pattern.policy_area_id",
                reason: "must be present on every pattern before filtering",
            });
        }
    }
    Ok(question
        .patterns
        .iter()
        .filter(|p| p.policy_area_id.as_ref() == Some(target_policy_area_id))
        .cloned()
        .collect())
}
