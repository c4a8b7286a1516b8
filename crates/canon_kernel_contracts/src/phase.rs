#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::chunk::{ChunkDraft, ChunkGraph, ContentHash, IntegrityIndex};
use crate::common::{
    validate_id_str, ContractViolation, MonotonicTimeNs, SchemaVersion, UnitScore, Validate,
};
use crate::question::{DimensionId, PolicyAreaId};

pub const PHASE_CONTRACT_VERSION: SchemaVersion = SchemaVersion(1);

/// The fixed pipeline stages. The numbering (with its gaps) is part of the
/// external contract and is never reassigned.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum PhaseId {
    InputGate,
    CanonIngest,
    CanonAdapter,
    MicroResolve,
    ChunkRoute,
    SchemaValidate,
    TaskConstruct,
    PlanAssemble,
}

impl PhaseId {
    /// Canonical execution order. No phase may be skipped or reordered.
    pub const SEQUENCE: [PhaseId; 8] = [
        PhaseId::InputGate,
        PhaseId::CanonIngest,
        PhaseId::CanonAdapter,
        PhaseId::MicroResolve,
        PhaseId::ChunkRoute,
        PhaseId::SchemaValidate,
        PhaseId::TaskConstruct,
        PhaseId::PlanAssemble,
    ];

    pub fn code(self) -> &'static str {
        match self {
            PhaseId::InputGate => "PH0",
            PhaseId::CanonIngest => "PH1",
            PhaseId::CanonAdapter => "PH1TO2",
            PhaseId::MicroResolve => "PH2",
            PhaseId::ChunkRoute => "PH3",
            PhaseId::SchemaValidate => "PH6",
            PhaseId::TaskConstruct => "PH7",
            PhaseId::PlanAssemble => "PH8",
        }
    }

    pub fn position(self) -> usize {
        Self::SEQUENCE
            .iter()
            .position(|p| *p == self)
            .unwrap_or(usize::MAX)
    }
}

impl fmt::Display for PhaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Execution record of one phase: outcome, timing, and the hash of the
/// contract definition so contract drift between runs is detectable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseMetadata {
    pub schema_version: SchemaVersion,
    pub phase: PhaseId,
    pub phase_name: String,
    pub succeeded: bool,
    pub started_at: MonotonicTimeNs,
    pub elapsed_ns: u64,
    pub contract_hash: ContentHash,
}

impl PhaseMetadata {
    pub fn v1(
        phase: PhaseId,
        phase_name: impl Into<String>,
        succeeded: bool,
        started_at: MonotonicTimeNs,
        elapsed_ns: u64,
        contract_hash: ContentHash,
    ) -> Result<Self, ContractViolation> {
        let m = Self {
            schema_version: PHASE_CONTRACT_VERSION,
            phase,
            phase_name: phase_name.into(),
            succeeded,
            started_at,
            elapsed_ns,
            contract_hash,
        };
        m.validate()?;
        Ok(m)
    }
}

impl Validate for PhaseMetadata {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != PHASE_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "phase_metadata.schema_version",
                reason: "must match PHASE_CONTRACT_VERSION",
            });
        }
        validate_id_str("phase_metadata.phase_name", &self.phase_name, 128)?;
        if self.started_at.0 == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "phase_metadata.started_at",
                reason: "must be > 0",
            });
        }
        self.contract_hash.validate()
    }
}

/// A phase's transformed payload together with its execution metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseArtifact<T> {
    pub payload: T,
    pub metadata: PhaseMetadata,
}

#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Result<Self, ContractViolation> {
        let id = id.into();
        validate_id_str("document_id", &id, 128)?;
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Validate for DocumentId {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_id_str("document_id", &self.0, 128)
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for DocumentId {
    type Error = ContractViolation;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<DocumentId> for String {
    fn from(id: DocumentId) -> String {
        id.0
    }
}

/// Canonical input record handed to phase 0 by the (external) ingestion
/// validator. A record carrying failures is still a well-formed record;
/// rejecting it is the gate phase's job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonInputRecord {
    pub schema_version: SchemaVersion,
    pub document_id: DocumentId,
    pub content_hash: ContentHash,
    pub page_count: u32,
    pub questionnaire_path: String,
    pub questionnaire_hash: ContentHash,
    pub validation_passed: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl CanonInputRecord {
    #[allow(clippy::too_many_arguments)]
    pub fn v1(
        document_id: DocumentId,
        content_hash: ContentHash,
        page_count: u32,
        questionnaire_path: impl Into<String>,
        questionnaire_hash: ContentHash,
        validation_passed: bool,
        errors: Vec<String>,
        warnings: Vec<String>,
    ) -> Result<Self, ContractViolation> {
        let r = Self {
            schema_version: PHASE_CONTRACT_VERSION,
            document_id,
            content_hash,
            page_count,
            questionnaire_path: questionnaire_path.into(),
            questionnaire_hash,
            validation_passed,
            errors,
            warnings,
        };
        r.validate()?;
        Ok(r)
    }
}

impl Validate for CanonInputRecord {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != PHASE_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "canon_input_record.schema_version",
                reason: "must match PHASE_CONTRACT_VERSION",
            });
        }
        self.document_id.validate()?;
        self.content_hash.validate()?;
        if self.questionnaire_path.trim().is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "canon_input_record.questionnaire_path",
                reason: "must not be empty",
            });
        }
        self.questionnaire_hash.validate()?;
        for entry in self.errors.iter().chain(self.warnings.iter()) {
            if entry.trim().is_empty() {
                return Err(ContractViolation::InvalidValue {
                    field: "canon_input_record.errors",
                    reason: "entries must not be empty",
                });
            }
        }
        Ok(())
    }
}

/// Package-level quality gates. Threshold enforcement (both >= 0.8) lives
/// in the ingestion phase's output validation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub provenance_completeness: UnitScore,
    pub structural_consistency: UnitScore,
}

impl Validate for QualityMetrics {
    fn validate(&self) -> Result<(), ContractViolation> {
        self.provenance_completeness.validate()?;
        self.structural_consistency.validate()
    }
}

/// Declares the classification universe of a package: the policy areas and
/// dimensions chunks are addressed by, and how many micro-questions each
/// (area, dimension) cell carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyManifest {
    pub schema_version: SchemaVersion,
    pub policy_areas: Vec<PolicyAreaId>,
    pub dimensions: Vec<DimensionId>,
    pub questions_per_cell: u8,
}

impl PolicyManifest {
    pub fn v1(
        policy_areas: Vec<PolicyAreaId>,
        dimensions: Vec<DimensionId>,
        questions_per_cell: u8,
    ) -> Result<Self, ContractViolation> {
        let m = Self {
            schema_version: PHASE_CONTRACT_VERSION,
            policy_areas,
            dimensions,
            questions_per_cell,
        };
        m.validate()?;
        Ok(m)
    }

    pub fn expected_chunk_count(&self) -> usize {
        self.policy_areas.len() * self.dimensions.len()
    }

    pub fn expected_question_count(&self) -> usize {
        self.expected_chunk_count() * usize::from(self.questions_per_cell)
    }

    /// How many tasks each chunk should receive.
    pub fn expected_tasks_per_chunk(&self) -> usize {
        usize::from(self.questions_per_cell)
    }

    /// How many tasks each policy area should receive.
    pub fn expected_tasks_per_policy_area(&self) -> usize {
        self.dimensions.len() * usize::from(self.questions_per_cell)
    }

    pub fn contains_policy_area(&self, area: &PolicyAreaId) -> bool {
        self.policy_areas.contains(area)
    }

    pub fn contains_dimension(&self, dimension: &DimensionId) -> bool {
        self.dimensions.contains(dimension)
    }
}

impl Validate for PolicyManifest {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != PHASE_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "policy_manifest.schema_version",
                reason: "must match PHASE_CONTRACT_VERSION",
            });
        }
        if self.policy_areas.is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "policy_manifest.policy_areas",
                reason: "must not be empty",
            });
        }
        if self.dimensions.is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "policy_manifest.dimensions",
                reason: "must not be empty",
            });
        }
        if self.questions_per_cell == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "policy_manifest.questions_per_cell",
                reason: "must be > 0",
            });
        }
        let mut seen_areas = std::collections::BTreeSet::new();
        for area in &self.policy_areas {
            area.validate()?;
            if !seen_areas.insert(area.clone()) {
                return Err(ContractViolation::DuplicateValue {
                    field: "policy_manifest.policy_areas",
                    key: area.as_str().to_string(),
                });
            }
        }
        let mut seen_dimensions = std::collections::BTreeSet::new();
        for dimension in &self.dimensions {
            dimension.validate()?;
            if !seen_dimensions.insert(dimension.clone()) {
                return Err(ContractViolation::DuplicateValue {
                    field: "policy_manifest.dimensions",
                    key: dimension.as_str().to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Raw ingestion output handed to phase 1 by the (external) document
/// pipeline: unsealed chunk drafts plus package-level context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestDraft {
    pub schema_version: SchemaVersion,
    pub chunk_drafts: Vec<ChunkDraft>,
    pub manifest: PolicyManifest,
    pub metrics: QualityMetrics,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl IngestDraft {
    pub fn v1(
        chunk_drafts: Vec<ChunkDraft>,
        manifest: PolicyManifest,
        metrics: QualityMetrics,
        metadata: BTreeMap<String, String>,
    ) -> Result<Self, ContractViolation> {
        let d = Self {
            schema_version: PHASE_CONTRACT_VERSION,
            chunk_drafts,
            manifest,
            metrics,
            metadata,
        };
        d.validate()?;
        Ok(d)
    }
}

impl Validate for IngestDraft {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != PHASE_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "ingest_draft.schema_version",
                reason: "must match PHASE_CONTRACT_VERSION",
            });
        }
        if self.chunk_drafts.is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "ingest_draft.chunk_drafts",
                reason: "must not be empty",
            });
        }
        for draft in &self.chunk_drafts {
            draft.validate()?;
        }
        self.manifest.validate()?;
        self.metrics.validate()
    }
}

/// Phase 1 output: the content-addressed package every later phase
/// consumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonPolicyPackage {
    pub schema_version: String,
    pub graph: ChunkGraph,
    pub manifest: PolicyManifest,
    pub metrics: QualityMetrics,
    pub integrity: IntegrityIndex,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl Validate for CanonPolicyPackage {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version.trim().is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "canon_policy_package.schema_version",
                reason: "must not be empty",
            });
        }
        self.graph.validate()?;
        self.manifest.validate()?;
        self.metrics.validate()?;
        self.integrity.validate()?;
        if self.integrity.by_chunk.len() != self.graph.len() {
            return Err(ContractViolation::InvalidValue {
                field: "canon_policy_package.integrity",
                reason: "must index exactly the chunks in the graph",
            });
        }
        for chunk_id in self.graph.chunk_ids() {
            let indexed = self.integrity.by_chunk.get(chunk_id);
            let chunk = self.graph.get(chunk_id);
            match (indexed, chunk) {
                (Some(hash), Some(chunk)) if hash == chunk.content_hash() => {}
                _ => {
                    return Err(ContractViolation::InvalidValue {
                        field: "canon_policy_package.integrity",
                        reason: "chunk hash must match the integrity index entry",
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn at_phase_01_sequence_is_fixed_and_complete() {
        assert_eq!(PhaseId::SEQUENCE.len(), 8);
        assert_eq!(PhaseId::InputGate.position(), 0);
        assert_eq!(PhaseId::PlanAssemble.position(), 7);
        assert_eq!(PhaseId::CanonAdapter.code(), "PH1TO2");
    }

    #[test]
    fn at_phase_02_manifest_expected_counts() {
        let areas = (1..=10)
            .map(|i| PolicyAreaId::new(format!("PA{i:02}")).unwrap())
            .collect();
        let dimensions = (1..=6)
            .map(|i| DimensionId::new(format!("D{i}")).unwrap())
            .collect();
        let manifest = PolicyManifest::v1(areas, dimensions, 5).unwrap();
        assert_eq!(manifest.expected_chunk_count(), 60);
        assert_eq!(manifest.expected_question_count(), 300);
        assert_eq!(manifest.expected_tasks_per_chunk(), 5);
        assert_eq!(manifest.expected_tasks_per_policy_area(), 30);
    }

    #[test]
    fn at_phase_03_manifest_rejects_duplicate_axis_entries() {
        let areas = vec![
            PolicyAreaId::new("PA01").unwrap(),
            PolicyAreaId::new("PA01").unwrap(),
        ];
        let dimensions = vec![DimensionId::new("D1").unwrap()];
        assert!(PolicyManifest::v1(areas, dimensions, 5).is_err());
    }
}
