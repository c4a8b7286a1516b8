#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use canon_engines::integrity::{build_index, seal_chunk};
use canon_kernel_contracts::chunk::ChunkGraph;
use canon_kernel_contracts::phase::{CanonPolicyPackage, IngestDraft, PhaseId};
use canon_kernel_contracts::{ContractViolation, Validate};

use crate::ph0gate::ValidatedInput;
use crate::phase::{PhaseContract, PhaseFailure};

pub const PACKAGE_SCHEMA_VERSION: &str = "canon-package/1.0.0";

/// Both quality metrics must clear this floor for the package to leave
/// phase 1.
pub const MIN_QUALITY: f64 = 0.8;

#[derive(Debug, Clone, PartialEq)]
pub struct Ph1Input {
    pub validated: ValidatedInput,
    pub draft: IngestDraft,
}

/// Phase 1: seals chunk drafts into content-addressed chunks, assembles
/// the graph and integrity index, and emits the canon policy package.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ph1CanonIngest;

impl PhaseContract for Ph1CanonIngest {
    type Input = Ph1Input;
    type Output = CanonPolicyPackage;

    fn phase_id(&self) -> PhaseId {
        PhaseId::CanonIngest
    }

    fn phase_name(&self) -> &'static str {
        "phase1_canon_ingest"
    }

    fn validate_input(&self, input: &Ph1Input) -> Result<(), ContractViolation> {
        input.validated.record.validate()?;
        input.draft.validate()
    }

    fn execute(&self, input: Ph1Input) -> Result<CanonPolicyPackage, PhaseFailure> {
        let mut graph = ChunkGraph::new();
        for draft in input.draft.chunk_drafts {
            let chunk = seal_chunk(draft)?;
            graph.insert(chunk)?;
        }
        let integrity = build_index(&graph)?;

        let mut metadata = input.draft.metadata;
        metadata.insert(
            "document_id".to_string(),
            input.validated.record.document_id.as_str().to_string(),
        );
        metadata.insert(
            "document_content_hash".to_string(),
            input.validated.record.content_hash.as_str().to_string(),
        );

        Ok(CanonPolicyPackage {
            schema_version: PACKAGE_SCHEMA_VERSION.to_string(),
            graph,
            manifest: input.draft.manifest,
            metrics: input.draft.metrics,
            integrity,
            metadata,
        })
    }

    fn validate_output(&self, output: &CanonPolicyPackage) -> Result<(), ContractViolation> {
        output.validate()?;
        if output.metrics.provenance_completeness.value() < MIN_QUALITY {
            return Err(ContractViolation::InvalidRange {
                field: "canon_policy_package.metrics.provenance_completeness",
                min: MIN_QUALITY,
                max: 1.0,
                got: output.metrics.provenance_completeness.value(),
            });
        }
        if output.metrics.structural_consistency.value() < MIN_QUALITY {
            return Err(ContractViolation::InvalidRange {
                field: "canon_policy_package.metrics.structural_consistency",
                min: MIN_QUALITY,
                max: 1.0,
                got: output.metrics.structural_consistency.value(),
            });
        }
        if output.graph.len() != output.manifest.expected_chunk_count() {
            return Err(ContractViolation::InvalidValue {
                field: "canon_policy_package.graph",
                reason: "chunk count must equal policy_areas x dimensions",
            });
        }
        // Coordinate-carrying chunks must stay inside the manifest universe.
        let mut coordinates = BTreeMap::new();
        for (chunk_id, chunk) in output.graph.iter() {
            if let Some((area, dimension)) = chunk.coordinate() {
                if !output.manifest.contains_policy_area(area) {
                    return Err(ContractViolation::InvalidValue {
                        field: "canon_policy_package.graph",
                        reason: "chunk policy_area_id must be declared in the manifest",
                    });
                }
                if !output.manifest.contains_dimension(dimension) {
                    return Err(ContractViolation::InvalidValue {
                        field: "canon_policy_package.graph",
                        reason: "chunk dimension_id must be declared in the manifest",
                    });
                }
                if coordinates
                    .insert((area.clone(), dimension.clone()), chunk_id.clone())
                    .is_some()
                {
                    return Err(ContractViolation::DuplicateValue {
                        field: "canon_policy_package.graph.coordinate",
                        key: format!("({area}, {dimension})"),
                    });
                }
            }
        }
        Ok(())
    }
}
