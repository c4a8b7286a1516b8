#![forbid(unsafe_code)]

use canon_engines::integrity::hash_bytes;
use canon_kernel_contracts::chunk::ContentHash;
use canon_kernel_contracts::phase::{CanonPolicyPackage, PhaseId};
use canon_kernel_contracts::question::QuestionCatalog;
use canon_kernel_contracts::{ContractViolation, Validate};

use crate::phase::{PhaseContract, PhaseFailure};

#[derive(Debug, Clone, PartialEq)]
pub struct AdapterInput {
    pub package: CanonPolicyPackage,
    pub catalog: QuestionCatalog,
    /// Raw questionnaire bytes, exactly as read from disk.
    pub catalog_raw: Vec<u8>,
    /// Hash the phase-0 record declared for the questionnaire.
    pub questionnaire_hash: ContentHash,
}

/// Adapter output: the package/catalog pairing phase 2 resolves against.
#[derive(Debug, Clone, PartialEq)]
pub struct MicroResolutionInput {
    pub package: CanonPolicyPackage,
    pub catalog: QuestionCatalog,
}

/// Bridges phase 1 to phase 2: binds the ingested package to the
/// questionnaire, refusing a catalog whose bytes do not hash to the value
/// the input record declared.
#[derive(Debug, Clone, Copy, Default)]
pub struct CanonAdapter;

impl PhaseContract for CanonAdapter {
    type Input = AdapterInput;
    type Output = MicroResolutionInput;

    fn phase_id(&self) -> PhaseId {
        PhaseId::CanonAdapter
    }

    fn phase_name(&self) -> &'static str {
        "phase1_to_phase2_canon_adapter"
    }

    fn validate_input(&self, input: &AdapterInput) -> Result<(), ContractViolation> {
        input.package.validate()?;
        input.catalog.validate()?;
        input.questionnaire_hash.validate()
    }

    fn execute(&self, input: AdapterInput) -> Result<MicroResolutionInput, PhaseFailure> {
        let actual = hash_bytes(&input.catalog_raw);
        if actual != input.questionnaire_hash {
            return Err(PhaseFailure::Contract(ContractViolation::InvalidValue {
                field: "adapter_input.catalog_raw",
                reason: "questionnaire bytes must hash to the declared questionnaire_hash",
            }));
        }
        Ok(MicroResolutionInput {
            package: input.package,
            catalog: input.catalog,
        })
    }

    fn validate_output(&self, output: &MicroResolutionInput) -> Result<(), ContractViolation> {
        output.package.validate()?;
        output.catalog.validate()
    }
}
