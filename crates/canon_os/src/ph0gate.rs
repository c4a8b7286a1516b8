#![forbid(unsafe_code)]

use canon_kernel_contracts::phase::{CanonInputRecord, PhaseId};
use canon_kernel_contracts::{ContractViolation, Validate};

use crate::phase::{PhaseContract, PhaseFailure};

/// Phase 0 output: the input record, admitted past the gate.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedInput {
    pub record: CanonInputRecord,
}

/// Phase 0: admits only input records whose upstream validation passed
/// cleanly over a non-empty document.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ph0InputGate;

fn gate_checks(record: &CanonInputRecord) -> Result<(), ContractViolation> {
    if record.page_count == 0 {
        return Err(ContractViolation::InvalidValue {
            field: "canon_input_record.page_count",
            reason: "must be > 0",
        });
    }
    if !record.validation_passed {
        return Err(ContractViolation::InvalidValue {
            field: "canon_input_record.validation_passed",
            reason: "upstream validation must pass",
        });
    }
    if !record.errors.is_empty() {
        return Err(ContractViolation::InvalidValue {
            field: "canon_input_record.errors",
            reason: "must be empty for an admitted record",
        });
    }
    Ok(())
}

impl PhaseContract for Ph0InputGate {
    type Input = CanonInputRecord;
    type Output = ValidatedInput;

    fn phase_id(&self) -> PhaseId {
        PhaseId::InputGate
    }

    fn phase_name(&self) -> &'static str {
        "phase0_input_gate"
    }

    fn validate_input(&self, input: &CanonInputRecord) -> Result<(), ContractViolation> {
        input.validate()
    }

    fn execute(&self, input: CanonInputRecord) -> Result<ValidatedInput, PhaseFailure> {
        gate_checks(&input)?;
        Ok(ValidatedInput { record: input })
    }

    fn validate_output(&self, output: &ValidatedInput) -> Result<(), ContractViolation> {
        output.record.validate()?;
        gate_checks(&output.record)
    }
}
