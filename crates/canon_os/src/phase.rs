#![forbid(unsafe_code)]

use std::fmt;
use std::time::Instant;

use canon_engines::integrity::hash_text;
use canon_kernel_contracts::chunk::ContentHash;
use canon_kernel_contracts::phase::{
    PhaseArtifact, PhaseId, PhaseMetadata, PHASE_CONTRACT_VERSION,
};
use canon_kernel_contracts::{ContractViolation, MonotonicTimeNs, PlanError};
use canon_storage::StorageError;

/// Monotonic time source threaded through the pipeline so phases never
/// read the clock themselves.
pub trait Clock {
    fn now(&self) -> MonotonicTimeNs;
}

/// Process-relative monotonic clock; never returns zero.
#[derive(Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn start() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> MonotonicTimeNs {
        MonotonicTimeNs(self.origin.elapsed().as_nanos() as u64 + 1)
    }
}

/// Error raised while a phase executes: either a contract break, a
/// planning-taxonomy error, or a storage rejection.
#[derive(Debug, Clone, PartialEq)]
pub enum PhaseFailure {
    Contract(ContractViolation),
    Plan(PlanError),
    Storage(StorageError),
}

impl From<ContractViolation> for PhaseFailure {
    fn from(v: ContractViolation) -> Self {
        PhaseFailure::Contract(v)
    }
}

impl From<PlanError> for PhaseFailure {
    fn from(e: PlanError) -> Self {
        PhaseFailure::Plan(e)
    }
}

impl From<StorageError> for PhaseFailure {
    fn from(e: StorageError) -> Self {
        PhaseFailure::Storage(e)
    }
}

impl fmt::Display for PhaseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhaseFailure::Contract(v) => write!(f, "{v}"),
            PhaseFailure::Plan(e) => write!(f, "{e}"),
            PhaseFailure::Storage(e) => write!(f, "{e}"),
        }
    }
}

/// Pipeline-level error: which phase broke, and how.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineError {
    InputRejected {
        phase: PhaseId,
        violation: ContractViolation,
    },
    OutputRejected {
        phase: PhaseId,
        violation: ContractViolation,
    },
    ExecuteFailed {
        phase: PhaseId,
        failure: PhaseFailure,
    },
    SequenceViolation {
        expected: Option<PhaseId>,
        got: PhaseId,
    },
    PriorPhaseFailed {
        prior: PhaseId,
        got: PhaseId,
    },
    Contract(ContractViolation),
    Storage(StorageError),
}

impl From<ContractViolation> for PipelineError {
    fn from(v: ContractViolation) -> Self {
        PipelineError::Contract(v)
    }
}

impl From<StorageError> for PipelineError {
    fn from(e: StorageError) -> Self {
        PipelineError::Storage(e)
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::InputRejected { phase, violation } => {
                write!(f, "{phase}: input rejected: {violation}")
            }
            PipelineError::OutputRejected { phase, violation } => {
                write!(f, "{phase}: output rejected: {violation}")
            }
            PipelineError::ExecuteFailed { phase, failure } => {
                write!(f, "{phase}: {failure}")
            }
            PipelineError::SequenceViolation { expected, got } => match expected {
                Some(expected) => {
                    write!(f, "phase sequence violation: expected {expected}, got {got}")
                }
                None => write!(f, "phase sequence violation: no phase may follow {got}"),
            },
            PipelineError::PriorPhaseFailed { prior, got } => {
                write!(f, "refusing to run {got}: prior phase {prior} did not succeed")
            }
            PipelineError::Contract(v) => write!(f, "{v}"),
            PipelineError::Storage(e) => write!(f, "{e}"),
        }
    }
}

/// The phase protocol: validate input, execute, re-validate output. A
/// phase never runs on invalid input and never hands back an unvalidated
/// artifact.
pub trait PhaseContract {
    type Input;
    type Output;

    fn phase_id(&self) -> PhaseId;
    fn phase_name(&self) -> &'static str;
    fn validate_input(&self, input: &Self::Input) -> Result<(), ContractViolation>;
    fn execute(&self, input: Self::Input) -> Result<Self::Output, PhaseFailure>;
    fn validate_output(&self, output: &Self::Output) -> Result<(), ContractViolation>;
}

/// Hash of the contract definition itself. Two runs with differing hashes
/// for the same phase ran against drifted contracts.
pub fn compute_contract_hash(phase_id: PhaseId, phase_name: &str) -> ContentHash {
    hash_text(&format!(
        "{}|{}|{}",
        phase_id.code(),
        phase_name,
        PHASE_CONTRACT_VERSION.0
    ))
}

/// Append-only record of executed phases. Appends that skip or reorder
/// the canonical sequence, or follow a failed phase, are rejected.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PhaseLedger {
    entries: Vec<PhaseMetadata>,
}

impl PhaseLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, metadata: PhaseMetadata) -> Result<(), PipelineError> {
        use canon_kernel_contracts::Validate;
        metadata.validate()?;
        let expected = PhaseId::SEQUENCE.get(self.entries.len()).copied();
        if expected != Some(metadata.phase) {
            return Err(PipelineError::SequenceViolation {
                expected,
                got: metadata.phase,
            });
        }
        if let Some(prior) = self.entries.last() {
            if !prior.succeeded {
                return Err(PipelineError::PriorPhaseFailed {
                    prior: prior.phase,
                    got: metadata.phase,
                });
            }
        }
        self.entries.push(metadata);
        Ok(())
    }

    pub fn entries(&self) -> &[PhaseMetadata] {
        &self.entries
    }

    pub fn completed(&self) -> bool {
        self.entries.len() == PhaseId::SEQUENCE.len()
            && self.entries.iter().all(|m| m.succeeded)
    }
}

fn record_outcome(
    ledger: &mut PhaseLedger,
    phase_id: PhaseId,
    phase_name: &str,
    succeeded: bool,
    started_at: MonotonicTimeNs,
    clock: &dyn Clock,
    contract_hash: ContentHash,
) -> Result<PhaseMetadata, PipelineError> {
    let elapsed_ns = clock.now().0.saturating_sub(started_at.0);
    let metadata = PhaseMetadata::v1(
        phase_id,
        phase_name,
        succeeded,
        started_at,
        elapsed_ns,
        contract_hash,
    )?;
    ledger.append(metadata.clone())?;
    Ok(metadata)
}

/// Runs one phase under the protocol and commits its metadata to the
/// ledger, success or not.
pub fn run_phase<P>(
    phase: &P,
    input: P::Input,
    clock: &dyn Clock,
    ledger: &mut PhaseLedger,
) -> Result<PhaseArtifact<P::Output>, PipelineError>
where
    P: PhaseContract,
{
    let started_at = clock.now();
    let contract_hash = compute_contract_hash(phase.phase_id(), phase.phase_name());

    if let Err(violation) = phase.validate_input(&input) {
        record_outcome(
            ledger,
            phase.phase_id(),
            phase.phase_name(),
            false,
            started_at,
            clock,
            contract_hash,
        )?;
        return Err(PipelineError::InputRejected {
            phase: phase.phase_id(),
            violation,
        });
    }

    let output = match phase.execute(input) {
        Ok(output) => output,
        Err(failure) => {
            record_outcome(
                ledger,
                phase.phase_id(),
                phase.phase_name(),
                false,
                started_at,
                clock,
                contract_hash,
            )?;
            return Err(PipelineError::ExecuteFailed {
                phase: phase.phase_id(),
                failure,
            });
        }
    };

    if let Err(violation) = phase.validate_output(&output) {
        record_outcome(
            ledger,
            phase.phase_id(),
            phase.phase_name(),
            false,
            started_at,
            clock,
            contract_hash,
        )?;
        return Err(PipelineError::OutputRejected {
            phase: phase.phase_id(),
            violation,
        });
    }

    let metadata = record_outcome(
        ledger,
        phase.phase_id(),
        phase.phase_name(),
        true,
        started_at,
        clock,
        contract_hash,
    )?;
    Ok(PhaseArtifact {
        payload: output,
        metadata,
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::cell::Cell;

    /// Deterministic test clock advancing one tick per read.
    pub struct TickClock {
        next: Cell<u64>,
    }

    impl TickClock {
        pub fn new() -> Self {
            Self { next: Cell::new(1) }
        }
    }

    impl Clock for TickClock {
        fn now(&self) -> MonotonicTimeNs {
            let t = self.next.get();
            self.next.set(t + 1);
            MonotonicTimeNs(t)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::TickClock;
    use super::*;

    struct EchoPhase {
        phase: PhaseId,
        name: &'static str,
        fail_execute: bool,
    }

    impl PhaseContract for EchoPhase {
        type Input = u32;
        type Output = u32;

        fn phase_id(&self) -> PhaseId {
            self.phase
        }

        fn phase_name(&self) -> &'static str {
            self.name
        }

        fn validate_input(&self, input: &u32) -> Result<(), ContractViolation> {
            if *input == 0 {
                return Err(ContractViolation::InvalidValue {
                    field: "echo.input",
                    reason: "must be > 0",
                });
            }
            Ok(())
        }

        fn execute(&self, input: u32) -> Result<u32, PhaseFailure> {
            if self.fail_execute {
                return Err(PhaseFailure::Contract(ContractViolation::InvalidValue {
                    field: "echo.execute",
                    reason: "forced failure",
                }));
            }
            Ok(input + 1)
        }

        fn validate_output(&self, output: &u32) -> Result<(), ContractViolation> {
            if *output == u32::MAX {
                return Err(ContractViolation::InvalidValue {
                    field: "echo.output",
                    reason: "must not overflow",
                });
            }
            Ok(())
        }
    }

    fn gate(fail_execute: bool) -> EchoPhase {
        EchoPhase {
            phase: PhaseId::InputGate,
            name: "phase0_echo_gate",
            fail_execute,
        }
    }

    #[test]
    fn at_phase_proto_01_invalid_input_never_executes() {
        let clock = TickClock::new();
        let mut ledger = PhaseLedger::new();
        let err = run_phase(&gate(false), 0, &clock, &mut ledger).unwrap_err();
        assert!(matches!(err, PipelineError::InputRejected { .. }));
        assert_eq!(ledger.entries().len(), 1);
        assert!(!ledger.entries()[0].succeeded);
    }

    #[test]
    fn at_phase_proto_02_success_commits_validated_artifact() {
        let clock = TickClock::new();
        let mut ledger = PhaseLedger::new();
        let artifact = run_phase(&gate(false), 41, &clock, &mut ledger).unwrap();
        assert_eq!(artifact.payload, 42);
        assert!(artifact.metadata.succeeded);
        assert_eq!(artifact.metadata.phase, PhaseId::InputGate);
    }

    #[test]
    fn at_phase_proto_03_ledger_refuses_skipped_phase() {
        let clock = TickClock::new();
        let mut ledger = PhaseLedger::new();
        run_phase(&gate(false), 1, &clock, &mut ledger).unwrap();
        // Jumping straight to routing skips ingestion and the adapter.
        let route = EchoPhase {
            phase: PhaseId::ChunkRoute,
            name: "phase3_echo_route",
            fail_execute: false,
        };
        let err = run_phase(&route, 1, &clock, &mut ledger).unwrap_err();
        assert!(matches!(err, PipelineError::SequenceViolation { .. }));
    }

    #[test]
    fn at_phase_proto_04_ledger_refuses_append_after_failure() {
        let clock = TickClock::new();
        let mut ledger = PhaseLedger::new();
        let _ = run_phase(&gate(true), 1, &clock, &mut ledger).unwrap_err();
        let ingest = EchoPhase {
            phase: PhaseId::CanonIngest,
            name: "phase1_echo_ingest",
            fail_execute: false,
        };
        let err = run_phase(&ingest, 1, &clock, &mut ledger).unwrap_err();
        assert!(matches!(err, PipelineError::PriorPhaseFailed { .. }));
    }

    #[test]
    fn at_phase_proto_05_contract_hash_is_stable_per_contract() {
        let a = compute_contract_hash(PhaseId::InputGate, "phase0_echo_gate");
        let b = compute_contract_hash(PhaseId::InputGate, "phase0_echo_gate");
        let c = compute_contract_hash(PhaseId::InputGate, "phase0_other_gate");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
