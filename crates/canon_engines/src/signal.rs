#![forbid(unsafe_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use canon_kernel_contracts::chunk::{Chunk, ChunkId};
use canon_kernel_contracts::question::{Question, QuestionId};
use canon_kernel_contracts::signal::{Signal, SignalPack, SignalType};
use canon_kernel_contracts::{ContractViolation, PlanError, Validate};

/// Computes the full signal pack for a chunk. Executors implement this
/// against their extraction backends; tests use deterministic probes.
pub trait SignalProbe {
    fn compute_pack(&self, chunk: &Chunk) -> Result<SignalPack, ContractViolation>;
}

/// Resolution failure: either the probe broke contract, or required
/// signal types are missing (the hard-fail path of the taxonomy).
#[derive(Debug, Clone, PartialEq)]
pub enum SignalFailure {
    Contract(ContractViolation),
    Plan(PlanError),
}

impl From<ContractViolation> for SignalFailure {
    fn from(v: ContractViolation) -> Self {
        SignalFailure::Contract(v)
    }
}

impl From<PlanError> for SignalFailure {
    fn from(e: PlanError) -> Self {
        SignalFailure::Plan(e)
    }
}

impl fmt::Display for SignalFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalFailure::Contract(v) => write!(f, "{v}"),
            SignalFailure::Plan(e) => write!(f, "{e}"),
        }
    }
}

/// Per-chunk signal cache. A pack is computed at most once per chunk and
/// reused for every question that touches it.
#[derive(Debug)]
pub struct SignalRegistry<P>
where
    P: SignalProbe,
{
    probe: P,
    cache: BTreeMap<ChunkId, SignalPack>,
}

/// What got resolved, for the audit trail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionNote {
    pub chunk_id: ChunkId,
    pub question_id: QuestionId,
    pub resolved: Vec<SignalType>,
}

impl<P> SignalRegistry<P>
where
    P: SignalProbe,
{
    pub fn new(probe: P) -> Self {
        Self {
            probe,
            cache: BTreeMap::new(),
        }
    }

    pub fn cached_chunks(&self) -> usize {
        self.cache.len()
    }

    fn pack_for(&mut self, chunk: &Chunk) -> Result<&SignalPack, ContractViolation> {
        if !self.cache.contains_key(chunk.chunk_id()) {
            let pack = self.probe.compute_pack(chunk)?;
            pack.validate()?;
            if &pack.chunk_id != chunk.chunk_id() {
                return Err(ContractViolation::InvalidValue {
                    field: "signal_pack.chunk_id",
                    reason: "probe must answer for the requested chunk",
                });
            }
            self.cache.insert(chunk.chunk_id().clone(), pack);
        }
        match self.cache.get(chunk.chunk_id()) {
            Some(pack) => Ok(pack),
            None => Err(ContractViolation::InvalidValue {
                field: "signal_registry.cache",
                reason: "pack must exist after insertion",
            }),
        }
    }

    /// Executor-facing resolution: one signal per required type (sorted
    /// type order), or a hard failure naming exactly the missing types,
    /// sorted. No fallback, no default signal.
    pub fn get_signals_for_chunk(
        &mut self,
        chunk: &Chunk,
        required_types: &BTreeSet<SignalType>,
    ) -> Result<Vec<Signal>, SignalFailure> {
        let pack = self.pack_for(chunk)?;
        // BTreeSet iteration already yields sorted types.
        let missing: Vec<SignalType> = required_types
            .iter()
            .filter(|t| pack.get(t).is_none())
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(PlanError::MissingSignals {
                chunk_id: chunk.chunk_id().clone(),
                question_id: None,
                missing,
            }
            .into());
        }
        Ok(required_types
            .iter()
            .filter_map(|t| pack.get(t).cloned())
            .collect())
    }
}

/// Resolves a question's declared signal requirements against a chunk.
/// Returns the resolved signals plus a note for the audit ledger.
pub fn resolve_signals<P>(
    chunk: &Chunk,
    question: &Question,
    registry: &mut SignalRegistry<P>,
) -> Result<(Vec<Signal>, ResolutionNote), SignalFailure>
where
    P: SignalProbe,
{
    let signals = registry
        .get_signals_for_chunk(chunk, &question.signal_requirements)
        .map_err(|err| match err {
            SignalFailure::Plan(PlanError::MissingSignals {
                chunk_id, missing, ..
            }) => SignalFailure::Plan(PlanError::MissingSignals {
                chunk_id,
                question_id: Some(question.question_id.clone()),
                missing,
            }),
            other => other,
        })?;
    let note = ResolutionNote {
        chunk_id: chunk.chunk_id().clone(),
        question_id: question.question_id.clone(),
        resolved: signals.iter().map(|s| s.signal_type().clone()).collect(),
    };
    Ok((signals, note))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrity::seal_chunk;
    use canon_kernel_contracts::chunk::{
        ChunkDraft, ChunkResolution, ExpectedElements, TextSpan,
    };
    use canon_kernel_contracts::question::{PolicyAreaId, QuestionGlobal};
    use std::cell::Cell;
    use std::rc::Rc;

    struct FixedProbe {
        types: Vec<&'static str>,
        calls: Rc<Cell<usize>>,
    }

    impl SignalProbe for FixedProbe {
        fn compute_pack(&self, chunk: &Chunk) -> Result<SignalPack, ContractViolation> {
            self.calls.set(self.calls.get() + 1);
            let mut signals = BTreeMap::new();
            for name in &self.types {
                let signal_type = SignalType::new(*name)?;
                signals.insert(
                    signal_type.clone(),
                    Signal::v1(signal_type, Some(format!("{name} from {}", chunk.chunk_id())))?,
                );
            }
            SignalPack::v1(chunk.chunk_id().clone(), signals)
        }
    }

    fn chunk(id: &str) -> Chunk {
        seal_chunk(ChunkDraft {
            chunk_id: ChunkId::new(id).unwrap(),
            text: "Published audit trail covers all ministries.".to_string(),
            text_span: TextSpan::new(0, 44).unwrap(),
            resolution: ChunkResolution::Micro,
            policy_area_id: None,
            dimension_id: None,
            expected_elements: ExpectedElements::default(),
        })
        .unwrap()
    }

    fn question(requirements: &[&str]) -> Question {
        Question::v1(
            QuestionId::new("q1").unwrap(),
            QuestionGlobal::new(1).unwrap(),
            PolicyAreaId::new("PA01").unwrap(),
            canon_kernel_contracts::question::DimensionId::new("D1").unwrap(),
            requirements
                .iter()
                .map(|r| SignalType::new(*r).unwrap())
                .collect(),
            vec![],
            ExpectedElements::default(),
        )
        .unwrap()
    }

    fn registry(types: Vec<&'static str>) -> (SignalRegistry<FixedProbe>, Rc<Cell<usize>>) {
        let calls = Rc::new(Cell::new(0));
        (
            SignalRegistry::new(FixedProbe {
                types,
                calls: calls.clone(),
            }),
            calls,
        )
    }

    #[test]
    fn at_signal_res_01_subset_requirements_resolve_one_per_type() {
        let (mut registry, _) = registry(vec!["entity_mentions", "quote_extract", "date_refs"]);
        let chunk = chunk("c1");
        let question = question(&["quote_extract", "entity_mentions"]);
        let (signals, note) = resolve_signals(&chunk, &question, &mut registry).unwrap();
        assert_eq!(signals.len(), 2);
        let types: Vec<&str> = signals.iter().map(|s| s.signal_type().as_str()).collect();
        assert_eq!(types, vec!["entity_mentions", "quote_extract"]);
        assert_eq!(note.resolved.len(), 2);
        assert_eq!(note.question_id.as_str(), "q1");
    }

    #[test]
    fn at_signal_res_02_missing_types_fail_hard_and_sorted() {
        let (mut registry, _) = registry(vec!["quote_extract"]);
        let chunk = chunk("c1");
        let question = question(&["quote_extract", "entity_mentions", "date_refs"]);
        let err = resolve_signals(&chunk, &question, &mut registry).unwrap_err();
        match err {
            SignalFailure::Plan(PlanError::MissingSignals {
                question_id,
                missing,
                ..
            }) => {
                assert_eq!(question_id.unwrap().as_str(), "q1");
                let names: Vec<&str> = missing.iter().map(|t| t.as_str()).collect();
                assert_eq!(names, vec!["date_refs", "entity_mentions"]);
            }
            other => panic!("expected MissingSignals, got {other:?}"),
        }
    }

    #[test]
    fn at_signal_res_03_registry_caches_per_chunk() {
        let (mut registry, calls) = registry(vec!["quote_extract"]);
        let chunk = chunk("c1");
        let question = question(&["quote_extract"]);
        resolve_signals(&chunk, &question, &mut registry).unwrap();
        resolve_signals(&chunk, &question, &mut registry).unwrap();
        assert_eq!(calls.get(), 1);
        assert_eq!(registry.cached_chunks(), 1);
    }

    #[test]
    fn at_signal_res_04_empty_content_signal_counts_as_resolved() {
        struct EmptyContentProbe;
        impl SignalProbe for EmptyContentProbe {
            fn compute_pack(&self, chunk: &Chunk) -> Result<SignalPack, ContractViolation> {
                let signal_type = SignalType::new("quote_extract")?;
                let mut signals = BTreeMap::new();
                signals.insert(signal_type.clone(), Signal::v1(signal_type, None)?);
                SignalPack::v1(chunk.chunk_id().clone(), signals)
            }
        }
        let mut registry = SignalRegistry::new(EmptyContentProbe);
        let chunk = chunk("c1");
        let question = question(&["quote_extract"]);
        let (signals, _) = resolve_signals(&chunk, &question, &mut registry).unwrap();
        assert_eq!(signals.len(), 1);
        assert!(signals[0].content().is_none());
    }
}
