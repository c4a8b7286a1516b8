#![forbid(unsafe_code)]

use thiserror::Error;

use crate::calib::MethodId;
use crate::chunk::{ChunkId, ExpectedElements};
use crate::question::{DimensionId, PolicyAreaId, QuestionId};
use crate::signal::SignalType;
use crate::task::TaskId;

/// The planning-core error taxonomy. Every kind names the offending id so
/// call sites never lose the original cause; no kind has a silent default.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlanError {
    /// Question/chunk expected-elements disagree. Fatal to that task.
    #[error(
        "schema mismatch for question {question_id} on chunk {chunk_id}: \
         question expects {question_elements}, chunk provides {chunk_elements}"
    )]
    SchemaMismatch {
        question_id: QuestionId,
        chunk_id: ChunkId,
        question_elements: ExpectedElements,
        chunk_elements: ExpectedElements,
    },

    /// No chunk addressable at a (policy_area, dimension) coordinate.
    /// Fatal to the question that routed there.
    #[error(
        "no chunk for coordinate ({policy_area_id}, {dimension_id}){}",
        .question_id.as_ref().map(|q| format!(" while matching question {q}")).unwrap_or_default()
    )]
    MissingCoordinate {
        policy_area_id: PolicyAreaId,
        dimension_id: DimensionId,
        question_id: Option<QuestionId>,
    },

    /// Required signal types absent after resolution. Fatal to the
    /// (chunk, question) pair; there is no fallback signal. The question is
    /// absent only on the executor-facing registry path.
    #[error(
        "missing signals on chunk {chunk_id}{}: [{}]",
        .question_id.as_ref().map(|q| format!(" for question {q}")).unwrap_or_default(),
        .missing.iter().map(|t| t.as_str()).collect::<Vec<_>>().join(", ")
    )]
    MissingSignals {
        chunk_id: ChunkId,
        question_id: Option<QuestionId>,
        /// Sorted for deterministic messages.
        missing: Vec<SignalType>,
    },

    /// Planner uniqueness invariant violated. Fatal to the whole planning
    /// run; indicates upstream corruption.
    #[error("duplicate task_id {task_id}")]
    DuplicateTaskId { task_id: TaskId },

    /// Computation error while calibrating one method. The method is
    /// skipped; the run continues.
    #[error("calibration failed for method {method_id}: {reason}")]
    CalibrationFailure { method_id: MethodId, reason: String },

    /// A cataloged method lacks a complete calibration record. Surfaced by
    /// offline validation tooling only, never at runtime.
    #[error(
        "coverage gap for method {method_id}: missing axes [{}]",
        .missing_axes.join(", ")
    )]
    CoverageGap {
        method_id: MethodId,
        missing_axes: Vec<String>,
    },
}
