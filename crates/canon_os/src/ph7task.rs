#![forbid(unsafe_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use canon_engines::route::filter_patterns;
use canon_engines::signal::{resolve_signals, SignalFailure, SignalProbe, SignalRegistry};
use canon_kernel_contracts::audit::{AuditRowInput, AuditScope, AuditSeverity};
use canon_kernel_contracts::chunk::Chunk;
use canon_kernel_contracts::phase::{CanonPolicyPackage, PhaseId, PolicyManifest};
use canon_kernel_contracts::question::{Pattern, Question};
use canon_kernel_contracts::signal::Signal;
use canon_kernel_contracts::task::{ExecutableTask, TaskId};
use canon_kernel_contracts::{
    ContractViolation, MonotonicTimeNs, PlanError, Validate,
};

use crate::ph6schema::SchemaCheckedSet;
use crate::phase::{PhaseContract, PhaseFailure};

pub mod reason_codes {
    use canon_kernel_contracts::ReasonCodeId;

    // Task-construction reason-code namespace.
    pub const TASK_SIGNALS_RESOLVED: ReasonCodeId = ReasonCodeId(0x5437_0001);
    pub const TASK_ZERO_PATTERN_MATCHES: ReasonCodeId = ReasonCodeId(0x5437_0002);
    pub const TASK_CHUNK_USAGE_DEVIATION: ReasonCodeId = ReasonCodeId(0x5437_0003);
    pub const TASK_AREA_USAGE_DEVIATION: ReasonCodeId = ReasonCodeId(0x5437_0004);
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskConstructionInput {
    pub set: SchemaCheckedSet,
    pub now: MonotonicTimeNs,
}

/// Phase 7 output: the constructed task set plus the audit rows the
/// pipeline commits on success.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskSet {
    pub package: CanonPolicyPackage,
    pub tasks: Vec<ExecutableTask>,
    pub audit: Vec<AuditRowInput>,
}

/// Builds one task for a (question, chunk) pairing. Inserting into
/// `seen_ids` is the uniqueness check: a repeated id aborts the whole
/// planning run.
pub fn construct_task(
    question: &Question,
    chunk: &Chunk,
    patterns: Vec<Pattern>,
    signals: Vec<Signal>,
    seen_ids: &Mutex<BTreeSet<TaskId>>,
    now: MonotonicTimeNs,
) -> Result<ExecutableTask, PhaseFailure> {
    let task_id = TaskId::derive(question.question_global, &question.policy_area_id);
    {
        let mut guard = seen_ids
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !guard.insert(task_id.clone()) {
            return Err(PhaseFailure::Plan(PlanError::DuplicateTaskId { task_id }));
        }
    }
    let task = ExecutableTask::v1(
        task_id,
        question.question_id.clone(),
        chunk.chunk_id().clone(),
        patterns,
        signals,
        now,
        question.expected_elements.clone(),
    )?;
    Ok(task)
}

/// Soft cross-task sanity check: tallies task usage per chunk and per
/// policy area against the manifest expectations. Deviations are warning
/// rows, never failures.
pub fn validate_cross_task(
    tasks: &[ExecutableTask],
    manifest: &PolicyManifest,
    now: MonotonicTimeNs,
) -> Result<Vec<AuditRowInput>, ContractViolation> {
    let mut per_chunk: BTreeMap<_, usize> = BTreeMap::new();
    let mut per_area: BTreeMap<_, usize> = BTreeMap::new();
    for task in tasks {
        *per_chunk.entry(task.chunk_id().clone()).or_default() += 1;
        if let Some((_, area)) = task.task_id().as_str().split_once('-') {
            *per_area.entry(area.to_string()).or_default() += 1;
        }
    }
    let mut rows = Vec::new();
    let expected_chunk = manifest.expected_tasks_per_chunk();
    for (chunk_id, count) in per_chunk {
        if count != expected_chunk {
            rows.push(
                AuditRowInput::v1(
                    now,
                    AuditSeverity::Warning,
                    reason_codes::TASK_CHUNK_USAGE_DEVIATION,
                    AuditScope::Chunk { chunk_id },
                    format!("chunk referenced by {count} tasks, expected {expected_chunk}"),
                )?,
            );
        }
    }
    let expected_area = manifest.expected_tasks_per_policy_area();
    for area in &manifest.policy_areas {
        let count = per_area.get(area.as_str()).copied().unwrap_or(0);
        if count != expected_area {
            rows.push(
                AuditRowInput::v1(
                    now,
                    AuditSeverity::Warning,
                    reason_codes::TASK_AREA_USAGE_DEVIATION,
                    AuditScope::PolicyArea {
                        policy_area_id: area.clone(),
                    },
                    format!("policy area referenced by {count} tasks, expected {expected_area}"),
                )?,
            );
        }
    }
    Ok(rows)
}

/// Phase 7: resolves signals, filters patterns, and constructs the
/// uniquely-identified task set.
#[derive(Debug)]
pub struct Ph7TaskConstruct<P>
where
    P: SignalProbe,
{
    registry: Mutex<SignalRegistry<P>>,
}

impl<P> Ph7TaskConstruct<P>
where
    P: SignalProbe,
{
    pub fn new(probe: P) -> Self {
        Self {
            registry: Mutex::new(SignalRegistry::new(probe)),
        }
    }
}

impl<P> PhaseContract for Ph7TaskConstruct<P>
where
    P: SignalProbe,
{
    type Input = TaskConstructionInput;
    type Output = TaskSet;

    fn phase_id(&self) -> PhaseId {
        PhaseId::TaskConstruct
    }

    fn phase_name(&self) -> &'static str {
        "phase7_task_construct"
    }

    fn validate_input(&self, input: &TaskConstructionInput) -> Result<(), ContractViolation> {
        input.set.package.validate()?;
        if input.set.pairs.is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "schema_checked_set.pairs",
                reason: "must not be empty",
            });
        }
        if input.now.0 == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "task_construction_input.now",
                reason: "must be > 0",
            });
        }
        Ok(())
    }

    fn execute(&self, input: TaskConstructionInput) -> Result<TaskSet, PhaseFailure> {
        // Duplicate detection is an exclusive-access invariant.
        let seen_ids: Mutex<BTreeSet<TaskId>> = Mutex::new(BTreeSet::new());
        let mut registry = self
            .registry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut tasks = Vec::with_capacity(input.set.pairs.len());
        let mut audit = Vec::new();

        for pair in &input.set.pairs {
            let chunk = input.set.package.graph.get(&pair.chunk_id).ok_or(
                ContractViolation::InvalidValue {
                    field: "schema_checked_set.pairs",
                    reason: "routed chunk must exist in the package graph",
                },
            )?;

            let patterns = filter_patterns(&pair.question, &pair.question.policy_area_id)?;
            if patterns.is_empty() && !pair.question.patterns.is_empty() {
                audit.push(AuditRowInput::v1(
                    input.now,
                    AuditSeverity::Warning,
                    reason_codes::TASK_ZERO_PATTERN_MATCHES,
                    AuditScope::Question {
                        question_id: pair.question.question_id.clone(),
                    },
                    "no patterns match the task's own policy area",
                )?);
            }

            let (signals, note) = resolve_signals(chunk, &pair.question, &mut registry)
                .map_err(|failure| match failure {
                    SignalFailure::Contract(v) => PhaseFailure::Contract(v),
                    SignalFailure::Plan(e) => PhaseFailure::Plan(e),
                })?;
            audit.push(
                AuditRowInput::v1(
                    input.now,
                    AuditSeverity::Info,
                    reason_codes::TASK_SIGNALS_RESOLVED,
                    AuditScope::Pair {
                        chunk_id: note.chunk_id.clone(),
                        question_id: note.question_id.clone(),
                    },
                    format!("resolved {} signal types", note.resolved.len()),
                )?
                .with_payload(
                    "resolved_types",
                    note.resolved
                        .iter()
                        .map(|t| t.as_str())
                        .collect::<Vec<_>>()
                        .join(","),
                ),
            );

            let task = construct_task(
                &pair.question,
                chunk,
                patterns,
                signals,
                &seen_ids,
                input.now,
            )?;
            tasks.push(task);
        }

        audit.extend(validate_cross_task(
            &tasks,
            &input.set.package.manifest,
            input.now,
        )?);

        Ok(TaskSet {
            package: input.set.package,
            tasks,
            audit,
        })
    }

    fn validate_output(&self, output: &TaskSet) -> Result<(), ContractViolation> {
        if output.tasks.is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "task_set.tasks",
                reason: "must not be empty",
            });
        }
        let mut ids = BTreeSet::new();
        for task in &output.tasks {
            task.validate()?;
            if !ids.insert(task.task_id().clone()) {
                return Err(ContractViolation::DuplicateValue {
                    field: "task_set.task_id",
                    key: task.task_id().as_str().to_string(),
                });
            }
        }
        for row in &output.audit {
            row.validate()?;
        }
        Ok(())
    }
}
