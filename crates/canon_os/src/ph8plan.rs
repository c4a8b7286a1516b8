#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use rayon::prelude::*;

use canon_engines::integrity::hash_bytes;
use canon_kernel_contracts::audit::{AuditRowInput, AuditScope, AuditSeverity};
use canon_kernel_contracts::calib::{MethodCalibration, RuntimeLayers, SkipDecision};
use canon_kernel_contracts::chunk::ChunkId;
use canon_kernel_contracts::phase::PhaseId;
use canon_kernel_contracts::plan::{ExecutionPlan, MethodDecision, TaskMethodDecisions};
use canon_kernel_contracts::{ContractViolation, MonotonicTimeNs, Validate};

use crate::context::RuntimeContext;
use crate::ph7task::TaskSet;
use crate::phase::{PhaseContract, PhaseFailure};

pub mod reason_codes {
    use canon_kernel_contracts::ReasonCodeId;

    // Plan-assembly reason-code namespace.
    pub const PLAN_METHOD_SKIPPED: ReasonCodeId = ReasonCodeId(0x5038_0001);
    pub const PLAN_METHOD_EXCLUDED: ReasonCodeId = ReasonCodeId(0x5038_0002);
    pub const PLAN_METHOD_FAILED: ReasonCodeId = ReasonCodeId(0x5038_0003);
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlanAssemblyInput {
    pub tasks: TaskSet,
    /// Evidence-layer values per chunk, from the external collectors.
    /// Chunks without an entry calibrate against all-zero layers.
    pub layers_by_chunk: BTreeMap<ChunkId, RuntimeLayers>,
    pub now: MonotonicTimeNs,
}

/// Phase 8 output: the execution plan plus calibration audit rows.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionPlanBundle {
    pub plan: ExecutionPlan,
    pub audit: Vec<AuditRowInput>,
}

/// Phase 8: calibrates every cataloged method against every task's
/// evidence layers and assembles the deterministic execution plan.
#[derive(Debug)]
pub struct Ph8PlanAssemble {
    context: Arc<RuntimeContext>,
}

impl Ph8PlanAssemble {
    pub fn new(context: Arc<RuntimeContext>) -> Self {
        Self { context }
    }
}

impl PhaseContract for Ph8PlanAssemble {
    type Input = PlanAssemblyInput;
    type Output = ExecutionPlanBundle;

    fn phase_id(&self) -> PhaseId {
        PhaseId::PlanAssemble
    }

    fn phase_name(&self) -> &'static str {
        "phase8_execution_plan_assemble"
    }

    fn validate_input(&self, input: &PlanAssemblyInput) -> Result<(), ContractViolation> {
        if input.tasks.tasks.is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "plan_assembly_input.tasks",
                reason: "must not be empty",
            });
        }
        for layers in input.layers_by_chunk.values() {
            layers.validate()?;
        }
        if input.now.0 == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "plan_assembly_input.now",
                reason: "must be > 0",
            });
        }
        Ok(())
    }

    fn execute(&self, input: PlanAssemblyInput) -> Result<ExecutionPlanBundle, PhaseFailure> {
        let calibration = &self.context.calibration;
        let mut tasks = input.tasks.tasks;
        // Per-task calibration is order-independent; sort before fanning
        // out so the plan (and its hash) is reproducible.
        tasks.sort_by(|a, b| a.task_id().cmp(b.task_id()));

        let decisions: Vec<TaskMethodDecisions> = tasks
            .par_iter()
            .map(|task| {
                let layers = input
                    .layers_by_chunk
                    .get(task.chunk_id())
                    .copied()
                    .unwrap_or_default();
                TaskMethodDecisions {
                    task_id: task.task_id().clone(),
                    methods: calibration
                        .method_ids()
                        .map(|method_id| MethodDecision {
                            method_id: method_id.clone(),
                            calibration: calibration.calibrate(method_id, &layers),
                        })
                        .collect(),
                }
            })
            .collect();

        let mut audit = Vec::new();
        for row in &decisions {
            for decision in &row.methods {
                let (severity, reason_code, message) = match &decision.calibration {
                    MethodCalibration::Calibrated {
                        score,
                        decision: SkipDecision::Skip { threshold },
                    } => (
                        AuditSeverity::Info,
                        reason_codes::PLAN_METHOD_SKIPPED,
                        format!(
                            "method skipped: score {:.3} below threshold {threshold:.3}",
                            score.value()
                        ),
                    ),
                    MethodCalibration::Excluded { reason } => (
                        AuditSeverity::Info,
                        reason_codes::PLAN_METHOD_EXCLUDED,
                        format!("method excluded: {reason}"),
                    ),
                    MethodCalibration::Failed { reason } => (
                        AuditSeverity::Warning,
                        reason_codes::PLAN_METHOD_FAILED,
                        format!("calibration failed, method skipped: {reason}"),
                    ),
                    _ => continue,
                };
                audit.push(
                    AuditRowInput::v1(
                        input.now,
                        severity,
                        reason_code,
                        AuditScope::Method {
                            method_id: decision.method_id.clone(),
                        },
                        message,
                    )?
                    .with_payload("task_id", row.task_id.as_str()),
                );
            }
        }

        let body = serde_json::to_vec(&(&tasks, &decisions)).map_err(|_| {
            ContractViolation::InvalidValue {
                field: "execution_plan",
                reason: "plan body must serialize",
            }
        })?;
        let plan_hash = hash_bytes(&body);
        let plan = ExecutionPlan::v1(tasks, decisions, plan_hash)?;
        Ok(ExecutionPlanBundle { plan, audit })
    }

    fn validate_output(&self, output: &ExecutionPlanBundle) -> Result<(), ContractViolation> {
        output.plan.validate()?;
        let catalog_len = self.context.calibration.method_ids().count();
        for row in &output.plan.decisions {
            if row.methods.len() != catalog_len {
                return Err(ContractViolation::InvalidValue {
                    field: "execution_plan.decisions",
                    reason: "every task must decide the full method catalog",
                });
            }
        }
        for row in &output.audit {
            row.validate()?;
        }
        Ok(())
    }
}
