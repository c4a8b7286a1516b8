#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

use crate::calib::{MethodCalibration, MethodId};
use crate::chunk::ContentHash;
use crate::common::{ContractViolation, SchemaVersion, Validate};
use crate::task::{ExecutableTask, TaskId};

pub const PLAN_CONTRACT_VERSION: SchemaVersion = SchemaVersion(1);

/// Calibration outcome for one method under one task's evidence layers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodDecision {
    pub method_id: MethodId,
    pub calibration: MethodCalibration,
}

impl Validate for MethodDecision {
    fn validate(&self) -> Result<(), ContractViolation> {
        self.method_id.validate()?;
        self.calibration.validate()
    }
}

/// All method decisions for one task, in catalog order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskMethodDecisions {
    pub task_id: TaskId,
    pub methods: Vec<MethodDecision>,
}

impl Validate for TaskMethodDecisions {
    fn validate(&self) -> Result<(), ContractViolation> {
        self.task_id.validate()?;
        if self.methods.is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "task_method_decisions.methods",
                reason: "must not be empty",
            });
        }
        for method in &self.methods {
            method.validate()?;
        }
        Ok(())
    }
}

/// Phase 8 output: tasks in deterministic task-id order, the per-task
/// method decisions aligned one-to-one, and the plan content hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub schema_version: SchemaVersion,
    pub tasks: Vec<ExecutableTask>,
    pub decisions: Vec<TaskMethodDecisions>,
    pub plan_hash: ContentHash,
}

impl ExecutionPlan {
    pub fn v1(
        tasks: Vec<ExecutableTask>,
        decisions: Vec<TaskMethodDecisions>,
        plan_hash: ContentHash,
    ) -> Result<Self, ContractViolation> {
        let p = Self {
            schema_version: PLAN_CONTRACT_VERSION,
            tasks,
            decisions,
            plan_hash,
        };
        p.validate()?;
        Ok(p)
    }
}

impl Validate for ExecutionPlan {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != PLAN_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "execution_plan.schema_version",
                reason: "must match PLAN_CONTRACT_VERSION",
            });
        }
        if self.tasks.is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "execution_plan.tasks",
                reason: "must not be empty",
            });
        }
        if self.tasks.len() != self.decisions.len() {
            return Err(ContractViolation::InvalidValue {
                field: "execution_plan.decisions",
                reason: "must align one-to-one with tasks",
            });
        }
        for window in self.tasks.windows(2) {
            if window[0].task_id() >= window[1].task_id() {
                return Err(ContractViolation::InvalidValue {
                    field: "execution_plan.tasks",
                    reason: "must be strictly sorted by task_id",
                });
            }
        }
        for (task, decisions) in self.tasks.iter().zip(self.decisions.iter()) {
            task.validate()?;
            decisions.validate()?;
            if task.task_id() != &decisions.task_id {
                return Err(ContractViolation::InvalidValue {
                    field: "execution_plan.decisions",
                    reason: "decision rows must follow task order",
                });
            }
        }
        self.plan_hash.validate()
    }
}
