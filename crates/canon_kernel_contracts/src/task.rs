#![forbid(unsafe_code)]

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::chunk::{ChunkId, ExpectedElements};
use crate::common::{ContractViolation, MonotonicTimeNs, SchemaVersion, Validate};
use crate::question::{Pattern, PolicyAreaId, QuestionGlobal, QuestionId};
use crate::signal::Signal;

pub const TASK_CONTRACT_VERSION: SchemaVersion = SchemaVersion(1);

/// Deterministic task identity: `{question_global:03}-{policy_area_id}`.
/// Never randomly generated; equal inputs always derive the same id.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct TaskId(String);

impl TaskId {
    pub fn derive(question_global: QuestionGlobal, policy_area_id: &PolicyAreaId) -> Self {
        Self(format!(
            "{:03}-{}",
            question_global.value(),
            policy_area_id.as_str()
        ))
    }

    pub fn new(id: impl Into<String>) -> Result<Self, ContractViolation> {
        let id = id.into();
        let t = Self(id);
        t.validate()?;
        Ok(t)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Validate for TaskId {
    fn validate(&self) -> Result<(), ContractViolation> {
        let mut parts = self.0.splitn(2, '-');
        let ordinal = parts.next().unwrap_or("");
        let area = parts.next().unwrap_or("");
        if ordinal.len() != 3 || !ordinal.chars().all(|c| c.is_ascii_digit()) {
            return Err(ContractViolation::InvalidValue {
                field: "task_id",
                reason: "must start with a zero-padded 3-digit question ordinal",
            });
        }
        if ordinal == "000" {
            return Err(ContractViolation::InvalidValue {
                field: "task_id",
                reason: "question ordinal must be > 0",
            });
        }
        if area.is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "task_id",
                reason: "must carry a policy area suffix",
            });
        }
        Ok(())
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for TaskId {
    type Error = ContractViolation;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TaskId> for String {
    fn from(id: TaskId) -> String {
        id.0
    }
}

/// One executable unit of question scoring: a question matched to its
/// chunk, with the patterns filtered to the task's own policy area and the
/// resolved signal sequence. Constructed once by the planner, immutable
/// after.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutableTask {
    schema_version: SchemaVersion,
    task_id: TaskId,
    question_id: QuestionId,
    chunk_id: ChunkId,
    patterns: Vec<Pattern>,
    signals: Vec<Signal>,
    creation_timestamp: MonotonicTimeNs,
    expected_elements: ExpectedElements,
}

impl ExecutableTask {
    #[allow(clippy::too_many_arguments)]
    pub fn v1(
        task_id: TaskId,
        question_id: QuestionId,
        chunk_id: ChunkId,
        patterns: Vec<Pattern>,
        signals: Vec<Signal>,
        creation_timestamp: MonotonicTimeNs,
        expected_elements: ExpectedElements,
    ) -> Result<Self, ContractViolation> {
        let t = Self {
            schema_version: TASK_CONTRACT_VERSION,
            task_id,
            question_id,
            chunk_id,
            patterns,
            signals,
            creation_timestamp,
            expected_elements,
        };
        t.validate()?;
        Ok(t)
    }

    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    pub fn question_id(&self) -> &QuestionId {
        &self.question_id
    }

    pub fn chunk_id(&self) -> &ChunkId {
        &self.chunk_id
    }

    pub fn patterns(&self) -> &[Pattern] {
        &self.patterns
    }

    pub fn signals(&self) -> &[Signal] {
        &self.signals
    }

    pub fn creation_timestamp(&self) -> MonotonicTimeNs {
        self.creation_timestamp
    }

    pub fn expected_elements(&self) -> &ExpectedElements {
        &self.expected_elements
    }
}

impl Validate for ExecutableTask {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != TASK_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "executable_task.schema_version",
                reason: "must match TASK_CONTRACT_VERSION",
            });
        }
        self.task_id.validate()?;
        self.question_id.validate()?;
        self.chunk_id.validate()?;
        for pattern in &self.patterns {
            pattern.validate()?;
            // Patterns reach a task only through the policy-area filter.
            if pattern.policy_area_id.is_none() {
                return Err(ContractViolation::InvalidValue {
                    field: "executable_task.patterns",
                    reason: "must all carry policy_area_id after filtering",
                });
            }
        }
        for signal in &self.signals {
            signal.validate()?;
        }
        if self.creation_timestamp.0 == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "executable_task.creation_timestamp",
                reason: "must be > 0",
            });
        }
        self.expected_elements.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn at_task_01_id_derivation_is_deterministic_and_zero_padded() {
        let global = QuestionGlobal::new(7).unwrap();
        let area = PolicyAreaId::new("PA03").unwrap();
        let a = TaskId::derive(global, &area);
        let b = TaskId::derive(global, &area);
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "007-PA03");
    }

    #[test]
    fn at_task_02_id_format_is_validated() {
        assert!(TaskId::new("007-PA03").is_ok());
        assert!(TaskId::new("7-PA03").is_err());
        assert!(TaskId::new("000-PA03").is_err());
        assert!(TaskId::new("007-").is_err());
        assert!(TaskId::new("abc-PA03").is_err());
    }

    #[test]
    fn at_task_03_unfiltered_pattern_rejected() {
        let task = ExecutableTask::v1(
            TaskId::new("001-PA01").unwrap(),
            QuestionId::new("q1").unwrap(),
            ChunkId::new("c1").unwrap(),
            vec![Pattern::v1(
                crate::question::PatternId::new("p1").unwrap(),
                None,
                "budget",
            )
            .unwrap()],
            vec![],
            MonotonicTimeNs(10),
            ExpectedElements::default(),
        );
        assert!(task.is_err());
    }
}
