#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::calib::MethodId;
use crate::chunk::ChunkId;
use crate::common::{
    ContractViolation, MonotonicTimeNs, ReasonCodeId, SchemaVersion, Validate,
};
use crate::phase::PhaseId;
use crate::question::{PolicyAreaId, QuestionId};
use crate::task::TaskId;

pub const AUDIT_CONTRACT_VERSION: SchemaVersion = SchemaVersion(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AuditRowId(pub u64);

impl Validate for AuditRowId {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.0 == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "audit_row_id",
                reason: "must be > 0",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditSeverity {
    Info,
    Warning,
    Error,
}

/// What a ledger row is about. Typed scopes keep audit rows queryable
/// without parsing messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum AuditScope {
    Chunk { chunk_id: ChunkId },
    Question { question_id: QuestionId },
    Pair { chunk_id: ChunkId, question_id: QuestionId },
    Task { task_id: TaskId },
    Method { method_id: MethodId },
    PolicyArea { policy_area_id: PolicyAreaId },
    Phase { phase: PhaseId },
}

impl Validate for AuditScope {
    fn validate(&self) -> Result<(), ContractViolation> {
        match self {
            AuditScope::Chunk { chunk_id } => chunk_id.validate(),
            AuditScope::Question { question_id } => question_id.validate(),
            AuditScope::Pair {
                chunk_id,
                question_id,
            } => {
                chunk_id.validate()?;
                question_id.validate()
            }
            AuditScope::Task { task_id } => task_id.validate(),
            AuditScope::Method { method_id } => method_id.validate(),
            AuditScope::PolicyArea { policy_area_id } => policy_area_id.validate(),
            AuditScope::Phase { .. } => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRowInput {
    pub created_at: MonotonicTimeNs,
    pub severity: AuditSeverity,
    pub reason_code: ReasonCodeId,
    pub scope: AuditScope,
    pub message: String,
    #[serde(default)]
    pub payload: BTreeMap<String, String>,
}

impl AuditRowInput {
    pub fn v1(
        created_at: MonotonicTimeNs,
        severity: AuditSeverity,
        reason_code: ReasonCodeId,
        scope: AuditScope,
        message: impl Into<String>,
    ) -> Result<Self, ContractViolation> {
        let input = Self {
            created_at,
            severity,
            reason_code,
            scope,
            message: message.into(),
            payload: BTreeMap::new(),
        };
        input.validate()?;
        Ok(input)
    }

    pub fn with_payload(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }
}

impl Validate for AuditRowInput {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.created_at.0 == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "audit_row_input.created_at",
                reason: "must be > 0",
            });
        }
        if self.reason_code.0 == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "audit_row_input.reason_code",
                reason: "must be > 0",
            });
        }
        self.scope.validate()?;
        if self.message.trim().is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "audit_row_input.message",
                reason: "must not be empty",
            });
        }
        if self.message.len() > 1024 {
            return Err(ContractViolation::InvalidValue {
                field: "audit_row_input.message",
                reason: "must be <= 1024 bytes",
            });
        }
        Ok(())
    }
}

/// A committed ledger row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRow {
    pub schema_version: SchemaVersion,
    pub row_id: AuditRowId,
    pub created_at: MonotonicTimeNs,
    pub severity: AuditSeverity,
    pub reason_code: ReasonCodeId,
    pub scope: AuditScope,
    pub message: String,
    pub payload: BTreeMap<String, String>,
}

impl AuditRow {
    pub fn from_input_v1(
        row_id: AuditRowId,
        input: AuditRowInput,
    ) -> Result<Self, ContractViolation> {
        input.validate()?;
        let row = Self {
            schema_version: AUDIT_CONTRACT_VERSION,
            row_id,
            created_at: input.created_at,
            severity: input.severity,
            reason_code: input.reason_code,
            scope: input.scope,
            message: input.message,
            payload: input.payload,
        };
        row.validate()?;
        Ok(row)
    }
}

impl Validate for AuditRow {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != AUDIT_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "audit_row.schema_version",
                reason: "must match AUDIT_CONTRACT_VERSION",
            });
        }
        self.row_id.validate()?;
        if self.created_at.0 == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "audit_row.created_at",
                reason: "must be > 0",
            });
        }
        if self.reason_code.0 == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "audit_row.reason_code",
                reason: "must be > 0",
            });
        }
        self.scope.validate()?;
        if self.message.trim().is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "audit_row.message",
                reason: "must not be empty",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn at_audit_01_input_requires_message_and_reason_code() {
        let scope = AuditScope::Chunk {
            chunk_id: ChunkId::new("c1").unwrap(),
        };
        assert!(AuditRowInput::v1(
            MonotonicTimeNs(1),
            AuditSeverity::Info,
            ReasonCodeId(0x5349_0001),
            scope.clone(),
            "resolved 3 signal types",
        )
        .is_ok());
        assert!(AuditRowInput::v1(
            MonotonicTimeNs(1),
            AuditSeverity::Info,
            ReasonCodeId(0),
            scope,
            "resolved 3 signal types",
        )
        .is_err());
    }
}
