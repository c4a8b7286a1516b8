#![forbid(unsafe_code)]

use std::fmt;

use canon_kernel_contracts::audit::{AuditRow, AuditRowId, AuditRowInput, AuditSeverity};
use canon_kernel_contracts::{ContractViolation, Validate};

#[derive(Debug, Clone, PartialEq)]
pub enum StorageError {
    DuplicateKey { table: &'static str, key: String },
    AppendOnlyViolation { table: &'static str },
    IntegrityMismatch { expected: String, got: String },
    Io { detail: String },
    ContractViolation(ContractViolation),
}

impl From<ContractViolation> for StorageError {
    fn from(v: ContractViolation) -> Self {
        StorageError::ContractViolation(v)
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::DuplicateKey { table, key } => {
                write!(f, "duplicate key {key} in table {table}")
            }
            StorageError::AppendOnlyViolation { table } => {
                write!(f, "append-only violation in table {table}")
            }
            StorageError::IntegrityMismatch { expected, got } => {
                write!(f, "integrity mismatch: expected {expected}, got {got}")
            }
            StorageError::Io { detail } => write!(f, "storage io error: {detail}"),
            StorageError::ContractViolation(v) => write!(f, "{v}"),
        }
    }
}

/// Append-only audit ledger. Row ids are assigned sequentially at commit;
/// committed rows are never mutated or removed.
#[derive(Debug, Clone, Default)]
pub struct AuditLedger {
    rows: Vec<AuditRow>,
}

impl AuditLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, input: AuditRowInput) -> Result<AuditRowId, StorageError> {
        input.validate()?;
        let row_id = AuditRowId(self.rows.len() as u64 + 1);
        let row = AuditRow::from_input_v1(row_id, input)?;
        self.rows.push(row);
        Ok(row_id)
    }

    pub fn append_all(
        &mut self,
        inputs: impl IntoIterator<Item = AuditRowInput>,
    ) -> Result<(), StorageError> {
        for input in inputs {
            self.append(input)?;
        }
        Ok(())
    }

    pub fn rows(&self) -> &[AuditRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn warnings(&self) -> impl Iterator<Item = &AuditRow> {
        self.rows
            .iter()
            .filter(|r| r.severity == AuditSeverity::Warning)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canon_kernel_contracts::audit::AuditScope;
    use canon_kernel_contracts::chunk::ChunkId;
    use canon_kernel_contracts::{MonotonicTimeNs, ReasonCodeId};

    #[test]
    fn at_ledger_01_rows_get_sequential_ids() {
        let mut ledger = AuditLedger::new();
        let scope = AuditScope::Chunk {
            chunk_id: ChunkId::new("c1").unwrap(),
        };
        let first = ledger
            .append(
                AuditRowInput::v1(
                    MonotonicTimeNs(10),
                    AuditSeverity::Info,
                    ReasonCodeId(0x5349_0001),
                    scope.clone(),
                    "resolved 2 signal types",
                )
                .unwrap(),
            )
            .unwrap();
        let second = ledger
            .append(
                AuditRowInput::v1(
                    MonotonicTimeNs(11),
                    AuditSeverity::Warning,
                    ReasonCodeId(0x5437_0002),
                    scope,
                    "chunk referenced by 4 tasks, expected 5",
                )
                .unwrap(),
            )
            .unwrap();
        assert_eq!(first, AuditRowId(1));
        assert_eq!(second, AuditRowId(2));
        assert_eq!(ledger.warnings().count(), 1);
    }
}
