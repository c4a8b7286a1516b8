#![forbid(unsafe_code)]

use canon_kernel_contracts::audit::{AuditRowInput, AuditScope, AuditSeverity};
use canon_kernel_contracts::chunk::ChunkId;
use canon_kernel_contracts::question::{PolicyAreaId, QuestionId};
use canon_kernel_contracts::{MonotonicTimeNs, ReasonCodeId};
use canon_storage::AuditLedger;

fn resolution_row(t: u64, chunk: &str, question: &str, count: usize) -> AuditRowInput {
    AuditRowInput::v1(
        MonotonicTimeNs(t),
        AuditSeverity::Info,
        ReasonCodeId(0x5349_0001),
        AuditScope::Pair {
            chunk_id: ChunkId::new(chunk).unwrap(),
            question_id: QuestionId::new(question).unwrap(),
        },
        format!("resolved {count} signal types"),
    )
    .unwrap()
    .with_payload("resolved_count", count.to_string())
}

#[test]
fn at_audit_db_01_rows_commit_in_order_with_scopes_intact() {
    let mut ledger = AuditLedger::new();
    ledger.append(resolution_row(10, "c1", "q1", 3)).unwrap();
    ledger.append(resolution_row(11, "c1", "q2", 2)).unwrap();
    ledger
        .append(
            AuditRowInput::v1(
                MonotonicTimeNs(12),
                AuditSeverity::Warning,
                ReasonCodeId(0x5437_0003),
                AuditScope::PolicyArea {
                    policy_area_id: PolicyAreaId::new("PA02").unwrap(),
                },
                "policy area referenced by 29 tasks, expected 30",
            )
            .unwrap(),
        )
        .unwrap();

    assert_eq!(ledger.len(), 3);
    assert_eq!(ledger.rows()[0].row_id.0, 1);
    assert_eq!(ledger.rows()[2].row_id.0, 3);
    assert_eq!(ledger.warnings().count(), 1);
    assert_eq!(
        ledger.rows()[0].payload.get("resolved_count").map(String::as_str),
        Some("3")
    );
}

#[test]
fn at_audit_db_02_invalid_input_is_rejected_not_committed() {
    let mut ledger = AuditLedger::new();
    let bad = AuditRowInput {
        created_at: MonotonicTimeNs(0),
        severity: AuditSeverity::Info,
        reason_code: ReasonCodeId(0x5349_0001),
        scope: AuditScope::Chunk {
            chunk_id: ChunkId::new("c1").unwrap(),
        },
        message: "timestamp is zero".to_string(),
        payload: Default::default(),
    };
    assert!(ledger.append(bad).is_err());
    assert!(ledger.is_empty());
}
