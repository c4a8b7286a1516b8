#![forbid(unsafe_code)]

use std::fs;

use canon_storage::{ArtifactStore, StorageError};

#[test]
fn at_artifact_db_01_put_get_round_trip_by_address() {
    let dir = tempfile::tempdir().unwrap();
    let store = ArtifactStore::open(dir.path()).unwrap();

    let payload = br#"{"schema_version":"1.0.0","tasks":[]}"#;
    let address = store.put(payload).unwrap();
    assert!(store.contains(&address));

    let read_back = store.get(&address).unwrap();
    assert_eq!(read_back, payload);
}

#[test]
fn at_artifact_db_02_identical_content_shares_one_address() {
    let dir = tempfile::tempdir().unwrap();
    let store = ArtifactStore::open(dir.path()).unwrap();

    let a = store.put(b"same bytes").unwrap();
    let b = store.put(b"same bytes").unwrap();
    assert_eq!(a, b);

    let c = store.put(b"other bytes").unwrap();
    assert_ne!(a, c);
}

#[test]
fn at_artifact_db_03_tampered_artifact_fails_read_back() {
    let dir = tempfile::tempdir().unwrap();
    let store = ArtifactStore::open(dir.path()).unwrap();

    let address = store.put(b"original artifact bytes").unwrap();
    let path = dir
        .path()
        .join(&address.as_str()[..2])
        .join(address.as_str());
    fs::write(&path, b"tampered artifact bytes").unwrap();

    match store.get(&address) {
        Err(StorageError::IntegrityMismatch { expected, .. }) => {
            assert_eq!(expected, address.as_str());
        }
        other => panic!("expected IntegrityMismatch, got {other:?}"),
    }
}

#[test]
fn at_artifact_db_04_missing_address_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let store = ArtifactStore::open(dir.path()).unwrap();
    let absent =
        canon_kernel_contracts::chunk::ContentHash::new("ab".repeat(32)).unwrap();
    assert!(matches!(store.get(&absent), Err(StorageError::Io { .. })));
}
