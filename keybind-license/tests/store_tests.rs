use keybind_license::{
    LicenseRecord, MemoryStore, Precondition, RecordStore, Revision, Snapshot, StoreError,
};

#[tokio::test]
async fn unopened_store_is_unavailable() {
    let store = MemoryStore::with_records(vec![LicenseRecord::issue("K", 30)]);
    assert!(store.get_all().await.is_unavailable());
    let err = store.replace_all(&[], Precondition::Any).await.unwrap_err();
    assert!(matches!(err, StoreError::Closed));
}

#[tokio::test]
async fn missing_collection_reads_empty_without_revision() {
    let store = MemoryStore::new();
    store.open().await.unwrap();
    assert_eq!(store.get_all().await, Snapshot::empty());
}

#[tokio::test]
async fn replace_advances_revision() {
    let store = MemoryStore::new();
    store.open().await.unwrap();

    let rev1 = store
        .replace_all(&[LicenseRecord::issue("A", 30)], Precondition::Absent)
        .await
        .unwrap();
    let Snapshot::Loaded { records, revision } = store.get_all().await else {
        panic!("expected a loaded snapshot");
    };
    assert_eq!(records.len(), 1);
    assert_eq!(revision, Some(rev1.clone()));

    let rev2 = store
        .replace_all(&[], Precondition::Matches(rev1.clone()))
        .await
        .unwrap();
    assert_ne!(rev1, rev2);
}

#[tokio::test]
async fn stale_revision_conflicts() {
    let store = MemoryStore::with_records(Vec::new());
    store.open().await.unwrap();
    let Snapshot::Loaded { revision, .. } = store.get_all().await else {
        panic!("expected a loaded snapshot");
    };
    let observed = Precondition::observed(revision.as_ref());

    store.replace_all(&[LicenseRecord::issue("X", 1)], Precondition::Any).await.unwrap();

    let err = store.replace_all(&[], observed).await.unwrap_err();
    assert!(err.is_conflict());
    assert_eq!(store.records().await, vec![LicenseRecord::issue("X", 1)]);
}

#[tokio::test]
async fn absent_precondition_fails_on_existing_collection() {
    let store = MemoryStore::with_records(Vec::new());
    store.open().await.unwrap();
    assert!(store.replace_all(&[], Precondition::Absent).await.unwrap_err().is_conflict());
}

#[tokio::test]
async fn close_then_reopen() {
    let store = MemoryStore::with_records(vec![LicenseRecord::issue("K", 30)]);
    store.open().await.unwrap();
    store.close().await.unwrap();
    assert!(store.get_all().await.is_unavailable());
    store.open().await.unwrap();
    assert_eq!(store.get_all().await.records().len(), 1);
}

#[test]
fn precondition_checks() {
    let a = Revision::new("a");
    let b = Revision::new("b");
    assert!(Precondition::Any.check(Some(&a)).is_ok());
    assert!(Precondition::Any.check(None).is_ok());
    assert!(Precondition::Absent.check(None).is_ok());
    assert!(Precondition::Absent.check(Some(&a)).is_err());
    assert!(Precondition::Matches(a.clone()).check(Some(&a)).is_ok());
    assert!(Precondition::Matches(a.clone()).check(Some(&b)).is_err());
    assert!(Precondition::Matches(a).check(None).is_err());
}

#[test]
fn digest_revision_is_content_addressed() {
    assert_eq!(Revision::digest(b"[]"), Revision::digest(b"[]"));
    assert_ne!(Revision::digest(b"[]"), Revision::digest(b"[{}]"));
}
