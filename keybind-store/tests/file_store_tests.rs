use keybind_license::{LicenseRecord, Precondition, RecordStore, Snapshot, StoreError};
use keybind_store::FileStore;
use pretty_assertions::assert_eq;
use tempfile::TempDir;

fn dir_entries(dir: &TempDir) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

async fn open_store(dir: &TempDir) -> FileStore {
    let store = FileStore::new(dir.path().join("licenses.json"));
    store.open().await.unwrap();
    store
}

#[tokio::test]
async fn missing_file_reads_as_empty_collection() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;
    assert_eq!(store.get_all().await, Snapshot::empty());
}

#[tokio::test]
async fn open_creates_parent_directories() {
    let dir = TempDir::new().unwrap();
    let store = FileStore::new(dir.path().join("nested/deeper/licenses.json"));
    store.open().await.unwrap();
    assert!(dir.path().join("nested/deeper").is_dir());
}

#[tokio::test]
async fn closed_store_refuses_io() {
    let dir = TempDir::new().unwrap();
    let store = FileStore::new(dir.path().join("licenses.json"));
    assert!(store.get_all().await.is_unavailable());
    let err = store.replace_all(&[], Precondition::Any).await.unwrap_err();
    assert!(matches!(err, StoreError::Closed));
}

#[tokio::test]
async fn write_then_read_back() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;
    let records = vec![LicenseRecord::issue("K1", 30), LicenseRecord::issue("K2", 7)];

    let revision = store.replace_all(&records, Precondition::Absent).await.unwrap();
    let Snapshot::Loaded { records: loaded, revision: read_rev } = store.get_all().await else {
        panic!("expected a loaded snapshot");
    };
    assert_eq!(loaded, records);
    assert_eq!(read_rev, Some(revision));
    assert_eq!(dir_entries(&dir), vec!["licenses.json".to_string()]);
}

#[tokio::test]
async fn legacy_file_is_normalized_on_read() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("licenses.json");
    std::fs::write(
        &path,
        r#"[{"key": "OLD", "duration_days": 30, "activated_on": null}]"#,
    )
    .unwrap();
    let store = FileStore::new(&path);
    store.open().await.unwrap();

    assert_eq!(store.get_all().await.records(), &[LicenseRecord::issue("OLD", 30)]);
}

#[tokio::test]
async fn out_of_band_edit_causes_conflict() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;
    store.replace_all(&[LicenseRecord::issue("K1", 30)], Precondition::Any).await.unwrap();

    let Snapshot::Loaded { revision, .. } = store.get_all().await else {
        panic!("expected a loaded snapshot");
    };

    // Another process rewrites the file.
    std::fs::write(store.path(), r#"[{"key": "OTHER"}]"#).unwrap();

    let err = store
        .replace_all(&[], Precondition::observed(revision.as_ref()))
        .await
        .unwrap_err();
    assert!(err.is_conflict());
    assert_eq!(store.get_all().await.records()[0].key, "OTHER");
}

#[tokio::test]
async fn corrupt_file_is_unavailable_and_untouched() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("licenses.json");
    std::fs::write(&path, "{ definitely not a collection").unwrap();
    let store = FileStore::new(&path);
    store.open().await.unwrap();

    assert!(store.get_all().await.is_unavailable());
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "{ definitely not a collection");
}

#[tokio::test]
async fn written_file_is_pretty_json_array() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;
    store.replace_all(&[LicenseRecord::issue("K1", 30)], Precondition::Any).await.unwrap();

    let text = std::fs::read_to_string(store.path()).unwrap();
    assert!(text.starts_with("[\n"));
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(value[0]["key"], "K1");
    assert_eq!(value[0]["device_hash"], "");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn independent_writers_never_share_a_temp_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("licenses.json");

    // Separate instances stand in for separate processes: no shared lock.
    let mut handles = Vec::new();
    for writer in 0..8 {
        let path = path.clone();
        handles.push(tokio::spawn(async move {
            let store = FileStore::new(path);
            store.open().await.unwrap();
            let records: Vec<LicenseRecord> = (0..50)
                .map(|i| LicenseRecord::issue(format!("W{writer}-K{i}"), 30))
                .collect();
            for _ in 0..5 {
                store.replace_all(&records, Precondition::Any).await.unwrap();
            }
            records
        }));
    }
    let mut written = Vec::new();
    for handle in handles {
        written.push(handle.await.unwrap());
    }

    let store = FileStore::new(&path);
    store.open().await.unwrap();
    let Snapshot::Loaded { records, .. } = store.get_all().await else {
        panic!("expected an intact collection");
    };
    assert!(written.contains(&records));
    assert_eq!(dir_entries(&dir), vec!["licenses.json".to_string()]);
}
