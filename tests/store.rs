use std::collections::BTreeSet;
use std::fs;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use dsfetch::error::DatasetError;
use dsfetch::store::{FetchRecord, LocalStore, atomic_rename_dir, walk_files};

fn store() -> (tempfile::TempDir, LocalStore) {
    let dir = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(dir.path().join("datasets")).unwrap();
    (dir, LocalStore::new(root))
}

fn make_version(store: &LocalStore, dataset: &str, version: &str) {
    let path = store.folder_path(dataset, Some(version));
    fs::create_dir_all(&path).unwrap();
    fs::write(path.join("data.txt"), dataset).unwrap();
}

fn set(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|item| item.to_string()).collect()
}

#[test]
fn missing_root_lists_nothing() {
    let (_dir, store) = store();
    assert!(store.list_datasets().unwrap().is_empty());
    assert_matches!(
        store.list_versions("blink"),
        Err(DatasetError::DatasetNotFound(name)) if name == "blink"
    );
}

#[test]
fn listings_skip_hidden_entries() {
    let (_dir, store) = store();
    make_version(&store, "blink", "3.0.1");
    make_version(&store, "blink", "3.0.0");
    make_version(&store, "acas", "1.0.0");
    fs::create_dir_all(store.root().join(".git")).unwrap();
    fs::create_dir_all(store.root().join("blink/.staging-x1")).unwrap();
    fs::create_dir_all(store.root().join("lost+found")).unwrap();

    assert_eq!(store.list_datasets().unwrap(), set(&["acas", "blink"]));
    assert_eq!(store.list_versions("blink").unwrap(), set(&["3.0.0", "3.0.1"]));
    // Listing twice yields the same answer.
    assert_eq!(store.list_datasets().unwrap(), set(&["acas", "blink"]));
}

#[test]
fn get_folder_resolves_selectors() {
    let (_dir, store) = store();
    for version in ["1.0.2", "1.4.5", "2.3.5"] {
        make_version(&store, "blink", version);
    }

    let (path, version) = store.get_folder("blink", "latest").unwrap();
    assert_eq!(version, "2.3.5");
    assert_eq!(path, store.root().join("blink/2.3.5"));

    assert_eq!(store.get_folder("blink", "1.*").unwrap().1, "1.4.5");
    assert_matches!(
        store.get_folder("blink", "3.1.*"),
        Err(DatasetError::DatasetVersionNotFound { name, version })
            if name == "blink" && version == "3.1.*"
    );
    assert_matches!(
        store.get_folder("acas", "latest"),
        Err(DatasetError::DatasetNotFound(_))
    );
}

#[test]
fn delete_last_version_removes_dataset() {
    let (_dir, store) = store();
    make_version(&store, "blink", "1.0.0");
    make_version(&store, "blink", "2.0.0");

    store.delete_version("blink", "1.0.0", false).unwrap();
    assert_eq!(store.list_versions("blink").unwrap(), set(&["2.0.0"]));

    store.delete_version("blink", "2.0.0", false).unwrap();
    assert!(!store.folder_path("blink", None).exists());
    assert!(store.list_datasets().unwrap().is_empty());
}

#[test]
fn delete_can_keep_empty_dataset() {
    let (_dir, store) = store();
    make_version(&store, "blink", "1.0.0");

    store.delete_version("blink", "1.0.0", true).unwrap();
    assert!(store.folder_path("blink", None).exists());
    assert!(store.list_versions("blink").unwrap().is_empty());
}

#[test]
fn delete_missing_version_fails() {
    let (_dir, store) = store();
    make_version(&store, "blink", "1.0.0");
    assert_matches!(
        store.delete_version("blink", "9.9.9", false),
        Err(DatasetError::DatasetVersionNotFound { .. })
    );
}

#[test]
fn records_round_trip_through_version_folder() {
    let (_dir, store) = store();
    make_version(&store, "blink", "1.0.0");
    assert!(store.read_record("blink", "1.0.0").is_none());

    let record = FetchRecord {
        dataset: "blink".to_string(),
        version: "1.0.0".to_string(),
        source: "https://example.org/dav/".to_string(),
        files: 3,
        downloaded_at: "2026-01-01T00:00:00+00:00".to_string(),
    };
    LocalStore::write_record(&store.folder_path("blink", Some("1.0.0")), &record).unwrap();
    assert_eq!(store.read_record("blink", "1.0.0"), Some(record));
}

#[test]
fn atomic_rename_replaces_target() {
    let dir = tempfile::tempdir().unwrap();
    let from = dir.path().join("staging");
    let to = dir.path().join("final");
    fs::create_dir_all(from.join("sub")).unwrap();
    fs::write(from.join("sub/new.txt"), "new").unwrap();
    fs::create_dir_all(&to).unwrap();
    fs::write(to.join("old.txt"), "old").unwrap();

    atomic_rename_dir(&from, &to).unwrap();

    assert!(!from.exists());
    assert!(!to.join("old.txt").exists());
    assert!(!dir.path().join(".final.previous").exists());
    let files = walk_files(&to).unwrap();
    assert_eq!(files, vec![to.join("sub/new.txt")]);
}

#[test]
fn delete_rejects_names_outside_one_folder() {
    let (_dir, store) = store();
    make_version(&store, "foo", "1.0.0");
    make_version(&store, "foo", "2.0.0");
    make_version(&store, "bar", "1.0.0");

    for version in ["..", "", ".", "1.0.0/..", "../bar/1.0.0", ".staging-x"] {
        assert_matches!(
            store.delete_version("foo", version, true),
            Err(DatasetError::DatasetVersionNotFound { .. }),
            "{version:?}"
        );
    }
    for dataset in ["..", "", "foo/..", ".git"] {
        assert_matches!(
            store.delete_version(dataset, "1.0.0", false),
            Err(DatasetError::DatasetNotFound(_)),
            "{dataset:?}"
        );
    }

    assert_eq!(store.list_datasets().unwrap(), set(&["bar", "foo"]));
    assert_eq!(store.list_versions("foo").unwrap(), set(&["1.0.0", "2.0.0"]));
    assert_eq!(store.list_versions("bar").unwrap(), set(&["1.0.0"]));
}

#[test]
fn failed_rename_restores_previous_copy() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("staging");
    let to = dir.path().join("final");
    fs::create_dir_all(&to).unwrap();
    fs::write(to.join("old.txt"), "old").unwrap();

    assert!(atomic_rename_dir(&missing, &to).is_err());

    assert_eq!(fs::read_to_string(to.join("old.txt")).unwrap(), "old");
    let names = fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().into_string().unwrap())
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["final".to_string()]);
}
