use std::fs;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use dsfetch::dataset::{Dataset, PATH_MODE};
use dsfetch::error::DatasetError;
use dsfetch::provider::Provider;
use dsfetch::store::LocalStore;

fn local_provider() -> (tempfile::TempDir, Provider) {
    let dir = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
    for version in ["3.0.0", "3.0.1"] {
        let folder = root.join("blink").join(version);
        fs::create_dir_all(&folder).unwrap();
        fs::write(folder.join("labels.csv"), format!("version,{version}\n")).unwrap();
        fs::write(folder.join(".dsfetch.json"), "{}").unwrap();
    }
    (dir, Provider::Local(LocalStore::new(root)))
}

#[test]
fn path_mode_returns_latest_folder() {
    let (_dir, provider) = local_provider();
    let dataset: Dataset<Utf8PathBuf> = Dataset::new("blink", None);

    assert_eq!(dataset.version(), "latest");
    assert_eq!(dataset.default_mode(), PATH_MODE);
    assert_eq!(dataset.available_modes(), vec!["path"]);

    let path = dataset.load(&provider, None, false).unwrap();
    assert!(path.ends_with("blink/3.0.1"));
}

#[test]
fn custom_modes_receive_the_folder() {
    let (_dir, provider) = local_provider();
    let dataset: Dataset<String> = Dataset::new("blink", Some("3.0.0"))
        .with_mode("labels", |path| {
            fs::read_to_string(path.join("labels.csv"))
                .map_err(|err| DatasetError::Filesystem(err.to_string()))
        })
        .with_default_mode("labels");

    assert_eq!(dataset.available_modes(), vec!["labels", "path"]);
    assert_eq!(dataset.load(&provider, None, false).unwrap(), "version,3.0.0\n");
    assert!(
        dataset
            .load(&provider, Some(PATH_MODE), false)
            .unwrap()
            .ends_with("3.0.0")
    );
}

#[test]
fn single_file_datasets_hand_over_the_file() {
    let (_dir, provider) = local_provider();
    let dataset: Dataset<Utf8PathBuf> = Dataset::new("blink", None).single_file();

    let path = dataset.load(&provider, None, false).unwrap();
    assert_eq!(path.file_name(), Some("labels.csv"));
}

#[test]
fn unknown_mode_fails_before_lookup() {
    let (_dir, provider) = local_provider();
    let dataset: Dataset<Utf8PathBuf> = Dataset::new("unknown", None);

    assert_matches!(
        dataset.load(&provider, Some("tensorflow"), false),
        Err(DatasetError::InvalidMode { dataset, mode }) if dataset == "unknown" && mode == "tensorflow"
    );
    assert_matches!(
        dataset.load(&provider, None, false),
        Err(DatasetError::DatasetNotFound(_))
    );
}

#[test]
fn bare_dataset_has_no_modes() {
    let (_dir, provider) = local_provider();
    let dataset: Dataset<usize> = Dataset::bare("blink", None);
    assert!(dataset.available_modes().is_empty());
    assert_matches!(
        dataset.load(&provider, None, false),
        Err(DatasetError::InvalidMode { .. })
    );
}
