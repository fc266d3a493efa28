use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::DatasetError;
use crate::version;

/// Name of the per-version record written once a fetch has completed.
pub const RECORD_FILE: &str = ".dsfetch.json";

/// Cached datasets laid out as `root/<dataset>/<version>/...`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalStore {
    root: Utf8PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Store rooted at `~/.dsfetch/datasets`.
    pub fn default_root() -> Result<Utf8PathBuf, DatasetError> {
        BaseDirs::new()
            .and_then(|dirs| {
                Utf8PathBuf::from_path_buf(dirs.home_dir().join(".dsfetch").join("datasets")).ok()
            })
            .ok_or_else(|| {
                DatasetError::Filesystem("unable to resolve dataset directory".to_string())
            })
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn folder_path(&self, dataset: &str, version: Option<&str>) -> Utf8PathBuf {
        let folder = self.root.join(dataset);
        match version {
            Some(version) => folder.join(version),
            None => folder,
        }
    }

    pub fn list_datasets(&self) -> Result<BTreeSet<String>, DatasetError> {
        if !self.root.as_std_path().exists() {
            return Ok(BTreeSet::new());
        }
        list_visible(&self.root)
    }

    pub fn list_versions(&self, dataset: &str) -> Result<BTreeSet<String>, DatasetError> {
        let path = self.folder_path(dataset, None);
        if !path.as_std_path().exists() {
            return Err(DatasetError::DatasetNotFound(dataset.to_string()));
        }
        list_visible(&path)
    }

    /// Resolve `selector` against the cached versions of `dataset`.
    pub fn get_folder(
        &self,
        dataset: &str,
        selector: &str,
    ) -> Result<(Utf8PathBuf, String), DatasetError> {
        let versions = self.list_versions(dataset)?;
        let versions = versions.into_iter().collect::<Vec<_>>();
        let resolved = version::resolve(selector, &versions).map_err(|err| match err {
            DatasetError::VersionNotFound(_) => DatasetError::DatasetVersionNotFound {
                name: dataset.to_string(),
                version: selector.to_string(),
            },
            other => other,
        })?;
        Ok((self.folder_path(dataset, Some(&resolved)), resolved))
    }

    /// Remove one cached version; the dataset folder goes too once empty,
    /// unless `keep_dataset_if_empty` is set.
    pub fn delete_version(
        &self,
        dataset: &str,
        version: &str,
        keep_dataset_if_empty: bool,
    ) -> Result<(), DatasetError> {
        if !is_entry_name(dataset) {
            return Err(DatasetError::DatasetNotFound(dataset.to_string()));
        }
        if !is_entry_name(version) {
            return Err(DatasetError::DatasetVersionNotFound {
                name: dataset.to_string(),
                version: version.to_string(),
            });
        }
        let path = self.folder_path(dataset, Some(version));
        fs::remove_dir_all(path.as_std_path()).map_err(|err| {
            if err.kind() == io::ErrorKind::NotFound {
                DatasetError::DatasetVersionNotFound {
                    name: dataset.to_string(),
                    version: version.to_string(),
                }
            } else {
                DatasetError::Filesystem(format!("remove {path}: {err}"))
            }
        })?;
        debug!(dataset, version, "removed cached version");

        if keep_dataset_if_empty {
            return Ok(());
        }
        match self.list_versions(dataset) {
            Ok(remaining) if remaining.is_empty() => {
                let dataset_dir = self.folder_path(dataset, None);
                match fs::remove_dir_all(dataset_dir.as_std_path()) {
                    Ok(()) => Ok(()),
                    Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
                    Err(err) => Err(DatasetError::Filesystem(format!(
                        "remove {dataset_dir}: {err}"
                    ))),
                }
            }
            Ok(_) => Ok(()),
            Err(DatasetError::DatasetNotFound(_)) => Ok(()),
            Err(err) => Err(err),
        }
    }

    pub fn ensure_dataset_dir(&self, dataset: &str) -> Result<Utf8PathBuf, DatasetError> {
        let path = self.folder_path(dataset, None);
        fs::create_dir_all(path.as_std_path())
            .map_err(|err| DatasetError::Filesystem(format!("create {path}: {err}")))?;
        Ok(path)
    }

    pub fn read_record(&self, dataset: &str, version: &str) -> Option<FetchRecord> {
        let path = self.folder_path(dataset, Some(version)).join(RECORD_FILE);
        let content = fs::read_to_string(path.as_std_path()).ok()?;
        serde_json::from_str(&content).ok()
    }

    pub fn write_record(dir: &Utf8Path, record: &FetchRecord) -> Result<(), DatasetError> {
        let path = dir.join(RECORD_FILE);
        let tmp_path = dir.join(format!("{RECORD_FILE}.tmp"));
        let content = serde_json::to_vec_pretty(record)
            .map_err(|err| DatasetError::Filesystem(err.to_string()))?;
        fs::write(tmp_path.as_std_path(), &content)
            .map_err(|err| DatasetError::Filesystem(err.to_string()))?;
        fs::rename(tmp_path.as_std_path(), path.as_std_path())
            .map_err(|err| DatasetError::Filesystem(err.to_string()))?;
        Ok(())
    }
}

/// What was fetched into a version folder, and when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchRecord {
    pub dataset: String,
    pub version: String,
    pub source: String,
    pub files: usize,
    pub downloaded_at: String,
}

/// Dot-prefixed entries and `lost+found` are never datasets or versions.
pub fn is_hidden(name: &str) -> bool {
    name.starts_with('.') || name == "lost+found"
}

/// A single visible path component, usable as a dataset or version folder.
pub fn is_entry_name(name: &str) -> bool {
    let mut components = Utf8Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Utf8Component::Normal(part)), None) if part == name && !is_hidden(part)
    )
}

pub fn remove_hidden<I>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    names.into_iter().filter(|name| !is_hidden(name)).collect()
}

fn list_visible(dir: &Utf8Path) -> Result<BTreeSet<String>, DatasetError> {
    let entries = fs::read_dir(dir.as_std_path())
        .map_err(|err| DatasetError::Filesystem(format!("read {dir}: {err}")))?;
    let mut names = BTreeSet::new();
    for entry in entries {
        let entry = entry.map_err(|err| DatasetError::Filesystem(err.to_string()))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if !is_hidden(&name) {
            names.insert(name);
        }
    }
    Ok(names)
}

/// All regular files below `root`, depth first.
pub fn walk_files(root: &Path) -> Result<Vec<PathBuf>, DatasetError> {
    let mut items = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(path) = stack.pop() {
        let entries =
            fs::read_dir(&path).map_err(|err| DatasetError::Filesystem(err.to_string()))?;
        for entry in entries {
            let entry = entry.map_err(|err| DatasetError::Filesystem(err.to_string()))?;
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else {
                items.push(path);
            }
        }
    }
    items.sort();
    Ok(items)
}

/// Move `from` onto `to`. An existing `to` is parked under a hidden sibling
/// name and only deleted once `from` is in place; it is restored if the
/// move fails.
pub fn atomic_rename_dir(from: &Path, to: &Path) -> io::Result<()> {
    if !to.exists() {
        return fs::rename(from, to);
    }
    let parked = parked_path(to)?;
    if parked.exists() {
        fs::remove_dir_all(&parked)?;
    }
    fs::rename(to, &parked)?;
    if let Err(err) = fs::rename(from, to) {
        if let Err(restore) = fs::rename(&parked, to) {
            warn!(path = %to.display(), error = %restore, "unable to restore previous copy");
        }
        return Err(err);
    }
    if let Err(err) = fs::remove_dir_all(&parked) {
        warn!(path = %parked.display(), error = %err, "unable to remove previous copy");
    }
    Ok(())
}

fn parked_path(to: &Path) -> io::Result<PathBuf> {
    let name = to.file_name().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} has no file name", to.display()),
        )
    })?;
    let mut parked = std::ffi::OsString::from(".");
    parked.push(name);
    parked.push(".previous");
    Ok(to.with_file_name(parked))
}
