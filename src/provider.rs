use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::time::Instant;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::{debug, info, warn};

use crate::archive::ArchiveExpander;
use crate::error::DatasetError;
use crate::progress::{NoopProgress, ProgressEvent, ProgressSink};
use crate::providers::Transport;
use crate::store::{FetchRecord, LocalStore, atomic_rename_dir};
use crate::version;

/// Local cache backed by a remote transport. Versions are fetched on
/// demand and served from the cache afterwards.
pub struct RemoteProvider {
    store: LocalStore,
    transport: Box<dyn Transport>,
    expander: ArchiveExpander,
    progress: Box<dyn ProgressSink>,
}

impl fmt::Debug for RemoteProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteProvider")
            .field("root", &self.store.root())
            .field("remote", &self.transport.location())
            .finish()
    }
}

impl RemoteProvider {
    pub fn new(root: impl Into<Utf8PathBuf>, transport: impl Transport + 'static) -> Self {
        Self {
            store: LocalStore::new(root),
            transport: Box::new(transport),
            expander: ArchiveExpander::default(),
            progress: Box::new(NoopProgress),
        }
    }

    pub fn with_progress(mut self, progress: impl ProgressSink + 'static) -> Self {
        self.progress = Box::new(progress);
        self
    }

    pub fn with_expander(mut self, expander: ArchiveExpander) -> Self {
        self.expander = expander;
        self
    }

    pub fn local_store(&self) -> &LocalStore {
        &self.store
    }

    pub fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    pub fn location(&self) -> String {
        self.transport.location()
    }

    /// Resolve `selector` for `name`, fetching the matching remote version
    /// when the cache does not hold it (or when `force_update` is set).
    pub fn get_folder(
        &self,
        name: &str,
        selector: &str,
        force_update: bool,
    ) -> Result<(Utf8PathBuf, String), DatasetError> {
        let local = match self.store.get_folder(name, selector) {
            Ok(found) => Some(found),
            Err(err) if err.is_dataset_not_found() => None,
            Err(err) => return Err(err),
        };

        let remote = self.remote_versions(name);
        if remote.is_none() && local.is_none() {
            return Err(DatasetError::DatasetNotFound(name.to_string()));
        }

        let candidates = remote.unwrap_or_default();
        let remote_version = match version::resolve(selector, &candidates) {
            Ok(resolved) => resolved,
            Err(DatasetError::VersionNotFound(_)) => {
                return match local {
                    Some((path, local_version)) => {
                        warn!(
                            dataset = name,
                            version = %local_version,
                            remote = %self.transport.location(),
                            "remote version unavailable, using local copy which may be outdated"
                        );
                        Ok((path, local_version))
                    }
                    None => Err(DatasetError::DatasetVersionNotFound {
                        name: name.to_string(),
                        version: selector.to_string(),
                    }),
                };
            }
            Err(err) => return Err(err),
        };

        let exact_path = self.store.folder_path(name, Some(&remote_version));
        if !force_update
            && local
                .as_ref()
                .is_some_and(|(local_path, _)| *local_path == exact_path)
        {
            debug!(dataset = name, version = %remote_version, "cache hit");
            return Ok((exact_path, remote_version));
        }

        self.fetch(name, &remote_version, &exact_path)?;
        Ok((exact_path, remote_version))
    }

    /// Versions of `name` on the remote side, or `None` when the remote is
    /// unreachable or does not have the dataset.
    fn remote_versions(&self, name: &str) -> Option<Vec<String>> {
        let location = self.transport.location();
        if !self.transport.is_available() {
            warn!(remote = %location, "remote storage not available");
            return None;
        }
        match self.transport.list_datasets() {
            Ok(datasets) if datasets.iter().any(|dataset| dataset == name) => {}
            Ok(_) => {
                debug!(dataset = name, remote = %location, "dataset not found remotely");
                return None;
            }
            Err(err) => {
                warn!(remote = %location, error = %err, "failed to list remote datasets");
                return None;
            }
        }
        match self.transport.list_versions(name) {
            Ok(versions) => Some(versions),
            Err(err) => {
                warn!(dataset = name, remote = %location, error = %err, "failed to list remote versions");
                None
            }
        }
    }

    fn fetch(&self, name: &str, version: &str, target: &Utf8Path) -> Result<(), DatasetError> {
        let dataset_dir = self.store.folder_path(name, None);
        let created = !dataset_dir.as_std_path().exists();
        let start = Instant::now();
        let result = self.fetch_staged(name, version, target);
        match &result {
            Ok(count) => {
                info!(dataset = name, version, files = count, path = %target, "dataset fetched");
                self.progress.event(
                    ProgressEvent::new(format!("phase=Done; {name} {version}"))
                        .with_elapsed(start.elapsed()),
                );
            }
            Err(err) => {
                warn!(dataset = name, version, error = %err, "fetch failed");
                if created && let Err(err) = fs::remove_dir(dataset_dir.as_std_path()) {
                    debug!(path = %dataset_dir, error = %err, "dataset folder left in place");
                }
            }
        }
        result.map(|_| ())
    }

    /// Download into a hidden staging folder next to `target`, then swap it
    /// into place. `target` is only replaced once every file is in.
    fn fetch_staged(
        &self,
        name: &str,
        version: &str,
        target: &Utf8Path,
    ) -> Result<usize, DatasetError> {
        self.progress.event(ProgressEvent::new(format!(
            "phase=Resolve; listing {name} {version}"
        )));
        let files = self.transport.list_remote_files(name, version)?;
        if let Some(file) = files.iter().find(|file| !file.is_contained()) {
            return Err(DatasetError::Filesystem(format!(
                "remote file {} escapes the dataset folder",
                file.relative_path
            )));
        }

        let dataset_dir = self.store.ensure_dataset_dir(name)?;
        let staging = tempfile::Builder::new()
            .prefix(".staging-")
            .tempdir_in(dataset_dir.as_std_path())
            .map_err(|err| DatasetError::Filesystem(format!("create staging folder: {err}")))?;
        let content = Utf8PathBuf::from_path_buf(staging.path().join(version)).map_err(|path| {
            DatasetError::Filesystem(format!("non-utf8 staging path {}", path.display()))
        })?;
        fs::create_dir_all(content.as_std_path())
            .map_err(|err| DatasetError::Filesystem(format!("create {content}: {err}")))?;

        let total = files.len();
        for (index, file) in files.iter().enumerate() {
            let destination = content.join(&file.relative_path);
            self.progress.event(ProgressEvent::new(format!(
                "phase=Download; [{}/{total}] {}",
                index + 1,
                file.relative_path
            )));
            let start = Instant::now();
            self.transport.download(file, &destination)?;
            self.progress.event(
                ProgressEvent::new(format!("downloaded {}", file.relative_path))
                    .with_elapsed(start.elapsed()),
            );
            if let Some(modifier) = self.expander.expand(&destination)? {
                self.progress.event(ProgressEvent::new(format!(
                    "phase=Extract; {modifier} {}",
                    file.relative_path
                )));
            }
        }

        let record = FetchRecord {
            dataset: name.to_string(),
            version: version.to_string(),
            source: self.transport.location(),
            files: total,
            downloaded_at: chrono::Utc::now().to_rfc3339(),
        };
        LocalStore::write_record(&content, &record)?;

        self.progress
            .event(ProgressEvent::new("phase=Store; moving into cache"));
        atomic_rename_dir(content.as_std_path(), target.as_std_path())
            .map_err(|err| DatasetError::Filesystem(format!("move into {target}: {err}")))?;
        Ok(total)
    }
}

/// Entry point handed out by the settings: either a plain local cache or a
/// cache fed from a remote storage.
#[derive(Debug)]
pub enum Provider {
    Local(LocalStore),
    Remote(RemoteProvider),
}

impl Provider {
    /// Datasets offered by the provider. Remote providers list the remote
    /// side.
    pub fn list_datasets(&self) -> Result<BTreeSet<String>, DatasetError> {
        match self {
            Provider::Local(store) => store.list_datasets(),
            Provider::Remote(remote) => Ok(remote.transport.list_datasets()?.into_iter().collect()),
        }
    }

    pub fn list_versions(&self, dataset: &str) -> Result<BTreeSet<String>, DatasetError> {
        match self {
            Provider::Local(store) => store.list_versions(dataset),
            Provider::Remote(remote) => Ok(remote
                .transport
                .list_versions(dataset)?
                .into_iter()
                .collect()),
        }
    }

    pub fn get_folder(
        &self,
        dataset: &str,
        selector: &str,
        force_update: bool,
    ) -> Result<(Utf8PathBuf, String), DatasetError> {
        match self {
            Provider::Local(store) => store.get_folder(dataset, selector),
            Provider::Remote(remote) => remote.get_folder(dataset, selector, force_update),
        }
    }

    /// Removes a version from the local cache only.
    pub fn delete_version(
        &self,
        dataset: &str,
        version: &str,
        keep_dataset: bool,
    ) -> Result<(), DatasetError> {
        self.local_store()
            .delete_version(dataset, version, keep_dataset)
    }

    pub fn location(&self) -> String {
        match self {
            Provider::Local(store) => store.root().to_string(),
            Provider::Remote(remote) => remote.location(),
        }
    }

    pub fn local_store(&self) -> &LocalStore {
        match self {
            Provider::Local(store) => store,
            Provider::Remote(remote) => remote.local_store(),
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Provider::Remote(_))
    }

    /// Route fetch progress of a remote provider to `progress`.
    pub fn with_progress(self, progress: impl ProgressSink + 'static) -> Self {
        match self {
            Provider::Remote(remote) => Provider::Remote(remote.with_progress(progress)),
            local => local,
        }
    }
}

impl From<LocalStore> for Provider {
    fn from(store: LocalStore) -> Self {
        Provider::Local(store)
    }
}

impl From<RemoteProvider> for Provider {
    fn from(remote: RemoteProvider) -> Self {
        Provider::Remote(remote)
    }
}
