use std::fs;

use camino::{Utf8Path, Utf8PathBuf};

use crate::error::DatasetError;
use crate::providers::{RemoteFile, Transport, create_parent};
use crate::store::{LocalStore, is_hidden, walk_files};

/// Copies datasets from another directory tree with the cache layout,
/// typically a network-mounted disk.
#[derive(Debug, Clone)]
pub struct MirrorTransport {
    source: LocalStore,
}

impl MirrorTransport {
    pub fn new(source: impl Into<Utf8PathBuf>) -> Self {
        Self {
            source: LocalStore::new(source),
        }
    }

    pub fn source(&self) -> &Utf8Path {
        self.source.root()
    }
}

impl Transport for MirrorTransport {
    fn location(&self) -> String {
        self.source.root().to_string()
    }

    fn is_available(&self) -> bool {
        self.source.root().as_std_path().is_dir()
    }

    fn list_datasets(&self) -> Result<Vec<String>, DatasetError> {
        Ok(self.source.list_datasets()?.into_iter().collect())
    }

    fn list_versions(&self, dataset: &str) -> Result<Vec<String>, DatasetError> {
        Ok(self.source.list_versions(dataset)?.into_iter().collect())
    }

    fn list_remote_files(
        &self,
        dataset: &str,
        version: &str,
    ) -> Result<Vec<RemoteFile>, DatasetError> {
        let version_dir = self.source.folder_path(dataset, Some(version));
        if !version_dir.as_std_path().is_dir() {
            return Err(DatasetError::DatasetVersionNotFound {
                name: dataset.to_string(),
                version: version.to_string(),
            });
        }
        let mut files = Vec::new();
        for path in walk_files(version_dir.as_std_path())? {
            let path = Utf8PathBuf::from_path_buf(path).map_err(|path| {
                DatasetError::Filesystem(format!("non-utf8 file path {}", path.display()))
            })?;
            let relative = path
                .strip_prefix(&version_dir)
                .map_err(|err| DatasetError::Filesystem(err.to_string()))?
                .to_path_buf();
            if relative.components().any(|part| is_hidden(part.as_str())) {
                continue;
            }
            let size = fs::metadata(path.as_std_path())
                .map_err(|err| DatasetError::Filesystem(format!("stat {path}: {err}")))?
                .len();
            files.push(RemoteFile::new(relative, path.as_str()).with_size(size));
        }
        Ok(files)
    }

    fn download(&self, file: &RemoteFile, destination: &Utf8Path) -> Result<(), DatasetError> {
        create_parent(destination)?;
        fs::copy(&file.source, destination.as_std_path()).map_err(|err| {
            DatasetError::Filesystem(format!("copy {} to {destination}: {err}", file.source))
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hidden_source_files_are_not_listed() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let version_dir = root.join("foo/1.0.0");
        for relative in ["data.txt", ".DS_Store", ".git/config", "images/.cache/x", "images/a.png"] {
            let path = version_dir.join(relative);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, "x").unwrap();
        }

        let transport = MirrorTransport::new(root.clone());
        assert_eq!(transport.source(), root.as_path());
        let listed = transport
            .list_remote_files("foo", "1.0.0")
            .unwrap()
            .into_iter()
            .map(|file| file.relative_path.to_string())
            .collect::<Vec<_>>();
        assert_eq!(listed, vec!["data.txt".to_string(), "images/a.png".to_string()]);
    }
}
