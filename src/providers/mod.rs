pub mod ftp;
pub mod http;
pub mod mirror;
pub mod webdav;

use std::fs::{self, File};
use std::time::Duration;

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};

use crate::error::DatasetError;

pub use ftp::FtpTransport;
pub use http::HttpTransport;
pub use mirror::MirrorTransport;
pub use webdav::WebDavTransport;

/// Default version reported by single-dataset transports.
pub const DEFAULT_SINGLE_VERSION: &str = "1.0.0";

/// One file to fetch for a dataset version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    /// Destination relative to the version folder.
    pub relative_path: Utf8PathBuf,
    /// Transport-specific locator (absolute path, URL, FTP path).
    pub source: String,
    pub size: Option<u64>,
}

impl RemoteFile {
    pub fn new(relative_path: impl Into<Utf8PathBuf>, source: impl Into<String>) -> Self {
        Self {
            relative_path: relative_path.into(),
            source: source.into(),
            size: None,
        }
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    /// Relative paths must stay inside the version folder.
    pub fn is_contained(&self) -> bool {
        !self.relative_path.as_str().is_empty()
            && self
                .relative_path
                .components()
                .all(|component| matches!(component, Utf8Component::Normal(_)))
    }
}

/// Remote storage holding datasets in `<dataset>/<version>/...` form.
pub trait Transport: Send + Sync {
    /// Human-readable remote location, for listings and logs.
    fn location(&self) -> String;

    /// Cheap reachability probe; connectivity failures yield `false`.
    fn is_available(&self) -> bool;

    fn list_datasets(&self) -> Result<Vec<String>, DatasetError>;

    fn list_versions(&self, dataset: &str) -> Result<Vec<String>, DatasetError>;

    fn list_remote_files(
        &self,
        dataset: &str,
        version: &str,
    ) -> Result<Vec<RemoteFile>, DatasetError>;

    /// Stream `file` to `destination`, creating parent directories.
    fn download(&self, file: &RemoteFile, destination: &Utf8Path) -> Result<(), DatasetError>;
}

impl Transport for Box<dyn Transport> {
    fn location(&self) -> String {
        (**self).location()
    }

    fn is_available(&self) -> bool {
        (**self).is_available()
    }

    fn list_datasets(&self) -> Result<Vec<String>, DatasetError> {
        (**self).list_datasets()
    }

    fn list_versions(&self, dataset: &str) -> Result<Vec<String>, DatasetError> {
        (**self).list_versions(dataset)
    }

    fn list_remote_files(
        &self,
        dataset: &str,
        version: &str,
    ) -> Result<Vec<RemoteFile>, DatasetError> {
        (**self).list_remote_files(dataset, version)
    }

    fn download(&self, file: &RemoteFile, destination: &Utf8Path) -> Result<(), DatasetError> {
        (**self).download(file, destination)
    }
}

/// Fixed listing for backends that serve exactly one dataset version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SingleDataset {
    pub name: String,
    pub version: String,
}

impl SingleDataset {
    pub fn new(name: impl Into<String>, version: Option<String>) -> Self {
        Self {
            name: name.into(),
            version: version.unwrap_or_else(|| DEFAULT_SINGLE_VERSION.to_string()),
        }
    }

    pub fn list_datasets(&self) -> Vec<String> {
        vec![self.name.clone()]
    }

    pub fn list_versions(&self, dataset: &str) -> Result<Vec<String>, DatasetError> {
        if dataset != self.name {
            return Err(DatasetError::DatasetNotFound(dataset.to_string()));
        }
        Ok(vec![self.version.clone()])
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Blocking client shared by the HTTP-based transports. Only the connect
/// phase is bounded.
pub(crate) fn http_client() -> Result<Client, DatasetError> {
    let mut headers = HeaderMap::new();
    headers.insert(
        USER_AGENT,
        HeaderValue::from_str(&format!("dsfetch/{}", env!("CARGO_PKG_VERSION")))
            .map_err(|err| DatasetError::Http(err.to_string()))?,
    );
    Client::builder()
        .default_headers(headers)
        .connect_timeout(Duration::from_secs(30))
        .timeout(None::<Duration>)
        .build()
        .map_err(|err| DatasetError::Http(err.to_string()))
}

pub(crate) fn create_parent(destination: &Utf8Path) -> Result<(), DatasetError> {
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| DatasetError::Filesystem(format!("create {parent}: {err}")))?;
    }
    Ok(())
}

pub(crate) fn write_response_to_file(
    mut response: Response,
    destination: &Utf8Path,
) -> Result<u64, DatasetError> {
    if !response.status().is_success() {
        let status = response.status().as_u16();
        let message = response
            .text()
            .unwrap_or_else(|_| "request failed".to_string());
        return Err(DatasetError::HttpStatus { status, message });
    }
    create_parent(destination)?;
    let mut file = File::create(destination.as_std_path())
        .map_err(|err| DatasetError::Filesystem(format!("create {destination}: {err}")))?;
    std::io::copy(&mut response, &mut file).map_err(|err| DatasetError::Http(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contained_relative_paths() {
        assert!(RemoteFile::new("a/b.zip", "x").is_contained());
        assert!(!RemoteFile::new("../b.zip", "x").is_contained());
        assert!(!RemoteFile::new("/etc/passwd", "x").is_contained());
        assert!(!RemoteFile::new("", "x").is_contained());
    }

    #[test]
    fn single_dataset_listing() {
        let single = SingleDataset::new("eurosat", None);
        assert_eq!(single.list_datasets(), vec!["eurosat".to_string()]);
        assert_eq!(single.list_versions("eurosat").unwrap(), vec!["1.0.0".to_string()]);
        assert!(single.list_versions("other").is_err());
    }

    #[test]
    fn credentials_debug_hides_password() {
        let creds = Credentials::new("user", "secret");
        assert!(!format!("{creds:?}").contains("secret"));
    }
}
