use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum DatasetError {
    #[error("dataset {0} not found")]
    DatasetNotFound(String),

    #[error("dataset {name} for version {version} not found")]
    DatasetVersionNotFound { name: String, version: String },

    #[error("no version matching {0} found")]
    VersionNotFound(String),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("failed to read settings file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse settings: {0}")]
    ConfigParse(String),

    #[error("mode {mode} not available for dataset {dataset}")]
    InvalidMode { dataset: String, mode: String },

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("archive extraction failed: {0}")]
    Archive(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("HTTP server returned status {status}: {message}")]
    HttpStatus { status: u16, message: String },

    #[error("WebDAV request failed: {0}")]
    WebDav(String),

    #[error("FTP request failed: {0}")]
    Ftp(String),
}

impl DatasetError {
    /// True for both dataset-level not-found variants.
    pub fn is_dataset_not_found(&self) -> bool {
        matches!(
            self,
            DatasetError::DatasetNotFound(_) | DatasetError::DatasetVersionNotFound { .. }
        )
    }

    pub fn is_version_not_found(&self) -> bool {
        matches!(
            self,
            DatasetError::VersionNotFound(_) | DatasetError::DatasetVersionNotFound { .. }
        )
    }

    /// Failures talking to a remote backend, as opposed to lookups or local I/O.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            DatasetError::Http(_)
                | DatasetError::HttpStatus { .. }
                | DatasetError::WebDav(_)
                | DatasetError::Ftp(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dataset_version_not_found_is_both_kinds() {
        let err = DatasetError::DatasetVersionNotFound {
            name: "foo".to_string(),
            version: "9.9.9".to_string(),
        };
        assert!(err.is_dataset_not_found());
        assert!(err.is_version_not_found());
        assert_eq!(err.to_string(), "dataset foo for version 9.9.9 not found");

        assert!(!DatasetError::VersionNotFound("1.*".to_string()).is_dataset_not_found());
        assert!(!DatasetError::DatasetNotFound("foo".to_string()).is_version_not_found());
    }
}
