use std::fs;
use std::io::{self, BufReader, Read};

use bzip2::read::BzDecoder;
use camino::{Utf8Path, Utf8PathBuf};
use flate2::read::GzDecoder;
use tracing::debug;
use xz2::read::XzDecoder;
use zip::ZipArchive;

use crate::error::DatasetError;

/// A post-download transform applied to a fetched file.
pub trait FileModifier: Send + Sync {
    fn name(&self) -> &'static str;
    fn accepts(&self, file: &Utf8Path) -> bool;
    /// Replace `file` by its expanded content in the same directory.
    fn apply(&self, file: &Utf8Path) -> Result<(), DatasetError>;
}

/// Ordered modifier chain; the first modifier accepting a file handles it.
pub struct ArchiveExpander {
    modifiers: Vec<Box<dyn FileModifier>>,
}

impl Default for ArchiveExpander {
    fn default() -> Self {
        Self {
            modifiers: vec![
                Box::new(ZipExtractor),
                Box::new(TarExtractor),
                Box::new(GzExtractor),
            ],
        }
    }
}

impl ArchiveExpander {
    pub fn new(modifiers: Vec<Box<dyn FileModifier>>) -> Self {
        Self { modifiers }
    }

    /// Chain that leaves every file untouched.
    pub fn none() -> Self {
        Self {
            modifiers: Vec::new(),
        }
    }

    /// Returns the name of the modifier that ran, if any.
    pub fn expand(&self, file: &Utf8Path) -> Result<Option<&'static str>, DatasetError> {
        let Some(modifier) = self.modifiers.iter().find(|m| m.accepts(file)) else {
            return Ok(None);
        };
        debug!(file = %file, modifier = modifier.name(), "expanding archive");
        modifier.apply(file)?;
        Ok(Some(modifier.name()))
    }
}

fn lower_name(file: &Utf8Path) -> String {
    file.file_name().unwrap_or_default().to_ascii_lowercase()
}

fn target_dir(file: &Utf8Path) -> Result<&Utf8Path, DatasetError> {
    file.parent()
        .ok_or_else(|| DatasetError::Archive(format!("{file} has no parent directory")))
}

fn remove_archive(file: &Utf8Path) -> Result<(), DatasetError> {
    fs::remove_file(file.as_std_path())
        .map_err(|err| DatasetError::Filesystem(format!("remove {file}: {err}")))
}

fn open(file: &Utf8Path) -> Result<BufReader<fs::File>, DatasetError> {
    fs::File::open(file.as_std_path())
        .map(BufReader::new)
        .map_err(|err| DatasetError::Filesystem(format!("open {file}: {err}")))
}

pub struct ZipExtractor;

impl FileModifier for ZipExtractor {
    fn name(&self) -> &'static str {
        "zip"
    }

    fn accepts(&self, file: &Utf8Path) -> bool {
        lower_name(file).ends_with(".zip")
    }

    fn apply(&self, file: &Utf8Path) -> Result<(), DatasetError> {
        extract_zip(file, target_dir(file)?)?;
        remove_archive(file)
    }
}

pub fn extract_zip(zip_path: &Utf8Path, target_dir: &Utf8Path) -> Result<(), DatasetError> {
    let file = fs::File::open(zip_path.as_std_path())
        .map_err(|err| DatasetError::Archive(format!("open zip {zip_path}: {err}")))?;
    let mut archive =
        ZipArchive::new(file).map_err(|err| DatasetError::Archive(err.to_string()))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|err| DatasetError::Archive(err.to_string()))?;
        let entry_path = match entry.enclosed_name() {
            Some(path) => target_dir.as_std_path().join(path),
            None => {
                return Err(DatasetError::Archive(format!(
                    "zip entry path traversal detected in {zip_path}"
                )));
            }
        };

        if entry.is_dir() {
            fs::create_dir_all(&entry_path)
                .map_err(|err| DatasetError::Filesystem(err.to_string()))?;
            continue;
        }

        if let Some(parent) = entry_path.parent() {
            fs::create_dir_all(parent).map_err(|err| DatasetError::Filesystem(err.to_string()))?;
        }
        let mut outfile = fs::File::create(&entry_path)
            .map_err(|err| DatasetError::Filesystem(err.to_string()))?;
        io::copy(&mut entry, &mut outfile)
            .map_err(|err| DatasetError::Archive(err.to_string()))?;
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TarCompression {
    None,
    Gzip,
    Bzip2,
    Xz,
}

fn tar_compression(name: &str) -> Option<TarCompression> {
    if name.ends_with(".tar") {
        Some(TarCompression::None)
    } else if name.ends_with(".tgz") || name.ends_with(".tar.gz") {
        Some(TarCompression::Gzip)
    } else if name.ends_with(".tbz2") || name.ends_with(".tar.bz2") {
        Some(TarCompression::Bzip2)
    } else if name.ends_with(".txz") || name.ends_with(".tar.xz") {
        Some(TarCompression::Xz)
    } else {
        None
    }
}

/// `.tar`, optionally gzip, bzip2 or xz compressed.
pub struct TarExtractor;

impl FileModifier for TarExtractor {
    fn name(&self) -> &'static str {
        "tar"
    }

    fn accepts(&self, file: &Utf8Path) -> bool {
        tar_compression(&lower_name(file)).is_some()
    }

    fn apply(&self, file: &Utf8Path) -> Result<(), DatasetError> {
        let compression = tar_compression(&lower_name(file))
            .ok_or_else(|| DatasetError::Archive(format!("{file} is not a tar archive")))?;
        let reader = open(file)?;
        let reader: Box<dyn Read> = match compression {
            TarCompression::None => Box::new(reader),
            TarCompression::Gzip => Box::new(GzDecoder::new(reader)),
            TarCompression::Bzip2 => Box::new(BzDecoder::new(reader)),
            TarCompression::Xz => Box::new(XzDecoder::new(reader)),
        };
        let mut archive = tar::Archive::new(reader);
        archive
            .unpack(target_dir(file)?.as_std_path())
            .map_err(|err| DatasetError::Archive(format!("unpack {file}: {err}")))?;
        remove_archive(file)
    }
}

/// Single-member gzip files that are not tarballs.
pub struct GzExtractor;

impl GzExtractor {
    fn output_path(file: &Utf8Path) -> Utf8PathBuf {
        let name = file.file_name().unwrap_or_default();
        let stem = &name[..name.len().saturating_sub(3)];
        file.with_file_name(stem)
    }
}

impl FileModifier for GzExtractor {
    fn name(&self) -> &'static str {
        "gz"
    }

    fn accepts(&self, file: &Utf8Path) -> bool {
        let name = lower_name(file);
        name.ends_with(".gz") && !name.ends_with(".tar.gz") && name.len() > 3
    }

    fn apply(&self, file: &Utf8Path) -> Result<(), DatasetError> {
        let output = Self::output_path(file);
        let mut decoder = GzDecoder::new(open(file)?);
        let mut outfile = fs::File::create(output.as_std_path())
            .map_err(|err| DatasetError::Filesystem(format!("create {output}: {err}")))?;
        io::copy(&mut decoder, &mut outfile)
            .map_err(|err| DatasetError::Archive(format!("gunzip {file}: {err}")))?;
        remove_archive(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modifiers_are_mutually_exclusive() {
        let cases = [
            ("data.zip", Some("zip")),
            ("DATA.ZIP", Some("zip")),
            ("data.tar", Some("tar")),
            ("data.tgz", Some("tar")),
            ("data.tar.gz", Some("tar")),
            ("data.tar.bz2", Some("tar")),
            ("data.tar.xz", Some("tar")),
            ("data.txz", Some("tar")),
            ("data.csv.gz", Some("gz")),
            ("data.csv", None),
            ("data.bz2", None),
        ];
        let expander = ArchiveExpander::default();
        for (name, expected) in cases {
            let path = Utf8PathBuf::from(format!("/tmp/{name}"));
            let accepted = expander
                .modifiers
                .iter()
                .filter(|m| m.accepts(&path))
                .map(|m| m.name())
                .collect::<Vec<_>>();
            assert_eq!(accepted.first().copied(), expected, "{name}");
            assert!(accepted.len() <= 1, "{name} accepted by {accepted:?}");
        }
    }

    #[test]
    fn gz_output_strips_suffix() {
        assert_eq!(
            GzExtractor::output_path(Utf8Path::new("/tmp/table.csv.gz")),
            Utf8PathBuf::from("/tmp/table.csv")
        );
    }
}
