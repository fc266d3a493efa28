use std::io::{self, Write};

use serde::Serialize;

use crate::error::DatasetError;
use crate::progress::{ProgressEvent, ProgressSink};
use crate::provider::Provider;
use crate::version::{self, LATEST};

#[derive(Debug, Clone, Serialize)]
pub struct ListResult {
    pub location: String,
    pub datasets: Vec<ListEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListEntry {
    pub name: String,
    pub versions: Vec<String>,
    pub latest: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DownloadResult {
    pub items: Vec<DownloadItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DownloadItem {
    pub name: String,
    pub requested: String,
    pub version: String,
    pub path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RemoveResult {
    pub name: String,
    pub version: String,
    pub kept_dataset: bool,
}

impl ListResult {
    /// Datasets and versions offered by `provider`, or only what its local
    /// cache holds when `local_only` is set.
    pub fn collect(provider: &Provider, local_only: bool) -> Result<Self, DatasetError> {
        let (location, datasets) = if local_only {
            let store = provider.local_store();
            (store.root().to_string(), store.list_datasets()?)
        } else {
            (provider.location(), provider.list_datasets()?)
        };
        let mut entries = Vec::with_capacity(datasets.len());
        for name in datasets {
            let versions = if local_only {
                provider.local_store().list_versions(&name)?
            } else {
                provider.list_versions(&name)?
            };
            let mut versions = versions.into_iter().collect::<Vec<_>>();
            versions.sort_by(|a, b| version::compare_versions(a, b));
            let latest = version::resolve(LATEST, &versions).ok();
            entries.push(ListEntry {
                name,
                versions,
                latest,
            });
        }
        Ok(Self {
            location,
            datasets: entries,
        })
    }
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_list(result: &ListResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_download(result: &DownloadResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_remove(result: &RemoveResult) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

pub struct TextOutput;

impl TextOutput {
    pub fn print_list(result: &ListResult) -> io::Result<()> {
        let mut stdout = io::stdout().lock();
        writeln!(stdout, "Datasets in {}:", result.location)?;
        if result.datasets.is_empty() {
            writeln!(stdout, "  (none)")?;
        }
        for entry in &result.datasets {
            writeln!(stdout, "  {}", entry.name)?;
            for version in &entry.versions {
                let marker = if entry.latest.as_deref() == Some(version.as_str()) {
                    " (latest)"
                } else {
                    ""
                };
                writeln!(stdout, "    {version}{marker}")?;
            }
        }
        Ok(())
    }

    pub fn print_download(result: &DownloadResult) -> io::Result<()> {
        let mut stdout = io::stdout().lock();
        for item in &result.items {
            writeln!(stdout, "{} {} -> {}", item.name, item.version, item.path)?;
        }
        Ok(())
    }

    pub fn print_remove(result: &RemoveResult) -> io::Result<()> {
        writeln!(
            io::stdout(),
            "removed {} {} from the local cache",
            result.name, result.version
        )
    }
}

/// Progress lines on stderr, so stdout stays parseable.
#[derive(Debug, Clone, Copy, Default)]
pub struct StderrProgress;

impl ProgressSink for StderrProgress {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => eprintln!("{} ({:.1}s)", event.message, elapsed.as_secs_f64()),
            None => eprintln!("{}", event.message),
        }
    }
}
