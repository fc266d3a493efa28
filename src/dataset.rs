use std::collections::BTreeMap;
use std::fmt;
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::debug;

use crate::error::DatasetError;
use crate::provider::Provider;
use crate::settings::Settings;
use crate::store::is_hidden;
use crate::version::LATEST;

/// Mode name registered by [`Dataset::new`]; hands back the resolved path.
pub const PATH_MODE: &str = "path";

pub type LoadHandler<T> = Box<dyn Fn(&Utf8Path) -> Result<T, DatasetError> + Send + Sync>;

/// A named dataset request and the ways its files can be loaded.
///
/// ```no_run
/// use camino::Utf8PathBuf;
/// use dsfetch::dataset::Dataset;
/// use dsfetch::settings::Settings;
///
/// let settings = Settings::load_default()?;
/// let blink: Dataset<Utf8PathBuf> = Dataset::new("blink", None);
/// let path = blink.load_with_settings(&settings, None, false)?;
/// # Ok::<(), dsfetch::error::DatasetError>(())
/// ```
pub struct Dataset<T> {
    name: String,
    version: String,
    single_file: bool,
    default_mode: String,
    modes: BTreeMap<String, LoadHandler<T>>,
}

impl<T> fmt::Debug for Dataset<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dataset")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("single_file", &self.single_file)
            .field("default_mode", &self.default_mode)
            .field("modes", &self.modes.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<T: From<Utf8PathBuf> + 'static> Dataset<T> {
    /// `version` defaults to `latest`.
    pub fn new(name: impl Into<String>, version: Option<&str>) -> Self {
        Self::bare(name, version).with_mode(PATH_MODE, |path| Ok(T::from(path.to_path_buf())))
    }
}

impl<T> Dataset<T> {
    /// Dataset without any load mode; register them with [`Dataset::with_mode`].
    pub fn bare(name: impl Into<String>, version: Option<&str>) -> Self {
        Self {
            name: name.into(),
            version: version.unwrap_or(LATEST).to_string(),
            single_file: false,
            default_mode: PATH_MODE.to_string(),
            modes: BTreeMap::new(),
        }
    }

    pub fn with_mode<F>(mut self, mode: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&Utf8Path) -> Result<T, DatasetError> + Send + Sync + 'static,
    {
        self.modes.insert(mode.into(), Box::new(handler));
        self
    }

    pub fn with_default_mode(mut self, mode: impl Into<String>) -> Self {
        self.default_mode = mode.into();
        self
    }

    /// Hand the only file of the version folder to the handlers instead of
    /// the folder itself.
    pub fn single_file(mut self) -> Self {
        self.single_file = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn default_mode(&self) -> &str {
        &self.default_mode
    }

    pub fn available_modes(&self) -> Vec<&str> {
        self.modes.keys().map(String::as_str).collect()
    }

    pub fn load(
        &self,
        provider: &Provider,
        mode: Option<&str>,
        force_update: bool,
    ) -> Result<T, DatasetError> {
        let mode = mode.unwrap_or(&self.default_mode);
        let handler = self
            .modes
            .get(mode)
            .ok_or_else(|| DatasetError::InvalidMode {
                dataset: self.name.clone(),
                mode: mode.to_string(),
            })?;

        let (folder, resolved) = provider.get_folder(&self.name, &self.version, force_update)?;
        debug!(dataset = %self.name, version = %resolved, mode, "loading dataset");
        let path = if self.single_file {
            single_file_in(&folder)?
        } else {
            folder
        };
        handler(&path)
    }

    pub fn load_with_settings(
        &self,
        settings: &Settings,
        mode: Option<&str>,
        force_update: bool,
    ) -> Result<T, DatasetError> {
        let provider = settings.provider_for_dataset(&self.name)?;
        self.load(&provider, mode, force_update)
    }
}

fn single_file_in(folder: &Utf8Path) -> Result<Utf8PathBuf, DatasetError> {
    let entries = fs::read_dir(folder.as_std_path())
        .map_err(|err| DatasetError::Filesystem(format!("read {folder}: {err}")))?;
    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| DatasetError::Filesystem(err.to_string()))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if !is_hidden(&name) {
            names.push(name);
        }
    }
    names.sort();
    names
        .into_iter()
        .next()
        .map(|name| folder.join(name))
        .ok_or_else(|| DatasetError::Filesystem(format!("no file found in {folder}")))
}
