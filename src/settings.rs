use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;
use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use tracing::{debug, warn};

use crate::error::DatasetError;
use crate::factory;
use crate::provider::Provider;
use crate::store::LocalStore;

/// Environment variable pointing at the settings file.
pub const CONFIG_ENV: &str = "DSFETCH_CONFIG";

const DEFAULT_PROVIDER: &str = "default";

#[derive(Debug, Deserialize)]
struct SettingsFile {
    version: Option<u32>,
    #[serde(default)]
    provider: Option<Value>,
    #[serde(default)]
    providers: Option<Value>,
    #[serde(default)]
    path: Option<String>,
}

/// Provider type plus the remaining options of one settings entry.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderSettings {
    pub provider_type: String,
    pub options: Mapping,
}

impl ProviderSettings {
    pub fn new(provider_type: impl Into<String>, options: Mapping) -> Self {
        Self {
            provider_type: provider_type.into(),
            options,
        }
    }

    pub fn build(&self, base: &Utf8Path) -> Result<Provider, DatasetError> {
        factory::make_provider(&self.provider_type, base, &self.options)
    }

    fn from_value(value: Value) -> Result<Self, DatasetError> {
        match value {
            Value::String(provider_type) => Ok(Self::new(provider_type, Mapping::new())),
            Value::Mapping(mut options) => {
                let provider_type = match options.remove("type") {
                    Some(Value::String(provider_type)) => provider_type,
                    Some(_) => {
                        return Err(DatasetError::ConfigParse(
                            "provider type must be a string".to_string(),
                        ));
                    }
                    None => {
                        return Err(DatasetError::ConfigParse("missing provider type".to_string()));
                    }
                };
                Ok(Self::new(provider_type, options))
            }
            _ => Err(DatasetError::ConfigParse(
                "provider must be a type name or a mapping".to_string(),
            )),
        }
    }
}

/// Resolved settings: cache root plus the named providers, in file order.
#[derive(Debug, Clone)]
pub struct Settings {
    version: u32,
    base: Utf8PathBuf,
    providers: Vec<(String, ProviderSettings)>,
    current: Option<String>,
}

impl Settings {
    pub fn new(
        version: u32,
        base: impl Into<Utf8PathBuf>,
        providers: Vec<(String, ProviderSettings)>,
    ) -> Self {
        Self {
            version,
            base: base.into(),
            providers,
            current: None,
        }
    }

    /// Settings used when no settings file exists: a plain local cache.
    pub fn local_default() -> Result<Self, DatasetError> {
        Ok(Self::new(
            1,
            LocalStore::default_root()?,
            vec![(
                "local".to_string(),
                ProviderSettings::new("local", Mapping::new()),
            )],
        ))
    }

    /// `$DSFETCH_CONFIG`, else `~/.dsfetch/config.yml`.
    pub fn default_path() -> Option<PathBuf> {
        if let Some(path) = env::var_os(CONFIG_ENV) {
            return Some(PathBuf::from(path));
        }
        BaseDirs::new().map(|dirs| dirs.home_dir().join(".dsfetch").join("config.yml"))
    }

    pub fn load_default() -> Result<Self, DatasetError> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::read(&path),
            path => {
                let shown = path.map(|path| path.display().to_string()).unwrap_or_default();
                warn!(
                    path = %shown,
                    env = CONFIG_ENV,
                    "settings file not found, using the local dataset folder"
                );
                Self::local_default()
            }
        }
    }

    pub fn read(path: &Path) -> Result<Self, DatasetError> {
        let content =
            fs::read_to_string(path).map_err(|_| DatasetError::ConfigRead(path.to_path_buf()))?;
        debug!(path = %path.display(), "reading settings");
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, DatasetError> {
        let file: SettingsFile =
            serde_yaml::from_str(content).map_err(|err| DatasetError::ConfigParse(err.to_string()))?;
        Self::resolve(file)
    }

    fn resolve(file: SettingsFile) -> Result<Self, DatasetError> {
        let version = file
            .version
            .ok_or_else(|| DatasetError::ConfigParse("missing version".to_string()))?;

        let providers = if version == 1 {
            let provider = file
                .provider
                .ok_or_else(|| DatasetError::ConfigParse("missing provider".to_string()))?;
            vec![(
                DEFAULT_PROVIDER.to_string(),
                ProviderSettings::from_value(provider)?,
            )]
        } else {
            let Some(Value::Mapping(entries)) = file.providers else {
                return Err(DatasetError::ConfigParse(
                    "providers must be a mapping of named providers".to_string(),
                ));
            };
            entries
                .into_iter()
                .map(|(name, value)| {
                    let Value::String(name) = name else {
                        return Err(DatasetError::ConfigParse(
                            "provider names must be strings".to_string(),
                        ));
                    };
                    Ok((name, ProviderSettings::from_value(value)?))
                })
                .collect::<Result<Vec<_>, _>>()?
        };

        let base = match file.path {
            Some(path) => Utf8PathBuf::from(path),
            None => LocalStore::default_root()?,
        };
        Ok(Self::new(version, base, providers))
    }

    /// Select the named provider instead of the automatic choice.
    pub fn with_current(mut self, name: Option<String>) -> Self {
        self.current = name;
        self
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn base(&self) -> &Utf8Path {
        &self.base
    }

    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn providers(&self) -> impl Iterator<Item = (&str, &ProviderSettings)> {
        self.providers
            .iter()
            .map(|(name, provider)| (name.as_str(), provider))
    }

    pub fn provider(&self, name: &str) -> Option<&ProviderSettings> {
        self.providers
            .iter()
            .find(|(candidate, _)| candidate == name)
            .map(|(_, provider)| provider)
    }

    /// The selected provider, else `default`, else the first one that
    /// can be built.
    pub fn make_provider(&self) -> Result<Provider, DatasetError> {
        if let Some(name) = &self.current {
            let provider = self.provider(name).ok_or_else(|| {
                DatasetError::InvalidConfiguration(format!("unknown provider {name}"))
            })?;
            return provider.build(&self.base);
        }
        if let Some(provider) = self.provider(DEFAULT_PROVIDER) {
            return provider.build(&self.base);
        }
        let mut last_error = None;
        for (name, provider) in &self.providers {
            match provider.build(&self.base) {
                Ok(provider) => return Ok(provider),
                Err(err) => {
                    warn!(provider = %name, error = %err, "provider unusable");
                    last_error = Some(err);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| {
            DatasetError::InvalidConfiguration("no provider configured".to_string())
        }))
    }

    /// First provider offering `dataset`, falling back to `make_provider`.
    pub fn provider_for_dataset(&self, dataset: &str) -> Result<Provider, DatasetError> {
        if self.current.is_none() {
            for (name, settings) in &self.providers {
                let provider = match settings.build(&self.base) {
                    Ok(provider) => provider,
                    Err(err) => {
                        debug!(provider = %name, error = %err, "skipping provider");
                        continue;
                    }
                };
                match provider.list_datasets() {
                    Ok(datasets) if datasets.contains(dataset) => return Ok(provider),
                    Ok(_) => {}
                    Err(err) => debug!(provider = %name, error = %err, "listing failed"),
                }
            }
        }
        self.make_provider()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_shorthand_and_mapping() {
        let shorthand = ProviderSettings::from_value(Value::String("local".into())).unwrap();
        assert_eq!(shorthand.provider_type, "local");
        assert!(shorthand.options.is_empty());

        let value: Value = serde_yaml::from_str("type: webdav\nurl: https://x/").unwrap();
        let mapping = ProviderSettings::from_value(value).unwrap();
        assert_eq!(mapping.provider_type, "webdav");
        assert_eq!(mapping.options.len(), 1);
        assert!(mapping.options.get("type").is_none());
    }

    #[test]
    fn provider_without_type_is_rejected() {
        let value: Value = serde_yaml::from_str("url: https://x/").unwrap();
        assert!(matches!(
            ProviderSettings::from_value(value),
            Err(DatasetError::ConfigParse(_))
        ));
    }
}
