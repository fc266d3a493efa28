use std::fs;
use std::path::{Path, PathBuf};

use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_yaml::{Mapping, Value};
use tracing::{info, warn};

use crate::error::DatasetError;
use crate::provider::{Provider, RemoteProvider};
use crate::providers::{
    Credentials, FtpTransport, HttpTransport, MirrorTransport, SingleDataset, WebDavTransport,
};
use crate::store::LocalStore;

const DISK_BY_ID: &str = "/dev/disk/by-id";
const PROC_MOUNTS: &str = "/proc/mounts";

#[derive(Debug, Default, Deserialize)]
struct LocalOptions {
    path: Option<String>,
    #[serde(default)]
    copy: bool,
}

#[derive(Debug, Deserialize)]
struct GcloudOptions {
    disk: String,
}

#[derive(Debug, Deserialize)]
struct AuthOptions {
    method: String,
    username: Option<String>,
    password: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WebDavOptions {
    url: String,
    folder: Option<String>,
    auth: Option<AuthOptions>,
}

#[derive(Debug, Deserialize)]
struct FtpOptions {
    url: String,
    port: Option<u16>,
    auth: Option<AuthOptions>,
    name: Option<String>,
    version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HttpOptions {
    url: Option<String>,
    urls: Option<Vec<String>>,
    name: String,
    version: Option<String>,
    auth: Option<AuthOptions>,
}

impl AuthOptions {
    fn credentials(self, provider_type: &str) -> Result<Credentials, DatasetError> {
        if self.method != "simple" {
            return Err(DatasetError::InvalidConfiguration(format!(
                "invalid authentication method '{}' for {provider_type} provider",
                self.method
            )));
        }
        match (self.username, self.password) {
            (Some(username), Some(password)) => Ok(Credentials::new(username, password)),
            _ => Err(DatasetError::InvalidConfiguration(format!(
                "simple authentication for {provider_type} needs username and password"
            ))),
        }
    }
}

fn parse_options<T: DeserializeOwned>(
    provider_type: &str,
    options: &Mapping,
) -> Result<T, DatasetError> {
    serde_yaml::from_value(Value::Mapping(options.clone())).map_err(|err| {
        DatasetError::InvalidConfiguration(format!("{provider_type} provider options: {err}"))
    })
}

fn credentials(
    provider_type: &str,
    auth: Option<AuthOptions>,
) -> Result<Option<Credentials>, DatasetError> {
    auth.map(|auth| auth.credentials(provider_type)).transpose()
}

/// Locates the mount point of a block device listed under `/dev/disk/by-id`.
#[derive(Debug, Clone)]
pub struct MountResolver {
    by_id_dir: PathBuf,
    mounts_file: PathBuf,
}

impl Default for MountResolver {
    fn default() -> Self {
        Self::new(DISK_BY_ID, PROC_MOUNTS)
    }
}

impl MountResolver {
    pub fn new(by_id_dir: impl Into<PathBuf>, mounts_file: impl Into<PathBuf>) -> Self {
        Self {
            by_id_dir: by_id_dir.into(),
            mounts_file: mounts_file.into(),
        }
    }

    pub fn mount_point(&self, disk: &str) -> Result<Utf8PathBuf, DatasetError> {
        let link = self.by_id_dir.join(disk);
        if !link.exists() {
            return Err(DatasetError::InvalidConfiguration(format!(
                "disk {} not available",
                link.display()
            )));
        }
        let device = fs::canonicalize(&link)
            .map_err(|err| DatasetError::Filesystem(format!("{}: {err}", link.display())))?;
        info!(disk = %link.display(), device = %device.display(), "resolved disk");

        let mounts = fs::read_to_string(&self.mounts_file).map_err(|err| {
            DatasetError::Filesystem(format!("read {}: {err}", self.mounts_file.display()))
        })?;
        for line in mounts.lines() {
            let mut fields = line.split_whitespace();
            let (Some(source), Some(target)) = (fields.next(), fields.next()) else {
                continue;
            };
            let source = PathBuf::from(unescape_mount_field(source));
            if same_device(&source, &device) {
                let target = unescape_mount_field(target);
                info!(device = %device.display(), mount = %target, "disk mounted");
                return Ok(Utf8PathBuf::from(target));
            }
        }
        warn!(device = %device.display(), "disk not mounted");
        Err(DatasetError::InvalidConfiguration(format!(
            "disk {} is not mounted",
            device.display()
        )))
    }
}

fn same_device(source: &Path, device: &Path) -> bool {
    if source == device {
        return true;
    }
    source.is_absolute()
        && fs::canonicalize(source)
            .map(|resolved| resolved == device)
            .unwrap_or(false)
}

/// `/proc/mounts` escapes blanks and backslashes as three-digit octal.
fn unescape_mount_field(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut index = 0;
    while index < bytes.len() {
        let code = (bytes[index] == b'\\' && index + 3 < bytes.len())
            .then(|| &bytes[index + 1..index + 4])
            .filter(|digits| digits.iter().all(|b| (b'0'..=b'7').contains(b)))
            .and_then(|digits| {
                let value = digits
                    .iter()
                    .fold(0u16, |acc, digit| acc * 8 + u16::from(digit - b'0'));
                u8::try_from(value).ok()
            });
        match code {
            Some(code) => {
                out.push(code);
                index += 4;
            }
            None => {
                out.push(bytes[index]);
                index += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Build the provider of type `provider_type` caching into `root`.
pub fn make_provider(
    provider_type: &str,
    root: &Utf8Path,
    options: &Mapping,
) -> Result<Provider, DatasetError> {
    make_provider_with(&MountResolver::default(), provider_type, root, options)
}

pub fn make_provider_with(
    mounts: &MountResolver,
    provider_type: &str,
    root: &Utf8Path,
    options: &Mapping,
) -> Result<Provider, DatasetError> {
    let provider = match provider_type {
        "local" => {
            let options: LocalOptions = parse_options(provider_type, options)?;
            match (options.path, options.copy) {
                (None, _) => Provider::Local(LocalStore::new(root)),
                (Some(path), false) => Provider::Local(LocalStore::new(path)),
                (Some(path), true) => {
                    Provider::Remote(RemoteProvider::new(root, MirrorTransport::new(path)))
                }
            }
        }
        "gcloud" => {
            let options: GcloudOptions = parse_options(provider_type, options)?;
            let mount = mounts.mount_point(&options.disk)?;
            Provider::Remote(RemoteProvider::new(root, MirrorTransport::new(mount)))
        }
        "webdav" => {
            let options: WebDavOptions = parse_options(provider_type, options)?;
            let transport = WebDavTransport::new(
                &options.url,
                options.folder.as_deref(),
                credentials(provider_type, options.auth)?,
            )?;
            Provider::Remote(RemoteProvider::new(root, transport))
        }
        "ftp" => {
            let options: FtpOptions = parse_options(provider_type, options)?;
            let mut transport = FtpTransport::new(
                &options.url,
                options.port,
                credentials(provider_type, options.auth)?,
            )?;
            if let Some(name) = options.name {
                transport = transport.single_file(SingleDataset::new(name, options.version));
            }
            Provider::Remote(RemoteProvider::new(root, transport))
        }
        "http" => {
            let options: HttpOptions = parse_options(provider_type, options)?;
            let urls = match (options.url, options.urls) {
                (Some(url), None) => vec![url],
                (None, Some(urls)) => urls,
                _ => {
                    return Err(DatasetError::InvalidConfiguration(
                        "http provider needs exactly one of url or urls".to_string(),
                    ));
                }
            };
            let transport = HttpTransport::new(
                &urls,
                SingleDataset::new(options.name, options.version),
                credentials(provider_type, options.auth)?,
            )?;
            Provider::Remote(RemoteProvider::new(root, transport))
        }
        other => {
            return Err(DatasetError::InvalidConfiguration(format!(
                "invalid provider type '{other}'"
            )));
        }
    };
    Ok(provider)
}
