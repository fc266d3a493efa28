use std::fs::File;
use std::io;

use camino::Utf8Path;
use percent_encoding::percent_decode_str;
use suppaftp::types::FileType;
use suppaftp::{FtpError, FtpStream};
use tracing::debug;
use url::Url;

use crate::error::DatasetError;
use crate::providers::{Credentials, RemoteFile, SingleDataset, Transport, create_parent};
use crate::store::remove_hidden;

const DEFAULT_PORT: u16 = 21;
const ANONYMOUS: &str = "anonymous";

/// FTP server holding either a `<dataset>/<version>/` tree below its root
/// path, or a single file served as one dataset version.
#[derive(Debug, Clone)]
pub struct FtpTransport {
    host: String,
    port: u16,
    root: String,
    credentials: Option<Credentials>,
    single: Option<SingleDataset>,
}

impl FtpTransport {
    /// `url` is `ftp://host[:port]/path`; the scheme may be omitted.
    pub fn new(
        url: &str,
        port: Option<u16>,
        credentials: Option<Credentials>,
    ) -> Result<Self, DatasetError> {
        let (host, url_port, root) = parse_ftp_url(url)?;
        Ok(Self {
            host,
            port: port.unwrap_or(url_port),
            root,
            credentials,
            single: None,
        })
    }

    /// Serve the file at the URL path as the only version of `single.name`.
    pub fn single_file(mut self, single: SingleDataset) -> Self {
        self.single = Some(single);
        self
    }

    pub fn address(&self) -> (&str, u16) {
        (&self.host, self.port)
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    fn remote_path(&self, segments: &[&str]) -> String {
        let mut path = self.root.trim_end_matches('/').to_string();
        for segment in segments {
            path.push('/');
            path.push_str(segment);
        }
        if path.is_empty() { "/".to_string() } else { path }
    }

    /// Run `work` on a fresh logged-in connection in binary mode.
    fn session<T, F>(&self, work: F) -> Result<T, DatasetError>
    where
        F: FnOnce(&mut FtpStream) -> Result<T, DatasetError>,
    {
        let mut stream = FtpStream::connect((self.host.as_str(), self.port)).map_err(|err| {
            DatasetError::Ftp(format!("connect {}:{}: {err}", self.host, self.port))
        })?;
        let (user, password) = match &self.credentials {
            Some(creds) => (creds.username.as_str(), creds.password.as_str()),
            None => (ANONYMOUS, ANONYMOUS),
        };
        stream
            .login(user, password)
            .map_err(|err| DatasetError::Ftp(format!("login as {user}: {err}")))?;
        stream
            .transfer_type(FileType::Binary)
            .map_err(|err| DatasetError::Ftp(err.to_string()))?;
        let result = work(&mut stream);
        if let Err(err) = stream.quit() {
            debug!(error = %err, "FTP quit failed");
        }
        result
    }

    fn list_names(stream: &mut FtpStream, path: &str) -> Result<Vec<String>, FtpError> {
        let names = stream.nlst(Some(path))?;
        Ok(remove_hidden(names.into_iter().filter_map(|name| {
            name.trim_end_matches('/')
                .rsplit('/')
                .next()
                .filter(|last| !last.is_empty())
                .map(str::to_string)
        })))
    }
}

impl Transport for FtpTransport {
    fn location(&self) -> String {
        format!("ftp://{}:{}{}", self.host, self.port, self.remote_path(&[]))
    }

    fn is_available(&self) -> bool {
        match self.session(|_| Ok(())) {
            Ok(()) => true,
            Err(err) => {
                debug!(error = %err, "FTP server not reachable");
                false
            }
        }
    }

    fn list_datasets(&self) -> Result<Vec<String>, DatasetError> {
        if let Some(single) = &self.single {
            return Ok(single.list_datasets());
        }
        let root = self.remote_path(&[]);
        self.session(|stream| {
            Self::list_names(stream, &root)
                .map_err(|err| DatasetError::Ftp(format!("NLST {root}: {err}")))
        })
    }

    fn list_versions(&self, dataset: &str) -> Result<Vec<String>, DatasetError> {
        if let Some(single) = &self.single {
            return single.list_versions(dataset);
        }
        let path = self.remote_path(&[dataset]);
        self.session(|stream| match Self::list_names(stream, &path) {
            Ok(names) => Ok(names),
            Err(FtpError::UnexpectedResponse(_)) => {
                Err(DatasetError::DatasetNotFound(dataset.to_string()))
            }
            Err(err) => Err(DatasetError::Ftp(format!("NLST {path}: {err}"))),
        })
    }

    fn list_remote_files(
        &self,
        dataset: &str,
        version: &str,
    ) -> Result<Vec<RemoteFile>, DatasetError> {
        if self.single.is_some() {
            let source = self.remote_path(&[]);
            let name = source
                .rsplit('/')
                .next()
                .filter(|name| !name.is_empty())
                .ok_or_else(|| {
                    DatasetError::InvalidConfiguration(format!(
                        "FTP url for {dataset} does not name a file"
                    ))
                })?
                .to_string();
            return Ok(vec![RemoteFile::new(name, source)]);
        }
        let dir = self.remote_path(&[dataset, version]);
        self.session(|stream| {
            let names = Self::list_names(stream, &dir).map_err(|err| match err {
                FtpError::UnexpectedResponse(_) => DatasetError::DatasetVersionNotFound {
                    name: dataset.to_string(),
                    version: version.to_string(),
                },
                other => DatasetError::Ftp(format!("NLST {dir}: {other}")),
            })?;
            Ok(names
                .into_iter()
                .map(|name| {
                    let source = format!("{dir}/{name}");
                    let file = RemoteFile::new(name.as_str(), source.as_str());
                    match stream.size(&source) {
                        Ok(size) => file.with_size(size as u64),
                        Err(_) => file,
                    }
                })
                .collect())
        })
    }

    fn download(&self, file: &RemoteFile, destination: &Utf8Path) -> Result<(), DatasetError> {
        create_parent(destination)?;
        self.session(|stream| {
            let mut reader = stream
                .retr_as_stream(&file.source)
                .map_err(|err| DatasetError::Ftp(format!("RETR {}: {err}", file.source)))?;
            let mut output = File::create(destination.as_std_path()).map_err(|err| {
                DatasetError::Filesystem(format!("create {destination}: {err}"))
            })?;
            let written = io::copy(&mut reader, &mut output)
                .map_err(|err| DatasetError::Ftp(format!("RETR {}: {err}", file.source)))?;
            stream
                .finalize_retr_stream(reader)
                .map_err(|err| DatasetError::Ftp(err.to_string()))?;
            debug!(source = %file.source, bytes = written, "downloaded");
            Ok(())
        })
    }
}

/// Split an FTP url into host, port and (decoded) root path.
pub fn parse_ftp_url(url: &str) -> Result<(String, u16, String), DatasetError> {
    let normalized = if url.contains("://") {
        url.to_string()
    } else {
        format!("ftp://{url}")
    };
    let parsed = Url::parse(&normalized).map_err(|err| {
        DatasetError::InvalidConfiguration(format!("invalid FTP url {url}: {err}"))
    })?;
    let host = parsed
        .host_str()
        .filter(|host| !host.is_empty())
        .ok_or_else(|| DatasetError::InvalidConfiguration(format!("FTP url {url} has no host")))?
        .to_string();
    let port = parsed.port().unwrap_or(DEFAULT_PORT);
    let root = percent_decode_str(parsed.path())
        .decode_utf8_lossy()
        .trim_end_matches('/')
        .to_string();
    Ok((host, port, root))
}
