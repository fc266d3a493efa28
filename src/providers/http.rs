use camino::Utf8Path;
use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder};
use tracing::{debug, warn};
use url::Url;

use crate::error::DatasetError;
use crate::providers::{
    Credentials, RemoteFile, SingleDataset, Transport, http_client, write_response_to_file,
};

/// Plain file URLs served as the single version of one dataset.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    urls: Vec<Url>,
    single: SingleDataset,
    credentials: Option<Credentials>,
    client: Client,
}

impl HttpTransport {
    pub fn new<S: AsRef<str>>(
        urls: &[S],
        single: SingleDataset,
        credentials: Option<Credentials>,
    ) -> Result<Self, DatasetError> {
        if urls.is_empty() {
            return Err(DatasetError::InvalidConfiguration(format!(
                "no URL configured for dataset {}",
                single.name
            )));
        }
        let urls = urls
            .iter()
            .map(|url| {
                let url = url.as_ref();
                Url::parse(url).map_err(|err| {
                    DatasetError::InvalidConfiguration(format!("invalid HTTP url {url}: {err}"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            urls,
            single,
            credentials,
            client: http_client()?,
        })
    }

    pub fn urls(&self) -> &[Url] {
        &self.urls
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.credentials {
            Some(creds) => request.basic_auth(&creds.username, Some(&creds.password)),
            None => request,
        }
    }

    fn file_name(url: &Url) -> Result<String, DatasetError> {
        url.path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|name| !name.is_empty())
            .map(|name| {
                percent_encoding::percent_decode_str(name)
                    .decode_utf8_lossy()
                    .into_owned()
            })
            .ok_or_else(|| {
                DatasetError::InvalidConfiguration(format!("HTTP url {url} does not name a file"))
            })
    }
}

impl Transport for HttpTransport {
    fn location(&self) -> String {
        self.urls[0].to_string()
    }

    fn is_available(&self) -> bool {
        for url in &self.urls {
            match self.authorize(self.client.get(url.clone())).send() {
                Ok(response) if response.status() == StatusCode::OK => {}
                Ok(response) => {
                    warn!(%url, status = %response.status(), "HTTP source not available");
                    return false;
                }
                Err(err) => {
                    debug!(%url, error = %err, "HTTP source not reachable");
                    return false;
                }
            }
        }
        true
    }

    fn list_datasets(&self) -> Result<Vec<String>, DatasetError> {
        Ok(self.single.list_datasets())
    }

    fn list_versions(&self, dataset: &str) -> Result<Vec<String>, DatasetError> {
        self.single.list_versions(dataset)
    }

    fn list_remote_files(
        &self,
        _dataset: &str,
        _version: &str,
    ) -> Result<Vec<RemoteFile>, DatasetError> {
        self.urls
            .iter()
            .map(|url| Ok(RemoteFile::new(Self::file_name(url)?, url.as_str())))
            .collect()
    }

    fn download(&self, file: &RemoteFile, destination: &Utf8Path) -> Result<(), DatasetError> {
        let response = self
            .authorize(self.client.get(&file.source))
            .send()
            .map_err(|err| DatasetError::Http(format!("GET {}: {err}", file.source)))?;
        let written = write_response_to_file(response, destination)?;
        debug!(source = %file.source, bytes = written, "downloaded");
        Ok(())
    }
}
