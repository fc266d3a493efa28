use camino::{Utf8Path, Utf8PathBuf};
use percent_encoding::percent_decode_str;
use reqwest::Method;
use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder, Response};
use tracing::debug;
use url::Url;

use crate::error::DatasetError;
use crate::providers::{Credentials, RemoteFile, Transport, http_client, write_response_to_file};
use crate::store::is_hidden;

const PROPFIND_BODY: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<d:propfind xmlns:d="DAV:">
  <d:prop>
    <d:resourcetype/>
    <d:getcontentlength/>
  </d:prop>
</d:propfind>"#;

/// Child of a WebDAV collection, from a `PROPFIND` multistatus answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DavEntry {
    pub name: String,
    pub is_collection: bool,
    pub size: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct WebDavTransport {
    base: Url,
    credentials: Option<Credentials>,
    client: Client,
}

impl WebDavTransport {
    pub fn new(
        url: &str,
        folder: Option<&str>,
        credentials: Option<Credentials>,
    ) -> Result<Self, DatasetError> {
        let parsed = Url::parse(url).map_err(|err| {
            DatasetError::InvalidConfiguration(format!("invalid WebDAV url {url}: {err}"))
        })?;
        let folder_segments = folder
            .map(|folder| {
                folder
                    .split('/')
                    .filter(|segment| !segment.is_empty())
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        let base = join_segments(&parsed, &folder_segments, true)?;
        Ok(Self {
            base,
            credentials,
            client: http_client()?,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    pub fn collection_url(&self, segments: &[&str]) -> Result<Url, DatasetError> {
        join_segments(&self.base, segments, true)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.credentials {
            Some(creds) => request.basic_auth(&creds.username, Some(&creds.password)),
            None => request,
        }
    }

    fn propfind(&self, url: &Url, depth: &str) -> Result<Response, DatasetError> {
        let method = Method::from_bytes(b"PROPFIND")
            .map_err(|err| DatasetError::WebDav(err.to_string()))?;
        let request = self
            .client
            .request(method, url.clone())
            .header("Depth", depth)
            .header("Content-Type", "application/xml")
            .body(PROPFIND_BODY);
        self.authorize(request)
            .send()
            .map_err(|err| DatasetError::WebDav(format!("PROPFIND {url}: {err}")))
    }

    /// Children of the collection at `url`, or `None` when it does not exist.
    fn list_children(&self, url: &Url) -> Result<Option<Vec<DavEntry>>, DatasetError> {
        let response = self.propfind(url, "1")?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(DatasetError::WebDav(format!("PROPFIND {url} returned {status}")));
        }
        let body = response
            .text()
            .map_err(|err| DatasetError::WebDav(err.to_string()))?;
        parse_multistatus(&body, url.path()).map(Some)
    }

    fn visible_collections(entries: Vec<DavEntry>) -> Vec<String> {
        entries
            .into_iter()
            .filter(|entry| entry.is_collection && !is_hidden(&entry.name))
            .map(|entry| entry.name)
            .collect()
    }
}

impl Transport for WebDavTransport {
    fn location(&self) -> String {
        self.base.to_string()
    }

    fn is_available(&self) -> bool {
        match self.propfind(&self.base, "0") {
            Ok(response) => response.status().is_success(),
            Err(err) => {
                debug!(error = %err, "WebDAV server not reachable");
                false
            }
        }
    }

    fn list_datasets(&self) -> Result<Vec<String>, DatasetError> {
        let entries = self
            .list_children(&self.base)?
            .ok_or_else(|| DatasetError::WebDav(format!("{} not found", self.base)))?;
        Ok(Self::visible_collections(entries))
    }

    fn list_versions(&self, dataset: &str) -> Result<Vec<String>, DatasetError> {
        let url = self.collection_url(&[dataset])?;
        let entries = self
            .list_children(&url)?
            .ok_or_else(|| DatasetError::DatasetNotFound(dataset.to_string()))?;
        Ok(Self::visible_collections(entries))
    }

    fn list_remote_files(
        &self,
        dataset: &str,
        version: &str,
    ) -> Result<Vec<RemoteFile>, DatasetError> {
        let root = self.collection_url(&[dataset, version])?;
        let mut files = Vec::new();
        let mut stack = vec![(Utf8PathBuf::new(), root)];
        while let Some((prefix, url)) = stack.pop() {
            let entries =
                self.list_children(&url)?
                    .ok_or_else(|| DatasetError::DatasetVersionNotFound {
                        name: dataset.to_string(),
                        version: version.to_string(),
                    })?;
            for entry in entries {
                if is_hidden(&entry.name) {
                    continue;
                }
                let relative = prefix.join(&entry.name);
                if entry.is_collection {
                    stack.push((relative, join_segments(&url, &[entry.name.as_str()], true)?));
                } else {
                    let file_url = join_segments(&url, &[entry.name.as_str()], false)?;
                    let mut file = RemoteFile::new(relative, file_url.as_str());
                    file.size = entry.size;
                    files.push(file);
                }
            }
        }
        files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        Ok(files)
    }

    fn download(&self, file: &RemoteFile, destination: &Utf8Path) -> Result<(), DatasetError> {
        let request = self.authorize(self.client.get(&file.source));
        let response = request
            .send()
            .map_err(|err| DatasetError::WebDav(format!("GET {}: {err}", file.source)))?;
        let written = write_response_to_file(response, destination)?;
        debug!(source = %file.source, bytes = written, "downloaded");
        Ok(())
    }
}

/// Append path segments to `base`, percent-encoding each one.
fn join_segments(base: &Url, segments: &[&str], trailing_slash: bool) -> Result<Url, DatasetError> {
    let mut url = base.clone();
    {
        let mut path = url.path_segments_mut().map_err(|_| {
            DatasetError::InvalidConfiguration(format!("{base} cannot be used as a base url"))
        })?;
        path.pop_if_empty();
        path.extend(segments);
        if trailing_slash {
            path.push("");
        }
    }
    Ok(url)
}

fn decoded_path(href: &str) -> String {
    let path = match Url::parse(href) {
        Ok(url) => url.path().to_string(),
        Err(_) => href.to_string(),
    };
    percent_decode_str(&path).decode_utf8_lossy().into_owned()
}

/// Parse a `207 Multi-Status` body, skipping the entry for `request_path`.
pub fn parse_multistatus(xml: &str, request_path: &str) -> Result<Vec<DavEntry>, DatasetError> {
    let document = roxmltree::Document::parse(xml)
        .map_err(|err| DatasetError::WebDav(format!("invalid multistatus body: {err}")))?;
    let requested = decoded_path(request_path);
    let requested = requested.trim_end_matches('/');

    let mut entries = Vec::new();
    for response in document
        .descendants()
        .filter(|node| node.is_element() && node.tag_name().name() == "response")
    {
        let Some(href) = response
            .descendants()
            .find(|node| node.is_element() && node.tag_name().name() == "href")
            .and_then(|node| node.text())
        else {
            continue;
        };
        let path = decoded_path(href.trim());
        let trimmed = path.trim_end_matches('/');
        if trimmed == requested {
            continue;
        }
        let Some(name) = trimmed.rsplit('/').next().filter(|name| !name.is_empty()) else {
            continue;
        };
        let is_collection = response.descendants().any(|node| {
            node.is_element()
                && node.tag_name().name() == "collection"
                && node
                    .parent_element()
                    .map(|parent| parent.tag_name().name() == "resourcetype")
                    .unwrap_or(false)
        });
        let size = response
            .descendants()
            .find(|node| node.is_element() && node.tag_name().name() == "getcontentlength")
            .and_then(|node| node.text())
            .and_then(|text| text.trim().parse::<u64>().ok());
        entries.push(DavEntry {
            name: name.to_string(),
            is_collection,
            size,
        });
    }
    Ok(entries)
}
