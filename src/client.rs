//! HTTP client for the dodo-doc service.
//!
//! | Operation | Request | Response |
//! |-----------|---------|----------|
//! | [`Client::upload`] | multipart `POST` (`metadata`, `archive`) | `{status, message, documentURL}` |
//! | [`Client::search`] | `POST <contents>/search/v1` `{query, projects}` | `{records: [...]}` |
//! | [`Client::read_document`] | `GET <contents>/document/v1/<slug>/<path>?format=markdown` | `{markdown}` |
//! | [`Client::projects`] | `GET <projects>` | `{projects: [...]}` |
//!
//! Every request carries `Authorization: Bearer <DODO_API_KEY>`.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};

use crate::manifest::Manifest;

pub const API_KEY_ENV: &str = "DODO_API_KEY";

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("the endpoint URL must include a scheme and a host")]
    NoHost,

    #[error("failed to parse the endpoint URL: {0}")]
    InvalidEndpoint(String),

    #[error("failed to parse the document URL: {0}")]
    InvalidDocumentUrl(String),

    #[error("invalid document URL format")]
    DocumentUrlFormat,

    #[error("the API key is empty. Please set the environment variable DODO_API_KEY")]
    MissingApiKey,

    #[error("failed to send a request to the server: {0}")]
    Request(#[from] reqwest::Error),

    #[error("failed to upload file: Status {status}, {body}")]
    Upload { status: u16, body: String },

    #[error("the server returned non-200 status code: {0}")]
    Status(u16),

    #[error("failed to parse the response: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("the response does not contain markdown data")]
    NoMarkdown,

    #[error("failed to read the archive {}: {source}", path.display())]
    Archive {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to serialize metadata: {0}")]
    Metadata(#[source] serde_json::Error),
}

/// A service base URL with a scheme and a host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint(String);

impl Endpoint {
    pub fn parse(base: &str) -> Result<Self, ClientError> {
        let url = Url::parse(base).map_err(|e| ClientError::InvalidEndpoint(e.to_string()))?;
        match url.host_str() {
            Some(host) if !host.is_empty() => {}
            _ => return Err(ClientError::NoHost),
        }
        Ok(Self(base.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn base(&self) -> &str {
        self.0.trim_end_matches('/')
    }

    pub fn search_url(&self) -> String {
        format!("{}/search/v1", self.base())
    }

    pub fn document_url(&self, slug: &str, path: &str) -> String {
        let joined = std::iter::once(slug)
            .chain(path.split('/'))
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("/");
        format!("{}/document/v1/{}?format=markdown", self.base(), joined)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Split a published document URL (`https://<slug>.<a>.<b>.<c>/<path>`)
/// into its project slug and path.
pub fn parse_document_url(url: &str) -> Result<(String, String), ClientError> {
    let parsed = Url::parse(url).map_err(|e| ClientError::InvalidDocumentUrl(e.to_string()))?;
    let host = parsed.host_str().unwrap_or_default();
    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() != 4 {
        return Err(ClientError::DocumentUrlFormat);
    }
    Ok((labels[0].to_string(), parsed.path().to_string()))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResponse {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub message: String,
    #[serde(rename = "documentURL", default)]
    pub document_url: String,
}

#[derive(Debug, Clone, Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    #[serde(skip_serializing_if = "no_projects")]
    projects: &'a [String],
}

fn no_projects(projects: &&[String]) -> bool {
    projects.is_empty()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRecord {
    #[serde(default)]
    pub contents: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub project_slug: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    records: Vec<SearchRecord>,
}

#[derive(Debug, Deserialize)]
struct DocumentResponse {
    markdown: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectSummary {
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default)]
    pub organization_id: String,
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub project_name: String,
    #[serde(default)]
    pub slug: String,
}

#[derive(Debug, Deserialize)]
struct ProjectsResponse {
    #[serde(default)]
    projects: Vec<ProjectSummary>,
}

/// Authenticated client.
#[derive(Debug, Clone)]
pub struct Client {
    http: reqwest::Client,
    api_key: String,
}

impl Client {
    /// Fails before any request when `api_key` is empty.
    pub fn new(api_key: &str, timeout: Duration) -> Result<Self, ClientError> {
        if api_key.is_empty() {
            return Err(ClientError::MissingApiKey);
        }
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("dodo/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            api_key: api_key.to_string(),
        })
    }

    /// Upload an archive together with its manifest.
    pub async fn upload(
        &self,
        endpoint: &Endpoint,
        manifest: &Manifest,
        archive: &Path,
    ) -> Result<UploadResponse, ClientError> {
        let metadata = serde_json::to_string(manifest).map_err(ClientError::Metadata)?;
        let bytes = tokio::fs::read(archive)
            .await
            .map_err(|source| ClientError::Archive {
                path: archive.to_path_buf(),
                source,
            })?;
        let file_name = archive
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "dodo.zip".to_string());
        tracing::debug!(endpoint = %endpoint, bytes = bytes.len(), "uploading archive");

        let form = Form::new().text("metadata", metadata).part(
            "archive",
            Part::bytes(bytes)
                .file_name(file_name)
                .mime_str("application/zip")?,
        );
        let resp = self
            .http
            .post(endpoint.as_str())
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        if status != StatusCode::OK {
            return Err(ClientError::Upload {
                status: status.as_u16(),
                body,
            });
        }
        serde_json::from_str(&body).map_err(ClientError::Decode)
    }

    /// Full-text search over published documents.
    pub async fn search(
        &self,
        endpoint: &Endpoint,
        query: &str,
        projects: &[String],
    ) -> Result<Vec<SearchRecord>, ClientError> {
        let body = SearchRequest { query, projects };
        let resp = self
            .http
            .post(endpoint.search_url())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        let data: SearchResponse = decode(resp).await?;
        Ok(data.records)
    }

    /// Markdown of the document at `path` in project `slug`.
    pub async fn read_document(
        &self,
        endpoint: &Endpoint,
        slug: &str,
        path: &str,
    ) -> Result<String, ClientError> {
        let resp = self
            .http
            .get(endpoint.document_url(slug, path))
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        let data: DocumentResponse = decode(resp).await?;
        data.markdown.ok_or(ClientError::NoMarkdown)
    }

    /// Projects visible to the API key.
    pub async fn projects(&self, endpoint: &Endpoint) -> Result<Vec<ProjectSummary>, ClientError> {
        let resp = self
            .http
            .get(endpoint.as_str())
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        let data: ProjectsResponse = decode(resp).await?;
        Ok(data.projects)
    }
}

async fn decode<T: serde::de::DeserializeOwned>(resp: reqwest::Response) -> Result<T, ClientError> {
    let status = resp.status();
    if status != StatusCode::OK {
        return Err(ClientError::Status(status.as_u16()));
    }
    let body = resp.bytes().await?;
    serde_json::from_slice(&body).map_err(ClientError::Decode)
}
