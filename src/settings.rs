//! Client settings.
//!
//! Endpoints and the asset MIME allow-list can be overridden from an
//! optional TOML file. Precedence, lowest first: built-in defaults, the
//! settings file, environment variables, command-line flags.
//!
//! ```toml
//! [endpoints]
//! upload   = "http://api.dodo-doc.com/project/upload"
//! contents = "https://contents.dodo-doc.com/"
//! projects = "https://contents.dodo-doc.com/projects/v1"
//!
//! [http]
//! timeout_secs = 30
//!
//! [assets]
//! mime_types = { png = "image/png", svg = "image/svg+xml" }
//! ```
//!
//! The file is read from `--settings <path>`, or from
//! `$HOME/.config/dodo/settings.toml` when that exists.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::assets::MimeAllowList;
use crate::client::{ClientError, Endpoint, API_KEY_ENV};

pub const ENDPOINT_ENV: &str = "DODO_ENDPOINT";
pub const CONTENTS_ENDPOINT_ENV: &str = "DODO_CONTENTS_ENDPOINT";

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to read settings file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse settings file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid `endpoints.{key}`: {source}")]
    Endpoint {
        key: &'static str,
        source: ClientError,
    },

    #[error("invalid MIME type for `.{extension}`: {value}")]
    MimeType { extension: String, value: String },

    #[error("`http.timeout_secs` must be greater than 0")]
    Timeout,
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    #[serde(default)]
    pub endpoints: EndpointSettings,
    #[serde(default)]
    pub http: HttpSettings,
    #[serde(default)]
    pub assets: AssetSettings,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct EndpointSettings {
    #[serde(default = "default_upload")]
    pub upload: String,
    #[serde(default = "default_contents")]
    pub contents: String,
    #[serde(default = "default_projects")]
    pub projects: String,
}

impl Default for EndpointSettings {
    fn default() -> Self {
        Self {
            upload: default_upload(),
            contents: default_contents(),
            projects: default_projects(),
        }
    }
}

fn default_upload() -> String {
    "http://api.dodo-doc.com/project/upload".to_string()
}
fn default_contents() -> String {
    "https://contents.dodo-doc.com/".to_string()
}
fn default_projects() -> String {
    "https://contents.dodo-doc.com/projects/v1".to_string()
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct HttpSettings {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct AssetSettings {
    /// Replaces the built-in allow-list when set.
    #[serde(default)]
    pub mime_types: Option<BTreeMap<String, String>>,
}

impl Settings {
    /// Load settings from `path`, or from the default location when it
    /// exists, then apply environment overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        let file = match path {
            Some(p) => Some(p.to_path_buf()),
            None => default_path().filter(|p| p.is_file()),
        };
        let mut settings = match file {
            Some(p) => Self::from_file(&p)?,
            None => Self::default(),
        };
        settings.apply_env(|key| std::env::var(key).ok());
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let settings: Settings = toml::from_str(&content).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "loaded settings");
        Ok(settings)
    }

    /// Override endpoints from `DODO_ENDPOINT` and `DODO_CONTENTS_ENDPOINT`.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(upload) = var(ENDPOINT_ENV).filter(|v| !v.is_empty()) {
            self.endpoints.upload = upload;
        }
        if let Some(contents) = var(CONTENTS_ENDPOINT_ENV).filter(|v| !v.is_empty()) {
            self.endpoints.contents = contents;
        }
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        self.upload_endpoint()?;
        self.contents_endpoint()?;
        self.projects_endpoint()?;
        if self.http.timeout_secs == 0 {
            return Err(SettingsError::Timeout);
        }
        for (extension, value) in self.assets.mime_types.iter().flatten() {
            if !value.contains('/') {
                return Err(SettingsError::MimeType {
                    extension: extension.clone(),
                    value: value.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn upload_endpoint(&self) -> Result<Endpoint, SettingsError> {
        endpoint("upload", &self.endpoints.upload)
    }

    pub fn contents_endpoint(&self) -> Result<Endpoint, SettingsError> {
        endpoint("contents", &self.endpoints.contents)
    }

    pub fn projects_endpoint(&self) -> Result<Endpoint, SettingsError> {
        endpoint("projects", &self.endpoints.projects)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.http.timeout_secs)
    }

    pub fn mime_allow_list(&self) -> MimeAllowList {
        match &self.assets.mime_types {
            Some(map) => MimeAllowList::new(map.iter().map(|(k, v)| (k, v.clone()))),
            None => MimeAllowList::default(),
        }
    }
}

fn endpoint(key: &'static str, value: &str) -> Result<Endpoint, SettingsError> {
    Endpoint::parse(value).map_err(|source| SettingsError::Endpoint { key, source })
}

/// `$HOME/.config/dodo/settings.toml`.
pub fn default_path() -> Option<PathBuf> {
    std::env::var_os("HOME").map(|home| {
        PathBuf::from(home)
            .join(".config")
            .join("dodo")
            .join("settings.toml")
    })
}

/// The API key from `DODO_API_KEY`; empty when unset.
pub fn api_key() -> String {
    std::env::var(API_KEY_ENV).unwrap_or_default()
}
