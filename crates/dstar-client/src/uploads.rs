//! HTTP side-channel for data files.
//!
//! Files are uploaded before a session starts; the server answers with the
//! path it stored them under, and that path is what goes into `data_files`.

use std::path::Path;

use dstar_core::UploadError;
use dstar_settings::ClientSettings;
use reqwest::Url;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

/// A file stored on the server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedFile {
    /// Name as reported by the server.
    pub filename: String,
    /// Server-side path; the identifier used in start commands.
    pub path: String,
    /// Size in bytes.
    pub size: u64,
}

impl UploadedFile {
    /// Name the file is stored under on the server, which is what delete
    /// expects. The server prefixes uploads with a short id, so this differs
    /// from [`Self::filename`] right after an upload.
    pub fn stored_name(&self) -> &str {
        self.path
            .rsplit(|c: char| c == '/' || c == '\\')
            .next()
            .filter(|name| !name.is_empty())
            .unwrap_or(self.filename.as_str())
    }
}

/// Response of the health probe.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    /// `healthy` when the server is up.
    pub status: String,
    /// Service name.
    pub service: String,
    /// Server version.
    pub version: String,
}

#[derive(Deserialize)]
struct FileList {
    files: Vec<UploadedFile>,
}

/// Client for the upload endpoints.
#[derive(Clone, Debug)]
pub struct UploadClient {
    http: reqwest::Client,
    base: Url,
    api_prefix: String,
}

impl UploadClient {
    /// Client for a server base URL and API path prefix.
    pub fn new(base_url: &str, api_prefix: &str) -> Result<Self, UploadError> {
        let base = Url::parse(base_url).map_err(|e| UploadError::InvalidUrl {
            url: base_url.to_owned(),
            reason: e.to_string(),
        })?;
        if base.cannot_be_a_base() {
            return Err(UploadError::InvalidUrl {
                url: base_url.to_owned(),
                reason: "URL cannot carry a path".into(),
            });
        }
        Ok(Self {
            http: reqwest::Client::new(),
            base,
            api_prefix: api_prefix.trim_matches('/').to_owned(),
        })
    }

    /// Client for the server named in settings.
    pub fn from_settings(settings: &ClientSettings) -> Result<Self, UploadError> {
        Self::new(&settings.server.base_url, &settings.server.api_prefix)
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            let _ = path.pop_if_empty();
            for part in self.api_prefix.split('/').filter(|p| !p.is_empty()) {
                let _ = path.push(part);
            }
            for segment in segments {
                let _ = path.push(segment);
            }
        }
        url
    }

    /// Upload one local file.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub async fn upload(&self, path: &Path) -> Result<UploadedFile, UploadError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| UploadError::ReadFile {
                path: path.display().to_string(),
                source,
            })?;
        let name = path
            .file_name()
            .map_or_else(|| "upload".to_owned(), |n| n.to_string_lossy().into_owned());
        let size = bytes.len();

        let form = Form::new().part("file", Part::bytes(bytes).file_name(name));
        let url = self.endpoint(&["upload"]);
        let response = self
            .http
            .post(url.clone())
            .multipart(form)
            .send()
            .await
            .map_err(|e| request_error(&url, e))?;
        let file: UploadedFile = decode(&url, response).await?;
        info!(stored = %file.path, size, "uploaded");
        Ok(file)
    }

    /// Files currently stored on the server.
    pub async fn list(&self) -> Result<Vec<UploadedFile>, UploadError> {
        let url = self.endpoint(&["uploads"]);
        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|e| request_error(&url, e))?;
        let list: FileList = decode(&url, response).await?;
        Ok(list.files)
    }

    /// Delete a stored file by its stored name.
    pub async fn delete(&self, stored_name: &str) -> Result<(), UploadError> {
        let url = self.endpoint(&["uploads", stored_name]);
        let response = self
            .http
            .delete(url.clone())
            .send()
            .await
            .map_err(|e| request_error(&url, e))?;
        let _ = check_status(&url, response).await?;
        debug!(stored_name, "deleted upload");
        Ok(())
    }

    /// Delete an upload, logging instead of returning failures.
    pub async fn discard(&self, file: &UploadedFile) {
        if let Err(e) = self.delete(file.stored_name()).await {
            warn!(file = %file.path, error = %e, "failed to delete upload");
        }
    }

    /// Probe the server's root endpoint.
    pub async fn health(&self) -> Result<HealthStatus, UploadError> {
        let mut url = self.base.clone();
        url.set_path("/");
        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|e| request_error(&url, e))?;
        decode(&url, response).await
    }
}

fn request_error(url: &Url, e: reqwest::Error) -> UploadError {
    UploadError::Request {
        url: url.to_string(),
        source: Box::new(e),
    }
}

async fn check_status(url: &Url, response: reqwest::Response) -> Result<reqwest::Response, UploadError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(UploadError::Status {
        url: url.to_string(),
        status: status.as_u16(),
        body,
    })
}

async fn decode<T: serde::de::DeserializeOwned>(
    url: &Url,
    response: reqwest::Response,
) -> Result<T, UploadError> {
    let response = check_status(url, response).await?;
    response.json().await.map_err(|e| UploadError::Decode {
        url: url.to_string(),
        reason: e.to_string(),
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
