//! HTTP API client
//!
//! `GET /api/logs/latest`, `GET /api/logs/search`, `GET /api/health` and
//! `POST /api/logs/upload` against the configured base URL.

use super::{HealthSource, LogUploader, RemoteSearch, SnapshotSource};
use crate::configuration::Configuration;
use crate::errors::{ChannelKind, Result, SiemError};
use crate::event_processing::{EventParser, HealthStatus, LogPage};
use crate::filter::SearchQuery;
use async_trait::async_trait;
use log::{debug, warn};
use reqwest::{multipart, Client, Url};
use serde::Deserialize;
use std::path::Path;

const LATEST_PATH: &str = "/api/logs/latest";
const SEARCH_PATH: &str = "/api/logs/search";
const HEALTH_PATH: &str = "/api/health";
const UPLOAD_PATH: &str = "/api/logs/upload";

/// File types the upload endpoint accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadFormat {
    Csv,
    Json,
    Log,
    Text,
}

impl UploadFormat {
    pub fn all() -> Vec<UploadFormat> {
        vec![Self::Csv, Self::Json, Self::Log, Self::Text]
    }

    pub fn extension(&self) -> &'static str {
        match self {
            UploadFormat::Csv => "csv",
            UploadFormat::Json => "json",
            UploadFormat::Log => "log",
            UploadFormat::Text => "txt",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            UploadFormat::Csv => "text/csv",
            UploadFormat::Json => "application/json",
            UploadFormat::Log | UploadFormat::Text => "text/plain",
        }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        Self::all()
            .into_iter()
            .find(|format| format.extension() == extension)
            .ok_or_else(|| SiemError::InvalidUpload {
                path: path.display().to_string(),
                reason: format!(
                    "unsupported file type; expected one of {:?}",
                    Self::all().iter().map(|f| f.extension()).collect::<Vec<_>>()
                ),
            })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct UploadReceipt {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, alias = "processed")]
    pub count: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: Url,
    http: Client,
}

impl ApiClient {
    pub fn new(config: &Configuration) -> Result<Self> {
        let base_url = Url::parse(&config.api.base_url).map_err(|e| SiemError::ConfigError {
            message: format!("Invalid API base URL {}: {}", config.api.base_url, e),
        })?;
        let http = Client::builder()
            .timeout(config.api_timeout())
            .build()
            .map_err(|e| SiemError::ConfigError {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self { base_url, http })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn endpoint(&self, path: &str) -> Url {
        let mut url = self.base_url.clone();
        let prefix = url.path().trim_end_matches('/').to_string();
        url.set_path(&format!("{}{}", prefix, path));
        url
    }

    async fn get_text(
        &self,
        channel: ChannelKind,
        url: Url,
        query: &[(&'static str, String)],
    ) -> Result<String> {
        debug!("GET {} ({})", url, channel);

        let response = self
            .http
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| SiemError::transport(channel, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SiemError::transport(
                channel,
                format!("server returned status {}", status),
            ));
        }

        response
            .text()
            .await
            .map_err(|e| SiemError::transport(channel, e))
    }
}

#[async_trait]
impl SnapshotSource for ApiClient {
    async fn fetch_latest(&self) -> Result<LogPage> {
        let body = self
            .get_text(ChannelKind::Snapshot, self.endpoint(LATEST_PATH), &[])
            .await?;
        EventParser::parse_logs_response(ChannelKind::Snapshot, &body)
    }
}

#[async_trait]
impl RemoteSearch for ApiClient {
    async fn search(&self, query: &SearchQuery) -> Result<LogPage> {
        let body = self
            .get_text(
                ChannelKind::Search,
                self.endpoint(SEARCH_PATH),
                &query.to_query_pairs(),
            )
            .await?;
        EventParser::parse_logs_response(ChannelKind::Search, &body)
    }
}

#[async_trait]
impl HealthSource for ApiClient {
    async fn check_health(&self) -> Result<HealthStatus> {
        let body = self
            .get_text(ChannelKind::Health, self.endpoint(HEALTH_PATH), &[])
            .await?;
        EventParser::parse_health(&body)
    }
}

#[async_trait]
impl LogUploader for ApiClient {
    async fn upload(&self, path: &Path) -> Result<UploadReceipt> {
        let format = UploadFormat::from_path(path)?;
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload")
            .to_string();

        let part = multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(format.mime_type())
            .map_err(|e| SiemError::transport(ChannelKind::Upload, e))?;
        let form = multipart::Form::new().part("file", part);

        let response = self
            .http
            .post(self.endpoint(UPLOAD_PATH))
            .multipart(form)
            .send()
            .await
            .map_err(|e| SiemError::transport(ChannelKind::Upload, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SiemError::transport(ChannelKind::Upload, e))?;

        if !status.is_success() {
            warn!("Upload of {} failed with status {}", path.display(), status);
            return Err(SiemError::transport(
                ChannelKind::Upload,
                format!("server returned status {}: {}", status, body.trim()),
            ));
        }

        serde_json::from_str(&body).map_err(|e| SiemError::decode(ChannelKind::Upload, e))
    }
}
