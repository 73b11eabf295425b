//! Configuration type definitions
//!
//! Every section deserializes with defaults so a config file only needs
//! to mention the values it changes.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Api {
    pub base_url: String,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Stream {
    /// Full websocket URL. Derived from `api.base_url` and `path` when unset.
    pub url: Option<String>,
    pub path: String,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    /// Fetch a snapshot whenever the stream comes back after a drop.
    pub backfill_on_reconnect: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Refresh {
    pub snapshot_interval_secs: u64,
    pub health_interval_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Buffer {
    pub capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Catalog {
    pub event_types: Vec<String>,
}

/// Keyword lists for the severity fallback, checked critical first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeverityRules {
    pub critical: Vec<String>,
    pub high: Vec<String>,
    pub medium: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Plain,
    Json,
    Csv,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Plain => "plain",
            OutputFormat::Json => "json",
            OutputFormat::Csv => "csv",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "plain" | "text" => Some(OutputFormat::Plain),
            "json" => Some(OutputFormat::Json),
            "csv" => Some(OutputFormat::Csv),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Output {
    pub verbose: bool,
    pub format: OutputFormat,
}

/// On-disk layout. Sections that are present replace the builder's section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ConfigFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api: Option<Api>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<Stream>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh: Option<Refresh>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buffer: Option<Buffer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog: Option<Catalog>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<SeverityRules>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Output>,
}

impl Default for Api {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            timeout_ms: 10_000,
        }
    }
}

impl Default for Stream {
    fn default() -> Self {
        Self {
            url: None,
            path: "/api/socket".to_string(),
            max_retries: 5,
            retry_delay_ms: 1_000,
            backfill_on_reconnect: true,
        }
    }
}

impl Default for Refresh {
    fn default() -> Self {
        Self {
            snapshot_interval_secs: 10,
            health_interval_secs: 60,
        }
    }
}

impl Default for Buffer {
    fn default() -> Self {
        Self { capacity: 100 }
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self {
            event_types: [
                "LOGIN_SUCCESS",
                "LOGIN_FAILED",
                "LOGOUT",
                "ACCESS_DENIED",
                "FILE_ACCESS",
                "NETWORK_CONNECTION",
                "FIREWALL_BLOCK",
                "MALWARE_DETECTED",
                "SUSPICIOUS_ACTIVITY",
                "SYSTEM_ERROR",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

impl Default for SeverityRules {
    fn default() -> Self {
        Self {
            critical: vec!["critical".to_string(), "malware".to_string()],
            high: vec![
                "failed".to_string(),
                "denied".to_string(),
                "block".to_string(),
            ],
            medium: vec!["warning".to_string(), "suspicious".to_string()],
        }
    }
}
