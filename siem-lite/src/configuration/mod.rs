//! Unified Configuration System
//!
//! Combines defaults, a YAML, JSON or TOML configuration file, environment variables
//! and command line flags into one validated [`Configuration`].
//!
//! # Basic Usage
//!
//! ```rust
//! use siem_lite::configuration::Configuration;
//!
//! let config = Configuration::builder()
//!     .from_cli_args(&["--api-url", "http://siem.internal:5000", "--capacity", "250"])
//!     .unwrap()
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(config.buffer_capacity(), 250);
//! assert_eq!(config.stream_url().unwrap(), "ws://siem.internal:5000/api/socket");
//! ```

pub mod builder;
pub mod types;
pub mod validation;

pub use builder::ConfigurationBuilder;
pub use types::*;

use crate::errors::{Result, SiemError};
use reqwest::Url;
use std::collections::HashSet;
use std::sync::OnceLock;
use std::time::Duration;

/// Validated runtime configuration for one dashboard session.
///
/// # Examples
///
/// ```rust
/// use siem_lite::configuration::Configuration;
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Configuration::builder().build()?;
/// assert_eq!(config.buffer_capacity(), 100);
/// assert!(config.is_known_event_type("login_failed"));
/// assert!(!config.is_known_event_type("COFFEE_BREAK"));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Configuration {
    pub api: Api,
    pub stream: Stream,
    pub refresh: Refresh,
    pub buffer: Buffer,
    pub catalog: Catalog,
    pub severity: SeverityRules,
    pub output: Output,
    #[doc(hidden)]
    cached_event_types: OnceLock<HashSet<String>>,
}

impl Configuration {
    pub fn builder() -> ConfigurationBuilder {
        ConfigurationBuilder::new()
    }

    pub(crate) fn from_sections(
        api: Api,
        stream: Stream,
        refresh: Refresh,
        buffer: Buffer,
        catalog: Catalog,
        severity: SeverityRules,
        output: Output,
    ) -> Self {
        Self {
            api,
            stream,
            refresh,
            buffer,
            catalog,
            severity,
            output,
            cached_event_types: OnceLock::new(),
        }
    }

    /// Run every section check.
    pub fn validate(&self) -> Result<()> {
        self.validate_endpoints()?;
        self.validate_intervals()?;
        self.validate_buffer()?;
        Ok(())
    }

    pub fn buffer_capacity(&self) -> usize {
        self.buffer.capacity
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_millis(self.api.timeout_ms)
    }

    pub fn snapshot_interval(&self) -> Duration {
        Duration::from_secs(self.refresh.snapshot_interval_secs)
    }

    pub fn health_interval(&self) -> Duration {
        Duration::from_secs(self.refresh.health_interval_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.stream.retry_delay_ms)
    }

    pub fn is_verbose(&self) -> bool {
        self.output.verbose
    }

    /// Websocket endpoint, either configured directly or derived from the API URL.
    pub fn stream_url(&self) -> Result<String> {
        if let Some(url) = &self.stream.url {
            return Ok(url.clone());
        }

        let mut url = Url::parse(&self.api.base_url).map_err(|e| SiemError::ConfigError {
            message: format!("Invalid API base URL {}: {}", self.api.base_url, e),
        })?;
        let scheme = match url.scheme() {
            "https" => "wss",
            _ => "ws",
        };
        url.set_scheme(scheme).map_err(|_| SiemError::ConfigError {
            message: format!("Cannot derive websocket URL from {}", self.api.base_url),
        })?;
        url.set_path(&self.stream.path);
        Ok(url.to_string())
    }

    /// Case-insensitive catalog lookup, cached on first use.
    pub fn is_known_event_type(&self, event_type: &str) -> bool {
        let cache = self.cached_event_types.get_or_init(|| {
            self.catalog
                .event_types
                .iter()
                .map(|t| t.to_ascii_uppercase())
                .collect()
        });
        cache.contains(&event_type.to_ascii_uppercase())
    }

    /// Render as a configuration file.
    pub fn to_yaml(&self) -> Result<String> {
        let file = ConfigFile {
            api: Some(self.api.clone()),
            stream: Some(self.stream.clone()),
            refresh: Some(self.refresh.clone()),
            buffer: Some(self.buffer.clone()),
            catalog: Some(self.catalog.clone()),
            severity: Some(self.severity.clone()),
            output: Some(self.output.clone()),
        };
        serde_yaml::to_string(&file).map_err(|e| SiemError::ConfigError {
            message: format!("Failed to render configuration: {}", e),
        })
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self::from_sections(
            Api::default(),
            Stream::default(),
            Refresh::default(),
            Buffer::default(),
            Catalog::default(),
            SeverityRules::default(),
            Output::default(),
        )
    }
}
