//! Configuration validation logic

use super::Configuration;
use crate::errors::{Result, SiemError};
use reqwest::Url;

impl Configuration {
    /// API must be http(s); an explicit stream URL must be ws(s).
    pub fn validate_endpoints(&self) -> Result<()> {
        let api = Url::parse(&self.api.base_url).map_err(|e| SiemError::ConfigError {
            message: format!("Invalid API base URL {}: {}", self.api.base_url, e),
        })?;
        if !matches!(api.scheme(), "http" | "https") {
            return Err(SiemError::ConfigError {
                message: format!("API base URL must use http or https: {}", self.api.base_url),
            });
        }

        if let Some(stream_url) = &self.stream.url {
            let stream = Url::parse(stream_url).map_err(|e| SiemError::ConfigError {
                message: format!("Invalid stream URL {}: {}", stream_url, e),
            })?;
            if !matches!(stream.scheme(), "ws" | "wss") {
                return Err(SiemError::ConfigError {
                    message: format!("Stream URL must use ws or wss: {}", stream_url),
                });
            }
        }

        if !self.stream.path.starts_with('/') {
            return Err(SiemError::ConfigError {
                message: format!("Stream path must start with '/': {}", self.stream.path),
            });
        }
        Ok(())
    }

    pub fn validate_intervals(&self) -> Result<()> {
        if self.refresh.snapshot_interval_secs == 0 {
            return Err(SiemError::ConfigError {
                message: "Snapshot interval must be at least 1 second".to_string(),
            });
        }
        if self.refresh.health_interval_secs == 0 {
            return Err(SiemError::ConfigError {
                message: "Health interval must be at least 1 second".to_string(),
            });
        }
        if self.stream.retry_delay_ms == 0 {
            return Err(SiemError::ConfigError {
                message: "Stream retry delay must be greater than zero".to_string(),
            });
        }
        if self.api.timeout_ms == 0 {
            return Err(SiemError::ConfigError {
                message: "API timeout must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    pub fn validate_buffer(&self) -> Result<()> {
        if self.buffer.capacity == 0 {
            return Err(SiemError::ConfigError {
                message: "Buffer capacity must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}
