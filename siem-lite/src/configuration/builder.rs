//! Configuration Builder
//!
//! Layers configuration sources in call order: later sources override
//! earlier ones, and `build()` validates the result.

use super::{
    Api, Buffer, Catalog, ConfigFile, Configuration, Output, OutputFormat, Refresh,
    SeverityRules, Stream,
};
use crate::errors::{Result, SiemError};
use std::fs;
use std::path::Path;

pub const ENV_API_URL: &str = "SIEM_API_URL";
pub const ENV_STREAM_URL: &str = "SIEM_STREAM_URL";
pub const ENV_BUFFER_CAPACITY: &str = "SIEM_BUFFER_CAPACITY";

#[derive(Debug)]
pub struct ConfigurationBuilder {
    api: Api,
    stream: Stream,
    refresh: Refresh,
    buffer: Buffer,
    catalog: Catalog,
    severity: SeverityRules,
    output: Output,
}

impl ConfigurationBuilder {
    pub fn new() -> Self {
        Self {
            api: Api::default(),
            stream: Stream::default(),
            refresh: Refresh::default(),
            buffer: Buffer::default(),
            catalog: Catalog::default(),
            severity: SeverityRules::default(),
            output: Output::default(),
        }
    }

    /// Configure from command line style flags. Unknown flags are skipped.
    pub fn from_cli_args(mut self, args: &[&str]) -> Result<Self> {
        let mut i = 0;
        while i < args.len() {
            match args[i] {
                "--api-url" => {
                    self.api.base_url = value_for(args, i)?.to_string();
                    i += 2;
                }
                "--stream-url" => {
                    self.stream.url = Some(value_for(args, i)?.to_string());
                    i += 2;
                }
                "--capacity" => {
                    self.buffer.capacity = parse_number(args, i)?;
                    i += 2;
                }
                "--snapshot-interval" => {
                    self.refresh.snapshot_interval_secs = parse_number(args, i)?;
                    i += 2;
                }
                "--health-interval" => {
                    self.refresh.health_interval_secs = parse_number(args, i)?;
                    i += 2;
                }
                "--max-retries" => {
                    self.stream.max_retries = parse_number(args, i)?;
                    i += 2;
                }
                "--retry-delay-ms" => {
                    self.stream.retry_delay_ms = parse_number(args, i)?;
                    i += 2;
                }
                "--no-backfill" => {
                    self.stream.backfill_on_reconnect = false;
                    i += 1;
                }
                "--verbose" | "-v" => {
                    self.output.verbose = true;
                    i += 1;
                }
                "--format" | "-f" => {
                    let value = value_for(args, i)?;
                    self.output.format =
                        OutputFormat::parse(value).ok_or_else(|| SiemError::ConfigError {
                            message: format!(
                                "Invalid output format: {}. Valid formats: plain, json, csv",
                                value
                            ),
                        })?;
                    i += 2;
                }
                _ => {
                    i += 1;
                }
            }
        }

        Ok(self)
    }

    /// Configure from a YAML, JSON or TOML file, picked by extension.
    pub fn from_config_file<P: AsRef<Path>>(self, path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| SiemError::ConfigError {
            message: format!("Failed to read config file {}: {}", path.display(), e),
        })?;

        match path.extension().and_then(|s| s.to_str()) {
            Some("toml") => self.from_toml_str(&content),
            Some("json") => self.from_json_str(&content),
            _ if content.trim_start().starts_with('{') => self.from_json_str(&content),
            _ => self.from_yaml_str(&content),
        }
    }

    pub fn from_yaml_str(self, yaml: &str) -> Result<Self> {
        let file: ConfigFile = serde_yaml::from_str(yaml).map_err(|e| SiemError::ConfigError {
            message: format!("Failed to parse YAML config: {}", e),
        })?;
        Ok(self.merge_file(file))
    }

    pub fn from_toml_str(self, toml: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(toml).map_err(|e| SiemError::ConfigError {
            message: format!("Failed to parse TOML config: {}", e),
        })?;
        Ok(self.merge_file(file))
    }

    pub fn from_json_str(self, json: &str) -> Result<Self> {
        let file: ConfigFile = serde_json::from_str(json).map_err(|e| SiemError::ConfigError {
            message: format!("Failed to parse JSON config: {}", e),
        })?;
        Ok(self.merge_file(file))
    }

    /// Configure from `SIEM_*` environment variables.
    pub fn from_environment(self) -> Result<Self> {
        self.from_env_vars(std::env::vars())
    }

    pub fn from_env_vars<I, K, V>(mut self, vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in vars {
            let value = value.as_ref();
            match key.as_ref() {
                ENV_API_URL => self.api.base_url = value.to_string(),
                ENV_STREAM_URL => self.stream.url = Some(value.to_string()),
                ENV_BUFFER_CAPACITY => {
                    self.buffer.capacity =
                        value.parse().map_err(|_| SiemError::ConfigError {
                            message: format!("Invalid {}: {}", ENV_BUFFER_CAPACITY, value),
                        })?;
                }
                _ => {}
            }
        }
        Ok(self)
    }

    pub fn build(self) -> Result<Configuration> {
        let config = Configuration::from_sections(
            self.api,
            self.stream,
            self.refresh,
            self.buffer,
            self.catalog,
            self.severity,
            self.output,
        );

        config.validate()?;
        Ok(config)
    }

    fn merge_file(mut self, file: ConfigFile) -> Self {
        if let Some(api) = file.api {
            self.api = api;
        }
        if let Some(stream) = file.stream {
            self.stream = stream;
        }
        if let Some(refresh) = file.refresh {
            self.refresh = refresh;
        }
        if let Some(buffer) = file.buffer {
            self.buffer = buffer;
        }
        if let Some(catalog) = file.catalog {
            self.catalog = catalog;
        }
        if let Some(severity) = file.severity {
            self.severity = severity;
        }
        if let Some(output) = file.output {
            self.output = output;
        }
        self
    }
}

impl Default for ConfigurationBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn value_for<'a>(args: &[&'a str], i: usize) -> Result<&'a str> {
    args.get(i + 1).copied().ok_or_else(|| SiemError::ConfigError {
        message: format!("Missing value for {}", args[i]),
    })
}

fn parse_number<T: std::str::FromStr>(args: &[&str], i: usize) -> Result<T> {
    let value = value_for(args, i)?;
    value.parse().map_err(|_| SiemError::ConfigError {
        message: format!("Invalid value for {}: {}", args[i], value),
    })
}
