//! CLI configuration management.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// CLI configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliConfig {
    /// Log output format.
    #[serde(default)]
    pub log_format: LogFormat,
    /// Try configuration used when `--config` is not given.
    #[serde(default)]
    pub try_config: Option<PathBuf>,
    /// Timeout for pushlog and graph requests, in seconds.
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,
    /// Bound on concurrent task submissions.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_submissions: usize,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::default(),
            try_config: None,
            http_timeout_secs: default_http_timeout(),
            max_concurrent_submissions: default_max_concurrent(),
        }
    }
}

fn default_http_timeout() -> u64 {
    30
}

fn default_max_concurrent() -> usize {
    8
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl CliConfig {
    /// Load configuration from file.
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let path = Self::config_path()?;
        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            Ok(serde_yaml::from_str(&content)?)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file.
    pub fn save(&self) -> Result<(), Box<dyn std::error::Error>> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_yaml::to_string(self)?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Get the configuration file path.
    pub fn config_path() -> Result<PathBuf, Box<dyn std::error::Error>> {
        let dirs = directories::ProjectDirs::from("org", "tcpush", "tcpush")
            .ok_or("Could not determine config directory")?;
        Ok(dirs.config_dir().join("config.yaml"))
    }

    /// Set a configuration value.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), String> {
        match key {
            "log_format" => {
                self.log_format = match value {
                    "text" => LogFormat::Text,
                    "json" => LogFormat::Json,
                    _ => return Err(format!("Invalid log format: {}", value)),
                };
            }
            "try_config" => self.try_config = Some(PathBuf::from(value)),
            "http_timeout_secs" => {
                self.http_timeout_secs = value
                    .parse()
                    .map_err(|_| format!("Invalid timeout: {}", value))?;
            }
            "max_concurrent_submissions" => {
                self.max_concurrent_submissions = match value.parse() {
                    Ok(n) if n > 0 => n,
                    _ => return Err(format!("Invalid submission bound: {}", value)),
                };
            }
            _ => return Err(format!("Unknown config key: {}", key)),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_keys() {
        let config: CliConfig = serde_yaml::from_str("log_format: json\n").unwrap();
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.http_timeout_secs, 30);
        assert_eq!(config.max_concurrent_submissions, 8);
        assert!(config.try_config.is_none());
    }

    #[test]
    fn test_set() {
        let mut config = CliConfig::default();
        config.set("log_format", "json").unwrap();
        config.set("try_config", "/etc/tcpush/try.yml").unwrap();
        config.set("max_concurrent_submissions", "2").unwrap();
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.try_config, Some(PathBuf::from("/etc/tcpush/try.yml")));
        assert_eq!(config.max_concurrent_submissions, 2);

        assert!(config.set("log_format", "xml").is_err());
        assert!(config.set("max_concurrent_submissions", "0").is_err());
        assert!(config.set("api_url", "x").is_err());
    }
}
