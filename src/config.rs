//! Configuration management for metriscope.
//!
//! This module handles loading, merging, and validating configuration from files
//! and CLI arguments. It supports YAML, JSON, and TOML formats.

use crate::cli::{Args, ConfigFormat, LogLevel};
use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

// Default configuration constants
pub const DEFAULT_POLL_INTERVAL_SECONDS: u64 = 1;
pub const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 30;
pub const DEFAULT_RETRY_BACKOFF_SECONDS: u64 = 10;

/// One server target the tool can poll.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerEntry {
    /// Identifier used with --server-id
    pub id: String,

    /// Base URL of the server, e.g. https://repo.example.com/
    pub url: String,

    /// Username for basic auth (anonymous access when unset)
    pub username: Option<String>,

    /// Password or API key paired with the username
    #[serde(alias = "password", alias = "api-key", alias = "api_key")]
    pub credential: Option<String>,

    /// Target used when --server-id is not given
    #[serde(default)]
    pub default: bool,
}

/// Enhanced configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Polling
    #[serde(alias = "poll-interval-seconds", alias = "interval")]
    pub poll_interval_seconds: Option<u64>,
    #[serde(alias = "request-timeout-seconds")]
    pub request_timeout_seconds: Option<u64>,
    #[serde(alias = "retry-backoff-seconds")]
    pub retry_backoff_seconds: Option<u64>,

    // Logging
    pub log_level: Option<String>,
    pub log_file: Option<PathBuf>,

    // Server targets (kept last so TOML output stays valid)
    pub servers: Option<Vec<ServerEntry>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            poll_interval_seconds: Some(DEFAULT_POLL_INTERVAL_SECONDS),
            request_timeout_seconds: Some(DEFAULT_REQUEST_TIMEOUT_SECONDS),
            retry_backoff_seconds: Some(DEFAULT_RETRY_BACKOFF_SECONDS),
            log_level: Some("info".into()),
            log_file: None,
            servers: None,
        }
    }
}

/// Validate effective config (used by --check-config and at startup)
pub fn validate_effective_config(cfg: &Config) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(servers) = &cfg.servers {
        let mut seen = HashSet::new();
        let mut defaults = 0usize;

        for server in servers {
            if server.id.trim().is_empty() {
                return Err("Server entry with empty id".into());
            }
            if !seen.insert(server.id.as_str()) {
                return Err(format!("Duplicate server id '{}'", server.id).into());
            }
            if !(server.url.starts_with("http://") || server.url.starts_with("https://")) {
                return Err(format!(
                    "Server '{}' has invalid url '{}', expected http:// or https://",
                    server.id, server.url
                )
                .into());
            }
            if server.default {
                defaults += 1;
            }
        }

        if defaults > 1 {
            return Err("More than one server is marked as default".into());
        }
    }

    if cfg.poll_interval_seconds == Some(0) {
        return Err("poll_interval_seconds must be at least 1".into());
    }
    if cfg.request_timeout_seconds == Some(0) {
        return Err("request_timeout_seconds must be at least 1".into());
    }

    if let Some(level) = cfg.log_level.as_deref() {
        match level.to_lowercase().as_str() {
            "off" | "error" | "warn" | "info" | "debug" | "trace" => {}
            other => {
                return Err(format!(
                    "Invalid log_level '{}', expected off/error/warn/info/debug/trace",
                    other
                )
                .into());
            }
        }
    }

    Ok(())
}

/// Resolves configuration from CLI args, config file, and defaults.
/// This enforces precedence: CLI (if provided) > config file > default.
pub fn resolve_config(args: &Args) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = if args.no_config {
        Config::default()
    } else {
        load_config(args.config.as_deref().and_then(|p| p.to_str()))?
    };

    if let Some(level) = &args.log_level {
        let name = match level {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        };
        config.log_level = Some(name.to_string());
    }

    if let Some(log_file) = &args.log_file {
        config.log_file = Some(log_file.clone());
    }

    Ok(config)
}

/// Enhanced configuration loading with multiple format support
pub fn load_config(path: Option<&str>) -> Result<Config, Box<dyn std::error::Error>> {
    let path = if let Some(p) = path {
        PathBuf::from(p)
    } else {
        // Try default locations
        let defaults = [
            "/etc/metriscope/config.yaml",
            "/etc/metriscope/config.yml",
            "/etc/metriscope/config.json",
            "./metriscope.yaml",
            "./metriscope.yml",
            "./metriscope.json",
        ];

        defaults
            .iter()
            .find(|p| Path::new(p).exists())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(""))
    };

    if !path.exists() || path.to_string_lossy().is_empty() {
        return Ok(Config::default());
    }

    let content = fs::read_to_string(&path)?;

    match path.extension().and_then(|s| s.to_str()) {
        Some("json") => {
            let config: Config = serde_json::from_str(&content)?;
            info!("Loaded JSON configuration from: {}", path.display());
            Ok(config)
        }
        Some("toml") => {
            let config: Config = toml::from_str(&content)?;
            info!("Loaded TOML configuration from: {}", path.display());
            Ok(config)
        }
        _ => {
            // Default to YAML
            let config: Config = serde_yaml::from_str(&content)?;
            info!("Loaded YAML configuration from: {}", path.display());
            Ok(config)
        }
    }
}

/// Picks the server entry a command should target.
///
/// Precedence: explicit --server-id, then the entry marked default, then a
/// sole configured entry.
pub fn select_server<'a>(
    config: &'a Config,
    requested: Option<&str>,
) -> Result<&'a ServerEntry, Error> {
    let servers = config
        .servers
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::Configuration("no servers configured".to_string()))?;

    if let Some(id) = requested {
        return servers
            .iter()
            .find(|s| s.id == id)
            .ok_or_else(|| Error::Configuration(format!("no server with id '{}'", id)));
    }

    if let Some(default) = servers.iter().find(|s| s.default) {
        return Ok(default);
    }

    if servers.len() == 1 {
        return Ok(&servers[0]);
    }

    Err(Error::Configuration(
        "multiple servers configured, pass --server-id or mark one as default".to_string(),
    ))
}

/// Shows configuration in requested format
pub fn show_config(config: &Config, format: ConfigFormat) -> Result<(), Box<dyn std::error::Error>> {
    let output = match format {
        ConfigFormat::Json => serde_json::to_string_pretty(config)?,
        ConfigFormat::Toml => toml::to_string_pretty(config)?,
        ConfigFormat::Yaml => serde_yaml::to_string(config)?,
    };

    println!("{output}");
    Ok(())
}
