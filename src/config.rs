use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  /// Base URL of the upstream origin; relative paths resolve against it
  pub origin: Url,
  /// SQLite file for caches and the pending log (defaults to the data dir)
  pub database: Option<PathBuf>,
  /// Per-request timeout for the HTTP transport (none by default)
  pub request_timeout_secs: Option<u64>,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub sync: SyncConfig,
  #[serde(default)]
  pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  /// Namespace name prefix
  pub prefix: String,
  /// Version tag; bump it to replace every namespace on activation
  pub version: String,
  /// Assets fetched all-or-nothing at install time
  pub static_assets: Vec<String>,
  /// Path prefixes served cache-first
  pub static_prefixes: Vec<String>,
  pub api_prefix: String,
  /// API paths whose GET responses are cached; empty caches every API GET
  pub api_cache: Vec<String>,
  /// Page served to navigations that miss the cache while offline
  pub offline_page: String,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      prefix: "ponyxpress".to_string(),
      version: "v1".to_string(),
      static_assets: vec!["/".to_string()],
      static_prefixes: vec!["/static/".to_string()],
      api_prefix: "/api/".to_string(),
      api_cache: Vec::new(),
      offline_page: "/".to_string(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
  /// Periodic reconciliation while online
  pub interval_secs: u64,
  /// How often the origin is probed for connectivity
  pub probe_interval_secs: u64,
  pub probe_path: String,
  /// Drop a pending request after this many rejected replays (no cap by default)
  pub max_attempts: Option<u32>,
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      interval_secs: 300,
      probe_interval_secs: 15,
      probe_path: "/".to_string(),
      max_attempts: None,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
  /// Filter directive used when RUST_LOG is unset
  pub level: String,
  /// Daily-rolling log file; stderr when unset
  pub file: Option<PathBuf>,
}

impl Default for LogConfig {
  fn default() -> Self {
    Self {
      level: "info".to_string(),
      file: None,
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./parcel-gateway.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/parcel-gateway/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/parcel-gateway/config.yaml\n\
                 See config.example.yaml for the format."
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("parcel-gateway.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("parcel-gateway").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn from_yaml(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))?;
    config.validate()?;
    Ok(config)
  }

  fn validate(&self) -> Result<()> {
    if self.origin.cannot_be_a_base() {
      return Err(eyre!("origin must be a base URL, got {}", self.origin));
    }
    if self.cache.version.trim().is_empty() {
      return Err(eyre!("cache.version must not be empty"));
    }
    if !self.cache.api_prefix.starts_with('/') {
      return Err(eyre!("cache.api_prefix must start with '/'"));
    }
    if self.sync.probe_interval_secs == 0 || self.sync.interval_secs == 0 {
      return Err(eyre!("sync intervals must be greater than zero"));
    }
    Ok(())
  }
}
