use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::cache::{GenerationNames, SqliteStore};

const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  /// Origin the application is served from; relative static entries resolve against it
  pub origin: String,
  #[serde(default)]
  pub generations: GenerationNames,
  /// Critical same-origin paths and absolute URLs, precached at install
  #[serde(default)]
  pub static_resources: Vec<String>,
  /// Third-party CDN URLs, precached best-effort at install
  #[serde(default)]
  pub bundle_resources: Vec<String>,
  /// Hostname substrings that are never intercepted (realtime backend, auth)
  #[serde(default)]
  pub excluded_hosts: Vec<String>,
  /// Network fetch timeout in seconds
  pub fetch_timeout_secs: Option<u64>,
  #[serde(default)]
  pub storage: StorageConfig,
  /// Also write logs to this file
  pub log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
  /// Keep the cache on disk between runs
  #[serde(default = "default_persist")]
  pub persist: bool,
  /// Database location (default: $XDG_DATA_HOME/swguard/cache.db)
  pub path: Option<PathBuf>,
}

fn default_persist() -> bool {
  true
}

impl Default for StorageConfig {
  fn default() -> Self {
    Self {
      persist: default_persist(),
      path: None,
    }
  }
}

/// Resource sets resolved to absolute URLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
  pub origin: Url,
  pub static_resources: Vec<Url>,
  pub bundle_resources: Vec<Url>,
  pub excluded_hosts: Vec<String>,
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./swguard.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/swguard/config.yaml
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
        "No configuration file found. Create one at ~/.config/swguard/config.yaml\n\
                 See swguard.example.yaml for the format."
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("swguard.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("swguard").join("config.yaml");
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
      .map_err(|e| eyre!("Invalid config file {}: {}", path.display(), e))
  }

  pub fn from_yaml(contents: &str) -> Result<Self> {
    let config: Config =
      serde_yaml::from_str(contents).map_err(|e| eyre!("Failed to parse config: {}", e))?;

    config.validate()?;
    Ok(config)
  }

  /// Check the parts that would otherwise only fail at install time.
  pub fn validate(&self) -> Result<()> {
    self.manifest()?;

    if self.fetch_timeout_secs == Some(0) {
      return Err(eyre!("fetch_timeout_secs must be at least 1"));
    }

    let [static_assets, bundle, dynamic] = self.generations.current();
    if [static_assets, bundle, dynamic].iter().any(|n| n.trim().is_empty()) {
      return Err(eyre!("Generation names must not be empty"));
    }
    if static_assets == bundle || static_assets == dynamic || bundle == dynamic {
      return Err(eyre!(
        "Generation names must be distinct (got {}, {}, {})",
        static_assets,
        bundle,
        dynamic
      ));
    }

    Ok(())
  }

  /// Resolve origin and resource lists to absolute URLs.
  pub fn manifest(&self) -> Result<Manifest> {
    let origin =
      Url::parse(&self.origin).map_err(|e| eyre!("Invalid origin '{}': {}", self.origin, e))?;

    if !matches!(origin.scheme(), "http" | "https") || origin.host_str().is_none() {
      return Err(eyre!("Origin must be an absolute http(s) URL: {}", origin));
    }

    let resolve = |entry: &String| {
      origin
        .join(entry)
        .map(|mut url| {
          url.set_fragment(None);
          url
        })
        .map_err(|e| eyre!("Invalid resource '{}': {}", entry, e))
    };

    Ok(Manifest {
      static_resources: self
        .static_resources
        .iter()
        .map(resolve)
        .collect::<Result<_>>()?,
      bundle_resources: self
        .bundle_resources
        .iter()
        .map(resolve)
        .collect::<Result<_>>()?,
      excluded_hosts: self
        .excluded_hosts
        .iter()
        .map(|h| h.trim().to_lowercase())
        .filter(|h| !h.is_empty())
        .collect(),
      origin,
    })
  }

  pub fn fetch_timeout(&self) -> Duration {
    Duration::from_secs(
      self
        .fetch_timeout_secs
        .unwrap_or(DEFAULT_FETCH_TIMEOUT_SECS),
    )
  }

  /// Where the persistent cache database lives.
  pub fn storage_path(&self) -> Result<PathBuf> {
    match &self.storage.path {
      Some(path) => Ok(path.clone()),
      None => SqliteStore::default_path(),
    }
  }
}
