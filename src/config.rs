use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::precache::{Manifest, DEFAULT_MANIFEST};
use crate::router::DEFAULT_API_PREFIX;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Origin the app is served from; manifest paths are resolved against it
  pub origin: String,
  /// Name of the current cache generation. Bump it to roll out a new version.
  pub cache_name: String,
  /// Requests whose path starts with this go network-first
  pub api_prefix: String,
  /// Assets that must be cached before install completes
  pub precache: Vec<String>,
  /// Activate right after install instead of waiting for old clients
  pub skip_waiting: bool,
  /// Cache database location (defaults to the platform data directory)
  pub database: Option<PathBuf>,
  pub timeout_secs: u64,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      origin: "http://localhost:8196".to_string(),
      cache_name: "hike-tracker-cache-v1".to_string(),
      api_prefix: DEFAULT_API_PREFIX.to_string(),
      precache: DEFAULT_MANIFEST.iter().map(|p| p.to_string()).collect(),
      skip_waiting: true,
      database: None,
      timeout_secs: 30,
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./hikecache.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/hikecache/config.yaml
  ///
  /// Falls back to the built-in defaults when no file is found.
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

    let config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Self::default(),
    };
    config.validate()?;
    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("hikecache.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("hikecache").join("config.yaml");
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
    Ok(serde_yaml::from_str(contents)?)
  }

  pub fn validate(&self) -> Result<()> {
    self.origin_url()?;

    if self.cache_name.trim().is_empty() {
      return Err(eyre!("cache_name must not be empty"));
    }
    if !self.api_prefix.starts_with('/') {
      return Err(eyre!("api_prefix must start with '/': {}", self.api_prefix));
    }
    if let Some(path) = self.precache.iter().find(|p| !p.starts_with('/')) {
      return Err(eyre!("precache paths must be absolute: {}", path));
    }

    Ok(())
  }

  pub fn origin_url(&self) -> Result<Url> {
    let url =
      Url::parse(&self.origin).map_err(|e| eyre!("Invalid origin '{}': {}", self.origin, e))?;
    match url.scheme() {
      "http" | "https" => Ok(url),
      other => Err(eyre!("Unsupported origin scheme '{}'", other)),
    }
  }

  pub fn manifest(&self) -> Manifest {
    Manifest::new(self.precache.clone())
  }

  pub fn timeout(&self) -> Duration {
    Duration::from_secs(self.timeout_secs)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults_are_valid() {
    let config = Config::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.cache_name, "hike-tracker-cache-v1");
    assert_eq!(config.manifest(), Manifest::default());
  }

  #[test]
  fn test_partial_yaml_keeps_defaults() {
    let config = Config::from_yaml(
      "cache_name: hike-tracker-cache-v2\nprecache:\n  - /index.html\n  - /app.js\n",
    )
    .unwrap();

    assert_eq!(config.cache_name, "hike-tracker-cache-v2");
    assert_eq!(config.precache, vec!["/index.html", "/app.js"]);
    assert_eq!(config.api_prefix, "/api/");
    assert!(config.skip_waiting);
  }

  #[test]
  fn test_validation_rejects_bad_values() {
    let relative = Config {
      precache: vec!["index.html".to_string()],
      ..Config::default()
    };
    assert!(relative.validate().is_err());

    let bad_origin = Config {
      origin: "ftp://example.com".to_string(),
      ..Config::default()
    };
    assert!(bad_origin.validate().is_err());

    let empty_name = Config {
      cache_name: " ".to_string(),
      ..Config::default()
    };
    assert!(empty_name.validate().is_err());
  }

  #[test]
  fn test_missing_explicit_path_is_error() {
    assert!(Config::load(Some(Path::new("/nonexistent/hikecache.yaml"))).is_err());
  }
}
