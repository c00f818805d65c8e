use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_URL: &str = "http://127.0.0.1:8090";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub pocketbase: PocketBaseConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  /// Static dataset served when the store is unreachable
  pub fallback: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PocketBaseConfig {
  #[serde(default = "default_url")]
  pub url: String,
  /// Login identity; the password comes from GOSPREP_PB_PASSWORD
  pub email: Option<String>,
  /// Auth collection used for password login
  #[serde(default = "default_auth_collection")]
  pub auth_collection: String,
}

impl Default for PocketBaseConfig {
  fn default() -> Self {
    Self {
      url: default_url(),
      email: None,
      auth_collection: default_auth_collection(),
    }
  }
}

fn default_url() -> String {
  DEFAULT_URL.to_string()
}

fn default_auth_collection() -> String {
  "users".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  /// Seconds before a cached discipline bundle is refetched
  pub bundle_ttl_secs: u64,
  /// Upper bound on any single store call
  pub request_timeout_secs: u64,
  /// Question ids per OR-filter when fetching answers
  pub answer_chunk_size: usize,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      bundle_ttl_secs: 300,
      request_timeout_secs: 15,
      answer_chunk_size: 30,
    }
  }
}

impl CacheConfig {
  pub fn bundle_ttl(&self) -> Duration {
    Duration::from_secs(self.bundle_ttl_secs)
  }

  pub fn request_timeout(&self) -> Duration {
    Duration::from_secs(self.request_timeout_secs)
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./gosprep.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/gosprep/config.yaml
  ///
  /// Without any file the defaults point at a local PocketBase.
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
    let local = PathBuf::from("gosprep.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("gosprep").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let mut config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    // A relative fallback path is relative to the config file, not the cwd.
    if let (Some(fallback), Some(dir)) = (config.fallback.as_ref(), path.parent()) {
      if fallback.is_relative() {
        config.fallback = Some(dir.join(fallback));
      }
    }

    Ok(config)
  }

  fn validate(&self) -> Result<()> {
    if self.cache.answer_chunk_size == 0 {
      return Err(eyre!("cache.answer_chunk_size must be at least 1"));
    }
    if self.cache.request_timeout_secs == 0 {
      return Err(eyre!("cache.request_timeout_secs must be at least 1"));
    }
    Ok(())
  }

  /// Get the store password from environment variables.
  ///
  /// Checks GOSPREP_PB_PASSWORD.
  pub fn get_password() -> Result<String> {
    std::env::var("GOSPREP_PB_PASSWORD").map_err(|_| {
      eyre!("Store password not found. Set GOSPREP_PB_PASSWORD environment variable.")
    })
  }
}
