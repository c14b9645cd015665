use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::ScanError;

pub const API_KEY_ENV: &str = "VT_API_KEY";

#[derive(Debug, Clone, Default)]
pub struct Config {
  pub provider: ProviderConfig,
  pub scan: ScanConfig,
  pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
  #[serde(default)]
  pub api_key: String,

  #[serde(default = "default_base_url")]
  pub base_url: String,

  /// 0 disables the request timeout entirely.
  #[serde(default)]
  pub timeout_seconds: u64,
}

impl Default for ProviderConfig {
  fn default() -> Self {
    Self {
      api_key: String::new(),
      base_url: default_base_url(),
      timeout_seconds: 0,
    }
  }
}

impl ProviderConfig {
  pub fn api_key(&self) -> Result<&str, ScanError> {
    let key = self.api_key.trim();
    if key.is_empty() {
      return Err(ScanError::Config(format!(
        "provider API key is not set (config `provider.api_key` or env {API_KEY_ENV})"
      )));
    }
    Ok(key)
  }

  pub fn timeout(&self) -> Option<Duration> {
    (self.timeout_seconds > 0).then(|| Duration::from_secs(self.timeout_seconds))
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
  #[serde(default = "default_cache_ttl_seconds")]
  pub cache_ttl_seconds: u64,

  #[serde(default = "default_rate_limit_seconds")]
  pub rate_limit_seconds: u64,

  #[serde(default = "default_grace_period_seconds")]
  pub grace_period_seconds: u64,

  /// 0 means retry forever.
  #[serde(default)]
  pub max_retry_attempts: u32,

  #[serde(default)]
  pub dedupe_pending_retries: bool,
}

impl Default for ScanConfig {
  fn default() -> Self {
    Self {
      cache_ttl_seconds: default_cache_ttl_seconds(),
      rate_limit_seconds: default_rate_limit_seconds(),
      grace_period_seconds: default_grace_period_seconds(),
      max_retry_attempts: 0,
      dedupe_pending_retries: false,
    }
  }
}

impl ScanConfig {
  pub fn cache_ttl(&self) -> Duration {
    Duration::from_secs(self.cache_ttl_seconds)
  }

  pub fn rate_limit_window(&self) -> Duration {
    Duration::from_secs(self.rate_limit_seconds)
  }

  pub fn grace_period(&self) -> Duration {
    Duration::from_secs(self.grace_period_seconds)
  }

  pub fn retry_cap(&self) -> Option<u32> {
    (self.max_retry_attempts > 0).then_some(self.max_retry_attempts)
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
  #[serde(default = "default_log_level")]
  pub level: String,

  #[serde(default = "default_retention_days")]
  pub retention_days: u64,
}

impl Default for LoggingConfig {
  fn default() -> Self {
    Self {
      level: default_log_level(),
      retention_days: default_retention_days(),
    }
  }
}

fn default_base_url() -> String {
  "https://www.virustotal.com/vtapi/v2".to_string()
}

fn default_cache_ttl_seconds() -> u64 {
  60 * 60
}

fn default_rate_limit_seconds() -> u64 {
  15
}

fn default_grace_period_seconds() -> u64 {
  3
}

fn default_log_level() -> String {
  "info".to_string()
}

fn default_retention_days() -> u64 {
  14
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ConfigFile {
  #[serde(default)]
  pub provider: Option<ProviderConfig>,

  #[serde(default)]
  pub scan: Option<ScanConfig>,

  #[serde(default)]
  pub logging: Option<LoggingConfig>,
}

impl ConfigFile {
  fn normalize(self) -> Config {
    let mut cfg = Config::default();
    if let Some(p) = self.provider {
      cfg.provider = p;
    }
    if let Some(s) = self.scan {
      cfg.scan = s;
    }
    if let Some(l) = self.logging {
      cfg.logging = l;
    }

    if let Some(reason) = validate_scan_config(&cfg.scan) {
      tracing::warn!(reason = %reason, "scan timings invalid; using defaults");
      cfg.scan = ScanConfig {
        max_retry_attempts: cfg.scan.max_retry_attempts,
        dedupe_pending_retries: cfg.scan.dedupe_pending_retries,
        ..ScanConfig::default()
      };
    }

    cfg
  }

  fn needs_upgrade(&self) -> bool {
    self.provider.is_none() || self.scan.is_none() || self.logging.is_none()
  }
}

pub fn load_or_create_default(path: &Path) -> anyhow::Result<Config> {
  let parent = path
    .parent()
    .ok_or_else(|| anyhow::anyhow!("config path has no parent: {}", path.display()))?;
  fs::create_dir_all(parent)?;

  let mut cfg = if !path.exists() {
    let cfg = Config::default();
    write_atomic(path, &toml::to_string_pretty(&to_config_file(&cfg))?)?;
    cfg
  } else {
    let raw = fs::read_to_string(path)?;
    match toml::from_str::<ConfigFile>(&raw) {
      Ok(file) => {
        let cfg = file.clone().normalize();
        if file.needs_upgrade() {
          let backup = parent.join(format!("config.toml.bak-{}", now_unix_s()));
          let _ = fs::copy(path, &backup);
          let _ = write_atomic(path, &toml::to_string_pretty(&to_config_file(&cfg))?);
          eprintln!(
            "LinkWatch: upgraded config defaults written to {} (backup: {})",
            path.display(),
            backup.display()
          );
        }
        cfg
      }
      Err(e) => {
        let cfg = Config::default();
        let backup = parent.join(format!("config.toml.bad-{}", now_unix_s()));
        let _ = fs::rename(path, &backup);
        write_atomic(path, &toml::to_string_pretty(&to_config_file(&cfg))?)?;
        eprintln!(
          "LinkWatch: invalid config at {} (backed up to {}): {e}",
          path.display(),
          backup.display()
        );
        cfg
      }
    }
  };

  apply_env_overrides(&mut cfg);
  Ok(cfg)
}

/// The environment key wins over the file so secrets can stay out of `config.toml`.
pub fn apply_env_overrides(cfg: &mut Config) {
  if let Ok(key) = std::env::var(API_KEY_ENV) {
    if !key.trim().is_empty() {
      cfg.provider.api_key = key;
    }
  }
}

/// Checks everything the coordinator needs before any scan may run.
pub fn validate_for_scanning(cfg: &Config) -> Result<(), ScanError> {
  cfg.provider.api_key()?;

  let base = cfg.provider.base_url.trim();
  let Ok(url) = reqwest::Url::parse(base) else {
    return Err(ScanError::Config(format!("invalid provider base_url: {base}")));
  };
  if url.scheme() != "https" && url.scheme() != "http" {
    return Err(ScanError::Config(format!(
      "provider base_url must be http(s): {base}"
    )));
  }
  if url.host_str().is_none() {
    return Err(ScanError::Config(format!("provider base_url has no host: {base}")));
  }
  Ok(())
}

fn validate_scan_config(cfg: &ScanConfig) -> Option<String> {
  if cfg.cache_ttl_seconds == 0 {
    return Some("cache_ttl_seconds must be > 0".to_string());
  }
  if cfg.rate_limit_seconds == 0 {
    return Some("rate_limit_seconds must be > 0".to_string());
  }
  None
}

fn to_config_file(cfg: &Config) -> ConfigFile {
  ConfigFile {
    provider: Some(cfg.provider.clone()),
    scan: Some(cfg.scan.clone()),
    logging: Some(cfg.logging.clone()),
  }
}

fn write_atomic(path: &Path, contents: &str) -> anyhow::Result<()> {
  let parent = path
    .parent()
    .ok_or_else(|| anyhow::anyhow!("file path has no parent: {}", path.display()))?;
  let tmp = parent.join(format!(
    ".{}.tmp",
    path.file_name().unwrap_or_default().to_string_lossy()
  ));

  fs::write(&tmp, contents)?;
  fs::rename(&tmp, path)?;
  Ok(())
}

fn now_unix_s() -> u64 {
  crate::types::now_unix_ms() / 1000
}
