use std::path::{Path, PathBuf};

pub const HOME_ENV: &str = "LINKWATCH_HOME";

pub fn base_dir() -> anyhow::Result<PathBuf> {
  if let Ok(dir) = std::env::var(HOME_ENV) {
    if !dir.trim().is_empty() {
      return Ok(PathBuf::from(dir));
    }
  }
  if let Some(home) = std::env::var_os("HOME").filter(|h| !h.is_empty()) {
    return Ok(PathBuf::from(home).join(".linkwatch"));
  }
  Ok(std::env::current_dir()?.join(".linkwatch"))
}

pub fn config_path(base: &Path) -> PathBuf {
  base.join("config.toml")
}

pub fn logs_dir(base: &Path) -> PathBuf {
  base.join("logs")
}

pub fn results_path(base: &Path) -> PathBuf {
  base.join("results.json")
}
