use std::fs;
use std::path::Path;
use std::sync::OnceLock;
use std::time::{Duration, SystemTime};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingConfig;

pub const LOG_FILE_NAME: &str = "linkwatch.log";

static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Daily rolling file in `log_dir`, optionally mirrored to stderr.
/// Stdout is never used: it carries host signals.
pub fn init(log_dir: &Path, cfg: &LoggingConfig, mirror_stderr: bool) -> anyhow::Result<()> {
  fs::create_dir_all(log_dir)?;
  let removed = cleanup_old_logs(log_dir, cfg.retention_days, SystemTime::now());

  let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_NAME);
  let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
  let _ = FILE_GUARD.set(guard);

  let filter = tracing_subscriber::EnvFilter::try_new(&cfg.level)
    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

  let file_layer = tracing_subscriber::fmt::layer()
    .with_ansi(false)
    .with_writer(file_writer)
    .with_target(true);

  let stderr_layer = mirror_stderr.then(|| {
    tracing_subscriber::fmt::layer()
      .with_ansi(false)
      .with_writer(std::io::stderr)
      .with_target(false)
  });

  tracing_subscriber::registry()
    .with(filter)
    .with(file_layer)
    .with(stderr_layer)
    .try_init()?;

  if removed > 0 {
    tracing::debug!(removed, "old log files deleted");
  }
  Ok(())
}

/// Deletes our own log files last modified before the retention cutoff.
/// 0 keeps everything. Returns how many files were removed.
fn cleanup_old_logs(log_dir: &Path, retention_days: u64, now: SystemTime) -> usize {
  if retention_days == 0 {
    return 0;
  }

  let cutoff = now
    .checked_sub(Duration::from_secs(retention_days.saturating_mul(24 * 60 * 60)))
    .unwrap_or(SystemTime::UNIX_EPOCH);

  let Ok(entries) = fs::read_dir(log_dir) else {
    return 0;
  };

  let mut removed = 0;
  for entry in entries.flatten() {
    let path = entry.path();
    if !is_linkwatch_log_file(&path) {
      continue;
    }
    let Ok(modified) = entry.metadata().and_then(|md| md.modified()) else {
      continue;
    };
    if modified < cutoff && fs::remove_file(&path).is_ok() {
      removed += 1;
    }
  }
  removed
}

fn is_linkwatch_log_file(path: &Path) -> bool {
  let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
    return false;
  };
  name == LOG_FILE_NAME
    || name
      .strip_prefix(LOG_FILE_NAME)
      .is_some_and(|rest| rest.starts_with('.'))
}
