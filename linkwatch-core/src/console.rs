use std::path::{Path, PathBuf};

use crate::config::{self, Config};
use crate::paths;

const KNOWN_FLAGS: &[&str] = &["--events", "--version", "--check-config", "--help"];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
  /// Replay events from this file instead of stdin.
  pub events_file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleAction {
  RunAgent(RunOptions),
  ExitOk,
}

pub fn run_console_command(cfg: &Config, base: &Path, args: &[String]) -> anyhow::Result<ConsoleAction> {
  let args = strip_program_name(args);

  if args.iter().any(|a| a == "--help" || a == "-h") {
    print_help();
    return Ok(ConsoleAction::ExitOk);
  }

  if args.iter().any(|a| a == "--check-config") {
    return run_check_config(cfg, base);
  }

  let mut opts = RunOptions::default();
  if let Some(i) = args.iter().position(|a| a == "--events") {
    let path = args
      .get(i + 1)
      .filter(|p| !p.starts_with("--"))
      .ok_or_else(|| anyhow::anyhow!("expected: --events <path-to-events.jsonl>"))?;
    opts.events_file = Some(PathBuf::from(path));
  }

  if let Some(unknown) = args
    .iter()
    .find(|a| a.starts_with("--") && !KNOWN_FLAGS.contains(&a.as_str()))
  {
    eprintln!("Unknown option `{unknown}`.");
    print_help();
    return Ok(ConsoleAction::ExitOk);
  }

  Ok(ConsoleAction::RunAgent(opts))
}

fn run_check_config(cfg: &Config, base: &Path) -> anyhow::Result<ConsoleAction> {
  println!("Config: {}", paths::config_path(base).display());
  println!("Results: {}", paths::results_path(base).display());
  println!("Logs: {}", paths::logs_dir(base).display());
  println!("Provider base URL: {}", cfg.provider.base_url);
  println!(
    "API key: {}",
    if cfg.provider.api_key.trim().is_empty() {
      "missing"
    } else {
      "set"
    }
  );
  println!(
    "Rate limit: {}s, cache TTL: {}s, grace period: {}s",
    cfg.scan.rate_limit_seconds, cfg.scan.cache_ttl_seconds, cfg.scan.grace_period_seconds
  );
  match cfg.scan.retry_cap() {
    Some(cap) => println!("Retry cap: {cap} denials"),
    None => println!("Retry cap: none"),
  }
  println!("Dedupe pending retries: {}", cfg.scan.dedupe_pending_retries);

  match config::validate_for_scanning(cfg) {
    Ok(()) => {
      println!("Configuration OK.");
      Ok(ConsoleAction::ExitOk)
    }
    Err(e) => Err(anyhow::Error::new(e).context("configuration check failed")),
  }
}

fn strip_program_name(args: &[String]) -> Vec<String> {
  args.iter().skip(1).cloned().collect()
}

fn print_help() {
  println!("LinkWatch v{}", env!("CARGO_PKG_VERSION"));
  println!("Reads host events as JSON lines and writes badge/notification signals to stdout.");
  println!("Commands:");
  println!("  (no arguments)          read events from stdin");
  println!("  --events <file>         replay events from a JSON-lines file");
  println!("  --check-config          print effective configuration and validate it");
  println!("  --version");
  println!("  --help");
  println!("Environment:");
  println!("  {}  provider API key (overrides config)", config::API_KEY_ENV);
  println!("  {}  base directory for config, results and logs", paths::HOME_ENV);
}

#[cfg(test)]
mod tests {
  use super::*;

  fn args(list: &[&str]) -> Vec<String> {
    std::iter::once("linkwatch")
      .chain(list.iter().copied())
      .map(String::from)
      .collect()
  }

  #[test]
  fn no_arguments_runs_from_stdin() {
    let action = run_console_command(&Config::default(), Path::new("/tmp/lw"), &args(&[])).unwrap();
    assert_eq!(action, ConsoleAction::RunAgent(RunOptions::default()));
  }

  #[test]
  fn events_flag_takes_a_path() {
    let action = run_console_command(
      &Config::default(),
      Path::new("/tmp/lw"),
      &args(&["--events", "replay.jsonl"]),
    )
    .unwrap();
    assert_eq!(
      action,
      ConsoleAction::RunAgent(RunOptions {
        events_file: Some(PathBuf::from("replay.jsonl")),
      })
    );

    assert!(run_console_command(&Config::default(), Path::new("/tmp/lw"), &args(&["--events"])).is_err());
  }

  #[test]
  fn check_config_fails_without_key() {
    let cfg = Config::default();
    assert!(run_console_command(&cfg, Path::new("/tmp/lw"), &args(&["--check-config"])).is_err());

    let mut cfg = Config::default();
    cfg.provider.api_key = "k".to_string();
    assert_eq!(
      run_console_command(&cfg, Path::new("/tmp/lw"), &args(&["--check-config"])).unwrap(),
      ConsoleAction::ExitOk
    );
  }
}
