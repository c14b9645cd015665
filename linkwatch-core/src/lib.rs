pub mod attempt;
pub mod cache;
pub mod config;
pub mod console;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod executor;
pub mod logging;
pub mod paths;
pub mod presenter;
pub mod provider;
pub mod rate_limit;
pub mod scheduler;
pub mod store;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

use anyhow::Context;
use tokio::sync::mpsc;

const EVENT_BUFFER: usize = 256;

pub fn run_console(args: &[String]) -> anyhow::Result<()> {
  let base = paths::base_dir()?;
  let config_path = paths::config_path(&base);
  let cfg = config::load_or_create_default(&config_path)?;

  logging::init(&paths::logs_dir(&base), &cfg.logging, true)?;

  let opts = match console::run_console_command(&cfg, &base, args)? {
    console::ConsoleAction::ExitOk => return Ok(()),
    console::ConsoleAction::RunAgent(opts) => opts,
  };

  if let Err(e) = config::validate_for_scanning(&cfg) {
    tracing::error!(error = %e, config = %config_path.display(), "refusing to start");
    return Err(anyhow::Error::new(e).context("scanning disabled"));
  }

  let provider = provider::VirusTotalClient::from_config(&cfg.provider)?;
  let store = store::JsonFileStore::new(paths::results_path(&base));
  tracing::info!(results = %store.path().display(), "starting LinkWatch coordinator");

  let rt = tokio::runtime::Builder::new_current_thread()
    .enable_all()
    .build()
    .context("build runtime")?;

  let (stop_tx, stop_rx) = mpsc::unbounded_channel::<()>();
  ctrlc::set_handler(move || {
    let _ = stop_tx.send(());
  })?;

  let local = tokio::task::LocalSet::new();
  let stats = local.block_on(&rt, async move {
    let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
    tokio::task::spawn_local(async move {
      let res = match opts.events_file {
        Some(path) => events::pump_file(&path, event_tx).await,
        None => events::pump_stdin(event_tx).await,
      };
      if let Err(e) = res {
        tracing::error!(error = %e, "event source failed");
      }
    });

    let coordinator =
      coordinator::Coordinator::new(provider, store, presenter::StdoutPresenter, cfg.scan.clone());
    coordinator.run(event_rx, stop_rx).await
  });

  // A pending stdin read would otherwise hold shutdown open.
  rt.shutdown_background();
  tracing::info!(
    resolved = stats.resolved,
    abandoned = stats.abandoned,
    "LinkWatch stopped"
  );
  Ok(())
}
