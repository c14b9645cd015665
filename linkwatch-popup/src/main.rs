use anyhow::Context;

fn main() -> anyhow::Result<()> {
  let args: Vec<String> = std::env::args().collect();

  if args.iter().any(|a| a == "--version") {
    println!("{}", env!("CARGO_PKG_VERSION"));
    return Ok(());
  }

  tracing_subscriber::fmt()
    .with_ansi(false)
    .with_target(false)
    .with_writer(std::io::stderr)
    .init();

  let opts = linkwatch_popup::PopupArgs::from_args(&args)?;
  let path = match opts.results {
    Some(p) => p,
    None => {
      let base = linkwatch_core::paths::base_dir().context("resolve LinkWatch base directory")?;
      linkwatch_core::paths::results_path(&base)
    }
  };

  let view = linkwatch_popup::load(&path);
  if opts.json {
    println!("{}", serde_json::to_string_pretty(&view).context("encode popup view")?);
  } else {
    print!("{view}");
  }
  Ok(())
}
