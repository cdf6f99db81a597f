use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Console output plus an append-only log file. Level comes from `RUST_LOG`, default `info`.
pub fn init(log_path: &Path) -> anyhow::Result<()> {
  let file = OpenOptions::new().create(true).append(true).open(log_path)?;

  let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
  let file_layer = fmt::layer().with_writer(Mutex::new(file)).with_ansi(false);
  let console_layer = fmt::layer().with_writer(std::io::stderr).with_target(false);

  tracing_subscriber::registry()
    .with(env_filter)
    .with(console_layer)
    .with(file_layer)
    .try_init()?;
  Ok(())
}
