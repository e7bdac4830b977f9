//! Tracing initialisation.

use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

/// Install the global `tracing` subscriber: human-readable output on stderr,
/// filtered by `RUST_LOG` (default `info`).
pub fn init_tracing() -> Result<(), anyhow::Error> {
    let fmt_layer = fmt::layer().with_writer(std::io::stderr).with_target(true);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = Registry::default().with(filter).with(fmt_layer);
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
