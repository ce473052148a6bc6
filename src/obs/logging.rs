// crates.io
use tracing_subscriber::EnvFilter;

/// Installs the global `fmt` subscriber.
///
/// `RUST_LOG` takes precedence over `default_level` when set. Calling this more than once is
/// harmless; later calls leave the first subscriber in place.
pub fn init_logging(default_level: &str) {
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

	let _ = tracing_subscriber::fmt().with_env_filter(filter).with_target(false).try_init();
}
