//! Tracing setup for the `scorecard` binary.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber. `RUST_LOG` wins over `level` when set.
///
/// Logs go to stderr so the summary table on stdout stays clean.
pub fn init_tracing(json: bool, level: Level) {
	let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

	if json {
		tracing_subscriber::registry()
			.with(env_filter)
			.with(fmt::layer().with_target(false).with_writer(std::io::stderr).json())
			.try_init()
			.ok();
	} else {
		tracing_subscriber::registry()
			.with(env_filter)
			.with(fmt::layer().with_target(false).with_writer(std::io::stderr))
			.try_init()
			.ok();
	}
}
