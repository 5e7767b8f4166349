use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const LOG_FILE: &str = "trip_ledger.log";
const LOG_ENV: &str = "TRIP_LEDGER_LOG";

/// Sends tracing output to a file in the state directory so the terminal
/// stays free for the dashboard. Returns the log path on success.
pub fn init_logging(state_dir: &Path, verbose: bool) -> Result<PathBuf, Box<dyn std::error::Error>> {
	fs::create_dir_all(state_dir)?;
	let path = state_dir.join(LOG_FILE);
	let file = OpenOptions::new().create(true).append(true).open(&path)?;

	let fallback = if verbose { "debug" } else { "info" };
	let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(fallback));

	tracing_subscriber::registry()
		.with(filter)
		.with(
			tracing_subscriber::fmt::layer()
				.with_ansi(false)
				.with_writer(Mutex::new(file)),
		)
		.try_init()?;

	Ok(path)
}
