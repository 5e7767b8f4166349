use std::env;
use std::ffi::OsString;
use std::fmt::{Display, Formatter};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::remote::{DEFAULT_RATES_URL, DEFAULT_TABLE, StoreConfig};

const CONFIG_FILE: &str = "config.toml";
const APP_DIR: &str = "trip_ledger";

#[derive(Debug)]
pub enum ConfigError {
	Io { path: PathBuf, source: std::io::Error },
	TomlDecode { path: PathBuf, source: toml::de::Error },
}

impl Display for ConfigError {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		match self {
			ConfigError::Io { path, source } => {
				write!(f, "failed to read {}: {source}", path.display())
			}
			ConfigError::TomlDecode { path, source } => {
				write!(f, "failed to parse {}: {source}", path.display())
			}
		}
	}
}

impl std::error::Error for ConfigError {}

/// On-disk settings; every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
	pub store_url: Option<String>,
	pub store_key: Option<String>,
	pub table: Option<String>,
	pub rates_url: Option<String>,
	pub trip: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
	pub store_url: Option<String>,
	pub store_key: Option<String>,
	pub table: String,
	pub rates_url: String,
	pub trip: Option<PathBuf>,
	pub state_dir: PathBuf,
}

/// Values passed on the command line, applied last.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
	pub config: Option<PathBuf>,
	pub trip: Option<PathBuf>,
}

impl Config {
	pub fn resolve(cli: &CliOverrides) -> Result<Self, ConfigError> {
		Self::resolve_with(cli, |key| env::var_os(key))
	}

	pub fn resolve_with<F>(cli: &CliOverrides, lookup: F) -> Result<Self, ConfigError>
	where
		F: Fn(&str) -> Option<OsString>,
	{
		let var = |key: &str| {
			lookup(key)
				.filter(|value| !value.is_empty())
				.map(|value| value.to_string_lossy().into_owned())
		};

		let state_dir = state_dir_with(&lookup);
		let file = match &cli.config {
			Some(path) => read_file_config(&absolutize(path.clone()))?,
			None => match var("TRIP_LEDGER_CONFIG") {
				Some(path) => read_file_config(&absolutize(PathBuf::from(path)))?,
				None => read_optional_file_config(&state_dir.join(CONFIG_FILE))?,
			},
		};

		let mut config = Config {
			store_url: file.store_url,
			store_key: file.store_key,
			table: file.table.unwrap_or_else(|| DEFAULT_TABLE.to_string()),
			rates_url: file.rates_url.unwrap_or_else(|| DEFAULT_RATES_URL.to_string()),
			trip: file.trip,
			state_dir,
		};

		if let Some(url) = var("TRIP_LEDGER_STORE_URL") {
			config.store_url = Some(url);
		}
		if let Some(key) = var("TRIP_LEDGER_STORE_KEY") {
			config.store_key = Some(key);
		}
		if let Some(table) = var("TRIP_LEDGER_TABLE") {
			config.table = table;
		}
		if let Some(url) = var("TRIP_LEDGER_RATES_URL") {
			config.rates_url = url;
		}
		if let Some(trip) = var("TRIP_LEDGER_TRIP") {
			config.trip = Some(PathBuf::from(trip));
		}

		if let Some(trip) = &cli.trip {
			config.trip = Some(trip.clone());
		}
		config.trip = config.trip.map(absolutize);

		Ok(config)
	}

	/// Store settings, when both the URL and the key are present.
	pub fn store(&self) -> Option<StoreConfig> {
		match (&self.store_url, &self.store_key) {
			(Some(url), Some(key)) => Some(StoreConfig {
				url: url.clone(),
				key: key.clone(),
				table: self.table.clone(),
			}),
			_ => None,
		}
	}
}

fn read_file_config(path: &Path) -> Result<FileConfig, ConfigError> {
	let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
		path: path.to_path_buf(),
		source,
	})?;
	parse_file_config(path, &raw)
}

fn read_optional_file_config(path: &Path) -> Result<FileConfig, ConfigError> {
	match fs::read_to_string(path) {
		Ok(raw) => parse_file_config(path, &raw),
		Err(err) if err.kind() == ErrorKind::NotFound => Ok(FileConfig::default()),
		Err(source) => Err(ConfigError::Io {
			path: path.to_path_buf(),
			source,
		}),
	}
}

fn parse_file_config(path: &Path, raw: &str) -> Result<FileConfig, ConfigError> {
	toml::from_str(raw).map_err(|source| ConfigError::TomlDecode {
		path: path.to_path_buf(),
		source,
	})
}

fn state_dir_with<F>(lookup: F) -> PathBuf
where
	F: Fn(&str) -> Option<OsString>,
{
	let var = |key: &str| lookup(key).filter(|value| !value.is_empty());

	if let Some(path) = var("TRIP_LEDGER_STATE_DIR") {
		return PathBuf::from(path);
	}

	#[cfg(target_os = "windows")]
	{
		if let Some(path) = var("LOCALAPPDATA") {
			return PathBuf::from(path).join(APP_DIR);
		}
	}

	if let Some(path) = var("XDG_STATE_HOME") {
		return PathBuf::from(path).join(APP_DIR);
	}

	if let Some(path) = var("HOME") {
		return PathBuf::from(path).join(".local").join("state").join(APP_DIR);
	}

	PathBuf::from(format!(".{APP_DIR}"))
}

pub fn absolutize(path: PathBuf) -> PathBuf {
	let path = if path.is_absolute() {
		path
	} else if let Ok(cwd) = env::current_dir() {
		cwd.join(path)
	} else {
		path
	};

	if path.exists() {
		fs::canonicalize(&path).unwrap_or(path)
	} else {
		path
	}
}

#[cfg(test)]
mod tests {
	use std::collections::HashMap;
	use std::ffi::OsString;
	use std::fs;
	use std::path::PathBuf;

	use super::{CliOverrides, Config, ConfigError, state_dir_with};

	fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<OsString> + use<> {
		let map = pairs
			.iter()
			.map(|(key, value)| (key.to_string(), OsString::from(value)))
			.collect::<HashMap<_, _>>();
		move |key: &str| map.get(key).cloned()
	}

	#[test]
	fn state_dir_prefers_explicit_override() {
		let lookup = env_of(&[
			("TRIP_LEDGER_STATE_DIR", "/tmp/trip-state"),
			("XDG_STATE_HOME", "/tmp/xdg"),
		]);
		assert_eq!(state_dir_with(lookup), PathBuf::from("/tmp/trip-state"));

		let lookup = env_of(&[("XDG_STATE_HOME", "/tmp/xdg"), ("HOME", "/home/me")]);
		assert_eq!(state_dir_with(lookup), PathBuf::from("/tmp/xdg/trip_ledger"));

		let lookup = env_of(&[("HOME", "/home/me")]);
		assert_eq!(
			state_dir_with(lookup),
			PathBuf::from("/home/me/.local/state/trip_ledger")
		);
	}

	#[test]
	fn defaults_apply_without_file_or_env() {
		let dir = tempfile::tempdir().expect("temp dir");
		let state = dir.path().to_string_lossy().into_owned();
		let config = Config::resolve_with(
			&CliOverrides::default(),
			env_of(&[("TRIP_LEDGER_STATE_DIR", state.as_str())]),
		)
		.expect("config");

		assert_eq!(config.table, "expenses");
		assert_eq!(config.rates_url, "https://open.er-api.com/v6/latest/JPY");
		assert!(config.store().is_none());
		assert_eq!(config.state_dir, dir.path());
	}

	#[test]
	fn env_overrides_file_and_cli_overrides_env() {
		let dir = tempfile::tempdir().expect("temp dir");
		fs::write(
			dir.path().join("config.toml"),
			"store_url = \"https://file.example\"\nstore_key = \"file-key\"\ntable = \"trip_costs\"\ntrip = \"file-trip.toml\"\n",
		)
		.expect("write config");
		let state = dir.path().to_string_lossy().into_owned();

		let cli = CliOverrides {
			config: None,
			trip: Some(dir.path().join("cli-trip.toml")),
		};
		let config = Config::resolve_with(
			&cli,
			env_of(&[
				("TRIP_LEDGER_STATE_DIR", state.as_str()),
				("TRIP_LEDGER_STORE_KEY", "env-key"),
				("TRIP_LEDGER_TRIP", "/tmp/env-trip.toml"),
			]),
		)
		.expect("config");

		let store = config.store().expect("store configured");
		assert_eq!(store.url, "https://file.example");
		assert_eq!(store.key, "env-key");
		assert_eq!(store.table, "trip_costs");
		assert_eq!(config.trip, Some(dir.path().join("cli-trip.toml")));
	}

	#[test]
	fn explicit_config_file_must_exist() {
		let dir = tempfile::tempdir().expect("temp dir");
		let cli = CliOverrides {
			config: Some(dir.path().join("missing.toml")),
			trip: None,
		};
		let result = Config::resolve_with(&cli, env_of(&[]));
		assert!(matches!(result, Err(ConfigError::Io { .. })));
	}

	#[test]
	fn unknown_keys_are_rejected() {
		let dir = tempfile::tempdir().expect("temp dir");
		let path = dir.path().join("custom.toml");
		fs::write(&path, "store_ur = \"typo\"\n").expect("write config");
		let cli = CliOverrides {
			config: Some(path),
			trip: None,
		};
		let result = Config::resolve_with(&cli, env_of(&[]));
		assert!(matches!(result, Err(ConfigError::TomlDecode { .. })));
	}
}
