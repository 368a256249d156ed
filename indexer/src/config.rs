//! Layered configuration (spec §4.8 [ADDED]): built-in defaults, an optional
//! TOML file, then `INDEXER_`-prefixed environment overrides, collapsed into
//! one validated [`Config`] at startup. Components downstream accept only
//! the narrow slice they need (`RpcConfig`, `SinkConfig`, ...) rather than
//! the whole struct — this retires the "mixed config shapes" pattern flagged
//! in spec §9.

use crate::error::Error;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RpcSettings {
	pub url: String,
	#[serde(default)]
	pub ws_url: Option<String>,
	#[serde(default)]
	pub api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SinkSettings {
	pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PrefetchSettings {
	#[serde(default = "default_buffer_size")]
	pub buffer_size: usize,
	#[serde(default = "default_receipt_concurrency")]
	pub receipt_concurrency: usize,
}

fn default_buffer_size() -> usize {
	10
}
fn default_receipt_concurrency() -> usize {
	4
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetrySettings {
	#[serde(default = "default_max_attempts")]
	pub max_attempts: u32,
}

fn default_max_attempts() -> u32 {
	3
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IndexerSettings {
	#[serde(default)]
	pub start_height: u64,
	#[serde(default = "default_poll_interval_seconds")]
	pub poll_interval_seconds: f64,
	#[serde(default)]
	pub prefetch: PrefetchSettings,
	#[serde(default)]
	pub retry: RetrySettings,
}

fn default_poll_interval_seconds() -> f64 {
	12.0
}

impl Default for PrefetchSettings {
	fn default() -> Self {
		Self { buffer_size: default_buffer_size(), receipt_concurrency: default_receipt_concurrency() }
	}
}

impl Default for RetrySettings {
	fn default() -> Self {
		Self { max_attempts: default_max_attempts() }
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggerSettings {
	#[serde(default)]
	pub development: bool,
}

impl Default for LoggerSettings {
	fn default() -> Self {
		Self { development: false }
	}
}

/// The one validated configuration value, assembled once at startup (spec
/// §4.8). Nothing downstream re-reads environment variables or a file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
	pub rpc: RpcSettings,
	pub sink: SinkSettings,
	#[serde(default)]
	pub indexer: IndexerSettings,
	#[serde(default)]
	pub logger: LoggerSettings,
}

impl Default for IndexerSettings {
	fn default() -> Self {
		Self {
			start_height: 0,
			poll_interval_seconds: default_poll_interval_seconds(),
			prefetch: PrefetchSettings::default(),
			retry: RetrySettings::default(),
		}
	}
}

impl Config {
	/// Loads configuration from (in ascending precedence): built-in
	/// defaults, an optional TOML file at `config_path`, then environment
	/// variables prefixed `INDEXER_` with `__` as the nesting separator
	/// (e.g. `INDEXER_RPC__URL`). Unknown keys are rejected — config
	/// validation happens once, here, never mid-run.
	pub fn load(config_path: Option<&str>) -> Result<Self, Error> {
		let mut builder = config::Config::builder()
			.set_default("indexer.start_height", 0i64)
			.map_err(config_err)?
			.set_default("indexer.poll_interval_seconds", default_poll_interval_seconds())
			.map_err(config_err)?
			.set_default("indexer.prefetch.buffer_size", default_buffer_size() as i64)
			.map_err(config_err)?
			.set_default("indexer.prefetch.receipt_concurrency", default_receipt_concurrency() as i64)
			.map_err(config_err)?
			.set_default("indexer.retry.max_attempts", default_max_attempts() as i64)
			.map_err(config_err)?
			.set_default("logger.development", false)
			.map_err(config_err)?;

		if let Some(path) = config_path {
			builder = builder.add_source(config::File::with_name(path).required(true));
		}

		builder = builder.add_source(config::Environment::with_prefix("INDEXER").separator("__").try_parsing(true));

		let raw = builder.build().map_err(config_err)?;
		raw.try_deserialize().map_err(config_err)
	}

	pub fn poll_interval(&self) -> Duration {
		Duration::from_secs_f64(self.indexer.poll_interval_seconds.max(0.0))
	}
}

fn config_err(e: config::ConfigError) -> Error {
	Error::Config(e.to_string())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn defaults_apply_when_optional_keys_absent() {
		// Environment-only construction without a file still needs rpc.url
		// and sink.url (required, no default) — exercised indirectly via
		// `try_deserialize` failing when they're missing.
		let err = Config::load(None).unwrap_err();
		assert!(matches!(err, Error::Config(_)));
	}
}
