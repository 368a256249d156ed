/// The full failure surface above [`indexer_core`]: transport, sink and
/// top-level failures. Variants are the typed boundary the classifier
/// matches on (spec §4.2) — nothing downstream is allowed to pattern-match on
/// `to_string()`.
#[derive(thiserror::Error, Debug)]
pub enum Error {
	#[error("decode error: {0}")]
	Decode(#[from] indexer_core::Error),

	#[error("network error calling {method}: {message}")]
	Network { method: &'static str, message: String },

	#[error("request to {method} timed out after {elapsed:?}")]
	Timeout { method: &'static str, elapsed: std::time::Duration },

	#[error("{method} rate-limited (429)")]
	RateLimited { method: &'static str },

	#[error("block {height} not yet available at the chain head")]
	NotAvailableYet { height: u64 },

	#[error(transparent)]
	Sink(#[from] crate::sink::SinkError),

	#[error("invalid configuration: {0}")]
	Config(String),

	#[error("critical failure: {0}")]
	Critical(String),
}

impl Error {
	pub fn network(method: &'static str, message: impl Into<String>) -> Self {
		Self::Network { method, message: message.into() }
	}
}
