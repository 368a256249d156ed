//! Tracing initialization (spec §4.9 [ADDED]), grounded on the teacher's
//! `Client::init_tracing` toggle between a human-readable format and
//! structured JSON — the same two formats, driven by `logger.development`
//! instead of a boolean parameter threaded by the caller.

use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Installs the global `tracing` subscriber. Safe to call more than once
/// (e.g. from tests) — a second call is a no-op rather than a panic.
pub fn init(development: bool) {
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
	let builder = tracing_subscriber::fmt().with_env_filter(filter);

	let result = if development {
		builder.pretty().finish().try_init()
	} else {
		builder.json().flatten_event(true).with_current_span(false).finish().try_init()
	};

	if let Err(err) = result {
		tracing::debug!(error = %err, "tracing subscriber already initialized");
	}
}
