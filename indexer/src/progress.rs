//! Progress snapshot (spec §4.7 [ADDED]): a cheap, cloneable handle the Loop
//! updates after every terminal height. Replaces the "process-wide singleton
//! progress flag" pattern flagged in spec §9 — there is no global here, only
//! a value an external health-endpoint process could poll if it wanted to.
//! This crate exposes no HTTP surface itself (spec §1 Non-goals).

use crate::error::Error;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct ProgressSnapshot {
	pub current_height: u64,
	pub last_advance: Instant,
	pub consecutive_retries: u32,
	pub last_error: Option<String>,
}

impl ProgressSnapshot {
	/// True once no height has advanced for longer than `threshold` (spec §7:
	/// "sustained inability to advance... flips the health endpoint to
	/// unhealthy", default threshold 10 minutes).
	pub fn is_stalled(&self, threshold: Duration) -> bool {
		self.last_advance.elapsed() > threshold
	}
}

/// Cheap, cloneable handle shared between the Indexer Loop (the only writer)
/// and anything that wants a point-in-time read (the only reader discipline
/// spec §5 requires for health counters).
#[derive(Clone)]
pub struct ProgressObserver {
	inner: Arc<RwLock<ProgressSnapshot>>,
}

impl ProgressObserver {
	pub fn new(start_height: u64) -> Self {
		let snapshot = ProgressSnapshot {
			current_height: start_height,
			last_advance: Instant::now(),
			consecutive_retries: 0,
			last_error: None,
		};
		Self { inner: Arc::new(RwLock::new(snapshot)) }
	}

	pub fn snapshot(&self) -> ProgressSnapshot {
		self.inner.read().expect("progress lock poisoned").clone()
	}

	/// A height was committed or resolved as a no-op duplicate; resets the
	/// retry counter and moves the high-water mark forward.
	pub fn record_advance(&self, height: u64) {
		let mut state = self.inner.write().expect("progress lock poisoned");
		state.current_height = height;
		state.last_advance = Instant::now();
		state.consecutive_retries = 0;
		state.last_error = None;
	}

	/// A height was skipped (unsupported tx type, or retry budget exhausted)
	/// — still forward progress, so it counts the same as an advance.
	pub fn record_skip(&self, height: u64) {
		self.record_advance(height);
	}

	/// A retryable classification was observed; the height has not advanced.
	pub fn record_retry(&self, err: &Error) {
		let mut state = self.inner.write().expect("progress lock poisoned");
		state.consecutive_retries += 1;
		state.last_error = Some(err.to_string());
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn starts_at_the_configured_height_with_no_retries() {
		let progress = ProgressObserver::new(42);
		let snapshot = progress.snapshot();
		assert_eq!(snapshot.current_height, 42);
		assert_eq!(snapshot.consecutive_retries, 0);
		assert!(!snapshot.is_stalled(Duration::from_secs(600)));
	}

	#[test]
	fn advance_resets_the_retry_counter() {
		let progress = ProgressObserver::new(0);
		progress.record_retry(&Error::Config("simulated".into()));
		progress.record_retry(&Error::Config("simulated".into()));
		assert_eq!(progress.snapshot().consecutive_retries, 2);

		progress.record_advance(5);
		let snapshot = progress.snapshot();
		assert_eq!(snapshot.current_height, 5);
		assert_eq!(snapshot.consecutive_retries, 0);
		assert!(snapshot.last_error.is_none());
	}

	#[test]
	fn is_stalled_respects_the_threshold() {
		let progress = ProgressObserver::new(0);
		assert!(!progress.snapshot().is_stalled(Duration::from_secs(600)));
		assert!(progress.snapshot().is_stalled(Duration::from_nanos(0)));
	}
}
