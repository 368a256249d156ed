//! Pure mapping from a typed failure to a retry policy (spec §4.2). No I/O, no
//! shared state, no string matching — every arm matches on the `Error`
//! variant the RPC Client or Sink Adapter actually produced.

use crate::error::Error;
use crate::sink::SinkError;
use std::time::Duration;
use tracing::Level;

/// The operation that was being attempted when the error occurred, carried
/// only for logging (spec §7: `component`, `operation` fields).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
	LatestBlockNumber,
	BlockByNumber,
	TransactionReceipt,
	NetworkId,
	PutBlock,
	PutTransaction,
	PutAccessListEntry,
	PutLog,
	HighestStoredBlock,
}

impl Operation {
	pub fn name(self) -> &'static str {
		match self {
			Operation::LatestBlockNumber => "latest_block_number",
			Operation::BlockByNumber => "block_by_number",
			Operation::TransactionReceipt => "transaction_receipt",
			Operation::NetworkId => "network_id",
			Operation::PutBlock => "put_block",
			Operation::PutTransaction => "put_transaction",
			Operation::PutAccessListEntry => "put_access_list_entry",
			Operation::PutLog => "put_log",
			Operation::HighestStoredBlock => "highest_stored_block",
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
	Network,
	NotAvailableYet,
	Data,
	Unsupported,
	DuplicateKey,
	Storage,
	Config,
	Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
	pub kind: ErrorKind,
	pub retryable: bool,
	pub severity: Level,
	pub delay_hint: Duration,
}

const BACKOFF_CAP: Duration = Duration::from_secs(30);
const NOT_AVAILABLE_YET_DELAY: Duration = Duration::from_secs(3);

/// `1s * 2^attempt`, capped at 30s (spec §4.2 — arithmetic backoff rather than
/// a fixed lookup table, so the delay tracks the attempt the Loop is on).
fn exponential_backoff(attempt: u32) -> Duration {
	let secs = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
	Duration::from_secs(secs).min(BACKOFF_CAP)
}

fn terminal(kind: ErrorKind, severity: Level) -> Classification {
	Classification { kind, retryable: false, severity, delay_hint: Duration::ZERO }
}

/// Classifies `err`, encountered while performing the given `attempt`-th try
/// (0-indexed; used only to size the backoff) of `operation`. `operation`
/// itself carries no weight in the classification — callers attach it to the
/// structured log line, not to the policy.
pub fn classify(err: &Error, operation: Operation, attempt: u32) -> Classification {
	let _ = operation;
	match err {
		Error::Network { .. } | Error::Timeout { .. } | Error::RateLimited { .. } => {
			Classification { kind: ErrorKind::Network, retryable: true, severity: Level::WARN, delay_hint: exponential_backoff(attempt) }
		},
		Error::NotAvailableYet { .. } => Classification {
			kind: ErrorKind::NotAvailableYet,
			retryable: true,
			severity: Level::INFO,
			delay_hint: NOT_AVAILABLE_YET_DELAY,
		},
		Error::Decode(indexer_core::Error::UnsupportedTxType { .. }) => terminal(ErrorKind::Unsupported, Level::WARN),
		Error::Decode(_) => terminal(ErrorKind::Data, Level::WARN),
		Error::Sink(SinkError::DuplicateKey { .. }) => terminal(ErrorKind::DuplicateKey, Level::INFO),
		Error::Sink(SinkError::Transient { .. }) => {
			Classification { kind: ErrorKind::Storage, retryable: true, severity: Level::WARN, delay_hint: exponential_backoff(attempt) }
		},
		Error::Sink(SinkError::GraphQl { .. } | SinkError::Decode { .. }) => terminal(ErrorKind::Data, Level::WARN),
		Error::Config(_) => terminal(ErrorKind::Config, Level::ERROR),
		Error::Critical(_) => terminal(ErrorKind::Critical, Level::ERROR),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn sink_err(e: SinkError) -> Error {
		Error::Sink(e)
	}

	#[test]
	fn network_errors_retry_with_growing_backoff() {
		let err = Error::NotAvailableYet { height: 100 };
		let c0 = classify(&err, Operation::BlockByNumber, 0);
		assert_eq!(c0.delay_hint, NOT_AVAILABLE_YET_DELAY);
		assert!(c0.retryable);
	}

	#[test]
	fn backoff_doubles_and_caps_at_30s() {
		assert_eq!(exponential_backoff(0), Duration::from_secs(1));
		assert_eq!(exponential_backoff(1), Duration::from_secs(2));
		assert_eq!(exponential_backoff(4), Duration::from_secs(16));
		assert_eq!(exponential_backoff(10), BACKOFF_CAP);
	}

	#[test]
	fn duplicate_key_is_not_retryable_and_not_an_error_severity() {
		let err = sink_err(SinkError::DuplicateKey { natural_key: "block:1".into() });
		let c = classify(&err, Operation::PutBlock, 0);
		assert_eq!(c.kind, ErrorKind::DuplicateKey);
		assert!(!c.retryable);
		assert_eq!(c.severity, Level::INFO);
	}

	#[test]
	fn unsupported_tx_type_skips_without_retry() {
		let err = Error::Decode(indexer_core::Error::UnsupportedTxType { tag: 0x7e });
		let c = classify(&err, Operation::BlockByNumber, 0);
		assert_eq!(c.kind, ErrorKind::Unsupported);
		assert!(!c.retryable);
	}

	#[test]
	fn storage_transient_is_retryable() {
		let err = sink_err(SinkError::Transient { reason: "502".into() });
		let c = classify(&err, Operation::PutBlock, 2);
		assert_eq!(c.kind, ErrorKind::Storage);
		assert!(c.retryable);
		assert_eq!(c.delay_hint, Duration::from_secs(4));
	}

	#[test]
	fn config_and_critical_are_fatal() {
		let c = classify(&Error::Config("missing rpc.url".into()), Operation::PutBlock, 0);
		assert_eq!(c.kind, ErrorKind::Config);
		assert!(!c.retryable);

		let c = classify(&Error::Critical("panic in worker".into()), Operation::PutBlock, 0);
		assert_eq!(c.kind, ErrorKind::Critical);
		assert!(!c.retryable);
	}
}
