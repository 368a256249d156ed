//! Semantic entities the sink accepts. These are never mutated after
//! construction and never deleted (spec §3 Lifecycles); the only thing that
//! changes after ingest starts is the in-memory [`ProgressCursor`].

use primitive_types::{H160, H256, U256};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
	pub number: u64,
	pub hash: H256,
	pub parent_hash: H256,
	pub miner: H160,
	pub gas_used: u64,
	pub gas_limit: u64,
	pub timestamp: u64,
	pub state_root: H256,
	pub receipts_root: H256,
	pub transactions_root: H256,
	pub extra_data: Vec<u8>,
	pub size: u64,
	pub difficulty: U256,
	pub transactions: Vec<Transaction>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
	pub hash: H256,
	pub index: u64,
	pub from: H160,
	pub to: Option<H160>,
	pub value: U256,
	pub gas: u64,
	pub gas_price: U256,
	pub input: Vec<u8>,
	pub nonce: u64,
	pub tx_type: u64,
	pub access_list: Vec<AccessListEntry>,
	/// Logs emitted by this transaction's receipt. Populated by the caller
	/// after the receipt is fetched; left empty if the receipt fetch failed
	/// and was classified as skippable (spec §4.4) — an empty `Vec` is
	/// indistinguishable from "receipt had no logs", which matches how the
	/// commit loop treats both cases (nothing to put, block still completes).
	pub logs: Vec<Log>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessListEntry {
	pub address: H160,
	pub storage_keys: Vec<H256>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Log {
	pub address: H160,
	pub topics: Vec<H256>,
	pub data: Vec<u8>,
	pub index: u64,
	pub removed: bool,
}

/// The process-wide singleton progress marker, rebuilt from the sink at
/// startup and advanced in memory thereafter (spec §4.6). Never persisted by
/// this crate — durability is the sink's job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressCursor {
	pub next_height: u64,
}

impl ProgressCursor {
	pub fn new(next_height: u64) -> Self {
		Self { next_height }
	}

	pub fn advance(&mut self) {
		self.next_height += 1;
	}
}

/// Derives the starting [`ProgressCursor`] from the sink's highest stored
/// height and the operator-configured start height (spec §4.6): resuming
/// never regresses past what is already durable, but an operator may lower
/// `configured_start` to force re-ingestion of a range (idempotent puts make
/// that a no-op for anything already stored).
pub fn resume_cursor(highest_stored: Option<u64>, configured_start: u64) -> ProgressCursor {
	let next_height = match highest_stored {
		Some(h) if h + 1 > configured_start => h + 1,
		_ => configured_start,
	};
	ProgressCursor::new(next_height)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn resume_prefers_sink_height_when_higher() {
		let cursor = resume_cursor(Some(50), 10);
		assert_eq!(cursor.next_height, 51);
	}

	#[test]
	fn resume_ignores_start_height_below_sink_high_water_mark() {
		// lowering start well below what is already durable does not rewind
		// the cursor under the literal §4.5 formula — see DESIGN.md.
		let cursor = resume_cursor(Some(50), 5);
		assert_eq!(cursor.next_height, 51);
	}

	#[test]
	fn resume_with_empty_sink_uses_configured_start() {
		let cursor = resume_cursor(None, 100);
		assert_eq!(cursor.next_height, 100);
	}
}
