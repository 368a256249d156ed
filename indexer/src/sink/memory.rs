//! In-memory [`Sink`] for tests and local/dev runs — grounded on the
//! teacher's `ReqwestClient::testable` mock-transport pattern: a real
//! implementation of the trait, not a hand-rolled double, so it exercises
//! the same commit paths the production sink does.

use super::{AccessListEntry, Block, BlockId, EntryId, Log, LogId, Sink, SinkError, Transaction, TxId};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Mutex;

#[derive(Default)]
struct State {
	blocks: BTreeMap<u64, BlockId>,
	transactions: BTreeMap<primitive_types::H256, TxId>,
	access_list_entries: BTreeMap<String, EntryId>,
	logs: BTreeMap<String, LogId>,
	highest: Option<u64>,
}

pub struct MemorySink {
	state: Mutex<State>,
}

impl Default for MemorySink {
	fn default() -> Self {
		Self::new()
	}
}

impl MemorySink {
	pub fn new() -> Self {
		Self { state: Mutex::new(State::default()) }
	}

	/// Seeds the sink as if blocks up to and including `height` were already
	/// committed in a prior run — used by resume tests.
	pub fn seed_highest_stored(&self, height: u64) {
		let mut state = self.state.lock().expect("memory sink mutex poisoned");
		state.highest = Some(height);
	}

	pub fn has_block(&self, number: u64) -> bool {
		self.state.lock().expect("memory sink mutex poisoned").blocks.contains_key(&number)
	}

	/// A sink whose very first call fails — used to exercise the Loop's
	/// startup halt when it cannot even learn the high-water mark.
	pub fn failing_on_startup() -> FailingStartupSink {
		FailingStartupSink
	}
}

/// Always fails `highest_stored_block`; every other call is unreachable in
/// the scenario this is used for.
pub struct FailingStartupSink;

#[async_trait]
impl Sink for FailingStartupSink {
	async fn highest_stored_block(&self) -> Result<Option<u64>, SinkError> {
		Err(SinkError::Transient { reason: "sink unreachable".into() })
	}

	async fn put_block(&self, _block: &Block) -> Result<BlockId, SinkError> {
		unreachable!("loop halts before any put is attempted")
	}

	async fn put_transaction(&self, _tx: &Transaction, _block: &BlockId) -> Result<TxId, SinkError> {
		unreachable!("loop halts before any put is attempted")
	}

	async fn put_access_list_entry(&self, _entry: &AccessListEntry, _tx: &TxId) -> Result<EntryId, SinkError> {
		unreachable!("loop halts before any put is attempted")
	}

	async fn put_log(&self, _log: &Log, _block: &BlockId, _tx: &TxId) -> Result<LogId, SinkError> {
		unreachable!("loop halts before any put is attempted")
	}
}

#[async_trait]
impl Sink for MemorySink {
	async fn highest_stored_block(&self) -> Result<Option<u64>, SinkError> {
		Ok(self.state.lock().expect("memory sink mutex poisoned").highest)
	}

	async fn put_block(&self, block: &Block) -> Result<BlockId, SinkError> {
		let mut state = self.state.lock().expect("memory sink mutex poisoned");
		if state.blocks.contains_key(&block.number) {
			return Err(SinkError::DuplicateKey { natural_key: format!("block:{}", block.number) });
		}
		let id = BlockId(format!("block:{}", block.number));
		state.blocks.insert(block.number, id.clone());
		state.highest = Some(state.highest.map_or(block.number, |h| h.max(block.number)));
		Ok(id)
	}

	async fn put_transaction(&self, tx: &Transaction, _block: &BlockId) -> Result<TxId, SinkError> {
		let mut state = self.state.lock().expect("memory sink mutex poisoned");
		if state.transactions.contains_key(&tx.hash) {
			return Err(SinkError::DuplicateKey { natural_key: format!("tx:{:#x}", tx.hash) });
		}
		let id = TxId(format!("tx:{:#x}", tx.hash));
		state.transactions.insert(tx.hash, id.clone());
		Ok(id)
	}

	async fn put_access_list_entry(&self, entry: &AccessListEntry, tx: &TxId) -> Result<EntryId, SinkError> {
		let mut state = self.state.lock().expect("memory sink mutex poisoned");
		let natural_key = format!("{}:access:{:#x}", tx.0, entry.address);
		if state.access_list_entries.contains_key(&natural_key) {
			return Err(SinkError::DuplicateKey { natural_key });
		}
		let id = EntryId(natural_key.clone());
		state.access_list_entries.insert(natural_key, id.clone());
		Ok(id)
	}

	async fn put_log(&self, log: &Log, block: &BlockId, tx: &TxId) -> Result<LogId, SinkError> {
		let mut state = self.state.lock().expect("memory sink mutex poisoned");
		let natural_key = format!("{}:log:{}", tx.0, log.index);
		if state.logs.contains_key(&natural_key) {
			return Err(SinkError::DuplicateKey { natural_key });
		}
		let id = LogId(natural_key.clone());
		state.logs.insert(natural_key, id.clone());
		let _ = block;
		Ok(id)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use indexer_core::model::Block;
	use primitive_types::{H160, H256, U256};

	fn sample_block(number: u64) -> Block {
		Block {
			number,
			hash: H256::from_low_u64_be(number),
			parent_hash: H256::zero(),
			miner: H160::zero(),
			gas_used: 0,
			gas_limit: 0,
			timestamp: 0,
			state_root: H256::zero(),
			receipts_root: H256::zero(),
			transactions_root: H256::zero(),
			extra_data: Vec::new(),
			size: 0,
			difficulty: U256::zero(),
			transactions: Vec::new(),
		}
	}

	#[tokio::test]
	async fn put_block_is_idempotent() {
		let sink = MemorySink::new();
		let block = sample_block(1);
		sink.put_block(&block).await.unwrap();
		let err = sink.put_block(&block).await.unwrap_err();
		assert!(matches!(err, SinkError::DuplicateKey { .. }));
	}

	#[tokio::test]
	async fn highest_stored_block_tracks_the_max_committed_height() {
		let sink = MemorySink::new();
		sink.put_block(&sample_block(5)).await.unwrap();
		sink.put_block(&sample_block(3)).await.unwrap();
		assert_eq!(sink.highest_stored_block().await.unwrap(), Some(5));
	}

	#[tokio::test]
	async fn empty_sink_has_no_highest_stored_block() {
		let sink = MemorySink::new();
		assert_eq!(sink.highest_stored_block().await.unwrap(), None);
	}
}
