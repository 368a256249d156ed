//! A scriptable, in-memory [`RpcClient`] for ingest-pipeline tests — the
//! same "swap the transport, keep the trait" shape as the teacher's
//! `MockClient` (`client/src/clients/mock_client.rs`): no network I/O, but a
//! real implementation of the trait the Prefetcher and Indexer Loop drive
//! against in every other test in this crate.

#![cfg(test)]

use crate::error::Error;
use crate::rpc_client::RpcClient;
use async_trait::async_trait;
use indexer_core::model::{AccessListEntry, Block, Transaction};
use indexer_core::rpc::types::RpcReceipt;
use primitive_types::{H160, H256, U256};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

pub struct FakeRpcClient {
	chain_head: u64,
	unsupported_heights: Mutex<HashSet<u64>>,
	critical_heights: Mutex<HashSet<u64>>,
	flaky_receipts: Mutex<HashMap<H256, u32>>,
}

impl FakeRpcClient {
	pub fn with_chain_head(chain_head: u64) -> Self {
		Self {
			chain_head,
			unsupported_heights: Mutex::new(HashSet::new()),
			critical_heights: Mutex::new(HashSet::new()),
			flaky_receipts: Mutex::new(HashMap::new()),
		}
	}

	/// `height`'s block carries an unsupported transaction type tag — the
	/// Loop should classify this as `Unsupported` and skip it (spec §8
	/// scenario 3).
	pub fn make_unsupported(&self, height: u64) {
		self.unsupported_heights.lock().expect("fake rpc mutex poisoned").insert(height);
	}

	/// `height`'s block fetch fails with a Critical error — the Loop should
	/// halt rather than retry or skip.
	pub fn make_critical(&self, height: u64) {
		self.critical_heights.lock().expect("fake rpc mutex poisoned").insert(height);
	}

	/// `tx_hash`'s receipt fails `fail_times` times with a retryable network
	/// error before succeeding (spec §8 scenario 4).
	pub fn make_receipt_flaky(&self, tx_hash: H256, fail_times: u32) {
		self.flaky_receipts.lock().expect("fake rpc mutex poisoned").insert(tx_hash, fail_times);
	}

	pub fn sample_tx(number: u64) -> Transaction {
		Transaction {
			hash: H256::from_low_u64_be(number * 1_000 + 1),
			index: 0,
			from: H160::from_low_u64_be(1),
			to: Some(H160::from_low_u64_be(2)),
			value: U256::from(number),
			gas: 21_000,
			gas_price: U256::from(1_000_000_000u64),
			input: Vec::new(),
			nonce: number,
			tx_type: 2,
			access_list: vec![AccessListEntry { address: H160::from_low_u64_be(3), storage_keys: vec![H256::zero()] }],
			logs: Vec::new(),
		}
	}

	pub fn sample_block(number: u64) -> Block {
		Block {
			number,
			hash: H256::from_low_u64_be(number),
			parent_hash: H256::from_low_u64_be(number.saturating_sub(1)),
			miner: H160::zero(),
			gas_used: 21_000,
			gas_limit: 30_000_000,
			timestamp: 1_700_000_000 + number,
			state_root: H256::zero(),
			receipts_root: H256::zero(),
			transactions_root: H256::zero(),
			extra_data: Vec::new(),
			size: 1_000,
			difficulty: U256::zero(),
			transactions: vec![Self::sample_tx(number)],
		}
	}
}

#[async_trait]
impl RpcClient for FakeRpcClient {
	async fn latest_block_number(&self) -> Result<u64, Error> {
		Ok(self.chain_head)
	}

	async fn block_by_number(&self, height: u64) -> Result<Option<Block>, Error> {
		if height > self.chain_head {
			return Err(Error::NotAvailableYet { height });
		}
		if self.critical_heights.lock().expect("fake rpc mutex poisoned").contains(&height) {
			return Err(Error::Critical("simulated transport failure".into()));
		}
		if self.unsupported_heights.lock().expect("fake rpc mutex poisoned").contains(&height) {
			return Err(Error::Decode(indexer_core::Error::UnsupportedTxType { tag: 0x7e }));
		}
		Ok(Some(Self::sample_block(height)))
	}

	async fn transaction_receipt(&self, hash: H256) -> Result<Option<RpcReceipt>, Error> {
		let mut flaky = self.flaky_receipts.lock().expect("fake rpc mutex poisoned");
		if let Some(remaining) = flaky.get_mut(&hash) {
			if *remaining > 0 {
				*remaining -= 1;
				return Err(Error::network("eth_getTransactionReceipt", "simulated timeout"));
			}
		}
		Ok(Some(RpcReceipt { transaction_hash: format!("{hash:#x}"), logs: Vec::new() }))
	}

	async fn network_id(&self) -> Result<u64, Error> {
		Ok(1)
	}
}
