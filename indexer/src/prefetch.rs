//! Bounded-concurrency block+receipt prefetcher (spec §4.4).
//!
//! A pool of `buffer_size` worker tasks pulls heights off a shared request
//! queue (`async_channel`, so every worker can read from the same queue
//! without a dedicated dispatcher), fetches the block and fans its receipts
//! out up to `receipt_concurrency` in parallel via a shared semaphore, and
//! pushes the finished record onto an unordered output channel. Ordering is
//! restored by the consumer (`indexer_loop.rs`), not here — this component
//! only promises that every requested height is eventually delivered once.

use crate::classify::{self, Operation};
use crate::error::Error;
use crate::rpc_client::RpcClient;
use indexer_core::model::{Block, Log, Transaction};
use std::cmp::Ordering;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Result of prefetching one height. `block` is `None` only when the fetch
/// itself failed terminally or ran out of retries at the prefetcher level —
/// the Loop re-requests the height after applying its own backoff.
pub struct PrefetchedBlock {
	pub height: u64,
	pub block: Option<Block>,
	pub error: Option<Error>,
}

impl PartialEq for PrefetchedBlock {
	fn eq(&self, other: &Self) -> bool {
		self.height == other.height
	}
}
impl Eq for PrefetchedBlock {}
impl PartialOrd for PrefetchedBlock {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}
impl Ord for PrefetchedBlock {
	fn cmp(&self, other: &Self) -> Ordering {
		self.height.cmp(&other.height)
	}
}

pub struct Prefetcher {
	request_tx: async_channel::Sender<u64>,
	output_rx: mpsc::Receiver<PrefetchedBlock>,
}

impl Prefetcher {
	pub fn new(
		buffer_size: usize,
		receipt_concurrency: usize,
		max_receipt_attempts: u32,
		rpc: Arc<dyn RpcClient>,
		cancellation: CancellationToken,
	) -> Self {
		let (request_tx, request_rx) = async_channel::unbounded();
		let (output_tx, output_rx) = mpsc::channel(buffer_size.max(1) * 2);
		let semaphore = Arc::new(Semaphore::new(receipt_concurrency.max(1)));

		for _ in 0..buffer_size.max(1) {
			let request_rx = request_rx.clone();
			let output_tx = output_tx.clone();
			let rpc = Arc::clone(&rpc);
			let semaphore = Arc::clone(&semaphore);
			let cancellation = cancellation.clone();
			tokio::spawn(worker(request_rx, output_tx, rpc, semaphore, max_receipt_attempts, cancellation));
		}

		Self { request_tx, output_rx }
	}

	/// Schedules `h0 .. h0 + window - 1` for fetch, per the initial fill on
	/// start (spec §4.4).
	pub async fn prime(&self, h0: u64, window: usize) {
		for height in h0..h0.saturating_add(window as u64) {
			self.request(height).await;
		}
	}

	/// Requests a single height; called by the Loop every time it consumes a
	/// record, keeping the lookahead window full, and again when it decides
	/// to retry a height that failed terminally.
	pub async fn request(&self, height: u64) {
		let _ = self.request_tx.send(height).await;
	}

	/// Receives the next completed record, in whatever order workers finish
	/// them. Returns `None` once every worker has exited and the channel has
	/// drained (spec §4.4 cancellation: no explicit drain step is needed).
	pub async fn recv(&mut self) -> Option<PrefetchedBlock> {
		self.output_rx.recv().await
	}
}

async fn worker(
	request_rx: async_channel::Receiver<u64>,
	output_tx: mpsc::Sender<PrefetchedBlock>,
	rpc: Arc<dyn RpcClient>,
	semaphore: Arc<Semaphore>,
	max_receipt_attempts: u32,
	cancellation: CancellationToken,
) {
	loop {
		let height = tokio::select! {
			biased;
			_ = cancellation.cancelled() => break,
			height = request_rx.recv() => match height {
				Ok(h) => h,
				Err(_) => break,
			},
		};

		let record = fetch_one(height, &rpc, &semaphore, max_receipt_attempts, &cancellation).await;
		if output_tx.send(record).await.is_err() {
			break;
		}
	}
}

async fn fetch_one(
	height: u64,
	rpc: &Arc<dyn RpcClient>,
	semaphore: &Arc<Semaphore>,
	max_receipt_attempts: u32,
	cancellation: &CancellationToken,
) -> PrefetchedBlock {
	let block = match rpc.block_by_number(height).await {
		Ok(Some(block)) => block,
		Ok(None) => {
			return PrefetchedBlock {
				height,
				block: None,
				error: Some(Error::Decode(indexer_core::Error::MissingField("block"))),
			};
		},
		Err(err) => return PrefetchedBlock { height, block: None, error: Some(err) },
	};

	let Block {
		number,
		hash,
		parent_hash,
		miner,
		gas_used,
		gas_limit,
		timestamp,
		state_root,
		receipts_root,
		transactions_root,
		extra_data,
		size,
		difficulty,
		transactions,
	} = block;

	let transactions = futures::future::join_all(
		transactions.into_iter().map(|tx| fetch_receipt_with_retry(tx, rpc, semaphore, max_receipt_attempts, cancellation)),
	)
	.await;

	let block = Block {
		number,
		hash,
		parent_hash,
		miner,
		gas_used,
		gas_limit,
		timestamp,
		state_root,
		receipts_root,
		transactions_root,
		extra_data,
		size,
		difficulty,
		transactions,
	};

	PrefetchedBlock { height, block: Some(block), error: None }
}

async fn fetch_receipt_with_retry(
	mut tx: Transaction,
	rpc: &Arc<dyn RpcClient>,
	semaphore: &Arc<Semaphore>,
	max_attempts: u32,
	cancellation: &CancellationToken,
) -> Transaction {
	let mut attempt = 0u32;
	loop {
		let permit = semaphore.acquire().await.expect("semaphore never closed");
		let outcome = rpc.transaction_receipt(tx.hash).await;
		drop(permit);

		match outcome {
			Ok(Some(receipt)) => match receipt.into_logs() {
				Ok(logs) => {
					tx.logs = logs;
					return tx;
				},
				Err(decode_err) => {
					warn!(tx_hash = ?tx.hash, error = %decode_err, "omitting logs: receipt decode failed");
					return tx;
				},
			},
			Ok(None) => return tx,
			Err(err) => {
				let classification = classify::classify(&err, Operation::TransactionReceipt, attempt);
				if !classification.retryable || attempt + 1 >= max_attempts {
					warn!(tx_hash = ?tx.hash, error = %err, attempts = attempt + 1, "omitting logs: receipt fetch exhausted retries");
					return tx;
				}
				attempt += 1;
				tokio::select! {
					biased;
					_ = cancellation.cancelled() => return tx,
					_ = tokio::time::sleep(classification.delay_hint) => {},
				}
			},
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::FakeRpcClient;
	use tokio_util::sync::CancellationToken;

	#[tokio::test]
	async fn prime_delivers_the_requested_window_in_some_order() {
		let rpc: Arc<dyn RpcClient> = Arc::new(FakeRpcClient::with_chain_head(20));
		let mut prefetcher = Prefetcher::new(3, 2, 3, rpc, CancellationToken::new());
		prefetcher.prime(10, 3).await;

		let mut seen = Vec::new();
		for _ in 0..3 {
			let record = prefetcher.recv().await.expect("worker pool delivers every requested height");
			seen.push(record.height);
		}
		seen.sort_unstable();
		assert_eq!(seen, vec![10, 11, 12]);
	}

	#[tokio::test]
	async fn block_beyond_chain_head_is_not_available_yet() {
		let rpc: Arc<dyn RpcClient> = Arc::new(FakeRpcClient::with_chain_head(5));
		let mut prefetcher = Prefetcher::new(1, 1, 3, rpc, CancellationToken::new());
		prefetcher.request(6).await;

		let record = prefetcher.recv().await.unwrap();
		assert_eq!(record.height, 6);
		assert!(record.block.is_none());
		assert!(matches!(record.error, Some(Error::NotAvailableYet { height: 6 })));
	}

	#[tokio::test]
	async fn transient_receipt_failures_retry_until_they_succeed() {
		let fake = FakeRpcClient::with_chain_head(300);
		let tx_hash = FakeRpcClient::sample_tx(300).hash;
		fake.make_receipt_flaky(tx_hash, 2);
		let rpc: Arc<dyn RpcClient> = Arc::new(fake);

		let mut prefetcher = Prefetcher::new(1, 2, 3, rpc, CancellationToken::new());
		prefetcher.request(300).await;

		let record = prefetcher.recv().await.unwrap();
		let block = record.block.expect("block fetch itself never fails in this scenario");
		assert_eq!(block.transactions.len(), 1);
		assert!(record.error.is_none());
	}
}
