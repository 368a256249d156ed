//! The single-consumer commit loop (spec §4.5): the sole authority on which
//! height is "next", the only caller of the Sink's mutating operations, and
//! the only place that decides retry / skip / halt on a classified error.
//!
//! Ordering is restored from the Prefetcher's unordered delivery with a
//! `BinaryHeap<Reverse<PrefetchedBlock>>` reorder buffer: records are only
//! consumed once the heap's minimum key equals `next_height` (spec §4.4's
//! "small min-heap keyed by height" option).

use crate::classify::{self, ErrorKind, Operation};
use crate::error::Error;
use crate::prefetch::{PrefetchedBlock, Prefetcher};
use crate::progress::ProgressObserver;
use crate::sink::{BlockId, Sink};
use indexer_core::model::{resume_cursor, Block};
use primitive_types::H256;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};

/// How the Loop exited: cleanly cancelled, or halted by a Fatal
/// classification that should become a non-zero exit code (spec §6).
pub struct LoopOutcome {
	pub last_height: u64,
	pub halted: Option<Error>,
}

enum PolicyOutcome<T> {
	Committed(T),
	AlreadyDone,
	Skipped,
	Fatal(Error),
}

pub struct IndexerLoop {
	sink: Arc<dyn Sink>,
	prefetcher: Prefetcher,
	buffer_size: usize,
	max_attempts: u32,
	poll_interval: Duration,
	cancellation: CancellationToken,
	progress: ProgressObserver,
}

impl IndexerLoop {
	pub fn new(
		sink: Arc<dyn Sink>,
		prefetcher: Prefetcher,
		buffer_size: usize,
		max_attempts: u32,
		poll_interval: Duration,
		cancellation: CancellationToken,
		progress: ProgressObserver,
	) -> Self {
		Self {
			sink,
			prefetcher,
			buffer_size: buffer_size.max(1),
			max_attempts: max_attempts.max(1),
			poll_interval,
			cancellation,
			progress,
		}
	}

	/// Runs until cancelled or a Fatal classification halts the process
	/// (spec §4.5). `configured_start_height` only wins over the Sink's
	/// high-water mark when the Sink is empty or behind it (spec §4.6).
	pub async fn run(mut self, configured_start_height: u64) -> LoopOutcome {
		let highest = match self.sink.highest_stored_block().await {
			Ok(highest) => highest,
			Err(err) => {
				let err = Error::from(err);
				return LoopOutcome { last_height: configured_start_height, halted: Some(err) };
			},
		};

		let mut cursor = resume_cursor(highest, configured_start_height);
		info!(next_height = cursor.next_height, "resuming ingest");

		self.prefetcher.prime(cursor.next_height, self.buffer_size).await;
		let mut scheduled_through = cursor.next_height.saturating_add(self.buffer_size as u64).saturating_sub(1);

		let mut reorder: BinaryHeap<Reverse<PrefetchedBlock>> = BinaryHeap::new();
		let mut attempt = 0u32;

		loop {
			if self.cancellation.is_cancelled() {
				break;
			}

			let height = cursor.next_height;
			let record = match self.next_record(&mut reorder, height).await {
				Some(record) => record,
				None => break,
			};

			if let Some(err) = record.error {
				let classification = classify::classify(&err, Operation::BlockByNumber, attempt);
				log_classified(Operation::BlockByNumber, &err, &classification, height, None);

				if matches!(classification.kind, ErrorKind::Critical | ErrorKind::Config) {
					return LoopOutcome { last_height: height, halted: Some(err) };
				}

				// A block ahead of the chain head is never skipped (spec §4.5
				// state diagram: NotAvail retries separately from the bounded
				// "Retryable N< max" branch). The classifier's fixed 3s delay
				// covers the first `max_attempts` tries; once we know we are
				// simply waiting on the chain head, settle into the slower
				// `indexer.poll_interval_seconds` cadence instead of hammering
				// the RPC every 3s indefinitely.
				if classification.kind == ErrorKind::NotAvailableYet {
					self.progress.record_retry(&err);
					let delay = if attempt + 1 < self.max_attempts { classification.delay_hint } else { self.poll_interval };
					attempt = attempt.saturating_add(1);
					self.sleep_or_cancel(delay).await;
					self.prefetcher.request(height).await;
					continue;
				}

				if classification.kind != ErrorKind::Unsupported && classification.retryable && attempt + 1 < self.max_attempts {
					attempt += 1;
					self.progress.record_retry(&err);
					self.sleep_or_cancel(classification.delay_hint).await;
					self.prefetcher.request(height).await;
					continue;
				}

				// Unsupported tx type, or retry budget exhausted: skip this
				// height and move on (spec §4.5).
				warn!(height, error_code = ?classification.kind, "skipping height");
				attempt = 0;
				cursor.advance();
				self.progress.record_skip(height);
				scheduled_through += 1;
				self.prefetcher.request(scheduled_through).await;
				continue;
			}

			let block = record.block.expect("a record without an error always carries a block");
			attempt = 0;
			match self.commit_block(height, block).await {
				Ok(()) => {
					cursor.advance();
					self.progress.record_advance(height);
				},
				Err(err) => return LoopOutcome { last_height: height, halted: Some(err) },
			}

			scheduled_through += 1;
			self.prefetcher.request(scheduled_through).await;
		}

		LoopOutcome { last_height: cursor.next_height.saturating_sub(1), halted: None }
	}

	/// Pops the reorder buffer's minimum once it equals `height`, discarding
	/// any stale entry for a height already past (a duplicate delivery from
	/// a height that was retried and later skipped). Returns `None` once the
	/// Prefetcher's output channel is closed or cancellation fires.
	async fn next_record(&mut self, reorder: &mut BinaryHeap<Reverse<PrefetchedBlock>>, height: u64) -> Option<PrefetchedBlock> {
		loop {
			if let Some(Reverse(top)) = reorder.peek() {
				match top.height.cmp(&height) {
					std::cmp::Ordering::Equal => {
						let Reverse(record) = reorder.pop().expect("just peeked");
						return Some(record);
					},
					std::cmp::Ordering::Less => {
						reorder.pop();
						continue;
					},
					std::cmp::Ordering::Greater => {},
				}
			}

			tokio::select! {
				biased;
				_ = self.cancellation.cancelled() => return None,
				record = self.prefetcher.recv() => match record {
					Some(record) => reorder.push(Reverse(record)),
					None => return None,
				},
			}
		}
	}

	async fn sleep_or_cancel(&self, delay: Duration) {
		tokio::select! {
			biased;
			_ = self.cancellation.cancelled() => {},
			_ = tokio::time::sleep(delay) => {},
		}
	}

	/// Commit algorithm for one block (spec §4.5 steps 1–3). `Ok(())` covers
	/// both a fresh commit and a `DuplicateKey`/non-fatal skip; only a Fatal
	/// classification anywhere in the chain propagates as `Err`, halting
	/// the whole Loop.
	async fn commit_block(&self, height: u64, block: Block) -> Result<(), Error> {
		let sink = Arc::clone(&self.sink);
		let outcome = self
			.put_with_policy(Operation::PutBlock, height, None, || {
				let sink = Arc::clone(&sink);
				let block = block.clone();
				async move { sink.put_block(&block).await.map_err(Error::from) }
			})
			.await;

		match outcome {
			PolicyOutcome::Committed(block_id) => self.commit_children(height, &block, &block_id).await,
			PolicyOutcome::AlreadyDone | PolicyOutcome::Skipped => Ok(()),
			PolicyOutcome::Fatal(err) => Err(err),
		}
	}

	async fn commit_children(&self, height: u64, block: &Block, block_id: &BlockId) -> Result<(), Error> {
		for tx in &block.transactions {
			let sink = Arc::clone(&self.sink);
			let outcome = self
				.put_with_policy(Operation::PutTransaction, height, Some(tx.hash), || {
					let sink = Arc::clone(&sink);
					let tx = tx.clone();
					let block_id = block_id.clone();
					async move { sink.put_transaction(&tx, &block_id).await.map_err(Error::from) }
				})
				.await;

			let tx_id = match outcome {
				PolicyOutcome::Committed(id) => id,
				PolicyOutcome::AlreadyDone | PolicyOutcome::Skipped => continue,
				PolicyOutcome::Fatal(err) => return Err(err),
			};

			for entry in &tx.access_list {
				let sink = Arc::clone(&self.sink);
				let outcome = self
					.put_with_policy(Operation::PutAccessListEntry, height, Some(tx.hash), || {
						let sink = Arc::clone(&sink);
						let entry = entry.clone();
						let tx_id = tx_id.clone();
						async move { sink.put_access_list_entry(&entry, &tx_id).await.map_err(Error::from) }
					})
					.await;
				if let PolicyOutcome::Fatal(err) = outcome {
					return Err(err);
				}
			}

			for log in &tx.logs {
				let sink = Arc::clone(&self.sink);
				let outcome = self
					.put_with_policy(Operation::PutLog, height, Some(tx.hash), || {
						let sink = Arc::clone(&sink);
						let log = log.clone();
						let block_id = block_id.clone();
						let tx_id = tx_id.clone();
						async move { sink.put_log(&log, &block_id, &tx_id).await.map_err(Error::from) }
					})
					.await;
				if let PolicyOutcome::Fatal(err) = outcome {
					return Err(err);
				}
			}
		}

		Ok(())
	}

	/// Drives one Sink mutation through the classifier's retry budget,
	/// logging every attempt, and resolves to one of the four §4.5
	/// outcomes: committed, already-done (`DuplicateKey`), skipped (retry
	/// budget exhausted or non-retryable-non-fatal), or fatal (`Config`/
	/// `Critical`, propagated to halt the Loop).
	async fn put_with_policy<T, F, Fut>(&self, operation: Operation, height: u64, tx_hash: Option<H256>, mut call: F) -> PolicyOutcome<T>
	where
		F: FnMut() -> Fut,
		Fut: Future<Output = Result<T, Error>>,
	{
		let mut attempt = 0u32;
		loop {
			match call().await {
				Ok(value) => return PolicyOutcome::Committed(value),
				Err(err) => {
					let classification = classify::classify(&err, operation, attempt);
					log_classified(operation, &err, &classification, height, tx_hash);

					if classification.kind == ErrorKind::DuplicateKey {
						return PolicyOutcome::AlreadyDone;
					}
					if classification.retryable && attempt + 1 < self.max_attempts {
						attempt += 1;
						self.progress.record_retry(&err);
						self.sleep_or_cancel(classification.delay_hint).await;
						continue;
					}
					if matches!(classification.kind, ErrorKind::Critical | ErrorKind::Config) {
						return PolicyOutcome::Fatal(err);
					}
					return PolicyOutcome::Skipped;
				},
			}
		}
	}
}

fn log_classified(operation: Operation, err: &Error, classification: &classify::Classification, height: u64, tx_hash: Option<H256>) {
	let op = operation.name();
	let kind = classification.kind;
	let retryable = classification.retryable;
	match classification.severity {
		Level::ERROR => {
			tracing::error!(component = "indexer_loop", operation = op, error = %err, error_code = ?kind, retryable, block_number = height, tx_hash = ?tx_hash, "operation failed")
		},
		Level::WARN => {
			tracing::warn!(component = "indexer_loop", operation = op, error = %err, error_code = ?kind, retryable, block_number = height, tx_hash = ?tx_hash, "operation failed")
		},
		Level::INFO => {
			tracing::info!(component = "indexer_loop", operation = op, error = %err, error_code = ?kind, retryable, block_number = height, tx_hash = ?tx_hash, "operation outcome")
		},
		_ => {
			tracing::debug!(component = "indexer_loop", operation = op, error = %err, error_code = ?kind, retryable, block_number = height, tx_hash = ?tx_hash, "operation outcome")
		},
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::sink::MemorySink;
	use crate::testing::FakeRpcClient;
	use std::time::Duration as StdDuration;

	fn progress() -> ProgressObserver {
		ProgressObserver::new(0)
	}

	fn new_loop(rpc: Arc<FakeRpcClient>, sink: Arc<dyn Sink>, buffer_size: usize, max_attempts: u32) -> IndexerLoop {
		let cancellation = CancellationToken::new();
		let prefetcher = Prefetcher::new(buffer_size, 2, max_attempts, rpc, cancellation.clone());
		let poll_interval = StdDuration::from_secs(12);
		IndexerLoop::new(sink, prefetcher, buffer_size, max_attempts, poll_interval, cancellation, progress())
	}

	#[tokio::test]
	async fn commits_a_contiguous_range_from_genesis() {
		let rpc = Arc::new(FakeRpcClient::with_chain_head(105));
		let sink: Arc<dyn Sink> = Arc::new(MemorySink::new());
		let indexer_loop = new_loop(Arc::clone(&rpc), Arc::clone(&sink), 4, 3);

		let cancellation = indexer_loop.cancellation.clone();
		let handle = tokio::spawn(indexer_loop.run(100));
		tokio::time::sleep(StdDuration::from_millis(50)).await;
		cancellation.cancel();
		let outcome = handle.await.unwrap();

		assert!(outcome.halted.is_none());
		assert_eq!(sink.highest_stored_block().await.unwrap(), Some(105));
	}

	#[tokio::test]
	async fn resumes_past_already_stored_heights_without_duplicate_errors() {
		let rpc = Arc::new(FakeRpcClient::with_chain_head(60));
		let sink = Arc::new(MemorySink::new());
		for height in 10..=50 {
			sink.put_block(&FakeRpcClient::sample_block(height)).await.unwrap();
		}
		let sink: Arc<dyn Sink> = sink;
		let indexer_loop = new_loop(Arc::clone(&rpc), Arc::clone(&sink), 4, 3);
		let cancellation = indexer_loop.cancellation.clone();

		let handle = tokio::spawn(indexer_loop.run(10));
		tokio::time::sleep(StdDuration::from_millis(50)).await;
		cancellation.cancel();
		let outcome = handle.await.unwrap();

		assert!(outcome.halted.is_none());
		assert_eq!(sink.highest_stored_block().await.unwrap(), Some(60));
	}

	#[tokio::test]
	async fn unsupported_tx_type_skips_the_height() {
		let rpc = Arc::new(FakeRpcClient::with_chain_head(205));
		rpc.make_unsupported(200);
		let sink: Arc<dyn Sink> = Arc::new(MemorySink::new());
		let indexer_loop = new_loop(Arc::clone(&rpc), Arc::clone(&sink), 4, 3);
		let cancellation = indexer_loop.cancellation.clone();

		let handle = tokio::spawn(indexer_loop.run(198));
		tokio::time::sleep(StdDuration::from_millis(50)).await;
		cancellation.cancel();
		let outcome = handle.await.unwrap();

		assert!(outcome.halted.is_none());
		// 200 is absent; everything else in range is present.
		assert!(!sink.has_block(200));
		assert!(sink.has_block(199));
		assert!(sink.has_block(201));
	}

	#[tokio::test]
	async fn duplicate_key_on_put_block_advances_without_children() {
		let rpc = Arc::new(FakeRpcClient::with_chain_head(306));
		let sink = Arc::new(MemorySink::new());
		sink.put_block(&FakeRpcClient::sample_block(305)).await.unwrap();
		let sink: Arc<dyn Sink> = sink;
		let indexer_loop = new_loop(Arc::clone(&rpc), Arc::clone(&sink), 4, 3);
		let cancellation = indexer_loop.cancellation.clone();

		let handle = tokio::spawn(indexer_loop.run(304));
		tokio::time::sleep(StdDuration::from_millis(50)).await;
		cancellation.cancel();
		let outcome = handle.await.unwrap();

		assert!(outcome.halted.is_none());
		assert_eq!(sink.highest_stored_block().await.unwrap(), Some(306));
	}

	#[tokio::test]
	async fn sink_failure_on_startup_halts_the_loop() {
		let rpc = Arc::new(FakeRpcClient::with_chain_head(10));
		let sink: Arc<dyn Sink> = Arc::new(MemorySink::failing_on_startup());
		let indexer_loop = new_loop(rpc, sink, 2, 3);

		let outcome = indexer_loop.run(0).await;
		assert!(outcome.halted.is_some());
	}

	#[tokio::test]
	async fn critical_rpc_failure_halts_the_loop() {
		let rpc = Arc::new(FakeRpcClient::with_chain_head(500));
		rpc.make_critical(400);
		let sink: Arc<dyn Sink> = Arc::new(MemorySink::new());
		let indexer_loop = new_loop(Arc::clone(&rpc), Arc::clone(&sink), 4, 3);

		let outcome = indexer_loop.run(400).await;
		assert!(outcome.halted.is_some());
		assert!(!sink.has_block(400));
	}
}
