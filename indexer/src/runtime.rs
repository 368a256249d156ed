//! The composition root (spec §2 [ADDED]): builds every long-lived
//! component once, from one validated [`Config`], and owns the single
//! [`CancellationToken`] that ties their shutdown together. `main` does
//! nothing but parse config, install logging, build a `Runtime`, run it, and
//! translate the result into a process exit code — retiring the
//! process-wide-singleton pattern flagged in spec §9.

use crate::config::Config;
use crate::error::Error;
use crate::indexer_loop::{IndexerLoop, LoopOutcome};
use crate::prefetch::Prefetcher;
use crate::progress::ProgressObserver;
use crate::rpc_client::{HttpRpcClient, RpcClient};
use crate::sink::{GraphqlSink, Sink};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const RPC_CALL_TIMEOUT: Duration = Duration::from_secs(30);
const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(30);

pub struct Runtime {
	config: Config,
	cancellation: CancellationToken,
	progress: ProgressObserver,
	sink: Arc<dyn Sink>,
	rpc: Arc<dyn RpcClient>,
}

impl Runtime {
	pub fn new(config: Config) -> Self {
		let cancellation = CancellationToken::new();
		let rpc: Arc<dyn RpcClient> =
			Arc::new(HttpRpcClient::new(config.rpc.url.clone(), config.rpc.api_key.clone(), RPC_CALL_TIMEOUT, cancellation.clone()));
		let sink: Arc<dyn Sink> = Arc::new(GraphqlSink::new(config.sink.url.clone()));
		let progress = ProgressObserver::new(config.indexer.start_height);

		Self { config, cancellation, progress, sink, rpc }
	}

	/// Hands back a cheap, cloneable handle an external health-endpoint
	/// process could poll — the core itself exposes no HTTP surface (spec
	/// §1 Non-goals).
	pub fn progress(&self) -> ProgressObserver {
		self.progress.clone()
	}

	pub fn cancellation(&self) -> CancellationToken {
		self.cancellation.clone()
	}

	/// Runs the ingest pipeline to completion: either cancelled (clean
	/// shutdown) or halted by a fatal classification.
	pub async fn run(self) -> Result<LoopOutcome, Error> {
		let prefetch_cfg = &self.config.indexer.prefetch;
		let prefetcher = Prefetcher::new(
			prefetch_cfg.buffer_size,
			prefetch_cfg.receipt_concurrency,
			self.config.indexer.retry.max_attempts,
			Arc::clone(&self.rpc),
			self.cancellation.clone(),
		);

		let indexer_loop = IndexerLoop::new(
			Arc::clone(&self.sink),
			prefetcher,
			prefetch_cfg.buffer_size,
			self.config.indexer.retry.max_attempts,
			self.config.poll_interval(),
			self.cancellation.clone(),
			self.progress.clone(),
		);

		Ok(indexer_loop.run(self.config.indexer.start_height).await)
	}

	pub fn shutdown_grace_period() -> Duration {
		SHUTDOWN_GRACE_PERIOD
	}
}
