//! Entry point: parse config, install logging, build a [`Runtime`], run it
//! to completion, translate the result into a process exit code (spec §6).
//! Nothing else lives here — every other decision is made inside the
//! `indexer-engine` library.

use indexer_engine::config::Config;
use indexer_engine::{logging, Error, Runtime};
use std::process::ExitCode;

const CONFIG_PATH_ENV: &str = "INDEXER_CONFIG_PATH";

#[tokio::main]
async fn main() -> ExitCode {
	let config_path = std::env::args().nth(1).or_else(|| std::env::var(CONFIG_PATH_ENV).ok());
	let config = match Config::load(config_path.as_deref()) {
		Ok(config) => config,
		Err(err) => {
			eprintln!("configuration error: {err}");
			return ExitCode::FAILURE;
		},
	};

	logging::init(config.logger.development);

	let runtime = Runtime::new(config);
	let cancellation = runtime.cancellation();

	let signal_cancellation = cancellation.clone();
	tokio::spawn(async move {
		wait_for_shutdown_signal().await;
		tracing::info!("shutdown signal received, cancelling ingest");
		signal_cancellation.cancel();
	});

	let mut run_future = Box::pin(runtime.run());

	let outcome = tokio::select! {
		result = &mut run_future => result,
		_ = cancellation.cancelled() => bounded_shutdown(run_future).await,
	};

	match outcome {
		Ok(outcome) => match outcome.halted {
			None => {
				tracing::info!(last_height = outcome.last_height, "ingest stopped cleanly");
				ExitCode::SUCCESS
			},
			Some(err) => {
				tracing::error!(last_height = outcome.last_height, error = %err, "ingest halted on a fatal classification");
				ExitCode::FAILURE
			},
		},
		Err(err) => {
			tracing::error!(error = %err, "ingest failed to start");
			ExitCode::FAILURE
		},
	}
}

/// Gives an in-flight [`Runtime::run`] up to [`Runtime::shutdown_grace_period`]
/// to finish its best-effort commit after cancellation fires (spec §5, §8
/// scenario 6); a Sink or RPC call that ignores cancellation no longer hangs
/// shutdown indefinitely.
async fn bounded_shutdown(run_future: impl std::future::Future<Output = Result<indexer_engine::indexer_loop::LoopOutcome, Error>>) -> Result<indexer_engine::indexer_loop::LoopOutcome, Error> {
	match tokio::time::timeout(Runtime::shutdown_grace_period(), run_future).await {
		Ok(result) => result,
		Err(_) => {
			tracing::error!("ingest did not shut down within the grace period; exiting anyway");
			Err(Error::Critical("shutdown grace period exceeded".into()))
		},
	}
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
	use tokio::signal::unix::{signal, SignalKind};

	let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
	let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");

	tokio::select! {
		_ = sigint.recv() => {},
		_ = sigterm.recv() => {},
	}
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
	let _ = tokio::signal::ctrl_c().await;
}
