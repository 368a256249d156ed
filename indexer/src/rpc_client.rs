//! JSON-RPC transport and the typed façade over it (spec §4.1).
//!
//! The transport is one background task owning a single `reqwest::Client`
//! (one connection pool), fed through a bounded channel of
//! `(request bytes, response channel)` pairs — the same actor shape as the
//! teacher's `ReqwestClient`. The one addition: every call carries its own
//! timeout and cancellation token, raced against the response with
//! `tokio::select!` on the *caller* side, so a slow or cancelled caller never
//! blocks anyone else queued behind it on the shared task.

use crate::error::Error;
use async_trait::async_trait;
use indexer_core::model::Block;
use indexer_core::rpc::methods;
use indexer_core::rpc::types::{RpcBlock, RpcReceipt};
use primitive_types::H256;
use serde::Serialize;
use serde_json::value::RawValue;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::mpsc::{Receiver, Sender};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
enum TransportError {
	Http(String),
	RateLimited,
	ServerError(u16),
}

#[derive(Serialize)]
struct JsonRpcRequest<'a> {
	jsonrpc: &'static str,
	id: u64,
	method: &'a str,
	params: &'a RawValue,
}

type ResponseMessage = Result<serde_json::Value, TransportError>;
type ChannelMessage = (Vec<u8>, Sender<ResponseMessage>);

/// Typed JSON-RPC façade, backed by the actor described above.
#[async_trait]
pub trait RpcClient: Send + Sync {
	async fn latest_block_number(&self) -> Result<u64, Error>;
	async fn block_by_number(&self, height: u64) -> Result<Option<Block>, Error>;
	async fn transaction_receipt(&self, hash: H256) -> Result<Option<RpcReceipt>, Error>;
	async fn network_id(&self) -> Result<u64, Error>;
}

/// The production [`RpcClient`]: one HTTP actor per instance, per §5 ("owns
/// its own connection pool").
pub struct HttpRpcClient {
	tx: Sender<ChannelMessage>,
	next_id: AtomicU64,
	call_timeout: Duration,
	cancellation: CancellationToken,
	network_id: OnceLock<u64>,
}

impl HttpRpcClient {
	pub fn new(url: String, api_key: Option<String>, call_timeout: Duration, cancellation: CancellationToken) -> Self {
		let client = Arc::new(reqwest::Client::new());
		let (tx, rx) = tokio::sync::mpsc::channel(1024);
		tokio::spawn(Self::task(client, url, api_key, rx));

		Self { tx, next_id: AtomicU64::new(0), call_timeout, cancellation, network_id: OnceLock::new() }
	}

	async fn task(client: Arc<reqwest::Client>, url: String, api_key: Option<String>, mut rx: Receiver<ChannelMessage>) {
		while let Some((body, respond_to)) = rx.recv().await {
			let mut request = client.post(&url).header("Content-Type", "application/json").body(body);
			if let Some(key) = &api_key {
				request = request.header("X-API-Key", key);
			}

			let response = match request.send().await {
				Ok(r) => r,
				Err(err) => {
					let _ = respond_to.send(Err(TransportError::Http(err.to_string()))).await;
					continue;
				},
			};

			let status = response.status();
			if status.as_u16() == 429 {
				let _ = respond_to.send(Err(TransportError::RateLimited)).await;
				continue;
			}
			if status.is_server_error() {
				let _ = respond_to.send(Err(TransportError::ServerError(status.as_u16()))).await;
				continue;
			}

			match response.json::<serde_json::Value>().await {
				Ok(body) => {
					let _ = respond_to.send(Ok(body)).await;
				},
				Err(err) => {
					let _ = respond_to.send(Err(TransportError::Http(err.to_string()))).await;
				},
			}
		}
	}

	/// Sends one JSON-RPC call, racing the response against `self.call_timeout`
	/// and the shared cancellation token. Every typed method funnels through
	/// here so timeout/cancellation handling lives in exactly one place.
	async fn call(&self, method: &'static str, params: Box<RawValue>) -> Result<serde_json::Value, Error> {
		let id = self.next_id.fetch_add(1, Ordering::Relaxed);
		let request = JsonRpcRequest { jsonrpc: "2.0", id, method, params: &params };
		let body = serde_json::to_vec(&request).map_err(|e| Error::Config(e.to_string()))?;

		let (respond_to, mut response_rx) = tokio::sync::mpsc::channel(1);
		if self.tx.send((body, respond_to)).await.is_err() {
			return Err(Error::Critical("rpc transport task has exited".into()));
		}

		let outcome = tokio::select! {
			biased;
			_ = self.cancellation.cancelled() => {
				return Err(Error::Critical("cancelled while awaiting rpc response".into()));
			}
			result = tokio::time::timeout(self.call_timeout, response_rx.recv()) => result,
		};

		let elapsed = self.call_timeout;
		let message = match outcome {
			Ok(Some(message)) => message,
			Ok(None) => return Err(Error::network(method, "rpc transport closed the response channel")),
			Err(_) => return Err(Error::Timeout { method, elapsed }),
		};

		let envelope = match message {
			Ok(value) => value,
			Err(TransportError::RateLimited) => return Err(Error::RateLimited { method }),
			Err(TransportError::ServerError(status)) => return Err(Error::network(method, format!("server error {status}"))),
			Err(TransportError::Http(message)) => return Err(Error::network(method, message)),
		};

		if let Some(err) = envelope.get("error") {
			return Err(Error::network(method, err.to_string()));
		}
		envelope.get("result").cloned().ok_or_else(|| Error::network(method, "response carried neither result nor error"))
	}
}

fn height_params(height: u64) -> Box<RawValue> {
	let tag = methods::height_tag(height);
	RawValue::from_string(serde_json::to_string(&(tag, true)).expect("tuple serializes")).expect("valid json")
}

fn hash_params(hash: H256) -> Box<RawValue> {
	let hash = format!("{hash:#x}");
	RawValue::from_string(serde_json::to_string(&[hash]).expect("array serializes")).expect("valid json")
}

fn empty_params() -> Box<RawValue> {
	RawValue::from_string("[]".to_string()).expect("valid json")
}

#[async_trait]
impl RpcClient for HttpRpcClient {
	async fn latest_block_number(&self) -> Result<u64, Error> {
		let result = self.call(methods::ETH_BLOCK_NUMBER, empty_params()).await?;
		let s = result.as_str().ok_or_else(|| indexer_core::Error::malformed_hex("eth_blockNumber.result", "not a string"))?;
		Ok(indexer_core::hex::parse_u64("eth_blockNumber.result", s)?)
	}

	async fn block_by_number(&self, height: u64) -> Result<Option<Block>, Error> {
		let result = self.call(methods::ETH_GET_BLOCK_BY_NUMBER, height_params(height)).await?;
		if result.is_null() {
			let head = self.latest_block_number().await?;
			if height > head {
				return Err(Error::NotAvailableYet { height });
			}
			return Ok(None);
		}
		let rpc_block: RpcBlock = serde_json::from_value(result).map_err(|e| indexer_core::Error::malformed_hex("eth_getBlockByNumber.result", e.to_string()))?;
		Ok(Some(rpc_block.into_model()?))
	}

	async fn transaction_receipt(&self, hash: H256) -> Result<Option<RpcReceipt>, Error> {
		let result = self.call(methods::ETH_GET_TRANSACTION_RECEIPT, hash_params(hash)).await?;
		if result.is_null() {
			return Ok(None);
		}
		let receipt: RpcReceipt = serde_json::from_value(result).map_err(|e| indexer_core::Error::malformed_hex("eth_getTransactionReceipt.result", e.to_string()))?;
		Ok(Some(receipt))
	}

	async fn network_id(&self) -> Result<u64, Error> {
		if let Some(id) = self.network_id.get() {
			return Ok(*id);
		}
		let result = self.call(methods::NET_VERSION, empty_params()).await?;
		let s = result.as_str().ok_or_else(|| indexer_core::Error::malformed_hex("net_version.result", "not a string"))?;
		let id: u64 = s.parse().map_err(|_| indexer_core::Error::malformed_hex("net_version.result", "not an integer"))?;
		let _ = self.network_id.set(id);
		Ok(id)
	}
}
