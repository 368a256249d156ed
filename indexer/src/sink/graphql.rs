//! GraphQL-over-HTTP binding of [`Sink`] (spec §6). POSTs `{query,
//! variables}` documents over the same reqwest-actor shape as the RPC
//! Client, but as a distinct instance with its own connection pool (spec
//! §5) — the core never shares a transport between the two roles.

use super::{AccessListEntry, Block, BlockId, EntryId, Log, LogId, Sink, SinkError, Transaction, TxId};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;

/// GraphQL error codes recognized as "already exists" by the schema this
/// sink was written against. The core treats the schema as opaque (spec §9)
/// beyond recognizing this one code.
const DUPLICATE_KEY_CODE: &str = "DUPLICATE_KEY";

pub struct GraphqlSink {
	client: reqwest::Client,
	url: String,
}

#[derive(Serialize)]
struct GraphQlRequest<V: Serialize> {
	query: &'static str,
	variables: V,
}

impl GraphqlSink {
	pub fn new(url: String) -> Self {
		Self { client: reqwest::Client::new(), url }
	}

	async fn execute<V: Serialize>(&self, query: &'static str, variables: V) -> Result<serde_json::Value, SinkError> {
		let body = GraphQlRequest { query, variables };
		let response = self
			.client
			.post(&self.url)
			.json(&body)
			.send()
			.await
			.map_err(|e| SinkError::Transient { reason: e.to_string() })?;

		if response.status().is_server_error() {
			return Err(SinkError::Transient { reason: format!("sink returned {}", response.status()) });
		}

		let payload: serde_json::Value =
			response.json().await.map_err(|e| SinkError::Decode(e.to_string()))?;

		if let Some(errors) = payload.get("errors").and_then(|e| e.as_array()) {
			if let Some(first) = errors.first() {
				let code = first.get("extensions").and_then(|e| e.get("code")).and_then(|c| c.as_str());
				let message = first.get("message").and_then(|m| m.as_str()).unwrap_or("unknown graphql error").to_string();
				if code == Some(DUPLICATE_KEY_CODE) {
					return Err(SinkError::DuplicateKey { natural_key: message });
				}
				return Err(SinkError::GraphQl { message });
			}
		}

		payload.get("data").cloned().ok_or_else(|| SinkError::Decode("response carried neither data nor errors".into()))
	}

	fn extract_id(data: &serde_json::Value, field: &str) -> Result<String, SinkError> {
		data.get(field)
			.and_then(|v| v.get("id"))
			.and_then(|v| v.as_str())
			.map(str::to_string)
			.ok_or_else(|| SinkError::Decode(format!("missing `{field}.id` in mutation response")))
	}
}

/// `0x`-prefixed hex encoding of a byte field (`extra_data`, `input`, log
/// `data`), matching the wire encoding the RPC Client decoded it from.
fn hex_bytes(bytes: &[u8]) -> String {
	format!("0x{}", const_hex::encode(bytes))
}

const PUT_BLOCK: &str = "mutation($block: BlockInput!) { putBlock(block: $block) { id } }";
const PUT_TRANSACTION: &str =
	"mutation($tx: TransactionInput!, $blockId: ID!) { putTransaction(transaction: $tx, blockId: $blockId) { id } }";
const PUT_ACCESS_LIST_ENTRY: &str =
	"mutation($entry: AccessListEntryInput!, $txId: ID!) { putAccessListEntry(entry: $entry, txId: $txId) { id } }";
const PUT_LOG: &str =
	"mutation($log: LogInput!, $blockId: ID!, $txId: ID!) { putLog(log: $log, blockId: $blockId, txId: $txId) { id } }";
const HIGHEST_STORED_BLOCK: &str = "query { highestStoredBlock }";

#[async_trait]
impl Sink for GraphqlSink {
	async fn highest_stored_block(&self) -> Result<Option<u64>, SinkError> {
		let data = self.execute(HIGHEST_STORED_BLOCK, json!({})).await?;
		match data.get("highestStoredBlock") {
			None | Some(serde_json::Value::Null) => Ok(None),
			Some(v) => v.as_u64().map(Some).ok_or_else(|| SinkError::Decode("highestStoredBlock was not an integer".into())),
		}
	}

	async fn put_block(&self, block: &Block) -> Result<BlockId, SinkError> {
		let data = self
			.execute(
				PUT_BLOCK,
				json!({ "block": {
					"number": block.number,
					"hash": format!("{:#x}", block.hash),
					"parentHash": format!("{:#x}", block.parent_hash),
					"miner": format!("{:#x}", block.miner),
					"gasUsed": block.gas_used,
					"gasLimit": block.gas_limit,
					"timestamp": block.timestamp,
					"stateRoot": format!("{:#x}", block.state_root),
					"receiptsRoot": format!("{:#x}", block.receipts_root),
					"transactionsRoot": format!("{:#x}", block.transactions_root),
					"extraData": hex_bytes(&block.extra_data),
					"size": block.size,
					"difficulty": block.difficulty.to_string(),
				}}),
			)
			.await?;
		Ok(BlockId(Self::extract_id(&data, "putBlock")?))
	}

	async fn put_transaction(&self, tx: &Transaction, block: &BlockId) -> Result<TxId, SinkError> {
		let data = self
			.execute(
				PUT_TRANSACTION,
				json!({
					"tx": {
						"hash": format!("{:#x}", tx.hash),
						"index": tx.index,
						"from": format!("{:#x}", tx.from),
						"to": tx.to.map(|a| format!("{a:#x}")),
						"value": tx.value.to_string(),
						"gas": tx.gas,
						"gasPrice": tx.gas_price.to_string(),
						"input": hex_bytes(&tx.input),
						"nonce": tx.nonce,
						"type": tx.tx_type,
					},
					"blockId": block.0,
				}),
			)
			.await?;
		Ok(TxId(Self::extract_id(&data, "putTransaction")?))
	}

	async fn put_access_list_entry(&self, entry: &AccessListEntry, tx: &TxId) -> Result<EntryId, SinkError> {
		let data = self
			.execute(
				PUT_ACCESS_LIST_ENTRY,
				json!({
					"entry": {
						"address": format!("{:#x}", entry.address),
						"storageKeys": entry.storage_keys.iter().map(|k| format!("{k:#x}")).collect::<Vec<_>>(),
					},
					"txId": tx.0,
				}),
			)
			.await?;
		Ok(EntryId(Self::extract_id(&data, "putAccessListEntry")?))
	}

	async fn put_log(&self, log: &Log, block: &BlockId, tx: &TxId) -> Result<LogId, SinkError> {
		let data = self
			.execute(
				PUT_LOG,
				json!({
					"log": {
						"address": format!("{:#x}", log.address),
						"topics": log.topics.iter().map(|t| format!("{t:#x}")).collect::<Vec<_>>(),
						"data": hex_bytes(&log.data),
						"index": log.index,
						"removed": log.removed,
					},
					"blockId": block.0,
					"txId": tx.0,
				}),
			)
			.await?;
		Ok(LogId(Self::extract_id(&data, "putLog")?))
	}
}
