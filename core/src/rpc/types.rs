use crate::error::Error;
use crate::hex;
use crate::model::{AccessListEntry, Block, Log, Transaction};
use primitive_types::{H160, H256, U256};
use serde::Deserialize;

/// Transaction-type tags this crate knows how to decode. Anything else
/// surfaces as [`Error::UnsupportedTxType`] (spec §4.1) so the classifier can
/// route it to a skipped height rather than a hard failure.
const KNOWN_TX_TYPES: &[u64] = &[0x0, 0x1, 0x2, 0x3];

/// `eth_getBlockByNumber(tag, true)` response body.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcBlock {
	pub number: String,
	pub hash: String,
	pub parent_hash: String,
	pub miner: String,
	pub gas_used: String,
	pub gas_limit: String,
	pub timestamp: String,
	pub state_root: String,
	pub receipts_root: String,
	pub transactions_root: String,
	pub extra_data: String,
	pub size: String,
	pub difficulty: String,
	pub transactions: Vec<RpcTransaction>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcTransaction {
	pub hash: String,
	pub transaction_index: String,
	pub from: String,
	pub to: Option<String>,
	pub value: String,
	pub gas: String,
	pub gas_price: String,
	pub input: String,
	pub nonce: String,
	#[serde(rename = "type")]
	pub tx_type: Option<String>,
	#[serde(default)]
	pub access_list: Vec<RpcAccessListEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcAccessListEntry {
	pub address: String,
	#[serde(default)]
	pub storage_keys: Vec<String>,
}

/// `eth_getTransactionReceipt` response body.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcReceipt {
	pub transaction_hash: String,
	#[serde(default)]
	pub logs: Vec<RpcLog>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcLog {
	pub address: String,
	#[serde(default)]
	pub topics: Vec<String>,
	pub data: String,
	pub log_index: String,
	#[serde(default)]
	pub removed: bool,
}

impl RpcAccessListEntry {
	pub fn into_model(self) -> Result<AccessListEntry, Error> {
		let address: [u8; 20] = hex::parse_fixed("accessList.address", &self.address)?;
		let storage_keys = self
			.storage_keys
			.iter()
			.map(|k| hex::parse_fixed("accessList.storageKeys[]", k).map(H256))
			.collect::<Result<Vec<_>, _>>()?;
		Ok(AccessListEntry { address: H160(address), storage_keys })
	}
}

impl RpcLog {
	pub fn into_model(self) -> Result<Log, Error> {
		let address: [u8; 20] = hex::parse_fixed("log.address", &self.address)?;
		let topics = self
			.topics
			.iter()
			.map(|t| hex::parse_fixed("log.topics[]", t).map(H256))
			.collect::<Result<Vec<_>, _>>()?;
		let data = hex::parse_bytes("log.data", &self.data)?;
		let index = hex::parse_u64("log.logIndex", &self.log_index)?;
		Ok(Log { address: H160(address), topics, data, index, removed: self.removed })
	}
}

impl RpcReceipt {
	/// Decodes every log in this receipt. The caller (the prefetcher) owns
	/// the policy of what to do when this fails for one receipt out of many
	/// — per spec §4.4, that transaction's logs are omitted, not the whole
	/// block.
	pub fn into_logs(self) -> Result<Vec<Log>, Error> {
		self.logs.into_iter().map(RpcLog::into_model).collect()
	}
}

impl RpcTransaction {
	pub fn into_model(self) -> Result<Transaction, Error> {
		let tx_type = match self.tx_type.as_deref() {
			Some(s) => hex::parse_u64("transaction.type", s)?,
			None => 0,
		};
		if !KNOWN_TX_TYPES.contains(&tx_type) {
			return Err(Error::UnsupportedTxType { tag: tx_type });
		}

		let hash: [u8; 32] = hex::parse_fixed("transaction.hash", &self.hash)?;
		let from: [u8; 20] = hex::parse_fixed("transaction.from", &self.from)?;
		let to = self.to.as_deref().map(|s| hex::parse_fixed("transaction.to", s)).transpose()?.map(H160);

		let access_list =
			self.access_list.into_iter().map(RpcAccessListEntry::into_model).collect::<Result<Vec<_>, _>>()?;

		Ok(Transaction {
			hash: H256(hash),
			index: hex::parse_u64("transaction.transactionIndex", &self.transaction_index)?,
			from: H160(from),
			to,
			value: hex::parse_u256("transaction.value", &self.value)?,
			gas: hex::parse_u64("transaction.gas", &self.gas)?,
			gas_price: hex::parse_u256("transaction.gasPrice", &self.gas_price)?,
			input: hex::parse_bytes("transaction.input", &self.input)?,
			nonce: hex::parse_u64("transaction.nonce", &self.nonce)?,
			tx_type,
			access_list,
			logs: Vec::new(),
		})
	}
}

impl RpcBlock {
	/// Converts the wire block into the domain model. Transactions carry no
	/// logs yet — those are attached once receipts are fetched (spec §4.4).
	pub fn into_model(self) -> Result<Block, Error> {
		let hash: [u8; 32] = hex::parse_fixed("block.hash", &self.hash)?;
		let parent_hash: [u8; 32] = hex::parse_fixed("block.parentHash", &self.parent_hash)?;
		let miner: [u8; 20] = hex::parse_fixed("block.miner", &self.miner)?;
		let state_root: [u8; 32] = hex::parse_fixed("block.stateRoot", &self.state_root)?;
		let receipts_root: [u8; 32] = hex::parse_fixed("block.receiptsRoot", &self.receipts_root)?;
		let transactions_root: [u8; 32] = hex::parse_fixed("block.transactionsRoot", &self.transactions_root)?;

		let transactions = self.transactions.into_iter().map(RpcTransaction::into_model).collect::<Result<Vec<_>, _>>()?;

		Ok(Block {
			number: hex::parse_u64("block.number", &self.number)?,
			hash: H256(hash),
			parent_hash: H256(parent_hash),
			miner: H160(miner),
			gas_used: hex::parse_u64("block.gasUsed", &self.gas_used)?,
			gas_limit: hex::parse_u64("block.gasLimit", &self.gas_limit)?,
			timestamp: hex::parse_u64("block.timestamp", &self.timestamp)?,
			state_root: H256(state_root),
			receipts_root: H256(receipts_root),
			transactions_root: H256(transactions_root),
			extra_data: hex::parse_bytes("block.extraData", &self.extra_data)?,
			size: hex::parse_u64("block.size", &self.size)?,
			difficulty: difficulty_or_zero(&self.difficulty)?,
			transactions,
		})
	}
}

// Post-merge chains report `difficulty: "0x0"`; some clients omit the field
// behavior entirely under certain RPC proxies. Treat a malformed value the
// same as `"0x0"` rather than failing the whole block over a field the core
// never acts on.
fn difficulty_or_zero(s: &str) -> Result<U256, Error> {
	Ok(hex::parse_u256("block.difficulty", s).unwrap_or(U256::zero()))
}

#[cfg(test)]
mod tests {
	use super::*;

	fn sample_tx_json(tx_type: &str) -> serde_json::Value {
		serde_json::json!({
			"hash": format!("0x{}", "11".repeat(32)),
			"transactionIndex": "0x0",
			"from": format!("0x{}", "22".repeat(20)),
			"to": format!("0x{}", "33".repeat(20)),
			"value": "0xde0b6b3a7640000",
			"gas": "0x5208",
			"gasPrice": "0x3b9aca00",
			"input": "0x",
			"nonce": "0x1",
			"type": tx_type,
			"accessList": [],
		})
	}

	#[test]
	fn decodes_legacy_and_eip1559_transactions() {
		for ty in ["0x0", "0x2"] {
			let tx: RpcTransaction = serde_json::from_value(sample_tx_json(ty)).unwrap();
			let model = tx.into_model().unwrap();
			assert_eq!(model.tx_type, u64::from_str_radix(ty.trim_start_matches("0x"), 16).unwrap());
		}
	}

	#[test]
	fn rejects_unknown_transaction_type() {
		let tx: RpcTransaction = serde_json::from_value(sample_tx_json("0x7e")).unwrap();
		let err = tx.into_model().unwrap_err();
		assert_eq!(err, Error::UnsupportedTxType { tag: 0x7e });
	}

	#[test]
	fn defaults_missing_type_to_legacy() {
		let mut json = sample_tx_json("0x0");
		json.as_object_mut().unwrap().remove("type");
		let tx: RpcTransaction = serde_json::from_value(json).unwrap();
		assert_eq!(tx.into_model().unwrap().tx_type, 0);
	}

	#[test]
	fn decodes_a_full_block() {
		let json = serde_json::json!({
			"number": "0x64",
			"hash": format!("0x{}", "aa".repeat(32)),
			"parentHash": format!("0x{}", "bb".repeat(32)),
			"miner": format!("0x{}", "cc".repeat(20)),
			"gasUsed": "0x5208",
			"gasLimit": "0x1c9c380",
			"timestamp": "0x6512aebc",
			"stateRoot": format!("0x{}", "dd".repeat(32)),
			"receiptsRoot": format!("0x{}", "ee".repeat(32)),
			"transactionsRoot": format!("0x{}", "ff".repeat(32)),
			"extraData": "0x",
			"size": "0x220",
			"difficulty": "0x0",
			"transactions": [sample_tx_json("0x2")],
		});
		let block: RpcBlock = serde_json::from_value(json).unwrap();
		let model = block.into_model().unwrap();
		assert_eq!(model.number, 100);
		assert_eq!(model.transactions.len(), 1);
	}
}
