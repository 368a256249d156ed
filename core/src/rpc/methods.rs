//! JSON-RPC method names consumed by the RPC Client (spec §6).

pub const ETH_BLOCK_NUMBER: &str = "eth_blockNumber";
pub const ETH_GET_BLOCK_BY_NUMBER: &str = "eth_getBlockByNumber";
pub const ETH_GET_TRANSACTION_RECEIPT: &str = "eth_getTransactionReceipt";
pub const NET_VERSION: &str = "net_version";

/// Renders a block height as the hex quantity tag `eth_getBlockByNumber`
/// expects; `"latest"`/`"pending"` are deliberately not supported here — the
/// core only ever requests concrete heights.
pub fn height_tag(height: u64) -> String {
	format!("0x{height:x}")
}
