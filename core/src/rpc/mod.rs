//! Raw JSON-RPC response shapes (`eth_*`) and their fallible conversion into
//! the semantic [`crate::model`] entities.

pub mod methods;
pub mod types;

pub use types::{RpcAccessListEntry, RpcBlock, RpcLog, RpcReceipt, RpcTransaction};
