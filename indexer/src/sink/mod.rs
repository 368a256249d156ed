//! Write-only interface to the downstream document store (spec §4.3). The
//! Loop is the only caller of the mutating operations here — see the
//! single-consumer discipline in `indexer_loop.rs`.

pub mod graphql;
pub mod memory;

use async_trait::async_trait;
use indexer_core::model::{AccessListEntry, Block, Log, Transaction};

pub use graphql::GraphqlSink;
pub use memory::MemorySink;

macro_rules! opaque_id {
	($name:ident) => {
		#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
		pub struct $name(pub String);

		impl std::fmt::Display for $name {
			fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
				write!(f, "{}", self.0)
			}
		}
	};
}

opaque_id!(BlockId);
opaque_id!(TxId);
opaque_id!(EntryId);
opaque_id!(LogId);

#[derive(thiserror::Error, Debug)]
pub enum SinkError {
	#[error("natural key already exists: {natural_key}")]
	DuplicateKey { natural_key: String },

	#[error("sink is transiently unavailable: {reason}")]
	Transient { reason: String },

	#[error("sink rejected the mutation: {message}")]
	GraphQl { message: String },

	#[error("could not decode sink response: {0}")]
	Decode(String),
}

/// Write-only interface to the document store. Every `put_*` is required to
/// be idempotent on its natural key — see [`SinkError::DuplicateKey`].
#[async_trait]
pub trait Sink: Send + Sync {
	async fn highest_stored_block(&self) -> Result<Option<u64>, SinkError>;
	async fn put_block(&self, block: &Block) -> Result<BlockId, SinkError>;
	async fn put_transaction(&self, tx: &Transaction, block: &BlockId) -> Result<TxId, SinkError>;
	async fn put_access_list_entry(&self, entry: &AccessListEntry, tx: &TxId) -> Result<EntryId, SinkError>;
	async fn put_log(&self, log: &Log, block: &BlockId, tx: &TxId) -> Result<LogId, SinkError>;
}
