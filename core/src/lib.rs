//! Wire decoding and domain model for the chain indexer.
//!
//! This crate is intentionally inert: it has no network I/O and no retry
//! logic. It only knows how to turn JSON-RPC responses into typed,
//! bounds-checked values and how those values relate to one another
//! (`model`). Everything that talks to the network or to the sink lives in
//! `indexer-engine`.

pub mod error;
pub mod hex;
pub mod model;
pub mod rpc;

pub use error::Error;
pub use primitive_types::{H160, H256, U256};
