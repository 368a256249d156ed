/// Decode-time failures, produced only while turning a JSON-RPC response into
/// a typed value. Nothing in this crate classifies these as retryable or not
/// — that policy lives in the classifier, one layer up, and matches on the
/// variant, never on `to_string()`.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
	#[error("field `{field}` is not valid hex: {reason}")]
	MalformedHex { field: &'static str, reason: String },

	#[error("field `{field}` overflows its target width: {value}")]
	Overflow { field: &'static str, value: String },

	#[error("required field `{0}` was missing from the response")]
	MissingField(&'static str),

	#[error("unsupported transaction type tag 0x{tag:x}")]
	UnsupportedTxType { tag: u64 },
}

impl Error {
	pub fn malformed_hex(field: &'static str, reason: impl Into<String>) -> Self {
		Self::MalformedHex { field, reason: reason.into() }
	}

	pub fn overflow(field: &'static str, value: impl Into<String>) -> Self {
		Self::Overflow { field, value: value.into() }
	}
}
