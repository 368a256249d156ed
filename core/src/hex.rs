//! Hex-quantity and hex-bytes decoding with explicit bounds checking.
//!
//! The upstream RPC encodes every integer as a `0x`-prefixed hex string with
//! no fixed width. A string that doesn't fit the field's target width is a
//! decode error, never a silent truncation (spec §4.1).

use crate::error::Error;
use primitive_types::U256;

fn strip_prefix(field: &'static str, s: &str) -> Result<&str, Error> {
	s.strip_prefix("0x")
		.or_else(|| s.strip_prefix("0X"))
		.ok_or_else(|| Error::malformed_hex(field, "missing 0x prefix"))
}

/// Parses a `0x`-prefixed hex quantity into a `u64`, rejecting values that
/// overflow 64 bits.
pub fn parse_u64(field: &'static str, s: &str) -> Result<u64, Error> {
	let value = parse_u256(field, s)?;
	u64::try_from(value).map_err(|_| Error::overflow(field, s))
}

/// Parses a `0x`-prefixed hex quantity into an unsigned 256-bit integer.
pub fn parse_u256(field: &'static str, s: &str) -> Result<U256, Error> {
	let digits = strip_prefix(field, s)?;
	let digits = if digits.is_empty() { "0" } else { digits };
	U256::from_str_radix(digits, 16).map_err(|e| Error::malformed_hex(field, e.to_string()))
}

/// Parses a `0x`-prefixed hex byte string (arbitrary length, e.g. `input`/`data`).
pub fn parse_bytes(field: &'static str, s: &str) -> Result<Vec<u8>, Error> {
	let digits = strip_prefix(field, s)?;
	let padded;
	let digits = if digits.len() % 2 == 1 {
		padded = format!("0{digits}");
		padded.as_str()
	} else {
		digits
	};
	const_hex::decode(digits).map_err(|e| Error::malformed_hex(field, e.to_string()))
}

/// Parses a fixed-width hash-like field (e.g. a 32-byte hash) into an array.
pub fn parse_fixed<const N: usize>(field: &'static str, s: &str) -> Result<[u8; N], Error> {
	let bytes = parse_bytes(field, s)?;
	<[u8; N]>::try_from(bytes.as_slice()).map_err(|_| Error::overflow(field, s))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_zero_quantity_variants() {
		assert_eq!(parse_u64("x", "0x0").unwrap(), 0);
		assert_eq!(parse_u64("x", "0x").unwrap(), 0);
	}

	#[test]
	fn parses_typical_quantity() {
		assert_eq!(parse_u64("x", "0x3039").unwrap(), 12345);
	}

	#[test]
	fn rejects_missing_prefix() {
		assert!(parse_u64("x", "3039").is_err());
	}

	#[test]
	fn rejects_u64_overflow() {
		// 2^64, one past u64::MAX
		let err = parse_u64("x", "0x10000000000000000").unwrap_err();
		assert!(matches!(err, Error::Overflow { .. }));
	}

	#[test]
	fn pads_odd_length_bytes() {
		assert_eq!(parse_bytes("x", "0xabc").unwrap(), vec![0x0a, 0xbc]);
	}

	#[test]
	fn parses_fixed_width_hash() {
		let s = format!("0x{}", "11".repeat(32));
		let h: [u8; 32] = parse_fixed("x", &s).unwrap();
		assert_eq!(h[0], 0x11);
		assert_eq!(h.len(), 32);
	}
}
