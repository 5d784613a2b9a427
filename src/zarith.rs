//! Signed integer codec
//!
//! Michelson integers are sign-magnitude with a continuation bit. The first
//! byte carries the sign in bit 6 and the six least significant magnitude
//! bits; every following byte adds seven more significant bits.

use num_bigint::{BigInt, BigUint, Sign};

use crate::unforge::DecodeError;

const CONTINUATION: u8 = 0x80;
const SIGN: u8 = 0x40;
const FIRST_BITS: u8 = 0x3f;
const GROUP_BITS: u8 = 0x7f;
/// Each byte after the first is one base-128 digit
const GROUP_RADIX: u32 = 128;

/// Decode an integer from the front of `bytes`, returning it with the
/// number of bytes consumed.
pub fn decode_int(bytes: &[u8]) -> Result<(BigInt, usize), DecodeError> {
    let end = bytes
        .iter()
        .position(|b| b & CONTINUATION == 0)
        .ok_or(DecodeError::TruncatedInput)?;

    let first = bytes[0];
    let groups: Vec<u8> = bytes[1..=end].iter().map(|b| b & GROUP_BITS).collect();
    let high = BigUint::from_radix_le(&groups, GROUP_RADIX).unwrap_or_default();
    let magnitude = (high << 6u32) | BigUint::from(first & FIRST_BITS);

    let sign = if first & SIGN != 0 { Sign::Minus } else { Sign::Plus };
    Ok((BigInt::from_biguint(sign, magnitude), end + 1))
}

/// Encode an integer; the exact inverse of [`decode_int`].
pub fn encode_int(value: &BigInt) -> Vec<u8> {
    let magnitude = value.magnitude();
    let low = magnitude.iter_u32_digits().next().unwrap_or(0);

    let mut first = (low as u8) & FIRST_BITS;
    if value.sign() == Sign::Minus {
        first |= SIGN;
    }

    let high = magnitude >> 6u32;
    if high.bits() == 0 {
        return vec![first];
    }

    let groups = high.to_radix_le(GROUP_RADIX);
    let mut out = Vec::with_capacity(groups.len() + 1);
    out.push(first | CONTINUATION);
    let last = groups.len() - 1;
    for (i, group) in groups.into_iter().enumerate() {
        out.push(if i == last { group } else { group | CONTINUATION });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(hex_str: &str) -> (String, usize) {
        let (n, used) = decode_int(&hex::decode(hex_str).unwrap()).unwrap();
        (n.to_string(), used)
    }

    #[test]
    fn test_decode_small() {
        assert_eq!(decode("06"), ("6".to_string(), 1));
        assert_eq!(decode("46"), ("-6".to_string(), 1));
        assert_eq!(decode("00"), ("0".to_string(), 1));
        assert_eq!(decode("3f"), ("63".to_string(), 1));
    }

    #[test]
    fn test_decode_multi_byte() {
        assert_eq!(decode("8001"), ("64".to_string(), 2));
        assert_eq!(decode("95b4de75"), ("123456789".to_string(), 4));
        assert_eq!(decode("d5b4de75"), ("-123456789".to_string(), 4));
    }

    #[test]
    fn test_decode_stops_at_terminator() {
        // trailing byte belongs to the next value
        assert_eq!(decode("8001ff"), ("64".to_string(), 2));
    }

    #[test]
    fn test_decode_truncated() {
        assert_eq!(decode_int(&[]), Err(DecodeError::TruncatedInput));
        assert_eq!(decode_int(&[0x80]), Err(DecodeError::TruncatedInput));
        assert_eq!(decode_int(&[0x95, 0xb4]), Err(DecodeError::TruncatedInput));
    }

    #[test]
    fn test_encode() {
        assert_eq!(hex::encode(encode_int(&BigInt::from(0))), "00");
        assert_eq!(hex::encode(encode_int(&BigInt::from(6))), "06");
        assert_eq!(hex::encode(encode_int(&BigInt::from(-6))), "46");
        assert_eq!(hex::encode(encode_int(&BigInt::from(64))), "8001");
        assert_eq!(hex::encode(encode_int(&BigInt::from(123456789))), "95b4de75");
        assert_eq!(hex::encode(encode_int(&BigInt::from(-123456789))), "d5b4de75");
    }

    #[test]
    fn test_big_values_survive() {
        let big: BigInt = "-340282366920938463463374607431768211457".parse().unwrap();
        let bytes = encode_int(&big);
        let (back, used) = decode_int(&bytes).unwrap();
        assert_eq!(back, big);
        assert_eq!(used, bytes.len());
    }

    #[test]
    fn test_long_int_decodes_in_one_pass() {
        // 6 bits from the first byte plus 7 per following byte, all set
        let n = 200_000;
        let mut bytes = vec![0xff; n];
        bytes.push(0x7f);
        let (value, used) = decode_int(&bytes).unwrap();
        assert_eq!(used, n + 1);
        assert_eq!(value.sign(), Sign::Minus);
        let bits = 6 + 7 * n as u64;
        assert_eq!(value.magnitude().bits(), bits);
        assert_eq!(value.magnitude().count_ones(), bits);
        assert_eq!(encode_int(&value), bytes);
    }
}
