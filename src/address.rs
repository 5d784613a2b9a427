//! Address and key-hash recognition
//!
//! Packed addresses and key hashes show up in Micheline as plain bytes of a
//! fixed length. This module recognizes those layouts and renders them in
//! their base58check text form.

use thiserror::Error;

pub const TZ1_PREFIX: [u8; 3] = [6, 161, 159];
pub const TZ2_PREFIX: [u8; 3] = [6, 161, 161];
pub const TZ3_PREFIX: [u8; 3] = [6, 161, 164];
pub const KT1_PREFIX: [u8; 3] = [2, 90, 121];
pub const EXPR_PREFIX: [u8; 4] = [13, 44, 64, 27];

/// Length of a packed key hash: curve tag + 20-byte hash
pub const KEY_HASH_LEN: usize = 21;
/// Length of a packed address: implicit (`00` + key hash) or originated (`01` + hash + `00`)
pub const ADDRESS_LEN: usize = 22;

const HASH_LEN: usize = 20;

/// Not an address; callers fall back to literal bytes
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AddressError {
    #[error("unexpected length {0}")]
    InvalidLength(usize),

    #[error("unknown curve tag {0:#04x}")]
    UnknownCurve(u8),

    #[error("unknown address prefix {0:02x}{1:02x}")]
    UnknownPrefix(u8, u8),
}

/// Prefix bytes, version then payload, base58 with a double-SHA256 checksum.
pub fn base58check(prefix: &[u8], payload: &[u8]) -> String {
    let mut data = Vec::with_capacity(prefix.len() + payload.len());
    data.extend_from_slice(prefix);
    data.extend_from_slice(payload);
    bs58::encode(data).with_check().into_string()
}

fn curve_prefix(tag: u8) -> Result<&'static [u8; 3], AddressError> {
    match tag {
        0 => Ok(&TZ1_PREFIX),
        1 => Ok(&TZ2_PREFIX),
        2 => Ok(&TZ3_PREFIX),
        other => Err(AddressError::UnknownCurve(other)),
    }
}

/// Render a 21-byte packed key hash (`tz1`/`tz2`/`tz3`).
pub fn decode_key_hash(bytes: &[u8]) -> Result<String, AddressError> {
    if bytes.len() != KEY_HASH_LEN {
        return Err(AddressError::InvalidLength(bytes.len()));
    }
    let prefix = curve_prefix(bytes[0])?;
    Ok(base58check(prefix, &bytes[1..]))
}

/// Render a 22-byte packed address (`KT1` or implicit).
pub fn decode_address(bytes: &[u8]) -> Result<String, AddressError> {
    if bytes.len() != ADDRESS_LEN {
        return Err(AddressError::InvalidLength(bytes.len()));
    }
    if bytes[0] == 1 && bytes[ADDRESS_LEN - 1] == 0 {
        return Ok(base58check(&KT1_PREFIX, &bytes[1..1 + HASH_LEN]));
    }
    if bytes[0] != 0 {
        return Err(AddressError::UnknownPrefix(bytes[0], bytes[1]));
    }
    let prefix =
        curve_prefix(bytes[1]).map_err(|_| AddressError::UnknownPrefix(bytes[0], bytes[1]))?;
    Ok(base58check(prefix, &bytes[2..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_implicit_address() {
        let bytes = hex::decode("000006a868bd80219eb1f6a25108d1bdaa98ae27b2d9").unwrap();
        assert_eq!(
            decode_address(&bytes).unwrap(),
            "tz1LFEVYR7YRCxT6Nm3Zfjdnfj77xZqhbR5U"
        );
    }

    #[test]
    fn test_key_hash() {
        let bytes = hex::decode("0006a868bd80219eb1f6a25108d1bdaa98ae27b2d9").unwrap();
        assert_eq!(
            decode_key_hash(&bytes).unwrap(),
            "tz1LFEVYR7YRCxT6Nm3Zfjdnfj77xZqhbR5U"
        );
    }

    #[test]
    fn test_originated_address() {
        let mut bytes = vec![0x01];
        bytes.extend_from_slice(&[0x11; HASH_LEN]);
        bytes.push(0x00);
        assert!(decode_address(&bytes).unwrap().starts_with("KT1"));
    }

    #[test]
    fn test_curve_prefixes_render() {
        for (tag, head) in [(0u8, "tz1"), (1, "tz2"), (2, "tz3")] {
            let mut bytes = vec![tag];
            bytes.extend_from_slice(&[0x42; HASH_LEN]);
            assert!(decode_key_hash(&bytes).unwrap().starts_with(head));
        }
    }

    #[test]
    fn test_unknown_prefixes() {
        let mut key_hash = vec![0x07];
        key_hash.extend_from_slice(&[0u8; HASH_LEN]);
        assert_eq!(
            decode_key_hash(&key_hash),
            Err(AddressError::UnknownCurve(0x07))
        );

        let mut address = vec![0x00, 0x09];
        address.extend_from_slice(&[0u8; HASH_LEN]);
        assert_eq!(
            decode_address(&address),
            Err(AddressError::UnknownPrefix(0x00, 0x09))
        );

        assert_eq!(
            decode_address(&[0u8; 5]),
            Err(AddressError::InvalidLength(5))
        );
    }
}
