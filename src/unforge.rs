//! Micheline binary decoder
//!
//! Recursive descent over a single tag byte per node. Every failure aborts the
//! whole decode; the only soft path is byte payloads that look like packed
//! addresses, key hashes or nested packed values.

use thiserror::Error;
use tracing::trace;

use crate::address::{decode_address, decode_key_hash, ADDRESS_LEN, KEY_HASH_LEN};
use crate::micheline::{Micheline, Prim};
use crate::primitives;
use crate::zarith::decode_int;

/// Errors that can occur while decoding Micheline bytes
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("invalid hex input")]
    InvalidHex,

    #[error("input truncated")]
    TruncatedInput,

    #[error("unknown tag {0:#04x}")]
    UnknownTag(u8),

    #[error("primitive keyword index {0:#04x} out of range")]
    InvalidPrimKeyword(u8),

    #[error("{0} trailing bytes after value")]
    TrailingData(usize),

    #[error("string is not valid UTF-8")]
    InvalidUtf8,

    #[error("missing pack marker 0x05")]
    MissingPackMarker,

    #[error("value nested deeper than {0} levels")]
    MaxDepthExceeded(usize),
}

pub const INT_TAG: u8 = 0x00;
pub const STRING_TAG: u8 = 0x01;
pub const SEQ_TAG: u8 = 0x02;
pub const PRIM_TAG: u8 = 0x03;
pub const PRIM_ANNOTS_TAG: u8 = 0x04;
pub const PRIM_ARG_TAG: u8 = 0x05;
pub const PRIM_ARG_ANNOTS_TAG: u8 = 0x06;
pub const PRIM_ARGS_TAG: u8 = 0x07;
pub const PRIM_ARGS_ANNOTS_TAG: u8 = 0x08;
pub const PRIM_GENERIC_TAG: u8 = 0x09;
pub const BYTES_TAG: u8 = 0x0a;

/// Marker byte in front of `PACK`ed values
pub const PACK_MARKER: u8 = 0x05;

/// Deepest node nesting accepted, counting sequences, primitive arguments
/// and nested packed payloads alike
pub const MAX_DEPTH: usize = 512;

/// Node kinds addressed by a tag byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Node {
    Int,
    String,
    Seq,
    Bytes,
    Prim { args: usize, annots: bool },
    GenericPrim,
}

impl Node {
    fn from_tag(tag: u8) -> Result<Self, DecodeError> {
        let node = match tag {
            INT_TAG => Self::Int,
            STRING_TAG => Self::String,
            SEQ_TAG => Self::Seq,
            BYTES_TAG => Self::Bytes,
            PRIM_TAG => Self::Prim { args: 0, annots: false },
            PRIM_ANNOTS_TAG => Self::Prim { args: 0, annots: true },
            PRIM_ARG_TAG => Self::Prim { args: 1, annots: false },
            PRIM_ARG_ANNOTS_TAG => Self::Prim { args: 1, annots: true },
            PRIM_ARGS_TAG => Self::Prim { args: 2, annots: false },
            PRIM_ARGS_ANNOTS_TAG => Self::Prim { args: 2, annots: true },
            PRIM_GENERIC_TAG => Self::GenericPrim,
            other => return Err(DecodeError::UnknownTag(other)),
        };
        Ok(node)
    }
}

/// Byte cursor over an input slice, tracking how deep the current node sits
struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
    depth: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self::nested(data, 0)
    }

    /// Cursor over an inner block that continues the parent's depth
    fn nested(data: &'a [u8], depth: usize) -> Self {
        Self { data, pos: 0, depth }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if self.remaining() < n {
            return Err(DecodeError::TruncatedInput);
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn byte(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    fn len_prefixed(&mut self) -> Result<&'a [u8], DecodeError> {
        let len = self.take(4)?;
        let len = u32::from_be_bytes([len[0], len[1], len[2], len[3]]) as usize;
        self.take(len)
    }
}

/// Decode a hex string holding exactly one Micheline value.
pub fn decode(hex_str: &str) -> Result<Micheline, DecodeError> {
    let bytes = hex::decode(hex_str.trim().trim_start_matches("0x"))
        .map_err(|_| DecodeError::InvalidHex)?;
    decode_bytes(&bytes)
}

/// Decode raw bytes holding exactly one Micheline value.
pub fn decode_bytes(bytes: &[u8]) -> Result<Micheline, DecodeError> {
    let (value, used) = decode_prefix(bytes)?;
    if used != bytes.len() {
        return Err(DecodeError::TrailingData(bytes.len() - used));
    }
    Ok(value)
}

/// Decode one value from the front of `bytes`, returning it with the number
/// of bytes consumed.
pub fn decode_prefix(bytes: &[u8]) -> Result<(Micheline, usize), DecodeError> {
    let mut cursor = Cursor::new(bytes);
    let value = decode_value(&mut cursor)?;
    Ok((value, cursor.pos))
}

/// Decode a `PACK`ed value: the 0x05 marker followed by one value.
pub fn unpack(bytes: &[u8]) -> Result<Micheline, DecodeError> {
    match bytes.split_first() {
        Some((&PACK_MARKER, rest)) => decode_bytes(rest),
        _ => Err(DecodeError::MissingPackMarker),
    }
}

fn decode_value(cursor: &mut Cursor) -> Result<Micheline, DecodeError> {
    if cursor.depth >= MAX_DEPTH {
        return Err(DecodeError::MaxDepthExceeded(MAX_DEPTH));
    }
    cursor.depth += 1;
    let value = decode_node(cursor);
    cursor.depth -= 1;
    value
}

fn decode_node(cursor: &mut Cursor) -> Result<Micheline, DecodeError> {
    match Node::from_tag(cursor.byte()?)? {
        Node::Int => {
            let (value, used) = decode_int(&cursor.data[cursor.pos..])?;
            cursor.pos += used;
            Ok(Micheline::Int(value))
        }
        Node::String => decode_string(cursor.len_prefixed()?).map(Micheline::String),
        Node::Seq => {
            let block = cursor.len_prefixed()?;
            decode_seq(block, cursor.depth).map(Micheline::Seq)
        }
        Node::Bytes => {
            let payload = cursor.len_prefixed()?;
            decode_byte_payload(payload, cursor.depth)
        }
        Node::Prim { args: count, annots } => {
            let name = decode_keyword(cursor)?;
            let mut args = Vec::with_capacity(count);
            for _ in 0..count {
                args.push(decode_value(cursor)?);
            }
            let annots = if annots {
                decode_annots(cursor.len_prefixed()?)?
            } else {
                Vec::new()
            };
            Ok(Micheline::Prim(Prim {
                name: name.to_string(),
                args,
                annots,
            }))
        }
        Node::GenericPrim => {
            let name = decode_keyword(cursor)?;
            let block = cursor.len_prefixed()?;
            let args = decode_seq(block, cursor.depth)?;
            let annots = decode_annots(cursor.len_prefixed()?)?;
            Ok(Micheline::Prim(Prim {
                name: name.to_string(),
                args,
                annots,
            }))
        }
    }
}

fn decode_keyword(cursor: &mut Cursor) -> Result<&'static str, DecodeError> {
    let index = cursor.byte()?;
    primitives::keyword(index).ok_or(DecodeError::InvalidPrimKeyword(index))
}

fn decode_string(bytes: &[u8]) -> Result<String, DecodeError> {
    String::from_utf8(bytes.to_vec()).map_err(|_| DecodeError::InvalidUtf8)
}

/// Elements of a length-prefixed block. An element running past the block
/// boundary surfaces as `TruncatedInput`.
fn decode_seq(block: &[u8], depth: usize) -> Result<Vec<Micheline>, DecodeError> {
    let mut cursor = Cursor::nested(block, depth);
    let mut items = Vec::new();
    while cursor.remaining() > 0 {
        items.push(decode_value(&mut cursor)?);
    }
    Ok(items)
}

fn decode_annots(block: &[u8]) -> Result<Vec<String>, DecodeError> {
    if block.is_empty() {
        return Ok(Vec::new());
    }
    Ok(decode_string(block)?
        .split(' ')
        .filter(|a| !a.is_empty())
        .map(str::to_string)
        .collect())
}

/// Byte payloads that read as a key hash, an address or a complete packed
/// value are rendered as such; anything else stays literal. Only the depth
/// limit is a hard error on this path.
fn decode_byte_payload(payload: &[u8], depth: usize) -> Result<Micheline, DecodeError> {
    let recognized = match payload.len() {
        KEY_HASH_LEN => decode_key_hash(payload).ok(),
        ADDRESS_LEN => decode_address(payload).ok(),
        _ => None,
    };
    if let Some(text) = recognized {
        return Ok(Micheline::String(text));
    }

    if let Some((&PACK_MARKER, packed)) = payload.split_first() {
        let mut cursor = Cursor::nested(packed, depth);
        match decode_value(&mut cursor) {
            Ok(nested) if cursor.remaining() == 0 => return Ok(nested),
            Ok(_) => trace!(
                trailing = cursor.remaining(),
                len = payload.len(),
                "nested_unpack_fallback"
            ),
            Err(e @ DecodeError::MaxDepthExceeded(_)) => return Err(e),
            Err(e) => trace!(error = %e, len = payload.len(), "nested_unpack_fallback"),
        }
    }

    Ok(Micheline::Bytes(payload.to_vec()))
}
