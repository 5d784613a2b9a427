//! Micheline binary encoder
//!
//! Produces the canonical bytes used for hashing. This is the structural
//! inverse of the decoder's tag scheme; it does not try to undo the decoder's
//! address and nested-value heuristics.

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use thiserror::Error;

use crate::address::{base58check, EXPR_PREFIX};
use crate::micheline::{Micheline, Prim};
use crate::primitives;
use crate::unforge::{
    BYTES_TAG, INT_TAG, PACK_MARKER, PRIM_ANNOTS_TAG, PRIM_ARGS_ANNOTS_TAG, PRIM_ARGS_TAG,
    PRIM_ARG_ANNOTS_TAG, PRIM_ARG_TAG, PRIM_GENERIC_TAG, PRIM_TAG, SEQ_TAG, STRING_TAG,
};
use crate::zarith::encode_int;

type Blake2b256 = Blake2b<U32>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ForgeError {
    #[error("unknown primitive {0:?}")]
    UnknownPrimitive(String),
}

/// Encode a value into Micheline bytes.
pub fn encode(value: &Micheline) -> Result<Vec<u8>, ForgeError> {
    let mut out = Vec::new();
    encode_into(value, &mut out)?;
    Ok(out)
}

/// `PACK` a value: the 0x05 marker followed by its encoding.
pub fn pack(value: &Micheline) -> Result<Vec<u8>, ForgeError> {
    let mut out = vec![PACK_MARKER];
    encode_into(value, &mut out)?;
    Ok(out)
}

/// Expression hash of a packed value, used as the big-map key hash.
pub fn hash_key(value: &Micheline) -> Result<String, ForgeError> {
    let digest = Blake2b256::digest(pack(value)?);
    Ok(base58check(&EXPR_PREFIX, &digest))
}

fn encode_into(value: &Micheline, out: &mut Vec<u8>) -> Result<(), ForgeError> {
    match value {
        Micheline::Int(i) => {
            out.push(INT_TAG);
            out.extend(encode_int(i));
        }
        Micheline::String(s) => {
            out.push(STRING_TAG);
            push_len_prefixed(out, s.as_bytes());
        }
        Micheline::Bytes(b) => {
            out.push(BYTES_TAG);
            push_len_prefixed(out, b);
        }
        Micheline::Seq(items) => {
            out.push(SEQ_TAG);
            let block = encode_all(items)?;
            push_len_prefixed(out, &block);
        }
        Micheline::Prim(prim) => encode_prim(prim, out)?,
    }
    Ok(())
}

fn encode_all(items: &[Micheline]) -> Result<Vec<u8>, ForgeError> {
    let mut block = Vec::new();
    for item in items {
        encode_into(item, &mut block)?;
    }
    Ok(block)
}

fn encode_prim(prim: &Prim, out: &mut Vec<u8>) -> Result<(), ForgeError> {
    let index = primitives::index_of(&prim.name)
        .ok_or_else(|| ForgeError::UnknownPrimitive(prim.name.clone()))?;
    let has_annots = !prim.annots.is_empty();

    let tag = match (prim.args.len(), has_annots) {
        (0, false) => PRIM_TAG,
        (0, true) => PRIM_ANNOTS_TAG,
        (1, false) => PRIM_ARG_TAG,
        (1, true) => PRIM_ARG_ANNOTS_TAG,
        (2, false) => PRIM_ARGS_TAG,
        (2, true) => PRIM_ARGS_ANNOTS_TAG,
        _ => PRIM_GENERIC_TAG,
    };
    out.push(tag);
    out.push(index);

    if tag == PRIM_GENERIC_TAG {
        let block = encode_all(&prim.args)?;
        push_len_prefixed(out, &block);
        push_len_prefixed(out, prim.annots.join(" ").as_bytes());
        return Ok(());
    }

    for arg in &prim.args {
        encode_into(arg, out)?;
    }
    if has_annots {
        push_len_prefixed(out, prim.annots.join(" ").as_bytes());
    }
    Ok(())
}

fn push_len_prefixed(out: &mut Vec<u8>, data: &[u8]) {
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(data);
}
