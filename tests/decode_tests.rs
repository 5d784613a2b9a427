//! Codec tests against known on-chain vectors

use serde_json::json;
use tzcluster_rs::{decode, encode, hash_key, pack, unpack, DecodeError, Micheline};

fn decoded_json(hex: &str) -> serde_json::Value {
    let value = decode(hex).unwrap_or_else(|e| panic!("decode {hex}: {e}"));
    serde_json::to_value(value).unwrap()
}

#[test]
fn test_literal_vectors() {
    assert_eq!(decoded_json("0006"), json!({"int": "6"}));
    assert_eq!(decoded_json("0046"), json!({"int": "-6"}));
    assert_eq!(
        decoded_json("0a000000080123456789abcdef"),
        json!({"bytes": "0123456789abcdef"})
    );
    assert_eq!(decoded_json("0343"), json!({"prim": "PUSH"}));
    assert_eq!(
        decoded_json("053d036d"),
        json!({"prim": "NIL", "args": [{"prim": "operation"}]})
    );
}

#[test]
fn test_key_hash_bytes_render_as_address() {
    assert_eq!(
        decoded_json("0a00000016000006a868bd80219eb1f6a25108d1bdaa98ae27b2d9"),
        json!({"string": "tz1LFEVYR7YRCxT6Nm3Zfjdnfj77xZqhbR5U"})
    );
}

#[test]
fn test_hash_key_vector() {
    let key = Micheline::string("metadata");
    assert_eq!(
        hash_key(&key).unwrap(),
        "exprtuf4ctHCKfnRvAxgU8rMeqPzfb8D8e51GWR3iHkoWsFBxD8u9h"
    );
}

/// Canonical bytes survive a decode/encode cycle
#[test]
fn test_encode_decoded_canonical_bytes() {
    let values: Vec<Micheline> = vec![
        r#"{"prim": "Pair", "args": [{"int": "42"}, {"string": "hello"}]}"#.parse().unwrap(),
        r#"[{"prim": "DUP"}, {"prim": "CAR", "annots": ["@x"]}, {"prim": "DIP", "args": [[{"prim": "CDR"}]]}]"#
            .parse()
            .unwrap(),
        r#"{"prim": "pair", "args": [{"prim": "nat", "annots": ["%a"]}, {"prim": "int"}], "annots": [":p"]}"#
            .parse()
            .unwrap(),
        r#"{"prim": "Elt", "args": [{"int": "-123456789"}, {"bytes": "cafe"}]}"#.parse().unwrap(),
        Micheline::prim_args(
            "CREATE_CONTRACT",
            vec![
                Micheline::prim("unit"),
                Micheline::prim("unit"),
                Micheline::Seq(vec![]),
            ],
        ),
    ];

    for value in values {
        let canonical = hex::encode(encode(&value).unwrap());
        let decoded = decode(&canonical).unwrap();
        assert_eq!(hex::encode(encode(&decoded).unwrap()), canonical);
    }
}

#[test]
fn test_pack_unpack() {
    let value: Micheline = r#"{"prim": "Pair", "args": [{"int": "1"}, {"prim": "Unit"}]}"#
        .parse()
        .unwrap();
    let packed = pack(&value).unwrap();
    assert_eq!(packed[0], 0x05);
    assert_eq!(unpack(&packed).unwrap(), value);
    assert_eq!(unpack(&packed[1..]), Err(DecodeError::MissingPackMarker));
}

#[test]
fn test_malformed_input_is_rejected() {
    assert_eq!(decode("zz"), Err(DecodeError::InvalidHex));
    assert_eq!(decode("01000000"), Err(DecodeError::TruncatedInput));
    assert_eq!(decode("0b"), Err(DecodeError::UnknownTag(0x0b)));
    assert_eq!(decode("03ff"), Err(DecodeError::InvalidPrimKeyword(0xff)));
    assert_eq!(decode("000600"), Err(DecodeError::TrailingData(1)));
}
