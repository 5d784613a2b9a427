//! Michelson primitive keyword table
//!
//! The binary encoding refers to primitives by their position in this table,
//! so the order is part of the wire format and must never change. New
//! protocol keywords are only ever appended.

/// Keyword table, indexed by the wire byte.
#[rustfmt::skip]
pub static PRIMITIVES: [&str; 149] = [
    // 0x00
    "parameter", "storage", "code", "False", "Elt", "Left", "None", "Pair",
    "Right", "Some", "True", "Unit", "PACK", "UNPACK", "BLAKE2B", "SHA256",
    // 0x10
    "SHA512", "ABS", "ADD", "AMOUNT", "AND", "BALANCE", "CAR", "CDR",
    "CHECK_SIGNATURE", "COMPARE", "CONCAT", "CONS", "CREATE_ACCOUNT", "CREATE_CONTRACT", "IMPLICIT_ACCOUNT", "DIP",
    // 0x20
    "DROP", "DUP", "EDIV", "EMPTY_MAP", "EMPTY_SET", "EQ", "EXEC", "FAILWITH",
    "GE", "GET", "GT", "HASH_KEY", "IF", "IF_CONS", "IF_LEFT", "IF_NONE",
    // 0x30
    "INT", "LAMBDA", "LE", "LEFT", "LOOP", "LSL", "LSR", "LT",
    "MAP", "MEM", "MUL", "NEG", "NEQ", "NIL", "NONE", "NOT",
    // 0x40
    "NOW", "OR", "PAIR", "PUSH", "RIGHT", "SIZE", "SOME", "SOURCE",
    "SENDER", "SELF", "STEPS_TO_QUOTA", "SUB", "SWAP", "TRANSFER_TOKENS", "SET_DELEGATE", "UNIT",
    // 0x50
    "UPDATE", "XOR", "ITER", "LOOP_LEFT", "ADDRESS", "CONTRACT", "ISNAT", "CAST",
    "RENAME", "bool", "contract", "int", "key", "key_hash", "lambda", "list",
    // 0x60
    "map", "big_map", "nat", "option", "or", "pair", "set", "signature",
    "string", "bytes", "mutez", "timestamp", "unit", "operation", "address", "SLICE",
    // 0x70
    "DIG", "DUG", "EMPTY_BIG_MAP", "APPLY", "chain_id", "CHAIN_ID", "LEVEL", "SELF_ADDRESS",
    "never", "NEVER", "UNPAIR", "VOTING_POWER", "TOTAL_VOTING_POWER", "KECCAK", "SHA3", "PAIRING_CHECK",
    // 0x80
    "bls12_381_g1", "bls12_381_g2", "bls12_381_fr", "sapling_state",
    "sapling_transaction_deprecated", "SAPLING_EMPTY_STATE", "SAPLING_VERIFY_UPDATE", "ticket",
    "TICKET_DEPRECATED", "READ_TICKET", "SPLIT_TICKET", "JOIN_TICKETS",
    "GET_AND_UPDATE", "chest", "chest_key", "OPEN_CHEST",
    // 0x90
    "VIEW", "view", "constant", "SUB_MUTEZ", "tx_rollup_l2_address",
];

/// Resolve a wire byte to its keyword.
pub fn keyword(index: u8) -> Option<&'static str> {
    PRIMITIVES.get(index as usize).copied()
}

/// Resolve a keyword to its wire byte.
pub fn index_of(name: &str) -> Option<u8> {
    PRIMITIVES
        .iter()
        .position(|p| *p == name)
        .map(|i| i as u8)
}

/// Whether `name` is a known keyword.
pub fn is_keyword(name: &str) -> bool {
    index_of(name).is_some()
}
