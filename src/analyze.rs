//! Contract analysis
//!
//! Derives the similarity-relevant fields of a contract from its script:
//! entrypoints, annotations, fail-strings, tags, language and fingerprint.

use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

use crate::cluster::ProjectId;
use crate::fingerprint::{Fingerprint, FingerprintError, ScriptSections};
use crate::interface::identify_interfaces;
use crate::micheline::{Micheline, Prim};

pub const LANG_MICHELSON: &str = "michelson";
pub const LANG_SMARTPY: &str = "smartpy";
pub const LANG_LIQUIDITY: &str = "liquidity";
pub const LANG_LIGO: &str = "ligo";

/// Instructions whose presence tags a contract
const INSTRUCTION_TAGS: &[(&str, &str)] = &[
    ("SET_DELEGATE", "delegatable"),
    ("CHAIN_ID", "chain_aware"),
    ("CHECK_SIGNATURE", "checksig"),
    ("SAPLING_VERIFY_UPDATE", "sapling"),
    ("TICKET", "ticket"),
    ("TICKET_DEPRECATED", "ticket"),
    ("VIEW", "view"),
];

/// Similarity-relevant view of an indexed contract
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ContractMeta {
    pub address: String,
    pub network: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manager: Option<String>,
    #[serde(default)]
    pub language: String,
    #[serde(default, deserialize_with = "distinct_strings")]
    pub tags: Vec<String>,
    #[serde(default, deserialize_with = "distinct_strings")]
    pub fail_strings: Vec<String>,
    #[serde(default, deserialize_with = "distinct_strings")]
    pub annotations: Vec<String>,
    #[serde(default, deserialize_with = "distinct_strings")]
    pub entrypoints: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<Fingerprint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<ProjectId>,
}

impl ContractMeta {
    pub fn new(address: impl Into<String>, network: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            network: network.into(),
            language: LANG_MICHELSON.to_string(),
            ..Self::default()
        }
    }

    pub fn is_assigned(&self) -> bool {
        self.project_id.is_some()
    }
}

/// Build a contract's metadata from its on-chain script.
pub fn analyze_script(
    address: &str,
    network: &str,
    manager: Option<&str>,
    script: &Micheline,
) -> Result<ContractMeta, FingerprintError> {
    let sections = ScriptSections::from_script(script)?;
    let fingerprint = Fingerprint::from_sections(&sections)?;

    let entrypoints = entrypoints(sections.parameter);
    let mut annotations = Vec::new();
    collect_annotations(sections.parameter, &mut annotations);
    collect_annotations(sections.storage, &mut annotations);
    let mut fail_strings = Vec::new();
    collect_fail_strings(sections.code, &mut fail_strings);

    let mut tags = Vec::new();
    collect_instruction_tags(sections.code, &mut tags);
    for interface in identify_interfaces(&entrypoints) {
        push_unique(&mut tags, interface.tag());
    }

    let language = detect_language(&annotations, &fail_strings).to_string();

    debug!(
        address,
        network,
        language = %language,
        entrypoints = entrypoints.len(),
        tags = ?tags,
        "contract_analyzed"
    );

    Ok(ContractMeta {
        address: address.to_string(),
        network: network.to_string(),
        manager: manager.map(str::to_string),
        language,
        tags,
        fail_strings,
        annotations,
        entrypoints,
        fingerprint: Some(fingerprint),
        project_id: None,
    })
}

/// Set-valued fields keep first occurrences only, in input order
fn distinct_strings<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    let raw = Vec::<String>::deserialize(deserializer)?;
    let mut out = Vec::with_capacity(raw.len());
    for value in &raw {
        push_unique(&mut out, value);
    }
    Ok(out)
}

fn push_unique(list: &mut Vec<String>, value: &str) {
    if !list.iter().any(|v| v == value) {
        list.push(value.to_string());
    }
}

/// Named leaves of the parameter's `or` tree; `default` when none is named.
pub fn entrypoints(parameter: &Micheline) -> Vec<String> {
    let mut names = Vec::new();
    collect_entrypoints(parameter, &mut names);
    if names.is_empty() {
        names.push("default".to_string());
    }
    names
}

fn collect_entrypoints(node: &Micheline, names: &mut Vec<String>) {
    let Some(prim) = node.as_prim() else {
        return;
    };
    if let Some(name) = prim.field_annot() {
        push_unique(names, name);
    }
    if prim.name == "or" {
        for arg in &prim.args {
            collect_entrypoints(arg, names);
        }
    }
}

fn collect_annotations(node: &Micheline, out: &mut Vec<String>) {
    match node {
        Micheline::Prim(prim) => {
            for annot in &prim.annots {
                push_unique(out, annot);
            }
            for arg in &prim.args {
                collect_annotations(arg, out);
            }
        }
        Micheline::Seq(items) => {
            for item in items {
                collect_annotations(item, out);
            }
        }
        _ => {}
    }
}

fn pushed_string(prim: &Prim) -> Option<&str> {
    match prim.args.as_slice() {
        [ty, Micheline::String(s)] if prim.name == "PUSH" && ty.is_prim("string") => Some(s.as_str()),
        _ => None,
    }
}

/// Strings pushed right before `FAILWITH`
fn collect_fail_strings(node: &Micheline, out: &mut Vec<String>) {
    match node {
        Micheline::Seq(items) => {
            for pair in items.windows(2) {
                if pair[1].is_prim("FAILWITH") {
                    if let Some(s) = pair[0].as_prim().and_then(pushed_string) {
                        push_unique(out, s);
                    }
                }
            }
            for item in items {
                collect_fail_strings(item, out);
            }
        }
        Micheline::Prim(prim) => {
            for arg in &prim.args {
                collect_fail_strings(arg, out);
            }
        }
        _ => {}
    }
}

fn collect_instruction_tags(node: &Micheline, tags: &mut Vec<String>) {
    match node {
        Micheline::Seq(items) => {
            for item in items {
                collect_instruction_tags(item, tags);
            }
        }
        Micheline::Prim(prim) => {
            if let Some((_, tag)) = INSTRUCTION_TAGS.iter().find(|(name, _)| *name == prim.name) {
                push_unique(tags, tag);
            }
            for arg in &prim.args {
                collect_instruction_tags(arg, tags);
            }
        }
        _ => {}
    }
}

/// Guess the source language from compiler fingerprints left in the script.
pub fn detect_language(annotations: &[String], fail_strings: &[String]) -> &'static str {
    if fail_strings.iter().any(|s| s.starts_with("WrongCondition")) {
        return LANG_SMARTPY;
    }
    if annotations.iter().any(|a| a.contains("_Liq_")) {
        return LANG_LIQUIDITY;
    }
    if fail_strings
        .iter()
        .any(|s| s == "GET_FORCE" || s == "MAP FIND")
    {
        return LANG_LIGO;
    }
    LANG_MICHELSON
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn script(value: serde_json::Value) -> Micheline {
        serde_json::from_value(value).unwrap()
    }

    fn token_script() -> Micheline {
        script(json!([
            {"prim": "parameter", "args": [
                {"prim": "or", "args": [
                    {"prim": "or", "args": [
                        {"prim": "pair", "annots": ["%transfer"], "args": [{"prim": "address"}, {"prim": "nat"}]},
                        {"prim": "pair", "annots": ["%approve"], "args": [{"prim": "address"}, {"prim": "nat"}]}
                    ]},
                    {"prim": "or", "args": [
                        {"prim": "address", "annots": ["%getBalance"]},
                        {"prim": "or", "args": [
                            {"prim": "address", "annots": ["%getAllowance"]},
                            {"prim": "unit", "annots": ["%getTotalSupply"]}
                        ]}
                    ]}
                ]}
            ]},
            {"prim": "storage", "args": [
                {"prim": "pair", "args": [
                    {"prim": "big_map", "annots": ["%ledger"], "args": [{"prim": "address"}, {"prim": "nat"}]},
                    {"prim": "nat", "annots": ["%total"]}
                ]}
            ]},
            {"prim": "code", "args": [[
                {"prim": "DUP"},
                {"prim": "CHAIN_ID"},
                {"prim": "DROP"},
                {"prim": "IF_LEFT", "args": [
                    [{"prim": "PUSH", "args": [{"prim": "string"}, {"string": "NotEnoughBalance"}]}, {"prim": "FAILWITH"}],
                    [{"prim": "DROP"}]
                ]},
                {"prim": "NIL", "args": [{"prim": "operation"}]},
                {"prim": "PAIR"}
            ]]}
        ]))
    }

    #[test]
    fn test_analyze_token() {
        let meta = analyze_script("KT1Token", "mainnet", Some("tz1Manager"), &token_script()).unwrap();
        assert_eq!(
            meta.entrypoints,
            vec!["transfer", "approve", "getBalance", "getAllowance", "getTotalSupply"]
        );
        assert_eq!(meta.fail_strings, vec!["NotEnoughBalance"]);
        assert_eq!(meta.tags, vec!["chain_aware", "fa1", "fa1-2"]);
        assert!(meta.annotations.contains(&"%ledger".to_string()));
        assert!(meta.annotations.contains(&"%transfer".to_string()));
        assert_eq!(meta.language, LANG_MICHELSON);
        assert_eq!(meta.manager.as_deref(), Some("tz1Manager"));
        assert!(meta.fingerprint.is_some());
        assert!(!meta.is_assigned());
    }

    #[test]
    fn test_default_entrypoint() {
        assert_eq!(entrypoints(&Micheline::prim("unit")), vec!["default"]);
    }

    #[test]
    fn test_detect_language() {
        let none: Vec<String> = Vec::new();
        assert_eq!(
            detect_language(&none, &["WrongCondition: x > 0".to_string()]),
            LANG_SMARTPY
        );
        assert_eq!(
            detect_language(&["%_Liq_entry_main".to_string()], &none),
            LANG_LIQUIDITY
        );
        assert_eq!(detect_language(&none, &["GET_FORCE".to_string()]), LANG_LIGO);
        assert_eq!(detect_language(&none, &none), LANG_MICHELSON);
    }

    #[test]
    fn test_contract_meta_json_defaults() {
        let meta: ContractMeta =
            serde_json::from_value(json!({"address": "KT1a", "network": "mainnet"})).unwrap();
        assert!(meta.tags.is_empty());
        assert!(meta.fingerprint.is_none());
        assert!(meta.project_id.is_none());
    }

    #[test]
    fn test_contract_meta_json_drops_repeated_entries() {
        let meta: ContractMeta = serde_json::from_value(json!({
            "address": "KT1a",
            "network": "mainnet",
            "annotations": ["%x", "%y", "%x"],
            "entrypoints": ["mint", "mint"],
            "tags": ["fa2", "fa2"],
            "fail_strings": ["NO", "NO"]
        }))
        .unwrap();
        assert_eq!(meta.annotations, vec!["%x", "%y"]);
        assert_eq!(meta.entrypoints, vec!["mint"]);
        assert_eq!(meta.tags, vec!["fa2"]);
        assert_eq!(meta.fail_strings, vec!["NO"]);
    }
}
