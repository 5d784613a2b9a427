//! End-to-end CLI tests.
//!
//! These tests execute the compiled `tzcluster` binary against the fixture
//! scripts. They need no network access.

use std::path::PathBuf;
use std::process::{Command, Output};

fn tzcluster(args: &[&str]) -> Output {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("tzcluster"));
    cmd.args(args);
    let output = cmd.output().expect("run tzcluster");
    assert!(
        output.status.success(),
        "expected success for {args:?}, got status={:?}, stderr={}",
        output.status.code(),
        String::from_utf8_lossy(&output.stderr)
    );
    output
}

fn stdout(output: &Output) -> String {
    String::from_utf8(output.stdout.clone()).expect("stdout is utf-8")
}

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("tzcluster-{}-{}", std::process::id(), name))
}

#[test]
fn test_e2e_decode_and_encode() {
    let output = tzcluster(&["decode", "053d036d"]);
    let v: serde_json::Value = serde_json::from_slice(&output.stdout).expect("stdout is valid JSON");
    assert_eq!(v["prim"], "NIL");
    assert_eq!(v["args"][0]["prim"], "operation");

    let output = tzcluster(&["encode", r#"{"prim":"NIL","args":[{"prim":"operation"}]}"#]);
    assert_eq!(stdout(&output).trim(), "053d036d");
}

#[test]
fn test_e2e_hash_key() {
    let output = tzcluster(&["hash-key", r#"{"string":"metadata"}"#]);
    assert_eq!(
        stdout(&output).trim(),
        "exprtuf4ctHCKfnRvAxgU8rMeqPzfb8D8e51GWR3iHkoWsFBxD8u9h"
    );
    assert!(
        output.stderr.is_empty(),
        "expected no stderr output, got stderr={}",
        String::from_utf8_lossy(&output.stderr)
    );
}

#[test]
fn test_e2e_fingerprint() {
    let output = tzcluster(&["fingerprint", "--script", "tests/fixtures/counter.json"]);
    let v: serde_json::Value = serde_json::from_slice(&output.stdout).expect("stdout is valid JSON");
    assert_eq!(v["parameter"], "5b5b");
    assert_eq!(v["storage"], "5b");
    assert_eq!(v["code"], "7a2e4c4b123d6d42");
}

#[test]
fn test_e2e_analyze_compare_cluster() {
    let mut metas = Vec::new();
    for (fixture, address) in [
        ("token_a.json", "KT1TokenA"),
        ("token_b.json", "KT1TokenB"),
        ("counter.json", "KT1Counter"),
    ] {
        let output = tzcluster(&[
            "analyze",
            "--script",
            &format!("tests/fixtures/{fixture}"),
            "--address",
            address,
            "--manager",
            "tz1Deployer",
        ]);
        let meta: serde_json::Value =
            serde_json::from_slice(&output.stdout).expect("stdout is valid JSON");
        assert_eq!(meta["address"], address);
        metas.push(meta);
    }

    let a = temp_path("a.json");
    let b = temp_path("b.json");
    std::fs::write(&a, metas[0].to_string()).unwrap();
    std::fs::write(&b, metas[1].to_string()).unwrap();
    let output = tzcluster(&["compare", a.to_str().unwrap(), b.to_str().unwrap(), "--breakdown"]);
    let v: serde_json::Value = serde_json::from_slice(&output.stdout).expect("stdout is valid JSON");
    assert_eq!(v["same"], true);
    assert_eq!(v["calibration"], "threshold");
    assert!(v["metrics"]["code_edit"].as_f64().is_some());

    let input = temp_path("contracts.jsonl");
    let lines: Vec<String> = metas.iter().map(|m| m.to_string()).collect();
    std::fs::write(&input, lines.join("\n")).unwrap();
    let output = tzcluster(&["cluster", "--input", input.to_str().unwrap()]);
    let rows: Vec<serde_json::Value> = stdout(&output)
        .lines()
        .map(|line| serde_json::from_str(line).expect("line is valid JSON"))
        .collect();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0]["project_id"], rows[1]["project_id"]);
    assert_ne!(rows[0]["project_id"], rows[2]["project_id"]);

    for path in [a, b, input] {
        let _ = std::fs::remove_file(path);
    }
}

#[test]
fn test_e2e_invalid_hex_fails() {
    let output = Command::new(assert_cmd::cargo::cargo_bin!("tzcluster"))
        .args(["decode", "0b"])
        .output()
        .expect("run tzcluster");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("unknown tag"));
}
