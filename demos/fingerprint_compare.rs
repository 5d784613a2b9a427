//! Script fingerprint comparison example
//!
//! Usage:
//!   1. Fetch scripts: `curl <node>/chains/main/blocks/head/context/contracts/<KT1>/script | jq .code`
//!   2. Save each to a file
//!   3. Run: `cargo run --example fingerprint_compare -- script1.json script2.json`

use std::env;
use std::fs;
use tzcluster_rs::{analyze_script, Comparator, ComparatorConfig, Micheline};

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 3 {
        eprintln!("Usage: {} <script1.json> <script2.json>", args[0]);
        std::process::exit(1);
    }

    let script1: Micheline = fs::read_to_string(&args[1])
        .expect("Failed to read file 1")
        .parse()
        .expect("Invalid Micheline in file 1");
    let script2: Micheline = fs::read_to_string(&args[2])
        .expect("Failed to read file 2")
        .parse()
        .expect("Invalid Micheline in file 2");

    let meta1 = analyze_script(&args[1], "local", None, &script1).expect("Cannot analyze script 1");
    let meta2 = analyze_script(&args[2], "local", None, &script2).expect("Cannot analyze script 2");

    for meta in [&meta1, &meta2] {
        println!("{}", meta.address);
        if let Some(fp) = &meta.fingerprint {
            println!("  parameter: {} chars", fp.parameter.len());
            println!("  storage:   {} chars", fp.storage.len());
            println!("  code:      {} chars", fp.code.len());
        }
        println!("  entrypoints: {}", meta.entrypoints.join(", "));
        println!("  tags: {}", meta.tags.join(", "));
    }

    let comparator = Comparator::new(ComparatorConfig::default()).expect("default config is valid");

    println!("\nMetric scores:");
    for (name, value) in comparator.breakdown(&meta1, &meta2) {
        println!("  {name:<16} {value:.3}");
    }

    let score = comparator.score(&meta1, &meta2).expect("Comparison failed");
    println!("\nTotal: {:.3} (same project at >= {})", score.score, comparator.config().threshold);

    if score.same {
        println!("\n✓ Same project");
    } else {
        println!("\n✗ Different projects");
    }
}
