use std::process::{Command, Output};

use serde_json::Value;

fn learnsim(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_learnsim"))
        .args(args)
        .output()
        .expect("spawn learnsim")
}

#[test]
fn demo_prints_only_json_on_stdout() {
    let out = learnsim(&["demo"]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

    let report: Value = serde_json::from_slice(&out.stdout).expect("stdout is one JSON document");
    assert_eq!(report["runs"][0]["label"], "conditioning");
    assert_eq!(report["runs"][0]["steps"].as_array().map(Vec::len), Some(20));

    let results = report["results"].as_array().unwrap();
    assert_eq!(results.len(), 3);
    assert!(results[0]["values"].is_array());
    // subject 'all' yields one series per subject
    assert_eq!(results[1]["values"].as_array().map(Vec::len), Some(20));

    // logs still go somewhere
    assert!(!out.stderr.is_empty());
}

#[test]
fn failures_keep_stdout_empty() {
    let missing = learnsim(&["run", "no/such/script.ls"]);
    assert_eq!(missing.status.code(), Some(1));
    assert!(missing.stdout.is_empty());

    let usage = learnsim(&["run", "--seed", "x"]);
    assert_eq!(usage.status.code(), Some(2));
}
