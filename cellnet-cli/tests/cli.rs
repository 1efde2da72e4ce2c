//! Black-box tests driving the `cellnet` binary itself, the way the pack's
//! CLI crates test their own entry points: spawn the compiled binary and
//! assert on exit status and stdout shape.

use std::io::Write;

use assert_cmd::Command;
use predicates::prelude::*;

fn scenario_file(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("create temp scenario file");
    file.write_all(contents.as_bytes()).expect("write scenario");
    file
}

const MINIMAL_SCENARIO: &str = r#"
    [sim]
    steps_per_sec = 2

    [[towers]]
    id = "t0"
    ip = 1
    x = 0.0
    y = 0.0

    [[ues]]
    id = "a"
    ip = 50
    x = 0.0
    y = 0.0

    [ues.tx]
    mode = "fixed"
    dst_ip = 99
    n_bytes = 100
"#;

#[test]
fn runs_a_few_ticks_and_prints_summary_lines() {
    let file = scenario_file(MINIMAL_SCENARIO);
    Command::cargo_bin("cellnet")
        .expect("binary builds")
        .arg(file.path())
        .args(["-n", "3", "--no-pacing"])
        .assert()
        .success()
        .stdout(predicate::str::contains("tick"));
}

#[test]
fn json_mode_emits_one_object_per_tick() {
    let file = scenario_file(MINIMAL_SCENARIO);
    let output = Command::cargo_bin("cellnet")
        .expect("binary builds")
        .arg(file.path())
        .args(["-n", "4", "--json", "--no-pacing"])
        .output()
        .expect("run binary");
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).expect("utf8 stdout");
    let lines: Vec<&str> = stdout.lines().filter(|l| !l.is_empty()).collect();
    assert_eq!(lines.len(), 4);
    for line in lines {
        let value: serde_json::Value = serde_json::from_str(line).expect("valid json line");
        assert!(value.get("tick").is_some());
        assert!(value.get("total_tx_bytes").is_some());
    }
}

#[test]
fn missing_scenario_file_fails_cleanly() {
    Command::cargo_bin("cellnet")
        .expect("binary builds")
        .arg("/no/such/scenario.toml")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}
