//! CLI binary coverage.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

use super::common::fixtures;

#[test]
fn inspect_summarizes_a_tape() {
    let dir = tempdir().unwrap();
    let tape = dir.path().join("div.jsonl");
    fixtures::write_tape(&tape, &fixtures::DIVIDE_BY_ZERO);

    Command::cargo_bin("retrace")
        .unwrap()
        .args(["inspect", "--tape"])
        .arg(&tape)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"invocations\": 1"))
        .stdout(predicate::str::contains("\"failure_point\": 0"));
}

#[test]
fn inspect_fails_on_missing_tape() {
    Command::cargo_bin("retrace")
        .unwrap()
        .args(["inspect", "--tape", "/nonexistent/tape.jsonl"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("could not read event tape"));
}

#[test]
fn run_requires_a_tape_argument() {
    Command::cargo_bin("retrace")
        .unwrap()
        .arg("run")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--tape"));
}

#[test]
fn run_without_verification_writes_artifacts() {
    let dir = tempdir().unwrap();
    let tape = dir.path().join("div.jsonl");
    fixtures::write_tape(&tape, &fixtures::DIVIDE_BY_ZERO);
    let out = dir.path().join("artifacts");

    Command::cargo_bin("retrace")
        .unwrap()
        .args(["run", "--no-verify", "--tape"])
        .arg(&tape)
        .arg("--out")
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"state\": \"done\""));

    // One session directory containing the generated test and manifest.
    let session_dirs: Vec<_> = std::fs::read_dir(&out).unwrap().collect();
    assert_eq!(session_dirs.len(), 1);
}

#[test]
fn run_exports_a_bundle() {
    let dir = tempdir().unwrap();
    let tape = dir.path().join("div.jsonl");
    fixtures::write_tape(&tape, &fixtures::DIVIDE_BY_ZERO);
    let out = dir.path().join("artifacts");
    let bundle = dir.path().join("repro.zip");

    Command::cargo_bin("retrace")
        .unwrap()
        .args(["run", "--no-verify", "--tape"])
        .arg(&tape)
        .arg("--out")
        .arg(&out)
        .arg("--bundle")
        .arg(&bundle)
        .assert()
        .success();

    let meta = retrace::ReproBundle::read_meta(&bundle).unwrap();
    assert!(meta.digests.contains_key("tape.jsonl"));
    assert!(meta.digests.contains_key("result.json"));
}
