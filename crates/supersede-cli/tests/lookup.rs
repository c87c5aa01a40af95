//! End-to-end tests for `supersede lookup`.
//!
//! Queries are piped in one burst, so every query after the first supersedes
//! its predecessor long before the simulated latency elapses.

use std::fs;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::TempDir;

const WORDS_CONFIG: &str = r#"
[lookup]
latency_ms = 300
per_char_ms = 0
max_results = 3
words = ["apple", "application", "apply", "apricot", "banana"]
"#;

/// Creates an isolated SUPERSEDE_HOME with a small word list.
fn temp_home() -> TempDir {
    let dir = TempDir::new().expect("create temp supersede home");
    fs::write(dir.path().join("config.toml"), WORDS_CONFIG).unwrap();
    dir
}

fn stdout_of(home: &TempDir, args: &[&str], stdin: &str) -> String {
    let output = cargo_bin_cmd!("supersede")
        .env("SUPERSEDE_HOME", home.path())
        .env_remove("SUPERSEDE_LOG")
        .arg("lookup")
        .args(args)
        .write_stdin(stdin)
        .output()
        .unwrap();
    assert!(output.status.success(), "lookup failed: {output:?}");
    String::from_utf8(output.stdout).unwrap()
}

#[test]
fn test_only_latest_query_is_reported() {
    let home = temp_home();

    cargo_bin_cmd!("supersede")
        .env("SUPERSEDE_HOME", home.path())
        .arg("lookup")
        .write_stdin("a\nap\napp\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("result app: apple, application, apply"))
        .stdout(predicate::str::contains("result a:").not())
        .stdout(predicate::str::contains("result ap:").not());
}

#[test]
fn test_show_stale_reports_cancelled_lookups() {
    let home = temp_home();
    let stdout = stdout_of(&home, &["--show-stale"], "a\nap\napp\n");

    assert!(stdout.contains("cancelled a\n"), "{stdout}");
    assert!(stdout.contains("cancelled ap\n"), "{stdout}");
    assert!(stdout.contains("result app: "), "{stdout}");
}

#[test]
fn test_no_cancel_lets_stale_lookups_finish() {
    let home = temp_home();
    let stdout = stdout_of(&home, &["--show-stale", "--no-cancel"], "a\nap\napp\n");

    assert!(stdout.contains("stale a\n"), "{stdout}");
    assert!(stdout.contains("stale ap\n"), "{stdout}");
    assert!(!stdout.contains("cancelled"), "{stdout}");
}

#[test]
fn test_burst_has_single_pending_window() {
    let home = temp_home();
    let stdout = stdout_of(&home, &["--show-pending"], "a\nap\napp\n");

    assert_eq!(stdout.matches("pending true").count(), 1, "{stdout}");
    assert_eq!(stdout.matches("pending false").count(), 1, "{stdout}");
    assert!(stdout.contains("result app: "), "{stdout}");
}

#[test]
fn test_empty_line_abandons_current_lookup() {
    let home = temp_home();
    let stdout = stdout_of(&home, &["--show-stale", "--show-pending"], "ban\n\n");

    assert!(stdout.contains("cancelled ban\n"), "{stdout}");
    assert!(!stdout.contains("result"), "{stdout}");
    assert_eq!(stdout.matches("pending false").count(), 1, "{stdout}");
}

#[test]
fn test_no_matches_prints_none() {
    let home = temp_home();
    let stdout = stdout_of(&home, &["--latency-ms", "0"], "zebra\n");

    assert_eq!(stdout.trim(), "result zebra: (none)");
}

#[test]
fn test_spaced_queries_each_report() {
    let home = temp_home();
    let stdout = stdout_of(
        &home,
        &["--latency-ms", "10", "--interval-ms", "200", "--max-results", "1"],
        "ap\nban\n",
    );

    assert!(stdout.contains("result ap: apple\n"), "{stdout}");
    assert!(stdout.contains("result ban: banana\n"), "{stdout}");
}
