use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

#[test]
fn test_help_shows_all_commands() {
    cargo_bin_cmd!("supersede")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("lookup"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn test_lookup_help_shows_flags() {
    cargo_bin_cmd!("supersede")
        .args(["lookup", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--show-stale"))
        .stdout(predicate::str::contains("--show-pending"))
        .stdout(predicate::str::contains("--no-cancel"))
        .stdout(predicate::str::contains("--interval-ms"));
}

#[test]
fn test_version_flag() {
    cargo_bin_cmd!("supersede")
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("supersede"));
}

#[test]
fn test_unknown_command_fails() {
    cargo_bin_cmd!("supersede")
        .arg("frobnicate")
        .assert()
        .failure();
}
