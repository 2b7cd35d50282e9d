use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

fn gmeter() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("gmeter"))
}

#[test]
fn help_lists_the_subcommands() {
    gmeter()
        .arg("--help")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("catalog")
                .and(predicate::str::contains("report"))
                .and(predicate::str::contains("inspect"))
                .and(predicate::str::contains("fetch")),
        );
}

#[test]
fn missing_config_is_reported() {
    gmeter()
        .arg("catalog")
        .arg("--config")
        .arg("/nonexistent/gridmeter.json")
        .assert()
        .failure()
        .stderr(predicate::str::contains("config"));
}

#[test]
fn invalid_config_is_rejected() {
    let temp = tempdir().unwrap();
    let config = temp.path().join("gridmeter.json");
    fs::write(
        &config,
        r#"{"root": "/tmp", "locations": {"generator": ["g"], "here": ["h"]}}"#,
    )
    .unwrap();

    gmeter()
        .arg("catalog")
        .arg("--config")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("neighbour"));
}

#[test]
fn inspect_shows_file_coverage() {
    let temp = tempdir().unwrap();
    fs::write(
        temp.path().join("log.sample"),
        "3600000,100\n7200000,250\n",
    )
    .unwrap();

    gmeter()
        .arg("inspect")
        .arg(temp.path())
        .assert()
        .success()
        .stdout(
            predicate::str::contains("log.sample")
                .and(predicate::str::contains("1970-01-01 01:00:00"))
                .and(predicate::str::contains("1970-01-01 02:00:00"))
                .and(predicate::str::contains("1 files covering")),
        );
}

#[test]
fn inspect_of_an_empty_directory_fails() {
    let temp = tempdir().unwrap();
    gmeter()
        .arg("inspect")
        .arg(temp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("No samples found"));
}

#[test]
fn fetch_rejects_an_unknown_timezone() {
    gmeter()
        .arg("fetch")
        .arg("--host")
        .arg("127.0.0.1:1")
        .arg("--meter-tz")
        .arg("Mars/Olympus")
        .arg("--from")
        .arg("2024-01-01T00:00:00Z")
        .arg("--to")
        .arg("2024-01-02T00:00:00Z")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown timezone"));
}

#[test]
fn fetch_rejects_a_malformed_instant() {
    gmeter()
        .arg("fetch")
        .arg("--host")
        .arg("127.0.0.1:1")
        .arg("--from")
        .arg("yesterday")
        .arg("--to")
        .arg("2024-01-02T00:00:00Z")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Bad instant"));
}
