use std::{fs, path::Path};

use assert_cmd::Command;
use chrono::{DateTime, TimeZone, Utc};
use gridmeter::sample::Sample;
use tempfile::tempdir;

fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, 0, 0).single().unwrap()
}

fn write_meter(root: &Path, name: &str, points: &[(DateTime<Utc>, f64)]) {
    let dir = root.join(name);
    fs::create_dir_all(&dir).unwrap();
    let mut contents = String::new();
    for (time, energy) in points {
        contents.push_str(&Sample::new(*time, *energy).format_line());
        contents.push('\n');
    }
    fs::write(dir.join("log.sample"), contents).unwrap();
}

fn write_config(dir: &Path, root: &Path) -> String {
    let config_path = dir.join("gridmeter.json");
    let config = format!(
        r#"{{
  "root": {root:?},
  "timezone": "UTC",
  "here_name": "house",
  "neighbour_name": "barn",
  "quantum_minutes": 5,
  "locations": {{
    "generator": ["gen"],
    "here": ["main"],
    "neighbour": ["barn"]
  }}
}}
"#,
        root = root.display().to_string(),
    );
    fs::write(&config_path, config).unwrap();
    config_path.to_str().unwrap().to_string()
}

fn gmeter() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("gmeter"))
}

#[test]
fn reports_a_fully_covered_month() {
    let temp = tempdir().unwrap();
    let root = temp.path().join("meters");
    let hours: usize = 31 * 24;
    // 1 kWh generated per hour across January, consumers idle.
    write_meter(
        &root,
        "gen",
        &[
            (utc(2024, 1, 1, 0), 0.0),
            (utc(2024, 2, 1, 0), hours as f64 * 1000.0),
        ],
    );
    write_meter(
        &root,
        "main",
        &[(utc(2024, 1, 1, 0), 500.0), (utc(2024, 2, 1, 0), 500.0)],
    );
    write_meter(
        &root,
        "barn",
        &[(utc(2024, 1, 1, 0), 200.0), (utc(2024, 2, 1, 0), 200.0)],
    );
    let config = write_config(temp.path(), &root);
    let out_path = temp.path().join("report.csv");

    gmeter()
        .arg("report")
        .arg("--config")
        .arg(&config)
        .arg("2024-01")
        .arg("--out")
        .arg(&out_path)
        .assert()
        .success();

    let csv = fs::read_to_string(&out_path).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines.len(), 1 + hours);
    assert_eq!(
        lines[0],
        "Time,Export to grid (kWH),Export power used by house (kWH),\
         Export power used by barn (kWH),Import power used by house (kWH),\
         Import power used by barn (kWH)"
    );
    assert_eq!(lines[1], "2024-01-01 00:00 UTC,1.000,0.000,0.000,0.000,0.000");
    assert_eq!(
        lines[hours],
        "2024-01-31 23:00 UTC,1.000,0.000,0.000,0.000,0.000"
    );
}

#[test]
fn splits_generation_between_consumers_in_deficit() {
    let temp = tempdir().unwrap();
    let root = temp.path().join("meters");
    // Over one covered hour: 50 kWh generated, 60 kWh here, 70 kWh neighbour.
    write_meter(
        &root,
        "gen",
        &[(utc(2024, 1, 1, 0), 0.0), (utc(2024, 1, 1, 1), 50_000.0)],
    );
    write_meter(
        &root,
        "main",
        &[(utc(2024, 1, 1, 0), 0.0), (utc(2024, 1, 1, 1), 60_000.0)],
    );
    write_meter(
        &root,
        "barn",
        &[(utc(2024, 1, 1, 0), 0.0), (utc(2024, 1, 1, 1), 70_000.0)],
    );
    let config = write_config(temp.path(), &root);

    let output = gmeter()
        .arg("report")
        .arg("--config")
        .arg(&config)
        .arg("2024-01")
        .output()
        .unwrap();
    assert!(output.status.success());
    let csv = String::from_utf8(output.stdout).unwrap();
    let row = csv.lines().nth(1).unwrap();
    assert_eq!(row, "2024-01-01 00:00 UTC,0.000,23.077,26.923,36.923,43.077");
}

#[test]
fn catalog_lists_partial_coverage() {
    let temp = tempdir().unwrap();
    let root = temp.path().join("meters");
    for name in ["gen", "main", "barn"] {
        write_meter(
            &root,
            name,
            &[(utc(2024, 1, 5, 0), 0.0), (utc(2024, 1, 20, 0), 1000.0)],
        );
    }
    let config = write_config(temp.path(), &root);

    let output = gmeter()
        .arg("catalog")
        .arg("--config")
        .arg(&config)
        .output()
        .unwrap();
    assert!(output.status.success());
    let listing = String::from_utf8(output.stdout).unwrap();
    assert_eq!(
        listing.trim_end(),
        "2024-01 partial 2024-01-05 00:00 .. 2024-01-20 00:00"
    );
}

#[test]
fn report_for_an_uncovered_month_fails() {
    let temp = tempdir().unwrap();
    let root = temp.path().join("meters");
    for name in ["gen", "main", "barn"] {
        write_meter(
            &root,
            name,
            &[(utc(2024, 1, 5, 0), 0.0), (utc(2024, 1, 20, 0), 1000.0)],
        );
    }
    let config = write_config(temp.path(), &root);

    gmeter()
        .arg("report")
        .arg("--config")
        .arg(&config)
        .arg("2024-03")
        .assert()
        .failure();
}

#[test]
fn meters_merge_across_overlapping_sample_files() {
    let temp = tempdir().unwrap();
    let root = temp.path().join("meters");
    // The generator's history is split across two files that overlap and
    // share the monotone cumulative counter.
    let gen_dir = root.join("gen");
    fs::create_dir_all(&gen_dir).unwrap();
    let first: String = [
        (utc(2024, 1, 1, 0), 0.0),
        (utc(2024, 1, 1, 1), 1000.0),
        (utc(2024, 1, 1, 2), 2000.0),
    ]
    .iter()
    .map(|(t, e)| Sample::new(*t, *e).format_line() + "\n")
    .collect();
    let second: String = [
        (utc(2024, 1, 1, 1), 1000.0),
        (utc(2024, 1, 1, 3), 3000.0),
    ]
    .iter()
    .map(|(t, e)| Sample::new(*t, *e).format_line() + "\n")
    .collect();
    fs::write(gen_dir.join("a.sample"), first).unwrap();
    fs::write(gen_dir.join("b.sample"), second).unwrap();

    for name in ["main", "barn"] {
        write_meter(
            &root,
            name,
            &[(utc(2024, 1, 1, 0), 0.0), (utc(2024, 1, 1, 3), 0.0)],
        );
    }
    let config = write_config(temp.path(), &root);

    let output = gmeter()
        .arg("report")
        .arg("--config")
        .arg(&config)
        .arg("2024-01")
        .output()
        .unwrap();
    assert!(output.status.success());
    let csv = String::from_utf8(output.stdout).unwrap();
    let rows: Vec<&str> = csv.lines().skip(1).collect();
    assert_eq!(
        rows,
        vec![
            "2024-01-01 00:00 UTC,1.000,0.000,0.000,0.000,0.000",
            "2024-01-01 01:00 UTC,1.000,0.000,0.000,0.000,0.000",
            "2024-01-01 02:00 UTC,1.000,0.000,0.000,0.000,0.000",
        ]
    );
}
