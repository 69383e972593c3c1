use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn temp_path(label: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "deepdip-cli-{label}-{}",
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos()
    ))
}

fn readings(heights: &[f64], hour: u32) -> String {
    heights
        .iter()
        .enumerate()
        .map(|(minute, height)| {
            format!(r#"{{"height": {height:.1}, "timestamp": "06/01, {hour:02}:{minute:02} PM"}}"#)
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Cache directory holding one snapshot for Schmaniol: an early day that the
/// default start day filters out, and a day with one climb and one fall.
fn seeded_cache(label: &str) -> PathBuf {
    let dir = temp_path(label);
    std::fs::create_dir_all(&dir).expect("create cache dir");
    let snapshot = format!(
        r#"{{"dailyData": {{"Day 3": [{}], "Day 30": [{}]}}}}"#,
        readings(&[50.0, 50.0, 50.0, 150.0, 150.0], 7),
        readings(&[550.0, 550.0, 550.0, 350.0, 350.0, 350.0, 350.0], 9),
    );
    std::fs::write(dir.join("Schmaniol_0601.json"), snapshot).expect("write snapshot");
    dir
}

fn run_offline(cache: &Path, output: &Path, log: &Path, players: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_deepdip-stats"))
        .arg("--offline")
        .arg("--cache-dir")
        .arg(cache)
        .arg("--output-dir")
        .arg(output)
        .arg("--log-file")
        .arg(log)
        .arg("--year")
        .arg("2024")
        .arg("--players")
        .args(players)
        .env_remove("RUST_LOG")
        .output()
        .expect("run cli")
}

fn digest(path: &Path) -> Vec<u8> {
    let bytes = std::fs::read(path).expect("read output");
    Sha256::digest(&bytes).to_vec()
}

#[test]
fn cli_offline_run_writes_both_tables() {
    let cache = seeded_cache("tables");
    let output = temp_path("tables-out");
    let log = temp_path("tables.log");

    let run = run_offline(&cache, &output, &log, &["Schmaniol"]);
    assert!(run.status.success(), "{}", String::from_utf8_lossy(&run.stderr));
    let stdout = String::from_utf8_lossy(&run.stdout);
    assert!(stdout.contains("Deep Dip Attempt Stats"));

    let events = std::fs::read_to_string(output.join("result.csv")).expect("read result.csv");
    assert_eq!(
        events.lines().collect::<Vec<_>>(),
        vec![
            ",user,day,floor,floor_result,timestamp,on_stream",
            "0,Schmaniol,Day 30,4,1,\"06/01, 09:02 PM\",False",
            "1,Schmaniol,Day 30,5,0,\"06/01, 09:06 PM\",False",
        ]
    );

    let pivot =
        std::fs::read_to_string(output.join("aggregated.csv")).expect("read aggregated.csv");
    assert_eq!(
        pivot.lines().collect::<Vec<_>>(),
        vec![
            ",helper,user,floor,on_stream,fail,success",
            "0,Schmaniol-4-False,Schmaniol,4,False,0,1",
            "1,Schmaniol-5-False,Schmaniol,5,False,1,0",
        ]
    );

    let log_text = std::fs::read_to_string(&log).expect("read log");
    assert!(log_text.contains("5-3 -> 1"));
    assert!(log_text.contains("Skipping Day 3"));
}

#[test]
fn cli_output_is_deterministic_across_runs() {
    let cache = seeded_cache("determinism");
    let first = temp_path("determinism-a");
    let second = temp_path("determinism-b");

    for output in [&first, &second] {
        let run = run_offline(&cache, output, &temp_path("determinism.log"), &["Schmaniol"]);
        assert!(run.status.success());
    }

    for file in ["result.csv", "aggregated.csv"] {
        assert_eq!(digest(&first.join(file)), digest(&second.join(file)), "{file}");
    }
}

#[test]
fn cli_continues_past_a_failing_player() {
    let cache = seeded_cache("isolation");
    std::fs::write(cache.join("BrenTM_0601.json"), "{broken").expect("write corrupt");
    let output = temp_path("isolation-out");

    let run = run_offline(
        &cache,
        &output,
        &temp_path("isolation.log"),
        &["BrenTM", "Schmaniol"],
    );
    assert!(run.status.success());
    assert!(String::from_utf8_lossy(&run.stderr).contains("BrenTM"));
    let events = std::fs::read_to_string(output.join("result.csv")).expect("read result.csv");
    assert_eq!(events.lines().count(), 3);
}

#[test]
fn cli_fails_when_no_player_can_be_scanned() {
    let cache = temp_path("none");
    std::fs::create_dir_all(&cache).expect("create cache dir");
    std::fs::write(cache.join("Larstm.json"), "[]").expect("write corrupt");

    let run = run_offline(&cache, &temp_path("none-out"), &temp_path("none.log"), &["Larstm"]);
    assert!(!run.status.success());
}
