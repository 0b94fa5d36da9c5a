//! Concurrency tests for the sport binary.
//!
//! These tests verify that multiple processes can safely:
//! - Update the same session snapshot without losing transitions
//! - Allocate training ids without handing one out twice
//! - Queue requests while a rollup rewrites the outbox

use assert_cmd::Command;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::thread;
use tempfile::TempDir;

fn cli() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("sport"))
}

fn setup_test_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

fn run(data_dir: &Path, args: &[&str]) -> String {
    let output = cli()
        .args(args)
        .arg("--data-dir")
        .arg(data_dir)
        .output()
        .expect("Failed to run sport");
    assert!(
        output.status.success(),
        "sport {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout).expect("stdout is not UTF-8")
}

fn status(data_dir: &Path) -> Value {
    serde_json::from_str(&run(data_dir, &["status", "--json"])).expect("status --json is not JSON")
}

/// Run `per_thread` invocations of `args` from each of `threads` threads
fn hammer(data_dir: &Path, threads: usize, per_thread: usize, args: &'static [&'static str]) {
    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let data_dir: PathBuf = data_dir.to_path_buf();
            thread::spawn(move || {
                for _ in 0..per_thread {
                    run(&data_dir, args);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("worker thread panicked");
    }
}

#[test]
fn test_concurrent_add_sets_are_all_kept() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();
    run(data_dir, &["start", "--id", "1", "--name", "Legs"]);

    hammer(data_dir, 4, 5, &["add-set", "--exercise", "10", "--reps", "8"]);

    let state = status(data_dir);
    let sets = state["session"]["active_sets"].as_array().unwrap();
    assert_eq!(sets.len(), 20, "Expected 20 sets, got {}", sets.len());

    let mut orders: Vec<u64> = sets.iter().map(|s| s["set_order"].as_u64().unwrap()).collect();
    orders.sort_unstable();
    assert_eq!(orders, (1..=20).collect::<Vec<u64>>());

    let mut ids: Vec<&str> = sets.iter().map(|s| s["temp_id"].as_str().unwrap()).collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 20);
}

#[test]
fn test_ticks_do_not_drop_concurrent_sets() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path().to_path_buf();
    run(&data_dir, &["start", "--id", "1", "--name", "Legs"]);

    let ticker_dir = data_dir.clone();
    let ticker = thread::spawn(move || {
        for _ in 0..10 {
            run(&ticker_dir, &["tick"]);
        }
    });
    for _ in 0..10 {
        run(&data_dir, &["add-set", "--exercise", "10", "--reps", "5"]);
    }
    ticker.join().expect("ticker panicked");

    let state = status(&data_dir);
    assert_eq!(state["session"]["active_sets"].as_array().unwrap().len(), 10);
}

#[test]
fn test_concurrent_starts_get_distinct_training_ids() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();

    hammer(data_dir, 4, 3, &["start", "--name", "Quick"]);

    // Twelve ids handed out, so the next one is 13
    run(data_dir, &["start", "--name", "Last"]);
    assert_eq!(status(data_dir)["session"]["active_workout"]["id"], 13);
}

#[test]
fn test_rollup_alongside_completions_loses_nothing() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path().to_path_buf();
    run(&data_dir, &["start", "--id", "3", "--name", "Legs"]);

    let mut ids = Vec::new();
    for _ in 0..10 {
        let stdout = run(&data_dir, &["add-set", "--exercise", "10", "--reps", "8"]);
        ids.push(stdout.split_whitespace().last().unwrap().to_string());
    }

    let roller_dir = data_dir.clone();
    let roller = thread::spawn(move || {
        for _ in 0..5 {
            run(&roller_dir, &["rollup"]);
        }
    });
    for id in &ids {
        run(&data_dir, &["complete", id]);
    }
    roller.join().expect("roller panicked");
    run(&data_dir, &["rollup"]);

    let csv = std::fs::read_to_string(data_dir.join("history.csv")).unwrap();
    assert_eq!(csv.lines().count(), 11, "header plus one row per completed set");
}
