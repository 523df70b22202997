//! Exercises the CLI binary's exit-code contract (§6, §4.10).

use std::process::Command;

#[test]
fn unopenable_scenario_path_yields_nonzero_exit() {
    let exe = env!("CARGO_BIN_EXE_arbiter");
    let output = Command::new(exe)
        .arg("/nonexistent/path/to/scenario.txt")
        .output()
        .expect("failed to run arbiter binary");

    assert!(!output.status.success());
}

#[test]
fn clean_scenario_yields_zero_exit() {
    let dir = tempfile::tempdir().unwrap();
    let scenario = dir.path().join("scenario.txt");
    std::fs::write(&scenario, "R 0 1\nP 0\nE 0 REQUEST 0 1\nX\n").unwrap();

    let exe = env!("CARGO_BIN_EXE_arbiter");
    let output = Command::new(exe)
        .arg(&scenario)
        .output()
        .expect("failed to run arbiter binary");

    assert!(output.status.success());
}
