use std::fs;
use std::process::Command;

fn batchrun() -> Command {
    Command::new(env!("CARGO_BIN_EXE_batchrun"))
}

#[cfg(unix)]
#[test]
fn test_cli_mixed_outcomes() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("a.txt"), "a").unwrap();
    fs::write(dir.path().join("b.txt"), "b").unwrap();
    let out = batchrun()
        .current_dir(dir.path())
        .args(["a.txt", "b.txt", "@list", "-p", "2", "--no-color", "--", "test", "-s"])
        .output()
        .unwrap();
    // "@list" names no file: warned, matches nothing.
    assert_eq!(out.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("[  ok] a.txt"));
    assert!(stdout.contains("succeeded: 2  failed: 0  skipped: 0  (of 2 discovered)"));
}

#[cfg(unix)]
#[test]
fn test_cli_failure_sets_exit_code_and_summary() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("a.txt"), "a").unwrap();
    fs::write(dir.path().join("empty.txt"), "").unwrap();
    let summary = dir.path().join("summary.json");
    let out = batchrun()
        .current_dir(dir.path())
        .args(["*.txt", "--no-color", "--summary-json"])
        .arg(&summary)
        .args(["--", "test", "-s"])
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("[FAIL] empty.txt: exit 1"), "{stdout}");
    assert!(stdout.contains("succeeded: 1  failed: 1"));

    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&summary).unwrap()).unwrap();
    assert_eq!(json["tally"]["failed"], 1);
    assert_eq!(json["discovered"], 2);
}

#[test]
fn test_cli_no_input_exits_one_without_running() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("ran");
    let out = batchrun()
        .current_dir(dir.path())
        .args(["*.nothing", "--", "touch"])
        .arg(&marker)
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(1));
    assert!(!marker.exists());
}

#[test]
fn test_cli_zero_parallel_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("a.txt"), "a").unwrap();
    let out = batchrun()
        .current_dir(dir.path())
        .args(["a.txt", "-p", "0", "--", "true"])
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(1));
    assert!(out.stdout.is_empty());
}
