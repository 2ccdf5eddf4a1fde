use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

const FIXTURE: &str = "tests/fixtures/dump.json";

fn ganttkit() -> Command {
    let mut cmd = Command::cargo_bin("ganttkit").unwrap();
    cmd.env("RUST_LOG", "warn");
    cmd
}

#[test]
fn test_rows_prints_json() {
    let output = ganttkit().args(["rows", "--input", FIXTURE]).output().unwrap();
    assert!(output.status.success());

    let rows: Vec<Value> = serde_json::from_slice(&output.stdout).unwrap();
    assert!(rows.iter().any(|r| r["id"] == "project_10" && r["name"] == "Website"));
    assert!(rows.iter().any(|r| r["id"] == "task_101" && r["row_kind"] == "task_chain"));
    assert!(rows.iter().any(|r| r["name"] == "Adams Bob"));
}

#[test]
fn test_rows_collapsed_and_filtered() {
    let output = ganttkit()
        .args(["rows", "--input", FIXTURE, "--collapsed", "project_10", "--search", "deploy"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let rows: Vec<Value> = serde_json::from_slice(&output.stdout).unwrap();
    let project = rows.iter().find(|r| r["id"] == "project_10").unwrap();
    assert_eq!(project["hide_children"], true);
    let leaves: Vec<&Value> = rows.iter().filter(|r| r["kind"] == "task").collect();
    assert_eq!(leaves.len(), 1);
    assert_eq!(leaves[0]["id"], "103");
}

#[test]
fn test_rows_rejects_unknown_status() {
    ganttkit()
        .args(["rows", "--input", FIXTURE, "--status", "9"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown status"));
}

#[test]
fn test_stats() {
    ganttkit()
        .args(["stats", "--input", FIXTURE])
        .assert()
        .success()
        .stdout(predicate::str::contains("Total:     5"))
        .stdout(predicate::str::contains("Completed: 1"))
        .stdout(predicate::str::contains("Dropped:   1"));
}

#[test]
fn test_missing_input_file() {
    let tmp = TempDir::new().unwrap();
    ganttkit()
        .args(["stats", "--input"])
        .arg(tmp.path().join("missing.json"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing.json"));
}

#[test]
fn test_malformed_input_file() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("broken.json");
    std::fs::write(&path, "{ \"tasks\": [").unwrap();
    ganttkit()
        .args(["rows", "--input"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("parsing"));
}

#[test]
fn test_cyclic_dependencies_fail() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("cycle.json");
    std::fs::write(
        &path,
        r#"{ "tasks": [
            { "ID": "1", "START_DATE_PLAN": "2024-01-01", "END_DATE_PLAN": "2024-01-02", "DEPENDS_ON": ["2"] },
            { "ID": "2", "START_DATE_PLAN": "2024-01-01", "END_DATE_PLAN": "2024-01-02", "DEPENDS_ON": ["1"] }
        ] }"#,
    )
    .unwrap();
    ganttkit()
        .args(["rows", "--input"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("cyclic task dependencies"));
}

#[test]
fn test_fetch_requires_token_or_session() {
    ganttkit()
        .args(["fetch", "--domain", "team.example.com"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--access-token"));
}
