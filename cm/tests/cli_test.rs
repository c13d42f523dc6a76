//! CLI tests for the `cm` binary
//!
//! Only commands that never reach the network are exercised here.

use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn cm(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("cm").expect("binary builds");
    cmd.current_dir(dir.path())
        .env("XDG_DATA_HOME", dir.path().join("data"))
        .env("XDG_CONFIG_HOME", dir.path().join("config"))
        .env_remove("OPENAI_API_KEY");
    cmd
}

#[test]
fn test_prompts_lists_every_template() {
    let dir = TempDir::new().unwrap();
    cm(&dir)
        .arg("prompts")
        .assert()
        .success()
        .stdout(predicate::str::contains("classify"))
        .stdout(predicate::str::contains("followup-condition-nochat"))
        .stdout(predicate::str::contains("{{propertyValue}}"));
}

#[test]
fn test_prompts_uses_project_override() {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join(".catminer/prompts")).unwrap();
    fs::write(dir.path().join(".catminer/prompts/classify.pmt"), "Custom classify {{property}}").unwrap();

    cm(&dir)
        .args(["prompts", "classify"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Custom classify {{property}}"));
}

#[test]
fn test_prompts_unknown_name_fails() {
    let dir = TempDir::new().unwrap();
    cm(&dir).args(["prompts", "plan"]).assert().failure();
}

#[test]
fn test_check_valid_targets() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("targets.yml"),
        "conditions:\n  - name: pressure\nproperties:\n  - name: C2 yield\n    required-phrases: [\"yield\"]\n",
    )
    .unwrap();

    cm(&dir)
        .args(["check", "targets.yml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 properties, 1 conditions"))
        .stderr(predicate::str::contains("pressure"));
}

#[test]
fn test_check_rejects_property_without_phrases() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("targets.yml"), "properties:\n  - name: C2 yield\n").unwrap();

    cm(&dir).args(["check", "targets.yml"]).assert().failure();
}

#[test]
fn test_extract_requires_api_key() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("targets.yml"),
        "properties:\n  - name: C2 yield\n    required-phrases: [\"yield\"]\n",
    )
    .unwrap();
    fs::write(dir.path().join("paper.txt"), "Title\nA C2 yield of 20%.\n").unwrap();

    cm(&dir)
        .args(["extract", "targets.yml", "paper.txt"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("OPENAI_API_KEY"));
}
