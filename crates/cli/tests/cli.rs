use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use tempfile::TempDir;

const AMBIENT_VARS: &[&str] = &[
    "CHECK_INTERVAL_MINUTES",
    "POSTING_HOURS_START",
    "POSTING_HOURS_END",
    "MIN_RELEVANCE_SCORE",
    "TIMEZONE",
    "AUTO_POST",
    "MAX_QUEUE_SIZE",
    "LLM_MODEL",
    "TELEGRAM_CHAT_ID",
    "ALLOWED_USER_IDS",
    "ANTHROPIC_API_KEY",
    "OPENAI_API_KEY",
    "GEMINI_API_KEY",
    "OLLAMA_BASE_URL",
    "LLM_PROVIDER",
    "X_USER_TOKEN",
    "TELEGRAM_BOT_TOKEN",
    "DISCORD_BOT_TOKEN",
    "DISCORD_CHANNEL_ID",
    "RUST_LOG",
];

/// A command isolated from the caller's env and working directory
fn trendposter(dir: &TempDir) -> Command {
    let mut cmd = cargo_bin_cmd!("trendposter");
    cmd.current_dir(dir.path())
        .env("DATABASE_PATH", dir.path().join("data").join("queue.db"));
    for var in AMBIENT_VARS {
        cmd.env_remove(var);
    }
    cmd
}

#[test]
fn config_init_writes_example_file() {
    let dir = TempDir::new().expect("temp dir");
    let config_path = dir.path().join("conf").join("trendposter.toml");

    trendposter(&dir)
        .args(["config", "init", "--path"])
        .arg(&config_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("trendposter doctor"));

    let content = fs::read_to_string(&config_path).expect("read config");
    assert!(content.contains("check_interval_minutes = 60"));
    assert!(content.contains("[bots]"));

    trendposter(&dir)
        .args(["config", "init", "--path"])
        .arg(&config_path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("--force"));
}

#[test]
fn queue_add_then_list_as_json() {
    let dir = TempDir::new().expect("temp dir");

    trendposter(&dir)
        .args(["queue", "add", "  Big launch today  ", "--priority", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Queued #1"));

    trendposter(&dir)
        .args(["queue", "add", "Happy Monday everyone"])
        .assert()
        .success();

    let output = trendposter(&dir)
        .args(["queue", "list", "--json"])
        .output()
        .expect("run queue list");
    assert!(output.status.success());

    let posts: Value = serde_json::from_slice(&output.stdout).expect("valid json");
    let posts = posts.as_array().expect("array");
    assert_eq!(posts.len(), 2);
    assert_eq!(posts[0]["text"], "Big launch today");
    assert_eq!(posts[0]["priority"], 2);
    assert_eq!(posts[0]["status"], "QUEUED");
}

#[test]
fn queue_add_rejects_overlong_text() {
    let dir = TempDir::new().expect("temp dir");

    trendposter(&dir)
        .args(["queue", "add"])
        .arg("a".repeat(281))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Not queued"));

    trendposter(&dir)
        .args(["queue", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Queue is empty."));
}

#[test]
fn queue_remove_then_list_removed() {
    let dir = TempDir::new().expect("temp dir");

    trendposter(&dir)
        .args(["queue", "add", "Draft to drop"])
        .assert()
        .success();

    trendposter(&dir)
        .args(["queue", "remove", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed #1"));

    trendposter(&dir)
        .args(["queue", "remove", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));

    trendposter(&dir)
        .args(["queue", "list", "--status", "removed"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Draft to drop"));
}

#[test]
fn status_before_any_cycle() {
    let dir = TempDir::new().expect("temp dir");

    trendposter(&dir)
        .args(["queue", "add", "Something to say"])
        .assert()
        .success();

    trendposter(&dir)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("1 queued"))
        .stdout(predicate::str::contains("Last cycle: none yet"));
}

#[test]
fn run_without_bot_requires_scheduler_only() {
    let dir = TempDir::new().expect("temp dir");

    trendposter(&dir)
        .env("LLM_PROVIDER", "stub")
        .arg("run")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--scheduler-only"));
}

#[test]
fn invalid_posting_hours_fail_at_startup() {
    let dir = TempDir::new().expect("temp dir");

    trendposter(&dir)
        .env("POSTING_HOURS_START", "22")
        .env("POSTING_HOURS_END", "8")
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("POSTING_HOURS"));
}

#[test]
fn doctor_json_reports_missing_credentials() {
    let dir = TempDir::new().expect("temp dir");

    let output = trendposter(&dir)
        .args(["doctor", "--json"])
        .output()
        .expect("run doctor");
    assert!(!output.status.success());

    let report: Value = serde_json::from_slice(&output.stdout).expect("valid json");
    assert_eq!(report["config"]["status"], "ok");
    assert_eq!(report["llm"]["status"], "error");
    assert_eq!(report["x"]["status"], "error");
    assert_eq!(report["bots"]["status"], "warn");
    assert_eq!(report["database"]["status"], "ok");
    assert_eq!(report["overall"], "error");
}

#[test]
fn doctor_passes_with_stub_provider_and_tokens() {
    let dir = TempDir::new().expect("temp dir");

    let output = trendposter(&dir)
        .env("LLM_PROVIDER", "stub")
        .env("X_USER_TOKEN", "x-token")
        .env("TELEGRAM_BOT_TOKEN", "tg-token")
        .args(["doctor", "--json"])
        .output()
        .expect("run doctor");
    assert!(output.status.success());

    let report: Value = serde_json::from_slice(&output.stdout).expect("valid json");
    assert_eq!(report["llm"]["status"], "warn");
    assert_eq!(report["bots"]["details"]["platforms"][0], "telegram");
    assert_eq!(report["overall"], "warn");
}
