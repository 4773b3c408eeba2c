//! Smoke tests for the tw binary: help, version and the config commands.

mod common;

use common::TestEnv;
use predicates::prelude::*;

#[test]
fn test_help() {
    let env = TestEnv::new();
    env.tw()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("tickets"))
        .stdout(predicate::str::contains("watch"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn test_version() {
    let env = TestEnv::new();
    env.tw()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_no_subcommand_is_usage_error() {
    let env = TestEnv::new();
    env.tw().assert().failure();
}

#[test]
fn test_config_path_points_into_config_dir() {
    let env = TestEnv::new();
    let output = env.tw().args(["config", "path"]).output().unwrap();
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let path = value["path"].as_str().unwrap();
    assert!(path.starts_with(env.config_dir.path().to_str().unwrap()));
    assert!(path.ends_with("config.kdl"));
    assert_eq!(value["exists"], false);
}

#[test]
fn test_config_dir_flag_wins_over_env() {
    let env = TestEnv::new();
    let other = common::TempDir::new().unwrap();
    env.tw()
        .args(["config", "path", "-H", "--config-dir"])
        .arg(other.path())
        .assert()
        .success()
        .stdout(predicate::str::contains(other.path().to_str().unwrap()));
}

#[test]
fn test_config_show_defaults() {
    let env = TestEnv::new();
    let output = env.tw().args(["config", "show"]).output().unwrap();
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let entries = value["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 10);

    let api = entries.iter().find(|e| e["key"] == "api-base").unwrap();
    assert_eq!(api["value"], "http://localhost:8080/api");
    assert_eq!(api["source"], "default");

    let protocol = entries.iter().find(|e| e["key"] == "stream-protocol").unwrap();
    assert_eq!(protocol["value"], "stomp");
}

#[test]
fn test_config_set_then_show() {
    let env = TestEnv::new();
    env.tw()
        .args(["config", "set", "topic", "/topic/escalations"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"key\":\"topic\""));
    assert!(env.config_file().exists());

    env.tw()
        .args(["config", "show", "-H"])
        .assert()
        .success()
        .stdout(predicate::str::contains("/topic/escalations"))
        .stdout(predicate::str::contains("[config]"));
}

#[test]
fn test_precedence_cli_over_env_over_file() {
    let env = TestEnv::new();
    env.tw()
        .args(["config", "set", "api-base", "http://file.example/api"])
        .assert()
        .success();

    // File only
    env.tw()
        .args(["config", "show", "-H"])
        .assert()
        .success()
        .stdout(predicate::str::contains("http://file.example/api  [config]"));

    // Env beats file
    env.tw()
        .env("TW_API_BASE", "http://env.example/api")
        .args(["config", "show", "-H"])
        .assert()
        .success()
        .stdout(predicate::str::contains("http://env.example/api  [env:TW_API_BASE]"));

    // Flag beats env
    env.tw()
        .env("TW_API_BASE", "http://env.example/api")
        .args(["config", "show", "-H", "--api-base", "http://cli.example/api"])
        .assert()
        .success()
        .stdout(predicate::str::contains("http://cli.example/api  [cli]"));
}

#[test]
fn test_config_set_rejects_invalid_value() {
    let env = TestEnv::new();
    env.tw()
        .args(["config", "set", "stream-url", "http://not-a-socket"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("\"error\""));
    assert!(!env.config_file().exists());
}

#[test]
fn test_config_set_unknown_key_human_error() {
    let env = TestEnv::new();
    env.tw()
        .args(["-H", "config", "set", "colour", "blue"])
        .assert()
        .failure()
        .stderr(predicate::str::starts_with("Error: "))
        .stderr(predicate::str::contains("unknown key"));
}

#[test]
fn test_invalid_env_value_is_an_error() {
    let env = TestEnv::new();
    env.tw()
        .env("TW_STREAM_PROTOCOL", "carrier-pigeon")
        .args(["config", "show"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("TW_STREAM_PROTOCOL"));
}
