//! End-to-end CLI tests for dtweet.
//!
//! These tests run the actual dtweet binary against a temporary local ledger
//! and verify:
//! - Command-line interface behavior
//! - Output format and content
//! - Error handling and messages
//!
//! # Test Organization
//!
//! - `test_tweet_*` - post, edit, delete and feed
//! - `test_like_*` / `test_comment_*` - social commands
//! - `test_profile_*` - profile commands
//! - `test_cli_*` - general CLI tests (flags, help, version, config)

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::path::PathBuf;
use std::time::Instant;
use tempfile::TempDir;

// =============================================================================
// Test Utilities
// =============================================================================

/// Log a test event with timestamp
macro_rules! test_log {
    ($($arg:tt)*) => {
        let timestamp = chrono::Utc::now().format("%H:%M:%S%.3f");
        eprintln!("[TEST {}] {}", timestamp, format!($($arg)*));
    };
}

const ALICE: &str = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266";
const BOB: &str = "0x70997970c51812dc3a010c7d01b50e0d17dc79c8";

/// A scratch home with its own ledger and no user config.
struct Sandbox {
    dir: TempDir,
}

impl Sandbox {
    fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    fn ledger(&self) -> PathBuf {
        self.dir.path().join("ledger.json")
    }

    /// dtweet isolated from the user's config and environment.
    fn cmd(&self) -> Command {
        let mut cmd = cargo_bin_cmd!("dtweet");
        for var in [
            "DTWEET_BACKEND",
            "DTWEET_RPC_URL",
            "DTWEET_CONTRACT_ADDRESS",
            "DTWEET_PRIVATE_KEY",
            "DTWEET_ACCOUNT",
            "DTWEET_FORMAT",
            "DTWEET_QUIET",
        ] {
            cmd.env_remove(var);
        }
        cmd.env("HOME", self.dir.path())
            .env("XDG_CONFIG_HOME", self.dir.path().join("config"))
            .env("NO_COLOR", "1")
            .arg("--ledger")
            .arg(self.ledger());
        cmd
    }

    fn as_account(&self, account: &str) -> Command {
        let mut cmd = self.cmd();
        cmd.args(["--account", account]);
        cmd
    }

    fn post(&self, account: &str, content: &str) {
        self.as_account(account)
            .args(["post", content])
            .assert()
            .success();
    }

    fn feed_json(&self) -> serde_json::Value {
        let output = self
            .cmd()
            .args(["feed", "--format", "json"])
            .output()
            .expect("Failed to run dtweet");
        assert!(output.status.success());
        serde_json::from_slice(&output.stdout).expect("feed output is JSON")
    }
}

// =============================================================================
// Tweets
// =============================================================================

#[test]
fn test_tweet_post_then_feed() {
    let start = Instant::now();
    test_log!("Starting test_tweet_post_then_feed");
    let sandbox = Sandbox::new();

    sandbox
        .as_account(ALICE)
        .args(["post", "gm from the terminal"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Tweet posted successfully!"));

    sandbox
        .cmd()
        .arg("feed")
        .assert()
        .success()
        .stdout(predicate::str::contains("gm from the terminal"))
        .stdout(predicate::str::contains("#1"));

    test_log!("Completed in {:?}", start.elapsed());
}

#[test]
fn test_tweet_feed_json_shape() {
    let sandbox = Sandbox::new();
    sandbox.post(ALICE, "first");
    sandbox.post(BOB, "second");

    let feed = sandbox.feed_json();
    let rows = feed.as_array().expect("array");
    assert_eq!(rows.len(), 2);

    // Both may land in the same second, so find by content.
    let second = rows
        .iter()
        .find(|r| r["content"] == "second")
        .expect("second tweet in feed");
    assert_eq!(second["id"], "2");
    assert_eq!(second["author"], BOB);
    assert_eq!(second["like_count"], "0");
    assert_eq!(second["liked"], false);
    assert!(!second["author_name"].as_str().unwrap_or_default().is_empty());
}

#[test]
fn test_tweet_empty_feed() {
    let sandbox = Sandbox::new();
    sandbox
        .cmd()
        .arg("feed")
        .assert()
        .success()
        .stdout(predicate::str::contains("No tweets yet."));
}

#[test]
fn test_tweet_too_long_is_rejected() {
    let sandbox = Sandbox::new();
    sandbox
        .as_account(ALICE)
        .args(["post", &"a".repeat(281)])
        .assert()
        .failure()
        .stderr(predicate::str::contains("too long"));

    assert!(sandbox.feed_json().as_array().is_some_and(Vec::is_empty));
}

#[test]
fn test_tweet_edit_by_non_author_fails() {
    let sandbox = Sandbox::new();
    sandbox.post(ALICE, "mine");

    sandbox
        .as_account(BOB)
        .args(["edit", "1", "not yours"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("You are not the author of this tweet!"));

    assert_eq!(sandbox.feed_json()[0]["content"], "mine");
}

#[test]
fn test_tweet_edit_and_delete() {
    let sandbox = Sandbox::new();
    sandbox.post(ALICE, "draft");

    sandbox
        .as_account(ALICE)
        .args(["edit", "1", "final"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Tweet updated successfully!"));
    assert_eq!(sandbox.feed_json()[0]["content"], "final");

    sandbox
        .as_account(ALICE)
        .args(["delete", "1", "--yes"])
        .assert()
        .success();
    assert!(sandbox.feed_json().as_array().is_some_and(Vec::is_empty));
}

#[test]
fn test_tweet_mine_lists_own_tweets() {
    let sandbox = Sandbox::new();
    sandbox.post(ALICE, "alice says hi");
    sandbox.post(BOB, "bob says hi");

    sandbox
        .as_account(BOB)
        .arg("mine")
        .assert()
        .success()
        .stdout(predicate::str::contains("bob says hi"))
        .stdout(predicate::str::contains("alice says hi").not());
}

// =============================================================================
// Likes and comments
// =============================================================================

#[test]
fn test_like_twice_fails_and_count_stays_one() {
    let sandbox = Sandbox::new();
    sandbox.post(ALICE, "like this");

    sandbox.as_account(BOB).args(["like", "1"]).assert().success();
    sandbox
        .as_account(BOB)
        .args(["like", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("You have already liked this tweet!"));

    assert_eq!(sandbox.feed_json()[0]["like_count"], "1");

    sandbox
        .cmd()
        .args(["likes", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Liked by (1)"));
}

#[test]
fn test_like_unlike_round() {
    let sandbox = Sandbox::new();
    sandbox.post(ALICE, "like this");

    sandbox
        .as_account(BOB)
        .args(["unlike", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not liked"));

    sandbox.as_account(BOB).args(["like", "1"]).assert().success();
    sandbox.as_account(BOB).args(["unlike", "1"]).assert().success();
    assert_eq!(sandbox.feed_json()[0]["like_count"], "0");
}

#[test]
fn test_comment_then_list() {
    let sandbox = Sandbox::new();
    sandbox.post(ALICE, "thoughts?");

    sandbox
        .cmd()
        .args(["comments", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No comments yet. Be the first to comment!"));

    sandbox
        .as_account(BOB)
        .args(["comment", "1", "great point"])
        .assert()
        .success();

    let output = sandbox
        .cmd()
        .args(["comments", "1", "--format", "json"])
        .output()
        .expect("Failed to run dtweet");
    assert!(output.status.success());
    let comments: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(comments[0]["content"], "great point");
    assert_eq!(comments[0]["address"], BOB);
}

#[test]
fn test_comment_empty_is_rejected() {
    let sandbox = Sandbox::new();
    sandbox.post(ALICE, "thoughts?");
    sandbox
        .as_account(BOB)
        .args(["comment", "1", "   "])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot be empty"));
}

// =============================================================================
// Profiles
// =============================================================================

#[test]
fn test_profile_set_and_show() {
    let sandbox = Sandbox::new();

    sandbox
        .as_account(ALICE)
        .args(["profile", "set", "--name", "Alice", "--bio", "gm"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Profile updated successfully!"));

    let output = sandbox
        .cmd()
        .args(["profile", "show", ALICE, "--format", "json"])
        .output()
        .expect("Failed to run dtweet");
    assert!(output.status.success());
    let profile: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(profile["name"], "Alice");
    assert_eq!(profile["bio"], "gm");
    assert_eq!(profile["exists"], true);
}

#[test]
fn test_profile_missing_uses_fallback_name() {
    let sandbox = Sandbox::new();
    sandbox
        .cmd()
        .args(["profile", "show", BOB])
        .assert()
        .success()
        .stdout(predicate::str::contains("No profile yet"));
}

#[test]
fn test_profile_blank_name_is_rejected() {
    let sandbox = Sandbox::new();
    sandbox
        .as_account(ALICE)
        .args(["profile", "set", "--name", " "])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Name cannot be empty!"));
}

// =============================================================================
// General CLI
// =============================================================================

#[test]
fn test_cli_help() {
    cargo_bin_cmd!("dtweet")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("feed"))
        .stdout(predicate::str::contains("post"))
        .stdout(predicate::str::contains("shell"));
}

#[test]
fn test_cli_version() {
    cargo_bin_cmd!("dtweet")
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("dtweet"));
}

#[test]
fn test_cli_rejects_bad_account() {
    let sandbox = Sandbox::new();
    sandbox
        .cmd()
        .args(["--account", "alice", "feed"])
        .assert()
        .failure();
}

#[test]
fn test_cli_accounts_lists_dev_accounts() {
    let sandbox = Sandbox::new();
    sandbox
        .cmd()
        .arg("accounts")
        .assert()
        .success()
        .stdout(predicate::str::contains(ALICE))
        .stdout(predicate::str::contains(BOB));
}

#[test]
fn test_cli_config_show() {
    let sandbox = Sandbox::new();
    sandbox
        .cmd()
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Backend:"))
        .stdout(predicate::str::contains("local"));
}

#[test]
fn test_cli_config_private_key_is_redacted() {
    let sandbox = Sandbox::new();
    sandbox
        .cmd()
        .env("DTWEET_PRIVATE_KEY", "0xdeadbeef")
        .args(["config", "show", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("<redacted>"))
        .stdout(predicate::str::contains("deadbeef").not());
}

#[cfg(not(feature = "evm"))]
#[test]
fn test_cli_evm_backend_needs_feature() {
    let sandbox = Sandbox::new();
    sandbox
        .cmd()
        .env(
            "DTWEET_CONTRACT_ADDRESS",
            "0x5fbdb2315678afecb367f032d93f642f64180aa3",
        )
        .args(["--backend", "evm", "feed"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("evm"));
}

#[test]
fn test_cli_completions() {
    cargo_bin_cmd!("dtweet")
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("dtweet"));
}
