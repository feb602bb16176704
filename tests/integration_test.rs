//! Integration tests for dtweet.
//!
//! These tests drive [`AppContext`] against an in-process [`LocalLedger`]:
//! - Feed assembly and profile fallback
//! - Local precondition checks before any contract call
//! - Like, comment and profile flows with refetch
//! - Contract failure messages

use std::sync::Arc;
use tempfile::TempDir;

use dtweet::app::Connection;
use dtweet::config::DEV_ACCOUNTS;
use dtweet::feed::assemble;
use dtweet::flows::FlowState;
use dtweet::{Account, Action, AppContext, Config, DtweetError, LocalLedger, Tweet};

fn dev(n: usize) -> Account {
    DEV_ACCOUNTS[n].parse().unwrap()
}

fn context_as(ledger: &Arc<LocalLedger>, account: usize) -> AppContext {
    let accounts = dtweet::app::prefer_account(
        DEV_ACCOUNTS.iter().map(|a| a.parse().unwrap()).collect(),
        Some(&dev(account)),
    );
    AppContext::new(Config::default(), Connection::local(ledger.clone(), accounts))
}

fn record(id: u64, timestamp: u64, deleted: bool) -> Tweet {
    Tweet {
        id,
        author: dev(0),
        content: format!("tweet {id}"),
        timestamp,
        like_count: 0,
        deleted,
    }
}

#[test]
fn test_feed_drops_deleted_and_sorts_newest_first() {
    let feed = assemble(vec![record(1, 100, false), record(2, 200, true), record(3, 150, false)]);
    let ids: Vec<u64> = feed.iter().map(|t| t.id).collect();
    assert_eq!(ids, vec![3, 1]);
}

#[test]
fn test_feed_order_is_non_increasing() {
    let records = (1..=20)
        .map(|i| record(i, (i * 37) % 11, i % 4 == 0))
        .collect();
    let feed = assemble(records);
    assert!(feed.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));
    assert!(feed.iter().all(|t| t.id % 4 != 0));
}

#[tokio::test]
async fn test_authors_without_profile_get_fallback() {
    let ledger = Arc::new(LocalLedger::new());
    ledger.seed_tweet(&dev(1), "no profile here", 10, false);
    let mut ctx = context_as(&ledger, 0);

    ctx.refresh_feed().await.unwrap();
    let profile = ctx.feed().profile_of(&dev(1));
    assert!(!profile.name.is_empty());
    assert_eq!(profile.name, dev(1).fallback_name());
    assert!(profile.image.is_empty());
    assert_ne!(profile.name, "Loading...");
}

#[tokio::test]
async fn test_over_length_content_never_reaches_contract() {
    let ledger = Arc::new(LocalLedger::new());
    let id = ledger.seed_tweet(&dev(1), "hello", 10, false);
    let mut ctx = context_as(&ledger, 0);
    ctx.connect().await.unwrap();

    let long = "x".repeat(281);
    let err = ctx.post_tweet(&long).await.unwrap_err();
    assert!(matches!(err, DtweetError::ContentTooLong { .. }));
    let err = ctx.post_comment(id, &long).await.unwrap_err();
    assert!(matches!(err, DtweetError::ContentTooLong { .. }));

    assert_eq!(ledger.call_count("createTweet"), 0);
    assert_eq!(ledger.call_count("createComment"), 0);

    // Exactly at the limit is accepted.
    ctx.post_tweet(&"x".repeat(280)).await.unwrap();
    assert_eq!(ledger.call_count("createTweet"), 1);
}

#[tokio::test]
async fn test_liking_twice_issues_one_create_like() {
    let ledger = Arc::new(LocalLedger::new());
    let id = ledger.seed_tweet(&dev(1), "like me", 10, false);
    let mut ctx = context_as(&ledger, 0);
    ctx.connect().await.unwrap();
    ctx.refresh_feed().await.unwrap();

    ctx.like(id).await.unwrap();
    let err = ctx.like(id).await.unwrap_err();
    assert_eq!(err.user_message(), "You have already liked this tweet!");
    assert_eq!(ledger.call_count("createLike"), 1);
}

#[tokio::test]
async fn test_unlike_requires_active_like() {
    let ledger = Arc::new(LocalLedger::new());
    let id = ledger.seed_tweet(&dev(1), "like me", 10, false);
    let mut ctx = context_as(&ledger, 0);
    ctx.connect().await.unwrap();

    let err = ctx.unlike(id).await.unwrap_err();
    assert!(matches!(err, DtweetError::NotLiked { .. }));
    assert_eq!(ledger.call_count("deleteLike"), 0);

    ctx.like(id).await.unwrap();
    ctx.unlike(id).await.unwrap();
    assert!(!ctx.is_liked(id));

    // The soft-deleted like no longer counts.
    let err = ctx.unlike(id).await.unwrap_err();
    assert!(matches!(err, DtweetError::NotLiked { .. }));
    assert_eq!(ledger.call_count("deleteLike"), 1);
}

#[tokio::test]
async fn test_likes_panel_fetches_once() {
    let ledger = Arc::new(LocalLedger::new());
    let id = ledger.seed_tweet(&dev(1), "popular", 10, false);
    let mut ctx = context_as(&ledger, 0);

    let before = ledger.call_count("getLikesOfTweet");
    ctx.likes(id).await.unwrap();
    ctx.close_panel();
    assert!(ctx.panels().is_likes_cached(id));
    ctx.likes(id).await.unwrap();
    assert_eq!(ledger.call_count("getLikesOfTweet"), before + 1);

    // A refresh drops the cache.
    ctx.refresh_all().await.unwrap();
    let before = ledger.call_count("getLikesOfTweet");
    ctx.likes(id).await.unwrap();
    assert_eq!(ledger.call_count("getLikesOfTweet"), before + 1);
}

#[tokio::test]
async fn test_non_author_edit_shows_message_and_keeps_content() {
    let ledger = Arc::new(LocalLedger::new());
    for i in 1..=5 {
        ledger.seed_tweet(&dev(1), &format!("original {i}"), 100 + i, false);
    }
    let mut ctx = context_as(&ledger, 0);
    ctx.connect().await.unwrap();
    ctx.refresh_feed().await.unwrap();

    let err = ctx.edit_tweet(5, "hijacked").await.unwrap_err();
    assert_eq!(err.user_message(), "You are not the author of this tweet!");
    assert_eq!(ctx.feed().find(5).unwrap().content, "original 5");
    assert_eq!(ledger.snapshot().tweets[4].content, "original 5");
    assert_eq!(ctx.flow_state(Action::EditTweet), FlowState::Idle);
}

#[tokio::test]
async fn test_insufficient_funds_message() {
    let ledger = Arc::new(LocalLedger::new().with_gas_fee(10));
    let mut ctx = context_as(&ledger, 0);
    ctx.connect().await.unwrap();

    let err = ctx.post_tweet("gm").await.unwrap_err();
    assert_eq!(
        err.user_message(),
        "Insufficient funds! You need ETH to pay for gas fees."
    );
    assert!(err.is_recoverable());

    ledger.fund(&dev(0), 10);
    ctx.post_tweet("gm").await.unwrap();
    assert_eq!(ctx.feed().len(), 1);
}

#[tokio::test]
async fn test_comment_flow_refreshes_panel() {
    let ledger = Arc::new(LocalLedger::new());
    let id = ledger.seed_tweet(&dev(1), "discuss", 10, false);
    let mut ctx = context_as(&ledger, 0);
    ctx.connect().await.unwrap();

    assert!(ctx.comments(id).await.unwrap().is_empty());
    ctx.post_comment(id, "  first!  ").await.unwrap();
    let comments = ctx.comments(id).await.unwrap();
    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0].content, "first!");
    assert_eq!(comments[0].address, dev(0));
}

#[tokio::test]
async fn test_profile_appears_next_to_tweets() {
    let ledger = Arc::new(LocalLedger::new());
    let mut ctx = context_as(&ledger, 2);
    ctx.connect().await.unwrap();
    ctx.post_tweet("hello from carol").await.unwrap();

    ctx.save_profile("Carol", "", "https://example.com/c.png").await.unwrap();
    assert_eq!(ledger.call_count("createProfile"), 1);
    ctx.save_profile("Carol B.", "", "").await.unwrap();
    assert_eq!(ledger.call_count("editProfile"), 1);

    let profile = ctx.feed().profile_of(&dev(2));
    assert_eq!(profile.name, "Carol B.");
    assert!(profile.image.is_empty());
}

#[tokio::test]
async fn test_failures_do_not_block_other_flows() {
    let ledger = Arc::new(LocalLedger::new());
    let id = ledger.seed_tweet(&dev(1), "not yours", 10, false);
    let mut ctx = context_as(&ledger, 0);
    ctx.connect().await.unwrap();

    assert!(ctx.delete_tweet(id).await.is_err());
    assert!(ctx.post_tweet("").await.is_err());
    ctx.post_tweet("still works").await.unwrap();
    ctx.like(id).await.unwrap();
    assert!(ctx.is_liked(id));
}

#[tokio::test]
async fn test_ledger_file_survives_restart() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ledger.json");

    {
        let ledger = Arc::new(LocalLedger::open(&path).unwrap());
        let mut ctx = context_as(&ledger, 0);
        ctx.connect().await.unwrap();
        ctx.post_tweet("persisted").await.unwrap();
    }

    let ledger = Arc::new(LocalLedger::open(&path).unwrap());
    let mut ctx = context_as(&ledger, 1);
    ctx.refresh_feed().await.unwrap();
    assert_eq!(ctx.feed().len(), 1);
    assert_eq!(ctx.feed().tweets()[0].content, "persisted");
    assert_eq!(ctx.feed().tweets()[0].author, dev(0));
}
