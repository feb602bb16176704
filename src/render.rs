//! Terminal and JSON rendering shared by the CLI and the shell.

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;

use crate::cli::OutputFormat;
use crate::contract::Receipt;
use crate::feed::Feed;
use crate::flows::FlowState;
use crate::model::{Account, CommentView, DisplayProfile, FeedTweet, Liker, TweetId};
use crate::{CONTENT_DIVIDER_WIDTH, format_number_u64, format_relative_date, format_short_hash};

/// A feed row in JSON output.
#[derive(Debug, Serialize)]
pub struct FeedEntry<'a> {
    #[serde(flatten)]
    pub tweet: &'a FeedTweet,
    pub author_name: &'a str,
    pub author_image: &'a str,
    pub liked: bool,
}

/// A profile in JSON output.
#[derive(Debug, Serialize)]
pub struct ProfileEntry<'a> {
    pub address: &'a Account,
    #[serde(flatten)]
    pub profile: &'a DisplayProfile,
    pub exists: bool,
}

/// Print `value` as JSON in the requested flavour.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn print_json<T: Serialize + ?Sized>(format: OutputFormat, value: &T) -> serde_json::Result<()> {
    let out = if format == OutputFormat::JsonPretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{out}");
    Ok(())
}

/// Feed rows in JSON shape.
pub fn feed_entries<'a>(
    feed: &'a Feed,
    liked: impl Fn(TweetId) -> bool,
    limit: Option<usize>,
) -> Vec<FeedEntry<'a>> {
    feed.tweets()
        .iter()
        .take(limit.unwrap_or(usize::MAX))
        .map(|tweet| {
            let profile = feed.profiles().get(&tweet.author);
            FeedEntry {
                tweet,
                author_name: profile.map_or("", |p| p.name.as_str()),
                author_image: profile.map_or("", |p| p.image.as_str()),
                liked: liked(tweet.id),
            }
        })
        .collect()
}

pub fn print_feed(feed: &Feed, liked: impl Fn(TweetId) -> bool, width: usize, limit: Option<usize>) {
    if feed.is_empty() {
        println!("{}", "No tweets yet.".yellow());
        return;
    }
    for tweet in feed.tweets().iter().take(limit.unwrap_or(usize::MAX)) {
        print_tweet(tweet, &feed.profile_of(&tweet.author), liked(tweet.id), width);
    }
    if let Some(limit) = limit {
        if feed.len() > limit {
            println!("{}", format!("… {} more", feed.len() - limit).dimmed());
        }
    }
}

pub fn print_tweet(tweet: &FeedTweet, author: &DisplayProfile, liked: bool, width: usize) {
    println!(
        "{} {} {} {}",
        format!("#{}", tweet.id).dimmed(),
        author.name.bold(),
        tweet.author.short().dimmed(),
        format!("· {}", format_relative_date(tweet.timestamp)).dimmed()
    );
    for line in textwrap::wrap(&tweet.content, width.max(20)) {
        println!("    {line}");
    }
    let heart = if liked { "♥".red() } else { "♡".normal() };
    println!("    {heart} {}", format_number_u64(tweet.like_count));
    println!();
}

pub fn print_likers(tweet_id: TweetId, likers: &[Liker]) {
    println!("{}", format!("Liked by ({}) · tweet #{tweet_id}", likers.len()).bold().cyan());
    println!("{}", "─".repeat(CONTENT_DIVIDER_WIDTH));
    if likers.is_empty() {
        println!("  {}", "No likes yet".dimmed());
        return;
    }
    for liker in likers {
        println!(
            "  {} {} {}",
            liker.name.bold(),
            liker.address.short().dimmed(),
            format_relative_date(liker.timestamp).dimmed()
        );
    }
}

pub fn print_comments(tweet_id: TweetId, comments: &[CommentView], width: usize) {
    println!(
        "{}",
        format!("Comments ({}) · tweet #{tweet_id}", comments.len()).bold().cyan()
    );
    println!("{}", "─".repeat(CONTENT_DIVIDER_WIDTH));
    if comments.is_empty() {
        println!("  {}", "No comments yet. Be the first to comment!".dimmed());
        return;
    }
    for comment in comments {
        println!(
            "  {} {} {}",
            comment.name.bold(),
            comment.address.short().dimmed(),
            format_relative_date(comment.timestamp).dimmed()
        );
        for line in textwrap::wrap(&comment.content, width.max(20)) {
            println!("    {line}");
        }
    }
}

pub fn print_profile(account: &Account, profile: &DisplayProfile, exists: bool) {
    println!("{} {}", profile.name.bold().cyan(), account.as_str().dimmed());
    if profile.bio.is_empty() {
        println!("  {}", "No bio added yet".dimmed());
    } else {
        println!("  {}", profile.bio);
    }
    if !profile.image.is_empty() {
        println!("  {} {}", "Image:".dimmed(), profile.image);
    }
    if !exists {
        println!(
            "  {}",
            "No profile yet. Create one with 'profile set'.".dimmed()
        );
    }
}

pub fn print_receipt(message: &str, receipt: &Receipt) {
    println!(
        "{} {} {}",
        "✓".green(),
        message,
        format!(
            "(tx {} · block {})",
            format_short_hash(&receipt.tx_hash.0),
            receipt.block_number
        )
        .dimmed()
    );
}

fn state_message(label: &str, state: FlowState) -> String {
    match state {
        FlowState::Idle | FlowState::Submitting => format!("{label}..."),
        FlowState::Confirming => "Waiting for confirmation...".to_string(),
    }
}

/// Await `fut` behind a spinner that follows the flow state.
pub async fn with_spinner<F, T>(
    enabled: bool,
    label: &str,
    mut states: Option<watch::Receiver<FlowState>>,
    fut: F,
) -> T
where
    F: Future<Output = T>,
{
    if !enabled {
        return fut.await;
    }

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(state_message(label, FlowState::Submitting));
    pb.enable_steady_tick(Duration::from_millis(100));

    tokio::pin!(fut);
    let out = loop {
        let Some(rx) = states.as_mut() else {
            break (&mut fut).await;
        };
        tokio::select! {
            out = &mut fut => break out,
            changed = rx.changed() => {
                if changed.is_err() {
                    states = None;
                    continue;
                }
                let state = *rx.borrow_and_update();
                pb.set_message(state_message(label, state));
            }
        }
    };
    pb.finish_and_clear();
    out
}
