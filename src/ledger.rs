//! In-process implementation of the social contract.
//!
//! `LocalLedger` enforces the same rules and revert reasons as the deployed
//! contract (authorship, soft deletes, one active like per account, length
//! limits measured in bytes) and mines every accepted transaction into its
//! own block. State can be persisted to a JSON file so that consecutive CLI
//! invocations share one chain. Writes replace the file by rename, so a
//! crash mid-write leaves the previous state readable.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::contract::{ContractCall, Receipt, TwitterContract, TxHash};
use crate::error::{DtweetError, Result};
use crate::model::{
    Account, Comment, Like, LikeId, MAX_CONTENT_LENGTH, Profile, Tweet, TweetId,
};

/// Gas charged per accepted transaction.
const GAS_PER_TX: u64 = 21_000;

/// Serializable chain state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerState {
    pub tweets: Vec<Tweet>,
    pub profiles: BTreeMap<Account, Profile>,
    pub likes: Vec<Like>,
    pub comments: Vec<Comment>,
    /// Native balances, only consulted when `gas_fee` is non-zero.
    pub balances: BTreeMap<Account, u64>,
    pub receipts: BTreeMap<TxHash, Receipt>,
    pub block_number: u64,
    pub last_timestamp: u64,
    /// Fee debited from the sender per transaction.
    pub gas_fee: u64,
}

/// In-memory contract with optional file persistence.
#[derive(Debug, Default)]
pub struct LocalLedger {
    state: Mutex<LedgerState>,
    path: Option<PathBuf>,
    calls: Mutex<BTreeMap<&'static str, u64>>,
}

impl LocalLedger {
    /// Create an empty, non-persistent ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a file-backed ledger, starting empty if the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let state = if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .map_err(|e| DtweetError::path_error("read ledger", &path, e))?;
            let state: LedgerState = serde_json::from_str(&raw)?;
            info!(
                path = %path.display(),
                tweets = state.tweets.len(),
                block = state.block_number,
                "Loaded local ledger"
            );
            state
        } else {
            debug!(path = %path.display(), "Starting new local ledger");
            LedgerState::default()
        };

        Ok(Self {
            state: Mutex::new(state),
            path: Some(path),
            calls: Mutex::new(BTreeMap::new()),
        })
    }

    /// Path the ledger persists to, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Charge `fee` per transaction; senders then need a balance.
    #[must_use]
    pub fn with_gas_fee(self, fee: u64) -> Self {
        self.state.lock().gas_fee = fee;
        self
    }

    /// Credit `amount` to `account`.
    pub fn fund(&self, account: &Account, amount: u64) {
        let mut state = self.state.lock();
        *state.balances.entry(account.clone()).or_default() += amount;
    }

    /// Insert a tweet directly, bypassing transaction rules.
    pub fn seed_tweet(
        &self,
        author: &Account,
        content: &str,
        timestamp: u64,
        deleted: bool,
    ) -> TweetId {
        let mut state = self.state.lock();
        let id = state.tweets.len() as u64 + 1;
        state.tweets.push(Tweet {
            id,
            author: author.clone(),
            content: content.to_string(),
            timestamp,
            like_count: 0,
            deleted,
        });
        state.last_timestamp = state.last_timestamp.max(timestamp);
        id
    }

    /// Copy of the current chain state.
    #[must_use]
    pub fn snapshot(&self) -> LedgerState {
        self.state.lock().clone()
    }

    /// Number of times the named contract method has been invoked.
    #[must_use]
    pub fn call_count(&self, method: &str) -> u64 {
        self.calls.lock().get(method).copied().unwrap_or(0)
    }

    fn record_call(&self, method: &'static str) {
        *self.calls.lock().entry(method).or_default() += 1;
    }

    /// Write the whole state to a sibling staging file, then rename it over
    /// the ledger. An interrupted write leaves the previous file intact.
    fn persist(&self, state: &LedgerState) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| DtweetError::path_error("create directory", parent, e))?;
        }
        let json = serde_json::to_vec_pretty(state)?;
        let staging = staging_path(path);
        let write = || -> std::io::Result<()> {
            let mut file = std::fs::File::create(&staging)?;
            file.write_all(&json)?;
            file.sync_all()
        };
        write().map_err(|e| DtweetError::path_error("write ledger", &staging, e))?;
        std::fs::rename(&staging, path).map_err(|e| {
            let _ = std::fs::remove_file(&staging);
            DtweetError::path_error("replace ledger", path, e)
        })
    }
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

fn index_of(id: u64) -> Option<usize> {
    usize::try_from(id).ok()?.checked_sub(1)
}

fn now_seconds(state: &LedgerState) -> u64 {
    let wall = u64::try_from(Utc::now().timestamp()).unwrap_or(0);
    wall.max(state.last_timestamp)
}

fn check_length(content: &str, empty: &'static str, too_long: &'static str) -> std::result::Result<(), &'static str> {
    if content.is_empty() {
        return Err(empty);
    }
    if content.len() > MAX_CONTENT_LENGTH {
        return Err(too_long);
    }
    Ok(())
}

fn authored_tweet<'a>(
    tweets: &'a mut [Tweet],
    id: TweetId,
    from: &Account,
) -> std::result::Result<&'a mut Tweet, &'static str> {
    let tweet = index_of(id)
        .and_then(|i| tweets.get_mut(i))
        .ok_or("Invalid tweet")?;
    if &tweet.author != from {
        return Err("Not author");
    }
    if tweet.deleted {
        return Err("Deleted tweet");
    }
    Ok(tweet)
}

fn live_tweet(tweets: &mut [Tweet], id: TweetId) -> std::result::Result<&mut Tweet, &'static str> {
    let tweet = index_of(id)
        .and_then(|i| tweets.get_mut(i))
        .ok_or("Invalid tweet")?;
    if tweet.deleted {
        return Err("Tweet deleted");
    }
    Ok(tweet)
}

/// Apply `call` from `from` to `state`, returning the revert reason on failure.
fn execute(
    state: &mut LedgerState,
    from: &Account,
    call: ContractCall,
    now: u64,
) -> std::result::Result<(), &'static str> {
    match call {
        ContractCall::CreateTweet { content } => {
            check_length(&content, "Tweet cannot be empty", "Tweet too long")?;
            let id = state.tweets.len() as u64 + 1;
            state.tweets.push(Tweet {
                id,
                author: from.clone(),
                content,
                timestamp: now,
                like_count: 0,
                deleted: false,
            });
        }
        ContractCall::EditTweet { id, content } => {
            let tweet = authored_tweet(&mut state.tweets, id, from)?;
            check_length(&content, "Tweet cannot be empty", "Tweet too long")?;
            tweet.content = content;
        }
        ContractCall::DeleteTweet { id } => {
            authored_tweet(&mut state.tweets, id, from)?.deleted = true;
        }
        ContractCall::CreateLike { tweet_id } => {
            live_tweet(&mut state.tweets, tweet_id)?;
            let already = state
                .likes
                .iter()
                .any(|l| l.tweet_id == tweet_id && &l.liker == from && !l.deleted);
            if already {
                return Err("Already liked");
            }
            let id = state.likes.len() as u64 + 1;
            state.likes.push(Like {
                id,
                liker: from.clone(),
                tweet_id,
                timestamp: now,
                deleted: false,
            });
            live_tweet(&mut state.tweets, tweet_id)?.like_count += 1;
        }
        ContractCall::DeleteLike { like_id } => {
            let like = index_of(like_id)
                .and_then(|i| state.likes.get_mut(i))
                .ok_or("Invalid like")?;
            if &like.liker != from {
                return Err("Not liker");
            }
            if like.deleted {
                return Err("Like deleted");
            }
            like.deleted = true;
            let tweet_id = like.tweet_id;
            if let Some(tweet) = index_of(tweet_id).and_then(|i| state.tweets.get_mut(i)) {
                tweet.like_count = tweet.like_count.saturating_sub(1);
            }
        }
        ContractCall::CreateComment { content, tweet_id } => {
            check_length(&content, "Comment cannot be empty", "Comment too long")?;
            live_tweet(&mut state.tweets, tweet_id)?;
            let id = state.comments.len() as u64 + 1;
            state.comments.push(Comment {
                id,
                commenter: from.clone(),
                tweet_id,
                content,
                timestamp: now,
                deleted: false,
            });
        }
        ContractCall::CreateProfile { name, bio, image } => {
            if name.trim().is_empty() {
                return Err("Name required");
            }
            if state.profiles.get(from).is_some_and(Profile::exists) {
                return Err("Profile exists");
            }
            state.profiles.insert(
                from.clone(),
                Profile {
                    user: from.clone(),
                    name,
                    bio,
                    image,
                },
            );
        }
        ContractCall::EditProfile { name, bio, image } => {
            if name.trim().is_empty() {
                return Err("Name required");
            }
            let profile = state
                .profiles
                .get_mut(from)
                .filter(|p| p.exists())
                .ok_or("Profile not found")?;
            profile.name = name;
            profile.bio = bio;
            profile.image = image;
        }
    }
    Ok(())
}

#[async_trait]
impl TwitterContract for LocalLedger {
    async fn get_all_tweets(&self) -> Result<Vec<Tweet>> {
        self.record_call("getAllTweets");
        Ok(self.state.lock().tweets.clone())
    }

    async fn get_user_tweets(&self, user: &Account) -> Result<Vec<Tweet>> {
        self.record_call("getUserTweets");
        Ok(self
            .state
            .lock()
            .tweets
            .iter()
            .filter(|t| &t.author == user)
            .cloned()
            .collect())
    }

    async fn get_profile(&self, user: &Account) -> Result<Profile> {
        self.record_call("getProfile");
        Ok(self
            .state
            .lock()
            .profiles
            .get(user)
            .cloned()
            .unwrap_or_else(|| Profile::empty(user.clone())))
    }

    async fn get_likes_of_tweet(&self, tweet_id: TweetId) -> Result<Vec<Like>> {
        self.record_call("getLikesOfTweet");
        Ok(self
            .state
            .lock()
            .likes
            .iter()
            .filter(|l| l.tweet_id == tweet_id)
            .cloned()
            .collect())
    }

    async fn get_comments_of_tweet(&self, tweet_id: TweetId) -> Result<Vec<Comment>> {
        self.record_call("getCommentsOfTweet");
        Ok(self
            .state
            .lock()
            .comments
            .iter()
            .filter(|c| c.tweet_id == tweet_id)
            .cloned()
            .collect())
    }

    async fn submit(&self, from: &Account, call: ContractCall) -> Result<TxHash> {
        let method = call.method();
        self.record_call(method);

        let mut state = self.state.lock();
        let fee = state.gas_fee;
        if fee > 0 && state.balances.get(from).copied().unwrap_or(0) < fee {
            return Err(DtweetError::contract_call(
                Some("INSUFFICIENT_FUNDS"),
                "insufficient funds for gas * price + value",
            ));
        }

        let now = now_seconds(&state);
        let mut next = state.clone();
        execute(&mut next, from, call, now).map_err(DtweetError::reverted)?;

        if fee > 0 {
            if let Some(balance) = next.balances.get_mut(from) {
                *balance -= fee;
            }
        }
        next.block_number += 1;
        next.last_timestamp = now;
        let hash = TxHash(format!("0x{:064x}", next.receipts.len() + 1));
        next.receipts.insert(
            hash.clone(),
            Receipt {
                tx_hash: hash.clone(),
                block_number: next.block_number,
                gas_used: GAS_PER_TX,
            },
        );

        self.persist(&next)?;
        *state = next;
        debug!(method, tx_hash = %hash, "Ledger accepted transaction");
        Ok(hash)
    }

    async fn wait_for_receipt(&self, tx: &TxHash) -> Result<Receipt> {
        self.state
            .lock()
            .receipts
            .get(tx)
            .cloned()
            .ok_or_else(|| DtweetError::UnknownTransaction {
                hash: tx.to_string(),
            })
    }
}
