//! The external contract interface.
//!
//! [`TwitterContract`] is the seam between dtweet and whatever executes the
//! contract: the in-process [`crate::ledger::LocalLedger`] or a deployed
//! Solidity contract reached over JSON-RPC (`evm` feature).
//!
//! Reads return records directly. Writes are two-step: [`TwitterContract::submit`]
//! hands back a transaction hash, and [`TwitterContract::wait_for_receipt`]
//! resolves once the transaction is included.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Result;
use crate::model::{Account, Comment, Like, LikeId, Profile, Tweet, TweetId};

/// Hash identifying a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxHash(pub String);

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Inclusion proof for a confirmed transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub tx_hash: TxHash,
    pub block_number: u64,
    pub gas_used: u64,
}

/// A state-changing contract call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "camelCase")]
pub enum ContractCall {
    CreateTweet { content: String },
    EditTweet { id: TweetId, content: String },
    DeleteTweet { id: TweetId },
    CreateLike { tweet_id: TweetId },
    DeleteLike { like_id: LikeId },
    CreateComment { content: String, tweet_id: TweetId },
    CreateProfile { name: String, bio: String, image: String },
    EditProfile { name: String, bio: String, image: String },
}

impl ContractCall {
    /// Solidity method name, used in logs.
    #[must_use]
    pub const fn method(&self) -> &'static str {
        match self {
            Self::CreateTweet { .. } => "createTweet",
            Self::EditTweet { .. } => "editTweet",
            Self::DeleteTweet { .. } => "deleteTweet",
            Self::CreateLike { .. } => "createLike",
            Self::DeleteLike { .. } => "deleteLike",
            Self::CreateComment { .. } => "createComment",
            Self::CreateProfile { .. } => "createProfile",
            Self::EditProfile { .. } => "editProfile",
        }
    }
}

/// The contract's read and write surface.
#[async_trait]
pub trait TwitterContract: Send + Sync {
    /// `getAllTweets()`, including soft-deleted entries.
    async fn get_all_tweets(&self) -> Result<Vec<Tweet>>;

    /// `getUserTweets(account)`, including soft-deleted entries.
    async fn get_user_tweets(&self, user: &Account) -> Result<Vec<Tweet>>;

    /// `getProfile(account)`. Accounts without a profile read back empty.
    async fn get_profile(&self, user: &Account) -> Result<Profile>;

    /// `getLikesOfTweet(tweetId)`, including soft-deleted likes.
    async fn get_likes_of_tweet(&self, tweet_id: TweetId) -> Result<Vec<Like>>;

    /// `getCommentsOfTweet(tweetId)`, including soft-deleted comments.
    async fn get_comments_of_tweet(&self, tweet_id: TweetId) -> Result<Vec<Comment>>;

    /// Sign and submit `call` on behalf of `from`.
    async fn submit(&self, from: &Account, call: ContractCall) -> Result<TxHash>;

    /// Block until `tx` is included.
    async fn wait_for_receipt(&self, tx: &TxHash) -> Result<Receipt>;
}
