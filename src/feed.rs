//! Feed assembly.
//!
//! Raw tweet records are filtered, mapped to [`FeedTweet`], stable-sorted
//! newest first, and paired with a profile for every distinct author. Profile
//! lookups run concurrently and fail independently: an author whose lookup
//! fails gets [`DisplayProfile::fallback`].

use futures::future::join_all;
use itertools::Itertools;
use std::collections::HashMap;
use tracing::debug;

use crate::error::{Action, Result};
use crate::gateway::ReadHandle;
use crate::model::{Account, DisplayProfile, FeedTweet, Tweet, TweetId};

/// Drop deleted records, convert to display shape, and sort newest first.
///
/// Ties on timestamp keep their input order.
#[must_use]
pub fn assemble(records: Vec<Tweet>) -> Vec<FeedTweet> {
    let mut tweets: Vec<FeedTweet> = records
        .into_iter()
        .filter(|t| !t.deleted)
        .map(FeedTweet::from)
        .collect();
    tweets.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    tweets
}

/// Look up `account`'s profile, substituting the fallback on failure.
pub async fn resolve_or_default(reader: &ReadHandle, account: &Account) -> DisplayProfile {
    match reader.get_profile(account).await {
        Ok(profile) => DisplayProfile::from_profile(account, profile),
        Err(e) => {
            debug!(account = %account, error = %e, "Profile lookup failed, using fallback");
            DisplayProfile::fallback(account)
        }
    }
}

/// Resolve every distinct account concurrently.
pub async fn resolve_profiles<'a, I>(reader: &ReadHandle, accounts: I) -> HashMap<Account, DisplayProfile>
where
    I: IntoIterator<Item = &'a Account>,
{
    let unique: Vec<&Account> = accounts.into_iter().unique().collect();
    let lookups = unique.iter().map(|account| async move {
        let profile = resolve_or_default(reader, account).await;
        ((*account).clone(), profile)
    });
    join_all(lookups).await.into_iter().collect()
}

/// An assembled feed with its author profiles.
#[derive(Debug, Clone, Default)]
pub struct Feed {
    tweets: Vec<FeedTweet>,
    profiles: HashMap<Account, DisplayProfile>,
}

impl Feed {
    #[must_use]
    pub fn tweets(&self) -> &[FeedTweet] {
        &self.tweets
    }

    #[must_use]
    pub fn profiles(&self) -> &HashMap<Account, DisplayProfile> {
        &self.profiles
    }

    /// Profile for `author`, or the fallback if the author is not in this feed.
    #[must_use]
    pub fn profile_of(&self, author: &Account) -> DisplayProfile {
        self.profiles
            .get(author)
            .cloned()
            .unwrap_or_else(|| DisplayProfile::fallback(author))
    }

    #[must_use]
    pub fn find(&self, id: TweetId) -> Option<&FeedTweet> {
        self.tweets.iter().find(|t| t.id == id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tweets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tweets.is_empty()
    }
}

/// Loads feeds from the contract.
#[derive(Clone)]
pub struct FeedAssembler {
    reader: ReadHandle,
}

impl FeedAssembler {
    #[must_use]
    pub const fn new(reader: ReadHandle) -> Self {
        Self { reader }
    }

    /// Global feed from `getAllTweets`.
    ///
    /// # Errors
    ///
    /// Fails only if the tweet list itself cannot be fetched.
    pub async fn load_all(&self) -> Result<Feed> {
        let records = self
            .reader
            .get_all_tweets()
            .await
            .map_err(|e| e.for_action(Action::LoadFeed))?;
        Ok(self.build(records).await)
    }

    /// One account's tweets from `getUserTweets`.
    ///
    /// # Errors
    ///
    /// Fails only if the tweet list itself cannot be fetched.
    pub async fn load_user(&self, account: &Account) -> Result<Feed> {
        let records = self
            .reader
            .get_user_tweets(account)
            .await
            .map_err(|e| e.for_action(Action::LoadUserTweets))?;
        let mut feed = self.build(records).await;
        if !feed.profiles.contains_key(account) {
            let profile = resolve_or_default(&self.reader, account).await;
            feed.profiles.insert(account.clone(), profile);
        }
        Ok(feed)
    }

    async fn build(&self, records: Vec<Tweet>) -> Feed {
        let tweets = assemble(records);
        let profiles = resolve_profiles(&self.reader, tweets.iter().map(|t| &t.author)).await;
        debug!(
            tweets = tweets.len(),
            authors = profiles.len(),
            "Feed assembled"
        );
        Feed { tweets, profiles }
    }

    /// Whether `account` holds an active like on each tweet.
    ///
    /// Tweets whose likes cannot be fetched count as not liked.
    pub async fn liked_status(
        &self,
        tweets: &[FeedTweet],
        account: &Account,
    ) -> HashMap<TweetId, bool> {
        let mut status = HashMap::with_capacity(tweets.len());
        for tweet in tweets {
            status.insert(tweet.id, self.has_liked(tweet.id, account).await);
        }
        status
    }

    /// Whether `account` holds an active like on `tweet_id`; `false` when
    /// the likes cannot be fetched.
    pub async fn has_liked(&self, tweet_id: TweetId, account: &Account) -> bool {
        match self.reader.get_likes_of_tweet(tweet_id).await {
            Ok(likes) => likes.iter().any(|l| &l.liker == account && !l.deleted),
            Err(e) => {
                debug!(tweet_id, error = %e, "Error checking likes");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{ContractCall, Receipt, TwitterContract, TxHash};
    use crate::gateway::ContractGateway;
    use crate::ledger::LocalLedger;
    use crate::model::{Comment, Like, Profile};
    use crate::DtweetError;
    use async_trait::async_trait;
    use std::sync::Arc;

    fn account(n: u8) -> Account {
        format!("0x{:040x}", u64::from(n) + 0xabc0).parse().unwrap()
    }

    fn record(id: u64, author: &Account, timestamp: u64, deleted: bool) -> Tweet {
        Tweet {
            id,
            author: author.clone(),
            content: format!("tweet {id}"),
            timestamp,
            like_count: 0,
            deleted,
        }
    }

    #[test]
    fn assemble_filters_deleted_and_sorts_newest_first() {
        let a = account(1);
        let feed = assemble(vec![
            record(1, &a, 100, false),
            record(2, &a, 200, true),
            record(3, &a, 150, false),
        ]);
        let ids: Vec<TweetId> = feed.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![3, 1]);
    }

    #[test]
    fn assemble_is_stable_on_equal_timestamps() {
        let a = account(1);
        let feed = assemble(vec![
            record(1, &a, 100, false),
            record(2, &a, 100, false),
            record(3, &a, 300, false),
            record(4, &a, 100, false),
        ]);
        let ids: Vec<TweetId> = feed.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![3, 1, 2, 4]);
        assert!(feed.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));
    }

    /// Contract whose profile lookups fail for one account.
    struct FlakyProfiles {
        inner: LocalLedger,
        broken: Account,
    }

    #[async_trait]
    impl TwitterContract for FlakyProfiles {
        async fn get_all_tweets(&self) -> Result<Vec<Tweet>> {
            self.inner.get_all_tweets().await
        }
        async fn get_user_tweets(&self, user: &Account) -> Result<Vec<Tweet>> {
            self.inner.get_user_tweets(user).await
        }
        async fn get_profile(&self, user: &Account) -> Result<Profile> {
            if user == &self.broken {
                return Err(DtweetError::contract_call(Some("BAD_DATA"), "could not decode result data"));
            }
            self.inner.get_profile(user).await
        }
        async fn get_likes_of_tweet(&self, tweet_id: TweetId) -> Result<Vec<Like>> {
            self.inner.get_likes_of_tweet(tweet_id).await
        }
        async fn get_comments_of_tweet(&self, tweet_id: TweetId) -> Result<Vec<Comment>> {
            self.inner.get_comments_of_tweet(tweet_id).await
        }
        async fn submit(&self, from: &Account, call: ContractCall) -> Result<TxHash> {
            self.inner.submit(from, call).await
        }
        async fn wait_for_receipt(&self, tx: &TxHash) -> Result<Receipt> {
            self.inner.wait_for_receipt(tx).await
        }
    }

    #[tokio::test]
    async fn profile_failure_is_per_author() {
        let good = account(1);
        let broken = account(2);
        let ledger = LocalLedger::new();
        ledger.seed_tweet(&good, "hello", 10, false);
        ledger.seed_tweet(&broken, "world", 20, false);
        ledger.seed_tweet(&good, "again", 30, false);
        let hash = ledger
            .submit(
                &good,
                ContractCall::CreateProfile {
                    name: "Good".to_string(),
                    bio: String::new(),
                    image: "https://img/good.png".to_string(),
                },
            )
            .await
            .unwrap();
        ledger.wait_for_receipt(&hash).await.unwrap();

        let contract = Arc::new(FlakyProfiles {
            inner: ledger,
            broken: broken.clone(),
        });
        let assembler = FeedAssembler::new(ContractGateway::new(contract).reader());
        let feed = assembler.load_all().await.unwrap();

        assert_eq!(feed.len(), 3);
        assert_eq!(feed.profiles().len(), 2);
        assert_eq!(feed.profile_of(&good).name, "Good");

        let fallback = feed.profile_of(&broken);
        assert_eq!(fallback.name, broken.fallback_name());
        assert!(fallback.image.is_empty());
    }

    #[tokio::test]
    async fn profiles_are_fetched_once_per_author() {
        let a = account(1);
        let b = account(2);
        let ledger = Arc::new(LocalLedger::new());
        for (i, author) in [&a, &b, &a, &a, &b].into_iter().enumerate() {
            ledger.seed_tweet(author, "x", i as u64, false);
        }
        let assembler = FeedAssembler::new(ContractGateway::new(ledger.clone()).reader());
        let feed = assembler.load_all().await.unwrap();
        assert_eq!(feed.len(), 5);
        assert_eq!(ledger.call_count("getProfile"), 2);
    }

    #[tokio::test]
    async fn load_user_includes_own_profile_even_when_empty() {
        let a = account(1);
        let ledger = Arc::new(LocalLedger::new());
        let assembler = FeedAssembler::new(ContractGateway::new(ledger).reader());
        let feed = assembler.load_user(&a).await.unwrap();
        assert!(feed.is_empty());
        assert_eq!(feed.profile_of(&a).name, a.fallback_name());
        assert_eq!(feed.profiles().len(), 1);
    }

    #[tokio::test]
    async fn liked_status_tracks_active_likes() {
        let author = account(1);
        let fan = account(2);
        let ledger = Arc::new(LocalLedger::new());
        let liked = ledger.seed_tweet(&author, "liked", 10, false);
        let unliked = ledger.seed_tweet(&author, "not liked", 20, false);
        let hash = ledger
            .submit(&fan, ContractCall::CreateLike { tweet_id: liked })
            .await
            .unwrap();
        ledger.wait_for_receipt(&hash).await.unwrap();

        let assembler = FeedAssembler::new(ContractGateway::new(ledger).reader());
        let feed = assembler.load_all().await.unwrap();
        let status = assembler.liked_status(feed.tweets(), &fan).await;
        assert_eq!(status.get(&liked), Some(&true));
        assert_eq!(status.get(&unliked), Some(&false));
    }
}
