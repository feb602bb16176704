//! Per-tweet social panels (likers and comments).
//!
//! Each panel is fetched on first open and cached by tweet id. Cached lists
//! are served without refetching until [`SocialPanels::refresh_likes`],
//! [`SocialPanels::refresh_comments`] or [`SocialPanels::invalidate`] is
//! called. Caches are bounded; the oldest inserted entry is evicted first.

use futures::future::join_all;
use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use tracing::debug;

use crate::error::{Action, Result};
use crate::feed::resolve_or_default;
use crate::gateway::ReadHandle;
use crate::model::{CommentView, Liker, TweetId, timestamp_to_datetime};

/// Default number of tweets whose panels are kept per panel kind.
pub const DEFAULT_CACHE_CAPACITY: usize = 256;

/// Insertion-ordered map with a fixed capacity.
#[derive(Debug, Clone)]
pub struct BoundedCache<K, V> {
    entries: HashMap<K, V>,
    order: VecDeque<K>,
    capacity: usize,
}

impl<K: Eq + Hash + Clone, V> BoundedCache<K, V> {
    /// Create a cache holding at most `capacity` entries (minimum 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    #[must_use]
    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    #[must_use]
    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Insert or replace, evicting the oldest entry when full.
    pub fn insert(&mut self, key: K, value: V) {
        if self.entries.insert(key.clone(), value).is_some() {
            return;
        }
        self.order.push_back(key);
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        let removed = self.entries.remove(key)?;
        self.order.retain(|k| k != key);
        Some(removed)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Which panel is showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenPanel {
    Likes(TweetId),
    Comments(TweetId),
}

/// Lazily loaded likers and comments, keyed by tweet.
pub struct SocialPanels {
    reader: ReadHandle,
    likes: BoundedCache<TweetId, Vec<Liker>>,
    comments: BoundedCache<TweetId, Vec<CommentView>>,
    open: Option<OpenPanel>,
}

impl SocialPanels {
    #[must_use]
    pub fn new(reader: ReadHandle, capacity: usize) -> Self {
        Self {
            reader,
            likes: BoundedCache::new(capacity),
            comments: BoundedCache::new(capacity),
            open: None,
        }
    }

    /// The panel currently open, if any.
    #[must_use]
    pub const fn open_panel(&self) -> Option<OpenPanel> {
        self.open
    }

    /// Close whatever panel is open. Cached data is kept.
    pub fn close(&mut self) {
        self.open = None;
    }

    /// Likers of `tweet_id`, fetched on first open and cached afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error if the likes list cannot be fetched.
    pub async fn open_likes(&mut self, tweet_id: TweetId) -> Result<Vec<Liker>> {
        self.open = Some(OpenPanel::Likes(tweet_id));
        if let Some(cached) = self.likes.get(&tweet_id) {
            debug!(tweet_id, "Likes served from cache");
            return Ok(cached.clone());
        }
        let likers = self.fetch_likers(tweet_id).await?;
        self.likes.insert(tweet_id, likers.clone());
        Ok(likers)
    }

    /// Comments on `tweet_id`, fetched on first open and cached afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error if the comment list cannot be fetched.
    pub async fn open_comments(&mut self, tweet_id: TweetId) -> Result<Vec<CommentView>> {
        self.open = Some(OpenPanel::Comments(tweet_id));
        if let Some(cached) = self.comments.get(&tweet_id) {
            debug!(tweet_id, "Comments served from cache");
            return Ok(cached.clone());
        }
        let comments = self.fetch_comments(tweet_id).await?;
        self.comments.insert(tweet_id, comments.clone());
        Ok(comments)
    }

    /// Drop the cached likers of `tweet_id` and fetch them again.
    ///
    /// # Errors
    ///
    /// Returns an error if the likes list cannot be fetched; the cache entry
    /// stays empty in that case.
    pub async fn refresh_likes(&mut self, tweet_id: TweetId) -> Result<Vec<Liker>> {
        self.invalidate_likes(tweet_id);
        self.open_likes(tweet_id).await
    }

    /// Drop the cached comments of `tweet_id` and fetch them again.
    ///
    /// # Errors
    ///
    /// Returns an error if the comment list cannot be fetched; the cache
    /// entry stays empty in that case.
    pub async fn refresh_comments(&mut self, tweet_id: TweetId) -> Result<Vec<CommentView>> {
        self.invalidate_comments(tweet_id);
        self.open_comments(tweet_id).await
    }

    /// Forget both panels for `tweet_id`.
    pub fn invalidate(&mut self, tweet_id: TweetId) {
        self.likes.remove(&tweet_id);
        self.comments.remove(&tweet_id);
    }

    pub fn invalidate_likes(&mut self, tweet_id: TweetId) {
        self.likes.remove(&tweet_id);
    }

    pub fn invalidate_comments(&mut self, tweet_id: TweetId) {
        self.comments.remove(&tweet_id);
    }

    /// Forget everything, e.g. after the connected account changes.
    pub fn clear(&mut self) {
        self.likes.clear();
        self.comments.clear();
        self.open = None;
    }

    #[must_use]
    pub fn is_likes_cached(&self, tweet_id: TweetId) -> bool {
        self.likes.contains(&tweet_id)
    }

    #[must_use]
    pub fn is_comments_cached(&self, tweet_id: TweetId) -> bool {
        self.comments.contains(&tweet_id)
    }

    async fn fetch_likers(&self, tweet_id: TweetId) -> Result<Vec<Liker>> {
        let likes = self
            .reader
            .get_likes_of_tweet(tweet_id)
            .await
            .map_err(|e| e.for_action(Action::LoadLikes))?;

        let reader = &self.reader;
        let likers = likes.into_iter().filter(|l| !l.deleted).map(|like| async move {
            let profile = resolve_or_default(reader, &like.liker).await;
            Liker {
                address: like.liker,
                name: profile.name,
                image: profile.image,
                timestamp: timestamp_to_datetime(like.timestamp),
            }
        });
        let likers = join_all(likers).await;
        debug!(tweet_id, likers = likers.len(), "Likes loaded");
        Ok(likers)
    }

    async fn fetch_comments(&self, tweet_id: TweetId) -> Result<Vec<CommentView>> {
        let comments = self
            .reader
            .get_comments_of_tweet(tweet_id)
            .await
            .map_err(|e| e.for_action(Action::LoadComments))?;

        let reader = &self.reader;
        let views = comments.into_iter().filter(|c| !c.deleted).map(|comment| async move {
            let profile = resolve_or_default(reader, &comment.commenter).await;
            CommentView {
                address: comment.commenter,
                name: profile.name,
                image: profile.image,
                content: comment.content,
                timestamp: timestamp_to_datetime(comment.timestamp),
            }
        });
        let views = join_all(views).await;
        debug!(tweet_id, comments = views.len(), "Comments loaded");
        Ok(views)
    }
}
