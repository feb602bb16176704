//! Data models for the on-chain social contract.
//!
//! Records (`Tweet`, `Profile`, `Like`, `Comment`) mirror the contract's
//! structs as returned by its view functions. Display shapes (`FeedTweet`,
//! `DisplayProfile`, `Liker`, `CommentView`) are what the client renders after
//! filtering, sorting and profile resolution.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::{DtweetError, Result};

/// Maximum tweet and comment length accepted by the contract.
pub const MAX_CONTENT_LENGTH: usize = 280;

/// Ordinal identifier assigned by the contract to a tweet.
pub type TweetId = u64;
/// Ordinal identifier assigned by the contract to a like.
pub type LikeId = u64;
/// Ordinal identifier assigned by the contract to a comment.
pub type CommentId = u64;

/// A blockchain account address (`0x` followed by 40 hex digits).
///
/// Stored lowercase so equality and hashing are case-insensitive, matching
/// how checksummed and plain addresses refer to the same account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Account(String);

impl Account {
    /// The normalized `0x`-prefixed lowercase form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form used next to names, e.g. `0xf39f...2266`.
    #[must_use]
    pub fn short(&self) -> String {
        let head = self.0.get(..6).unwrap_or(&self.0);
        let tail = self.0.get(self.0.len().saturating_sub(4)..).unwrap_or("");
        format!("{head}...{tail}")
    }

    /// Deterministic display name used when no profile can be resolved.
    #[must_use]
    pub fn fallback_name(&self) -> String {
        format!("User {}", self.0.get(..6).unwrap_or(&self.0))
    }
}

impl FromStr for Account {
    type Err = DtweetError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let hex = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .ok_or_else(|| DtweetError::InvalidAccount {
                value: s.to_string(),
            })?;

        if hex.len() != 40 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(DtweetError::InvalidAccount {
                value: s.to_string(),
            });
        }

        Ok(Self(format!("0x{}", hex.to_ascii_lowercase())))
    }
}

impl TryFrom<String> for Account {
    type Error = DtweetError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Account> for String {
    fn from(account: Account) -> Self {
        account.0
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A tweet as stored by the contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tweet {
    pub id: TweetId,
    pub author: Account,
    pub content: String,
    /// Seconds since the Unix epoch.
    pub timestamp: u64,
    pub like_count: u64,
    pub deleted: bool,
}

/// A profile as stored by the contract. Absent profiles read back with
/// empty strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub user: Account,
    pub name: String,
    pub bio: String,
    pub image: String,
}

impl Profile {
    /// The zero-valued profile returned for accounts that never created one.
    #[must_use]
    pub const fn empty(user: Account) -> Self {
        Self {
            user,
            name: String::new(),
            bio: String::new(),
            image: String::new(),
        }
    }

    /// Whether the account has created a profile.
    #[must_use]
    pub fn exists(&self) -> bool {
        !self.name.trim().is_empty()
    }
}

/// A like record. Unliking soft-deletes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Like {
    pub id: LikeId,
    pub liker: Account,
    pub tweet_id: TweetId,
    pub timestamp: u64,
    pub deleted: bool,
}

/// A comment record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub commenter: Account,
    pub tweet_id: TweetId,
    pub content: String,
    pub timestamp: u64,
    pub deleted: bool,
}

/// A tweet in display shape.
///
/// The identifier and like count serialize as strings, the same way the
/// contract's 256-bit integers are rendered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedTweet {
    #[serde(serialize_with = "serialize_display")]
    pub id: TweetId,
    pub author: Account,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(serialize_with = "serialize_display")]
    pub like_count: u64,
}

impl From<Tweet> for FeedTweet {
    fn from(tweet: Tweet) -> Self {
        Self {
            id: tweet.id,
            author: tweet.author,
            content: tweet.content,
            timestamp: timestamp_to_datetime(tweet.timestamp),
            like_count: tweet.like_count,
        }
    }
}

/// Profile data as displayed next to an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplayProfile {
    pub name: String,
    pub bio: String,
    pub image: String,
}

impl DisplayProfile {
    /// Synthesized profile for an account whose profile is absent or
    /// could not be fetched.
    #[must_use]
    pub fn fallback(account: &Account) -> Self {
        Self {
            name: account.fallback_name(),
            bio: String::new(),
            image: String::new(),
        }
    }

    /// Display form of a fetched profile, filling in the fallback name when
    /// the stored one is empty.
    #[must_use]
    pub fn from_profile(account: &Account, profile: Profile) -> Self {
        let name = if profile.exists() {
            profile.name
        } else {
            account.fallback_name()
        };
        Self {
            name,
            bio: profile.bio,
            image: profile.image,
        }
    }
}

/// A liker of a tweet with their resolved profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Liker {
    pub address: Account,
    pub name: String,
    pub image: String,
    pub timestamp: DateTime<Utc>,
}

/// A comment with its author's resolved profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommentView {
    pub address: Account,
    pub name: String,
    pub image: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Convert contract seconds to a UTC datetime, clamping out-of-range values.
#[must_use]
pub fn timestamp_to_datetime(seconds: u64) -> DateTime<Utc> {
    let secs = i64::try_from(seconds).unwrap_or(i64::MAX);
    DateTime::from_timestamp(secs, 0).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Length of `text` in UTF-16 code units, the unit the compose box counts in.
#[must_use]
pub fn content_length(text: &str) -> usize {
    text.encode_utf16().count()
}

/// Local pre-check applied before any tweet or comment is submitted.
///
/// # Errors
///
/// Returns [`DtweetError::EmptyContent`] for blank text and
/// [`DtweetError::ContentTooLong`] beyond [`MAX_CONTENT_LENGTH`] units.
pub fn validate_content(what: &'static str, text: &str) -> Result<()> {
    if text.trim().is_empty() {
        return Err(DtweetError::EmptyContent { what });
    }
    let len = content_length(text);
    if len > MAX_CONTENT_LENGTH {
        return Err(DtweetError::ContentTooLong {
            what,
            len,
            max: MAX_CONTENT_LENGTH,
        });
    }
    Ok(())
}

fn serialize_display<T, S>(value: &T, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    T: fmt::Display,
    S: Serializer,
{
    serializer.collect_str(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADDR: &str = "0xF39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

    #[test]
    fn account_parses_and_normalizes() {
        let account: Account = ADDR.parse().unwrap();
        assert_eq!(account.as_str(), "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266");
        assert_eq!(account, ADDR.to_lowercase().parse().unwrap());
    }

    #[test]
    fn account_rejects_malformed() {
        assert!("f39fd6e51aad88f6f4ce6ab8827279cfffb92266".parse::<Account>().is_err());
        assert!("0x1234".parse::<Account>().is_err());
        assert!("0xZZ9fd6e51aad88f6f4ce6ab8827279cfffb92266".parse::<Account>().is_err());
    }

    #[test]
    fn account_display_helpers() {
        let account: Account = ADDR.parse().unwrap();
        assert_eq!(account.fallback_name(), "User 0xf39f");
        assert_eq!(account.short(), "0xf39f...2266");
    }

    #[test]
    fn display_profile_falls_back_on_empty_name() {
        let account: Account = ADDR.parse().unwrap();
        let mut profile = Profile::empty(account.clone());
        profile.image = "https://img".to_string();
        let display = DisplayProfile::from_profile(&account, profile);
        assert_eq!(display.name, "User 0xf39f");
        assert_eq!(display.image, "https://img");
    }

    #[test]
    fn validate_content_limits() {
        assert!(matches!(
            validate_content("Tweet", "   "),
            Err(DtweetError::EmptyContent { .. })
        ));
        assert!(validate_content("Tweet", &"a".repeat(280)).is_ok());
        assert!(matches!(
            validate_content("Tweet", &"a".repeat(281)),
            Err(DtweetError::ContentTooLong { len: 281, .. })
        ));
    }

    #[test]
    fn content_length_counts_utf16_units() {
        assert_eq!(content_length("héllo"), 5);
        assert_eq!(content_length("🦀"), 2);
    }

    #[test]
    fn feed_tweet_serializes_ids_as_strings() {
        let tweet = Tweet {
            id: 7,
            author: ADDR.parse().unwrap(),
            content: "gm".to_string(),
            timestamp: 100,
            like_count: 3,
            deleted: false,
        };
        let json = serde_json::to_value(FeedTweet::from(tweet)).unwrap();
        assert_eq!(json["id"], "7");
        assert_eq!(json["like_count"], "3");
    }
}
