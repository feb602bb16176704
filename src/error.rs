//! Custom error types for dtweet.
//!
//! Failures fall into three families:
//!
//! - **Preconditions** caught locally before any contract call is made
//!   (empty content, over-length content, duplicate like, busy control).
//! - **Contract failures** reported by the provider, classified into a small
//!   set of recognised revert signals with user-facing messages.
//! - **Ambient failures** (configuration, IO, serialization).
//!
//! Profile lookups never surface errors; see [`crate::feed::resolve_or_default`].

use aho_corasick::{AhoCorasick, MatchKind};
use colored::Colorize;
use once_cell::sync::Lazy;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::model::TweetId;

/// Primary error type for dtweet operations.
#[derive(Error, Debug)]
pub enum DtweetError {
    // local preconditions
    /// Submitted text is empty after trimming.
    #[error("{what} cannot be empty!")]
    EmptyContent { what: &'static str },

    /// Submitted text exceeds the contract's length limit.
    #[error("{what} is too long ({len} / {max} characters)")]
    ContentTooLong {
        what: &'static str,
        len: usize,
        max: usize,
    },

    /// The current account already holds an active like on the tweet.
    #[error("You have already liked this tweet!")]
    AlreadyLiked { tweet_id: TweetId },

    /// Unlike requested but the current account holds no active like.
    #[error("You have not liked tweet {tweet_id}")]
    NotLiked { tweet_id: TweetId },

    /// The triggering control is still busy with a previous submission.
    #[error("Already busy: {action} is in progress")]
    Busy { action: Action },

    /// Account string is not a 20-byte hex address.
    #[error("Invalid account address '{value}'")]
    InvalidAccount { value: String },

    // wallet
    /// No wallet is configured for this session.
    #[error("No wallet found. Configure an account or private key to use dtweet.")]
    WalletNotFound,

    /// The wallet refused the account request.
    #[error("Failed to connect wallet: {reason}")]
    WalletRejected { reason: String },

    /// A write was requested without a connected account.
    #[error("Wallet not connected. Connect a wallet to continue.")]
    NotConnected,

    // contract
    /// Raw failure reported by the contract or provider, not yet attributed
    /// to a user action.
    #[error("Contract call failed: {message}")]
    ContractCall {
        code: Option<String>,
        message: String,
    },

    /// Classified contract failure for a specific user action.
    #[error("{}", render_contract_failure(.revert, .action))]
    Contract {
        action: Action,
        revert: ContractRevert,
    },

    /// Transaction hash unknown to the provider.
    #[error("Transaction {hash} not found")]
    UnknownTransaction { hash: String },

    /// Transaction was mined but reverted.
    #[error("Transaction {hash} reverted")]
    TransactionReverted { hash: String },

    /// Chain backend unavailable in this build or configuration.
    #[error("Backend '{backend}' is unavailable: {reason}")]
    BackendUnavailable {
        backend: &'static str,
        reason: String,
    },

    // configuration
    /// Deployed contract address missing or a placeholder.
    #[error(
        "CONTRACT ADDRESS NOT SET! Set DTWEET_CONTRACT_ADDRESS or network.contract_address (got '{value}')"
    )]
    ContractAddressMissing { value: String },

    /// Configuration file parsing error.
    #[error("Invalid configuration in '{path}': {reason}")]
    ConfigError { path: PathBuf, reason: String },

    // io
    /// File read/write error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Path-specific IO error with context.
    #[error("Failed to {operation} '{path}': {source}")]
    PathError {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON (de)serialization failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for dtweet operations.
pub type Result<T> = std::result::Result<T, DtweetError>;

/// User-triggered action an error is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    PostTweet,
    EditTweet,
    DeleteTweet,
    ToggleLike,
    PostComment,
    SaveProfile,
    LoadFeed,
    LoadUserTweets,
    LoadLikes,
    LoadComments,
}

impl Action {
    /// Verb phrase used in "Failed to ..." messages.
    #[must_use]
    pub const fn verb(self) -> &'static str {
        match self {
            Self::PostTweet => "post tweet",
            Self::EditTweet => "edit tweet",
            Self::DeleteTweet => "delete tweet",
            Self::ToggleLike => "update like",
            Self::PostComment => "post comment",
            Self::SaveProfile => "update profile",
            Self::LoadFeed => "fetch tweets",
            Self::LoadUserTweets => "fetch user tweets",
            Self::LoadLikes => "load likes",
            Self::LoadComments => "load comments",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.verb())
    }
}

/// Recognised contract failure signals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContractRevert {
    InsufficientFunds,
    NotAuthor,
    DeletedTweet,
    InvalidTweet,
    AlreadyLiked,
    TweetTooLong,
    CommentTooLong,
    Unrecognized(String),
}

const REVERT_PATTERNS: &[&str] = &[
    "insufficient funds",
    "not author",
    "deleted tweet",
    "tweet deleted",
    "invalid tweet",
    "already liked",
    "tweet too long",
    "comment too long",
];

static REVERT_MATCHER: Lazy<Option<AhoCorasick>> = Lazy::new(|| {
    AhoCorasick::builder()
        .ascii_case_insensitive(true)
        .match_kind(MatchKind::LeftmostFirst)
        .build(REVERT_PATTERNS)
        .ok()
});

impl ContractRevert {
    /// Classify a raw provider failure by its error code and message.
    #[must_use]
    pub fn classify(code: Option<&str>, message: &str) -> Self {
        if code.is_some_and(|c| c.eq_ignore_ascii_case("INSUFFICIENT_FUNDS")) {
            return Self::InsufficientFunds;
        }

        let Some(found) = REVERT_MATCHER.as_ref().and_then(|m| m.find(message)) else {
            return Self::Unrecognized(message.to_string());
        };

        match found.pattern().as_usize() {
            0 => Self::InsufficientFunds,
            1 => Self::NotAuthor,
            2 | 3 => Self::DeletedTweet,
            4 => Self::InvalidTweet,
            5 => Self::AlreadyLiked,
            6 => Self::TweetTooLong,
            7 => Self::CommentTooLong,
            _ => Self::Unrecognized(message.to_string()),
        }
    }

    /// Message shown to the user when `action` failed with this signal.
    #[must_use]
    pub fn user_message(&self, action: Action) -> String {
        match self {
            Self::InsufficientFunds => {
                "Insufficient funds! You need ETH to pay for gas fees.".to_string()
            }
            Self::NotAuthor => "You are not the author of this tweet!".to_string(),
            Self::DeletedTweet => match action {
                Action::EditTweet => {
                    "This tweet has been deleted and cannot be edited.".to_string()
                }
                Action::PostComment => {
                    "This tweet was deleted and cannot be commented on.".to_string()
                }
                _ => "This tweet has been deleted.".to_string(),
            },
            Self::InvalidTweet => "Invalid tweet reference.".to_string(),
            Self::AlreadyLiked => "You have already liked this tweet!".to_string(),
            Self::TweetTooLong => "Tweet is too long! Maximum 280 characters.".to_string(),
            Self::CommentTooLong => "Your comment exceeds the maximum length.".to_string(),
            Self::Unrecognized(raw) => {
                format!("Failed to {action}. Please try again.\n\nError: {raw}")
            }
        }
    }
}

fn render_contract_failure(revert: &ContractRevert, action: &Action) -> String {
    revert.user_message(*action)
}

impl DtweetError {
    /// Create a raw contract call failure.
    pub fn contract_call(code: Option<&str>, message: impl Into<String>) -> Self {
        Self::ContractCall {
            code: code.map(str::to_string),
            message: message.into(),
        }
    }

    /// Create a revert failure as reported by `execution reverted` responses.
    pub fn reverted(reason: &str) -> Self {
        Self::contract_call(
            Some("CALL_EXCEPTION"),
            format!("execution reverted: \"{reason}\""),
        )
    }

    /// Create a path error with context.
    pub fn path_error(
        operation: &'static str,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        Self::PathError {
            operation,
            path: path.into(),
            source,
        }
    }

    /// Attribute a raw contract failure to the action that triggered it.
    ///
    /// Errors that are not raw contract failures pass through unchanged.
    #[must_use]
    pub fn for_action(self, action: Action) -> Self {
        match self {
            Self::ContractCall { code, message } => Self::Contract {
                action,
                revert: ContractRevert::classify(code.as_deref(), &message),
            },
            Self::TransactionReverted { hash } => Self::Contract {
                action,
                revert: ContractRevert::Unrecognized(format!("transaction {hash} reverted")),
            },
            other => other,
        }
    }

    /// The classified revert, if this is an attributed contract failure.
    #[must_use]
    pub const fn revert(&self) -> Option<&ContractRevert> {
        match self {
            Self::Contract { revert, .. } => Some(revert),
            _ => None,
        }
    }

    /// Message suitable for showing to the user.
    #[must_use]
    pub fn user_message(&self) -> String {
        self.to_string()
    }

    /// Check if this error is recoverable (user can fix it).
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::EmptyContent { .. }
                | Self::ContentTooLong { .. }
                | Self::AlreadyLiked { .. }
                | Self::NotLiked { .. }
                | Self::Busy { .. }
                | Self::InvalidAccount { .. }
                | Self::NotConnected
                | Self::ContractAddressMissing { .. }
                | Self::Contract {
                    revert: ContractRevert::InsufficientFunds,
                    ..
                }
        )
    }

    /// Get a suggestion for how to fix this error, if applicable.
    #[must_use]
    pub const fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::Contract {
                revert: ContractRevert::InsufficientFunds,
                ..
            } => Some("Fund the account with test ETH from a faucet (e.g. https://sepoliafaucet.com)."),
            Self::WalletNotFound => {
                Some("Add accounts under [wallet] in the config file or set DTWEET_PRIVATE_KEY.")
            }
            Self::NotConnected => Some("Run 'dtweet connect' or pass --account <address>."),
            Self::ContractAddressMissing { .. } => {
                Some("Set DTWEET_CONTRACT_ADDRESS to the deployed contract address.")
            }
            Self::ContentTooLong { .. } => Some("Shorten the text to 280 characters or fewer."),
            Self::BackendUnavailable { .. } => {
                Some("Rebuild with '--features evm' or switch to the local backend.")
            }
            _ => None,
        }
    }
}

/// Format a structured CLI error with explanation and suggestions.
#[must_use]
pub fn format_error(title: &str, explanation: &str, suggestions: &[&str]) -> String {
    use std::fmt::Write;

    let mut output = format!("{} {}", "✗".red().bold(), title.bold());

    if !explanation.is_empty() {
        let _ = write!(output, "\n\n   {explanation}");
    }

    match suggestions {
        [] => {}
        [only] => {
            let _ = write!(output, "\n\n   {} {}", "Hint:".cyan(), only);
        }
        many => {
            let _ = write!(output, "\n\n   {}:", "Try".cyan());
            for suggestion in many {
                let _ = write!(output, "\n     {} {}", "•".dimmed(), suggestion);
            }
        }
    }

    output
}

/// Edit distance between two strings, counted in chars.
#[must_use]
pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    let target: Vec<char> = b.chars().collect();
    // row[j] = distance between the prefix of `a` seen so far and target[..j]
    let mut row: Vec<usize> = (0..=target.len()).collect();

    for (i, ca) in a.chars().enumerate() {
        let mut diagonal = row[0];
        row[0] = i + 1;
        for (j, &cb) in target.iter().enumerate() {
            let substitute = diagonal + usize::from(ca != cb);
            diagonal = row[j + 1];
            row[j + 1] = substitute.min(row[j] + 1).min(diagonal + 1);
        }
    }
    row[target.len()]
}

/// Nearest candidate within `max_distance` edits (2 when `None`), ignoring
/// case. An exact match is not a suggestion.
#[must_use]
pub fn find_closest_match<'a>(
    input: &str,
    candidates: &[&'a str],
    max_distance: Option<usize>,
) -> Option<&'a str> {
    let input = input.to_lowercase();
    let limit = max_distance.unwrap_or(2);
    candidates
        .iter()
        .copied()
        .filter_map(|c| {
            let d = levenshtein_distance(&input, &c.to_lowercase());
            (1..=limit).contains(&d).then_some((d, c))
        })
        .min_by_key(|&(d, _)| d)
        .map(|(_, c)| c)
}

/// Format an error for an unknown value with "did you mean?" support.
#[must_use]
pub fn format_unknown_value_error(kind: &str, input: &str, valid_options: &[&str]) -> String {
    let title = format!("Unknown {kind}: '{input}'");

    let mut suggestions = Vec::new();
    if let Some(closest) = find_closest_match(input, valid_options, None) {
        suggestions.push(format!("Did you mean '{}'?", closest.green()));
    }
    if valid_options.len() <= 20 {
        suggestions.push(format!("Valid {kind}s: {}", valid_options.join(", ")));
    }

    let suggestion_refs: Vec<&str> = suggestions.iter().map(String::as_str).collect();
    format_error(&title, "", &suggestion_refs)
}
