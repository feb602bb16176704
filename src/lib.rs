//! dtweet - client for an on-chain social feed
//!
//! This library reads and writes tweets, profiles, likes and comments stored
//! by a social smart contract, through a wallet-backed provider.
//!
//! # Modules
//!
//! - [`wallet`] - Connected-account session and wallet providers
//! - [`contract`] - The contract interface and transaction types
//! - [`gateway`] - Read and signed write handles over the contract
//! - [`feed`] - Feed assembly with concurrent profile resolution
//! - [`social`] - Cached likers and comments per tweet
//! - [`flows`] - Mutation state machines
//! - [`app`] - Session state tying the above together
//! - [`ledger`] - In-process contract with JSON persistence
//! - `evm` - Deployed contract over JSON-RPC (feature `evm`)

pub mod app;
pub mod cli;
pub mod config;
pub mod contract;
pub mod error;
#[cfg(feature = "evm")]
pub mod evm;
pub mod feed;
pub mod flows;
pub mod gateway;
pub mod ledger;
pub mod logging;
pub mod model;
pub mod render;
pub mod repl;
pub mod social;
pub mod wallet;

pub use app::AppContext;
pub use cli::*;
pub use config::Config;
pub use contract::{ContractCall, Receipt, TwitterContract, TxHash};
pub use error::{
    Action, ContractRevert, DtweetError, Result, find_closest_match, format_error,
    format_unknown_value_error,
};
pub use ledger::LocalLedger;
pub use model::*;

use chrono::{DateTime, Utc};

/// Default ledger filename
pub const DEFAULT_LEDGER_NAME: &str = "ledger.json";

/// Standard width for content dividers in CLI output
pub const CONTENT_DIVIDER_WIDTH: usize = 60;

/// Get the default data directory for dtweet
#[must_use]
pub fn default_data_dir() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("dtweet")
}

/// Get the default local ledger path
#[must_use]
pub fn default_ledger_path() -> std::path::PathBuf {
    default_data_dir().join(DEFAULT_LEDGER_NAME)
}

/// Format an unsigned integer with thousands separators.
#[must_use]
pub fn format_number_u64(value: u64) -> String {
    let mut out = String::with_capacity(24);

    for (idx, ch) in value.to_string().chars().rev().enumerate() {
        if idx > 0 && idx % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }

    out.chars().rev().collect()
}

/// Age of a post as shown next to it in the feed.
///
/// `Just now` under a minute, then `5m ago`, `3h ago`, `2d ago`. From a week
/// on it is the full date, e.g. `Mar 3, 2025`.
#[must_use]
pub fn format_relative_date(dt: DateTime<Utc>) -> String {
    format_relative_date_at(dt, Utc::now())
}

/// [`format_relative_date`] against a fixed clock. Block timestamps ahead of
/// the local clock count as `Just now`.
#[must_use]
pub fn format_relative_date_at(dt: DateTime<Utc>, now: DateTime<Utc>) -> String {
    const MINUTE: i64 = 60;
    const HOUR: i64 = 60 * MINUTE;
    const DAY: i64 = 24 * HOUR;

    let secs = now.signed_duration_since(dt).num_seconds().max(0);
    match secs {
        ..MINUTE => "Just now".to_string(),
        ..HOUR => format!("{}m ago", secs / MINUTE),
        ..DAY => format!("{}h ago", secs / HOUR),
        _ if secs < 7 * DAY => format!("{}d ago", secs / DAY),
        _ => dt.format("%b %-d, %Y").to_string(),
    }
}

/// Character counter shown while composing, e.g. `"42/280"`.
#[must_use]
pub fn format_length_counter(text: &str) -> String {
    format!("{}/{}", content_length(text), MAX_CONTENT_LENGTH)
}

/// Shorten a transaction hash for display (e.g., 0x1234...abcd).
#[must_use]
pub fn format_short_hash(hash: &str) -> String {
    let chars: Vec<char> = hash.chars().collect();
    if chars.len() <= 14 {
        return hash.to_string();
    }
    let start: String = chars.iter().take(6).collect();
    let end: String = chars.iter().rev().take(4).rev().collect();
    format!("{start}...{end}")
}
