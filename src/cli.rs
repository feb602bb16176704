//! CLI definitions for dtweet.
//!
//! Uses clap for argument parsing with derive macros.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::config::Backend;
use crate::model::{Account, TweetId};

/// dtweet - on-chain social feed client
#[derive(Parser, Debug)]
#[command(name = "dtweet")]
#[command(version)]
#[command(about = "Post, like and comment on an on-chain social feed")]
#[command(long_about = r#"
dtweet - a command-line client for a decentralized Twitter-like contract.

Every tweet, like, comment and profile lives in the contract. Writes are
signed by the connected wallet account and only show up once the
transaction is confirmed.

Backends:
  local  An in-process ledger persisted to a JSON file (default)
  evm    A deployed contract over JSON-RPC (build with --features evm)

Quick start:
  1. Post:    dtweet post "gm"
  2. Read:    dtweet feed
  3. Like:    dtweet like 1
  4. Explore: dtweet shell
"#)]
pub struct Cli {
    /// Path to a config file (replaces ~/.config/dtweet/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to the local ledger file
    #[arg(long, env = "DTWEET_LEDGER", global = true)]
    pub ledger: Option<PathBuf>,

    /// Account to act as (must be available in the wallet)
    #[arg(long, short = 'a', env = "DTWEET_ACCOUNT", global = true)]
    pub account: Option<Account>,

    /// Contract backend
    #[arg(long, global = true)]
    pub backend: Option<Backend>,

    /// Output format
    #[arg(long, short = 'f', global = true)]
    pub format: Option<OutputFormat>,

    /// Be verbose (repeat for more detail)
    #[arg(long, short = 'v', global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Be quiet (suppress non-error output)
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show all tweets, newest first
    Feed(FeedArgs),

    /// Show the connected account's tweets and profile
    Mine(FeedArgs),

    /// Post a new tweet
    Post(PostArgs),

    /// Edit one of your tweets
    Edit(EditArgs),

    /// Delete one of your tweets
    Delete(DeleteArgs),

    /// Like a tweet
    Like(TweetRef),

    /// Remove your like from a tweet
    Unlike(TweetRef),

    /// List who liked a tweet
    Likes(TweetRef),

    /// Comment on a tweet
    Comment(CommentArgs),

    /// List comments on a tweet
    Comments(TweetRef),

    /// Show or update a profile
    Profile(ProfileArgs),

    /// List the accounts the wallet can sign with
    Accounts,

    /// Connect the wallet and show the active account
    Connect,

    /// Show or manage configuration
    Config(ConfigArgs),

    /// Start an interactive session
    Shell,

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args, Debug, Clone)]
pub struct FeedArgs {
    /// Maximum number of tweets to show
    #[arg(long, short = 'n')]
    pub limit: Option<usize>,
}

#[derive(Args, Debug, Clone)]
pub struct PostArgs {
    /// Tweet text (at most 280 characters)
    pub content: String,
}

#[derive(Args, Debug, Clone)]
pub struct EditArgs {
    /// Tweet id
    pub id: TweetId,

    /// New tweet text
    pub content: String,
}

#[derive(Args, Debug, Clone)]
pub struct DeleteArgs {
    /// Tweet id
    pub id: TweetId,

    /// Skip the confirmation prompt
    #[arg(long, short = 'y')]
    pub yes: bool,
}

#[derive(Args, Debug, Clone)]
pub struct TweetRef {
    /// Tweet id
    pub id: TweetId,
}

#[derive(Args, Debug, Clone)]
pub struct CommentArgs {
    /// Tweet id
    pub id: TweetId,

    /// Comment text
    pub content: String,
}

#[derive(Args, Debug, Clone)]
pub struct ProfileArgs {
    #[command(subcommand)]
    pub action: Option<ProfileAction>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ProfileAction {
    /// Show a profile (defaults to the connected account)
    Show {
        /// Account address
        account: Option<Account>,
    },

    /// Create or update your profile
    Set {
        /// Display name
        #[arg(long)]
        name: String,

        /// Short bio
        #[arg(long, default_value = "")]
        bio: String,

        /// Avatar image URL
        #[arg(long, default_value = "")]
        image: String,
    },
}

#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

#[derive(Subcommand, Debug, Clone, Copy)]
pub enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Print the user config file path
    Path,
    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Args, Debug, Clone)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    JsonPretty,
}

impl OutputFormat {
    /// Parse a config-file value, falling back to text.
    #[must_use]
    pub fn from_config(value: &str) -> Self {
        <Self as ValueEnum>::from_str(value, true).unwrap_or_default()
    }

    #[must_use]
    pub const fn is_json(self) -> bool {
        matches!(self, Self::Json | Self::JsonPretty)
    }
}
