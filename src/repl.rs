//! Interactive shell for dtweet.
//!
//! Provides a command-driven session over one [`AppContext`], with history,
//! a prompt that follows the connected account, and help.

use anyhow::{Context, Result};
use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{CompletionType, Config, EditMode, Editor};
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::app::AppContext;
use crate::error::{Action, DtweetError, format_error, format_unknown_value_error};
use crate::model::{Account, TweetId};
use crate::render::{self, with_spinner};
use crate::{format_length_counter, format_number_u64};

const COMMANDS: &[&str] = &[
    "feed", "mine", "post", "edit", "delete", "like", "unlike", "likes", "comments", "comment",
    "refresh", "profile", "switch", "connect", "disconnect", "accounts", "help", "quit",
];

/// Profile field updated by `profile <field> <value>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProfileField {
    Name,
    Bio,
    Image,
}

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Feed { limit: Option<usize> },
    Mine,
    Post { content: String },
    Edit { id: TweetId, content: String },
    Delete { id: TweetId },
    Like { id: TweetId },
    Unlike { id: TweetId },
    Likes { id: TweetId },
    Comments { id: TweetId },
    Comment { id: TweetId, content: String },
    Refresh,
    Profile { account: Option<Account> },
    SetProfile { field: ProfileField, value: String },
    Switch { target: String },
    Connect,
    Disconnect,
    Accounts,
    Help { command: Option<String> },
    Quit,
}

/// Shell session state.
struct ReplSession {
    ctx: AppContext,
    width: usize,
}

/// Run the shell until `quit` or end of input.
///
/// # Errors
///
/// Returns an error if readline setup or history persistence fails.
/// Command failures are printed and the session continues.
pub async fn run(ctx: AppContext) -> Result<()> {
    let config = Config::builder()
        .history_ignore_space(true)
        .history_ignore_dups(true)?
        .completion_type(CompletionType::List)
        .edit_mode(EditMode::Emacs)
        .build();

    let mut rl: Editor<(), DefaultHistory> = Editor::with_config(config)?;

    let history_path = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".dtweet_history");

    let width = ctx.config().output.wrap_width;
    let mut session = ReplSession { ctx, width };

    if let Err(e) = rl.load_history(&history_path) {
        debug!(error = %e, "No shell history loaded");
    }

    info!("Starting dtweet shell");
    println!(
        "{}",
        "dtweet interactive mode. Type 'help' for commands, 'quit' to exit.".cyan()
    );
    println!();

    loop {
        // Let the account listener deliver wallet notifications.
        tokio::task::yield_now().await;
        if session.ctx.account_changed() {
            session.ctx.sync_account().await;
            session.announce_account();
        }

        let prompt = session.format_prompt();
        match rl.readline(&prompt) {
            Ok(line) => {
                // Trailing text is tweet content; only leading blanks go.
                let line = line.trim_start();
                if line.trim_end().is_empty() {
                    continue;
                }

                if !matches!(line.trim_end(), "quit" | "exit" | "q") {
                    rl.add_history_entry(line)?;
                }

                debug!(command = %line, "Shell command");
                match session.execute(line).await {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(e) => {
                        warn!(error = %e, "Shell command failed");
                        report(&e);
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
            }
            Err(ReadlineError::Eof) => {
                println!();
                break;
            }
            Err(e) => {
                return Err(anyhow::anyhow!(e)).context("Readline failed");
            }
        }
    }

    rl.save_history(&history_path)?;
    info!("Ended dtweet shell");
    println!("Goodbye!");
    Ok(())
}

fn report(error: &anyhow::Error) {
    match error.downcast_ref::<DtweetError>() {
        Some(e) => {
            let suggestions: Vec<&str> = e.suggestion().into_iter().collect();
            eprintln!("{}", format_error(&e.user_message(), "", &suggestions));
        }
        None => eprintln!("{}: {error}", "Error".red()),
    }
}

impl ReplSession {
    fn format_prompt(&self) -> String {
        match self.ctx.account() {
            Some(account) => {
                let name = self
                    .ctx
                    .own_profile()
                    .filter(|p| p.exists())
                    .map_or_else(|| account.short(), |p| p.name.clone());
                format!("dtweet [{name}]> ")
            }
            None => "dtweet (disconnected)> ".to_string(),
        }
    }

    fn announce_account(&self) {
        match self.ctx.account() {
            Some(account) => println!("{} Active account: {account}", "→".cyan()),
            None => println!("{}", "Wallet disconnected.".yellow()),
        }
    }

    async fn execute(&mut self, input: &str) -> Result<bool> {
        let command = parse_command(input)?;
        match command {
            Command::Feed { limit } => {
                self.ctx.refresh_feed().await?;
                let ctx = &self.ctx;
                render::print_feed(ctx.feed(), |id| ctx.is_liked(id), self.width, limit);
            }
            Command::Mine => {
                let account = self.ctx.session().require_account()?;
                self.ctx.refresh_user_tweets().await?;
                let ctx = &self.ctx;
                let exists = ctx.own_profile().is_some_and(crate::model::Profile::exists);
                render::print_profile(&account, &ctx.user_feed().profile_of(&account), exists);
                println!();
                render::print_feed(ctx.user_feed(), |id| ctx.is_liked(id), self.width, None);
            }
            Command::Post { content } => {
                println!("{}", format_length_counter(&content).dimmed());
                let states = self.ctx.watch_flow(Action::PostTweet);
                let receipt =
                    with_spinner(true, "Posting tweet", states, self.ctx.post_tweet(&content))
                        .await?;
                render::print_receipt("Tweet posted successfully!", &receipt);
            }
            Command::Edit { id, content } => {
                let states = self.ctx.watch_flow(Action::EditTweet);
                let receipt =
                    with_spinner(true, "Saving edit", states, self.ctx.edit_tweet(id, &content))
                        .await?;
                render::print_receipt("Tweet updated successfully!", &receipt);
            }
            Command::Delete { id } => {
                let states = self.ctx.watch_flow(Action::DeleteTweet);
                let receipt =
                    with_spinner(true, "Deleting tweet", states, self.ctx.delete_tweet(id)).await?;
                render::print_receipt("Tweet deleted successfully!", &receipt);
            }
            Command::Like { id } => {
                let states = self.ctx.watch_flow(Action::ToggleLike);
                let liked =
                    with_spinner(true, "Updating like", states, self.ctx.toggle_like(id)).await?;
                self.print_like_status(id, liked);
            }
            Command::Unlike { id } => {
                let states = self.ctx.watch_flow(Action::ToggleLike);
                with_spinner(true, "Removing like", states, self.ctx.unlike(id)).await?;
                self.print_like_status(id, false);
            }
            Command::Likes { id } => {
                let likers = self.ctx.likes(id).await?;
                render::print_likers(id, &likers);
            }
            Command::Comments { id } => {
                let comments = self.ctx.comments(id).await?;
                render::print_comments(id, &comments, self.width);
            }
            Command::Comment { id, content } => {
                let states = self.ctx.watch_flow(Action::PostComment);
                with_spinner(
                    true,
                    "Posting comment",
                    states,
                    self.ctx.post_comment(id, &content),
                )
                .await?;
                let comments = self.ctx.comments(id).await?;
                render::print_comments(id, &comments, self.width);
            }
            Command::Refresh => {
                self.ctx.refresh_all().await?;
                println!(
                    "{} {} tweets loaded",
                    "✓".green(),
                    format_number_u64(self.ctx.feed().len() as u64)
                );
            }
            Command::Profile { account } => {
                let account = match account {
                    Some(account) => account,
                    None => self.ctx.session().require_account()?,
                };
                let raw = self.ctx.gateway().reader().get_profile(&account).await?;
                let exists = raw.exists();
                let profile = crate::model::DisplayProfile::from_profile(&account, raw);
                render::print_profile(&account, &profile, exists);
            }
            Command::SetProfile { field, value } => self.set_profile_field(field, &value).await?,
            Command::Switch { target } => {
                let account = self.resolve_account(&target)?;
                self.ctx.switch_account(&account).await?;
                self.announce_account();
            }
            Command::Connect => {
                let account = self.ctx.connect().await?;
                println!("{} Connected as {account}", "✓".green());
            }
            Command::Disconnect => {
                self.ctx.disconnect();
                self.announce_account();
            }
            Command::Accounts => {
                let active = self.ctx.account();
                for (i, account) in self.ctx.available_accounts().iter().enumerate() {
                    let marker = if active.as_ref() == Some(account) {
                        "*".green()
                    } else {
                        " ".normal()
                    };
                    println!("{marker} {i}  {account}");
                }
            }
            Command::Help { command } => {
                print_help(command.as_deref());
            }
            Command::Quit => return Ok(false),
        }
        Ok(true)
    }

    fn print_like_status(&self, id: TweetId, liked: bool) {
        let count = self.ctx.feed().find(id).map_or(0, |t| t.like_count);
        let heart = if liked { "♥".red() } else { "♡".normal() };
        println!("{heart} {} · tweet #{id}", format_number_u64(count));
    }

    /// Update one profile field, keeping the others as currently stored.
    async fn set_profile_field(&mut self, field: ProfileField, value: &str) -> Result<()> {
        let current = self.ctx.load_profile().await?;
        let (mut name, mut bio, mut image) = (current.name, current.bio, current.image);
        match field {
            ProfileField::Name => name = value.to_string(),
            ProfileField::Bio => bio = value.to_string(),
            ProfileField::Image => image = value.to_string(),
        }
        let states = self.ctx.watch_flow(Action::SaveProfile);
        let receipt = with_spinner(
            true,
            "Saving profile",
            states,
            self.ctx.save_profile(&name, &bio, &image),
        )
        .await?;
        render::print_receipt("Profile updated successfully!", &receipt);
        Ok(())
    }

    /// An account address, or an index into `accounts`.
    fn resolve_account(&self, target: &str) -> Result<Account> {
        if let Ok(index) = target.parse::<usize>() {
            let accounts = self.ctx.available_accounts();
            return accounts.get(index).cloned().with_context(|| {
                format!("No account at index {index} ({} available)", accounts.len())
            });
        }
        Ok(target.parse()?)
    }
}

/// Split off the first word. The remainder keeps its inner spacing and
/// loses only the whitespace separating it from the word.
fn split_word(text: &str) -> (&str, &str) {
    match text.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim_start()),
        None => (text, ""),
    }
}

/// Leading tweet id, plus whatever follows it.
fn parse_id<'a>(args: &'a str, usage: &str) -> Result<(TweetId, &'a str)> {
    let (raw, rest) = split_word(args);
    if raw.is_empty() {
        anyhow::bail!("Usage: {usage}");
    }
    let id = raw
        .parse()
        .with_context(|| format!("Invalid tweet id '{raw}'. Usage: {usage}"))?;
    Ok((id, rest))
}

fn text(args: &str, usage: &str) -> Result<String> {
    if args.trim().is_empty() {
        anyhow::bail!("Usage: {usage}");
    }
    Ok(args.to_string())
}

fn parse_command(input: &str) -> Result<Command> {
    let (word, args) = split_word(input.trim_start());
    let first_arg = || Some(split_word(args).0).filter(|w| !w.is_empty());

    match word {
        "" => anyhow::bail!("Empty command"),
        "feed" | "f" => {
            let limit = match first_arg() {
                Some(n) => Some(n.parse().with_context(|| format!("Invalid count '{n}'"))?),
                None => None,
            };
            Ok(Command::Feed { limit })
        }
        "mine" | "me" => Ok(Command::Mine),
        "post" | "p" => Ok(Command::Post {
            content: text(args, "post <text>")?,
        }),
        "edit" => {
            let usage = "edit <id> <text>";
            let (id, rest) = parse_id(args, usage)?;
            Ok(Command::Edit {
                id,
                content: text(rest, usage)?,
            })
        }
        "delete" | "rm" => Ok(Command::Delete {
            id: parse_id(args, "delete <id>")?.0,
        }),
        "like" => Ok(Command::Like {
            id: parse_id(args, "like <id>")?.0,
        }),
        "unlike" => Ok(Command::Unlike {
            id: parse_id(args, "unlike <id>")?.0,
        }),
        "likes" => Ok(Command::Likes {
            id: parse_id(args, "likes <id>")?.0,
        }),
        "comments" | "c" => Ok(Command::Comments {
            id: parse_id(args, "comments <id>")?.0,
        }),
        "comment" => {
            let usage = "comment <id> <text>";
            let (id, rest) = parse_id(args, usage)?;
            Ok(Command::Comment {
                id,
                content: text(rest, usage)?,
            })
        }
        "refresh" | "r" => Ok(Command::Refresh),
        "profile" => {
            let (target, value) = split_word(args);
            match target {
                "" => Ok(Command::Profile { account: None }),
                "name" => Ok(Command::SetProfile {
                    field: ProfileField::Name,
                    value: text(value, "profile name <value>")?,
                }),
                // Clearing the bio or image is allowed.
                "bio" => Ok(Command::SetProfile {
                    field: ProfileField::Bio,
                    value: value.to_string(),
                }),
                "image" => Ok(Command::SetProfile {
                    field: ProfileField::Image,
                    value: value.trim_end().to_string(),
                }),
                address => Ok(Command::Profile {
                    account: Some(address.parse()?),
                }),
            }
        }
        "switch" => Ok(Command::Switch {
            target: text(args.trim_end(), "switch <address|index>")?,
        }),
        "connect" => Ok(Command::Connect),
        "disconnect" => Ok(Command::Disconnect),
        "accounts" => Ok(Command::Accounts),
        "help" | "h" | "?" => Ok(Command::Help {
            command: first_arg().map(ToString::to_string),
        }),
        "quit" | "exit" | "q" => Ok(Command::Quit),
        other => anyhow::bail!(format_unknown_value_error("command", other, COMMANDS)),
    }
}

fn print_help(command: Option<&str>) {
    match command {
        Some("feed") => println!("feed [n]                 - show the newest tweets"),
        Some("post") => println!("post <text>              - post a tweet (280 characters max)"),
        Some("edit") => println!("edit <id> <text>         - edit one of your tweets"),
        Some("delete") => println!("delete <id>              - delete one of your tweets"),
        Some("like" | "unlike") => {
            println!("like <id>                - like a tweet, or remove your like");
            println!("unlike <id>              - remove your like");
        }
        Some("profile") => {
            println!("profile [address]        - show a profile");
            println!("profile name <text>      - set your display name");
            println!("profile bio <text>       - set your bio");
            println!("profile image <url>      - set your avatar");
        }
        Some("switch") => {
            println!("switch <address|index>   - make another wallet account active");
        }
        Some("quit" | "exit") => println!("quit                     - exit the shell"),
        _ => {
            println!("{}", "Commands:".bold().cyan());
            println!("  feed [n]                 - show the newest tweets");
            println!("  mine                     - your profile and tweets");
            println!("  post <text>              - post a tweet");
            println!("  edit <id> <text>         - edit one of your tweets");
            println!("  delete <id>              - delete one of your tweets");
            println!("  like <id>                - toggle your like");
            println!("  unlike <id>              - remove your like");
            println!("  likes <id>               - who liked a tweet");
            println!("  comments <id>            - comments on a tweet");
            println!("  comment <id> <text>      - comment on a tweet");
            println!("  refresh                  - reload everything");
            println!("  profile [address]        - show a profile");
            println!("  profile name|bio|image   - update your profile");
            println!("  switch <address|index>   - change the active account");
            println!("  accounts                 - list wallet accounts");
            println!("  connect / disconnect     - manage the wallet connection");
            println!("  help [command]           - show help");
            println!("  quit                     - exit");
        }
    }
}
