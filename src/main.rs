//! dtweet - on-chain social feed CLI
//!
//! Main entry point for the dtweet command-line tool.

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use colored::Colorize;
use std::io::{self, BufRead, Write};
use std::process::ExitCode;
use tracing::debug;

use dtweet::cli::{
    CommentArgs, ConfigAction, DeleteArgs, EditArgs, FeedArgs, ProfileAction, TweetRef,
};
use dtweet::logging::{LogConfig, init_logging};
use dtweet::render::{self, ProfileEntry, with_spinner};
use dtweet::{
    Action, AppContext, CONTENT_DIVIDER_WIDTH, Cli, Commands, Config, DisplayProfile, DtweetError,
    OutputFormat, Profile, Receipt, TweetId, format_error, format_number_u64, repl,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report(&e);
            ExitCode::FAILURE
        }
    }
}

fn report(error: &anyhow::Error) {
    if let Some(e) = error.downcast_ref::<DtweetError>() {
        let suggestions: Vec<&str> = e.suggestion().into_iter().collect();
        eprintln!("{}", format_error(&e.user_message(), "", &suggestions));
    } else {
        eprintln!("{} {error:#}", "Error:".red().bold());
    }
}

/// Per-invocation output settings.
struct Output {
    format: OutputFormat,
    quiet: bool,
    width: usize,
}

impl Output {
    fn spinners(&self) -> bool {
        !self.quiet && !self.format.is_json()
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = Config::load_with(cli.config.as_deref())?;
    if let Some(ledger) = &cli.ledger {
        config.ledger.path = Some(ledger.clone());
    }
    if let Some(backend) = cli.backend {
        config.network.backend = backend;
    }

    let quiet = cli.quiet || config.output.quiet;
    init_logging(&LogConfig::from_flags(quiet, cli.verbose).with_colors(config.output.colors));
    if !config.output.colors {
        colored::control::set_override(false);
    }

    let out = Output {
        format: cli
            .format
            .unwrap_or_else(|| OutputFormat::from_config(&config.output.format)),
        quiet,
        width: config.output.wrap_width,
    };

    // Commands that never touch the contract
    match &cli.command {
        Commands::Config(args) => return cmd_config(&config, args.action, &out),
        Commands::Completions(args) => {
            let mut cmd = Cli::command();
            generate(args.shell, &mut cmd, "dtweet", &mut io::stdout());
            return Ok(());
        }
        _ => {}
    }

    let mut ctx = AppContext::open(config, cli.account.as_ref()).await?;

    match cli.command {
        Commands::Feed(args) => cmd_feed(&mut ctx, &args, &out).await,
        Commands::Mine(args) => cmd_mine(&mut ctx, &args, &out).await,
        Commands::Post(args) => cmd_post(&mut ctx, &args.content, &out).await,
        Commands::Edit(args) => cmd_edit(&mut ctx, &args, &out).await,
        Commands::Delete(args) => cmd_delete(&mut ctx, &args, &out).await,
        Commands::Like(TweetRef { id }) => cmd_like(&mut ctx, id, true, &out).await,
        Commands::Unlike(TweetRef { id }) => cmd_like(&mut ctx, id, false, &out).await,
        Commands::Likes(TweetRef { id }) => cmd_likes(&mut ctx, id, &out).await,
        Commands::Comment(args) => cmd_comment(&mut ctx, &args, &out).await,
        Commands::Comments(TweetRef { id }) => cmd_comments(&mut ctx, id, &out).await,
        Commands::Profile(args) => cmd_profile(&mut ctx, args.action, &out).await,
        Commands::Accounts => cmd_accounts(&ctx, &out),
        Commands::Connect => cmd_connect(&mut ctx, &out).await,
        Commands::Shell => {
            // Reads work without a wallet; the shell reports connect failures itself.
            if let Err(e) = ctx.connect().await {
                debug!(error = %e, "Starting shell disconnected");
            }
            repl::run(ctx).await
        }
        Commands::Config(_) | Commands::Completions(_) => Ok(()),
    }
}

/// Connect if possible; reads still work without an account.
async fn try_connect(ctx: &mut AppContext) {
    if let Err(e) = ctx.connect().await {
        debug!(error = %e, "Continuing without a connected wallet");
    }
}

async fn cmd_feed(ctx: &mut AppContext, args: &FeedArgs, out: &Output) -> Result<()> {
    try_connect(ctx).await;
    ctx.refresh_feed().await?;
    let feed = ctx.feed();
    if out.format.is_json() {
        let entries = render::feed_entries(feed, |id| ctx.is_liked(id), args.limit);
        render::print_json(out.format, &entries)?;
    } else {
        render::print_feed(feed, |id| ctx.is_liked(id), out.width, args.limit);
    }
    Ok(())
}

async fn cmd_mine(ctx: &mut AppContext, args: &FeedArgs, out: &Output) -> Result<()> {
    let account = ctx.connect().await?;
    ctx.refresh_feed().await?;
    ctx.refresh_user_tweets().await?;
    let feed = ctx.user_feed();
    let profile = feed.profile_of(&account);

    if out.format.is_json() {
        let entries = render::feed_entries(feed, |id| ctx.is_liked(id), args.limit);
        let body = serde_json::json!({
            "address": account,
            "profile": profile,
            "tweets": entries,
        });
        render::print_json(out.format, &body)?;
        return Ok(());
    }

    let exists = ctx.own_profile().is_some_and(Profile::exists);
    render::print_profile(&account, &profile, exists);
    println!();
    render::print_feed(feed, |id| ctx.is_liked(id), out.width, args.limit);
    Ok(())
}

fn print_receipt(out: &Output, message: &str, receipt: &Receipt) -> Result<()> {
    if out.format.is_json() {
        render::print_json(out.format, receipt)?;
    } else if !out.quiet {
        render::print_receipt(message, receipt);
    }
    Ok(())
}

async fn cmd_post(ctx: &mut AppContext, content: &str, out: &Output) -> Result<()> {
    ctx.connect().await?;
    let states = ctx.watch_flow(Action::PostTweet);
    let receipt = with_spinner(out.spinners(), "Posting tweet", states, ctx.post_tweet(content))
        .await?;
    print_receipt(out, "Tweet posted successfully!", &receipt)
}

async fn cmd_edit(ctx: &mut AppContext, args: &EditArgs, out: &Output) -> Result<()> {
    ctx.connect().await?;
    let states = ctx.watch_flow(Action::EditTweet);
    let receipt = with_spinner(
        out.spinners(),
        "Saving edit",
        states,
        ctx.edit_tweet(args.id, &args.content),
    )
    .await?;
    print_receipt(out, "Tweet updated successfully!", &receipt)
}

async fn cmd_delete(ctx: &mut AppContext, args: &DeleteArgs, out: &Output) -> Result<()> {
    ctx.connect().await?;
    if !args.yes && !confirm(&format!("Are you sure you want to delete tweet #{}?", args.id))? {
        println!("{}", "Cancelled.".yellow());
        return Ok(());
    }
    let states = ctx.watch_flow(Action::DeleteTweet);
    let receipt = with_spinner(out.spinners(), "Deleting tweet", states, ctx.delete_tweet(args.id))
        .await?;
    print_receipt(out, "Tweet deleted successfully!", &receipt)
}

async fn cmd_like(ctx: &mut AppContext, id: TweetId, like: bool, out: &Output) -> Result<()> {
    ctx.connect().await?;
    let states = ctx.watch_flow(Action::ToggleLike);
    let (label, message) = if like {
        ("Liking", "Tweet liked!")
    } else {
        ("Removing like", "Like removed.")
    };
    let receipt = if like {
        with_spinner(out.spinners(), label, states, ctx.like(id)).await?
    } else {
        with_spinner(out.spinners(), label, states, ctx.unlike(id)).await?
    };
    print_receipt(out, message, &receipt)?;
    if !out.format.is_json() && !out.quiet {
        if let Some(tweet) = ctx.feed().find(id) {
            println!("  {} {}", "♥".red(), format_number_u64(tweet.like_count));
        }
    }
    Ok(())
}

async fn cmd_likes(ctx: &mut AppContext, id: TweetId, out: &Output) -> Result<()> {
    let likers = ctx.likes(id).await?;
    if out.format.is_json() {
        render::print_json(out.format, &likers)?;
    } else {
        render::print_likers(id, &likers);
    }
    Ok(())
}

async fn cmd_comment(ctx: &mut AppContext, args: &CommentArgs, out: &Output) -> Result<()> {
    ctx.connect().await?;
    let states = ctx.watch_flow(Action::PostComment);
    let receipt = with_spinner(
        out.spinners(),
        "Posting comment",
        states,
        ctx.post_comment(args.id, &args.content),
    )
    .await?;
    print_receipt(out, "Comment posted!", &receipt)?;
    if !out.format.is_json() && !out.quiet {
        println!();
        let comments = ctx.comments(args.id).await?;
        render::print_comments(args.id, &comments, out.width);
    }
    Ok(())
}

async fn cmd_comments(ctx: &mut AppContext, id: TweetId, out: &Output) -> Result<()> {
    let comments = ctx.comments(id).await?;
    if out.format.is_json() {
        render::print_json(out.format, &comments)?;
    } else {
        render::print_comments(id, &comments, out.width);
    }
    Ok(())
}

async fn cmd_profile(
    ctx: &mut AppContext,
    action: Option<ProfileAction>,
    out: &Output,
) -> Result<()> {
    match action.unwrap_or(ProfileAction::Show { account: None }) {
        ProfileAction::Show { account } => {
            let account = match account {
                Some(account) => account,
                None => ctx.connect().await?,
            };
            let raw = ctx
                .gateway()
                .reader()
                .get_profile(&account)
                .await
                .with_context(|| format!("Failed to load profile for {account}"))?;
            let exists = raw.exists();
            let profile = DisplayProfile::from_profile(&account, raw);
            if out.format.is_json() {
                render::print_json(
                    out.format,
                    &ProfileEntry {
                        address: &account,
                        profile: &profile,
                        exists,
                    },
                )?;
            } else {
                render::print_profile(&account, &profile, exists);
            }
            Ok(())
        }
        ProfileAction::Set { name, bio, image } => {
            ctx.connect().await?;
            let states = ctx.watch_flow(Action::SaveProfile);
            let receipt = with_spinner(
                out.spinners(),
                "Saving profile",
                states,
                ctx.save_profile(&name, &bio, &image),
            )
            .await?;
            print_receipt(out, "Profile updated successfully!", &receipt)
        }
    }
}

fn cmd_accounts(ctx: &AppContext, out: &Output) -> Result<()> {
    let accounts = ctx.available_accounts();
    if out.format.is_json() {
        render::print_json(out.format, &accounts)?;
        return Ok(());
    }
    if accounts.is_empty() {
        println!("{}", "No accounts available.".yellow());
    }
    for (i, account) in accounts.iter().enumerate() {
        let marker = if i == 0 { "*".green() } else { " ".normal() };
        println!("{marker} {account}");
    }
    Ok(())
}

async fn cmd_connect(ctx: &mut AppContext, out: &Output) -> Result<()> {
    let account = ctx.connect().await?;
    let profile = ctx.profile_of(&account).await;
    if out.format.is_json() {
        render::print_json(
            out.format,
            &serde_json::json!({ "address": account, "name": profile.name }),
        )?;
    } else {
        println!(
            "{} Connected as {} {}",
            "✓".green(),
            profile.name.bold(),
            account.short().dimmed()
        );
        if let Some(path) = ctx.ledger().and_then(|ledger| ledger.path()) {
            println!("  {} {}", "Ledger:".dimmed(), path.display());
        }
    }
    Ok(())
}

fn cmd_config(config: &Config, action: Option<ConfigAction>, out: &Output) -> Result<()> {
    match action.unwrap_or(ConfigAction::Show) {
        ConfigAction::Show => {
            let shown = config.redacted();
            if out.format.is_json() {
                render::print_json(out.format, &shown)?;
            } else {
                println!("{}", "Current Configuration".bold().cyan());
                println!("{}", "─".repeat(CONTENT_DIVIDER_WIDTH));
                println!("  {:<18} {}", "Backend:", shown.network.backend);
                println!("  {:<18} {}", "RPC URL:", shown.network.rpc_url);
                let address = match config.contract_address() {
                    Ok(address) => address.to_string(),
                    Err(_) => "not set".red().to_string(),
                };
                println!("  {:<18} {address}", "Contract:");
                println!("  {:<18} {}", "Ledger:", config.ledger_path().display());
                println!("  {:<18} {}", "Panel cache:", shown.social.cache_capacity);
                println!("  {:<18} {}", "Format:", shown.output.format);
            }
        }
        ConfigAction::Path => match Config::user_config_path() {
            Some(path) => println!("{}", path.display()),
            None => anyhow::bail!("Could not determine config directory"),
        },
        ConfigAction::Init { force } => {
            let path = Config::user_config_path().context("Could not determine config directory")?;
            if path.exists() && !force {
                anyhow::bail!(
                    "Config file already exists at {} (use --force to overwrite)",
                    path.display()
                );
            }
            Config::default()
                .save()
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("{} Wrote {}", "✓".green(), path.display());
        }
    }
    Ok(())
}

fn confirm(question: &str) -> Result<bool> {
    print!("{question} [y/N] ");
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}
