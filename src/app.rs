//! Application context.
//!
//! [`AppContext`] owns everything a session needs: configuration, the
//! gateway, the wallet session, the assembled feeds, the liked-status map,
//! the social panels and the mutation flows. Mutations go through it so that
//! every confirmed write is followed by a refetch of the lists it affects.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::{Backend, Config};
use crate::contract::{Receipt, TwitterContract};
use crate::error::{Action, DtweetError, Result};
use crate::feed::{Feed, FeedAssembler, resolve_or_default};
use crate::flows::{FlowState, Mutations};
use crate::gateway::ContractGateway;
use crate::ledger::LocalLedger;
use crate::logging::OperationGuard;
use crate::model::{Account, CommentView, DisplayProfile, Liker, Profile, TweetId};
use crate::social::SocialPanels;
use crate::wallet::{AccountListener, LocalWallet, WalletProvider, WalletSession};

/// How long `switch_account` waits for the wallet notification to land.
const SWITCH_TIMEOUT: Duration = Duration::from_secs(2);

/// A contract with the wallet that signs for it.
pub struct Connection {
    pub contract: Arc<dyn TwitterContract>,
    pub wallet: Option<Arc<dyn WalletProvider>>,
    /// Set for the local backend, where accounts can be switched.
    pub local_wallet: Option<Arc<LocalWallet>>,
    pub ledger: Option<Arc<LocalLedger>>,
}

impl Connection {
    /// Local ledger with a local wallet.
    #[must_use]
    pub fn local(ledger: Arc<LocalLedger>, accounts: Vec<Account>) -> Self {
        let wallet = Arc::new(LocalWallet::new(accounts));
        Self {
            contract: ledger.clone(),
            wallet: Some(wallet.clone()),
            local_wallet: Some(wallet),
            ledger: Some(ledger),
        }
    }
}

/// Move `preferred` to the front of `accounts`, adding it if absent.
#[must_use]
pub fn prefer_account(mut accounts: Vec<Account>, preferred: Option<&Account>) -> Vec<Account> {
    if let Some(preferred) = preferred {
        accounts.retain(|a| a != preferred);
        accounts.insert(0, preferred.clone());
    }
    accounts
}

/// Open the configured backend.
///
/// # Errors
///
/// Fails when the ledger file is unreadable, a configured account is
/// malformed, or the evm backend is unavailable or misconfigured.
pub async fn open_backend(config: &Config, account: Option<&Account>) -> Result<Connection> {
    config.check_contract_address();
    match config.network.backend {
        Backend::Local => {
            let path = config.ledger_path();
            let ledger = LocalLedger::open(&path)?.with_gas_fee(config.ledger.gas_fee);
            let accounts = prefer_account(config.local_accounts()?, account);
            debug!(ledger = %path.display(), accounts = accounts.len(), "Opened local backend");
            Ok(Connection::local(Arc::new(ledger), accounts))
        }
        Backend::Evm => open_evm(config, account).await,
    }
}

#[cfg(feature = "evm")]
async fn open_evm(config: &Config, account: Option<&Account>) -> Result<Connection> {
    let (contract, wallet) = crate::evm::open(config).await?;
    if let Some(requested) = account {
        if requested != contract.signer() {
            return Err(DtweetError::WalletRejected {
                reason: format!("{requested} is not the configured signer"),
            });
        }
    }
    Ok(Connection {
        contract,
        wallet: Some(wallet),
        local_wallet: None,
        ledger: None,
    })
}

#[cfg(not(feature = "evm"))]
async fn open_evm(config: &Config, _account: Option<&Account>) -> Result<Connection> {
    config.contract_address()?;
    Err(DtweetError::BackendUnavailable {
        backend: "evm",
        reason: "this build does not include the 'evm' feature".to_string(),
    })
}

/// Session state shared by the CLI and the shell.
pub struct AppContext {
    config: Config,
    gateway: ContractGateway,
    session: Arc<WalletSession>,
    assembler: FeedAssembler,
    panels: SocialPanels,
    mutations: Mutations,
    local_wallet: Option<Arc<LocalWallet>>,
    ledger: Option<Arc<LocalLedger>>,
    feed: Feed,
    user_feed: Feed,
    liked: HashMap<TweetId, bool>,
    own_profile: Option<Profile>,
    account_rx: watch::Receiver<Option<Account>>,
    _listener: Option<AccountListener>,
}

impl AppContext {
    /// Build a context over `connection`. Must run inside a tokio runtime.
    #[must_use]
    pub fn new(config: Config, connection: Connection) -> Self {
        let gateway = ContractGateway::new(connection.contract);
        let session = Arc::new(WalletSession::new(connection.wallet));
        let listener = session.listen();
        let account_rx = session.watch();
        Self {
            assembler: FeedAssembler::new(gateway.reader()),
            panels: SocialPanels::new(gateway.reader(), config.social.cache_capacity),
            mutations: Mutations::new(gateway.clone()),
            gateway,
            session,
            local_wallet: connection.local_wallet,
            ledger: connection.ledger,
            feed: Feed::default(),
            user_feed: Feed::default(),
            liked: HashMap::new(),
            own_profile: None,
            account_rx,
            _listener: listener,
            config,
        }
    }

    /// Open the configured backend and build a context over it.
    ///
    /// # Errors
    ///
    /// See [`open_backend`].
    pub async fn open(config: Config, account: Option<&Account>) -> Result<Self> {
        let connection = open_backend(&config, account).await?;
        Ok(Self::new(config, connection))
    }

    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub const fn gateway(&self) -> &ContractGateway {
        &self.gateway
    }

    #[must_use]
    pub fn session(&self) -> &WalletSession {
        &self.session
    }

    #[must_use]
    pub fn ledger(&self) -> Option<&Arc<LocalLedger>> {
        self.ledger.as_ref()
    }

    #[must_use]
    pub fn account(&self) -> Option<Account> {
        self.session.account()
    }

    /// Accounts the wallet can sign with.
    #[must_use]
    pub fn available_accounts(&self) -> Vec<Account> {
        self.session.available_accounts()
    }

    #[must_use]
    pub const fn feed(&self) -> &Feed {
        &self.feed
    }

    #[must_use]
    pub const fn user_feed(&self) -> &Feed {
        &self.user_feed
    }

    /// The connected account's raw profile, as last loaded.
    #[must_use]
    pub const fn own_profile(&self) -> Option<&Profile> {
        self.own_profile.as_ref()
    }

    /// Liked status of `tweet_id` for the connected account, as last loaded.
    #[must_use]
    pub fn is_liked(&self, tweet_id: TweetId) -> bool {
        self.liked.get(&tweet_id).copied().unwrap_or(false)
    }

    #[must_use]
    pub fn flow_state(&self, action: Action) -> FlowState {
        self.mutations
            .flow(action)
            .map_or(FlowState::Idle, crate::flows::MutationFlow::state)
    }

    /// Observe the state of the flow behind `action`.
    #[must_use]
    pub fn watch_flow(&self, action: Action) -> Option<watch::Receiver<FlowState>> {
        self.mutations.flow(action).map(crate::flows::MutationFlow::watch)
    }

    #[must_use]
    pub const fn panels(&self) -> &SocialPanels {
        &self.panels
    }

    // =========================================================================
    // Wallet
    // =========================================================================

    /// Connect the wallet and load account-dependent state.
    ///
    /// # Errors
    ///
    /// Propagates wallet failures; the session stays disconnected.
    pub async fn connect(&mut self) -> Result<Account> {
        let account = self.session.connect().await?;
        self.sync_account().await;
        Ok(account)
    }

    /// Forget the connected account locally.
    pub fn disconnect(&mut self) {
        self.session.disconnect();
        self.account_rx.borrow_and_update();
        self.clear_account_state();
    }

    /// Make `account` the wallet's active account, as a user switching
    /// accounts in the wallet would. Only the local wallet supports this.
    ///
    /// # Errors
    ///
    /// Returns [`DtweetError::BackendUnavailable`] for wallets that cannot
    /// switch accounts.
    pub async fn switch_account(&mut self, account: &Account) -> Result<()> {
        let wallet = self
            .local_wallet
            .clone()
            .ok_or_else(|| DtweetError::BackendUnavailable {
                backend: "wallet",
                reason: "this wallet cannot switch accounts".to_string(),
            })?;
        let mut rx = self.session.watch();
        wallet.switch_accounts(prefer_account(wallet.accounts(), Some(account)));
        if tokio::time::timeout(SWITCH_TIMEOUT, rx.changed()).await.is_err() {
            warn!("Account change notification did not arrive");
            self.session.apply_accounts_changed(&wallet.accounts());
        }
        self.sync_account().await;
        Ok(())
    }

    /// Apply a pending account change, if the wallet reported one.
    pub async fn sync_account(&mut self) {
        self.account_rx.borrow_and_update();
        self.clear_account_state();
        if let Some(account) = self.session.account() {
            info!(account = %account, "Loading account state");
            if let Err(e) = self.load_account_state(&account).await {
                warn!(error = %e, "Failed to load account state");
            }
        }
    }

    /// Whether the wallet changed accounts since the last sync.
    #[must_use]
    pub fn account_changed(&self) -> bool {
        self.account_rx.has_changed().unwrap_or(false)
    }

    fn clear_account_state(&mut self) {
        self.liked.clear();
        self.user_feed = Feed::default();
        self.own_profile = None;
    }

    async fn load_account_state(&mut self, account: &Account) -> Result<()> {
        self.own_profile = Some(self.gateway.reader().get_profile(account).await?);
        if !self.feed.is_empty() {
            self.liked = self.assembler.liked_status(self.feed.tweets(), account).await;
        }
        Ok(())
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Reload the global feed and, when connected, the liked status.
    ///
    /// # Errors
    ///
    /// Fails if the tweet list cannot be fetched; the previous feed is kept.
    pub async fn refresh_feed(&mut self) -> Result<&Feed> {
        let guard = OperationGuard::new(Action::LoadFeed.verb());
        let feed = match self.assembler.load_all().await {
            Ok(feed) => feed,
            Err(e) => {
                guard.fail(&e);
                return Err(e);
            }
        };
        if let Some(account) = self.session.account() {
            self.liked = self.assembler.liked_status(feed.tweets(), &account).await;
        }
        self.feed = feed;
        guard.complete();
        Ok(&self.feed)
    }

    /// Reload the connected account's tweets.
    ///
    /// # Errors
    ///
    /// [`DtweetError::NotConnected`] without an account, or the fetch error.
    pub async fn refresh_user_tweets(&mut self) -> Result<&Feed> {
        let account = self.session.require_account()?;
        let feed = self.assembler.load_user(&account).await?;
        let own = feed.profile_of(&account);
        debug!(account = %account, name = %own.name, tweets = feed.len(), "User tweets loaded");
        self.user_feed = feed;
        Ok(&self.user_feed)
    }

    /// Reload the connected account's raw profile.
    ///
    /// # Errors
    ///
    /// [`DtweetError::NotConnected`] without an account, or the fetch error.
    pub async fn load_profile(&mut self) -> Result<Profile> {
        let account = self.session.require_account()?;
        let profile = self.gateway.reader().get_profile(&account).await?;
        self.own_profile = Some(profile.clone());
        Ok(profile)
    }

    /// Display profile for any account, with fallback.
    pub async fn profile_of(&self, account: &Account) -> DisplayProfile {
        resolve_or_default(&self.gateway.reader(), account).await
    }

    /// Likers of a tweet, cached after the first load.
    ///
    /// # Errors
    ///
    /// Fails if the likes list cannot be fetched.
    pub async fn likes(&mut self, tweet_id: TweetId) -> Result<Vec<Liker>> {
        self.panels.open_likes(tweet_id).await
    }

    /// Comments on a tweet, cached after the first load.
    ///
    /// # Errors
    ///
    /// Fails if the comment list cannot be fetched.
    pub async fn comments(&mut self, tweet_id: TweetId) -> Result<Vec<CommentView>> {
        self.panels.open_comments(tweet_id).await
    }

    /// Drop every cached panel and reload both feeds.
    ///
    /// # Errors
    ///
    /// Fails if the global feed cannot be fetched.
    pub async fn refresh_all(&mut self) -> Result<()> {
        self.panels.clear();
        self.refresh_feed().await?;
        if self.session.account().is_some() {
            self.refresh_user_tweets().await?;
        }
        Ok(())
    }

    pub fn close_panel(&mut self) {
        self.panels.close();
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// # Errors
    ///
    /// See [`Mutations::post_tweet`].
    pub async fn post_tweet(&mut self, content: &str) -> Result<Receipt> {
        let receipt = self.mutations.post_tweet(&self.session, content).await?;
        self.refetch_feeds().await;
        Ok(receipt)
    }

    /// # Errors
    ///
    /// See [`Mutations::edit_tweet`].
    pub async fn edit_tweet(&mut self, id: TweetId, content: &str) -> Result<Receipt> {
        let receipt = self.mutations.edit_tweet(&self.session, id, content).await?;
        self.refetch_feeds().await;
        Ok(receipt)
    }

    /// # Errors
    ///
    /// See [`Mutations::delete_tweet`].
    pub async fn delete_tweet(&mut self, id: TweetId) -> Result<Receipt> {
        let receipt = self.mutations.delete_tweet(&self.session, id).await?;
        self.panels.invalidate(id);
        self.refetch_feeds().await;
        Ok(receipt)
    }

    /// Like a tweet, refusing locally when it is already liked.
    ///
    /// # Errors
    ///
    /// See [`Mutations::like`].
    pub async fn like(&mut self, tweet_id: TweetId) -> Result<Receipt> {
        let account = self.session.require_account()?;
        let already = match self.liked.get(&tweet_id) {
            Some(liked) => *liked,
            None => self.assembler.has_liked(tweet_id, &account).await,
        };
        let receipt = self.mutations.like(&self.session, tweet_id, already).await?;
        self.liked.insert(tweet_id, true);
        self.after_like_change(tweet_id).await;
        Ok(receipt)
    }

    /// # Errors
    ///
    /// See [`Mutations::unlike`].
    pub async fn unlike(&mut self, tweet_id: TweetId) -> Result<Receipt> {
        let receipt = self.mutations.unlike(&self.session, tweet_id).await?;
        self.liked.insert(tweet_id, false);
        self.after_like_change(tweet_id).await;
        Ok(receipt)
    }

    /// Like or unlike depending on the current liked status. Returns the new
    /// status.
    ///
    /// # Errors
    ///
    /// See [`AppContext::like`] and [`AppContext::unlike`].
    pub async fn toggle_like(&mut self, tweet_id: TweetId) -> Result<bool> {
        let account = self.session.require_account()?;
        let liked = match self.liked.get(&tweet_id) {
            Some(liked) => *liked,
            None => self.assembler.has_liked(tweet_id, &account).await,
        };
        if liked {
            self.unlike(tweet_id).await?;
        } else {
            self.like(tweet_id).await?;
        }
        Ok(!liked)
    }

    /// Comment on a tweet and reload its comment list.
    ///
    /// # Errors
    ///
    /// See [`Mutations::post_comment`].
    pub async fn post_comment(&mut self, tweet_id: TweetId, content: &str) -> Result<Receipt> {
        let receipt = self
            .mutations
            .post_comment(&self.session, tweet_id, content)
            .await?;
        if let Err(e) = self.panels.refresh_comments(tweet_id).await {
            warn!(tweet_id, error = %e, "Failed to reload comments");
        }
        Ok(receipt)
    }

    /// Create or update the connected account's profile.
    ///
    /// # Errors
    ///
    /// See [`Mutations::save_profile`].
    pub async fn save_profile(&mut self, name: &str, bio: &str, image: &str) -> Result<Receipt> {
        let current = match self.load_profile().await {
            Ok(profile) => Some(profile),
            Err(DtweetError::NotConnected) => return Err(DtweetError::NotConnected),
            Err(e) => {
                debug!(error = %e, "Could not load current profile, assuming none");
                None
            }
        };
        let receipt = self
            .mutations
            .save_profile(&self.session, current.as_ref(), name, bio, image)
            .await?;
        if let Err(e) = self.load_profile().await {
            warn!(error = %e, "Failed to reload profile");
        }
        // Names and avatars shown next to tweets and comments changed.
        self.panels.clear();
        self.refetch_feeds().await;
        Ok(receipt)
    }

    async fn after_like_change(&mut self, tweet_id: TweetId) {
        self.panels.invalidate_likes(tweet_id);
        self.refetch_feeds().await;
    }

    async fn refetch_feeds(&mut self) {
        if let Err(e) = self.refresh_feed().await {
            warn!(error = %e, "Failed to reload feed");
        }
        if self.session.account().is_some() {
            if let Err(e) = self.refresh_user_tweets().await {
                warn!(error = %e, "Failed to reload user tweets");
            }
        }
    }
}
