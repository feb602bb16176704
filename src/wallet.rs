//! Wallet session.
//!
//! [`WalletSession`] is the single owner of the connected account. The
//! account is published on a `watch` channel; account-change notifications
//! from the wallet arrive on a `broadcast` channel and are applied by an
//! [`AccountListener`] task for as long as the listener is held.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{DtweetError, Result};
use crate::model::Account;

/// Capacity of the account-change notification channel.
const NOTIFICATION_CAPACITY: usize = 16;

/// A wallet that can hand out accounts and announce account changes.
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Ask the wallet for account access. The first account is the active one.
    async fn request_accounts(&self) -> Result<Vec<Account>>;

    /// Accounts already authorized, without prompting.
    fn accounts(&self) -> Vec<Account>;

    /// Subscribe to "accounts changed" notifications.
    fn subscribe(&self) -> broadcast::Receiver<Vec<Account>>;
}

/// Wallet holding a fixed list of local accounts.
///
/// Used for the local ledger backend: every listed account can sign, and
/// [`LocalWallet::switch_accounts`] plays the role of the user switching
/// accounts in a wallet extension.
pub struct LocalWallet {
    accounts: Mutex<Vec<Account>>,
    approve: AtomicBool,
    notifier: broadcast::Sender<Vec<Account>>,
}

impl LocalWallet {
    /// Create a wallet exposing `accounts`, first one active.
    #[must_use]
    pub fn new(accounts: Vec<Account>) -> Self {
        let (notifier, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        Self {
            accounts: Mutex::new(accounts),
            approve: AtomicBool::new(true),
            notifier,
        }
    }

    /// Make subsequent account requests fail as if the user declined.
    pub fn reject_requests(&self, reject: bool) {
        self.approve.store(!reject, Ordering::SeqCst);
    }

    /// Replace the exposed accounts and notify subscribers.
    pub fn switch_accounts(&self, accounts: Vec<Account>) {
        *self.accounts.lock() = accounts.clone();
        // No subscribers is fine: nobody is listening yet.
        let _ = self.notifier.send(accounts);
    }
}

#[async_trait]
impl WalletProvider for LocalWallet {
    async fn request_accounts(&self) -> Result<Vec<Account>> {
        if !self.approve.load(Ordering::SeqCst) {
            return Err(DtweetError::WalletRejected {
                reason: "User rejected the request.".to_string(),
            });
        }
        Ok(self.accounts())
    }

    fn accounts(&self) -> Vec<Account> {
        self.accounts.lock().clone()
    }

    fn subscribe(&self) -> broadcast::Receiver<Vec<Account>> {
        self.notifier.subscribe()
    }
}

/// Holds `connecting` high until dropped, so a cancelled request clears it.
struct ConnectingFlag<'a>(&'a AtomicBool);

impl<'a> ConnectingFlag<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for ConnectingFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// The connected-account session.
pub struct WalletSession {
    wallet: Option<Arc<dyn WalletProvider>>,
    account: Arc<watch::Sender<Option<Account>>>,
    connecting: AtomicBool,
}

impl WalletSession {
    /// Create a disconnected session. `None` means no wallet is installed.
    #[must_use]
    pub fn new(wallet: Option<Arc<dyn WalletProvider>>) -> Self {
        let (account, _) = watch::channel(None);
        Self {
            wallet,
            account: Arc::new(account),
            connecting: AtomicBool::new(false),
        }
    }

    /// Request account access and store the first returned account.
    ///
    /// # Errors
    ///
    /// Returns [`DtweetError::WalletNotFound`] without a wallet, or
    /// [`DtweetError::WalletRejected`] if the request is declined or yields
    /// no accounts. The session is left unchanged on error.
    pub async fn connect(&self) -> Result<Account> {
        let wallet = self.wallet.as_ref().ok_or(DtweetError::WalletNotFound)?;

        let requested = {
            let _connecting = ConnectingFlag::raise(&self.connecting);
            wallet.request_accounts().await
        };

        let accounts = requested.inspect_err(|e| warn!(error = %e, "Error connecting wallet"))?;
        let account = accounts
            .into_iter()
            .next()
            .ok_or_else(|| DtweetError::WalletRejected {
                reason: "wallet returned no accounts".to_string(),
            })?;

        info!(account = %account, "Wallet connected");
        self.account.send_replace(Some(account.clone()));
        Ok(account)
    }

    /// Forget the connected account locally. The wallet is not contacted.
    pub fn disconnect(&self) {
        if self.account.send_replace(None).is_some() {
            info!("Wallet disconnected");
        }
    }

    /// Apply an "accounts changed" notification.
    pub fn apply_accounts_changed(&self, accounts: &[Account]) {
        apply_accounts(&self.account, accounts);
    }

    /// The connected account, if any.
    #[must_use]
    pub fn account(&self) -> Option<Account> {
        self.account.borrow().clone()
    }

    /// The connected account, or [`DtweetError::NotConnected`].
    ///
    /// # Errors
    ///
    /// Returns an error when no account is connected.
    pub fn require_account(&self) -> Result<Account> {
        self.account().ok_or(DtweetError::NotConnected)
    }

    /// Whether an account request is in flight.
    #[must_use]
    pub fn is_connecting(&self) -> bool {
        self.connecting.load(Ordering::SeqCst)
    }

    /// Accounts the wallet exposes, empty without a wallet.
    #[must_use]
    pub fn available_accounts(&self) -> Vec<Account> {
        self.wallet
            .as_ref()
            .map(|w| w.accounts())
            .unwrap_or_default()
    }

    /// Observe account changes.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<Option<Account>> {
        self.account.subscribe()
    }

    /// Start following the wallet's account-change notifications.
    ///
    /// Must be called from within a tokio runtime. Returns `None` when there
    /// is no wallet. Dropping the returned listener unsubscribes.
    #[must_use]
    pub fn listen(&self) -> Option<AccountListener> {
        let mut notifications = self.wallet.as_ref()?.subscribe();
        let account = Arc::clone(&self.account);

        let task = tokio::spawn(async move {
            loop {
                match notifications.recv().await {
                    Ok(accounts) => apply_accounts(&account, &accounts),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Missed account change notifications");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        debug!("Subscribed to account changes");
        Some(AccountListener { task })
    }
}

fn apply_accounts(account: &watch::Sender<Option<Account>>, accounts: &[Account]) {
    let next = accounts.first().cloned();
    match &next {
        Some(a) => info!(account = %a, "Wallet account changed"),
        None => info!("Wallet locked or all accounts disconnected"),
    }
    account.send_replace(next);
}

/// Subscription to account-change notifications; unsubscribes on drop.
#[derive(Debug)]
pub struct AccountListener {
    task: JoinHandle<()>,
}

impl Drop for AccountListener {
    fn drop(&mut self) {
        self.task.abort();
        debug!("Unsubscribed from account changes");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accounts() -> Vec<Account> {
        vec![
            "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266".parse().unwrap(),
            "0x70997970c51812dc3a010c7d01b50e0d17dc79c8".parse().unwrap(),
        ]
    }

    #[tokio::test]
    async fn connect_stores_first_account() {
        let wallet = Arc::new(LocalWallet::new(accounts()));
        let session = WalletSession::new(Some(wallet));
        let account = session.connect().await.unwrap();
        assert_eq!(account, accounts()[0]);
        assert_eq!(session.account(), Some(accounts()[0].clone()));
        assert!(!session.is_connecting());
    }

    /// Never answers the account request.
    struct SilentWallet(broadcast::Sender<Vec<Account>>);

    #[async_trait]
    impl WalletProvider for SilentWallet {
        async fn request_accounts(&self) -> Result<Vec<Account>> {
            std::future::pending().await
        }

        fn accounts(&self) -> Vec<Account> {
            Vec::new()
        }

        fn subscribe(&self) -> broadcast::Receiver<Vec<Account>> {
            self.0.subscribe()
        }
    }

    #[tokio::test]
    async fn abandoned_connect_clears_connecting() {
        let (notifier, _) = broadcast::channel(1);
        let session = WalletSession::new(Some(Arc::new(SilentWallet(notifier))));

        let mut request = Box::pin(session.connect());
        assert!(futures::poll!(request.as_mut()).is_pending());
        assert!(session.is_connecting());

        drop(request);
        assert!(!session.is_connecting());
        assert!(session.account().is_none());
    }

    #[tokio::test]
    async fn connect_without_wallet_fails() {
        let session = WalletSession::new(None);
        let err = session.connect().await.unwrap_err();
        assert!(matches!(err, DtweetError::WalletNotFound));
        assert!(session.account().is_none());
    }

    #[tokio::test]
    async fn rejected_request_leaves_session_disconnected() {
        let wallet = Arc::new(LocalWallet::new(accounts()));
        wallet.reject_requests(true);
        let session = WalletSession::new(Some(wallet));
        let err = session.connect().await.unwrap_err();
        assert!(matches!(err, DtweetError::WalletRejected { .. }));
        assert!(matches!(
            session.require_account(),
            Err(DtweetError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn empty_account_list_is_rejected() {
        let session = WalletSession::new(Some(Arc::new(LocalWallet::new(Vec::new()))));
        assert!(matches!(
            session.connect().await,
            Err(DtweetError::WalletRejected { .. })
        ));
    }

    #[tokio::test]
    async fn disconnect_clears_local_state_only() {
        let wallet = Arc::new(LocalWallet::new(accounts()));
        let session = WalletSession::new(Some(wallet.clone()));
        session.connect().await.unwrap();
        session.disconnect();
        assert!(session.account().is_none());
        assert_eq!(wallet.accounts().len(), 2);
    }

    #[tokio::test]
    async fn listener_follows_account_changes() {
        let wallet = Arc::new(LocalWallet::new(accounts()));
        let session = WalletSession::new(Some(wallet.clone()));
        session.connect().await.unwrap();
        let listener = session.listen().unwrap();
        let mut watcher = session.watch();

        wallet.switch_accounts(vec![accounts()[1].clone()]);
        watcher.changed().await.unwrap();
        assert_eq!(session.account(), Some(accounts()[1].clone()));

        wallet.switch_accounts(Vec::new());
        watcher.changed().await.unwrap();
        assert!(session.account().is_none());

        drop(listener);
        tokio::task::yield_now().await;
        wallet.switch_accounts(accounts());
        tokio::task::yield_now().await;
        assert!(session.account().is_none());
    }
}
