//! Mutation flows.
//!
//! Each user affordance (post, edit, delete, like, comment, profile) owns a
//! [`MutationFlow`] that moves `Idle → Submitting → Confirming → Idle`. A
//! flow that is not idle refuses new triggers, so the same control cannot
//! submit twice concurrently. Nothing is retried and nothing is applied
//! locally before confirmation; refetching is the caller's job.

use std::future::Future;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::contract::Receipt;
use crate::error::{Action, DtweetError, Result};
use crate::gateway::{ContractGateway, PendingTx, WriteHandle};
use crate::logging::OperationGuard;
use crate::model::{Profile, TweetId, validate_content};
use crate::wallet::WalletSession;

/// Lifecycle of a single flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlowState {
    #[default]
    Idle,
    Submitting,
    Confirming,
}

/// State machine guarding one triggering control.
pub struct MutationFlow {
    action: Action,
    state: watch::Sender<FlowState>,
}

impl MutationFlow {
    #[must_use]
    pub fn new(action: Action) -> Self {
        let (state, _) = watch::channel(FlowState::Idle);
        Self { action, state }
    }

    #[must_use]
    pub fn state(&self) -> FlowState {
        *self.state.borrow()
    }

    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.state() == FlowState::Idle
    }

    /// Observe state transitions (e.g. to drive a spinner).
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<FlowState> {
        self.state.subscribe()
    }

    /// Run one submission: `submit` produces the pending transaction, which
    /// is then confirmed. The flow returns to idle whatever the outcome.
    ///
    /// # Errors
    ///
    /// Returns [`DtweetError::Busy`] if the flow is not idle; otherwise the
    /// submission or confirmation failure, attributed to this flow's action.
    pub async fn run<F, Fut>(&self, submit: F) -> Result<Receipt>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<PendingTx>>,
    {
        let claimed = self.state.send_if_modified(|state| {
            if *state == FlowState::Idle {
                *state = FlowState::Submitting;
                true
            } else {
                false
            }
        });
        if !claimed {
            return Err(DtweetError::Busy {
                action: self.action,
            });
        }
        let _reset = ResetToIdle(&self.state);

        let guard = OperationGuard::new(self.action.verb());
        let outcome = async {
            let pending = submit().await?;
            self.state.send_replace(FlowState::Confirming);
            pending.confirm().await
        }
        .await
        .map_err(|e| e.for_action(self.action));

        match &outcome {
            Ok(_) => guard.complete(),
            Err(e) => {
                warn!(action = %self.action, error = %e, "Mutation failed");
                guard.fail(e);
            }
        }
        outcome
    }
}

struct ResetToIdle<'a>(&'a watch::Sender<FlowState>);

impl Drop for ResetToIdle<'_> {
    fn drop(&mut self) {
        self.0.send_replace(FlowState::Idle);
    }
}

/// One flow per mutating affordance, sharing a gateway.
pub struct Mutations {
    gateway: ContractGateway,
    post: MutationFlow,
    edit: MutationFlow,
    delete: MutationFlow,
    like: MutationFlow,
    comment: MutationFlow,
    profile: MutationFlow,
}

impl Mutations {
    #[must_use]
    pub fn new(gateway: ContractGateway) -> Self {
        Self {
            gateway,
            post: MutationFlow::new(Action::PostTweet),
            edit: MutationFlow::new(Action::EditTweet),
            delete: MutationFlow::new(Action::DeleteTweet),
            like: MutationFlow::new(Action::ToggleLike),
            comment: MutationFlow::new(Action::PostComment),
            profile: MutationFlow::new(Action::SaveProfile),
        }
    }

    /// The flow backing `action`, if it is a mutation.
    #[must_use]
    pub const fn flow(&self, action: Action) -> Option<&MutationFlow> {
        match action {
            Action::PostTweet => Some(&self.post),
            Action::EditTweet => Some(&self.edit),
            Action::DeleteTweet => Some(&self.delete),
            Action::ToggleLike => Some(&self.like),
            Action::PostComment => Some(&self.comment),
            Action::SaveProfile => Some(&self.profile),
            _ => None,
        }
    }

    fn writer(&self, session: &WalletSession) -> Result<WriteHandle> {
        self.gateway.writer(session)
    }

    /// Create a tweet.
    ///
    /// # Errors
    ///
    /// Local pre-check failures, a missing wallet connection, or the
    /// classified contract failure.
    pub async fn post_tweet(&self, session: &WalletSession, content: &str) -> Result<Receipt> {
        validate_content("Tweet", content)?;
        let writer = self.writer(session)?;
        let receipt = self.post.run(|| writer.create_tweet(content)).await?;
        info!("Tweet posted successfully");
        Ok(receipt)
    }

    /// Replace the content of an own tweet.
    ///
    /// # Errors
    ///
    /// Local pre-check failures, a missing wallet connection, or the
    /// classified contract failure (e.g. not the author).
    pub async fn edit_tweet(
        &self,
        session: &WalletSession,
        id: TweetId,
        content: &str,
    ) -> Result<Receipt> {
        validate_content("Tweet", content)?;
        let writer = self.writer(session)?;
        let receipt = self.edit.run(|| writer.edit_tweet(id, content)).await?;
        info!(tweet_id = id, "Tweet edited successfully");
        Ok(receipt)
    }

    /// Soft-delete an own tweet.
    ///
    /// # Errors
    ///
    /// A missing wallet connection or the classified contract failure.
    pub async fn delete_tweet(&self, session: &WalletSession, id: TweetId) -> Result<Receipt> {
        let writer = self.writer(session)?;
        let receipt = self.delete.run(|| writer.delete_tweet(id)).await?;
        info!(tweet_id = id, "Tweet deleted successfully");
        Ok(receipt)
    }

    /// Like a tweet. `already_liked` is the caller's current liked status;
    /// when set, no call is made.
    ///
    /// # Errors
    ///
    /// [`DtweetError::AlreadyLiked`] locally, a missing wallet connection,
    /// or the classified contract failure.
    pub async fn like(
        &self,
        session: &WalletSession,
        tweet_id: TweetId,
        already_liked: bool,
    ) -> Result<Receipt> {
        if already_liked {
            return Err(DtweetError::AlreadyLiked { tweet_id });
        }
        let writer = self.writer(session)?;
        let receipt = self.like.run(|| writer.create_like(tweet_id)).await?;
        info!(tweet_id, "Tweet liked successfully");
        Ok(receipt)
    }

    /// Remove the connected account's active like on a tweet.
    ///
    /// # Errors
    ///
    /// [`DtweetError::NotLiked`] if there is no active like, a missing
    /// wallet connection, or the classified contract failure.
    pub async fn unlike(&self, session: &WalletSession, tweet_id: TweetId) -> Result<Receipt> {
        let writer = &self.writer(session)?;
        let reader = &self.gateway.reader();
        let receipt = self
            .like
            .run(move || async move {
                let likes = reader.get_likes_of_tweet(tweet_id).await?;
                let own = likes
                    .iter()
                    .find(|l| &l.liker == writer.signer() && !l.deleted)
                    .ok_or(DtweetError::NotLiked { tweet_id })?;
                writer.delete_like(own.id).await
            })
            .await?;
        info!(tweet_id, "Tweet unliked successfully");
        Ok(receipt)
    }

    /// Comment on a tweet. The comment is trimmed before submission.
    ///
    /// # Errors
    ///
    /// Local pre-check failures, a missing wallet connection, or the
    /// classified contract failure.
    pub async fn post_comment(
        &self,
        session: &WalletSession,
        tweet_id: TweetId,
        content: &str,
    ) -> Result<Receipt> {
        let content = content.trim();
        validate_content("Comment", content)?;
        let writer = self.writer(session)?;
        let receipt = self
            .comment
            .run(|| writer.create_comment(content, tweet_id))
            .await?;
        info!(tweet_id, "Comment posted successfully");
        Ok(receipt)
    }

    /// Create the profile if `current` has none, otherwise edit it.
    ///
    /// # Errors
    ///
    /// [`DtweetError::EmptyContent`] for a blank name, a missing wallet
    /// connection, or the classified contract failure.
    pub async fn save_profile(
        &self,
        session: &WalletSession,
        current: Option<&Profile>,
        name: &str,
        bio: &str,
        image: &str,
    ) -> Result<Receipt> {
        if name.trim().is_empty() {
            return Err(DtweetError::EmptyContent { what: "Name" });
        }
        let writer = &self.writer(session)?;
        let exists = current.is_some_and(Profile::exists);
        let receipt = self
            .profile
            .run(move || async move {
                if exists {
                    writer.edit_profile(name, bio, image).await
                } else {
                    writer.create_profile(name, bio, image).await
                }
            })
            .await?;
        info!(created = !exists, "Profile saved successfully");
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::TwitterContract;
    use crate::error::ContractRevert;
    use crate::ledger::LocalLedger;
    use crate::model::Account;
    use crate::wallet::LocalWallet;
    use std::sync::Arc;

    fn account() -> Account {
        "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266".parse().unwrap()
    }

    async fn setup() -> (Arc<LocalLedger>, Mutations, WalletSession) {
        let ledger = Arc::new(LocalLedger::new());
        let mutations = Mutations::new(ContractGateway::new(ledger.clone()));
        let session = WalletSession::new(Some(Arc::new(LocalWallet::new(vec![account()]))));
        session.connect().await.unwrap();
        (ledger, mutations, session)
    }

    #[tokio::test]
    async fn over_length_tweet_never_reaches_contract() {
        let (ledger, mutations, session) = setup().await;
        let err = mutations
            .post_tweet(&session, &"x".repeat(281))
            .await
            .unwrap_err();
        assert!(matches!(err, DtweetError::ContentTooLong { len: 281, .. }));
        assert_eq!(ledger.call_count("createTweet"), 0);
        assert!(mutations.flow(Action::PostTweet).unwrap().is_idle());
    }

    #[tokio::test]
    async fn blank_comment_never_reaches_contract() {
        let (ledger, mutations, session) = setup().await;
        let tweet = ledger.seed_tweet(&account(), "hi", 1, false);
        let err = mutations
            .post_comment(&session, tweet, "   ")
            .await
            .unwrap_err();
        assert!(matches!(err, DtweetError::EmptyContent { what: "Comment" }));
        assert_eq!(ledger.call_count("createComment"), 0);
    }

    #[tokio::test]
    async fn like_with_known_like_issues_no_call() {
        let (ledger, mutations, session) = setup().await;
        let tweet = ledger.seed_tweet(&account(), "hi", 1, false);
        mutations.like(&session, tweet, false).await.unwrap();
        let err = mutations.like(&session, tweet, true).await.unwrap_err();
        assert!(matches!(err, DtweetError::AlreadyLiked { .. }));
        assert_eq!(ledger.call_count("createLike"), 1);
    }

    #[tokio::test]
    async fn unlike_without_like_is_rejected_locally() {
        let (ledger, mutations, session) = setup().await;
        let tweet = ledger.seed_tweet(&account(), "hi", 1, false);
        let err = mutations.unlike(&session, tweet).await.unwrap_err();
        assert!(matches!(err, DtweetError::NotLiked { .. }));
        assert_eq!(ledger.call_count("deleteLike"), 0);
    }

    #[tokio::test]
    async fn unlike_deletes_own_like() {
        let (ledger, mutations, session) = setup().await;
        let tweet = ledger.seed_tweet(&account(), "hi", 1, false);
        mutations.like(&session, tweet, false).await.unwrap();
        mutations.unlike(&session, tweet).await.unwrap();
        let likes = ledger.get_likes_of_tweet(tweet).await.unwrap();
        assert!(likes.iter().all(|l| l.deleted));
    }

    #[tokio::test]
    async fn contract_failure_is_classified_and_flow_returns_idle() {
        let (ledger, mutations, session) = setup().await;
        let tweet = ledger.seed_tweet(&account(), "gone", 1, true);
        let err = mutations
            .edit_tweet(&session, tweet, "resurrect")
            .await
            .unwrap_err();
        assert_eq!(err.revert(), Some(&ContractRevert::DeletedTweet));
        assert_eq!(
            err.user_message(),
            "This tweet has been deleted and cannot be edited."
        );
        assert!(mutations.flow(Action::EditTweet).unwrap().is_idle());
    }

    #[tokio::test]
    async fn busy_flow_rejects_second_trigger() {
        let (_ledger, mutations, session) = setup().await;
        let flow = mutations.flow(Action::PostTweet).unwrap();
        let writer = &mutations.writer(&session).unwrap();
        let mut states = flow.watch();

        let first = flow.run(move || async move {
            tokio::task::yield_now().await;
            writer.create_tweet("first").await
        });
        let second = async {
            states.changed().await.unwrap();
            flow.run(|| writer.create_tweet("second")).await
        };
        let (first, second) = tokio::join!(first, second);

        assert!(first.is_ok());
        assert!(matches!(second, Err(DtweetError::Busy { .. })));
        assert!(flow.is_idle());
    }

    #[tokio::test]
    async fn save_profile_creates_then_edits() {
        let (ledger, mutations, session) = setup().await;
        mutations
            .save_profile(&session, None, "Alice", "bio", "")
            .await
            .unwrap();
        let current = ledger.get_profile(&account()).await.unwrap();
        mutations
            .save_profile(&session, Some(&current), "Alice B", "bio", "")
            .await
            .unwrap();
        assert_eq!(ledger.call_count("createProfile"), 1);
        assert_eq!(ledger.call_count("editProfile"), 1);
        assert_eq!(ledger.get_profile(&account()).await.unwrap().name, "Alice B");
    }

    #[tokio::test]
    async fn writes_require_connection() {
        let ledger = Arc::new(LocalLedger::new());
        let mutations = Mutations::new(ContractGateway::new(ledger.clone()));
        let session = WalletSession::new(None);
        let err = mutations.post_tweet(&session, "hello").await.unwrap_err();
        assert!(matches!(err, DtweetError::NotConnected));
        assert_eq!(ledger.call_count("createTweet"), 0);
    }
}
