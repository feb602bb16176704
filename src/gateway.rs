//! Contract gateway.
//!
//! A stateless façade over a [`TwitterContract`]. Queries go through a
//! [`ReadHandle`]; mutations need a [`WriteHandle`], which can only be
//! obtained for the account connected in a [`WalletSession`]. Every write
//! returns a [`PendingTx`] that must be confirmed before the effect counts.

use std::sync::Arc;
use tracing::{debug, info};

use crate::contract::{ContractCall, Receipt, TwitterContract, TxHash};
use crate::error::Result;
use crate::model::{Account, Comment, Like, LikeId, Profile, Tweet, TweetId};
use crate::wallet::WalletSession;

/// Entry point for contract access.
#[derive(Clone)]
pub struct ContractGateway {
    contract: Arc<dyn TwitterContract>,
}

impl ContractGateway {
    #[must_use]
    pub fn new(contract: Arc<dyn TwitterContract>) -> Self {
        Self { contract }
    }

    /// Provider-backed handle for queries.
    #[must_use]
    pub fn reader(&self) -> ReadHandle {
        ReadHandle {
            contract: Arc::clone(&self.contract),
        }
    }

    /// Signer-backed handle for the session's connected account.
    ///
    /// # Errors
    ///
    /// Returns [`crate::DtweetError::NotConnected`] when no account is connected.
    pub fn writer(&self, session: &WalletSession) -> Result<WriteHandle> {
        let signer = session.require_account()?;
        Ok(WriteHandle {
            contract: Arc::clone(&self.contract),
            signer,
        })
    }
}

/// Read-only contract handle.
#[derive(Clone)]
pub struct ReadHandle {
    contract: Arc<dyn TwitterContract>,
}

impl ReadHandle {
    /// # Errors
    ///
    /// Propagates provider failures.
    pub async fn get_all_tweets(&self) -> Result<Vec<Tweet>> {
        self.contract.get_all_tweets().await
    }

    /// # Errors
    ///
    /// Propagates provider failures.
    pub async fn get_user_tweets(&self, user: &Account) -> Result<Vec<Tweet>> {
        self.contract.get_user_tweets(user).await
    }

    /// # Errors
    ///
    /// Propagates provider failures.
    pub async fn get_profile(&self, user: &Account) -> Result<Profile> {
        self.contract.get_profile(user).await
    }

    /// # Errors
    ///
    /// Propagates provider failures.
    pub async fn get_likes_of_tweet(&self, tweet_id: TweetId) -> Result<Vec<Like>> {
        self.contract.get_likes_of_tweet(tweet_id).await
    }

    /// # Errors
    ///
    /// Propagates provider failures.
    pub async fn get_comments_of_tweet(&self, tweet_id: TweetId) -> Result<Vec<Comment>> {
        self.contract.get_comments_of_tweet(tweet_id).await
    }
}

/// Contract handle that signs as one account.
pub struct WriteHandle {
    contract: Arc<dyn TwitterContract>,
    signer: Account,
}

impl WriteHandle {
    /// The account transactions are signed with.
    #[must_use]
    pub const fn signer(&self) -> &Account {
        &self.signer
    }

    async fn send(&self, call: ContractCall) -> Result<PendingTx> {
        let method = call.method();
        debug!(method, signer = %self.signer, "Submitting transaction");
        let hash = self.contract.submit(&self.signer, call).await?;
        info!(method, tx_hash = %hash, "Transaction sent, waiting for confirmation");
        Ok(PendingTx {
            hash,
            method,
            contract: Arc::clone(&self.contract),
        })
    }

    /// Submit `createTweet(content)`.
    ///
    /// # Errors
    ///
    /// Returns the contract's failure if submission is rejected.
    pub async fn create_tweet(&self, content: &str) -> Result<PendingTx> {
        self.send(ContractCall::CreateTweet {
            content: content.to_string(),
        })
        .await
    }

    /// Submit `editTweet(id, content)`.
    ///
    /// # Errors
    ///
    /// Returns the contract's failure if submission is rejected.
    pub async fn edit_tweet(&self, id: TweetId, content: &str) -> Result<PendingTx> {
        self.send(ContractCall::EditTweet {
            id,
            content: content.to_string(),
        })
        .await
    }

    /// Submit `deleteTweet(id)`.
    ///
    /// # Errors
    ///
    /// Returns the contract's failure if submission is rejected.
    pub async fn delete_tweet(&self, id: TweetId) -> Result<PendingTx> {
        self.send(ContractCall::DeleteTweet { id }).await
    }

    /// Submit `createLike(tweetId)`.
    ///
    /// # Errors
    ///
    /// Returns the contract's failure if submission is rejected.
    pub async fn create_like(&self, tweet_id: TweetId) -> Result<PendingTx> {
        self.send(ContractCall::CreateLike { tweet_id }).await
    }

    /// Submit `deleteLike(likeId)`.
    ///
    /// # Errors
    ///
    /// Returns the contract's failure if submission is rejected.
    pub async fn delete_like(&self, like_id: LikeId) -> Result<PendingTx> {
        self.send(ContractCall::DeleteLike { like_id }).await
    }

    /// Submit `createComment(content, tweetId)`.
    ///
    /// # Errors
    ///
    /// Returns the contract's failure if submission is rejected.
    pub async fn create_comment(&self, content: &str, tweet_id: TweetId) -> Result<PendingTx> {
        self.send(ContractCall::CreateComment {
            content: content.to_string(),
            tweet_id,
        })
        .await
    }

    /// Submit `createProfile(name, bio, image)`.
    ///
    /// # Errors
    ///
    /// Returns the contract's failure if submission is rejected.
    pub async fn create_profile(&self, name: &str, bio: &str, image: &str) -> Result<PendingTx> {
        self.send(ContractCall::CreateProfile {
            name: name.to_string(),
            bio: bio.to_string(),
            image: image.to_string(),
        })
        .await
    }

    /// Submit `editProfile(name, bio, image)`.
    ///
    /// # Errors
    ///
    /// Returns the contract's failure if submission is rejected.
    pub async fn edit_profile(&self, name: &str, bio: &str, image: &str) -> Result<PendingTx> {
        self.send(ContractCall::EditProfile {
            name: name.to_string(),
            bio: bio.to_string(),
            image: image.to_string(),
        })
        .await
    }
}

/// A submitted, not yet confirmed transaction.
pub struct PendingTx {
    hash: TxHash,
    method: &'static str,
    contract: Arc<dyn TwitterContract>,
}

impl PendingTx {
    #[must_use]
    pub const fn hash(&self) -> &TxHash {
        &self.hash
    }

    /// Wait for inclusion.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction is unknown or reverted.
    pub async fn confirm(self) -> Result<Receipt> {
        let receipt = self.contract.wait_for_receipt(&self.hash).await?;
        info!(
            method = self.method,
            tx_hash = %self.hash,
            block = receipt.block_number,
            "Transaction confirmed"
        );
        Ok(receipt)
    }
}
