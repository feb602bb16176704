//! EVM backend: the social contract deployed on a chain, reached over
//! JSON-RPC with `alloy`, signing with a local private key.

use alloy::network::EthereumWallet;
use alloy::primitives::{Address, B256, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::signers::local::PrivateKeySigner;
use async_trait::async_trait;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::contract::{ContractCall, Receipt, TwitterContract, TxHash};
use crate::error::{DtweetError, Result};
use crate::model::{Account, Comment, Like, Profile, Tweet, TweetId};
use crate::wallet::WalletProvider;

mod abi {
    use alloy::sol;

    sol! {
        #[derive(Debug)]
        #[sol(rpc)]
        contract Twitter {
            struct Tweet {
                uint256 id;
                address author;
                string content;
                uint256 timestamp;
                uint256 likeCount;
                bool deleted;
            }

            struct Profile {
                address user;
                string name;
                string bio;
                string image;
            }

            struct Like {
                uint256 id;
                address liker;
                uint256 tweetId;
                uint256 timestamp;
                bool deleted;
            }

            struct Comment {
                uint256 id;
                address commenter;
                uint256 tweetId;
                string content;
                uint256 timestamp;
                bool deleted;
            }

            function getAllTweets() external view returns (Tweet[] memory);
            function getUserTweets(address user) external view returns (Tweet[] memory);
            function getProfile(address user) external view returns (Profile memory);
            function getLikesOfTweet(uint256 tweetId) external view returns (Like[] memory);
            function getCommentsOfTweet(uint256 tweetId) external view returns (Comment[] memory);

            function createTweet(string memory content) external;
            function editTweet(uint256 id, string memory content) external;
            function deleteTweet(uint256 id) external;
            function createProfile(string memory name, string memory bio, string memory image) external;
            function editProfile(string memory name, string memory bio, string memory image) external;
            function createLike(uint256 tweetId) external;
            function deleteLike(uint256 likeId) external;
            function createComment(string memory content, uint256 tweetId) external;
        }
    }
}

use abi::Twitter::TwitterInstance;

fn to_address(account: &Account) -> Result<Address> {
    Address::from_str(account.as_str()).map_err(|_| DtweetError::InvalidAccount {
        value: account.to_string(),
    })
}

fn to_account(address: Address) -> Result<Account> {
    format!("{address:#x}").parse()
}

fn to_u64(value: U256) -> u64 {
    value.saturating_to::<u64>()
}

fn call_error(e: impl std::fmt::Display) -> DtweetError {
    let message = e.to_string();
    let code = if message.to_lowercase().contains("insufficient funds") {
        Some("INSUFFICIENT_FUNDS")
    } else {
        None
    };
    DtweetError::contract_call(code, message)
}

fn tweet(raw: abi::Twitter::Tweet) -> Result<Tweet> {
    Ok(Tweet {
        id: to_u64(raw.id),
        author: to_account(raw.author)?,
        content: raw.content,
        timestamp: to_u64(raw.timestamp),
        like_count: to_u64(raw.likeCount),
        deleted: raw.deleted,
    })
}

/// Deployed contract behind a signing provider.
pub struct EvmContract {
    provider: DynProvider,
    contract: TwitterInstance<DynProvider>,
    signer: Account,
    confirm_timeout: Duration,
    poll_interval: Duration,
}

impl EvmContract {
    /// Connect to `network.rpc_url` and bind the configured contract.
    ///
    /// # Errors
    ///
    /// Fails when the contract address or private key is missing or
    /// malformed, the endpoint is unreachable, or the chain id does not
    /// match the configured one.
    pub async fn connect(config: &Config) -> Result<Self> {
        let address = to_address(&config.contract_address()?)?;
        let key = config
            .wallet
            .private_key
            .as_deref()
            .ok_or(DtweetError::WalletNotFound)?;
        let signer = PrivateKeySigner::from_str(key.trim()).map_err(|e| {
            DtweetError::WalletRejected {
                reason: format!("invalid private key: {e}"),
            }
        })?;
        let account = to_account(signer.address())?;

        let provider = ProviderBuilder::new()
            .wallet(EthereumWallet::from(signer))
            .connect(&config.network.rpc_url)
            .await
            .map_err(|e| DtweetError::BackendUnavailable {
                backend: "evm",
                reason: e.to_string(),
            })?
            .erased();

        if let Some(expected) = config.network.chain_id {
            let actual = provider.get_chain_id().await.map_err(call_error)?;
            if actual != expected {
                return Err(DtweetError::BackendUnavailable {
                    backend: "evm",
                    reason: format!("connected to chain {actual}, expected {expected}"),
                });
            }
        }

        info!(
            rpc = %config.network.rpc_url,
            contract = %address,
            signer = %account,
            "Connected to contract"
        );
        Ok(Self {
            contract: TwitterInstance::new(address, provider.clone()),
            provider,
            signer: account,
            confirm_timeout: Duration::from_secs(config.network.confirm_timeout_secs),
            poll_interval: Duration::from_millis(config.network.poll_interval_ms.max(50)),
        })
    }

    /// The account transactions are signed with.
    #[must_use]
    pub const fn signer(&self) -> &Account {
        &self.signer
    }
}

#[async_trait]
impl TwitterContract for EvmContract {
    async fn get_all_tweets(&self) -> Result<Vec<Tweet>> {
        let raw = self.contract.getAllTweets().call().await.map_err(call_error)?;
        raw.into_iter().map(tweet).collect()
    }

    async fn get_user_tweets(&self, user: &Account) -> Result<Vec<Tweet>> {
        let raw = self
            .contract
            .getUserTweets(to_address(user)?)
            .call()
            .await
            .map_err(call_error)?;
        raw.into_iter().map(tweet).collect()
    }

    async fn get_profile(&self, user: &Account) -> Result<Profile> {
        let raw = self
            .contract
            .getProfile(to_address(user)?)
            .call()
            .await
            .map_err(call_error)?;
        // An unset profile decodes with the zero address.
        let owner = if raw.user == Address::ZERO {
            user.clone()
        } else {
            to_account(raw.user)?
        };
        Ok(Profile {
            user: owner,
            name: raw.name,
            bio: raw.bio,
            image: raw.image,
        })
    }

    async fn get_likes_of_tweet(&self, tweet_id: TweetId) -> Result<Vec<Like>> {
        let raw = self
            .contract
            .getLikesOfTweet(U256::from(tweet_id))
            .call()
            .await
            .map_err(call_error)?;
        raw.into_iter()
            .map(|l| {
                Ok(Like {
                    id: to_u64(l.id),
                    liker: to_account(l.liker)?,
                    tweet_id: to_u64(l.tweetId),
                    timestamp: to_u64(l.timestamp),
                    deleted: l.deleted,
                })
            })
            .collect()
    }

    async fn get_comments_of_tweet(&self, tweet_id: TweetId) -> Result<Vec<Comment>> {
        let raw = self
            .contract
            .getCommentsOfTweet(U256::from(tweet_id))
            .call()
            .await
            .map_err(call_error)?;
        raw.into_iter()
            .map(|c| {
                Ok(Comment {
                    id: to_u64(c.id),
                    commenter: to_account(c.commenter)?,
                    tweet_id: to_u64(c.tweetId),
                    content: c.content,
                    timestamp: to_u64(c.timestamp),
                    deleted: c.deleted,
                })
            })
            .collect()
    }

    async fn submit(&self, from: &Account, call: ContractCall) -> Result<TxHash> {
        if from != &self.signer {
            return Err(DtweetError::WalletRejected {
                reason: format!("{from} is not the configured signer"),
            });
        }
        let c = &self.contract;
        let pending = match call {
            ContractCall::CreateTweet { content } => c.createTweet(content).send().await,
            ContractCall::EditTweet { id, content } => {
                c.editTweet(U256::from(id), content).send().await
            }
            ContractCall::DeleteTweet { id } => c.deleteTweet(U256::from(id)).send().await,
            ContractCall::CreateLike { tweet_id } => {
                c.createLike(U256::from(tweet_id)).send().await
            }
            ContractCall::DeleteLike { like_id } => c.deleteLike(U256::from(like_id)).send().await,
            ContractCall::CreateComment { content, tweet_id } => {
                c.createComment(content, U256::from(tweet_id)).send().await
            }
            ContractCall::CreateProfile { name, bio, image } => {
                c.createProfile(name, bio, image).send().await
            }
            ContractCall::EditProfile { name, bio, image } => {
                c.editProfile(name, bio, image).send().await
            }
        }
        .map_err(call_error)?;
        Ok(TxHash(format!("{:#x}", pending.tx_hash())))
    }

    async fn wait_for_receipt(&self, tx: &TxHash) -> Result<Receipt> {
        let hash = B256::from_str(&tx.0).map_err(|_| DtweetError::UnknownTransaction {
            hash: tx.0.clone(),
        })?;

        let poll = async {
            loop {
                match self.provider.get_transaction_receipt(hash).await {
                    Ok(Some(receipt)) => return Ok(receipt),
                    Ok(None) => debug!(tx_hash = %tx, "Receipt not available yet"),
                    Err(e) => warn!(tx_hash = %tx, error = %e, "Receipt lookup failed"),
                }
                tokio::time::sleep(self.poll_interval).await;
            }
        };
        let receipt: alloy::rpc::types::TransactionReceipt =
            match tokio::time::timeout(self.confirm_timeout, poll).await {
                Ok(Ok(receipt)) => receipt,
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    return Err(DtweetError::contract_call(
                        Some("TIMEOUT"),
                        format!(
                            "timed out after {}s waiting for {tx}",
                            self.confirm_timeout.as_secs()
                        ),
                    ));
                }
            };

        if !receipt.status() {
            return Err(DtweetError::TransactionReverted { hash: tx.0.clone() });
        }
        Ok(Receipt {
            tx_hash: tx.clone(),
            block_number: receipt.block_number.unwrap_or_default(),
            gas_used: receipt.gas_used,
        })
    }
}

/// Wallet holding a single private-key account. It never changes accounts.
pub struct PrivateKeyWallet {
    account: Account,
    notifier: broadcast::Sender<Vec<Account>>,
}

impl PrivateKeyWallet {
    #[must_use]
    pub fn new(account: Account) -> Self {
        let (notifier, _) = broadcast::channel(1);
        Self { account, notifier }
    }
}

#[async_trait]
impl WalletProvider for PrivateKeyWallet {
    async fn request_accounts(&self) -> Result<Vec<Account>> {
        Ok(vec![self.account.clone()])
    }

    fn accounts(&self) -> Vec<Account> {
        vec![self.account.clone()]
    }

    fn subscribe(&self) -> broadcast::Receiver<Vec<Account>> {
        self.notifier.subscribe()
    }
}

/// Contract plus matching wallet for the evm backend.
///
/// # Errors
///
/// See [`EvmContract::connect`].
pub async fn open(config: &Config) -> Result<(Arc<EvmContract>, Arc<PrivateKeyWallet>)> {
    let contract = EvmContract::connect(config).await?;
    let wallet = PrivateKeyWallet::new(contract.signer().clone());
    Ok((Arc::new(contract), Arc::new(wallet)))
}
