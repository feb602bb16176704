//! Configuration system for dtweet.
//!
//! Provides layered configuration from multiple sources:
//!
//! 1. **Compiled defaults** - a local ledger with the well-known dev accounts
//! 2. **User config file** - `~/.config/dtweet/config.toml`
//! 3. **Environment variables** - `DTWEET_*` prefix
//! 4. **CLI arguments** - Highest priority, always wins
//!
//! # Example Configuration File
//!
//! ```toml
//! [network]
//! backend = "evm"
//! rpc_url = "https://sepolia.example/rpc"
//! contract_address = "0x5fbdb2315678afecb367f032d93f642f64180aa3"
//! chain_id = 11155111
//!
//! [wallet]
//! accounts = []
//!
//! [ledger]
//! path = "~/.local/share/dtweet/ledger.json"
//!
//! [social]
//! cache_capacity = 256
//!
//! [output]
//! format = "text"
//! colors = true
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, error, info, warn};

use crate::error::{DtweetError, Result};
use crate::model::Account;
use crate::social::DEFAULT_CACHE_CAPACITY;

/// Accounts exposed by the local wallet when none are configured.
pub const DEV_ACCOUNTS: [&str; 3] = [
    "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266",
    "0x70997970c51812dc3a010c7d01b50e0d17dc79c8",
    "0x3c44cdddb6a900fa2b585dd299e03d12fa4293bc",
];

/// Main configuration structure for dtweet.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Chain and contract location.
    pub network: NetworkConfig,
    /// Signing accounts.
    pub wallet: WalletConfig,
    /// Local ledger backend.
    pub ledger: LedgerConfig,
    /// Likes and comments panels.
    pub social: SocialConfig,
    /// Output formatting configuration.
    pub output: OutputConfig,
}

/// Where contract calls go.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// In-process ledger persisted to a JSON file.
    #[default]
    Local,
    /// Deployed contract over JSON-RPC.
    Evm,
}

impl Backend {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Evm => "evm",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" | "ledger" => Ok(Self::Local),
            "evm" | "rpc" | "chain" => Ok(Self::Evm),
            _ => Err(format!("Invalid backend: {s}")),
        }
    }
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Environment variable: `DTWEET_BACKEND`
    pub backend: Backend,

    /// JSON-RPC endpoint for the evm backend.
    /// Environment variable: `DTWEET_RPC_URL`
    pub rpc_url: String,

    /// Deployed Twitter contract.
    /// Environment variable: `DTWEET_CONTRACT_ADDRESS`
    pub contract_address: Option<String>,

    /// Expected chain id; checked against the provider when set.
    pub chain_id: Option<u64>,

    /// How long to wait for a receipt before giving up.
    pub confirm_timeout_secs: u64,

    /// Receipt polling interval.
    pub poll_interval_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Local,
            rpc_url: "http://127.0.0.1:8545".to_string(),
            contract_address: None,
            chain_id: None,
            confirm_timeout_secs: 120,
            poll_interval_ms: 1000,
        }
    }
}

/// Wallet configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WalletConfig {
    /// Accounts the local wallet exposes, first one active.
    pub accounts: Vec<String>,

    /// Hex private key for the evm backend.
    /// Environment variable: `DTWEET_PRIVATE_KEY`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
}

/// Local ledger configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Ledger file. Environment variable: `DTWEET_LEDGER`
    pub path: Option<PathBuf>,

    /// Balance charged per transaction (0 disables gas accounting).
    pub gas_fee: u64,
}

/// Social panel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SocialConfig {
    /// Tweets whose likes (and, separately, comments) stay cached.
    pub cache_capacity: usize,
}

impl Default for SocialConfig {
    fn default() -> Self {
        Self {
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

/// Output formatting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Default output format: text, json, json-pretty.
    pub format: String,

    /// Enable colored output.
    pub colors: bool,

    /// Suppress non-essential output (spinners, hints).
    pub quiet: bool,

    /// Column at which tweet bodies wrap.
    pub wrap_width: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: "text".to_string(),
            colors: true,
            quiet: false,
            wrap_width: 72,
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables
    /// 2. User config file (~/.config/dtweet/config.toml)
    /// 3. Compiled defaults
    #[must_use]
    pub fn load() -> Self {
        let mut config = Self::default();

        if let Some(user_config) = Self::load_user_config() {
            config.merge(user_config);
        }

        config.apply_env_overrides();

        debug!("Configuration loaded: {:?}", config.redacted());
        config
    }

    /// Load with an explicit config file in place of the user file.
    ///
    /// # Errors
    ///
    /// Returns [`DtweetError::ConfigError`] if the explicit file cannot be
    /// read or parsed. A missing user file is not an error.
    pub fn load_with(explicit: Option<&Path>) -> Result<Self> {
        let Some(path) = explicit else {
            return Ok(Self::load());
        };
        let mut config = Self::default();
        config.merge(Self::read_file(path)?);
        config.apply_env_overrides();
        debug!("Configuration loaded: {:?}", config.redacted());
        Ok(config)
    }

    /// Load configuration from a specific file.
    #[must_use]
    pub fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            debug!("Config file not found: {}", path.display());
            return None;
        }

        match Self::read_file(path) {
            Ok(config) => {
                info!("Loaded config from: {}", path.display());
                Some(config)
            }
            Err(e) => {
                warn!("{e}");
                None
            }
        }
    }

    fn read_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| DtweetError::ConfigError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        toml::from_str(&content).map_err(|e| DtweetError::ConfigError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    fn load_user_config() -> Option<Self> {
        let config_path = Self::user_config_path()?;
        Self::load_from_file(&config_path)
    }

    /// Get the path to the user configuration file.
    #[must_use]
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("dtweet").join("config.toml"))
    }

    fn apply_env_overrides(&mut self) {
        self.apply_env_from(|var| std::env::var(var).ok());
    }

    /// Apply `DTWEET_*` overrides using `lookup` to read variables.
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(backend) = lookup("DTWEET_BACKEND") {
            match backend.parse() {
                Ok(b) => self.network.backend = b,
                Err(e) => warn!("Ignoring DTWEET_BACKEND: {e}"),
            }
        }
        if let Some(url) = lookup("DTWEET_RPC_URL") {
            self.network.rpc_url = url;
        }
        if let Some(address) = lookup("DTWEET_CONTRACT_ADDRESS") {
            self.network.contract_address = Some(address);
        }
        if let Some(timeout) = lookup("DTWEET_CONFIRM_TIMEOUT") {
            match timeout.parse() {
                Ok(n) => self.network.confirm_timeout_secs = n,
                Err(e) => warn!("Ignoring DTWEET_CONFIRM_TIMEOUT: {e}"),
            }
        }

        if let Some(key) = lookup("DTWEET_PRIVATE_KEY") {
            self.wallet.private_key = Some(key);
        }

        if let Some(path) = lookup("DTWEET_LEDGER") {
            self.ledger.path = Some(PathBuf::from(path));
        }

        if let Some(format) = lookup("DTWEET_FORMAT") {
            self.output.format = format;
        }
        if lookup("DTWEET_NO_COLOR").is_some() || lookup("NO_COLOR").is_some() {
            self.output.colors = false;
        }
        if lookup("DTWEET_QUIET").is_some() {
            self.output.quiet = true;
        }
    }

    /// Merge another config into this one (other takes precedence).
    fn merge(&mut self, other: Self) {
        // Network
        self.network.backend = other.network.backend;
        self.network.rpc_url = other.network.rpc_url;
        if other.network.contract_address.is_some() {
            self.network.contract_address = other.network.contract_address;
        }
        if other.network.chain_id.is_some() {
            self.network.chain_id = other.network.chain_id;
        }
        self.network.confirm_timeout_secs = other.network.confirm_timeout_secs;
        self.network.poll_interval_ms = other.network.poll_interval_ms;

        // Wallet
        if !other.wallet.accounts.is_empty() {
            self.wallet.accounts = other.wallet.accounts;
        }
        if other.wallet.private_key.is_some() {
            self.wallet.private_key = other.wallet.private_key;
        }

        // Ledger
        if other.ledger.path.is_some() {
            self.ledger.path = other.ledger.path;
        }
        self.ledger.gas_fee = other.ledger.gas_fee;

        self.social.cache_capacity = other.social.cache_capacity;

        // Output
        self.output.format = other.output.format;
        self.output.colors = other.output.colors;
        self.output.quiet = other.output.quiet;
        self.output.wrap_width = other.output.wrap_width;
    }

    /// Get the ledger path, using defaults if not configured.
    #[must_use]
    pub fn ledger_path(&self) -> PathBuf {
        self.ledger
            .path
            .clone()
            .unwrap_or_else(crate::default_ledger_path)
    }

    /// The deployed contract address.
    ///
    /// # Errors
    ///
    /// Returns [`DtweetError::ContractAddressMissing`] when the address is
    /// unset, empty, the literal `undefined`, or not a 20-byte hex address.
    pub fn contract_address(&self) -> Result<Account> {
        let raw = self
            .network
            .contract_address
            .as_deref()
            .map(str::trim)
            .unwrap_or_default();
        if raw.is_empty() || raw.eq_ignore_ascii_case("undefined") {
            return Err(DtweetError::ContractAddressMissing {
                value: raw.to_string(),
            });
        }
        raw.parse().map_err(|_| DtweetError::ContractAddressMissing {
            value: raw.to_string(),
        })
    }

    /// Log the startup contract-address check. Never fails.
    ///
    /// Only the evm backend needs an address, so the loud error is reserved
    /// for it.
    pub fn check_contract_address(&self) -> bool {
        match self.contract_address() {
            Ok(address) => {
                debug!(contract = %address, "Contract address configured");
                true
            }
            Err(e) if self.network.backend == Backend::Evm => {
                error!("{e}");
                false
            }
            Err(e) => {
                debug!("{e}");
                false
            }
        }
    }

    /// Accounts for the local wallet: configured ones, else the dev accounts.
    ///
    /// # Errors
    ///
    /// Returns [`DtweetError::InvalidAccount`] for a malformed entry.
    pub fn local_accounts(&self) -> Result<Vec<Account>> {
        if self.wallet.accounts.is_empty() {
            return DEV_ACCOUNTS.iter().map(|a| a.parse()).collect();
        }
        self.wallet.accounts.iter().map(|a| a.parse()).collect()
    }

    /// Copy with secrets masked, for logging and `config show`.
    #[must_use]
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.wallet.private_key.is_some() {
            copy.wallet.private_key = Some("<redacted>".to_string());
        }
        copy
    }

    /// Save the current configuration to the user config file.
    ///
    /// # Errors
    ///
    /// Returns an error if the config directory cannot be determined,
    /// the parent directory cannot be created, or the file cannot be written.
    pub fn save(&self) -> std::io::Result<()> {
        let config_path = Self::user_config_path().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "Could not determine config directory",
            )
        })?;
        self.save_to(&config_path)?;
        info!("Saved config to: {}", config_path.display());
        Ok(())
    }

    /// Save to an explicit path.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory cannot be created or the file
    /// cannot be written.
    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        std::fs::write(path, content)
    }
}
