use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use thiserror::Error;

use crate::logging;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config yaml: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    /// Per-component level overrides, keyed by `logging::LOG_TARGETS` names
    #[serde(default)]
    pub log_targets: BTreeMap<String, String>,
    /// Per-request timeout for every ledger node
    #[serde(default = "default_rpc_timeout_secs")]
    pub rpc_timeout_secs: u64,
    /// Environment variable prefix used by the key store
    #[serde(default = "default_key_env_prefix")]
    pub key_env_prefix: String,
    #[serde(default)]
    pub graphene: Option<GrapheneNodeConfig>,
    #[serde(default)]
    pub steem: Option<SteemNodeConfig>,
    #[serde(default)]
    pub steem_engine: Option<EngineNodeConfig>,
    #[serde(default)]
    pub coins: Vec<CoinConfig>,
}

/// Graphene (BitShares-style) node
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GrapheneNodeConfig {
    pub url: String,
}

/// Steem node (condenser API)
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SteemNodeConfig {
    pub url: String,
    #[serde(default = "default_steem_chain_id")]
    pub chain_id: String,
}

/// Steem Engine sidechain endpoints
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EngineNodeConfig {
    /// Contracts RPC, e.g. `https://api.steem-engine.com/rpc/contracts`
    pub rpc_url: String,
    /// Account history REST endpoint
    pub history_url: String,
    /// `custom_json` id the sidechain listens to
    #[serde(default = "default_sidechain_id")]
    pub sidechain_id: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Graphene,
    Steem,
    SteemEngine,
}

/// One supported coin
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CoinConfig {
    pub symbol: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub kind: BackendKind,
    /// Platform account: default sender, deposit receiver, fallback mint target
    #[serde(default)]
    pub our_account: Option<String>,
}

impl CoinConfig {
    /// Configured platform account, if non-blank
    pub fn platform_account(&self) -> Option<String> {
        self.our_account
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(String::from)
    }
}

fn default_rpc_timeout_secs() -> u64 {
    30
}

fn default_key_env_prefix() -> String {
    "LEDGER_KEY".to_string()
}

fn default_steem_chain_id() -> String {
    "0".repeat(64)
}

fn default_sidechain_id() -> String {
    "ssc-mainnet1".to_string()
}

impl AppConfig {
    /// Load and validate `config/<env>.yaml`
    pub fn load(env: &str) -> Result<Self, ConfigError> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path).map_err(|source| ConfigError::Io {
            path: config_path.clone(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig =
            serde_yaml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Every coin needs the node sections its backend talks to, and
    /// symbols must be unique.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, level) in &self.log_targets {
            if logging::target_module(name).is_none() {
                return Err(ConfigError::Invalid(format!("unknown log target `{}`", name)));
            }
            if !logging::LEVELS.contains(&level.trim()) {
                return Err(ConfigError::Invalid(format!(
                    "log target `{}` has invalid level `{}`",
                    name, level
                )));
            }
        }

        let mut seen = HashSet::new();
        for coin in &self.coins {
            let symbol = coin.symbol.trim().to_uppercase();
            if symbol.is_empty() {
                return Err(ConfigError::Invalid("coin with empty symbol".into()));
            }
            if !seen.insert(symbol.clone()) {
                return Err(ConfigError::Invalid(format!("duplicate coin {}", symbol)));
            }

            let missing = match coin.kind {
                BackendKind::Graphene if self.graphene.is_none() => Some("graphene"),
                BackendKind::Steem if self.steem.is_none() => Some("steem"),
                BackendKind::SteemEngine if self.steem_engine.is_none() => Some("steem_engine"),
                BackendKind::SteemEngine if self.steem.is_none() => Some("steem"),
                _ => None,
            };
            if let Some(section) = missing {
                return Err(ConfigError::Invalid(format!(
                    "coin {} needs a `{}` section",
                    symbol, section
                )));
            }
        }
        Ok(())
    }
}
