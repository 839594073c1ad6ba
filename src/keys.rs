//! Signing key resolution and the external signer seam
//!
//! Keys are resolved per operation from a [`KeyStore`] and handed to the node
//! client inside a [`SigningKeys`] value that lives for one call only. Nothing
//! in this crate keeps key material between calls.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;
use thiserror::Error;

use crate::rpc::RpcError;

/// Authority a key grants on the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyRole {
    Active,
    Memo,
}

impl KeyRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyRole::Active => "active",
            KeyRole::Memo => "memo",
        }
    }
}

impl fmt::Display for KeyRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum KeyError {
    #[error("No {role} key available for account {account}")]
    NotFound { account: String, role: KeyRole },

    #[error("Key store unavailable: {0}")]
    Unavailable(String),
}

/// Private keys for one account, scoped to a single operation.
///
/// Deliberately not `Clone`; `Debug` never prints key material.
pub struct SigningKeys {
    account: String,
    keys: Vec<(KeyRole, String)>,
}

impl SigningKeys {
    pub fn new(account: impl Into<String>, keys: Vec<(KeyRole, String)>) -> Self {
        Self {
            account: account.into(),
            keys,
        }
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    pub fn get(&self, role: KeyRole) -> Option<&str> {
        self.keys
            .iter()
            .find(|(r, _)| *r == role)
            .map(|(_, k)| k.as_str())
    }

    pub fn roles(&self) -> impl Iterator<Item = KeyRole> + '_ {
        self.keys.iter().map(|(r, _)| *r)
    }
}

impl fmt::Debug for SigningKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKeys")
            .field("account", &self.account)
            .field("roles", &self.roles().collect::<Vec<_>>())
            .finish()
    }
}

/// Source of private keys (a database table, a vault, the environment)
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// Resolve every requested role for `account`, or fail on the first
    /// missing one.
    async fn signing_keys(&self, account: &str, roles: &[KeyRole])
    -> Result<SigningKeys, KeyError>;
}

/// Reads keys from `<PREFIX>_<ACCOUNT>_<ROLE>` environment variables on
/// every call.
///
/// Account names are upper-cased with `-` and `.` replaced by `_`, so the
/// active key of `some-guy.123` is `LEDGER_KEY_SOME_GUY_123_ACTIVE`.
#[derive(Debug, Clone)]
pub struct EnvKeyStore {
    prefix: String,
}

impl EnvKeyStore {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn var_name(&self, account: &str, role: KeyRole) -> String {
        let account: String = account
            .chars()
            .map(|c| match c {
                '-' | '.' => '_',
                c => c.to_ascii_uppercase(),
            })
            .collect();
        format!(
            "{}_{}_{}",
            self.prefix,
            account,
            role.as_str().to_ascii_uppercase()
        )
    }
}

impl Default for EnvKeyStore {
    fn default() -> Self {
        Self::new("LEDGER_KEY")
    }
}

#[async_trait]
impl KeyStore for EnvKeyStore {
    async fn signing_keys(
        &self,
        account: &str,
        roles: &[KeyRole],
    ) -> Result<SigningKeys, KeyError> {
        let mut keys = Vec::with_capacity(roles.len());
        for role in roles {
            match std::env::var(self.var_name(account, *role)) {
                Ok(k) if !k.trim().is_empty() => keys.push((*role, k.trim().to_string())),
                _ => {
                    return Err(KeyError::NotFound {
                        account: account.to_string(),
                        role: *role,
                    });
                }
            }
        }
        Ok(SigningKeys::new(account, keys))
    }
}

/// In-memory key store for hosts that load keys themselves
#[derive(Debug, Default)]
pub struct MemoryKeyStore {
    keys: RwLock<HashMap<(String, KeyRole), String>>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, account: &str, role: KeyRole, key: impl Into<String>) {
        if let Ok(mut keys) = self.keys.write() {
            keys.insert((account.to_lowercase(), role), key.into());
        }
    }

    pub fn remove(&self, account: &str, role: KeyRole) {
        if let Ok(mut keys) = self.keys.write() {
            keys.remove(&(account.to_lowercase(), role));
        }
    }
}

#[async_trait]
impl KeyStore for MemoryKeyStore {
    async fn signing_keys(
        &self,
        account: &str,
        roles: &[KeyRole],
    ) -> Result<SigningKeys, KeyError> {
        let store = self
            .keys
            .read()
            .map_err(|_| KeyError::Unavailable("key store lock poisoned".to_string()))?;

        let mut keys = Vec::with_capacity(roles.len());
        for role in roles {
            let key = store
                .get(&(account.to_lowercase(), *role))
                .ok_or_else(|| KeyError::NotFound {
                    account: account.to_string(),
                    role: *role,
                })?;
            keys.push((*role, key.clone()));
        }
        Ok(SigningKeys::new(account, keys))
    }
}

/// Ledger client signing machinery, provided by the host
#[async_trait]
pub trait TransactionSigner: Send + Sync {
    /// Attach signatures to a prepared transaction for `chain_id`.
    ///
    /// Returns `RpcError::MissingAuthority` when `keys` cannot satisfy the
    /// transaction's required authorities.
    async fn sign_transaction(
        &self,
        chain_id: &str,
        tx: Value,
        keys: &SigningKeys,
    ) -> Result<Value, RpcError>;

    /// Encrypt a Graphene memo from the holder of `keys` to `to_memo_key`.
    async fn encrypt_memo(
        &self,
        keys: &SigningKeys,
        to_memo_key: &str,
        memo: &str,
    ) -> Result<Value, RpcError>;

    /// Decrypt a Graphene memo object; `None` if these keys cannot read it.
    fn decrypt_memo(&self, keys: &SigningKeys, memo: &Value) -> Option<String>;
}

/// Signer for read-only tooling: every signing request fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineSigner;

#[async_trait]
impl TransactionSigner for OfflineSigner {
    async fn sign_transaction(
        &self,
        _chain_id: &str,
        _tx: Value,
        keys: &SigningKeys,
    ) -> Result<Value, RpcError> {
        Err(RpcError::MissingAuthority(format!(
            "no signer configured for account {}",
            keys.account()
        )))
    }

    async fn encrypt_memo(
        &self,
        keys: &SigningKeys,
        _to_memo_key: &str,
        _memo: &str,
    ) -> Result<Value, RpcError> {
        Err(RpcError::MissingAuthority(format!(
            "no signer configured for account {}",
            keys.account()
        )))
    }

    fn decrypt_memo(&self, _keys: &SigningKeys, _memo: &Value) -> Option<String> {
        None
    }
}
