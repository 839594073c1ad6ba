//! Ledger Backends
//!
//! One [`LedgerBackend`] per network. The transfer coordinator and the
//! registry only ever see the trait.
//!
//! | Backend | Network | Fee model |
//! |---|---|---|
//! | [`GrapheneBackend`] | BitShares-style ledger with on-chain fee market | fee taken from the transferred asset |
//! | [`SteemBackend`] | Steem (DPoS) | fee-free |
//! | [`EngineBackend`] | Steem Engine sidechain tokens | fee-free |
//!
//! Every operation re-reads asset, account and balance state from the
//! network. Nothing is cached between calls.

pub mod engine;
pub mod engine_node;
pub mod graphene;
pub mod graphene_node;
pub mod registry;
pub mod steem;
pub mod steem_node;
pub mod tx;

pub use engine::{EngineApi, EngineBackend};
pub use engine_node::EngineNode;
pub use graphene::{GrapheneApi, GrapheneBackend};
pub use graphene_node::GrapheneNode;
pub use registry::BackendRegistry;
pub use steem::{SteemApi, SteemBackend};
pub use steem_node::SteemNode;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::config::CoinConfig;
use crate::error::LedgerError;
use crate::health::HealthReport;
use crate::types::{DepositTarget, TransferResult};

/// Uniform contract over one coin on one ledger
#[async_trait]
pub trait LedgerBackend: Send + Sync {
    /// Backend name for logs and health reports
    fn name(&self) -> &'static str;

    /// Upper-case coin symbol this backend serves
    fn symbol(&self) -> &str;

    /// Platform account: default sender, deposit receiver, fallback mint target
    fn platform_account(&self) -> Option<&str>;

    /// Balance of `account` (platform account if `None`).
    ///
    /// With a non-blank `memo`, the total received under that memo instead.
    async fn balance(
        &self,
        account: Option<&str>,
        memo: Option<&str>,
        memo_case_sensitive: bool,
    ) -> Result<Decimal, LedgerError>;

    /// Whether the account exists. Never fails; errors count as invalid.
    async fn address_valid(&self, account: &str) -> bool;

    /// Where deposits for this coin go. The caller generates the memo.
    fn deposit_target(&self) -> Option<DepositTarget> {
        self.platform_account().map(DepositTarget::account)
    }

    /// Mint `amount` to `to`.
    async fn issue(
        &self,
        amount: Decimal,
        to: &str,
        memo: Option<&str>,
    ) -> Result<TransferResult, LedgerError>;

    /// Transfer `amount` from `from` (platform account if `None`) to `to`.
    async fn send(
        &self,
        amount: Decimal,
        to: &str,
        from: Option<&str>,
        memo: Option<&str>,
    ) -> Result<TransferResult, LedgerError>;

    /// Structured status for operator display. Never fails.
    async fn health_check(&self) -> HealthReport;

    async fn health_test(&self) -> bool {
        self.health_check().await.status.is_okay()
    }
}

/// Per-coin settings every backend carries
#[derive(Debug, Clone)]
pub struct BackendSettings {
    pub symbol: String,
    pub display_name: String,
    pub our_account: Option<String>,
}

impl BackendSettings {
    pub fn new(symbol: &str, our_account: Option<&str>) -> Self {
        let symbol = symbol.trim().to_uppercase();
        Self {
            display_name: symbol.clone(),
            symbol,
            our_account: our_account
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .map(String::from),
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    /// Explicit source first, then the platform account.
    pub fn resolve_source(&self, from: Option<&str>) -> Result<String, LedgerError> {
        match from.map(str::trim).filter(|f| !f.is_empty()) {
            Some(from) => Ok(from.to_string()),
            None => self.our_account.clone().ok_or_else(|| {
                LedgerError::Configuration(format!(
                    "Both the source account and the {} platform account are empty. Cannot send.",
                    self.symbol
                ))
            }),
        }
    }

    /// Account for a balance query: the argument, else the platform account.
    pub fn resolve_account(&self, account: Option<&str>) -> Result<String, LedgerError> {
        match account.map(str::trim).filter(|a| !a.is_empty()) {
            Some(account) => Ok(account.to_string()),
            None => self.our_account.clone().ok_or_else(|| {
                LedgerError::Configuration(format!(
                    "No account given and no {} platform account configured",
                    self.symbol
                ))
            }),
        }
    }
}

impl From<&CoinConfig> for BackendSettings {
    fn from(coin: &CoinConfig) -> Self {
        let settings = BackendSettings::new(&coin.symbol, coin.platform_account().as_deref());
        match &coin.display_name {
            Some(name) => settings.with_display_name(name),
            None => settings,
        }
    }
}


#[cfg(test)]
pub use mock::MockBackend;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_source_prefers_explicit() {
        let settings = BackendSettings::new("sgtk", Some("privex"));
        assert_eq!(settings.symbol, "SGTK");
        assert_eq!(settings.resolve_source(Some("alice")).unwrap(), "alice");
        assert_eq!(settings.resolve_source(None).unwrap(), "privex");
        assert_eq!(settings.resolve_source(Some("  ")).unwrap(), "privex");
    }

    #[test]
    fn test_resolve_source_without_any_account() {
        let settings = BackendSettings::new("SGTK", None);
        let err = settings.resolve_source(None).unwrap_err();
        assert_eq!(err.code(), "CONFIGURATION_ERROR");
        assert_eq!(
            settings.resolve_account(None).unwrap_err().code(),
            "CONFIGURATION_ERROR"
        );
    }

    #[tokio::test]
    async fn test_default_deposit_target_uses_platform_account() {
        let backend = MockBackend::new("SGTK", Some("privex"));
        let target = backend.deposit_target().unwrap();
        assert_eq!(target.account, "privex");

        let backend = MockBackend::new("SGTK", None);
        assert!(backend.deposit_target().is_none());
    }

    #[tokio::test]
    async fn test_health_test_reflects_status() {
        let backend = MockBackend::new("SGTK", Some("privex"));
        assert!(backend.health_test().await);
    }
}
