//! Steem Engine backend
//!
//! Sidechain tokens. State is read from the sidechain contracts API; every
//! mutation is a Steem `custom_json` operation under the sidechain id, signed
//! with the active key of the sending (or issuing) Steem account.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::steem::{SteemApi, SteemOp};
use super::{BackendSettings, LedgerBackend};
use crate::amount::{checked_amount, format_amount, truncate};
use crate::error::LedgerError;
use crate::health::HealthReport;
use crate::keys::{KeyRole, KeyStore};
use crate::memo::{self, MemoFilter};
use crate::rpc::RpcError;
use crate::types::{SendType, TransferRecord, TransferResult};

/// Most history entries scanned for a memo balance
pub const HISTORY_LIMIT: u32 = 1_000;

/// Contract that owns every sidechain token
pub const TOKENS_CONTRACT: &str = "tokens";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineToken {
    pub symbol: String,
    pub name: String,
    /// Steem account that may issue the token
    pub issuer: String,
    pub precision: u32,
}

#[async_trait]
pub trait EngineApi: Send + Sync {
    fn node_url(&self) -> &str;

    async fn get_token(&self, symbol: &str) -> Result<Option<EngineToken>, RpcError>;

    /// Liquid balance; `None` if the account never held the token.
    async fn get_balance(&self, account: &str, symbol: &str) -> Result<Option<Decimal>, RpcError>;

    async fn transfer_history(
        &self,
        account: &str,
        symbol: &str,
        limit: u32,
    ) -> Result<Vec<TransferRecord>, RpcError>;
}

/// Contract action payload for a token issue or transfer
fn contract_json(action: &str, symbol: &str, to: &str, quantity: &str, memo: Option<&str>) -> String {
    let mut payload = json!({
        "symbol": symbol,
        "to": to,
        "quantity": quantity,
    });
    if let Some(memo) = memo {
        payload["memo"] = json!(memo);
    }
    json!({
        "contractName": TOKENS_CONTRACT,
        "contractAction": action,
        "contractPayload": payload,
    })
    .to_string()
}

/// Map a sidechain error message onto the ledger taxonomy.
fn classify_sidechain_error(message: String) -> LedgerError {
    let lower = message.to_lowercase();
    if lower.contains("symbol does not exist") || lower.contains("token does not exist") {
        LedgerError::TokenNotFound(message)
    } else if lower.contains("account does not exist") || lower.contains("invalid to") {
        LedgerError::AccountNotFound(message)
    } else {
        LedgerError::Remote(message)
    }
}

fn is_overdrawn(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("overdrawn balance") || lower.contains("not enough balance")
}

pub struct EngineBackend {
    settings: BackendSettings,
    engine: Arc<dyn EngineApi>,
    steem: Arc<dyn SteemApi>,
    keys: Arc<dyn KeyStore>,
    sidechain_id: String,
}

#[derive(Default)]
struct HealthValues {
    token_name: String,
    issuer: String,
    precision: String,
    our_account: String,
    our_balance: String,
}

impl EngineBackend {
    pub fn new(
        settings: BackendSettings,
        engine: Arc<dyn EngineApi>,
        steem: Arc<dyn SteemApi>,
        keys: Arc<dyn KeyStore>,
        sidechain_id: impl Into<String>,
    ) -> Self {
        Self {
            settings,
            engine,
            steem,
            keys,
            sidechain_id: sidechain_id.into(),
        }
    }

    fn sym(&self) -> &str {
        &self.settings.symbol
    }

    async fn token(&self, context: &str) -> Result<EngineToken, LedgerError> {
        self.engine.get_token(self.sym()).await?.ok_or_else(|| {
            LedgerError::TokenNotFound(format!(
                "Failed to {} because {} is an invalid token symbol.",
                context,
                self.sym()
            ))
        })
    }

    /// Engine accounts are Steem accounts.
    async fn require_account(&self, name: &str, role: &str) -> Result<String, LedgerError> {
        let name = name.trim().to_lowercase();
        match self.steem.get_account(&name).await? {
            Some(account) => Ok(account.name),
            None => Err(LedgerError::AccountNotFound(format!(
                "{} account {} does not exist",
                role, name
            ))),
        }
    }

    fn custom_json(&self, auth: &str, json: String) -> SteemOp {
        SteemOp::CustomJson {
            id: self.sidechain_id.clone(),
            required_auths: vec![auth.to_string()],
            required_posting_auths: Vec::new(),
            json,
        }
    }

    async fn probe_health(
        &self,
        values: &mut HealthValues,
        report: &mut HealthReport,
    ) -> Result<(), RpcError> {
        match self.settings.our_account.as_deref() {
            None => {
                values.our_account = "Not configured".into();
                report.degrade(format!("No platform account configured for {}", self.sym()));
            }
            Some(name) => {
                values.our_account = name.to_string();
                if self.steem.get_account(name).await?.is_none() {
                    report.degrade(format!("Account {} not found", name));
                }
            }
        }

        let Some(token) = self.engine.get_token(self.sym()).await? else {
            let reason = format!("Symbol {} not found", self.sym());
            values.token_name = reason.clone();
            report.degrade(reason);
            return Ok(());
        };
        values.token_name = token.name;
        values.issuer = token.issuer;
        values.precision = token.precision.to_string();

        if let Some(name) = self.settings.our_account.as_deref() {
            let balance = self
                .engine
                .get_balance(name, self.sym())
                .await?
                .unwrap_or(Decimal::ZERO);
            values.our_balance = format_amount(balance, token.precision);
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerBackend for EngineBackend {
    fn name(&self) -> &'static str {
        "EngineBackend"
    }

    fn symbol(&self) -> &str {
        self.sym()
    }

    fn platform_account(&self) -> Option<&str> {
        self.settings.our_account.as_deref()
    }

    async fn balance(
        &self,
        account: Option<&str>,
        memo: Option<&str>,
        memo_case_sensitive: bool,
    ) -> Result<Decimal, LedgerError> {
        let name = self.settings.resolve_account(account)?;
        let account = self.require_account(&name, "Balance").await?;

        let Some(token) = self.engine.get_token(self.sym()).await? else {
            return Ok(Decimal::ZERO);
        };

        if let Some(filter) = MemoFilter::new(memo, memo_case_sensitive) {
            let records = self
                .engine
                .transfer_history(&account, self.sym(), HISTORY_LIMIT)
                .await?;
            return memo::sum_received(&records, &account, self.sym(), &filter);
        }

        let balance = self
            .engine
            .get_balance(&account, self.sym())
            .await?
            .unwrap_or(Decimal::ZERO);
        Ok(truncate(balance, token.precision))
    }

    async fn address_valid(&self, account: &str) -> bool {
        let account = account.trim().to_lowercase();
        if account.is_empty() {
            return false;
        }
        match self.steem.get_account(&account).await {
            Ok(found) => found.is_some(),
            Err(e) => {
                warn!(account = %account, error = %e, "address validation failed, treating as invalid");
                false
            }
        }
    }

    /// Sidechain issuance carries no memo; `memo` is ignored.
    async fn issue(
        &self,
        amount: Decimal,
        to: &str,
        _memo: Option<&str>,
    ) -> Result<TransferResult, LedgerError> {
        let token = self.token("issue").await?;
        let amount = checked_amount(amount, token.precision, self.sym(), "issue")?;
        let to = self.require_account(to, "Destination").await?;

        let keys = self
            .keys
            .signing_keys(&token.issuer, &[KeyRole::Active])
            .await
            .map_err(LedgerError::from_issuer_key)?;

        let quantity = format_amount(amount, token.precision);
        let op = self.custom_json(
            &token.issuer,
            contract_json("issue", self.sym(), &to, &quantity, None),
        );

        debug!(symbol = %self.sym(), issuer = %token.issuer, to = %to, quantity = %quantity, "broadcasting sidechain issue");
        let txid = self.steem.broadcast(&op, &keys).await.map_err(|e| match e {
            RpcError::Remote { message, .. } => classify_sidechain_error(message),
            other => LedgerError::from_issue_rpc(other),
        })?;

        info!(symbol = %self.sym(), to = %to, amount = %amount, txid = ?txid, "issued");

        Ok(TransferResult {
            txid,
            coin: self.sym().to_string(),
            amount,
            fee: Decimal::ZERO,
            from_account: token.issuer,
            send_type: SendType::Issue,
        })
    }

    async fn send(
        &self,
        amount: Decimal,
        to: &str,
        from: Option<&str>,
        memo: Option<&str>,
    ) -> Result<TransferResult, LedgerError> {
        let from = self.settings.resolve_source(from)?;
        let token = self.token("send").await?;
        let amount = checked_amount(amount, token.precision, self.sym(), "send")?;

        let from = self.require_account(&from, "Source").await?;
        let to = self.require_account(to, "Destination").await?;

        let balance = self
            .engine
            .get_balance(&from, self.sym())
            .await?
            .unwrap_or(Decimal::ZERO);
        if balance < amount {
            return Err(LedgerError::NotEnoughBalance {
                account: from,
                balance,
                required: amount,
            });
        }

        let keys = self
            .keys
            .signing_keys(&from, &[KeyRole::Active])
            .await
            .map_err(LedgerError::from_transfer_key)?;

        let quantity = format_amount(amount, token.precision);
        let op = self.custom_json(
            &from,
            contract_json(
                "transfer",
                self.sym(),
                &to,
                &quantity,
                Some(memo.unwrap_or_default()),
            ),
        );

        debug!(symbol = %self.sym(), from = %from, to = %to, quantity = %quantity, "broadcasting sidechain transfer");
        let txid = self.steem.broadcast(&op, &keys).await.map_err(|e| match e {
            RpcError::Remote { message, .. } if is_overdrawn(&message) => {
                LedgerError::NotEnoughBalance {
                    account: from.clone(),
                    balance,
                    required: amount,
                }
            }
            RpcError::Remote { message, .. } => classify_sidechain_error(message),
            other => LedgerError::from_transfer_rpc(other),
        })?;

        info!(symbol = %self.sym(), from = %from, to = %to, amount = %amount, txid = ?txid, "sent");

        Ok(TransferResult {
            txid,
            coin: self.sym().to_string(),
            amount,
            fee: Decimal::ZERO,
            from_account: from,
            send_type: SendType::Send,
        })
    }

    async fn health_check(&self) -> HealthReport {
        let mut report = HealthReport::new(self.name(), self.sym());
        let mut values = HealthValues::default();

        if let Err(e) = self.probe_health(&mut values, &mut report).await {
            error!(symbol = %self.sym(), error = %e, "health check failed");
            report.degrade("ERROR");
        }

        report.field("API Node", self.engine.node_url());
        report.field("Token Name", values.token_name);
        report.field("Issuer", values.issuer);
        report.field("Precision", values.precision);
        report.field("Our Account", values.our_account);
        report.field("Our Balance", values.our_balance);
        report
    }
}

/// In-memory sidechain for testing
#[cfg(test)]
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    pub struct MockEngineApi {
        tokens: Mutex<Vec<EngineToken>>,
        balances: Mutex<HashMap<(String, String), Decimal>>,
        history: Mutex<Vec<TransferRecord>>,
        fail_rpc: Mutex<Option<RpcError>>,
    }

    impl MockEngineApi {
        pub fn new() -> Self {
            Self {
                tokens: Mutex::new(Vec::new()),
                balances: Mutex::new(HashMap::new()),
                history: Mutex::new(Vec::new()),
                fail_rpc: Mutex::new(None),
            }
        }

        pub fn add_token(&self, symbol: &str, issuer: &str, precision: u32) {
            self.tokens.lock().unwrap().push(EngineToken {
                symbol: symbol.to_string(),
                name: format!("{} Token", symbol),
                issuer: issuer.to_string(),
                precision,
            });
        }

        pub fn set_balance(&self, account: &str, symbol: &str, amount: Decimal) {
            self.balances
                .lock()
                .unwrap()
                .insert((account.to_string(), symbol.to_string()), amount);
        }

        pub fn push_history(&self, record: TransferRecord) {
            self.history.lock().unwrap().push(record);
        }

        pub fn set_fail_rpc(&self, err: Option<RpcError>) {
            *self.fail_rpc.lock().unwrap() = err;
        }

        fn check(&self) -> Result<(), RpcError> {
            match self.fail_rpc.lock().unwrap().clone() {
                Some(err) => Err(err),
                None => Ok(()),
            }
        }
    }

    #[async_trait]
    impl EngineApi for MockEngineApi {
        fn node_url(&self) -> &str {
            "mock://engine"
        }

        async fn get_token(&self, symbol: &str) -> Result<Option<EngineToken>, RpcError> {
            self.check()?;
            Ok(self
                .tokens
                .lock()
                .unwrap()
                .iter()
                .find(|t| t.symbol == symbol)
                .cloned())
        }

        async fn get_balance(&self, account: &str, symbol: &str) -> Result<Option<Decimal>, RpcError> {
            self.check()?;
            Ok(self
                .balances
                .lock()
                .unwrap()
                .get(&(account.to_string(), symbol.to_string()))
                .copied())
        }

        async fn transfer_history(
            &self,
            account: &str,
            symbol: &str,
            limit: u32,
        ) -> Result<Vec<TransferRecord>, RpcError> {
            self.check()?;
            Ok(self
                .history
                .lock()
                .unwrap()
                .iter()
                .filter(|r| (r.to == account || r.from == account) && r.symbol == symbol)
                .take(limit as usize)
                .cloned()
                .collect())
        }
    }
}
