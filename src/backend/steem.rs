//! Steem backend
//!
//! Native STEEM and SBD. Transfers are fee-free and memos are plaintext.
//! Native currencies have no issuer, so `issue` always ends in
//! `IssuerKeyError` once the request itself has been validated.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::tx::ChainProps;
use super::{BackendSettings, LedgerBackend};
use crate::amount::{checked_amount, format_amount};
use crate::error::LedgerError;
use crate::health::HealthReport;
use crate::keys::{KeyRole, KeyStore, SigningKeys};
use crate::memo::{self, MemoFilter};
use crate::rpc::RpcError;
use crate::types::{Asset, SendType, TransferRecord, TransferResult};

/// Digits after the point for STEEM and SBD
pub const STEEM_PRECISION: u32 = 3;

/// Most history entries scanned for a memo balance
pub const HISTORY_CAP: usize = 10_000;

/// Entries requested per history page
pub const HISTORY_PAGE: u32 = 1_000;

/// Native asset for `symbol`, if Steem has one by that name.
pub fn native_asset(symbol: &str) -> Option<Asset> {
    match symbol {
        "STEEM" | "SBD" => Some(Asset {
            symbol: symbol.to_string(),
            precision: STEEM_PRECISION,
            issuer: String::new(),
        }),
        _ => None,
    }
}

/// Account with its liquid balances
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SteemAccount {
    pub name: String,
    pub balance: Decimal,
    pub sbd_balance: Decimal,
}

impl SteemAccount {
    pub fn balance_of(&self, symbol: &str) -> Option<Decimal> {
        match symbol {
            "STEEM" => Some(self.balance),
            "SBD" => Some(self.sbd_balance),
            _ => None,
        }
    }
}

/// One account history entry; `transfer` is set for transfer operations.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryItem {
    pub index: u64,
    pub transfer: Option<TransferRecord>,
}

/// Operations broadcast to Steem
#[derive(Debug, Clone, PartialEq)]
pub enum SteemOp {
    Transfer {
        from: String,
        to: String,
        /// Asset string, e.g. `"1.000 STEEM"`
        amount: String,
        memo: String,
    },
    CustomJson {
        id: String,
        required_auths: Vec<String>,
        required_posting_auths: Vec<String>,
        json: String,
    },
}

impl SteemOp {
    pub fn to_json(&self) -> Value {
        match self {
            SteemOp::Transfer {
                from,
                to,
                amount,
                memo,
            } => json!(["transfer", {
                "from": from,
                "to": to,
                "amount": amount,
                "memo": memo,
            }]),
            SteemOp::CustomJson {
                id,
                required_auths,
                required_posting_auths,
                json,
            } => json!(["custom_json", {
                "required_auths": required_auths,
                "required_posting_auths": required_posting_auths,
                "id": id,
                "json": json,
            }]),
        }
    }
}

// ============================================================================
// Node API
// ============================================================================

#[async_trait]
pub trait SteemApi: Send + Sync {
    fn node_url(&self) -> &str;

    async fn get_account(&self, name: &str) -> Result<Option<SteemAccount>, RpcError>;

    /// History entries with index in `[start - limit, start]`; `start = -1`
    /// means the newest entry.
    async fn account_history(
        &self,
        account: &str,
        start: i64,
        limit: u32,
    ) -> Result<Vec<HistoryItem>, RpcError>;

    async fn chain_props(&self) -> Result<ChainProps, RpcError>;

    async fn blockchain_version(&self) -> Result<String, RpcError>;

    /// Sign and broadcast; returns the transaction id when the node reports it.
    async fn broadcast(&self, op: &SteemOp, keys: &SigningKeys)
    -> Result<Option<String>, RpcError>;
}

/// Transfers from the newest `HISTORY_CAP` entries of `account`, newest
/// page first.
pub async fn collect_transfers(
    api: &dyn SteemApi,
    account: &str,
) -> Result<Vec<TransferRecord>, RpcError> {
    let mut records = Vec::new();
    let mut scanned = 0usize;
    let mut start: i64 = -1;

    while scanned < HISTORY_CAP {
        let mut limit = HISTORY_PAGE.min((HISTORY_CAP - scanned) as u32);
        if start >= 0 {
            // Nodes reject a limit larger than the start index.
            limit = limit.min(start as u32);
        }
        let mut page = api.account_history(account, start, limit).await?;
        // Nodes return `limit + 1` entries; keep the newest ones within the cap.
        let remaining = HISTORY_CAP - scanned;
        if page.len() > remaining {
            page.sort_by(|a, b| b.index.cmp(&a.index));
            page.truncate(remaining);
        }
        let Some(lowest) = page.iter().map(|item| item.index).min() else {
            break;
        };
        scanned += page.len();
        records.extend(page.into_iter().filter_map(|item| item.transfer));
        if lowest == 0 {
            break;
        }
        start = lowest as i64 - 1;
    }

    debug!(account, scanned, transfers = records.len(), "scanned history");
    Ok(records)
}

// ============================================================================
// Backend
// ============================================================================

pub struct SteemBackend {
    settings: BackendSettings,
    api: Arc<dyn SteemApi>,
    keys: Arc<dyn KeyStore>,
}

#[derive(Default)]
struct HealthValues {
    head_block: String,
    block_time: String,
    rpc_version: String,
    our_account: String,
    our_balance: String,
}

impl SteemBackend {
    pub fn new(settings: BackendSettings, api: Arc<dyn SteemApi>, keys: Arc<dyn KeyStore>) -> Self {
        Self {
            settings,
            api,
            keys,
        }
    }

    fn sym(&self) -> &str {
        &self.settings.symbol
    }

    fn asset(&self, context: &str) -> Result<Asset, LedgerError> {
        native_asset(self.sym()).ok_or_else(|| {
            LedgerError::TokenNotFound(format!(
                "Failed to {} because {} is not a Steem currency.",
                context,
                self.sym()
            ))
        })
    }

    async fn account(&self, name: &str, role: &str) -> Result<SteemAccount, LedgerError> {
        let name = name.trim().to_lowercase();
        self.api.get_account(&name).await?.ok_or_else(|| {
            LedgerError::AccountNotFound(format!("{} account {} does not exist", role, name))
        })
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
                match self.api.get_account(name).await? {
                    None => report.degrade(format!("Account {} not found", name)),
                    Some(account) => {
                        values.our_balance = account
                            .balance_of(self.sym())
                            .map(|b| format_amount(b, STEEM_PRECISION))
                            .unwrap_or_default();
                    }
                }
            }
        }

        let props = self.api.chain_props().await?;
        values.head_block = props.head_block_number.to_string();
        values.block_time = props.time;
        values.rpc_version = self.api.blockchain_version().await?;
        Ok(())
    }
}

#[async_trait]
impl LedgerBackend for SteemBackend {
    fn name(&self) -> &'static str {
        "SteemBackend"
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
        let account = self.account(&name, "Balance").await?;

        if let Some(filter) = MemoFilter::new(memo, memo_case_sensitive) {
            let records = collect_transfers(self.api.as_ref(), &account.name).await?;
            return memo::sum_received(&records, &account.name, self.sym(), &filter);
        }

        Ok(account.balance_of(self.sym()).unwrap_or(Decimal::ZERO))
    }

    async fn address_valid(&self, account: &str) -> bool {
        let account = account.trim().to_lowercase();
        if account.is_empty() {
            return false;
        }
        match self.api.get_account(&account).await {
            Ok(found) => found.is_some(),
            Err(e) => {
                warn!(account = %account, error = %e, "address validation failed, treating as invalid");
                false
            }
        }
    }

    async fn issue(
        &self,
        amount: Decimal,
        to: &str,
        _memo: Option<&str>,
    ) -> Result<TransferResult, LedgerError> {
        let asset = self.asset("issue")?;
        checked_amount(amount, asset.precision, self.sym(), "issue")?;
        self.account(to, "Destination").await?;

        Err(LedgerError::IssuerKeyError(format!(
            "{} is a native Steem currency and cannot be issued",
            self.sym()
        )))
    }

    async fn send(
        &self,
        amount: Decimal,
        to: &str,
        from: Option<&str>,
        memo: Option<&str>,
    ) -> Result<TransferResult, LedgerError> {
        let from = self.settings.resolve_source(from)?;
        let asset = self.asset("send")?;
        let amount = checked_amount(amount, asset.precision, self.sym(), "send")?;

        let from_account = self.account(&from, "Source").await?;
        let to_account = self.account(to, "Destination").await?;

        let balance = from_account.balance_of(self.sym()).unwrap_or(Decimal::ZERO);
        if balance < amount {
            return Err(LedgerError::NotEnoughBalance {
                account: from_account.name,
                balance,
                required: amount,
            });
        }

        let keys = self
            .keys
            .signing_keys(&from_account.name, &[KeyRole::Active])
            .await
            .map_err(LedgerError::from_transfer_key)?;

        let op = SteemOp::Transfer {
            from: from_account.name.clone(),
            to: to_account.name.clone(),
            amount: format!("{} {}", format_amount(amount, asset.precision), self.sym()),
            memo: memo.unwrap_or_default().to_string(),
        };

        debug!(
            symbol = %self.sym(),
            from = %from_account.name,
            to = %to_account.name,
            amount = %amount,
            "broadcasting transfer"
        );
        let txid = self
            .api
            .broadcast(&op, &keys)
            .await
            .map_err(LedgerError::from_transfer_rpc)?;

        info!(symbol = %self.sym(), to = %to_account.name, amount = %amount, txid = ?txid, "sent");

        Ok(TransferResult {
            txid,
            coin: self.sym().to_string(),
            amount,
            fee: Decimal::ZERO,
            from_account: from_account.name,
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

        report.field("Coin Name", self.settings.display_name.clone());
        report.field("API Node", self.api.node_url());
        report.field("Head Block", values.head_block);
        report.field("Block Time", values.block_time);
        report.field("RPC Version", values.rpc_version);
        report.field("Our Account", values.our_account);
        report.field("Our Balance", values.our_balance);
        report
    }
}
