//! Graphene (BitShares-style) backend
//!
//! User-issued assets on a ledger with an on-chain fee market. Transfer fees
//! are charged in the transferred asset and deducted from the amount sent;
//! issuance fees are paid by the issuer in the core asset.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::tx::ChainProps;
use super::{BackendSettings, LedgerBackend};
use crate::amount::{checked_amount, format_amount, from_base_units, to_base_units};
use crate::error::LedgerError;
use crate::fee::{self, FeeSchedule};
use crate::health::HealthReport;
use crate::keys::{KeyRole, KeyStore, SigningKeys};
use crate::memo::{self, MemoFilter};
use crate::rpc::RpcError;
use crate::types::{SendType, TransferRecord, TransferResult};

/// Core asset; issuance fees are paid in it
pub const CORE_ASSET_ID: &str = "1.3.0";

/// Most recent operations scanned for a memo balance
pub const HISTORY_LIMIT: u32 = 100;

// ============================================================================
// Chain Objects
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrapheneAsset {
    /// Object id, e.g. `1.3.4071`
    pub id: String,
    pub symbol: String,
    pub precision: u32,
    /// Issuer account id
    pub issuer: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrapheneAccount {
    /// Object id, e.g. `1.2.100`
    pub id: String,
    pub name: String,
    /// Public key memos to this account are encrypted to
    pub memo_key: String,
}

/// Amount in base units of one asset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetAmount {
    pub amount: i64,
    pub asset_id: String,
}

impl AssetAmount {
    pub fn new(amount: i64, asset_id: &str) -> Self {
        Self {
            amount,
            asset_id: asset_id.to_string(),
        }
    }
}

/// Transfer operation from an account's history
#[derive(Debug, Clone, PartialEq)]
pub struct GrapheneTransfer {
    pub from: String,
    pub to: String,
    pub amount: AssetAmount,
    /// Encrypted memo object, if any
    pub memo: Option<Value>,
}

/// Operations this backend broadcasts
#[derive(Debug, Clone, PartialEq)]
pub enum GrapheneOp {
    Transfer {
        fee: AssetAmount,
        from: String,
        to: String,
        amount: AssetAmount,
        memo: Option<Value>,
    },
    AssetIssue {
        fee: AssetAmount,
        issuer: String,
        asset_to_issue: AssetAmount,
        issue_to_account: String,
        memo: Option<Value>,
    },
}

impl GrapheneOp {
    pub const TRANSFER: u8 = 0;
    pub const ASSET_ISSUE: u8 = 14;

    pub fn op_id(&self) -> u8 {
        match self {
            GrapheneOp::Transfer { .. } => Self::TRANSFER,
            GrapheneOp::AssetIssue { .. } => Self::ASSET_ISSUE,
        }
    }

    /// Same operation with the fee amount replaced.
    pub fn with_fee(mut self, amount: i64) -> Self {
        match &mut self {
            GrapheneOp::Transfer { fee, .. } | GrapheneOp::AssetIssue { fee, .. } => {
                fee.amount = amount
            }
        }
        self
    }

    /// Wire form: `[op_id, {fields}]`
    pub fn to_json(&self) -> Value {
        let body = match self {
            GrapheneOp::Transfer {
                fee,
                from,
                to,
                amount,
                memo,
            } => {
                let mut body = json!({
                    "fee": fee,
                    "from": from,
                    "to": to,
                    "amount": amount,
                    "extensions": [],
                });
                if let Some(memo) = memo {
                    body["memo"] = memo.clone();
                }
                body
            }
            GrapheneOp::AssetIssue {
                fee,
                issuer,
                asset_to_issue,
                issue_to_account,
                memo,
            } => {
                let mut body = json!({
                    "fee": fee,
                    "issuer": issuer,
                    "asset_to_issue": asset_to_issue,
                    "issue_to_account": issue_to_account,
                    "extensions": [],
                });
                if let Some(memo) = memo {
                    body["memo"] = memo.clone();
                }
                body
            }
        };
        json!([self.op_id(), body])
    }
}

// ============================================================================
// Node API
// ============================================================================

/// Remote surface of a Graphene node, plus the memo crypto of its signer
#[async_trait]
pub trait GrapheneApi: FeeSchedule<GrapheneOp> {
    fn node_url(&self) -> &str;

    async fn lookup_asset(&self, symbol: &str) -> Result<Option<GrapheneAsset>, RpcError>;

    /// Look up by account name or object id.
    async fn get_account(&self, name_or_id: &str) -> Result<Option<GrapheneAccount>, RpcError>;

    /// Balance in base units; zero if the account holds none of the asset.
    async fn account_balance(&self, account_id: &str, asset_id: &str) -> Result<i64, RpcError>;

    /// Most recent transfer operations touching `account_id`, newest first.
    async fn transfer_history(
        &self,
        account_id: &str,
        limit: u32,
    ) -> Result<Vec<GrapheneTransfer>, RpcError>;

    async fn encrypt_memo(
        &self,
        keys: &SigningKeys,
        to_memo_key: &str,
        memo: &str,
    ) -> Result<Value, RpcError>;

    fn decrypt_memo(&self, keys: &SigningKeys, memo: &Value) -> Option<String>;

    /// Sign and broadcast a single operation. Graphene nodes do not return a
    /// transaction id, so `Ok(None)` is the normal success value.
    async fn broadcast(&self, op: &GrapheneOp, keys: &SigningKeys)
    -> Result<Option<String>, RpcError>;

    async fn chain_props(&self) -> Result<ChainProps, RpcError>;
}

// ============================================================================
// Backend
// ============================================================================

pub struct GrapheneBackend {
    settings: BackendSettings,
    api: Arc<dyn GrapheneApi>,
    keys: Arc<dyn KeyStore>,
}

/// Values for the operator status table, error text until filled in
struct HealthValues {
    issuer: String,
    precision: String,
    our_account: String,
    our_balance: String,
}

impl Default for HealthValues {
    fn default() -> Self {
        Self {
            issuer: "ERROR GETTING ISSUER".into(),
            precision: "ERROR GETTING PRECISION".into(),
            our_account: "ERROR GETTING ACCOUNT NAME".into(),
            our_balance: "ERROR GETTING BALANCE".into(),
        }
    }
}

/// Key roles needed to sign an operation, with or without a memo
fn signing_roles(memo: Option<&str>) -> &'static [KeyRole] {
    if memo.is_some() {
        &[KeyRole::Active, KeyRole::Memo]
    } else {
        &[KeyRole::Active]
    }
}

impl GrapheneBackend {
    pub fn new(settings: BackendSettings, api: Arc<dyn GrapheneApi>, keys: Arc<dyn KeyStore>) -> Self {
        Self {
            settings,
            api,
            keys,
        }
    }

    fn sym(&self) -> &str {
        &self.settings.symbol
    }

    async fn asset(&self, context: &str) -> Result<GrapheneAsset, LedgerError> {
        self.api.lookup_asset(self.sym()).await?.ok_or_else(|| {
            LedgerError::TokenNotFound(format!(
                "Failed to {} because {} is an invalid token symbol.",
                context,
                self.sym()
            ))
        })
    }

    /// Resolve an account by name; `role` names it in the error message.
    async fn account(&self, name: &str, role: &str) -> Result<GrapheneAccount, LedgerError> {
        let name = name.trim().to_lowercase();
        self.api.get_account(&name).await?.ok_or_else(|| {
            LedgerError::AccountNotFound(format!("{} account {} could not be found", role, name))
        })
    }

    /// Total of `asset` received by `account` under a matching memo.
    ///
    /// Memos are encrypted on chain; they are read with the account's own
    /// memo key. Without that key no memo can match.
    async fn received_with_memo(
        &self,
        account: &GrapheneAccount,
        asset: &GrapheneAsset,
        filter: &MemoFilter,
    ) -> Result<Decimal, LedgerError> {
        let keys = match self
            .keys
            .signing_keys(&account.name, &[KeyRole::Memo])
            .await
        {
            Ok(keys) => Some(keys),
            Err(e) => {
                warn!(account = %account.name, error = %e, "memo key unavailable, memos unreadable");
                None
            }
        };

        let history = self
            .api
            .transfer_history(&account.id, HISTORY_LIMIT)
            .await?;

        let records = history
            .into_iter()
            .filter(|t| t.amount.asset_id == asset.id)
            .map(|t| {
                Ok(TransferRecord {
                    txid: None,
                    to: if t.to == account.id {
                        account.name.clone()
                    } else {
                        t.to
                    },
                    from: t.from,
                    symbol: asset.symbol.clone(),
                    amount: from_base_units(t.amount.amount, asset.precision)?,
                    memo: match (&keys, &t.memo) {
                        (Some(keys), Some(memo)) => self.api.decrypt_memo(keys, memo),
                        _ => None,
                    },
                })
            })
            .collect::<Result<Vec<TransferRecord>, LedgerError>>()?;

        memo::sum_received(&records, &account.name, &asset.symbol, filter)
    }

    async fn probe_health(&self, values: &mut HealthValues, report: &mut HealthReport) -> Result<(), RpcError> {
        let asset = self.api.lookup_asset(self.sym()).await?;
        match &asset {
            None => {
                let reason = format!("Symbol {} not found", self.sym());
                values.precision = reason.clone();
                values.issuer = reason.clone();
                report.degrade(reason);
            }
            Some(asset) => {
                values.precision = asset.precision.to_string();
                values.issuer = match self.api.get_account(&asset.issuer).await? {
                    Some(issuer) => issuer.name,
                    None => asset.issuer.clone(),
                };
            }
        }

        let Some(our_account) = self.settings.our_account.as_deref() else {
            values.our_account = "Not configured".into();
            report.degrade(format!("No platform account configured for {}", self.sym()));
            return Ok(());
        };

        match self.api.get_account(our_account).await? {
            None => {
                let reason = format!("Account {} not found", our_account);
                values.our_account = reason.clone();
                report.degrade(reason);
            }
            Some(account) => {
                values.our_balance = match &asset {
                    None => "0.0".into(),
                    Some(asset) => {
                        let units = self.api.account_balance(&account.id, &asset.id).await?;
                        match from_base_units(units, asset.precision) {
                            Ok(balance) => format_amount(balance, asset.precision),
                            Err(e) => {
                                report.degrade(e.to_string());
                                "0.0".into()
                            }
                        }
                    }
                };
                values.our_account = account.name;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerBackend for GrapheneBackend {
    fn name(&self) -> &'static str {
        "GrapheneBackend"
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

        // An asset that does not exist has no holders.
        let Some(asset) = self.api.lookup_asset(self.sym()).await? else {
            return Ok(Decimal::ZERO);
        };

        if let Some(filter) = MemoFilter::new(memo, memo_case_sensitive) {
            return self.received_with_memo(&account, &asset, &filter).await;
        }

        let units = self.api.account_balance(&account.id, &asset.id).await?;
        from_base_units(units, asset.precision)
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
        memo: Option<&str>,
    ) -> Result<TransferResult, LedgerError> {
        let memo = memo.filter(|m| !m.is_empty());
        let asset = self.asset("issue").await?;
        let amount = checked_amount(amount, asset.precision, self.sym(), "issue")?;
        let to_account = self.account(to, "Destination").await?;

        let issuer = self.api.get_account(&asset.issuer).await?.ok_or_else(|| {
            LedgerError::IssuerKeyError(format!(
                "issuer {} of {} could not be found",
                asset.issuer,
                self.sym()
            ))
        })?;

        let keys = self
            .keys
            .signing_keys(&issuer.name, signing_roles(memo))
            .await
            .map_err(LedgerError::from_issuer_key)?;

        let memo_obj = match memo {
            Some(m) => Some(
                self.api
                    .encrypt_memo(&keys, &to_account.memo_key, m)
                    .await
                    .map_err(LedgerError::from_issue_rpc)?,
            ),
            None => None,
        };

        // Fee is filled in by the node client in the core asset.
        let op = GrapheneOp::AssetIssue {
            fee: AssetAmount::new(0, CORE_ASSET_ID),
            issuer: issuer.id.clone(),
            asset_to_issue: AssetAmount::new(to_base_units(amount, asset.precision)?, &asset.id),
            issue_to_account: to_account.id.clone(),
            memo: memo_obj,
        };

        debug!(
            symbol = %self.sym(),
            issuer = %issuer.name,
            to = %to_account.name,
            amount = %amount,
            "broadcasting asset issue"
        );
        let txid = self
            .api
            .broadcast(&op, &keys)
            .await
            .map_err(LedgerError::from_issue_rpc)?;

        info!(symbol = %self.sym(), to = %to_account.name, amount = %amount, "issued");

        Ok(TransferResult {
            txid,
            coin: self.sym().to_string(),
            amount,
            fee: Decimal::ZERO,
            from_account: issuer.name,
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
        let memo = memo.filter(|m| !m.is_empty());
        let from = self.settings.resolve_source(from)?;
        let asset = self.asset("send").await?;
        let precision = asset.precision;
        let amount = checked_amount(amount, precision, self.sym(), "send")?;

        let from_account = self.account(&from, "Source").await?;
        let to_account = self.account(to, "Destination").await?;

        let balance = from_base_units(
            self.api
                .account_balance(&from_account.id, &asset.id)
                .await?,
            precision,
        )?;
        if balance < amount {
            return Err(LedgerError::NotEnoughBalance {
                account: from_account.name,
                balance,
                required: amount,
            });
        }

        let keys = self
            .keys
            .signing_keys(&from_account.name, signing_roles(memo))
            .await
            .map_err(LedgerError::from_transfer_key)?;

        let memo_obj = match memo {
            Some(m) => Some(
                self.api
                    .encrypt_memo(&keys, &to_account.memo_key, m)
                    .await
                    .map_err(LedgerError::from_transfer_rpc)?,
            ),
            None => None,
        };

        let gross = to_base_units(amount, precision)?;
        let (op, quote) = fee::two_pass(
            self.api.as_ref(),
            gross,
            &asset.id,
            precision,
            self.sym(),
            |amount, fee| GrapheneOp::Transfer {
                fee: AssetAmount::new(fee, &asset.id),
                from: from_account.id.clone(),
                to: to_account.id.clone(),
                amount: AssetAmount::new(amount, &asset.id),
                memo: memo_obj.clone(),
            },
        )
        .await?;

        debug!(
            symbol = %self.sym(),
            from = %from_account.name,
            to = %to_account.name,
            gross = quote.gross,
            fee = quote.fee,
            "broadcasting transfer"
        );
        let txid = self
            .api
            .broadcast(&op, &keys)
            .await
            .map_err(LedgerError::from_transfer_rpc)?;

        let sent = from_base_units(quote.net, precision)?;
        let fee = from_base_units(quote.fee, precision)?;
        info!(
            symbol = %self.sym(),
            from = %from_account.name,
            to = %to_account.name,
            amount = %sent,
            fee = %fee,
            "sent"
        );

        Ok(TransferResult {
            txid,
            coin: self.sym().to_string(),
            amount: sent,
            fee,
            from_account: from_account.name,
            send_type: SendType::Send,
        })
    }

    async fn health_check(&self) -> HealthReport {
        let mut report = HealthReport::new(self.name(), self.sym());
        let mut values = HealthValues::default();

        if let Err(e) = self.probe_health(&mut values, &mut report).await {
            error!(symbol = %self.sym(), error = %e, "health check failed");
            report.degrade("UNHANDLED EXCEPTION (see logs)");
        }

        report.field("API Node", self.api.node_url());
        report.field("Issuer", values.issuer);
        report.field("Precision", values.precision);
        report.field("Our Account", values.our_account);
        report.field("Our Balance", values.our_balance);
        report
    }
}


#[cfg(test)]
mod tests {
    use super::mock::MockGrapheneApi;
    use super::*;
    use crate::keys::MemoryKeyStore;
    use std::str::FromStr;

    const ASSET_ID: &str = "1.3.4071";

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    struct Fixture {
        api: Arc<MockGrapheneApi>,
        keys: Arc<MemoryKeyStore>,
        backend: GrapheneBackend,
        privex: String,
        alice: String,
    }

    /// SGTK with precision 5, issued by `sgtk-issuer`; `privex` is the platform account.
    fn fixture() -> Fixture {
        let api = Arc::new(MockGrapheneApi::new());
        let issuer = api.add_account("sgtk-issuer");
        let privex = api.add_account("privex");
        let alice = api.add_account("alice");
        api.add_asset(ASSET_ID, "SGTK", 5, &issuer);

        let keys = Arc::new(MemoryKeyStore::new());
        for account in ["sgtk-issuer", "privex"] {
            keys.insert(account, KeyRole::Active, format!("5K{}active", account));
            keys.insert(account, KeyRole::Memo, format!("5K{}memo", account));
        }

        let backend = GrapheneBackend::new(
            BackendSettings::new("SGTK", Some("privex")),
            api.clone(),
            keys.clone(),
        );
        Fixture {
            api,
            keys,
            backend,
            privex,
            alice,
        }
    }

    #[test]
    fn test_op_wire_format() {
        let op = GrapheneOp::Transfer {
            fee: AssetAmount::new(0, ASSET_ID),
            from: "1.2.100".into(),
            to: "1.2.101".into(),
            amount: AssetAmount::new(123, ASSET_ID),
            memo: None,
        };
        let json = op.with_fee(7).to_json();
        assert_eq!(json[0], 0);
        assert_eq!(json[1]["fee"]["amount"], 7);
        assert_eq!(json[1]["amount"]["asset_id"], ASSET_ID);
        assert!(json[1].get("memo").is_none());

        let issue = GrapheneOp::AssetIssue {
            fee: AssetAmount::new(0, CORE_ASSET_ID),
            issuer: "1.2.100".into(),
            asset_to_issue: AssetAmount::new(1, ASSET_ID),
            issue_to_account: "1.2.101".into(),
            memo: Some(json!({"message": "x"})),
        };
        assert_eq!(issue.to_json()[0], 14);
        assert_eq!(issue.to_json()[1]["memo"]["message"], "x");
    }

    #[tokio::test]
    async fn test_send_deducts_fee_from_amount() {
        let f = fixture();
        f.api.set_balance(&f.privex, ASSET_ID, 100_00000);
        f.api.set_fee(1_234);

        let result = f
            .backend
            .send(dec("10.123456"), "alice", None, Some("hello"))
            .await
            .unwrap();

        assert_eq!(result.send_type, SendType::Send);
        assert_eq!(result.from_account, "privex");
        assert_eq!(result.fee, dec("0.01234"));
        assert_eq!(result.amount, dec("10.11111"));
        assert_eq!(result.amount + result.fee, dec("10.12345"));
        assert_eq!(result.txid, None);

        let ops = f.api.broadcasts();
        assert_eq!(ops.len(), 1);
        match &ops[0] {
            GrapheneOp::Transfer {
                fee, amount, to, memo, ..
            } => {
                assert_eq!(fee, &AssetAmount::new(1_234, ASSET_ID));
                assert_eq!(amount.amount, 10_11111);
                assert_eq!(to, &f.alice);
                assert_eq!(memo.as_ref().unwrap()["message"], "hello");
            }
            other => panic!("unexpected op {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_exact_balance_send_proceeds_to_fee_deduction() {
        let f = fixture();
        f.api.set_balance(&f.privex, ASSET_ID, 10_00000);
        f.api.set_fee(500);

        let result = f.backend.send(dec("10"), "alice", None, None).await.unwrap();
        assert_eq!(result.amount + result.fee, dec("10"));

        // Exactly one unit held and sent, and the fee eats all of it.
        f.api.set_balance(&f.privex, ASSET_ID, 1);
        f.api.set_fee(1);
        let err = f
            .backend
            .send(dec("0.00001"), "alice", None, None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "ARITHMETIC_ERROR");
    }

    #[tokio::test]
    async fn test_balance_checked_before_fee() {
        let f = fixture();
        f.api.set_balance(&f.privex, ASSET_ID, 5_00000);

        let err = f
            .backend
            .send(dec("10"), "alice", None, None)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            LedgerError::NotEnoughBalance {
                account: "privex".into(),
                balance: dec("5.00000"),
                required: dec("10.00000"),
            }
        );
        assert_eq!(f.api.fee_queries(), 0);
        assert!(f.api.broadcasts().is_empty());
    }

    #[tokio::test]
    async fn test_send_validation_order() {
        let f = fixture();

        let no_source = GrapheneBackend::new(
            BackendSettings::new("SGTK", None),
            f.api.clone(),
            f.keys.clone(),
        );
        let err = no_source.send(dec("1"), "alice", None, None).await.unwrap_err();
        assert_eq!(err.code(), "CONFIGURATION_ERROR");

        let unknown = GrapheneBackend::new(
            BackendSettings::new("NOPE", Some("privex")),
            f.api.clone(),
            f.keys.clone(),
        );
        let err = unknown.send(dec("0"), "alice", None, None).await.unwrap_err();
        assert_eq!(err.code(), "TOKEN_NOT_FOUND");

        let err = f
            .backend
            .send(dec("0.000001"), "nobody", None, None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "ARITHMETIC_ERROR");

        let err = f
            .backend
            .send(dec("1"), "nobody", None, None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "ACCOUNT_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_send_without_key_is_authority_missing() {
        let f = fixture();
        f.api.set_balance(&f.alice, ASSET_ID, 10_00000);

        let err = f
            .backend
            .send(dec("1"), "privex", Some("alice"), None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "AUTHORITY_MISSING");
        assert!(f.api.broadcasts().is_empty());
    }

    #[tokio::test]
    async fn test_issue_uses_issuer_and_reports_zero_fee() {
        let f = fixture();
        f.api.set_fee(99_999);

        let result = f
            .backend
            .issue(dec("2.5"), "alice", Some("deposit 42"))
            .await
            .unwrap();
        assert_eq!(result.send_type, SendType::Issue);
        assert_eq!(result.from_account, "sgtk-issuer");
        assert_eq!(result.fee, Decimal::ZERO);
        assert_eq!(result.amount, dec("2.50000"));

        match &f.api.broadcasts()[0] {
            GrapheneOp::AssetIssue {
                fee,
                asset_to_issue,
                issue_to_account,
                ..
            } => {
                assert_eq!(fee.asset_id, CORE_ASSET_ID);
                assert_eq!(asset_to_issue.amount, 2_50000);
                assert_eq!(issue_to_account, &f.alice);
            }
            other => panic!("unexpected op {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_issue_without_issuer_key() {
        let f = fixture();
        f.keys.remove("sgtk-issuer", KeyRole::Active);

        let err = f.backend.issue(dec("1"), "alice", None).await.unwrap_err();
        assert_eq!(err.code(), "ISSUER_KEY_ERROR");

        let err = f.backend.issue(dec("1"), "ghost", None).await.unwrap_err();
        assert_eq!(err.code(), "ACCOUNT_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_balance_defaults_and_missing_asset() {
        let f = fixture();
        f.api.set_balance(&f.privex, ASSET_ID, 1_23456);

        assert_eq!(f.backend.balance(None, None, false).await.unwrap(), dec("1.23456"));
        assert_eq!(
            f.backend.balance(Some("alice"), None, false).await.unwrap(),
            Decimal::ZERO
        );
        let err = f.backend.balance(Some("ghost"), None, false).await.unwrap_err();
        assert_eq!(err.code(), "ACCOUNT_NOT_FOUND");

        let unknown = GrapheneBackend::new(
            BackendSettings::new("NOPE", Some("privex")),
            f.api.clone(),
            f.keys.clone(),
        );
        assert_eq!(unknown.balance(None, None, false).await.unwrap(), Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_memo_balance_sums_matching_transfers() {
        let f = fixture();
        for (units, memo) in [(1_00000, "A"), (2_00000, "a"), (4_00000, "B")] {
            f.api.push_history(GrapheneTransfer {
                from: f.alice.clone(),
                to: f.privex.clone(),
                amount: AssetAmount::new(units, ASSET_ID),
                memo: Some(json!({ "message": memo })),
            });
        }
        // Outbound and other-asset transfers never count.
        f.api.push_history(GrapheneTransfer {
            from: f.privex.clone(),
            to: f.alice.clone(),
            amount: AssetAmount::new(8_00000, ASSET_ID),
            memo: Some(json!({ "message": "A" })),
        });
        f.api.push_history(GrapheneTransfer {
            from: f.alice.clone(),
            to: f.privex.clone(),
            amount: AssetAmount::new(16_00000, CORE_ASSET_ID),
            memo: Some(json!({ "message": "A" })),
        });

        let insensitive = f.backend.balance(None, Some(" A "), false).await.unwrap();
        assert_eq!(insensitive, dec("3"));
        let sensitive = f.backend.balance(None, Some("A"), true).await.unwrap();
        assert_eq!(sensitive, dec("1"));

        // Without the memo key nothing can be read.
        f.keys.remove("privex", KeyRole::Memo);
        assert_eq!(
            f.backend.balance(None, Some("A"), false).await.unwrap(),
            Decimal::ZERO
        );
    }

    #[tokio::test]
    async fn test_address_valid_never_fails() {
        let f = fixture();
        assert!(f.backend.address_valid("Alice").await);
        assert!(!f.backend.address_valid("ghost").await);
        assert!(!f.backend.address_valid("  ").await);

        f.api.set_fail_rpc(Some(RpcError::Transport("down".into())));
        assert!(!f.backend.address_valid("alice").await);
    }

    #[tokio::test]
    async fn test_health_report() {
        let f = fixture();
        f.api.set_balance(&f.privex, ASSET_ID, 42_00000);

        let report = f.backend.health_check().await;
        assert!(report.status.is_okay());
        assert_eq!(
            report.headers(),
            vec!["API Node", "Issuer", "Precision", "Our Account", "Our Balance"]
        );
        assert_eq!(report.get("Issuer"), Some("sgtk-issuer"));
        assert_eq!(report.get("Precision"), Some("5"));
        assert_eq!(report.get("Our Balance"), Some("42.00000"));

        f.api.set_fail_rpc(Some(RpcError::Transport("down".into())));
        let report = f.backend.health_check().await;
        assert!(!report.status.is_okay());
        assert!(!f.backend.health_test().await);
    }
}
