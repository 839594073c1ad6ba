//! Steem node client over the `condenser_api` JSON-RPC surface

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::steem::{HistoryItem, SteemAccount, SteemApi, SteemOp};
use super::tx::{self, ChainProps};
use crate::amount::parse_asset_string;
use crate::config::SteemNodeConfig;
use crate::keys::{SigningKeys, TransactionSigner};
use crate::rpc::{JsonRpcClient, RpcError};
use crate::types::TransferRecord;

pub struct SteemNode {
    rpc: JsonRpcClient,
    chain_id: String,
    signer: Arc<dyn TransactionSigner>,
}

#[derive(Deserialize)]
struct RawAccount {
    name: String,
    balance: String,
    sbd_balance: String,
}

#[derive(Deserialize)]
struct RawVersion {
    blockchain_version: String,
}

#[derive(Deserialize)]
struct BroadcastResult {
    #[serde(default)]
    id: Option<String>,
}

fn parse_balance(value: &str, expected: &str) -> Result<Decimal, RpcError> {
    match parse_asset_string(value) {
        Some((amount, symbol)) if symbol == expected => Ok(amount),
        _ => Err(RpcError::Decode(format!(
            "expected a {} balance, got {:?}",
            expected, value
        ))),
    }
}

impl TryFrom<RawAccount> for SteemAccount {
    type Error = RpcError;

    fn try_from(raw: RawAccount) -> Result<Self, Self::Error> {
        Ok(SteemAccount {
            balance: parse_balance(&raw.balance, "STEEM")?,
            sbd_balance: parse_balance(&raw.sbd_balance, "SBD")?,
            name: raw.name,
        })
    }
}

/// `[index, {trx_id, op: [name, body]}]` into a history item.
fn parse_history_entry(entry: &Value) -> Result<HistoryItem, RpcError> {
    let index = entry[0]
        .as_u64()
        .ok_or_else(|| RpcError::Decode(format!("history entry without index: {}", entry)))?;
    let info = &entry[1];
    let op = &info["op"];
    if op[0].as_str() != Some("transfer") {
        return Ok(HistoryItem {
            index,
            transfer: None,
        });
    }

    let body = &op[1];
    let amount = body["amount"].as_str().unwrap_or_default();
    let (amount, symbol) = parse_asset_string(amount)
        .ok_or_else(|| RpcError::Decode(format!("invalid transfer amount {:?}", amount)))?;

    Ok(HistoryItem {
        index,
        transfer: Some(TransferRecord {
            txid: info["trx_id"].as_str().map(String::from),
            from: body["from"].as_str().unwrap_or_default().to_string(),
            to: body["to"].as_str().unwrap_or_default().to_string(),
            symbol,
            amount,
            memo: body["memo"].as_str().map(String::from),
        }),
    })
}

impl SteemNode {
    pub fn new(
        config: &SteemNodeConfig,
        timeout: Duration,
        signer: Arc<dyn TransactionSigner>,
    ) -> Result<Self, RpcError> {
        Ok(Self {
            rpc: JsonRpcClient::new(&config.url, timeout)?,
            chain_id: config.chain_id.clone(),
            signer,
        })
    }

    async fn condenser<R>(&self, method: &str, params: Value) -> Result<R, RpcError>
    where
        R: DeserializeOwned,
    {
        self.rpc
            .call(&format!("condenser_api.{}", method), params)
            .await
    }
}

#[async_trait]
impl SteemApi for SteemNode {
    fn node_url(&self) -> &str {
        self.rpc.url()
    }

    async fn get_account(&self, name: &str) -> Result<Option<SteemAccount>, RpcError> {
        let accounts: Vec<RawAccount> = self.condenser("get_accounts", json!([[name]])).await?;
        accounts
            .into_iter()
            .next()
            .map(SteemAccount::try_from)
            .transpose()
    }

    async fn account_history(
        &self,
        account: &str,
        start: i64,
        limit: u32,
    ) -> Result<Vec<HistoryItem>, RpcError> {
        let entries: Vec<Value> = self
            .condenser("get_account_history", json!([account, start, limit]))
            .await?;
        entries.iter().map(parse_history_entry).collect()
    }

    async fn chain_props(&self) -> Result<ChainProps, RpcError> {
        self.condenser("get_dynamic_global_properties", json!([]))
            .await
    }

    async fn blockchain_version(&self) -> Result<String, RpcError> {
        let version: RawVersion = self.condenser("get_version", json!([])).await?;
        Ok(version.blockchain_version)
    }

    async fn broadcast(
        &self,
        op: &SteemOp,
        keys: &SigningKeys,
    ) -> Result<Option<String>, RpcError> {
        let props = self.chain_props().await?;
        let unsigned = tx::unsigned_transaction(&props, vec![op.to_json()])?;
        let signed = self
            .signer
            .sign_transaction(&self.chain_id, unsigned, keys)
            .await?;

        debug!(node = %self.rpc.url(), account = %keys.account(), "broadcast_transaction_synchronous");
        let result: Option<BroadcastResult> = self
            .condenser("broadcast_transaction_synchronous", json!([signed]))
            .await?;
        Ok(result.and_then(|r| r.id))
    }
}
