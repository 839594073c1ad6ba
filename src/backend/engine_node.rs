//! Steem Engine sidechain client
//!
//! Token and balance state comes from the contracts JSON-RPC (`findOne` on
//! the `tokens` contract tables); account history from the REST history API.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{Value, json};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

use super::engine::{EngineApi, EngineToken, TOKENS_CONTRACT};
use crate::config::EngineNodeConfig;
use crate::rpc::{JsonRpcClient, RpcError};
use crate::types::TransferRecord;

pub struct EngineNode {
    rpc: JsonRpcClient,
    history_url: String,
}

#[derive(Deserialize)]
struct RawBalance {
    balance: String,
}

#[derive(Deserialize)]
struct RawHistoryEntry {
    #[serde(default, alias = "transactionId")]
    txid: Option<String>,
    #[serde(default)]
    from: String,
    #[serde(default)]
    to: String,
    symbol: String,
    quantity: String,
    #[serde(default)]
    memo: Option<String>,
}

fn parse_quantity(value: &str) -> Result<Decimal, RpcError> {
    Decimal::from_str(value.trim())
        .map_err(|e| RpcError::Decode(format!("invalid quantity {:?}: {}", value, e)))
}

impl TryFrom<RawHistoryEntry> for TransferRecord {
    type Error = RpcError;

    fn try_from(raw: RawHistoryEntry) -> Result<Self, Self::Error> {
        Ok(TransferRecord {
            amount: parse_quantity(&raw.quantity)?,
            txid: raw.txid,
            from: raw.from,
            to: raw.to,
            symbol: raw.symbol,
            memo: raw.memo,
        })
    }
}

/// Decode history rows, dropping the ones that are not readable transfers.
fn parse_history(entries: Vec<Value>) -> Vec<TransferRecord> {
    entries
        .into_iter()
        .filter_map(|entry| {
            let record = serde_json::from_value::<RawHistoryEntry>(entry.clone())
                .map_err(|e| RpcError::Decode(e.to_string()))
                .and_then(TransferRecord::try_from);
            match record {
                Ok(record) => Some(record),
                Err(e) => {
                    debug!(error = %e, entry = %entry, "skipping sidechain history row");
                    None
                }
            }
        })
        .collect()
}

impl EngineNode {
    pub fn new(config: &EngineNodeConfig, timeout: Duration) -> Result<Self, RpcError> {
        Ok(Self {
            rpc: JsonRpcClient::new(&config.rpc_url, timeout)?,
            history_url: config.history_url.clone(),
        })
    }

    async fn find_one<R>(&self, table: &str, query: serde_json::Value) -> Result<Option<R>, RpcError>
    where
        R: serde::de::DeserializeOwned,
    {
        self.rpc
            .call(
                "findOne",
                json!({
                    "contract": TOKENS_CONTRACT,
                    "table": table,
                    "query": query,
                }),
            )
            .await
    }
}

#[async_trait]
impl EngineApi for EngineNode {
    fn node_url(&self) -> &str {
        self.rpc.url()
    }

    async fn get_token(&self, symbol: &str) -> Result<Option<EngineToken>, RpcError> {
        self.find_one("tokens", json!({ "symbol": symbol })).await
    }

    async fn get_balance(&self, account: &str, symbol: &str) -> Result<Option<Decimal>, RpcError> {
        let balance: Option<RawBalance> = self
            .find_one("balances", json!({ "account": account, "symbol": symbol }))
            .await?;
        balance.map(|b| parse_quantity(&b.balance)).transpose()
    }

    async fn transfer_history(
        &self,
        account: &str,
        symbol: &str,
        limit: u32,
    ) -> Result<Vec<TransferRecord>, RpcError> {
        let entries: Vec<Value> = self
            .rpc
            .get(
                &self.history_url,
                &[
                    ("account", account.to_string()),
                    ("limit", limit.to_string()),
                    ("offset", "0".to_string()),
                    ("symbol", symbol.to_string()),
                ],
            )
            .await?;
        Ok(parse_history(entries))
    }
}
