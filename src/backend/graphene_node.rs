//! Graphene node client over HTTP JSON-RPC
//!
//! Every request goes through the node's `call` method as
//! `[api, method, args]`, with `api` one of `database`, `history` or
//! `network_broadcast`.

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::graphene::{
    AssetAmount, CORE_ASSET_ID, GrapheneAccount, GrapheneApi, GrapheneAsset, GrapheneOp,
    GrapheneTransfer,
};
use super::tx::{self, ChainProps};
use crate::config::GrapheneNodeConfig;
use crate::fee::FeeSchedule;
use crate::keys::{SigningKeys, TransactionSigner};
use crate::rpc::{JsonRpcClient, RpcError};

pub struct GrapheneNode {
    rpc: JsonRpcClient,
    signer: Arc<dyn TransactionSigner>,
}

#[derive(Deserialize)]
struct RawAccount {
    id: String,
    name: String,
    options: RawAccountOptions,
}

#[derive(Deserialize)]
struct RawAccountOptions {
    memo_key: String,
}

impl From<RawAccount> for GrapheneAccount {
    fn from(raw: RawAccount) -> Self {
        GrapheneAccount {
            id: raw.id,
            name: raw.name,
            memo_key: raw.options.memo_key,
        }
    }
}

/// Whether `s` is an object id like `1.2.100` rather than a name.
fn is_object_id(s: &str) -> bool {
    let parts: Vec<&str> = s.split('.').collect();
    parts.len() == 3
        && parts
            .iter()
            .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
}

/// Nodes send 64-bit amounts as either JSON numbers or strings.
fn parse_units(value: &Value) -> Result<i64, RpcError> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| RpcError::Decode(format!("amount {} out of range", n))),
        Value::String(s) => s
            .parse()
            .map_err(|_| RpcError::Decode(format!("invalid amount {:?}", s))),
        other => Err(RpcError::Decode(format!("invalid amount {}", other))),
    }
}

fn parse_asset_amount(value: &Value) -> Result<AssetAmount, RpcError> {
    let asset_id = value["asset_id"]
        .as_str()
        .ok_or_else(|| RpcError::Decode(format!("missing asset_id in {}", value)))?;
    Ok(AssetAmount::new(parse_units(&value["amount"])?, asset_id))
}

/// Transfer operations out of `get_account_history` entries.
fn parse_history(entries: &[Value]) -> Result<Vec<GrapheneTransfer>, RpcError> {
    let mut transfers = Vec::new();
    for entry in entries {
        let op = &entry["op"];
        if op[0].as_u64() != Some(GrapheneOp::TRANSFER as u64) {
            continue;
        }
        let body = &op[1];
        transfers.push(GrapheneTransfer {
            from: body["from"].as_str().unwrap_or_default().to_string(),
            to: body["to"].as_str().unwrap_or_default().to_string(),
            amount: parse_asset_amount(&body["amount"])?,
            memo: body.get("memo").filter(|m| !m.is_null()).cloned(),
        });
    }
    Ok(transfers)
}

/// First fee out of `get_required_fees`; nested arrays appear for proposals.
fn first_fee(fees: &[Value]) -> Result<i64, RpcError> {
    let fee = match fees.first() {
        Some(Value::Array(nested)) => nested.first(),
        other => other,
    }
    .ok_or_else(|| RpcError::Decode("empty get_required_fees result".into()))?;
    parse_units(&fee["amount"])
}

impl GrapheneNode {
    pub fn new(
        config: &GrapheneNodeConfig,
        timeout: Duration,
        signer: Arc<dyn TransactionSigner>,
    ) -> Result<Self, RpcError> {
        Ok(Self {
            rpc: JsonRpcClient::new(&config.url, timeout)?,
            signer,
        })
    }

    async fn api_call<R>(&self, api: &str, method: &str, args: Value) -> Result<R, RpcError>
    where
        R: DeserializeOwned,
    {
        self.rpc.call("call", json!([api, method, args])).await
    }

    async fn db<R>(&self, method: &str, args: Value) -> Result<R, RpcError>
    where
        R: DeserializeOwned,
    {
        self.api_call("database", method, args).await
    }
}

#[async_trait]
impl FeeSchedule<GrapheneOp> for GrapheneNode {
    async fn required_fee(&self, op: &GrapheneOp, fee_asset_id: &str) -> Result<i64, RpcError> {
        let fees: Vec<Value> = self
            .db("get_required_fees", json!([[op.to_json()], fee_asset_id]))
            .await?;
        first_fee(&fees)
    }
}

#[async_trait]
impl GrapheneApi for GrapheneNode {
    fn node_url(&self) -> &str {
        self.rpc.url()
    }

    async fn lookup_asset(&self, symbol: &str) -> Result<Option<GrapheneAsset>, RpcError> {
        let assets: Vec<Option<GrapheneAsset>> =
            self.db("lookup_asset_symbols", json!([[symbol]])).await?;
        Ok(assets.into_iter().next().flatten())
    }

    async fn get_account(&self, name_or_id: &str) -> Result<Option<GrapheneAccount>, RpcError> {
        if is_object_id(name_or_id) {
            let accounts: Vec<Option<RawAccount>> =
                self.db("get_objects", json!([[name_or_id]])).await?;
            return Ok(accounts.into_iter().next().flatten().map(Into::into));
        }
        let account: Option<RawAccount> =
            self.db("get_account_by_name", json!([name_or_id])).await?;
        Ok(account.map(Into::into))
    }

    async fn account_balance(&self, account_id: &str, asset_id: &str) -> Result<i64, RpcError> {
        let balances: Vec<Value> = self
            .db("get_account_balances", json!([account_id, [asset_id]]))
            .await?;
        for balance in &balances {
            let amount = parse_asset_amount(balance)?;
            if amount.asset_id == asset_id {
                return Ok(amount.amount);
            }
        }
        Ok(0)
    }

    async fn transfer_history(
        &self,
        account_id: &str,
        limit: u32,
    ) -> Result<Vec<GrapheneTransfer>, RpcError> {
        let entries: Vec<Value> = self
            .api_call(
                "history",
                "get_account_history",
                json!([account_id, "1.11.0", limit, "1.11.0"]),
            )
            .await?;
        parse_history(&entries)
    }

    async fn encrypt_memo(
        &self,
        keys: &SigningKeys,
        to_memo_key: &str,
        memo: &str,
    ) -> Result<Value, RpcError> {
        self.signer.encrypt_memo(keys, to_memo_key, memo).await
    }

    fn decrypt_memo(&self, keys: &SigningKeys, memo: &Value) -> Option<String> {
        self.signer.decrypt_memo(keys, memo)
    }

    async fn broadcast(
        &self,
        op: &GrapheneOp,
        keys: &SigningKeys,
    ) -> Result<Option<String>, RpcError> {
        // Issuance fees are priced here, in the core asset, right before signing.
        let op = match op {
            GrapheneOp::AssetIssue { fee, .. } if fee.amount == 0 => {
                let fee = self.required_fee(op, CORE_ASSET_ID).await?;
                op.clone().with_fee(fee)
            }
            _ => op.clone(),
        };

        let props = self.chain_props().await?;
        let unsigned = tx::unsigned_transaction(&props, vec![op.to_json()])?;
        let chain_id: String = self.db("get_chain_id", json!([])).await?;
        let signed = self
            .signer
            .sign_transaction(&chain_id, unsigned, keys)
            .await?;

        debug!(node = %self.rpc.url(), op = op.op_id(), "broadcast_transaction");
        let _: Value = self
            .api_call("network_broadcast", "broadcast_transaction", json!([signed]))
            .await?;
        Ok(None)
    }

    async fn chain_props(&self) -> Result<ChainProps, RpcError> {
        self.db("get_dynamic_global_properties", json!([])).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::OfflineSigner;

    #[test]
    fn test_object_id_detection() {
        assert!(is_object_id("1.2.100"));
        assert!(!is_object_id("privex"));
        assert!(!is_object_id("1.2"));
        assert!(!is_object_id("1..2"));
    }

    #[test]
    fn test_amounts_as_number_or_string() {
        assert_eq!(parse_units(&json!(123)).unwrap(), 123);
        assert_eq!(parse_units(&json!("9007199254740993")).unwrap(), 9_007_199_254_740_993);
        assert!(parse_units(&json!(null)).is_err());
    }

    #[test]
    fn test_first_fee_flat_and_nested() {
        let flat = vec![json!({"amount": 4500, "asset_id": "1.3.0"})];
        assert_eq!(first_fee(&flat).unwrap(), 4500);
        let nested = vec![json!([{"amount": "12", "asset_id": "1.3.0"}, []])];
        assert_eq!(first_fee(&nested).unwrap(), 12);
        assert!(first_fee(&[]).is_err());
    }

    #[test]
    fn test_parse_history_keeps_transfers_only() {
        let entries = vec![
            json!({
                "id": "1.11.5",
                "op": [0, {
                    "fee": {"amount": 10, "asset_id": "1.3.0"},
                    "from": "1.2.101",
                    "to": "1.2.100",
                    "amount": {"amount": "250000", "asset_id": "1.3.4071"},
                    "memo": {"from": "BTSa", "to": "BTSb", "nonce": "1", "message": "ab"}
                }]
            }),
            json!({"id": "1.11.4", "op": [14, {"issuer": "1.2.9"}]}),
            json!({
                "id": "1.11.3",
                "op": [0, {
                    "from": "1.2.100",
                    "to": "1.2.101",
                    "amount": {"amount": 1, "asset_id": "1.3.0"}
                }]
            }),
        ];
        let transfers = parse_history(&entries).unwrap();
        assert_eq!(transfers.len(), 2);
        assert_eq!(transfers[0].to, "1.2.100");
        assert_eq!(transfers[0].amount, AssetAmount::new(250_000, "1.3.4071"));
        assert!(transfers[0].memo.is_some());
        assert!(transfers[1].memo.is_none());
    }

    #[test]
    fn test_raw_account_conversion() {
        let raw: RawAccount = serde_json::from_value(json!({
            "id": "1.2.100",
            "name": "privex",
            "options": {"memo_key": "BTS7memo", "voting_account": "1.2.5"},
            "statistics": "2.6.100"
        }))
        .unwrap();
        let account: GrapheneAccount = raw.into();
        assert_eq!(account.memo_key, "BTS7memo");
    }

    #[tokio::test]
    async fn test_unreachable_node() {
        let config = GrapheneNodeConfig {
            url: "http://127.0.0.1:1".into(),
        };
        let node =
            GrapheneNode::new(&config, Duration::from_millis(200), Arc::new(OfflineSigner)).unwrap();
        assert_eq!(node.node_url(), "http://127.0.0.1:1");
        assert!(matches!(
            node.lookup_asset("SGTK").await,
            Err(RpcError::Transport(_))
        ));
    }
}
