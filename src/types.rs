//! Shared ledger data types

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Token metadata as read from the network for one operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub symbol: String,
    /// Digits after the decimal point
    pub precision: u32,
    /// Issuing account; empty for native currencies
    pub issuer: String,
}

/// Provenance of a [`TransferResult`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SendType {
    /// Existing balance moved between accounts
    Send,
    /// New supply was minted to produce this result
    Issue,
}

impl SendType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SendType::Send => "send",
            SendType::Issue => "issue",
        }
    }
}

impl fmt::Display for SendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of an issue or send.
///
/// `txid` is `None` when the backend cannot recover it after broadcast.
/// Treat that as "broadcast accepted, confirmation unknown", not as failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferResult {
    pub txid: Option<String>,
    pub coin: String,
    /// Amount received by the destination, net of fee
    pub amount: Decimal,
    /// Fee taken out of the transferred asset (zero if paid in another asset)
    pub fee: Decimal,
    /// Account the coins were sent or issued from
    #[serde(rename = "from")]
    pub from_account: String,
    pub send_type: SendType,
}

/// One transfer entry from an account's history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferRecord {
    pub txid: Option<String>,
    pub from: String,
    pub to: String,
    pub symbol: String,
    pub amount: Decimal,
    pub memo: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DepositKind {
    /// Deposits go to a named account; the caller generates the memo.
    Account,
}

/// Where users send coins for this symbol
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositTarget {
    pub kind: DepositKind,
    pub account: String,
}

impl DepositTarget {
    pub fn account(account: impl Into<String>) -> Self {
        Self {
            kind: DepositKind::Account,
            account: account.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_result_serializes_from_field() {
        let result = TransferResult {
            txid: None,
            coin: "SGTK".into(),
            amount: Decimal::new(510, 2),
            fee: Decimal::ZERO,
            from_account: "privex".into(),
            send_type: SendType::Issue,
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["from"], "privex");
        assert_eq!(json["send_type"], "issue");
        assert!(json["txid"].is_null());
    }

    #[test]
    fn test_deposit_target() {
        let target = DepositTarget::account("privex");
        assert_eq!(target.kind, DepositKind::Account);
        assert_eq!(
            serde_json::to_value(&target).unwrap()["kind"],
            serde_json::json!("account")
        );
    }
}
