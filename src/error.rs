//! Ledger Error Types
//!
//! One taxonomy for all three backends. Library and transport errors are
//! converted into these kinds at the adapter boundary and never leak past it.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::keys::KeyError;
use crate::rpc::RpcError;

/// Errors returned by every [`LedgerBackend`](crate::backend::LedgerBackend)
/// operation and by the transfer coordinator.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Token not found: {0}")]
    TokenNotFound(String),

    #[error("Account {account} has balance {balance} but needs {required}")]
    NotEnoughBalance {
        account: String,
        balance: Decimal,
        required: Decimal,
    },

    /// Signing key missing for a transfer.
    #[error("Missing signing authority: {0}")]
    AuthorityMissing(String),

    /// Signing key missing for an issuance.
    #[error("Missing issuer key: {0}")]
    IssuerKeyError(String),

    /// Amount below the minimum representable unit, before or after fees.
    #[error("Arithmetic error: {0}")]
    Arithmetic(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Transport or protocol failure that maps to none of the kinds above.
    #[error("Remote ledger error: {0}")]
    Remote(String),
}

impl LedgerError {
    /// Stable error code for callers that persist or display failures
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            LedgerError::TokenNotFound(_) => "TOKEN_NOT_FOUND",
            LedgerError::NotEnoughBalance { .. } => "NOT_ENOUGH_BALANCE",
            LedgerError::AuthorityMissing(_) => "AUTHORITY_MISSING",
            LedgerError::IssuerKeyError(_) => "ISSUER_KEY_ERROR",
            LedgerError::Arithmetic(_) => "ARITHMETIC_ERROR",
            LedgerError::Configuration(_) => "CONFIGURATION_ERROR",
            LedgerError::Remote(_) => "REMOTE_ERROR",
        }
    }

    /// Whether the send-or-issue fallback may engage on this error
    #[inline]
    pub fn is_not_enough_balance(&self) -> bool {
        matches!(self, LedgerError::NotEnoughBalance { .. })
    }

    /// Map a key store failure during a transfer.
    pub fn from_transfer_key(e: KeyError) -> Self {
        LedgerError::AuthorityMissing(e.to_string())
    }

    /// Map a key store failure during an issuance.
    pub fn from_issuer_key(e: KeyError) -> Self {
        LedgerError::IssuerKeyError(e.to_string())
    }

    /// Map a broadcast failure for a transfer.
    ///
    /// A node or signer that reports missing authority becomes `AuthorityMissing`.
    pub fn from_transfer_rpc(e: RpcError) -> Self {
        match e {
            RpcError::MissingAuthority(msg) => LedgerError::AuthorityMissing(msg),
            other => other.into(),
        }
    }

    /// Map a broadcast failure for an issuance.
    pub fn from_issue_rpc(e: RpcError) -> Self {
        match e {
            RpcError::MissingAuthority(msg) => LedgerError::IssuerKeyError(msg),
            other => other.into(),
        }
    }
}

impl From<RpcError> for LedgerError {
    fn from(e: RpcError) -> Self {
        match e {
            RpcError::MissingAuthority(msg) => LedgerError::AuthorityMissing(msg),
            other => LedgerError::Remote(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            LedgerError::AccountNotFound("bob".into()).code(),
            "ACCOUNT_NOT_FOUND"
        );
        assert_eq!(
            LedgerError::IssuerKeyError("x".into()).code(),
            "ISSUER_KEY_ERROR"
        );
        assert_eq!(
            LedgerError::Configuration("x".into()).code(),
            "CONFIGURATION_ERROR"
        );
    }

    #[test]
    fn test_not_enough_balance_display() {
        let err = LedgerError::NotEnoughBalance {
            account: "someguy123".into(),
            balance: Decimal::new(5, 0),
            required: Decimal::new(10, 0),
        };
        assert!(err.is_not_enough_balance());
        assert_eq!(
            err.to_string(),
            "Account someguy123 has balance 5 but needs 10"
        );
    }

    #[test]
    fn test_rpc_mapping() {
        let e = LedgerError::from_issue_rpc(RpcError::MissingAuthority("active".into()));
        assert_eq!(e.code(), "ISSUER_KEY_ERROR");

        let e = LedgerError::from_transfer_rpc(RpcError::MissingAuthority("active".into()));
        assert_eq!(e.code(), "AUTHORITY_MISSING");

        let e: LedgerError = RpcError::Transport("timed out".into()).into();
        assert_eq!(e.code(), "REMOTE_ERROR");
        assert!(!e.is_not_enough_balance());
    }

    #[test]
    fn test_key_mapping() {
        let key_err = KeyError::NotFound {
            account: "privex".into(),
            role: crate::keys::KeyRole::Active,
        };
        assert_eq!(
            LedgerError::from_transfer_key(key_err.clone()).code(),
            "AUTHORITY_MISSING"
        );
        assert_eq!(
            LedgerError::from_issuer_key(key_err).code(),
            "ISSUER_KEY_ERROR"
        );
    }
}
