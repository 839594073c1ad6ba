//! ledger_bridge - Multi-ledger token transfer orchestration
//!
//! One uniform contract for balances, account validation, issuance and
//! transfers over three unrelated ledgers.
//!
//! # Modules
//!
//! - [`amount`] - Precision normalization, payer-safe truncation, base units
//! - [`backend`] - `LedgerBackend` trait, Graphene / Steem / Steem Engine backends, registry
//! - [`fee`] - Two-pass fee construction for fee-in-asset ledgers
//! - [`memo`] - Memo-filtered inbound balance aggregation
//! - [`transfer`] - Send-or-issue fallback state machine
//! - [`error`] - Shared error taxonomy
//! - [`keys`] - Per-operation key lookup and the external signing seam
//! - [`rpc`] - JSON-RPC / REST transport shared by the node clients
//! - [`config`] / [`logging`] - YAML configuration and tracing setup

pub mod amount;
pub mod backend;
pub mod config;
pub mod error;
pub mod fee;
pub mod health;
pub mod keys;
pub mod logging;
pub mod memo;
pub mod rpc;
pub mod transfer;
pub mod types;

// Convenient re-exports at crate root
pub use backend::{BackendRegistry, BackendSettings, LedgerBackend};
pub use config::AppConfig;
pub use error::LedgerError;
pub use health::{HealthReport, HealthStatus};
pub use keys::{KeyRole, KeyStore, SigningKeys, TransactionSigner};
pub use transfer::{FallbackState, TransferCoordinator};
pub use types::{Asset, DepositTarget, SendType, TransferRecord, TransferResult};
