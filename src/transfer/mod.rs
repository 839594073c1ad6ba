//! Send-or-Issue Fallback
//!
//! Composes a backend's `send` and `issue` into one operation: when the
//! source account cannot cover a transfer, the amount is minted to the
//! platform account and sent from there instead.
//!
//! # State Machine
//!
//! ```text
//! ATTEMPT_SEND ──ok──────────────────────────────→ DONE
//!      │
//!      └─NotEnoughBalance→ ISSUE_TO_SELF → SEND_AGAIN → DONE
//! ```
//!
//! # Failure Window
//!
//! The fallback is not atomic. A failure in SEND_AGAIN leaves the minted
//! supply in the platform account. The coordinator logs the mint at warn
//! level and returns the error unchanged; reconciliation is the caller's job.

pub mod coordinator;
pub mod state;

pub use coordinator::TransferCoordinator;
pub use state::FallbackState;
