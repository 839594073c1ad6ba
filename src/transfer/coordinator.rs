//! Send-or-issue coordinator
//!
//! Drives the fallback FSM over one backend. Each state is handled by its
//! own step function which returns the next state.

use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::state::FallbackState;
use crate::backend::LedgerBackend;
use crate::error::LedgerError;
use crate::types::{SendType, TransferResult};

/// Memo attached to the fallback mint
pub fn issue_memo(to: &str) -> String {
    format!("Issuing to self before transfer to {}", to)
}

/// One pass through the FSM
struct FallbackRun<'a> {
    amount: Decimal,
    to: &'a str,
    from: Option<&'a str>,
    memo: Option<&'a str>,
    /// Set on entering ISSUE_TO_SELF
    platform: Option<String>,
    /// Set once the mint has been broadcast
    minted: Option<TransferResult>,
    result: Option<TransferResult>,
}

pub struct TransferCoordinator {
    backend: Arc<dyn LedgerBackend>,
}

impl TransferCoordinator {
    pub fn new(backend: Arc<dyn LedgerBackend>) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &Arc<dyn LedgerBackend> {
        &self.backend
    }

    /// Send `amount` to `to`, minting it to the platform account first if
    /// the source is short.
    ///
    /// Only `NotEnoughBalance` from the first send engages the fallback.
    /// A result produced through the fallback always has
    /// `send_type == SendType::Issue`.
    ///
    /// Not atomic: if the second send fails the minted supply stays in the
    /// platform account and the error is returned unchanged.
    pub async fn send_or_issue(
        &self,
        amount: Decimal,
        to: &str,
        from: Option<&str>,
        memo: Option<&str>,
    ) -> Result<TransferResult, LedgerError> {
        let mut run = FallbackRun {
            amount,
            to,
            from,
            memo,
            platform: None,
            minted: None,
            result: None,
        };

        let mut state = FallbackState::AttemptSend;
        while !state.is_terminal() {
            let next = self.step(state, &mut run).await?;
            info!(
                symbol = %self.backend.symbol(),
                to = %to,
                from = %state,
                next = %next,
                "fallback transition"
            );
            state = next;
        }

        run.result.ok_or_else(|| {
            LedgerError::Remote(format!(
                "{} transfer to {} finished without a result",
                self.backend.symbol(),
                to
            ))
        })
    }

    /// Execute one state, returning the next one
    async fn step(
        &self,
        state: FallbackState,
        run: &mut FallbackRun<'_>,
    ) -> Result<FallbackState, LedgerError> {
        match state {
            FallbackState::AttemptSend => self.step_attempt_send(run).await,
            FallbackState::IssueToSelf => self.step_issue_to_self(run).await,
            FallbackState::SendAgain => self.step_send_again(run).await,
            FallbackState::Done => Ok(FallbackState::Done),
        }
    }

    async fn step_attempt_send(
        &self,
        run: &mut FallbackRun<'_>,
    ) -> Result<FallbackState, LedgerError> {
        match self
            .backend
            .send(run.amount, run.to, run.from, run.memo)
            .await
        {
            Ok(result) => {
                run.result = Some(result);
                Ok(FallbackState::Done)
            }
            Err(e) if e.is_not_enough_balance() => {
                debug!(
                    symbol = %self.backend.symbol(),
                    error = %e,
                    "source is short, minting to platform account"
                );
                Ok(FallbackState::IssueToSelf)
            }
            Err(e) => Err(e),
        }
    }

    async fn step_issue_to_self(
        &self,
        run: &mut FallbackRun<'_>,
    ) -> Result<FallbackState, LedgerError> {
        let platform = self
            .backend
            .platform_account()
            .map(String::from)
            .ok_or_else(|| {
                LedgerError::Configuration(format!(
                    "{} has no platform account to issue to",
                    self.backend.symbol()
                ))
            })?;

        let memo = issue_memo(run.to);
        let minted = self
            .backend
            .issue(run.amount, &platform, Some(memo.as_str()))
            .await?;

        run.platform = Some(platform);
        run.minted = Some(minted);
        Ok(FallbackState::SendAgain)
    }

    async fn step_send_again(
        &self,
        run: &mut FallbackRun<'_>,
    ) -> Result<FallbackState, LedgerError> {
        let platform = run.platform.as_deref().ok_or_else(|| {
            LedgerError::Configuration(format!(
                "{} send retried before issuing",
                self.backend.symbol()
            ))
        })?;

        match self
            .backend
            .send(run.amount, run.to, Some(platform), run.memo)
            .await
        {
            Ok(mut result) => {
                result.send_type = SendType::Issue;
                run.result = Some(result);
                Ok(FallbackState::Done)
            }
            Err(e) => {
                let mint_txid = run
                    .minted
                    .as_ref()
                    .and_then(|m| m.txid.as_deref())
                    .unwrap_or("unknown");
                warn!(
                    symbol = %self.backend.symbol(),
                    amount = %run.amount,
                    platform = %platform,
                    to = %run.to,
                    mint_txid = %mint_txid,
                    error = %e,
                    "minted supply left in platform account, send after issue failed"
                );
                Err(e)
            }
        }
    }
}
