//! Memo-filtered balance aggregation
//!
//! Sums what an account received under one memo by scanning its transfer
//! history. There is no index: the scan is O(history) and bounded by each
//! network's page cap. This path is for reconciliation, not for sends.

use rust_decimal::Decimal;

use crate::error::LedgerError;
use crate::types::TransferRecord;

/// Memo match rule. Both sides are trimmed before comparing.
#[derive(Debug, Clone)]
pub struct MemoFilter {
    memo: String,
    case_sensitive: bool,
}

impl MemoFilter {
    /// `None` if the memo is empty after trimming, meaning "no memo filter".
    pub fn new(memo: Option<&str>, case_sensitive: bool) -> Option<Self> {
        let memo = memo?.trim();
        if memo.is_empty() {
            return None;
        }
        Some(Self {
            memo: memo.to_string(),
            case_sensitive,
        })
    }

    pub fn memo(&self) -> &str {
        &self.memo
    }

    pub fn matches(&self, candidate: Option<&str>) -> bool {
        let Some(candidate) = candidate else {
            return false;
        };
        let candidate = candidate.trim();
        if self.case_sensitive {
            candidate == self.memo
        } else {
            candidate.to_lowercase() == self.memo.to_lowercase()
        }
    }
}

/// Sum of transfers to `account` in `symbol` whose memo passes `filter`.
///
/// Account and symbol comparisons are case-insensitive; ledger account names
/// and token symbols are not case-significant on any supported network.
pub fn sum_received<'a, I>(
    records: I,
    account: &str,
    symbol: &str,
    filter: &MemoFilter,
) -> Result<Decimal, LedgerError>
where
    I: IntoIterator<Item = &'a TransferRecord>,
{
    records
        .into_iter()
        .filter(|r| r.to.eq_ignore_ascii_case(account))
        .filter(|r| r.symbol.eq_ignore_ascii_case(symbol))
        .filter(|r| filter.matches(r.memo.as_deref()))
        .try_fold(Decimal::ZERO, |total, r| {
            total.checked_add(r.amount).ok_or_else(|| {
                LedgerError::Arithmetic(format!(
                    "{} received under memo '{}' overflows",
                    symbol,
                    filter.memo()
                ))
            })
        })
}
