//! Network fee deduction
//!
//! For ledgers that charge the transfer fee in the transferred asset, the fee
//! is only known once an operation exists to price. Two passes:
//!
//! 1. build a provisional operation carrying the full amount and a zero fee,
//! 2. ask the network what that operation costs,
//! 3. rebuild it with the fee populated and the amount reduced by the fee.
//!
//! All arithmetic is in integer base units (`amount * 10^precision`), so
//! `net + fee == gross` holds exactly.

use async_trait::async_trait;

use crate::amount::from_base_units;
use crate::error::LedgerError;
use crate::rpc::RpcError;

/// Prices an operation in a given fee asset
#[async_trait]
pub trait FeeSchedule<Op: Send + Sync>: Send + Sync {
    /// Required fee for `op`, in base units of `fee_asset_id`.
    async fn required_fee(&self, op: &Op, fee_asset_id: &str) -> Result<i64, RpcError>;
}

/// Fee split of one transfer, in base units
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeQuote {
    pub gross: i64,
    pub fee: i64,
    pub net: i64,
}

/// Subtract `fee` from `gross`, rejecting results below one base unit.
pub fn deduct_fee(
    gross: i64,
    fee: i64,
    precision: u32,
    symbol: &str,
) -> Result<FeeQuote, LedgerError> {
    if fee < 0 {
        return Err(LedgerError::Remote(format!(
            "network quoted a negative fee ({}) for {}",
            fee, symbol
        )));
    }
    let net = gross - fee;
    if net < 1 {
        return Err(LedgerError::Arithmetic(format!(
            "Failed to send because {} is less than the network transaction fee of {} {} tokens",
            from_base_units(gross, precision)?,
            from_base_units(fee, precision)?,
            symbol
        )));
    }
    Ok(FeeQuote { gross, fee, net })
}

/// Run the two-pass construction.
///
/// `build(amount, fee)` must produce the operation for the given base-unit
/// amount and fee; it is called once with `(gross, 0)` and once with the
/// final split.
pub async fn two_pass<S, Op, F>(
    schedule: &S,
    gross: i64,
    fee_asset_id: &str,
    precision: u32,
    symbol: &str,
    build: F,
) -> Result<(Op, FeeQuote), LedgerError>
where
    S: FeeSchedule<Op> + ?Sized,
    Op: Send + Sync,
    F: Fn(i64, i64) -> Op,
{
    let provisional = build(gross, 0);
    let fee = schedule
        .required_fee(&provisional, fee_asset_id)
        .await
        .map_err(LedgerError::from)?;
    let quote = deduct_fee(gross, fee, precision, symbol)?;
    Ok((build(quote.net, quote.fee), quote))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    struct FakeOp {
        amount: i64,
        fee: i64,
    }

    /// Charges a flat fee and records what it was asked to price
    struct FlatFee {
        fee: i64,
        priced: Mutex<Vec<FakeOp>>,
    }

    #[async_trait]
    impl FeeSchedule<FakeOp> for FlatFee {
        async fn required_fee(&self, op: &FakeOp, _fee_asset_id: &str) -> Result<i64, RpcError> {
            self.priced.lock().unwrap().push(op.clone());
            Ok(self.fee)
        }
    }

    #[test]
    fn test_deduct_fee_invariant() {
        let quote = deduct_fee(1_000_000, 2_345, 5, "SGTK").unwrap();
        assert_eq!(quote.net + quote.fee, quote.gross);
        assert_eq!(quote.net, 997_655);
    }

    #[test]
    fn test_fee_consuming_everything_is_arithmetic_error() {
        let err = deduct_fee(100, 100, 5, "SGTK").unwrap_err();
        assert_eq!(err.code(), "ARITHMETIC_ERROR");

        let err = deduct_fee(100, 150, 5, "SGTK").unwrap_err();
        assert_eq!(err.code(), "ARITHMETIC_ERROR");
    }

    #[test]
    fn test_negative_fee_rejected() {
        let err = deduct_fee(100, -1, 5, "SGTK").unwrap_err();
        assert_eq!(err.code(), "REMOTE_ERROR");
    }

    #[tokio::test]
    async fn test_two_pass_prices_provisional_then_rebuilds() {
        let schedule = FlatFee {
            fee: 250,
            priced: Mutex::new(Vec::new()),
        };

        let (op, quote) = two_pass(&schedule, 10_000, "1.3.99", 4, "SGTK", |amount, fee| {
            FakeOp { amount, fee }
        })
        .await
        .unwrap();

        let priced = schedule.priced.lock().unwrap();
        assert_eq!(priced.len(), 1);
        assert_eq!(priced[0], FakeOp { amount: 10_000, fee: 0 });
        assert_eq!(op, FakeOp { amount: 9_750, fee: 250 });
        assert_eq!(quote.net + quote.fee, 10_000);
    }
}
