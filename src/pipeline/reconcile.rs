//! Balance reconciliation: recompute a ledger's closing balance.
//!
//! The computation is a single fold over signed amounts. It does not look at
//! dates, so the result is independent of transaction order.
//!
//! Amounts are exact base-10 decimals (`rust_decimal`); no floating point is
//! involved anywhere between the extracted strings and the comparison.

use crate::error::StatementError;
use crate::model::{BalanceCheck, Direction, Ledger, MonetaryAmount, Transaction};
use rust_decimal::{Decimal, RoundingStrategy};
use tracing::debug;

/// Decimal places compared when matching computed and claimed balances.
pub const COMPARISON_SCALE: u32 = 2;

/// The reconciler's view of a transaction: an unsigned amount and a direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerEntry {
    pub amount: Decimal,
    pub direction: Direction,
}

impl LedgerEntry {
    pub fn new(amount: Decimal, direction: Direction) -> Self {
        Self { amount, direction }
    }
}

impl From<&Transaction> for LedgerEntry {
    fn from(tx: &Transaction) -> Self {
        LedgerEntry::new(tx.amount.value, tx.direction)
    }
}

/// `opening + Σ signed(entry)`, or `None` if the sum leaves `Decimal`'s range.
pub fn compute_closing_balance(opening: Decimal, entries: &[LedgerEntry]) -> Option<Decimal> {
    entries.iter().try_fold(opening, |balance, e| match e.direction {
        Direction::Incoming => balance.checked_add(e.amount),
        Direction::Outgoing => balance.checked_sub(e.amount),
    })
}

/// Recompute `ledger` and compare the result with its claimed closing balance.
///
/// Fails with [`StatementError::MixedCurrency`] when any amount is not in the
/// opening balance's currency, and with [`StatementError::BalanceOverflow`]
/// when the amounts cannot be summed exactly. A transaction with an empty currency code
/// inherits the ledger currency.
pub fn reconcile(ledger: &Ledger) -> Result<BalanceCheck, StatementError> {
    let currency = normalise_currency(&ledger.opening.currency);

    ensure_currency(&currency, &ledger.closing, "closing balance")?;
    for (i, tx) in ledger.transactions.iter().enumerate() {
        if tx.amount.currency.trim().is_empty() {
            continue;
        }
        ensure_currency(&currency, &tx.amount, &format!("transaction {}", i + 1))?;
    }

    let entries: Vec<LedgerEntry> = ledger.transactions.iter().map(LedgerEntry::from).collect();
    let opening = ledger.opening.value;
    let computed_closing = compute_closing_balance(opening, &entries).ok_or_else(|| {
        StatementError::BalanceOverflow {
            location: "computed closing balance".into(),
        }
    })?;
    let claimed_closing = ledger.closing.value;
    let difference = claimed_closing.checked_sub(computed_closing).ok_or_else(|| {
        StatementError::BalanceOverflow {
            location: "closing balance difference".into(),
        }
    })?;
    let matches = round(computed_closing) == round(claimed_closing);

    debug!(
        "Reconciled {} transactions: computed {} vs claimed {} {}",
        entries.len(),
        computed_closing,
        claimed_closing,
        currency
    );

    Ok(BalanceCheck {
        currency,
        opening,
        computed_closing,
        claimed_closing,
        difference,
        matches,
    })
}

fn normalise_currency(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

fn ensure_currency(
    expected: &str,
    amount: &MonetaryAmount,
    location: &str,
) -> Result<(), StatementError> {
    let found = normalise_currency(&amount.currency);
    if found == expected {
        Ok(())
    } else {
        Err(StatementError::MixedCurrency {
            expected: expected.to_string(),
            found,
            location: location.to_string(),
        })
    }
}

fn round(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(COMPARISON_SCALE, RoundingStrategy::MidpointAwayFromZero)
}
