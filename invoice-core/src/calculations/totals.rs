//! Pure totals computation: aggregation followed by VAT.
//!
//! The service layer runs this inside the same unit of work that changed
//! the lines and is the only caller that writes the result.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::calculations::aggregator::{InvalidLine, LineAggregator};
use crate::calculations::common::{max_amount, round_half_up, to_money};
use crate::calculations::vat::{VatCalculator, VatError};
use crate::models::InvoiceLine;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TotalsError {
    #[error(transparent)]
    InvalidLine(#[from] InvalidLine),

    #[error(transparent)]
    Vat(#[from] VatError),

    /// The subtotal or total exceeds what a money column holds.
    #[error("invoice amount {0} exceeds 99999999.99")]
    AmountOutOfRange(Decimal),
}

/// The three monetary outputs of a recompute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceTotals {
    pub subtotal: Decimal,
    pub vat_amount: Decimal,
    pub total: Decimal,
}

impl InvoiceTotals {
    /// Aggregates `lines` and applies `effective_rate`.
    ///
    /// # Errors
    ///
    /// * [`TotalsError::InvalidLine`]: a line failed validation; nothing is
    ///   computed.
    /// * [`TotalsError::Vat`]: the rate is outside `0..=100`.
    /// * [`TotalsError::AmountOutOfRange`]: the subtotal or total does not
    ///   fit `99999999.99`.
    pub fn compute(lines: &[InvoiceLine], effective_rate: Decimal) -> Result<Self, TotalsError> {
        let subtotal = LineAggregator::subtotal(lines)?;
        if subtotal > max_amount() {
            return Err(TotalsError::AmountOutOfRange(subtotal));
        }
        let vat_amount = VatCalculator::vat_amount(subtotal, effective_rate)?;
        let total = subtotal
            .checked_add(vat_amount)
            .map(to_money)
            .filter(|total| *total <= max_amount())
            .ok_or(TotalsError::AmountOutOfRange(subtotal))?;
        Ok(Self {
            subtotal,
            vat_amount,
            total,
        })
    }

    /// `total == subtotal + round_half_up(subtotal * rate / 100)`. An
    /// overflowing side counts as a mismatch.
    pub fn satisfies_invariant(&self, effective_rate: Decimal) -> bool {
        self.subtotal
            .checked_mul(effective_rate)
            .map(|scaled| round_half_up(scaled / Decimal::ONE_HUNDRED))
            .and_then(|vat| self.subtotal.checked_add(vat))
            .is_some_and(|expected| expected == self.total)
    }

    /// Byte-level comparison with already persisted values, so a recompute
    /// that would rewrite `8.0` as `8.00` still counts as a change.
    pub fn matches_persisted(&self, subtotal: Decimal, total: Decimal) -> bool {
        self.subtotal.to_string() == subtotal.to_string() && self.total.to_string() == total.to_string()
    }
}
