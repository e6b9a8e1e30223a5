//! Line item validation and subtotal aggregation.

use std::fmt;

use rust_decimal::Decimal;
use thiserror::Error;

use crate::calculations::common::{is_money, max_amount, to_money, zero_money};
use crate::models::{InvoiceLine, NewInvoiceLine};

/// The line field that failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineField {
    Description,
    Qty,
    UnitPrice,
    LineTotal,
}

impl fmt::Display for LineField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Description => "description",
            Self::Qty => "qty",
            Self::UnitPrice => "unit_price",
            Self::LineTotal => "line_total",
        })
    }
}

/// A line rejected before aggregation. Carries the 1-based position, the
/// field and the offending value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid line {position}: {field} = '{value}' ({reason})")]
pub struct InvalidLine {
    pub position: usize,
    pub field: LineField,
    pub value: String,
    pub reason: &'static str,
}

impl InvalidLine {
    fn new(position: usize, field: LineField, value: impl ToString, reason: &'static str) -> Self {
        Self {
            position,
            field,
            value: value.to_string(),
            reason,
        }
    }
}

/// Field-level checks shared by new and persisted lines. Amounts must fit a
/// money column as given; nothing is rounded to make them fit.
pub fn validate_line_fields(
    position: usize,
    description: &str,
    qty: Decimal,
    unit_price: Decimal,
    line_total: Decimal,
) -> Result<(), InvalidLine> {
    if description.trim().is_empty() {
        return Err(InvalidLine::new(position, LineField::Description, description, "must not be empty"));
    }
    if qty <= Decimal::ZERO {
        return Err(InvalidLine::new(position, LineField::Qty, qty, "must be greater than zero"));
    }
    check_money(position, LineField::Qty, qty)?;
    if unit_price < Decimal::ZERO {
        return Err(InvalidLine::new(position, LineField::UnitPrice, unit_price, "must not be negative"));
    }
    check_money(position, LineField::UnitPrice, unit_price)?;
    if line_total < Decimal::ZERO {
        return Err(InvalidLine::new(position, LineField::LineTotal, line_total, "must not be negative"));
    }
    check_money(position, LineField::LineTotal, line_total)
}

fn check_money(position: usize, field: LineField, value: Decimal) -> Result<(), InvalidLine> {
    if !is_money(value) {
        return Err(InvalidLine::new(position, field, value, "more than two fraction digits"));
    }
    if value > max_amount() {
        return Err(InvalidLine::new(position, field, value, "exceeds 99999999.99"));
    }
    Ok(())
}

/// Also rejects a derived `qty * unit_price` that does not fit a money
/// column.
pub fn validate_new_line(position: usize, line: &NewInvoiceLine) -> Result<(), InvalidLine> {
    validate_line_fields(
        position,
        &line.description,
        line.qty,
        line.unit_price,
        line.line_total_override.unwrap_or(Decimal::ZERO),
    )?;
    if line.line_total().is_none() {
        return Err(InvalidLine::new(
            position,
            LineField::LineTotal,
            format!("{} x {}", line.qty, line.unit_price),
            "exceeds 99999999.99",
        ));
    }
    Ok(())
}

/// Sums line totals into a subtotal.
pub struct LineAggregator;

impl LineAggregator {
    /// Validates every line, then returns `Σ line_total` with two fraction
    /// digits. An empty slice yields `0.00`.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidLine`] for the first line with `qty <= 0`,
    /// `unit_price < 0`, a negative total or an empty description. Nothing
    /// is coerced.
    pub fn subtotal(lines: &[InvoiceLine]) -> Result<Decimal, InvalidLine> {
        for (index, line) in lines.iter().enumerate() {
            validate_line_fields(index + 1, &line.description, line.qty, line.unit_price, line.line_total)?;
        }

        let sum = lines.iter().enumerate().try_fold(zero_money(), |acc, (index, line)| {
            acc.checked_add(line.line_total).ok_or_else(|| {
                InvalidLine::new(index + 1, LineField::LineTotal, line.line_total, "subtotal overflows")
            })
        })?;
        Ok(to_money(sum))
    }
}
