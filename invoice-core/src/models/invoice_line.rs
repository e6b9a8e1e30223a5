use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::calculations::common::{max_amount, to_money};

/// A persisted line item. Owned by exactly one invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceLine {
    pub id: i64,
    pub invoice_id: i64,
    /// 1-based display order within the invoice.
    pub position: i32,
    pub description: String,
    pub qty: Decimal,
    pub unit_price: Decimal,
    pub line_total: Decimal,
    /// `true` when `line_total` was supplied by the caller instead of
    /// being derived from `qty * unit_price`.
    pub manual_total: bool,
}

impl InvoiceLine {
    /// Rebuilds the input that produced this line, keeping a manual
    /// override authoritative.
    pub fn to_new_line(&self) -> NewInvoiceLine {
        NewInvoiceLine {
            description: self.description.clone(),
            qty: self.qty,
            unit_price: self.unit_price,
            line_total_override: self.manual_total.then_some(self.line_total),
        }
    }
}

/// For creating or replacing lines (no id, owner or position).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewInvoiceLine {
    pub description: String,
    pub qty: Decimal,
    pub unit_price: Decimal,
    pub line_total_override: Option<Decimal>,
}

impl NewInvoiceLine {
    pub fn new(
        description: impl Into<String>,
        qty: Decimal,
        unit_price: Decimal,
    ) -> Self {
        Self {
            description: description.into(),
            qty,
            unit_price,
            line_total_override: None,
        }
    }

    pub fn with_line_total(mut self, line_total: Decimal) -> Self {
        self.line_total_override = Some(line_total);
        self
    }

    /// `qty * unit_price` rounded half-up, unless overridden. `None` when the
    /// result does not fit a money column.
    pub fn line_total(&self) -> Option<Decimal> {
        let raw = match self.line_total_override {
            Some(line_total) => line_total,
            None => self.qty.checked_mul(self.unit_price)?,
        };
        let line_total = to_money(raw);
        (line_total <= max_amount()).then_some(line_total)
    }

    pub fn is_manual_total(&self) -> bool {
        self.line_total_override.is_some()
    }
}

/// One mutation of an invoice's line set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LineChange {
    Add(NewInvoiceLine),
    Update { line_id: i64, line: NewInvoiceLine },
    Remove { line_id: i64 },
    /// Replace every existing line, keeping the given order.
    ReplaceAll(Vec<NewInvoiceLine>),
}
