use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::invoice_line::{InvoiceLine, LineChange, NewInvoiceLine};
use super::invoice_number::InvoiceNumber;
use super::invoice_status::{self, InvoiceStatus};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: i64,
    pub number: InvoiceNumber,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    /// Billed client; `None` for records imported without one.
    pub client_id: Option<i64>,

    // Written only by the totals recompute
    pub subtotal: Decimal,
    pub total: Decimal,

    /// Referenced rate record; preferred over `vat_rate` when active.
    pub tax_rate_id: Option<i64>,
    /// Inline percentage kept for records predating `tax_rate_id`.
    pub vat_rate: Option<Decimal>,

    pub status: InvoiceStatus,
    pub note: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    pub lines: Vec<InvoiceLine>,
}

impl Invoice {
    /// `total - subtotal`, which the recompute guarantees equals the
    /// rounded VAT on `subtotal`.
    pub fn vat_amount(&self) -> Decimal {
        self.total - self.subtotal
    }

    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        invoice_status::is_overdue(self.status, self.due_date, today)
    }

    pub fn header(&self) -> InvoiceHeader {
        InvoiceHeader {
            number: self.number,
            issue_date: self.issue_date,
            due_date: self.due_date,
            client_id: self.client_id,
            tax_rate_id: self.tax_rate_id,
            vat_rate: self.vat_rate,
            note: self.note.clone(),
        }
    }
}

/// Pure read-only check used by listings and reports.
pub fn is_overdue(invoice: &Invoice, today: NaiveDate) -> bool {
    invoice.is_overdue(today)
}

/// Caller-editable invoice fields, as written to storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceHeader {
    pub number: InvoiceNumber,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub client_id: Option<i64>,
    pub tax_rate_id: Option<i64>,
    pub vat_rate: Option<Decimal>,
    pub note: Option<String>,
}

/// How the caller picks the tax rate for an invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RateSelection {
    /// Reference a tax-rate record by identity.
    Reference(i64),
    /// Store an inline percentage with no reference.
    Inline(Decimal),
}

/// For creating new invoices (no id, totals or timestamps)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewInvoice {
    /// Manual number; allocated when `None`.
    pub number: Option<String>,
    pub issue_date: NaiveDate,
    /// Derived from the configured payment days when `None`.
    pub due_date: Option<NaiveDate>,
    pub client_id: Option<i64>,
    /// Falls back to the configured default rate when `None`.
    pub tax_rate: Option<RateSelection>,
    pub status: InvoiceStatus,
    pub note: Option<String>,
    pub lines: Vec<NewInvoiceLine>,
}

/// A set of changes applied to an existing invoice in one unit of work.
/// `None` fields are left as they are.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InvoiceEdit {
    pub number: Option<String>,
    pub issue_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub client_id: Option<Option<i64>>,
    pub tax_rate: Option<RateSelection>,
    pub note: Option<Option<String>>,
    pub lines: Vec<LineChange>,
}

impl InvoiceEdit {
    pub fn lines(changes: impl IntoIterator<Item = LineChange>) -> Self {
        Self {
            lines: changes.into_iter().collect(),
            ..Self::default()
        }
    }
}
