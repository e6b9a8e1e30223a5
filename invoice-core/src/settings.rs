use chrono::{Days, NaiveDate};
use rust_decimal::Decimal;
use serde::Deserialize;

/// Payment term applied when an invoice is created without a due date.
pub const DEFAULT_PAYMENT_DAYS: u32 = 14;

/// Explicit configuration handed to [`crate::InvoiceService::new`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct InvoiceSettings {
    /// Tax rate preselected for new invoices that name none.
    pub default_tax_rate_id: Option<i64>,
    /// Opt-in last resort for rate resolution. Left unset, an invoice with
    /// neither a usable reference nor an inline rate fails to recompute.
    pub fallback_vat_rate: Option<Decimal>,
    pub default_payment_days: u32,
}

impl Default for InvoiceSettings {
    fn default() -> Self {
        Self {
            default_tax_rate_id: None,
            fallback_vat_rate: None,
            default_payment_days: DEFAULT_PAYMENT_DAYS,
        }
    }
}

impl InvoiceSettings {
    /// `issue_date + default_payment_days`, saturating at the issue date.
    pub fn due_date_for(&self, issue_date: NaiveDate) -> NaiveDate {
        issue_date
            .checked_add_days(Days::new(u64::from(self.default_payment_days)))
            .unwrap_or(issue_date)
    }
}
