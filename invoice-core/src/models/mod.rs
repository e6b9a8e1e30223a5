mod client;
mod invoice;
mod invoice_line;
pub mod invoice_number;
pub mod invoice_status;
mod tax_rate;

pub use client::{Client, NewClient};
pub use invoice::{Invoice, InvoiceEdit, InvoiceHeader, NewInvoice, RateSelection, is_overdue};
pub use invoice_line::{InvoiceLine, LineChange, NewInvoiceLine};
pub use invoice_number::{InvoiceNumber, InvoiceNumberError, validate_number_format};
pub use invoice_status::{InvoiceStatus, LegacyStatus, StatusError, StatusMigration};
pub use tax_rate::{NewTaxRate, TaxRate};
