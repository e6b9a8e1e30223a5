use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::calculations::InvoiceTotals;
use crate::models::{
    Client, Invoice, InvoiceHeader, InvoiceNumber, InvoiceStatus, NewClient, NewInvoiceLine, NewTaxRate,
    TaxRate,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepositoryError {
    #[error("Record not found")]
    NotFound,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A unique index rejected the write. Carries the backend's message,
    /// which names the violated column.
    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),
}

/// Read access plus the single-statement writes that need no transaction.
///
/// Anything that changes lines or totals goes through
/// [`InvoiceRepository::begin`] instead.
#[async_trait]
pub trait InvoiceRepository: Send + Sync {
    /// Start a unit of work. Dropping it without calling
    /// [`InvoiceUnitOfWork::commit`] rolls every change back.
    async fn begin(&self) -> Result<Box<dyn InvoiceUnitOfWork>, RepositoryError>;

    // Invoices
    async fn get_invoice(&self, id: i64) -> Result<Invoice, RepositoryError>;
    async fn list_invoices(&self) -> Result<Vec<Invoice>, RepositoryError>;
    async fn list_invoice_ids(&self) -> Result<Vec<i64>, RepositoryError>;
    async fn find_invoice_by_number(
        &self,
        number: &InvoiceNumber,
    ) -> Result<Option<i64>, RepositoryError>;
    async fn last_number_for_year(&self, year: i32) -> Result<Option<InvoiceNumber>, RepositoryError>;
    async fn set_status(
        &self,
        id: i64,
        status: InvoiceStatus,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;
    /// Deletes the invoice and, through the cascade, all of its lines.
    async fn delete_invoice(&self, id: i64) -> Result<(), RepositoryError>;

    // Tax rates
    async fn get_tax_rate(&self, id: i64) -> Result<TaxRate, RepositoryError>;
    async fn list_tax_rates(&self, active_only: bool) -> Result<Vec<TaxRate>, RepositoryError>;
    async fn create_tax_rate(&self, tax_rate: &NewTaxRate) -> Result<TaxRate, RepositoryError>;
    async fn set_tax_rate_active(&self, id: i64, is_active: bool) -> Result<(), RepositoryError>;

    // Clients
    async fn get_client(&self, id: i64) -> Result<Client, RepositoryError>;
    /// Ordered by name, then id.
    async fn list_clients(&self) -> Result<Vec<Client>, RepositoryError>;
    async fn create_client(&self, client: &NewClient) -> Result<Client, RepositoryError>;
}

/// One storage transaction. Every method runs inside it.
#[async_trait]
pub trait InvoiceUnitOfWork: Send {
    async fn invoice(&mut self, id: i64) -> Result<Invoice, RepositoryError>;
    async fn tax_rate(&mut self, id: i64) -> Result<TaxRate, RepositoryError>;
    async fn client(&mut self, id: i64) -> Result<Client, RepositoryError>;
    async fn find_invoice_by_number(
        &mut self,
        number: &InvoiceNumber,
    ) -> Result<Option<i64>, RepositoryError>;
    async fn last_number_for_year(
        &mut self,
        year: i32,
    ) -> Result<Option<InvoiceNumber>, RepositoryError>;

    /// Inserts a header with zero totals and returns the new id.
    async fn insert_invoice(
        &mut self,
        header: &InvoiceHeader,
        status: InvoiceStatus,
        now: DateTime<Utc>,
    ) -> Result<i64, RepositoryError>;
    async fn update_header(
        &mut self,
        id: i64,
        header: &InvoiceHeader,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    /// Appends a line after the current last position.
    async fn insert_line(
        &mut self,
        invoice_id: i64,
        line: &NewInvoiceLine,
    ) -> Result<i64, RepositoryError>;
    /// Only touches a line owned by `invoice_id`; `NotFound` otherwise.
    async fn update_line(
        &mut self,
        invoice_id: i64,
        line_id: i64,
        line: &NewInvoiceLine,
    ) -> Result<(), RepositoryError>;
    async fn delete_line(&mut self, invoice_id: i64, line_id: i64) -> Result<(), RepositoryError>;
    async fn delete_lines(&mut self, invoice_id: i64) -> Result<u64, RepositoryError>;

    /// The only write path for `subtotal` and `total`.
    async fn write_totals(
        &mut self,
        invoice_id: i64,
        totals: &InvoiceTotals,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    /// `(id, raw stored status)` for every invoice.
    async fn stored_statuses(&mut self) -> Result<Vec<(i64, String)>, RepositoryError>;
    /// Rewrites the status only if it still equals `expected`. Returns
    /// whether a row changed.
    async fn rewrite_status(
        &mut self,
        id: i64,
        expected: &str,
        status: InvoiceStatus,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;

    async fn commit(self: Box<Self>) -> Result<(), RepositoryError>;
}
