//! Shared setup for the service-level integration tests.

#![allow(dead_code)]

use std::path::Path;

use chrono::NaiveDate;
use invoice_core::{InvoiceService, InvoiceSettings, NewInvoice, NewInvoiceLine, RateSelection};
use invoice_db_sqlite::SqliteRepository;
use rust_decimal::Decimal;
use sqlx::sqlite::SqlitePool;

/// Migrated and seeded in-memory database behind a service. The returned
/// pool shares the service's single connection, for raw inspection.
pub async fn setup_with(settings: InvoiceSettings) -> (InvoiceService, SqlitePool) {
    open("sqlite::memory:", settings).await
}

/// Same as [`setup`] over a database file in `dir`, served by a pool of
/// several connections.
pub async fn setup_file(dir: &Path) -> (InvoiceService, SqlitePool) {
    let url = format!("sqlite://{}", dir.join("invoices.db").display());
    open(&url, InvoiceSettings::default()).await
}

async fn open(url: &str, settings: InvoiceSettings) -> (InvoiceService, SqlitePool) {
    let repo = SqliteRepository::new(url)
        .await
        .expect("Failed to open database");
    repo.run_migrations()
        .await
        .expect("Failed to run migrations");
    repo.run_seeds(&Path::new(env!("CARGO_MANIFEST_DIR")).join("seeds"))
        .await
        .expect("Failed to run seeds");

    let pool = repo.pool().clone();
    (InvoiceService::new(Box::new(repo), settings), pool)
}

pub async fn setup() -> (InvoiceService, SqlitePool) {
    setup_with(InvoiceSettings::default()).await
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Id of the seeded tax rate with the given percentage.
pub async fn rate_id(service: &InvoiceService, rate: Decimal) -> i64 {
    service
        .list_tax_rates(false)
        .await
        .unwrap()
        .into_iter()
        .find(|tax_rate| tax_rate.rate == rate)
        .map(|tax_rate| tax_rate.id)
        .expect("seeded rate")
}

pub fn new_invoice(number: &str, rate: Decimal, lines: Vec<NewInvoiceLine>) -> NewInvoice {
    NewInvoice {
        number: Some(number.to_string()),
        issue_date: date(2025, 6, 1),
        due_date: Some(date(2025, 6, 15)),
        client_id: None,
        tax_rate: Some(RateSelection::Inline(rate)),
        status: Default::default(),
        note: None,
        lines,
    }
}

pub async fn raw_totals(pool: &SqlitePool, id: i64) -> (String, String, String) {
    sqlx::query_as("SELECT subtotal, total, updated_at FROM invoices WHERE id = ?")
        .bind(id)
        .fetch_one(pool)
        .await
        .unwrap()
}

pub async fn raw_status(pool: &SqlitePool, id: i64) -> String {
    sqlx::query_scalar("SELECT status FROM invoices WHERE id = ?")
        .bind(id)
        .fetch_one(pool)
        .await
        .unwrap()
}
