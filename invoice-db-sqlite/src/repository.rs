use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use invoice_core::calculations::InvoiceTotals;
use invoice_core::{
    Client, Invoice, InvoiceHeader, InvoiceLine, InvoiceNumber, InvoiceRepository, InvoiceStatus,
    InvoiceUnitOfWork, NewClient, NewInvoiceLine, NewTaxRate, RepositoryError, TaxRate,
};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::{Row, Sqlite, Transaction};
use tracing::{debug, info, warn};

use crate::decimal::{decimal_to_text, get_decimal, get_optional_decimal};

/// How long a connection waits on another writer's lock before failing with
/// `SQLITE_BUSY`.
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

pub struct SqliteRepository {
    pool: SqlitePool,
}

impl SqliteRepository {
    /// Connects to `database_url`, creating the file if it does not exist.
    ///
    /// An in-memory database lives only as long as its connection, so it is
    /// served from a single connection that is never recycled. Units of work
    /// then queue on that connection. A file database runs in WAL mode so
    /// readers do not block the single writer.
    pub async fn new(database_url: &str) -> Result<Self> {
        let mut options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("Invalid SQLite connection string: {}", database_url))?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(BUSY_TIMEOUT);

        let mut pool_options = SqlitePoolOptions::new();
        if is_in_memory(database_url) {
            pool_options = pool_options
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        } else {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        let pool = pool_options
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to connect to database: {}", database_url))?;
        info!(database = %database_url, "connected to sqlite");
        Ok(Self { pool })
    }

    pub async fn new_with_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run database migrations")?;
        debug!("migrations applied");
        Ok(())
    }

    /// Load and execute all SQL seed files from the specified directory.
    /// Files are executed in alphabetical order by filename.
    pub async fn run_seeds(&self, seeds_dir: &Path) -> Result<()> {
        let mut entries: Vec<_> = std::fs::read_dir(seeds_dir)
            .with_context(|| format!("Failed to read seeds directory '{}'", seeds_dir.display()))?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "sql"))
            .collect();

        entries.sort_by_key(|entry| entry.file_name());

        for entry in entries {
            let path = entry.path();
            let sql = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read seed file '{}'", path.display()))?;

            sqlx::raw_sql(&sql)
                .execute(&self.pool)
                .await
                .with_context(|| format!("Failed to execute seed file '{}'", path.display()))?;
            debug!(file = %path.display(), "seed applied");
        }

        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn acquire(&self) -> Result<sqlx::pool::PoolConnection<Sqlite>, RepositoryError> {
        self.pool
            .acquire()
            .await
            .map_err(|e| RepositoryError::Connection(e.to_string()))
    }
}

fn is_in_memory(database_url: &str) -> bool {
    database_url.contains(":memory:") || database_url.contains("mode=memory")
}

/// Maps a storage error, keeping unique-index rejections distinguishable.
fn db_err(e: sqlx::Error) -> RepositoryError {
    match e.as_database_error() {
        Some(db) if db.is_unique_violation() => RepositoryError::UniqueViolation(db.message().to_string()),
        _ => RepositoryError::Database(e.to_string()),
    }
}

fn column<'r, T>(row: &'r SqliteRow, name: &str) -> Result<T, RepositoryError>
where
    T: sqlx::Decode<'r, Sqlite> + sqlx::Type<Sqlite>,
{
    row.try_get(name)
        .map_err(|e| RepositoryError::Database(format!("Failed to get {}: {}", name, e)))
}

// ─────────────────────────────────────────────────────────────────────────────
// row mapping
// ─────────────────────────────────────────────────────────────────────────────

const INVOICE_COLUMNS: &str = "id, number, issue_date, due_date, client_id, subtotal, tax_rate_id,
     vat_rate, total, status, note, created_at, updated_at";

const CLIENT_COLUMNS: &str = "id, name, registry_code, email, phone, address, created_at";

const LINE_COLUMNS: &str =
    "id, invoice_id, position, description, qty, unit_price, line_total, manual_total";

fn row_to_invoice(row: &SqliteRow, lines: Vec<InvoiceLine>) -> Result<Invoice, RepositoryError> {
    let id: i64 = column(row, "id")?;

    let raw_number: String = column(row, "number")?;
    let number = InvoiceNumber::from_str(&raw_number)
        .map_err(|e| RepositoryError::Database(format!("invoice {}: {}", id, e)))?;

    let raw_status: String = column(row, "status")?;
    let status = InvoiceStatus::from_stored(&raw_status).unwrap_or_else(|| {
        warn!(invoice_id = id, status = %raw_status, "unrecognised stored status read as unpaid");
        InvoiceStatus::Unpaid
    });

    Ok(Invoice {
        id,
        number,
        issue_date: column::<NaiveDate>(row, "issue_date")?,
        due_date: column::<NaiveDate>(row, "due_date")?,
        client_id: column(row, "client_id")?,
        subtotal: get_decimal(row, "subtotal")?,
        total: get_decimal(row, "total")?,
        tax_rate_id: column(row, "tax_rate_id")?,
        vat_rate: get_optional_decimal(row, "vat_rate")?,
        status,
        note: column(row, "note")?,
        created_at: column::<DateTime<Utc>>(row, "created_at")?,
        updated_at: column::<DateTime<Utc>>(row, "updated_at")?,
        lines,
    })
}

fn row_to_line(row: &SqliteRow) -> Result<InvoiceLine, RepositoryError> {
    Ok(InvoiceLine {
        id: column(row, "id")?,
        invoice_id: column(row, "invoice_id")?,
        position: column(row, "position")?,
        description: column(row, "description")?,
        qty: get_decimal(row, "qty")?,
        unit_price: get_decimal(row, "unit_price")?,
        line_total: get_decimal(row, "line_total")?,
        manual_total: column(row, "manual_total")?,
    })
}

fn row_to_client(row: &SqliteRow) -> Result<Client, RepositoryError> {
    Ok(Client {
        id: column(row, "id")?,
        name: column(row, "name")?,
        registry_code: column(row, "registry_code")?,
        email: column(row, "email")?,
        phone: column(row, "phone")?,
        address: column(row, "address")?,
        created_at: column::<DateTime<Utc>>(row, "created_at")?,
    })
}

fn row_to_tax_rate(row: &SqliteRow) -> Result<TaxRate, RepositoryError> {
    Ok(TaxRate {
        id: column(row, "id")?,
        name: column(row, "name")?,
        rate: get_decimal(row, "rate")?,
        description: column(row, "description")?,
        is_active: column(row, "is_active")?,
        created_at: column::<DateTime<Utc>>(row, "created_at")?,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// queries shared by the pool and transaction paths
// ─────────────────────────────────────────────────────────────────────────────

async fn fetch_lines(conn: &mut SqliteConnection, invoice_id: i64) -> Result<Vec<InvoiceLine>, RepositoryError> {
    let rows = sqlx::query(&format!(
        "SELECT {LINE_COLUMNS} FROM invoice_lines WHERE invoice_id = ? ORDER BY position, id"
    ))
    .bind(invoice_id)
    .fetch_all(&mut *conn)
    .await
    .map_err(db_err)?;

    rows.iter().map(row_to_line).collect()
}

async fn fetch_invoice(conn: &mut SqliteConnection, id: i64) -> Result<Invoice, RepositoryError> {
    let row = sqlx::query(&format!("SELECT {INVOICE_COLUMNS} FROM invoices WHERE id = ?"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_err)?
        .ok_or(RepositoryError::NotFound)?;

    let lines = fetch_lines(conn, id).await?;
    row_to_invoice(&row, lines)
}

async fn fetch_tax_rate(conn: &mut SqliteConnection, id: i64) -> Result<TaxRate, RepositoryError> {
    let row = sqlx::query(
        "SELECT id, name, rate, description, is_active, created_at FROM tax_rates WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(db_err)?
    .ok_or(RepositoryError::NotFound)?;

    row_to_tax_rate(&row)
}

async fn fetch_client(conn: &mut SqliteConnection, id: i64) -> Result<Client, RepositoryError> {
    let row = sqlx::query(&format!("SELECT {CLIENT_COLUMNS} FROM clients WHERE id = ?"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_err)?
        .ok_or(RepositoryError::NotFound)?;

    row_to_client(&row)
}

async fn find_by_number(
    conn: &mut SqliteConnection,
    number: &InvoiceNumber,
) -> Result<Option<i64>, RepositoryError> {
    sqlx::query_scalar::<_, i64>("SELECT id FROM invoices WHERE number = ?")
        .bind(number.to_string())
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_err)
}

async fn last_number(conn: &mut SqliteConnection, year: i32) -> Result<Option<InvoiceNumber>, RepositoryError> {
    // Fixed-width numbers sort lexicographically in sequence order.
    let raw = sqlx::query_scalar::<_, String>(
        "SELECT number FROM invoices WHERE number LIKE ? ORDER BY number DESC LIMIT 1",
    )
    .bind(InvoiceNumber::year_prefix_pattern(year))
    .fetch_optional(&mut *conn)
    .await
    .map_err(db_err)?;

    raw.map(|raw| {
        InvoiceNumber::from_str(&raw).map_err(|e| RepositoryError::Database(e.to_string()))
    })
    .transpose()
}

/// Text form of a line's total. Lines are validated before they reach
/// storage, so an unrepresentable total here is a caller bug.
fn line_total_text(line: &NewInvoiceLine) -> Result<String, RepositoryError> {
    line.line_total().map(decimal_to_text).ok_or_else(|| {
        RepositoryError::Database(format!(
            "line total of {} x {} does not fit a money column",
            line.qty, line.unit_price
        ))
    })
}

/// `0` rows touched means the target does not exist.
fn expect_affected(rows_affected: u64) -> Result<(), RepositoryError> {
    if rows_affected == 0 {
        return Err(RepositoryError::NotFound);
    }
    Ok(())
}

#[async_trait]
impl InvoiceRepository for SqliteRepository {
    async fn begin(&self) -> Result<Box<dyn InvoiceUnitOfWork>, RepositoryError> {
        // Take the write lock up front. A deferred transaction that reads and
        // then writes fails with SQLITE_BUSY instead of waiting when another
        // writer got there first.
        let tx = self
            .pool
            .begin_with("BEGIN IMMEDIATE")
            .await
            .map_err(|e| RepositoryError::Connection(e.to_string()))?;
        Ok(Box::new(SqliteUnitOfWork { tx }))
    }

    async fn get_invoice(&self, id: i64) -> Result<Invoice, RepositoryError> {
        let mut conn = self.acquire().await?;
        fetch_invoice(&mut conn, id).await
    }

    async fn list_invoices(&self) -> Result<Vec<Invoice>, RepositoryError> {
        let mut conn = self.acquire().await?;

        let line_rows = sqlx::query(&format!(
            "SELECT {LINE_COLUMNS} FROM invoice_lines ORDER BY invoice_id, position, id"
        ))
        .fetch_all(&mut *conn)
        .await
        .map_err(db_err)?;

        let mut lines_by_invoice: HashMap<i64, Vec<InvoiceLine>> = HashMap::new();
        for row in &line_rows {
            let line = row_to_line(row)?;
            lines_by_invoice.entry(line.invoice_id).or_default().push(line);
        }

        let rows = sqlx::query(&format!("SELECT {INVOICE_COLUMNS} FROM invoices ORDER BY number"))
            .fetch_all(&mut *conn)
            .await
            .map_err(db_err)?;

        rows.iter()
            .map(|row| {
                let id: i64 = column(row, "id")?;
                row_to_invoice(row, lines_by_invoice.remove(&id).unwrap_or_default())
            })
            .collect()
    }

    async fn list_invoice_ids(&self) -> Result<Vec<i64>, RepositoryError> {
        sqlx::query_scalar::<_, i64>("SELECT id FROM invoices ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)
    }

    async fn find_invoice_by_number(
        &self,
        number: &InvoiceNumber,
    ) -> Result<Option<i64>, RepositoryError> {
        let mut conn = self.acquire().await?;
        find_by_number(&mut conn, number).await
    }

    async fn last_number_for_year(&self, year: i32) -> Result<Option<InvoiceNumber>, RepositoryError> {
        let mut conn = self.acquire().await?;
        last_number(&mut conn, year).await
    }

    async fn set_status(
        &self,
        id: i64,
        status: InvoiceStatus,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE invoices SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        expect_affected(result.rows_affected())
    }

    async fn delete_invoice(&self, id: i64) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM invoices WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        expect_affected(result.rows_affected())
    }

    async fn get_tax_rate(&self, id: i64) -> Result<TaxRate, RepositoryError> {
        let mut conn = self.acquire().await?;
        fetch_tax_rate(&mut conn, id).await
    }

    async fn list_tax_rates(&self, active_only: bool) -> Result<Vec<TaxRate>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, name, rate, description, is_active, created_at
             FROM tax_rates WHERE is_active = 1 OR ? = 0",
        )
        .bind(active_only)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut rates = rows.iter().map(row_to_tax_rate).collect::<Result<Vec<_>, _>>()?;
        // TEXT rates do not sort numerically in SQL
        rates.sort_by(|a, b| a.rate.cmp(&b.rate).then(a.id.cmp(&b.id)));
        Ok(rates)
    }

    async fn create_tax_rate(&self, tax_rate: &NewTaxRate) -> Result<TaxRate, RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO tax_rates (name, rate, description, is_active, created_at)
             VALUES (?, ?, ?, 1, ?)",
        )
        .bind(&tax_rate.name)
        .bind(decimal_to_text(tax_rate.rate))
        .bind(&tax_rate.description)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        self.get_tax_rate(result.last_insert_rowid()).await
    }

    async fn set_tax_rate_active(&self, id: i64, is_active: bool) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE tax_rates SET is_active = ? WHERE id = ?")
            .bind(is_active)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        expect_affected(result.rows_affected())
    }

    async fn get_client(&self, id: i64) -> Result<Client, RepositoryError> {
        let mut conn = self.acquire().await?;
        fetch_client(&mut conn, id).await
    }

    async fn list_clients(&self) -> Result<Vec<Client>, RepositoryError> {
        let rows = sqlx::query(&format!("SELECT {CLIENT_COLUMNS} FROM clients ORDER BY name, id"))
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        rows.iter().map(row_to_client).collect()
    }

    async fn create_client(&self, client: &NewClient) -> Result<Client, RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO clients (name, registry_code, email, phone, address, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&client.name)
        .bind(&client.registry_code)
        .bind(&client.email)
        .bind(&client.phone)
        .bind(&client.address)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        self.get_client(result.last_insert_rowid()).await
    }
}

/// One SQLite transaction. Dropped without [`InvoiceUnitOfWork::commit`],
/// sqlx rolls it back.
pub struct SqliteUnitOfWork {
    tx: Transaction<'static, Sqlite>,
}

#[async_trait]
impl InvoiceUnitOfWork for SqliteUnitOfWork {
    async fn invoice(&mut self, id: i64) -> Result<Invoice, RepositoryError> {
        fetch_invoice(&mut self.tx, id).await
    }

    async fn tax_rate(&mut self, id: i64) -> Result<TaxRate, RepositoryError> {
        fetch_tax_rate(&mut self.tx, id).await
    }

    async fn client(&mut self, id: i64) -> Result<Client, RepositoryError> {
        fetch_client(&mut self.tx, id).await
    }

    async fn find_invoice_by_number(
        &mut self,
        number: &InvoiceNumber,
    ) -> Result<Option<i64>, RepositoryError> {
        find_by_number(&mut self.tx, number).await
    }

    async fn last_number_for_year(
        &mut self,
        year: i32,
    ) -> Result<Option<InvoiceNumber>, RepositoryError> {
        last_number(&mut self.tx, year).await
    }

    async fn insert_invoice(
        &mut self,
        header: &InvoiceHeader,
        status: InvoiceStatus,
        now: DateTime<Utc>,
    ) -> Result<i64, RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO invoices (
                number, issue_date, due_date, client_id, subtotal, tax_rate_id, vat_rate,
                total, status, note, created_at, updated_at
            ) VALUES (?, ?, ?, ?, '0.00', ?, ?, '0.00', ?, ?, ?, ?)",
        )
        .bind(header.number.to_string())
        .bind(header.issue_date)
        .bind(header.due_date)
        .bind(header.client_id)
        .bind(header.tax_rate_id)
        .bind(header.vat_rate.map(decimal_to_text))
        .bind(status.as_str())
        .bind(&header.note)
        .bind(now)
        .bind(now)
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?;

        Ok(result.last_insert_rowid())
    }

    async fn update_header(
        &mut self,
        id: i64,
        header: &InvoiceHeader,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE invoices SET
                number = ?, issue_date = ?, due_date = ?, client_id = ?, tax_rate_id = ?,
                vat_rate = ?, note = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(header.number.to_string())
        .bind(header.issue_date)
        .bind(header.due_date)
        .bind(header.client_id)
        .bind(header.tax_rate_id)
        .bind(header.vat_rate.map(decimal_to_text))
        .bind(&header.note)
        .bind(now)
        .bind(id)
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?;

        expect_affected(result.rows_affected())
    }

    async fn insert_line(
        &mut self,
        invoice_id: i64,
        line: &NewInvoiceLine,
    ) -> Result<i64, RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO invoice_lines (
                invoice_id, position, description, qty, unit_price, line_total, manual_total
            ) VALUES (
                ?, (SELECT COALESCE(MAX(position), 0) + 1 FROM invoice_lines WHERE invoice_id = ?),
                ?, ?, ?, ?, ?
            )",
        )
        .bind(invoice_id)
        .bind(invoice_id)
        .bind(&line.description)
        .bind(decimal_to_text(line.qty))
        .bind(decimal_to_text(line.unit_price))
        .bind(line_total_text(line)?)
        .bind(line.is_manual_total())
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?;

        Ok(result.last_insert_rowid())
    }

    async fn update_line(
        &mut self,
        invoice_id: i64,
        line_id: i64,
        line: &NewInvoiceLine,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE invoice_lines SET
                description = ?, qty = ?, unit_price = ?, line_total = ?, manual_total = ?
             WHERE id = ? AND invoice_id = ?",
        )
        .bind(&line.description)
        .bind(decimal_to_text(line.qty))
        .bind(decimal_to_text(line.unit_price))
        .bind(line_total_text(line)?)
        .bind(line.is_manual_total())
        .bind(line_id)
        .bind(invoice_id)
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?;

        expect_affected(result.rows_affected())
    }

    async fn delete_line(&mut self, invoice_id: i64, line_id: i64) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM invoice_lines WHERE id = ? AND invoice_id = ?")
            .bind(line_id)
            .bind(invoice_id)
            .execute(&mut *self.tx)
            .await
            .map_err(db_err)?;

        expect_affected(result.rows_affected())
    }

    async fn delete_lines(&mut self, invoice_id: i64) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM invoice_lines WHERE invoice_id = ?")
            .bind(invoice_id)
            .execute(&mut *self.tx)
            .await
            .map_err(db_err)?;

        Ok(result.rows_affected())
    }

    async fn write_totals(
        &mut self,
        invoice_id: i64,
        totals: &InvoiceTotals,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE invoices SET subtotal = ?, total = ?, updated_at = ? WHERE id = ?")
            .bind(decimal_to_text(totals.subtotal))
            .bind(decimal_to_text(totals.total))
            .bind(now)
            .bind(invoice_id)
            .execute(&mut *self.tx)
            .await
            .map_err(db_err)?;

        expect_affected(result.rows_affected())
    }

    async fn stored_statuses(&mut self) -> Result<Vec<(i64, String)>, RepositoryError> {
        sqlx::query_as::<_, (i64, String)>("SELECT id, status FROM invoices ORDER BY id")
            .fetch_all(&mut *self.tx)
            .await
            .map_err(db_err)
    }

    async fn rewrite_status(
        &mut self,
        id: i64,
        expected: &str,
        status: InvoiceStatus,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE invoices SET status = ?, updated_at = ? WHERE id = ? AND status = ?",
        )
        .bind(status.as_str())
        .bind(now)
        .bind(id)
        .bind(expected)
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected() > 0)
    }

    async fn commit(self: Box<Self>) -> Result<(), RepositoryError> {
        self.tx.commit().await.map_err(db_err)
    }
}
