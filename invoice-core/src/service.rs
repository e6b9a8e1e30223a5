//! Invoice orchestration.
//!
//! Every write follows the same pipeline: open a unit of work, apply the
//! mutation, recompute totals inside that unit of work, commit, then reload
//! the invoice from storage. Nothing outside this module writes `subtotal`
//! or `total`.

use std::collections::HashMap;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::calculations::aggregator::{InvalidLine, validate_new_line};
use crate::calculations::common::{to_money, zero_money};
use crate::calculations::totals::{InvoiceTotals, TotalsError};
use crate::calculations::vat::{RateContext, VatError, resolve_effective_rate, validate_rate};
use crate::db::repository::{InvoiceRepository, InvoiceUnitOfWork, RepositoryError};
use crate::models::invoice_number::{self, InvoiceNumber, InvoiceNumberError};
use crate::models::invoice_status::{self, StatusError, StatusMigration};
use crate::models::{
    Client, Invoice, InvoiceEdit, InvoiceHeader, InvoiceStatus, LineChange, NewClient, NewInvoice,
    NewInvoiceLine, NewTaxRate, RateSelection, TaxRate,
};
use crate::settings::InvoiceSettings;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvoiceError {
    #[error(transparent)]
    InvalidLine(#[from] InvalidLine),

    #[error("no tax rate available for invoice {invoice}")]
    NoRateAvailable { invoice: String },

    #[error("invalid status '{0}': expected UNPAID or PAID")]
    InvalidStatus(String),

    #[error(
        "invoice number {number} is already in use{}",
        .existing_id.map(|id| format!(" by invoice {id}")).unwrap_or_default()
    )]
    DuplicateNumber {
        number: InvoiceNumber,
        existing_id: Option<i64>,
    },

    #[error("invoice {0} not found")]
    InvoiceNotFound(i64),

    #[error("invoice number '{0}' does not match the YYYY-NNNN format")]
    InvalidNumberFormat(String),

    #[error("invoice number sequence for {0} is exhausted")]
    NumberSequenceExhausted(i32),

    #[error("invalid tax rate {0}: must be a percentage between 0 and 100")]
    InvalidTaxRate(Decimal),

    #[error("tax rate {0} not found")]
    TaxRateNotFound(i64),

    #[error("line {line_id} not found on invoice {invoice_id}")]
    LineNotFound { invoice_id: i64, line_id: i64 },

    #[error("tax rate '{0}' already exists")]
    DuplicateTaxRate(String),

    #[error("amount {0} exceeds 99999999.99")]
    AmountOutOfRange(Decimal),

    #[error("client {0} not found")]
    ClientNotFound(i64),

    #[error("invalid client: {0}")]
    InvalidClient(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<InvoiceNumberError> for InvoiceError {
    fn from(err: InvoiceNumberError) -> Self {
        match err {
            InvoiceNumberError::InvalidFormat(raw) => Self::InvalidNumberFormat(raw),
            InvoiceNumberError::SequenceExhausted(year) => Self::NumberSequenceExhausted(year),
        }
    }
}

impl From<StatusError> for InvoiceError {
    fn from(err: StatusError) -> Self {
        match err {
            StatusError::InvalidStatus(value) => Self::InvalidStatus(value),
        }
    }
}

impl InvoiceError {
    fn from_vat(err: VatError, invoice: &Invoice) -> Self {
        match err {
            VatError::NoRateAvailable => Self::NoRateAvailable {
                invoice: invoice.number.to_string(),
            },
            VatError::InvalidRate(rate) => Self::InvalidTaxRate(rate),
            VatError::AmountOutOfRange(amount) => Self::AmountOutOfRange(amount),
        }
    }

    fn from_totals(err: TotalsError, invoice: &Invoice) -> Self {
        match err {
            TotalsError::InvalidLine(err) => Self::InvalidLine(err),
            TotalsError::Vat(err) => Self::from_vat(err, invoice),
            TotalsError::AmountOutOfRange(amount) => Self::AmountOutOfRange(amount),
        }
    }
}

/// Count and sum of a group of invoices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AmountTally {
    pub count: usize,
    pub total: Decimal,
}

impl Default for AmountTally {
    fn default() -> Self {
        Self {
            count: 0,
            total: zero_money(),
        }
    }
}

impl AmountTally {
    fn add(&mut self, amount: Decimal) {
        self.count += 1;
        self.total = to_money(self.total.saturating_add(amount));
    }
}

/// Outstanding and settled amounts as of one day. `overdue` is a subset of
/// `unpaid`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReceivablesSummary {
    pub unpaid: AmountTally,
    pub overdue: AmountTally,
    pub paid: AmountTally,
}

impl ReceivablesSummary {
    fn record(&mut self, invoice: &Invoice, today: NaiveDate) {
        match invoice.status {
            InvoiceStatus::Paid => self.paid.add(invoice.total),
            InvoiceStatus::Unpaid => {
                self.unpaid.add(invoice.total);
                if invoice.is_overdue(today) {
                    self.overdue.add(invoice.total);
                }
            }
        }
    }
}

/// Revenue and receivables of one client. `invoiced` counts every invoice
/// billed to the client, paid or not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientReceivables {
    pub client: Client,
    pub invoiced: AmountTally,
    pub receivables: ReceivablesSummary,
    pub last_issue_date: Option<NaiveDate>,
}

impl ClientReceivables {
    fn new(client: Client) -> Self {
        Self {
            client,
            invoiced: AmountTally::default(),
            receivables: ReceivablesSummary::default(),
            last_issue_date: None,
        }
    }

    fn record(&mut self, invoice: &Invoice, today: NaiveDate) {
        self.invoiced.add(invoice.total);
        self.receivables.record(invoice, today);
        self.last_issue_date = self.last_issue_date.max(Some(invoice.issue_date));
    }
}

type Clock = fn() -> DateTime<Utc>;

pub struct InvoiceService {
    repo: Box<dyn InvoiceRepository>,
    settings: InvoiceSettings,
    clock: Clock,
}

impl InvoiceService {
    pub fn new(repo: Box<dyn InvoiceRepository>, settings: InvoiceSettings) -> Self {
        Self {
            repo,
            settings,
            clock: Utc::now,
        }
    }

    /// Replaces the wall clock used for timestamps and the default year.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn settings(&self) -> &InvoiceSettings {
        &self.settings
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub async fn get_invoice(&self, id: i64) -> Result<Invoice, InvoiceError> {
        self.repo
            .get_invoice(id)
            .await
            .map_err(|err| not_found_as(err, InvoiceError::InvoiceNotFound(id)))
    }

    pub async fn list_invoices(&self) -> Result<Vec<Invoice>, InvoiceError> {
        Ok(self.repo.list_invoices().await?)
    }

    pub async fn invoice_ids(&self) -> Result<Vec<i64>, InvoiceError> {
        Ok(self.repo.list_invoice_ids().await?)
    }

    /// Unpaid invoices whose due date lies before `today`.
    pub async fn overdue_invoices(&self, today: NaiveDate) -> Result<Vec<Invoice>, InvoiceError> {
        let invoices = self.repo.list_invoices().await?;
        Ok(invoices
            .into_iter()
            .filter(|invoice| invoice.is_overdue(today))
            .collect())
    }

    pub async fn receivables_summary(&self, today: NaiveDate) -> Result<ReceivablesSummary, InvoiceError> {
        let invoices = self.repo.list_invoices().await?;

        let mut summary = ReceivablesSummary::default();
        for invoice in &invoices {
            summary.record(invoice, today);
        }
        Ok(summary)
    }

    /// One entry per client in name order, clients without invoices
    /// included. Invoices with no client are left out.
    pub async fn client_receivables(&self, today: NaiveDate) -> Result<Vec<ClientReceivables>, InvoiceError> {
        let clients = self.repo.list_clients().await?;
        let invoices = self.repo.list_invoices().await?;

        let index: HashMap<i64, usize> = clients
            .iter()
            .enumerate()
            .map(|(position, client)| (client.id, position))
            .collect();
        let mut report: Vec<ClientReceivables> = clients.into_iter().map(ClientReceivables::new).collect();

        for invoice in &invoices {
            let Some(client_id) = invoice.client_id else {
                continue;
            };
            match index.get(&client_id) {
                Some(&position) => report[position].record(invoice, today),
                None => warn!(invoice_id = invoice.id, client_id, "invoice references a missing client"),
            }
        }
        Ok(report)
    }

    // =========================================================================
    // Numbering
    // =========================================================================

    /// Next free number for `year`, or the current calendar year when `None`.
    /// Reserves nothing: the unique index decides at insert time.
    pub async fn allocate_number(&self, year: Option<i32>) -> Result<InvoiceNumber, InvoiceError> {
        let year = year.unwrap_or_else(|| self.now().year());
        let last = self.repo.last_number_for_year(year).await?;
        let number = invoice_number::next_in_sequence(year, last)?;
        debug!(%number, year, "allocated invoice number");
        Ok(number)
    }

    /// Fails with [`InvoiceError::DuplicateNumber`] when another invoice
    /// holds `number`. The invoice named by `exclude_id` may hold it.
    pub async fn check_number_unique(
        &self,
        number: &InvoiceNumber,
        exclude_id: Option<i64>,
    ) -> Result<(), InvoiceError> {
        let existing = self.repo.find_invoice_by_number(number).await?;
        ensure_unique(*number, existing, exclude_id)
    }

    // =========================================================================
    // Invoice writes
    // =========================================================================

    pub async fn create_invoice(&self, new: NewInvoice) -> Result<Invoice, InvoiceError> {
        for (index, line) in new.lines.iter().enumerate() {
            validate_new_line(index + 1, line)?;
        }

        let now = self.now();
        let mut uow = self.repo.begin().await?;

        let number = match new.number.as_deref() {
            Some(raw) => {
                let number = invoice_number::validate_number_format(raw)?;
                let existing = uow.find_invoice_by_number(&number).await?;
                ensure_unique(number, existing, None)?;
                number
            }
            None => {
                let year = now.year();
                let last = uow.last_number_for_year(year).await?;
                invoice_number::next_in_sequence(year, last)?
            }
        };

        if let Some(client_id) = new.client_id {
            ensure_client(uow.as_mut(), client_id).await?;
        }

        let selection = new
            .tax_rate
            .or_else(|| self.settings.default_tax_rate_id.map(RateSelection::Reference));
        let (tax_rate_id, vat_rate) = resolve_selection(uow.as_mut(), selection).await?;

        let header = InvoiceHeader {
            number,
            issue_date: new.issue_date,
            due_date: new
                .due_date
                .unwrap_or_else(|| self.settings.due_date_for(new.issue_date)),
            client_id: new.client_id,
            tax_rate_id,
            vat_rate,
            note: new.note,
        };

        let id = match uow.insert_invoice(&header, new.status, now).await {
            Ok(id) => id,
            Err(RepositoryError::UniqueViolation(_)) => {
                drop(uow);
                return Err(self.duplicate_number(number).await);
            }
            Err(err) => return Err(err.into()),
        };
        for line in &new.lines {
            uow.insert_line(id, &normalised(line)).await?;
        }

        let totals = self.recompute_in(uow.as_mut(), id, true).await?;
        uow.commit().await?;
        info!(invoice_id = id, %number, total = %totals.total, "invoice created");

        self.get_invoice(id).await
    }

    /// Applies header changes and line changes in one unit of work.
    pub async fn edit_invoice(&self, id: i64, edit: InvoiceEdit) -> Result<Invoice, InvoiceError> {
        let now = self.now();
        let mut uow = self.repo.begin().await?;
        let current = uow
            .invoice(id)
            .await
            .map_err(|err| not_found_as(err, InvoiceError::InvoiceNotFound(id)))?;

        let mut header = current.header();
        let mut header_changed = false;

        if let Some(raw) = edit.number.as_deref() {
            let number = invoice_number::validate_number_format(raw)?;
            if number != header.number {
                let existing = uow.find_invoice_by_number(&number).await?;
                ensure_unique(number, existing, Some(id))?;
                header.number = number;
                header_changed = true;
            }
        }
        if let Some(issue_date) = edit.issue_date {
            header.issue_date = issue_date;
            header_changed = true;
        }
        if let Some(due_date) = edit.due_date {
            header.due_date = due_date;
            header_changed = true;
        }
        if let Some(client_id) = edit.client_id {
            if let Some(client_id) = client_id {
                ensure_client(uow.as_mut(), client_id).await?;
            }
            header.client_id = client_id;
            header_changed = true;
        }
        if let Some(selection) = edit.tax_rate {
            (header.tax_rate_id, header.vat_rate) = resolve_selection(uow.as_mut(), Some(selection)).await?;
            header_changed = true;
        }
        if let Some(note) = edit.note {
            header.note = note;
            header_changed = true;
        }

        if header_changed {
            match uow.update_header(id, &header, now).await {
                Ok(()) => {}
                Err(RepositoryError::UniqueViolation(_)) => {
                    drop(uow);
                    return Err(self.duplicate_number(header.number).await);
                }
                Err(err) => return Err(err.into()),
            }
        }

        let mut line_count = current.lines.len();
        for change in &edit.lines {
            match change {
                LineChange::Add(line) => {
                    validate_new_line(line_count + 1, line)?;
                    uow.insert_line(id, &normalised(line)).await?;
                    line_count += 1;
                }
                LineChange::Update { line_id, line } => {
                    let Some(existing) = current.lines.iter().find(|existing| existing.id == *line_id) else {
                        return Err(InvoiceError::LineNotFound {
                            invoice_id: id,
                            line_id: *line_id,
                        });
                    };
                    validate_new_line(existing.position as usize, line)?;
                    uow.update_line(id, *line_id, &normalised(line))
                        .await
                        .map_err(|err| line_not_found(err, id, *line_id))?;
                }
                LineChange::Remove { line_id } => {
                    uow.delete_line(id, *line_id)
                        .await
                        .map_err(|err| line_not_found(err, id, *line_id))?;
                    line_count = line_count.saturating_sub(1);
                }
                LineChange::ReplaceAll(lines) => {
                    for (index, line) in lines.iter().enumerate() {
                        validate_new_line(index + 1, line)?;
                    }
                    uow.delete_lines(id).await?;
                    for line in lines {
                        uow.insert_line(id, &normalised(line)).await?;
                    }
                    line_count = lines.len();
                }
            }
        }

        let totals = self.recompute_in(uow.as_mut(), id, true).await?;
        uow.commit().await?;
        info!(
            invoice_id = id,
            number = %header.number,
            line_changes = edit.lines.len(),
            total = %totals.total,
            "invoice edited"
        );

        self.get_invoice(id).await
    }

    pub async fn add_line(&self, invoice_id: i64, line: NewInvoiceLine) -> Result<Invoice, InvoiceError> {
        self.edit_invoice(invoice_id, InvoiceEdit::lines([LineChange::Add(line)]))
            .await
    }

    pub async fn update_line(
        &self,
        invoice_id: i64,
        line_id: i64,
        line: NewInvoiceLine,
    ) -> Result<Invoice, InvoiceError> {
        self.edit_invoice(invoice_id, InvoiceEdit::lines([LineChange::Update { line_id, line }]))
            .await
    }

    pub async fn remove_line(&self, invoice_id: i64, line_id: i64) -> Result<Invoice, InvoiceError> {
        self.edit_invoice(invoice_id, InvoiceEdit::lines([LineChange::Remove { line_id }]))
            .await
    }

    /// Copies lines and rate under a freshly allocated number, as UNPAID and
    /// issued today. The due date is carried over.
    pub async fn duplicate_invoice(&self, id: i64) -> Result<Invoice, InvoiceError> {
        let original = self.get_invoice(id).await?;
        let selection = match (original.tax_rate_id, original.vat_rate) {
            (Some(tax_rate_id), _) => Some(RateSelection::Reference(tax_rate_id)),
            (None, Some(rate)) => Some(RateSelection::Inline(rate)),
            (None, None) => None,
        };

        let copy = NewInvoice {
            number: None,
            issue_date: self.now().date_naive(),
            due_date: Some(original.due_date),
            client_id: original.client_id,
            tax_rate: selection,
            status: InvoiceStatus::Unpaid,
            note: original.note.clone(),
            lines: original.lines.iter().map(|line| line.to_new_line()).collect(),
        };

        let duplicate = self.create_invoice(copy).await?;
        info!(source_id = id, invoice_id = duplicate.id, number = %duplicate.number, "invoice duplicated");
        Ok(duplicate)
    }

    /// Deletes the invoice together with its lines.
    pub async fn delete_invoice(&self, id: i64) -> Result<(), InvoiceError> {
        self.repo
            .delete_invoice(id)
            .await
            .map_err(|err| not_found_as(err, InvoiceError::InvoiceNotFound(id)))?;
        info!(invoice_id = id, "invoice deleted");
        Ok(())
    }

    // =========================================================================
    // Totals
    // =========================================================================

    /// Recomputes and persists totals from the stored lines.
    ///
    /// Writes only when the result differs from what is stored, so a repeat
    /// call leaves the record byte-identical, `updated_at` included.
    pub async fn recompute_totals(&self, id: i64) -> Result<InvoiceTotals, InvoiceError> {
        let mut uow = self.repo.begin().await?;
        let totals = self.recompute_in(uow.as_mut(), id, false).await?;
        uow.commit().await?;
        Ok(totals)
    }

    async fn recompute_in(
        &self,
        uow: &mut dyn InvoiceUnitOfWork,
        id: i64,
        always_write: bool,
    ) -> Result<InvoiceTotals, InvoiceError> {
        let invoice = uow
            .invoice(id)
            .await
            .map_err(|err| not_found_as(err, InvoiceError::InvoiceNotFound(id)))?;

        let reference = match invoice.tax_rate_id {
            Some(tax_rate_id) => match uow.tax_rate(tax_rate_id).await {
                Ok(tax_rate) => Some(tax_rate),
                Err(RepositoryError::NotFound) => {
                    warn!(invoice_id = id, tax_rate_id, "invoice references a missing tax rate");
                    None
                }
                Err(err) => return Err(err.into()),
            },
            None => None,
        };

        let context = RateContext {
            reference: reference.as_ref(),
            inline_rate: invoice.vat_rate,
            fallback_rate: self.settings.fallback_vat_rate,
        };
        let effective = resolve_effective_rate(&context).map_err(|err| InvoiceError::from_vat(err, &invoice))?;
        let totals = InvoiceTotals::compute(&invoice.lines, effective.rate)
            .map_err(|err| InvoiceError::from_totals(err, &invoice))?;

        let stored = InvoiceTotals {
            subtotal: invoice.subtotal,
            vat_amount: invoice.total.saturating_sub(invoice.subtotal),
            total: invoice.total,
        };
        if !always_write && !stored.satisfies_invariant(effective.rate) {
            warn!(
                invoice_id = id,
                subtotal = %invoice.subtotal,
                total = %invoice.total,
                rate = %effective.rate,
                "stored totals disagree with the effective rate"
            );
        }

        let changed = !totals.matches_persisted(invoice.subtotal, invoice.total);
        if changed || always_write {
            uow.write_totals(id, &totals, self.now()).await?;
        }
        debug!(
            invoice_id = id,
            rate = %effective.rate,
            source = ?effective.source,
            subtotal = %totals.subtotal,
            total = %totals.total,
            changed,
            "totals recomputed"
        );
        Ok(totals)
    }

    // =========================================================================
    // Status
    // =========================================================================

    /// Moves the invoice to `requested` (`UNPAID` or `PAID`). Totals are not
    /// touched.
    pub async fn transition_status(&self, id: i64, requested: &str) -> Result<Invoice, InvoiceError> {
        let current = self.get_invoice(id).await?;
        let target = invoice_status::transition(current.status, requested)?;

        self.repo
            .set_status(id, target, self.now())
            .await
            .map_err(|err| not_found_as(err, InvoiceError::InvoiceNotFound(id)))?;
        info!(invoice_id = id, from = current.status.as_str(), to = target.as_str(), "status changed");

        self.get_invoice(id).await
    }

    /// Rewrites every legacy status to its current equivalent and returns
    /// how many records changed. Running it again returns 0.
    pub async fn migrate_legacy_statuses(&self) -> Result<u64, InvoiceError> {
        let now = self.now();
        let mut uow = self.repo.begin().await?;

        let mut changed = 0;
        for (id, stored) in uow.stored_statuses().await? {
            match invoice_status::plan_status_migration(&stored) {
                StatusMigration::Unchanged => {}
                StatusMigration::Rewrite(status) => {
                    if uow.rewrite_status(id, &stored, status, now).await? {
                        debug!(invoice_id = id, from = %stored, to = status.as_str(), "status migrated");
                        changed += 1;
                    }
                }
                StatusMigration::Unrecognised => {
                    warn!(invoice_id = id, status = %stored, "unrecognised status left unchanged");
                }
            }
        }

        uow.commit().await?;
        info!(changed, "legacy status migration finished");
        Ok(changed)
    }

    // =========================================================================
    // Tax rates
    // =========================================================================

    pub async fn create_tax_rate(&self, tax_rate: NewTaxRate) -> Result<TaxRate, InvoiceError> {
        validate_rate(tax_rate.rate).map_err(|_| InvoiceError::InvalidTaxRate(tax_rate.rate))?;
        let tax_rate = NewTaxRate {
            name: tax_rate.name.trim().to_string(),
            rate: to_money(tax_rate.rate),
            description: tax_rate.description,
        };

        match self.repo.create_tax_rate(&tax_rate).await {
            Ok(created) => {
                info!(tax_rate_id = created.id, name = %created.name, rate = %created.rate, "tax rate created");
                Ok(created)
            }
            Err(RepositoryError::UniqueViolation(_)) => Err(InvoiceError::DuplicateTaxRate(tax_rate.name)),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn list_tax_rates(&self, active_only: bool) -> Result<Vec<TaxRate>, InvoiceError> {
        Ok(self.repo.list_tax_rates(active_only).await?)
    }

    pub async fn set_tax_rate_active(&self, id: i64, is_active: bool) -> Result<(), InvoiceError> {
        self.repo
            .set_tax_rate_active(id, is_active)
            .await
            .map_err(|err| not_found_as(err, InvoiceError::TaxRateNotFound(id)))
    }

    // =========================================================================
    // Clients
    // =========================================================================

    /// Stores a client with a trimmed name. Blank optional fields are
    /// stored as absent.
    pub async fn create_client(&self, client: NewClient) -> Result<Client, InvoiceError> {
        let name = client.name.trim();
        if name.is_empty() {
            return Err(InvoiceError::InvalidClient("name must not be empty".to_string()));
        }
        let client = NewClient {
            name: name.to_string(),
            registry_code: non_blank(client.registry_code),
            email: non_blank(client.email),
            phone: non_blank(client.phone),
            address: non_blank(client.address),
        };

        let created = self.repo.create_client(&client).await?;
        info!(client_id = created.id, name = %created.name, "client created");
        Ok(created)
    }

    pub async fn get_client(&self, id: i64) -> Result<Client, InvoiceError> {
        self.repo
            .get_client(id)
            .await
            .map_err(|err| not_found_as(err, InvoiceError::ClientNotFound(id)))
    }

    pub async fn list_clients(&self) -> Result<Vec<Client>, InvoiceError> {
        Ok(self.repo.list_clients().await?)
    }

    async fn duplicate_number(&self, number: InvoiceNumber) -> InvoiceError {
        let existing_id = self.repo.find_invoice_by_number(&number).await.ok().flatten();
        warn!(%number, ?existing_id, "storage rejected duplicate invoice number");
        InvoiceError::DuplicateNumber { number, existing_id }
    }
}

fn ensure_unique(
    number: InvoiceNumber,
    existing: Option<i64>,
    exclude_id: Option<i64>,
) -> Result<(), InvoiceError> {
    match existing {
        Some(existing_id) if Some(existing_id) != exclude_id => Err(InvoiceError::DuplicateNumber {
            number,
            existing_id: Some(existing_id),
        }),
        _ => Ok(()),
    }
}

/// Turns a caller's rate choice into the `(tax_rate_id, vat_rate)` columns.
/// A reference also records the referenced percentage inline.
async fn resolve_selection(
    uow: &mut dyn InvoiceUnitOfWork,
    selection: Option<RateSelection>,
) -> Result<(Option<i64>, Option<Decimal>), InvoiceError> {
    match selection {
        Some(RateSelection::Reference(tax_rate_id)) => {
            let tax_rate = uow
                .tax_rate(tax_rate_id)
                .await
                .map_err(|err| not_found_as(err, InvoiceError::TaxRateNotFound(tax_rate_id)))?;
            Ok((Some(tax_rate.id), Some(tax_rate.rate)))
        }
        Some(RateSelection::Inline(rate)) => {
            validate_rate(rate).map_err(|_| InvoiceError::InvalidTaxRate(rate))?;
            Ok((None, Some(to_money(rate))))
        }
        None => Ok((None, None)),
    }
}

async fn ensure_client(uow: &mut dyn InvoiceUnitOfWork, client_id: i64) -> Result<(), InvoiceError> {
    uow.client(client_id)
        .await
        .map(|_| ())
        .map_err(|err| not_found_as(err, InvoiceError::ClientNotFound(client_id)))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Lines reach here already validated, so only the scale changes.
fn normalised(line: &NewInvoiceLine) -> NewInvoiceLine {
    NewInvoiceLine {
        description: line.description.trim().to_string(),
        qty: to_money(line.qty),
        unit_price: to_money(line.unit_price),
        line_total_override: line.line_total_override.map(to_money),
    }
}

fn not_found_as(err: RepositoryError, replacement: InvoiceError) -> InvoiceError {
    match err {
        RepositoryError::NotFound => replacement,
        other => InvoiceError::Repository(other),
    }
}

fn line_not_found(err: RepositoryError, invoice_id: i64, line_id: i64) -> InvoiceError {
    not_found_as(err, InvoiceError::LineNotFound { invoice_id, line_id })
}
