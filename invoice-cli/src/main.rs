use std::fs::File;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use tracing::{debug, error};

use invoice_cli::{AppConfig, LegacyImporter, build_registry, init_tracing};
use invoice_core::InvoiceService;
use invoice_core::models::invoice_status::display_label;

// ─── CLI definition ──────────────────────────────────────────────────────────

/// Maintenance tool for the invoice database.
///
/// Reads `invoice-admin.toml` from the working directory (or `--config`),
/// connects to the configured backend and runs one command.
#[derive(Debug, Parser)]
#[command(name = "invoice-admin")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Database backend to use (overrides the config file).
    #[arg(long, global = true)]
    backend: Option<String>,

    /// Database connection string (overrides the config file).
    /// For SQLite this is a file path (e.g. `invoices.db`) or `:memory:`.
    #[arg(long, global = true)]
    db: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Rewrite legacy statuses (draft, sent, overdue, ...) to UNPAID/PAID.
    MigrateStatuses,

    /// Recompute stored totals from the invoice lines.
    Recompute {
        #[arg(long, conflicts_with = "all", required_unless_present = "all")]
        id: Option<i64>,

        /// Recompute every invoice.
        #[arg(long)]
        all: bool,
    },

    /// Print the next free invoice number.
    NextNumber {
        /// Defaults to the current year.
        #[arg(long)]
        year: Option<i32>,
    },

    /// Set an invoice's status to UNPAID or PAID.
    SetStatus {
        #[arg(long)]
        id: i64,

        #[arg(long)]
        status: String,
    },

    /// List unpaid invoices past their due date.
    Overdue {
        /// Reference date (YYYY-MM-DD); defaults to today.
        #[arg(long)]
        today: Option<NaiveDate>,
    },

    /// Print unpaid, overdue and paid totals.
    Summary {
        #[arg(long)]
        today: Option<NaiveDate>,
    },

    /// Print invoiced, paid, unpaid and overdue totals per client.
    Clients {
        #[arg(long)]
        today: Option<NaiveDate>,
    },

    /// Import invoices from a legacy CSV export.
    ImportLegacy {
        #[arg(short, long)]
        file: PathBuf,
    },

    /// List tax rates.
    TaxRates {
        /// Include inactive rates.
        #[arg(long)]
        all: bool,
    },
}

// ─── entry point ─────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load(cli.config.as_deref())
        .context("Failed to load configuration")?
        .with_overrides(cli.backend, cli.db);
    init_tracing(config.log_level.as_deref().unwrap_or("info"));

    debug!("connecting to {} backend", config.database.backend);
    let registry = build_registry();
    let repo = registry
        .create(&config.database)
        .await
        .with_context(|| format!("Failed to open {} database", config.database.backend))?;
    let service = InvoiceService::new(repo, config.invoice);

    run(&service, cli.command).await
}

async fn run(service: &InvoiceService, command: Command) -> Result<()> {
    let today = |date: Option<NaiveDate>| date.unwrap_or_else(|| Utc::now().date_naive());

    match command {
        Command::MigrateStatuses => {
            let changed = service
                .migrate_legacy_statuses()
                .await
                .context("Status migration failed")?;
            println!("Migrated {} invoice statuses.", changed);
        }
        Command::Recompute { id: Some(id), .. } => {
            let totals = service
                .recompute_totals(id)
                .await
                .with_context(|| format!("Failed to recompute invoice {}", id))?;
            println!(
                "Invoice {}: subtotal {}, VAT {}, total {}",
                id, totals.subtotal, totals.vat_amount, totals.total
            );
        }
        Command::Recompute { id: None, .. } => {
            let ids = service.invoice_ids().await?;
            let mut failed = 0;
            for id in &ids {
                if let Err(e) = service.recompute_totals(*id).await {
                    error!(invoice_id = *id, "recompute failed: {}", e);
                    failed += 1;
                }
            }
            println!("Recomputed {} of {} invoices.", ids.len() - failed, ids.len());
            if failed > 0 {
                anyhow::bail!("{} invoices could not be recomputed", failed);
            }
        }
        Command::NextNumber { year } => {
            let number = service.allocate_number(year).await?;
            println!("{}", number);
        }
        Command::SetStatus { id, status } => {
            let invoice = service
                .transition_status(id, &status)
                .await
                .with_context(|| format!("Failed to set status of invoice {}", id))?;
            println!("Invoice {} is now {}.", invoice.number, invoice.status.label());
        }
        Command::Overdue { today: date } => {
            let today = today(date);
            let overdue = service.overdue_invoices(today).await?;
            for invoice in &overdue {
                println!(
                    "{}  due {}  {:>12}  {}",
                    invoice.number,
                    invoice.due_date,
                    invoice.total,
                    display_label(invoice.status, invoice.due_date, today)
                );
            }
            println!("{} overdue invoices as of {}.", overdue.len(), today);
        }
        Command::Summary { today: date } => {
            let today = today(date);
            let summary = service.receivables_summary(today).await?;
            println!("As of {}:", today);
            println!("  unpaid   {:>4}  {:>12}", summary.unpaid.count, summary.unpaid.total);
            println!("  overdue  {:>4}  {:>12}", summary.overdue.count, summary.overdue.total);
            println!("  paid     {:>4}  {:>12}", summary.paid.count, summary.paid.total);
        }
        Command::Clients { today: date } => {
            let today = today(date);
            println!("As of {}:", today);
            for entry in service.client_receivables(today).await? {
                let last = entry
                    .last_issue_date
                    .map(|date| date.to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{:>4}  {:<24} {:>4} invoiced {:>12}  paid {:>12}  unpaid {:>12}  overdue {:>12}  last {}",
                    entry.client.id,
                    entry.client.name,
                    entry.invoiced.count,
                    entry.invoiced.total,
                    entry.receivables.paid.total,
                    entry.receivables.unpaid.total,
                    entry.receivables.overdue.total,
                    last
                );
            }
        }
        Command::ImportLegacy { file } => {
            println!("Importing legacy invoices from: {}", file.display());
            let reader = File::open(&file)
                .with_context(|| format!("Failed to open: {}", file.display()))?;
            let records = LegacyImporter::parse(reader)
                .with_context(|| format!("Failed to parse CSV: {}", file.display()))?;
            println!("Parsed {} records from CSV", records.len());

            let report = LegacyImporter::import(service, &records)
                .await
                .context("Failed to import legacy invoices")?;
            println!(
                "Imported {} invoices, skipped {} already present.",
                report.imported, report.skipped
            );
        }
        Command::TaxRates { all } => {
            for tax_rate in service.list_tax_rates(!all).await? {
                println!(
                    "{:>4}  {:<24} {:>6}%{}",
                    tax_rate.id,
                    tax_rate.name,
                    tax_rate.rate,
                    if tax_rate.is_active { "" } else { "  (inactive)" }
                );
            }
        }
    }

    Ok(())
}
