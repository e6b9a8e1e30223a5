//! Legacy CSV import end to end, against a freshly migrated in-memory
//! database opened through the backend registry.

use std::fs::File;
use std::path::PathBuf;

use chrono::NaiveDate;
use invoice_cli::{ImportReport, LegacyImporter, build_registry};
use invoice_core::db::DbConfig;
use invoice_core::{InvoiceService, InvoiceSettings, InvoiceStatus};
use pretty_assertions::assert_eq;
use rust_decimal_macros::dec;

fn fixture_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/legacy_invoices.csv")
}

async fn service() -> InvoiceService {
    let repo = build_registry()
        .create(&DbConfig::default())
        .await
        .expect("Failed to open in-memory database");
    InvoiceService::new(repo, InvoiceSettings::default())
}

fn records() -> Vec<invoice_cli::legacy_import::LegacyInvoiceRecord> {
    let file = File::open(fixture_path()).expect("Failed to open fixture");
    LegacyImporter::parse(file).expect("Failed to parse fixture")
}

#[tokio::test]
async fn test_import_recomputes_totals() {
    let service = service().await;

    let report = LegacyImporter::import(&service, &records()).await.unwrap();
    assert_eq!(report, ImportReport { imported: 5, skipped: 0 });

    let invoices = service.list_invoices().await.unwrap();
    let summary: Vec<(String, String, String)> = invoices
        .iter()
        .map(|invoice| {
            (
                invoice.number.to_string(),
                invoice.subtotal.to_string(),
                invoice.total.to_string(),
            )
        })
        .collect();
    assert_eq!(
        summary,
        vec![
            ("2023-0041".into(), "1319.88".into(), "1583.86".into()),
            ("2024-0001".into(), "135.00".into(), "162.00".into()),
            ("2024-0002".into(), "33.33".into(), "41.33".into()),
            ("2024-0003".into(), "25.00".into(), "31.00".into()),
            ("2024-0004".into(), "45.00".into(), "49.05".into()),
        ]
    );

    let multi_line = &invoices[0];
    assert_eq!(multi_line.lines.len(), 2);
    assert_eq!(multi_line.lines[1].line_total, dec!(119.88));

    let manual = &invoices[3];
    assert!(manual.lines[0].manual_total);
    assert_eq!(manual.lines[0].line_total, dec!(25.00));
}

#[tokio::test]
async fn test_import_maps_legacy_statuses() {
    let service = service().await;
    LegacyImporter::import(&service, &records()).await.unwrap();

    let statuses: Vec<InvoiceStatus> = service
        .list_invoices()
        .await
        .unwrap()
        .iter()
        .map(|invoice| invoice.status)
        .collect();
    assert_eq!(
        statuses,
        vec![
            InvoiceStatus::Paid,
            InvoiceStatus::Unpaid,
            InvoiceStatus::Unpaid,
            InvoiceStatus::Unpaid,
            InvoiceStatus::Paid,
        ]
    );

    // nothing left for the status migration to rewrite
    assert_eq!(service.migrate_legacy_statuses().await.unwrap(), 0);
}

#[tokio::test]
async fn test_reimport_skips_existing_numbers() {
    let service = service().await;
    let records = records();
    LegacyImporter::import(&service, &records).await.unwrap();

    let report = LegacyImporter::import(&service, &records).await.unwrap();

    assert_eq!(report, ImportReport { imported: 0, skipped: 5 });
    assert_eq!(service.list_invoices().await.unwrap().len(), 5);
}

#[tokio::test]
async fn test_summary_after_import() {
    let service = service().await;
    LegacyImporter::import(&service, &records()).await.unwrap();
    let today = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();

    let summary = service.receivables_summary(today).await.unwrap();

    assert_eq!(summary.unpaid.count, 3);
    assert_eq!(summary.unpaid.total, dec!(234.33));
    // 2024-0003 falls due on 2024-02-15
    assert_eq!(summary.overdue.count, 2);
    assert_eq!(summary.overdue.total, dec!(203.33));
    assert_eq!(summary.paid.count, 2);
    assert_eq!(summary.paid.total, dec!(1632.91));

    let overdue: Vec<String> = service
        .overdue_invoices(today)
        .await
        .unwrap()
        .iter()
        .map(|invoice| invoice.number.to_string())
        .collect();
    assert_eq!(overdue, vec!["2024-0001", "2024-0002"]);
}

#[tokio::test]
async fn test_import_resolves_clients_by_name() {
    let service = service().await;
    let existing = service
        .create_client(invoice_core::NewClient::new("Beta OÜ"))
        .await
        .unwrap();

    LegacyImporter::import(&service, &records()).await.unwrap();
    LegacyImporter::import(&service, &records()).await.unwrap();

    let clients = service.list_clients().await.unwrap();
    let names: Vec<&str> = clients.iter().map(|client| client.name.as_str()).collect();
    assert_eq!(names, vec!["Alpha AS", "Beta OÜ"]);

    let owners: Vec<Option<i64>> = service
        .list_invoices()
        .await
        .unwrap()
        .iter()
        .map(|invoice| invoice.client_id)
        .collect();
    let alpha = Some(clients[0].id);
    assert_eq!(owners, vec![alpha, alpha, Some(existing.id), None, alpha]);

    let today = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
    let report = service.client_receivables(today).await.unwrap();
    assert_eq!(report[0].invoiced.count, 3);
    assert_eq!(report[0].invoiced.total, dec!(1794.91));
    assert_eq!(report[0].receivables.paid.total, dec!(1632.91));
    assert_eq!(report[0].last_issue_date, NaiveDate::from_ymd_opt(2024, 2, 20));
}
