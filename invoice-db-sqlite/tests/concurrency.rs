//! Concurrent edits of one invoice: the last committer's lines and totals
//! persist together, in memory and on a multi-connection file database.

mod common;

use std::sync::Arc;

use invoice_core::calculations::InvoiceTotals;
use invoice_core::{InvoiceEdit, InvoiceService, LineChange, NewInvoiceLine};
use pretty_assertions::assert_eq;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sqlx::sqlite::SqlitePool;
use tempfile::TempDir;

use common::{new_invoice, raw_totals, setup, setup_file};

fn line_set(label: &str, unit_price: Decimal, count: usize) -> Vec<NewInvoiceLine> {
    (1..=count)
        .map(|n| NewInvoiceLine::new(format!("{label} {n}"), dec!(1), unit_price))
        .collect()
}

/// Runs `rounds` of `writers` simultaneous full replacements of one
/// invoice's lines and checks the survivor after each round.
async fn replace_concurrently(service: InvoiceService, pool: SqlitePool, rounds: usize, writers: usize) {
    let service = Arc::new(service);
    let invoice = service
        .create_invoice(new_invoice("2025-0001", dec!(24), vec![]))
        .await
        .unwrap();
    let id = invoice.id;

    for round in 0..rounds {
        // Writer n contributes n + 1 lines labelled with its letter
        let tasks: Vec<_> = (0..writers)
            .map(|n| {
                let service = Arc::clone(&service);
                let label = char::from(b'A' + n as u8).to_string();
                let lines = line_set(&label, dec!(7.77), n + 1);
                tokio::spawn(async move {
                    service
                        .edit_invoice(id, InvoiceEdit::lines([LineChange::ReplaceAll(lines)]))
                        .await
                })
            })
            .collect();
        for task in tasks {
            let result = task.await.unwrap();
            assert!(result.is_ok(), "round {round}: {result:?}");
        }

        let stored = service.get_invoice(id).await.unwrap();
        let labels: Vec<char> = stored
            .lines
            .iter()
            .filter_map(|line| line.description.chars().next())
            .collect();
        let winner = labels[0];
        assert!(labels.iter().all(|label| *label == winner), "mixed lines: {labels:?}");
        assert_eq!(stored.lines.len(), usize::from(winner as u8 - b'A') + 1);

        let expected = InvoiceTotals::compute(&stored.lines, dec!(24)).unwrap();
        let (subtotal, total, _) = raw_totals(&pool, id).await;
        assert_eq!(subtotal, expected.subtotal.to_string());
        assert_eq!(total, expected.total.to_string());
    }
}

#[tokio::test]
async fn test_concurrent_replacements_never_mix() {
    let (service, pool) = setup().await;
    replace_concurrently(service, pool, 10, 2).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_replacements_on_file_database() {
    let dir = TempDir::new().unwrap();
    let (service, pool) = setup_file(dir.path()).await;
    assert!(pool.options().get_max_connections() > 1);

    replace_concurrently(service, pool, 20, 4).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_creates_on_file_database_get_distinct_numbers() {
    let dir = TempDir::new().unwrap();
    let (service, _pool) = setup_file(dir.path()).await;
    let service = Arc::new(service);

    let tasks: Vec<_> = (0..6)
        .map(|n| {
            let service = Arc::clone(&service);
            tokio::spawn(async move {
                let mut invoice = new_invoice("2025-0001", dec!(24), line_set("Item", dec!(10.00), 1));
                invoice.number = Some(format!("2025-{:04}", n + 1));
                service.create_invoice(invoice).await
            })
        })
        .collect();
    for task in tasks {
        let result = task.await.unwrap();
        assert!(result.is_ok(), "{result:?}");
    }

    assert_eq!(service.list_invoices().await.unwrap().len(), 6);
}

#[tokio::test]
async fn test_concurrent_additions_all_count() {
    let (service, _pool) = setup().await;
    let service = Arc::new(service);
    let invoice = service
        .create_invoice(new_invoice("2025-0001", dec!(9), vec![]))
        .await
        .unwrap();
    let id = invoice.id;

    let tasks: Vec<_> = (0..8)
        .map(|n| {
            let service = Arc::clone(&service);
            tokio::spawn(async move {
                service
                    .add_line(id, NewInvoiceLine::new(format!("Item {n}"), dec!(1), dec!(12.50)))
                    .await
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let stored = service.get_invoice(id).await.unwrap();
    assert_eq!(stored.lines.len(), 8);
    assert_eq!(stored.subtotal.to_string(), "100.00");
    assert_eq!(stored.total.to_string(), "109.00");

    let mut positions: Vec<i32> = stored.lines.iter().map(|line| line.position).collect();
    positions.sort_unstable();
    assert_eq!(positions, (1..=8).collect::<Vec<_>>());
}
