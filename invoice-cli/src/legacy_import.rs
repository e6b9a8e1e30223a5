use std::collections::HashMap;
use std::io::Read;

use chrono::NaiveDate;
use invoice_core::{
    InvoiceError, InvoiceService, InvoiceStatus, NewClient, NewInvoice, NewInvoiceLine, RateSelection,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

/// Errors that can occur when importing legacy invoices.
#[derive(Debug, Error)]
pub enum LegacyImportError {
    #[error("CSV parse error: {0}")]
    CsvParse(String),

    #[error("Invoice {number}: unknown status '{status}'")]
    UnknownStatus { number: String, status: String },

    #[error("Invoice {number}: a line needs a description, qty and unit_price")]
    IncompleteLine { number: String },

    #[error("Invoice {number}: {source}")]
    Invoice {
        number: String,
        #[source]
        source: InvoiceError,
    },

    #[error("Client '{name}': {source}")]
    Client {
        name: String,
        #[source]
        source: InvoiceError,
    },
}

impl From<csv::Error> for LegacyImportError {
    fn from(err: csv::Error) -> Self {
        LegacyImportError::CsvParse(err.to_string())
    }
}

/// One row of a legacy export. Rows sharing a `number` belong to the same
/// invoice; header columns are taken from its first row. A row without
/// line columns only declares the invoice.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LegacyInvoiceRecord {
    pub number: String,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub status: String,
    #[serde(default, deserialize_with = "deserialize_optional_decimal")]
    pub vat_rate: Option<Decimal>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_decimal")]
    pub qty: Option<Decimal>,
    #[serde(default, deserialize_with = "deserialize_optional_decimal")]
    pub unit_price: Option<Decimal>,
    #[serde(default, deserialize_with = "deserialize_optional_decimal")]
    pub line_total: Option<Decimal>,
    /// Client name, matched exactly against existing clients.
    #[serde(default)]
    pub client: Option<String>,
}

fn deserialize_optional_decimal<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: Option<String> = Option::deserialize(deserializer)?;
    match s {
        Some(s) if s.trim().is_empty() => Ok(None),
        Some(s) => s
            .trim()
            .replace(',', ".")
            .parse::<Decimal>()
            .map(Some)
            .map_err(serde::de::Error::custom),
        None => Ok(None),
    }
}

impl LegacyInvoiceRecord {
    fn client_name(&self) -> Option<&str> {
        self.client.as_deref().map(str::trim).filter(|name| !name.is_empty())
    }

    fn line(&self) -> Result<Option<NewInvoiceLine>, LegacyImportError> {
        let description = self.description.as_deref().map(str::trim).unwrap_or_default();
        match (description.is_empty(), self.qty, self.unit_price) {
            (true, None, None) => Ok(None),
            (false, Some(qty), Some(unit_price)) => {
                let line = NewInvoiceLine::new(description, qty, unit_price);
                Ok(Some(match self.line_total {
                    Some(line_total) => line.with_line_total(line_total),
                    None => line,
                }))
            }
            _ => Err(LegacyImportError::IncompleteLine {
                number: self.number.clone(),
            }),
        }
    }
}

/// Outcome of an import run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub imported: usize,
    /// Numbers already present; re-running an import skips them.
    pub skipped: usize,
}

/// Loader for invoices exported from the old system.
///
/// Every invoice goes through [`InvoiceService::create_invoice`], so totals
/// are recomputed rather than copied and legacy statuses arrive already
/// mapped to UNPAID or PAID.
pub struct LegacyImporter;

impl LegacyImporter {
    /// Parse legacy records from a CSV reader.
    pub fn parse<R: Read>(reader: R) -> Result<Vec<LegacyInvoiceRecord>, LegacyImportError> {
        let mut csv_reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let mut records = Vec::new();

        for result in csv_reader.deserialize() {
            let record: LegacyInvoiceRecord = result?;
            records.push(record);
        }

        Ok(records)
    }

    /// Groups records into invoices in first-seen order.
    pub fn group(records: &[LegacyInvoiceRecord]) -> Result<Vec<NewInvoice>, LegacyImportError> {
        let mut invoices: Vec<NewInvoice> = Vec::new();

        for record in records {
            let line = record.line()?;
            if let Some(existing) = invoices
                .iter_mut()
                .find(|invoice| invoice.number.as_deref() == Some(record.number.as_str()))
            {
                existing.lines.extend(line);
                continue;
            }

            let status = InvoiceStatus::from_stored(&record.status).ok_or_else(|| {
                LegacyImportError::UnknownStatus {
                    number: record.number.clone(),
                    status: record.status.clone(),
                }
            })?;
            invoices.push(NewInvoice {
                number: Some(record.number.clone()),
                issue_date: record.issue_date,
                due_date: Some(record.due_date),
                client_id: None,
                tax_rate: record.vat_rate.map(RateSelection::Inline),
                status,
                note: record.note.clone().filter(|note| !note.trim().is_empty()),
                lines: line.into_iter().collect(),
            });
        }

        Ok(invoices)
    }

    /// Client name per invoice number, taken from the invoice's first row.
    pub fn client_names(records: &[LegacyInvoiceRecord]) -> HashMap<&str, &str> {
        let mut first_rows: HashMap<&str, Option<&str>> = HashMap::new();
        for record in records {
            first_rows
                .entry(record.number.as_str())
                .or_insert_with(|| record.client_name());
        }
        first_rows
            .into_iter()
            .filter_map(|(number, name)| Some((number, name?)))
            .collect()
    }

    /// Import records through the service. Invoices whose number already
    /// exists are skipped; any other failure stops the run.
    ///
    /// Client names are matched against existing clients, and a client is
    /// created the first time an unknown name appears.
    pub async fn import(
        service: &InvoiceService,
        records: &[LegacyInvoiceRecord],
    ) -> Result<ImportReport, LegacyImportError> {
        let mut report = ImportReport::default();
        let client_names = Self::client_names(records);
        let mut client_ids: HashMap<String, i64> = service
            .list_clients()
            .await
            .map_err(|source| LegacyImportError::Client {
                name: String::new(),
                source,
            })?
            .into_iter()
            .map(|client| (client.name, client.id))
            .collect();

        for mut invoice in Self::group(records)? {
            let number = invoice.number.clone().unwrap_or_default();
            if let Some(&name) = client_names.get(number.as_str()) {
                let client_id = match client_ids.get(name) {
                    Some(&id) => id,
                    None => {
                        let created = service
                            .create_client(NewClient::new(name))
                            .await
                            .map_err(|source| LegacyImportError::Client {
                                name: name.to_string(),
                                source,
                            })?;
                        info!(client_id = created.id, name = %created.name, "created client for legacy invoices");
                        client_ids.insert(created.name, created.id);
                        created.id
                    }
                };
                invoice.client_id = Some(client_id);
            }

            match service.create_invoice(invoice).await {
                Ok(created) => {
                    report.imported += 1;
                    info!(invoice_id = created.id, %number, "imported legacy invoice");
                }
                Err(InvoiceError::DuplicateNumber { existing_id, .. }) => {
                    report.skipped += 1;
                    warn!(%number, ?existing_id, "invoice number already present, skipped");
                }
                Err(source) => return Err(LegacyImportError::Invoice { number, source }),
            }
        }

        Ok(report)
    }
}
