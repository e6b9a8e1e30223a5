pub mod calculations;
pub mod db;
pub mod models;
pub mod service;
pub mod settings;

pub use calculations::{InvoiceTotals, VatCalculator};
pub use db::repository::{InvoiceRepository, InvoiceUnitOfWork, RepositoryError};
pub use models::*;
pub use service::{AmountTally, ClientReceivables, InvoiceError, InvoiceService, ReceivablesSummary};
pub use settings::InvoiceSettings;
