//! Monetary calculations for invoices.
//!
//! Everything here is pure: no I/O, no clock, no shared state. The service
//! layer feeds these functions the current lines and rate and persists what
//! they return.

pub mod aggregator;
pub mod common;
pub mod totals;
pub mod vat;

pub use aggregator::{InvalidLine, LineAggregator, LineField};
pub use totals::{InvoiceTotals, TotalsError};
pub use vat::{EffectiveRate, RateContext, RateSource, VatCalculator, VatError, resolve_effective_rate};
