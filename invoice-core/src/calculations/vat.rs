//! VAT calculation and effective-rate resolution.
//!
//! The effective rate is resolved by trying an ordered list of pure
//! strategies:
//!
//! | Order | Strategy | Source |
//! |-------|----------|--------|
//! | 1 | [`from_reference`] | active tax-rate record referenced by the invoice |
//! | 2 | [`from_inline_rate`] | legacy inline `vat_rate` column |
//! | 3 | [`from_configured_fallback`] | `InvoiceSettings::fallback_vat_rate`, only when explicitly set |
//!
//! When none applies, resolution fails with [`VatError::NoRateAvailable`].
//!
//! # Example
//!
//! ```
//! use rust_decimal_macros::dec;
//! use invoice_core::calculations::vat::{RateContext, VatCalculator, resolve_effective_rate};
//!
//! let context = RateContext {
//!     reference: None,
//!     inline_rate: Some(dec!(24.00)),
//!     fallback_rate: None,
//! };
//! let rate = resolve_effective_rate(&context).unwrap();
//!
//! assert_eq!(VatCalculator::vat_amount(dec!(33.33), rate.rate).unwrap(), dec!(8.00));
//! ```

use rust_decimal::Decimal;
use thiserror::Error;

use crate::calculations::common::to_money;
use crate::models::TaxRate;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VatError {
    /// Neither a usable reference, an inline rate nor a configured fallback.
    #[error("no tax rate available")]
    NoRateAvailable,

    /// Rate outside `0..=100` or with more than two fraction digits.
    #[error("invalid tax rate {0}: must be a percentage between 0 and 100")]
    InvalidRate(Decimal),

    /// `subtotal * rate` does not fit a decimal.
    #[error("VAT on {0} is out of range")]
    AmountOutOfRange(Decimal),
}

/// Where an effective rate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateSource {
    Reference(i64),
    InlineColumn,
    ConfiguredFallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectiveRate {
    pub rate: Decimal,
    pub source: RateSource,
}

/// Everything rate resolution may look at for one invoice.
#[derive(Debug, Clone, Copy, Default)]
pub struct RateContext<'a> {
    pub reference: Option<&'a TaxRate>,
    pub inline_rate: Option<Decimal>,
    pub fallback_rate: Option<Decimal>,
}

type RateStrategy = fn(&RateContext<'_>) -> Option<EffectiveRate>;

const STRATEGIES: [RateStrategy; 3] = [from_reference, from_inline_rate, from_configured_fallback];

pub fn from_reference(context: &RateContext<'_>) -> Option<EffectiveRate> {
    context
        .reference
        .filter(|tax_rate| tax_rate.is_active)
        .map(|tax_rate| EffectiveRate {
            rate: tax_rate.rate,
            source: RateSource::Reference(tax_rate.id),
        })
}

pub fn from_inline_rate(context: &RateContext<'_>) -> Option<EffectiveRate> {
    context.inline_rate.map(|rate| EffectiveRate {
        rate,
        source: RateSource::InlineColumn,
    })
}

pub fn from_configured_fallback(context: &RateContext<'_>) -> Option<EffectiveRate> {
    context.fallback_rate.map(|rate| EffectiveRate {
        rate,
        source: RateSource::ConfiguredFallback,
    })
}

/// Tries each strategy in order and validates the first hit.
pub fn resolve_effective_rate(context: &RateContext<'_>) -> Result<EffectiveRate, VatError> {
    let resolved = STRATEGIES
        .iter()
        .find_map(|strategy| strategy(context))
        .ok_or(VatError::NoRateAvailable)?;
    validate_rate(resolved.rate)?;
    Ok(resolved)
}

/// A rate must lie in `0..=100` with at most two fraction digits.
pub fn validate_rate(rate: Decimal) -> Result<(), VatError> {
    if rate < Decimal::ZERO || rate > Decimal::ONE_HUNDRED || rate.normalize().scale() > 2 {
        return Err(VatError::InvalidRate(rate));
    }
    Ok(())
}

/// Pure VAT calculator.
pub struct VatCalculator;

impl VatCalculator {
    /// `round_half_up(subtotal * rate / 100, 2)`.
    ///
    /// Identical `(subtotal, rate)` pairs always produce identical output.
    pub fn vat_amount(subtotal: Decimal, rate: Decimal) -> Result<Decimal, VatError> {
        validate_rate(rate)?;
        let scaled = subtotal
            .checked_mul(rate)
            .ok_or(VatError::AmountOutOfRange(subtotal))?;
        Ok(to_money(scaled / Decimal::ONE_HUNDRED))
    }
}
