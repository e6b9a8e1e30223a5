//! Fixed-point money helpers shared by every calculation module.
//!
//! All monetary values are [`Decimal`]s carrying exactly two fraction digits
//! at rest. Anything that produces more digits goes through [`round_half_up`]
//! before it is compared with, or stored next to, another monetary value.

use rust_decimal::{Decimal, RoundingStrategy};

/// Number of fraction digits every persisted monetary value carries.
pub const MONEY_SCALE: u32 = 2;

/// Rounds a decimal value to exactly two decimal places using half-up rounding.
///
/// Values at exactly 0.005 are rounded up to 0.01 (away from zero).
///
/// # Examples
///
/// ```
/// use rust_decimal_macros::dec;
/// use invoice_core::calculations::common::round_half_up;
///
/// assert_eq!(round_half_up(dec!(123.454)), dec!(123.45));
/// assert_eq!(round_half_up(dec!(123.455)), dec!(123.46));
/// assert_eq!(round_half_up(dec!(7.9992)), dec!(8.00));
/// assert_eq!(round_half_up(dec!(-123.455)), dec!(-123.46)); // Away from zero
/// ```
pub fn round_half_up(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Rounds half-up and pins the scale to exactly two fraction digits.
///
/// `round_half_up` alone keeps a shorter scale (`dec!(8)` stays `8`), which
/// would persist as `"8"` instead of `"8.00"`. Use this for anything written
/// to storage so the text form is canonical.
///
/// ```
/// use rust_decimal_macros::dec;
/// use invoice_core::calculations::common::to_money;
///
/// assert_eq!(to_money(dec!(8)).to_string(), "8.00");
/// assert_eq!(to_money(dec!(7.9992)).to_string(), "8.00");
/// ```
pub fn to_money(value: Decimal) -> Decimal {
    let mut rounded = round_half_up(value);
    rounded.rescale(MONEY_SCALE);
    rounded
}

/// Zero with the canonical money scale (`0.00`).
pub fn zero_money() -> Decimal {
    Decimal::new(0, MONEY_SCALE)
}

/// Largest amount a `NUMERIC(10, 2)` money column holds: `99999999.99`.
pub fn max_amount() -> Decimal {
    Decimal::new(9_999_999_999, MONEY_SCALE)
}

/// `true` when `value` carries no more than two fraction digits.
pub fn is_money(value: Decimal) -> bool {
    value.normalize().scale() <= MONEY_SCALE
}
