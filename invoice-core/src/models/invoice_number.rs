use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Highest sequence a `YYYY-NNNN` number can carry.
pub const MAX_SEQUENCE: u16 = 9999;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvoiceNumberError {
    #[error("invoice number '{0}' does not match the YYYY-NNNN format")]
    InvalidFormat(String),

    #[error("invoice number sequence for {0} is exhausted")]
    SequenceExhausted(i32),
}

fn number_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    // ASCII classes: `\d` would also accept non-ASCII Unicode digits
    PATTERN.get_or_init(|| Regex::new(r"^[0-9]{4}-[0-9]{4}$").expect("static pattern is valid"))
}

/// A validated `YYYY-NNNN` invoice identifier.
///
/// The string form is always derived from `(year, sequence)`, so any value
/// of this type renders in canonical zero-padded form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InvoiceNumber {
    year: u16,
    sequence: u16,
}

impl InvoiceNumber {
    /// First number of a calendar year (`YYYY-0001`).
    pub fn first_of_year(year: i32) -> Result<Self, InvoiceNumberError> {
        Self::from_parts(year, 1)
    }

    pub fn from_parts(year: i32, sequence: u16) -> Result<Self, InvoiceNumberError> {
        let year = u16::try_from(year)
            .ok()
            .filter(|y| *y <= 9999)
            .ok_or_else(|| InvoiceNumberError::InvalidFormat(format!("{year}-{sequence:04}")))?;
        if sequence > MAX_SEQUENCE {
            return Err(InvoiceNumberError::SequenceExhausted(i32::from(year)));
        }
        Ok(Self { year, sequence })
    }

    pub fn year(&self) -> i32 {
        i32::from(self.year)
    }

    pub fn sequence(&self) -> u16 {
        self.sequence
    }

    /// The number that follows this one within the same year.
    pub fn next(&self) -> Result<Self, InvoiceNumberError> {
        if self.sequence >= MAX_SEQUENCE {
            return Err(InvoiceNumberError::SequenceExhausted(self.year()));
        }
        Ok(Self {
            year: self.year,
            sequence: self.sequence + 1,
        })
    }

    /// `LIKE` prefix matching every number of `year` (`"2025-%"`).
    pub fn year_prefix_pattern(year: i32) -> String {
        format!("{year:04}-%")
    }
}

/// Next number to allocate for `year`, given the highest number already
/// used in that year.
pub fn next_in_sequence(
    year: i32,
    last: Option<InvoiceNumber>,
) -> Result<InvoiceNumber, InvoiceNumberError> {
    match last {
        Some(last) if last.year() == year => last.next(),
        _ => InvoiceNumber::first_of_year(year),
    }
}

/// Checks `raw` against the strict `^\d{4}-\d{4}$` format.
pub fn validate_number_format(raw: &str) -> Result<InvoiceNumber, InvoiceNumberError> {
    raw.parse()
}

impl FromStr for InvoiceNumber {
    type Err = InvoiceNumberError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !number_pattern().is_match(s) {
            return Err(InvoiceNumberError::InvalidFormat(s.to_string()));
        }
        let invalid = || InvoiceNumberError::InvalidFormat(s.to_string());
        let (year, sequence) = s.split_once('-').ok_or_else(invalid)?;
        Ok(Self {
            year: year.parse().map_err(|_| invalid())?,
            sequence: sequence.parse().map_err(|_| invalid())?,
        })
    }
}

impl TryFrom<String> for InvoiceNumber {
    type Error = InvoiceNumberError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<InvoiceNumber> for String {
    fn from(value: InvoiceNumber) -> Self {
        value.to_string()
    }
}

impl fmt::Display for InvoiceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:04}", self.year, self.sequence)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn accepts_canonical_number() {
        let number = validate_number_format("2025-0001").expect("valid number");

        assert_eq!(number.year(), 2025);
        assert_eq!(number.sequence(), 1);
        assert_eq!(number.to_string(), "2025-0001");
    }

    #[test]
    fn rejects_malformed_numbers() {
        for raw in ["25-1", "2025-1", "2025_0001", "", "2025-00001", " 2025-0001", "2025-0001\n"] {
            assert_eq!(
                validate_number_format(raw),
                Err(InvoiceNumberError::InvalidFormat(raw.to_string())),
                "{raw:?} should be rejected"
            );
        }
    }

    #[test]
    fn rejects_non_ascii_digits() {
        assert!(validate_number_format("٢٠٢٥-0001").is_err());
    }

    #[test]
    fn first_allocation_of_year_is_0001() {
        let number = next_in_sequence(2025, None).unwrap();

        assert_eq!(number.to_string(), "2025-0001");
    }

    #[test]
    fn allocation_increments_last_number() {
        let last = validate_number_format("2025-0041").unwrap();

        assert_eq!(next_in_sequence(2025, Some(last)).unwrap().to_string(), "2025-0042");
    }

    #[test]
    fn allocation_restarts_for_new_year() {
        let last = validate_number_format("2024-0107").unwrap();

        assert_eq!(next_in_sequence(2025, Some(last)).unwrap().to_string(), "2025-0001");
    }

    #[test]
    fn allocation_fails_past_9999() {
        let last = validate_number_format("2025-9999").unwrap();

        assert_eq!(
            next_in_sequence(2025, Some(last)),
            Err(InvoiceNumberError::SequenceExhausted(2025))
        );
    }

    #[test]
    fn try_from_string_rejects_bad_format() {
        assert!(InvoiceNumber::try_from("2026-3".to_string()).is_err());
    }

    #[test]
    fn year_prefix_pattern_pads_year() {
        assert_eq!(InvoiceNumber::year_prefix_pattern(2025), "2025-%");
    }
}
