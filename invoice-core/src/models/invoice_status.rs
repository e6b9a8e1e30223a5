//! Invoice status state machine.
//!
//! Only two states are persisted: [`InvoiceStatus::Unpaid`] and
//! [`InvoiceStatus::Paid`]. "Overdue" is a derived fact computed by
//! [`is_overdue`] and is never written back to storage. Statuses from the
//! older four-state model are read through [`LegacyStatus`] and rewritten by
//! the one-shot migration.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StatusError {
    #[error("invalid status '{0}': expected UNPAID or PAID")]
    InvalidStatus(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceStatus {
    #[default]
    Unpaid,
    Paid,
}

impl InvoiceStatus {
    /// Storage form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unpaid => "unpaid",
            Self::Paid => "paid",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Unpaid => "Unpaid",
            Self::Paid => "Paid",
        }
    }

    pub fn all() -> &'static [InvoiceStatus] {
        &[InvoiceStatus::Unpaid, InvoiceStatus::Paid]
    }

    /// Parses a transition request. Accepts only the two current states,
    /// case-insensitively; legacy names are not valid targets.
    pub fn parse_request(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unpaid" => Some(Self::Unpaid),
            "paid" => Some(Self::Paid),
            _ => None,
        }
    }

    /// Interprets a stored status string, mapping legacy values on read.
    pub fn from_stored(s: &str) -> Option<Self> {
        match s {
            "unpaid" => Some(Self::Unpaid),
            "paid" => Some(Self::Paid),
            other => Self::parse_request(other)
                .or_else(|| LegacyStatus::parse(other).map(LegacyStatus::current))
                // unpaid code of the Estonian two-state schema
                .or_else(|| (other.trim().to_lowercase() == "maksmata").then_some(Self::Unpaid)),
        }
    }
}

/// Status values of the older four-state model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LegacyStatus {
    Draft,
    Sent,
    Overdue,
    Paid,
}

impl LegacyStatus {
    /// Recognises the English names and the original Estonian storage codes,
    /// trimmed and case-insensitive.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "draft" | "mustand" => Some(Self::Draft),
            "sent" | "saadetud" => Some(Self::Sent),
            "overdue" | "tähtaeg ületatud" => Some(Self::Overdue),
            "paid" | "makstud" => Some(Self::Paid),
            _ => None,
        }
    }

    /// Deterministic mapping onto the current two-state model.
    pub fn current(self) -> InvoiceStatus {
        match self {
            Self::Draft | Self::Sent | Self::Overdue => InvoiceStatus::Unpaid,
            Self::Paid => InvoiceStatus::Paid,
        }
    }
}

/// Outcome of inspecting one stored status during migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusMigration {
    /// Already in canonical current form.
    Unchanged,
    /// Must be rewritten to the given status.
    Rewrite(InvoiceStatus),
    /// Neither current nor a known legacy value; left untouched.
    Unrecognised,
}

/// Decides what the migration does with one stored status string.
pub fn plan_status_migration(stored: &str) -> StatusMigration {
    match InvoiceStatus::from_stored(stored) {
        Some(status) if status.as_str() == stored => StatusMigration::Unchanged,
        Some(status) => StatusMigration::Rewrite(status),
        None => StatusMigration::Unrecognised,
    }
}

/// Validates a transition request from `current` to `requested`.
///
/// Both directions between UNPAID and PAID are permitted unconditionally,
/// including a same-state request.
pub fn transition(current: InvoiceStatus, requested: &str) -> Result<InvoiceStatus, StatusError> {
    let target = InvoiceStatus::parse_request(requested)
        .ok_or_else(|| StatusError::InvalidStatus(requested.to_string()))?;
    if valid_transitions(current).contains(&target) {
        Ok(target)
    } else {
        Err(StatusError::InvalidStatus(requested.to_string()))
    }
}

pub fn valid_transitions(_current: InvoiceStatus) -> &'static [InvoiceStatus] {
    InvoiceStatus::all()
}

/// Overdue is `due_date < today AND status == UNPAID`.
pub fn is_overdue(status: InvoiceStatus, due_date: NaiveDate, today: NaiveDate) -> bool {
    status == InvoiceStatus::Unpaid && due_date < today
}

/// Display label including the derived overdue state.
pub fn display_label(status: InvoiceStatus, due_date: NaiveDate, today: NaiveDate) -> &'static str {
    if is_overdue(status, due_date, today) {
        "Overdue"
    } else {
        status.label()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn parse_request_is_case_insensitive() {
        assert_eq!(InvoiceStatus::parse_request("PAID"), Some(InvoiceStatus::Paid));
        assert_eq!(InvoiceStatus::parse_request("Unpaid"), Some(InvoiceStatus::Unpaid));
    }

    #[test]
    fn parse_request_rejects_legacy_names() {
        assert_eq!(InvoiceStatus::parse_request("draft"), None);
        assert_eq!(InvoiceStatus::parse_request("overdue"), None);
    }

    #[test]
    fn legacy_statuses_map_deterministically() {
        assert_eq!(LegacyStatus::parse("draft").map(LegacyStatus::current), Some(InvoiceStatus::Unpaid));
        assert_eq!(LegacyStatus::parse("sent").map(LegacyStatus::current), Some(InvoiceStatus::Unpaid));
        assert_eq!(LegacyStatus::parse("overdue").map(LegacyStatus::current), Some(InvoiceStatus::Unpaid));
        assert_eq!(LegacyStatus::parse("paid").map(LegacyStatus::current), Some(InvoiceStatus::Paid));
    }

    #[test]
    fn estonian_codes_are_recognised() {
        assert_eq!(LegacyStatus::parse("mustand"), Some(LegacyStatus::Draft));
        assert_eq!(LegacyStatus::parse("Tähtaeg ületatud"), Some(LegacyStatus::Overdue));
        assert_eq!(LegacyStatus::parse("makstud"), Some(LegacyStatus::Paid));
    }

    #[test]
    fn migration_plan_rewrites_non_canonical_values() {
        assert_eq!(plan_status_migration("draft"), StatusMigration::Rewrite(InvoiceStatus::Unpaid));
        assert_eq!(plan_status_migration("sent"), StatusMigration::Rewrite(InvoiceStatus::Unpaid));
        assert_eq!(plan_status_migration("overdue"), StatusMigration::Rewrite(InvoiceStatus::Unpaid));
        assert_eq!(plan_status_migration("maksmata"), StatusMigration::Rewrite(InvoiceStatus::Unpaid));
        assert_eq!(plan_status_migration("makstud"), StatusMigration::Rewrite(InvoiceStatus::Paid));
        assert_eq!(plan_status_migration("PAID"), StatusMigration::Rewrite(InvoiceStatus::Paid));
    }

    #[test]
    fn migration_plan_leaves_canonical_values_alone() {
        assert_eq!(plan_status_migration("paid"), StatusMigration::Unchanged);
        assert_eq!(plan_status_migration("unpaid"), StatusMigration::Unchanged);
    }

    #[test]
    fn migration_plan_flags_unknown_values() {
        assert_eq!(plan_status_migration("cancelled"), StatusMigration::Unrecognised);
    }

    #[test]
    fn migration_plan_is_idempotent() {
        for raw in ["draft", "sent", "overdue", "paid", "makstud", "maksmata"] {
            let rewritten = InvoiceStatus::from_stored(raw).unwrap().as_str();

            assert_eq!(plan_status_migration(rewritten), StatusMigration::Unchanged);
        }
    }

    #[test]
    fn transitions_are_permitted_both_ways() {
        assert_eq!(transition(InvoiceStatus::Unpaid, "PAID"), Ok(InvoiceStatus::Paid));
        assert_eq!(transition(InvoiceStatus::Paid, "UNPAID"), Ok(InvoiceStatus::Unpaid));
        assert_eq!(transition(InvoiceStatus::Paid, "PAID"), Ok(InvoiceStatus::Paid));
    }

    #[test]
    fn transition_to_unknown_status_fails() {
        assert_eq!(
            transition(InvoiceStatus::Unpaid, "overdue"),
            Err(StatusError::InvalidStatus("overdue".to_string()))
        );
    }

    #[test]
    fn overdue_requires_past_due_date_and_unpaid() {
        let today = date(2025, 6, 15);

        assert!(is_overdue(InvoiceStatus::Unpaid, date(2025, 6, 14), today));
        assert!(!is_overdue(InvoiceStatus::Unpaid, date(2025, 6, 15), today));
        assert!(!is_overdue(InvoiceStatus::Paid, date(2025, 6, 1), today));
    }

    #[test]
    fn display_label_reports_derived_overdue() {
        let today = date(2025, 6, 15);

        assert_eq!(display_label(InvoiceStatus::Unpaid, date(2025, 6, 1), today), "Overdue");
        assert_eq!(display_label(InvoiceStatus::Paid, date(2025, 6, 1), today), "Paid");
    }
}
