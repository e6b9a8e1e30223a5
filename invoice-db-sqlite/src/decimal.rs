//! Money columns are TEXT. Rows written by older tools may hold INTEGER
//! amounts, which decode exactly; REAL never does.

use std::str::FromStr;

use invoice_core::RepositoryError;
use invoice_core::calculations::common::to_money;
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, TypeInfo, ValueRef};

fn column_error(column: &str, detail: impl std::fmt::Display) -> RepositoryError {
    RepositoryError::Database(format!("column '{column}': {detail}"))
}

/// Reads a non-null amount stored as TEXT or INTEGER.
pub fn get_decimal(row: &SqliteRow, column: &str) -> Result<Decimal, RepositoryError> {
    let raw = row
        .try_get_raw(column)
        .map_err(|e| column_error(column, format_args!("not found ({e})")))?;
    if raw.is_null() {
        return Err(column_error(column, "unexpected NULL"));
    }

    let type_name = raw.type_info().name().to_string();
    match type_name.as_str() {
        "TEXT" => {
            let text: String = row.try_get(column).map_err(|e| column_error(column, e))?;
            Decimal::from_str(text.trim())
                .map_err(|e| column_error(column, format_args!("invalid decimal '{text}': {e}")))
        }
        "INTEGER" => row
            .try_get::<i64, _>(column)
            .map(Decimal::from)
            .map_err(|e| column_error(column, e)),
        other => Err(column_error(column, format_args!("{other} cannot hold an exact amount"))),
    }
}

/// Like [`get_decimal`], with NULL read as `None`.
pub fn get_optional_decimal(row: &SqliteRow, column: &str) -> Result<Option<Decimal>, RepositoryError> {
    let raw = row
        .try_get_raw(column)
        .map_err(|e| column_error(column, format_args!("not found ({e})")))?;
    if raw.is_null() {
        return Ok(None);
    }
    get_decimal(row, column).map(Some)
}

/// Canonical two-digit TEXT form for storage (`8` -> `"8.00"`).
pub fn decimal_to_text(d: Decimal) -> String {
    to_money(d).to_string()
}
