pub mod admin;
pub mod auth;
pub mod bookings;
pub mod health;
pub mod payments;
pub mod spots;

use chrono::NaiveDateTime;

use crate::errors::AppError;

/// Accepts `YYYY-MM-DD HH:MM:SS` or the short `YYYY-MM-DD HH:MM` form.
pub(crate) fn parse_datetime(field: &str, value: &str) -> Result<NaiveDateTime, AppError> {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M"))
        .map_err(|_| {
            AppError::Validation(format!(
                "invalid {field}: expected YYYY-MM-DD HH:MM[:SS]"
            ))
        })
}
