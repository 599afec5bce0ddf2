use serde::Serialize;

use crate::errors::AppError;

pub const DEFAULT_LIMIT: i64 = 20;
pub const MAX_LIMIT: i64 = 100;

#[derive(Debug, Clone, Copy)]
pub struct PageParams {
    pub page: i64,
    pub limit: i64,
}

impl PageParams {
    pub fn new(page: Option<i64>, limit: Option<i64>) -> Result<Self, AppError> {
        let page = page.unwrap_or(1);
        let limit = limit.unwrap_or(DEFAULT_LIMIT);
        if page < 1 {
            return Err(AppError::Validation("page must be >= 1".to_string()));
        }
        if limit < 1 || limit > MAX_LIMIT {
            return Err(AppError::Validation(format!(
                "limit must be between 1 and {MAX_LIMIT}"
            )));
        }
        Ok(Self { page, limit })
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.limit
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }

    pub fn parse(s: Option<&str>) -> Result<Self, AppError> {
        match s {
            None => Ok(SortOrder::Desc),
            Some("asc") => Ok(SortOrder::Asc),
            Some("desc") => Ok(SortOrder::Desc),
            Some(other) => Err(AppError::InvalidFilter(format!(
                "invalid sort order: {other}"
            ))),
        }
    }
}

/// Resolves a caller-supplied sort field against a whitelist. Sort fields are
/// interpolated into SQL, so anything outside the whitelist is rejected.
pub fn validate_sort_field<'a>(
    requested: Option<&str>,
    allowed: &[&'a str],
    default: &'a str,
) -> Result<&'a str, AppError> {
    match requested {
        None => Ok(default),
        Some(field) => allowed
            .iter()
            .find(|a| **a == field)
            .copied()
            .ok_or_else(|| AppError::InvalidFilter(format!("invalid sort field: {field}"))),
    }
}

#[derive(Debug, Serialize)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub page: i64,
    pub limit: i64,
    pub total: i64,
}
