//! The per-request command: filter, sort, pagination, projection, payload.
//! Built by the request processor, consumed by the SQL builder; never persisted.

use crate::error::AppError;
use crate::filter::Filter;
use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

/// Ordered sort keys. Insertion order is preserved into ORDER BY.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Sort {
    pub keys: Vec<(String, SortDirection)>,
}

impl Sort {
    /// Parse `{"field": 1 | -1 | "asc" | "desc", ...}`.
    pub fn from_value(v: &Value) -> Result<Sort, AppError> {
        let Value::Object(map) = v else {
            return Err(AppError::Validation("sort must be a JSON object".into()));
        };
        let mut keys = Vec::with_capacity(map.len());
        for (field, direction) in map {
            let dir = match direction {
                Value::Number(n) if n.as_i64() == Some(1) => SortDirection::Asc,
                Value::Number(n) if n.as_i64() == Some(-1) => SortDirection::Desc,
                Value::String(s) if s.eq_ignore_ascii_case("asc") => SortDirection::Asc,
                Value::String(s) if s.eq_ignore_ascii_case("desc") => SortDirection::Desc,
                _ => {
                    return Err(AppError::Validation(format!(
                        "sort direction for '{}' must be 1, -1, \"asc\" or \"desc\"",
                        field
                    )))
                }
            };
            keys.push((field.clone(), dir));
        }
        Ok(Sort { keys })
    }

    /// Structural union: keys already present keep their direction.
    pub fn merge(&mut self, other: Sort) {
        for (field, dir) in other.keys {
            if !self.keys.iter().any(|(existing, _)| *existing == field) {
                self.keys.push((field, dir));
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub per_page: u32,
}

pub const DEFAULT_PER_PAGE: u32 = 100;

const PAGINATION_MESSAGE: &str = "pagination must contain positive integers page and perPage";

impl Pagination {
    /// Parse `{"page": n, "perPage": m}`; `perPage` defaults to 100.
    pub fn from_value(v: &Value) -> Result<Pagination, AppError> {
        let Value::Object(map) = v else {
            return Err(AppError::Validation(PAGINATION_MESSAGE.into()));
        };
        let page = positive_u32(map.get("page"))?;
        let per_page = match map.get("perPage") {
            None => DEFAULT_PER_PAGE,
            some => positive_u32(some)?,
        };
        Ok(Pagination { page, per_page })
    }

    pub fn offset(&self) -> u64 {
        (self.page as u64 - 1) * self.per_page as u64
    }
}

fn positive_u32(v: Option<&Value>) -> Result<u32, AppError> {
    v.and_then(Value::as_u64)
        .filter(|n| *n >= 1 && *n <= u32::MAX as u64)
        .map(|n| n as u32)
        .ok_or_else(|| AppError::Validation(PAGINATION_MESSAGE.into()))
}

/// Normalized, validated request payload handed to the query builder.
#[derive(Clone, Debug, Default)]
pub struct Command {
    pub filter: Filter,
    pub sort: Sort,
    /// `None` means unbounded: no LIMIT/OFFSET is emitted.
    pub pagination: Option<Pagination>,
    /// Explicit projection; `None` means all fields.
    pub columns: Option<Vec<String>>,
    /// Create/update payload (object, or array of objects for multi-row
    /// create); `Null` for read-only operations.
    pub data: Value,
}
