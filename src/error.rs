//! Typed errors and HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("entity '{table}': field schema must not be empty")]
    EmptyFieldSchema { table: String },
    #[error("entity '{table}': {context} references unknown field '{field}'")]
    UnknownField {
        table: String,
        context: &'static str,
        field: String,
    },
    #[error("entity '{table}': timestamp column '{column}' collides with a declared field")]
    TimestampCollision { table: String, column: String },
    #[error("entity '{table}': upsert policy requires at least one conflict field")]
    EmptyConflictFields { table: String },
    #[error("entity '{table}': pagination defaults must be positive")]
    InvalidPaginationDefaults { table: String },
    #[error("duplicate entity path '{0}'")]
    DuplicateEntity(String),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("{0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("{0} is not implemented")]
    NotImplemented(&'static str),
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
}

/// Error half of the response envelope.
#[derive(Clone, Debug, Serialize)]
pub struct ErrorDetail {
    pub name: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// SQLSTATE codes reported to clients as a conflict (unique and not-null
/// violations). Matched on machine-readable codes only, never message text.
const CONFLICT_CODES: [&str; 2] = ["23505", "23502"];

pub fn is_conflict_code(code: &str) -> bool {
    CONFLICT_CODES.contains(&code)
}

/// SQLSTATE of a database-reported error, if any.
pub fn db_error_code(e: &sqlx::Error) -> Option<String> {
    e.as_database_error()
        .and_then(|d| d.code())
        .map(|c| c.into_owned())
}

impl AppError {
    /// Status code plus envelope error detail. Driver message text never
    /// reaches the client; DB errors carry only `{name, code}`.
    pub fn classify(&self) -> (StatusCode, ErrorDetail) {
        match self {
            AppError::Validation(message) => (
                StatusCode::BAD_REQUEST,
                ErrorDetail {
                    name: "ValidationError",
                    message: Some(message.clone()),
                    code: None,
                },
            ),
            AppError::NotFound(what) => (
                StatusCode::NOT_FOUND,
                ErrorDetail {
                    name: "NotFoundError",
                    message: Some(format!("not found: {}", what)),
                    code: None,
                },
            ),
            AppError::NotImplemented(op) => (
                StatusCode::NOT_IMPLEMENTED,
                ErrorDetail {
                    name: "NotImplementedError",
                    message: Some(format!("{} is not implemented", op)),
                    code: None,
                },
            ),
            AppError::Config(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail {
                    name: "ConfigurationError",
                    message: Some(e.to_string()),
                    code: None,
                },
            ),
            AppError::Db(e) => {
                let code = db_error_code(e);
                let status = match &code {
                    Some(c) if is_conflict_code(c) => StatusCode::BAD_REQUEST,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (
                    status,
                    ErrorDetail {
                        name: "DatabaseError",
                        message: None,
                        code,
                    },
                )
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, detail) = self.classify();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else if matches!(self, AppError::Db(_)) {
            tracing::warn!(error = %self, "constraint violation");
        }
        let body = crate::response::Envelope::error(detail);
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_codes_cover_unique_and_not_null() {
        assert!(is_conflict_code("23505"));
        assert!(is_conflict_code("23502"));
        assert!(!is_conflict_code("23503"));
        assert!(!is_conflict_code("42P01"));
    }

    #[test]
    fn validation_maps_to_400_with_name() {
        let (status, detail) = AppError::Validation("ip must be a string".into()).classify();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(detail.name, "ValidationError");
        assert_eq!(detail.message.as_deref(), Some("ip must be a string"));
    }

    #[test]
    fn not_implemented_maps_to_501() {
        let (status, detail) = AppError::NotImplemented("replace").classify();
        assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
        assert_eq!(detail.name, "NotImplementedError");
    }

    #[test]
    fn config_maps_to_500() {
        let err = AppError::Config(ConfigError::EmptyFieldSchema {
            table: "sessions".into(),
        });
        let (status, detail) = err.classify();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(detail.name, "ConfigurationError");
    }

    #[test]
    fn plain_db_error_maps_to_500_without_message() {
        let (status, detail) = AppError::Db(sqlx::Error::PoolClosed).classify();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(detail.name, "DatabaseError");
        assert!(detail.message.is_none());
    }
}
