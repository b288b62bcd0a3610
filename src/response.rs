//! Standard response envelope: `{error, data, rowCount?, pagination?}`.

use crate::command::Pagination;
use crate::error::ErrorDetail;
use axum::{http::StatusCode, Json};
use serde::Serialize;
use serde_json::Value;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub error: Option<ErrorDetail>,
    pub data: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<PageMeta>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    pub page: u32,
    pub per_page: u32,
    pub total_rows: u64,
    pub page_count: u64,
}

impl PageMeta {
    pub fn new(pagination: Pagination, total_rows: u64) -> Self {
        PageMeta {
            page: pagination.page,
            per_page: pagination.per_page,
            total_rows,
            page_count: total_rows.div_ceil(pagination.per_page as u64),
        }
    }
}

impl Envelope {
    pub fn error(detail: ErrorDetail) -> Self {
        Envelope {
            error: Some(detail),
            data: Value::Null,
            row_count: None,
            pagination: None,
        }
    }
}

pub fn ok_one(data: Value) -> (StatusCode, Json<Envelope>) {
    (
        StatusCode::OK,
        Json(Envelope {
            error: None,
            data,
            row_count: None,
            pagination: None,
        }),
    )
}

pub fn created(data: Value, row_count: Option<u64>) -> (StatusCode, Json<Envelope>) {
    (
        StatusCode::CREATED,
        Json(Envelope {
            error: None,
            data,
            row_count,
            pagination: None,
        }),
    )
}

pub fn ok_many(rows: Vec<Value>, pagination: Option<PageMeta>) -> (StatusCode, Json<Envelope>) {
    let row_count = rows.len() as u64;
    (
        StatusCode::OK,
        Json(Envelope {
            error: None,
            data: Value::Array(rows),
            row_count: Some(row_count),
            pagination,
        }),
    )
}

/// For bulk mutations: rows plus the affected count reported by the statement.
pub fn ok_affected(rows: Vec<Value>, row_count: u64) -> (StatusCode, Json<Envelope>) {
    (
        StatusCode::OK,
        Json(Envelope {
            error: None,
            data: Value::Array(rows),
            row_count: Some(row_count),
            pagination: None,
        }),
    )
}
