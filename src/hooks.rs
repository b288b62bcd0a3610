//! Lifecycle hooks: fixed extension points in the request pipeline.
//!
//! Hooks are a strategy object supplied per entity at binding time. Every
//! method is an identity transform by default; each must return a value of
//! the same shape it received (object in, object out; array in, array out).

use crate::command::Command;
use crate::error::AppError;
use async_trait::async_trait;
use axum::http::Method;
use serde_json::Value;
use std::collections::HashMap;

/// Read-only view of the inbound request, handed to `pre_query` so overrides
/// can scope commands by request attributes (e.g. a tenant path segment).
#[derive(Clone, Debug)]
pub struct RequestContext {
    pub method: Method,
    pub path: String,
    pub query: HashMap<String, String>,
}

impl RequestContext {
    pub fn new(method: Method, path: impl Into<String>, query: HashMap<String, String>) -> Self {
        RequestContext {
            method,
            path: path.into(),
            query,
        }
    }
}

#[async_trait]
pub trait Hooks: Send + Sync {
    /// Transform the validated create payload before the INSERT is built.
    async fn pre_insert(&self, data: Value) -> Result<Value, AppError> {
        Ok(data)
    }

    /// Transform the validated update payload before the UPDATE is built.
    async fn pre_update(&self, data: Value) -> Result<Value, AppError> {
        Ok(data)
    }

    /// Rewrite the assembled command before any SQL is built.
    async fn pre_query(
        &self,
        command: Command,
        request: &RequestContext,
    ) -> Result<Command, AppError> {
        let _ = request;
        Ok(command)
    }

    /// Transform rows fetched by list/read before they are returned.
    async fn post_select(&self, rows: Vec<Value>) -> Result<Vec<Value>, AppError> {
        Ok(rows)
    }
}

/// Hooks used when an entity declares none.
pub struct IdentityHooks;

#[async_trait]
impl Hooks for IdentityHooks {}
