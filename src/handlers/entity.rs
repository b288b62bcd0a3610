//! Entity CRUD handlers: list, read, create, update, replace, delete, schema.
//! Routes are parameterized on the entity path segment; every handler
//! resolves the bound entity from the registry, funnels the request through
//! the processor, and hands the command to the CRUD service.

use crate::config::{EntityConfig, FieldRule, PrimaryKeyPolicy};
use crate::error::AppError;
use crate::hooks::RequestContext;
use crate::registry::EntityContext;
use crate::request::{Operation, RequestProcessor};
use crate::response;
use crate::service::CrudService;
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::Method,
    response::IntoResponse,
    Json,
};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

fn entity<'a>(state: &'a AppState, path: &str) -> Result<&'a Arc<EntityContext>, AppError> {
    state
        .registry
        .get(path)
        .ok_or_else(|| AppError::NotFound(path.to_string()))
}

fn request_context(method: Method, path: String, query: HashMap<String, String>) -> RequestContext {
    RequestContext::new(method, path, query)
}

pub async fn list(
    State(state): State<AppState>,
    Path(entity_path): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, AppError> {
    let ctx = entity(&state, &entity_path)?;
    let request = request_context(Method::GET, format!("/{}", entity_path), params);
    let command = RequestProcessor::process(ctx, Operation::List, None, None, &request).await?;
    let (rows, pagination) = CrudService::list(&state.pool, ctx, &command).await?;
    Ok(response::ok_many(rows, pagination))
}

pub async fn read(
    State(state): State<AppState>,
    Path((entity_path, id)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, AppError> {
    let ctx = entity(&state, &entity_path)?;
    let request = request_context(Method::GET, format!("/{}/{}", entity_path, id), params);
    let command =
        RequestProcessor::process(ctx, Operation::ReadOne, Some(&id), None, &request).await?;
    let row = CrudService::read_one(&state.pool, ctx, &command, &id).await?;
    Ok(response::ok_one(row))
}

pub async fn create(
    State(state): State<AppState>,
    Path(entity_path): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    body: Option<Json<Value>>,
) -> Result<impl IntoResponse, AppError> {
    let ctx = entity(&state, &entity_path)?;
    let request = request_context(Method::POST, format!("/{}", entity_path), params);
    let body = body.map(|Json(v)| v);
    let command = RequestProcessor::process(ctx, Operation::Create, None, body, &request).await?;
    let created = CrudService::create(&state.pool, ctx, &command).await?;
    let row_count = created.as_array().map(|rows| rows.len() as u64);
    Ok(response::created(created, row_count))
}

pub async fn update_one(
    State(state): State<AppState>,
    Path((entity_path, id)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
    body: Option<Json<Value>>,
) -> Result<impl IntoResponse, AppError> {
    let ctx = entity(&state, &entity_path)?;
    let request = request_context(Method::PATCH, format!("/{}/{}", entity_path, id), params);
    let body = body.map(|Json(v)| v);
    let command =
        RequestProcessor::process(ctx, Operation::UpdateOne, Some(&id), body, &request).await?;
    let row = CrudService::update_one(&state.pool, ctx, &command, &id).await?;
    Ok(response::ok_one(row))
}

pub async fn update_many(
    State(state): State<AppState>,
    Path(entity_path): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    body: Option<Json<Value>>,
) -> Result<impl IntoResponse, AppError> {
    let ctx = entity(&state, &entity_path)?;
    let request = request_context(Method::PATCH, format!("/{}", entity_path), params);
    let body = body.map(|Json(v)| v);
    let command =
        RequestProcessor::process(ctx, Operation::UpdateMany, None, body, &request).await?;
    let (rows, count) = CrudService::update_many(&state.pool, ctx, &command).await?;
    Ok(response::ok_affected(rows, count))
}

/// Full-record replace is intentionally unsupported.
pub async fn replace(
    Path((_entity_path, _id)): Path<(String, String)>,
) -> AppError {
    AppError::NotImplemented("replace")
}

pub async fn delete_one(
    State(state): State<AppState>,
    Path((entity_path, id)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, AppError> {
    let ctx = entity(&state, &entity_path)?;
    let request = request_context(Method::DELETE, format!("/{}/{}", entity_path, id), params);
    let command =
        RequestProcessor::process(ctx, Operation::DeleteOne, Some(&id), None, &request).await?;
    let row = CrudService::delete_one(&state.pool, ctx, &command, &id).await?;
    Ok(response::ok_one(row))
}

pub async fn delete_many(
    State(state): State<AppState>,
    Path(entity_path): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, AppError> {
    let ctx = entity(&state, &entity_path)?;
    let request = request_context(Method::DELETE, format!("/{}", entity_path), params);
    let command =
        RequestProcessor::process(ctx, Operation::DeleteMany, None, None, &request).await?;
    let (rows, count) = CrudService::delete_many(&state.pool, ctx, &command).await?;
    Ok(response::ok_affected(rows, count))
}

pub async fn schema(
    State(state): State<AppState>,
    Path(entity_path): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let ctx = entity(&state, &entity_path)?;
    Ok(response::ok_one(schema_document(&ctx.config)))
}

/// JSON-Schema-like description of the entity's fields and key policy.
fn schema_document(config: &EntityConfig) -> Value {
    let mut names: Vec<&String> = config.fields.keys().collect();
    names.sort();
    let mut properties = Map::new();
    for name in &names {
        properties.insert((*name).clone(), field_schema(&config.fields[*name]));
    }
    let mut required: Vec<&str> = names
        .iter()
        .filter(|n| config.fields[**n].required)
        .map(|n| n.as_str())
        .collect();
    required.sort();
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "primaryKey": config.primary_key,
        "primaryKeyAuto": matches!(config.primary_key_policy, PrimaryKeyPolicy::Auto),
        "primaryKeyGuid": matches!(config.primary_key_policy, PrimaryKeyPolicy::Guid),
    })
}

fn field_schema(rule: &FieldRule) -> Value {
    let mut prop = Map::new();
    prop.insert("type".to_string(), json!(rule.kind.name()));
    if let Some(n) = rule.min_length {
        prop.insert("minLength".to_string(), json!(n));
    }
    if let Some(n) = rule.max_length {
        prop.insert("maxLength".to_string(), json!(n));
    }
    if let Some(p) = &rule.pattern {
        prop.insert("pattern".to_string(), json!(p));
    }
    if let Some(f) = &rule.format {
        prop.insert("format".to_string(), json!(f));
    }
    if let Some(allowed) = &rule.allowed {
        prop.insert("enum".to_string(), json!(allowed));
    }
    if let Some(n) = rule.minimum {
        prop.insert("minimum".to_string(), json!(n));
    }
    if let Some(n) = rule.maximum {
        prop.insert("maximum".to_string(), json!(n));
    }
    Value::Object(prop)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_document_reports_fields_and_key_policy() {
        let mut fields = HashMap::new();
        fields.insert(
            "session_id".to_string(),
            FieldRule::text().with_format("uuid"),
        );
        fields.insert("ip".to_string(), FieldRule::text().required());
        let config = EntityConfig {
            table: "sessions".into(),
            primary_key: "session_id".into(),
            primary_key_policy: PrimaryKeyPolicy::Guid,
            fields,
            on_create_timestamp: None,
            on_update_timestamp: None,
            upsert: None,
            default_pagination: None,
        };
        let doc = schema_document(&config);
        assert_eq!(doc["type"], "object");
        assert_eq!(doc["properties"]["ip"]["type"], "string");
        assert_eq!(doc["properties"]["session_id"]["format"], "uuid");
        assert_eq!(doc["required"], json!(["ip"]));
        assert_eq!(doc["primaryKey"], "session_id");
        assert_eq!(doc["primaryKeyAuto"], false);
        assert_eq!(doc["primaryKeyGuid"], true);
    }
}
