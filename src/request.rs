//! The single funnel from raw request parts to a validated [`Command`].
//!
//! Every operation passes through here before any SQL is built: query
//! parameters are parsed, the URL-path id is merged over the query filter,
//! the schema validator runs, the bulk-mutation safety guard fires, and the
//! entity's hooks get their say.

use crate::command::{Command, Pagination, Sort};
use crate::config::{EntityConfig, FieldKind, PrimaryKeyPolicy};
use crate::error::AppError;
use crate::filter::Filter;
use crate::hooks::RequestContext;
use crate::registry::EntityContext;
use crate::validate::SchemaValidator;
use serde_json::{Map, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    List,
    ReadOne,
    Create,
    UpdateOne,
    UpdateMany,
    DeleteOne,
    DeleteMany,
}

impl Operation {
    /// Operations that mutate every row the filter matches.
    fn is_bulk_mutation(&self) -> bool {
        matches!(self, Operation::UpdateMany | Operation::DeleteMany)
    }
}

pub struct RequestProcessor;

impl RequestProcessor {
    pub async fn process(
        ctx: &EntityContext,
        operation: Operation,
        path_id: Option<&str>,
        body: Option<Value>,
        request: &RequestContext,
    ) -> Result<Command, AppError> {
        let config = &ctx.config;
        let mut command = Command::default();

        match operation {
            Operation::Create => {
                let data = body.unwrap_or_else(|| Value::Object(Map::new()));
                let data = SchemaValidator::validate_create(config, &data)?;
                command.data = ctx.hooks.pre_insert(data).await?;
            }
            Operation::UpdateOne | Operation::UpdateMany => {
                let data = body.unwrap_or_else(|| Value::Object(Map::new()));
                let data = Value::Object(SchemaValidator::validate_update(config, &data)?);
                command.data = ctx.hooks.pre_update(data).await?;
            }
            _ => {}
        }

        if let Some(text) = request.query.get("filter") {
            let parsed = parse_json_param(text, "filter")?;
            command.filter = Filter::from_value(&parsed)?;
        }
        // Path addressing wins over any identically-named query filter.
        if let Some(id) = path_id {
            command
                .filter
                .set_scalar(&config.primary_key, parse_id(config, id)?);
        }

        if let Some(text) = request.query.get("sort") {
            let parsed = parse_json_param(text, "sort")?;
            command.sort.merge(Sort::from_value(&parsed)?);
        }

        command.pagination = match request.query.get("pagination") {
            Some(text) => {
                let parsed = parse_json_param(text, "pagination")?;
                Some(Pagination::from_value(&parsed)?)
            }
            None => config.default_pagination.map(|d| Pagination {
                page: d.page,
                per_page: d.per_page,
            }),
        };

        if let Some(text) = request.query.get("columns") {
            let columns: Vec<String> = text
                .split(',')
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect();
            if columns.is_empty() {
                return Err(AppError::Validation(
                    "columns must name at least one field".into(),
                ));
            }
            command.columns = Some(columns);
        }

        SchemaValidator::validate_query(
            config,
            &command.filter,
            &command.sort,
            command.columns.as_deref(),
        )?;

        // Refusing "mutate everything by omission" is a safety invariant,
        // not a validation nicety.
        if operation.is_bulk_mutation() && command.filter.is_empty() {
            return Err(AppError::Validation(
                "bulk update/delete requires a non-empty filter".into(),
            ));
        }

        ctx.hooks.pre_query(command, request).await
    }
}

fn parse_json_param(text: &str, name: &str) -> Result<Value, AppError> {
    serde_json::from_str(text)
        .map_err(|_| AppError::Validation(format!("{} must be valid JSON", name)))
}

/// Type the URL-path id by the primary key's rule so it binds correctly.
fn parse_id(config: &EntityConfig, id: &str) -> Result<Value, AppError> {
    let kind = config
        .rule(&config.primary_key)
        .map(|r| r.kind)
        .unwrap_or_default();
    match kind {
        FieldKind::Integer => id
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| AppError::Validation("invalid id".into())),
        _ => {
            if matches!(config.primary_key_policy, PrimaryKeyPolicy::Guid)
                && uuid::Uuid::parse_str(id).is_err()
            {
                return Err(AppError::Validation("invalid id".into()));
            }
            Ok(Value::String(id.to_string()))
        }
    }
}
