//! Generic CRUD execution against PostgreSQL.

use crate::command::Command;
use crate::config::{EntityConfig, PrimaryKeyPolicy};
use crate::error::AppError;
use crate::registry::EntityContext;
use crate::response::PageMeta;
use crate::sql::{self, PgBindValue, QueryBuf};
use serde_json::{Map, Value};
use sqlx::PgPool;

pub struct CrudService;

impl CrudService {
    /// List rows matching the command; when paginated, also run the count
    /// query and compute page metadata. A page past the end returns zero
    /// rows, not an error.
    pub async fn list(
        pool: &PgPool,
        ctx: &EntityContext,
        command: &Command,
    ) -> Result<(Vec<Value>, Option<PageMeta>), AppError> {
        let q = sql::select(&ctx.config, command);
        let rows = Self::query_many(pool, &q).await?;
        let rows = ctx.hooks.post_select(rows).await?;
        let pagination = match command.pagination {
            Some(p) => {
                let count_q = sql::select_count(&ctx.config, &command.filter);
                let total = Self::query_count(pool, &count_q).await?;
                Some(PageMeta::new(p, total))
            }
            None => None,
        };
        Ok((rows, pagination))
    }

    /// Fetch the single row the command addresses; zero rows is a not-found.
    pub async fn read_one(
        pool: &PgPool,
        ctx: &EntityContext,
        command: &Command,
        id: &str,
    ) -> Result<Value, AppError> {
        let q = sql::select(&ctx.config, command);
        let rows = Self::query_many(pool, &q).await?;
        let rows = ctx.hooks.post_select(rows).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| AppError::NotFound(id.to_string()))
    }

    /// Insert the command's payload: one row, or each row of an array inside
    /// a single transaction. Returns the created row(s), data-shaped.
    pub async fn create(
        pool: &PgPool,
        ctx: &EntityContext,
        command: &Command,
    ) -> Result<Value, AppError> {
        let config = &ctx.config;
        match &command.data {
            Value::Object(row) => {
                let row = prepare_insert_row(config, row);
                let q = sql::insert(config, &row);
                let created = Self::fetch_optional(pool, &q)
                    .await?
                    .ok_or(AppError::Db(sqlx::Error::RowNotFound))?;
                Ok(created)
            }
            Value::Array(rows) => {
                let mut out = Vec::with_capacity(rows.len());
                let mut tx = pool.begin().await?;
                for row in rows {
                    let Value::Object(map) = row else {
                        return Err(AppError::Validation(
                            "multi-row create rows must be JSON objects".into(),
                        ));
                    };
                    let map = prepare_insert_row(config, map);
                    let q = sql::insert(config, &map);
                    if let Some(created) = Self::fetch_optional_tx(&mut tx, &q).await? {
                        out.push(created);
                    }
                }
                tx.commit().await?;
                Ok(Value::Array(out))
            }
            _ => Err(AppError::Validation(
                "payload must be a JSON object or an array of objects".into(),
            )),
        }
    }

    /// Update the single row the command addresses; zero rows is a not-found.
    pub async fn update_one(
        pool: &PgPool,
        ctx: &EntityContext,
        command: &Command,
        id: &str,
    ) -> Result<Value, AppError> {
        let (mut rows, _) = Self::run_update(pool, ctx, command).await?;
        if rows.is_empty() {
            return Err(AppError::NotFound(id.to_string()));
        }
        Ok(rows.swap_remove(0))
    }

    /// Update every row the filter matches. Zero matched rows is a success
    /// with `row_count` 0 (unlike the single-record endpoint).
    pub async fn update_many(
        pool: &PgPool,
        ctx: &EntityContext,
        command: &Command,
    ) -> Result<(Vec<Value>, u64), AppError> {
        Self::run_update(pool, ctx, command).await
    }

    /// Delete the single row the command addresses; zero rows is a not-found.
    pub async fn delete_one(
        pool: &PgPool,
        ctx: &EntityContext,
        command: &Command,
        id: &str,
    ) -> Result<Value, AppError> {
        let q = sql::delete(&ctx.config, &command.filter);
        let mut rows = Self::query_many(pool, &q).await?;
        if rows.is_empty() {
            return Err(AppError::NotFound(id.to_string()));
        }
        Ok(rows.swap_remove(0))
    }

    /// Delete every row the filter matches, returning them with the count.
    pub async fn delete_many(
        pool: &PgPool,
        ctx: &EntityContext,
        command: &Command,
    ) -> Result<(Vec<Value>, u64), AppError> {
        let q = sql::delete(&ctx.config, &command.filter);
        let rows = Self::query_many(pool, &q).await?;
        let count = rows.len() as u64;
        Ok((rows, count))
    }

    async fn run_update(
        pool: &PgPool,
        ctx: &EntityContext,
        command: &Command,
    ) -> Result<(Vec<Value>, u64), AppError> {
        let Value::Object(data) = &command.data else {
            return Err(AppError::Validation("payload must be a JSON object".into()));
        };
        let q = sql::update(&ctx.config, &command.filter, data);
        let rows = Self::query_many(pool, &q).await?;
        let count = rows.len() as u64;
        Ok((rows, count))
    }

    async fn query_many(pool: &PgPool, q: &QueryBuf) -> Result<Vec<Value>, AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(PgBindValue::from(p));
        }
        let rows = query.fetch_all(pool).await?;
        Ok(rows.iter().map(row_to_json).collect())
    }

    async fn query_count(pool: &PgPool, q: &QueryBuf) -> Result<u64, AppError> {
        use sqlx::Row;
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(PgBindValue::from(p));
        }
        let row = query.fetch_one(pool).await?;
        let total: i64 = row.try_get("total")?;
        Ok(total as u64)
    }

    async fn fetch_optional(pool: &PgPool, q: &QueryBuf) -> Result<Option<Value>, AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(PgBindValue::from(p));
        }
        let row = query.fetch_optional(pool).await?;
        Ok(row.as_ref().map(row_to_json))
    }

    async fn fetch_optional_tx(
        tx: &mut sqlx::PgConnection,
        q: &QueryBuf,
    ) -> Result<Option<Value>, AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query (tx)");
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(PgBindValue::from(p));
        }
        let row = query.fetch_optional(&mut *tx).await?;
        Ok(row.as_ref().map(row_to_json))
    }
}

/// Generate the server-side primary key for guid entities; the validator has
/// already rejected caller-supplied keys, so the slot is free.
fn prepare_insert_row(config: &EntityConfig, row: &Map<String, Value>) -> Map<String, Value> {
    let mut out = Map::with_capacity(row.len() + 1);
    if matches!(config.primary_key_policy, PrimaryKeyPolicy::Guid) {
        out.insert(
            config.primary_key.clone(),
            Value::String(uuid::Uuid::new_v4().to_string()),
        );
    }
    for (key, value) in row {
        out.insert(key.clone(), value.clone());
    }
    out
}

fn row_to_json(row: &sqlx::postgres::PgRow) -> Value {
    use sqlx::Column;
    use sqlx::Row;
    let mut map = Map::new();
    for col in row.columns() {
        let name = col.name();
        map.insert(name.to_string(), cell_to_value(row, name));
    }
    Value::Object(map)
}

/// Decode a cell into JSON by probing concrete types; falls back to Null for
/// anything unrepresentable.
fn cell_to_value(row: &sqlx::postgres::PgRow, name: &str) -> Value {
    use sqlx::Row;
    if let Ok(Some(n)) = row.try_get::<Option<i16>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i32>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i64>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<f32>, _>(name) {
        if let Some(n) = serde_json::Number::from_f64(n as f64) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(n)) = row.try_get::<Option<f64>, _>(name) {
        if let Some(n) = serde_json::Number::from_f64(n) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(b)) = row.try_get::<Option<bool>, _>(name) {
        return Value::Bool(b);
    }
    if let Ok(Some(u)) = row.try_get::<Option<uuid::Uuid>, _>(name) {
        return Value::String(u.to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(name) {
        return Value::String(d.to_rfc3339());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDateTime>, _>(name) {
        return Value::String(d.format("%Y-%m-%dT%H:%M:%S%.f").to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDate>, _>(name) {
        return Value::String(d.format("%Y-%m-%d").to_string());
    }
    if let Ok(Some(s)) = row.try_get::<Option<String>, _>(name) {
        return Value::String(s);
    }
    if let Ok(Some(j)) = row.try_get::<Option<Value>, _>(name) {
        return j;
    }
    Value::Null
}
