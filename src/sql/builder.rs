//! Builds parameterized SELECT, COUNT, INSERT, UPDATE, DELETE statements from
//! an entity config and a validated command.
//!
//! Identifiers are always quote-escaped; values only ever travel as bound
//! parameters. Parameter numbering is a single running counter across the
//! whole statement (filter params first, then data params), so indexes never
//! collide between clauses.

use crate::command::{Command, Sort, SortDirection};
use crate::config::EntityConfig;
use crate::filter::{FieldRef, Filter, FilterOp, FilterValue};
use serde_json::{Map, Value};

/// Quote identifier for PostgreSQL (safe: embedded quotes are doubled).
fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// Quote a string literal (for JSON path segments).
fn literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Rendered left-hand side of a comparison: column, or JSON extraction.
fn field_expr(field: &FieldRef) -> String {
    match &field.json_path {
        Some(path) => format!("{}->>{}", quoted(&field.column), literal(path)),
        None => quoted(&field.column),
    }
}

/// `::type` suffix for a column's placeholders, from the field rule's cast.
/// JSON-path comparisons are textual and never cast.
fn cast_suffix(config: &EntityConfig, field: &FieldRef) -> String {
    if field.json_path.is_some() {
        return String::new();
    }
    column_cast(config, &field.column)
}

fn column_cast(config: &EntityConfig, column: &str) -> String {
    config
        .rule(column)
        .and_then(|r| r.cast.as_deref())
        .map(|t| format!("::{}", t))
        .unwrap_or_default()
}

/// Unsatisfiable predicate for empty IN lists: zero rows, not a SQL error.
const MATCH_NOTHING: &str = "0 = 1";

pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Value>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    fn push_param(&mut self, v: Value) -> usize {
        self.params.push(v);
        self.params.len()
    }

    fn placeholder(&mut self, v: Value, cast: &str) -> String {
        let n = self.push_param(v);
        format!("${}{}", n, cast)
    }
}

/// WHERE condition for a whole filter, or None when the filter is empty.
/// Clauses are conjoined in insertion order; a top-level `$or` group renders
/// as one parenthesized disjunction of its sub-filters.
fn filter_condition(q: &mut QueryBuf, config: &EntityConfig, filter: &Filter) -> Option<String> {
    let mut parts = Vec::with_capacity(filter.clauses.len() + 1);
    for (field, value) in &filter.clauses {
        parts.push(clause_condition(q, config, field, value));
    }
    if !filter.any_of.is_empty() {
        let alternatives: Vec<String> = filter
            .any_of
            .iter()
            .map(|group| {
                let condition =
                    filter_condition(q, config, group).unwrap_or_else(|| MATCH_NOTHING.into());
                format!("({})", condition)
            })
            .collect();
        parts.push(format!("({})", alternatives.join(" OR ")));
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" AND "))
    }
}

fn clause_condition(
    q: &mut QueryBuf,
    config: &EntityConfig,
    field: &FieldRef,
    value: &FilterValue,
) -> String {
    let expr = field_expr(field);
    let cast = cast_suffix(config, field);
    match value {
        FilterValue::Null => format!("{} IS NULL", expr),
        FilterValue::Eq(v) => {
            let ph = q.placeholder(v.clone(), &cast);
            format!("{} = {}", expr, ph)
        }
        FilterValue::In(items) => in_condition(q, &expr, &cast, items),
        FilterValue::Ops(ops) => {
            let conditions: Vec<String> = ops
                .iter()
                .map(|op| op_condition(q, &expr, &cast, op))
                .collect();
            if conditions.len() == 1 {
                conditions.into_iter().next().unwrap()
            } else {
                format!("({})", conditions.join(" AND "))
            }
        }
        FilterValue::AnyOf(alternatives) => {
            let conditions: Vec<String> = alternatives
                .iter()
                .map(|alt| clause_condition(q, config, field, alt))
                .collect();
            format!("({})", conditions.join(" OR "))
        }
    }
}

fn op_condition(q: &mut QueryBuf, expr: &str, cast: &str, op: &FilterOp) -> String {
    let compare = |q: &mut QueryBuf, sym: &str, v: &Value| {
        let ph = q.placeholder(v.clone(), cast);
        format!("{} {} {}", expr, sym, ph)
    };
    match op {
        FilterOp::Eq(v) => compare(q, "=", v),
        FilterOp::Ne(v) => compare(q, "<>", v),
        FilterOp::Gt(v) => compare(q, ">", v),
        FilterOp::Gte(v) => compare(q, ">=", v),
        FilterOp::Lt(v) => compare(q, "<", v),
        FilterOp::Lte(v) => compare(q, "<=", v),
        FilterOp::In(items) => in_condition(q, expr, cast, items),
        FilterOp::Like(fragment) => {
            let ph = q.placeholder(Value::String(format!("%{}%", fragment)), "");
            format!("{} LIKE {}", expr, ph)
        }
        FilterOp::ILike(fragment) => {
            let ph = q.placeholder(Value::String(format!("%{}%", fragment)), "");
            format!("{} ILIKE {}", expr, ph)
        }
    }
}

fn in_condition(q: &mut QueryBuf, expr: &str, cast: &str, items: &[Value]) -> String {
    if items.is_empty() {
        return MATCH_NOTHING.to_string();
    }
    let placeholders: Vec<String> = items
        .iter()
        .map(|v| q.placeholder(v.clone(), cast))
        .collect();
    format!("{} IN ({})", expr, placeholders.join(", "))
}

fn where_clause(q: &mut QueryBuf, config: &EntityConfig, filter: &Filter) -> String {
    filter_condition(q, config, filter)
        .map(|c| format!(" WHERE {}", c))
        .unwrap_or_default()
}

fn order_clause(sort: &Sort) -> String {
    if sort.is_empty() {
        return String::new();
    }
    let keys: Vec<String> = sort
        .keys
        .iter()
        .map(|(field, direction)| {
            let dir = match direction {
                SortDirection::Asc => "ASC",
                SortDirection::Desc => "DESC",
            };
            format!("{} {}", quoted(field), dir)
        })
        .collect();
    format!(" ORDER BY {}", keys.join(", "))
}

/// SELECT with filter, sort, and pagination. No pagination means no
/// LIMIT/OFFSET: the whole result set is returned.
pub fn select(config: &EntityConfig, command: &Command) -> QueryBuf {
    let mut q = QueryBuf::new();
    let columns = match &command.columns {
        Some(cols) => cols.iter().map(|c| quoted(c)).collect::<Vec<_>>().join(", "),
        None => "*".to_string(),
    };
    let where_ = where_clause(&mut q, config, &command.filter);
    let order = order_clause(&command.sort);
    let limit = command
        .pagination
        .map(|p| format!(" LIMIT {} OFFSET {}", p.per_page, p.offset()))
        .unwrap_or_default();
    q.sql = format!(
        "SELECT {} FROM {}{}{}{}",
        columns,
        quoted(&config.table),
        where_,
        order,
        limit
    );
    q
}

/// Same WHERE as `select`, projected to a single aggregate count. Used to
/// compute pagination metadata.
pub fn select_count(config: &EntityConfig, filter: &Filter) -> QueryBuf {
    let mut q = QueryBuf::new();
    let where_ = where_clause(&mut q, config, filter);
    q.sql = format!(
        "SELECT COUNT(*) AS total FROM {}{}",
        quoted(&config.table),
        where_
    );
    q
}

/// INSERT one row: columns and placeholders from the data object in key
/// order. The create-timestamp column is appended as NOW(); the upsert
/// policy, when configured, appends the conflict clause.
pub fn insert(config: &EntityConfig, row: &Map<String, Value>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = quoted(&config.table);
    let mut columns = Vec::with_capacity(row.len() + 1);
    let mut values = Vec::with_capacity(row.len() + 1);
    for (key, value) in row {
        let cast = column_cast(config, key);
        let ph = q.placeholder(value.clone(), &cast);
        columns.push(quoted(key));
        values.push(ph);
    }
    if let Some(column) = &config.on_create_timestamp {
        columns.push(quoted(column));
        values.push("NOW()".to_string());
    }
    if columns.is_empty() {
        q.sql = format!("INSERT INTO {} DEFAULT VALUES RETURNING *", table);
        return q;
    }
    let mut sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table,
        columns.join(", "),
        values.join(", ")
    );
    if let Some(upsert) = &config.upsert {
        let conflict: Vec<String> = upsert.conflict_fields.iter().map(|f| quoted(f)).collect();
        let updates: Vec<String> = upsert
            .update_fields
            .iter()
            .map(|f| format!("{} = EXCLUDED.{}", quoted(f), quoted(f)))
            .collect();
        sql.push_str(&format!(
            " ON CONFLICT ({}) DO UPDATE SET {}",
            conflict.join(", "),
            updates.join(", ")
        ));
    }
    sql.push_str(" RETURNING *");
    q.sql = sql;
    q
}

/// UPDATE matching the filter. Filter params are numbered first; SET params
/// continue the same counter. An empty filter updates every row -- the
/// request processor refuses that for bulk endpoints before this is reached.
pub fn update(config: &EntityConfig, filter: &Filter, data: &Map<String, Value>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let where_ = where_clause(&mut q, config, filter);
    let mut sets = Vec::with_capacity(data.len() + 1);
    for (key, value) in data {
        let cast = column_cast(config, key);
        let ph = q.placeholder(value.clone(), &cast);
        sets.push(format!("{} = {}", quoted(key), ph));
    }
    if let Some(column) = &config.on_update_timestamp {
        sets.push(format!("{} = NOW()", quoted(column)));
    }
    q.sql = format!(
        "UPDATE {} SET {}{} RETURNING *",
        quoted(&config.table),
        sets.join(", "),
        where_
    );
    q
}

/// DELETE matching the filter, returning removed rows.
pub fn delete(config: &EntityConfig, filter: &Filter) -> QueryBuf {
    let mut q = QueryBuf::new();
    let where_ = where_clause(&mut q, config, filter);
    q.sql = format!(
        "DELETE FROM {}{} RETURNING *",
        quoted(&config.table),
        where_
    );
    q
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Pagination;
    use crate::config::{FieldRule, PrimaryKeyPolicy, UpsertPolicy};
    use serde_json::json;
    use std::collections::HashMap;

    fn config() -> EntityConfig {
        let mut fields = HashMap::new();
        fields.insert(
            "session_id".to_string(),
            FieldRule::text().with_format("uuid").with_cast("uuid"),
        );
        fields.insert("ip".to_string(), FieldRule::text());
        fields.insert("session_data".to_string(), FieldRule::text());
        fields.insert("hits".to_string(), FieldRule::integer());
        EntityConfig {
            table: "sessions".into(),
            primary_key: "session_id".into(),
            primary_key_policy: PrimaryKeyPolicy::Guid,
            fields,
            on_create_timestamp: None,
            on_update_timestamp: None,
            upsert: None,
            default_pagination: None,
        }
    }

    fn filter(v: serde_json::Value) -> Filter {
        Filter::from_value(&v).unwrap()
    }

    fn select_cmd(f: serde_json::Value) -> Command {
        Command {
            filter: filter(f),
            ..Default::default()
        }
    }

    #[test]
    fn select_all_without_filter() {
        let q = select(&config(), &Command::default());
        assert_eq!(q.sql, "SELECT * FROM \"sessions\"");
        assert!(q.params.is_empty());
    }

    #[test]
    fn scalar_null_and_array_clauses() {
        let q = select(
            &config(),
            &select_cmd(json!({"ip": "127.0.0.1", "session_data": null, "hits": [1, 2]})),
        );
        assert_eq!(
            q.sql,
            "SELECT * FROM \"sessions\" WHERE \"ip\" = $1 AND \"session_data\" IS NULL \
             AND \"hits\" IN ($2, $3)"
        );
        assert_eq!(q.params, vec![json!("127.0.0.1"), json!(1), json!(2)]);
    }

    #[test]
    fn param_count_equals_scalar_leaves() {
        // Property: for scalar/null/array-only filters, one param per leaf.
        let q = select(
            &config(),
            &select_cmd(json!({"a": 1, "b": null, "c": [10, 20, 30], "d": "x"})),
        );
        assert_eq!(q.params.len(), 5);
    }

    #[test]
    fn empty_array_is_unsatisfiable_not_an_error() {
        let q = select(&config(), &select_cmd(json!({"session_id": []})));
        assert_eq!(q.sql, "SELECT * FROM \"sessions\" WHERE 0 = 1");
        assert!(q.params.is_empty());
    }

    #[test]
    fn operator_comparisons_conjoin() {
        let q = select(&config(), &select_cmd(json!({"hits": {"$gt": 1, "$lte": 9}})));
        assert_eq!(
            q.sql,
            "SELECT * FROM \"sessions\" WHERE (\"hits\" > $1 AND \"hits\" <= $2)"
        );
        let q = select(&config(), &select_cmd(json!({"hits": {"$gt": 1}})));
        assert_eq!(q.sql, "SELECT * FROM \"sessions\" WHERE \"hits\" > $1");
    }

    #[test]
    fn ilike_binds_wrapped_fragment() {
        let q = select(&config(), &select_cmd(json!({"ip": {"$ilike": "127."}})));
        assert_eq!(q.sql, "SELECT * FROM \"sessions\" WHERE \"ip\" ILIKE $1");
        assert_eq!(q.params, vec![json!("%127.%")]);
    }

    #[test]
    fn field_level_or() {
        let q = select(
            &config(),
            &select_cmd(json!({"ip": {"$or": ["a", "b", null]}})),
        );
        assert_eq!(
            q.sql,
            "SELECT * FROM \"sessions\" WHERE (\"ip\" = $1 OR \"ip\" = $2 OR \"ip\" IS NULL)"
        );
    }

    #[test]
    fn top_level_or_groups() {
        let q = select(
            &config(),
            &select_cmd(json!({"hits": 5, "$or": [{"ip": "a"}, {"ip": "b", "hits": 6}]})),
        );
        assert_eq!(
            q.sql,
            "SELECT * FROM \"sessions\" WHERE \"hits\" = $1 AND \
             ((\"ip\" = $2) OR (\"ip\" = $3 AND \"hits\" = $4))"
        );
        assert_eq!(q.params.len(), 4);
    }

    #[test]
    fn json_path_extraction() {
        let q = select(
            &config(),
            &select_cmd(json!({"session_data->>username": "bob"})),
        );
        assert_eq!(
            q.sql,
            "SELECT * FROM \"sessions\" WHERE \"session_data\"->>'username' = $1"
        );
    }

    #[test]
    fn cast_applies_to_declared_columns_only() {
        let q = select(&config(), &select_cmd(json!({"session_id": "abc", "ip": "x"})));
        assert_eq!(
            q.sql,
            "SELECT * FROM \"sessions\" WHERE \"session_id\" = $1::uuid AND \"ip\" = $2"
        );
    }

    #[test]
    fn projection_sort_and_pagination() {
        let mut command = select_cmd(json!({}));
        command.columns = Some(vec!["ip".into(), "hits".into()]);
        command.sort = crate::command::Sort::from_value(&json!({"hits": -1, "ip": 1})).unwrap();
        command.pagination = Some(Pagination { page: 3, per_page: 25 });
        let q = select(&config(), &command);
        assert_eq!(
            q.sql,
            "SELECT \"ip\", \"hits\" FROM \"sessions\" ORDER BY \"hits\" DESC, \"ip\" ASC \
             LIMIT 25 OFFSET 50"
        );
    }

    #[test]
    fn count_shares_the_where_clause() {
        let q = select_count(&config(), &filter(json!({"ip": "a"})));
        assert_eq!(
            q.sql,
            "SELECT COUNT(*) AS total FROM \"sessions\" WHERE \"ip\" = $1"
        );
    }

    #[test]
    fn insert_from_row_keys_in_order() {
        let row = match json!({"session_id": "id-1", "ip": "127.0.0.1"}) {
            serde_json::Value::Object(m) => m,
            _ => unreachable!(),
        };
        let q = insert(&config(), &row);
        assert_eq!(
            q.sql,
            "INSERT INTO \"sessions\" (\"session_id\", \"ip\") VALUES ($1::uuid, $2) RETURNING *"
        );
        assert_eq!(q.params.len(), 2);
    }

    #[test]
    fn insert_appends_create_timestamp() {
        let mut c = config();
        c.on_create_timestamp = Some("created_at".into());
        let row = match json!({"ip": "a"}) {
            serde_json::Value::Object(m) => m,
            _ => unreachable!(),
        };
        let q = insert(&c, &row);
        assert_eq!(
            q.sql,
            "INSERT INTO \"sessions\" (\"ip\", \"created_at\") VALUES ($1, NOW()) RETURNING *"
        );
    }

    #[test]
    fn insert_with_upsert_policy() {
        let mut c = config();
        c.upsert = Some(UpsertPolicy {
            conflict_fields: vec!["ip".into()],
            update_fields: vec!["session_data".into(), "hits".into()],
        });
        let row = match json!({"ip": "a", "session_data": "{}"}) {
            serde_json::Value::Object(m) => m,
            _ => unreachable!(),
        };
        let q = insert(&c, &row);
        assert_eq!(
            q.sql,
            "INSERT INTO \"sessions\" (\"ip\", \"session_data\") VALUES ($1, $2) \
             ON CONFLICT (\"ip\") DO UPDATE SET \"session_data\" = EXCLUDED.\"session_data\", \
             \"hits\" = EXCLUDED.\"hits\" RETURNING *"
        );
    }

    #[test]
    fn insert_empty_row_uses_default_values() {
        let q = insert(&config(), &Map::new());
        assert_eq!(q.sql, "INSERT INTO \"sessions\" DEFAULT VALUES RETURNING *");
    }

    #[test]
    fn update_numbers_filter_params_before_data() {
        let data = match json!({"ip": "10.0.0.1", "hits": 2}) {
            serde_json::Value::Object(m) => m,
            _ => unreachable!(),
        };
        let q = update(&config(), &filter(json!({"session_id": "id-1"})), &data);
        assert_eq!(
            q.sql,
            "UPDATE \"sessions\" SET \"ip\" = $2, \"hits\" = $3 \
             WHERE \"session_id\" = $1::uuid RETURNING *"
        );
        assert_eq!(q.params, vec![json!("id-1"), json!("10.0.0.1"), json!(2)]);
    }

    #[test]
    fn update_appends_update_timestamp() {
        let mut c = config();
        c.on_update_timestamp = Some("updated_at".into());
        let data = match json!({"ip": "a"}) {
            serde_json::Value::Object(m) => m,
            _ => unreachable!(),
        };
        let q = update(&c, &Filter::default(), &data);
        assert_eq!(
            q.sql,
            "UPDATE \"sessions\" SET \"ip\" = $1, \"updated_at\" = NOW() RETURNING *"
        );
    }

    #[test]
    fn delete_with_filter() {
        let q = delete(&config(), &filter(json!({"session_id": ["a", "b"]})));
        assert_eq!(
            q.sql,
            "DELETE FROM \"sessions\" WHERE \"session_id\" IN ($1::uuid, $2::uuid) RETURNING *"
        );
    }

    #[test]
    fn quoted_identifiers_escape_embedded_quotes() {
        let q = select(&config(), &select_cmd(json!({"evil\"col": 1})));
        assert!(q.sql.contains("\"evil\"\"col\" = $1"));
    }
}
