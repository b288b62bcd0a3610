//! Request validation against the entity's field schema.
//!
//! Filters are validated permissively (query-shaped, not row-shaped): unknown
//! columns, operators, and JSON-path keys pass through, and each declared
//! field's rule is widened to accept an array of its type for IN-style
//! filters. Payloads are validated strictly: unknown fields are rejected and
//! the validator's transformed output is what gets persisted.

use crate::command::Sort;
use crate::config::{EntityConfig, FieldKind, FieldRule};
use crate::error::AppError;
use crate::filter::{flatten, Filter, FlatValue};
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::BTreeSet;

#[derive(Clone, Copy, PartialEq, Eq)]
enum PayloadMode {
    Create,
    Update,
}

pub struct SchemaValidator;

impl SchemaValidator {
    /// Validate the query half of a command: filter, sort, projection.
    pub fn validate_query(
        config: &EntityConfig,
        filter: &Filter,
        sort: &Sort,
        columns: Option<&[String]>,
    ) -> Result<(), AppError> {
        Self::validate_filter(config, filter)?;
        Self::validate_sort(config, sort)?;
        if let Some(columns) = columns {
            Self::validate_columns(config, columns)?;
        }
        Ok(())
    }

    /// Each declared field's normalized filter leaves must satisfy its kind.
    pub fn validate_filter(config: &EntityConfig, filter: &Filter) -> Result<(), AppError> {
        for (field, value) in &filter.clauses {
            if field.json_path.is_some() {
                // Sub-document types are not statically known; treated as any.
                continue;
            }
            let Some(rule) = config.rule(&field.column) else {
                continue;
            };
            match flatten(value) {
                FlatValue::Null => {}
                FlatValue::Scalar(v) => check_kind(&field.column, &v, rule.kind)?,
                FlatValue::Many(values) => {
                    for v in &values {
                        check_kind(&field.column, v, rule.kind)?;
                    }
                }
            }
        }
        for group in &filter.any_of {
            Self::validate_filter(config, group)?;
        }
        Ok(())
    }

    pub fn validate_sort(config: &EntityConfig, sort: &Sort) -> Result<(), AppError> {
        for (field, _) in &sort.keys {
            if !config.has_field(field) {
                return Err(AppError::Validation(format!(
                    "cannot sort by unknown field '{}'",
                    field
                )));
            }
        }
        Ok(())
    }

    pub fn validate_columns(config: &EntityConfig, columns: &[String]) -> Result<(), AppError> {
        for column in columns {
            if !config.has_field(column) {
                return Err(AppError::Validation(format!(
                    "unknown column '{}' in projection",
                    column
                )));
            }
        }
        Ok(())
    }

    /// Validate a create payload (object or array of objects with identical
    /// key sets). Returns the normalized payload with transforms applied.
    pub fn validate_create(config: &EntityConfig, data: &Value) -> Result<Value, AppError> {
        match data {
            Value::Object(row) => Ok(Value::Object(Self::validate_row(
                config,
                row,
                PayloadMode::Create,
            )?)),
            Value::Array(rows) => {
                if rows.is_empty() {
                    return Err(AppError::Validation(
                        "multi-row create requires at least one row".into(),
                    ));
                }
                let mut maps = Vec::with_capacity(rows.len());
                for row in rows {
                    let Value::Object(map) = row else {
                        return Err(AppError::Validation(
                            "multi-row create rows must be JSON objects".into(),
                        ));
                    };
                    maps.push(map);
                }
                let first_keys: BTreeSet<&str> = maps[0].keys().map(String::as_str).collect();
                for map in &maps[1..] {
                    let keys: BTreeSet<&str> = map.keys().map(String::as_str).collect();
                    if keys != first_keys {
                        return Err(AppError::Validation(
                            "all rows in a multi-row create must have the same fields".into(),
                        ));
                    }
                }
                let normalized = maps
                    .into_iter()
                    .map(|map| Self::validate_row(config, map, PayloadMode::Create).map(Value::Object))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::Array(normalized))
            }
            _ => Err(AppError::Validation(
                "payload must be a JSON object or an array of objects".into(),
            )),
        }
    }

    /// Validate an update payload. Only present fields are checked; `required`
    /// is not enforced. Returns the normalized payload.
    pub fn validate_update(
        config: &EntityConfig,
        data: &Value,
    ) -> Result<Map<String, Value>, AppError> {
        let Value::Object(row) = data else {
            return Err(AppError::Validation("payload must be a JSON object".into()));
        };
        if row.is_empty() {
            return Err(AppError::Validation(
                "update requires at least one field".into(),
            ));
        }
        Self::validate_row(config, row, PayloadMode::Update)
    }

    fn validate_row(
        config: &EntityConfig,
        row: &Map<String, Value>,
        mode: PayloadMode,
    ) -> Result<Map<String, Value>, AppError> {
        let pk = config.primary_key.as_str();
        if row.contains_key(pk) {
            match mode {
                PayloadMode::Update => {
                    return Err(AppError::Validation(format!("'{}' cannot be modified", pk)))
                }
                PayloadMode::Create if config.server_generated_key() => {
                    return Err(AppError::Validation(format!(
                        "'{}' is server-generated and cannot be supplied",
                        pk
                    )))
                }
                PayloadMode::Create => {}
            }
        }
        if mode == PayloadMode::Create {
            for (name, rule) in &config.fields {
                if name == pk && config.server_generated_key() {
                    continue;
                }
                let value = row.get(name);
                if rule.required && value.map_or(true, Value::is_null) {
                    return Err(AppError::Validation(format!("{} is required", name)));
                }
            }
        }
        let mut out = Map::with_capacity(row.len());
        for (key, value) in row {
            let Some(rule) = config.rule(key) else {
                return Err(AppError::Validation(format!("unknown field '{}'", key)));
            };
            let value = apply_transforms(value, rule);
            validate_field(key, &value, rule)?;
            out.insert(key.clone(), value);
        }
        Ok(out)
    }
}

/// Trim/lowercase string values per the field rule.
fn apply_transforms(value: &Value, rule: &FieldRule) -> Value {
    let Value::String(s) = value else {
        return value.clone();
    };
    let mut s = s.clone();
    if rule.trim {
        s = s.trim().to_string();
    }
    if rule.lowercase {
        s = s.to_lowercase();
    }
    Value::String(s)
}

fn check_kind(field: &str, value: &Value, kind: FieldKind) -> Result<(), AppError> {
    if value.is_null() {
        return Ok(());
    }
    let ok = match kind {
        FieldKind::Text => value.is_string(),
        FieldKind::Integer => value.as_i64().is_some() || value.as_u64().is_some(),
        FieldKind::Number => value.is_number(),
        FieldKind::Boolean => value.is_boolean(),
    };
    if !ok {
        let expected = match kind {
            FieldKind::Text => "a string",
            FieldKind::Integer => "an integer",
            FieldKind::Number => "a number",
            FieldKind::Boolean => "a boolean",
        };
        return Err(AppError::Validation(format!(
            "{} must be {}",
            field, expected
        )));
    }
    Ok(())
}

fn validate_field(field: &str, value: &Value, rule: &FieldRule) -> Result<(), AppError> {
    if value.is_null() {
        return Ok(());
    }
    check_kind(field, value, rule.kind)?;
    if let Some(max) = rule.max_length {
        if let Some(s) = value.as_str() {
            if s.chars().count() > max as usize {
                return Err(AppError::Validation(format!(
                    "{} must be at most {} characters",
                    field, max
                )));
            }
        }
    }
    if let Some(min) = rule.min_length {
        if let Some(s) = value.as_str() {
            if s.chars().count() < min as usize {
                return Err(AppError::Validation(format!(
                    "{} must be at least {} characters",
                    field, min
                )));
            }
        }
    }
    if let Some(pattern) = &rule.pattern {
        let re = Regex::new(pattern)
            .map_err(|_| AppError::Validation(format!("invalid pattern for {}", field)))?;
        if let Some(s) = value.as_str() {
            if !re.is_match(s) {
                return Err(AppError::Validation(format!(
                    "{} does not match required pattern",
                    field
                )));
            }
        }
    }
    if let Some(format) = &rule.format {
        validate_format(field, value, format)?;
    }
    if let Some(allowed) = &rule.allowed {
        if !allowed.iter().any(|a| value_eq(value, a)) {
            return Err(AppError::Validation(format!(
                "{} must be one of: {:?}",
                field,
                allowed.iter().take(5).collect::<Vec<_>>()
            )));
        }
    }
    if let Some(min) = rule.minimum {
        if let Some(n) = value.as_f64() {
            if n < min {
                return Err(AppError::Validation(format!(
                    "{} must be at least {}",
                    field, min
                )));
            }
        }
    }
    if let Some(max) = rule.maximum {
        if let Some(n) = value.as_f64() {
            if n > max {
                return Err(AppError::Validation(format!(
                    "{} must be at most {}",
                    field, max
                )));
            }
        }
    }
    Ok(())
}

fn value_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(n), Value::Number(m)) => n.as_f64() == m.as_f64(),
        _ => a == b,
    }
}

fn validate_format(field: &str, value: &Value, format: &str) -> Result<(), AppError> {
    match format.to_lowercase().as_str() {
        "email" => {
            if let Some(s) = value.as_str() {
                if !s.contains('@') || s.len() < 3 {
                    return Err(AppError::Validation(format!(
                        "{} must be a valid email",
                        field
                    )));
                }
            }
        }
        "uuid" => {
            if let Some(s) = value.as_str() {
                if uuid::Uuid::parse_str(s).is_err() {
                    return Err(AppError::Validation(format!(
                        "{} must be a valid UUID",
                        field
                    )));
                }
            }
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PrimaryKeyPolicy, UpsertPolicy};
    use serde_json::json;
    use std::collections::HashMap;

    fn sessions_config() -> EntityConfig {
        let mut fields = HashMap::new();
        fields.insert(
            "session_id".to_string(),
            FieldRule::text().with_format("uuid"),
        );
        fields.insert("ip".to_string(), FieldRule::text().required());
        fields.insert("session_data".to_string(), FieldRule::text());
        fields.insert("hits".to_string(), FieldRule::integer());
        EntityConfig {
            table: "sessions".into(),
            primary_key: "session_id".into(),
            primary_key_policy: PrimaryKeyPolicy::Guid,
            fields,
            on_create_timestamp: Some("created_at".into()),
            on_update_timestamp: Some("updated_at".into()),
            upsert: None,
            default_pagination: None,
        }
    }

    #[test]
    fn filter_widens_rule_to_arrays() {
        let config = sessions_config();
        let filter = Filter::from_value(&json!({"hits": [1, 2, 3]})).unwrap();
        assert!(SchemaValidator::validate_filter(&config, &filter).is_ok());

        let filter = Filter::from_value(&json!({"hits": [1, "two"]})).unwrap();
        let err = SchemaValidator::validate_filter(&config, &filter).unwrap_err();
        assert_eq!(err.to_string(), "hits must be an integer");
    }

    #[test]
    fn filter_allows_unknown_fields_and_json_paths() {
        let config = sessions_config();
        let filter = Filter::from_value(&json!({
            "not_a_field": 42,
            "session_data->>username": "bob"
        }))
        .unwrap();
        assert!(SchemaValidator::validate_filter(&config, &filter).is_ok());
    }

    #[test]
    fn filter_checks_operator_leaves_but_not_patterns() {
        let config = sessions_config();
        let filter = Filter::from_value(&json!({"ip": {"$ilike": "127."}})).unwrap();
        assert!(SchemaValidator::validate_filter(&config, &filter).is_ok());

        let filter = Filter::from_value(&json!({"hits": {"$gt": "many"}})).unwrap();
        assert!(SchemaValidator::validate_filter(&config, &filter).is_err());
    }

    #[test]
    fn filter_validates_top_level_or_groups() {
        let config = sessions_config();
        let filter =
            Filter::from_value(&json!({"$or": [{"hits": 1}, {"hits": "bad"}]})).unwrap();
        assert!(SchemaValidator::validate_filter(&config, &filter).is_err());
    }

    #[test]
    fn create_forbids_server_generated_key() {
        let config = sessions_config();
        let err = SchemaValidator::validate_create(
            &config,
            &json!({"session_id": "abc", "ip": "127.0.0.1"}),
        )
        .unwrap_err();
        assert!(err.to_string().contains("session_id"));
    }

    #[test]
    fn create_allows_caller_supplied_key() {
        let mut config = sessions_config();
        config.primary_key_policy = PrimaryKeyPolicy::CallerSupplied;
        let data = json!({
            "session_id": "9f1b2c3d-4e5f-4a6b-8c7d-0e1f2a3b4c5d",
            "ip": "127.0.0.1"
        });
        assert!(SchemaValidator::validate_create(&config, &data).is_ok());
    }

    #[test]
    fn create_enforces_required_fields() {
        let config = sessions_config();
        let err =
            SchemaValidator::validate_create(&config, &json!({"session_data": "{}"})).unwrap_err();
        assert_eq!(err.to_string(), "ip is required");
    }

    #[test]
    fn create_rejects_unknown_fields() {
        let config = sessions_config();
        let err = SchemaValidator::validate_create(
            &config,
            &json!({"ip": "127.0.0.1", "shoe_size": 44}),
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "unknown field 'shoe_size'");
    }

    #[test]
    fn create_rejects_wrong_kind() {
        let config = sessions_config();
        let err = SchemaValidator::validate_create(&config, &json!({"ip": 123})).unwrap_err();
        assert_eq!(err.to_string(), "ip must be a string");
    }

    #[test]
    fn multi_row_create_requires_identical_keys() {
        let config = sessions_config();
        let err = SchemaValidator::validate_create(
            &config,
            &json!([{"ip": "a"}, {"ip": "b", "hits": 1}]),
        )
        .unwrap_err();
        assert!(err.to_string().contains("same fields"));

        let ok = SchemaValidator::validate_create(&config, &json!([{"ip": "a"}, {"ip": "b"}]));
        assert!(ok.is_ok());
    }

    #[test]
    fn update_forbids_primary_key_always() {
        let mut config = sessions_config();
        config.primary_key_policy = PrimaryKeyPolicy::CallerSupplied;
        let err = SchemaValidator::validate_update(&config, &json!({"session_id": "x"}))
            .unwrap_err();
        assert!(err.to_string().contains("cannot be modified"));
    }

    #[test]
    fn update_skips_required_checks() {
        let config = sessions_config();
        // ip is required on create but absent here; update only checks present fields.
        let out = SchemaValidator::validate_update(&config, &json!({"hits": 2})).unwrap();
        assert_eq!(out.get("hits"), Some(&json!(2)));
    }

    #[test]
    fn update_rejects_empty_payload() {
        let config = sessions_config();
        assert!(SchemaValidator::validate_update(&config, &json!({})).is_err());
    }

    #[test]
    fn transforms_apply_before_persistence() {
        let mut config = sessions_config();
        config.fields.insert(
            "email".to_string(),
            FieldRule::text().trimmed().lowercased().with_format("email"),
        );
        let out = SchemaValidator::validate_update(
            &config,
            &json!({"email": "  Bob@Example.COM "}),
        )
        .unwrap();
        assert_eq!(out.get("email"), Some(&json!("bob@example.com")));
    }

    #[test]
    fn sort_rejects_unknown_field_naming_it() {
        let config = sessions_config();
        let sort = Sort::from_value(&json!({"nope": -1})).unwrap();
        let err = SchemaValidator::validate_sort(&config, &sort).unwrap_err();
        assert_eq!(err.to_string(), "cannot sort by unknown field 'nope'");
    }

    #[test]
    fn columns_must_be_declared() {
        let config = sessions_config();
        assert!(SchemaValidator::validate_columns(
            &config,
            &["ip".to_string(), "session_id".to_string()]
        )
        .is_ok());
        let err = SchemaValidator::validate_columns(&config, &["secret".to_string()]).unwrap_err();
        assert_eq!(err.to_string(), "unknown column 'secret' in projection");
    }

    #[test]
    fn allowed_and_bounds_are_enforced() {
        let mut config = sessions_config();
        config.fields.insert(
            "status".to_string(),
            FieldRule {
                allowed: Some(vec![json!("new"), json!("open")]),
                ..FieldRule::text()
            },
        );
        config.fields.insert(
            "score".to_string(),
            FieldRule {
                minimum: Some(0.0),
                maximum: Some(10.0),
                ..FieldRule::number()
            },
        );
        assert!(
            SchemaValidator::validate_update(&config, &json!({"status": "closed"})).is_err()
        );
        assert!(SchemaValidator::validate_update(&config, &json!({"score": 11})).is_err());
        assert!(SchemaValidator::validate_update(
            &config,
            &json!({"status": "open", "score": 7.5})
        )
        .is_ok());
    }

    #[test]
    fn upsert_config_roundtrip() {
        // UpsertPolicy is plain data; ensure serde names stay stable for hosts
        // that load config from JSON.
        let policy: UpsertPolicy = serde_json::from_value(json!({
            "conflict_fields": ["ip"],
            "update_fields": ["session_data"]
        }))
        .unwrap();
        assert_eq!(policy.conflict_fields, vec!["ip"]);
    }
}
