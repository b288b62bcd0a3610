//! Binding-time config validation. Misconfiguration is fatal here, never per-request.

use crate::config::EntityConfig;
use crate::error::ConfigError;

pub fn validate(config: &EntityConfig) -> Result<(), ConfigError> {
    if config.fields.is_empty() {
        return Err(ConfigError::EmptyFieldSchema {
            table: config.table.clone(),
        });
    }
    if !config.fields.contains_key(&config.primary_key) {
        return Err(ConfigError::UnknownField {
            table: config.table.clone(),
            context: "primary key",
            field: config.primary_key.clone(),
        });
    }
    if let Some(upsert) = &config.upsert {
        if upsert.conflict_fields.is_empty() {
            return Err(ConfigError::EmptyConflictFields {
                table: config.table.clone(),
            });
        }
        for field in upsert.conflict_fields.iter().chain(&upsert.update_fields) {
            if !config.fields.contains_key(field) {
                return Err(ConfigError::UnknownField {
                    table: config.table.clone(),
                    context: "upsert policy",
                    field: field.clone(),
                });
            }
        }
    }
    for column in [&config.on_create_timestamp, &config.on_update_timestamp]
        .into_iter()
        .flatten()
    {
        // Auto-populated columns cannot also be caller-writable fields.
        if config.fields.contains_key(column) {
            return Err(ConfigError::TimestampCollision {
                table: config.table.clone(),
                column: column.clone(),
            });
        }
    }
    if let Some(defaults) = &config.default_pagination {
        if defaults.page == 0 || defaults.per_page == 0 {
            return Err(ConfigError::InvalidPaginationDefaults {
                table: config.table.clone(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FieldRule, PaginationDefaults, PrimaryKeyPolicy, UpsertPolicy};
    use std::collections::HashMap;

    fn base_config() -> EntityConfig {
        let mut fields = HashMap::new();
        fields.insert("id".to_string(), FieldRule::text());
        fields.insert("name".to_string(), FieldRule::text());
        EntityConfig {
            table: "things".into(),
            primary_key: "id".into(),
            primary_key_policy: PrimaryKeyPolicy::CallerSupplied,
            fields,
            on_create_timestamp: None,
            on_update_timestamp: None,
            upsert: None,
            default_pagination: None,
        }
    }

    #[test]
    fn accepts_minimal_config() {
        assert!(validate(&base_config()).is_ok());
    }

    #[test]
    fn rejects_empty_field_schema() {
        let mut config = base_config();
        config.fields.clear();
        assert!(matches!(
            validate(&config),
            Err(ConfigError::EmptyFieldSchema { .. })
        ));
    }

    #[test]
    fn rejects_primary_key_outside_schema() {
        let mut config = base_config();
        config.primary_key = "missing".into();
        assert!(matches!(
            validate(&config),
            Err(ConfigError::UnknownField { context: "primary key", .. })
        ));
    }

    #[test]
    fn rejects_upsert_referencing_unknown_field() {
        let mut config = base_config();
        config.upsert = Some(UpsertPolicy {
            conflict_fields: vec!["name".into()],
            update_fields: vec!["nope".into()],
        });
        assert!(matches!(
            validate(&config),
            Err(ConfigError::UnknownField { context: "upsert policy", .. })
        ));
    }

    #[test]
    fn rejects_timestamp_colliding_with_field() {
        let mut config = base_config();
        config.on_create_timestamp = Some("name".into());
        assert!(matches!(
            validate(&config),
            Err(ConfigError::TimestampCollision { .. })
        ));
    }

    #[test]
    fn rejects_zero_pagination_defaults() {
        let mut config = base_config();
        config.default_pagination = Some(PaginationDefaults { page: 1, per_page: 0 });
        assert!(matches!(
            validate(&config),
            Err(ConfigError::InvalidPaginationDefaults { .. })
        ));
    }
}
