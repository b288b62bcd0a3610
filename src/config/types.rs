//! Declarative entity configuration: one table, its field rules, and behavior flags.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// How the primary key value is produced on create.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimaryKeyPolicy {
    /// Caller must supply the key in the create payload.
    #[default]
    CallerSupplied,
    /// Sequence/serial column; the key is omitted from the INSERT entirely.
    Auto,
    /// Random v4 uuid generated by this library at insert time.
    Guid,
}

/// Declared type of a field's values.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    #[default]
    Text,
    Integer,
    Number,
    Boolean,
}

impl FieldKind {
    pub fn name(&self) -> &'static str {
        match self {
            FieldKind::Text => "string",
            FieldKind::Integer => "integer",
            FieldKind::Number => "number",
            FieldKind::Boolean => "boolean",
        }
    }
}

/// Per-field validation rule. Transforms run before constraint checks and the
/// transformed value is what gets persisted.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FieldRule {
    #[serde(default)]
    pub kind: FieldKind,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub trim: bool,
    #[serde(default)]
    pub lowercase: bool,
    #[serde(default)]
    pub min_length: Option<u32>,
    #[serde(default)]
    pub max_length: Option<u32>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub allowed: Option<Vec<Value>>,
    #[serde(default)]
    pub minimum: Option<f64>,
    #[serde(default)]
    pub maximum: Option<f64>,
    /// PostgreSQL type name appended as a cast (e.g. `$1::uuid`) when the
    /// column's type does not match the wire type of bound values.
    #[serde(default)]
    pub cast: Option<String>,
}

impl FieldRule {
    pub fn text() -> Self {
        FieldRule {
            kind: FieldKind::Text,
            ..Default::default()
        }
    }

    pub fn integer() -> Self {
        FieldRule {
            kind: FieldKind::Integer,
            ..Default::default()
        }
    }

    pub fn number() -> Self {
        FieldRule {
            kind: FieldKind::Number,
            ..Default::default()
        }
    }

    pub fn boolean() -> Self {
        FieldRule {
            kind: FieldKind::Boolean,
            ..Default::default()
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn trimmed(mut self) -> Self {
        self.trim = true;
        self
    }

    pub fn lowercased(mut self) -> Self {
        self.lowercase = true;
        self
    }

    pub fn with_format(mut self, format: &str) -> Self {
        self.format = Some(format.to_string());
        self
    }

    pub fn with_cast(mut self, cast: &str) -> Self {
        self.cast = Some(cast.to_string());
        self
    }
}

/// Insert-or-update-on-conflict policy: the conflict key(s) and the fields
/// refreshed from the incoming row when the conflict fires.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UpsertPolicy {
    pub conflict_fields: Vec<String>,
    pub update_fields: Vec<String>,
}

/// Pagination applied when the request carries none. `None` on the entity
/// means unpaginated listing by default (all rows).
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct PaginationDefaults {
    pub page: u32,
    pub per_page: u32,
}

/// Static configuration binding a table to the generated REST surface.
/// Created once at startup by the host application; read-only afterwards.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EntityConfig {
    pub table: String,
    pub primary_key: String,
    #[serde(default)]
    pub primary_key_policy: PrimaryKeyPolicy,
    /// Field name -> rule. Must be non-empty and must contain the primary key.
    pub fields: HashMap<String, FieldRule>,
    /// Column set to NOW() on insert.
    #[serde(default)]
    pub on_create_timestamp: Option<String>,
    /// Column set to NOW() on update.
    #[serde(default)]
    pub on_update_timestamp: Option<String>,
    #[serde(default)]
    pub upsert: Option<UpsertPolicy>,
    #[serde(default)]
    pub default_pagination: Option<PaginationDefaults>,
}

impl EntityConfig {
    /// Whether the primary key is produced server-side (auto or guid).
    pub fn server_generated_key(&self) -> bool {
        !matches!(self.primary_key_policy, PrimaryKeyPolicy::CallerSupplied)
    }

    /// Rule for a field, if declared.
    pub fn rule(&self, field: &str) -> Option<&FieldRule> {
        self.fields.get(field)
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }
}
