//! Row-selection filters: mongo-style JSON in, a typed tree out.
//!
//! The query-string grammar accepts scalars, nulls, arrays, operator objects
//! (`{"$gt": 5}`, `{"$ilike": "bob"}`), field-level `$or`, a top-level `$or`
//! over whole filter objects, and JSON-path keys (`"data->>name"`). Parsing
//! turns that into [`Filter`] once; validation and SQL building both consume
//! the typed tree.

use crate::error::AppError;
use serde_json::Value;

pub const OR_KEY: &str = "$or";

/// A filter key: a plain column, or a JSON sub-document path (`col->>sub`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldRef {
    pub column: String,
    pub json_path: Option<String>,
}

impl FieldRef {
    pub fn parse(key: &str) -> FieldRef {
        match key.split_once("->>") {
            Some((column, path)) => FieldRef {
                column: column.trim().to_string(),
                json_path: Some(path.trim().to_string()),
            },
            None => FieldRef {
                column: key.to_string(),
                json_path: None,
            },
        }
    }

    pub fn column(name: &str) -> FieldRef {
        FieldRef {
            column: name.to_string(),
            json_path: None,
        }
    }
}

/// A single comparison from an operator object.
#[derive(Clone, Debug, PartialEq)]
pub enum FilterOp {
    Eq(Value),
    Ne(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    In(Vec<Value>),
    /// Case-sensitive partial match; the operand is a fragment, not a full value.
    Like(String),
    /// Case-insensitive partial match.
    ILike(String),
}

impl FilterOp {
    fn parse(op: &str, operand: &Value) -> Result<FilterOp, AppError> {
        let scalar = |op: &str| -> Result<Value, AppError> {
            if operand.is_object() || operand.is_array() {
                return Err(AppError::Validation(format!(
                    "operand of {} must be a scalar",
                    op
                )));
            }
            Ok(operand.clone())
        };
        let fragment = |op: &str| -> Result<String, AppError> {
            operand
                .as_str()
                .map(|s| s.to_string())
                .ok_or_else(|| AppError::Validation(format!("operand of {} must be a string", op)))
        };
        Ok(match op {
            "$eq" => FilterOp::Eq(scalar(op)?),
            "$ne" => FilterOp::Ne(scalar(op)?),
            "$gt" => FilterOp::Gt(scalar(op)?),
            "$gte" => FilterOp::Gte(scalar(op)?),
            "$lt" => FilterOp::Lt(scalar(op)?),
            "$lte" => FilterOp::Lte(scalar(op)?),
            "$in" => match operand {
                Value::Array(items) => FilterOp::In(scalar_items(items)?),
                _ => {
                    return Err(AppError::Validation(
                        "operand of $in must be an array".into(),
                    ))
                }
            },
            "$like" => FilterOp::Like(fragment(op)?),
            "$ilike" => FilterOp::ILike(fragment(op)?),
            other => {
                return Err(AppError::Validation(format!(
                    "unknown filter operator '{}'",
                    other
                )))
            }
        })
    }

    /// Whether the operand is a partial string excluded from type validation.
    pub fn is_pattern(&self) -> bool {
        matches!(self, FilterOp::Like(_) | FilterOp::ILike(_))
    }
}

/// Value side of one filter clause.
#[derive(Clone, Debug, PartialEq)]
pub enum FilterValue {
    /// `IS NULL`.
    Null,
    /// Scalar equality.
    Eq(Value),
    /// Array value: `IN (...)`. Empty means "match nothing", not "ignore".
    In(Vec<Value>),
    /// Operator object; comparisons are conjoined.
    Ops(Vec<FilterOp>),
    /// Field-level `$or`: any alternative may match.
    AnyOf(Vec<FilterValue>),
}

impl FilterValue {
    pub fn from_value(v: &Value) -> Result<FilterValue, AppError> {
        match v {
            Value::Null => Ok(FilterValue::Null),
            Value::Array(items) => Ok(FilterValue::In(scalar_items(items)?)),
            Value::Object(map) => {
                if let Some(alternatives) = map.get(OR_KEY) {
                    if map.len() > 1 {
                        return Err(AppError::Validation(
                            "$or cannot be combined with other operators".into(),
                        ));
                    }
                    let Value::Array(items) = alternatives else {
                        return Err(AppError::Validation("$or must be an array".into()));
                    };
                    let parsed = items
                        .iter()
                        .map(FilterValue::from_value)
                        .collect::<Result<Vec<_>, _>>()?;
                    if parsed.is_empty() {
                        return Err(AppError::Validation(
                            "$or requires at least one alternative".into(),
                        ));
                    }
                    return Ok(FilterValue::AnyOf(parsed));
                }
                let ops = map
                    .iter()
                    .map(|(op, operand)| FilterOp::parse(op, operand))
                    .collect::<Result<Vec<_>, _>>()?;
                if ops.is_empty() {
                    return Err(AppError::Validation(
                        "filter value objects must contain an operator".into(),
                    ));
                }
                Ok(FilterValue::Ops(ops))
            }
            scalar => Ok(FilterValue::Eq(scalar.clone())),
        }
    }
}

fn scalar_items(items: &[Value]) -> Result<Vec<Value>, AppError> {
    for item in items {
        if item.is_object() || item.is_array() {
            return Err(AppError::Validation(
                "filter arrays must contain scalar values".into(),
            ));
        }
    }
    Ok(items.to_vec())
}

/// A full filter: conjoined clauses in insertion order, plus an optional
/// top-level `$or` group of whole sub-filters.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Filter {
    pub clauses: Vec<(FieldRef, FilterValue)>,
    pub any_of: Vec<Filter>,
}

impl Filter {
    pub fn from_value(v: &Value) -> Result<Filter, AppError> {
        let Value::Object(map) = v else {
            return Err(AppError::Validation("filter must be a JSON object".into()));
        };
        let mut filter = Filter::default();
        for (key, value) in map {
            if key == OR_KEY {
                let Value::Array(groups) = value else {
                    return Err(AppError::Validation(
                        "top-level $or must be an array of filter objects".into(),
                    ));
                };
                for group in groups {
                    filter.any_of.push(Filter::from_value(group)?);
                }
            } else {
                filter
                    .clauses
                    .push((FieldRef::parse(key), FilterValue::from_value(value)?));
            }
        }
        Ok(filter)
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty() && self.any_of.is_empty()
    }

    /// Pin a column to a scalar, dropping any clause already naming it.
    /// Used for URL-path ids, which take precedence over query-string filters.
    pub fn set_scalar(&mut self, column: &str, value: Value) {
        self.clauses
            .retain(|(f, _)| !(f.json_path.is_none() && f.column == column));
        self.clauses
            .insert(0, (FieldRef::column(column), FilterValue::Eq(value)));
    }
}

/// Flattened view of one clause's values, used only for schema validation.
#[derive(Clone, Debug, PartialEq)]
pub enum FlatValue {
    Null,
    Scalar(Value),
    Many(Vec<Value>),
}

/// Flatten a filter value to its scalar leaves, in traversal order.
///
/// Already-flat shapes (scalar, null, array) pass through unchanged. Operator
/// trees collect every comparison operand; `$in` contributes each element.
/// Pattern operands (`$like`/`$ilike`) are excluded since they are fragments,
/// and null alternatives carry no typed value.
pub fn flatten(value: &FilterValue) -> FlatValue {
    match value {
        FilterValue::Null => FlatValue::Null,
        FilterValue::Eq(v) => FlatValue::Scalar(v.clone()),
        FilterValue::In(items) => FlatValue::Many(items.clone()),
        other => {
            let mut leaves = Vec::new();
            collect_leaves(other, &mut leaves);
            FlatValue::Many(leaves)
        }
    }
}

fn collect_leaves(value: &FilterValue, out: &mut Vec<Value>) {
    match value {
        FilterValue::Null => {}
        FilterValue::Eq(v) => out.push(v.clone()),
        FilterValue::In(items) => out.extend(items.iter().cloned()),
        FilterValue::Ops(ops) => {
            for op in ops {
                match op {
                    FilterOp::Eq(v)
                    | FilterOp::Ne(v)
                    | FilterOp::Gt(v)
                    | FilterOp::Gte(v)
                    | FilterOp::Lt(v)
                    | FilterOp::Lte(v) => out.push(v.clone()),
                    FilterOp::In(items) => out.extend(items.iter().cloned()),
                    FilterOp::Like(_) | FilterOp::ILike(_) => {}
                }
            }
        }
        FilterValue::AnyOf(alternatives) => {
            for alt in alternatives {
                collect_leaves(alt, out);
            }
        }
    }
}
