//! Canonical value encoding shared by both engines.
//!
//! Records crossing the adapter boundary are JSON objects keyed by column name.
//! Every value is encoded from the column's semantic type, so the same record
//! binds identically through `SeaORM` and sqlx.
//!
//! | type | stored as |
//! |------|-----------|
//! | uuid | TEXT, lowercase hyphenated |
//! | string, enum | TEXT |
//! | integer | INTEGER |
//! | float | REAL |
//! | boolean | BOOLEAN (0/1) |
//! | datetime | TEXT, UTC, microseconds, `Z` suffix |
//! | json | TEXT |

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Number, Value};
use uuid::Uuid;

use crate::error::{DataError, Result};
use crate::metadata::{ColumnSpec, ColumnType};

/// A row as seen by adapters and services.
pub type Record = Map<String, Value>;

/// Encoded scalar ready to be bound by either engine.
#[derive(Clone, Debug, PartialEq)]
pub enum SqlValue {
    Null,
    Text(String),
    Integer(i64),
    Real(f64),
    Bool(bool),
}

impl SqlValue {
    pub(crate) fn into_sea(self) -> sea_orm::Value {
        match self {
            SqlValue::Null => sea_orm::Value::String(None),
            SqlValue::Text(s) => s.into(),
            SqlValue::Integer(i) => i.into(),
            SqlValue::Real(f) => f.into(),
            SqlValue::Bool(b) => b.into(),
        }
    }

    /// Literal form for DDL defaults.
    pub(crate) fn to_sql_literal(&self) -> String {
        match self {
            SqlValue::Null => "NULL".to_owned(),
            SqlValue::Text(s) => format!("'{}'", s.replace('\'', "''")),
            SqlValue::Integer(i) => i.to_string(),
            SqlValue::Real(f) => {
                let s = f.to_string();
                if s.contains(['.', 'e', 'E']) {
                    s
                } else {
                    format!("{s}.0")
                }
            }
            SqlValue::Bool(b) => if *b { "1" } else { "0" }.to_owned(),
        }
    }
}

/// Encode a record value for `column`. JSON `null` becomes SQL `NULL`.
///
/// # Errors
/// Returns a validation error when the value does not fit the column type.
pub fn encode(column: &ColumnSpec, value: &Value) -> Result<SqlValue> {
    if value.is_null() {
        return Ok(SqlValue::Null);
    }
    encode_typed(&column.name, &column.ty, value)
}

/// Encode a predicate operand; `null` is rejected (use `IS NULL`).
pub(crate) fn encode_operand(column: &ColumnSpec, value: &Value) -> Result<SqlValue> {
    if value.is_null() {
        return Err(DataError::field(
            &column.name,
            "cannot compare against null, use IS NULL",
        ));
    }
    encode_typed(&column.name, &column.ty, value)
}

fn encode_typed(field: &str, ty: &ColumnType, value: &Value) -> Result<SqlValue> {
    let mismatch = || DataError::field(field, format!("expected {}, got {value}", ty.kind()));
    match ty {
        ColumnType::Uuid => {
            let s = value.as_str().ok_or_else(mismatch)?;
            let id = Uuid::parse_str(s).map_err(|e| DataError::field(field, e.to_string()))?;
            Ok(SqlValue::Text(id.to_string()))
        }
        ColumnType::String => value
            .as_str()
            .map(|s| SqlValue::Text(s.to_owned()))
            .ok_or_else(mismatch),
        ColumnType::Enum(variants) => {
            let s = value.as_str().ok_or_else(mismatch)?;
            if variants.iter().any(|v| v == s) {
                Ok(SqlValue::Text(s.to_owned()))
            } else {
                Err(DataError::field(
                    field,
                    format!("'{s}' is not one of [{}]", variants.join(", ")),
                ))
            }
        }
        ColumnType::Integer => value.as_i64().map(SqlValue::Integer).ok_or_else(mismatch),
        ColumnType::Float => value.as_f64().map(SqlValue::Real).ok_or_else(mismatch),
        ColumnType::Boolean => value.as_bool().map(SqlValue::Bool).ok_or_else(mismatch),
        ColumnType::DateTime => {
            let s = value.as_str().ok_or_else(mismatch)?;
            canonical_datetime(s)
                .map(SqlValue::Text)
                .map_err(|e| DataError::field(field, e))
        }
        ColumnType::Json => serde_json::to_string(value)
            .map(SqlValue::Text)
            .map_err(|e| DataError::field(field, e.to_string())),
    }
}

/// Encode an untyped raw-query parameter. Arrays and objects bind as JSON text.
pub(crate) fn encode_raw(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Bool(*b),
        Value::Number(n) => n
            .as_i64()
            .map_or_else(|| SqlValue::Real(n.as_f64().unwrap_or_default()), SqlValue::Integer),
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

/// Decode a stored scalar back into its JSON form.
///
/// # Errors
/// Returns `DataError::Database` when stored JSON text cannot be parsed.
pub fn decode(ty: &ColumnType, raw: SqlValue) -> Result<Value> {
    Ok(match (ty, raw) {
        (_, SqlValue::Null) => Value::Null,
        (ColumnType::Json, SqlValue::Text(s)) => serde_json::from_str(&s)
            .map_err(|e| DataError::Database(format!("stored json is malformed: {e}")))?,
        (ColumnType::Boolean, SqlValue::Integer(i)) => Value::Bool(i != 0),
        (_, SqlValue::Text(s)) => Value::String(s),
        (_, SqlValue::Integer(i)) => Value::Number(i.into()),
        (_, SqlValue::Real(f)) => Number::from_f64(f).map_or(Value::Null, Value::Number),
        (_, SqlValue::Bool(b)) => Value::Bool(b),
    })
}

/// Normalize an RFC 3339 timestamp to UTC with fixed microsecond precision so
/// that text order equals time order.
///
/// # Errors
/// Returns the parse error message.
pub fn canonical_datetime(s: &str) -> std::result::Result<String, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| {
            dt.with_timezone(&Utc)
                .to_rfc3339_opts(SecondsFormat::Micros, true)
        })
        .map_err(|e| format!("'{s}' is not an RFC 3339 timestamp: {e}"))
}

/// Current time in canonical form.
#[must_use]
pub fn now() -> Value {
    Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true))
}

/// Serialize any payload into a record.
pub(crate) fn to_record<P: serde::Serialize + ?Sized>(payload: &P) -> Result<Record> {
    match serde_json::to_value(payload) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(DataError::payload(format!(
            "expected an object, got {other}"
        ))),
        Err(e) => Err(DataError::payload(e.to_string())),
    }
}
