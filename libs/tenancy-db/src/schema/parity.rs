//! Column shape comparison between the two engines.
//!
//! Each engine renders a column its own way (`varchar(36)` vs `TEXT`), so
//! shapes are compared after normalizing the declared type to the storage
//! class SQLite derives from it.

use std::fmt;

use sea_orm::sea_query::{
    ColumnDef, ColumnSpec as SeaColumnSpec, ColumnType as SeaColumnType, StringLen,
};
use serde::Serialize;

use crate::engine::{column_def, column_sql, join_column_def, join_column_sql};
use crate::error::{DataError, Result};
use crate::metadata::{ColumnSpec, ColumnType, EntityDescriptor, JoinTable};

/// SQLite type affinity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageClass {
    Text,
    Integer,
    Real,
    Numeric,
    Blob,
}

impl fmt::Display for StorageClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StorageClass::Text => "text",
            StorageClass::Integer => "integer",
            StorageClass::Real => "real",
            StorageClass::Numeric => "numeric",
            StorageClass::Blob => "blob",
        })
    }
}

/// Affinity of a declared column type, by SQLite's substring rules.
#[must_use]
pub fn affinity(declared: &str) -> StorageClass {
    let t = declared.to_ascii_uppercase();
    if t.contains("INT") {
        StorageClass::Integer
    } else if t.contains("CHAR") || t.contains("CLOB") || t.contains("TEXT") {
        StorageClass::Text
    } else if t.contains("BLOB") || t.is_empty() {
        StorageClass::Blob
    } else if t.contains("REAL") || t.contains("FLOA") || t.contains("DOUB") {
        StorageClass::Real
    } else {
        StorageClass::Numeric
    }
}

/// Storage class a semantic type must end up with.
#[must_use]
pub fn expected_class(ty: &ColumnType) -> StorageClass {
    match ty {
        ColumnType::Uuid
        | ColumnType::String
        | ColumnType::Enum(_)
        | ColumnType::DateTime
        | ColumnType::Json => StorageClass::Text,
        ColumnType::Integer => StorageClass::Integer,
        ColumnType::Float => StorageClass::Real,
        ColumnType::Boolean => StorageClass::Numeric,
    }
}

/// Normalized column definition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ColumnShape {
    pub class: StorageClass,
    pub not_null: bool,
    pub primary_key: bool,
}

impl ColumnShape {
    #[must_use]
    pub fn of(column: &ColumnSpec) -> Self {
        Self {
            class: expected_class(&column.ty),
            not_null: column.primary_key || !column.nullable,
            primary_key: column.primary_key,
        }
    }
}

impl fmt::Display for ColumnShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.class)?;
        if self.not_null {
            f.write_str(" not null")?;
        }
        if self.primary_key {
            f.write_str(" primary key")?;
        }
        Ok(())
    }
}

/// Type name `sea_query` emits for SQLite.
fn sea_declared(ty: &SeaColumnType) -> Option<String> {
    Some(match ty {
        SeaColumnType::String(StringLen::N(n)) => format!("varchar({n})"),
        SeaColumnType::String(_) => "varchar".to_owned(),
        SeaColumnType::Char(_) => "char".to_owned(),
        SeaColumnType::Text => "text".to_owned(),
        SeaColumnType::TinyInteger
        | SeaColumnType::SmallInteger
        | SeaColumnType::Integer
        | SeaColumnType::BigInteger => "integer".to_owned(),
        SeaColumnType::Float => "float".to_owned(),
        SeaColumnType::Double => "double".to_owned(),
        SeaColumnType::Boolean => "boolean".to_owned(),
        SeaColumnType::Blob => "blob".to_owned(),
        _ => return None,
    })
}

fn sea_shape(def: &ColumnDef) -> Result<ColumnShape> {
    let declared = def.get_column_type().and_then(sea_declared).ok_or_else(|| {
        DataError::config(format!(
            "column '{}' has no SQLite type in sea_query",
            def.get_column_name()
        ))
    })?;
    let spec = def.get_column_spec();
    let primary_key = spec.iter().any(|s| matches!(s, SeaColumnSpec::PrimaryKey));
    Ok(ColumnShape {
        class: affinity(&declared),
        not_null: primary_key || spec.iter().any(|s| matches!(s, SeaColumnSpec::NotNull)),
        primary_key,
    })
}

fn sqlx_shape(sql: &str) -> ColumnShape {
    // `"name" TYPE [NOT NULL] [PRIMARY KEY] [DEFAULT ..]`
    let rest = sql
        .strip_prefix('"')
        .and_then(|s| s.split_once('"'))
        .map_or(sql, |(_, rest)| rest);
    let rest = rest.split(" DEFAULT ").next().unwrap_or(rest).trim();
    let declared = rest.split_whitespace().next().unwrap_or_default();
    let primary_key = rest.contains("PRIMARY KEY");
    ColumnShape {
        class: affinity(declared),
        not_null: primary_key || rest.contains("NOT NULL"),
        primary_key,
    }
}

fn compare(
    table: &str,
    column: &str,
    expected: ColumnShape,
    sea: ColumnShape,
    sqlx: ColumnShape,
) -> Result<()> {
    if sea == expected && sqlx == expected {
        return Ok(());
    }
    Err(DataError::config(format!(
        "schema drift on {table}.{column}: expected '{expected}', sea_orm renders '{sea}', sqlx renders '{sqlx}'"
    )))
}

/// Both engines' DDL for every column of `desc` must normalize to the same shape.
///
/// # Errors
/// `DataError::Configuration` naming the first drifting column.
pub fn check_static(desc: &EntityDescriptor) -> Result<()> {
    for column in desc.columns() {
        let sea = sea_shape(&column_def(column)?)?;
        let sqlx = sqlx_shape(&column_sql(column)?);
        compare(desc.table(), &column.name, ColumnShape::of(column), sea, sqlx)?;
    }
    Ok(())
}

/// Join table columns: not-null uuid text on both engines.
///
/// # Errors
/// `DataError::Configuration` on drift.
pub fn check_static_join(join: &JoinTable) -> Result<()> {
    let expected = ColumnShape {
        class: StorageClass::Text,
        not_null: true,
        primary_key: false,
    };
    for column in [&join.source_column, &join.target_column] {
        let sea = sea_shape(&join_column_def(column))?;
        let sqlx = sqlx_shape(&join_column_sql(column));
        compare(&join.name, column, expected, sea, sqlx)?;
    }
    Ok(())
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_affinity_rules() {
        assert_eq!(affinity("varchar(36)"), StorageClass::Text);
        assert_eq!(affinity("TEXT"), StorageClass::Text);
        assert_eq!(affinity("bigint"), StorageClass::Integer);
        assert_eq!(affinity("INTEGER"), StorageClass::Integer);
        assert_eq!(affinity("double"), StorageClass::Real);
        assert_eq!(affinity("REAL"), StorageClass::Real);
        assert_eq!(affinity("BOOLEAN"), StorageClass::Numeric);
        assert_eq!(affinity(""), StorageClass::Blob);
    }

    #[test]
    fn test_sqlx_shape_parsing() {
        let shape = sqlx_shape(r#""id" TEXT NOT NULL PRIMARY KEY"#);
        assert_eq!(
            shape,
            ColumnShape {
                class: StorageClass::Text,
                not_null: true,
                primary_key: true,
            }
        );
        let shape = sqlx_shape(r#""note" TEXT DEFAULT 'NOT NULL'"#);
        assert_eq!(shape.class, StorageClass::Text);
        assert!(!shape.not_null);
    }

    #[test]
    fn test_every_semantic_type_agrees() {
        let columns = [
            ColumnSpec::uuid("a"),
            ColumnSpec::string("b").nullable(),
            ColumnSpec::integer("c"),
            ColumnSpec::float("d").nullable(),
            ColumnSpec::boolean("e"),
            ColumnSpec::datetime("f"),
            ColumnSpec::enumeration("g", ["x", "y"]),
            ColumnSpec::json("h").nullable(),
            ColumnSpec::uuid("id").primary(),
        ];
        for column in &columns {
            let sea = sea_shape(&column_def(column).unwrap()).unwrap();
            let sqlx = sqlx_shape(&column_sql(column).unwrap());
            compare("t", &column.name, ColumnShape::of(column), sea, sqlx).unwrap();
        }
    }

    #[test]
    fn test_drift_is_reported() {
        let expected = ColumnShape {
            class: StorageClass::Integer,
            not_null: true,
            primary_key: false,
        };
        let drifted = ColumnShape {
            not_null: false,
            ..expected
        };
        let err = compare("employee", "age", expected, expected, drifted).unwrap_err();
        assert!(matches!(err, DataError::Configuration(_)));
        assert!(err.to_string().contains("employee.age"));
    }
}
