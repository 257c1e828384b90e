//! Untrusted [`PaginationParams`] → whitelisted [`FindOptions`].
//!
//! `where` value forms, per field:
//!
//! | JSON | Criteria |
//! |------|----------|
//! | `null` | `IS NULL` |
//! | scalar | `=` |
//! | array | `IN (...)` |
//! | object | AND of operators: `eq`, `ne`, `gt`, `gte`, `lt`, `lte`, `like`, `in`, `between` (`[low, high]`), `is_null` (bool) |
//!
//! Every field, order key and relation must be declared on the entity.

use serde_json::Value;

use crate::errors::json_type_name;
use crate::{
    CompareOp, Criteria, Error, FieldCatalog, FieldKind, FindOptions, OrderKey, PaginationParams,
    QueryLimits,
};

/// Validate and convert caller parameters.
///
/// `page` is 1-indexed; `limit <= 0` is rejected and larger values are clamped
/// to `limits.max_take`.
///
/// # Errors
/// Returns a validation [`Error`] for undeclared fields or relations, values of
/// the wrong kind, unknown operators, and out-of-range paging.
pub fn normalize(
    params: &PaginationParams,
    catalog: &dyn FieldCatalog,
    limits: &QueryLimits,
) -> Result<FindOptions, Error> {
    let filter = build_filter(params, catalog)?;

    limits.validate_order_len(params.order.0.len())?;
    let mut order: Vec<OrderKey> = Vec::with_capacity(params.order.0.len());
    for key in &params.order.0 {
        queryable_kind(catalog, &key.field)?;
        if order.iter().all(|k| k.field != key.field) {
            order.push(key.clone());
        }
    }

    let mut relations: Vec<String> = Vec::with_capacity(params.relations.len());
    for rel in &params.relations {
        if !catalog.has_relation(rel) {
            return Err(Error::UnknownRelation {
                entity: catalog.entity_name().to_owned(),
                relation: rel.clone(),
            });
        }
        if !relations.contains(rel) {
            relations.push(rel.clone());
        }
    }

    let page = params.page.unwrap_or(1);
    if page < 1 {
        return Err(Error::InvalidPage(page));
    }
    let take = limits.resolve_take(params.limit)?;
    let take = i64::try_from(take).map_err(|_| Error::WindowOverflow)?;
    let skip = (page - 1).checked_mul(take).ok_or(Error::WindowOverflow)?;

    Ok(FindOptions {
        filter,
        relations,
        order,
        skip,
        take: Some(take),
        with_deleted: false,
    })
}

fn build_filter(params: &PaginationParams, catalog: &dyn FieldCatalog) -> Result<Criteria, Error> {
    let mut parts = Vec::with_capacity(params.filter.len());
    for (field, value) in &params.filter {
        let kind = queryable_kind(catalog, field)?;
        parts.push(field_criteria(field, kind, value)?);
    }
    Ok(Criteria::And(parts))
}

fn queryable_kind(catalog: &dyn FieldCatalog, field: &str) -> Result<FieldKind, Error> {
    let kind = catalog
        .field_kind(field)
        .ok_or_else(|| Error::UnknownField {
            entity: catalog.entity_name().to_owned(),
            field: field.to_owned(),
        })?;
    if !kind.is_queryable() {
        return Err(Error::NotQueryable(field.to_owned()));
    }
    Ok(kind)
}

fn field_criteria(field: &str, kind: FieldKind, value: &Value) -> Result<Criteria, Error> {
    match value {
        Value::Null => Ok(Criteria::is_null(field)),
        Value::Array(items) => in_criteria(field, kind, items),
        Value::Object(ops) => {
            if ops.is_empty() {
                return Err(Error::InvalidFilter(format!(
                    "empty operator object for '{field}'"
                )));
            }
            let mut parts = Vec::with_capacity(ops.len());
            for (op, operand) in ops {
                parts.push(operator_criteria(field, kind, op, operand)?);
            }
            Ok(match parts.len() {
                1 => parts.remove(0),
                _ => Criteria::And(parts),
            })
        }
        scalar => {
            check_scalar(field, kind, scalar)?;
            Ok(Criteria::eq(field, scalar.clone()))
        }
    }
}

fn in_criteria(field: &str, kind: FieldKind, items: &[Value]) -> Result<Criteria, Error> {
    for item in items {
        check_scalar(field, kind, item)?;
    }
    Ok(Criteria::in_list(field, items.iter().cloned()))
}

fn operator_criteria(
    field: &str,
    kind: FieldKind,
    op: &str,
    operand: &Value,
) -> Result<Criteria, Error> {
    let cmp = |op: CompareOp| -> Result<Criteria, Error> {
        check_scalar(field, kind, operand)?;
        Ok(Criteria::compare(field, op, operand.clone()))
    };
    match op {
        "eq" => cmp(CompareOp::Eq),
        "ne" => cmp(CompareOp::Ne),
        "gt" => cmp(CompareOp::Gt),
        "gte" => cmp(CompareOp::Ge),
        "lt" => cmp(CompareOp::Lt),
        "lte" => cmp(CompareOp::Le),
        "like" => {
            if kind != FieldKind::String {
                return Err(Error::InvalidFilter(format!(
                    "'like' is only supported on string fields, '{field}' is {kind}"
                )));
            }
            cmp(CompareOp::Like)
        }
        "in" => match operand {
            Value::Array(items) => in_criteria(field, kind, items),
            other => Err(Error::TypeMismatch {
                field: field.to_owned(),
                expected: kind,
                got: json_type_name(other),
            }),
        },
        "between" => match operand {
            Value::Array(bounds) if bounds.len() == 2 => {
                check_scalar(field, kind, &bounds[0])?;
                check_scalar(field, kind, &bounds[1])?;
                Ok(Criteria::between(field, bounds[0].clone(), bounds[1].clone()))
            }
            _ => Err(Error::InvalidFilter(format!(
                "'between' on '{field}' expects [low, high]"
            ))),
        },
        "is_null" => match operand {
            Value::Bool(true) => Ok(Criteria::is_null(field)),
            Value::Bool(false) => Ok(Criteria::is_not_null(field)),
            _ => Err(Error::InvalidFilter(format!(
                "'is_null' on '{field}' expects a boolean"
            ))),
        },
        other => Err(Error::InvalidFilter(format!(
            "unknown operator '{other}' on '{field}'"
        ))),
    }
}

fn check_scalar(field: &str, kind: FieldKind, value: &Value) -> Result<(), Error> {
    let ok = match value {
        Value::Null => {
            return Err(Error::InvalidFilter(format!(
                "null is only allowed as the whole value of '{field}' (IS NULL)"
            )));
        }
        Value::String(_) => kind.is_textual(),
        Value::Number(n) => match kind {
            FieldKind::Integer => n.is_i64() || n.is_u64(),
            FieldKind::Float => true,
            _ => false,
        },
        Value::Bool(_) => kind == FieldKind::Boolean,
        Value::Array(_) | Value::Object(_) => false,
    };
    if ok {
        Ok(())
    } else {
        Err(Error::TypeMismatch {
            field: field.to_owned(),
            expected: kind,
            got: json_type_name(value),
        })
    }
}
