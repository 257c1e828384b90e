//! Criteria → engine-neutral predicate with encoded operands.
//!
//! Both backends render a [`Pred`], never a raw [`Criteria`], so field checks,
//! value encoding and the degenerate cases are decided once:
//! empty `AND` is true, empty `OR` is false, empty `IN` is false.

use tenancy_query::{CompareOp, Criteria};

use crate::error::{DataError, Result};
use crate::metadata::{ColumnSpec, EntityDescriptor};
use crate::values::{self, SqlValue};

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Pred {
    Const(bool),
    And(Vec<Pred>),
    Or(Vec<Pred>),
    Not(Box<Pred>),
    Cmp {
        column: String,
        op: CompareOp,
        value: SqlValue,
    },
    In {
        column: String,
        values: Vec<SqlValue>,
    },
    IsNull(String),
    IsNotNull(String),
    Between {
        column: String,
        low: SqlValue,
        high: SqlValue,
    },
}

pub(crate) fn compile(desc: &EntityDescriptor, criteria: &Criteria) -> Result<Pred> {
    Ok(match criteria {
        Criteria::And(items) if items.is_empty() => Pred::Const(true),
        Criteria::Or(items) if items.is_empty() => Pred::Const(false),
        Criteria::And(items) => Pred::And(
            items
                .iter()
                .map(|c| compile(desc, c))
                .collect::<Result<_>>()?,
        ),
        Criteria::Or(items) => Pred::Or(
            items
                .iter()
                .map(|c| compile(desc, c))
                .collect::<Result<_>>()?,
        ),
        Criteria::Not(inner) => Pred::Not(Box::new(compile(desc, inner)?)),
        Criteria::Compare { field, op, value } => {
            let column = column(desc, field)?;
            let value = if *op == CompareOp::Like {
                like_operand(column, value)?
            } else {
                values::encode_operand(column, value)?
            };
            Pred::Cmp {
                column: column.name.clone(),
                op: *op,
                value,
            }
        }
        Criteria::In { field, values: items } if items.is_empty() => {
            column(desc, field)?;
            Pred::Const(false)
        }
        Criteria::In { field, values: items } => {
            let column = column(desc, field)?;
            Pred::In {
                column: column.name.clone(),
                values: items
                    .iter()
                    .map(|v| values::encode_operand(column, v))
                    .collect::<Result<_>>()?,
            }
        }
        Criteria::IsNull(field) => Pred::IsNull(column(desc, field)?.name.clone()),
        Criteria::IsNotNull(field) => Pred::IsNotNull(column(desc, field)?.name.clone()),
        Criteria::Between { field, low, high } => {
            let column = column(desc, field)?;
            Pred::Between {
                column: column.name.clone(),
                low: values::encode_operand(column, low)?,
                high: values::encode_operand(column, high)?,
            }
        }
    })
}

/// Validate an order/projection column name against the descriptor.
pub(crate) fn column<'a>(desc: &'a EntityDescriptor, field: &str) -> Result<&'a ColumnSpec> {
    desc.column(field).ok_or_else(|| {
        tenancy_query::Error::UnknownField {
            entity: desc.table().to_owned(),
            field: field.to_owned(),
        }
        .into()
    })
}

fn like_operand(column: &ColumnSpec, value: &serde_json::Value) -> Result<SqlValue> {
    if !column.ty.kind().is_textual() {
        return Err(DataError::field(
            &column.name,
            "LIKE is only supported on text columns",
        ));
    }
    value
        .as_str()
        .map(|s| SqlValue::Text(s.to_owned()))
        .ok_or_else(|| DataError::field(&column.name, "LIKE pattern must be a string"))
}
