//! Engine-neutral predicate tree.
//!
//! Every storage engine translates a [`Criteria`] into its native query form.
//! The semantics below are shared by all of them:
//!
//! | Node | Meaning |
//! |------|---------|
//! | `And([])` | true |
//! | `Or([])` | false |
//! | `In { values: [] }` | false |
//! | `Compare` with a JSON `null` value | rejected, use `IsNull` / `IsNotNull` |
//! | `Compare { op: Ne }` | SQL `<>`: rows where the column is NULL never match |
//!
//! Values are plain JSON; adapters coerce them to the column's storage type.

use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    /// SQL `LIKE` with the pattern exactly as supplied (`%` and `_` are wildcards).
    Like,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Criteria {
    And(Vec<Criteria>),
    Or(Vec<Criteria>),
    Not(Box<Criteria>),
    Compare {
        field: String,
        op: CompareOp,
        value: Value,
    },
    In {
        field: String,
        values: Vec<Value>,
    },
    IsNull(String),
    IsNotNull(String),
    /// Inclusive range: `low <= field <= high`.
    Between {
        field: String,
        low: Value,
        high: Value,
    },
}

impl Default for Criteria {
    fn default() -> Self {
        Self::all()
    }
}

impl Criteria {
    /// Matches every row.
    #[must_use]
    pub fn all() -> Self {
        Self::And(Vec::new())
    }

    /// Matches no row.
    #[must_use]
    pub fn none() -> Self {
        Self::Or(Vec::new())
    }

    pub fn compare(field: impl Into<String>, op: CompareOp, value: impl Into<Value>) -> Self {
        Self::Compare {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Eq, value)
    }

    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Ne, value)
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Gt, value)
    }

    pub fn ge(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Ge, value)
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Lt, value)
    }

    pub fn le(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Le, value)
    }

    pub fn like(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::compare(field, CompareOp::Like, Value::String(pattern.into()))
    }

    pub fn in_list<I, V>(field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::In {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_null(field: impl Into<String>) -> Self {
        Self::IsNull(field.into())
    }

    pub fn is_not_null(field: impl Into<String>) -> Self {
        Self::IsNotNull(field.into())
    }

    pub fn between(
        field: impl Into<String>,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> Self {
        Self::Between {
            field: field.into(),
            low: low.into(),
            high: high.into(),
        }
    }

    /// Combine with AND, flattening nested conjunctions.
    #[must_use]
    pub fn and(self, other: Criteria) -> Criteria {
        let mut parts = match self {
            Criteria::And(parts) => parts,
            single => vec![single],
        };
        match other {
            Criteria::And(more) => parts.extend(more),
            single => parts.push(single),
        }
        Criteria::And(parts)
    }

    /// Combine with OR.
    #[must_use]
    pub fn or(self, other: Criteria) -> Criteria {
        let mut parts = match self {
            Criteria::Or(parts) => parts,
            single => vec![single],
        };
        match other {
            Criteria::Or(more) => parts.extend(more),
            single => parts.push(single),
        }
        Criteria::Or(parts)
    }

    /// Negate this predicate.
    #[must_use]
    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Criteria {
        !self
    }

    /// `true` when this node is the empty conjunction.
    #[must_use]
    pub fn is_all(&self) -> bool {
        matches!(self, Criteria::And(parts) if parts.is_empty())
    }

    /// Every field name referenced anywhere in the tree.
    #[must_use]
    pub fn fields(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Criteria::And(parts) | Criteria::Or(parts) => {
                for p in parts {
                    p.collect_fields(out);
                }
            }
            Criteria::Not(inner) => inner.collect_fields(out),
            Criteria::Compare { field, .. }
            | Criteria::In { field, .. }
            | Criteria::Between { field, .. }
            | Criteria::IsNull(field)
            | Criteria::IsNotNull(field) => out.push(field.as_str()),
        }
    }
}

impl std::ops::Not for Criteria {
    type Output = Criteria;

    fn not(self) -> Self::Output {
        Criteria::Not(Box::new(self))
    }
}
