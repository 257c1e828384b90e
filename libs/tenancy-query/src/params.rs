//! Inbound query contract of every list endpoint.
//!
//! ```json
//! {
//!   "where": { "last_name": "Silva", "age": { "gte": 18 }, "ended_at": null },
//!   "relations": ["department"],
//!   "order": { "last_name": "ASC", "first_name": "DESC" },
//!   "page": 2,
//!   "limit": 20
//! }
//! ```

use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::{OrderKey, SortDir};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PaginationParams {
    /// Partial field map; see [`normalize`](crate::normalize) for value forms.
    #[serde(default, rename = "where")]
    pub filter: Map<String, Value>,
    #[serde(default)]
    pub relations: Vec<String>,
    #[serde(default)]
    pub order: OrderBy,
    /// 1-indexed page number (default 1).
    #[serde(default)]
    pub page: Option<i64>,
    /// Page size (default and cap from `QueryLimits`).
    #[serde(default)]
    pub limit: Option<i64>,
}

impl PaginationParams {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn page(mut self, page: i64, limit: i64) -> Self {
        self.page = Some(page);
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub fn filter(mut self, field: impl Into<String>, value: Value) -> Self {
        self.filter.insert(field.into(), value);
        self
    }

    #[must_use]
    pub fn relation(mut self, relation: impl Into<String>) -> Self {
        self.relations.push(relation.into());
        self
    }

    #[must_use]
    pub fn order(mut self, field: impl Into<String>, dir: SortDir) -> Self {
        self.order.0.push(OrderKey {
            field: field.into(),
            dir,
        });
        self
    }
}

/// Ordered list of sort keys, written on the wire as a JSON object whose key
/// order is the sort priority.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OrderBy(pub Vec<OrderKey>);

impl OrderBy {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for OrderBy {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for key in &self.0 {
            map.serialize_entry(&key.field, &key.dir)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for OrderBy {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct OrderVisitor;

        impl<'de> Visitor<'de> for OrderVisitor {
            type Value = OrderBy;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of field name to \"ASC\" or \"DESC\"")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<OrderBy, A::Error> {
                let mut keys = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((field, dir)) = access.next_entry::<String, SortDir>()? {
                    keys.push(OrderKey { field, dir });
                }
                Ok(OrderBy(keys))
            }
        }

        deserializer.deserialize_map(OrderVisitor)
    }
}
