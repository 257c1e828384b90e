use crate::{Criteria, OrderKey};

/// Structured input of a list query: `{ where, relations, order, skip, take }`.
///
/// `skip`/`take` stay signed so that negative values coming from callers can be
/// rejected with a validation error instead of wrapping.
#[derive(Clone, Debug, Default, PartialEq)]
#[must_use]
pub struct FindOptions {
    pub filter: Criteria,
    pub relations: Vec<String>,
    pub order: Vec<OrderKey>,
    pub skip: i64,
    pub take: Option<i64>,
    /// Include soft-deleted rows.
    pub with_deleted: bool,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Criteria) -> Self {
        self.filter = filter;
        self
    }

    pub fn relation(mut self, relation: impl Into<String>) -> Self {
        self.relations.push(relation.into());
        self
    }

    pub fn order_by(mut self, key: OrderKey) -> Self {
        self.order.push(key);
        self
    }

    pub fn skip(mut self, skip: i64) -> Self {
        self.skip = skip;
        self
    }

    pub fn take(mut self, take: i64) -> Self {
        self.take = Some(take);
        self
    }

    pub fn with_deleted(mut self) -> Self {
        self.with_deleted = true;
        self
    }
}
