#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! Query primitives shared by every storage engine.
//!
//! - [`Criteria`]: the engine-neutral predicate tree every adapter translates.
//! - [`PaginationParams`]: untrusted caller input (`where`, `order`, `relations`,
//!   `page`, `limit`).
//! - [`normalize`]: turns params into [`FindOptions`] after whitelisting every
//!   field and relation against a [`FieldCatalog`].
//! - [`Pagination`]: the `{ items, total }` result of every list query.
pub mod criteria;
pub mod errors;
pub mod limits;
pub mod normalize;
pub mod options;
pub mod params;
pub mod schema;

pub use criteria::{CompareOp, Criteria};
pub use errors::Error;
pub use limits::QueryLimits;
pub use normalize::normalize;
pub use options::FindOptions;
pub use params::{OrderBy, PaginationParams};
pub use schema::{FieldCatalog, FieldKind};

// Ordering primitives
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum SortDir {
    #[serde(rename = "ASC", alias = "asc", alias = "Asc")]
    Asc,
    #[serde(rename = "DESC", alias = "desc", alias = "Desc")]
    Desc,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderKey {
    pub field: String,
    pub dir: SortDir,
}

impl OrderKey {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            dir: SortDir::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            dir: SortDir::Desc,
        }
    }
}

/// Result of every list-style query.
///
/// `items` is fully materialized and holds at most `take` rows; `total` counts
/// every row matching the filter regardless of `skip`/`take`.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Pagination<T> {
    pub items: Vec<T>,
    pub total: u64,
}

impl<T> Pagination<T> {
    /// Convert items with a fallible mapper, stopping at the first error.
    ///
    /// # Errors
    /// Returns the first error produced by `f`.
    pub fn try_map<U, E, F>(self, f: F) -> Result<Pagination<U>, E>
    where
        F: FnMut(T) -> Result<U, E>,
    {
        Ok(Pagination {
            items: self.items.into_iter().map(f).collect::<Result<_, _>>()?,
            total: self.total,
        })
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_sort_dir_accepts_both_cases() {
        let up: SortDir = serde_json::from_str("\"ASC\"").unwrap();
        let down: SortDir = serde_json::from_str("\"desc\"").unwrap();
        assert_eq!(up, SortDir::Asc);
        assert_eq!(down, SortDir::Desc);
    }

    #[test]
    fn test_pagination_try_map_keeps_total() {
        let page = Pagination {
            items: vec!["1", "2", "3"],
            total: 10,
        };
        let mapped = page.try_map(str::parse::<u8>).unwrap();
        assert_eq!(mapped.items, vec![1, 2, 3]);
        assert_eq!(mapped.total, 10);

        let bad = Pagination {
            items: vec!["1", "x"],
            total: 2,
        };
        assert!(bad.try_map(str::parse::<u8>).is_err());
    }

    #[test]
    fn test_pagination_serializes_as_items_total() {
        let page = Pagination {
            items: vec!["a"],
            total: 1,
        };
        let json = serde_json::to_value(&page).unwrap();
        assert_eq!(json, serde_json::json!({ "items": ["a"], "total": 1 }));
    }
}
