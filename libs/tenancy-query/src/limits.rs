//! Safety caps applied to every list query.
//!
//! - `default_take`: page size when the caller gives none
//! - `max_take`: hard ceiling; larger requests are clamped, never rejected
//! - `max_order_fields`: number of sort keys accepted from callers

use crate::Error;

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct QueryLimits {
    /// Page size used when none is supplied (default: 100)
    pub default_take: u64,
    /// Maximum page size (default: 1000)
    pub max_take: u64,
    /// Maximum number of order keys (default: 5)
    pub max_order_fields: usize,
}

impl Default for QueryLimits {
    fn default() -> Self {
        Self {
            default_take: 100,
            max_take: 1000,
            max_order_fields: 5,
        }
    }
}

impl QueryLimits {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_default_take(mut self, take: u64) -> Self {
        self.default_take = take;
        self
    }

    #[must_use]
    pub fn with_max_take(mut self, take: u64) -> Self {
        self.max_take = take;
        self
    }

    #[must_use]
    pub fn with_max_order_fields(mut self, max: usize) -> Self {
        self.max_order_fields = max;
        self
    }

    /// Resolve a requested page size: `None` → default, clamped to `max_take`.
    ///
    /// # Errors
    /// Returns `Error::InvalidLimit` for values `<= 0`.
    pub fn resolve_take(&self, requested: Option<i64>) -> Result<u64, Error> {
        let effective_max = self.max_take.max(1);
        match requested {
            None => Ok(self.default_take.clamp(1, effective_max)),
            Some(v) if v <= 0 => Err(Error::InvalidLimit(v)),
            Some(v) => Ok(u64::try_from(v).map_or(effective_max, |v| v.min(effective_max))),
        }
    }

    /// Validate a row offset.
    ///
    /// # Errors
    /// Returns `Error::InvalidSkip` for negative values.
    pub fn resolve_skip(&self, skip: i64) -> Result<u64, Error> {
        u64::try_from(skip).map_err(|_| Error::InvalidSkip(skip))
    }

    /// Validate the number of order keys.
    ///
    /// # Errors
    /// Returns `Error::TooManyOrderFields` when over the cap.
    pub fn validate_order_len(&self, len: usize) -> Result<(), Error> {
        if len > self.max_order_fields {
            return Err(Error::TooManyOrderFields {
                max: self.max_order_fields,
            });
        }
        Ok(())
    }
}
