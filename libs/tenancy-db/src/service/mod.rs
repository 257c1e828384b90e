//! Entity-typed services on top of [`RepositoryAdapter`](crate::RepositoryAdapter).
//!
//! [`CrudService`] is pure mechanism: no tenant knowledge, used directly by
//! seeders and tooling. [`TenantCrudService`] wraps it and scopes every verb to
//! the caller's [`RequestContext`](tenancy_security::RequestContext).

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

mod crud;
mod tenant;

pub use crud::CrudService;
pub use tenant::TenantCrudService;

/// A typed view of one registered table.
///
/// Field names must match column names; relation fields, when present, must
/// be named after the relation and are only populated when eager loaded.
pub trait Entity: Serialize + DeserializeOwned + Send + Sync + 'static {
    const TABLE: &'static str;
}

/// Outcome of a bulk update.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateResult {
    pub affected: u64,
}
