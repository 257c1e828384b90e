//! Repository adapters: one uniform CRUD surface per entity per engine.
//!
//! [`TableRepository`] holds the engine-neutral part (encoding, id generation,
//! eager loading, not-found sentinels); a [`SqlBackend`] renders and executes
//! statements natively:
//!
//! - [`SeaBackend`]: `sea_query` statements on a `SeaORM` connection.
//! - [`SqlxBackend`]: `sqlx::QueryBuilder` on the sqlx pool.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tenancy_query::{Criteria, OrderKey};
use tenancy_security::AccessScope;
use uuid::Uuid;

use crate::error::{DataError, Result};
use crate::metadata::{ColumnType, EntityDescriptor};
use crate::values::Record;

mod repository;
mod eager;
pub(crate) mod predicate;
mod sea_engine;
mod sqlx_engine;

pub use repository::TableRepository;
pub use sea_engine::{SeaBackend, SeaRepository};
pub use sqlx_engine::{SqlxBackend, SqlxRepository};

pub(crate) use repository::SqlBackend;
pub(crate) use sea_engine::{SeaExecutor, column_def, join_column_def};
pub(crate) use sqlx_engine::{SqlxExecutor, column_sql, join_column_sql};

/// Storage engine serving an adapter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Engine {
    #[default]
    SeaOrm,
    Sqlx,
}

impl Engine {
    pub const ALL: [Engine; 2] = [Engine::SeaOrm, Engine::Sqlx];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Engine::SeaOrm => "sea_orm",
            Engine::Sqlx => "sqlx",
        }
    }

    /// The engine that is not `self`.
    #[must_use]
    pub fn other(self) -> Engine {
        match self {
            Engine::SeaOrm => Engine::Sqlx,
            Engine::Sqlx => Engine::SeaOrm,
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Engine {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sea_orm" | "sea-orm" | "seaorm" => Ok(Engine::SeaOrm),
            "sqlx" => Ok(Engine::Sqlx),
            other => Err(DataError::config(format!(
                "unknown engine '{other}', expected 'sea_orm' or 'sqlx'"
            ))),
        }
    }
}

/// Low-level list query.
///
/// `scope` is applied to eager-loaded relations; the root filter must already
/// contain it.
#[derive(Clone, Debug, Default, PartialEq)]
#[must_use]
pub struct AdapterQuery {
    pub filter: Criteria,
    pub relations: Vec<String>,
    pub order: Vec<OrderKey>,
    pub offset: u64,
    pub limit: Option<u64>,
    pub scope: Option<AccessScope>,
}

impl AdapterQuery {
    pub fn new(filter: Criteria) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }

    pub fn relation(mut self, relation: impl Into<String>) -> Self {
        self.relations.push(relation.into());
        self
    }

    pub fn order_by(mut self, key: OrderKey) -> Self {
        self.order.push(key);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn scope(mut self, scope: AccessScope) -> Self {
        self.scope = Some(scope);
        self
    }
}

/// Escape hatch for statements the criteria tree cannot express.
///
/// `sql` is SQLite dialect with `?` placeholders; `columns` declares the output
/// columns so both engines decode rows the same way.
#[derive(Clone, Debug, Default, PartialEq)]
#[must_use]
pub struct RawQuery {
    pub sql: String,
    pub params: Vec<Value>,
    pub columns: Vec<(String, ColumnType)>,
}

impl RawQuery {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            ..Self::default()
        }
    }

    pub fn bind(mut self, value: impl Into<Value>) -> Self {
        self.params.push(value.into());
        self
    }

    pub fn column(mut self, name: impl Into<String>, ty: ColumnType) -> Self {
        self.columns.push((name.into(), ty));
        self
    }
}

/// One row of `PRAGMA table_info`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LiveColumn {
    pub name: String,
    pub declared_type: String,
    pub not_null: bool,
    pub primary_key: bool,
}

/// Uniform CRUD surface of one entity on one engine.
///
/// Lookups that miss return `None` / `false` / `0`; only
/// [`find_one_or_fail`](Self::find_one_or_fail) turns a miss into
/// [`DataError::NotFound`]. Engine errors are already translated.
#[async_trait]
pub trait RepositoryAdapter: Send + Sync {
    fn engine(&self) -> Engine;

    fn descriptor(&self) -> &EntityDescriptor;

    async fn find(&self, query: &AdapterQuery) -> Result<Vec<Record>>;

    async fn find_one(&self, filter: &Criteria) -> Result<Option<Record>> {
        let query = AdapterQuery::new(filter.clone()).limit(1);
        Ok(self.find(&query).await?.into_iter().next())
    }

    async fn find_one_or_fail(&self, filter: &Criteria) -> Result<Record> {
        self.find_one(filter)
            .await?
            .ok_or_else(|| DataError::not_found(self.descriptor().table()))
    }

    async fn count(&self, filter: &Criteria) -> Result<u64>;

    /// Insert a row; a missing `id` is generated. Returns the stored row.
    async fn insert(&self, record: Record) -> Result<Record>;

    /// Returns `None` when no row has `id`.
    async fn update_by_id(&self, id: Uuid, patch: Record) -> Result<Option<Record>>;

    /// Number of rows matched.
    async fn update_where(&self, filter: &Criteria, patch: Record) -> Result<u64>;

    async fn delete_by_id(&self, id: Uuid) -> Result<bool>;

    async fn delete_where(&self, filter: &Criteria) -> Result<u64>;

    /// Link row `id` to `targets` through a many-to-many relation. Existing
    /// links are kept; returns the number of new links.
    ///
    /// The row and every target must be live (and inside `scope` when given),
    /// otherwise nothing is linked and [`DataError::NotFound`] is returned.
    async fn link(
        &self,
        relation: &str,
        id: Uuid,
        targets: &[Uuid],
        scope: Option<&AccessScope>,
    ) -> Result<u64>;

    /// Remove links from row `id` to `targets`; returns the number removed.
    async fn unlink(
        &self,
        relation: &str,
        id: Uuid,
        targets: &[Uuid],
        scope: Option<&AccessScope>,
    ) -> Result<u64>;

    async fn raw_query(&self, query: &RawQuery) -> Result<Vec<Record>>;

    /// Create this entity's table, indexes and owned join tables.
    async fn create_table(&self) -> Result<()>;

    /// Live column list of `table` as seen through this engine.
    async fn describe_table(&self, table: &str) -> Result<Vec<LiveColumn>>;
}
