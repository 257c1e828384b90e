#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! Tenant-aware data access over two storage engines.
//!
//! An entity is described once ([`EntityRegistry`]), sealed into an immutable
//! [`SchemaCatalog`], and served by a pair of repository adapters: one on
//! `SeaORM`, one on sqlx, both sharing a single SQLite pool opened by
//! [`DbHandle`]. [`Repositories`] picks the active write engine from
//! configuration; [`CrudService`] and [`TenantCrudService`] are built on the
//! [`RepositoryAdapter`] trait only.
//!
//! # Example
//! ```rust,no_run
//! use tenancy_db::{ColumnSpec, DataConfig, EntityOptions, EntityRegistry, Repositories};
//!
//! # async fn demo() -> tenancy_db::Result<()> {
//! let mut registry = EntityRegistry::new();
//! registry.describe_entity("employee", EntityOptions::organization())?;
//! registry.describe_column("employee", ColumnSpec::string("last_name"))?;
//! let catalog = registry.seal()?;
//!
//! let repos = Repositories::connect(&DataConfig::default(), catalog).await?;
//! tenancy_db::bootstrap_schema(&repos, repos.active_engine()).await?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sea_orm::sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sea_orm::sqlx::SqlitePool;
use sea_orm::{DatabaseConnection, SqlxSqliteConnector};
use tracing::info;

pub mod config;
pub mod engine;
pub mod error;
pub mod metadata;
pub mod repositories;
pub mod schema;
pub mod scope;
pub mod service;
pub mod values;

mod pool_opts;

pub use config::{DataConfig, DatabaseConfig, PoolCfg};
pub use engine::{
    AdapterQuery, Engine, LiveColumn, RawQuery, RepositoryAdapter, SeaBackend, SeaRepository,
    SqlxBackend, SqlxRepository, TableRepository,
};
pub use error::{ConstraintKind, DataError, Result, ValidationError};
pub use metadata::{
    Cardinality, ColumnSpec, ColumnType, EntityDescriptor, EntityOptions, EntityRegistry,
    IndexSpec, ReferentialAction, RelationSpec, SchemaCatalog, TenantScope,
};
pub use repositories::{RepositoryPair, Repositories, TxRepositories};
pub use schema::{Mismatch, SchemaDiff, bootstrap_schema, schema_diff};
pub use service::{CrudService, Entity, TenantCrudService, UpdateResult};
pub use values::Record;

use pool_opts::ApplyPoolOpts;

/// Kinds of DSN recognized by [`DbHandle::detect`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DbKind {
    Sqlite,
    Postgres,
    MySql,
}

impl DbKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            DbKind::Sqlite => "sqlite",
            DbKind::Postgres => "postgres",
            DbKind::MySql => "mysql",
        }
    }
}

const DEFAULT_SQLITE_BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

/// Connection options.
#[derive(Clone, Debug)]
pub struct ConnectOpts {
    /// Maximum number of connections in the pool. In-memory databases always use one.
    pub max_conns: Option<u32>,
    pub min_conns: Option<u32>,
    /// How long a caller waits for a pooled connection before `ResourceExhausted`.
    pub acquire_timeout: Option<Duration>,
    pub idle_timeout: Option<Duration>,
    pub max_lifetime: Option<Duration>,
    pub test_before_acquire: bool,
    /// For `SQLite` file DSNs, create parent directories if missing.
    pub create_sqlite_dirs: bool,
    /// `PRAGMA busy_timeout` for file databases.
    pub busy_timeout: Duration,
}

impl Default for ConnectOpts {
    fn default() -> Self {
        Self {
            max_conns: Some(10),
            min_conns: None,
            acquire_timeout: Some(Duration::from_secs(30)),
            idle_timeout: None,
            max_lifetime: None,
            test_before_acquire: false,
            create_sqlite_dirs: true,
            busy_timeout: DEFAULT_SQLITE_BUSY_TIMEOUT,
        }
    }
}

/// One SQLite pool and the `SeaORM` connection built on top of it.
#[derive(Clone, Debug)]
pub struct DbHandle {
    pool: SqlitePool,
    sea: DatabaseConnection,
    dsn: String,
}

fn is_memory_dsn(dsn: &str) -> bool {
    dsn.contains(":memory:") || dsn.contains("mode=memory")
}

impl DbHandle {
    /// Detect the DSN kind by scheme.
    ///
    /// # Errors
    /// `DataError::Configuration` for an unknown scheme.
    pub fn detect(dsn: &str) -> Result<DbKind> {
        let s = dsn.trim_start();
        if s.starts_with("postgres://") || s.starts_with("postgresql://") {
            Ok(DbKind::Postgres)
        } else if s.starts_with("mysql://") {
            Ok(DbKind::MySql)
        } else if s.starts_with("sqlite:") {
            Ok(DbKind::Sqlite)
        } else {
            Err(DataError::config(format!("unknown DSN scheme: {dsn}")))
        }
    }

    /// Open the shared pool.
    ///
    /// Every connection enables foreign keys. File databases get WAL and a
    /// busy timeout; in-memory databases are pinned to one connection that
    /// never expires, since each SQLite memory connection is its own database.
    ///
    /// # Errors
    /// `Configuration` for unsupported or malformed DSNs, translated engine
    /// errors otherwise.
    pub async fn connect(dsn: &str, opts: ConnectOpts) -> Result<Self> {
        let kind = Self::detect(dsn)?;
        if kind != DbKind::Sqlite {
            return Err(DataError::config(format!(
                "{} DSNs are not supported; the sqlx engine renders SQLite only",
                kind.as_str()
            )));
        }
        let dsn = dsn.trim();
        let memory = is_memory_dsn(dsn);

        let mut options = SqliteConnectOptions::from_str(dsn)
            .map_err(|e| DataError::config(format!("invalid SQLite DSN '{dsn}': {e}")))?
            .foreign_keys(true);
        if !memory {
            options = options
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
                .busy_timeout(opts.busy_timeout);
            if opts.create_sqlite_dirs {
                prepare_parent(options.get_filename())?;
            }
        }

        let mut pool_opts = SqlitePoolOptions::new().apply(&opts);
        if memory {
            pool_opts = pool_opts
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }
        let pool = pool_opts
            .connect_with(options)
            .await
            .map_err(|e| error::from_sqlx(e, None))?;
        let sea = SqlxSqliteConnector::from_sqlx_sqlite_pool(pool.clone());

        info!(dsn, memory, "database pool opened");
        Ok(Self {
            pool,
            sea,
            dsn: dsn.to_owned(),
        })
    }

    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    #[must_use]
    pub fn sea(&self) -> &DatabaseConnection {
        &self.sea
    }

    #[must_use]
    pub fn dsn(&self) -> &str {
        &self.dsn
    }

    /// Graceful pool close.
    pub async fn close(self) {
        self.pool.close().await;
    }
}

fn prepare_parent(file: &Path) -> Result<()> {
    match file.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => std::fs::create_dir_all(dir).map_err(|e| {
            DataError::config(format!("cannot create '{}': {e}", dir.display()))
        }),
        _ => Ok(()),
    }
}
