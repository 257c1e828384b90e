//! The data source: one repository pair per entity, the active-engine switch,
//! and transaction scopes.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use tenancy_query::QueryLimits;
use tracing::{debug, info, warn};

use crate::config::DataConfig;
use crate::engine::{
    Engine, RepositoryAdapter, SeaBackend, SeaExecutor, SeaRepository, SqlxBackend, SqlxExecutor,
    SqlxRepository, TableRepository,
};
use crate::error::{DataError, Result};
use crate::metadata::SchemaCatalog;
use crate::service::{CrudService, Entity, TenantCrudService};
use crate::DbHandle;

/// Both adapters of one entity. They address the same physical table.
#[derive(Clone, Debug)]
pub struct RepositoryPair {
    sea: Arc<SeaRepository>,
    sqlx: Arc<SqlxRepository>,
}

impl RepositoryPair {
    #[must_use]
    pub fn get(&self, engine: Engine) -> Arc<dyn RepositoryAdapter> {
        match engine {
            Engine::SeaOrm => self.sea.clone(),
            Engine::Sqlx => self.sqlx.clone(),
        }
    }

    #[must_use]
    pub fn sea(&self) -> &SeaRepository {
        &self.sea
    }

    #[must_use]
    pub fn sqlx(&self) -> &SqlxRepository {
        &self.sqlx
    }
}

/// Built once at startup and shared; cloning is cheap.
#[derive(Clone, Debug)]
pub struct Repositories {
    catalog: Arc<SchemaCatalog>,
    handle: DbHandle,
    active: Engine,
    limits: QueryLimits,
    pairs: Arc<HashMap<String, RepositoryPair>>,
}

impl Repositories {
    #[must_use]
    pub fn new(handle: DbHandle, catalog: Arc<SchemaCatalog>, active: Engine) -> Self {
        let sea = SeaBackend::new(SeaExecutor::Conn(handle.sea().clone()));
        let sqlx = SqlxBackend::new(SqlxExecutor::Pool(handle.pool().clone()));
        let pairs = catalog
            .entities()
            .iter()
            .map(|desc| {
                let pair = RepositoryPair {
                    sea: Arc::new(TableRepository::new(
                        sea.clone(),
                        catalog.clone(),
                        desc.clone(),
                    )),
                    sqlx: Arc::new(TableRepository::new(
                        sqlx.clone(),
                        catalog.clone(),
                        desc.clone(),
                    )),
                };
                (desc.table().to_owned(), pair)
            })
            .collect();
        Self {
            catalog,
            handle,
            active,
            limits: QueryLimits::default(),
            pairs: Arc::new(pairs),
        }
    }

    #[must_use]
    pub fn with_limits(mut self, limits: QueryLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Open the pool described by `config` and bind every entity of `catalog`.
    ///
    /// # Errors
    /// Connection failures and unsupported DSNs.
    pub async fn connect(config: &DataConfig, catalog: Arc<SchemaCatalog>) -> Result<Self> {
        let handle = DbHandle::connect(&config.database.dsn, config.connect_opts()).await?;
        let repos = Self::new(handle, catalog, config.database.active_engine)
            .with_limits(config.pagination.clone());
        info!(
            active = %repos.active,
            entities = repos.pairs.len(),
            "repositories ready"
        );
        Ok(repos)
    }

    #[must_use]
    pub fn catalog(&self) -> &Arc<SchemaCatalog> {
        &self.catalog
    }

    #[must_use]
    pub fn handle(&self) -> &DbHandle {
        &self.handle
    }

    #[must_use]
    pub fn active_engine(&self) -> Engine {
        self.active
    }

    #[must_use]
    pub fn limits(&self) -> &QueryLimits {
        &self.limits
    }

    /// # Errors
    /// `Configuration` for an unregistered table.
    pub fn pair(&self, table: &str) -> Result<&RepositoryPair> {
        self.pairs
            .get(table)
            .ok_or_else(|| DataError::config(format!("entity '{table}' is not registered")))
    }

    /// Adapter on the configured write engine.
    ///
    /// # Errors
    /// Unregistered table.
    pub fn active(&self, table: &str) -> Result<Arc<dyn RepositoryAdapter>> {
        self.adapter(self.active, table)
    }

    /// Adapter on the other engine, for read replicas and tooling.
    ///
    /// # Errors
    /// Unregistered table.
    pub fn standby(&self, table: &str) -> Result<Arc<dyn RepositoryAdapter>> {
        self.adapter(self.active.other(), table)
    }

    /// # Errors
    /// Unregistered table.
    pub fn adapter(&self, engine: Engine, table: &str) -> Result<Arc<dyn RepositoryAdapter>> {
        Ok(self.pair(table)?.get(engine))
    }

    /// Generic service for `T` on the active engine.
    ///
    /// # Errors
    /// `T::TABLE` is not registered.
    pub fn crud<T: Entity>(&self) -> Result<CrudService<T>> {
        Ok(CrudService::new(self.active(T::TABLE)?, self.limits.clone()))
    }

    /// Tenant-scoped service for `T` on the active engine.
    ///
    /// # Errors
    /// `T::TABLE` is not registered or is a global entity.
    pub fn tenant_crud<T: Entity>(&self) -> Result<TenantCrudService<T>> {
        TenantCrudService::new(self.crud()?)
    }

    /// Run `f` in a transaction on the active engine.
    ///
    /// Commits when `f` returns `Ok`, rolls back on `Err`. Adapters obtained
    /// from `self` inside `f` are not part of the transaction; use the
    /// [`TxRepositories`] handed to `f`.
    ///
    /// # Errors
    /// The error of `f`, or a failure to begin/commit.
    pub async fn with_transaction<T, F>(&self, f: F) -> Result<T>
    where
        T: Send,
        F: for<'a> FnOnce(&'a TxRepositories) -> BoxFuture<'a, Result<T>> + Send,
    {
        self.with_transaction_on(self.active, f).await
    }

    /// [`with_transaction`](Self::with_transaction) on a specific engine.
    ///
    /// # Errors
    /// The error of `f`, or a failure to begin/commit.
    pub async fn with_transaction_on<T, F>(&self, engine: Engine, f: F) -> Result<T>
    where
        T: Send,
        F: for<'a> FnOnce(&'a TxRepositories) -> BoxFuture<'a, Result<T>> + Send,
    {
        let backend = match engine {
            Engine::SeaOrm => TxBackend::Sea(SeaBackend::new(
                SeaExecutor::begin(self.handle.sea()).await?,
            )),
            Engine::Sqlx => TxBackend::Sqlx(SqlxBackend::new(
                SqlxExecutor::begin(self.handle.pool()).await?,
            )),
        };
        let tx = TxRepositories {
            catalog: self.catalog.clone(),
            limits: self.limits.clone(),
            backend,
        };
        debug!(%engine, "transaction started");

        match f(&tx).await {
            Ok(value) => {
                tx.finish(true).await?;
                debug!(%engine, "transaction committed");
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback) = tx.finish(false).await {
                    warn!(%engine, error = %rollback, "rollback failed");
                }
                debug!(%engine, error = %err, "transaction rolled back");
                Err(err)
            }
        }
    }
}

#[derive(Clone, Debug)]
enum TxBackend {
    Sea(SeaBackend),
    Sqlx(SqlxBackend),
}

/// Adapters and services bound to one open transaction.
#[derive(Debug)]
pub struct TxRepositories {
    catalog: Arc<SchemaCatalog>,
    limits: QueryLimits,
    backend: TxBackend,
}

impl TxRepositories {
    #[must_use]
    pub fn engine(&self) -> Engine {
        match self.backend {
            TxBackend::Sea(_) => Engine::SeaOrm,
            TxBackend::Sqlx(_) => Engine::Sqlx,
        }
    }

    /// # Errors
    /// Unregistered table.
    pub fn adapter(&self, table: &str) -> Result<Arc<dyn RepositoryAdapter>> {
        let desc = self.catalog.entity(table)?.clone();
        Ok(match &self.backend {
            TxBackend::Sea(b) => Arc::new(TableRepository::new(b.clone(), self.catalog.clone(), desc)),
            TxBackend::Sqlx(b) => {
                Arc::new(TableRepository::new(b.clone(), self.catalog.clone(), desc))
            }
        })
    }

    /// # Errors
    /// `T::TABLE` is not registered.
    pub fn crud<T: Entity>(&self) -> Result<CrudService<T>> {
        Ok(CrudService::new(self.adapter(T::TABLE)?, self.limits.clone()))
    }

    /// # Errors
    /// `T::TABLE` is not registered or is a global entity.
    pub fn tenant_crud<T: Entity>(&self) -> Result<TenantCrudService<T>> {
        TenantCrudService::new(self.crud()?)
    }

    async fn finish(&self, commit: bool) -> Result<()> {
        match &self.backend {
            TxBackend::Sea(b) => b.executor().finish(commit).await,
            TxBackend::Sqlx(b) => b.executor().finish(commit).await,
        }
    }
}
