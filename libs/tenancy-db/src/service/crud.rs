use std::marker::PhantomData;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tenancy_query::{Criteria, FindOptions, OrderKey, Pagination, PaginationParams, QueryLimits};
use tenancy_security::AccessScope;
use tracing::{debug, instrument};
use uuid::Uuid;

use super::{Entity, UpdateResult};
use crate::engine::{AdapterQuery, RepositoryAdapter};
use crate::error::{DataError, Result};
use crate::metadata::{CREATED_AT, DELETED_AT, EntityDescriptor, ID, UPDATED_AT};
use crate::scope::live_criteria;
use crate::values::{self, Record};

/// Backend-agnostic verbs for entity `T`, built only on [`RepositoryAdapter`].
///
/// No tenant filtering happens here. `create` is an upsert: when the payload
/// carries an `id` that already exists, the supplied fields replace the stored
/// ones and every other field is preserved.
pub struct CrudService<T> {
    adapter: Arc<dyn RepositoryAdapter>,
    limits: QueryLimits,
    _entity: PhantomData<fn() -> T>,
}

impl<T> Clone for CrudService<T> {
    fn clone(&self) -> Self {
        Self {
            adapter: self.adapter.clone(),
            limits: self.limits.clone(),
            _entity: PhantomData,
        }
    }
}

impl<T: Entity> CrudService<T> {
    #[must_use]
    pub fn new(adapter: Arc<dyn RepositoryAdapter>, limits: QueryLimits) -> Self {
        Self {
            adapter,
            limits,
            _entity: PhantomData,
        }
    }

    #[must_use]
    pub fn adapter(&self) -> &Arc<dyn RepositoryAdapter> {
        &self.adapter
    }

    #[must_use]
    pub fn descriptor(&self) -> &EntityDescriptor {
        self.adapter.descriptor()
    }

    #[must_use]
    pub fn limits(&self) -> &QueryLimits {
        &self.limits
    }

    /// One page of rows plus the unpaginated total.
    ///
    /// `take` defaults to `limits.default_take` and is clamped to
    /// `limits.max_take`; `id ASC` is appended as a tie-breaker.
    ///
    /// # Errors
    /// `Validation` for a negative skip, `take <= 0` or undeclared fields.
    pub async fn find_all(&self, options: FindOptions) -> Result<Pagination<T>> {
        self.find_scoped(options, None).await
    }

    /// Normalize untrusted parameters, then [`find_all`](Self::find_all).
    ///
    /// # Errors
    /// `Validation` for anything the normalizer rejects.
    pub async fn paginate(&self, params: &PaginationParams) -> Result<Pagination<T>> {
        let options = tenancy_query::normalize(params, self.descriptor(), &self.limits)?;
        self.find_all(options).await
    }

    /// # Errors
    /// `Validation` for undeclared fields.
    pub async fn find_one_by(&self, filter: Criteria) -> Result<Option<T>> {
        self.first(filter).await
    }

    /// # Errors
    /// `NotFound` when no live row has `id`.
    pub async fn find_one_or_fail(&self, id: Uuid) -> Result<T> {
        self.first(Criteria::eq(ID, id.to_string()))
            .await?
            .ok_or_else(|| DataError::not_found(T::TABLE))
    }

    /// # Errors
    /// `Validation` for undeclared fields.
    pub async fn count(&self, filter: Criteria) -> Result<u64> {
        self.adapter.count(&self.live(filter)).await
    }

    /// Insert, or upsert when the payload names an existing `id`.
    ///
    /// # Errors
    /// `Validation` for malformed payloads, `ConstraintViolation` from storage.
    pub async fn create<P: Serialize + ?Sized>(&self, payload: &P) -> Result<T> {
        let record = values::to_record(payload)?;
        self.upsert(record, &Criteria::all()).await
    }

    /// Apply `partial` to the row with `id` and return it.
    ///
    /// # Errors
    /// `NotFound` when no live row has `id`.
    pub async fn update<P: Serialize + ?Sized>(&self, id: Uuid, partial: &P) -> Result<T> {
        let patch = values::to_record(partial)?;
        self.update_scoped(id, patch, Criteria::all()).await
    }

    /// # Errors
    /// `Validation` for malformed patches or filters.
    pub async fn update_many<P: Serialize + ?Sized>(
        &self,
        filter: Criteria,
        partial: &P,
    ) -> Result<UpdateResult> {
        self.update_many_scoped(filter, values::to_record(partial)?)
            .await
    }

    /// Hard delete. Deleting a missing id returns `false`.
    ///
    /// # Errors
    /// Storage failures only.
    pub async fn delete(&self, id: Uuid) -> Result<bool> {
        self.delete_scoped(id, Criteria::all()).await
    }

    /// # Errors
    /// `Validation` for undeclared fields.
    pub async fn delete_many(&self, filter: Criteria) -> Result<u64> {
        self.adapter.delete_where(&filter).await
    }

    /// Mark a row deleted; `false` when it is missing or already deleted.
    ///
    /// # Errors
    /// `Configuration` when the entity has no soft delete.
    pub async fn soft_delete(&self, id: Uuid) -> Result<bool> {
        self.mark_deleted(id, true, Criteria::all()).await
    }

    /// Undo [`soft_delete`](Self::soft_delete); `false` when the row is not deleted.
    ///
    /// # Errors
    /// `Configuration` when the entity has no soft delete.
    pub async fn restore(&self, id: Uuid) -> Result<bool> {
        self.mark_deleted(id, false, Criteria::all()).await
    }

    /// Link row `id` to `targets` through the many-to-many `relation`;
    /// returns the number of new links.
    ///
    /// # Errors
    /// `NotFound` when the row or a target is missing, `Validation` when
    /// `relation` is not a declared many-to-many relation.
    pub async fn link(&self, id: Uuid, relation: &str, targets: &[Uuid]) -> Result<u64> {
        self.adapter.link(relation, id, targets, None).await
    }

    /// # Errors
    /// `NotFound` when the row is missing, `Validation` for an unknown relation.
    pub async fn unlink(&self, id: Uuid, relation: &str, targets: &[Uuid]) -> Result<u64> {
        self.adapter.unlink(relation, id, targets, None).await
    }

    fn live(&self, filter: Criteria) -> Criteria {
        filter.and(live_criteria(self.descriptor()))
    }

    fn decode(record: Record) -> Result<T> {
        serde_json::from_value(Value::Object(record))
            .map_err(|e| DataError::payload(format!("cannot decode '{}' row: {e}", T::TABLE)))
    }

    /// Drop columns managed here, check the id, stamp `updated_at`.
    fn prepare_patch(&self, mut patch: Record, id: Option<Uuid>) -> Result<Record> {
        if let Some(given) = patch.remove(ID) {
            let same = id.is_some_and(|id| {
                given
                    .as_str()
                    .and_then(|s| Uuid::parse_str(s).ok())
                    .is_some_and(|g| g == id)
            });
            if !same && !given.is_null() {
                return Err(DataError::field(ID, "the primary key cannot be changed"));
            }
        }
        let desc = self.descriptor();
        patch.retain(|key, _| !desc.is_managed(key));
        if desc.has_timestamps() {
            patch.insert(UPDATED_AT.to_owned(), values::now());
        }
        Ok(patch)
    }

    pub(crate) async fn find_scoped(
        &self,
        options: FindOptions,
        scope: Option<AccessScope>,
    ) -> Result<Pagination<T>> {
        let offset = self.limits.resolve_skip(options.skip)?;
        let limit = self.limits.resolve_take(options.take)?;
        self.limits.validate_order_len(options.order.len())?;

        let filter = if options.with_deleted {
            options.filter
        } else {
            self.live(options.filter)
        };
        let mut order = options.order;
        if order.iter().all(|k| k.field != ID) {
            order.push(OrderKey::asc(ID));
        }

        let total = self.adapter.count(&filter).await?;
        let query = AdapterQuery {
            filter,
            relations: options.relations,
            order,
            offset,
            limit: Some(limit),
            scope,
        };
        let items = self.adapter.find(&query).await?;
        Pagination { items, total }.try_map(Self::decode)
    }

    pub(crate) async fn first(&self, filter: Criteria) -> Result<Option<T>> {
        self.adapter
            .find_one(&self.live(filter))
            .await?
            .map(Self::decode)
            .transpose()
    }

    /// Insert `record`, or update it in place when its id exists within `scope`.
    /// An id that exists only outside `scope` is reported as missing.
    #[instrument(name = "crud.upsert", skip_all, fields(entity = T::TABLE))]
    pub(crate) async fn upsert(&self, record: Record, scope: &Criteria) -> Result<T> {
        match self.existing_id(&record, scope).await? {
            Some(id) => {
                debug!(%id, "create hit an existing id, updating in place");
                self.update_scoped(id, record, scope.clone()).await
            }
            None => self.insert_record(record).await,
        }
    }

    /// The record's id when a row with it exists within `scope`.
    ///
    /// `None` for a record without an id or with an unused one; `NotFound`
    /// when the id is taken outside `scope`.
    pub(crate) async fn existing_id(
        &self,
        record: &Record,
        scope: &Criteria,
    ) -> Result<Option<Uuid>> {
        let id = match record.get(ID) {
            None | Some(Value::Null) => return Ok(None),
            Some(Value::String(s)) => {
                Uuid::parse_str(s).map_err(|e| DataError::field(ID, e.to_string()))?
            }
            Some(other) => {
                return Err(DataError::field(ID, format!("expected a uuid, got {other}")));
            }
        };
        let by_id = Criteria::eq(ID, id.to_string());
        if self.adapter.count(&by_id).await? == 0 {
            return Ok(None);
        }
        if self.adapter.count(&by_id.and(scope.clone())).await? == 0 {
            return Err(DataError::not_found(T::TABLE));
        }
        Ok(Some(id))
    }

    pub(crate) async fn insert_record(&self, mut record: Record) -> Result<T> {
        let desc = self.descriptor();
        record.retain(|key, _| key == ID || !desc.is_managed(key));
        if desc.has_timestamps() {
            let now = values::now();
            record.insert(CREATED_AT.to_owned(), now.clone());
            record.insert(UPDATED_AT.to_owned(), now);
        }
        let row = self.adapter.insert(record).await?;
        Self::decode(row)
    }

    #[instrument(name = "crud.update", skip_all, fields(entity = T::TABLE, id = %id))]
    pub(crate) async fn update_scoped(&self, id: Uuid, patch: Record, scope: Criteria) -> Result<T> {
        let patch = self.prepare_patch(patch, Some(id))?;
        let target = self.live(Criteria::eq(ID, id.to_string()).and(scope));
        if self.adapter.update_where(&target, patch).await? == 0 {
            return Err(DataError::not_found(T::TABLE));
        }
        self.adapter
            .find_one_or_fail(&Criteria::eq(ID, id.to_string()))
            .await
            .and_then(Self::decode)
    }

    pub(crate) async fn update_many_scoped(
        &self,
        filter: Criteria,
        patch: Record,
    ) -> Result<UpdateResult> {
        let patch = self.prepare_patch(patch, None)?;
        let affected = self.adapter.update_where(&self.live(filter), patch).await?;
        Ok(UpdateResult { affected })
    }

    #[instrument(name = "crud.delete", skip_all, fields(entity = T::TABLE, id = %id))]
    pub(crate) async fn delete_scoped(&self, id: Uuid, scope: Criteria) -> Result<bool> {
        let target = Criteria::eq(ID, id.to_string()).and(scope);
        Ok(self.adapter.delete_where(&target).await? > 0)
    }

    pub(crate) async fn mark_deleted(&self, id: Uuid, deleted: bool, scope: Criteria) -> Result<bool> {
        let desc = self.descriptor();
        let Some(column) = desc.soft_delete_column() else {
            return Err(DataError::config(format!(
                "'{}' does not support soft delete",
                desc.table()
            )));
        };
        let state = if deleted {
            Criteria::is_null(column)
        } else {
            Criteria::is_not_null(column)
        };
        let target = Criteria::eq(ID, id.to_string()).and(state).and(scope);
        let mut patch = Record::new();
        patch.insert(
            DELETED_AT.to_owned(),
            if deleted { values::now() } else { Value::Null },
        );
        if desc.has_timestamps() {
            patch.insert(UPDATED_AT.to_owned(), values::now());
        }
        Ok(self.adapter.update_where(&target, patch).await? > 0)
    }
}
