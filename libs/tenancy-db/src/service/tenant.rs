use serde::Serialize;
use serde_json::Value;
use tenancy_query::{Criteria, FindOptions, Pagination, PaginationParams};
use tenancy_security::{AccessScope, RequestContext};
use tracing::{Span, error, field, instrument, warn};
use uuid::Uuid;

use super::{CrudService, Entity, UpdateResult};
use crate::error::{DataError, Result};
use crate::metadata::{EntityDescriptor, ID, ORGANIZATION_ID, TENANT_ID, TenantScope};
use crate::scope::scope_criteria;
use crate::values::{self, Record};

/// [`CrudService`] scoped to the caller's tenant.
///
/// Every verb resolves an [`AccessScope`] from the [`RequestContext`] and ANDs
/// the matching predicate into its filter, so caller criteria can only narrow
/// the visible rows. A row of another tenant is reported as `NotFound`, never
/// as a permission failure.
pub struct TenantCrudService<T> {
    inner: CrudService<T>,
}

impl<T> Clone for TenantCrudService<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Entity> TenantCrudService<T> {
    /// # Errors
    /// `Configuration` when the entity is global.
    pub fn new(inner: CrudService<T>) -> Result<Self> {
        if inner.descriptor().scope() == TenantScope::Global {
            return Err(DataError::config(format!(
                "'{}' is a global entity and cannot be tenant scoped",
                inner.descriptor().table()
            )));
        }
        Ok(Self { inner })
    }

    /// The unscoped service; seeders and tooling only.
    #[must_use]
    pub fn unscoped(&self) -> &CrudService<T> {
        &self.inner
    }

    fn descriptor(&self) -> &EntityDescriptor {
        self.inner.descriptor()
    }

    fn scope(&self, ctx: &RequestContext) -> Result<(AccessScope, Criteria)> {
        let scope = ctx.scope().map_err(|e| {
            error!(entity = T::TABLE, error = %e, "data access without tenant context");
            DataError::MissingTenantContext
        })?;
        Span::current().record("tenant_id", field::display(scope.tenant_id()));
        let filter = scope_criteria(self.descriptor(), &scope);
        Ok((scope, filter))
    }

    /// # Errors
    /// `MissingTenantContext`, or `Validation` for bad paging or fields.
    #[instrument(name = "tenant_crud.find_all", skip_all, fields(entity = T::TABLE, tenant_id = field::Empty))]
    pub async fn find_all(&self, ctx: &RequestContext, options: FindOptions) -> Result<Pagination<T>> {
        let (scope, filter) = self.scope(ctx)?;
        let options = FindOptions {
            filter: options.filter.and(filter),
            ..options
        };
        self.inner.find_scoped(options, Some(scope)).await
    }

    /// Normalize untrusted parameters, scope them, then list.
    ///
    /// # Errors
    /// `MissingTenantContext`, or `Validation` for rejected parameters.
    #[instrument(name = "tenant_crud.paginate", skip_all, fields(entity = T::TABLE, tenant_id = field::Empty))]
    pub async fn paginate(
        &self,
        ctx: &RequestContext,
        params: &PaginationParams,
    ) -> Result<Pagination<T>> {
        let (scope, filter) = self.scope(ctx)?;
        let mut options =
            tenancy_query::normalize(params, self.descriptor(), self.inner.limits())?;
        options.filter = options.filter.and(filter);
        self.inner.find_scoped(options, Some(scope)).await
    }

    /// # Errors
    /// `MissingTenantContext`, or `Validation` for undeclared fields.
    #[instrument(name = "tenant_crud.find_one_by", skip_all, fields(entity = T::TABLE, tenant_id = field::Empty))]
    pub async fn find_one_by(&self, ctx: &RequestContext, filter: Criteria) -> Result<Option<T>> {
        let (_, scope) = self.scope(ctx)?;
        self.inner.first(filter.and(scope)).await
    }

    /// # Errors
    /// `NotFound` when the row is missing or belongs to another scope.
    #[instrument(name = "tenant_crud.find_one_or_fail", skip_all, fields(entity = T::TABLE, tenant_id = field::Empty, id = %id))]
    pub async fn find_one_or_fail(&self, ctx: &RequestContext, id: Uuid) -> Result<T> {
        let (_, scope) = self.scope(ctx)?;
        self.inner
            .first(Criteria::eq(ID, id.to_string()).and(scope))
            .await?
            .ok_or_else(|| DataError::not_found(T::TABLE))
    }

    /// # Errors
    /// `MissingTenantContext`, or `Validation` for undeclared fields.
    #[instrument(name = "tenant_crud.count", skip_all, fields(entity = T::TABLE, tenant_id = field::Empty))]
    pub async fn count(&self, ctx: &RequestContext, filter: Criteria) -> Result<u64> {
        let (_, scope) = self.scope(ctx)?;
        self.inner.count(filter.and(scope)).await
    }

    /// Create (or upsert by id) inside the caller's scope.
    ///
    /// An id already visible to the caller updates that row in place; scope
    /// columns in the payload are then ignored and the stored ones kept. A new
    /// row takes `tenant_id` from the context, and `organization_id` too when
    /// the context carries one; otherwise the payload must supply it.
    ///
    /// # Errors
    /// `NotFound` when the id exists in another scope, `Validation` when a new
    /// organization-scoped row has no organization.
    #[instrument(name = "tenant_crud.create", skip_all, fields(entity = T::TABLE, tenant_id = field::Empty))]
    pub async fn create<P: Serialize + ?Sized>(&self, ctx: &RequestContext, payload: &P) -> Result<T> {
        let (scope, filter) = self.scope(ctx)?;
        let mut record = values::to_record(payload)?;
        if let Some(id) = self.inner.existing_id(&record, &filter).await? {
            let patch = self.strip_scope(record);
            return self.inner.update_scoped(id, patch, filter).await;
        }
        self.stamp_scope(&scope, &mut record)?;
        self.inner.insert_record(record).await
    }

    /// Scope columns in `partial` are ignored.
    ///
    /// # Errors
    /// `NotFound` when the row is missing or belongs to another scope.
    #[instrument(name = "tenant_crud.update", skip_all, fields(entity = T::TABLE, tenant_id = field::Empty, id = %id))]
    pub async fn update<P: Serialize + ?Sized>(
        &self,
        ctx: &RequestContext,
        id: Uuid,
        partial: &P,
    ) -> Result<T> {
        let (_, scope) = self.scope(ctx)?;
        let patch = self.strip_scope(values::to_record(partial)?);
        self.inner.update_scoped(id, patch, scope).await
    }

    /// # Errors
    /// `MissingTenantContext`, or `Validation` for malformed patches.
    #[instrument(name = "tenant_crud.update_many", skip_all, fields(entity = T::TABLE, tenant_id = field::Empty))]
    pub async fn update_many<P: Serialize + ?Sized>(
        &self,
        ctx: &RequestContext,
        filter: Criteria,
        partial: &P,
    ) -> Result<UpdateResult> {
        let (_, scope) = self.scope(ctx)?;
        let patch = self.strip_scope(values::to_record(partial)?);
        self.inner.update_many_scoped(filter.and(scope), patch).await
    }

    /// `false` when the row is missing or outside the caller's scope.
    ///
    /// # Errors
    /// `MissingTenantContext` without a tenant.
    #[instrument(name = "tenant_crud.delete", skip_all, fields(entity = T::TABLE, tenant_id = field::Empty, id = %id))]
    pub async fn delete(&self, ctx: &RequestContext, id: Uuid) -> Result<bool> {
        let (_, scope) = self.scope(ctx)?;
        self.inner.delete_scoped(id, scope).await
    }

    /// # Errors
    /// `MissingTenantContext`, or `Validation` for undeclared fields.
    #[instrument(name = "tenant_crud.delete_many", skip_all, fields(entity = T::TABLE, tenant_id = field::Empty))]
    pub async fn delete_many(&self, ctx: &RequestContext, filter: Criteria) -> Result<u64> {
        let (_, scope) = self.scope(ctx)?;
        self.inner.delete_many(filter.and(scope)).await
    }

    /// # Errors
    /// `MissingTenantContext`, or `Configuration` without soft delete.
    #[instrument(name = "tenant_crud.soft_delete", skip_all, fields(entity = T::TABLE, tenant_id = field::Empty, id = %id))]
    pub async fn soft_delete(&self, ctx: &RequestContext, id: Uuid) -> Result<bool> {
        let (_, scope) = self.scope(ctx)?;
        self.inner.mark_deleted(id, true, scope).await
    }

    /// # Errors
    /// `MissingTenantContext`, or `Configuration` without soft delete.
    #[instrument(name = "tenant_crud.restore", skip_all, fields(entity = T::TABLE, tenant_id = field::Empty, id = %id))]
    pub async fn restore(&self, ctx: &RequestContext, id: Uuid) -> Result<bool> {
        let (_, scope) = self.scope(ctx)?;
        self.inner.mark_deleted(id, false, scope).await
    }

    /// Link a row to `targets` through a many-to-many relation. The row and
    /// every target must be visible to `ctx`.
    ///
    /// # Errors
    /// `MissingTenantContext`, or `NotFound` when the row or a target lies
    /// outside the caller's scope.
    #[instrument(name = "tenant_crud.link", skip_all, fields(entity = T::TABLE, tenant_id = field::Empty, id = %id, relation))]
    pub async fn link(
        &self,
        ctx: &RequestContext,
        id: Uuid,
        relation: &str,
        targets: &[Uuid],
    ) -> Result<u64> {
        let (access, _) = self.scope(ctx)?;
        self.inner
            .adapter()
            .link(relation, id, targets, Some(&access))
            .await
    }

    /// # Errors
    /// `MissingTenantContext`, or `NotFound` when the row is not visible.
    #[instrument(name = "tenant_crud.unlink", skip_all, fields(entity = T::TABLE, tenant_id = field::Empty, id = %id, relation))]
    pub async fn unlink(
        &self,
        ctx: &RequestContext,
        id: Uuid,
        relation: &str,
        targets: &[Uuid],
    ) -> Result<u64> {
        let (access, _) = self.scope(ctx)?;
        self.inner
            .adapter()
            .unlink(relation, id, targets, Some(&access))
            .await
    }

    fn stamp_scope(&self, scope: &AccessScope, record: &mut Record) -> Result<()> {
        let tenant = scope.tenant_id().to_string();
        if let Some(given) = record.get(TENANT_ID).and_then(Value::as_str) {
            if !same_uuid(given, &tenant) {
                warn!(entity = T::TABLE, payload_tenant = given, "payload tenant_id overridden by context");
            }
        }
        record.insert(TENANT_ID.to_owned(), Value::String(tenant));

        if !self.descriptor().has_organization() {
            record.remove(ORGANIZATION_ID);
            return Ok(());
        }
        match scope.organization_id() {
            Some(org) => {
                let org = org.to_string();
                if let Some(given) = record.get(ORGANIZATION_ID).and_then(Value::as_str) {
                    if !same_uuid(given, &org) {
                        warn!(
                            entity = T::TABLE,
                            payload_organization = given,
                            "payload organization_id overridden by context"
                        );
                    }
                }
                record.insert(ORGANIZATION_ID.to_owned(), Value::String(org));
                Ok(())
            }
            None if matches!(record.get(ORGANIZATION_ID), Some(Value::String(_))) => Ok(()),
            None => Err(DataError::field(
                ORGANIZATION_ID,
                "required when the request context has no organization",
            )),
        }
    }

    fn strip_scope(&self, mut patch: Record) -> Record {
        for column in self.descriptor().scope_columns() {
            patch.remove(*column);
        }
        patch
    }
}

fn same_uuid(a: &str, b: &str) -> bool {
    match (Uuid::parse_str(a), Uuid::parse_str(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
