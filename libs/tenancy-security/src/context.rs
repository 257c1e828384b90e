use std::collections::BTreeSet;

use crate::{AccessScope, Permission};
use uuid::Uuid;

/// Errors raised when a data-access call needs request state that is absent.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContextError {
    /// The request has no authenticated tenant (background job, misordered middleware).
    #[error("no tenant in request context")]
    MissingTenant,
}

/// `RequestContext` carries the authenticated tenant, organization, user and
/// permission set for the lifetime of one request.
///
/// The nil UUID is never treated as a tenant: a context built without a tenant
/// (or with `Uuid::nil()`) reports [`ContextError::MissingTenant`] on every
/// scoped operation. Deserialization goes through the builder, so the same
/// rules hold for a context decoded from the wire.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(from = "RequestContextBuilder")]
pub struct RequestContext {
    tenant_id: Option<Uuid>,
    organization_id: Option<Uuid>,
    user_id: Option<Uuid>,
    permissions: BTreeSet<Permission>,
}

impl RequestContext {
    /// Create a new `RequestContext` builder
    #[must_use]
    pub fn builder() -> RequestContextBuilder {
        RequestContextBuilder::default()
    }

    /// Create an anonymous `RequestContext` with no tenant, user, or permissions
    #[must_use]
    pub fn anonymous() -> Self {
        RequestContextBuilder::default().build()
    }

    #[must_use]
    pub fn tenant_id(&self) -> Option<Uuid> {
        self.tenant_id
    }

    #[must_use]
    pub fn organization_id(&self) -> Option<Uuid> {
        self.organization_id
    }

    #[must_use]
    pub fn user_id(&self) -> Option<Uuid> {
        self.user_id
    }

    #[must_use]
    pub fn permissions(&self) -> &BTreeSet<Permission> {
        &self.permissions
    }

    #[must_use]
    pub fn has_permission(&self, name: &str) -> bool {
        self.permissions.iter().any(|p| p.as_str() == name)
    }

    /// Return the tenant id or fail.
    ///
    /// # Errors
    /// Returns `ContextError::MissingTenant` if no tenant was authenticated.
    pub fn require_tenant(&self) -> Result<Uuid, ContextError> {
        self.tenant_id.ok_or(ContextError::MissingTenant)
    }

    /// Build the access scope used to filter every query of this request.
    ///
    /// # Errors
    /// Returns `ContextError::MissingTenant` if no tenant was authenticated.
    pub fn scope(&self) -> Result<AccessScope, ContextError> {
        let tenant_id = self.require_tenant()?;
        Ok(match self.organization_id {
            Some(org) => AccessScope::organization(tenant_id, org),
            None => AccessScope::tenant(tenant_id),
        })
    }
}

#[derive(Default, serde::Deserialize)]
#[serde(default)]
pub struct RequestContextBuilder {
    tenant_id: Option<Uuid>,
    organization_id: Option<Uuid>,
    user_id: Option<Uuid>,
    permissions: BTreeSet<Permission>,
}

impl RequestContextBuilder {
    #[must_use]
    pub fn tenant_id(mut self, tenant_id: Uuid) -> Self {
        self.tenant_id = Some(tenant_id);
        self
    }

    #[must_use]
    pub fn organization_id(mut self, organization_id: Uuid) -> Self {
        self.organization_id = Some(organization_id);
        self
    }

    #[must_use]
    pub fn user_id(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    #[must_use]
    pub fn add_permission(mut self, permission: Permission) -> Self {
        self.permissions.insert(permission);
        self
    }

    #[must_use]
    pub fn build(self) -> RequestContext {
        let non_nil = |id: Option<Uuid>| id.filter(|v| !v.is_nil());
        let tenant_id = non_nil(self.tenant_id);
        RequestContext {
            tenant_id,
            // An organization only means something inside a tenant.
            organization_id: tenant_id.and(non_nil(self.organization_id)),
            user_id: non_nil(self.user_id),
            permissions: self.permissions,
        }
    }
}

impl From<RequestContextBuilder> for RequestContext {
    fn from(builder: RequestContextBuilder) -> Self {
        builder.build()
    }
}
