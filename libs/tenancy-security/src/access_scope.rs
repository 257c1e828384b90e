use uuid::Uuid;

/// The rows a request may see: always one tenant, optionally narrowed to one
/// organization inside that tenant.
///
/// A scope can only be obtained from a [`RequestContext`](crate::RequestContext)
/// that carries a tenant, or built explicitly by trusted tooling (seeders).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct AccessScope {
    tenant_id: Uuid,
    organization_id: Option<Uuid>,
}

impl AccessScope {
    #[must_use]
    pub fn tenant(tenant_id: Uuid) -> Self {
        Self {
            tenant_id,
            organization_id: None,
        }
    }

    #[must_use]
    pub fn organization(tenant_id: Uuid, organization_id: Uuid) -> Self {
        Self {
            tenant_id,
            organization_id: Some(organization_id),
        }
    }

    #[inline]
    #[must_use]
    pub fn tenant_id(&self) -> Uuid {
        self.tenant_id
    }

    #[inline]
    #[must_use]
    pub fn organization_id(&self) -> Option<Uuid> {
        self.organization_id
    }

    #[must_use]
    pub fn has_organization(&self) -> bool {
        self.organization_id.is_some()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_tenant_scope_has_no_organization() {
        let t = Uuid::new_v4();
        let scope = AccessScope::tenant(t);
        assert_eq!(scope.tenant_id(), t);
        assert!(!scope.has_organization());
    }

    #[test]
    fn test_organization_scope() {
        let t = Uuid::new_v4();
        let o = Uuid::new_v4();
        let scope = AccessScope::organization(t, o);
        assert_eq!(scope.organization_id(), Some(o));
    }
}
