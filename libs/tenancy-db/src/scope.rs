//! Row-visibility predicates derived from an [`AccessScope`].

use tenancy_query::Criteria;
use tenancy_security::AccessScope;

use crate::metadata::{EntityDescriptor, ORGANIZATION_ID, TENANT_ID, TenantScope};

/// Predicate restricting `desc` to the rows `scope` may see.
///
/// # Policy
/// 1. **Global entity** → no restriction
/// 2. **Tenant entity** → `tenant_id = scope.tenant`
/// 3. **Organization entity** → tenant rule, plus `organization_id = scope.org`
///    when the scope carries an organization
#[must_use]
pub fn scope_criteria(desc: &EntityDescriptor, scope: &AccessScope) -> Criteria {
    match desc.scope() {
        TenantScope::Global => Criteria::all(),
        TenantScope::Tenant => Criteria::eq(TENANT_ID, scope.tenant_id().to_string()),
        TenantScope::Organization => {
            let tenant = Criteria::eq(TENANT_ID, scope.tenant_id().to_string());
            match scope.organization_id() {
                Some(org) => tenant.and(Criteria::eq(ORGANIZATION_ID, org.to_string())),
                None => tenant,
            }
        }
    }
}

/// Excludes soft-deleted rows; matches everything for entities without soft
/// delete.
#[must_use]
pub fn live_criteria(desc: &EntityDescriptor) -> Criteria {
    desc.soft_delete_column()
        .map_or_else(Criteria::all, Criteria::is_null)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::metadata::{EntityOptions, EntityRegistry};
    use uuid::Uuid;

    fn catalog() -> std::sync::Arc<crate::metadata::SchemaCatalog> {
        let mut reg = EntityRegistry::new();
        reg.describe_entity("country", EntityOptions::global()).unwrap();
        reg.describe_entity("tag", EntityOptions::tenant()).unwrap();
        reg.describe_entity("employee", EntityOptions::organization().soft_delete())
            .unwrap();
        reg.seal().unwrap()
    }

    #[test]
    fn test_global_entities_are_unrestricted() {
        let catalog = catalog();
        let scope = AccessScope::tenant(Uuid::new_v4());
        assert!(scope_criteria(catalog.entity("country").unwrap(), &scope).is_all());
    }

    #[test]
    fn test_tenant_entity_filters_on_tenant() {
        let catalog = catalog();
        let t = Uuid::new_v4();
        let crit = scope_criteria(catalog.entity("tag").unwrap(), &AccessScope::tenant(t));
        assert_eq!(crit, Criteria::eq(TENANT_ID, t.to_string()));
    }

    #[test]
    fn test_organization_filter_only_when_present() {
        let catalog = catalog();
        let employee = catalog.entity("employee").unwrap();
        let (t, o) = (Uuid::new_v4(), Uuid::new_v4());

        let tenant_only = scope_criteria(employee, &AccessScope::tenant(t));
        assert_eq!(tenant_only.fields(), vec![TENANT_ID]);

        let both = scope_criteria(employee, &AccessScope::organization(t, o));
        assert_eq!(both.fields(), vec![TENANT_ID, ORGANIZATION_ID]);
    }

    #[test]
    fn test_live_criteria() {
        let catalog = catalog();
        assert_eq!(
            live_criteria(catalog.entity("employee").unwrap()),
            Criteria::is_null("deleted_at")
        );
        assert!(live_criteria(catalog.entity("tag").unwrap()).is_all());
    }
}
