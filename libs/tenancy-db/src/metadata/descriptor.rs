use tenancy_query::{FieldCatalog, FieldKind};

use super::column::ColumnSpec;
use super::relation::{ForeignKey, IndexSpec, Relation, RelationLink};

pub const ID: &str = "id";
pub const TENANT_ID: &str = "tenant_id";
pub const ORGANIZATION_ID: &str = "organization_id";
pub const CREATED_AT: &str = "created_at";
pub const UPDATED_AT: &str = "updated_at";
pub const DELETED_AT: &str = "deleted_at";

/// Columns every entity may receive implicitly; user columns cannot reuse them.
pub(crate) const RESERVED: [&str; 6] = [ID, TENANT_ID, ORGANIZATION_ID, CREATED_AT, UPDATED_AT, DELETED_AT];

/// Isolation level of an entity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TenantScope {
    /// Shared reference data, no tenant column.
    Global,
    #[default]
    Tenant,
    /// Tenant plus organization.
    Organization,
}

impl TenantScope {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            TenantScope::Global => "global",
            TenantScope::Tenant => "tenant",
            TenantScope::Organization => "organization",
        }
    }
}

/// Options passed to `describe_entity`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[must_use]
pub struct EntityOptions {
    pub scope: TenantScope,
    pub timestamps: bool,
    pub soft_delete: bool,
}

impl Default for EntityOptions {
    fn default() -> Self {
        Self {
            scope: TenantScope::Tenant,
            timestamps: true,
            soft_delete: false,
        }
    }
}

impl EntityOptions {
    pub fn global() -> Self {
        Self {
            scope: TenantScope::Global,
            ..Self::default()
        }
    }

    pub fn tenant() -> Self {
        Self::default()
    }

    pub fn organization() -> Self {
        Self {
            scope: TenantScope::Organization,
            ..Self::default()
        }
    }

    pub fn without_timestamps(mut self) -> Self {
        self.timestamps = false;
        self
    }

    pub fn soft_delete(mut self) -> Self {
        self.soft_delete = true;
        self
    }
}

/// Sealed, engine-neutral description of one table.
///
/// Built only by [`EntityRegistry::seal`](super::EntityRegistry::seal); both
/// adapters of a pair read the same instance.
#[derive(Clone, Debug, PartialEq)]
pub struct EntityDescriptor {
    pub(crate) table: String,
    pub(crate) options: EntityOptions,
    pub(crate) columns: Vec<ColumnSpec>,
    pub(crate) relations: Vec<Relation>,
    pub(crate) indexes: Vec<IndexSpec>,
}

impl EntityDescriptor {
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    #[must_use]
    pub fn options(&self) -> EntityOptions {
        self.options
    }

    #[must_use]
    pub fn scope(&self) -> TenantScope {
        self.options.scope
    }

    #[must_use]
    pub fn primary_key(&self) -> &'static str {
        ID
    }

    /// Columns in storage order.
    #[must_use]
    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    #[must_use]
    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    #[must_use]
    pub fn relations(&self) -> &[Relation] {
        &self.relations
    }

    #[must_use]
    pub fn relation(&self, name: &str) -> Option<&Relation> {
        self.relations.iter().find(|r| r.name() == name)
    }

    #[must_use]
    pub fn indexes(&self) -> &[IndexSpec] {
        &self.indexes
    }

    #[must_use]
    pub fn has_tenant(&self) -> bool {
        self.options.scope != TenantScope::Global
    }

    #[must_use]
    pub fn has_organization(&self) -> bool {
        self.options.scope == TenantScope::Organization
    }

    #[must_use]
    pub fn has_timestamps(&self) -> bool {
        self.options.timestamps
    }

    #[must_use]
    pub fn soft_delete_column(&self) -> Option<&'static str> {
        self.options.soft_delete.then_some(DELETED_AT)
    }

    /// Foreign keys of the owning (many-to-one) relations.
    pub fn foreign_keys(&self) -> impl Iterator<Item = ForeignKey> + '_ {
        self.relations.iter().filter_map(|rel| match &rel.link {
            RelationLink::Owned { local_column } => Some(ForeignKey {
                name: format!("fk_{}_{}", self.table, local_column),
                column: local_column.clone(),
                target: rel.spec.target.clone(),
                on_delete: rel.spec.on_delete,
                on_update: rel.spec.on_update,
            }),
            _ => None,
        })
    }

    /// Names of scope columns the caller may not rewrite.
    pub(crate) fn scope_columns(&self) -> &'static [&'static str] {
        match self.options.scope {
            TenantScope::Global => &[],
            TenantScope::Tenant => &[TENANT_ID],
            TenantScope::Organization => &[TENANT_ID, ORGANIZATION_ID],
        }
    }

    /// Columns whose values are managed by the data layer itself.
    pub(crate) fn is_managed(&self, column: &str) -> bool {
        column == ID
            || (self.options.timestamps && (column == CREATED_AT || column == UPDATED_AT))
            || (self.options.soft_delete && column == DELETED_AT)
    }
}

impl FieldCatalog for EntityDescriptor {
    fn entity_name(&self) -> &str {
        &self.table
    }

    fn field_kind(&self, field: &str) -> Option<FieldKind> {
        self.column(field).map(|c| c.ty.kind())
    }

    fn has_relation(&self, relation: &str) -> bool {
        self.relation(relation).is_some()
    }
}

