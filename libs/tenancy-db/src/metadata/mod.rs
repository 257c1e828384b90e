//! Entity metadata: one engine-neutral description per table.
//!
//! Modules call `describe_entity` / `describe_column` / `describe_relation` /
//! `describe_index` on an [`EntityRegistry`] at startup, then
//! [`EntityRegistry::seal`] produces the shared [`SchemaCatalog`]. Both engine
//! adapters derive their table mapping from the same sealed descriptor.

mod catalog;
mod column;
mod descriptor;
mod registry;
mod relation;

pub use catalog::SchemaCatalog;
pub use column::{ColumnSpec, ColumnType};
pub use descriptor::{
    CREATED_AT, DELETED_AT, EntityDescriptor, EntityOptions, ID, ORGANIZATION_ID, TENANT_ID,
    TenantScope, UPDATED_AT,
};
pub use registry::EntityRegistry;
pub use relation::{
    Cardinality, ForeignKey, InboundRef, IndexSpec, JoinTable, ReferentialAction, Relation,
    RelationKind, RelationLink, RelationSpec,
};
