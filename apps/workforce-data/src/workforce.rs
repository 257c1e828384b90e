//! The workforce catalog served by this tool, plus the typed rows the seeder
//! writes.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tenancy_db::{
    ColumnSpec, Entity, EntityOptions, EntityRegistry, IndexSpec, ReferentialAction,
    RelationSpec, Result, SchemaCatalog,
};
use uuid::Uuid;

pub const ROLES: [&str; 4] = ["engineer", "manager", "analyst", "recruiter"];

/// Describe and seal the catalog.
///
/// # Errors
/// Any metadata or static parity error found while sealing.
pub fn catalog() -> Result<Arc<SchemaCatalog>> {
    let mut reg = EntityRegistry::new();

    reg.describe_entity("organization", EntityOptions::tenant())?;
    reg.describe_column("organization", ColumnSpec::string("name"))?;
    reg.describe_column("organization", ColumnSpec::string("slug"))?;
    reg.describe_index(
        "organization",
        IndexSpec::new("uq_organization_slug", ["tenant_id", "slug"]).unique(),
    )?;

    reg.describe_entity("department", EntityOptions::organization())?;
    reg.describe_column("department", ColumnSpec::string("name"))?;
    reg.describe_column("department", ColumnSpec::string("cost_center").nullable())?;
    reg.describe_relation(
        "department",
        RelationSpec::one_to_many("employees", "employee", "department"),
    )?;

    reg.describe_entity("employee", EntityOptions::organization().soft_delete())?;
    reg.describe_column("employee", ColumnSpec::string("first_name"))?;
    reg.describe_column("employee", ColumnSpec::string("last_name"))?;
    reg.describe_column("employee", ColumnSpec::string("email").nullable())?;
    reg.describe_column(
        "employee",
        ColumnSpec::enumeration("role", ROLES).default_value("engineer"),
    )?;
    reg.describe_column("employee", ColumnSpec::datetime("hired_at").nullable())?;
    reg.describe_column("employee", ColumnSpec::float("salary").nullable())?;
    reg.describe_column("employee", ColumnSpec::boolean("active").default_value(true))?;
    reg.describe_column("employee", ColumnSpec::json("profile").nullable())?;
    reg.describe_relation(
        "employee",
        RelationSpec::many_to_one("department", "department", "department_id")
            .optional()
            .on_delete(ReferentialAction::SetNull),
    )?;
    reg.describe_relation(
        "employee",
        RelationSpec::many_to_many("tags", "tag", "employee_tag"),
    )?;
    reg.describe_index(
        "employee",
        IndexSpec::new("uq_employee_email", ["tenant_id", "email"]).unique(),
    )?;

    reg.describe_entity("tag", EntityOptions::tenant())?;
    reg.describe_column("tag", ColumnSpec::string("label"))?;
    reg.describe_relation(
        "tag",
        RelationSpec::many_to_many("employees", "employee", "employee_tag"),
    )?;

    reg.seal()
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Organization {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub slug: String,
}

impl Entity for Organization {
    const TABLE: &'static str = "organization";
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Department {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
}

impl Entity for Department {
    const TABLE: &'static str = "department";
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Employee {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub role: String,
    pub department_id: Option<Uuid>,
}

impl Entity for Employee {
    const TABLE: &'static str = "employee";
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Tag {
    pub id: Uuid,
    pub label: String,
}

impl Entity for Tag {
    const TABLE: &'static str = "tag";
}
