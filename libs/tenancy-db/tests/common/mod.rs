#![allow(clippy::unwrap_used, clippy::expect_used)]
#![allow(dead_code)]

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tenancy_db::{
    ColumnSpec, ConnectOpts, DbHandle, Engine, Entity, EntityOptions, EntityRegistry, IndexSpec,
    ReferentialAction, RelationSpec, Repositories, SchemaCatalog, bootstrap_schema,
};
use tenancy_security::RequestContext;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Country {
    pub id: Uuid,
    pub code: String,
    pub name: String,
}

impl Entity for Country {
    const TABLE: &'static str = "country";
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub label: String,
}

impl Entity for Tag {
    const TABLE: &'static str = "tag";
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Department {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub employees: Option<Vec<Employee>>,
}

impl Entity for Department {
    const TABLE: &'static str = "department";
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Employee {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub organization_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub age: Option<i64>,
    pub active: bool,
    pub role: String,
    pub department_id: Option<Uuid>,
    pub created_at: String,
    pub updated_at: String,
    pub deleted_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<Box<Department>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<Tag>>,
}

impl Entity for Employee {
    const TABLE: &'static str = "employee";
}

/// Global reference data, a tenant entity and two organization entities,
/// covering every relation kind.
pub fn catalog() -> Arc<SchemaCatalog> {
    let mut reg = EntityRegistry::new();

    reg.describe_entity("country", EntityOptions::global().without_timestamps())
        .unwrap();
    reg.describe_column("country", ColumnSpec::string("code")).unwrap();
    reg.describe_column("country", ColumnSpec::string("name")).unwrap();
    reg.describe_index("country", IndexSpec::new("uq_country_code", ["code"]).unique())
        .unwrap();

    reg.describe_entity("tag", EntityOptions::tenant()).unwrap();
    reg.describe_column("tag", ColumnSpec::string("label")).unwrap();
    reg.describe_relation(
        "tag",
        RelationSpec::many_to_many("employees", "employee", "employee_tag"),
    )
    .unwrap();

    reg.describe_entity("department", EntityOptions::organization())
        .unwrap();
    reg.describe_column("department", ColumnSpec::string("name")).unwrap();
    reg.describe_relation(
        "department",
        RelationSpec::one_to_many("employees", "employee", "department"),
    )
    .unwrap();

    reg.describe_entity("employee", EntityOptions::organization().soft_delete())
        .unwrap();
    reg.describe_column("employee", ColumnSpec::string("first_name")).unwrap();
    reg.describe_column("employee", ColumnSpec::string("last_name")).unwrap();
    reg.describe_column("employee", ColumnSpec::string("email").nullable())
        .unwrap();
    reg.describe_column("employee", ColumnSpec::integer("age").nullable())
        .unwrap();
    reg.describe_column("employee", ColumnSpec::float("salary").nullable())
        .unwrap();
    reg.describe_column("employee", ColumnSpec::boolean("active").default_value(true))
        .unwrap();
    reg.describe_column("employee", ColumnSpec::datetime("hired_at").nullable())
        .unwrap();
    reg.describe_column(
        "employee",
        ColumnSpec::enumeration("role", ["engineer", "manager", "analyst"])
            .default_value("engineer"),
    )
    .unwrap();
    reg.describe_column("employee", ColumnSpec::json("profile").nullable())
        .unwrap();
    reg.describe_relation(
        "employee",
        RelationSpec::many_to_one("department", "department", "department_id")
            .optional()
            .on_delete(ReferentialAction::SetNull),
    )
    .unwrap();
    reg.describe_relation(
        "employee",
        RelationSpec::many_to_many("tags", "tag", "employee_tag"),
    )
    .unwrap();
    reg.describe_index(
        "employee",
        IndexSpec::new("uq_employee_email", ["tenant_id", "email"]).unique(),
    )
    .unwrap();

    reg.seal().unwrap()
}

pub async fn memory_handle() -> DbHandle {
    DbHandle::connect("sqlite::memory:", ConnectOpts::default())
        .await
        .unwrap()
}

/// In-memory database with every table created through `engine`.
pub async fn setup(engine: Engine) -> Repositories {
    let repos = Repositories::new(memory_handle().await, catalog(), engine);
    bootstrap_schema(&repos, engine).await.unwrap();
    repos
}

pub fn ctx(tenant: Uuid, organization: Uuid) -> RequestContext {
    RequestContext::builder()
        .tenant_id(tenant)
        .organization_id(organization)
        .user_id(Uuid::new_v4())
        .build()
}

pub fn tenant_ctx(tenant: Uuid) -> RequestContext {
    RequestContext::builder().tenant_id(tenant).build()
}
