use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::debug;

use super::catalog::SchemaCatalog;
use super::column::ColumnSpec;
use super::descriptor::{
    CREATED_AT, DELETED_AT, EntityDescriptor, EntityOptions, ID, ORGANIZATION_ID, RESERVED,
    TENANT_ID, TenantScope, UPDATED_AT,
};
use super::relation::{
    IndexSpec, InboundRef, JoinTable, ReferentialAction, Relation, RelationKind, RelationLink,
    RelationSpec,
};
use crate::error::{DataError, Result};
use crate::schema::parity;
use crate::values;

const MAX_IDENTIFIER_LEN: usize = 63;

#[derive(Debug)]
struct PendingEntity {
    table: String,
    options: EntityOptions,
    columns: Vec<ColumnSpec>,
    relations: Vec<RelationSpec>,
    indexes: Vec<IndexSpec>,
}

/// Startup-time builder of the schema catalog.
///
/// Each module describes its entities once; [`seal`](Self::seal) validates the
/// whole graph and freezes it. Re-registering an identical declaration is a
/// no-op, a conflicting one is a [`DataError::Configuration`].
#[derive(Debug, Default)]
pub struct EntityRegistry {
    entities: Vec<PendingEntity>,
}

impl EntityRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a table.
    ///
    /// # Errors
    /// Invalid name, or the table is already registered with other options.
    pub fn describe_entity(&mut self, table: &str, options: EntityOptions) -> Result<()> {
        validate_identifier("table", table)?;
        if let Some(existing) = self.entities.iter().find(|e| e.table == table) {
            if existing.options == options {
                return Ok(());
            }
            return Err(DataError::config(format!(
                "entity '{table}' registered twice with different options"
            )));
        }
        self.entities.push(PendingEntity {
            table: table.to_owned(),
            options,
            columns: Vec::new(),
            relations: Vec::new(),
            indexes: Vec::new(),
        });
        Ok(())
    }

    /// Register a column on a previously described table.
    ///
    /// # Errors
    /// Unknown table, invalid or reserved name, conflicting redeclaration, or a
    /// default that does not fit the column type.
    pub fn describe_column(&mut self, table: &str, column: ColumnSpec) -> Result<()> {
        validate_identifier("column", &column.name)?;
        if RESERVED.contains(&column.name.as_str()) {
            return Err(DataError::config(format!(
                "column '{table}.{}' is managed implicitly",
                column.name
            )));
        }
        if column.primary_key {
            return Err(DataError::config(format!(
                "'{table}.{}': the primary key is always the implicit 'id'",
                column.name
            )));
        }
        if let Some(default) = &column.default {
            values::encode(&column, default).map_err(|e| {
                DataError::config(format!("default of '{table}.{}': {e}", column.name))
            })?;
        }
        let entity = self.pending_mut(table)?;
        if let Some(existing) = entity.columns.iter().find(|c| c.name == column.name) {
            return same_or_conflict(existing == &column, table, "column", &column.name);
        }
        entity.columns.push(column);
        Ok(())
    }

    /// Register a relation.
    ///
    /// # Errors
    /// Unknown table, invalid name or conflicting redeclaration. Targets are
    /// checked by [`seal`](Self::seal).
    pub fn describe_relation(&mut self, table: &str, relation: RelationSpec) -> Result<()> {
        validate_identifier("relation", &relation.name)?;
        validate_identifier("relation target", &relation.target)?;
        match &relation.kind {
            RelationKind::ManyToOne { join_column, .. } => {
                validate_identifier("join column", join_column)?;
            }
            RelationKind::ManyToMany { join_table } => {
                validate_identifier("join table", join_table)?;
            }
            RelationKind::OneToMany { .. } => {}
        }
        let entity = self.pending_mut(table)?;
        if let Some(existing) = entity.relations.iter().find(|r| r.name == relation.name) {
            return same_or_conflict(existing == &relation, table, "relation", &relation.name);
        }
        entity.relations.push(relation);
        Ok(())
    }

    /// Register a secondary index.
    ///
    /// # Errors
    /// Unknown table, invalid name, empty column list or conflicting
    /// redeclaration. Columns are checked by [`seal`](Self::seal).
    pub fn describe_index(&mut self, table: &str, index: IndexSpec) -> Result<()> {
        validate_identifier("index", &index.name)?;
        if index.columns.is_empty() {
            return Err(DataError::config(format!(
                "index '{}' has no columns",
                index.name
            )));
        }
        let entity = self.pending_mut(table)?;
        if let Some(existing) = entity.indexes.iter().find(|i| i.name == index.name) {
            return same_or_conflict(existing == &index, table, "index", &index.name);
        }
        entity.indexes.push(index);
        Ok(())
    }

    /// Validate every declaration and freeze the catalog.
    ///
    /// # Errors
    /// Any unresolved relation, unknown index column, duplicate index name or
    /// schema-parity mismatch between the two engines.
    pub fn seal(self) -> Result<Arc<SchemaCatalog>> {
        let tables: HashSet<&str> = self.entities.iter().map(|e| e.table.as_str()).collect();

        let mut descriptors = Vec::with_capacity(self.entities.len());
        for pending in &self.entities {
            descriptors.push(build_descriptor(pending, &tables)?);
        }

        let mut join_tables: Vec<JoinTable> = Vec::new();
        for desc in &mut descriptors {
            resolve_relations(desc, &self.entities, &tables, &mut join_tables)?;
        }

        let mut index_names = HashSet::new();
        for desc in &descriptors {
            for index in &desc.indexes {
                if !index_names.insert(index.name.clone()) {
                    return Err(DataError::config(format!(
                        "index name '{}' is used more than once",
                        index.name
                    )));
                }
            }
        }

        for desc in &descriptors {
            parity::check_static(desc)?;
        }
        for join in &join_tables {
            parity::check_static_join(join)?;
        }

        let mut inbound: HashMap<String, Vec<InboundRef>> = HashMap::new();
        for desc in &descriptors {
            for rel in &desc.relations {
                inbound
                    .entry(rel.target().to_owned())
                    .or_default()
                    .push(InboundRef {
                        from_table: desc.table.clone(),
                        relation: rel.name().to_owned(),
                        cardinality: rel.cardinality(),
                    });
            }
        }

        debug!(
            entities = descriptors.len(),
            join_tables = join_tables.len(),
            "schema catalog sealed"
        );
        Ok(Arc::new(SchemaCatalog::new(
            descriptors.into_iter().map(Arc::new).collect(),
            join_tables,
            inbound,
        )))
    }

    fn pending_mut(&mut self, table: &str) -> Result<&mut PendingEntity> {
        self.entities
            .iter_mut()
            .find(|e| e.table == table)
            .ok_or_else(|| DataError::config(format!("entity '{table}' is not described")))
    }
}

fn same_or_conflict(same: bool, table: &str, what: &str, name: &str) -> Result<()> {
    if same {
        Ok(())
    } else {
        Err(DataError::config(format!(
            "{what} '{table}.{name}' registered twice with different definitions"
        )))
    }
}

/// Lowercase snake-case identifier.
fn validate_identifier(what: &str, name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = chars.next().is_some_and(|c| c.is_ascii_lowercase())
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        && !name.ends_with('_')
        && !name.contains("__")
        && name.len() <= MAX_IDENTIFIER_LEN;
    if valid {
        Ok(())
    } else {
        Err(DataError::config(format!(
            "{what} name '{name}' must be lowercase snake_case"
        )))
    }
}

fn build_descriptor(pending: &PendingEntity, tables: &HashSet<&str>) -> Result<EntityDescriptor> {
    let table = pending.table.as_str();
    let mut columns = vec![ColumnSpec::uuid(ID).primary()];
    if pending.options.scope != TenantScope::Global {
        columns.push(ColumnSpec::uuid(TENANT_ID));
    }
    if pending.options.scope == TenantScope::Organization {
        columns.push(ColumnSpec::uuid(ORGANIZATION_ID));
    }
    columns.extend(pending.columns.iter().cloned());

    let mut join_indexes = Vec::new();
    for rel in &pending.relations {
        if !tables.contains(rel.target.as_str()) {
            return Err(DataError::config(format!(
                "relation '{table}.{}' targets unknown entity '{}'",
                rel.name, rel.target
            )));
        }
        if columns.iter().any(|c| c.name == rel.name) {
            return Err(DataError::config(format!(
                "relation '{table}.{}' shadows a column",
                rel.name
            )));
        }
        let RelationKind::ManyToOne {
            join_column,
            optional,
        } = &rel.kind
        else {
            continue;
        };
        let sets_null = rel.on_delete == ReferentialAction::SetNull
            || rel.on_update == ReferentialAction::SetNull;
        match columns.iter().find(|c| &c.name == join_column) {
            Some(declared) => {
                if !declared.is_uuid() {
                    return Err(DataError::config(format!(
                        "join column '{table}.{join_column}' must be a uuid"
                    )));
                }
                if (sets_null || *optional) && !declared.nullable {
                    return Err(DataError::config(format!(
                        "relation '{table}.{}' may set '{join_column}' to null but the column is not nullable",
                        rel.name
                    )));
                }
            }
            None => {
                let mut implied = ColumnSpec::uuid(join_column.clone());
                implied.nullable = *optional || sets_null;
                columns.push(implied);
            }
        }
        join_indexes.push(IndexSpec::new(
            format!("idx_{table}_{join_column}"),
            [join_column.clone()],
        ));
    }

    if pending.options.timestamps {
        columns.push(ColumnSpec::datetime(CREATED_AT));
        columns.push(ColumnSpec::datetime(UPDATED_AT));
    }
    if pending.options.soft_delete {
        columns.push(ColumnSpec::datetime(DELETED_AT).nullable());
    }

    let indexes = build_indexes(pending, &columns, join_indexes)?;

    Ok(EntityDescriptor {
        table: table.to_owned(),
        options: pending.options,
        columns,
        relations: Vec::new(),
        indexes,
    })
}

fn build_indexes(
    pending: &PendingEntity,
    columns: &[ColumnSpec],
    join_indexes: Vec<IndexSpec>,
) -> Result<Vec<IndexSpec>> {
    let table = pending.table.as_str();
    let mut indexes = Vec::new();
    match pending.options.scope {
        TenantScope::Global => {}
        TenantScope::Tenant => {
            indexes.push(IndexSpec::new(format!("idx_{table}_scope"), [TENANT_ID]));
        }
        TenantScope::Organization => {
            indexes.push(IndexSpec::new(
                format!("idx_{table}_scope"),
                [TENANT_ID, ORGANIZATION_ID],
            ));
        }
    }
    indexes.extend(join_indexes);
    for index in &pending.indexes {
        if let Some(missing) = index
            .columns
            .iter()
            .find(|col| !columns.iter().any(|c| &&c.name == col))
        {
            return Err(DataError::config(format!(
                "index '{}' references unknown column '{table}.{missing}'",
                index.name
            )));
        }
        indexes.push(index.clone());
    }
    Ok(indexes)
}

fn resolve_relations(
    desc: &mut EntityDescriptor,
    pending: &[PendingEntity],
    tables: &HashSet<&str>,
    join_tables: &mut Vec<JoinTable>,
) -> Result<()> {
    let source = pending
        .iter()
        .find(|p| p.table == desc.table)
        .ok_or_else(|| DataError::config(format!("entity '{}' vanished", desc.table)))?;

    let mut relations = Vec::with_capacity(source.relations.len());
    for spec in &source.relations {
        let link = match &spec.kind {
            RelationKind::ManyToOne { join_column, .. } => RelationLink::Owned {
                local_column: join_column.clone(),
            },
            RelationKind::OneToMany { mapped_by } => {
                let owner = pending
                    .iter()
                    .find(|p| p.table == spec.target)
                    .and_then(|p| p.relations.iter().find(|r| &r.name == mapped_by));
                match owner {
                    Some(RelationSpec {
                        target,
                        kind: RelationKind::ManyToOne { join_column, .. },
                        ..
                    }) if target == &desc.table => RelationLink::Inverse {
                        remote_column: join_column.clone(),
                    },
                    _ => {
                        return Err(DataError::config(format!(
                            "relation '{}.{}': '{}.{mapped_by}' is not a many-to-one back to '{}'",
                            desc.table, spec.name, spec.target, desc.table
                        )));
                    }
                }
            }
            RelationKind::ManyToMany { join_table } => {
                if spec.target == desc.table {
                    return Err(DataError::config(format!(
                        "many-to-many '{}.{}' must target another entity",
                        desc.table, spec.name
                    )));
                }
                if tables.contains(join_table.as_str()) {
                    return Err(DataError::config(format!(
                        "join table '{join_table}' collides with an entity table"
                    )));
                }
                let join = JoinTable {
                    name: join_table.clone(),
                    owner: desc.table.clone(),
                    source_table: desc.table.clone(),
                    source_column: format!("{}_id", desc.table),
                    target_table: spec.target.clone(),
                    target_column: format!("{}_id", spec.target),
                };
                match join_tables.iter().find(|j| j.name == join.name) {
                    Some(existing) if !existing.same_shape(&join) => {
                        return Err(DataError::config(format!(
                            "join table '{join_table}' is declared with different endpoints"
                        )));
                    }
                    Some(_) => {}
                    None => join_tables.push(join.clone()),
                }
                RelationLink::Linked {
                    join_table: join.name,
                    source_column: join.source_column,
                    target_column: join.target_column,
                }
            }
        };
        relations.push(Relation {
            spec: spec.clone(),
            link,
        });
    }
    desc.relations = relations;
    Ok(())
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::metadata::{Cardinality, ColumnType};

    fn base() -> EntityRegistry {
        let mut reg = EntityRegistry::new();
        reg.describe_entity("department", EntityOptions::organization())
            .unwrap();
        reg.describe_column("department", ColumnSpec::string("name"))
            .unwrap();
        reg.describe_entity("employee", EntityOptions::organization().soft_delete())
            .unwrap();
        reg.describe_column("employee", ColumnSpec::string("first_name"))
            .unwrap();
        reg.describe_relation(
            "employee",
            RelationSpec::many_to_one("department", "department", "department_id")
                .optional()
                .on_delete(ReferentialAction::SetNull),
        )
        .unwrap();
        reg.describe_relation(
            "department",
            RelationSpec::one_to_many("employees", "employee", "department"),
        )
        .unwrap();
        reg
    }

    #[test]
    fn test_identical_registration_is_idempotent() {
        let mut reg = base();
        reg.describe_entity("employee", EntityOptions::organization().soft_delete())
            .unwrap();
        reg.describe_column("employee", ColumnSpec::string("first_name"))
            .unwrap();
        assert!(reg.seal().is_ok());
    }

    #[test]
    fn test_conflicting_registration_fails() {
        let mut reg = base();
        let err = reg
            .describe_entity("employee", EntityOptions::tenant())
            .unwrap_err();
        assert!(matches!(err, DataError::Configuration(_)));

        let err = reg
            .describe_column("employee", ColumnSpec::string("first_name").nullable())
            .unwrap_err();
        assert!(matches!(err, DataError::Configuration(_)));
    }

    #[test]
    fn test_names_must_be_snake_case() {
        let mut reg = EntityRegistry::new();
        for bad in ["Employee", "employee-table", "_x", "x__y", "1abc", ""] {
            assert!(
                reg.describe_entity(bad, EntityOptions::tenant()).is_err(),
                "{bad} accepted"
            );
        }
    }

    #[test]
    fn test_reserved_columns_rejected() {
        let mut reg = base();
        assert!(
            reg.describe_column("employee", ColumnSpec::uuid("tenant_id"))
                .is_err()
        );
    }

    #[test]
    fn test_bad_default_rejected() {
        let mut reg = base();
        let err = reg
            .describe_column("employee", ColumnSpec::integer("age").default_value("old"))
            .unwrap_err();
        assert!(matches!(err, DataError::Configuration(_)));
    }

    #[test]
    fn test_implicit_columns_and_order() {
        let catalog = base().seal().unwrap();
        let employee = catalog.entity("employee").unwrap();
        let names: Vec<&str> = employee.columns().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(
            names,
            [
                "id",
                "tenant_id",
                "organization_id",
                "first_name",
                "department_id",
                "created_at",
                "updated_at",
                "deleted_at"
            ]
        );
        let fk = employee.column("department_id").unwrap();
        assert_eq!(fk.ty, ColumnType::Uuid);
        assert!(fk.nullable);
        assert!(employee.column("id").unwrap().primary_key);
    }

    #[test]
    fn test_set_null_requires_nullable_column() {
        let mut reg = EntityRegistry::new();
        reg.describe_entity("team", EntityOptions::tenant()).unwrap();
        reg.describe_entity("member", EntityOptions::tenant()).unwrap();
        reg.describe_column("member", ColumnSpec::uuid("team_id"))
            .unwrap();
        reg.describe_relation(
            "member",
            RelationSpec::many_to_one("team", "team", "team_id")
                .on_delete(ReferentialAction::SetNull),
        )
        .unwrap();
        assert!(matches!(reg.seal(), Err(DataError::Configuration(_))));
    }

    #[test]
    fn test_unknown_target_rejected() {
        let mut reg = EntityRegistry::new();
        reg.describe_entity("member", EntityOptions::tenant()).unwrap();
        reg.describe_relation("member", RelationSpec::many_to_one("team", "team", "team_id"))
            .unwrap();
        assert!(matches!(reg.seal(), Err(DataError::Configuration(_))));
    }

    #[test]
    fn test_mapped_by_must_point_back() {
        let mut reg = base();
        reg.describe_relation(
            "department",
            RelationSpec::one_to_many("staff", "employee", "first_name"),
        )
        .unwrap();
        assert!(matches!(reg.seal(), Err(DataError::Configuration(_))));
    }

    #[test]
    fn test_inverse_relation_resolves_through_join_column() {
        let catalog = base().seal().unwrap();
        let department = catalog.entity("department").unwrap();
        let employees = department.relation("employees").unwrap();
        assert_eq!(
            employees.link,
            RelationLink::Inverse {
                remote_column: "department_id".to_owned()
            }
        );
    }

    #[test]
    fn test_reverse_navigation_index() {
        let catalog = base().seal().unwrap();
        let inbound = catalog.inbound("department");
        assert_eq!(inbound.len(), 1);
        assert_eq!(inbound[0].from_table, "employee");
        assert_eq!(inbound[0].relation, "department");
        assert_eq!(inbound[0].cardinality, Cardinality::ManyToOne);
        assert!(catalog.inbound("tag").is_empty());
    }

    #[test]
    fn test_many_to_many_shared_join_table() {
        let mut reg = base();
        reg.describe_entity("tag", EntityOptions::tenant()).unwrap();
        reg.describe_relation("employee", RelationSpec::many_to_many("tags", "tag", "employee_tag"))
            .unwrap();
        reg.describe_relation(
            "tag",
            RelationSpec::many_to_many("employees", "employee", "employee_tag"),
        )
        .unwrap();
        let catalog = reg.seal().unwrap();
        assert_eq!(catalog.join_tables().len(), 1);
        let join = &catalog.join_tables()[0];
        assert_eq!(join.source_column, "employee_id");
        assert_eq!(join.target_column, "tag_id");

        let from_tag = catalog.entity("tag").unwrap().relation("employees").unwrap();
        assert_eq!(
            from_tag.link,
            RelationLink::Linked {
                join_table: "employee_tag".into(),
                source_column: "tag_id".into(),
                target_column: "employee_id".into(),
            }
        );
    }

    #[test]
    fn test_index_columns_must_exist() {
        let mut reg = base();
        reg.describe_index("employee", IndexSpec::new("uq_employee_email", ["email"]).unique())
            .unwrap();
        assert!(matches!(reg.seal(), Err(DataError::Configuration(_))));
    }

    #[test]
    fn test_scope_index_is_implicit() {
        let catalog = base().seal().unwrap();
        let employee = catalog.entity("employee").unwrap();
        let scope = employee
            .indexes()
            .iter()
            .find(|i| i.name == "idx_employee_scope")
            .unwrap();
        assert_eq!(scope.columns, ["tenant_id", "organization_id"]);
    }
}
