use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tenancy_query::{Criteria, OrderKey};
use tenancy_security::AccessScope;
use tracing::debug;
use uuid::Uuid;

use super::eager::{self, KEY_CHUNK, PAIR_CHUNK};
use super::predicate::{self, Pred};
use super::{AdapterQuery, Engine, LiveColumn, RawQuery, RepositoryAdapter};
use crate::error::{DataError, Result};
use crate::metadata::{EntityDescriptor, ID, JoinTable, RelationLink, SchemaCatalog};
use crate::scope::{live_criteria, scope_criteria};
use crate::values::{self, Record, SqlValue};

/// Statement rendering and execution for one engine.
///
/// Implementations receive already validated, encoded input and return rows
/// decoded through the descriptor's column types.
#[async_trait]
pub(crate) trait SqlBackend: Send + Sync {
    fn engine(&self) -> Engine;

    async fn select(
        &self,
        desc: &EntityDescriptor,
        pred: &Pred,
        order: &[OrderKey],
        offset: u64,
        limit: Option<u64>,
    ) -> Result<Vec<Record>>;

    async fn count(&self, desc: &EntityDescriptor, pred: &Pred) -> Result<u64>;

    async fn insert(&self, desc: &EntityDescriptor, row: Vec<(String, SqlValue)>) -> Result<()>;

    async fn update(
        &self,
        desc: &EntityDescriptor,
        set: Vec<(String, SqlValue)>,
        pred: &Pred,
    ) -> Result<u64>;

    async fn delete(&self, desc: &EntityDescriptor, pred: &Pred) -> Result<u64>;

    /// `(source_id, target_id)` pairs of a join table for the given sources.
    async fn select_links(
        &self,
        join_table: &str,
        source_column: &str,
        target_column: &str,
        source_ids: Vec<SqlValue>,
    ) -> Result<Vec<(String, String)>>;

    /// Insert `(source, target)` pairs, skipping pairs already present.
    /// Returns the number of new pairs.
    async fn insert_links(
        &self,
        join_table: &str,
        source_column: &str,
        target_column: &str,
        source_id: String,
        target_ids: Vec<String>,
    ) -> Result<u64>;

    async fn delete_links(
        &self,
        join_table: &str,
        source_column: &str,
        target_column: &str,
        source_id: String,
        target_ids: Vec<SqlValue>,
    ) -> Result<u64>;

    async fn raw(&self, query: &RawQuery) -> Result<Vec<Record>>;

    async fn create_table(&self, desc: &EntityDescriptor, joins: &[&JoinTable]) -> Result<()>;

    async fn table_info(&self, table: &str) -> Result<Vec<LiveColumn>>;
}

/// Repository of one entity over one [`SqlBackend`].
#[derive(Clone, Debug)]
pub struct TableRepository<B> {
    backend: B,
    catalog: Arc<SchemaCatalog>,
    desc: Arc<EntityDescriptor>,
}

impl<B: SqlBackend> TableRepository<B> {
    pub(crate) fn new(backend: B, catalog: Arc<SchemaCatalog>, desc: Arc<EntityDescriptor>) -> Self {
        Self {
            backend,
            catalog,
            desc,
        }
    }

    /// Native engine handle.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    #[must_use]
    pub fn catalog(&self) -> &Arc<SchemaCatalog> {
        &self.catalog
    }

    fn by_id(id: &str) -> Pred {
        Pred::Cmp {
            column: ID.to_owned(),
            op: tenancy_query::CompareOp::Eq,
            value: SqlValue::Text(id.to_owned()),
        }
    }

    /// Encode a record's columns. Keys naming a relation are ignored so that
    /// loaded rows can be written back; any other unknown key is rejected.
    fn encode_row(&self, record: &Record) -> Result<Vec<(String, SqlValue)>> {
        let mut row = Vec::with_capacity(record.len());
        for (key, value) in record {
            match self.desc.column(key) {
                Some(column) => row.push((key.clone(), values::encode(column, value)?)),
                None if self.desc.relation(key).is_some() => {}
                None => {
                    return Err(tenancy_query::Error::UnknownField {
                        entity: self.desc.table().to_owned(),
                        field: key.clone(),
                    }
                    .into());
                }
            }
        }
        Ok(row)
    }

    fn validate_order(&self, order: &[OrderKey]) -> Result<()> {
        for key in order {
            predicate::column(&self.desc, &key.field)?;
        }
        Ok(())
    }

    fn validate_relations(&self, relations: &[String]) -> Result<()> {
        match relations.iter().find(|r| self.desc.relation(r).is_none()) {
            Some(unknown) => Err(tenancy_query::Error::UnknownRelation {
                entity: self.desc.table().to_owned(),
                relation: unknown.clone(),
            }
            .into()),
            None => Ok(()),
        }
    }

    /// Join table, source column, target column and target entity of a
    /// many-to-many relation.
    fn join_of(&self, relation: &str) -> Result<(&str, &str, &str, &Arc<EntityDescriptor>)> {
        let found = self
            .desc
            .relation(relation)
            .ok_or_else(|| tenancy_query::Error::UnknownRelation {
                entity: self.desc.table().to_owned(),
                relation: relation.to_owned(),
            })?;
        let RelationLink::Linked {
            join_table,
            source_column,
            target_column,
        } = &found.link
        else {
            return Err(DataError::field(relation, "not a many-to-many relation"));
        };
        let target = self.catalog.entity(found.target())?;
        Ok((join_table, source_column, target_column, target))
    }

    /// Live rows of `desc` among `ids`, restricted to `scope` when given.
    async fn visible_count(
        &self,
        desc: &EntityDescriptor,
        ids: &[String],
        scope: Option<&AccessScope>,
    ) -> Result<u64> {
        let mut visible = live_criteria(desc);
        if let Some(scope) = scope {
            visible = visible.and(scope_criteria(desc, scope));
        }
        let mut total = 0;
        for chunk in ids.chunks(KEY_CHUNK) {
            let filter = Criteria::in_list(ID, chunk.to_vec()).and(visible.clone());
            let pred = predicate::compile(desc, &filter)?;
            total += self.backend.count(desc, &pred).await?;
        }
        Ok(total)
    }

    async fn fetch_by_id(&self, id: &str) -> Result<Option<Record>> {
        let mut rows = self
            .backend
            .select(&self.desc, &Self::by_id(id), &[], 0, Some(1))
            .await?;
        Ok(rows.pop())
    }
}

#[async_trait]
impl<B: SqlBackend> RepositoryAdapter for TableRepository<B> {
    fn engine(&self) -> Engine {
        self.backend.engine()
    }

    fn descriptor(&self) -> &EntityDescriptor {
        &self.desc
    }

    async fn find(&self, query: &AdapterQuery) -> Result<Vec<Record>> {
        let pred = predicate::compile(&self.desc, &query.filter)?;
        self.validate_order(&query.order)?;
        self.validate_relations(&query.relations)?;
        let mut rows = self
            .backend
            .select(&self.desc, &pred, &query.order, query.offset, query.limit)
            .await?;
        if !query.relations.is_empty() && !rows.is_empty() {
            eager::attach(
                &self.backend,
                &self.catalog,
                &self.desc,
                &mut rows,
                &query.relations,
                query.scope.as_ref(),
            )
            .await?;
        }
        Ok(rows)
    }

    async fn count(&self, filter: &Criteria) -> Result<u64> {
        let pred = predicate::compile(&self.desc, filter)?;
        self.backend.count(&self.desc, &pred).await
    }

    async fn insert(&self, mut record: Record) -> Result<Record> {
        let id = match record.get(ID) {
            None | Some(Value::Null) => Uuid::new_v4(),
            Some(Value::String(s)) => {
                Uuid::parse_str(s).map_err(|e| DataError::field(ID, e.to_string()))?
            }
            Some(other) => {
                return Err(DataError::field(ID, format!("expected a uuid, got {other}")));
            }
        };
        let id = id.to_string();
        record.insert(ID.to_owned(), Value::String(id.clone()));
        let row = self.encode_row(&record)?;

        debug!(table = self.desc.table(), engine = %self.engine(), %id, "insert");
        self.backend.insert(&self.desc, row).await?;
        self.fetch_by_id(&id).await?.ok_or_else(|| {
            DataError::Database(format!(
                "row '{id}' vanished from '{}' right after insert",
                self.desc.table()
            ))
        })
    }

    async fn update_by_id(&self, id: Uuid, mut patch: Record) -> Result<Option<Record>> {
        if let Some(given) = patch.remove(ID) {
            let same = given
                .as_str()
                .and_then(|s| Uuid::parse_str(s).ok())
                .is_some_and(|given| given == id);
            if !same {
                return Err(DataError::field(ID, "the primary key cannot be changed"));
            }
        }
        let id = id.to_string();
        let set = self.encode_row(&patch)?;
        if set.is_empty() {
            return self.fetch_by_id(&id).await;
        }
        let affected = self
            .backend
            .update(&self.desc, set, &Self::by_id(&id))
            .await?;
        if affected == 0 {
            return Ok(None);
        }
        self.fetch_by_id(&id).await
    }

    async fn update_where(&self, filter: &Criteria, mut patch: Record) -> Result<u64> {
        if patch.remove(ID).is_some() {
            return Err(DataError::field(ID, "the primary key cannot be changed"));
        }
        let pred = predicate::compile(&self.desc, filter)?;
        let set = self.encode_row(&patch)?;
        if set.is_empty() {
            return self.backend.count(&self.desc, &pred).await;
        }
        self.backend.update(&self.desc, set, &pred).await
    }

    async fn delete_by_id(&self, id: Uuid) -> Result<bool> {
        let affected = self
            .backend
            .delete(&self.desc, &Self::by_id(&id.to_string()))
            .await?;
        Ok(affected > 0)
    }

    async fn delete_where(&self, filter: &Criteria) -> Result<u64> {
        let pred = predicate::compile(&self.desc, filter)?;
        self.backend.delete(&self.desc, &pred).await
    }

    async fn link(
        &self,
        relation: &str,
        id: Uuid,
        targets: &[Uuid],
        scope: Option<&AccessScope>,
    ) -> Result<u64> {
        let (join_table, source_column, target_column, target) = self.join_of(relation)?;
        let source = id.to_string();
        if self.visible_count(&self.desc, &[source.clone()], scope).await? == 0 {
            return Err(DataError::not_found(self.desc.table()));
        }
        let mut wanted: Vec<String> = targets.iter().map(Uuid::to_string).collect();
        wanted.sort_unstable();
        wanted.dedup();
        if wanted.is_empty() {
            return Ok(0);
        }
        // every target must be reachable by the caller, or none is linked
        let visible = self.visible_count(target, &wanted, scope).await?;
        if visible != wanted.len() as u64 {
            return Err(DataError::not_found(target.table()));
        }
        debug!(
            table = self.desc.table(),
            relation,
            %id,
            targets = wanted.len(),
            "link"
        );
        let mut linked = 0;
        for chunk in wanted.chunks(PAIR_CHUNK) {
            linked += self
                .backend
                .insert_links(
                    join_table,
                    source_column,
                    target_column,
                    source.clone(),
                    chunk.to_vec(),
                )
                .await?;
        }
        Ok(linked)
    }

    async fn unlink(
        &self,
        relation: &str,
        id: Uuid,
        targets: &[Uuid],
        scope: Option<&AccessScope>,
    ) -> Result<u64> {
        let (join_table, source_column, target_column, _) = self.join_of(relation)?;
        let source = id.to_string();
        if self.visible_count(&self.desc, &[source.clone()], scope).await? == 0 {
            return Err(DataError::not_found(self.desc.table()));
        }
        let mut unlinked = 0;
        for chunk in targets.chunks(KEY_CHUNK) {
            let chunk = chunk.iter().map(|t| SqlValue::Text(t.to_string())).collect();
            unlinked += self
                .backend
                .delete_links(join_table, source_column, target_column, source.clone(), chunk)
                .await?;
        }
        Ok(unlinked)
    }

    async fn raw_query(&self, query: &RawQuery) -> Result<Vec<Record>> {
        self.backend.raw(query).await
    }

    async fn create_table(&self) -> Result<()> {
        let joins: Vec<&JoinTable> = self.catalog.owned_join_tables(self.desc.table()).collect();
        self.backend.create_table(&self.desc, &joins).await
    }

    async fn describe_table(&self, table: &str) -> Result<Vec<LiveColumn>> {
        self.backend.table_info(table).await
    }
}
