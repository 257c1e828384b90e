//! Eager loading of declared relations, shared by both backends.
//!
//! Related rows are fetched with `IN` queries per relation, at most
//! [`KEY_CHUNK`] keys each, and attached to each root record under the
//! relation name: an object (or `null`) for many-to-one, an array otherwise.

use std::collections::{HashMap, HashSet};

use serde_json::Value;
use tenancy_query::{Criteria, OrderKey};
use tenancy_security::AccessScope;

use super::SqlBackend;
use super::predicate;
use crate::error::Result;
use crate::metadata::{EntityDescriptor, ID, Relation, RelationLink, SchemaCatalog};
use crate::scope::{live_criteria, scope_criteria};
use crate::values::{Record, SqlValue};

/// Keys bound per `IN` list; stays under SQLite's host-parameter limit with
/// room for the scope predicate.
pub(super) const KEY_CHUNK: usize = 500;

/// `(source, target)` pairs bound per join-table insert; two values per pair.
pub(super) const PAIR_CHUNK: usize = 250;

pub(super) async fn attach<B: SqlBackend + ?Sized>(
    backend: &B,
    catalog: &SchemaCatalog,
    desc: &EntityDescriptor,
    rows: &mut [Record],
    relations: &[String],
    scope: Option<&AccessScope>,
) -> Result<()> {
    for name in relations {
        let relation = desc.relation(name).ok_or_else(|| tenancy_query::Error::UnknownRelation {
            entity: desc.table().to_owned(),
            relation: name.clone(),
        })?;
        let target = catalog.entity(relation.target())?;
        let mut visible = live_criteria(target);
        if let Some(scope) = scope {
            visible = visible.and(scope_criteria(target, scope));
        }
        load_relation(backend, relation, target, &visible, rows).await?;
    }
    Ok(())
}

async fn load_relation<B: SqlBackend + ?Sized>(
    backend: &B,
    relation: &Relation,
    target: &EntityDescriptor,
    visible: &Criteria,
    rows: &mut [Record],
) -> Result<()> {
    let name = relation.name();
    match &relation.link {
        RelationLink::Owned { local_column } => {
            let keys = distinct_strings(rows.iter().filter_map(|r| r.get(local_column)));
            let related = fetch(backend, target, ID, &keys, visible).await?;
            let by_id: HashMap<String, Record> = related
                .into_iter()
                .filter_map(|r| key_of(&r, ID).map(|k| (k, r)))
                .collect();
            for row in rows.iter_mut() {
                let value = row
                    .get(local_column)
                    .and_then(Value::as_str)
                    .and_then(|k| by_id.get(k))
                    .map_or(Value::Null, |r| Value::Object(r.clone()));
                row.insert(name.to_owned(), value);
            }
        }
        RelationLink::Inverse { remote_column } => {
            let keys = distinct_strings(rows.iter().filter_map(|r| r.get(ID)));
            let related = fetch(backend, target, remote_column, &keys, visible).await?;
            let mut grouped: HashMap<String, Vec<Value>> = HashMap::new();
            for r in related {
                if let Some(k) = key_of(&r, remote_column) {
                    grouped.entry(k).or_default().push(Value::Object(r));
                }
            }
            attach_groups(rows, name, &grouped);
        }
        RelationLink::Linked {
            join_table,
            source_column,
            target_column,
        } => {
            let sources = distinct_strings(rows.iter().filter_map(|r| r.get(ID)));
            let mut links = Vec::new();
            for chunk in sources.chunks(KEY_CHUNK) {
                let chunk = chunk.iter().cloned().map(SqlValue::Text).collect();
                links.extend(
                    backend
                        .select_links(join_table, source_column, target_column, chunk)
                        .await?,
                );
            }
            let targets = distinct_strings_owned(links.iter().map(|(_, t)| t.clone()));
            let related = fetch(backend, target, ID, &targets, visible).await?;
            let by_id: HashMap<String, Record> = related
                .into_iter()
                .filter_map(|r| key_of(&r, ID).map(|k| (k, r)))
                .collect();
            let mut grouped: HashMap<String, Vec<Value>> = HashMap::new();
            for (source, target_id) in links {
                if let Some(r) = by_id.get(&target_id) {
                    grouped
                        .entry(source)
                        .or_default()
                        .push(Value::Object(r.clone()));
                }
            }
            attach_groups(rows, name, &grouped);
        }
    }
    Ok(())
}

/// Rows of `target` whose `column` is one of `keys`, ordered by id.
async fn fetch<B: SqlBackend + ?Sized>(
    backend: &B,
    target: &EntityDescriptor,
    column: &str,
    keys: &[String],
    visible: &Criteria,
) -> Result<Vec<Record>> {
    let mut rows = Vec::new();
    for chunk in keys.chunks(KEY_CHUNK) {
        let filter = Criteria::in_list(column, chunk.to_vec()).and(visible.clone());
        let pred = predicate::compile(target, &filter)?;
        rows.extend(
            backend
                .select(target, &pred, &[OrderKey::asc(ID)], 0, None)
                .await?,
        );
    }
    if keys.len() > KEY_CHUNK {
        rows.sort_by_key(|r| key_of(r, ID));
    }
    Ok(rows)
}

fn attach_groups(rows: &mut [Record], name: &str, grouped: &HashMap<String, Vec<Value>>) {
    for row in rows.iter_mut() {
        let items = row
            .get(ID)
            .and_then(Value::as_str)
            .and_then(|id| grouped.get(id))
            .cloned()
            .unwrap_or_default();
        row.insert(name.to_owned(), Value::Array(items));
    }
}

fn key_of(record: &Record, column: &str) -> Option<String> {
    record.get(column).and_then(Value::as_str).map(ToOwned::to_owned)
}

fn distinct_strings<'a>(values: impl Iterator<Item = &'a Value>) -> Vec<String> {
    distinct_strings_owned(values.filter_map(Value::as_str).map(ToOwned::to_owned))
}

fn distinct_strings_owned(values: impl Iterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    values.filter(|v| seen.insert(v.clone())).collect()
}
