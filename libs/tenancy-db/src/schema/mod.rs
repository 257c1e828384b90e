//! Table bootstrap and the live schema diff between engines.

pub mod parity;

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use tracing::{info, warn};

use crate::engine::{Engine, LiveColumn};
use crate::error::Result;
use crate::repositories::Repositories;
use parity::{ColumnShape, StorageClass, affinity};

pub use parity::{check_static, check_static_join};

/// Create every table, index and join table through `engine`.
///
/// Tables are created in catalog order; SQLite resolves foreign key targets
/// at write time, so declaration order does not matter.
///
/// # Errors
/// The first DDL failure.
pub async fn bootstrap_schema(repos: &Repositories, engine: Engine) -> Result<()> {
    for desc in repos.catalog().entities() {
        repos.adapter(engine, desc.table())?.create_table().await?;
    }
    info!(
        %engine,
        tables = repos.catalog().entities().len(),
        join_tables = repos.catalog().join_tables().len(),
        "schema bootstrapped"
    );
    Ok(())
}

/// One divergence found by [`schema_diff`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Mismatch {
    pub table: String,
    pub column: Option<String>,
    /// Engine whose view diverged; `None` when the engines disagree with each other.
    pub engine: Option<Engine>,
    pub detail: String,
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.column {
            Some(column) => write!(f, "{}.{column}", self.table)?,
            None => f.write_str(&self.table)?,
        }
        if let Some(engine) = self.engine {
            write!(f, " [{engine}]")?;
        }
        write!(f, ": {}", self.detail)
    }
}

/// Result of comparing the live schema with the catalog through both engines.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SchemaDiff {
    pub tables_checked: usize,
    pub mismatches: Vec<Mismatch>,
}

impl SchemaDiff {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.mismatches.is_empty()
    }
}

fn live_shape(column: &LiveColumn) -> ColumnShape {
    ColumnShape {
        class: affinity(&column.declared_type),
        not_null: column.not_null,
        primary_key: column.primary_key,
    }
}

fn compare_table(
    table: &str,
    engine: Engine,
    expected: &BTreeMap<String, ColumnShape>,
    live: &[LiveColumn],
    out: &mut Vec<Mismatch>,
) {
    let mismatch = |column: Option<&str>, detail: String| Mismatch {
        table: table.to_owned(),
        column: column.map(ToOwned::to_owned),
        engine: Some(engine),
        detail,
    };
    if live.is_empty() {
        out.push(mismatch(None, "table does not exist".to_owned()));
        return;
    }
    let actual: BTreeMap<&str, ColumnShape> = live
        .iter()
        .map(|c| (c.name.as_str(), live_shape(c)))
        .collect();
    for (name, want) in expected {
        match actual.get(name.as_str()) {
            None => out.push(mismatch(Some(name), "column is missing".to_owned())),
            Some(got) if got != want => out.push(mismatch(
                Some(name),
                format!("expected '{want}', found '{got}'"),
            )),
            Some(_) => {}
        }
    }
    for name in actual.keys() {
        if !expected.contains_key(*name) {
            out.push(mismatch(Some(name), "column is not declared".to_owned()));
        }
    }
}

/// Read every table through both engines and compare with the catalog and
/// with each other.
///
/// # Errors
/// Only when introspection itself fails; divergences are reported in the
/// returned [`SchemaDiff`].
pub async fn schema_diff(repos: &Repositories) -> Result<SchemaDiff> {
    let catalog = repos.catalog();
    let mut tables: Vec<(String, &str, BTreeMap<String, ColumnShape>)> = Vec::new();
    for desc in catalog.entities() {
        let expected = desc
            .columns()
            .iter()
            .map(|c| (c.name.clone(), ColumnShape::of(c)))
            .collect();
        tables.push((desc.table().to_owned(), desc.table(), expected));
    }
    for join in catalog.join_tables() {
        let shape = ColumnShape {
            class: StorageClass::Text,
            not_null: true,
            primary_key: true,
        };
        let expected = [
            (join.source_column.clone(), shape),
            (join.target_column.clone(), shape),
        ]
        .into_iter()
        .collect();
        tables.push((join.name.clone(), join.owner.as_str(), expected));
    }

    let mut diff = SchemaDiff {
        tables_checked: tables.len(),
        mismatches: Vec::new(),
    };
    for (table, via, expected) in &tables {
        let mut views = Vec::with_capacity(Engine::ALL.len());
        for engine in Engine::ALL {
            let live = repos.adapter(engine, via)?.describe_table(table).await?;
            compare_table(table, engine, expected, &live, &mut diff.mismatches);
            views.push(live);
        }
        if views.windows(2).any(|w| w[0] != w[1]) {
            diff.mismatches.push(Mismatch {
                table: table.clone(),
                column: None,
                engine: None,
                detail: "sea_orm and sqlx report different column lists".to_owned(),
            });
        }
    }

    if diff.is_clean() {
        info!(tables = diff.tables_checked, "schema diff clean");
    } else {
        warn!(
            tables = diff.tables_checked,
            mismatches = diff.mismatches.len(),
            "schema diff found mismatches"
        );
    }
    Ok(diff)
}
