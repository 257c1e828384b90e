//! sqlx backend: hand-rendered SQLite statements through `QueryBuilder`,
//! executed on the pool or an open `sqlx::Transaction`.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use sea_orm::sqlx::query::Query;
use sea_orm::sqlx::sqlite::{SqliteArguments, SqliteRow};
use sea_orm::sqlx::{self, QueryBuilder, Row, Sqlite, SqlitePool, Transaction};
use tenancy_query::{CompareOp, OrderKey, SortDir};
use tokio::sync::Mutex;
use tracing::debug;

use super::predicate::Pred;
use super::repository::{SqlBackend, TableRepository};
use super::{Engine, LiveColumn, RawQuery};
use crate::error::{DataError, Result, from_sqlx};
use crate::metadata::{ColumnSpec, ColumnType, EntityDescriptor, ForeignKey, ID, JoinTable};
use crate::values::{self, Record, SqlValue};

/// Repository running on sqlx.
pub type SqlxRepository = TableRepository<SqlxBackend>;

type SqliteQuery<'q, 'a> = Query<'q, Sqlite, SqliteArguments<'a>>;

/// Where sqlx statements run.
#[derive(Clone)]
pub(crate) enum SqlxExecutor {
    Pool(SqlitePool),
    Tx(Arc<Mutex<Option<Transaction<'static, Sqlite>>>>),
}

impl fmt::Debug for SqlxExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlxExecutor::Pool(_) => f.write_str("SqlxExecutor::Pool"),
            SqlxExecutor::Tx(_) => f.write_str("SqlxExecutor::Tx"),
        }
    }
}

fn finished() -> DataError {
    DataError::Database("transaction already finished".to_owned())
}

impl SqlxExecutor {
    pub(crate) async fn begin(pool: &SqlitePool) -> Result<Self> {
        let tx = pool.begin().await.map_err(|e| from_sqlx(e, None))?;
        Ok(SqlxExecutor::Tx(Arc::new(Mutex::new(Some(tx)))))
    }

    /// Commit or roll back. Later use of any clone fails.
    pub(crate) async fn finish(&self, commit: bool) -> Result<()> {
        let SqlxExecutor::Tx(slot) = self else {
            return Ok(());
        };
        let tx = slot.lock().await.take().ok_or_else(finished)?;
        let outcome = if commit {
            tx.commit().await
        } else {
            tx.rollback().await
        };
        outcome.map_err(|e| from_sqlx(e, None))
    }

    async fn fetch_all<'a>(
        &self,
        query: SqliteQuery<'a, 'a>,
        desc: Option<&EntityDescriptor>,
    ) -> Result<Vec<SqliteRow>> {
        let out = match self {
            SqlxExecutor::Pool(pool) => query.fetch_all(pool).await,
            SqlxExecutor::Tx(slot) => {
                let mut guard = slot.lock().await;
                let tx = guard.as_mut().ok_or_else(finished)?;
                query.fetch_all(&mut **tx).await
            }
        };
        out.map_err(|e| from_sqlx(e, desc))
    }

    async fn execute<'a>(&self, query: SqliteQuery<'a, 'a>, desc: Option<&EntityDescriptor>) -> Result<u64> {
        let out = match self {
            SqlxExecutor::Pool(pool) => query.execute(pool).await,
            SqlxExecutor::Tx(slot) => {
                let mut guard = slot.lock().await;
                let tx = guard.as_mut().ok_or_else(finished)?;
                query.execute(&mut **tx).await
            }
        };
        out.map(|r| r.rows_affected())
            .map_err(|e| from_sqlx(e, desc))
    }
}

/// sqlx statement backend.
#[derive(Clone, Debug)]
pub struct SqlxBackend {
    exec: SqlxExecutor,
}

impl SqlxBackend {
    pub(crate) fn new(exec: SqlxExecutor) -> Self {
        Self { exec }
    }

    pub(crate) fn executor(&self) -> &SqlxExecutor {
        &self.exec
    }

    /// Pool handle, or `None` when bound to a transaction.
    #[must_use]
    pub fn pool(&self) -> Option<&SqlitePool> {
        match &self.exec {
            SqlxExecutor::Pool(pool) => Some(pool),
            SqlxExecutor::Tx(_) => None,
        }
    }
}

fn quote(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn push_value(qb: &mut QueryBuilder<'_, Sqlite>, value: SqlValue) {
    match value {
        SqlValue::Null => qb.push_bind(None::<String>),
        SqlValue::Text(s) => qb.push_bind(s),
        SqlValue::Integer(i) => qb.push_bind(i),
        SqlValue::Real(f) => qb.push_bind(f),
        SqlValue::Bool(b) => qb.push_bind(b),
    };
}

fn push_list(qb: &mut QueryBuilder<'_, Sqlite>, values: impl IntoIterator<Item = SqlValue>) {
    qb.push("(");
    for (i, value) in values.into_iter().enumerate() {
        if i > 0 {
            qb.push(", ");
        }
        push_value(qb, value);
    }
    qb.push(")");
}

fn push_pred(qb: &mut QueryBuilder<'_, Sqlite>, pred: &Pred) {
    match pred {
        Pred::Const(true) => {
            qb.push("1 = 1");
        }
        Pred::Const(false) => {
            qb.push("1 = 0");
        }
        Pred::And(items) | Pred::Or(items) if items.is_empty() => {
            qb.push(if matches!(pred, Pred::And(_)) { "1 = 1" } else { "1 = 0" });
        }
        Pred::And(items) | Pred::Or(items) => {
            let joiner = if matches!(pred, Pred::And(_)) { " AND " } else { " OR " };
            qb.push("(");
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    qb.push(joiner);
                }
                push_pred(qb, item);
            }
            qb.push(")");
        }
        Pred::Not(inner) => {
            qb.push("NOT (");
            push_pred(qb, inner);
            qb.push(")");
        }
        Pred::Cmp { column, op, value } => {
            let op = match op {
                CompareOp::Eq => " = ",
                CompareOp::Ne => " <> ",
                CompareOp::Gt => " > ",
                CompareOp::Ge => " >= ",
                CompareOp::Lt => " < ",
                CompareOp::Le => " <= ",
                CompareOp::Like => " LIKE ",
            };
            qb.push(quote(column)).push(op);
            push_value(qb, value.clone());
        }
        Pred::In { column, values } => {
            qb.push(quote(column)).push(" IN ");
            push_list(qb, values.iter().cloned());
        }
        Pred::IsNull(column) => {
            qb.push(quote(column)).push(" IS NULL");
        }
        Pred::IsNotNull(column) => {
            qb.push(quote(column)).push(" IS NOT NULL");
        }
        Pred::Between { column, low, high } => {
            qb.push(quote(column)).push(" BETWEEN ");
            push_value(qb, low.clone());
            qb.push(" AND ");
            push_value(qb, high.clone());
        }
    }
}

fn read(row: &SqliteRow, name: &str, ty: &ColumnType) -> std::result::Result<SqlValue, sqlx::Error> {
    Ok(match ty {
        ColumnType::Integer => row
            .try_get::<Option<i64>, _>(name)?
            .map_or(SqlValue::Null, SqlValue::Integer),
        ColumnType::Float => row
            .try_get::<Option<f64>, _>(name)?
            .map_or(SqlValue::Null, SqlValue::Real),
        ColumnType::Boolean => row
            .try_get::<Option<bool>, _>(name)?
            .map_or(SqlValue::Null, SqlValue::Bool),
        _ => row
            .try_get::<Option<String>, _>(name)?
            .map_or(SqlValue::Null, SqlValue::Text),
    })
}

fn decode_row<'c>(
    row: &SqliteRow,
    columns: impl Iterator<Item = (&'c str, &'c ColumnType)>,
    desc: Option<&EntityDescriptor>,
) -> Result<Record> {
    let mut record = Record::new();
    for (name, ty) in columns {
        let raw = read(row, name, ty).map_err(|e| from_sqlx(e, desc))?;
        record.insert(name.to_owned(), values::decode(ty, raw)?);
    }
    Ok(record)
}

/// Declared SQL type used for DDL.
pub(crate) fn declared_type(column: &ColumnSpec) -> &'static str {
    match column.ty {
        ColumnType::Uuid
        | ColumnType::String
        | ColumnType::Enum(_)
        | ColumnType::DateTime
        | ColumnType::Json => "TEXT",
        ColumnType::Integer => "INTEGER",
        ColumnType::Float => "REAL",
        ColumnType::Boolean => "BOOLEAN",
    }
}

pub(crate) fn column_sql(column: &ColumnSpec) -> Result<String> {
    let mut sql = format!("{} {}", quote(&column.name), declared_type(column));
    if column.primary_key {
        sql.push_str(" NOT NULL PRIMARY KEY");
    } else if !column.nullable {
        sql.push_str(" NOT NULL");
    }
    if let Some(default) = &column.default {
        sql.push_str(" DEFAULT ");
        sql.push_str(&values::encode(column, default)?.to_sql_literal());
    }
    Ok(sql)
}

pub(crate) fn join_column_sql(name: &str) -> String {
    format!("{} TEXT NOT NULL", quote(name))
}

fn foreign_key_sql(fk: &ForeignKey) -> String {
    format!(
        "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE {} ON UPDATE {}",
        quote(&fk.name),
        quote(&fk.column),
        quote(&fk.target),
        quote(ID),
        fk.on_delete.as_sql(),
        fk.on_update.as_sql(),
    )
}

fn index_sql(name: &str, table: &str, columns: &[String], unique: bool) -> String {
    let columns: Vec<String> = columns.iter().map(|c| quote(c)).collect();
    format!(
        "CREATE {}INDEX IF NOT EXISTS {} ON {} ({})",
        if unique { "UNIQUE " } else { "" },
        quote(name),
        quote(table),
        columns.join(", ")
    )
}

impl SqlxBackend {
    async fn run_ddl(&self, sql: String, desc: Option<&EntityDescriptor>) -> Result<()> {
        debug!(engine = "sqlx", %sql, "execute");
        self.exec.execute(sqlx::query(&sql), desc).await?;
        Ok(())
    }

    async fn create_join_table(&self, join: &JoinTable) -> Result<()> {
        let mut parts = vec![
            join_column_sql(&join.source_column),
            join_column_sql(&join.target_column),
            format!(
                "PRIMARY KEY ({}, {})",
                quote(&join.source_column),
                quote(&join.target_column)
            ),
        ];
        parts.extend(join.foreign_keys().iter().map(foreign_key_sql));
        self.run_ddl(
            format!(
                "CREATE TABLE IF NOT EXISTS {} ({})",
                quote(&join.name),
                parts.join(", ")
            ),
            None,
        )
        .await?;
        self.run_ddl(
            index_sql(
                &format!("idx_{}_{}", join.name, join.target_column),
                &join.name,
                std::slice::from_ref(&join.target_column),
                false,
            ),
            None,
        )
        .await
    }
}

#[async_trait]
impl SqlBackend for SqlxBackend {
    fn engine(&self) -> Engine {
        Engine::Sqlx
    }

    async fn select(
        &self,
        desc: &EntityDescriptor,
        pred: &Pred,
        order: &[OrderKey],
        offset: u64,
        limit: Option<u64>,
    ) -> Result<Vec<Record>> {
        let columns: Vec<String> = desc.columns().iter().map(|c| quote(&c.name)).collect();
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT ");
        qb.push(columns.join(", "))
            .push(" FROM ")
            .push(quote(desc.table()))
            .push(" WHERE ");
        push_pred(&mut qb, pred);
        for (i, key) in order.iter().enumerate() {
            qb.push(if i == 0 { " ORDER BY " } else { ", " });
            qb.push(quote(&key.field)).push(match key.dir {
                SortDir::Asc => " ASC",
                SortDir::Desc => " DESC",
            });
        }
        if limit.is_some() || offset > 0 {
            // -1 is SQLite's "no limit".
            let limit = limit
                .map_or(Ok(-1), i64::try_from)
                .map_err(|e| DataError::Database(e.to_string()))?;
            qb.push(" LIMIT ").push_bind(limit);
        }
        if offset > 0 {
            let offset = i64::try_from(offset).map_err(|e| DataError::Database(e.to_string()))?;
            qb.push(" OFFSET ").push_bind(offset);
        }

        debug!(engine = "sqlx", sql = qb.sql(), "query");
        let rows = self.exec.fetch_all(qb.build(), Some(desc)).await?;
        rows.iter()
            .map(|row| {
                decode_row(
                    row,
                    desc.columns().iter().map(|c| (c.name.as_str(), &c.ty)),
                    Some(desc),
                )
            })
            .collect()
    }

    async fn count(&self, desc: &EntityDescriptor, pred: &Pred) -> Result<u64> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) AS n FROM ");
        qb.push(quote(desc.table())).push(" WHERE ");
        push_pred(&mut qb, pred);
        debug!(engine = "sqlx", sql = qb.sql(), "query");
        let rows = self.exec.fetch_all(qb.build(), Some(desc)).await?;
        let n = match rows.first() {
            Some(row) => row
                .try_get::<i64, _>("n")
                .map_err(|e| from_sqlx(e, Some(desc)))?,
            None => 0,
        };
        u64::try_from(n).map_err(|e| DataError::Database(e.to_string()))
    }

    async fn insert(&self, desc: &EntityDescriptor, row: Vec<(String, SqlValue)>) -> Result<()> {
        let columns: Vec<String> = row.iter().map(|(c, _)| quote(c)).collect();
        let mut qb = QueryBuilder::<Sqlite>::new("INSERT INTO ");
        qb.push(quote(desc.table()))
            .push(" (")
            .push(columns.join(", "))
            .push(") VALUES ");
        push_list(&mut qb, row.into_iter().map(|(_, v)| v));
        debug!(engine = "sqlx", sql = qb.sql(), "execute");
        self.exec.execute(qb.build(), Some(desc)).await?;
        Ok(())
    }

    async fn update(
        &self,
        desc: &EntityDescriptor,
        set: Vec<(String, SqlValue)>,
        pred: &Pred,
    ) -> Result<u64> {
        let mut qb = QueryBuilder::<Sqlite>::new("UPDATE ");
        qb.push(quote(desc.table())).push(" SET ");
        for (i, (column, value)) in set.into_iter().enumerate() {
            if i > 0 {
                qb.push(", ");
            }
            qb.push(quote(&column)).push(" = ");
            push_value(&mut qb, value);
        }
        qb.push(" WHERE ");
        push_pred(&mut qb, pred);
        debug!(engine = "sqlx", sql = qb.sql(), "execute");
        self.exec.execute(qb.build(), Some(desc)).await
    }

    async fn delete(&self, desc: &EntityDescriptor, pred: &Pred) -> Result<u64> {
        let mut qb = QueryBuilder::<Sqlite>::new("DELETE FROM ");
        qb.push(quote(desc.table())).push(" WHERE ");
        push_pred(&mut qb, pred);
        debug!(engine = "sqlx", sql = qb.sql(), "execute");
        self.exec.execute(qb.build(), Some(desc)).await
    }

    async fn select_links(
        &self,
        join_table: &str,
        source_column: &str,
        target_column: &str,
        source_ids: Vec<SqlValue>,
    ) -> Result<Vec<(String, String)>> {
        let (source, target) = (quote(source_column), quote(target_column));
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT ");
        qb.push(format!("{source}, {target} FROM {} WHERE {source} IN ", quote(join_table)));
        push_list(&mut qb, source_ids);
        qb.push(format!(" ORDER BY {source} ASC, {target} ASC"));
        debug!(engine = "sqlx", sql = qb.sql(), "query");
        let rows = self.exec.fetch_all(qb.build(), None).await?;
        rows.iter()
            .map(|row| {
                Ok((
                    row.try_get::<String, _>(source_column)?,
                    row.try_get::<String, _>(target_column)?,
                ))
            })
            .collect::<std::result::Result<_, sqlx::Error>>()
            .map_err(|e| from_sqlx(e, None))
    }

    async fn insert_links(
        &self,
        join_table: &str,
        source_column: &str,
        target_column: &str,
        source_id: String,
        target_ids: Vec<String>,
    ) -> Result<u64> {
        let (source, target) = (quote(source_column), quote(target_column));
        let mut qb = QueryBuilder::<Sqlite>::new("INSERT INTO ");
        qb.push(format!("{} ({source}, {target}) ", quote(join_table)));
        qb.push_values(target_ids, |mut row, target_id| {
            row.push_bind(source_id.clone()).push_bind(target_id);
        });
        qb.push(format!(" ON CONFLICT ({source}, {target}) DO NOTHING"));
        debug!(engine = "sqlx", sql = qb.sql(), "execute");
        self.exec.execute(qb.build(), None).await
    }

    async fn delete_links(
        &self,
        join_table: &str,
        source_column: &str,
        target_column: &str,
        source_id: String,
        target_ids: Vec<SqlValue>,
    ) -> Result<u64> {
        let (source, target) = (quote(source_column), quote(target_column));
        let mut qb = QueryBuilder::<Sqlite>::new("DELETE FROM ");
        qb.push(format!("{} WHERE {source} = ", quote(join_table)));
        qb.push_bind(source_id);
        qb.push(format!(" AND {target} IN "));
        push_list(&mut qb, target_ids);
        debug!(engine = "sqlx", sql = qb.sql(), "execute");
        self.exec.execute(qb.build(), None).await
    }

    async fn raw(&self, query: &RawQuery) -> Result<Vec<Record>> {
        let mut q = sqlx::query(&query.sql);
        for param in &query.params {
            q = match values::encode_raw(param) {
                SqlValue::Null => q.bind(None::<String>),
                SqlValue::Text(s) => q.bind(s),
                SqlValue::Integer(i) => q.bind(i),
                SqlValue::Real(f) => q.bind(f),
                SqlValue::Bool(b) => q.bind(b),
            };
        }
        debug!(engine = "sqlx", sql = %query.sql, "query");
        let rows = self.exec.fetch_all(q, None).await?;
        rows.iter()
            .map(|row| {
                decode_row(
                    row,
                    query.columns.iter().map(|(n, t)| (n.as_str(), t)),
                    None,
                )
            })
            .collect()
    }

    async fn create_table(&self, desc: &EntityDescriptor, joins: &[&JoinTable]) -> Result<()> {
        let mut parts = desc
            .columns()
            .iter()
            .map(column_sql)
            .collect::<Result<Vec<_>>>()?;
        parts.extend(desc.foreign_keys().map(|fk| foreign_key_sql(&fk)));
        self.run_ddl(
            format!(
                "CREATE TABLE IF NOT EXISTS {} ({})",
                quote(desc.table()),
                parts.join(", ")
            ),
            Some(desc),
        )
        .await?;

        for spec in desc.indexes() {
            self.run_ddl(
                index_sql(&spec.name, desc.table(), &spec.columns, spec.unique),
                Some(desc),
            )
            .await?;
        }

        for join in joins {
            self.create_join_table(join).await?;
        }
        Ok(())
    }

    async fn table_info(&self, table: &str) -> Result<Vec<LiveColumn>> {
        let sql = format!("PRAGMA table_info({})", quote(table));
        let rows = self.exec.fetch_all(sqlx::query(&sql), None).await?;
        rows.iter()
            .map(|row| {
                Ok(LiveColumn {
                    name: row.try_get("name")?,
                    declared_type: row.try_get("type")?,
                    not_null: row.try_get::<i64, _>("notnull")? != 0,
                    primary_key: row.try_get::<i64, _>("pk")? != 0,
                })
            })
            .collect::<std::result::Result<_, sqlx::Error>>()
            .map_err(|e| from_sqlx(e, None))
    }
}
