//! `SeaORM` backend: statements are built with `sea_query` and executed on a
//! `DatabaseConnection` or an open `DatabaseTransaction`.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use sea_orm::sea_query::{
    Alias, Asterisk, ColumnDef, ColumnType as SeaColumnType, Condition, Expr, ForeignKey,
    ForeignKeyAction, Func, Index, IndexCreateStatement, OnConflict, Order, Query, SimpleExpr,
    StringLen, Table,
};
use sea_orm::{
    ConnectionTrait, DatabaseConnection, DatabaseTransaction, DbBackend, DbErr, QueryResult,
    Statement, StatementBuilder, TransactionTrait,
};
use tenancy_query::{CompareOp, OrderKey, SortDir};
use tokio::sync::Mutex;
use tracing::debug;

use super::predicate::Pred;
use super::repository::{SqlBackend, TableRepository};
use super::{Engine, LiveColumn, RawQuery};
use crate::error::{DataError, Result, from_sea};
use crate::metadata::{ColumnSpec, ColumnType, EntityDescriptor, ID, JoinTable, ReferentialAction};
use crate::values::{self, Record, SqlValue};

/// Repository running on `SeaORM`.
pub type SeaRepository = TableRepository<SeaBackend>;

// SQLite only accepts OFFSET after a LIMIT.
const NO_LIMIT: u64 = 9_223_372_036_854_775_807;

/// Where `SeaORM` statements run.
#[derive(Clone)]
pub(crate) enum SeaExecutor {
    Conn(DatabaseConnection),
    Tx(Arc<Mutex<Option<DatabaseTransaction>>>),
}

impl fmt::Debug for SeaExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SeaExecutor::Conn(_) => f.write_str("SeaExecutor::Conn"),
            SeaExecutor::Tx(_) => f.write_str("SeaExecutor::Tx"),
        }
    }
}

fn finished() -> DataError {
    DataError::Database("transaction already finished".to_owned())
}

impl SeaExecutor {
    pub(crate) async fn begin(conn: &DatabaseConnection) -> Result<Self> {
        let tx = conn.begin().await.map_err(|e| from_sea(e, None))?;
        Ok(SeaExecutor::Tx(Arc::new(Mutex::new(Some(tx)))))
    }

    /// Commit or roll back. Later use of any clone fails.
    pub(crate) async fn finish(&self, commit: bool) -> Result<()> {
        let SeaExecutor::Tx(slot) = self else {
            return Ok(());
        };
        let tx = slot.lock().await.take().ok_or_else(finished)?;
        let outcome = if commit {
            tx.commit().await
        } else {
            tx.rollback().await
        };
        outcome.map_err(|e| from_sea(e, None))
    }

    async fn query_all(
        &self,
        stmt: Statement,
        desc: Option<&EntityDescriptor>,
    ) -> Result<Vec<QueryResult>> {
        debug!(engine = "sea_orm", sql = %stmt.sql, "query");
        let out = match self {
            SeaExecutor::Conn(conn) => conn.query_all(stmt).await,
            SeaExecutor::Tx(slot) => {
                let guard = slot.lock().await;
                let tx = guard.as_ref().ok_or_else(finished)?;
                tx.query_all(stmt).await
            }
        };
        out.map_err(|e| from_sea(e, desc))
    }

    async fn execute(&self, stmt: Statement, desc: Option<&EntityDescriptor>) -> Result<u64> {
        debug!(engine = "sea_orm", sql = %stmt.sql, "execute");
        let out = match self {
            SeaExecutor::Conn(conn) => conn.execute(stmt).await,
            SeaExecutor::Tx(slot) => {
                let guard = slot.lock().await;
                let tx = guard.as_ref().ok_or_else(finished)?;
                tx.execute(stmt).await
            }
        };
        out.map(|r| r.rows_affected()).map_err(|e| from_sea(e, desc))
    }
}

/// `SeaORM` statement backend.
#[derive(Clone, Debug)]
pub struct SeaBackend {
    exec: SeaExecutor,
}

impl SeaBackend {
    pub(crate) fn new(exec: SeaExecutor) -> Self {
        Self { exec }
    }

    pub(crate) fn executor(&self) -> &SeaExecutor {
        &self.exec
    }

    /// Pooled connection, or `None` when bound to a transaction.
    #[must_use]
    pub fn connection(&self) -> Option<&DatabaseConnection> {
        match &self.exec {
            SeaExecutor::Conn(conn) => Some(conn),
            SeaExecutor::Tx(_) => None,
        }
    }
}

fn build<S: StatementBuilder>(stmt: &S) -> Statement {
    DbBackend::Sqlite.build(stmt)
}

fn ident(name: &str) -> Alias {
    Alias::new(name)
}

fn condition(pred: &Pred) -> Condition {
    match pred {
        Pred::Const(b) => Condition::all().add(Expr::value(*b)),
        Pred::And(items) => items
            .iter()
            .fold(Condition::all(), |acc, p| acc.add(condition(p))),
        Pred::Or(items) => items
            .iter()
            .fold(Condition::any(), |acc, p| acc.add(condition(p))),
        Pred::Not(inner) => condition(inner).not(),
        Pred::Cmp { column, op, value } => {
            let col = Expr::col(ident(column));
            let v = value.clone().into_sea();
            let expr = match op {
                CompareOp::Eq => col.eq(v),
                CompareOp::Ne => col.ne(v),
                CompareOp::Gt => col.gt(v),
                CompareOp::Ge => col.gte(v),
                CompareOp::Lt => col.lt(v),
                CompareOp::Le => col.lte(v),
                CompareOp::Like => match value {
                    SqlValue::Text(pattern) => col.like(pattern.as_str()),
                    _ => col.eq(v),
                },
            };
            Condition::all().add(expr)
        }
        Pred::In { column, values } => Condition::all().add(
            Expr::col(ident(column)).is_in(values.iter().map(|v| v.clone().into_sea())),
        ),
        Pred::IsNull(column) => Condition::all().add(Expr::col(ident(column)).is_null()),
        Pred::IsNotNull(column) => Condition::all().add(Expr::col(ident(column)).is_not_null()),
        Pred::Between { column, low, high } => Condition::all().add(
            Expr::col(ident(column)).between(low.clone().into_sea(), high.clone().into_sea()),
        ),
    }
}

fn read(row: &QueryResult, name: &str, ty: &ColumnType) -> std::result::Result<SqlValue, DbErr> {
    Ok(match ty {
        ColumnType::Integer => row
            .try_get::<Option<i64>>("", name)?
            .map_or(SqlValue::Null, SqlValue::Integer),
        ColumnType::Float => row
            .try_get::<Option<f64>>("", name)?
            .map_or(SqlValue::Null, SqlValue::Real),
        ColumnType::Boolean => row
            .try_get::<Option<bool>>("", name)?
            .map_or(SqlValue::Null, SqlValue::Bool),
        _ => row
            .try_get::<Option<String>>("", name)?
            .map_or(SqlValue::Null, SqlValue::Text),
    })
}

fn decode_row<'c>(
    row: &QueryResult,
    columns: impl Iterator<Item = (&'c str, &'c ColumnType)>,
    desc: Option<&EntityDescriptor>,
) -> Result<Record> {
    let mut record = Record::new();
    for (name, ty) in columns {
        let raw = read(row, name, ty).map_err(|e| from_sea(e, desc))?;
        record.insert(name.to_owned(), values::decode(ty, raw)?);
    }
    Ok(record)
}

/// `sea_query` column type used for DDL.
pub(crate) fn sea_column_type(column: &ColumnSpec) -> SeaColumnType {
    match &column.ty {
        ColumnType::Uuid => SeaColumnType::String(StringLen::N(36)),
        ColumnType::String | ColumnType::Enum(_) => SeaColumnType::String(StringLen::None),
        ColumnType::Integer => SeaColumnType::BigInteger,
        ColumnType::Float => SeaColumnType::Double,
        ColumnType::Boolean => SeaColumnType::Boolean,
        ColumnType::DateTime | ColumnType::Json => SeaColumnType::Text,
    }
}

pub(crate) fn column_def(column: &ColumnSpec) -> Result<ColumnDef> {
    let mut def = ColumnDef::new_with_type(ident(&column.name), sea_column_type(column));
    if column.primary_key {
        def.not_null().primary_key();
    } else if !column.nullable {
        def.not_null();
    }
    if let Some(default) = &column.default {
        let literal = values::encode(column, default)?.to_sql_literal();
        def.default(Expr::cust(literal));
    }
    Ok(def)
}

pub(crate) fn join_column_def(name: &str) -> ColumnDef {
    let mut def = ColumnDef::new_with_type(ident(name), SeaColumnType::String(StringLen::N(36)));
    def.not_null();
    def
}

fn fk_action(action: ReferentialAction) -> ForeignKeyAction {
    match action {
        ReferentialAction::Cascade => ForeignKeyAction::Cascade,
        ReferentialAction::SetNull => ForeignKeyAction::SetNull,
        ReferentialAction::NoAction => ForeignKeyAction::NoAction,
    }
}

impl SeaBackend {
    async fn create_join_table(&self, join: &JoinTable) -> Result<()> {
        let mut stmt = Table::create();
        stmt.table(ident(&join.name)).if_not_exists();
        for column in [&join.source_column, &join.target_column] {
            stmt.col(&mut join_column_def(column));
        }
        let mut pk: IndexCreateStatement = Index::create();
        pk.col(ident(&join.source_column))
            .col(ident(&join.target_column));
        stmt.primary_key(&mut pk);
        for fk in join.foreign_keys() {
            stmt.foreign_key(
                ForeignKey::create()
                    .name(&fk.name)
                    .from(ident(&join.name), ident(&fk.column))
                    .to(ident(&fk.target), ident(ID))
                    .on_delete(fk_action(fk.on_delete))
                    .on_update(fk_action(fk.on_update)),
            );
        }
        self.exec.execute(build(&stmt), None).await?;

        let mut index = Index::create();
        index
            .if_not_exists()
            .name(format!("idx_{}_{}", join.name, join.target_column))
            .table(ident(&join.name))
            .col(ident(&join.target_column));
        self.exec.execute(build(&index), None).await?;
        Ok(())
    }
}

#[async_trait]
impl SqlBackend for SeaBackend {
    fn engine(&self) -> Engine {
        Engine::SeaOrm
    }

    async fn select(
        &self,
        desc: &EntityDescriptor,
        pred: &Pred,
        order: &[OrderKey],
        offset: u64,
        limit: Option<u64>,
    ) -> Result<Vec<Record>> {
        let mut q = Query::select();
        q.columns(desc.columns().iter().map(|c| ident(&c.name)))
            .from(ident(desc.table()))
            .cond_where(condition(pred));
        for key in order {
            let dir = match key.dir {
                SortDir::Asc => Order::Asc,
                SortDir::Desc => Order::Desc,
            };
            q.order_by(ident(&key.field), dir);
        }
        if let Some(n) = limit {
            q.limit(n);
        } else if offset > 0 {
            q.limit(NO_LIMIT);
        }
        if offset > 0 {
            q.offset(offset);
        }

        let rows = self.exec.query_all(build(&q), Some(desc)).await?;
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
        let mut q = Query::select();
        q.expr_as(Func::count(Expr::col(Asterisk)), ident("n"))
            .from(ident(desc.table()))
            .cond_where(condition(pred));
        let rows = self.exec.query_all(build(&q), Some(desc)).await?;
        let n = match rows.first() {
            Some(row) => row
                .try_get::<i64>("", "n")
                .map_err(|e| from_sea(e, Some(desc)))?,
            None => 0,
        };
        u64::try_from(n).map_err(|e| DataError::Database(e.to_string()))
    }

    async fn insert(&self, desc: &EntityDescriptor, row: Vec<(String, SqlValue)>) -> Result<()> {
        let (columns, vals): (Vec<_>, Vec<_>) = row
            .into_iter()
            .map(|(c, v)| (ident(&c), SimpleExpr::from(v.into_sea())))
            .unzip();
        let mut q = Query::insert();
        q.into_table(ident(desc.table()))
            .columns(columns)
            .values(vals)
            .map_err(|e| DataError::Database(e.to_string()))?;
        self.exec.execute(build(&q), Some(desc)).await?;
        Ok(())
    }

    async fn update(
        &self,
        desc: &EntityDescriptor,
        set: Vec<(String, SqlValue)>,
        pred: &Pred,
    ) -> Result<u64> {
        let mut q = Query::update();
        q.table(ident(desc.table()))
            .values(
                set.into_iter()
                    .map(|(c, v)| (ident(&c), SimpleExpr::from(v.into_sea()))),
            )
            .cond_where(condition(pred));
        self.exec.execute(build(&q), Some(desc)).await
    }

    async fn delete(&self, desc: &EntityDescriptor, pred: &Pred) -> Result<u64> {
        let mut q = Query::delete();
        q.from_table(ident(desc.table()))
            .cond_where(condition(pred));
        self.exec.execute(build(&q), Some(desc)).await
    }

    async fn select_links(
        &self,
        join_table: &str,
        source_column: &str,
        target_column: &str,
        source_ids: Vec<SqlValue>,
    ) -> Result<Vec<(String, String)>> {
        let mut q = Query::select();
        q.columns([ident(source_column), ident(target_column)])
            .from(ident(join_table))
            .and_where(
                Expr::col(ident(source_column))
                    .is_in(source_ids.into_iter().map(SqlValue::into_sea)),
            )
            .order_by(ident(source_column), Order::Asc)
            .order_by(ident(target_column), Order::Asc);
        let rows = self.exec.query_all(build(&q), None).await?;
        rows.iter()
            .map(|row| {
                let source = row.try_get::<String>("", source_column);
                let target = row.try_get::<String>("", target_column);
                source.and_then(|s| target.map(|t| (s, t)))
            })
            .collect::<std::result::Result<_, DbErr>>()
            .map_err(|e| from_sea(e, None))
    }

    async fn insert_links(
        &self,
        join_table: &str,
        source_column: &str,
        target_column: &str,
        source_id: String,
        target_ids: Vec<String>,
    ) -> Result<u64> {
        let mut q = Query::insert();
        q.into_table(ident(join_table))
            .columns([ident(source_column), ident(target_column)])
            .on_conflict(
                OnConflict::columns([ident(source_column), ident(target_column)])
                    .do_nothing()
                    .to_owned(),
            );
        for target in target_ids {
            q.values([
                SimpleExpr::from(SqlValue::Text(source_id.clone()).into_sea()),
                SimpleExpr::from(SqlValue::Text(target).into_sea()),
            ])
            .map_err(|e| DataError::Database(e.to_string()))?;
        }
        self.exec.execute(build(&q), None).await
    }

    async fn delete_links(
        &self,
        join_table: &str,
        source_column: &str,
        target_column: &str,
        source_id: String,
        target_ids: Vec<SqlValue>,
    ) -> Result<u64> {
        let mut q = Query::delete();
        q.from_table(ident(join_table))
            .and_where(Expr::col(ident(source_column)).eq(SqlValue::Text(source_id).into_sea()))
            .and_where(
                Expr::col(ident(target_column))
                    .is_in(target_ids.into_iter().map(SqlValue::into_sea)),
            );
        self.exec.execute(build(&q), None).await
    }

    async fn raw(&self, query: &RawQuery) -> Result<Vec<Record>> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Sqlite,
            query.sql.as_str(),
            query
                .params
                .iter()
                .map(|p| values::encode_raw(p).into_sea()),
        );
        let rows = self.exec.query_all(stmt, None).await?;
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
        let mut stmt = Table::create();
        stmt.table(ident(desc.table())).if_not_exists();
        for column in desc.columns() {
            stmt.col(&mut column_def(column)?);
        }
        for fk in desc.foreign_keys() {
            stmt.foreign_key(
                ForeignKey::create()
                    .name(&fk.name)
                    .from(ident(desc.table()), ident(&fk.column))
                    .to(ident(&fk.target), ident(ID))
                    .on_delete(fk_action(fk.on_delete))
                    .on_update(fk_action(fk.on_update)),
            );
        }
        self.exec.execute(build(&stmt), Some(desc)).await?;

        for spec in desc.indexes() {
            let mut index = Index::create();
            index
                .if_not_exists()
                .name(&spec.name)
                .table(ident(desc.table()));
            for column in &spec.columns {
                index.col(ident(column));
            }
            if spec.unique {
                index.unique();
            }
            self.exec.execute(build(&index), Some(desc)).await?;
        }

        for join in joins {
            self.create_join_table(join).await?;
        }
        Ok(())
    }

    async fn table_info(&self, table: &str) -> Result<Vec<LiveColumn>> {
        let sql = format!("PRAGMA table_info(\"{}\")", table.replace('"', "\"\""));
        let stmt = Statement::from_string(DbBackend::Sqlite, sql);
        let rows = self.exec.query_all(stmt, None).await?;
        rows.iter()
            .map(|row| {
                Ok(LiveColumn {
                    name: row.try_get("", "name")?,
                    declared_type: row.try_get("", "type")?,
                    not_null: row.try_get::<i64>("", "notnull")? != 0,
                    primary_key: row.try_get::<i64>("", "pk")? != 0,
                })
            })
            .collect::<std::result::Result<_, DbErr>>()
            .map_err(|e| from_sea(e, None))
    }
}
