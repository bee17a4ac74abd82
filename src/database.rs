/// Database Facade
///
/// `Database` binds one pooled connection to the pool's worker threads and is
/// the caller-facing entry point: raw statements, transactions, schema
/// management and typed `Table` handles. Every operation has a blocking form
/// and a `_async` form that runs the same body on a worker; either way the
/// body starts by taking the connection's guard and releases it on return.
use crate::core::db::connection::PooledConnection;
use crate::core::db::schema::{self, ColumnInfo, CreateTableResult};
use crate::core::db::session::Session;
use crate::core::{OrmError, Result, Scalar, Value};
use crate::mapping::{mapping, Entity, Mapping, TableMapping};
use crate::materialize::{Row, RowPlan};
use crate::query::{col, col_of, CompiledCommand, Expr, JoinKind, Query};
use crate::worker::{Pending, WorkerPool};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// A pooled database target plus the workers for its non-blocking operations.
#[derive(Clone)]
pub struct Database {
    conn: Arc<PooledConnection>,
    workers: Arc<WorkerPool>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("path", &self.conn.path())
            .finish_non_exhaustive()
    }
}

impl Database {
    pub(crate) fn new(conn: Arc<PooledConnection>, workers: Arc<WorkerPool>) -> Self {
        Database { conn, workers }
    }

    pub fn connection(&self) -> &Arc<PooledConnection> {
        &self.conn
    }

    /// Runs `body` while holding the connection's guard.
    ///
    /// Other database calls from the same thread inside `body` fail with
    /// `OrmError::Engine`; use the session instead.
    pub fn with_session<T, F>(&self, body: F) -> Result<T>
    where
        F: FnOnce(&Session<'_>) -> Result<T>,
    {
        let session = Session::new(self.conn.lock()?);
        body(&session)
    }

    /// Runs `body` inside `BEGIN` ... `COMMIT`, rolling back if it fails.
    ///
    /// The guard is held for the whole transaction, so `body` must go through
    /// the session it is given. Calling `Table` methods on this database from
    /// inside `body` fails with `OrmError::Engine` and rolls the transaction back.
    pub fn run_in_transaction<T, F>(&self, body: F) -> Result<T>
    where
        F: FnOnce(&Session<'_>) -> Result<T>,
    {
        self.with_session(|session| {
            session.begin()?;
            match body(session) {
                Ok(value) => {
                    session.commit()?;
                    Ok(value)
                }
                Err(e) => {
                    warn!("Rolling back transaction on {}: {}", self.conn.path(), e);
                    if let Err(rollback) = session.rollback() {
                        error!("Rollback on {} failed: {}", self.conn.path(), rollback);
                    }
                    Err(e)
                }
            }
        })
    }

    /// Schedules `body` on a worker with a handle to this database.
    pub fn spawn<T, F>(&self, body: F) -> Pending<T>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> Result<T> + Send + 'static,
    {
        let db = self.clone();
        self.workers.submit(move || body(&db))
    }

    pub fn run_in_transaction_async<T, F>(&self, body: F) -> Pending<T>
    where
        T: Send + 'static,
        F: FnOnce(&Session<'_>) -> Result<T> + Send + 'static,
    {
        self.spawn(move |db| db.run_in_transaction(body))
    }

    /// Executes a statement and returns the changed-row count.
    pub fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        self.with_session(|s| s.execute(sql, params))
    }

    pub fn execute_async(&self, sql: impl Into<String>, params: Vec<Value>) -> Pending<u64> {
        let sql = sql.into();
        self.spawn(move |db| db.execute(&sql, &params))
    }

    pub fn query_rows(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        self.with_session(|s| s.query_rows(sql, params))
    }

    pub fn query_rows_async(&self, sql: impl Into<String>, params: Vec<Value>) -> Pending<Vec<Row>> {
        let sql = sql.into();
        self.spawn(move |db| db.query_rows(&sql, &params))
    }

    /// First column of the first row, or `None` for an empty result.
    pub fn execute_scalar<T: Scalar>(&self, sql: &str, params: &[Value]) -> Result<Option<T>> {
        self.with_session(|s| s.query_scalar(sql, params))
    }

    pub fn execute_scalar_async<T: Scalar>(
        &self,
        sql: impl Into<String>,
        params: Vec<Value>,
    ) -> Pending<Option<T>> {
        let sql = sql.into();
        self.spawn(move |db| db.execute_scalar(&sql, &params))
    }

    /// Creates `E`'s table, or adds the columns an existing one lacks.
    pub fn create_table<E: Entity>(&self) -> Result<CreateTableResult> {
        let table = mapping::<E>()?.table.clone();
        self.with_session(|s| schema::create_table(s, &table))
    }

    pub fn create_table_async<E: Entity>(&self) -> Pending<CreateTableResult> {
        self.spawn(|db| db.create_table::<E>())
    }

    pub fn drop_table<E: Entity>(&self) -> Result<()> {
        let table = mapping::<E>()?.table.clone();
        self.with_session(|s| schema::drop_table(s, &table))
    }

    pub fn drop_table_async<E: Entity>(&self) -> Pending<()> {
        self.spawn(|db| db.drop_table::<E>())
    }

    /// Creates an index named `<table>_<columns>` over `columns`.
    pub fn create_index(&self, table_name: &str, columns: &[&str], unique: bool) -> Result<()> {
        self.with_session(|s| schema::create_index(s, table_name, None, columns, unique))
    }

    pub fn create_named_index(
        &self,
        index_name: &str,
        table_name: &str,
        columns: &[&str],
        unique: bool,
    ) -> Result<()> {
        self.with_session(|s| schema::create_index(s, table_name, Some(index_name), columns, unique))
    }

    /// Columns of `table_name` as reported by the engine.
    pub fn table_info(&self, table_name: &str) -> Result<Vec<ColumnInfo>> {
        self.with_session(|s| schema::table_info(s, table_name))
    }

    /// A typed handle for `E`'s table.
    pub fn table<E: Entity>(&self) -> Result<Table<E>> {
        Ok(Table {
            db: self.clone(),
            mapping: mapping::<E>()?,
        })
    }

    /// Closes the underlying pooled connection.
    pub fn close(&self) -> Result<()> {
        self.conn.close()
    }
}

/// Stateless view binding an entity's mapping to a database.
pub struct Table<E> {
    db: Database,
    mapping: Arc<Mapping<E>>,
}

impl<E> Clone for Table<E> {
    fn clone(&self) -> Self {
        Table {
            db: self.db.clone(),
            mapping: Arc::clone(&self.mapping),
        }
    }
}

impl<E> std::fmt::Debug for Table<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("table", &self.mapping.table.table_name)
            .field("db", &self.db)
            .finish()
    }
}

impl<E: Entity> Table<E> {
    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn mapping(&self) -> &TableMapping {
        &self.mapping.table
    }

    /// A query over every row of the table.
    pub fn query(&self) -> TableQuery<E> {
        TableQuery::new(self.db.clone(), Query::table(Arc::clone(&self.mapping.table)))
    }

    pub fn filter(&self, predicate: Expr) -> TableQuery<E> {
        self.query().filter(predicate)
    }

    fn spawn<T, F>(&self, body: F) -> Pending<T>
    where
        T: Send + 'static,
        F: FnOnce(&Table<E>) -> Result<T> + Send + 'static,
    {
        let table = self.clone();
        self.db.workers.submit(move || body(&table))
    }

    pub fn to_list(&self) -> Result<Vec<E>> {
        self.query().to_list()
    }

    pub fn count(&self) -> Result<u64> {
        self.query().count()
    }

    /// The row with the given single-column primary key.
    pub fn get(&self, key: impl Into<Value>) -> Result<E> {
        let key = [key.into()];
        self.db.with_session(|s| s.get::<E>(&key))
    }

    pub fn find(&self, key: impl Into<Value>) -> Result<Option<E>> {
        self.find_by_key(&[key.into()])
    }

    /// The row with the given (possibly composite) primary key.
    pub fn find_by_key(&self, key: &[Value]) -> Result<Option<E>> {
        self.db.with_session(|s| s.find::<E>(key))
    }

    /// Inserts `entity` and assigns its generated key.
    pub fn insert(&self, entity: &mut E) -> Result<u64> {
        self.db.with_session(|s| s.insert(entity))
    }

    pub fn insert_or_replace(&self, entity: &mut E) -> Result<u64> {
        self.db.with_session(|s| s.insert_or_replace(entity))
    }

    /// Inserts every entity in one transaction.
    pub fn insert_all(&self, entities: &mut [E]) -> Result<u64> {
        self.db.run_in_transaction(|s| {
            let mut total = 0;
            for entity in entities.iter_mut() {
                total += s.insert(entity)?;
            }
            debug!("Inserted {} rows into {}", total, self.mapping.table.table_name);
            Ok(total)
        })
    }

    pub fn update(&self, entity: &E) -> Result<u64> {
        self.db.with_session(|s| s.update(entity))
    }

    pub fn delete(&self, entity: &E) -> Result<u64> {
        self.db.with_session(|s| s.delete(entity))
    }

    pub fn delete_by_key(&self, key: impl Into<Value>) -> Result<u64> {
        let key = [key.into()];
        self.db.with_session(|s| s.delete_by_key::<E>(&key))
    }

    pub fn delete_all(&self) -> Result<u64> {
        self.db.with_session(|s| s.delete_all::<E>())
    }

    pub fn create_table(&self) -> Result<CreateTableResult> {
        self.db.create_table::<E>()
    }

    pub fn drop_table(&self) -> Result<()> {
        self.db.drop_table::<E>()
    }

    pub fn to_list_async(&self) -> Pending<Vec<E>> {
        self.spawn(|t| t.to_list())
    }

    pub fn count_async(&self) -> Pending<u64> {
        self.spawn(|t| t.count())
    }

    pub fn get_async(&self, key: impl Into<Value>) -> Pending<E> {
        let key = key.into();
        self.spawn(move |t| t.get(key))
    }

    pub fn find_async(&self, key: impl Into<Value>) -> Pending<Option<E>> {
        let key = key.into();
        self.spawn(move |t| t.find(key))
    }

    /// Inserts `entity` on a worker and hands it back with its generated key.
    pub fn insert_async(&self, entity: E) -> Pending<E> {
        self.spawn(move |t| {
            let mut entity = entity;
            t.insert(&mut entity)?;
            Ok(entity)
        })
    }

    pub fn insert_or_replace_async(&self, entity: E) -> Pending<E> {
        self.spawn(move |t| {
            let mut entity = entity;
            t.insert_or_replace(&mut entity)?;
            Ok(entity)
        })
    }

    pub fn insert_all_async(&self, entities: Vec<E>) -> Pending<Vec<E>> {
        self.spawn(move |t| {
            let mut entities = entities;
            t.insert_all(&mut entities)?;
            Ok(entities)
        })
    }

    pub fn update_async(&self, entity: E) -> Pending<u64> {
        self.spawn(move |t| t.update(&entity))
    }

    pub fn delete_async(&self, entity: E) -> Pending<u64> {
        self.spawn(move |t| t.delete(&entity))
    }

    pub fn delete_by_key_async(&self, key: impl Into<Value>) -> Pending<u64> {
        let key = key.into();
        self.spawn(move |t| t.delete_by_key(key))
    }

    pub fn delete_all_async(&self) -> Pending<u64> {
        self.spawn(|t| t.delete_all())
    }

    pub fn create_table_async(&self) -> Pending<CreateTableResult> {
        self.spawn(|t| t.create_table())
    }

    pub fn drop_table_async(&self) -> Pending<()> {
        self.spawn(|t| t.drop_table())
    }
}

/// A query yielding `E` entities.
pub struct TableQuery<E> {
    db: Database,
    query: Query,
    entity: PhantomData<fn() -> E>,
}

impl<E> Clone for TableQuery<E> {
    fn clone(&self) -> Self {
        TableQuery {
            db: self.db.clone(),
            query: self.query.clone(),
            entity: PhantomData,
        }
    }
}

impl<E> std::fmt::Debug for TableQuery<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableQuery")
            .field("query", &self.query)
            .finish_non_exhaustive()
    }
}

fn key_condition(label: &str, keys: &[(&str, &str)]) -> Option<Expr> {
    keys.iter()
        .map(|(outer, inner)| col(outer).eq(col_of(label, inner)))
        .reduce(|acc, next| acc.and(next))
}

impl<E: Entity> TableQuery<E> {
    fn new(db: Database, query: Query) -> Self {
        TableQuery {
            db,
            query,
            entity: PhantomData,
        }
    }

    fn with(&self, query: Query) -> Self {
        TableQuery::new(self.db.clone(), query)
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn compile(&self) -> Result<CompiledCommand> {
        self.query.compile()
    }

    pub fn filter(&self, predicate: Expr) -> Self {
        self.with(self.query.filter(predicate))
    }

    pub fn order_by(&self, key: Expr) -> Self {
        self.with(self.query.order_by(key))
    }

    pub fn order_by_desc(&self, key: Expr) -> Self {
        self.with(self.query.order_by_desc(key))
    }

    pub fn then_by(&self, key: Expr) -> Self {
        self.with(self.query.then_by(key))
    }

    pub fn then_by_desc(&self, key: Expr) -> Self {
        self.with(self.query.then_by_desc(key))
    }

    pub fn skip(&self, count: u64) -> Self {
        self.with(self.query.skip(count))
    }

    pub fn take(&self, count: u64) -> Self {
        self.with(self.query.take(count))
    }

    pub fn distinct(&self) -> Self {
        self.with(self.query.distinct())
    }

    /// Inner join with `R`'s table under `label` on `(member, R member)` pairs.
    pub fn join_on<R: Entity>(&self, label: &str, keys: &[(&str, &str)]) -> Result<Self> {
        let related = mapping::<R>()?;
        Ok(self.with(self.query.join_on(label, Arc::clone(&related.table), keys)))
    }

    /// Inner join through the association declared on `member`.
    pub fn join_association(&self, label: &str, member: &str) -> Result<Self> {
        Ok(self.with(self.query.join_association(label, member)?))
    }

    /// Projection to labelled expressions, read back as `Row`s.
    pub fn select(&self, columns: Vec<(&str, Expr)>) -> RowQuery {
        RowQuery {
            db: self.db.clone(),
            query: self.query.select(columns),
        }
    }

    /// Projection into another entity shape; each pair names a member of `P`.
    pub fn project<P: Entity>(&self, columns: Vec<(&str, Expr)>) -> Result<TableQuery<P>> {
        let shape = mapping::<P>()?;
        let mut labelled = Vec::with_capacity(columns.len());
        for (member, e) in columns {
            labelled.push((shape.table.require_column(member)?.name.clone(), e));
        }
        Ok(TableQuery::new(self.db.clone(), self.query.project(labelled)))
    }

    pub fn group_by(&self, keys: Vec<Expr>) -> GroupedQuery {
        GroupedQuery {
            db: self.db.clone(),
            query: self.query.group_by(keys),
        }
    }

    /// Pairs every `E` with the `R` rows matching it on the key pairs.
    ///
    /// Outer rows without matches get an empty collection. Outer order follows
    /// the query's ordering.
    pub fn group_join<R: Entity>(&self, label: &str, keys: &[(&str, &str)]) -> Result<Vec<(E, Vec<R>)>> {
        let outer = mapping::<E>()?;
        let inner = mapping::<R>()?;
        let on = key_condition(label, keys)
            .ok_or_else(|| OrmError::Unsupported("group join without key pairs".to_string()))?;

        let mut columns = vec![
            ("outer rowid".to_string(), Expr::RowId { source: None }),
            (
                "inner rowid".to_string(),
                Expr::RowId {
                    source: Some(label.to_string()),
                },
            ),
        ];
        for c in &outer.table.columns {
            columns.push((c.name.clone(), col(&c.member)));
        }
        for c in &inner.table.columns {
            columns.push((format!("{}.{}", label, c.name), col_of(label, &c.member)));
        }
        let command = self
            .query
            .join(JoinKind::Left, label, Arc::clone(&inner.table), Some(on))
            .project(columns)
            .compile()?;
        let (_, rows) = self
            .db
            .with_session(|s| s.query_raw(&command.sql, &command.params))?;

        let outer_plan = RowPlan::positional(&outer.table);
        let inner_plan = RowPlan::positional(&inner.table);
        let mut groups: Vec<(E, Vec<R>)> = Vec::new();
        let mut positions: HashMap<i64, usize> = HashMap::new();
        for mut values in rows {
            let inner_values = values.split_off(2 + outer_plan.width());
            let outer_values = values.split_off(2);
            let inner_rowid = values.pop();
            let outer_rowid = match values.pop() {
                Some(Value::Integer(id)) => id,
                _ => {
                    return Err(OrmError::Mapping(
                        "group join row without an outer row identifier".to_string(),
                    ))
                }
            };
            let slot = match positions.get(&outer_rowid) {
                Some(&slot) => slot,
                None => {
                    groups.push((outer_plan.materialize(&outer, outer_values)?, Vec::new()));
                    positions.insert(outer_rowid, groups.len() - 1);
                    groups.len() - 1
                }
            };
            if let Some(Value::Integer(_)) = inner_rowid {
                groups[slot]
                    .1
                    .push(inner_plan.materialize(&inner, inner_values)?);
            }
        }
        Ok(groups)
    }

    pub fn to_list(&self) -> Result<Vec<E>> {
        self.db.with_session(|s| s.fetch(&self.query))
    }

    pub fn first_or_none(&self) -> Result<Option<E>> {
        let mut rows = self.db.with_session(|s| s.fetch::<E>(&self.query.take(1)))?;
        Ok(rows.pop())
    }

    /// The first row; an empty result is `OrmError::NotFound`.
    pub fn first(&self) -> Result<E> {
        self.first_or_none()?.ok_or_else(|| {
            OrmError::NotFound(format!("no {} matches the query", std::any::type_name::<E>()))
        })
    }

    /// The row at zero-based `index` of the result.
    pub fn element_at(&self, index: u64) -> Result<E> {
        self.skip(index).first_or_none()?.ok_or_else(|| {
            OrmError::NotFound(format!(
                "no {} at position {}",
                std::any::type_name::<E>(),
                index
            ))
        })
    }

    pub fn count(&self) -> Result<u64> {
        self.db.with_session(|s| s.count(&self.query))
    }

    pub fn any(&self) -> Result<bool> {
        self.db
            .with_session(|s| s.count(&self.query.take(1)))
            .map(|n| n > 0)
    }

    /// Sum of `arg` over the rows; zero when there are none.
    pub fn sum<T: Scalar>(&self, arg: Expr) -> Result<T> {
        self.db
            .with_session(|s| s.fetch_scalar::<T>(&self.query.sum(arg)))?
            .ok_or_else(|| OrmError::NotFound("sum produced no row".to_string()))
    }

    fn optional_aggregate<T: Scalar>(&self, query: Query) -> Result<Option<T>> {
        self.db
            .with_session(|s| s.fetch_scalar::<Option<T>>(&query))
            .map(Option::flatten)
    }

    /// Smallest `arg`; `None` when there are no rows.
    pub fn min<T: Scalar>(&self, arg: Expr) -> Result<Option<T>> {
        self.optional_aggregate(self.query.min(arg))
    }

    pub fn max<T: Scalar>(&self, arg: Expr) -> Result<Option<T>> {
        self.optional_aggregate(self.query.max(arg))
    }

    pub fn avg(&self, arg: Expr) -> Result<Option<f64>> {
        self.optional_aggregate(self.query.avg(arg))
    }

    /// Fluent `UPDATE` of the matching rows; returns the changed-row count.
    pub fn update(&self, assignments: &[(&str, Expr)]) -> Result<u64> {
        let command = self.query.compile_update(assignments)?;
        self.db.with_session(|s| s.execute_command(&command))
    }

    /// Fluent `DELETE` of the matching rows; returns the changed-row count.
    pub fn delete(&self) -> Result<u64> {
        let command = self.query.compile_delete()?;
        self.db.with_session(|s| s.execute_command(&command))
    }

    fn spawn<T, F>(&self, body: F) -> Pending<T>
    where
        T: Send + 'static,
        F: FnOnce(&TableQuery<E>) -> Result<T> + Send + 'static,
    {
        let query = self.clone();
        self.db.workers.submit(move || body(&query))
    }

    pub fn to_list_async(&self) -> Pending<Vec<E>> {
        self.spawn(|q| q.to_list())
    }

    pub fn first_async(&self) -> Pending<E> {
        self.spawn(|q| q.first())
    }

    pub fn first_or_none_async(&self) -> Pending<Option<E>> {
        self.spawn(|q| q.first_or_none())
    }

    pub fn count_async(&self) -> Pending<u64> {
        self.spawn(|q| q.count())
    }

    pub fn any_async(&self) -> Pending<bool> {
        self.spawn(|q| q.any())
    }

    pub fn sum_async<T: Scalar>(&self, arg: Expr) -> Pending<T> {
        self.spawn(move |q| q.sum(arg))
    }

    pub fn update_async(&self, assignments: Vec<(String, Expr)>) -> Pending<u64> {
        self.spawn(move |q| {
            let borrowed: Vec<(&str, Expr)> = assignments
                .iter()
                .map(|(member, e)| (member.as_str(), e.clone()))
                .collect();
            q.update(&borrowed)
        })
    }

    pub fn delete_async(&self) -> Pending<u64> {
        self.spawn(|q| q.delete())
    }
}

/// A projection read back as labelled rows.
#[derive(Debug, Clone)]
pub struct RowQuery {
    db: Database,
    query: Query,
}

impl RowQuery {
    fn with(&self, query: Query) -> Self {
        RowQuery {
            db: self.db.clone(),
            query,
        }
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn compile(&self) -> Result<CompiledCommand> {
        self.query.compile()
    }

    /// Filters on the projected labels.
    pub fn filter(&self, predicate: Expr) -> Self {
        self.with(self.query.filter(predicate))
    }

    pub fn order_by(&self, key: Expr) -> Self {
        self.with(self.query.order_by(key))
    }

    pub fn order_by_desc(&self, key: Expr) -> Self {
        self.with(self.query.order_by_desc(key))
    }

    pub fn then_by(&self, key: Expr) -> Self {
        self.with(self.query.then_by(key))
    }

    pub fn skip(&self, count: u64) -> Self {
        self.with(self.query.skip(count))
    }

    pub fn take(&self, count: u64) -> Self {
        self.with(self.query.take(count))
    }

    pub fn distinct(&self) -> Self {
        self.with(self.query.distinct())
    }

    pub fn to_list(&self) -> Result<Vec<Row>> {
        let command = self.query.compile()?;
        self.db
            .with_session(|s| s.query_rows(&command.sql, &command.params))
    }

    pub fn first_or_none(&self) -> Result<Option<Row>> {
        Ok(self.take(1).to_list()?.pop())
    }

    pub fn count(&self) -> Result<u64> {
        self.db.with_session(|s| s.count(&self.query))
    }

    pub fn to_list_async(&self) -> Pending<Vec<Row>> {
        let this = self.clone();
        self.db.workers.submit(move || this.to_list())
    }
}

/// A grouping awaiting its projection.
#[derive(Debug, Clone)]
pub struct GroupedQuery {
    db: Database,
    query: Query,
}

impl GroupedQuery {
    fn with(&self, query: Query) -> Self {
        GroupedQuery {
            db: self.db.clone(),
            query,
        }
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    /// Filters groups; aggregates are allowed in `predicate`.
    ///
    /// After `skip`/`take` the predicate applies to the groups that remain.
    pub fn filter(&self, predicate: Expr) -> Self {
        self.with(self.query.filter(predicate))
    }

    pub fn order_by(&self, key: Expr) -> Self {
        self.with(self.query.order_by(key))
    }

    pub fn order_by_desc(&self, key: Expr) -> Self {
        self.with(self.query.order_by_desc(key))
    }

    pub fn skip(&self, count: u64) -> Self {
        self.with(self.query.skip(count))
    }

    pub fn take(&self, count: u64) -> Self {
        self.with(self.query.take(count))
    }

    /// The grouping keys of each group, labelled `key0`, `key1`, ...
    pub fn to_list(&self) -> Result<Vec<Row>> {
        let command = self.query.compile()?;
        self.db
            .with_session(|s| s.query_rows(&command.sql, &command.params))
    }

    /// Number of groups.
    pub fn count(&self) -> Result<u64> {
        self.db.with_session(|s| s.count(&self.query))
    }

    /// Projects each group to labelled keys and aggregates.
    pub fn select(&self, columns: Vec<(&str, Expr)>) -> RowQuery {
        RowQuery {
            db: self.db.clone(),
            query: self.query.select(columns),
        }
    }
}
