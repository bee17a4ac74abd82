/// Session Module
///
/// A `Session` runs statements while holding a pooled connection's guard.
/// Everything a table handle does (scans, keyed lookups, writes, schema
/// changes) is expressed here as prepare, bind, step and column reads against
/// the provider; the guard is released when the session is dropped, whatever
/// the outcome. Transaction bodies receive the same session so they never
/// re-acquire the guard.
use crate::core::db::connection::{ConnectionGuard, PooledConnection};
use crate::core::provider::{NativeStatement, Step};
use crate::core::{OrmError, Result, Scalar, Value};
use crate::mapping::{mapping, Entity};
use crate::materialize::{
    assign_generated_key, delete_command, insert_command, key_predicate, update_command,
    InsertMode, Row, RowPlan,
};
use crate::query::{CompiledCommand, Query};
use std::sync::Arc;
use tracing::{debug, error};

/// Column labels plus raw rows of a statement.
pub type RawRows = (Vec<String>, Vec<Vec<Value>>);

/// Exclusive access to one pooled connection for a sequence of operations.
pub struct Session<'c> {
    guard: ConnectionGuard<'c>,
}

impl<'c> Session<'c> {
    pub fn new(guard: ConnectionGuard<'c>) -> Self {
        Session { guard }
    }

    pub fn connection(&self) -> &PooledConnection {
        self.guard.connection()
    }

    fn prepare_bound(&self, sql: &str, params: &[Value]) -> Result<Box<dyn NativeStatement + '_>> {
        if self.connection().trace() {
            debug!("Executing: {} ({} params)", sql, params.len());
        }
        let mut stmt = self.guard.prepare(sql).map_err(|e| {
            error!("Failed to prepare statement on {}: {}", self.connection().path(), e);
            e
        })?;
        for (i, value) in params.iter().enumerate() {
            stmt.bind(i + 1, value)?;
        }
        Ok(stmt)
    }

    /// Runs a statement to completion and returns the engine's changed-row count.
    pub fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        let mut stmt = self.prepare_bound(sql, params)?;
        while stmt.step()? == Step::Row {}
        drop(stmt);
        Ok(self.guard.changes())
    }

    pub fn execute_command(&self, command: &CompiledCommand) -> Result<u64> {
        self.execute(&command.sql, &command.params)
    }

    /// Runs a query and collects its column labels and rows.
    pub fn query_raw(&self, sql: &str, params: &[Value]) -> Result<RawRows> {
        let mut stmt = self.prepare_bound(sql, params)?;
        let count = stmt.column_count();
        let columns = (0..count)
            .map(|i| stmt.column_name(i))
            .collect::<Result<Vec<_>>>()?;
        let mut rows = Vec::new();
        while stmt.step()? == Step::Row {
            let row = (0..count)
                .map(|i| stmt.column_value(i))
                .collect::<Result<Vec<_>>>()?;
            rows.push(row);
        }
        Ok((columns, rows))
    }

    /// Runs a query into labelled rows.
    pub fn query_rows(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        let (columns, rows) = self.query_raw(sql, params)?;
        let columns: Arc<[String]> = columns.into();
        Ok(rows
            .into_iter()
            .map(|values| Row::new(Arc::clone(&columns), values))
            .collect())
    }

    /// First column of the first row, or `None` when there are no rows.
    pub fn query_scalar<T: Scalar>(&self, sql: &str, params: &[Value]) -> Result<Option<T>> {
        let mut stmt = self.prepare_bound(sql, params)?;
        if stmt.column_count() == 0 || stmt.step()? == Step::Done {
            return Ok(None);
        }
        let value = stmt.column_value(0)?;
        T::from_value(value).map(Some)
    }

    /// Runs a compiled command and materializes each row as an `E`.
    pub fn query<E: Entity>(&self, command: &CompiledCommand) -> Result<Vec<E>> {
        let mapping = mapping::<E>()?;
        let (columns, rows) = self.query_raw(&command.sql, &command.params)?;
        let plan = RowPlan::new(&mapping.table, &columns);
        rows.into_iter()
            .map(|values| plan.materialize(&mapping, values))
            .collect()
    }

    /// Compiles and runs `query`, materializing `E`s.
    pub fn fetch<E: Entity>(&self, query: &Query) -> Result<Vec<E>> {
        self.query(&query.compile()?)
    }

    /// Compiles and runs a single-valued query.
    pub fn fetch_scalar<T: Scalar>(&self, query: &Query) -> Result<Option<T>> {
        let command = query.compile()?;
        self.query_scalar(&command.sql, &command.params)
    }

    /// Number of rows `query` yields.
    pub fn count(&self, query: &Query) -> Result<u64> {
        let count = self.fetch_scalar::<i64>(&query.count())?.unwrap_or(0);
        Ok(count.max(0) as u64)
    }

    pub fn begin(&self) -> Result<()> {
        self.execute("BEGIN", &[]).map(|_| ())
    }

    pub fn commit(&self) -> Result<()> {
        self.execute("COMMIT", &[]).map(|_| ())
    }

    pub fn rollback(&self) -> Result<()> {
        self.execute("ROLLBACK", &[]).map(|_| ())
    }

    fn insert_with<E: Entity>(&self, entity: &mut E, mode: InsertMode) -> Result<u64> {
        let mapping = mapping::<E>()?;
        let command = insert_command(&mapping, entity, mode);
        let changed = self.execute_command(&command)?;
        if mapping.table.auto_increment_key().is_some() {
            assign_generated_key(&mapping, entity, self.guard.last_insert_rowid())?;
        }
        Ok(changed)
    }

    /// Inserts `entity`, assigning its auto-increment key when it has one.
    pub fn insert<E: Entity>(&self, entity: &mut E) -> Result<u64> {
        self.insert_with(entity, InsertMode::Plain)
    }

    pub fn insert_or_replace<E: Entity>(&self, entity: &mut E) -> Result<u64> {
        self.insert_with(entity, InsertMode::OrReplace)
    }

    /// Updates every non-key column of the row matching `entity`'s key.
    pub fn update<E: Entity>(&self, entity: &E) -> Result<u64> {
        let mapping = mapping::<E>()?;
        match update_command(&mapping, entity)? {
            Some(command) => self.execute_command(&command),
            None => Ok(0),
        }
    }

    pub fn delete<E: Entity>(&self, entity: &E) -> Result<u64> {
        let mapping = mapping::<E>()?;
        self.execute_command(&delete_command(&mapping, entity)?)
    }

    pub fn delete_by_key<E: Entity>(&self, key: &[Value]) -> Result<u64> {
        let query = Query::from::<E>()?;
        let predicate = key_predicate(query.source_table(), key)?;
        self.execute_command(&query.filter(predicate).compile_delete()?)
    }

    pub fn delete_all<E: Entity>(&self) -> Result<u64> {
        self.execute_command(&Query::from::<E>()?.compile_delete()?)
    }

    /// The row with primary key `key`, if any.
    pub fn find<E: Entity>(&self, key: &[Value]) -> Result<Option<E>> {
        let query = Query::from::<E>()?;
        let predicate = key_predicate(query.source_table(), key)?;
        let mut rows = self.fetch::<E>(&query.filter(predicate).take(1))?;
        Ok(rows.pop())
    }

    /// The row with primary key `key`; a missing row is `OrmError::NotFound`.
    pub fn get<E: Entity>(&self, key: &[Value]) -> Result<E> {
        self.find(key)?.ok_or_else(|| {
            OrmError::NotFound(format!(
                "no {} with key {:?}",
                std::any::type_name::<E>(),
                key
            ))
        })
    }
}

impl std::fmt::Debug for Session<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("path", &self.connection().path())
            .finish()
    }
}
