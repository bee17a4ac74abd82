/// Engine Provider Module
///
/// The narrow interface the mapper consumes from the native SQL engine:
/// open/close a handle, prepare statements, bind positional parameters,
/// step through rows and read typed column values. `RusqliteProvider` is the
/// bundled implementation; hosts can inject their own through `Provider`.
use crate::core::{OrmError, Result, Value};
use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::{Connection, OpenFlags, ToSql};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, warn};

/// Open options of a connection target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OpenOptions {
    /// Create the database file if it does not exist
    pub create: bool,
    /// Open the file read-only
    pub read_only: bool,
    /// Hold the file lock for the lifetime of the handle (`locking_mode = EXCLUSIVE`)
    pub exclusive: bool,
}

impl Default for OpenOptions {
    fn default() -> Self {
        OpenOptions {
            create: true,
            read_only: false,
            exclusive: false,
        }
    }
}

/// Outcome of stepping a statement once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Row,
    Done,
}

/// Opens native handles. One provider is shared by a whole pool.
pub trait Provider: Send + Sync {
    fn open(&self, path: &str, options: &OpenOptions) -> Result<Box<dyn NativeHandle>>;
}

/// An open native database handle. Not safe for overlapping operations;
/// callers reach it only through a pooled connection's guard.
pub trait NativeHandle: Send {
    fn prepare<'a>(&'a self, sql: &str) -> Result<Box<dyn NativeStatement + 'a>>;
    fn last_insert_rowid(&self) -> i64;
    fn changes(&self) -> u64;
    fn busy_timeout(&self, timeout: Duration) -> Result<()>;
    fn close(self: Box<Self>) -> Result<()>;
}

/// A prepared statement. Parameter indexes are 1-based, column indexes 0-based.
pub trait NativeStatement {
    fn bind(&mut self, index: usize, value: &Value) -> Result<()>;
    /// Advances to the next row. Must be called after all parameters are bound.
    fn step(&mut self) -> Result<Step>;
    /// Resets the statement so it can be stepped again from the first row.
    fn reset(&mut self);
    fn column_count(&self) -> usize;
    fn column_name(&self, index: usize) -> Result<String>;
    /// Reads a column of the current row with its storage class.
    fn column_value(&self, index: usize) -> Result<Value>;
}

/// Provider backed by rusqlite with the bundled SQLite engine.
#[derive(Debug, Default, Clone, Copy)]
pub struct RusqliteProvider;

impl Provider for RusqliteProvider {
    fn open(&self, path: &str, options: &OpenOptions) -> Result<Box<dyn NativeHandle>> {
        let mut flags = OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        if options.read_only {
            flags |= OpenFlags::SQLITE_OPEN_READ_ONLY;
        } else {
            flags |= OpenFlags::SQLITE_OPEN_READ_WRITE;
            if options.create {
                flags |= OpenFlags::SQLITE_OPEN_CREATE;
            }
        }

        let conn = Connection::open_with_flags(path, flags)?;
        if options.exclusive {
            conn.execute_batch("PRAGMA locking_mode = EXCLUSIVE;")?;
        }
        debug!("Opened rusqlite handle for {}", path);
        Ok(Box::new(RusqliteHandle { conn }))
    }
}

struct RusqliteHandle {
    conn: Connection,
}

impl NativeHandle for RusqliteHandle {
    fn prepare<'a>(&'a self, sql: &str) -> Result<Box<dyn NativeStatement + 'a>> {
        let stmt = self.conn.prepare(sql)?;
        let column_count = stmt.column_count();
        Ok(Box::new(RusqliteStatement {
            stmt,
            column_count,
            pending: None,
            current: None,
        }))
    }

    fn last_insert_rowid(&self) -> i64 {
        self.conn.last_insert_rowid()
    }

    fn changes(&self) -> u64 {
        self.conn.changes() as u64
    }

    fn busy_timeout(&self, timeout: Duration) -> Result<()> {
        self.conn.busy_timeout(timeout)?;
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<()> {
        self.conn.close().map_err(|(_, e)| {
            warn!("Failed to close rusqlite handle: {}", e);
            OrmError::Database(e)
        })
    }
}

/// Statement wrapper over rusqlite's raw query interface.
///
/// rusqlite's row cursor borrows the statement mutably, so the first `step`
/// drains the cursor into `pending` and later steps pop from it.
/// The whole result set is held in memory from the first `step`; rows are not streamed.
struct RusqliteStatement<'conn> {
    stmt: rusqlite::Statement<'conn>,
    column_count: usize,
    pending: Option<VecDeque<Vec<Value>>>,
    current: Option<Vec<Value>>,
}

impl RusqliteStatement<'_> {
    fn drain(&mut self) -> Result<VecDeque<Vec<Value>>> {
        let column_count = self.column_count;
        let mut buffered = VecDeque::new();
        let mut rows = self.stmt.raw_query();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(column_count);
            for i in 0..column_count {
                values.push(from_value_ref(row.get_ref(i)?));
            }
            buffered.push_back(values);
        }
        Ok(buffered)
    }
}

impl NativeStatement for RusqliteStatement<'_> {
    fn bind(&mut self, index: usize, value: &Value) -> Result<()> {
        self.stmt.raw_bind_parameter(index, value)?;
        Ok(())
    }

    /// Buffers every remaining row on the first call.
    fn step(&mut self) -> Result<Step> {
        if self.pending.is_none() {
            let drained = self.drain()?;
            self.pending = Some(drained);
        }
        self.current = self.pending.as_mut().and_then(|p| p.pop_front());
        Ok(if self.current.is_some() { Step::Row } else { Step::Done })
    }

    fn reset(&mut self) {
        self.pending = None;
        self.current = None;
    }

    fn column_count(&self) -> usize {
        self.column_count
    }

    fn column_name(&self, index: usize) -> Result<String> {
        Ok(self.stmt.column_name(index)?.to_string())
    }

    fn column_value(&self, index: usize) -> Result<Value> {
        let row = self
            .current
            .as_ref()
            .ok_or_else(|| OrmError::Engine("no current row".to_string()))?;
        row.get(index)
            .cloned()
            .ok_or(OrmError::Database(rusqlite::Error::InvalidColumnIndex(index)))
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::Borrowed(match self {
            Value::Null => ValueRef::Null,
            Value::Integer(i) => ValueRef::Integer(*i),
            Value::Real(f) => ValueRef::Real(*f),
            Value::Text(t) => ValueRef::Text(t.as_bytes()),
            Value::Blob(b) => ValueRef::Blob(b),
        }))
    }
}

fn from_value_ref(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(f) => Value::Real(f),
        ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Blob(b.to_vec()),
    }
}
