//! liteorm: an embedded object-relational mapper for SQLite.
//!
//! Entities describe their columns once through [`Entity::describe`]; the
//! mapper derives table schemas from that description, compiles composable
//! [`Query`] trees into parameterized SQL and materializes result rows back
//! into entities. Connections are pooled per database file and every use of
//! a connection holds its guard, so blocking calls and the `_async` forms run
//! on worker threads can be mixed freely.

// Core infrastructure modules
pub mod config;
pub mod core;
pub mod storage;
pub mod worker;

// Mapping and query compilation
pub mod mapping;
pub mod materialize;
pub mod query;

// Caller-facing handles
pub mod database;

pub use crate::config::{load_config, Config, PoolConfig, SqliteConfig, StorageConfig};
pub use crate::core::db::{
    ColumnInfo, ConnectionPool, ConnectionState, ConnectionTarget, CreateTableResult,
    PooledConnection, Session,
};
pub use crate::core::provider::{OpenOptions, Provider, RusqliteProvider};
pub use crate::core::{Affinity, OrmError, Result, Scalar, Value};
pub use crate::database::{Database, GroupedQuery, RowQuery, Table, TableQuery};
pub use crate::mapping::{mapping, Describe, Entity, Mapping, TableMapping};
pub use crate::materialize::Row;
pub use crate::query::{
    abs, avg, coalesce, col, col_of, count, count_distinct, length, lower, max, min, outer,
    subquery, sum, trim, upper, val, CompiledCommand, Expr, JoinKind, Query,
};
pub use crate::worker::{Pending, WorkerPool};
