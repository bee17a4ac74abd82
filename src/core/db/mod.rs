/// Database Module
///
/// The connection layer of liteorm, organized into focused submodules.
///
/// ## Architecture
///
/// - **Connection Management** (`connection.rs`): one guarded native handle per target, its lifecycle and counters
/// - **Pooling** (`pool.rs`): the registry deduplicating targets by normalized path
/// - **Sessions** (`session.rs`): statement execution and entity operations while holding a guard
/// - **Schema Management** (`schema.rs`): table creation, migration, indexes and introspection
///
/// ## Error Handling
///
/// All operations use the crate-wide `OrmError` type; engine errors propagate unmodified.
pub mod connection;
pub mod pool;
pub mod schema;
pub mod session;

pub use connection::{ConnectionGuard, ConnectionState, ConnectionStats, PooledConnection};
pub use pool::{ConnectionPool, ConnectionTarget};
pub use schema::{ColumnInfo, CreateTableResult};
pub use session::Session;
