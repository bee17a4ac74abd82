/// Connection Pool Module
///
/// The pool owns one `PooledConnection` per distinct normalized database
/// target. Concurrent first requests for a target are deduplicated under the
/// pool's map lock so exactly one native handle is ever opened per file.

use crate::config::{Config, PoolConfig, SqliteConfig};
use crate::core::db::connection::PooledConnection;
use crate::core::provider::{OpenOptions, Provider, RusqliteProvider};
use crate::core::Result;
use crate::database::Database;
use crate::storage::{DataDirLocator, StorageLocator, MEMORY};
use crate::worker::WorkerPool;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

/// Identifies one database file and its open options.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionTarget {
    /// Database name as given by the caller; relative names are resolved by the pool's locator
    pub name: String,
    pub options: OpenOptions,
}

impl ConnectionTarget {
    pub fn new(name: impl Into<String>) -> Self {
        ConnectionTarget {
            name: name.into(),
            options: OpenOptions::default(),
        }
    }

    /// The transient in-memory database. Each pool holds at most one.
    pub fn memory() -> Self {
        Self::new(MEMORY)
    }

    pub fn with_options(mut self, options: OpenOptions) -> Self {
        self.options = options;
        self
    }
}

struct PoolInner {
    provider: Arc<dyn Provider>,
    locator: Arc<dyn StorageLocator>,
    pool_config: PoolConfig,
    sqlite_config: SqliteConfig,
    connections: Mutex<HashMap<String, Arc<PooledConnection>>>,
    workers: Arc<WorkerPool>,
}

/// Process-wide registry of pooled connections.
///
/// Cheap to clone; the host creates one pool and shares it.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("config", &self.inner.pool_config)
            .field("workers", &self.inner.workers)
            .finish_non_exhaustive()
    }
}

impl Default for ConnectionPool {
    fn default() -> Self {
        ConnectionPool::new(Arc::new(RusqliteProvider), PoolConfig::default())
    }
}

impl ConnectionPool {
    /// Creates a pool over `provider` resolving relative names under the platform data directory.
    pub fn new(provider: Arc<dyn Provider>, config: PoolConfig) -> Self {
        Self::with_locator(provider, config, Arc::new(DataDirLocator::new()))
    }

    pub fn with_locator(
        provider: Arc<dyn Provider>,
        config: PoolConfig,
        locator: Arc<dyn StorageLocator>,
    ) -> Self {
        Self::build(provider, config, SqliteConfig::default(), locator)
    }

    /// Creates a pool from a loaded configuration file.
    pub fn from_config(provider: Arc<dyn Provider>, config: &Config) -> Self {
        let mut locator = DataDirLocator::new();
        if let Some(storage) = &config.storage {
            if let Some(dir) = &storage.data_dir {
                locator = locator.with_base(dir.clone());
            }
            if let Some(dir) = &storage.temp_dir {
                locator = locator.with_temp_dir(dir.clone());
            }
        }
        Self::build(
            provider,
            config.pool.clone(),
            config.sqlite.clone(),
            Arc::new(locator),
        )
    }

    fn build(
        provider: Arc<dyn Provider>,
        pool_config: PoolConfig,
        sqlite_config: SqliteConfig,
        locator: Arc<dyn StorageLocator>,
    ) -> Self {
        let workers = Arc::new(WorkerPool::new(pool_config.workers));
        ConnectionPool {
            inner: Arc::new(PoolInner {
                provider,
                locator,
                pool_config,
                sqlite_config,
                connections: Mutex::new(HashMap::new()),
                workers,
            }),
        }
    }

    fn registry(&self) -> MutexGuard<'_, HashMap<String, Arc<PooledConnection>>> {
        self.inner
            .connections
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Normalized key of a target: the resolved absolute path, or `:memory:`.
    pub fn resolve(&self, target: &ConnectionTarget) -> Result<String> {
        if target.name == MEMORY {
            return Ok(MEMORY.to_string());
        }
        let path = self.inner.locator.resolve(&target.name)?;
        Ok(path.to_string_lossy().into_owned())
    }

    /// Returns the pooled connection for `target`, creating it on first request.
    ///
    /// A connection that was closed (but not forgotten) is reopened.
    pub fn get(&self, target: &ConnectionTarget) -> Result<Arc<PooledConnection>> {
        let key = self.resolve(target)?;
        let mut connections = self.registry();
        if let Some(existing) = connections.get(&key).cloned() {
            drop(connections);
            existing.reopen();
            return Ok(existing);
        }

        debug!("Registering pooled connection for {}", key);
        let conn = Arc::new(PooledConnection::new(
            key.clone(),
            target.options,
            Arc::clone(&self.inner.provider),
            &self.inner.pool_config,
            &self.inner.sqlite_config,
            self.inner.locator.temp_dir(),
        ));
        connections.insert(key, Arc::clone(&conn));
        Ok(conn)
    }

    /// Opens a `Database` facade over the pooled connection for `target`.
    pub fn database(&self, target: &ConnectionTarget) -> Result<Database> {
        let conn = self.get(target)?;
        Ok(Database::new(conn, Arc::clone(&self.inner.workers)))
    }

    /// Closes the connection for `target`; the next `get` reopens it.
    pub fn close(&self, target: &ConnectionTarget) -> Result<()> {
        let key = self.resolve(target)?;
        let conn = self.registry().get(&key).cloned();
        match conn {
            Some(conn) => conn.close(),
            None => Ok(()),
        }
    }

    /// Closes the connection for `target` and removes it from the pool.
    ///
    /// Handles still holding the old connection fail with `OrmError::Closed`.
    pub fn forget(&self, target: &ConnectionTarget) -> Result<()> {
        let key = self.resolve(target)?;
        let conn = self.registry().remove(&key);
        match conn {
            Some(conn) => {
                info!("Forgetting pooled connection {}", key);
                conn.close()
            }
            None => Ok(()),
        }
    }

    /// Closes and evicts every connection.
    pub fn reset(&self) -> Result<()> {
        let drained: Vec<_> = self.registry().drain().map(|(_, c)| c).collect();
        info!("Resetting connection pool ({} connections)", drained.len());
        let mut first_error = None;
        for conn in drained {
            if let Err(e) = conn.close() {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Number of connections currently registered.
    pub fn len(&self) -> usize {
        self.registry().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the registered connections, keyed by normalized path.
    pub fn connections(&self) -> Vec<(String, Arc<PooledConnection>)> {
        let mut all: Vec<_> = self
            .registry()
            .iter()
            .map(|(k, c)| (k.clone(), Arc::clone(c)))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    pub fn workers(&self) -> &Arc<WorkerPool> {
        &self.inner.workers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::db::connection::ConnectionState;
    use crate::core::OrmError;
    use crate::storage::FixedDirLocator;
    use std::thread;

    fn temp_pool(dir: &tempfile::TempDir) -> ConnectionPool {
        ConnectionPool::with_locator(
            Arc::new(RusqliteProvider),
            PoolConfig::default(),
            Arc::new(FixedDirLocator(dir.path().to_path_buf())),
        )
    }

    #[test]
    fn test_same_normalized_path_shares_connection() {
        let dir = tempfile::tempdir().unwrap();
        let pool = temp_pool(&dir);

        let a = pool.get(&ConnectionTarget::new("shop.db")).unwrap();
        let b = pool.get(&ConnectionTarget::new("./nested/../shop.db")).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(pool.len(), 1);

        let c = pool.get(&ConnectionTarget::new("other.db")).unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_concurrent_first_open_yields_one_handle() {
        let dir = tempfile::tempdir().unwrap();
        let pool = temp_pool(&dir);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let pool = pool.clone();
                thread::spawn(move || {
                    let conn = pool.get(&ConnectionTarget::new("race.db")).unwrap();
                    drop(conn.lock().unwrap());
                    conn
                })
            })
            .collect();
        let conns: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        for conn in &conns[1..] {
            assert!(Arc::ptr_eq(&conns[0], conn));
        }
        assert_eq!(conns[0].stats().opens, 1);
        assert_eq!(conns[0].stats().operations, 8);
    }

    #[test]
    fn test_close_then_get_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let pool = temp_pool(&dir);
        let target = ConnectionTarget::new("close.db");

        let conn = pool.get(&target).unwrap();
        drop(conn.lock().unwrap());
        pool.close(&target).unwrap();
        assert_eq!(conn.state(), ConnectionState::Closed);

        let again = pool.get(&target).unwrap();
        assert!(Arc::ptr_eq(&conn, &again));
        assert_eq!(again.state(), ConnectionState::Unopened);
        drop(again.lock().unwrap());
    }

    #[test]
    fn test_forget_and_reset_evict() {
        let dir = tempfile::tempdir().unwrap();
        let pool = temp_pool(&dir);
        let target = ConnectionTarget::new("forget.db");

        let stale = pool.get(&target).unwrap();
        drop(stale.lock().unwrap());
        pool.forget(&target).unwrap();
        assert!(pool.is_empty());
        assert!(matches!(stale.lock(), Err(OrmError::Closed(_))));

        let fresh = pool.get(&target).unwrap();
        assert!(!Arc::ptr_eq(&stale, &fresh));
        drop(fresh.lock().unwrap());

        pool.reset().unwrap();
        assert!(pool.is_empty());
        assert!(matches!(fresh.lock(), Err(OrmError::Closed(_))));
    }

    #[test]
    fn test_memory_target_is_not_resolved() {
        let pool = ConnectionPool::default();
        assert_eq!(pool.resolve(&ConnectionTarget::memory()).unwrap(), MEMORY);
    }
}
