/// Connection Management Module
///
/// A `PooledConnection` owns exactly one native handle for a connection
/// target behind a mutual-exclusion guard. Every engine call sequence runs
/// while holding a `ConnectionGuard`; dropping the guard releases the handle
/// on every exit path.

use crate::config::{PoolConfig, SqliteConfig};
use crate::core::provider::{NativeHandle, OpenOptions, Provider, Step};
use crate::core::{OrmError, Result};
use std::ops::Deref;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Lifecycle state of a pooled connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No native handle yet; the next acquisition opens one
    Unopened,
    /// A native handle is open
    Open,
    /// Explicitly closed; must be reopened before use
    Closed,
}

enum Slot {
    Unopened,
    Open(Box<dyn NativeHandle>),
    Closed,
}

impl Slot {
    fn state(&self) -> ConnectionState {
        match self {
            Slot::Unopened => ConnectionState::Unopened,
            Slot::Open(_) => ConnectionState::Open,
            Slot::Closed => ConnectionState::Closed,
        }
    }
}

/// Snapshot of a connection's counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnectionStats {
    /// Number of completed guard acquisitions
    pub operations: u64,
    /// Number of native handles opened over the connection's lifetime
    pub opens: u64,
    /// Total time the guard was held
    pub busy: Duration,
}

/// One exclusive-guarded native handle for a database target.
pub struct PooledConnection {
    path: String,
    options: OpenOptions,
    provider: Arc<dyn Provider>,
    busy_timeout: Duration,
    sqlite: SqliteConfig,
    temp_dir: Option<PathBuf>,
    trace: bool,
    time_execution: bool,
    slot: Mutex<Slot>,
    /// Thread currently holding the guard
    owner: Mutex<Option<ThreadId>>,
    closed: AtomicBool,
    operations: AtomicU64,
    opens: AtomicU64,
    busy_micros: AtomicU64,
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("path", &self.path)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl PooledConnection {
    pub(crate) fn new(
        path: String,
        options: OpenOptions,
        provider: Arc<dyn Provider>,
        pool: &PoolConfig,
        sqlite: &SqliteConfig,
        temp_dir: Option<PathBuf>,
    ) -> Self {
        PooledConnection {
            path,
            options,
            provider,
            busy_timeout: pool.busy_timeout(),
            sqlite: sqlite.clone(),
            temp_dir,
            trace: pool.trace,
            time_execution: pool.time_execution,
            slot: Mutex::new(Slot::Unopened),
            owner: Mutex::new(None),
            closed: AtomicBool::new(false),
            operations: AtomicU64::new(0),
            opens: AtomicU64::new(0),
            busy_micros: AtomicU64::new(0),
        }
    }

    /// Normalized path this connection is keyed by
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn options(&self) -> OpenOptions {
        self.options
    }

    /// Whether statements are logged as they execute
    pub fn trace(&self) -> bool {
        self.trace
    }

    /// Current lifecycle state
    pub fn state(&self) -> ConnectionState {
        self.lock_slot().state()
    }

    /// Counters for tracing and timing
    pub fn stats(&self) -> ConnectionStats {
        ConnectionStats {
            operations: self.operations.load(Ordering::Relaxed),
            opens: self.opens.load(Ordering::Relaxed),
            busy: Duration::from_micros(self.busy_micros.load(Ordering::Relaxed)),
        }
    }

    // A panic while the guard was held leaves the slot in whatever state the
    // native call sequence reached; the handle itself stays usable.
    fn lock_slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_owner(&self) -> MutexGuard<'_, Option<ThreadId>> {
        self.owner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Acquires the exclusive guard, opening the native handle on first use.
    ///
    /// The guard is not reentrant. A thread that asks for it again while
    /// holding it gets an engine error instead of deadlocking.
    ///
    /// # Errors
    ///
    /// Returns `OrmError::Closed` if the connection was closed and not
    /// reopened, or the engine error if opening the handle fails.
    pub fn lock(&self) -> Result<ConnectionGuard<'_>> {
        let current = thread::current().id();
        if *self.lock_owner() == Some(current) {
            return Err(OrmError::Engine(format!(
                "connection to {} is already held by this thread; use the session it was given",
                self.path
            )));
        }
        let mut slot = self.lock_slot();
        match slot.state() {
            ConnectionState::Open => {}
            ConnectionState::Unopened => {
                let handle = self.open_handle()?;
                *slot = Slot::Open(handle);
            }
            ConnectionState::Closed => {
                return Err(OrmError::Closed(format!(
                    "connection to {} is closed",
                    self.path
                )))
            }
        }
        *self.lock_owner() = Some(current);
        Ok(ConnectionGuard {
            slot,
            conn: self,
            acquired: Instant::now(),
        })
    }

    fn open_handle(&self) -> Result<Box<dyn NativeHandle>> {
        let mut setup = self.sqlite.pragmas()?;
        info!("Opening database {}", self.path);
        let handle = self.provider.open(&self.path, &self.options)?;
        handle.busy_timeout(self.busy_timeout)?;
        if let Some(dir) = &self.temp_dir {
            setup.push(format!(
                "PRAGMA temp_store_directory = '{}'",
                dir.display().to_string().replace('\'', "''")
            ));
        }
        for pragma in &setup {
            let mut stmt = handle.prepare(pragma)?;
            while stmt.step()? == Step::Row {}
        }
        self.opens.fetch_add(1, Ordering::Relaxed);
        Ok(handle)
    }

    /// Closes the native handle. Terminal until `reopen` is called.
    pub fn close(&self) -> Result<()> {
        let mut slot = self.lock_slot();
        let previous = std::mem::replace(&mut *slot, Slot::Closed);
        self.closed.store(true, Ordering::Release);
        if let Slot::Open(handle) = previous {
            debug!("Closing database {}", self.path);
            handle.close()?;
        }
        Ok(())
    }

    /// Returns a closed connection to `Unopened`; the next `lock` opens a fresh handle.
    ///
    /// Does not touch the guard unless the connection is actually closed, so it
    /// is safe to call while another caller holds it.
    pub fn reopen(&self) {
        if !self.closed.load(Ordering::Acquire) {
            return;
        }
        let mut slot = self.lock_slot();
        if matches!(*slot, Slot::Closed) {
            debug!("Reopening database {}", self.path);
            *slot = Slot::Unopened;
            self.closed.store(false, Ordering::Release);
        }
    }
}

/// Scoped ownership of a pooled connection's native handle.
pub struct ConnectionGuard<'a> {
    slot: MutexGuard<'a, Slot>,
    conn: &'a PooledConnection,
    acquired: Instant,
}

impl ConnectionGuard<'_> {
    pub fn connection(&self) -> &PooledConnection {
        self.conn
    }
}

impl Deref for ConnectionGuard<'_> {
    type Target = dyn NativeHandle;

    fn deref(&self) -> &Self::Target {
        match &*self.slot {
            Slot::Open(handle) => handle.as_ref(),
            // `lock` only hands out guards over an open slot, and `close`
            // needs the same mutex.
            _ => unreachable!("guard over a connection that is not open"),
        }
    }
}

impl Drop for ConnectionGuard<'_> {
    fn drop(&mut self) {
        *self.conn.lock_owner() = None;
        let elapsed = self.acquired.elapsed();
        self.conn.operations.fetch_add(1, Ordering::Relaxed);
        self.conn
            .busy_micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
        if self.conn.time_execution {
            debug!("Operation on {} held the connection for {:?}", self.conn.path, elapsed);
        }
        if thread::panicking() {
            warn!("Releasing connection {} while panicking", self.conn.path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::provider::RusqliteProvider;
    use crate::storage::MEMORY;

    fn memory_connection() -> PooledConnection {
        PooledConnection::new(
            MEMORY.to_string(),
            OpenOptions::default(),
            Arc::new(RusqliteProvider),
            &PoolConfig::default(),
            &SqliteConfig::default(),
            None,
        )
    }

    #[test]
    fn test_lazy_open_and_reuse() {
        let conn = memory_connection();
        assert_eq!(conn.state(), ConnectionState::Unopened);

        {
            let guard = conn.lock().unwrap();
            let mut stmt = guard.prepare("SELECT 1").unwrap();
            assert_eq!(stmt.step().unwrap(), Step::Row);
        }
        assert_eq!(conn.state(), ConnectionState::Open);

        drop(conn.lock().unwrap());
        let stats = conn.stats();
        assert_eq!(stats.opens, 1);
        assert_eq!(stats.operations, 2);
    }

    #[test]
    fn test_closed_connection_rejects_use_until_reopened() {
        let conn = memory_connection();
        drop(conn.lock().unwrap());
        conn.close().unwrap();
        assert_eq!(conn.state(), ConnectionState::Closed);

        match conn.lock() {
            Err(OrmError::Closed(msg)) => assert!(msg.contains(MEMORY)),
            Err(e) => panic!("Expected Closed error, got {:?}", e),
            Ok(_) => panic!("Expected Closed error"),
        }

        conn.reopen();
        assert_eq!(conn.state(), ConnectionState::Unopened);
        drop(conn.lock().unwrap());
        assert_eq!(conn.state(), ConnectionState::Open);
        assert_eq!(conn.stats().opens, 2);
    }

    #[test]
    fn test_open_failure_surfaces_engine_error() {
        let conn = PooledConnection::new(
            "/nonexistent/path/database.db".to_string(),
            OpenOptions::default(),
            Arc::new(RusqliteProvider),
            &PoolConfig::default(),
            &SqliteConfig::default(),
            None,
        );
        match conn.lock() {
            Err(OrmError::Database(_)) => {}
            Err(e) => panic!("Expected Database error, got {:?}", e),
            Ok(_) => panic!("Expected Database error"),
        }
        assert_eq!(conn.state(), ConnectionState::Unopened);
    }

    #[test]
    fn test_invalid_pragma_config_fails_before_opening() {
        let sqlite = SqliteConfig {
            foreign_keys: true,
            journal_mode: Some("WAL; PRAGMA foreign_keys = OFF".to_string()),
        };
        let conn = PooledConnection::new(
            MEMORY.to_string(),
            OpenOptions::default(),
            Arc::new(RusqliteProvider),
            &PoolConfig::default(),
            &sqlite,
            None,
        );
        assert!(matches!(conn.lock(), Err(OrmError::Config(_))));
        assert_eq!(conn.stats().opens, 0);
    }

    #[test]
    fn test_reentrant_lock_is_an_error_not_a_deadlock() {
        let conn = Arc::new(memory_connection());
        let guard = conn.lock().unwrap();
        match conn.lock() {
            Err(OrmError::Engine(msg)) => assert!(msg.contains("already held")),
            Err(e) => panic!("Expected Engine error, got {:?}", e),
            Ok(_) => panic!("Expected Engine error"),
        }

        // Another thread still waits for the guard instead of failing.
        let other = {
            let conn = Arc::clone(&conn);
            thread::spawn(move || conn.lock().map(|_| ()).is_ok())
        };
        thread::sleep(Duration::from_millis(20));
        drop(guard);
        assert!(other.join().unwrap());
        drop(conn.lock().unwrap());
    }
}
