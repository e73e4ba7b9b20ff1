use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use rusqlite::{Connection, Transaction};
use tokio::sync::broadcast;
use tokio::task;
use tracing::info;

use crate::error::StoreError;
use crate::notify::{ChangeNotifier, Table};
use crate::schema;
use crate::sql::StatementCache;

/// Shared handle to the underlying database.
///
/// Cheap to clone; every table access object is constructed from a
/// clone of the same store. All statement execution happens on the
/// blocking pool behind a single connection lock, which serializes
/// writers; callers only ever await.
#[derive(Debug, Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

#[derive(Debug)]
struct StoreInner {
    conn: Mutex<Connection>,
    sql: StatementCache,
    notifier: ChangeNotifier,
}

impl Store {
    /// Open (or create) a store at `path`. On a fresh database the
    /// schema is created and stamped; otherwise it is validated against
    /// the registry and any mismatch fails the open.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        task::spawn_blocking(move || {
            info!(path = %path.display(), "opening store");
            Self::from_conn(Connection::open(&path)?)
        })
        .await?
    }

    /// In-memory store, mainly for tests and previews.
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        task::spawn_blocking(|| Self::from_conn(Connection::open_in_memory()?)).await?
    }

    fn from_conn(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA busy_timeout=5000;")?;
        schema::ensure_schema(&conn)?;
        Ok(Self {
            inner: Arc::new(StoreInner {
                conn: Mutex::new(conn),
                sql: StatementCache::new(),
                notifier: ChangeNotifier::new(),
            }),
        })
    }

    /// Run a read-only closure on the blocking pool. Dropping the
    /// returned future abandons the result; the statement itself is
    /// not interrupted but nothing is retained on the caller's behalf.
    pub(crate) async fn read<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection, &StatementCache) -> Result<T, StoreError> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        task::spawn_blocking(move || {
            let conn = inner.conn.lock().unwrap_or_else(PoisonError::into_inner);
            f(&conn, &inner.sql)
        })
        .await?
    }

    /// Run a write closure inside a transaction. On success the commit
    /// is followed by an invalidation for every touched table, so the
    /// next live-query emission reflects this write. Any error rolls
    /// the transaction back fully.
    ///
    /// Invalidations are published from the blocking task itself: a
    /// caller abandoning the returned future after the commit landed
    /// must not leave live queries stale.
    pub(crate) async fn write<T, F>(
        &self,
        touched: &'static [Table],
        f: F,
    ) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Transaction<'_>, &StatementCache) -> Result<T, StoreError> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        task::spawn_blocking(move || -> Result<T, StoreError> {
            let mut conn = inner.conn.lock().unwrap_or_else(PoisonError::into_inner);
            let tx = conn.transaction()?;
            let value = f(&tx, &inner.sql)?;
            tx.commit()?;
            for table in touched {
                inner.notifier.notify(*table);
            }
            Ok(value)
        })
        .await?
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<Table> {
        self.inner.notifier.subscribe()
    }

    #[cfg(test)]
    pub(crate) fn subscriber_count(&self) -> usize {
        self.inner.notifier.receiver_count()
    }
}
