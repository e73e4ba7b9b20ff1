use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use rusqlite::Connection;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;

use crate::error::StoreError;
use crate::notify::Table;
use crate::sql::StatementCache;
use crate::store::Store;

/// A live query: a stream of materialized result sets.
///
/// The first item is the initial snapshot; a fresh item follows every
/// time a table in the query's dependency set is mutated through the
/// store. Emissions are serialized per subscriber. A failed run emits
/// its error and ends the stream. Dropping the stream unsubscribes:
/// no further queries run on its behalf.
pub struct LiveQuery<T> {
    inner: ReceiverStream<Result<Vec<T>, StoreError>>,
}

impl<T> Stream for LiveQuery<T> {
    type Item = Result<Vec<T>, StoreError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.get_mut().inner).poll_next(cx)
    }
}

/// Bind a query closure to a dependency set and spawn its worker.
pub(crate) fn watch<T, Q>(store: &Store, tables: &'static [Table], query: Q) -> LiveQuery<T>
where
    T: Send + 'static,
    Q: Fn(&Connection, &StatementCache) -> Result<Vec<T>, StoreError> + Send + Sync + 'static,
{
    let (tx, rx) = mpsc::channel(4);
    // Subscribe before the first run: a write landing between the
    // initial snapshot and the wait loop still triggers a re-emission.
    let mut invalidations = store.subscribe();
    let store = store.clone();
    let query = Arc::new(query);

    tokio::spawn(async move {
        loop {
            let result = {
                let query = Arc::clone(&query);
                store.read(move |conn, sql| (*query)(conn, sql)).await
            };
            let failed = result.is_err();
            if failed {
                debug!("live query failed, ending subscription");
            }
            if tx.send(result).await.is_err() || failed {
                return;
            }

            // Wait for an invalidation in the dependency set. A lagged
            // receiver missed notifications, so it re-queries too.
            loop {
                tokio::select! {
                    () = tx.closed() => return,
                    recv = invalidations.recv() => match recv {
                        Ok(table) if tables.contains(&table) => break,
                        Ok(_) => {}
                        Err(RecvError::Lagged(_)) => break,
                        Err(RecvError::Closed) => return,
                    },
                }
            }
            // Coalesce a burst of writes into one re-query.
            while invalidations.try_recv().is_ok() {}
        }
    });

    LiveQuery {
        inner: ReceiverStream::new(rx),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::time::Duration;

    fn count_foods(store: &Store) -> LiveQuery<i64> {
        watch(store, &[Table::Foods], |conn, _| {
            let count: i64 = conn.query_row("SELECT count(*) FROM foods", [], |row| row.get(0))?;
            Ok(vec![count])
        })
    }

    async fn insert_dummy_food(store: &Store) {
        store
            .write(&[Table::Foods], |tx, _| {
                tx.execute(
                    "INSERT INTO foods (name, calories, protein, carbs, fat, servingSize, servingUnit)
                     VALUES ('Rice', 130, 2.7, 28.0, 0.3, 100.0, 'g')",
                    [],
                )?;
                Ok(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_initial_snapshot_then_reemission() {
        let store = Store::open_in_memory().await.unwrap();
        let mut live = count_foods(&store);

        assert_eq!(live.next().await.unwrap().unwrap(), vec![0]);
        insert_dummy_food(&store).await;
        assert_eq!(live.next().await.unwrap().unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn test_unrelated_table_does_not_reemit() {
        let store = Store::open_in_memory().await.unwrap();
        let mut live = count_foods(&store);
        assert_eq!(live.next().await.unwrap().unwrap(), vec![0]);

        store
            .write(&[Table::FoodEntries], |tx, _| {
                tx.execute("DELETE FROM food_entries", [])?;
                Ok(())
            })
            .await
            .unwrap();

        let quiet = tokio::time::timeout(Duration::from_millis(100), live.next()).await;
        assert!(quiet.is_err(), "expected no emission for unrelated table");
    }

    #[tokio::test]
    async fn test_failed_run_ends_stream() {
        let store = Store::open_in_memory().await.unwrap();
        let mut live: LiveQuery<i64> = watch(&store, &[Table::Foods], |conn, _| {
            let count: i64 =
                conn.query_row("SELECT count(*) FROM no_such_table", [], |row| row.get(0))?;
            Ok(vec![count])
        });

        assert!(live.next().await.unwrap().is_err());
        assert!(live.next().await.is_none());
    }

    #[tokio::test]
    async fn test_dropped_subscriber_stops_worker() {
        let store = Store::open_in_memory().await.unwrap();
        let mut live = count_foods(&store);
        assert_eq!(live.next().await.unwrap().unwrap(), vec![0]);
        assert_eq!(store.subscriber_count(), 1);

        drop(live);
        // Writes after unsubscription must not be affected.
        insert_dummy_food(&store).await;

        // The worker sees the closed channel and drops its receiver.
        for _ in 0..50 {
            if store.subscriber_count() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(store.subscriber_count(), 0);
    }
}
