use chrono::NaiveDate;
use rusqlite::types::Value;
use rusqlite::{Params, Statement, params, params_from_iter};
use tracing::debug;

use crate::codec::Entity;
use crate::error::StoreError;
use crate::live::{self, LiveQuery};
use crate::models::{Food, FoodEntry};
use crate::store::Store;

fn collect_rows<E: Entity, P: Params>(
    stmt: &mut Statement<'_>,
    params: P,
) -> Result<Vec<E>, StoreError> {
    let mut rows = stmt.query(params)?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        out.push(E::decode(row)?);
    }
    Ok(out)
}

/// Insert-or-replace; returns the resulting id (newly assigned when the
/// record carried the unassigned sentinel, otherwise the replaced id).
async fn insert_row<E: Entity>(store: &Store, record: &E) -> Result<i64, StoreError> {
    let values = record.encode();
    store
        .write(E::TABLES, move |tx, sql| {
            let mut stmt = tx.prepare_cached(&sql.for_table(E::TABLE).insert)?;
            stmt.execute(params_from_iter(values))?;
            // REPLACE re-inserts under the colliding rowid, so this is
            // correct for fresh and replaced rows alike.
            Ok(tx.last_insert_rowid())
        })
        .await
        .inspect(|id| debug!(table = E::TABLE.name(), id = *id, "inserted row"))
}

/// Full-row replace keyed by id, issued without an existence check.
async fn update_row<E: Entity>(store: &Store, record: &E) -> Result<(), StoreError> {
    let mut values = record.encode();
    let id = record.id();
    values.push(Value::Integer(id));
    store
        .write(E::TABLES, move |tx, sql| {
            let mut stmt = tx.prepare_cached(&sql.for_table(E::TABLE).update)?;
            let changed = stmt.execute(params_from_iter(values))?;
            if changed == 0 {
                debug!(table = E::TABLE.name(), id, "update matched no row");
            }
            Ok(())
        })
        .await
}

async fn delete_row<E: Entity>(store: &Store, record: &E) -> Result<(), StoreError> {
    let id = record.id();
    store
        .write(E::TABLES, move |tx, sql| {
            let mut stmt = tx.prepare_cached(&sql.for_table(E::TABLE).delete)?;
            stmt.execute(params![id])?;
            Ok(())
        })
        .await
}

async fn get_row<E: Entity>(store: &Store, id: i64) -> Result<Option<E>, StoreError> {
    store
        .read(move |conn, sql| {
            let mut stmt = conn.prepare_cached(&sql.for_table(E::TABLE).select_by_id)?;
            let mut rows = stmt.query(params![id])?;
            match rows.next()? {
                Some(row) => Ok(Some(E::decode(row)?)),
                None => Ok(None),
            }
        })
        .await
}

/// Typed access to the `foods` table.
#[derive(Clone)]
pub struct FoodDao {
    store: Store,
}

impl FoodDao {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Insert or replace a food; returns its id.
    pub async fn insert(&self, food: &Food) -> Result<i64, StoreError> {
        insert_row(&self.store, food).await
    }

    /// Replace the row matching `food.id`. Completes successfully even
    /// when no such row exists.
    pub async fn update(&self, food: &Food) -> Result<(), StoreError> {
        update_row(&self.store, food).await
    }

    pub async fn delete(&self, food: &Food) -> Result<(), StoreError> {
        delete_row(&self.store, food).await
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<Food>, StoreError> {
        get_row(&self.store, id).await
    }

    /// All foods ordered by name, as a live query.
    pub fn get_all(&self) -> LiveQuery<Food> {
        live::watch(&self.store, Food::TABLES, |conn, sql| {
            let mut stmt = conn.prepare_cached(&sql.foods.select_all)?;
            collect_rows(&mut stmt, [])
        })
    }

    /// Foods whose name contains `needle` as a substring (engine case
    /// rules), ordered by name, as a live query.
    pub fn search(&self, needle: &str) -> LiveQuery<Food> {
        let needle = needle.to_owned();
        live::watch(&self.store, Food::TABLES, move |conn, sql| {
            let mut stmt = conn.prepare_cached(&sql.foods_search)?;
            collect_rows(&mut stmt, params![needle])
        })
    }
}

/// Typed access to the `food_entries` table.
#[derive(Clone)]
pub struct FoodEntryDao {
    store: Store,
}

impl FoodEntryDao {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub async fn insert(&self, entry: &FoodEntry) -> Result<i64, StoreError> {
        insert_row(&self.store, entry).await
    }

    pub async fn update(&self, entry: &FoodEntry) -> Result<(), StoreError> {
        update_row(&self.store, entry).await
    }

    pub async fn delete(&self, entry: &FoodEntry) -> Result<(), StoreError> {
        delete_row(&self.store, entry).await
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<FoodEntry>, StoreError> {
        get_row(&self.store, id).await
    }

    /// All entries, newest first, as a live query.
    pub fn get_all(&self) -> LiveQuery<FoodEntry> {
        live::watch(&self.store, FoodEntry::TABLES, |conn, sql| {
            let mut stmt = conn.prepare_cached(&sql.food_entries.select_all)?;
            collect_rows(&mut stmt, [])
        })
    }

    /// Entries logged on the given calendar day, newest first.
    pub fn entries_on(&self, date: NaiveDate) -> LiveQuery<FoodEntry> {
        let day = date.format("%Y-%m-%d").to_string();
        live::watch(&self.store, FoodEntry::TABLES, move |conn, sql| {
            let mut stmt = conn.prepare_cached(&sql.entries_on_day)?;
            collect_rows(&mut stmt, params![day])
        })
    }

    /// The newest `limit` entries, one-shot. A non-positive limit
    /// yields no rows; SQLite would treat a negative one as unbounded.
    pub async fn recent(&self, limit: i64) -> Result<Vec<FoodEntry>, StoreError> {
        let limit = limit.max(0);
        self.store
            .read(move |conn, sql| {
                let mut stmt = conn.prepare_cached(&sql.entries_recent)?;
                collect_rows(&mut stmt, params![limit])
            })
            .await
    }
}
