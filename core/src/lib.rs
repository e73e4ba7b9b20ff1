//! Reactive embedded storage core for the morsel food logger.
//!
//! A typed data-access layer over SQLite for two tables, `foods` and
//! `food_entries`: prepared-statement CRUD through per-table access
//! objects ([`dao::FoodDao`], [`dao::FoodEntryDao`]), live queries that
//! re-emit whenever a dependency table is mutated ([`live::LiveQuery`]),
//! and a schema registry that validates the opened database against the
//! compiled shape at startup ([`schema`]).
//!
//! Construction is explicit: open a [`store::Store`] once at startup
//! and hand clones of it to each access object. All operations run on
//! the blocking pool under a tokio runtime; callers only await.

pub mod dao;
pub mod error;
pub mod live;
pub mod models;
pub mod notify;
pub mod schema;
pub mod store;

mod codec;
mod sql;
