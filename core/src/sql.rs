use std::fmt::Write as _;

use crate::notify::Table;
use crate::schema::{FOOD_ENTRIES, FOODS, TableDef};

/// Parameterized statement text for one table, in the registry's
/// declared column order. Built once at store open; execution goes
/// through `prepare_cached`, so each text compiles at most once per
/// connection.
#[derive(Debug)]
pub(crate) struct TableSql {
    pub insert: String,
    pub update: String,
    pub delete: String,
    pub select_by_id: String,
    pub select_all: String,
}

/// All generated statement text, shared by every table access object.
#[derive(Debug)]
pub(crate) struct StatementCache {
    pub foods: TableSql,
    pub food_entries: TableSql,
    pub foods_search: String,
    pub entries_on_day: String,
    pub entries_recent: String,
}

impl StatementCache {
    pub(crate) fn new() -> Self {
        let foods_cols = column_list(&FOODS);
        let entry_cols = column_list(&FOOD_ENTRIES);
        Self {
            foods: TableSql::build(&FOODS, "`name` ASC"),
            food_entries: TableSql::build(&FOOD_ENTRIES, "`timestamp` DESC"),
            foods_search: format!(
                "SELECT {foods_cols} FROM `foods` WHERE `name` LIKE '%' || ?1 || '%' ORDER BY `name` ASC"
            ),
            entries_on_day: format!(
                "SELECT {entry_cols} FROM `food_entries` WHERE substr(`timestamp`, 1, 10) = ?1 ORDER BY `timestamp` DESC"
            ),
            entries_recent: format!(
                "SELECT {entry_cols} FROM `food_entries` ORDER BY `timestamp` DESC LIMIT ?1"
            ),
        }
    }

    pub(crate) fn for_table(&self, table: Table) -> &TableSql {
        match table {
            Table::Foods => &self.foods,
            Table::FoodEntries => &self.food_entries,
        }
    }
}

impl TableSql {
    fn build(def: &TableDef, order_by: &str) -> Self {
        let cols = column_list(def);
        Self {
            insert: insert_sql(def),
            update: update_sql(def),
            delete: format!("DELETE FROM `{}` WHERE `{}` = ?1", def.name, pk_name(def)),
            select_by_id: format!(
                "SELECT {cols} FROM `{}` WHERE `{}` = ?1",
                def.name,
                pk_name(def)
            ),
            select_all: format!("SELECT {cols} FROM `{}` ORDER BY {order_by}", def.name),
        }
    }
}

fn pk_name(def: &TableDef) -> &'static str {
    def.columns.iter().find(|c| c.pk).map_or("id", |c| c.name)
}

fn column_list(def: &TableDef) -> String {
    def.columns
        .iter()
        .map(|c| format!("`{}`", c.name))
        .collect::<Vec<_>>()
        .join(",")
}

/// Insert-or-replace. A colliding primary key replaces the row
/// entirely; the unassigned sentinel (0) becomes NULL so the engine
/// assigns a fresh rowid.
fn insert_sql(def: &TableDef) -> String {
    let mut placeholders = String::new();
    for (i, c) in def.columns.iter().enumerate() {
        if i > 0 {
            placeholders.push(',');
        }
        if c.pk {
            let _ = write!(placeholders, "nullif(?{}, 0)", i + 1);
        } else {
            let _ = write!(placeholders, "?{}", i + 1);
        }
    }
    format!(
        "INSERT OR REPLACE INTO `{}` ({}) VALUES ({placeholders})",
        def.name,
        column_list(def)
    )
}

/// Full-row replace keyed by primary key. Issued without a pre-check;
/// a missing id affects zero rows.
fn update_sql(def: &TableDef) -> String {
    let mut assignments = String::new();
    for (i, c) in def.columns.iter().enumerate() {
        if i > 0 {
            assignments.push(',');
        }
        let _ = write!(assignments, "`{}` = ?{}", c.name, i + 1);
    }
    format!(
        "UPDATE OR ABORT `{}` SET {assignments} WHERE `{}` = ?{}",
        def.name,
        pk_name(def),
        def.columns.len() + 1
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_sql_foods() {
        assert_eq!(
            insert_sql(&FOODS),
            "INSERT OR REPLACE INTO `foods` (`id`,`name`,`calories`,`protein`,`carbs`,`fat`,\
             `servingSize`,`servingUnit`) VALUES (nullif(?1, 0),?2,?3,?4,?5,?6,?7,?8)"
        );
    }

    #[test]
    fn test_update_sql_entries_binds_trailing_id() {
        let sql = update_sql(&FOOD_ENTRIES);
        assert!(sql.starts_with("UPDATE OR ABORT `food_entries` SET `id` = ?1,"));
        assert!(sql.ends_with("WHERE `id` = ?11"));
    }

    #[test]
    fn test_delete_and_select_sql() {
        let cache = StatementCache::new();
        assert_eq!(cache.foods.delete, "DELETE FROM `foods` WHERE `id` = ?1");
        assert!(
            cache
                .food_entries
                .select_all
                .ends_with("ORDER BY `timestamp` DESC")
        );
        assert!(cache.foods.select_all.ends_with("ORDER BY `name` ASC"));
        assert!(cache.foods.select_by_id.contains("WHERE `id` = ?1"));
    }

    #[test]
    fn test_search_is_substring_match() {
        let cache = StatementCache::new();
        assert!(
            cache
                .foods_search
                .contains("`name` LIKE '%' || ?1 || '%'")
        );
    }
}
