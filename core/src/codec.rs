use chrono::{NaiveDateTime, Timelike};
use rusqlite::Row;
use rusqlite::types::Value;

use crate::error::StoreError;
use crate::models::{Food, FoodEntry};
use crate::notify::Table;
use crate::schema::{FOOD_ENTRIES, FOODS, TableDef};

/// Encode a timestamp as ISO-8601 local date-time text, the on-disk
/// representation. The seconds fraction is omitted when zero.
pub(crate) fn encode_timestamp(ts: &NaiveDateTime) -> String {
    if ts.nanosecond() == 0 {
        ts.format("%Y-%m-%dT%H:%M:%S").to_string()
    } else {
        ts.format("%Y-%m-%dT%H:%M:%S%.f").to_string()
    }
}

/// Decode a stored timestamp column. The domain model requires the
/// field, so a null or unparseable value is a data integrity failure,
/// never silently replaced with a default.
pub(crate) fn decode_timestamp(
    table: &'static str,
    column: &'static str,
    value: Option<String>,
) -> Result<NaiveDateTime, StoreError> {
    let Some(text) = value else {
        return Err(StoreError::DataIntegrity {
            table,
            column,
            reason: "required timestamp is null".to_string(),
        });
    };
    text.parse::<NaiveDateTime>()
        .map_err(|err| StoreError::DataIntegrity {
            table,
            column,
            reason: format!("unparseable timestamp {text:?}: {err}"),
        })
}

/// Bidirectional mapping between a typed record and the ordered column
/// values of its table. `encode` and `decode` both follow the column
/// order declared in the [`TableDef`], which is also the order every
/// generated statement binds and selects in.
pub(crate) trait Entity: Clone + Send + 'static {
    const TABLE: Table;
    /// Dependency set for invalidation; the tables a write touches.
    const TABLES: &'static [Table];

    fn def() -> &'static TableDef;
    fn id(&self) -> i64;
    fn encode(&self) -> Vec<Value>;
    fn decode(row: &Row<'_>) -> Result<Self, StoreError>;
}

impl Entity for Food {
    const TABLE: Table = Table::Foods;
    const TABLES: &'static [Table] = &[Table::Foods];

    fn def() -> &'static TableDef {
        &FOODS
    }

    fn id(&self) -> i64 {
        self.id
    }

    fn encode(&self) -> Vec<Value> {
        vec![
            Value::Integer(self.id),
            Value::Text(self.name.clone()),
            Value::Integer(self.calories),
            Value::Real(self.protein),
            Value::Real(self.carbs),
            Value::Real(self.fat),
            Value::Real(self.serving_size),
            Value::Text(self.serving_unit.clone()),
        ]
    }

    fn decode(row: &Row<'_>) -> Result<Self, StoreError> {
        Ok(Food {
            id: row.get(0)?,
            name: row.get(1)?,
            calories: row.get(2)?,
            protein: row.get(3)?,
            carbs: row.get(4)?,
            fat: row.get(5)?,
            serving_size: row.get(6)?,
            serving_unit: row.get(7)?,
        })
    }
}

impl Entity for FoodEntry {
    const TABLE: Table = Table::FoodEntries;
    const TABLES: &'static [Table] = &[Table::FoodEntries];

    fn def() -> &'static TableDef {
        &FOOD_ENTRIES
    }

    fn id(&self) -> i64 {
        self.id
    }

    fn encode(&self) -> Vec<Value> {
        vec![
            Value::Integer(self.id),
            Value::Integer(self.food_id),
            Value::Text(self.food_name.clone()),
            Value::Real(self.servings),
            Value::Integer(self.calories),
            Value::Real(self.protein),
            Value::Real(self.carbs),
            Value::Real(self.fat),
            Value::Text(encode_timestamp(&self.timestamp)),
            Value::Text(self.meal_type.clone()),
        ]
    }

    fn decode(row: &Row<'_>) -> Result<Self, StoreError> {
        Ok(FoodEntry {
            id: row.get(0)?,
            food_id: row.get(1)?,
            food_name: row.get(2)?,
            servings: row.get(3)?,
            calories: row.get(4)?,
            protein: row.get(5)?,
            carbs: row.get(6)?,
            fat: row.get(7)?,
            timestamp: decode_timestamp(
                FOOD_ENTRIES.name,
                "timestamp",
                row.get::<_, Option<String>>(8)?,
            )?,
            meal_type: row.get(9)?,
        })
    }
}
