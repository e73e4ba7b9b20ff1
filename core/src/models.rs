use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Sentinel id for records not yet persisted. The insert statement maps
/// it to NULL so the engine assigns a fresh rowid (always >= 1).
pub const UNASSIGNED_ID: i64 = 0;

/// A food known to the catalog. Nutrition values are per serving.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Food {
    pub id: i64,
    pub name: String,
    pub calories: i64,
    /// Grams of protein per serving.
    pub protein: f64,
    /// Grams of carbohydrate per serving.
    pub carbs: f64,
    /// Grams of fat per serving.
    pub fat: f64,
    pub serving_size: f64,
    pub serving_unit: String,
}

/// One logged consumption of a food.
///
/// `food_name` and the macro fields are a point-in-time snapshot taken
/// when the entry was logged. `food_id` is intentionally not a foreign
/// key: editing or deleting the source [`Food`] must not alter history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoodEntry {
    pub id: i64,
    pub food_id: i64,
    pub food_name: String,
    pub servings: f64,
    pub calories: i64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
    pub timestamp: NaiveDateTime,
    /// Free-form tag, conventionally breakfast/lunch/dinner/snack.
    pub meal_type: String,
}
