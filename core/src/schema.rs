use std::fmt;
use std::fmt::Write as _;

use rusqlite::{Connection, OptionalExtension, params};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::error::StoreError;

/// Storage class of a column. The schema only uses the three scalar
/// affinities; booleans and timestamps are stored as INTEGER and TEXT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Real,
    Text,
}

impl ColumnType {
    pub(crate) fn as_sql(self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
            ColumnType::Text => "TEXT",
        }
    }
}

/// Declared shape of one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: &'static str,
    pub ty: ColumnType,
    pub not_null: bool,
    /// Primary key columns are rowid-backed and auto-assigned.
    pub pk: bool,
}

const fn key(name: &'static str) -> ColumnDef {
    ColumnDef {
        name,
        ty: ColumnType::Integer,
        not_null: true,
        pk: true,
    }
}

const fn column(name: &'static str, ty: ColumnType) -> ColumnDef {
    ColumnDef {
        name,
        ty,
        not_null: true,
        pk: false,
    }
}

/// Declared shape of one table: the registry entry the opened database
/// is checked against, and the source of all generated SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableDef {
    pub name: &'static str,
    pub columns: &'static [ColumnDef],
}

pub const FOODS: TableDef = TableDef {
    name: "foods",
    columns: &[
        key("id"),
        column("name", ColumnType::Text),
        column("calories", ColumnType::Integer),
        column("protein", ColumnType::Real),
        column("carbs", ColumnType::Real),
        column("fat", ColumnType::Real),
        column("servingSize", ColumnType::Real),
        column("servingUnit", ColumnType::Text),
    ],
};

pub const FOOD_ENTRIES: TableDef = TableDef {
    name: "food_entries",
    columns: &[
        key("id"),
        column("foodId", ColumnType::Integer),
        column("foodName", ColumnType::Text),
        column("servings", ColumnType::Real),
        column("calories", ColumnType::Integer),
        column("protein", ColumnType::Real),
        column("carbs", ColumnType::Real),
        column("fat", ColumnType::Real),
        column("timestamp", ColumnType::Text),
        column("mealType", ColumnType::Text),
    ],
};

pub(crate) const TABLES: &[&TableDef] = &[&FOODS, &FOOD_ENTRIES];

/// Pins the recognized schema shape. Append-only: bumping it requires
/// a migration path, which this layer deliberately does not provide.
pub const SCHEMA_VERSION: i64 = 1;

/// Bookkeeping table pinning the schema shape the database was created
/// with. One row, id = 1, holding the identity hash.
const STAMP_DDL: &str =
    "CREATE TABLE IF NOT EXISTS schema_stamp (id INTEGER PRIMARY KEY NOT NULL, identity_hash TEXT NOT NULL)";

impl TableDef {
    pub(crate) fn create_sql(&self) -> String {
        let cols = self
            .columns
            .iter()
            .map(|c| {
                if c.pk {
                    format!("`{}` INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL", c.name)
                } else if c.not_null {
                    format!("`{}` {} NOT NULL", c.name, c.ty.as_sql())
                } else {
                    format!("`{}` {}", c.name, c.ty.as_sql())
                }
            })
            .collect::<Vec<_>>()
            .join(", ");
        format!("CREATE TABLE IF NOT EXISTS `{}` ({cols})", self.name)
    }

    /// Canonical one-line description fed into the identity hash.
    fn canonical(&self) -> String {
        let mut out = format!("{}(", self.name);
        for (i, c) in self.columns.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            let _ = write!(
                out,
                "{}:{}:{}:{}",
                c.name,
                c.ty.as_sql(),
                i64::from(c.not_null),
                i64::from(c.pk)
            );
        }
        out.push(')');
        out
    }

    fn expected_info(&self) -> Vec<ColumnInfo> {
        self.columns
            .iter()
            .map(|c| ColumnInfo {
                name: c.name.to_string(),
                ty: c.ty.as_sql().to_string(),
                not_null: c.not_null,
                pk: i64::from(c.pk),
            })
            .collect()
    }
}

/// Hex sha256 over the canonical shape of every registered table.
/// Stored in `schema_stamp` at creation and compared at every open.
pub fn identity_hash() -> String {
    let mut canon = String::new();
    for table in TABLES {
        canon.push_str(&table.canonical());
        canon.push(';');
    }
    let digest = Sha256::digest(canon.as_bytes());
    digest.iter().fold(String::with_capacity(64), |mut acc, b| {
        let _ = write!(acc, "{b:02x}");
        acc
    })
}

/// One column as observed via `PRAGMA table_info` (or as expected by
/// the registry, normalized to the same shape for diffing).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub ty: String,
    pub not_null: bool,
    /// Position within the primary key, 0 if not part of it.
    pub pk: i64,
}

impl fmt::Display for ColumnInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "`{}` {}", self.name, self.ty)?;
        if self.not_null {
            write!(f, " NOT NULL")?;
        }
        if self.pk > 0 {
            write!(f, " PRIMARY KEY")?;
        }
        Ok(())
    }
}

/// Structured difference between the compiled registry and the opened
/// database. Returned inside [`StoreError::SchemaMismatch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaDiff {
    MissingTable {
        table: String,
    },
    TableShape {
        table: String,
        expected: Vec<ColumnInfo>,
        found: Vec<ColumnInfo>,
    },
    IdentityStamp {
        expected: String,
        found: Option<String>,
    },
    Version {
        expected: i64,
        found: i64,
    },
}

impl fmt::Display for SchemaDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaDiff::MissingTable { table } => write!(f, "table `{table}` is missing"),
            SchemaDiff::TableShape {
                table,
                expected,
                found,
            } => {
                let join = |cols: &[ColumnInfo]| {
                    cols.iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join(", ")
                };
                write!(
                    f,
                    "table `{table}` differs: expected [{}], found [{}]",
                    join(expected),
                    join(found)
                )
            }
            SchemaDiff::IdentityStamp { expected, found } => match found {
                Some(found) => {
                    write!(f, "identity stamp differs: expected {expected}, found {found}")
                }
                None => write!(f, "identity stamp missing: expected {expected}"),
            },
            SchemaDiff::Version { expected, found } => {
                write!(f, "schema version differs: expected {expected}, found {found}")
            }
        }
    }
}

/// Create the schema on a fresh database, then validate. Validation
/// also runs after creation: `CREATE TABLE IF NOT EXISTS` leaves
/// pre-existing tables of the same name untouched, and those must not
/// slip through unchecked. Any mismatch is fatal.
pub(crate) fn ensure_schema(conn: &Connection) -> Result<(), StoreError> {
    if !table_exists(conn, "schema_stamp")? {
        create_schema(conn)?;
    }
    validate(conn)
}

fn create_schema(conn: &Connection) -> Result<(), StoreError> {
    let mut ddl = String::new();
    for table in TABLES {
        ddl.push_str(&table.create_sql());
        ddl.push(';');
    }
    ddl.push_str(STAMP_DDL);
    ddl.push(';');
    let _ = write!(ddl, "PRAGMA user_version = {SCHEMA_VERSION};");
    conn.execute_batch(&ddl)?;
    let hash = identity_hash();
    conn.execute(
        "INSERT OR REPLACE INTO schema_stamp (id, identity_hash) VALUES (1, ?1)",
        params![hash],
    )?;
    info!(%hash, "created fresh schema");
    Ok(())
}

/// Compare the opened database against the registry: per-table shape
/// via `PRAGMA table_info`, then the stored identity stamp.
pub fn validate(conn: &Connection) -> Result<(), StoreError> {
    for table in TABLES {
        if !table_exists(conn, table.name)? {
            return Err(SchemaDiff::MissingTable {
                table: table.name.to_string(),
            }
            .into());
        }
        let found = table_info(conn, table.name)?;
        let expected = table.expected_info();
        if found != expected {
            return Err(SchemaDiff::TableShape {
                table: table.name.to_string(),
                expected,
                found,
            }
            .into());
        }
    }

    let version: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    if version != SCHEMA_VERSION {
        return Err(SchemaDiff::Version {
            expected: SCHEMA_VERSION,
            found: version,
        }
        .into());
    }

    let expected = identity_hash();
    let stored: Option<String> = conn
        .query_row(
            "SELECT identity_hash FROM schema_stamp WHERE id = 1",
            [],
            |row| row.get(0),
        )
        .optional()?;
    if stored.as_deref() == Some(expected.as_str()) {
        debug!("schema validated");
        Ok(())
    } else {
        Err(SchemaDiff::IdentityStamp {
            expected,
            found: stored,
        }
        .into())
    }
}

fn table_exists(conn: &Connection, name: &str) -> Result<bool, StoreError> {
    let found: Option<String> = conn
        .query_row(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![name],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

fn table_info(conn: &Connection, name: &str) -> Result<Vec<ColumnInfo>, StoreError> {
    let mut columns = Vec::new();
    conn.pragma(None, "table_info", name, |row| {
        columns.push(ColumnInfo {
            name: row.get(1)?,
            ty: row.get(2)?,
            not_null: row.get::<_, i64>(3)? != 0,
            pk: row.get(5)?,
        });
        Ok(())
    })?;
    Ok(columns)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_sql_foods() {
        let sql = FOODS.create_sql();
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS `foods`"));
        assert!(sql.contains("`id` INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL"));
        assert!(sql.contains("`servingSize` REAL NOT NULL"));
        assert!(sql.contains("`servingUnit` TEXT NOT NULL"));
    }

    #[test]
    fn test_identity_hash_is_stable() {
        assert_eq!(identity_hash(), identity_hash());
        assert_eq!(identity_hash().len(), 64);
    }

    #[test]
    fn test_ensure_then_validate_roundtrip() {
        let conn = Connection::open_in_memory().unwrap();
        ensure_schema(&conn).unwrap();
        validate(&conn).unwrap();
        // Idempotent: a second ensure on an already-stamped db validates.
        ensure_schema(&conn).unwrap();
    }

    #[test]
    fn test_ensure_rejects_preexisting_foreign_table() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE foods (id INTEGER PRIMARY KEY, label TEXT)")
            .unwrap();
        let err = ensure_schema(&conn).unwrap_err();
        assert!(matches!(err, StoreError::SchemaMismatch(_)));
    }

    #[test]
    fn test_validate_rejects_missing_table() {
        let conn = Connection::open_in_memory().unwrap();
        ensure_schema(&conn).unwrap();
        conn.execute_batch("DROP TABLE food_entries").unwrap();
        let err = validate(&conn).unwrap_err();
        match err {
            StoreError::SchemaMismatch(diff) => {
                assert_eq!(
                    *diff,
                    SchemaDiff::MissingTable {
                        table: "food_entries".to_string()
                    }
                );
            }
            other => panic!("expected schema mismatch, got {other}"),
        }
    }

    #[test]
    fn test_validate_reports_shape_diff() {
        let conn = Connection::open_in_memory().unwrap();
        ensure_schema(&conn).unwrap();
        conn.execute_batch(
            "DROP TABLE foods;
             CREATE TABLE foods (id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL, name TEXT NOT NULL)",
        )
        .unwrap();
        let err = validate(&conn).unwrap_err();
        match err {
            StoreError::SchemaMismatch(diff) => match *diff {
                SchemaDiff::TableShape {
                    table,
                    expected,
                    found,
                } => {
                    assert_eq!(table, "foods");
                    assert_eq!(expected.len(), 8);
                    assert_eq!(found.len(), 2);
                }
                other => panic!("expected table shape diff, got {other}"),
            },
            other => panic!("expected schema mismatch, got {other}"),
        }
    }

    #[test]
    fn test_validate_rejects_version_mismatch() {
        let conn = Connection::open_in_memory().unwrap();
        ensure_schema(&conn).unwrap();
        conn.execute_batch("PRAGMA user_version = 99").unwrap();
        let err = validate(&conn).unwrap_err();
        assert!(matches!(
            err,
            StoreError::SchemaMismatch(ref diff)
                if matches!(**diff, SchemaDiff::Version { expected: SCHEMA_VERSION, found: 99 })
        ));
    }

    #[test]
    fn test_validate_rejects_stamp_mismatch() {
        let conn = Connection::open_in_memory().unwrap();
        ensure_schema(&conn).unwrap();
        conn.execute(
            "UPDATE schema_stamp SET identity_hash = 'deadbeef' WHERE id = 1",
            [],
        )
        .unwrap();
        let err = validate(&conn).unwrap_err();
        assert!(matches!(
            err,
            StoreError::SchemaMismatch(ref diff) if matches!(**diff, SchemaDiff::IdentityStamp { .. })
        ));
    }
}
