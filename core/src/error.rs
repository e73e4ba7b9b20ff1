use thiserror::Error;

use crate::schema::SchemaDiff;

/// Errors surfaced by the storage layer.
///
/// Every failure propagates to the caller; the only deliberately
/// swallowed case is an `update` against an id that no longer exists,
/// which completes as a no-op (matching the write statement contract).
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying engine failure (I/O, disk full, constraint, corruption).
    /// Write transactions roll back fully before this is returned.
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// A stored row does not satisfy the domain model's required-field
    /// contract, e.g. a null or unparseable timestamp.
    #[error("data integrity error in {table}.{column}: {reason}")]
    DataIntegrity {
        table: &'static str,
        column: &'static str,
        reason: String,
    },

    /// The opened database does not match the compiled schema registry.
    /// Fatal at open time; the store is never handed out in this state.
    #[error("schema mismatch: {0}")]
    SchemaMismatch(Box<SchemaDiff>),

    /// A blocking database task failed to run to completion.
    #[error("background task failed: {0}")]
    Runtime(#[from] tokio::task::JoinError),
}

impl From<SchemaDiff> for StoreError {
    fn from(diff: SchemaDiff) -> Self {
        StoreError::SchemaMismatch(Box::new(diff))
    }
}
