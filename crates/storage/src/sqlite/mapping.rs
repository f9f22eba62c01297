use serde::Serialize;
use serde::de::DeserializeOwned;
use sqlx::Row;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

/// Encode a document for the `document` column.
pub(crate) fn to_document<T: Serialize>(value: &T) -> Result<String, StorageError> {
    serde_json::to_string(value).map_err(ser)
}

/// Decode the `document` column of a row.
pub(crate) fn from_document<T: DeserializeOwned>(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<T, StorageError> {
    let raw: String = row.try_get("document").map_err(ser)?;
    serde_json::from_str(&raw).map_err(ser)
}

/// `SQLite` reports primary key violations as database errors with this code.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.is_unique_violation(),
        _ => false,
    }
}
