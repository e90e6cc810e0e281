//! Represents the metadata record of an uploaded LFS object.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A single object known to the metadata store.
///
/// The record says nothing about whether the bytes are still on disk; the
/// content store is consulted separately for that.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq, Eq)]
pub struct LfsObject {
    /// Lowercase hex SHA-256 of the object content.
    pub oid: String,

    /// Size in bytes as recorded at upload time.
    pub size: i64,

    /// When the upload completed.
    pub created_at: DateTime<Utc>,
}
