//! src/services/storage_service.rs
//!
//! Metadata and content stores for LFS objects. `MetaStore` records uploads
//! in SQLite; `ContentStore` keeps the raw bytes on local disk sharded
//! beneath `base_path/{oid[0..2]}/{oid[2..4]}/{oid}`. The two stores are
//! independent and may disagree about an object.

use crate::models::object::LfsObject;
use bytes::Bytes;
use chrono::Utc;
use futures::{Stream, StreamExt, pin_mut};
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

/// Length of a hex-encoded SHA-256 oid.
pub const OID_HEX_LEN: usize = 64;

const SCHEMA_SQL: &str = include_str!("../../migrations/0001_init.sql");

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object `{0}` not found")]
    NotFound(String),
    #[error("invalid object id `{0}`")]
    InvalidOid(String),
    #[error("content hash mismatch: expected `{expected}`, got `{actual}`")]
    HashMismatch { expected: String, actual: String },
    #[error("size mismatch for `{oid}`: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        oid: String,
        expected: i64,
        actual: i64,
    },
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Whether `oid` looks like a lowercase hex SHA-256 digest.
pub fn is_valid_oid(oid: &str) -> bool {
    oid.len() == OID_HEX_LEN && oid.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

fn ensure_oid_valid(oid: &str) -> StoreResult<()> {
    if is_valid_oid(oid) {
        Ok(())
    } else {
        Err(StoreError::InvalidOid(oid.to_string()))
    }
}

/// SQLite-backed object metadata.
#[derive(Clone)]
pub struct MetaStore {
    /// Shared SQLite connection pool.
    pub db: Arc<SqlitePool>,
}

impl MetaStore {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Apply the bundled schema. Safe to run repeatedly.
    ///
    /// Returns the number of statements executed.
    pub async fn migrate(&self) -> StoreResult<usize> {
        let statements = SCHEMA_SQL
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        for stmt in &statements {
            debug!("Executing migration SQL: {}", stmt);
            sqlx::query(stmt).execute(&*self.db).await?;
        }

        Ok(statements.len())
    }

    /// Lightweight connectivity check.
    pub async fn ping(&self) -> StoreResult<()> {
        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&*self.db)
            .await?;
        Ok(())
    }

    pub async fn exists(&self, oid: &str) -> StoreResult<bool> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(1) FROM lfs_objects WHERE oid = ?")
            .bind(oid)
            .fetch_one(&*self.db)
            .await?;
        Ok(count > 0)
    }

    pub async fn get(&self, oid: &str) -> StoreResult<LfsObject> {
        sqlx::query_as::<_, LfsObject>(
            "SELECT oid, size, created_at FROM lfs_objects WHERE oid = ?",
        )
        .bind(oid)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => StoreError::NotFound(oid.to_string()),
            other => StoreError::Sqlx(other),
        })
    }

    /// Record an uploaded object, replacing any earlier record for the oid.
    pub async fn put(&self, oid: &str, size: i64) -> StoreResult<LfsObject> {
        ensure_oid_valid(oid)?;
        let record = sqlx::query_as::<_, LfsObject>(
            r#"
            INSERT INTO lfs_objects (oid, size, created_at) VALUES (?, ?, ?)
            ON CONFLICT(oid) DO UPDATE SET
                size = excluded.size,
                created_at = excluded.created_at
            RETURNING oid, size, created_at
            "#,
        )
        .bind(oid)
        .bind(size)
        .bind(Utc::now())
        .fetch_one(&*self.db)
        .await?;
        Ok(record)
    }
}

/// Local-disk object content.
#[derive(Clone)]
pub struct ContentStore {
    /// Base directory on disk where object payloads are stored.
    pub base_path: PathBuf,
}

impl ContentStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Path of an object payload. Parent directories may not exist yet.
    ///
    /// Callers must have validated `oid`; the shard segments index into it.
    pub fn object_path(&self, oid: &str) -> PathBuf {
        let mut path = self.base_path.clone();
        path.push(&oid[0..2]);
        path.push(&oid[2..4]);
        path.push(oid);
        path
    }

    pub async fn exists(&self, oid: &str) -> StoreResult<bool> {
        ensure_oid_valid(oid)?;
        match fs::metadata(self.object_path(oid)).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(StoreError::Io(err)),
        }
    }

    /// Open an object for streaming out. Returns the handle and its length.
    pub async fn open(&self, oid: &str) -> StoreResult<(File, u64)> {
        ensure_oid_valid(oid)?;
        let file = File::open(self.object_path(oid)).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                StoreError::NotFound(oid.to_string())
            } else {
                StoreError::Io(err)
            }
        })?;
        let len = file.metadata().await?.len();
        Ok((file, len))
    }

    /// Stream an upload to disk.
    ///
    /// Bytes go to a temporary file while their SHA-256 is computed; the file
    /// is only renamed into place once the digest matches `oid` (and the
    /// length matches `expected_size`, when given). Returns the byte count.
    pub async fn write_stream<S>(
        &self,
        oid: &str,
        expected_size: Option<i64>,
        stream: S,
    ) -> StoreResult<i64>
    where
        S: Stream<Item = io::Result<Bytes>> + Send,
    {
        ensure_oid_valid(oid)?;
        let file_path = self.object_path(oid);
        let parent = file_path.parent().map(Path::to_path_buf).ok_or_else(|| {
            StoreError::Io(io::Error::new(
                ErrorKind::Other,
                "object path missing parent directory",
            ))
        })?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));

        let (size, digest) = match spool(&tmp_path, stream).await {
            Ok(written) => written,
            Err(err) => {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(err);
            }
        };
        let actual = format!("{:x}", digest);
        if actual != oid {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StoreError::HashMismatch {
                expected: oid.to_string(),
                actual,
            });
        }
        if let Some(expected) = expected_size.filter(|expected| *expected != size) {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StoreError::SizeMismatch {
                oid: oid.to_string(),
                expected,
                actual: size,
            });
        }

        if let Err(err) = fs::rename(&tmp_path, &file_path).await {
            if err.kind() == ErrorKind::AlreadyExists {
                fs::remove_file(&file_path).await?;
                fs::rename(&tmp_path, &file_path).await?;
            } else {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StoreError::Io(err));
            }
        }

        debug!("stored {} ({} bytes) at {}", oid, size, file_path.display());
        Ok(size)
    }

    /// Best-effort write/read/delete round trip beneath `base_path`.
    pub async fn probe(&self) -> StoreResult<()> {
        fs::create_dir_all(&self.base_path).await?;
        let tmp_path = self.base_path.join(format!(".readyz-{}", Uuid::new_v4()));
        fs::write(&tmp_path, b"readyz").await?;
        let read = fs::read(&tmp_path).await;
        let _ = fs::remove_file(&tmp_path).await;
        if read? != b"readyz" {
            return Err(StoreError::Io(io::Error::new(
                ErrorKind::InvalidData,
                "file content mismatch",
            )));
        }
        Ok(())
    }
}

/// Copy `stream` into a fresh file at `path`, fsync it, and return the
/// byte count with the SHA-256 of what was written.
async fn spool<S>(
    path: &Path,
    stream: S,
) -> StoreResult<(i64, sha2::digest::Output<Sha256>)>
where
    S: Stream<Item = io::Result<Bytes>> + Send,
{
    let mut file = File::create(path).await?;
    let mut size: i64 = 0;
    let mut hasher = Sha256::new();
    pin_mut!(stream);
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        size += chunk.len() as i64;
        hasher.update(&chunk);
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    file.sync_all().await?;
    Ok((size, hasher.finalize()))
}
