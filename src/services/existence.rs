//! Existence checks against the metadata and content stores.

use crate::{
    models::batch::ExistenceResult,
    services::storage_service::{ContentStore, MetaStore, StoreError},
};
use async_trait::async_trait;

/// Reports whether an object is known to each store.
///
/// An `Err` means a store could not be reached; it is never used to signal
/// absence.
#[async_trait]
pub trait ExistenceChecker: Send + Sync {
    async fn check(&self, oid: &str) -> Result<ExistenceResult, StoreError>;
}

/// Checker backed by the service's own stores.
#[derive(Clone)]
pub struct StoreExistenceChecker {
    meta: MetaStore,
    content: ContentStore,
}

impl StoreExistenceChecker {
    pub fn new(meta: MetaStore, content: ContentStore) -> Self {
        Self { meta, content }
    }
}

#[async_trait]
impl ExistenceChecker for StoreExistenceChecker {
    async fn check(&self, oid: &str) -> Result<ExistenceResult, StoreError> {
        let (meta_exists, content_exists) =
            tokio::try_join!(self.meta.exists(oid), self.content.exists(oid))?;
        Ok(ExistenceResult {
            meta_exists,
            content_exists,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use futures::stream;
    use sha2::{Digest, Sha256};
    use sqlx::sqlite::SqlitePoolOptions;
    use std::{io, sync::Arc};

    #[tokio::test]
    async fn reports_each_store_independently() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let meta = MetaStore::new(Arc::new(pool));
        meta.migrate().await.unwrap();
        let dir = tempfile::tempdir().unwrap();
        let content = ContentStore::new(dir.path());
        let checker = StoreExistenceChecker::new(meta.clone(), content.clone());

        let meta_only = format!("{:x}", Sha256::digest(b"meta only"));
        meta.put(&meta_only, 9).await.unwrap();

        let data = b"content only";
        let content_only = format!("{:x}", Sha256::digest(data));
        content
            .write_stream(
                &content_only,
                None,
                stream::iter(vec![Ok::<_, io::Error>(Bytes::from_static(data))]),
            )
            .await
            .unwrap();

        assert_eq!(
            checker.check(&meta_only).await.unwrap(),
            ExistenceResult {
                meta_exists: true,
                content_exists: false
            }
        );
        assert_eq!(
            checker.check(&content_only).await.unwrap(),
            ExistenceResult {
                meta_exists: false,
                content_exists: true
            }
        );
        assert_eq!(
            checker.check(&"0".repeat(64)).await.unwrap(),
            ExistenceResult::default()
        );
    }
}
