//! Shared application state handed to every handler.

use crate::services::{
    batch_service::BatchService,
    existence::StoreExistenceChecker,
    link_issuer::SignedLinkIssuer,
    storage_service::{ContentStore, MetaStore},
};
use std::{sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct AppState {
    pub batch: BatchService,
    pub meta: MetaStore,
    pub content: ContentStore,
    pub links: Arc<SignedLinkIssuer>,
    /// Cancelled on shutdown; aborts batches still being negotiated.
    pub shutdown: CancellationToken,
    pub batch_timeout: Duration,
}

impl AppState {
    /// Wire the batch engine to the service's own stores and issuer.
    pub fn new(
        meta: MetaStore,
        content: ContentStore,
        links: SignedLinkIssuer,
        concurrency: usize,
        batch_timeout: Duration,
    ) -> Self {
        let links = Arc::new(links);
        let checker = Arc::new(StoreExistenceChecker::new(meta.clone(), content.clone()));
        let batch = BatchService::new(checker, links.clone(), concurrency);

        Self {
            batch,
            meta,
            content,
            links,
            shutdown: CancellationToken::new(),
            batch_timeout,
        }
    }

    /// Replace the batch engine, e.g. with one using different collaborators.
    pub fn with_batch_service(mut self, batch: BatchService) -> Self {
        self.batch = batch;
        self
    }
}
