//! Defines routes for the Git LFS batch API and its transfer endpoints.
//!
//! ## Structure
//! - **Batch API**
//!   - `POST /{namespace}/{repo}/info/lfs/objects/batch` — negotiate transfers
//!
//! - **Transfer endpoints** (targets of issued links)
//!   - `PUT  /{namespace}/{repo}/objects/{oid}` — upload content
//!   - `GET  /{namespace}/{repo}/objects/{oid}` — download content
//!   - `POST /{namespace}/{repo}/objects/{oid}/verify` — confirm stored content
//!
//! - **Probes**
//!   - `GET /healthz`, `GET /readyz`

use crate::{
    handlers::{
        batch_handlers::batch,
        health_handlers::{healthz, readyz},
        transfer_handlers::{download_object, upload_object, verify_object},
    },
    state::AppState,
};
use axum::{
    Router,
    routing::{get, post, put},
};

/// Build the router. Shared state (`AppState`) is attached by the caller.
pub fn routes() -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/{namespace}/{repo}/info/lfs/objects/batch", post(batch))
        .route(
            "/{namespace}/{repo}/objects/{oid}",
            put(upload_object).get(download_object),
        )
        .route("/{namespace}/{repo}/objects/{oid}/verify", post(verify_object))
}
