//! Server test utilities.
//! Note: #[allow(dead_code)] because each test file compiles common/ separately.

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use base64::{Engine as _, engine::general_purpose};
use lfs_batch::{
    routes,
    services::{
        link_issuer::{LinkPolicy, SignedLinkIssuer},
        storage_service::{ContentStore, MetaStore},
    },
    state::AppState,
};
use serde_json::Value;
use sha2::{Digest, Sha256};
use sqlx::sqlite::SqlitePoolOptions;
use std::{sync::Arc, time::Duration};
use tempfile::TempDir;
use tower::ServiceExt;

pub const PUBLIC_URL: &str = "http://lfs.test";
pub const BATCH_MEDIA_TYPE: &str = "application/vnd.git-lfs+json";

/// A test server wrapper with all dependencies.
#[allow(dead_code)]
pub struct TestServer {
    pub router: Router,
    pub state: AppState,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestServer {
    /// Server over an in-memory SQLite database and a temporary directory.
    pub async fn new() -> Self {
        Self::build(|state| state).await
    }

    /// Like `new`, but lets the caller adjust the state before routing.
    pub async fn build(customize: impl FnOnce(AppState) -> AppState) -> Self {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to open in-memory SQLite");
        let meta = MetaStore::new(Arc::new(pool));
        meta.migrate().await.expect("Failed to migrate");

        let content = ContentStore::new(temp_dir.path().join("objects"));
        let links = SignedLinkIssuer::new(LinkPolicy {
            base_url: PUBLIC_URL.into(),
            secret: b"integration-secret".to_vec(),
            ttl: Some(Duration::from_secs(300)),
        })
        .expect("Failed to build link issuer");

        let state = customize(AppState::new(
            meta,
            content,
            links,
            4,
            Duration::from_secs(5),
        ));
        let router = routes::routes::routes().with_state(state.clone());

        Self {
            router,
            state,
            _temp_dir: temp_dir,
        }
    }

    /// Send a request and return status, content type and raw body.
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Option<String>, Vec<u8>) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, content_type, body.to_vec())
    }

    /// POST a raw body to the batch endpoint of `alice/assets`.
    pub async fn batch_raw(
        &self,
        body: impl Into<Body>,
        user: Option<&str>,
    ) -> (StatusCode, Option<String>, Value) {
        self.batch_raw_at("/alice/assets", body, user).await
    }

    /// POST a raw body to the batch endpoint below `repo_path`, which is
    /// used as-is in the request URI.
    pub async fn batch_raw_at(
        &self,
        repo_path: &str,
        body: impl Into<Body>,
        user: Option<&str>,
    ) -> (StatusCode, Option<String>, Value) {
        let mut builder = Request::builder()
            .method("POST")
            .uri(format!("{}/info/lfs/objects/batch", repo_path))
            .header(header::CONTENT_TYPE, BATCH_MEDIA_TYPE)
            .header(header::ACCEPT, BATCH_MEDIA_TYPE);
        if let Some(user) = user {
            builder = builder.header(header::AUTHORIZATION, basic_auth(user));
        }
        let (status, content_type, body) = self.send(builder.body(body.into()).unwrap()).await;
        let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
        (status, content_type, json)
    }

    /// POST a JSON batch request as `user`.
    pub async fn batch(&self, request: Value, user: Option<&str>) -> (StatusCode, Value) {
        let (status, _, json) = self
            .batch_raw(serde_json::to_vec(&request).unwrap(), user)
            .await;
        (status, json)
    }
}

#[allow(dead_code)]
pub fn basic_auth(user: &str) -> String {
    format!(
        "Basic {}",
        general_purpose::STANDARD.encode(format!("{}:password", user))
    )
}

#[allow(dead_code)]
pub fn oid_of(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

/// Strip the public base URL from an issued href so it can be routed.
#[allow(dead_code)]
pub fn local_uri(href: &str) -> String {
    href.strip_prefix(PUBLIC_URL)
        .expect("href should start with the public URL")
        .to_string()
}
