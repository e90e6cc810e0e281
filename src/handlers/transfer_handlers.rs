//! Endpoints behind the links handed out by the batch API ("basic" adapter).
//! Every request must present a valid link signature; bodies are streamed
//! to and from `ContentStore` without buffering.

use crate::{
    errors::AppError,
    models::batch::Action,
    services::{link_issuer::SignedLinkIssuer, storage_service::StoreError},
    state::AppState,
};
use axum::{
    Json,
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use futures::StreamExt;
use serde::Deserialize;
use std::io;
use tokio_util::io::ReaderStream;
use tracing::{info, warn};

/// Query parameters carried by every issued link.
#[derive(Debug, Deserialize)]
pub struct LinkQuery {
    pub expires: Option<i64>,
    pub signature: Option<String>,
}

/// Body the client posts to a verify link.
#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub oid: String,
    pub size: i64,
}

fn check_link(
    state: &AppState,
    action: Action,
    (namespace, repo, oid): (&str, &str, &str),
    query: &LinkQuery,
) -> Result<(), AppError> {
    let path = SignedLinkIssuer::object_path(namespace, repo, oid, action);
    state.links.verify(
        action,
        &path,
        query.expires,
        query.signature.as_deref(),
        Utc::now(),
    )?;
    Ok(())
}

/// `PUT /{namespace}/{repo}/objects/{oid}` — store object content.
pub async fn upload_object(
    State(state): State<AppState>,
    Path((namespace, repo, oid)): Path<(String, String, String)>,
    Query(query): Query<LinkQuery>,
    headers: HeaderMap,
    body: Body,
) -> Result<impl IntoResponse, AppError> {
    check_link(&state, Action::Upload, (&namespace, &repo, &oid), &query)?;

    let expected_size = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<i64>().ok());

    let stream = body
        .into_data_stream()
        .map(|chunk| chunk.map_err(io::Error::other));

    let size = state
        .content
        .write_stream(&oid, expected_size, stream)
        .await?;
    state.meta.put(&oid, size).await?;

    info!("stored object {} ({} bytes) for {}/{}", oid, size, namespace, repo);
    Ok(StatusCode::OK)
}

/// `GET /{namespace}/{repo}/objects/{oid}` — stream object content.
pub async fn download_object(
    State(state): State<AppState>,
    Path((namespace, repo, oid)): Path<(String, String, String)>,
    Query(query): Query<LinkQuery>,
) -> Result<Response, AppError> {
    check_link(&state, Action::Download, (&namespace, &repo, &oid), &query)?;

    state.meta.get(&oid).await?;
    let (file, len) = state.content.open(&oid).await?;
    let body = Body::from_stream(ReaderStream::new(file));

    let mut response = Response::new(body);
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    Ok(response)
}

/// `POST /{namespace}/{repo}/objects/{oid}/verify` — confirm an object is
/// fully stored with the size the client expects.
pub async fn verify_object(
    State(state): State<AppState>,
    Path((namespace, repo, oid)): Path<(String, String, String)>,
    Query(query): Query<LinkQuery>,
    Json(request): Json<VerifyRequest>,
) -> Result<impl IntoResponse, AppError> {
    check_link(&state, Action::Verify, (&namespace, &repo, &oid), &query)?;

    if request.oid != oid {
        return Err(AppError::unprocessable(format!(
            "body oid `{}` does not match link oid `{}`",
            request.oid, oid
        )));
    }

    let record = match state.meta.get(&oid).await {
        Ok(record) => {
            if !state.content.exists(&oid).await? {
                return Err(AppError::not_found(format!("content for `{}` is missing", oid)));
            }
            record
        }
        // Content landed but its record did not; the file was hash-checked
        // on the way in, so its length is authoritative.
        Err(StoreError::NotFound(_)) => {
            let (_, len) = state.content.open(&oid).await?;
            let size = i64::try_from(len)
                .map_err(|_| AppError::internal(format!("object `{}` is too large", oid)))?;
            warn!("restoring missing metadata for {} ({} bytes)", oid, size);
            state.meta.put(&oid, size).await?
        }
        Err(err) => return Err(err.into()),
    };
    if record.size != request.size {
        return Err(AppError::unprocessable(format!(
            "size mismatch: stored {} bytes, client expects {}",
            record.size, request.size
        )));
    }

    Ok(StatusCode::OK)
}
