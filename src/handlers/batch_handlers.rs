//! `POST /{namespace}/{repo}/info/lfs/objects/batch`
//!
//! Translates between the wire format and the engine model. The engine never
//! sees HTTP; this module never decides anything about objects.

use crate::{
    auth,
    handlers::lfs_json::LfsJson,
    models::{
        batch::{AuthContext, BatchOperation, BatchOutcome, ObjectDescriptor},
        wire::{BatchRequest, BatchResponse, ResponseObject, WireError, WireLink},
    },
    services::batch_service::BatchError,
    state::AppState,
};
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::debug;

/// A batch request after validation, ready for the engine.
#[derive(Debug)]
pub struct ParsedBatch {
    pub operation: BatchOperation,
    pub transfers: Vec<String>,
    pub ref_name: Option<String>,
    pub objects: Vec<ObjectDescriptor>,
}

pub async fn batch(
    State(state): State<AppState>,
    Path((namespace, repo)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, BatchError> {
    let auth = auth::auth_context(&headers, &namespace, &repo);
    let request = parse_batch_request(&body, auth)?;
    debug!(
        operation = %request.operation,
        objects = request.objects.len(),
        git_ref = request.ref_name.as_deref().unwrap_or("-"),
        "batch request for {}/{}",
        namespace,
        repo
    );

    let negotiation = state.batch.negotiate(
        request.operation,
        &request.transfers,
        request.objects,
        &state.shutdown,
    );
    let outcome = tokio::time::timeout(state.batch_timeout, negotiation)
        .await
        .map_err(|_| BatchError::TimedOut(state.batch_timeout))??;

    Ok(LfsJson(StatusCode::OK, batch_response(outcome)).into_response())
}

/// Decode a raw request body. Every object receives a copy of `auth`.
pub fn parse_batch_request(
    body: &[u8],
    auth: Option<AuthContext>,
) -> Result<ParsedBatch, BatchError> {
    let request: BatchRequest = serde_json::from_slice(body)
        .map_err(|err| BatchError::MalformedRequest(err.to_string()))?;

    let operation = BatchOperation::parse(&request.operation).ok_or_else(|| {
        BatchError::MalformedRequest(format!("unknown operation `{}`", request.operation))
    })?;

    let objects = request
        .objects
        .into_iter()
        .map(|spec| ObjectDescriptor {
            oid: spec.oid,
            size: spec.size,
            auth: auth.clone(),
        })
        .collect();

    Ok(ParsedBatch {
        operation,
        transfers: request.transfers,
        ref_name: request.git_ref.map(|r| r.name),
        objects,
    })
}

pub fn batch_response(outcome: BatchOutcome) -> BatchResponse {
    let objects = outcome
        .objects
        .into_iter()
        .map(|object| ResponseObject {
            oid: object.oid,
            size: object.size,
            actions: object
                .actions
                .into_iter()
                .map(|(action, link)| {
                    (
                        action,
                        WireLink {
                            href: link.href,
                            header: link.headers,
                            expires_at: link.expires_at,
                        },
                    )
                })
                .collect(),
            error: object.error.map(|err| WireError {
                code: err.code(),
                message: err.message,
            }),
        })
        .collect();

    BatchResponse {
        transfer: outcome.transfer,
        objects,
    }
}
