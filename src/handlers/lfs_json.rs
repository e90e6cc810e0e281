//! JSON responses in the Git LFS media type.

use crate::models::wire::BATCH_MEDIA_TYPE;
use axum::{
    body::Body,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// Like `axum::Json`, but labelled `application/vnd.git-lfs+json`.
pub struct LfsJson<T>(pub StatusCode, pub T);

impl<T: Serialize> IntoResponse for LfsJson<T> {
    fn into_response(self) -> Response {
        let bytes = match serde_json::to_vec(&self.1) {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::error!("failed to encode LFS response: {}", err);
                return (StatusCode::INTERNAL_SERVER_ERROR, "response encoding failed")
                    .into_response();
            }
        };

        let mut response = Response::new(Body::from(bytes));
        *response.status_mut() = self.0;
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(BATCH_MEDIA_TYPE),
        );
        response
    }
}
