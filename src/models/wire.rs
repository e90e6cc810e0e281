//! JSON shapes of the Git LFS Batch API.

use crate::models::batch::Action;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Media type of the object payloads themselves.
pub const CONTENT_MEDIA_TYPE: &str = "application/vnd.git-lfs";

/// Media type of batch requests and responses.
pub const BATCH_MEDIA_TYPE: &str = "application/vnd.git-lfs+json";

/// `POST .../info/lfs/objects/batch` request body.
#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    pub operation: String,
    #[serde(default)]
    pub transfers: Vec<String>,
    #[serde(default, rename = "ref")]
    pub git_ref: Option<GitRef>,
    pub objects: Vec<ObjectSpec>,
}

#[derive(Debug, Deserialize)]
pub struct GitRef {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct ObjectSpec {
    pub oid: String,
    pub size: i64,
}

/// Successful batch response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct BatchResponse {
    pub transfer: String,
    pub objects: Vec<ResponseObject>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ResponseObject {
    pub oid: String,
    pub size: i64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub actions: BTreeMap<Action, WireLink>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<WireError>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WireLink {
    pub href: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub header: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WireError {
    pub code: u16,
    pub message: String,
}

/// Body of a rejected batch request.
///
/// `objects` is always present and empty so clients parsing the batch shape
/// see a well-formed document with nothing processed.
#[derive(Debug, Serialize, Deserialize)]
pub struct BatchErrorBody {
    pub message: String,
    pub request_id: String,
    pub objects: Vec<ResponseObject>,
}
