//! Request-scoped model used by the batch negotiation engine.
//!
//! Nothing here is persisted: descriptors are built from the wire request,
//! evaluated, turned into outcomes and dropped once the response is written.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt};

/// Client intent for a whole batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOperation {
    Upload,
    Download,
}

impl BatchOperation {
    /// Parse the wire spelling (`"upload"` / `"download"`).
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "upload" => Some(Self::Upload),
            "download" => Some(Self::Download),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::Download => "download",
        }
    }
}

impl fmt::Display for BatchOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity attached to each object by the authentication layer.
///
/// Credentials are taken as already verified; this only records who is
/// asking and which repository the request targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    /// Authenticated user name.
    pub principal: String,

    /// Owner segment of the repository path.
    pub namespace: String,

    /// Repository name.
    pub repo: String,
}

impl AuthContext {
    pub fn new(
        principal: impl Into<String>,
        namespace: impl Into<String>,
        repo: impl Into<String>,
    ) -> Self {
        Self {
            principal: principal.into(),
            namespace: namespace.into(),
            repo: repo.into(),
        }
    }

    /// True when the principal owns the repository namespace.
    pub fn owns_namespace(&self) -> bool {
        self.principal == self.namespace
    }
}

/// One object the client wants to transfer.
///
/// `size` stays signed so a negative value can be reported per object
/// instead of failing the whole request at parse time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectDescriptor {
    pub oid: String,
    pub size: i64,
    pub auth: Option<AuthContext>,
}

/// Presence of an object in the two independent stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExistenceResult {
    pub meta_exists: bool,
    pub content_exists: bool,
}

/// Transfer action a client must perform for one object.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Upload,
    Download,
    /// Content is already present; the client only confirms it.
    Verify,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::Download => "download",
            Self::Verify => "verify",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An issued transfer link. Immutable once handed out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub href: String,
    pub headers: BTreeMap<String, String>,
    /// `None` for links that never expire.
    pub expires_at: Option<DateTime<Utc>>,
}

/// Why a single object could not be given an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectErrorKind {
    InvalidSize,
    InvalidOid,
    ObjectNotFound,
    ContentMissing,
    Forbidden,
    StoreUnavailable,
}

impl ObjectErrorKind {
    /// HTTP-style code reported in the object's `error` entry.
    pub fn code(&self) -> u16 {
        match self {
            Self::InvalidSize | Self::InvalidOid | Self::ContentMissing => 422,
            Self::ObjectNotFound => 404,
            Self::Forbidden => 403,
            Self::StoreUnavailable => 503,
        }
    }
}

/// Structured per-object error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectError {
    pub kind: ObjectErrorKind,
    pub message: String,
}

impl ObjectError {
    pub fn new(kind: ObjectErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn code(&self) -> u16 {
        self.kind.code()
    }
}

impl fmt::Display for ObjectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.code())
    }
}

/// Result of evaluating one descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectOutcome {
    pub oid: String,
    pub size: i64,
    pub actions: BTreeMap<Action, Link>,
    pub error: Option<ObjectError>,
}

impl ObjectOutcome {
    pub fn with_actions(descriptor: ObjectDescriptor, actions: BTreeMap<Action, Link>) -> Self {
        Self {
            oid: descriptor.oid,
            size: descriptor.size,
            actions,
            error: None,
        }
    }

    pub fn failed(descriptor: ObjectDescriptor, error: ObjectError) -> Self {
        Self {
            oid: descriptor.oid,
            size: descriptor.size,
            actions: BTreeMap::new(),
            error: Some(error),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Outcome of a whole batch, positionally aligned with the request objects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Transfer adapter negotiated once for the batch.
    pub transfer: String,
    pub objects: Vec<ObjectOutcome>,
}
