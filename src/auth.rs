//! Builds the per-request `AuthContext` from HTTP Basic credentials.
//!
//! Credentials are assumed to have been checked by whatever fronts the
//! service; only the user name is kept. Requests without usable
//! credentials get no context, and their objects resolve to `Forbidden`.

use crate::models::batch::AuthContext;
use axum::http::{HeaderMap, header::AUTHORIZATION};
use base64::{Engine as _, engine::general_purpose};

pub fn auth_context(headers: &HeaderMap, namespace: &str, repo: &str) -> Option<AuthContext> {
    let principal = basic_principal(headers)?;
    Some(AuthContext::new(principal, namespace, repo))
}

fn basic_principal(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = general_purpose::STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, _password) = decoded.split_once(':')?;
    if user.is_empty() {
        None
    } else {
        Some(user.to_string())
    }
}
