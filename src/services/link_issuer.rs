//! Signed, expiring transfer links.
//!
//! A link points at one of the "basic" transfer endpoints and carries its
//! own authorization in the query string:
//!
//! ```text
//! {base_url}/{namespace}/{repo}/objects/{oid}[/verify]?expires={unix}&signature={mac}
//! ```
//!
//! `signature` is an HMAC-SHA256 over the action, the decoded path and the
//! expiry, so the transfer endpoints can validate a link without any shared
//! state beyond the secret. Path segments are percent-encoded in the href
//! only; the router hands them back decoded.

use crate::models::{
    batch::{Action, AuthContext, Link},
    wire::{BATCH_MEDIA_TYPE, CONTENT_MEDIA_TYPE},
};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use sha2::Sha256;
use std::{collections::BTreeMap, time::Duration};
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Everything but RFC 3986 unreserved characters.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

#[derive(Debug, Error)]
pub enum IssuanceError {
    #[error("`{principal}` may not {action} objects in `{namespace}/{repo}`")]
    NotPermitted {
        principal: String,
        action: Action,
        namespace: String,
        repo: String,
    },
    #[error("invalid link policy: {0}")]
    InvalidPolicy(String),
}

/// Why a presented link was refused by a transfer endpoint.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LinkRejection {
    #[error("link signature missing")]
    MissingSignature,
    #[error("link signature invalid")]
    BadSignature,
    #[error("link expired")]
    Expired,
}

/// Produces the link for one (object, action) pair.
pub trait LinkIssuer: Send + Sync {
    fn issue(&self, oid: &str, action: Action, auth: &AuthContext) -> Result<Link, IssuanceError>;
}

/// Where links point and how long they live.
#[derive(Clone, Debug)]
pub struct LinkPolicy {
    /// Externally reachable base URL, without a trailing slash.
    pub base_url: String,
    pub secret: Vec<u8>,
    /// `None` issues links that never expire.
    pub ttl: Option<Duration>,
}

/// HMAC-signing issuer used by the server.
#[derive(Clone)]
pub struct SignedLinkIssuer {
    base_url: String,
    ttl: Option<chrono::Duration>,
    mac: HmacSha256,
}

impl SignedLinkIssuer {
    pub fn new(policy: LinkPolicy) -> Result<Self, IssuanceError> {
        if policy.secret.is_empty() {
            return Err(IssuanceError::InvalidPolicy("secret must not be empty".into()));
        }
        let ttl = match policy.ttl {
            Some(ttl) if ttl.as_secs() == 0 => {
                return Err(IssuanceError::InvalidPolicy(
                    "ttl must be at least one second".into(),
                ));
            }
            Some(ttl) => Some(
                chrono::Duration::from_std(ttl)
                    .map_err(|err| IssuanceError::InvalidPolicy(err.to_string()))?,
            ),
            None => None,
        };
        let mac = HmacSha256::new_from_slice(&policy.secret)
            .map_err(|err| IssuanceError::InvalidPolicy(err.to_string()))?;

        Ok(Self {
            base_url: policy.base_url.trim_end_matches('/').to_string(),
            ttl,
            mac,
        })
    }

    /// Path of the transfer endpoint serving `action` for an object.
    pub fn object_path(namespace: &str, repo: &str, oid: &str, action: Action) -> String {
        match action {
            Action::Verify => format!("/{}/{}/objects/{}/verify", namespace, repo, oid),
            Action::Upload | Action::Download => {
                format!("/{}/{}/objects/{}", namespace, repo, oid)
            }
        }
    }

    /// `object_path` as it appears in an href.
    fn encoded_path(namespace: &str, repo: &str, oid: &str, action: Action) -> String {
        Self::object_path(
            &utf8_percent_encode(namespace, PATH_SEGMENT).to_string(),
            &utf8_percent_encode(repo, PATH_SEGMENT).to_string(),
            &utf8_percent_encode(oid, PATH_SEGMENT).to_string(),
            action,
        )
    }

    /// Check a presented link against the secret and the clock.
    pub fn verify(
        &self,
        action: Action,
        path: &str,
        expires: Option<i64>,
        signature: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), LinkRejection> {
        let signature = signature.ok_or(LinkRejection::MissingSignature)?;
        let presented = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| LinkRejection::BadSignature)?;
        let mut mac = self.mac.clone();
        mac.update(signing_input(action, path, expires).as_bytes());
        mac.verify_slice(&presented)
            .map_err(|_| LinkRejection::BadSignature)?;

        match expires {
            Some(expires) if now.timestamp() > expires => Err(LinkRejection::Expired),
            _ => Ok(()),
        }
    }

    fn permits(action: Action, auth: &AuthContext) -> bool {
        match action {
            Action::Download => true,
            Action::Upload | Action::Verify => auth.owns_namespace(),
        }
    }

    fn sign(&self, action: Action, path: &str, expires: Option<i64>) -> String {
        let mut mac = self.mac.clone();
        mac.update(signing_input(action, path, expires).as_bytes());
        URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
    }

    fn issue_at(
        &self,
        oid: &str,
        action: Action,
        auth: &AuthContext,
        now: DateTime<Utc>,
    ) -> Result<Link, IssuanceError> {
        if !Self::permits(action, auth) {
            return Err(IssuanceError::NotPermitted {
                principal: auth.principal.clone(),
                action,
                namespace: auth.namespace.clone(),
                repo: auth.repo.clone(),
            });
        }

        let path = Self::object_path(&auth.namespace, &auth.repo, oid, action);
        // The href only carries whole seconds; advertise exactly that.
        let expires = self.ttl.map(|ttl| (now + ttl).timestamp());
        let expires_at = expires.and_then(|secs| DateTime::from_timestamp(secs, 0));
        let signature = self.sign(action, &path, expires);
        let target = Self::encoded_path(&auth.namespace, &auth.repo, oid, action);
        let href = match expires {
            Some(expires) => format!(
                "{}{}?expires={}&signature={}",
                self.base_url, target, expires, signature
            ),
            None => format!("{}{}?signature={}", self.base_url, target, signature),
        };

        let mut headers = BTreeMap::new();
        headers.insert("Accept".to_string(), CONTENT_MEDIA_TYPE.to_string());
        if action == Action::Verify {
            headers.insert("Content-Type".to_string(), BATCH_MEDIA_TYPE.to_string());
        }

        Ok(Link {
            href,
            headers,
            expires_at,
        })
    }
}

impl LinkIssuer for SignedLinkIssuer {
    fn issue(&self, oid: &str, action: Action, auth: &AuthContext) -> Result<Link, IssuanceError> {
        self.issue_at(oid, action, auth, Utc::now())
    }
}

fn signing_input(action: Action, path: &str, expires: Option<i64>) -> String {
    let expires = expires.map(|e| e.to_string()).unwrap_or_default();
    format!("{}\n{}\n{}", action, path, expires)
}

#[cfg(test)]
mod tests {
    use super::*;

    const OID: &str = "4d7a214614ab2935c943f9e0ff69d22eadbb8f32b1258daaa5e2ca24d17e2393";

    fn issuer(ttl: Option<u64>) -> SignedLinkIssuer {
        SignedLinkIssuer::new(LinkPolicy {
            base_url: "https://lfs.example.com/".into(),
            secret: b"test-secret".to_vec(),
            ttl: ttl.map(Duration::from_secs),
        })
        .unwrap()
    }

    fn owner() -> AuthContext {
        AuthContext::new("alice", "alice", "assets")
    }

    fn query_param<'a>(href: &'a str, name: &str) -> Option<&'a str> {
        let (_, query) = href.split_once('?')?;
        query
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value)
    }

    #[test]
    fn upload_link_shape() {
        let now = Utc::now();
        let link = issuer(Some(900))
            .issue_at(OID, Action::Upload, &owner(), now)
            .unwrap();

        assert!(link.href.starts_with(&format!(
            "https://lfs.example.com/alice/assets/objects/{}?expires=",
            OID
        )));
        assert_eq!(link.headers.get("Accept").unwrap(), CONTENT_MEDIA_TYPE);
        assert!(!link.headers.contains_key("Content-Type"));
        let expires_at = link.expires_at.unwrap();
        assert!(expires_at > now);
        assert_eq!(
            expires_at.timestamp(),
            (now + chrono::Duration::seconds(900)).timestamp()
        );
    }

    #[test]
    fn advertised_expiry_matches_the_href() {
        let issuer = issuer(Some(1));
        let now = DateTime::from_timestamp(1_700_000_000, 999_000_000).unwrap();
        let link = issuer.issue_at(OID, Action::Download, &owner(), now).unwrap();
        let expires: i64 = query_param(&link.href, "expires").unwrap().parse().unwrap();
        let expires_at = link.expires_at.unwrap();

        assert_eq!(expires_at.timestamp(), expires);
        assert_eq!(expires_at.timestamp_subsec_nanos(), 0);
        assert!(expires_at > now);

        let path = SignedLinkIssuer::object_path("alice", "assets", OID, Action::Download);
        let signature = query_param(&link.href, "signature");
        assert_eq!(
            issuer.verify(Action::Download, &path, Some(expires), signature, expires_at),
            Ok(())
        );
        assert_eq!(
            issuer.verify(
                Action::Download,
                &path,
                Some(expires),
                signature,
                expires_at + chrono::Duration::seconds(1)
            ),
            Err(LinkRejection::Expired)
        );
    }

    #[test]
    fn href_escapes_path_segments_but_signs_decoded_path() {
        let issuer = issuer(Some(60));
        let auth = AuthContext::new("al ice", "al ice", "as?sets#1/x%");
        let now = Utc::now();
        let link = issuer.issue_at(OID, Action::Verify, &auth, now).unwrap();

        assert!(link.href.starts_with(&format!(
            "https://lfs.example.com/al%20ice/as%3Fsets%231%2Fx%25/objects/{}/verify?expires=",
            OID
        )));

        let path = SignedLinkIssuer::object_path("al ice", "as?sets#1/x%", OID, Action::Verify);
        let expires = query_param(&link.href, "expires").map(|e| e.parse().unwrap());
        let signature = query_param(&link.href, "signature");
        assert_eq!(issuer.verify(Action::Verify, &path, expires, signature, now), Ok(()));
    }

    #[test]
    fn verify_link_targets_verify_endpoint() {
        let link = issuer(Some(60)).issue(OID, Action::Verify, &owner()).unwrap();
        assert!(link.href.contains(&format!("/objects/{}/verify?", OID)));
        assert_eq!(link.headers.get("Content-Type").unwrap(), BATCH_MEDIA_TYPE);
    }

    #[test]
    fn non_expiring_policy_omits_expiry() {
        let link = issuer(None).issue(OID, Action::Download, &owner()).unwrap();
        assert_eq!(link.expires_at, None);
        assert!(query_param(&link.href, "expires").is_none());
        assert!(query_param(&link.href, "signature").is_some());
    }

    #[test]
    fn upload_requires_namespace_owner() {
        let guest = AuthContext::new("bob", "alice", "assets");
        let issuer = issuer(Some(60));
        assert!(matches!(
            issuer.issue(OID, Action::Upload, &guest),
            Err(IssuanceError::NotPermitted { .. })
        ));
        assert!(matches!(
            issuer.issue(OID, Action::Verify, &guest),
            Err(IssuanceError::NotPermitted { .. })
        ));
        assert!(issuer.issue(OID, Action::Download, &guest).is_ok());
    }

    #[test]
    fn issued_links_verify_until_expiry() {
        let issuer = issuer(Some(60));
        let now = Utc::now();
        let link = issuer.issue_at(OID, Action::Upload, &owner(), now).unwrap();
        let path = SignedLinkIssuer::object_path("alice", "assets", OID, Action::Upload);
        let expires = query_param(&link.href, "expires").map(|e| e.parse().unwrap());
        let signature = query_param(&link.href, "signature");

        assert_eq!(issuer.verify(Action::Upload, &path, expires, signature, now), Ok(()));
        assert_eq!(
            issuer.verify(Action::Download, &path, expires, signature, now),
            Err(LinkRejection::BadSignature)
        );
        assert_eq!(
            issuer.verify(Action::Upload, &path, expires.map(|e| e + 1), signature, now),
            Err(LinkRejection::BadSignature)
        );
        assert_eq!(
            issuer.verify(
                Action::Upload,
                &path,
                expires,
                signature,
                now + chrono::Duration::seconds(120)
            ),
            Err(LinkRejection::Expired)
        );
        assert_eq!(
            issuer.verify(Action::Upload, &path, expires, None, now),
            Err(LinkRejection::MissingSignature)
        );
    }

    #[test]
    fn rejects_unusable_policies() {
        let empty_secret = SignedLinkIssuer::new(LinkPolicy {
            base_url: "http://x".into(),
            secret: Vec::new(),
            ttl: None,
        });
        assert!(matches!(empty_secret, Err(IssuanceError::InvalidPolicy(_))));

        let zero_ttl = SignedLinkIssuer::new(LinkPolicy {
            base_url: "http://x".into(),
            secret: b"s".to_vec(),
            ttl: Some(Duration::from_millis(500)),
        });
        assert!(matches!(zero_ttl, Err(IssuanceError::InvalidPolicy(_))));
    }
}
