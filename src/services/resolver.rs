//! Per-object decision table.
//!
//! | operation | meta | content | result                  |
//! |-----------|------|---------|-------------------------|
//! | download  | no   | any     | error: object not found |
//! | download  | yes  | no      | error: content missing  |
//! | download  | yes  | yes     | download                |
//! | upload    | any  | yes     | verify                  |
//! | upload    | any  | no      | upload                  |
//!
//! Upload of content that is already present is a success (`verify`), while
//! a download without metadata is always an error whatever the content store
//! says.

use crate::{
    models::batch::{
        Action, AuthContext, BatchOperation, ExistenceResult, ObjectDescriptor, ObjectError,
        ObjectErrorKind,
    },
    services::storage_service::is_valid_oid,
};

/// Checks that need no store access. The existence checker must not be
/// consulted when this fails.
pub fn precheck(descriptor: &ObjectDescriptor) -> Result<&AuthContext, ObjectError> {
    if descriptor.size < 0 {
        return Err(ObjectError::new(
            ObjectErrorKind::InvalidSize,
            format!("invalid size {}", descriptor.size),
        ));
    }
    if !is_valid_oid(&descriptor.oid) {
        return Err(ObjectError::new(
            ObjectErrorKind::InvalidOid,
            "oid must be a lowercase hex SHA-256",
        ));
    }
    descriptor
        .auth
        .as_ref()
        .ok_or_else(|| ObjectError::new(ObjectErrorKind::Forbidden, "credentials required"))
}

/// Pick the action for an object given where it currently exists.
pub fn resolve(
    operation: BatchOperation,
    existence: ExistenceResult,
) -> Result<Action, ObjectError> {
    match (operation, existence.meta_exists, existence.content_exists) {
        (BatchOperation::Download, false, _) => Err(ObjectError::new(
            ObjectErrorKind::ObjectNotFound,
            "object does not exist",
        )),
        (BatchOperation::Download, true, false) => Err(ObjectError::new(
            ObjectErrorKind::ContentMissing,
            "object metadata exists but its content is missing",
        )),
        (BatchOperation::Download, true, true) => Ok(Action::Download),
        (BatchOperation::Upload, _, true) => Ok(Action::Verify),
        (BatchOperation::Upload, _, false) => Ok(Action::Upload),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OID: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    fn exists(meta_exists: bool, content_exists: bool) -> ExistenceResult {
        ExistenceResult {
            meta_exists,
            content_exists,
        }
    }

    fn descriptor(oid: &str, size: i64, auth: bool) -> ObjectDescriptor {
        ObjectDescriptor {
            oid: oid.to_string(),
            size,
            auth: auth.then(|| AuthContext::new("alice", "alice", "repo")),
        }
    }

    #[test]
    fn download_table() {
        for content in [false, true] {
            let err = resolve(BatchOperation::Download, exists(false, content)).unwrap_err();
            assert_eq!(err.kind, ObjectErrorKind::ObjectNotFound);
            assert_eq!(err.code(), 404);
        }

        let err = resolve(BatchOperation::Download, exists(true, false)).unwrap_err();
        assert_eq!(err.kind, ObjectErrorKind::ContentMissing);
        assert_eq!(err.code(), 422);

        assert_eq!(
            resolve(BatchOperation::Download, exists(true, true)).unwrap(),
            Action::Download
        );
    }

    #[test]
    fn upload_table() {
        for meta in [false, true] {
            assert_eq!(
                resolve(BatchOperation::Upload, exists(meta, true)).unwrap(),
                Action::Verify
            );
            assert_eq!(
                resolve(BatchOperation::Upload, exists(meta, false)).unwrap(),
                Action::Upload
            );
        }
    }

    #[test]
    fn precheck_order() {
        let err = precheck(&descriptor("nope", -1, false)).unwrap_err();
        assert_eq!(err.kind, ObjectErrorKind::InvalidSize);

        let err = precheck(&descriptor("nope", 1, false)).unwrap_err();
        assert_eq!(err.kind, ObjectErrorKind::InvalidOid);

        let err = precheck(&descriptor(OID, 1, false)).unwrap_err();
        assert_eq!(err.kind, ObjectErrorKind::Forbidden);
        assert_eq!(err.code(), 403);

        let authorized = descriptor(OID, 0, true);
        let auth = precheck(&authorized).unwrap();
        assert_eq!(auth.principal, "alice");
    }
}
